//! # Engine Tests
//!
//! The async façade: edit flows end to end, store failures, deadlines and
//! live queries.

use policy_core::{
    Address, Allocation, Collection, ContactMethod, ContractStatus, DependentStatus,
    DocumentStore, EngineConfig, IdType, LedgerEvent, MemoryStore, Money, Percentage, Person,
    PersonId, Plan, PlanId, PolicyEngine, PolicyError, RelationshipLabel, RemovalStep, Role,
    StaticCatalog,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn catalog() -> Arc<StaticCatalog> {
    Arc::new(StaticCatalog::new().with_plan(Plan {
        id: PlanId::new("family-basic"),
        name: "Family Basic".into(),
        monthly_premium: Money::from_cents(15_000),
        cover_amount: Money::from_cents(2_000_000),
        max_dependents: 2,
        features: Vec::new(),
    }))
}

fn person(id_number: &str) -> Person {
    Person::new(IdType::NationalId, id_number, "Test", "Person")
}

fn main_member() -> Person {
    Person::new(IdType::NationalId, "8001015009087", "Thabo", "Mokoena")
        .with_contact(ContactMethod::email("thabo@example.com"))
        .with_address(Address {
            line1: "12 Jacaranda St".into(),
            city: "Pretoria".into(),
            postal_code: "0002".into(),
            ..Address::default()
        })
}

fn pct(whole: u32) -> Percentage {
    Percentage::whole(whole).expect("percentage")
}

// =============================================================================
// TEST STORES
// =============================================================================

/// Memory store with switchable write faults.
#[derive(Default)]
struct FaultyStore {
    inner: MemoryStore,
    fail_relationship_delete: Arc<AtomicBool>,
    fail_contract_put: Arc<AtomicBool>,
}

impl DocumentStore for FaultyStore {
    fn allocate_id(&mut self, collection: Collection) -> Result<u64, PolicyError> {
        self.inner.allocate_id(collection)
    }

    fn get(&self, collection: Collection, id: u64) -> Result<Option<Vec<u8>>, PolicyError> {
        self.inner.get(collection, id)
    }

    fn put(&mut self, collection: Collection, id: u64, document: &[u8]) -> Result<(), PolicyError> {
        if collection == Collection::Contracts && self.fail_contract_put.load(Ordering::SeqCst) {
            return Err(PolicyError::persistence("put", "disk full"));
        }
        self.inner.put(collection, id, document)
    }

    fn delete(&mut self, collection: Collection, id: u64) -> Result<bool, PolicyError> {
        if collection == Collection::Relationships
            && self.fail_relationship_delete.load(Ordering::SeqCst)
        {
            return Err(PolicyError::persistence("delete", "connection reset"));
        }
        self.inner.delete(collection, id)
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(u64, Vec<u8>)>, PolicyError> {
        self.inner.scan(collection)
    }

    fn count(&self, collection: Collection) -> Result<usize, PolicyError> {
        self.inner.count(collection)
    }
}

/// Memory store with slow point reads and slow writes.
#[derive(Default)]
struct SlowStore {
    inner: MemoryStore,
    read_delay: Duration,
    write_delay: Duration,
}

impl DocumentStore for SlowStore {
    fn allocate_id(&mut self, collection: Collection) -> Result<u64, PolicyError> {
        self.inner.allocate_id(collection)
    }

    fn get(&self, collection: Collection, id: u64) -> Result<Option<Vec<u8>>, PolicyError> {
        std::thread::sleep(self.read_delay);
        self.inner.get(collection, id)
    }

    fn put(&mut self, collection: Collection, id: u64, document: &[u8]) -> Result<(), PolicyError> {
        std::thread::sleep(self.write_delay);
        self.inner.put(collection, id, document)
    }

    fn delete(&mut self, collection: Collection, id: u64) -> Result<bool, PolicyError> {
        self.inner.delete(collection, id)
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(u64, Vec<u8>)>, PolicyError> {
        self.inner.scan(collection)
    }

    fn count(&self, collection: Collection) -> Result<usize, PolicyError> {
        self.inner.count(collection)
    }
}

// =============================================================================
// EDIT FLOWS
// =============================================================================

#[tokio::test]
async fn full_contract_lifecycle() {
    init_tracing();
    let engine = PolicyEngine::in_memory(catalog());

    let opened = engine
        .open_contract(PlanId::new("family-basic"), Vec::new(), main_member())
        .await
        .expect("open");
    let number = opened.contract.number.clone();
    assert_eq!(opened.contract.status, ContractStatus::New);

    let spouse = engine
        .add_beneficiary(&number, person("8503150123086"), RelationshipLabel::Spouse, pct(60))
        .await
        .expect("spouse");
    engine
        .add_beneficiary(&number, person("1206150123083"), RelationshipLabel::Child, pct(40))
        .await
        .expect("child");
    engine
        .add_dependent(
            &number,
            person("0303030123085"),
            RelationshipLabel::Child,
            DependentStatus::Active,
        )
        .await
        .expect("dependent");

    let view = engine.build_contract_view(&number).await.expect("view");
    assert!(view.is_complete(), "{:?}", view.gaps);
    assert_eq!(view.beneficiaries.len(), 2);
    assert_eq!(view.dependents.len(), 1);
    assert_eq!(view.monthly_cost, Money::from_cents(15_000));
    assert_eq!(
        view.main_member.as_ref().map(|m| m.person.person.first_name.as_str()),
        Some("Thabo")
    );

    let in_force = engine.finalize_contract(&number).await.expect("finalize");
    assert_eq!(in_force.status, ContractStatus::InForce);

    let locked = engine.remove_beneficiary(spouse.relationship.id).await;
    assert!(matches!(locked, Err(PolicyError::ContractNotEditable { .. })));

    engine.amend_contract(&number).await.expect("amend");
    engine
        .update_beneficiary(
            spouse.relationship.id,
            person("8503150123086"),
            RelationshipLabel::Spouse,
            pct(50),
        )
        .await
        .expect("update");
    let refused = engine.finalize_contract(&number).await;
    assert!(matches!(refused, Err(PolicyError::IncompleteContract { .. })));
}

#[tokio::test]
async fn allocation_check_ignores_the_edited_row() {
    let engine = PolicyEngine::in_memory(catalog());
    let number = engine
        .open_contract(PlanId::new("family-basic"), Vec::new(), main_member())
        .await
        .expect("open")
        .contract
        .number;
    let only = engine
        .add_beneficiary(&number, person("8503150123086"), RelationshipLabel::Spouse, pct(100))
        .await
        .expect("add");

    let total = engine
        .check_beneficiary_allocation(&number, pct(80), Some(only.relationship.id))
        .await
        .expect("edit check");
    assert_eq!(total.hundredths(), 8_000);

    let new_share = engine
        .check_beneficiary_allocation(&number, pct(1), None)
        .await;
    assert!(matches!(new_share, Err(PolicyError::AllocationExceeded { .. })));
}

// =============================================================================
// FAILURES
// =============================================================================

#[tokio::test]
async fn interrupted_removal_reports_progress_and_can_be_retried() {
    init_tracing();
    let switch = Arc::new(AtomicBool::new(false));
    let store = FaultyStore {
        fail_relationship_delete: Arc::clone(&switch),
        ..FaultyStore::default()
    };
    let engine = PolicyEngine::with_store(store, catalog(), EngineConfig::default());

    let number = engine
        .open_contract(PlanId::new("family-basic"), Vec::new(), main_member())
        .await
        .expect("open")
        .contract
        .number;
    let added = engine
        .add_beneficiary(&number, person("8503150123086"), RelationshipLabel::Spouse, pct(50))
        .await
        .expect("add");
    let relationship_id = added.relationship.id;

    switch.store(true, Ordering::SeqCst);
    let result = engine.detach_relationship(relationship_id).await;
    match result {
        Err(PolicyError::PartialRemovalFailure {
            step, completed, ..
        }) => {
            assert_eq!(step, RemovalStep::Relationship);
            assert_eq!(
                completed,
                vec![
                    RemovalStep::BeneficiaryAttributes,
                    RemovalStep::DependentAttributes
                ]
            );
        }
        other => unreachable!("expected PartialRemovalFailure, got {other:?}"),
    }

    // The relationship survives, its attribute row does not.
    assert!(
        engine
            .get_relationship(relationship_id)
            .await
            .expect("get")
            .is_some()
    );
    assert!(
        engine
            .beneficiary_attributes(relationship_id)
            .await
            .expect("get")
            .is_none()
    );

    switch.store(false, Ordering::SeqCst);
    let removed = engine
        .detach_relationship(relationship_id)
        .await
        .expect("retry");
    assert_eq!(removed.role, Role::Beneficiary);
    assert!(
        engine
            .list_relationships(&number, Some(Role::Beneficiary))
            .await
            .expect("list")
            .is_empty()
    );
}

#[tokio::test]
async fn slow_store_calls_time_out_as_persistence_errors() {
    init_tracing();
    let store = SlowStore {
        read_delay: Duration::from_millis(300),
        ..SlowStore::default()
    };
    let config = EngineConfig {
        store_timeout_ms: 20,
        ..EngineConfig::default()
    };
    let engine = PolicyEngine::with_store(store, catalog(), config);

    let result = engine.get_person(PersonId(1)).await;
    match result {
        Err(PolicyError::Persistence { operation, message }) => {
            assert_eq!(operation, "get_person");
            assert!(message.contains("timed out"), "{message}");
        }
        other => unreachable!("expected a timeout, got {other:?}"),
    }

    // The abandoned read still holds the lock; a writer waits past its deadline.
    let blocked = engine
        .upsert_person(Person::new(IdType::NationalId, "8503150123086", "Naledi", "Mokoena"))
        .await;
    assert!(matches!(
        blocked,
        Err(PolicyError::Persistence { ref operation, .. }) if operation == "upsert_person"
    ));

    // The fail-closed check still answers.
    assert!(
        !engine
            .check_dependent_limit(&policy_core::ContractNumber::new("CNT-X"), 0)
            .await
    );
}

#[tokio::test]
async fn failed_register_write_leaves_the_contract_retryable() {
    init_tracing();
    let switch = Arc::new(AtomicBool::new(false));
    let store = FaultyStore {
        fail_contract_put: Arc::clone(&switch),
        ..FaultyStore::default()
    };
    let engine = PolicyEngine::with_store(store, catalog(), EngineConfig::default());
    let number = engine
        .open_contract(PlanId::new("family-basic"), Vec::new(), main_member())
        .await
        .expect("open")
        .contract
        .number;

    switch.store(true, Ordering::SeqCst);
    let failed = engine
        .add_beneficiary(&number, person("8503150123086"), RelationshipLabel::Spouse, pct(40))
        .await;
    assert!(matches!(failed, Err(PolicyError::Persistence { .. })));
    assert_eq!(
        engine.allocation_total(&number).await.expect("total"),
        Allocation::ZERO
    );
    assert!(
        engine
            .list_relationships(&number, Some(Role::Beneficiary))
            .await
            .expect("list")
            .is_empty()
    );

    switch.store(false, Ordering::SeqCst);
    let added = engine
        .add_beneficiary(&number, person("8503150123086"), RelationshipLabel::Spouse, pct(40))
        .await
        .expect("retry");
    assert_eq!(added.attributes.percentage, pct(40));
    assert_eq!(added.contract.status, ContractStatus::InProgress);
    assert_eq!(
        engine.allocation_total(&number).await.expect("total"),
        Allocation::from_hundredths(4000)
    );
}

#[tokio::test]
async fn slow_write_holding_the_lock_commits_and_is_announced() {
    init_tracing();
    let store = SlowStore {
        write_delay: Duration::from_millis(100),
        ..SlowStore::default()
    };
    let config = EngineConfig {
        store_timeout_ms: 20,
        ..EngineConfig::default()
    };
    let engine = PolicyEngine::with_store(store, catalog(), config);
    let mut events = engine.events();

    // The write outlives the deadline but reports its real outcome.
    let record = engine
        .upsert_person(Person::new(IdType::NationalId, "8503150123086", "Naledi", "Mokoena"))
        .await
        .expect("slow write completes");
    let found = engine
        .find_person(IdType::NationalId, "8503150123086")
        .await
        .expect("find");
    assert_eq!(found.map(|r| r.id), Some(record.id));
    assert_eq!(
        events.try_recv().expect("announced"),
        LedgerEvent::PersonChanged {
            person_id: record.id
        }
    );

    // A caller that stops waiting still has its write announced.
    let caller = tokio::spawn({
        let engine = engine.clone();
        async move { engine.upsert_person(person("9207045123082")).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    caller.abort();

    let announced = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("announced in time")
        .expect("event");
    assert!(matches!(announced, LedgerEvent::PersonChanged { .. }));
    assert!(
        engine
            .find_person(IdType::NationalId, "9207045123082")
            .await
            .expect("find")
            .is_some()
    );
}

// =============================================================================
// LIVE QUERIES
// =============================================================================

#[tokio::test]
async fn contract_watch_sees_every_committed_edit() {
    let engine = PolicyEngine::in_memory(catalog());
    let number = engine
        .open_contract(PlanId::new("family-basic"), Vec::new(), main_member())
        .await
        .expect("open")
        .contract
        .number;

    let mut watch = engine.watch_contract(&number);
    let initial = watch.next().await.expect("open").expect("view");
    assert!(initial.beneficiaries.is_empty());

    engine
        .add_beneficiary(&number, person("8503150123086"), RelationshipLabel::Spouse, pct(100))
        .await
        .expect("add");
    let after_add = watch.next().await.expect("open").expect("view");
    assert_eq!(after_add.beneficiaries.len(), 1);
    assert_eq!(after_add.contract.status, ContractStatus::InProgress);

    engine.finalize_contract(&number).await.expect("finalize");
    let after_finalize = watch.next().await.expect("open").expect("view");
    assert_eq!(after_finalize.contract.status, ContractStatus::InForce);
}

#[tokio::test]
async fn relationship_watch_ignores_other_roles() {
    let engine = PolicyEngine::in_memory(catalog());
    let number = engine
        .open_contract(PlanId::new("family-basic"), Vec::new(), main_member())
        .await
        .expect("open")
        .contract
        .number;

    let mut dependents = engine.subscribe(&number, Some(Role::Dependent));
    assert!(dependents.next().await.expect("open").expect("entries").is_empty());

    engine
        .add_beneficiary(&number, person("8503150123086"), RelationshipLabel::Spouse, pct(30))
        .await
        .expect("beneficiary");
    let dependent = engine
        .add_dependent(
            &number,
            person("1206150123083"),
            RelationshipLabel::Child,
            DependentStatus::Active,
        )
        .await
        .expect("dependent");

    let entries = dependents.next().await.expect("open").expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].relationship.id, dependent.relationship.id);
    assert!(entries[0].beneficiary.is_none());
}
