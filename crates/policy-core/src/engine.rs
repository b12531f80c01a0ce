//! # Policy Engine
//!
//! The async façade over the document layers.
//!
//! - One `RwLock` guards the store: queries share it, edits are exclusive
//! - Store work runs on the blocking pool; the caller's task only awaits it
//! - Queries carry the configured deadline, lock wait included. A query that
//!   misses it fails with a `Persistence` error naming the operation
//! - Edits carry the deadline only while waiting for the lock. An edit that
//!   holds the lock runs to completion, so its result is never a timeout
//! - The [`LedgerEvent`]s of an edit are emitted by the edit itself, before
//!   the lock is released, feeding the live queries in [`crate::watch`]

use crate::aggregator::{ContractAggregator, ContractView};
use crate::attributes::RoleAttributes;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::contracts::ContractRegister;
use crate::events::{EventBus, LedgerEvent};
use crate::flows::{ContractFlows, MainMemberChange, OpenedContract, Removal, RoleChange};
use crate::identity::{IdentityParser, IdentityReport};
use crate::ledger::{LedgerEntry, RelationshipLedger};
use crate::persons::{PersonStore, Prefill};
use crate::storage::{DocumentStore, StoreBackend};
use crate::validator::AllocationValidator;
use crate::watch::{ContractWatch, RelationshipWatch};
use crate::{
    Allocation, BeneficiaryAttributes, Contract, ContractNumber, DependentAttributes,
    DependentStatus, IdType, OptionId, Percentage, Person, PersonId, PersonRecord, PlanId,
    PolicyError, Relationship, RelationshipId, RelationshipLabel, Role,
};
use std::sync::{Arc, Weak};
use tokio::sync::{RwLock, broadcast};

// =============================================================================
// ENGINE STATE
// =============================================================================

pub(crate) struct EngineInner<S> {
    store: Arc<RwLock<S>>,
    catalog: Arc<dyn Catalog>,
    events: EventBus,
    config: EngineConfig,
}

/// Shared handle to one ledger. Clones share the store and the event bus.
pub struct PolicyEngine<S = StoreBackend> {
    inner: Arc<EngineInner<S>>,
}

impl<S> Clone for PolicyEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl PolicyEngine<StoreBackend> {
    /// An engine over a fresh in-memory store with default settings.
    #[must_use]
    pub fn in_memory(catalog: Arc<dyn Catalog>) -> Self {
        Self::with_store(StoreBackend::default(), catalog, EngineConfig::default())
    }

    /// An engine over the store named by `config.database`, in memory when unset.
    pub fn open(config: EngineConfig, catalog: Arc<dyn Catalog>) -> Result<Self, PolicyError> {
        let store = StoreBackend::open(config.database.as_deref())?;
        tracing::info!(
            persistent = store.is_persistent(),
            timeout_ms = config.store_timeout_ms,
            "policy engine opened"
        );
        Ok(Self::with_store(store, catalog, config))
    }
}

impl<S: DocumentStore + Send + Sync + 'static> PolicyEngine<S> {
    pub fn with_store(store: S, catalog: Arc<dyn Catalog>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store: Arc::new(RwLock::new(store)),
                catalog,
                events: EventBus::new(config.event_capacity),
                config,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Raw change feed. Live queries are usually more convenient.
    pub fn events(&self) -> broadcast::Receiver<LedgerEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn downgrade(&self) -> Weak<EngineInner<S>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner<S>>) -> Self {
        Self { inner }
    }

    // =========================================================================
    // STORE ACCESS
    // =========================================================================

    async fn read<T, F>(&self, operation: &'static str, work: F) -> Result<T, PolicyError>
    where
        T: Send + 'static,
        F: FnOnce(&S, &dyn Catalog) -> Result<T, PolicyError> + Send + 'static,
    {
        let store = Arc::clone(&self.inner.store);
        let catalog = Arc::clone(&self.inner.catalog);
        self.with_deadline(operation, async move {
            let guard = store.read_owned().await;
            tokio::task::spawn_blocking(move || work(&guard, catalog.as_ref()))
                .await
                .map_err(|e| PolicyError::persistence(operation, e))?
        })
        .await
    }

    /// Run an edit under the exclusive lock and emit the events `announce`
    /// derives from its result.
    ///
    /// Only the wait for the lock counts against the deadline. Once the lock
    /// is held the edit always finishes and announces itself, even if the
    /// caller has stopped waiting.
    async fn write<T, F, E>(
        &self,
        operation: &'static str,
        work: F,
        announce: E,
    ) -> Result<T, PolicyError>
    where
        T: Send + 'static,
        F: FnOnce(&mut S, &dyn Catalog) -> Result<T, PolicyError> + Send + 'static,
        E: FnOnce(&T) -> Vec<LedgerEvent> + Send + 'static,
    {
        let store = Arc::clone(&self.inner.store);
        let catalog = Arc::clone(&self.inner.catalog);
        let events = self.inner.events.clone();
        let mut guard = self
            .with_deadline(operation, async move { Ok(store.write_owned().await) })
            .await?;
        tokio::task::spawn_blocking(move || {
            let value = work(&mut guard, catalog.as_ref())?;
            for event in announce(&value) {
                events.emit(event);
            }
            Ok(value)
        })
        .await
        .map_err(|e| PolicyError::persistence(operation, e))?
    }

    async fn with_deadline<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, PolicyError>>,
    ) -> Result<T, PolicyError> {
        let deadline = self.inner.config.store_timeout();
        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = deadline.as_millis() as u64,
                    "store call timed out"
                );
                Err(PolicyError::timeout(operation, deadline))
            }
        }
    }

    // =========================================================================
    // IDENTITY & PERSONS
    // =========================================================================

    /// Full validation report for an identity number; never fails.
    pub fn validate_id(&self, id_type: IdType, id_number: &str) -> IdentityReport {
        IdentityParser::parse(id_number, id_type)
    }

    pub async fn find_person(
        &self,
        id_type: IdType,
        id_number: &str,
    ) -> Result<Option<PersonRecord>, PolicyError> {
        let id_number = id_number.to_string();
        self.read("find_person", move |store, _| {
            PersonStore::find_person(store, id_type, &id_number)
        })
        .await
    }

    pub async fn get_person(&self, id: PersonId) -> Result<Option<PersonRecord>, PolicyError> {
        self.read("get_person", move |store, _| PersonStore::get_person(store, id))
            .await
    }

    pub async fn upsert_person(&self, person: Person) -> Result<PersonRecord, PolicyError> {
        self.write(
            "upsert_person",
            move |store, _| PersonStore::upsert_person(store, person),
            |record: &PersonRecord| vec![LedgerEvent::PersonChanged { person_id: record.id }],
        )
        .await
    }

    pub async fn prefill(&self, id_type: IdType, id_number: &str) -> Result<Prefill, PolicyError> {
        let id_number = id_number.to_string();
        self.read("prefill", move |store, _| {
            PersonStore::prefill(store, id_type, &id_number)
        })
        .await
    }

    // =========================================================================
    // CONTRACTS
    // =========================================================================

    pub async fn get_contract(
        &self,
        contract_number: &ContractNumber,
    ) -> Result<Option<Contract>, PolicyError> {
        let number = contract_number.clone();
        self.read("get_contract", move |store, _| {
            ContractRegister::find(store, &number)
        })
        .await
    }

    pub async fn list_contracts(&self) -> Result<Vec<Contract>, PolicyError> {
        self.read("list_contracts", |store, _| ContractRegister::list(store))
            .await
    }

    pub async fn build_contract_view(
        &self,
        contract_number: &ContractNumber,
    ) -> Result<ContractView, PolicyError> {
        let number = contract_number.clone();
        self.read("build_contract_view", move |store, catalog| {
            ContractAggregator::build_contract_view(store, catalog, &number)
        })
        .await
    }

    pub async fn open_contract(
        &self,
        plan_id: PlanId,
        option_ids: Vec<OptionId>,
        main_member: Person,
    ) -> Result<OpenedContract, PolicyError> {
        let attempts = self.inner.config.number_attempts;
        let opened = self
            .write(
                "open_contract",
                move |store, catalog| {
                    let mut rng = rand::rng();
                    ContractFlows::open_contract(
                        store,
                        catalog,
                        &mut rng,
                        attempts,
                        plan_id,
                        option_ids,
                        main_member,
                    )
                },
                |opened: &OpenedContract| {
                    vec![
                        contract_changed(&opened.contract),
                        LedgerEvent::PersonChanged {
                            person_id: opened.main_member.id,
                        },
                        LedgerEvent::RelationshipAttached {
                            contract_number: opened.contract.number.clone(),
                            relationship_id: opened.relationship.id,
                            role: Role::MainMember,
                        },
                    ]
                },
            )
            .await?;

        tracing::info!(
            contract = %opened.contract.number,
            main_member = opened.main_member.id.0,
            "contract opened"
        );
        Ok(opened)
    }

    pub async fn select_plan(
        &self,
        contract_number: &ContractNumber,
        plan_id: PlanId,
    ) -> Result<Contract, PolicyError> {
        let number = contract_number.clone();
        self.write(
            "select_plan",
            move |store, catalog| {
                ContractFlows::select_plan(store, catalog, &number, plan_id)
            },
            |contract: &Contract| vec![contract_changed(contract)],
        )
        .await
    }

    pub async fn set_options(
        &self,
        contract_number: &ContractNumber,
        option_ids: Vec<OptionId>,
    ) -> Result<Contract, PolicyError> {
        let number = contract_number.clone();
        self.write(
            "set_options",
            move |store, catalog| {
                ContractFlows::set_options(store, catalog, &number, option_ids)
            },
            |contract: &Contract| vec![contract_changed(contract)],
        )
        .await
    }

    pub async fn finalize_contract(
        &self,
        contract_number: &ContractNumber,
    ) -> Result<Contract, PolicyError> {
        let number = contract_number.clone();
        self.write(
            "finalize_contract",
            move |store, catalog| {
                ContractFlows::finalize_contract(store, catalog, &number)
            },
            |contract: &Contract| vec![contract_changed(contract)],
        )
        .await
    }

    pub async fn amend_contract(
        &self,
        contract_number: &ContractNumber,
    ) -> Result<Contract, PolicyError> {
        let number = contract_number.clone();
        self.write(
            "amend_contract",
            move |store, _| {
                ContractFlows::amend_contract(store, &number)
            },
            |contract: &Contract| vec![contract_changed(contract)],
        )
        .await
    }

    // =========================================================================
    // RELATIONSHIP LEDGER
    // =========================================================================

    /// Bind a person to a contract. Contract status is not consulted here;
    /// the edit flows below enforce it.
    pub async fn attach_relationship(
        &self,
        person_id: PersonId,
        contract_number: &ContractNumber,
        role: Role,
    ) -> Result<Relationship, PolicyError> {
        let number = contract_number.clone();
        self.write(
            "attach_relationship",
            move |store, _| RelationshipLedger::attach(store, person_id, &number, role),
            |relationship: &Relationship| {
                vec![LedgerEvent::RelationshipAttached {
                    contract_number: relationship.contract_number.clone(),
                    relationship_id: relationship.id,
                    role: relationship.role,
                }]
            },
        )
        .await
    }

    /// Remove a relationship and its attribute rows.
    ///
    /// A `PartialRemovalFailure` leaves the relationship in place; calling
    /// again completes the removal.
    pub async fn detach_relationship(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Relationship, PolicyError> {
        self.write(
            "detach_relationship",
            move |store, _| RelationshipLedger::detach(store, relationship_id),
            |relationship: &Relationship| {
                vec![LedgerEvent::RelationshipDetached {
                    contract_number: relationship.contract_number.clone(),
                    relationship_id: relationship.id,
                    role: relationship.role,
                }]
            },
        )
        .await
    }

    pub async fn get_relationship(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Option<Relationship>, PolicyError> {
        self.read("get_relationship", move |store, _| {
            RelationshipLedger::get(store, relationship_id)
        })
        .await
    }

    pub async fn list_relationships(
        &self,
        contract_number: &ContractNumber,
        role: Option<Role>,
    ) -> Result<Vec<Relationship>, PolicyError> {
        let number = contract_number.clone();
        self.read("list_relationships", move |store, _| {
            RelationshipLedger::list_by_contract(store, &number, role)
        })
        .await
    }

    /// Relationships of a contract with their attribute rows.
    pub async fn relationship_entries(
        &self,
        contract_number: &ContractNumber,
        role: Option<Role>,
    ) -> Result<Vec<LedgerEntry>, PolicyError> {
        let number = contract_number.clone();
        self.read("relationship_entries", move |store, _| {
            RelationshipLedger::entries(store, &number, role)
        })
        .await
    }

    pub async fn relationships_of_person(
        &self,
        person_id: PersonId,
    ) -> Result<Vec<Relationship>, PolicyError> {
        self.read("relationships_of_person", move |store, _| {
            RelationshipLedger::list_by_person(store, person_id)
        })
        .await
    }

    // =========================================================================
    // ROLE ATTRIBUTES
    // =========================================================================

    pub async fn set_beneficiary_attributes(
        &self,
        relationship_id: RelationshipId,
        label: RelationshipLabel,
        percentage: Percentage,
    ) -> Result<BeneficiaryAttributes, PolicyError> {
        let (attributes, _) = self
            .write(
                "set_beneficiary_attributes",
                move |store, _| {
                    let relationship = RelationshipLedger::require(store, relationship_id)?;
                    let attributes = RoleAttributes::set_beneficiary_attributes(
                        store,
                        relationship_id,
                        label,
                        percentage,
                    )?;
                    Ok((attributes, relationship))
                },
                |(_, relationship): &(BeneficiaryAttributes, Relationship)| {
                    vec![attributes_changed(relationship)]
                },
            )
            .await?;
        Ok(attributes)
    }

    pub async fn set_dependent_attributes(
        &self,
        relationship_id: RelationshipId,
        label: RelationshipLabel,
        status: DependentStatus,
    ) -> Result<DependentAttributes, PolicyError> {
        let (attributes, _) = self
            .write(
                "set_dependent_attributes",
                move |store, _| {
                    let relationship = RelationshipLedger::require(store, relationship_id)?;
                    let attributes = RoleAttributes::set_dependent_attributes(
                        store,
                        relationship_id,
                        label,
                        status,
                    )?;
                    Ok((attributes, relationship))
                },
                |(_, relationship): &(DependentAttributes, Relationship)| {
                    vec![attributes_changed(relationship)]
                },
            )
            .await?;
        Ok(attributes)
    }

    pub async fn beneficiary_attributes(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Option<BeneficiaryAttributes>, PolicyError> {
        self.read("beneficiary_attributes", move |store, _| {
            RoleAttributes::beneficiary_attributes(store, relationship_id)
        })
        .await
    }

    pub async fn dependent_attributes(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Option<DependentAttributes>, PolicyError> {
        self.read("dependent_attributes", move |store, _| {
            RoleAttributes::dependent_attributes(store, relationship_id)
        })
        .await
    }

    // =========================================================================
    // CHECKS
    // =========================================================================

    pub async fn allocation_total(
        &self,
        contract_number: &ContractNumber,
    ) -> Result<Allocation, PolicyError> {
        let number = contract_number.clone();
        self.read("allocation_total", move |store, _| {
            AllocationValidator::allocation_total(store, &number)
        })
        .await
    }

    pub async fn check_beneficiary_allocation(
        &self,
        contract_number: &ContractNumber,
        proposed: Percentage,
        excluding: Option<RelationshipId>,
    ) -> Result<Allocation, PolicyError> {
        let number = contract_number.clone();
        self.read("check_beneficiary_allocation", move |store, _| {
            AllocationValidator::check_beneficiary_allocation(store, &number, proposed, excluding)
        })
        .await
    }

    pub async fn dependent_count(&self, contract_number: &ContractNumber) -> Result<u32, PolicyError> {
        let number = contract_number.clone();
        self.read("dependent_count", move |store, _| {
            AllocationValidator::dependent_count(store, &number)
        })
        .await
    }

    /// Whether one more dependent fits. Any failure, a timeout included, answers `false`.
    pub async fn check_dependent_limit(
        &self,
        contract_number: &ContractNumber,
        current_count: u32,
    ) -> bool {
        let number = contract_number.clone();
        let answer = self
            .read("check_dependent_limit", move |store, catalog| {
                Ok(AllocationValidator::check_dependent_limit(
                    store,
                    catalog,
                    &number,
                    current_count,
                ))
            })
            .await;
        answer.unwrap_or_else(|error| {
            tracing::warn!(contract = %contract_number, error = %error, "dependent limit check failed");
            false
        })
    }

    pub async fn check_duplicate_person(
        &self,
        contract_number: &ContractNumber,
        id_number: &str,
        id_type: IdType,
        role: Role,
    ) -> Result<bool, PolicyError> {
        let number = contract_number.clone();
        let id_number = id_number.to_string();
        self.read("check_duplicate_person", move |store, _| {
            AllocationValidator::check_duplicate_person(store, &number, &id_number, id_type, role)
        })
        .await
    }

    pub fn check_same_as_main_member(&self, id_number: &str, main_member_id_number: &str) -> bool {
        AllocationValidator::check_same_as_main_member(id_number, main_member_id_number)
    }

    // =========================================================================
    // EDIT FLOWS
    // =========================================================================

    pub async fn update_main_member(
        &self,
        contract_number: &ContractNumber,
        person: Person,
    ) -> Result<MainMemberChange, PolicyError> {
        let number = contract_number.clone();
        self.write(
            "update_main_member",
            move |store, _| ContractFlows::update_main_member(store, &number, person),
            |change: &MainMemberChange| {
                let mut events = vec![LedgerEvent::PersonChanged {
                    person_id: change.person.id,
                }];
                if change.attached {
                    events.push(LedgerEvent::RelationshipAttached {
                        contract_number: change.contract.number.clone(),
                        relationship_id: change.relationship.id,
                        role: Role::MainMember,
                    });
                }
                events.push(contract_changed(&change.contract));
                events
            },
        )
        .await
    }

    pub async fn add_beneficiary(
        &self,
        contract_number: &ContractNumber,
        person: Person,
        label: RelationshipLabel,
        percentage: Percentage,
    ) -> Result<RoleChange<BeneficiaryAttributes>, PolicyError> {
        let number = contract_number.clone();
        self.write(
            "add_beneficiary",
            move |store, _| {
                ContractFlows::add_beneficiary(store, &number, person, label, percentage)
            },
            |change: &RoleChange<BeneficiaryAttributes>| role_change_events(change, true),
        )
        .await
    }

    pub async fn update_beneficiary(
        &self,
        relationship_id: RelationshipId,
        person: Person,
        label: RelationshipLabel,
        percentage: Percentage,
    ) -> Result<RoleChange<BeneficiaryAttributes>, PolicyError> {
        self.write(
            "update_beneficiary",
            move |store, _| {
                ContractFlows::update_beneficiary(store, relationship_id, person, label, percentage)
            },
            |change: &RoleChange<BeneficiaryAttributes>| role_change_events(change, false),
        )
        .await
    }

    pub async fn remove_beneficiary(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Removal, PolicyError> {
        self.write(
            "remove_beneficiary",
            move |store, _| ContractFlows::remove_beneficiary(store, relationship_id),
            removal_events,
        )
        .await
    }

    pub async fn add_dependent(
        &self,
        contract_number: &ContractNumber,
        person: Person,
        label: RelationshipLabel,
        status: DependentStatus,
    ) -> Result<RoleChange<DependentAttributes>, PolicyError> {
        let number = contract_number.clone();
        self.write(
            "add_dependent",
            move |store, catalog| {
                ContractFlows::add_dependent(store, catalog, &number, person, label, status)
            },
            |change: &RoleChange<DependentAttributes>| role_change_events(change, true),
        )
        .await
    }

    pub async fn update_dependent(
        &self,
        relationship_id: RelationshipId,
        person: Person,
        label: RelationshipLabel,
        status: DependentStatus,
    ) -> Result<RoleChange<DependentAttributes>, PolicyError> {
        self.write(
            "update_dependent",
            move |store, _| {
                ContractFlows::update_dependent(store, relationship_id, person, label, status)
            },
            |change: &RoleChange<DependentAttributes>| role_change_events(change, false),
        )
        .await
    }

    pub async fn remove_dependent(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Removal, PolicyError> {
        self.write(
            "remove_dependent",
            move |store, _| ContractFlows::remove_dependent(store, relationship_id),
            removal_events,
        )
        .await
    }

    // =========================================================================
    // LIVE QUERIES
    // =========================================================================

    /// Live view of a contract's relationships, attribute rows included.
    /// `None` follows every role.
    ///
    /// The first [`RelationshipWatch::next`] yields the current state.
    pub fn subscribe(
        &self,
        contract_number: &ContractNumber,
        role: Option<Role>,
    ) -> RelationshipWatch<S> {
        RelationshipWatch::new(self, contract_number.clone(), role)
    }

    /// Live [`ContractView`] of one contract.
    pub fn watch_contract(&self, contract_number: &ContractNumber) -> ContractWatch<S> {
        ContractWatch::new(self, contract_number.clone())
    }
}

// =============================================================================
// CHANGE EVENTS
// =============================================================================

fn contract_changed(contract: &Contract) -> LedgerEvent {
    LedgerEvent::ContractChanged {
        contract_number: contract.number.clone(),
        status: contract.status,
    }
}

fn attributes_changed(relationship: &Relationship) -> LedgerEvent {
    LedgerEvent::AttributesChanged {
        contract_number: relationship.contract_number.clone(),
        relationship_id: relationship.id,
        role: relationship.role,
    }
}

fn role_change_events<A>(change: &RoleChange<A>, attached: bool) -> Vec<LedgerEvent> {
    let relationship = &change.relationship;
    let mut events = vec![LedgerEvent::PersonChanged {
        person_id: change.person.id,
    }];
    if attached {
        events.push(LedgerEvent::RelationshipAttached {
            contract_number: relationship.contract_number.clone(),
            relationship_id: relationship.id,
            role: relationship.role,
        });
    }
    events.push(attributes_changed(relationship));
    events.push(contract_changed(&change.contract));
    events
}

fn removal_events(removal: &Removal) -> Vec<LedgerEvent> {
    vec![
        LedgerEvent::RelationshipDetached {
            contract_number: removal.contract.number.clone(),
            relationship_id: removal.relationship.id,
            role: removal.relationship.role,
        },
        contract_changed(&removal.contract),
    ]
}

// =============================================================================
// TESTS
// =============================================================================
