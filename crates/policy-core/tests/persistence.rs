//! # Persistence Tests
//!
//! The redb backend behind the engine survives a restart.

use policy_core::{
    Address, ContactMethod, ContractStatus, EngineConfig, IdType, Money, Percentage, Person,
    Plan, PlanId, PolicyEngine, Prefill, RelationshipLabel, Role, StaticCatalog,
};
use std::sync::Arc;

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

#[tokio::test]
async fn ledger_survives_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = EngineConfig {
        database: Some(dir.path().join("ledger.redb")),
        ..EngineConfig::default()
    };

    let (number, beneficiary_id) = {
        let engine = PolicyEngine::open(config.clone(), catalog()).expect("open engine");
        let number = engine
            .open_contract(PlanId::new("family-basic"), Vec::new(), main_member())
            .await
            .expect("open contract")
            .contract
            .number;
        let added = engine
            .add_beneficiary(
                &number,
                Person::new(IdType::NationalId, "8503150123086", "Naledi", "Mokoena"),
                RelationshipLabel::Spouse,
                Percentage::FULL,
            )
            .await
            .expect("add");
        engine.finalize_contract(&number).await.expect("finalize");
        (number, added.relationship.id)
    };

    let engine = PolicyEngine::open(config, catalog()).expect("reopen engine");

    let view = engine.build_contract_view(&number).await.expect("view");
    assert_eq!(view.contract.status, ContractStatus::InForce);
    assert_eq!(view.beneficiaries.len(), 1);
    assert_eq!(view.beneficiaries[0].relationship.id, beneficiary_id);
    assert_eq!(
        view.beneficiaries[0].attributes.as_ref().map(|a| a.percentage),
        Some(Percentage::FULL)
    );

    match engine
        .prefill(IdType::NationalId, "8001015009087")
        .await
        .expect("prefill")
    {
        Prefill::Existing(record) => assert_eq!(record.person.first_name, "Thabo"),
        Prefill::Derived(_) => unreachable!("main member should be on record"),
    }

    // Ids keep counting after a restart.
    let amended = engine.amend_contract(&number).await.expect("amend");
    assert_eq!(amended.status, ContractStatus::Amended);
    let dependent = engine
        .add_dependent(
            &number,
            Person::new(IdType::NationalId, "1206150123083", "Lerato", "Mokoena"),
            RelationshipLabel::Child,
            policy_core::DependentStatus::Active,
        )
        .await
        .expect("dependent");
    assert!(dependent.relationship.id > beneficiary_id);
    assert_eq!(
        engine
            .list_relationships(&number, Some(Role::Dependent))
            .await
            .expect("list")
            .len(),
        1
    );
}
