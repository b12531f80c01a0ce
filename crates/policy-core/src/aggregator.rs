//! # Contract Aggregator
//!
//! Joins a contract with its people, roles, plan and options at read time,
//! and decides whether the contract is complete enough to finalize.
//!
//! A contract is complete when:
//! - Beneficiary allocation is exactly 100%
//! - A main member is attached and has every required personal field
//! - At least one beneficiary is attached

use crate::attributes::RoleAttributes;
use crate::catalog::{AddOnOption, Catalog, Plan};
use crate::contracts::ContractRegister;
use crate::ledger::RelationshipLedger;
use crate::persons::PersonStore;
use crate::storage::DocumentStore;
use crate::{
    Allocation, BeneficiaryAttributes, CompletenessGap, Contract, ContractNumber, ContractStatus,
    DependentAttributes, Money, OptionId, PersonRecord, PolicyError, Relationship, Role,
};

/// The main member with their person record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEntry {
    pub relationship: Relationship,
    pub person: PersonRecord,
}

/// A beneficiary with their person record and attribute row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeneficiaryEntry {
    pub relationship: Relationship,
    pub person: PersonRecord,
    pub attributes: Option<BeneficiaryAttributes>,
}

/// A dependent with their person record and attribute row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentEntry {
    pub relationship: Relationship,
    pub person: PersonRecord,
    pub attributes: Option<DependentAttributes>,
}

/// Everything known about one contract, assembled at read time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractView {
    pub contract: Contract,
    /// `None` when the catalog no longer knows the selected plan.
    pub plan: Option<Plan>,
    pub options: Vec<AddOnOption>,
    /// Selected option ids the catalog could not resolve.
    pub unresolved_options: Vec<OptionId>,
    pub main_member: Option<MemberEntry>,
    pub beneficiaries: Vec<BeneficiaryEntry>,
    pub dependents: Vec<DependentEntry>,
    /// Plan premium plus option prices.
    pub monthly_cost: Money,
    pub allocation: Allocation,
    /// Why the contract cannot be finalized yet; empty when complete.
    pub gaps: Vec<CompletenessGap>,
}

impl ContractView {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Read-time joins and finalization.
pub struct ContractAggregator;

impl ContractAggregator {
    /// Assemble the full view of a contract.
    pub fn build_contract_view<S: DocumentStore + ?Sized>(
        store: &S,
        catalog: &dyn Catalog,
        contract_number: &ContractNumber,
    ) -> Result<ContractView, PolicyError> {
        let contract = ContractRegister::require(store, contract_number)?;

        let plan = catalog.plan(&contract.plan_id)?;
        let mut options = Vec::new();
        let mut unresolved_options = Vec::new();
        for option_id in &contract.option_ids {
            match catalog.option(option_id)? {
                Some(option) => options.push(option),
                None => unresolved_options.push(option_id.clone()),
            }
        }

        let beneficiary_rows = RoleAttributes::beneficiary_index(store)?;
        let dependent_rows = RoleAttributes::dependent_index(store)?;

        let mut main_member = None;
        let mut beneficiaries = Vec::new();
        let mut dependents = Vec::new();
        for relationship in RelationshipLedger::list_by_contract(store, contract_number, None)? {
            let person = PersonStore::require_person(store, relationship.person_id)?;
            match relationship.role {
                Role::MainMember => {
                    main_member = Some(MemberEntry {
                        relationship,
                        person,
                    });
                }
                Role::Beneficiary => beneficiaries.push(BeneficiaryEntry {
                    attributes: beneficiary_rows.get(&relationship.id).cloned(),
                    relationship,
                    person,
                }),
                Role::Dependent => dependents.push(DependentEntry {
                    attributes: dependent_rows.get(&relationship.id).cloned(),
                    relationship,
                    person,
                }),
            }
        }

        let monthly_cost = plan
            .as_ref()
            .map_or(Money::ZERO, |plan| plan.monthly_premium)
            .saturating_add(options.iter().map(|option| option.monthly_price).sum());

        let allocation = beneficiaries
            .iter()
            .filter_map(|entry| entry.attributes.as_ref())
            .fold(Allocation::ZERO, |total, row| total.add(row.percentage));

        let gaps = Self::completeness_gaps(allocation, main_member.as_ref(), beneficiaries.len());

        Ok(ContractView {
            contract,
            plan,
            options,
            unresolved_options,
            main_member,
            beneficiaries,
            dependents,
            monthly_cost,
            allocation,
            gaps,
        })
    }

    /// Move an in-progress or amended contract to `InForce`.
    ///
    /// Fails with `InvalidStatusTransition` from any other status and with
    /// `IncompleteContract` while gaps remain.
    pub fn finalize_contract<S: DocumentStore + ?Sized>(
        store: &mut S,
        catalog: &dyn Catalog,
        contract_number: &ContractNumber,
    ) -> Result<Contract, PolicyError> {
        let view = Self::build_contract_view(store, catalog, contract_number)?;
        let status = view.contract.status;
        if !status.can_transition_to(ContractStatus::InForce) {
            return Err(PolicyError::InvalidStatusTransition {
                contract_number: contract_number.clone(),
                from: status,
                to: ContractStatus::InForce,
            });
        }
        if !view.is_complete() {
            tracing::debug!(
                contract = %contract_number,
                gaps = view.gaps.len(),
                "finalize refused"
            );
            return Err(PolicyError::IncompleteContract {
                contract_number: contract_number.clone(),
                gaps: view.gaps,
            });
        }
        ContractRegister::transition(store, contract_number, ContractStatus::InForce)
    }

    fn completeness_gaps(
        allocation: Allocation,
        main_member: Option<&MemberEntry>,
        beneficiary_count: usize,
    ) -> Vec<CompletenessGap> {
        let mut gaps = Vec::new();
        if !allocation.is_complete() {
            gaps.push(CompletenessGap::AllocationNotFull(allocation));
        }
        match main_member {
            Some(entry) => gaps.extend(
                entry
                    .person
                    .person
                    .missing_required_fields()
                    .into_iter()
                    .map(CompletenessGap::MainMemberField),
            ),
            None => gaps.push(CompletenessGap::NoMainMember),
        }
        if beneficiary_count == 0 {
            gaps.push(CompletenessGap::NoBeneficiaries);
        }
        gaps
    }
}
