//! # Allocation & Cardinality Validator
//!
//! Contract-wide rules that span several relationships:
//! - Beneficiary percentages never add up to more than 100%
//! - The dependent count stays within the plan's `max_dependents`
//! - A natural person appears at most once per role on a contract
//! - Nobody is beneficiary or dependent on their own contract
//!
//! Checks read first and decide afterwards. The engine runs each check and
//! the write it guards under one writer lock.

use crate::attributes::RoleAttributes;
use crate::catalog::Catalog;
use crate::contracts::ContractRegister;
use crate::identity::IdentityParser;
use crate::ledger::RelationshipLedger;
use crate::persons::PersonStore;
use crate::storage::DocumentStore;
use crate::{Allocation, ContractNumber, IdType, Percentage, PolicyError, RelationshipId, Role};

/// Stateless contract-wide checks.
pub struct AllocationValidator;

impl AllocationValidator {
    /// Sum of beneficiary percentages on a contract.
    ///
    /// A beneficiary without an attribute row counts as 0%.
    pub fn allocation_total<S: DocumentStore + ?Sized>(
        store: &S,
        contract_number: &ContractNumber,
    ) -> Result<Allocation, PolicyError> {
        Self::allocation_excluding(store, contract_number, None)
    }

    /// Total after adding `proposed`, failing with `AllocationExceeded` above 100%.
    ///
    /// `excluding` leaves one relationship out of the current sum, for edits.
    /// A total below 100% is accepted.
    pub fn check_beneficiary_allocation<S: DocumentStore + ?Sized>(
        store: &S,
        contract_number: &ContractNumber,
        proposed: Percentage,
        excluding: Option<RelationshipId>,
    ) -> Result<Allocation, PolicyError> {
        let total = Self::allocation_excluding(store, contract_number, excluding)?.add(proposed);
        if total.exceeds_limit() {
            tracing::debug!(contract = %contract_number, %total, "allocation rejected");
            return Err(PolicyError::AllocationExceeded {
                contract_number: contract_number.clone(),
                total,
            });
        }
        Ok(total)
    }

    /// Number of dependents on a contract, active or not.
    pub fn dependent_count<S: DocumentStore + ?Sized>(
        store: &S,
        contract_number: &ContractNumber,
    ) -> Result<u32, PolicyError> {
        let dependents =
            RelationshipLedger::list_by_contract(store, contract_number, Some(Role::Dependent))?;
        Ok(dependents.len() as u32)
    }

    /// Whether one more dependent fits the contract's plan.
    ///
    /// Any failure to resolve the contract or its plan answers `false`.
    pub fn check_dependent_limit<S: DocumentStore + ?Sized>(
        store: &S,
        catalog: &dyn Catalog,
        contract_number: &ContractNumber,
        current_count: u32,
    ) -> bool {
        let plan = ContractRegister::require(store, contract_number).and_then(|contract| {
            catalog
                .plan(&contract.plan_id)?
                .ok_or(PolicyError::UnknownPlan(contract.plan_id))
        });

        match plan {
            Ok(plan) => current_count < plan.max_dependents,
            Err(error) => {
                tracing::warn!(
                    contract = %contract_number,
                    error = %error,
                    "dependent limit unavailable, refusing"
                );
                false
            }
        }
    }

    /// Whether the natural person is already registered in `role` on the contract.
    pub fn check_duplicate_person<S: DocumentStore + ?Sized>(
        store: &S,
        contract_number: &ContractNumber,
        id_number: &str,
        id_type: IdType,
        role: Role,
    ) -> Result<bool, PolicyError> {
        let Some(person) = PersonStore::find_person(store, id_type, id_number)? else {
            return Ok(false);
        };
        let held = RelationshipLedger::list_by_contract(store, contract_number, Some(role))?;
        Ok(held.iter().any(|r| r.person_id == person.id))
    }

    /// Whether a beneficiary or dependent id is the main member's own id.
    ///
    /// Comparison ignores surrounding whitespace and letter case. An empty
    /// id never matches.
    #[must_use]
    pub fn check_same_as_main_member(id_number: &str, main_member_id_number: &str) -> bool {
        let candidate = IdentityParser::normalize(id_number, IdType::Passport);
        let main = IdentityParser::normalize(main_member_id_number, IdType::Passport);
        !candidate.is_empty() && candidate == main
    }

    fn allocation_excluding<S: DocumentStore + ?Sized>(
        store: &S,
        contract_number: &ContractNumber,
        excluding: Option<RelationshipId>,
    ) -> Result<Allocation, PolicyError> {
        let beneficiaries =
            RelationshipLedger::list_by_contract(store, contract_number, Some(Role::Beneficiary))?;
        let rows = RoleAttributes::beneficiary_index(store)?;

        Ok(beneficiaries
            .iter()
            .filter(|r| Some(r.id) != excluding)
            .filter_map(|r| rows.get(&r.id))
            .fold(Allocation::ZERO, |total, row| total.add(row.percentage)))
    }
}

// =============================================================================
// TESTS
// =============================================================================
