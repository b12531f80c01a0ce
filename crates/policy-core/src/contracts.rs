//! # Contract Register
//!
//! Creates contracts and drives their lifecycle:
//!
//! ```text
//! New ──► InProgress ──► InForce ◄──► Amended
//!  (first edit)   (finalize)    (amend / save)
//! ```
//!
//! The contract number is the natural key every relationship refers to. It
//! is assigned once by [`crate::numbering::ContractNumbers`] and never
//! changes.

use crate::storage::{Collection, DocumentStore, DocumentStoreExt};
use crate::{
    Contract, ContractId, ContractNumber, ContractStatus, OptionId, PlanId, PolicyError,
};
use chrono::Utc;

/// Contract documents over any [`DocumentStore`].
pub struct ContractRegister;

impl ContractRegister {
    pub fn find<S: DocumentStore + ?Sized>(
        store: &S,
        number: &ContractNumber,
    ) -> Result<Option<Contract>, PolicyError> {
        let mut matches = store.fetch_where(|contract: &Contract| contract.number == *number)?;
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0))
        })
    }

    /// Like [`Self::find`], failing with `ContractNotFound`.
    pub fn require<S: DocumentStore + ?Sized>(
        store: &S,
        number: &ContractNumber,
    ) -> Result<Contract, PolicyError> {
        Self::find(store, number)?.ok_or_else(|| PolicyError::ContractNotFound(number.clone()))
    }

    /// Every contract, in creation order.
    pub fn list<S: DocumentStore + ?Sized>(store: &S) -> Result<Vec<Contract>, PolicyError> {
        store.fetch_all()
    }

    /// Store a new contract in status `New`.
    pub fn create<S: DocumentStore + ?Sized>(
        store: &mut S,
        number: ContractNumber,
        plan_id: PlanId,
        option_ids: Vec<OptionId>,
    ) -> Result<Contract, PolicyError> {
        let now = Utc::now();
        let contract = Contract {
            id: ContractId(store.allocate_id(Collection::Contracts)?),
            number,
            plan_id,
            option_ids,
            status: ContractStatus::New,
            created_at: now,
            updated_at: now,
        };
        store.persist(&contract)?;
        tracing::debug!(contract = %contract.number, plan = %contract.plan_id, "contract created");
        Ok(contract)
    }

    /// Move a contract to `next` if the state machine allows it.
    pub fn transition<S: DocumentStore + ?Sized>(
        store: &mut S,
        number: &ContractNumber,
        next: ContractStatus,
    ) -> Result<Contract, PolicyError> {
        let mut contract = Self::require(store, number)?;
        if !contract.status.can_transition_to(next) {
            return Err(PolicyError::InvalidStatusTransition {
                contract_number: number.clone(),
                from: contract.status,
                to: next,
            });
        }

        let from = contract.status;
        contract.status = next;
        contract.updated_at = Utc::now();
        store.persist(&contract)?;
        tracing::info!(contract = %number, %from, to = %next, "contract status changed");
        Ok(contract)
    }

    /// Load a contract that may be edited, failing with `ContractNotEditable`.
    pub fn ensure_editable<S: DocumentStore + ?Sized>(
        store: &S,
        number: &ContractNumber,
    ) -> Result<Contract, PolicyError> {
        let contract = Self::require(store, number)?;
        if !contract.status.is_editable() {
            return Err(PolicyError::ContractNotEditable {
                contract_number: number.clone(),
                status: contract.status,
            });
        }
        Ok(contract)
    }

    /// Record a successful edit. The first edit of a `New` contract moves it
    /// to `InProgress`.
    pub fn mark_edited<S: DocumentStore + ?Sized>(
        store: &mut S,
        number: &ContractNumber,
    ) -> Result<Contract, PolicyError> {
        let mut contract = Self::require(store, number)?;
        if contract.status == ContractStatus::New {
            return Self::transition(store, number, ContractStatus::InProgress);
        }
        contract.updated_at = Utc::now();
        store.persist(&contract)?;
        Ok(contract)
    }

    /// Replace the selected plan.
    pub fn set_plan<S: DocumentStore + ?Sized>(
        store: &mut S,
        number: &ContractNumber,
        plan_id: PlanId,
    ) -> Result<Contract, PolicyError> {
        let mut contract = Self::require(store, number)?;
        contract.plan_id = plan_id;
        contract.updated_at = Utc::now();
        store.persist(&contract)?;
        tracing::debug!(contract = %number, plan = %contract.plan_id, "plan selected");
        Ok(contract)
    }

    /// Replace the selected add-on options.
    pub fn set_options<S: DocumentStore + ?Sized>(
        store: &mut S,
        number: &ContractNumber,
        option_ids: Vec<OptionId>,
    ) -> Result<Contract, PolicyError> {
        let mut contract = Self::require(store, number)?;
        contract.option_ids = option_ids;
        contract.updated_at = Utc::now();
        store.persist(&contract)?;
        tracing::debug!(
            contract = %number,
            options = contract.option_ids.len(),
            "options selected"
        );
        Ok(contract)
    }

    /// Delete a contract document. Only used to undo a half-opened contract.
    pub fn delete<S: DocumentStore + ?Sized>(
        store: &mut S,
        number: &ContractNumber,
    ) -> Result<bool, PolicyError> {
        match Self::find(store, number)? {
            Some(contract) => store.erase::<Contract>(contract.id.0),
            None => Ok(false),
        }
    }
}
