//! # Contract Edit Flows
//!
//! The multi-step edits a user performs on a contract, each composed from
//! the ledger, the attribute stores, the validator and the register.
//!
//! Every flow checks all rules before its first write. The contract is
//! marked edited next, before any person, relationship or attribute write,
//! so a failing register leaves the ledger untouched. When a later write
//! fails, earlier writes of the same flow are undone where that is possible
//! (a relationship whose attribute row could not be written is detached; a
//! contract whose main member could not be attached is deleted). Person
//! upserts are never undone: persons are shared and an upsert is idempotent.

use crate::aggregator::ContractAggregator;
use crate::attributes::RoleAttributes;
use crate::catalog::Catalog;
use crate::contracts::ContractRegister;
use crate::identity::IdentityReport;
use crate::ledger::RelationshipLedger;
use crate::numbering::ContractNumbers;
use crate::persons::PersonStore;
use crate::storage::DocumentStore;
use crate::validator::AllocationValidator;
use crate::{
    BeneficiaryAttributes, Contract, ContractNumber, ContractStatus, DependentAttributes,
    DependentStatus, OptionId, Percentage, Person, PersonRecord, PlanId, PolicyError,
    Relationship, RelationshipId, RelationshipLabel, Role,
};
use chrono::Utc;
use rand::Rng;

/// A newly opened contract with its main member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedContract {
    pub contract: Contract,
    pub main_member: PersonRecord,
    pub relationship: Relationship,
}

/// Result of adding or editing a beneficiary or dependent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange<A> {
    pub contract: Contract,
    pub person: PersonRecord,
    pub relationship: Relationship,
    pub attributes: A,
}

/// Result of removing a beneficiary or dependent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub contract: Contract,
    pub relationship: Relationship,
}

/// Result of editing the main member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainMemberChange {
    pub contract: Contract,
    pub person: PersonRecord,
    pub relationship: Relationship,
    /// `true` when the contract had no main member before.
    pub attached: bool,
}

/// Composite edits over any [`DocumentStore`].
pub struct ContractFlows;

impl ContractFlows {
    // =========================================================================
    // CONTRACT LIFECYCLE
    // =========================================================================

    /// Open a contract for a main member on a plan.
    ///
    /// Plan, options, identity and main-member conflicts are all checked
    /// before the contract is created.
    pub fn open_contract<S: DocumentStore + ?Sized, R: Rng + ?Sized>(
        store: &mut S,
        catalog: &dyn Catalog,
        rng: &mut R,
        number_attempts: u32,
        plan_id: PlanId,
        option_ids: Vec<OptionId>,
        main_member: Person,
    ) -> Result<OpenedContract, PolicyError> {
        if catalog.plan(&plan_id)?.is_none() {
            return Err(PolicyError::UnknownPlan(plan_id));
        }
        Self::resolve_options(catalog, &option_ids)?;

        let report = PersonStore::verify(main_member.id_type, &main_member.id_number)?;
        if let Some(existing) = PersonStore::find_person(store, report.id_type, &report.id_number)?
        {
            if let Some(held) = RelationshipLedger::main_membership_of(store, existing.id)? {
                return Err(PolicyError::MainMemberConflict {
                    person_id: existing.id,
                    existing: held.contract_number,
                });
            }
        }

        let number = ContractNumbers::generate_unique(store, rng, Utc::now(), number_attempts)?;
        let contract = ContractRegister::create(store, number, plan_id, option_ids)?;

        let attached = PersonStore::upsert_person(store, main_member).and_then(|person| {
            RelationshipLedger::attach(store, person.id, &contract.number, Role::MainMember)
                .map(|relationship| (person, relationship))
        });
        match attached {
            Ok((main_member, relationship)) => Ok(OpenedContract {
                contract,
                main_member,
                relationship,
            }),
            Err(error) => {
                tracing::warn!(
                    contract = %contract.number,
                    error = %error,
                    "main member not attached, deleting contract"
                );
                if let Err(cleanup) = ContractRegister::delete(store, &contract.number) {
                    tracing::warn!(contract = %contract.number, error = %cleanup, "contract cleanup failed");
                }
                Err(error)
            }
        }
    }

    /// Select another plan. Fails with `DependentLimitReached` when the
    /// contract already holds more dependents than the plan allows.
    pub fn select_plan<S: DocumentStore + ?Sized>(
        store: &mut S,
        catalog: &dyn Catalog,
        contract_number: &ContractNumber,
        plan_id: PlanId,
    ) -> Result<Contract, PolicyError> {
        ContractRegister::ensure_editable(store, contract_number)?;
        let Some(plan) = catalog.plan(&plan_id)? else {
            return Err(PolicyError::UnknownPlan(plan_id));
        };

        let current = AllocationValidator::dependent_count(store, contract_number)?;
        if current > plan.max_dependents {
            return Err(PolicyError::DependentLimitReached {
                contract_number: contract_number.clone(),
                current,
            });
        }

        ContractRegister::set_plan(store, contract_number, plan_id)?;
        ContractRegister::mark_edited(store, contract_number)
    }

    /// Replace the selected add-on options. Every option must resolve.
    pub fn set_options<S: DocumentStore + ?Sized>(
        store: &mut S,
        catalog: &dyn Catalog,
        contract_number: &ContractNumber,
        option_ids: Vec<OptionId>,
    ) -> Result<Contract, PolicyError> {
        ContractRegister::ensure_editable(store, contract_number)?;
        Self::resolve_options(catalog, &option_ids)?;

        ContractRegister::set_options(store, contract_number, option_ids)?;
        ContractRegister::mark_edited(store, contract_number)
    }

    pub fn finalize_contract<S: DocumentStore + ?Sized>(
        store: &mut S,
        catalog: &dyn Catalog,
        contract_number: &ContractNumber,
    ) -> Result<Contract, PolicyError> {
        ContractAggregator::finalize_contract(store, catalog, contract_number)
    }

    /// Reopen an in-force contract for edits.
    pub fn amend_contract<S: DocumentStore + ?Sized>(
        store: &mut S,
        contract_number: &ContractNumber,
    ) -> Result<Contract, PolicyError> {
        ContractRegister::transition(store, contract_number, ContractStatus::Amended)
    }

    // =========================================================================
    // MAIN MEMBER
    // =========================================================================

    /// Update the main member's details, or attach one to a contract that has none.
    ///
    /// The main member of a contract cannot be swapped for another person.
    pub fn update_main_member<S: DocumentStore + ?Sized>(
        store: &mut S,
        contract_number: &ContractNumber,
        person: Person,
    ) -> Result<MainMemberChange, PolicyError> {
        ContractRegister::ensure_editable(store, contract_number)?;
        let report = PersonStore::verify(person.id_type, &person.id_number)?;

        let current = RelationshipLedger::main_member_of(store, contract_number)?;
        match &current {
            Some(relationship) => {
                let holder = PersonStore::require_person(store, relationship.person_id)?;
                if !Self::same_key(&holder, &report) {
                    return Err(PolicyError::MainMemberAlreadyAssigned(contract_number.clone()));
                }
            }
            None => {
                if let Some(existing) =
                    PersonStore::find_person(store, report.id_type, &report.id_number)?
                {
                    if let Some(held) = RelationshipLedger::main_membership_of(store, existing.id)? {
                        return Err(PolicyError::MainMemberConflict {
                            person_id: existing.id,
                            existing: held.contract_number,
                        });
                    }
                }
            }
        }

        let contract = ContractRegister::mark_edited(store, contract_number)?;
        let record = PersonStore::upsert_person(store, person)?;
        let (relationship, attached) = match current {
            Some(relationship) => (relationship, false),
            None => (
                RelationshipLedger::attach(store, record.id, contract_number, Role::MainMember)?,
                true,
            ),
        };
        Ok(MainMemberChange {
            contract,
            person: record,
            relationship,
            attached,
        })
    }

    // =========================================================================
    // BENEFICIARIES
    // =========================================================================

    pub fn add_beneficiary<S: DocumentStore + ?Sized>(
        store: &mut S,
        contract_number: &ContractNumber,
        person: Person,
        label: RelationshipLabel,
        percentage: Percentage,
    ) -> Result<RoleChange<BeneficiaryAttributes>, PolicyError> {
        ContractRegister::ensure_editable(store, contract_number)?;
        Self::screen_candidate(store, contract_number, &person)?;
        AllocationValidator::check_beneficiary_allocation(store, contract_number, percentage, None)?;

        let contract = ContractRegister::mark_edited(store, contract_number)?;
        let record = PersonStore::upsert_person(store, person)?;
        let relationship =
            RelationshipLedger::attach(store, record.id, contract_number, Role::Beneficiary)?;
        let attributes = match RoleAttributes::set_beneficiary_attributes(
            store,
            relationship.id,
            label,
            percentage,
        ) {
            Ok(attributes) => attributes,
            Err(error) => return Err(Self::roll_back(store, &relationship, error)),
        };

        Ok(RoleChange {
            contract,
            person: record,
            relationship,
            attributes,
        })
    }

    /// Edit a beneficiary. The allocation check leaves the edited row out of
    /// the current total.
    pub fn update_beneficiary<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship_id: RelationshipId,
        person: Person,
        label: RelationshipLabel,
        percentage: Percentage,
    ) -> Result<RoleChange<BeneficiaryAttributes>, PolicyError> {
        let relationship = Self::require_role(store, relationship_id, Role::Beneficiary)?;
        let contract_number = relationship.contract_number.clone();
        ContractRegister::ensure_editable(store, &contract_number)?;
        Self::screen_replacement(store, &relationship, &person)?;
        AllocationValidator::check_beneficiary_allocation(
            store,
            &contract_number,
            percentage,
            Some(relationship_id),
        )?;

        let contract = ContractRegister::mark_edited(store, &contract_number)?;
        let record = PersonStore::upsert_person(store, person)?;
        let relationship = Self::point_at(store, relationship, &record)?;
        let attributes =
            RoleAttributes::set_beneficiary_attributes(store, relationship_id, label, percentage)?;

        Ok(RoleChange {
            contract,
            person: record,
            relationship,
            attributes,
        })
    }

    pub fn remove_beneficiary<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship_id: RelationshipId,
    ) -> Result<Removal, PolicyError> {
        Self::remove_role(store, relationship_id, Role::Beneficiary)
    }

    // =========================================================================
    // DEPENDENTS
    // =========================================================================

    /// Add a dependent. Fails with `DependentLimitReached` when the plan is full.
    pub fn add_dependent<S: DocumentStore + ?Sized>(
        store: &mut S,
        catalog: &dyn Catalog,
        contract_number: &ContractNumber,
        person: Person,
        label: RelationshipLabel,
        status: DependentStatus,
    ) -> Result<RoleChange<DependentAttributes>, PolicyError> {
        ContractRegister::ensure_editable(store, contract_number)?;
        Self::screen_candidate(store, contract_number, &person)?;

        let current = AllocationValidator::dependent_count(store, contract_number)?;
        if !AllocationValidator::check_dependent_limit(store, catalog, contract_number, current) {
            return Err(PolicyError::DependentLimitReached {
                contract_number: contract_number.clone(),
                current,
            });
        }

        let contract = ContractRegister::mark_edited(store, contract_number)?;
        let record = PersonStore::upsert_person(store, person)?;
        let relationship =
            RelationshipLedger::attach(store, record.id, contract_number, Role::Dependent)?;
        let attributes =
            match RoleAttributes::set_dependent_attributes(store, relationship.id, label, status) {
                Ok(attributes) => attributes,
                Err(error) => return Err(Self::roll_back(store, &relationship, error)),
            };

        Ok(RoleChange {
            contract,
            person: record,
            relationship,
            attributes,
        })
    }

    pub fn update_dependent<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship_id: RelationshipId,
        person: Person,
        label: RelationshipLabel,
        status: DependentStatus,
    ) -> Result<RoleChange<DependentAttributes>, PolicyError> {
        let relationship = Self::require_role(store, relationship_id, Role::Dependent)?;
        let contract_number = relationship.contract_number.clone();
        ContractRegister::ensure_editable(store, &contract_number)?;
        Self::screen_replacement(store, &relationship, &person)?;

        let contract = ContractRegister::mark_edited(store, &contract_number)?;
        let record = PersonStore::upsert_person(store, person)?;
        let relationship = Self::point_at(store, relationship, &record)?;
        let attributes =
            RoleAttributes::set_dependent_attributes(store, relationship_id, label, status)?;

        Ok(RoleChange {
            contract,
            person: record,
            relationship,
            attributes,
        })
    }

    pub fn remove_dependent<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship_id: RelationshipId,
    ) -> Result<Removal, PolicyError> {
        Self::remove_role(store, relationship_id, Role::Dependent)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn resolve_options(catalog: &dyn Catalog, option_ids: &[OptionId]) -> Result<(), PolicyError> {
        for option_id in option_ids {
            if catalog.option(option_id)?.is_none() {
                return Err(PolicyError::UnknownOption(option_id.clone()));
            }
        }
        Ok(())
    }

    /// Identity, main-member and duplicate checks for a new beneficiary or dependent.
    fn screen_candidate<S: DocumentStore + ?Sized>(
        store: &S,
        contract_number: &ContractNumber,
        person: &Person,
    ) -> Result<IdentityReport, PolicyError> {
        let report = PersonStore::verify(person.id_type, &person.id_number)?;

        if let Some(main) = RelationshipLedger::main_member_of(store, contract_number)? {
            let main_person = PersonStore::require_person(store, main.person_id)?;
            if main_person.person.id_type == report.id_type
                && AllocationValidator::check_same_as_main_member(
                    &report.id_number,
                    &main_person.person.id_number,
                )
            {
                return Err(PolicyError::SameAsMainMember {
                    id_number: report.id_number,
                    contract_number: contract_number.clone(),
                });
            }
        }

        for role in [Role::Beneficiary, Role::Dependent] {
            if AllocationValidator::check_duplicate_person(
                store,
                contract_number,
                &report.id_number,
                report.id_type,
                role,
            )? {
                return Err(PolicyError::DuplicatePerson {
                    id_number: report.id_number,
                    role,
                    contract_number: contract_number.clone(),
                });
            }
        }
        Ok(report)
    }

    /// Screen the person of an edit; only a changed identity is re-checked.
    fn screen_replacement<S: DocumentStore + ?Sized>(
        store: &S,
        relationship: &Relationship,
        person: &Person,
    ) -> Result<(), PolicyError> {
        let current = PersonStore::require_person(store, relationship.person_id)?;
        let report = PersonStore::verify(person.id_type, &person.id_number)?;
        if !Self::same_key(&current, &report) {
            Self::screen_candidate(store, &relationship.contract_number, person)?;
        }
        Ok(())
    }

    /// Re-point a relationship at another person after an identity change.
    fn point_at<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship: Relationship,
        record: &PersonRecord,
    ) -> Result<Relationship, PolicyError> {
        if relationship.person_id == record.id {
            return Ok(relationship);
        }
        RelationshipLedger::reassign(store, relationship.id, record.id)
    }

    fn same_key(current: &PersonRecord, report: &IdentityReport) -> bool {
        current.person.id_type == report.id_type && current.person.id_number == report.id_number
    }

    fn require_role<S: DocumentStore + ?Sized>(
        store: &S,
        relationship_id: RelationshipId,
        expected: Role,
    ) -> Result<Relationship, PolicyError> {
        let relationship = RelationshipLedger::require(store, relationship_id)?;
        if relationship.role != expected {
            return Err(PolicyError::RoleMismatch {
                relationship_id,
                expected,
                actual: relationship.role,
            });
        }
        Ok(relationship)
    }

    fn remove_role<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship_id: RelationshipId,
        expected: Role,
    ) -> Result<Removal, PolicyError> {
        let relationship = Self::require_role(store, relationship_id, expected)?;
        ContractRegister::ensure_editable(store, &relationship.contract_number)?;

        let contract = ContractRegister::mark_edited(store, &relationship.contract_number)?;
        let relationship = RelationshipLedger::detach(store, relationship_id)?;
        Ok(Removal {
            contract,
            relationship,
        })
    }

    /// Detach a relationship whose attribute row could not be written.
    fn roll_back<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship: &Relationship,
        error: PolicyError,
    ) -> PolicyError {
        tracing::warn!(
            relationship_id = relationship.id.0,
            error = %error,
            "attribute write failed, detaching relationship"
        );
        if let Err(cleanup) = RelationshipLedger::detach(store, relationship.id) {
            tracing::warn!(
                relationship_id = relationship.id.0,
                error = %cleanup,
                "rollback detach failed"
            );
        }
        error
    }
}

// =============================================================================
// TESTS
// =============================================================================
