//! # Relationship Ledger
//!
//! The many-to-many association between persons and contracts.
//!
//! The store enforces no references, so every write here checks them first:
//! - The person and the contract exist before a relationship is created
//! - A person is main member of at most one contract, system-wide
//! - A contract has at most one main member
//! - A person holds at most one relationship on a given contract
//!
//! Removal is children-first: beneficiary rows, dependent rows, then the
//! relationship itself. A failure part-way is reported with the steps that
//! completed; repeating the removal finishes the job.

use crate::attributes::RoleAttributes;
use crate::contracts::ContractRegister;
use crate::persons::PersonStore;
use crate::storage::{Collection, DocumentStore, DocumentStoreExt};
use crate::{
    BeneficiaryAttributes, ContractNumber, DependentAttributes, PersonId, PolicyError,
    Relationship, RelationshipId, RemovalStep, Role,
};
use chrono::Utc;

/// A relationship joined with its attribute row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub relationship: Relationship,
    pub beneficiary: Option<BeneficiaryAttributes>,
    pub dependent: Option<DependentAttributes>,
}

/// Relationship documents over any [`DocumentStore`].
pub struct RelationshipLedger;

impl RelationshipLedger {
    /// Bind a person to a contract under a role.
    pub fn attach<S: DocumentStore + ?Sized>(
        store: &mut S,
        person_id: PersonId,
        contract_number: &ContractNumber,
        role: Role,
    ) -> Result<Relationship, PolicyError> {
        let person = PersonStore::require_person(store, person_id)?;
        ContractRegister::require(store, contract_number)?;

        let on_contract = Self::list_by_contract(store, contract_number, None)?;

        if on_contract
            .iter()
            .any(|r| r.person_id == person_id && r.role == role)
        {
            return Err(PolicyError::DuplicateRelationship {
                person_id,
                contract_number: contract_number.clone(),
                role,
            });
        }

        let main_member = on_contract.iter().find(|r| r.role == Role::MainMember);
        let other_role = on_contract.iter().find(|r| r.person_id == person_id);

        if role == Role::MainMember {
            if main_member.is_some() {
                return Err(PolicyError::MainMemberAlreadyAssigned(contract_number.clone()));
            }
            if other_role.is_some() {
                return Err(PolicyError::SameAsMainMember {
                    id_number: person.person.id_number,
                    contract_number: contract_number.clone(),
                });
            }
            if let Some(elsewhere) = Self::main_membership_of(store, person_id)? {
                return Err(PolicyError::MainMemberConflict {
                    person_id,
                    existing: elsewhere.contract_number,
                });
            }
        } else {
            if main_member.is_some_and(|m| m.person_id == person_id) {
                return Err(PolicyError::SameAsMainMember {
                    id_number: person.person.id_number,
                    contract_number: contract_number.clone(),
                });
            }
            if let Some(existing) = other_role {
                return Err(PolicyError::DuplicatePerson {
                    id_number: person.person.id_number,
                    role: existing.role,
                    contract_number: contract_number.clone(),
                });
            }
        }

        let relationship = Relationship {
            id: RelationshipId(store.allocate_id(Collection::Relationships)?),
            person_id,
            contract_number: contract_number.clone(),
            role,
            created_at: Utc::now(),
        };
        store.persist(&relationship)?;
        tracing::debug!(
            relationship_id = relationship.id.0,
            person_id = person_id.0,
            contract = %contract_number,
            %role,
            "relationship attached"
        );
        Ok(relationship)
    }

    /// Remove a relationship and its attribute rows, children first.
    pub fn detach<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship_id: RelationshipId,
    ) -> Result<Relationship, PolicyError> {
        let relationship = Self::require(store, relationship_id)?;
        let mut completed = Vec::with_capacity(3);

        let partial = |step: RemovalStep, completed: &[RemovalStep], error: PolicyError| {
            tracing::warn!(
                relationship_id = relationship_id.0,
                %step,
                error = %error,
                "relationship removal stopped part-way"
            );
            PolicyError::PartialRemovalFailure {
                relationship_id,
                contract_number: relationship.contract_number.clone(),
                step,
                completed: completed.to_vec(),
                message: error.to_string(),
            }
        };

        RoleAttributes::delete_beneficiary_attributes_for(store, relationship_id)
            .map_err(|e| partial(RemovalStep::BeneficiaryAttributes, &completed, e))?;
        completed.push(RemovalStep::BeneficiaryAttributes);

        RoleAttributes::delete_dependent_attributes_for(store, relationship_id)
            .map_err(|e| partial(RemovalStep::DependentAttributes, &completed, e))?;
        completed.push(RemovalStep::DependentAttributes);

        store
            .erase::<Relationship>(relationship_id.0)
            .map_err(|e| partial(RemovalStep::Relationship, &completed, e))?;

        tracing::debug!(
            relationship_id = relationship_id.0,
            contract = %relationship.contract_number,
            role = %relationship.role,
            "relationship detached"
        );
        Ok(relationship)
    }

    /// Point a beneficiary or dependent relationship at another person.
    ///
    /// The new person must not already be on the contract.
    pub fn reassign<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship_id: RelationshipId,
        person_id: PersonId,
    ) -> Result<Relationship, PolicyError> {
        let mut relationship = Self::require(store, relationship_id)?;
        if relationship.person_id == person_id {
            return Ok(relationship);
        }
        let person = PersonStore::require_person(store, person_id)?;

        let on_contract = Self::list_by_contract(store, &relationship.contract_number, None)?;
        if let Some(existing) = on_contract.iter().find(|r| r.person_id == person_id) {
            return Err(if existing.role == Role::MainMember {
                PolicyError::SameAsMainMember {
                    id_number: person.person.id_number,
                    contract_number: relationship.contract_number,
                }
            } else {
                PolicyError::DuplicatePerson {
                    id_number: person.person.id_number,
                    role: existing.role,
                    contract_number: relationship.contract_number,
                }
            });
        }
        if relationship.role == Role::MainMember {
            return Err(PolicyError::MainMemberAlreadyAssigned(
                relationship.contract_number,
            ));
        }

        relationship.person_id = person_id;
        store.persist(&relationship)?;
        tracing::debug!(
            relationship_id = relationship_id.0,
            person_id = person_id.0,
            "relationship reassigned"
        );
        Ok(relationship)
    }

    pub fn get<S: DocumentStore + ?Sized>(
        store: &S,
        relationship_id: RelationshipId,
    ) -> Result<Option<Relationship>, PolicyError> {
        store.fetch(relationship_id.0)
    }

    /// Like [`Self::get`], failing with `RelationshipNotFound`.
    pub fn require<S: DocumentStore + ?Sized>(
        store: &S,
        relationship_id: RelationshipId,
    ) -> Result<Relationship, PolicyError> {
        Self::get(store, relationship_id)?
            .ok_or(PolicyError::RelationshipNotFound(relationship_id))
    }

    /// Relationships of a contract, optionally of one role, in creation order.
    pub fn list_by_contract<S: DocumentStore + ?Sized>(
        store: &S,
        contract_number: &ContractNumber,
        role: Option<Role>,
    ) -> Result<Vec<Relationship>, PolicyError> {
        store.fetch_where(|r: &Relationship| {
            r.contract_number == *contract_number && role.is_none_or(|role| r.role == role)
        })
    }

    /// Relationships of a contract joined with their attribute rows.
    pub fn entries<S: DocumentStore + ?Sized>(
        store: &S,
        contract_number: &ContractNumber,
        role: Option<Role>,
    ) -> Result<Vec<LedgerEntry>, PolicyError> {
        let relationships = Self::list_by_contract(store, contract_number, role)?;
        let mut beneficiary_rows = RoleAttributes::beneficiary_index(store)?;
        let mut dependent_rows = RoleAttributes::dependent_index(store)?;

        Ok(relationships
            .into_iter()
            .map(|relationship| LedgerEntry {
                beneficiary: beneficiary_rows.remove(&relationship.id),
                dependent: dependent_rows.remove(&relationship.id),
                relationship,
            })
            .collect())
    }

    /// Relationships of a person across all contracts.
    pub fn list_by_person<S: DocumentStore + ?Sized>(
        store: &S,
        person_id: PersonId,
    ) -> Result<Vec<Relationship>, PolicyError> {
        store.fetch_where(|r: &Relationship| r.person_id == person_id)
    }

    /// The main member relationship of a contract.
    pub fn main_member_of<S: DocumentStore + ?Sized>(
        store: &S,
        contract_number: &ContractNumber,
    ) -> Result<Option<Relationship>, PolicyError> {
        Ok(Self::list_by_contract(store, contract_number, Some(Role::MainMember))?
            .into_iter()
            .next())
    }

    /// The contract a person is main member of, if any.
    pub fn main_membership_of<S: DocumentStore + ?Sized>(
        store: &S,
        person_id: PersonId,
    ) -> Result<Option<Relationship>, PolicyError> {
        Ok(Self::list_by_person(store, person_id)?
            .into_iter()
            .find(|r| r.role == Role::MainMember))
    }
}

// =============================================================================
// TESTS
// =============================================================================
