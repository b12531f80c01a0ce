//! # Role Attribute Stores
//!
//! Satellite rows keyed by relationship id: label and percentage for a
//! beneficiary, label and status for a dependent. At most one row per
//! relationship; writes are upserts. Cross-relationship rules (allocation,
//! dependent limits) live in [`crate::validator`].

use crate::ledger::RelationshipLedger;
use crate::storage::{Collection, DocumentStore, DocumentStoreExt};
use crate::{
    AttributeId, BeneficiaryAttributes, DependentAttributes, DependentStatus, Percentage,
    PolicyError, Relationship, RelationshipId, RelationshipLabel, Role,
};
use std::collections::BTreeMap;

/// Role attribute rows over any [`DocumentStore`].
pub struct RoleAttributes;

impl RoleAttributes {
    /// Create or replace the beneficiary row of a relationship.
    pub fn set_beneficiary_attributes<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship_id: RelationshipId,
        label: RelationshipLabel,
        percentage: Percentage,
    ) -> Result<BeneficiaryAttributes, PolicyError> {
        Self::require_role(store, relationship_id, Role::Beneficiary)?;

        let id = match Self::beneficiary_attributes(store, relationship_id)? {
            Some(existing) => existing.id,
            None => AttributeId(store.allocate_id(Collection::BeneficiaryAttributes)?),
        };
        let row = BeneficiaryAttributes {
            id,
            relationship_id,
            label,
            percentage,
        };
        store.persist(&row)?;
        tracing::debug!(
            relationship_id = relationship_id.0,
            %label,
            %percentage,
            "beneficiary attributes set"
        );
        Ok(row)
    }

    /// Create or replace the dependent row of a relationship.
    pub fn set_dependent_attributes<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship_id: RelationshipId,
        label: RelationshipLabel,
        status: DependentStatus,
    ) -> Result<DependentAttributes, PolicyError> {
        Self::require_role(store, relationship_id, Role::Dependent)?;

        let id = match Self::dependent_attributes(store, relationship_id)? {
            Some(existing) => existing.id,
            None => AttributeId(store.allocate_id(Collection::DependentAttributes)?),
        };
        let row = DependentAttributes {
            id,
            relationship_id,
            label,
            status,
        };
        store.persist(&row)?;
        tracing::debug!(
            relationship_id = relationship_id.0,
            %label,
            %status,
            "dependent attributes set"
        );
        Ok(row)
    }

    pub fn beneficiary_attributes<S: DocumentStore + ?Sized>(
        store: &S,
        relationship_id: RelationshipId,
    ) -> Result<Option<BeneficiaryAttributes>, PolicyError> {
        let rows = store.fetch_where(|row: &BeneficiaryAttributes| {
            row.relationship_id == relationship_id
        })?;
        Ok(rows.into_iter().next())
    }

    pub fn dependent_attributes<S: DocumentStore + ?Sized>(
        store: &S,
        relationship_id: RelationshipId,
    ) -> Result<Option<DependentAttributes>, PolicyError> {
        let rows = store
            .fetch_where(|row: &DependentAttributes| row.relationship_id == relationship_id)?;
        Ok(rows.into_iter().next())
    }

    /// Every beneficiary row, keyed by relationship id.
    pub fn beneficiary_index<S: DocumentStore + ?Sized>(
        store: &S,
    ) -> Result<BTreeMap<RelationshipId, BeneficiaryAttributes>, PolicyError> {
        Ok(store
            .fetch_all::<BeneficiaryAttributes>()?
            .into_iter()
            .map(|row| (row.relationship_id, row))
            .collect())
    }

    /// Every dependent row, keyed by relationship id.
    pub fn dependent_index<S: DocumentStore + ?Sized>(
        store: &S,
    ) -> Result<BTreeMap<RelationshipId, DependentAttributes>, PolicyError> {
        Ok(store
            .fetch_all::<DependentAttributes>()?
            .into_iter()
            .map(|row| (row.relationship_id, row))
            .collect())
    }

    /// Delete the beneficiary rows of a relationship. Returns how many went.
    pub fn delete_beneficiary_attributes_for<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship_id: RelationshipId,
    ) -> Result<usize, PolicyError> {
        let rows = store.fetch_where(|row: &BeneficiaryAttributes| {
            row.relationship_id == relationship_id
        })?;
        let mut deleted = 0;
        for row in rows {
            if store.erase::<BeneficiaryAttributes>(row.id.0)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Delete the dependent rows of a relationship. Returns how many went.
    pub fn delete_dependent_attributes_for<S: DocumentStore + ?Sized>(
        store: &mut S,
        relationship_id: RelationshipId,
    ) -> Result<usize, PolicyError> {
        let rows = store
            .fetch_where(|row: &DependentAttributes| row.relationship_id == relationship_id)?;
        let mut deleted = 0;
        for row in rows {
            if store.erase::<DependentAttributes>(row.id.0)? {
                deleted += 1;
            }
        }
        Ok(deleted)
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
}
