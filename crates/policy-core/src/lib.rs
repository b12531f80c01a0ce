//! # policy-core
//!
//! Relationship & allocation consistency engine for funeral-policy contracts.
//!
//! Persons are stored once and bound to contracts through relationships
//! carrying a role (main member, beneficiary or dependent). Role-specific
//! facts live in separate attribute documents. The document store underneath
//! has no foreign keys or transactions, so this crate enforces:
//!
//! - Identity numbers pass structural and checksum validation before storage
//! - One person record per `(id_type, id_number)`
//! - A person is main member of at most one contract
//! - Beneficiary allocation on a contract never exceeds 100%
//! - Dependents stay within the plan's limit
//! - Relationship removal deletes attribute rows first and is retry-safe
//! - A contract is finalized only when it is complete
//!
//! ## Layout
//!
//! The document layers (`persons`, `ledger`, `attributes`, `validator`,
//! `aggregator`, `flows`) are synchronous and generic over
//! [`storage::DocumentStore`]. [`PolicyEngine`] wraps them for async callers
//! with deadlines, change events and live queries.

// =============================================================================
// MODULES
// =============================================================================

pub mod aggregator;
pub mod attributes;
pub mod catalog;
pub mod config;
pub mod contracts;
pub mod engine;
pub mod events;
pub mod flows;
pub mod identity;
pub mod ledger;
pub mod numbering;
pub mod persons;
pub mod primitives;
pub mod storage;
pub mod types;
pub mod validator;
pub mod watch;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Address, Allocation, AttributeId, BeneficiaryAttributes, Citizenship, CompletenessGap,
    ContactKind, ContactMethod, Contract, ContractId, ContractNumber, ContractStatus,
    DependentAttributes, DependentStatus, Gender, IdType, Money, OptionId, Percentage, Person,
    PersonId, PersonRecord, PlanId, PolicyError, Relationship, RelationshipId, RelationshipLabel,
    RemovalStep, Role,
};

// =============================================================================
// RE-EXPORTS: Document Layers
// =============================================================================

pub use aggregator::{
    BeneficiaryEntry, ContractAggregator, ContractView, DependentEntry, MemberEntry,
};
pub use attributes::RoleAttributes;
pub use catalog::{AddOnOption, Catalog, Plan, StaticCatalog};
pub use contracts::ContractRegister;
pub use flows::{ContractFlows, MainMemberChange, OpenedContract, Removal, RoleChange};
pub use identity::{IdentityIssue, IdentityParser, IdentityReport};
pub use ledger::{LedgerEntry, RelationshipLedger};
pub use numbering::ContractNumbers;
pub use persons::{PersonStore, Prefill};
pub use storage::{
    Collection, Document, DocumentStore, DocumentStoreExt, MemoryStore, RedbStore, StoreBackend,
};
pub use validator::AllocationValidator;

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use config::EngineConfig;
pub use engine::PolicyEngine;
pub use events::{EventBus, LedgerEvent};
pub use watch::{ContractWatch, RelationshipWatch};
