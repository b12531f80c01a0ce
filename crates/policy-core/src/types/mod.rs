//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the policy core:
//! - Document identifiers (`PersonId`, `ContractId`, `RelationshipId`, `AttributeId`)
//! - Natural keys (`IdType`, `ContractNumber`) and reference-data keys (`PlanId`, `OptionId`)
//! - Closed enumerations (`Role`, `RelationshipLabel`, `DependentStatus`, `ContractStatus`, ...)
//! - Integer quantities (`Percentage`, `Allocation`, `Money`)
//! - Error types (`PolicyError`)
//!
//! ## Arithmetic
//!
//! All quantities are integers:
//! - Percentages are hundredths of a percent (`40%` is `4000`)
//! - Money is cents
//! - Aggregates use saturating arithmetic

mod records;

pub use records::{
    Address, BeneficiaryAttributes, ContactMethod, Contract, DependentAttributes, Person,
    PersonRecord, Relationship,
};

use crate::primitives::{FULL_ALLOCATION_HUNDREDTHS, HUNDREDTHS_PER_PERCENT};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// DOCUMENT IDENTIFIERS
// =============================================================================

/// Generated identifier of a document in the Persons collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonId(pub u64);

/// Generated identifier of a document in the Contracts collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractId(pub u64);

/// Generated identifier of a document in the Relationships collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub u64);

/// Generated identifier of a role attribute row (beneficiary or dependent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeId(pub u64);

// =============================================================================
// NATURAL KEYS
// =============================================================================

/// The kind of government identity document a person is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IdType {
    /// 13-digit national identity number (structurally validated).
    NationalId,
    /// Passport number (accepted as-is when non-empty).
    Passport,
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NationalId => f.write_str("National ID"),
            Self::Passport => f.write_str("Passport"),
        }
    }
}

/// The display number of a contract, e.g. `CNT-MB3K9Z2A-X7Q`.
///
/// Generated once when the contract is opened and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractNumber(pub String);

impl ContractNumber {
    /// Wrap an existing contract number.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the contract number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a plan in the externally owned catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub String);

impl PlanId {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of an add-on option in the externally owned catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(pub String);

impl OptionId {
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// PERSON FACTS
// =============================================================================

/// Gender as encoded in digits 7–10 of a national identity number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
}

/// Citizenship class as encoded in digit 11 of a national identity number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Citizenship {
    Citizen,
    PermanentResident,
    /// Any digit other than 0 or 1. Never produced by a valid identity number.
    Other,
}

/// Kind of a contact method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContactKind {
    Email,
    Phone,
}

// =============================================================================
// ROLES & ROLE ATTRIBUTES
// =============================================================================

/// The role a person holds on a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    MainMember,
    Beneficiary,
    Dependent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MainMember => f.write_str("main member"),
            Self::Beneficiary => f.write_str("beneficiary"),
            Self::Dependent => f.write_str("dependent"),
        }
    }
}

/// Relationship of a beneficiary or dependent to the main member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RelationshipLabel {
    Spouse,
    Child,
    Parent,
    Sibling,
    Other,
}

impl fmt::Display for RelationshipLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Spouse => "Spouse",
            Self::Child => "Child",
            Self::Parent => "Parent",
            Self::Sibling => "Sibling",
            Self::Other => "Other",
        };
        f.write_str(label)
    }
}

impl FromStr for RelationshipLabel {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spouse" => Ok(Self::Spouse),
            "child" => Ok(Self::Child),
            "parent" => Ok(Self::Parent),
            "sibling" => Ok(Self::Sibling),
            "other" => Ok(Self::Other),
            _ => Err(PolicyError::InvalidLabel(s.to_string())),
        }
    }
}

/// Cover status of a dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DependentStatus {
    Active,
    Inactive,
}

impl fmt::Display for DependentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("Active"),
            Self::Inactive => f.write_str("Inactive"),
        }
    }
}

impl FromStr for DependentStatus {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(PolicyError::InvalidStatus(s.to_string())),
        }
    }
}

// =============================================================================
// CONTRACT STATUS
// =============================================================================

/// Lifecycle status of a contract.
///
/// ```text
/// New ──► InProgress ──► InForce ◄──► Amended
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContractStatus {
    New,
    InProgress,
    InForce,
    Amended,
}

impl ContractStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::InProgress)
                | (Self::InProgress, Self::InForce)
                | (Self::InForce, Self::Amended)
                | (Self::Amended, Self::InForce)
        )
    }

    /// Whether relationships and attributes may be edited in this status.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        !matches!(self, Self::InForce)
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => f.write_str("New"),
            Self::InProgress => f.write_str("In Progress"),
            Self::InForce => f.write_str("In-Force"),
            Self::Amended => f.write_str("Amended"),
        }
    }
}

// =============================================================================
// PERCENTAGE
// =============================================================================

/// A benefit percentage in hundredths of a percent, always within `0..=100%`.
///
/// The range is enforced on construction, so a `Percentage` that exists is
/// already valid for a single attribute row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Percentage(u16);

impl Percentage {
    pub const ZERO: Self = Self(0);
    pub const FULL: Self = Self(FULL_ALLOCATION_HUNDREDTHS as u16);

    /// Create a percentage from hundredths (`3350` is `33.5%`).
    pub fn from_hundredths(hundredths: u32) -> Result<Self, PolicyError> {
        if hundredths > FULL_ALLOCATION_HUNDREDTHS {
            return Err(PolicyError::InvalidPercentage(format_hundredths(hundredths)));
        }
        Ok(Self(hundredths as u16))
    }

    /// Create a whole-number percentage.
    pub fn whole(percent: u32) -> Result<Self, PolicyError> {
        let hundredths = percent
            .checked_mul(HUNDREDTHS_PER_PERCENT)
            .ok_or_else(|| PolicyError::InvalidPercentage(percent.to_string()))?;
        Self::from_hundredths(hundredths)
    }

    /// Get the raw hundredths value.
    #[must_use]
    pub const fn hundredths(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hundredths(self.hundredths()))
    }
}

impl FromStr for Percentage {
    type Err = PolicyError;

    /// Parse `"40"`, `"33.5"`, `"12.25%"`. At most two fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PolicyError::InvalidPercentage(s.to_string());
        let text = s.trim().trim_end_matches('%').trim_end();
        let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
            || fraction.len() > 2
        {
            return Err(invalid());
        }

        let whole: u32 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let fraction: u32 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u32>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        let hundredths = whole
            .checked_mul(HUNDREDTHS_PER_PERCENT)
            .and_then(|w| w.checked_add(fraction))
            .ok_or_else(invalid)?;
        Self::from_hundredths(hundredths).map_err(|_| invalid())
    }
}

// =============================================================================
// ALLOCATION
// =============================================================================

/// Sum of beneficiary percentages on a contract, in hundredths.
///
/// Unlike [`Percentage`], an allocation may exceed 100% so that a proposed
/// total can be reported before it is rejected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Allocation(u32);

impl Allocation {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_hundredths(hundredths: u32) -> Self {
        Self(hundredths)
    }

    #[must_use]
    pub const fn hundredths(self) -> u32 {
        self.0
    }

    /// Add one beneficiary share (saturating).
    #[must_use]
    pub const fn add(self, share: Percentage) -> Self {
        Self(self.0.saturating_add(share.hundredths()))
    }

    /// Exactly 100%.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.0 == FULL_ALLOCATION_HUNDREDTHS
    }

    /// Strictly above 100%.
    #[must_use]
    pub const fn exceeds_limit(self) -> bool {
        self.0 > FULL_ALLOCATION_HUNDREDTHS
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hundredths(self.0))
    }
}

fn format_hundredths(hundredths: u32) -> String {
    let whole = hundredths / HUNDREDTHS_PER_PERCENT;
    let fraction = hundredths % HUNDREDTHS_PER_PERCENT;
    if fraction == 0 {
        format!("{whole}%")
    } else {
        format!("{whole}.{fraction:02}%")
    }
}

// =============================================================================
// MONEY
// =============================================================================

/// A monetary amount in cents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    #[must_use]
    pub const fn cents(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

// =============================================================================
// COMPLETENESS & REMOVAL STEPS
// =============================================================================

/// A reason a contract cannot be finalized yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletenessGap {
    /// Beneficiary allocation is not exactly 100%.
    AllocationNotFull(Allocation),
    /// No main member is attached.
    NoMainMember,
    /// The main member lacks a required personal field.
    MainMemberField(&'static str),
    /// No beneficiary is attached.
    NoBeneficiaries,
}

impl fmt::Display for CompletenessGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationNotFull(total) => write!(f, "beneficiary allocation is {total}"),
            Self::NoMainMember => f.write_str("no main member"),
            Self::MainMemberField(field) => write!(f, "main member {field} missing"),
            Self::NoBeneficiaries => f.write_str("no beneficiaries"),
        }
    }
}

/// One step of the relationship removal cascade, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RemovalStep {
    BeneficiaryAttributes,
    DependentAttributes,
    Relationship,
}

impl fmt::Display for RemovalStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeneficiaryAttributes => f.write_str("beneficiary attributes"),
            Self::DependentAttributes => f.write_str("dependent attributes"),
            Self::Relationship => f.write_str("relationship"),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the policy core.
///
/// - No silent failures
/// - Validation errors are expected outcomes for the caller to display
/// - `Persistence` and `PartialRemovalFailure` carry enough context for a retry
/// - Nothing in the core panics; every error is scoped to one operation
#[derive(Debug, Error)]
pub enum PolicyError {
    // --- identity -----------------------------------------------------------
    /// The identity number has the wrong length or non-digit characters.
    #[error("Malformed identity number '{id_number}': {reason}")]
    MalformedId { id_number: String, reason: String },

    /// The birth date encoded in the identity number is impossible or in the future.
    #[error("Identity number '{id_number}' encodes an invalid birth date: {reason}")]
    InvalidBirthDate { id_number: String, reason: String },

    /// Digit 11 of the identity number is neither 0 nor 1.
    #[error("Identity number '{id_number}' has invalid citizenship digit '{digit}'")]
    InvalidCitizenshipDigit { id_number: String, digit: char },

    /// The Luhn checksum over all 13 digits does not hold.
    #[error("Identity number '{id_number}' failed the checksum")]
    ChecksumMismatch { id_number: String },

    // --- ledger -------------------------------------------------------------
    /// The same (person, contract, role) relationship already exists.
    #[error("Person {person_id:?} is already {role} on contract {contract_number}")]
    DuplicateRelationship {
        person_id: PersonId,
        contract_number: ContractNumber,
        role: Role,
    },

    /// The person is already main member on another contract.
    #[error("Person {person_id:?} is already main member on contract {existing}")]
    MainMemberConflict {
        person_id: PersonId,
        existing: ContractNumber,
    },

    /// The contract already has a (different) main member.
    #[error("Contract {0} already has a main member")]
    MainMemberAlreadyAssigned(ContractNumber),

    /// The removal cascade stopped part-way; retrying the removal resumes it.
    #[error(
        "Removal of relationship {relationship_id:?} on {contract_number} stopped at {step}: {message}"
    )]
    PartialRemovalFailure {
        relationship_id: RelationshipId,
        contract_number: ContractNumber,
        step: RemovalStep,
        completed: Vec<RemovalStep>,
        message: String,
    },

    // --- validator ----------------------------------------------------------
    /// The beneficiary shares would add up to more than 100%.
    #[error("Beneficiary allocation on contract {contract_number} would reach {total}")]
    AllocationExceeded {
        contract_number: ContractNumber,
        total: Allocation,
    },

    /// The plan does not allow another dependent.
    #[error("Contract {contract_number} cannot take another dependent ({current} held)")]
    DependentLimitReached {
        contract_number: ContractNumber,
        current: u32,
    },

    /// The person is already registered in this role on the contract.
    #[error("Person '{id_number}' is already registered as {role} on contract {contract_number}")]
    DuplicatePerson {
        id_number: String,
        role: Role,
        contract_number: ContractNumber,
    },

    /// The person is the main member of the contract.
    #[error("Person '{id_number}' is the main member of contract {contract_number}")]
    SameAsMainMember {
        id_number: String,
        contract_number: ContractNumber,
    },

    // --- aggregator & register ----------------------------------------------
    /// The contract cannot be finalized yet.
    #[error("Contract {contract_number} is incomplete ({} gap(s))", .gaps.len())]
    IncompleteContract {
        contract_number: ContractNumber,
        gaps: Vec<CompletenessGap>,
    },

    /// No unused contract number was found within the attempt budget.
    #[error("No unique contract number after {attempts} attempts")]
    NumberGenerationExhausted { attempts: u32 },

    /// The status change is not permitted by the contract state machine.
    #[error("Contract {contract_number} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        contract_number: ContractNumber,
        from: ContractStatus,
        to: ContractStatus,
    },

    /// The contract is in force; it must be amended before it can be edited.
    #[error("Contract {contract_number} is {status} and cannot be edited")]
    ContractNotEditable {
        contract_number: ContractNumber,
        status: ContractStatus,
    },

    // --- lookups ------------------------------------------------------------
    #[error("Person not found: {0:?}")]
    PersonNotFound(PersonId),

    #[error("Contract not found: {0}")]
    ContractNotFound(ContractNumber),

    #[error("Relationship not found: {0:?}")]
    RelationshipNotFound(RelationshipId),

    /// The relationship exists but holds a different role.
    #[error("Relationship {relationship_id:?} is a {actual}, expected {expected}")]
    RoleMismatch {
        relationship_id: RelationshipId,
        expected: Role,
        actual: Role,
    },

    #[error("Unknown plan: {0}")]
    UnknownPlan(PlanId),

    #[error("Unknown add-on option: {0}")]
    UnknownOption(OptionId),

    // --- row shape ----------------------------------------------------------
    #[error("Invalid percentage: {0}")]
    InvalidPercentage(String),

    #[error("Invalid relationship label: {0}")]
    InvalidLabel(String),

    #[error("Invalid dependent status: {0}")]
    InvalidStatus(String),

    // --- infrastructure -----------------------------------------------------
    /// A document store call failed or timed out.
    #[error("Persistence error during {operation}: {message}")]
    Persistence { operation: String, message: String },

    /// A document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be read or is out of range.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PolicyError {
    /// Build a `Persistence` error for the named operation.
    pub fn persistence(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Persistence {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Build the `Persistence` error reported when a store call exceeds its deadline.
    pub fn timeout(operation: impl Into<String>, deadline: Duration) -> Self {
        Self::Persistence {
            operation: operation.into(),
            message: format!("timed out after {} ms", deadline.as_millis()),
        }
    }

    /// Whether this is an expected validation outcome rather than an infrastructure fault.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Self::Persistence { .. }
                | Self::PartialRemovalFailure { .. }
                | Self::Serialization(_)
                | Self::Config(_)
                | Self::NumberGenerationExhausted { .. }
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_parses_whole_and_fractional_text() {
        assert_eq!("40".parse::<Percentage>().expect("parse").hundredths(), 4000);
        assert_eq!("33.5".parse::<Percentage>().expect("parse").hundredths(), 3350);
        assert_eq!(" 12.25% ".parse::<Percentage>().expect("parse").hundredths(), 1225);
        assert_eq!(".5".parse::<Percentage>().expect("parse").hundredths(), 50);
        assert_eq!("100".parse::<Percentage>().expect("parse"), Percentage::FULL);
    }

    #[test]
    fn percentage_rejects_out_of_range_and_garbage() {
        for text in ["100.01", "101", "-1", "", "%", "1.234", "ten", "1e2"] {
            assert!(
                matches!(
                    text.parse::<Percentage>(),
                    Err(PolicyError::InvalidPercentage(_))
                ),
                "{text:?} should be rejected"
            );
        }
        assert!(Percentage::whole(101).is_err());
        assert!(Percentage::whole(u32::MAX).is_err());
    }

    #[test]
    fn percentage_display() {
        assert_eq!(Percentage::whole(40).expect("pct").to_string(), "40%");
        assert_eq!(
            Percentage::from_hundredths(3305).expect("pct").to_string(),
            "33.05%"
        );
    }

    #[test]
    fn allocation_completeness() {
        let forty = Percentage::whole(40).expect("pct");
        let sixty = Percentage::whole(60).expect("pct");
        let total = Allocation::ZERO.add(forty).add(sixty);
        assert!(total.is_complete());
        assert!(!total.exceeds_limit());
        assert!(total.add(Percentage::from_hundredths(1).expect("pct")).exceeds_limit());
    }

    #[test]
    fn contract_status_state_machine() {
        use ContractStatus::*;
        assert!(New.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(InForce));
        assert!(InForce.can_transition_to(Amended));
        assert!(Amended.can_transition_to(InForce));

        assert!(!New.can_transition_to(InForce));
        assert!(!InForce.can_transition_to(InProgress));
        assert!(!InForce.can_transition_to(New));
        assert!(!Amended.can_transition_to(New));

        assert!(!InForce.is_editable());
        assert!(Amended.is_editable());
    }

    #[test]
    fn labels_and_statuses_parse_case_insensitively() {
        assert_eq!(
            "SPOUSE".parse::<RelationshipLabel>().expect("label"),
            RelationshipLabel::Spouse
        );
        assert_eq!(
            " inactive ".parse::<DependentStatus>().expect("status"),
            DependentStatus::Inactive
        );
        assert!(matches!(
            "cousin".parse::<RelationshipLabel>(),
            Err(PolicyError::InvalidLabel(_))
        ));
        assert!(matches!(
            "dormant".parse::<DependentStatus>(),
            Err(PolicyError::InvalidStatus(_))
        ));
    }

    #[test]
    fn money_display_and_sum() {
        let total: Money = [Money::from_cents(15_000), Money::from_cents(2_550)]
            .into_iter()
            .sum();
        assert_eq!(total.cents(), 17_550);
        assert_eq!(total.to_string(), "175.50");
    }

    #[test]
    fn validation_classification() {
        assert!(PolicyError::ChecksumMismatch {
            id_number: "1".into()
        }
        .is_validation());
        assert!(!PolicyError::persistence("get", "disk gone").is_validation());
        assert!(!PolicyError::timeout("get", Duration::from_millis(5)).is_validation());
    }
}
