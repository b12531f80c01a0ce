//! Document shapes stored in the five logical collections.
//!
//! Cross-references (`person_id`, `contract_number`, `relationship_id`) are
//! plain fields. Nothing in the store enforces them.

use super::{
    AttributeId, Citizenship, ContactKind, ContractId, ContractNumber, ContractStatus,
    DependentStatus, Gender, IdType, OptionId, Percentage, PersonId, PlanId, RelationshipId,
    RelationshipLabel, Role,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// PERSON
// =============================================================================

/// One contact method of a person. Order is significant (first is preferred).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMethod {
    pub kind: ContactKind,
    pub value: String,
}

impl ContactMethod {
    #[must_use]
    pub fn email(value: impl Into<String>) -> Self {
        Self {
            kind: ContactKind::Email,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn phone(value: impl Into<String>) -> Self {
        Self {
            kind: ContactKind::Phone,
            value: value.into(),
        }
    }
}

/// Postal address of a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Address {
    pub line1: String,
    pub line2: Option<String>,
    pub suburb: Option<String>,
    pub city: String,
    pub postal_code: String,
}

/// A natural person, keyed by `(id_type, id_number)`.
///
/// For national ids, `date_of_birth`, `gender` and `citizenship` are derived
/// from the id on every upsert; values supplied by the caller are replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id_type: IdType,
    pub id_number: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub citizenship: Option<Citizenship>,
    pub nationality: String,
    pub contacts: Vec<ContactMethod>,
    pub address: Option<Address>,
}

impl Person {
    /// Create a person with only the key and names filled in.
    #[must_use]
    pub fn new(
        id_type: IdType,
        id_number: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id_type,
            id_number: id_number.into(),
            first_name: first_name.into(),
            middle_name: None,
            last_name: last_name.into(),
            date_of_birth: None,
            gender: None,
            citizenship: None,
            nationality: String::new(),
            contacts: Vec::new(),
            address: None,
        }
    }

    #[must_use]
    pub fn with_contact(mut self, contact: ContactMethod) -> Self {
        self.contacts.push(contact);
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    #[must_use]
    pub fn with_nationality(mut self, nationality: impl Into<String>) -> Self {
        self.nationality = nationality.into();
        self
    }

    /// Names of the fields a main member must have before finalization.
    #[must_use]
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.first_name.trim().is_empty() {
            missing.push("first name");
        }
        if self.last_name.trim().is_empty() {
            missing.push("last name");
        }
        if self.date_of_birth.is_none() {
            missing.push("date of birth");
        }
        if self.gender.is_none() {
            missing.push("gender");
        }
        if self.contacts.iter().all(|c| c.value.trim().is_empty()) {
            missing.push("contact method");
        }
        if self.address.is_none() {
            missing.push("address");
        }
        missing
    }
}

/// A stored person document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: PersonId,
    pub person: Person,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// CONTRACT
// =============================================================================

/// A stored contract document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub number: ContractNumber,
    pub plan_id: PlanId,
    pub option_ids: Vec<OptionId>,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// RELATIONSHIP & ROLE ATTRIBUTES
// =============================================================================

/// Binds one person to one contract under one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub person_id: PersonId,
    pub contract_number: ContractNumber,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Satellite row of a beneficiary relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryAttributes {
    pub id: AttributeId,
    pub relationship_id: RelationshipId,
    pub label: RelationshipLabel,
    pub percentage: Percentage,
}

/// Satellite row of a dependent relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentAttributes {
    pub id: AttributeId,
    pub relationship_id: RelationshipId,
    pub label: RelationshipLabel,
    pub status: DependentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_person_has_no_missing_fields() {
        let mut person = Person::new(IdType::NationalId, "8001015009087", "Thabo", "Mokoena")
            .with_contact(ContactMethod::phone("0821234567"))
            .with_address(Address {
                line1: "12 Jacaranda St".into(),
                city: "Pretoria".into(),
                postal_code: "0002".into(),
                ..Address::default()
            });
        person.date_of_birth = NaiveDate::from_ymd_opt(1980, 1, 1);
        person.gender = Some(Gender::Male);

        assert!(person.missing_required_fields().is_empty());
    }

    #[test]
    fn bare_person_lists_every_missing_field() {
        let person = Person::new(IdType::Passport, "A1234567", " ", "");
        assert_eq!(
            person.missing_required_fields(),
            vec![
                "first name",
                "last name",
                "date of birth",
                "gender",
                "contact method",
                "address"
            ]
        );
    }
}
