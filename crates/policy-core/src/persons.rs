//! # Person Record Store
//!
//! Canonical personal data keyed by `(id_type, id_number)`.
//!
//! - One record per key; lookups use the normalized id number
//! - Identity numbers are verified before anything is written
//! - National-id facts (birth date, gender, citizenship) are derived, never trusted
//! - Persons are shared across contracts and never deleted here

use crate::identity::{IdentityParser, IdentityReport};
use crate::storage::{Collection, DocumentStore, DocumentStoreExt};
use crate::{IdType, Person, PersonId, PersonRecord, PolicyError};
use chrono::Utc;

/// Outcome of looking up an identity number before a form is filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefill {
    /// The person is already on record.
    Existing(PersonRecord),
    /// Unknown person; only the facts carried by the id are filled in.
    Derived(Person),
}

/// Person storage over any [`DocumentStore`].
pub struct PersonStore;

impl PersonStore {
    /// Verify an identity number, returning the report of a valid id.
    pub fn verify(id_type: IdType, id_number: &str) -> Result<IdentityReport, PolicyError> {
        IdentityParser::parse(id_number, id_type).into_result()
    }

    /// Exact match on the normalized key.
    pub fn find_person<S: DocumentStore + ?Sized>(
        store: &S,
        id_type: IdType,
        id_number: &str,
    ) -> Result<Option<PersonRecord>, PolicyError> {
        let key = IdentityParser::normalize(id_number, id_type);
        let mut matches = store.fetch_where(|record: &PersonRecord| {
            record.person.id_type == id_type && record.person.id_number == key
        })?;
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.swap_remove(0))
        })
    }

    pub fn get_person<S: DocumentStore + ?Sized>(
        store: &S,
        id: PersonId,
    ) -> Result<Option<PersonRecord>, PolicyError> {
        store.fetch(id.0)
    }

    /// Like [`Self::get_person`], failing with `PersonNotFound`.
    pub fn require_person<S: DocumentStore + ?Sized>(
        store: &S,
        id: PersonId,
    ) -> Result<PersonRecord, PolicyError> {
        Self::get_person(store, id)?.ok_or(PolicyError::PersonNotFound(id))
    }

    /// Create the person, or update the record already holding its key.
    ///
    /// Invalid identity numbers fail with their first identity error. Names,
    /// nationality, contacts and address are replaced wholesale on update.
    pub fn upsert_person<S: DocumentStore + ?Sized>(
        store: &mut S,
        person: Person,
    ) -> Result<PersonRecord, PolicyError> {
        let report = Self::verify(person.id_type, &person.id_number)?;
        let person = Self::apply_derived_facts(person, &report);
        let now = Utc::now();

        let record = match Self::find_person(store, person.id_type, &person.id_number)? {
            Some(existing) => PersonRecord {
                id: existing.id,
                person,
                created_at: existing.created_at,
                updated_at: now,
            },
            None => PersonRecord {
                id: PersonId(store.allocate_id(Collection::Persons)?),
                person,
                created_at: now,
                updated_at: now,
            },
        };

        store.persist(&record)?;
        tracing::debug!(
            person_id = record.id.0,
            id_type = %record.person.id_type,
            "person upserted"
        );
        Ok(record)
    }

    /// Look up an identity number for auto-population.
    ///
    /// Returns the stored person when found, else a skeleton carrying the
    /// facts derived from the id.
    pub fn prefill<S: DocumentStore + ?Sized>(
        store: &S,
        id_type: IdType,
        id_number: &str,
    ) -> Result<Prefill, PolicyError> {
        let report = Self::verify(id_type, id_number)?;
        if let Some(existing) = Self::find_person(store, id_type, &report.id_number)? {
            return Ok(Prefill::Existing(existing));
        }

        let skeleton = Person::new(id_type, report.id_number.clone(), "", "");
        Ok(Prefill::Derived(Self::apply_derived_facts(skeleton, &report)))
    }

    /// Normalize the key and overwrite trusted facts from the id.
    fn apply_derived_facts(mut person: Person, report: &IdentityReport) -> Person {
        person.id_number.clone_from(&report.id_number);
        if report.id_type == IdType::NationalId {
            person.date_of_birth = report.date_of_birth;
            person.gender = report.gender;
            person.citizenship = report.citizenship;
        }
        person
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::{Address, Citizenship, ContactMethod, Gender};
    use chrono::NaiveDate;

    fn thabo() -> Person {
        Person::new(IdType::NationalId, "8001015009087", "Thabo", "Mokoena")
            .with_contact(ContactMethod::phone("0821234567"))
    }

    #[test]
    fn upsert_creates_then_updates_in_place() {
        let mut store = MemoryStore::new();

        let first = PersonStore::upsert_person(&mut store, thabo()).expect("create");
        let renamed = Person {
            first_name: "Thabang".into(),
            ..thabo()
        };
        let second = PersonStore::upsert_person(&mut store, renamed).expect("update");

        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.person.first_name, "Thabang");
        assert_eq!(store.count(Collection::Persons).expect("count"), 1);
    }

    #[test]
    fn national_id_facts_override_caller_values() {
        let mut store = MemoryStore::new();
        let mut person = thabo();
        person.gender = Some(Gender::Female);
        person.date_of_birth = NaiveDate::from_ymd_opt(1999, 9, 9);

        let record = PersonStore::upsert_person(&mut store, person).expect("upsert");

        assert_eq!(record.person.gender, Some(Gender::Male));
        assert_eq!(record.person.date_of_birth, NaiveDate::from_ymd_opt(1980, 1, 1));
        assert_eq!(record.person.citizenship, Some(Citizenship::Citizen));
    }

    #[test]
    fn passport_facts_are_kept_and_key_is_normalized() {
        let mut store = MemoryStore::new();
        let mut person = Person::new(IdType::Passport, " m00123456 ", "Ana", "Silva");
        person.gender = Some(Gender::Female);

        let record = PersonStore::upsert_person(&mut store, person).expect("upsert");
        assert_eq!(record.person.id_number, "M00123456");
        assert_eq!(record.person.gender, Some(Gender::Female));

        let found = PersonStore::find_person(&store, IdType::Passport, "M00123456")
            .expect("find")
            .expect("present");
        assert_eq!(found.id, record.id);
    }

    #[test]
    fn invalid_identity_is_rejected_before_writing() {
        let mut store = MemoryStore::new();
        let person = Person::new(IdType::NationalId, "8001015009088", "Bad", "Checksum");

        let result = PersonStore::upsert_person(&mut store, person);
        assert!(matches!(result, Err(PolicyError::ChecksumMismatch { .. })));
        assert_eq!(store.count(Collection::Persons).expect("count"), 0);
    }

    #[test]
    fn contacts_and_address_are_replaced_wholesale() {
        let mut store = MemoryStore::new();
        let with_two = thabo()
            .with_contact(ContactMethod::email("thabo@example.com"))
            .with_address(Address {
                line1: "1 Long St".into(),
                city: "Cape Town".into(),
                postal_code: "8001".into(),
                ..Address::default()
            });
        PersonStore::upsert_person(&mut store, with_two).expect("create");

        let replaced = Person::new(IdType::NationalId, "8001015009087", "Thabo", "Mokoena")
            .with_contact(ContactMethod::email("new@example.com"));
        let record = PersonStore::upsert_person(&mut store, replaced).expect("update");

        assert_eq!(record.person.contacts, vec![ContactMethod::email("new@example.com")]);
        assert!(record.person.address.is_none());
    }

    #[test]
    fn id_type_is_part_of_the_key() {
        let mut store = MemoryStore::new();
        PersonStore::upsert_person(&mut store, thabo()).expect("upsert");

        let other = PersonStore::find_person(&store, IdType::Passport, "8001015009087")
            .expect("find");
        assert!(other.is_none());
    }

    #[test]
    fn prefill_distinguishes_known_and_unknown_people() {
        let mut store = MemoryStore::new();
        let stored = PersonStore::upsert_person(&mut store, thabo()).expect("upsert");

        match PersonStore::prefill(&store, IdType::NationalId, "8001015009087").expect("prefill")
        {
            Prefill::Existing(record) => assert_eq!(record.id, stored.id),
            Prefill::Derived(_) => unreachable!("person is on record"),
        }

        match PersonStore::prefill(&store, IdType::NationalId, "8503150123086").expect("prefill")
        {
            Prefill::Derived(person) => {
                assert_eq!(person.date_of_birth, NaiveDate::from_ymd_opt(1985, 3, 15));
                assert_eq!(person.gender, Some(Gender::Female));
                assert!(person.first_name.is_empty());
            }
            Prefill::Existing(_) => unreachable!("person is unknown"),
        }
    }

    #[test]
    fn require_person_reports_missing_id() {
        let store = MemoryStore::new();
        let result = PersonStore::require_person(&store, PersonId(42));
        assert!(matches!(result, Err(PolicyError::PersonNotFound(PersonId(42)))));
    }
}
