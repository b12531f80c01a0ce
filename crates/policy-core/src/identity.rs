//! # Identity Parser
//!
//! Parses and verifies government identity numbers.
//!
//! A national identity number has 13 digits:
//!
//! ```text
//! Y Y M M D D G G G G C A Z
//! └─birth──┘ └gender┘ │ │ └ Luhn check digit
//!                     │ └── (unused)
//!                     └──── citizenship: 0 citizen, 1 permanent resident
//! ```
//!
//! Passport numbers carry no structure and are accepted when non-empty.
//!
//! ## Century
//!
//! `YY` greater than the current two-digit year is read as 19YY, anything
//! else as 20YY. A person born 100 or more years ago is therefore placed in
//! the wrong century. This is a known limitation and is kept as-is.

use crate::primitives::{GENDER_THRESHOLD, NATIONAL_ID_LENGTH};
use crate::{Citizenship, Gender, IdType, PolicyError};
use chrono::{Datelike, NaiveDate, Utc};
use std::fmt;

/// One failed check of an identity number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityIssue {
    /// Wrong length, non-digit characters, or an empty passport number.
    MalformedId(String),
    /// The encoded birth date is out of range, impossible, or in the future.
    InvalidBirthDate(String),
    /// Digit 11 is neither 0 nor 1.
    InvalidCitizenshipDigit(char),
    /// The Luhn checksum does not hold.
    ChecksumMismatch,
}

impl IdentityIssue {
    /// Convert into the typed error for the given identity number.
    #[must_use]
    pub fn to_error(&self, id_number: &str) -> PolicyError {
        let id_number = id_number.to_string();
        match self {
            Self::MalformedId(reason) => PolicyError::MalformedId {
                id_number,
                reason: reason.clone(),
            },
            Self::InvalidBirthDate(reason) => PolicyError::InvalidBirthDate {
                id_number,
                reason: reason.clone(),
            },
            Self::InvalidCitizenshipDigit(digit) => PolicyError::InvalidCitizenshipDigit {
                id_number,
                digit: *digit,
            },
            Self::ChecksumMismatch => PolicyError::ChecksumMismatch { id_number },
        }
    }
}

impl fmt::Display for IdentityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedId(reason) => write!(f, "Malformed identity number: {reason}"),
            Self::InvalidBirthDate(reason) => write!(f, "Invalid birth date: {reason}"),
            Self::InvalidCitizenshipDigit(digit) => {
                write!(f, "Invalid citizenship digit '{digit}' (expected 0 or 1)")
            }
            Self::ChecksumMismatch => f.write_str("Identity number checksum does not match"),
        }
    }
}

/// Result of parsing an identity number.
///
/// All checks after the length/digit gate run; issues accumulate in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityReport {
    /// The normalized identity number that was checked.
    pub id_number: String,
    pub id_type: IdType,
    pub is_valid: bool,
    pub errors: Vec<IdentityIssue>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub citizenship: Option<Citizenship>,
}

impl IdentityReport {
    fn new(id_number: String, id_type: IdType) -> Self {
        Self {
            id_number,
            id_type,
            is_valid: false,
            errors: Vec::new(),
            date_of_birth: None,
            gender: None,
            citizenship: None,
        }
    }

    /// Human-readable reasons, in check order.
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// Whether the given issue kind was reported.
    #[must_use]
    pub fn has(&self, predicate: impl Fn(&IdentityIssue) -> bool) -> bool {
        self.errors.iter().any(predicate)
    }

    /// Turn an invalid report into its first issue as a typed error.
    pub fn into_result(self) -> Result<Self, PolicyError> {
        if let Some(issue) = self.errors.first() {
            return Err(issue.to_error(&self.id_number));
        }
        Ok(self)
    }
}

/// Stateless parser for identity numbers.
pub struct IdentityParser;

impl IdentityParser {
    /// Parse against today's UTC date.
    #[must_use]
    pub fn parse(id: &str, id_type: IdType) -> IdentityReport {
        Self::parse_at(id, id_type, Utc::now().date_naive())
    }

    /// Parse against an explicit reference date.
    ///
    /// The reference date drives the century heuristic and the future-date check.
    #[must_use]
    pub fn parse_at(id: &str, id_type: IdType, today: NaiveDate) -> IdentityReport {
        let mut report = IdentityReport::new(Self::normalize(id, id_type), id_type);

        match id_type {
            IdType::Passport => {
                if report.id_number.is_empty() {
                    report
                        .errors
                        .push(IdentityIssue::MalformedId("passport number is empty".into()));
                }
            }
            IdType::NationalId => Self::check_national(&mut report, today),
        }

        report.is_valid = report.errors.is_empty();
        report
    }

    /// Canonical form used as the lookup key: trimmed, passports upper-cased.
    #[must_use]
    pub fn normalize(id: &str, id_type: IdType) -> String {
        match id_type {
            IdType::NationalId => id.trim().to_string(),
            IdType::Passport => id.trim().to_ascii_uppercase(),
        }
    }

    /// Luhn check over digits (most significant first).
    #[must_use]
    pub fn luhn_valid(digits: &[u8]) -> bool {
        Self::luhn_sum(digits, false) % 10 == 0
    }

    /// The digit that makes `payload` followed by it pass the Luhn check.
    #[must_use]
    pub fn luhn_check_digit(payload: &[u8]) -> u8 {
        let sum = Self::luhn_sum(payload, true);
        ((10 - sum % 10) % 10) as u8
    }

    /// Luhn sum from the right; `double_first` doubles the rightmost digit.
    fn luhn_sum(digits: &[u8], double_first: bool) -> u32 {
        digits
            .iter()
            .rev()
            .enumerate()
            .map(|(position, &digit)| {
                let digit = u32::from(digit);
                if (position % 2 == 1) != double_first {
                    let doubled = digit * 2;
                    if doubled > 9 { doubled - 9 } else { doubled }
                } else {
                    digit
                }
            })
            .sum()
    }

    fn check_national(report: &mut IdentityReport, today: NaiveDate) {
        let id = report.id_number.as_str();
        let length = id.chars().count();

        // Gate: nothing else is meaningful without 13 ASCII digits.
        if length != NATIONAL_ID_LENGTH {
            report.errors.push(IdentityIssue::MalformedId(format!(
                "expected {NATIONAL_ID_LENGTH} digits, found {length} characters"
            )));
            return;
        }
        if !id.bytes().all(|b| b.is_ascii_digit()) {
            report
                .errors
                .push(IdentityIssue::MalformedId("contains non-digit characters".into()));
            return;
        }

        let digits: Vec<u8> = id.bytes().map(|b| b - b'0').collect();

        match Self::birth_date(&digits, today) {
            Ok(date) => report.date_of_birth = Some(date),
            Err(reason) => report.errors.push(IdentityIssue::InvalidBirthDate(reason)),
        }

        let gender_code = Self::number(&digits[6..10]);
        report.gender = Some(if gender_code < GENDER_THRESHOLD {
            Gender::Female
        } else {
            Gender::Male
        });

        report.citizenship = Some(match digits[10] {
            0 => Citizenship::Citizen,
            1 => Citizenship::PermanentResident,
            other => {
                report
                    .errors
                    .push(IdentityIssue::InvalidCitizenshipDigit(char::from(b'0' + other)));
                Citizenship::Other
            }
        });

        if !Self::luhn_valid(&digits) {
            report.errors.push(IdentityIssue::ChecksumMismatch);
        }
    }

    fn birth_date(digits: &[u8], today: NaiveDate) -> Result<NaiveDate, String> {
        let yy = Self::number(&digits[0..2]);
        let month = Self::number(&digits[2..4]);
        let day = Self::number(&digits[4..6]);

        if !(1..=12).contains(&month) {
            return Err(format!("month {month:02} is out of range"));
        }
        if !(1..=31).contains(&day) {
            return Err(format!("day {day:02} is out of range"));
        }

        let current_yy = today.year().rem_euclid(100) as u32;
        let century = if yy > current_yy { 1900 } else { 2000 };
        let year = (century + yy) as i32;

        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| format!("{year:04}-{month:02}-{day:02} does not exist"))?;
        if date > today {
            return Err(format!("{date} lies in the future"));
        }
        Ok(date)
    }

    fn number(digits: &[u8]) -> u32 {
        digits
            .iter()
            .fold(0u32, |acc, &d| acc * 10 + u32::from(d))
    }
}

// =============================================================================
// TESTS
// =============================================================================
