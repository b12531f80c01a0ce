//! Contract number generation.
//!
//! `CNT-<base36 millisecond timestamp>-<3 random characters>`, upper case.
//! Candidates are checked against the store and retried a bounded number of
//! times.

use crate::contracts::ContractRegister;
use crate::primitives::{BASE36_ALPHABET, CONTRACT_NUMBER_PREFIX, CONTRACT_SUFFIX_LENGTH};
use crate::storage::DocumentStore;
use crate::{ContractNumber, PolicyError};
use chrono::{DateTime, Utc};
use rand::Rng;

pub struct ContractNumbers;

impl ContractNumbers {
    /// Upper-case base36 rendering of `value`.
    #[must_use]
    pub fn to_base36(mut value: u64) -> String {
        if value == 0 {
            return "0".to_string();
        }
        let mut digits = Vec::new();
        while value > 0 {
            digits.push(BASE36_ALPHABET[(value % 36) as usize]);
            value /= 36;
        }
        digits.reverse();
        digits.into_iter().map(char::from).collect()
    }

    /// One candidate number for the given instant.
    pub fn candidate<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> ContractNumber {
        let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let suffix: String = (0..CONTRACT_SUFFIX_LENGTH)
            .map(|_| char::from(BASE36_ALPHABET[rng.random_range(0..BASE36_ALPHABET.len())]))
            .collect();
        ContractNumber(format!(
            "{CONTRACT_NUMBER_PREFIX}-{}-{suffix}",
            Self::to_base36(millis)
        ))
    }

    /// A number no stored contract uses yet.
    ///
    /// Fails with `NumberGenerationExhausted` after `attempts` collisions.
    pub fn generate_unique<S: DocumentStore + ?Sized, R: Rng + ?Sized>(
        store: &S,
        rng: &mut R,
        now: DateTime<Utc>,
        attempts: u32,
    ) -> Result<ContractNumber, PolicyError> {
        for attempt in 1..=attempts {
            let candidate = Self::candidate(rng, now);
            if ContractRegister::find(store, &candidate)?.is_none() {
                return Ok(candidate);
            }
            tracing::debug!(%candidate, attempt, "contract number collision");
        }
        tracing::warn!(attempts, "contract number generation exhausted");
        Err(PolicyError::NumberGenerationExhausted { attempts })
    }
}
