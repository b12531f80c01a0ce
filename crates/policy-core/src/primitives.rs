//! # Primitives
//!
//! Hardcoded constants of the policy core. Runtime-tunable values have their
//! defaults here and are overridden through [`crate::config::EngineConfig`].

// =============================================================================
// IDENTITY
// =============================================================================

/// Length of a national identity number.
pub const NATIONAL_ID_LENGTH: usize = 13;

/// Digits 7–10 below this value encode a female holder.
pub const GENDER_THRESHOLD: u32 = 5000;

// =============================================================================
// ALLOCATION
// =============================================================================

/// Hundredths per whole percent.
pub const HUNDREDTHS_PER_PERCENT: u32 = 100;

/// 100% in hundredths. Beneficiary shares may never sum above this.
pub const FULL_ALLOCATION_HUNDREDTHS: u32 = 100 * HUNDREDTHS_PER_PERCENT;

// =============================================================================
// CONTRACT NUMBERS
// =============================================================================

/// Prefix of every contract number.
pub const CONTRACT_NUMBER_PREFIX: &str = "CNT";

/// Length of the random suffix of a contract number.
pub const CONTRACT_SUFFIX_LENGTH: usize = 3;

/// Alphabet for the base36 timestamp and the random suffix.
pub const BASE36_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Default number of store round-trips before number generation gives up.
pub const DEFAULT_NUMBER_ATTEMPTS: u32 = 10;

// =============================================================================
// RUNTIME DEFAULTS
// =============================================================================

/// Default deadline for one store call, in milliseconds.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// Default capacity of the change-event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
