//! Delta type
//!
//! Domain primitive for fund pool adjustments. A delta is a signed integer
//! validated at construction time, so non-finite or fractional values cannot
//! reach the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum magnitude of a single adjustment (1 trillion).
const MAX_DELTA: u64 = 1_000_000_000_000;

/// Delta represents a validated fund pool adjustment.
///
/// # Invariants
/// - Value is never zero
/// - Magnitude is at most 1 trillion
///
/// # Example
/// ```
/// use fundpool::domain::Delta;
///
/// let delta = Delta::new(-50).unwrap();
/// assert_eq!(delta.value(), -50);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Number", into = "i64")]
pub struct Delta(i64);

/// Errors that can occur when creating a Delta
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeltaError {
    #[error("Delta must not be zero")]
    Zero,

    #[error("Delta must be a finite integer (got {0})")]
    NotAnInteger(String),

    #[error("Delta exceeds maximum allowed magnitude ({MAX_DELTA})")]
    Overflow,
}

impl Delta {
    /// Create a new Delta with validation.
    ///
    /// # Errors
    /// - `DeltaError::Zero` if value == 0
    /// - `DeltaError::Overflow` if |value| > 1 trillion
    pub fn new(value: i64) -> Result<Self, DeltaError> {
        if value == 0 {
            return Err(DeltaError::Zero);
        }

        if value.unsigned_abs() > MAX_DELTA {
            return Err(DeltaError::Overflow);
        }

        Ok(Self(value))
    }

    /// Get the underlying signed value.
    pub fn value(self) -> i64 {
        self.0
    }

    /// True for deltas that add to the pool.
    pub fn is_credit(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > 0 {
            write!(f, "+{}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl TryFrom<serde_json::Number> for Delta {
    type Error = DeltaError;

    fn try_from(number: serde_json::Number) -> Result<Self, Self::Error> {
        if let Some(value) = number.as_i64() {
            return Delta::new(value);
        }

        if let Some(value) = number.as_f64() {
            // JSON clients may send 50.0 for 50; accept it, reject 50.5.
            if !value.is_finite() || value.fract() != 0.0 {
                return Err(DeltaError::NotAnInteger(number.to_string()));
            }
            if value < i64::MIN as f64 || value > i64::MAX as f64 {
                return Err(DeltaError::Overflow);
            }
            return Delta::new(value as i64);
        }

        // u64 values above i64::MAX land here.
        Err(DeltaError::Overflow)
    }
}

impl From<Delta> for i64 {
    fn from(delta: Delta) -> Self {
        delta.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_positive() {
        let delta = Delta::new(100);
        assert!(delta.is_ok());
        assert_eq!(delta.unwrap().value(), 100);
    }

    #[test]
    fn test_delta_negative() {
        let delta = Delta::new(-250).unwrap();
        assert_eq!(delta.value(), -250);
        assert!(!delta.is_credit());
    }

    #[test]
    fn test_delta_zero_rejected() {
        assert!(matches!(Delta::new(0), Err(DeltaError::Zero)));
    }

    #[test]
    fn test_delta_overflow() {
        assert!(matches!(
            Delta::new(1_000_000_000_001),
            Err(DeltaError::Overflow)
        ));
        assert!(matches!(
            Delta::new(-1_000_000_000_001),
            Err(DeltaError::Overflow)
        ));
        // i64::MIN has no positive counterpart; unsigned_abs keeps this safe.
        assert!(matches!(Delta::new(i64::MIN), Err(DeltaError::Overflow)));
    }

    #[test]
    fn test_delta_max_magnitude_ok() {
        assert!(Delta::new(1_000_000_000_000).is_ok());
        assert!(Delta::new(-1_000_000_000_000).is_ok());
    }

    #[test]
    fn test_delta_from_json_integer() {
        let delta: Delta = serde_json::from_str("50").unwrap();
        assert_eq!(delta.value(), 50);

        let delta: Delta = serde_json::from_str("-200").unwrap();
        assert_eq!(delta.value(), -200);
    }

    #[test]
    fn test_delta_from_json_integral_float() {
        let delta: Delta = serde_json::from_str("50.0").unwrap();
        assert_eq!(delta.value(), 50);
    }

    #[test]
    fn test_delta_rejects_fractional_json() {
        let result: Result<Delta, _> = serde_json::from_str("10.5");
        assert!(result.is_err());
    }

    #[test]
    fn test_delta_rejects_huge_json_values() {
        // Above i64::MAX, parsed as u64 by serde_json.
        let result: Result<Delta, _> = serde_json::from_str("9223372036854775808");
        assert!(result.is_err());

        let result: Result<Delta, _> = serde_json::from_str("1e30");
        assert!(result.is_err());
    }

    #[test]
    fn test_delta_serializes_as_number() {
        let delta = Delta::new(-40).unwrap();
        assert_eq!(serde_json::to_string(&delta).unwrap(), "-40");
    }

    #[test]
    fn test_delta_display_signs() {
        assert_eq!(Delta::new(5).unwrap().to_string(), "+5");
        assert_eq!(Delta::new(-5).unwrap().to_string(), "-5");
    }
}
