//! Validation rules for limit records and validation-mode switches
//!
//! Pure functions only. Errors are field-scoped: a bad pair on one chain
//! never produces an error for another chain or any other setting.

use lazy_static::lazy_static;
use regex::Regex;

use super::types::ValidationMode;

lazy_static! {
    static ref CHAIN_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap();
}

/// Error attached to a single min or max field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// Min is greater than max (flagged on the min field)
    MinAboveMax,
    /// Max is lower than min (flagged on the max field)
    MaxBelowMin,
    /// Field must be greater than zero
    MustBePositive,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldError::MinAboveMax => write!(f, "min>max"),
            FieldError::MaxBelowMin => write!(f, "max<min"),
            FieldError::MustBePositive => write!(f, "must be greater than 0"),
        }
    }
}

/// Field errors for one min/max pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitErrors {
    pub min: Option<FieldError>,
    pub max: Option<FieldError>,
}

impl LimitErrors {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// A rule broken by a pending edit
#[derive(Debug, Clone, PartialEq)]
pub enum LimitViolation {
    /// Min/max pair failed validation
    InvalidLimits { scope: String, errors: LimitErrors },

    /// Tried to enable one limit level while the other is active
    MutualExclusion {
        requested: ValidationMode,
        active: ValidationMode,
    },

    /// Percentage outside [0, 100] (or not a number)
    PercentOutOfRange { field: String, value: f64 },

    /// Amount that must be positive while its switch is on
    NotPositive { field: String },

    /// Pausing or resuming withdrawals requires a reason
    ReasonRequired,

    /// Chain id is not a plain identifier
    InvalidChainId(String),
}

impl std::fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitViolation::InvalidLimits { scope, errors } => {
                write!(f, "Invalid {} limits:", scope)?;
                if let Some(e) = errors.min {
                    write!(f, " min {}", e)?;
                }
                if let Some(e) = errors.max {
                    write!(f, " max {}", e)?;
                }
                Ok(())
            }
            LimitViolation::MutualExclusion { requested, active } => {
                write!(
                    f,
                    "Cannot enable {} while {} is enabled - disable it first",
                    requested, active
                )
            }
            LimitViolation::PercentOutOfRange { field, value } => {
                write!(f, "{} must be between 0 and 100, got {}", field, value)
            }
            LimitViolation::NotPositive { field } => {
                write!(f, "{} must be greater than 0 while enabled", field)
            }
            LimitViolation::ReasonRequired => {
                write!(f, "A reason is required to change the global withdrawal status")
            }
            LimitViolation::InvalidChainId(chain) => {
                write!(f, "Invalid chain id: {:?}", chain)
            }
        }
    }
}

impl std::error::Error for LimitViolation {}

/// Flag both fields iff min > max
pub fn validate_limit_pair(min_cents: u64, max_cents: u64) -> LimitErrors {
    if min_cents > max_cents {
        LimitErrors {
            min: Some(FieldError::MinAboveMax),
            max: Some(FieldError::MaxBelowMin),
        }
    } else {
        LimitErrors::default()
    }
}

/// Validate the global record; disabled limits are never validated
pub fn validate_global_limits(min_cents: u64, max_cents: u64, enabled: bool) -> LimitErrors {
    if !enabled {
        return LimitErrors::default();
    }

    let mut errors = LimitErrors::default();
    if min_cents == 0 {
        errors.min = Some(FieldError::MustBePositive);
    }
    if max_cents == 0 {
        errors.max = Some(FieldError::MustBePositive);
    }

    let pair = validate_limit_pair(min_cents, max_cents);
    if let Some(e) = pair.min {
        errors.min.get_or_insert(e);
    }
    if let Some(e) = pair.max {
        errors.max.get_or_insert(e);
    }
    errors
}

/// Global limits may be switched on only while per-chain validation is off
pub fn can_enable_global_limits(per_chain_validation_enabled: bool) -> bool {
    !per_chain_validation_enabled
}

/// Per-chain validation may be switched on only while global limits are off
pub fn can_enable_per_chain_validation(global_limits_enabled: bool) -> bool {
    !global_limits_enabled
}

pub fn validate_percent(field: &str, value: f64) -> Result<(), LimitViolation> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(LimitViolation::PercentOutOfRange {
            field: field.to_string(),
            value,
        })
    }
}

pub fn validate_chain_id(chain: &str) -> Result<(), LimitViolation> {
    if CHAIN_ID_RE.is_match(chain) {
        Ok(())
    } else {
        Err(LimitViolation::InvalidChainId(chain.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_flags_both_fields_when_inverted() {
        let errors = validate_limit_pair(10_000, 5_000);
        assert_eq!(errors.min, Some(FieldError::MinAboveMax));
        assert_eq!(errors.max, Some(FieldError::MaxBelowMin));
        assert_eq!(errors.min.unwrap().to_string(), "min>max");
        assert_eq!(errors.max.unwrap().to_string(), "max<min");
    }

    #[test]
    fn test_pair_accepts_ordered_and_equal() {
        for (min, max) in [(0, 0), (1, 2), (5_000, 5_000), (0, u64::MAX)] {
            assert!(validate_limit_pair(min, max).is_empty(), "{} {}", min, max);
        }
        assert!(!validate_limit_pair(u64::MAX, 0).is_empty());
    }

    #[test]
    fn test_enabled_global_limits_require_positive_values() {
        let errors = validate_global_limits(0, 100, true);
        assert_eq!(errors.min, Some(FieldError::MustBePositive));
        assert_eq!(errors.max, None);

        let errors = validate_global_limits(0, 0, true);
        assert_eq!(errors.min, Some(FieldError::MustBePositive));
        assert_eq!(errors.max, Some(FieldError::MustBePositive));
    }

    #[test]
    fn test_enabled_global_limits_inverted_pair() {
        let errors = validate_global_limits(100, 50, true);
        assert_eq!(errors.min, Some(FieldError::MinAboveMax));
        assert_eq!(errors.max, Some(FieldError::MaxBelowMin));

        // Positivity error wins on the max field, min still flagged
        let errors = validate_global_limits(100, 0, true);
        assert_eq!(errors.min, Some(FieldError::MinAboveMax));
        assert_eq!(errors.max, Some(FieldError::MustBePositive));
    }

    #[test]
    fn test_enabled_global_limits_valid() {
        assert!(validate_global_limits(50, 100, true).is_empty());
    }

    #[test]
    fn test_disabled_global_limits_never_validated() {
        assert!(validate_global_limits(0, 0, false).is_empty());
        assert!(validate_global_limits(100, 50, false).is_empty());
    }

    #[test]
    fn test_exclusivity_predicates() {
        assert!(can_enable_global_limits(false));
        assert!(!can_enable_global_limits(true));
        assert!(can_enable_per_chain_validation(false));
        assert!(!can_enable_per_chain_validation(true));
    }

    #[test]
    fn test_percent_range() {
        assert!(validate_percent("deposit margin", 0.0).is_ok());
        assert!(validate_percent("deposit margin", 100.0).is_ok());
        assert!(validate_percent("deposit margin", 2.5).is_ok());
        assert!(validate_percent("deposit margin", -0.1).is_err());
        assert!(validate_percent("deposit margin", 100.01).is_err());
        assert!(validate_percent("deposit margin", f64::NAN).is_err());
    }

    #[test]
    fn test_chain_id_format() {
        assert!(validate_chain_id("ethereum").is_ok());
        assert!(validate_chain_id("bsc-testnet").is_ok());
        assert!(validate_chain_id("").is_err());
        assert!(validate_chain_id("eth/../admin").is_err());
    }

    #[test]
    fn test_violation_display() {
        let v = LimitViolation::MutualExclusion {
            requested: ValidationMode::GlobalLimits,
            active: ValidationMode::PerChainLimits,
        };
        assert_eq!(
            v.to_string(),
            "Cannot enable global limits while per-chain validation is enabled - disable it first"
        );
    }
}
