//! Withdrawal limit records and the rules that validate them
//!
//! Limits exist at two levels:
//! - Global limits: one min/max pair applied uniformly to every chain
//! - Per-chain limits: an independent min/max pair for each chain
//!
//! Only one level is enforced at a time. Which one is captured by
//! [`ValidationMode`], so the "both enabled" state cannot be produced
//! locally.

pub mod types;
pub mod validation;

pub use types::{ChainId, GlobalLimits, LimitRecord, ValidationMode};
pub use validation::{
    can_enable_global_limits, can_enable_per_chain_validation, validate_chain_id,
    validate_global_limits, validate_limit_pair, validate_percent, FieldError, LimitErrors,
    LimitViolation,
};
