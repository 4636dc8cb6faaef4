//! Value objects for withdrawal limits

use serde::{Deserialize, Serialize};

use super::validation::{
    can_enable_global_limits, can_enable_per_chain_validation, LimitViolation,
};

/// Blockchain network identifier ("ethereum", "solana", "tron", ...)
pub type ChainId = String;

/// Min/max withdrawal amount pair, in cents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitRecord {
    pub min_amount_cents: u64,
    pub max_amount_cents: u64,
}

impl LimitRecord {
    pub fn new(min_amount_cents: u64, max_amount_cents: u64) -> Self {
        Self {
            min_amount_cents,
            max_amount_cents,
        }
    }
}

/// The distinguished global record, applied to every chain when enabled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalLimits {
    pub min_amount_cents: u64,
    pub max_amount_cents: u64,
    pub enabled: bool,
}

impl GlobalLimits {
    pub fn record(&self) -> LimitRecord {
        LimitRecord::new(self.min_amount_cents, self.max_amount_cents)
    }
}

/// Which limit level is enforced by the backend
///
/// Global limits and per-chain validation are stored by the backend as two
/// independent flags. Locally they are one value, so enabling one while the
/// other is active has to go through [`ValidationMode::enable_global`] or
/// [`ValidationMode::enable_per_chain`], which reject instead of coercing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// No withdrawal amount limits are enforced
    #[default]
    Disabled,
    /// Global min/max applies to every chain
    GlobalLimits,
    /// Each chain's own min/max applies
    PerChainLimits,
    /// Backend reports both flags enabled (set by two admins racing).
    /// Only transitions that disable one of the flags are accepted.
    Conflicting,
}

impl ValidationMode {
    /// Build from the two backend flags
    pub fn from_flags(global_enabled: bool, per_chain_enabled: bool) -> Self {
        match (global_enabled, per_chain_enabled) {
            (false, false) => Self::Disabled,
            (true, false) => Self::GlobalLimits,
            (false, true) => Self::PerChainLimits,
            (true, true) => Self::Conflicting,
        }
    }

    pub fn global_enabled(&self) -> bool {
        matches!(self, Self::GlobalLimits | Self::Conflicting)
    }

    pub fn per_chain_enabled(&self) -> bool {
        matches!(self, Self::PerChainLimits | Self::Conflicting)
    }

    /// Transition for the global-limits switch
    pub fn set_global(self, enabled: bool) -> Result<Self, LimitViolation> {
        if enabled {
            self.enable_global()
        } else {
            Ok(match self {
                Self::GlobalLimits => Self::Disabled,
                Self::Conflicting => Self::PerChainLimits,
                other => other,
            })
        }
    }

    /// Transition for the per-chain validation switch
    pub fn set_per_chain(self, enabled: bool) -> Result<Self, LimitViolation> {
        if enabled {
            self.enable_per_chain()
        } else {
            Ok(match self {
                Self::PerChainLimits => Self::Disabled,
                Self::Conflicting => Self::GlobalLimits,
                other => other,
            })
        }
    }

    pub fn enable_global(self) -> Result<Self, LimitViolation> {
        if can_enable_global_limits(self.per_chain_enabled()) {
            Ok(Self::GlobalLimits)
        } else {
            Err(LimitViolation::MutualExclusion {
                requested: Self::GlobalLimits,
                active: Self::PerChainLimits,
            })
        }
    }

    pub fn enable_per_chain(self) -> Result<Self, LimitViolation> {
        if can_enable_per_chain_validation(self.global_enabled()) {
            Ok(Self::PerChainLimits)
        } else {
            Err(LimitViolation::MutualExclusion {
                requested: Self::PerChainLimits,
                active: Self::GlobalLimits,
            })
        }
    }
}

impl std::fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationMode::Disabled => write!(f, "disabled"),
            ValidationMode::GlobalLimits => write!(f, "global limits"),
            ValidationMode::PerChainLimits => write!(f, "per-chain validation"),
            ValidationMode::Conflicting => write!(f, "conflicting (global + per-chain)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_flags() {
        assert_eq!(ValidationMode::from_flags(false, false), ValidationMode::Disabled);
        assert_eq!(ValidationMode::from_flags(true, false), ValidationMode::GlobalLimits);
        assert_eq!(ValidationMode::from_flags(false, true), ValidationMode::PerChainLimits);
        assert_eq!(ValidationMode::from_flags(true, true), ValidationMode::Conflicting);
    }

    #[test]
    fn test_enable_global_rejected_while_per_chain_active() {
        let result = ValidationMode::PerChainLimits.set_global(true);
        assert!(matches!(
            result,
            Err(LimitViolation::MutualExclusion {
                requested: ValidationMode::GlobalLimits,
                ..
            })
        ));
    }

    #[test]
    fn test_enable_per_chain_rejected_while_global_active() {
        let result = ValidationMode::GlobalLimits.set_per_chain(true);
        assert!(matches!(
            result,
            Err(LimitViolation::MutualExclusion {
                requested: ValidationMode::PerChainLimits,
                ..
            })
        ));
    }

    #[test]
    fn test_conflicting_only_allows_disabling() {
        let mode = ValidationMode::Conflicting;
        assert!(mode.set_global(true).is_err());
        assert!(mode.set_per_chain(true).is_err());
        assert_eq!(mode.set_global(false).unwrap(), ValidationMode::PerChainLimits);
        assert_eq!(mode.set_per_chain(false).unwrap(), ValidationMode::GlobalLimits);
    }

    #[test]
    fn test_disable_is_noop_when_already_off() {
        assert_eq!(
            ValidationMode::PerChainLimits.set_global(false).unwrap(),
            ValidationMode::PerChainLimits
        );
        assert_eq!(
            ValidationMode::Disabled.set_per_chain(false).unwrap(),
            ValidationMode::Disabled
        );
    }

}
