//! Per-brand configuration snapshot
//!
//! A [`ConfigSnapshot`] holds everything the settings screen edits for one
//! brand. It is split into independent slices ([`SubResource`]), each with
//! its own dirty/save lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use crate::error::{Error, Result};
use crate::limits::{
    validate_chain_id, validate_global_limits, validate_limit_pair, validate_percent, ChainId,
    GlobalLimits, LimitErrors, LimitRecord, LimitViolation, ValidationMode,
};
use crate::service::ConfigService;

/// Tenant/operator scope. `None` addresses the platform-wide default.
pub type BrandId = String;

/// Global withdrawal on/off switch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStatus {
    pub enabled: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub paused_by: String,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
}

/// KYC-related withdrawal thresholds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub cumulative_kyc_limit_cents: u64,
    pub cumulative_kyc_enabled: bool,
    pub kyc_daily_limit_cents: u64,
    pub kyc_daily_enabled: bool,
}

/// Amounts above which withdrawals wait for human approval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualReview {
    pub enabled: bool,
    pub single_threshold_cents: u64,
    pub daily_threshold_cents: u64,
}

/// Independent scalar settings, each saved on its own
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarSettings {
    pub require_kyc_on_first_withdrawal: bool,
    pub deposit_margin_percent: f64,
    pub withdrawal_margin_percent: f64,
    pub duplicate_account_checks_enabled: bool,
}

/// Names of the scalar settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalarToggle {
    RequireKycOnFirstWithdrawal,
    DepositMargin,
    WithdrawalMargin,
    DuplicateAccountChecks,
}

impl ScalarToggle {
    pub const ALL: [ScalarToggle; 4] = [
        ScalarToggle::RequireKycOnFirstWithdrawal,
        ScalarToggle::DepositMargin,
        ScalarToggle::WithdrawalMargin,
        ScalarToggle::DuplicateAccountChecks,
    ];

    /// Stable identifier, also used as the REST path segment
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarToggle::RequireKycOnFirstWithdrawal => "require-kyc-first-withdrawal",
            ScalarToggle::DepositMargin => "deposit-margin",
            ScalarToggle::WithdrawalMargin => "withdrawal-margin",
            ScalarToggle::DuplicateAccountChecks => "duplicate-account-checks",
        }
    }

    pub fn is_percent(&self) -> bool {
        matches!(self, ScalarToggle::DepositMargin | ScalarToggle::WithdrawalMargin)
    }

    pub fn read(&self, scalars: &ScalarSettings) -> ToggleValue {
        match self {
            ScalarToggle::RequireKycOnFirstWithdrawal => {
                ToggleValue::Flag(scalars.require_kyc_on_first_withdrawal)
            }
            ScalarToggle::DepositMargin => ToggleValue::Percent(scalars.deposit_margin_percent),
            ScalarToggle::WithdrawalMargin => {
                ToggleValue::Percent(scalars.withdrawal_margin_percent)
            }
            ScalarToggle::DuplicateAccountChecks => {
                ToggleValue::Flag(scalars.duplicate_account_checks_enabled)
            }
        }
    }

    pub fn write(&self, scalars: &mut ScalarSettings, value: ToggleValue) -> Result<()> {
        match (self, value) {
            (ScalarToggle::RequireKycOnFirstWithdrawal, ToggleValue::Flag(v)) => {
                scalars.require_kyc_on_first_withdrawal = v
            }
            (ScalarToggle::DepositMargin, ToggleValue::Percent(v)) => {
                scalars.deposit_margin_percent = v
            }
            (ScalarToggle::WithdrawalMargin, ToggleValue::Percent(v)) => {
                scalars.withdrawal_margin_percent = v
            }
            (ScalarToggle::DuplicateAccountChecks, ToggleValue::Flag(v)) => {
                scalars.duplicate_account_checks_enabled = v
            }
            (toggle, value) => {
                return Err(Error::InvalidValue(format!(
                    "{} does not accept {:?}",
                    toggle, value
                )))
            }
        }
        Ok(())
    }

    /// Copy this setting's value from one settings block to another
    pub fn copy(&self, from: &ScalarSettings, to: &mut ScalarSettings) {
        match self {
            ScalarToggle::RequireKycOnFirstWithdrawal => {
                to.require_kyc_on_first_withdrawal = from.require_kyc_on_first_withdrawal
            }
            ScalarToggle::DepositMargin => to.deposit_margin_percent = from.deposit_margin_percent,
            ScalarToggle::WithdrawalMargin => {
                to.withdrawal_margin_percent = from.withdrawal_margin_percent
            }
            ScalarToggle::DuplicateAccountChecks => {
                to.duplicate_account_checks_enabled = from.duplicate_account_checks_enabled
            }
        }
    }

    /// Parse a CLI/user supplied value for this toggle
    pub fn parse_value(&self, raw: &str) -> Result<ToggleValue> {
        let raw = raw.trim();
        if self.is_percent() {
            raw.trim_end_matches('%')
                .parse::<f64>()
                .map(ToggleValue::Percent)
                .map_err(|e| Error::InvalidValue(format!("{}: {}", self, e)))
        } else {
            match raw.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Ok(ToggleValue::Flag(true)),
                "false" | "off" | "no" | "0" => Ok(ToggleValue::Flag(false)),
                other => Err(Error::InvalidValue(format!(
                    "{} expects on/off, got {:?}",
                    self, other
                ))),
            }
        }
    }
}

impl std::fmt::Display for ScalarToggle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScalarToggle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ScalarToggle::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidValue(format!("Unknown setting: {}", s)))
    }
}

/// Value carried by a scalar setting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToggleValue {
    Flag(bool),
    Percent(f64),
}

impl std::fmt::Display for ToggleValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToggleValue::Flag(true) => write!(f, "on"),
            ToggleValue::Flag(false) => write!(f, "off"),
            ToggleValue::Percent(v) => write!(f, "{}%", v),
        }
    }
}

/// Independently saved slice of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubResource {
    GlobalStatus,
    Thresholds,
    ManualReview,
    ChainLimits(ChainId),
    GlobalLimits,
    PerChainValidation,
    Toggle(ScalarToggle),
}

impl std::fmt::Display for SubResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubResource::GlobalStatus => write!(f, "global status"),
            SubResource::Thresholds => write!(f, "thresholds"),
            SubResource::ManualReview => write!(f, "manual review"),
            SubResource::ChainLimits(chain) => write!(f, "{} limits", chain),
            SubResource::GlobalLimits => write!(f, "global limits"),
            SubResource::PerChainValidation => write!(f, "per-chain validation"),
            SubResource::Toggle(toggle) => write!(f, "{}", toggle),
        }
    }
}

/// Partial edit of the thresholds slice
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThresholdsPatch {
    pub cumulative_kyc_limit_cents: Option<u64>,
    pub cumulative_kyc_enabled: Option<bool>,
    pub kyc_daily_limit_cents: Option<u64>,
    pub kyc_daily_enabled: Option<bool>,
}

/// Partial edit of the manual review slice
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualReviewPatch {
    pub enabled: Option<bool>,
    pub single_threshold_cents: Option<u64>,
    pub daily_threshold_cents: Option<u64>,
}

/// A single user edit, targeting exactly one sub-resource
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    GlobalStatus {
        enabled: bool,
        reason: String,
    },
    Thresholds(ThresholdsPatch),
    ManualReview(ManualReviewPatch),
    ChainLimits {
        chain: ChainId,
        limits: LimitRecord,
    },
    GlobalLimits {
        min_amount_cents: Option<u64>,
        max_amount_cents: Option<u64>,
        enabled: Option<bool>,
    },
    PerChainValidation(bool),
    Toggle(ScalarToggle, ToggleValue),
}

impl Patch {
    pub fn target(&self) -> SubResource {
        match self {
            Patch::GlobalStatus { .. } => SubResource::GlobalStatus,
            Patch::Thresholds(_) => SubResource::Thresholds,
            Patch::ManualReview(_) => SubResource::ManualReview,
            Patch::ChainLimits { chain, .. } => SubResource::ChainLimits(chain.clone()),
            Patch::GlobalLimits { .. } => SubResource::GlobalLimits,
            Patch::PerChainValidation(_) => SubResource::PerChainValidation,
            Patch::Toggle(toggle, _) => SubResource::Toggle(*toggle),
        }
    }
}

/// Everything the settings screen edits for one brand
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    pub brand: Option<BrandId>,
    pub global_status: GlobalStatus,
    pub thresholds: Thresholds,
    pub manual_review: ManualReview,
    pub global_limits: LimitRecord,
    pub validation_mode: ValidationMode,
    pub chain_limits: HashMap<ChainId, LimitRecord>,
    pub scalars: ScalarSettings,
}

impl ConfigSnapshot {
    /// Load every slice for a brand, issuing the reads concurrently
    pub async fn fetch<S>(service: &S, brand: Option<&str>) -> Result<Self>
    where
        S: ConfigService + ?Sized,
    {
        let toggles = futures::future::try_join_all(
            ScalarToggle::ALL
                .into_iter()
                .map(|toggle| async move { Ok::<_, Error>((toggle, service.toggle(brand, toggle).await?)) }),
        );

        let (global_status, thresholds, chain_limits, global_limits, per_chain, toggles) =
            futures::try_join!(
                service.global_status(brand),
                service.thresholds(brand),
                service.chain_limits(brand),
                service.global_limits(brand),
                service.validation_enabled(brand),
                toggles,
            )?;

        let mut snapshot = ConfigSnapshot {
            brand: brand.map(str::to_string),
            global_status,
            thresholds: thresholds.thresholds,
            manual_review: thresholds.manual_review,
            global_limits: global_limits.record(),
            validation_mode: ValidationMode::from_flags(global_limits.enabled, per_chain),
            chain_limits,
            scalars: ScalarSettings::default(),
        };
        for (toggle, value) in toggles {
            toggle.write(&mut snapshot.scalars, value)?;
        }

        debug!(
            "Fetched snapshot for {}: {} chains, mode {}",
            brand.unwrap_or("default"),
            snapshot.chain_limits.len(),
            snapshot.validation_mode
        );

        Ok(snapshot)
    }

    pub fn global_limits(&self) -> GlobalLimits {
        GlobalLimits {
            min_amount_cents: self.global_limits.min_amount_cents,
            max_amount_cents: self.global_limits.max_amount_cents,
            enabled: self.validation_mode.global_enabled(),
        }
    }

    pub fn per_chain_validation_enabled(&self) -> bool {
        self.validation_mode.per_chain_enabled()
    }

    /// Apply an edit to this snapshot
    ///
    /// A patch that would enable both limit levels is rejected as a whole and
    /// leaves the snapshot untouched.
    pub fn apply(&mut self, patch: &Patch) -> Result<()> {
        match patch {
            Patch::GlobalStatus { enabled, reason } => {
                self.global_status.enabled = *enabled;
                self.global_status.reason = reason.clone();
            }
            Patch::Thresholds(p) => {
                let t = &mut self.thresholds;
                if let Some(v) = p.cumulative_kyc_limit_cents {
                    t.cumulative_kyc_limit_cents = v;
                }
                if let Some(v) = p.cumulative_kyc_enabled {
                    t.cumulative_kyc_enabled = v;
                }
                if let Some(v) = p.kyc_daily_limit_cents {
                    t.kyc_daily_limit_cents = v;
                }
                if let Some(v) = p.kyc_daily_enabled {
                    t.kyc_daily_enabled = v;
                }
            }
            Patch::ManualReview(p) => {
                let m = &mut self.manual_review;
                if let Some(v) = p.enabled {
                    m.enabled = v;
                }
                if let Some(v) = p.single_threshold_cents {
                    m.single_threshold_cents = v;
                }
                if let Some(v) = p.daily_threshold_cents {
                    m.daily_threshold_cents = v;
                }
            }
            Patch::ChainLimits { chain, limits } => {
                validate_chain_id(chain).map_err(|v| Error::Validation(vec![v]))?;
                self.chain_limits.insert(chain.clone(), *limits);
            }
            Patch::GlobalLimits {
                min_amount_cents,
                max_amount_cents,
                enabled,
            } => {
                let min = min_amount_cents.unwrap_or(self.global_limits.min_amount_cents);
                let max = max_amount_cents.unwrap_or(self.global_limits.max_amount_cents);
                let mode = match enabled {
                    Some(on) => self.validation_mode.set_global(*on).map_err(|exclusion| {
                        let mut violations = Vec::new();
                        let errors = validate_global_limits(min, max, true);
                        if !errors.is_empty() {
                            violations.push(LimitViolation::InvalidLimits {
                                scope: "global".to_string(),
                                errors,
                            });
                        }
                        violations.push(exclusion);
                        Error::Validation(violations)
                    })?,
                    None => self.validation_mode,
                };
                self.global_limits = LimitRecord::new(min, max);
                self.validation_mode = mode;
            }
            Patch::PerChainValidation(on) => {
                self.validation_mode = self
                    .validation_mode
                    .set_per_chain(*on)
                    .map_err(|v| Error::Validation(vec![v]))?;
            }
            Patch::Toggle(toggle, value) => toggle.write(&mut self.scalars, *value)?,
        }
        Ok(())
    }

    /// Rules currently broken by one slice, checked against the combined state
    pub fn violations(&self, sub: &SubResource) -> Vec<LimitViolation> {
        let mut violations = Vec::new();
        match sub {
            SubResource::GlobalStatus => {
                if self.global_status.reason.trim().is_empty() {
                    violations.push(LimitViolation::ReasonRequired);
                }
            }
            SubResource::Thresholds => {
                let t = &self.thresholds;
                if t.cumulative_kyc_enabled && t.cumulative_kyc_limit_cents == 0 {
                    violations.push(LimitViolation::NotPositive {
                        field: "cumulative KYC limit".to_string(),
                    });
                }
                if t.kyc_daily_enabled && t.kyc_daily_limit_cents == 0 {
                    violations.push(LimitViolation::NotPositive {
                        field: "KYC daily limit".to_string(),
                    });
                }
            }
            SubResource::ManualReview => {
                let m = &self.manual_review;
                if m.enabled && m.single_threshold_cents == 0 {
                    violations.push(LimitViolation::NotPositive {
                        field: "manual review single threshold".to_string(),
                    });
                }
                if m.enabled && m.daily_threshold_cents == 0 {
                    violations.push(LimitViolation::NotPositive {
                        field: "manual review daily threshold".to_string(),
                    });
                }
            }
            SubResource::ChainLimits(chain) => {
                if let Err(v) = validate_chain_id(chain) {
                    violations.push(v);
                }
                if let Some(record) = self.chain_limits.get(chain) {
                    let errors =
                        validate_limit_pair(record.min_amount_cents, record.max_amount_cents);
                    if !errors.is_empty() {
                        violations.push(LimitViolation::InvalidLimits {
                            scope: chain.clone(),
                            errors,
                        });
                    }
                }
            }
            SubResource::GlobalLimits => {
                let g = self.global_limits();
                let errors = validate_global_limits(g.min_amount_cents, g.max_amount_cents, g.enabled);
                if !errors.is_empty() {
                    violations.push(LimitViolation::InvalidLimits {
                        scope: "global".to_string(),
                        errors,
                    });
                }
                if self.validation_mode == ValidationMode::Conflicting {
                    violations.push(LimitViolation::MutualExclusion {
                        requested: ValidationMode::GlobalLimits,
                        active: ValidationMode::PerChainLimits,
                    });
                }
            }
            SubResource::PerChainValidation => {
                if self.validation_mode == ValidationMode::Conflicting {
                    violations.push(LimitViolation::MutualExclusion {
                        requested: ValidationMode::PerChainLimits,
                        active: ValidationMode::GlobalLimits,
                    });
                }
            }
            SubResource::Toggle(toggle) => {
                if let ToggleValue::Percent(v) = toggle.read(&self.scalars) {
                    if let Err(violation) = validate_percent(toggle.as_str(), v) {
                        violations.push(violation);
                    }
                }
            }
        }
        violations
    }

    /// Min/max field errors for limit slices (empty for every other slice)
    pub fn field_errors(&self, sub: &SubResource) -> LimitErrors {
        self.violations(sub)
            .into_iter()
            .find_map(|v| match v {
                LimitViolation::InvalidLimits { errors, .. } => Some(errors),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Structural equality restricted to one slice
    pub fn slice_eq(&self, other: &ConfigSnapshot, sub: &SubResource) -> bool {
        match sub {
            SubResource::GlobalStatus => self.global_status.enabled == other.global_status.enabled,
            SubResource::Thresholds => self.thresholds == other.thresholds,
            SubResource::ManualReview => self.manual_review == other.manual_review,
            SubResource::ChainLimits(chain) => {
                self.chain_limits.get(chain) == other.chain_limits.get(chain)
            }
            SubResource::GlobalLimits => self.global_limits() == other.global_limits(),
            SubResource::PerChainValidation => {
                self.per_chain_validation_enabled() == other.per_chain_validation_enabled()
            }
            SubResource::Toggle(toggle) => {
                toggle.read(&self.scalars) == toggle.read(&other.scalars)
            }
        }
    }

    /// Overwrite one slice with the value held by `other`
    pub fn copy_slice_from(&mut self, other: &ConfigSnapshot, sub: &SubResource) {
        match sub {
            SubResource::GlobalStatus => self.global_status = other.global_status.clone(),
            SubResource::Thresholds => self.thresholds = other.thresholds,
            SubResource::ManualReview => self.manual_review = other.manual_review,
            SubResource::ChainLimits(chain) => match other.chain_limits.get(chain) {
                Some(record) => {
                    self.chain_limits.insert(chain.clone(), *record);
                }
                None => {
                    self.chain_limits.remove(chain);
                }
            },
            SubResource::GlobalLimits => {
                self.global_limits = other.global_limits;
                self.validation_mode = ValidationMode::from_flags(
                    other.validation_mode.global_enabled(),
                    self.validation_mode.per_chain_enabled(),
                );
            }
            SubResource::PerChainValidation => {
                self.validation_mode = ValidationMode::from_flags(
                    self.validation_mode.global_enabled(),
                    other.validation_mode.per_chain_enabled(),
                );
            }
            SubResource::Toggle(toggle) => toggle.copy(&other.scalars, &mut self.scalars),
        }
    }
}
