//! Configuration backend contract
//!
//! The backend is the system of record. The engine only reads snapshots
//! from it and sends validated deltas; every call may fail.
//!
//! # Implementations
//!
//! ```text
//! ConfigService ─┬─ HttpConfigService      (REST admin API)
//!                └─ InMemoryConfigService  (offline mode, tests)
//! ```

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::limits::{ChainId, GlobalLimits, LimitRecord};
use crate::settings::snapshot::{GlobalStatus, ManualReview, ScalarToggle, Thresholds, ToggleValue};

pub use http::HttpConfigService;
pub use memory::InMemoryConfigService;

/// `{success, message}` envelope returned by mutating endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl Ack {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// Turn a non-success envelope into a remote rejection
    pub fn into_result(self) -> Result<String> {
        if self.success {
            Ok(self.message)
        } else if self.message.is_empty() {
            Err(Error::RemoteRejection("request rejected by backend".to_string()))
        } else {
            Err(Error::RemoteRejection(self.message))
        }
    }
}

/// Response of the thresholds read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdSettings {
    #[serde(flatten)]
    pub thresholds: Thresholds,
    pub manual_review: ManualReview,
}

/// Partial thresholds write; only the fields present are changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_kyc_limit_cents: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative_kyc_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kyc_daily_limit_cents: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kyc_daily_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_review: Option<ManualReview>,
}

impl ThresholdsUpdate {
    pub fn is_empty(&self) -> bool {
        self == &ThresholdsUpdate::default()
    }

    /// Apply onto stored settings (backend-side semantics)
    pub fn apply_to(&self, settings: &mut ThresholdSettings) {
        let t = &mut settings.thresholds;
        if let Some(v) = self.cumulative_kyc_limit_cents {
            t.cumulative_kyc_limit_cents = v;
        }
        if let Some(v) = self.cumulative_kyc_enabled {
            t.cumulative_kyc_enabled = v;
        }
        if let Some(v) = self.kyc_daily_limit_cents {
            t.kyc_daily_limit_cents = v;
        }
        if let Some(v) = self.kyc_daily_enabled {
            t.kyc_daily_enabled = v;
        }
        if let Some(m) = self.manual_review {
            settings.manual_review = m;
        }
    }
}

/// Command/query contract of the configuration backend
///
/// `brand = None` addresses the platform-wide default configuration.
#[async_trait]
pub trait ConfigService: Send + Sync {
    async fn global_status(&self, brand: Option<&str>) -> Result<GlobalStatus>;

    /// Flip the global withdrawal switch
    async fn toggle_global_status(&self, brand: Option<&str>, reason: &str) -> Result<Ack>;

    async fn thresholds(&self, brand: Option<&str>) -> Result<ThresholdSettings>;

    async fn update_thresholds(&self, brand: Option<&str>, update: &ThresholdsUpdate)
        -> Result<Ack>;

    async fn chain_limits(&self, brand: Option<&str>) -> Result<HashMap<ChainId, LimitRecord>>;

    async fn chain_limit(&self, brand: Option<&str>, chain: &str) -> Result<LimitRecord>;

    async fn update_chain_limits(
        &self,
        brand: Option<&str>,
        chain: &str,
        limits: LimitRecord,
    ) -> Result<Ack>;

    async fn global_limits(&self, brand: Option<&str>) -> Result<GlobalLimits>;

    /// Returns the stored value
    async fn update_global_limits(
        &self,
        brand: Option<&str>,
        limits: GlobalLimits,
    ) -> Result<GlobalLimits>;

    async fn validation_enabled(&self, brand: Option<&str>) -> Result<bool>;

    /// Returns the stored value
    async fn toggle_validation(&self, brand: Option<&str>, enabled: bool) -> Result<bool>;

    async fn toggle(&self, brand: Option<&str>, toggle: ScalarToggle) -> Result<ToggleValue>;

    /// Returns the stored value
    async fn set_toggle(
        &self,
        brand: Option<&str>,
        toggle: ScalarToggle,
        value: ToggleValue,
    ) -> Result<ToggleValue>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_into_result() {
        assert_eq!(Ack::ok("done").into_result().unwrap(), "done");
        assert!(matches!(
            Ack::rejected("per-chain validation is enabled").into_result(),
            Err(Error::RemoteRejection(msg)) if msg == "per-chain validation is enabled"
        ));
        assert!(matches!(
            Ack::rejected("").into_result(),
            Err(Error::RemoteRejection(_))
        ));
    }

    #[test]
    fn test_thresholds_update_skips_unset_fields() {
        let update = ThresholdsUpdate {
            kyc_daily_limit_cents: Some(250_000),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, serde_json::json!({ "kycDailyLimitCents": 250000 }));
        assert!(ThresholdsUpdate::default().is_empty());
    }

    #[test]
    fn test_threshold_settings_deserialize() {
        let json = r#"{
            "cumulativeKycLimitCents": 100000,
            "cumulativeKycEnabled": true,
            "kycDailyLimitCents": 50000,
            "kycDailyEnabled": false,
            "manualReview": {"enabled": true, "singleThresholdCents": 20000, "dailyThresholdCents": 80000}
        }"#;
        let settings: ThresholdSettings = serde_json::from_str(json).unwrap();
        assert!(settings.thresholds.cumulative_kyc_enabled);
        assert_eq!(settings.manual_review.daily_threshold_cents, 80_000);
    }
}
