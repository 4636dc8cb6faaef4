//! In-memory configuration backend
//!
//! Behaves like the admin API: it is the authority on the global/per-chain
//! exclusivity and rejects writes that would break it, no matter what the
//! client checked. Brands without their own entry read the platform default
//! and get a copy of it on first write.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Ack, ConfigService, ThresholdSettings, ThresholdsUpdate};
use crate::error::{Error, Result};
use crate::limits::{validate_percent, ChainId, GlobalLimits, LimitRecord};
use crate::settings::snapshot::{GlobalStatus, ScalarSettings, ScalarToggle, ToggleValue};

/// Stored configuration of one brand
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrandConfig {
    pub status: GlobalStatus,
    pub thresholds: ThresholdSettings,
    pub chain_limits: HashMap<ChainId, LimitRecord>,
    pub global_limits: GlobalLimits,
    pub validation_enabled: bool,
    pub scalars: ScalarSettings,
}

impl BrandConfig {
    /// Plausible platform defaults for offline use
    pub fn sample() -> Self {
        let mut chain_limits = HashMap::new();
        chain_limits.insert("ethereum".to_string(), LimitRecord::new(2_000, 5_000_000));
        chain_limits.insert("solana".to_string(), LimitRecord::new(500, 2_500_000));
        chain_limits.insert("tron".to_string(), LimitRecord::new(1_000, 1_000_000));

        let mut thresholds = ThresholdSettings::default();
        thresholds.thresholds.cumulative_kyc_limit_cents = 200_000;
        thresholds.thresholds.cumulative_kyc_enabled = true;
        thresholds.thresholds.kyc_daily_limit_cents = 100_000;
        thresholds.manual_review.single_threshold_cents = 500_000;
        thresholds.manual_review.daily_threshold_cents = 2_000_000;

        Self {
            status: GlobalStatus {
                enabled: true,
                ..Default::default()
            },
            thresholds,
            chain_limits,
            global_limits: GlobalLimits {
                min_amount_cents: 1_000,
                max_amount_cents: 1_000_000,
                enabled: false,
            },
            validation_enabled: true,
            scalars: ScalarSettings {
                require_kyc_on_first_withdrawal: true,
                deposit_margin_percent: 1.0,
                withdrawal_margin_percent: 1.5,
                duplicate_account_checks_enabled: true,
            },
        }
    }
}

/// Config backend held in memory
#[derive(Clone)]
pub struct InMemoryConfigService {
    brands: Arc<RwLock<HashMap<Option<String>, BrandConfig>>>,
    operator: String,
}

impl InMemoryConfigService {
    /// Create a backend whose platform default is `defaults`
    pub fn new(defaults: BrandConfig) -> Self {
        let mut brands = HashMap::new();
        brands.insert(None, defaults);
        Self {
            brands: Arc::new(RwLock::new(brands)),
            operator: "admin".to_string(),
        }
    }

    pub fn with_sample_data() -> Self {
        Self::new(BrandConfig::sample())
    }

    /// Name recorded as `pausedBy` when withdrawals are paused
    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = operator.into();
        self
    }

    /// Install a brand-specific configuration
    pub async fn seed(&self, brand: Option<&str>, config: BrandConfig) {
        self.brands
            .write()
            .await
            .insert(brand.map(str::to_string), config);
    }

    /// Current stored configuration for a brand (platform default if unset)
    pub async fn stored(&self, brand: Option<&str>) -> BrandConfig {
        let brands = self.brands.read().await;
        brands
            .get(&brand.map(str::to_string))
            .or_else(|| brands.get(&None))
            .cloned()
            .unwrap_or_default()
    }

    /// Run a write against a brand's entry, creating it from the default
    async fn update<T>(
        &self,
        brand: Option<&str>,
        f: impl FnOnce(&mut BrandConfig) -> Result<T>,
    ) -> Result<T> {
        let mut brands = self.brands.write().await;
        let key = brand.map(str::to_string);
        if !brands.contains_key(&key) {
            let defaults = brands.get(&None).cloned().unwrap_or_default();
            debug!("Creating config for brand {:?} from platform default", brand);
            brands.insert(key.clone(), defaults);
        }
        let config = brands
            .get_mut(&key)
            .ok_or_else(|| Error::Internal("brand entry missing after insert".to_string()))?;
        f(config)
    }
}

impl Default for InMemoryConfigService {
    fn default() -> Self {
        Self::new(BrandConfig::default())
    }
}

#[async_trait]
impl ConfigService for InMemoryConfigService {
    async fn global_status(&self, brand: Option<&str>) -> Result<GlobalStatus> {
        Ok(self.stored(brand).await.status)
    }

    async fn toggle_global_status(&self, brand: Option<&str>, reason: &str) -> Result<Ack> {
        if reason.trim().is_empty() {
            return Ok(Ack::rejected("Reason is required"));
        }
        let operator = self.operator.clone();
        self.update(brand, |config| {
            let status = &mut config.status;
            status.enabled = !status.enabled;
            status.reason = reason.to_string();
            if status.enabled {
                status.paused_by.clear();
                status.paused_at = None;
                info!("Withdrawals resumed for {:?}: {}", brand, reason);
                Ok(Ack::ok("Withdrawals resumed"))
            } else {
                status.paused_by = operator;
                status.paused_at = Some(chrono::Utc::now());
                info!("Withdrawals paused for {:?}: {}", brand, reason);
                Ok(Ack::ok("Withdrawals paused"))
            }
        })
        .await
    }

    async fn thresholds(&self, brand: Option<&str>) -> Result<ThresholdSettings> {
        Ok(self.stored(brand).await.thresholds)
    }

    async fn update_thresholds(
        &self,
        brand: Option<&str>,
        update: &ThresholdsUpdate,
    ) -> Result<Ack> {
        if update.is_empty() {
            return Ok(Ack::rejected("No threshold fields supplied"));
        }
        self.update(brand, |config| {
            update.apply_to(&mut config.thresholds);
            Ok(Ack::ok("Thresholds updated"))
        })
        .await
    }

    async fn chain_limits(&self, brand: Option<&str>) -> Result<HashMap<ChainId, LimitRecord>> {
        Ok(self.stored(brand).await.chain_limits)
    }

    async fn chain_limit(&self, brand: Option<&str>, chain: &str) -> Result<LimitRecord> {
        self.stored(brand)
            .await
            .chain_limits
            .get(chain)
            .copied()
            .ok_or_else(|| Error::RemoteRejection(format!("Unknown chain: {}", chain)))
    }

    async fn update_chain_limits(
        &self,
        brand: Option<&str>,
        chain: &str,
        limits: LimitRecord,
    ) -> Result<Ack> {
        if limits.min_amount_cents > limits.max_amount_cents {
            return Ok(Ack::rejected("Minimum amount cannot exceed maximum amount"));
        }
        self.update(brand, |config| {
            config.chain_limits.insert(chain.to_string(), limits);
            Ok(Ack::ok(format!("Limits updated for {}", chain)))
        })
        .await
    }

    async fn global_limits(&self, brand: Option<&str>) -> Result<GlobalLimits> {
        Ok(self.stored(brand).await.global_limits)
    }

    async fn update_global_limits(
        &self,
        brand: Option<&str>,
        limits: GlobalLimits,
    ) -> Result<GlobalLimits> {
        self.update(brand, |config| {
            if limits.enabled && config.validation_enabled {
                return Err(Error::RemoteRejection(
                    "Cannot enable global limits while per-chain validation is enabled"
                        .to_string(),
                ));
            }
            if limits.enabled
                && (limits.min_amount_cents == 0
                    || limits.min_amount_cents > limits.max_amount_cents)
            {
                return Err(Error::RemoteRejection("Invalid global limits".to_string()));
            }
            config.global_limits = limits;
            Ok(limits)
        })
        .await
    }

    async fn validation_enabled(&self, brand: Option<&str>) -> Result<bool> {
        Ok(self.stored(brand).await.validation_enabled)
    }

    async fn toggle_validation(&self, brand: Option<&str>, enabled: bool) -> Result<bool> {
        self.update(brand, |config| {
            if enabled && config.global_limits.enabled {
                return Err(Error::RemoteRejection(
                    "Cannot enable per-chain validation while global limits are enabled"
                        .to_string(),
                ));
            }
            config.validation_enabled = enabled;
            Ok(enabled)
        })
        .await
    }

    async fn toggle(&self, brand: Option<&str>, toggle: ScalarToggle) -> Result<ToggleValue> {
        Ok(toggle.read(&self.stored(brand).await.scalars))
    }

    async fn set_toggle(
        &self,
        brand: Option<&str>,
        toggle: ScalarToggle,
        value: ToggleValue,
    ) -> Result<ToggleValue> {
        if let ToggleValue::Percent(v) = value {
            validate_percent(toggle.as_str(), v)
                .map_err(|e| Error::RemoteRejection(e.to_string()))?;
        }
        self.update(brand, |config| {
            toggle.write(&mut config.scalars, value)?;
            Ok(toggle.read(&config.scalars))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_brand_reads_platform_default() {
        let service = InMemoryConfigService::with_sample_data();
        let limits = service.chain_limits(Some("acme")).await.unwrap();
        assert_eq!(limits.len(), 3);
    }

    #[tokio::test]
    async fn test_brand_writes_are_isolated() {
        let service = InMemoryConfigService::with_sample_data();
        service
            .update_chain_limits(Some("acme"), "ethereum", LimitRecord::new(1, 2))
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(
            service.chain_limit(Some("acme"), "ethereum").await.unwrap(),
            LimitRecord::new(1, 2)
        );
        assert_eq!(
            service.chain_limit(None, "ethereum").await.unwrap(),
            LimitRecord::new(2_000, 5_000_000)
        );
    }

    #[tokio::test]
    async fn test_backend_enforces_exclusivity() {
        let service = InMemoryConfigService::with_sample_data();
        let result = service
            .update_global_limits(
                None,
                GlobalLimits {
                    min_amount_cents: 100,
                    max_amount_cents: 200,
                    enabled: true,
                },
            )
            .await;
        assert!(matches!(result, Err(Error::RemoteRejection(_))));
    }

    #[tokio::test]
    async fn test_toggle_global_status_records_pause() {
        let service = InMemoryConfigService::with_sample_data().with_operator("ops@acme");
        let ack = service
            .toggle_global_status(Some("acme"), "hot wallet drained")
            .await
            .unwrap();
        assert!(ack.success);

        let status = service.global_status(Some("acme")).await.unwrap();
        assert!(!status.enabled);
        assert_eq!(status.paused_by, "ops@acme");
        assert!(status.paused_at.is_some());

        let ack = service.toggle_global_status(Some("acme"), "  ").await.unwrap();
        assert!(!ack.success);
    }

    #[tokio::test]
    async fn test_set_toggle_rejects_bad_percent() {
        let service = InMemoryConfigService::with_sample_data();
        let result = service
            .set_toggle(None, ScalarToggle::DepositMargin, ToggleValue::Percent(101.0))
            .await;
        assert!(matches!(result, Err(Error::RemoteRejection(_))));
    }
}
