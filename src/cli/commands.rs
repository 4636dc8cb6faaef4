//! CLI command implementations

use anyhow::{Context, Result};
use dialoguer::Confirm;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::limits::{LimitRecord, LimitViolation};
use crate::service::{ConfigService, HttpConfigService, InMemoryConfigService};
use crate::settings::{
    ConfigSnapshot, ManualReviewPatch, Patch, ScalarToggle, SettingsController, SubResource,
    ThresholdsPatch,
};

/// Options shared by every command
#[derive(Debug, Clone, Default)]
pub struct SessionArgs {
    /// Brand to operate on; falls back to `session.default_brand`
    pub brand: Option<String>,
    /// Use the in-memory sample backend instead of the admin API
    pub offline: bool,
}

impl SessionArgs {
    fn brand(&self, config: &Config) -> Option<String> {
        self.brand
            .clone()
            .or_else(|| config.session.default_brand.clone())
    }
}

/// Threshold edits, all optional
#[derive(Debug, Clone, Default)]
pub struct ThresholdsEdit {
    pub cumulative_kyc_limit: Option<String>,
    pub cumulative_kyc_enabled: Option<bool>,
    pub kyc_daily_limit: Option<String>,
    pub kyc_daily_enabled: Option<bool>,
}

fn brand_label(brand: Option<&str>) -> &str {
    brand.unwrap_or("platform default")
}

fn build_service(config: &Config, offline: bool) -> Result<Arc<dyn ConfigService>> {
    if offline {
        warn!("Running OFFLINE against sample data - changes are not persisted");
        return Ok(Arc::new(InMemoryConfigService::with_sample_data()));
    }
    let service =
        HttpConfigService::new(&config.backend).context("Failed to create backend client")?;
    Ok(Arc::new(service))
}

async fn open(config: &Config, args: &SessionArgs) -> Result<SettingsController> {
    let controller = SettingsController::new(build_service(config, args.offline)?);
    let brand = args.brand(config);
    controller
        .select_brand(brand.clone())
        .await
        .with_context(|| format!("Failed to load settings for {}", brand_label(brand.as_deref())))?;
    Ok(controller)
}

fn print_violations(violations: &[LimitViolation]) {
    for violation in violations {
        println!("  ✗ {}", violation);
    }
}

/// Apply one edit and save the sub-resource it touches
async fn apply_and_save(controller: &SettingsController, patch: Patch) -> Result<()> {
    let sub = patch.target();

    let violations = match controller.mutate(patch).await {
        Ok(violations) => violations,
        Err(Error::Validation(violations)) => {
            print_violations(&violations);
            anyhow::bail!("Edit to {} rejected", sub);
        }
        Err(e) => return Err(anyhow::Error::new(e).context(format!("Failed to edit {}", sub))),
    };

    if !violations.is_empty() {
        print_violations(&violations);
        anyhow::bail!("{} not saved, fix the errors above", sub);
    }

    if !controller.is_dirty(&sub).await {
        println!("{} already up to date, nothing to save", sub);
        return Ok(());
    }

    debug!("Saving {}", sub);
    controller
        .save(sub.clone())
        .await
        .with_context(|| format!("Failed to save {}", sub))?;

    println!("Saved {}", sub);
    Ok(())
}

/// Parse an amount in major units ("50", "12.5", "1,000.00") into cents
pub fn parse_amount(raw: &str) -> Result<u64> {
    let cleaned = raw.trim().replace(',', "");
    let (whole, frac) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));

    if whole.is_empty() && frac.is_empty() {
        anyhow::bail!("Invalid amount: {:?}", raw);
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        anyhow::bail!("Invalid amount: {:?}", raw);
    }
    if frac.len() > 2 {
        anyhow::bail!("Amounts take at most 2 decimal places: {}", raw);
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .with_context(|| format!("Invalid amount: {:?}", raw))?
    };
    let cents: u64 = if frac.is_empty() {
        0
    } else {
        format!("{:0<2}", frac)
            .parse()
            .with_context(|| format!("Invalid amount: {:?}", raw))?
    };

    whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(cents))
        .with_context(|| format!("Amount too large: {}", raw))
}

pub fn format_cents(cents: u64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn print_snapshot(snapshot: &ConfigSnapshot) {
    println!(
        "\n=== WITHDRAWAL SETTINGS: {} ===\n",
        brand_label(snapshot.brand.as_deref())
    );

    let status = &snapshot.global_status;
    if status.enabled {
        println!("Withdrawals: ENABLED");
    } else {
        println!("Withdrawals: PAUSED");
        if !status.paused_by.is_empty() {
            println!("  Paused by: {}", status.paused_by);
        }
        if let Some(at) = status.paused_at {
            println!("  Paused at: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    if !status.reason.is_empty() {
        println!("  Reason: {}", status.reason);
    }

    println!("\nLimit mode: {}", snapshot.validation_mode);
    if snapshot.validation_mode == crate::limits::ValidationMode::Conflicting {
        println!("  ! Both global limits and per-chain validation are enabled on the backend.");
        println!("  ! Disable one of them to resolve.");
    }
    println!(
        "Global limits: {} - {} ({})",
        format_cents(snapshot.global_limits.min_amount_cents),
        format_cents(snapshot.global_limits.max_amount_cents),
        on_off(snapshot.validation_mode.global_enabled())
    );

    println!("\nPer-chain limits:");
    if snapshot.chain_limits.is_empty() {
        println!("  (none)");
    }
    let mut chains: Vec<_> = snapshot.chain_limits.iter().collect();
    chains.sort_by(|a, b| a.0.cmp(b.0));
    for (chain, record) in chains {
        println!(
            "  {:<16} {} - {}",
            chain,
            format_cents(record.min_amount_cents),
            format_cents(record.max_amount_cents)
        );
    }

    let t = &snapshot.thresholds;
    println!("\nThresholds:");
    println!(
        "  Cumulative KYC limit: {} ({})",
        format_cents(t.cumulative_kyc_limit_cents),
        on_off(t.cumulative_kyc_enabled)
    );
    println!(
        "  KYC daily limit:      {} ({})",
        format_cents(t.kyc_daily_limit_cents),
        on_off(t.kyc_daily_enabled)
    );

    let m = &snapshot.manual_review;
    println!("\nManual review: {}", on_off(m.enabled));
    println!("  Single withdrawal above: {}", format_cents(m.single_threshold_cents));
    println!("  Daily total above:       {}", format_cents(m.daily_threshold_cents));

    println!("\nSettings:");
    for toggle in ScalarToggle::ALL {
        println!("  {:<30} {}", toggle, toggle.read(&snapshot.scalars));
    }
    println!();
}

/// Show the current settings of a brand
pub async fn show(config: &Config, args: &SessionArgs) -> Result<()> {
    let controller = open(config, args).await?;
    let snapshot = controller.live().await.context("Settings not loaded")?;
    print_snapshot(&snapshot);
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check that the admin API is reachable
pub async fn health(config: &Config, args: &SessionArgs) -> Result<()> {
    println!("\n=== BACKEND HEALTH CHECK ===\n");

    let service = build_service(config, args.offline)?;
    let brand = args.brand(config);

    print!("Admin API ({})... ", brand_label(brand.as_deref()));
    let start = Instant::now();
    match service.global_status(brand.as_deref()).await {
        Ok(status) => {
            println!(
                "OK ({}ms, withdrawals {})",
                start.elapsed().as_millis(),
                if status.enabled { "enabled" } else { "paused" }
            );
            Ok(())
        }
        Err(e) => {
            println!("FAILED: {}", e);
            anyhow::bail!("Backend health check failed")
        }
    }
}

/// Edit global limits
pub async fn global_limits(
    config: &Config,
    args: &SessionArgs,
    min: Option<&str>,
    max: Option<&str>,
    enabled: Option<bool>,
) -> Result<()> {
    if min.is_none() && max.is_none() && enabled.is_none() {
        anyhow::bail!("Nothing to change: pass --min, --max or --enabled");
    }
    let patch = Patch::GlobalLimits {
        min_amount_cents: min.map(parse_amount).transpose()?,
        max_amount_cents: max.map(parse_amount).transpose()?,
        enabled,
    };

    let controller = open(config, args).await?;
    apply_and_save(&controller, patch).await
}

/// Edit the limits of one chain
pub async fn chain_limits(
    config: &Config,
    args: &SessionArgs,
    chain: &str,
    min: Option<&str>,
    max: Option<&str>,
) -> Result<()> {
    if min.is_none() && max.is_none() {
        anyhow::bail!("Nothing to change: pass --min and/or --max");
    }

    let controller = open(config, args).await?;
    let current = controller
        .live()
        .await
        .and_then(|snapshot| snapshot.chain_limits.get(chain).copied());

    let limits = match (current, min, max) {
        (_, Some(min), Some(max)) => LimitRecord::new(parse_amount(min)?, parse_amount(max)?),
        (Some(current), min, max) => LimitRecord::new(
            min.map(parse_amount)
                .transpose()?
                .unwrap_or(current.min_amount_cents),
            max.map(parse_amount)
                .transpose()?
                .unwrap_or(current.max_amount_cents),
        ),
        (None, _, _) => anyhow::bail!("{} has no limits yet: pass both --min and --max", chain),
    };

    apply_and_save(
        &controller,
        Patch::ChainLimits {
            chain: chain.to_string(),
            limits,
        },
    )
    .await
}

/// Turn per-chain validation on or off
pub async fn validation(config: &Config, args: &SessionArgs, enabled: bool) -> Result<()> {
    let controller = open(config, args).await?;
    apply_and_save(&controller, Patch::PerChainValidation(enabled)).await
}

/// Pause all withdrawals for a brand
pub async fn pause(config: &Config, args: &SessionArgs, reason: &str, force: bool) -> Result<()> {
    let controller = open(config, args).await?;
    let brand = controller.brand().await;
    let label = brand_label(brand.as_deref());

    let live = controller.live().await.context("Settings not loaded")?;
    if !live.global_status.enabled {
        println!("Withdrawals are already paused for {}", label);
        return Ok(());
    }

    // Confirmation prompt (unless --force)
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Pause ALL withdrawals for {}? Users will not be able to withdraw.",
                label
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Pause cancelled by user");
            return Ok(());
        }
    }

    apply_and_save(
        &controller,
        Patch::GlobalStatus {
            enabled: false,
            reason: reason.to_string(),
        },
    )
    .await?;

    if let Some(snapshot) = controller.live().await {
        let status = snapshot.global_status;
        warn!("Withdrawals PAUSED for {} by {}", label, status.paused_by);
    }
    Ok(())
}

/// Resume withdrawals for a brand
pub async fn resume(config: &Config, args: &SessionArgs, reason: &str) -> Result<()> {
    let controller = open(config, args).await?;
    apply_and_save(
        &controller,
        Patch::GlobalStatus {
            enabled: true,
            reason: reason.to_string(),
        },
    )
    .await
}

/// Edit KYC thresholds
pub async fn thresholds(config: &Config, args: &SessionArgs, edit: ThresholdsEdit) -> Result<()> {
    let patch = ThresholdsPatch {
        cumulative_kyc_limit_cents: edit
            .cumulative_kyc_limit
            .as_deref()
            .map(parse_amount)
            .transpose()?,
        cumulative_kyc_enabled: edit.cumulative_kyc_enabled,
        kyc_daily_limit_cents: edit.kyc_daily_limit.as_deref().map(parse_amount).transpose()?,
        kyc_daily_enabled: edit.kyc_daily_enabled,
    };
    if patch == ThresholdsPatch::default() {
        anyhow::bail!("Nothing to change");
    }

    let controller = open(config, args).await?;
    apply_and_save(&controller, Patch::Thresholds(patch)).await
}

/// Edit manual review thresholds
pub async fn manual_review(
    config: &Config,
    args: &SessionArgs,
    enabled: Option<bool>,
    single: Option<&str>,
    daily: Option<&str>,
) -> Result<()> {
    let patch = ManualReviewPatch {
        enabled,
        single_threshold_cents: single.map(parse_amount).transpose()?,
        daily_threshold_cents: daily.map(parse_amount).transpose()?,
    };
    if patch == ManualReviewPatch::default() {
        anyhow::bail!("Nothing to change");
    }

    let controller = open(config, args).await?;
    apply_and_save(&controller, Patch::ManualReview(patch)).await
}

/// Set one scalar setting
pub async fn toggle(config: &Config, args: &SessionArgs, name: &str, value: &str) -> Result<()> {
    let toggle: ScalarToggle = name.parse()?;
    let value = toggle.parse_value(value)?;

    let controller = open(config, args).await?;
    apply_and_save(&controller, Patch::Toggle(toggle, value)).await?;

    if let Some(snapshot) = controller.live().await {
        debug!(
            "{} is now {}",
            SubResource::Toggle(toggle),
            toggle.read(&snapshot.scalars)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline() -> SessionArgs {
        SessionArgs {
            brand: Some("acme".to_string()),
            offline: true,
        }
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("50").unwrap(), 5_000);
        assert_eq!(parse_amount("12.5").unwrap(), 1_250);
        assert_eq!(parse_amount("0.07").unwrap(), 7);
        assert_eq!(parse_amount("1,000.00").unwrap(), 100_000);
        assert_eq!(parse_amount(".5").unwrap(), 50);
        assert!(parse_amount("1.234").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("").is_err());
        assert!(parse_amount("+5").is_err());
        assert!(parse_amount("1.+5").is_err());
        assert!(parse_amount("1 000").is_err());
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(5_000), "50.00");
        assert_eq!(format_cents(7), "0.07");
    }

    #[tokio::test]
    async fn test_offline_chain_limits_edit() {
        let config = Config::default();
        chain_limits(&config, &offline(), "ethereum", Some("25"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_offline_inverted_limits_rejected() {
        let config = Config::default();
        let result = chain_limits(&config, &offline(), "ethereum", Some("500"), Some("5")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_offline_enable_global_with_per_chain_on_rejected() {
        let config = Config::default();
        let result = global_limits(&config, &offline(), None, None, Some(true)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_offline_pause_with_force() {
        let config = Config::default();
        pause(&config, &offline(), "incident 42", true).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_toggle_rejected() {
        let config = Config::default();
        assert!(toggle(&config, &offline(), "turbo-mode", "on").await.is_err());
    }
}
