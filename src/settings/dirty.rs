//! Dirty tracking against the last fetched/saved baseline

use crate::limits::ValidationMode;
use crate::service::ThresholdsUpdate;

use super::snapshot::{ConfigSnapshot, ScalarToggle, SubResource};

/// Holds the persisted baseline and compares live edits against it, one
/// sub-resource at a time
#[derive(Debug, Clone)]
pub struct DirtyTracker {
    original: ConfigSnapshot,
}

impl DirtyTracker {
    pub fn new(original: ConfigSnapshot) -> Self {
        Self { original }
    }

    pub fn original(&self) -> &ConfigSnapshot {
        &self.original
    }

    pub fn is_dirty(&self, live: &ConfigSnapshot, sub: &SubResource) -> bool {
        !live.slice_eq(&self.original, sub)
    }

    /// Every sub-resource with unsaved edits
    pub fn dirty_resources(&self, live: &ConfigSnapshot) -> Vec<SubResource> {
        let mut candidates = vec![
            SubResource::GlobalStatus,
            SubResource::Thresholds,
            SubResource::ManualReview,
            SubResource::GlobalLimits,
            SubResource::PerChainValidation,
        ];
        candidates.extend(ScalarToggle::ALL.into_iter().map(SubResource::Toggle));

        let mut chains: Vec<_> = live
            .chain_limits
            .keys()
            .chain(self.original.chain_limits.keys())
            .cloned()
            .collect();
        chains.sort();
        chains.dedup();
        candidates.extend(chains.into_iter().map(SubResource::ChainLimits));

        candidates
            .into_iter()
            .filter(|sub| self.is_dirty(live, sub))
            .collect()
    }

    /// Minimal thresholds payload: only fields that changed
    pub fn thresholds_delta(&self, live: &ConfigSnapshot) -> ThresholdsUpdate {
        let (new, old) = (&live.thresholds, &self.original.thresholds);
        ThresholdsUpdate {
            cumulative_kyc_limit_cents: changed(
                new.cumulative_kyc_limit_cents,
                old.cumulative_kyc_limit_cents,
            ),
            cumulative_kyc_enabled: changed(new.cumulative_kyc_enabled, old.cumulative_kyc_enabled),
            kyc_daily_limit_cents: changed(new.kyc_daily_limit_cents, old.kyc_daily_limit_cents),
            kyc_daily_enabled: changed(new.kyc_daily_enabled, old.kyc_daily_enabled),
            manual_review: None,
        }
    }

    /// Manual review is sent as a whole block
    pub fn manual_review_delta(&self, live: &ConfigSnapshot) -> ThresholdsUpdate {
        ThresholdsUpdate {
            manual_review: changed(live.manual_review, self.original.manual_review),
            ..Default::default()
        }
    }

    /// Replace the baseline of exactly one sub-resource
    pub fn commit(&mut self, saved: &ConfigSnapshot, sub: &SubResource) {
        self.original.copy_slice_from(saved, sub);
    }

    /// Slices restored when reverting `sub`
    ///
    /// The two limit switches revert together when restoring one alone would
    /// leave both levels enabled while the baseline has only one.
    pub fn revert_scope(&self, live: &ConfigSnapshot, sub: &SubResource) -> Vec<SubResource> {
        let original = self.original.validation_mode;
        let (global, per_chain, coupled) = match sub {
            SubResource::GlobalLimits => (
                original.global_enabled(),
                live.validation_mode.per_chain_enabled(),
                SubResource::PerChainValidation,
            ),
            SubResource::PerChainValidation => (
                live.validation_mode.global_enabled(),
                original.per_chain_enabled(),
                SubResource::GlobalLimits,
            ),
            _ => return vec![sub.clone()],
        };

        if global && per_chain && original != ValidationMode::Conflicting {
            vec![sub.clone(), coupled]
        } else {
            vec![sub.clone()]
        }
    }

    /// Restore one sub-resource of `live` to its baseline, returning every
    /// slice that was restored
    pub fn revert(&self, live: &mut ConfigSnapshot, sub: &SubResource) -> Vec<SubResource> {
        let scope = self.revert_scope(live, sub);
        for slice in &scope {
            live.copy_slice_from(&self.original, slice);
        }
        scope
    }
}

fn changed<T: PartialEq>(new: T, old: T) -> Option<T> {
    (new != old).then_some(new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::LimitRecord;
    use crate::settings::snapshot::{Patch, ThresholdsPatch, ToggleValue};

    fn baseline() -> ConfigSnapshot {
        let mut snap = ConfigSnapshot::default();
        snap.chain_limits
            .insert("ethereum".to_string(), LimitRecord::new(1_000, 10_000));
        snap.chain_limits
            .insert("bitcoin".to_string(), LimitRecord::new(5_000, 50_000));
        snap.thresholds.kyc_daily_limit_cents = 100_000;
        snap
    }

    #[test]
    fn test_fresh_tracker_is_clean() {
        let live = baseline();
        let tracker = DirtyTracker::new(live.clone());
        assert!(tracker.dirty_resources(&live).is_empty());
    }

    #[test]
    fn test_chain_dirtiness_is_per_chain() {
        let mut live = baseline();
        let tracker = DirtyTracker::new(live.clone());
        live.apply(&Patch::ChainLimits {
            chain: "ethereum".to_string(),
            limits: LimitRecord::new(2_000, 10_000),
        })
        .unwrap();

        assert!(tracker.is_dirty(&live, &SubResource::ChainLimits("ethereum".into())));
        assert!(!tracker.is_dirty(&live, &SubResource::ChainLimits("bitcoin".into())));
        assert_eq!(
            tracker.dirty_resources(&live),
            vec![SubResource::ChainLimits("ethereum".into())]
        );
    }

    #[test]
    fn test_reapplying_original_value_is_clean() {
        let mut live = baseline();
        let tracker = DirtyTracker::new(live.clone());
        live.apply(&Patch::Toggle(ScalarToggle::WithdrawalMargin, ToggleValue::Percent(5.0)))
            .unwrap();
        live.apply(&Patch::Toggle(ScalarToggle::WithdrawalMargin, ToggleValue::Percent(0.0)))
            .unwrap();
        assert!(!tracker.is_dirty(&live, &SubResource::Toggle(ScalarToggle::WithdrawalMargin)));
    }

    #[test]
    fn test_new_chain_is_dirty() {
        let mut live = baseline();
        let tracker = DirtyTracker::new(live.clone());
        live.apply(&Patch::ChainLimits {
            chain: "tron".to_string(),
            limits: LimitRecord::new(1, 2),
        })
        .unwrap();
        assert!(tracker.is_dirty(&live, &SubResource::ChainLimits("tron".into())));
    }

    #[test]
    fn test_commit_replaces_only_one_slice() {
        let mut live = baseline();
        let mut tracker = DirtyTracker::new(live.clone());
        live.apply(&Patch::ChainLimits {
            chain: "ethereum".to_string(),
            limits: LimitRecord::new(2_000, 10_000),
        })
        .unwrap();
        live.apply(&Patch::ChainLimits {
            chain: "bitcoin".to_string(),
            limits: LimitRecord::new(6_000, 50_000),
        })
        .unwrap();

        tracker.commit(&live, &SubResource::ChainLimits("ethereum".into()));
        assert!(!tracker.is_dirty(&live, &SubResource::ChainLimits("ethereum".into())));
        assert!(tracker.is_dirty(&live, &SubResource::ChainLimits("bitcoin".into())));
    }

    #[test]
    fn test_revert_restores_one_slice() {
        let mut live = baseline();
        let tracker = DirtyTracker::new(live.clone());
        live.apply(&Patch::Thresholds(ThresholdsPatch {
            kyc_daily_enabled: Some(true),
            ..Default::default()
        }))
        .unwrap();
        live.apply(&Patch::PerChainValidation(true)).unwrap();

        tracker.revert(&mut live, &SubResource::Thresholds);
        assert!(!tracker.is_dirty(&live, &SubResource::Thresholds));
        assert!(tracker.is_dirty(&live, &SubResource::PerChainValidation));
    }

    #[test]
    fn test_revert_switch_never_enables_both_levels() {
        let mut live = baseline();
        live.validation_mode = ValidationMode::PerChainLimits;
        let tracker = DirtyTracker::new(live.clone());

        live.apply(&Patch::PerChainValidation(false)).unwrap();
        live.apply(&Patch::GlobalLimits {
            min_amount_cents: Some(100),
            max_amount_cents: Some(900),
            enabled: Some(true),
        })
        .unwrap();

        let reverted = tracker.revert(&mut live, &SubResource::PerChainValidation);
        assert_eq!(
            reverted,
            vec![SubResource::PerChainValidation, SubResource::GlobalLimits]
        );
        assert_eq!(live.validation_mode, ValidationMode::PerChainLimits);
        assert!(tracker.dirty_resources(&live).is_empty());
    }

    #[test]
    fn test_revert_switch_alone_when_other_is_off() {
        let mut live = baseline();
        live.validation_mode = ValidationMode::PerChainLimits;
        let tracker = DirtyTracker::new(live.clone());

        live.apply(&Patch::PerChainValidation(false)).unwrap();
        live.apply(&Patch::GlobalLimits {
            min_amount_cents: Some(100),
            max_amount_cents: None,
            enabled: None,
        })
        .unwrap();

        let reverted = tracker.revert(&mut live, &SubResource::PerChainValidation);
        assert_eq!(reverted, vec![SubResource::PerChainValidation]);
        assert_eq!(live.validation_mode, ValidationMode::PerChainLimits);
        assert!(tracker.is_dirty(&live, &SubResource::GlobalLimits));
    }

    #[test]
    fn test_thresholds_delta_is_minimal() {
        let mut live = baseline();
        let tracker = DirtyTracker::new(live.clone());
        live.apply(&Patch::Thresholds(ThresholdsPatch {
            kyc_daily_limit_cents: Some(150_000),
            kyc_daily_enabled: Some(false),
            ..Default::default()
        }))
        .unwrap();

        let delta = tracker.thresholds_delta(&live);
        assert_eq!(
            delta,
            ThresholdsUpdate {
                kyc_daily_limit_cents: Some(150_000),
                ..Default::default()
            }
        );
        assert!(tracker.manual_review_delta(&live).is_empty());
    }
}
