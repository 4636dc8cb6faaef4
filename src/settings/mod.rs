//! Per-brand settings: snapshot, dirty tracking, and the save controller

pub mod controller;
pub mod dirty;
pub mod snapshot;

pub use controller::{Phase, SettingsController};
pub use dirty::DirtyTracker;
pub use snapshot::{
    BrandId, ConfigSnapshot, GlobalStatus, ManualReview, ManualReviewPatch, Patch, ScalarSettings,
    ScalarToggle, SubResource, Thresholds, ThresholdsPatch, ToggleValue,
};
