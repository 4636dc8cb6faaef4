//! Fetch → edit → validate → save orchestration for one brand at a time
//!
//! The controller owns the live snapshot and its [`DirtyTracker`] baseline.
//! Every load and save is tagged with the session generation active at
//! dispatch. Selecting another brand bumps the generation, so results that
//! arrive for the previous brand are recognised and dropped.
//!
//! ```text
//! Unloaded ──select_brand──▶ Loading ──▶ Loaded ◀──▶ save(sub) in flight
//!                               │                     (one per sub-resource)
//!                               └──────▶ Error
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::limits::{ChainId, GlobalLimits, LimitErrors, LimitRecord, LimitViolation, ValidationMode};
use crate::service::{ConfigService, ThresholdsUpdate};

use super::dirty::DirtyTracker;
use super::snapshot::{BrandId, ConfigSnapshot, Patch, ScalarToggle, SubResource, ToggleValue};

/// Brand-level lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Unloaded,
    Loading,
    Loaded,
    /// Loading failed; select the brand again to retry
    Error(String),
}

/// Backend call needed to persist one sub-resource
#[derive(Debug, Clone)]
enum SaveRequest {
    ToggleGlobalStatus { reason: String },
    Thresholds(ThresholdsUpdate),
    ChainLimits { chain: ChainId, limits: LimitRecord },
    GlobalLimits(GlobalLimits),
    Validation(bool),
    Toggle(ScalarToggle, ToggleValue),
}

impl SaveRequest {
    fn build(live: &ConfigSnapshot, tracker: &DirtyTracker, sub: &SubResource) -> Self {
        match sub {
            SubResource::GlobalStatus => SaveRequest::ToggleGlobalStatus {
                reason: live.global_status.reason.trim().to_string(),
            },
            SubResource::Thresholds => SaveRequest::Thresholds(tracker.thresholds_delta(live)),
            SubResource::ManualReview => {
                SaveRequest::Thresholds(tracker.manual_review_delta(live))
            }
            SubResource::ChainLimits(chain) => SaveRequest::ChainLimits {
                chain: chain.clone(),
                limits: live.chain_limits.get(chain).copied().unwrap_or_default(),
            },
            SubResource::GlobalLimits => SaveRequest::GlobalLimits(live.global_limits()),
            SubResource::PerChainValidation => {
                SaveRequest::Validation(live.per_chain_validation_enabled())
            }
            SubResource::Toggle(toggle) => {
                SaveRequest::Toggle(*toggle, toggle.read(&live.scalars))
            }
        }
    }
}

struct Workspace {
    live: ConfigSnapshot,
    tracker: DirtyTracker,
}

struct Session {
    brand: Option<BrandId>,
    generation: u64,
    phase: Phase,
    workspace: Option<Workspace>,
    saving: HashSet<SubResource>,
    errors: HashMap<SubResource, String>,
    load_cancel: CancellationToken,
}

impl Session {
    fn loaded(&self) -> Result<&Workspace> {
        match (&self.phase, &self.workspace) {
            (Phase::Loaded, Some(ws)) => Ok(ws),
            _ => Err(Error::NotLoaded),
        }
    }
}

fn brand_label(brand: Option<&str>) -> &str {
    brand.unwrap_or("platform default")
}

/// Settings screen controller
pub struct SettingsController {
    service: Arc<dyn ConfigService>,
    session: RwLock<Session>,
}

impl SettingsController {
    pub fn new(service: Arc<dyn ConfigService>) -> Self {
        Self {
            service,
            session: RwLock::new(Session {
                brand: None,
                generation: 0,
                phase: Phase::Unloaded,
                workspace: None,
                saving: HashSet::new(),
                errors: HashMap::new(),
                load_cancel: CancellationToken::new(),
            }),
        }
    }

    /// Switch to a brand and load its configuration
    ///
    /// Any load still running for the previous brand is cancelled, and saves
    /// still in flight for it will be discarded when they complete.
    pub async fn select_brand(&self, brand: Option<BrandId>) -> Result<()> {
        let (generation, cancel) = {
            let mut session = self.session.write().await;
            session.load_cancel.cancel();
            session.generation += 1;
            session.brand = brand.clone();
            session.phase = Phase::Loading;
            session.workspace = None;
            session.saving.clear();
            session.errors.clear();
            session.load_cancel = CancellationToken::new();
            (session.generation, session.load_cancel.clone())
        };

        let label = brand_label(brand.as_deref());
        info!("Loading withdrawal settings for {}", label);

        let fetched = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Load for {} cancelled by brand switch", label);
                return Err(Error::StaleBrand);
            }
            result = ConfigSnapshot::fetch(self.service.as_ref(), brand.as_deref()) => result,
        };

        let mut session = self.session.write().await;
        if session.generation != generation {
            warn!("Discarding settings for {} - brand changed during load", label);
            return Err(Error::StaleBrand);
        }

        match fetched {
            Ok(snapshot) => {
                session.workspace = Some(Workspace {
                    tracker: DirtyTracker::new(snapshot.clone()),
                    live: snapshot,
                });
                session.phase = Phase::Loaded;
                info!("Loaded withdrawal settings for {}", label);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load settings for {}: {}", label, e);
                session.phase = Phase::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// Re-fetch the current brand, dropping unsaved edits
    pub async fn reload(&self) -> Result<()> {
        let brand = self.session.read().await.brand.clone();
        self.select_brand(brand).await
    }

    /// Apply an edit to the live snapshot
    ///
    /// Returns the rules the edited sub-resource currently breaks. Those do
    /// not reject the edit (values may be invalid mid-edit) but block saving.
    /// Edits that would enable both limit levels are rejected outright.
    pub async fn mutate(&self, patch: Patch) -> Result<Vec<LimitViolation>> {
        let mut guard = self.session.write().await;
        let session = &mut *guard;
        session.loaded()?;

        let sub = patch.target();
        if session.saving.contains(&sub) {
            return Err(Error::SaveInProgress(sub));
        }

        let ws = session.workspace.as_mut().ok_or(Error::NotLoaded)?;
        if let Err(e) = ws.live.apply(&patch) {
            debug!("Edit to {} rejected: {}", sub, e);
            return Err(e);
        }
        session.errors.remove(&sub);

        let violations = ws.live.violations(&sub);
        debug!(
            "Edited {} (dirty: {}, violations: {})",
            sub,
            ws.tracker.is_dirty(&ws.live, &sub),
            violations.len()
        );
        Ok(violations)
    }

    /// Throw away unsaved edits to one sub-resource
    pub async fn discard(&self, sub: &SubResource) -> Result<()> {
        let mut guard = self.session.write().await;
        let session = &mut *guard;
        session.loaded()?;
        let ws = session.workspace.as_mut().ok_or(Error::NotLoaded)?;

        let scope = ws.tracker.revert_scope(&ws.live, sub);
        if let Some(busy) = scope.iter().find(|s| session.saving.contains(*s)) {
            return Err(Error::SaveInProgress(busy.clone()));
        }
        for slice in ws.tracker.revert(&mut ws.live, sub) {
            session.errors.remove(&slice);
        }
        Ok(())
    }

    /// Persist one sub-resource
    ///
    /// Rejected locally, without contacting the backend, when nothing
    /// changed, when the edit breaks a rule, or when a save for the same
    /// sub-resource is already in flight.
    pub async fn save(&self, sub: SubResource) -> Result<()> {
        let (generation, brand, request, base) = {
            let mut guard = self.session.write().await;
            let session = &mut *guard;
            let ws = session.loaded()?;

            if session.saving.contains(&sub) {
                return Err(Error::SaveInProgress(sub));
            }
            if !ws.tracker.is_dirty(&ws.live, &sub) {
                return Err(Error::NotDirty(sub));
            }
            let violations = ws.live.violations(&sub);
            if !violations.is_empty() {
                return Err(Error::Validation(violations));
            }

            let request = SaveRequest::build(&ws.live, &ws.tracker, &sub);
            let base = ws.live.clone();
            session.saving.insert(sub.clone());
            session.errors.remove(&sub);
            (session.generation, session.brand.clone(), request, base)
        };

        let label = brand_label(brand.as_deref());
        debug!("Saving {} for {}", sub, label);
        let outcome = self.send(brand.as_deref(), request, base).await;

        let mut guard = self.session.write().await;
        let session = &mut *guard;
        if session.generation != generation {
            warn!("Discarding save of {} for {} - brand changed", sub, label);
            return Err(Error::StaleBrand);
        }
        session.saving.remove(&sub);
        let ws = session.workspace.as_mut().ok_or(Error::NotLoaded)?;

        match outcome {
            Ok(saved) => {
                ws.tracker.commit(&saved, &sub);
                ws.live.copy_slice_from(&saved, &sub);
                info!("Saved {} for {}", sub, label);
                Ok(())
            }
            Err(e @ Error::RemoteRejection(_)) => {
                warn!("Backend rejected {} for {}: {}", sub, label, e);
                let reverted = ws.tracker.revert(&mut ws.live, &sub);
                if reverted.len() > 1 {
                    debug!("Reverted {:?} together with {}", &reverted[1..], sub);
                }
                session.errors.insert(sub, e.to_string());
                Err(e)
            }
            Err(e) => {
                // Edits are kept so the user can retry
                warn!("Saving {} for {} failed: {}", sub, label, e);
                session.errors.insert(sub, e.to_string());
                Err(e)
            }
        }
    }

    /// Issue the write and return `base` with the saved slice set to the
    /// backend's authoritative value
    async fn send(
        &self,
        brand: Option<&str>,
        request: SaveRequest,
        mut saved: ConfigSnapshot,
    ) -> Result<ConfigSnapshot> {
        let service = self.service.as_ref();
        match request {
            SaveRequest::ToggleGlobalStatus { reason } => {
                service
                    .toggle_global_status(brand, &reason)
                    .await?
                    .into_result()?;
                // The write happened; a failed re-read must not turn it into a retry
                match service.global_status(brand).await {
                    Ok(status) => saved.global_status = status,
                    Err(e) => warn!("Global status saved but re-read failed: {}", e),
                }
            }
            SaveRequest::Thresholds(update) => {
                service.update_thresholds(brand, &update).await?.into_result()?;
                match service.thresholds(brand).await {
                    Ok(fresh) => {
                        saved.thresholds = fresh.thresholds;
                        saved.manual_review = fresh.manual_review;
                    }
                    Err(e) => warn!("Thresholds saved but re-read failed: {}", e),
                }
            }
            SaveRequest::ChainLimits { chain, limits } => {
                service
                    .update_chain_limits(brand, &chain, limits)
                    .await?
                    .into_result()?;
                let stored = match service.chain_limit(brand, &chain).await {
                    Ok(stored) => stored,
                    Err(e) => {
                        warn!("{} limits saved but re-read failed: {}", chain, e);
                        limits
                    }
                };
                saved.chain_limits.insert(chain, stored);
            }
            SaveRequest::GlobalLimits(limits) => {
                let stored = service.update_global_limits(brand, limits).await?;
                saved.global_limits = stored.record();
                saved.validation_mode = ValidationMode::from_flags(
                    stored.enabled,
                    saved.validation_mode.per_chain_enabled(),
                );
            }
            SaveRequest::Validation(enabled) => {
                let stored = service.toggle_validation(brand, enabled).await?;
                saved.validation_mode =
                    ValidationMode::from_flags(saved.validation_mode.global_enabled(), stored);
            }
            SaveRequest::Toggle(toggle, value) => {
                let stored = service.set_toggle(brand, toggle, value).await?;
                toggle.write(&mut saved.scalars, stored)?;
            }
        }
        Ok(saved)
    }

    pub async fn phase(&self) -> Phase {
        self.session.read().await.phase.clone()
    }

    pub async fn brand(&self) -> Option<BrandId> {
        self.session.read().await.brand.clone()
    }

    /// Copy of the live snapshot
    pub async fn live(&self) -> Option<ConfigSnapshot> {
        let session = self.session.read().await;
        session.loaded().ok().map(|ws| ws.live.clone())
    }

    /// Copy of the persisted baseline
    pub async fn original(&self) -> Option<ConfigSnapshot> {
        let session = self.session.read().await;
        session.loaded().ok().map(|ws| ws.tracker.original().clone())
    }

    pub async fn is_dirty(&self, sub: &SubResource) -> bool {
        let session = self.session.read().await;
        session
            .loaded()
            .map(|ws| ws.tracker.is_dirty(&ws.live, sub))
            .unwrap_or(false)
    }

    pub async fn dirty_resources(&self) -> Vec<SubResource> {
        let session = self.session.read().await;
        session
            .loaded()
            .map(|ws| ws.tracker.dirty_resources(&ws.live))
            .unwrap_or_default()
    }

    pub async fn is_saving(&self, sub: &SubResource) -> bool {
        self.session.read().await.saving.contains(sub)
    }

    /// Whether the save action for a sub-resource is enabled
    pub async fn can_save(&self, sub: &SubResource) -> bool {
        let session = self.session.read().await;
        match session.loaded() {
            Ok(ws) => {
                !session.saving.contains(sub)
                    && ws.tracker.is_dirty(&ws.live, sub)
                    && ws.live.violations(sub).is_empty()
            }
            Err(_) => false,
        }
    }

    pub async fn violations(&self, sub: &SubResource) -> Vec<LimitViolation> {
        let session = self.session.read().await;
        session
            .loaded()
            .map(|ws| ws.live.violations(sub))
            .unwrap_or_default()
    }

    /// Min/max field errors for a limit sub-resource
    pub async fn field_errors(&self, sub: &SubResource) -> LimitErrors {
        let session = self.session.read().await;
        session
            .loaded()
            .map(|ws| ws.live.field_errors(sub))
            .unwrap_or_default()
    }

    /// Last backend/transport error reported for a sub-resource
    pub async fn last_error(&self, sub: &SubResource) -> Option<String> {
        self.session.read().await.errors.get(sub).cloned()
    }
}
