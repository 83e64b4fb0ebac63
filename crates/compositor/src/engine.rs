//! The overlay composition service used by configuration panels.

use std::sync::Arc;
use std::time::Duration;

use credentials::{CredentialCache, CredentialLease};
use foundation::ids::IdGen;
use layers::{
    OverlayConfiguration, OverlayDescriptor, OverlayKind, PropertyScope, SourceDescriptor, build,
    diff,
};
use parking_lot::{Mutex, RwLock};
use runtime::{AnimationParams, AnimationScheduler, Frame, FrameCallback, NoticeBus};
use store::KeyValueStore;
use tracing::{debug, info, trace, warn};

use crate::error::EngineError;
use crate::placement::resolve_anchor;
use crate::provider::{ProviderError, StyleProvider, with_access_token};
use crate::registry::{ActiveOverlay, OverlayRegistry, OverlayState};
use crate::snapshot::{self, DEFAULT_SNAPSHOT_KEY};
use crate::surface::{RenderSurface, SourceSpec, SurfaceError};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on one style-metadata request.
    pub fetch_timeout: Duration,
    /// Animation frame period.
    pub frame_interval: Duration,
    pub snapshot_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
            frame_interval: Duration::from_millis(33),
            snapshot_key: DEFAULT_SNAPSHOT_KEY.to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActivateOutcome {
    Activated,
    /// Nothing changed; the kind was already active or activating.
    AlreadyActive,
    /// A deactivation arrived while the activation was waiting on the network.
    Cancelled,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeactivateOutcome {
    Removed,
    /// A pending activation was cancelled before it inserted anything.
    CancelledPending,
    NotActive,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ReconfigureReport {
    pub applied: usize,
    /// Property updates the surface rejected.
    pub skipped: usize,
    /// Source options changed; they take effect on the next activation.
    pub source_deferred: bool,
}

/// Owns the overlay registry and everything needed to put overlays on a surface.
///
/// Registry transitions happen under one lock that is only held across synchronous
/// surface calls; credential and metadata requests run without it. Clones share state.
#[derive(Clone)]
pub struct OverlayEngine {
    inner: Arc<Inner>,
}

struct Inner {
    surface: Arc<dyn RenderSurface>,
    provider: Arc<dyn StyleProvider>,
    credentials: CredentialCache,
    store: Option<Arc<dyn KeyValueStore>>,
    notices: Arc<NoticeBus>,
    animations: AnimationScheduler<OverlayKind>,
    registry: Mutex<OverlayRegistry>,
    snapshot_writes: Mutex<()>,
    tickets: IdGen,
    config: EngineConfig,
}

impl OverlayEngine {
    pub fn new(
        surface: Arc<dyn RenderSurface>,
        provider: Arc<dyn StyleProvider>,
        credentials: CredentialCache,
        store: Option<Arc<dyn KeyValueStore>>,
        notices: Arc<NoticeBus>,
        config: EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                surface,
                provider,
                credentials,
                store,
                notices,
                animations: AnimationScheduler::new(config.frame_interval),
                registry: Mutex::new(OverlayRegistry::new()),
                snapshot_writes: Mutex::new(()),
                tickets: IdGen::new(),
                config,
            }),
        }
    }

    pub fn notices(&self) -> &Arc<NoticeBus> {
        &self.inner.notices
    }

    pub fn state(&self, kind: OverlayKind) -> OverlayState {
        self.inner.registry.lock().state(kind)
    }

    /// Active overlays in activation order.
    pub fn list_active(&self) -> Vec<ActiveOverlay> {
        self.inner
            .registry
            .lock()
            .active()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn is_animating(&self, kind: OverlayKind) -> bool {
        self.inner.animations.is_running(&kind)
    }

    /// Put an overlay of `kind` on the surface.
    ///
    /// Idempotent: a second call for an active kind changes nothing and emits an info
    /// notice. On any failure nothing of the overlay remains on the surface.
    pub async fn activate(
        &self,
        kind: OverlayKind,
        config: OverlayConfiguration,
    ) -> Result<ActivateOutcome, EngineError> {
        let inner = &self.inner;
        let mut descriptor = build(kind, &config).map_err(|e| inner.fail(kind, e.into()))?;

        let ticket = inner.tickets.next_id();
        let claimed = inner.registry.lock().begin_activation(kind, ticket);
        match claimed {
            Ok(()) => {}
            Err(OverlayState::Active | OverlayState::Activating) => {
                debug!(%kind, "activate ignored; already active");
                inner
                    .notices
                    .info(kind.as_str(), format!("{kind} overlay is already active"));
                return Ok(ActivateOutcome::AlreadyActive);
            }
            Err(_) => return Err(inner.fail(kind, EngineError::Busy(kind))),
        }

        let (source, layer_name) = match inner.prepare(kind, descriptor.source.clone()).await {
            Ok(prepared) => prepared,
            Err(err) => {
                inner.registry.lock().abort_activation(kind, ticket);
                return Err(inner.fail(kind, err));
            }
        };
        descriptor.bind_source_layer(&layer_name);

        {
            let mut registry = inner.registry.lock();
            if !registry.holds_ticket(kind, ticket) {
                drop(registry);
                info!(%kind, "activation cancelled while waiting on the network");
                inner
                    .notices
                    .info(kind.as_str(), format!("{kind} activation cancelled"));
                return Ok(ActivateOutcome::Cancelled);
            }

            let anchor = resolve_anchor(kind, &registry.active());
            let inserted = anchor.map_err(EngineError::from).and_then(|anchor| {
                inner
                    .insert(&descriptor, &source, &anchor)
                    .map(|ids| (ids, anchor))
                    .map_err(EngineError::from)
            });
            let (ids, anchor) = match inserted {
                Ok(done) => done,
                Err(err) => {
                    registry.abort_activation(kind, ticket);
                    drop(registry);
                    return Err(inner.fail(kind, err));
                }
            };

            let mut overlay = ActiveOverlay::new(kind, ids, config, descriptor, anchor);
            inner.sync_animation(&mut overlay);
            info!(%kind, anchor = %overlay.anchor, primitives = overlay.primitive_ids.len(), "overlay activated");
            registry.complete_activation(overlay);
        }

        inner.persist();
        Ok(ActivateOutcome::Activated)
    }

    /// Apply a new configuration to an active overlay in place.
    ///
    /// Only properties that differ are sent to the surface. Updates the surface rejects
    /// are logged, reported as notices and skipped. Outside a tokio runtime an enabled
    /// animation cannot start; that is reported as a warning notice.
    pub fn reconfigure(
        &self,
        kind: OverlayKind,
        config: OverlayConfiguration,
    ) -> Result<ReconfigureReport, EngineError> {
        let inner = &self.inner;
        let mut next = build(kind, &config).map_err(|e| inner.fail(kind, e.into()))?;

        let report = {
            let mut registry = inner.registry.lock();
            match registry.state(kind) {
                OverlayState::Active => {}
                OverlayState::Inactive => return Err(inner.fail(kind, EngineError::NotActive(kind))),
                _ => return Err(inner.fail(kind, EngineError::Busy(kind))),
            }
            let Some(overlay) = registry.get_mut(kind) else {
                return Err(inner.fail(kind, EngineError::NotActive(kind)));
            };

            if let Some(layer) = overlay
                .descriptor
                .primitives
                .iter()
                .find_map(|p| p.source_layer.clone())
            {
                next.bind_source_layer(&layer);
            }

            let changes = diff(&overlay.descriptor, &next);
            if changes.structure_changed {
                return Err(inner.fail(
                    kind,
                    SurfaceError::rejected(
                        overlay.source_id.clone(),
                        "primitive set changed; deactivate and activate again",
                    )
                    .into(),
                ));
            }

            let mut report = ReconfigureReport::default();
            if changes.source_changed {
                warn!(%kind, "source options changed; applied on next activation");
                inner.notices.warn(
                    kind.as_str(),
                    format!("{kind} source options take effect after re-activation"),
                );
                next.source = overlay.descriptor.source.clone();
                report.source_deferred = true;
            }

            for update in &changes.updates {
                let value = update.value.as_ref();
                let id = update.primitive_id.as_str();
                let result = match update.scope {
                    PropertyScope::Paint => inner.surface.set_paint_property(id, &update.key, value),
                    PropertyScope::Layout => inner.surface.set_layout_property(id, &update.key, value),
                    PropertyScope::Filter => inner.surface.set_filter(id, value),
                };
                match result {
                    Ok(()) => report.applied += 1,
                    Err(err) => {
                        warn!(%kind, key = %update.key, "property update skipped: {err}");
                        inner.notices.warn(
                            kind.as_str(),
                            format!("could not apply {} to {id}: {err}", update.key),
                        );
                        report.skipped += 1;
                    }
                }
            }

            overlay.config = config;
            overlay.descriptor = next;
            inner.sync_animation(overlay);
            debug!(%kind, applied = report.applied, skipped = report.skipped, "overlay reconfigured");
            report
        };

        inner.persist();
        Ok(report)
    }

    /// Remove the overlay of `kind`: children in reverse creation order, then the source,
    /// then its animation. Cancels a pending activation of `kind`.
    ///
    /// If the surface refuses a removal the overlay stays active with the primitives that
    /// are still on the surface, and the error is returned.
    pub fn deactivate(&self, kind: OverlayKind) -> Result<DeactivateOutcome, EngineError> {
        let inner = &self.inner;
        let outcome = {
            let mut registry = inner.registry.lock();
            match registry.state(kind) {
                OverlayState::Inactive => DeactivateOutcome::NotActive,
                OverlayState::Activating => {
                    registry.cancel_activation(kind);
                    DeactivateOutcome::CancelledPending
                }
                OverlayState::Deactivating => return Err(inner.fail(kind, EngineError::Busy(kind))),
                OverlayState::Active => {
                    if let Err(err) = inner.deactivate_locked(&mut registry, kind) {
                        drop(registry);
                        return Err(inner.fail(kind, err.into()));
                    }
                    DeactivateOutcome::Removed
                }
            }
        };

        match outcome {
            DeactivateOutcome::Removed => {
                info!(%kind, "overlay deactivated");
                inner.persist();
            }
            DeactivateOutcome::CancelledPending => info!(%kind, "pending activation cancelled"),
            DeactivateOutcome::NotActive => {
                debug!(%kind, "deactivate ignored; not active");
                inner
                    .notices
                    .info(kind.as_str(), format!("{kind} overlay is not active"));
            }
        }
        Ok(outcome)
    }

    /// Remove every overlay, newest first, and cancel pending activations. Returns the
    /// number of overlays removed.
    ///
    /// Overlays the surface refuses to remove stay active; every other overlay is still
    /// removed, and the first failure is returned.
    pub fn deactivate_all(&self) -> Result<usize, EngineError> {
        let inner = &self.inner;
        let (removed, failures) = {
            let mut registry = inner.registry.lock();
            for kind in registry.pending() {
                registry.cancel_activation(kind);
            }
            let mut removed = 0;
            let mut failures = Vec::new();
            for kind in registry.active_kinds().into_iter().rev() {
                match inner.deactivate_locked(&mut registry, kind) {
                    Ok(()) => removed += 1,
                    Err(err) => failures.push((kind, err)),
                }
            }
            (removed, failures)
        };
        info!(removed, failed = failures.len(), "overlays deactivated");
        inner.persist();

        let mut first = None;
        for (kind, err) in failures {
            let err = inner.fail(kind, err.into());
            first.get_or_insert(err);
        }
        match first {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// Re-activate the overlays recorded in the snapshot, in their original order.
    /// Returns how many were activated.
    pub async fn restore(&self) -> usize {
        let Some(store) = self.inner.store.clone() else {
            return 0;
        };
        let entries = match snapshot::load(store.as_ref(), &self.inner.config.snapshot_key) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("overlay snapshot unreadable: {err}");
                self.inner
                    .notices
                    .warn("snapshot", format!("saved overlays could not be restored: {err}"));
                return 0;
            }
        };

        let mut restored = 0;
        for entry in entries {
            match self.activate(entry.kind, entry.config).await {
                Ok(ActivateOutcome::Activated) => restored += 1,
                Ok(_) => {}
                Err(err) => warn!(kind = %entry.kind, "restore failed: {err}"),
            }
        }
        info!(restored, "overlays restored");
        restored
    }
}

impl Inner {
    fn fail(&self, kind: OverlayKind, err: EngineError) -> EngineError {
        warn!(%kind, "{err}");
        self.notices.emit(err.notice_level(), kind.as_str(), err.to_string());
        err
    }

    /// Credential and provider metadata for a new source. No registry lock is held.
    async fn prepare(
        &self,
        kind: OverlayKind,
        descriptor: SourceDescriptor,
    ) -> Result<(SourceSpec, String), EngineError> {
        let token = if kind.requires_credential() {
            match self.credentials.get_credential().await? {
                CredentialLease::Valid(credential) => Some(credential.value().to_string()),
                CredentialLease::Degraded { credential, cause } => {
                    self.notices.warn(
                        "credentials",
                        format!("using an expired credential for {kind}: {cause}"),
                    );
                    Some(credential.value().to_string())
                }
            }
        } else {
            None
        };

        let metadata = tokio::time::timeout(self.config.fetch_timeout, self.provider.metadata(kind))
            .await
            .map_err(|_| ProviderError::FetchTimeout)??;

        let template = self.provider.tile_template(kind, &metadata);
        let tiles = match &token {
            Some(token) => with_access_token(&template, token),
            None => template,
        };
        let source = SourceSpec {
            descriptor,
            tiles: vec![tiles],
            min_zoom: metadata.min_zoom,
            max_zoom: metadata.max_zoom,
        };
        Ok((source, metadata.layer_name))
    }

    fn insert(
        &self,
        descriptor: &OverlayDescriptor,
        source: &SourceSpec,
        anchor: &str,
    ) -> Result<Vec<String>, SurfaceError> {
        let source_id = descriptor.source_id();
        self.surface.add_source(&source_id, source)?;

        let mut inserted = Vec::with_capacity(descriptor.primitives.len());
        for primitive in &descriptor.primitives {
            let id = descriptor.primitive_id(primitive);
            if let Err(err) = self
                .surface
                .add_primitive(&id, &source_id, primitive, Some(anchor))
            {
                warn!(%id, "insertion failed; rolling back {} primitives", inserted.len());
                if let Err((left, cleanup)) = self.remove_from_surface(&source_id, &inserted) {
                    warn!(%source_id, ?left, "rollback incomplete: {cleanup}");
                }
                return Err(err);
            }
            inserted.push(id);
        }
        Ok(inserted)
    }

    /// Remove primitives newest first, then the source. On failure hands back the
    /// primitives still on the surface with the first error. The source is only removed
    /// once none of its primitives remain.
    fn remove_from_surface(
        &self,
        source_id: &str,
        primitive_ids: &[String],
    ) -> Result<(), (Vec<String>, SurfaceError)> {
        let mut left = Vec::new();
        let mut first = None;
        for id in primitive_ids.iter().rev() {
            if let Err(err) = self.surface.remove_primitive(id) {
                warn!(%id, "primitive removal failed: {err}");
                left.push(id.clone());
                first.get_or_insert(err);
            }
        }
        if let Some(err) = first {
            left.reverse();
            return Err((left, err));
        }
        self.surface.remove_source(source_id).map_err(|err| {
            warn!(%source_id, "source removal failed: {err}");
            (left, err)
        })
    }

    /// Take the overlay off the surface and stop its animation. On failure the overlay
    /// keeps only the primitives that are still on the surface.
    fn teardown(&self, overlay: &mut ActiveOverlay) -> Result<(), SurfaceError> {
        let result = self.remove_from_surface(&overlay.source_id, &overlay.primitive_ids);
        let err = match result {
            Ok(()) => None,
            Err((left, err)) => {
                overlay.primitive_ids = left;
                Some(err)
            }
        };
        if overlay.primitive_ids.is_empty() || err.is_none() {
            self.animations.stop(&overlay.kind);
            overlay.animation = None;
            overlay.motion = None;
        }
        err.map_or(Ok(()), Err)
    }

    /// Run one deactivation under the registry lock. A failed teardown puts the overlay
    /// back as active.
    fn deactivate_locked(
        &self,
        registry: &mut OverlayRegistry,
        kind: OverlayKind,
    ) -> Result<(), SurfaceError> {
        let Some(mut overlay) = registry.begin_deactivation(kind) else {
            return Ok(());
        };
        match self.teardown(&mut overlay) {
            Ok(()) => {
                registry.finish_deactivation(kind);
                Ok(())
            }
            Err(err) => {
                registry.abort_deactivation(overlay);
                Err(err)
            }
        }
    }

    /// Start, retune or stop the overlay's animation loop to match its descriptor.
    fn sync_animation(&self, overlay: &mut ActiveOverlay) {
        let Some(spec) = overlay.descriptor.animation.clone() else {
            return;
        };
        let ids = overlay.descriptor.animated_ids();

        if !spec.enabled {
            if self.animations.stop(&overlay.kind) {
                for id in &ids {
                    if let Err(err) = self.surface.set_paint_property(id, &spec.property, None) {
                        debug!(%id, "animation reset skipped: {err}");
                    }
                }
            }
            overlay.animation = None;
            overlay.motion = None;
            return;
        }

        let motion = match &overlay.motion {
            Some(motion) => {
                *motion.write() = spec.clone();
                Arc::clone(motion)
            }
            None => {
                let motion = Arc::new(RwLock::new(spec.clone()));
                overlay.motion = Some(Arc::clone(&motion));
                motion
            }
        };

        let surface = Arc::clone(&self.surface);
        let on_frame: FrameCallback = Arc::new(move |frame: Frame, phase: f64| {
            let spec = motion.read();
            let value = spec.value_at(phase);
            for id in &ids {
                if let Err(err) = surface.set_paint_property(id, &spec.property, Some(&value)) {
                    trace!(%id, frame = frame.index, "animation frame dropped: {err}");
                }
            }
        });
        let params = AnimationParams::new(spec.enabled, spec.speed);
        match self.animations.ensure(overlay.kind, params, on_frame) {
            Ok(handle) => overlay.animation = handle,
            Err(err) => {
                warn!(kind = %overlay.kind, "animation not started: {err}");
                self.notices.warn(
                    overlay.kind.as_str(),
                    format!("{} animation could not start: {err}", overlay.kind),
                );
                overlay.animation = None;
                overlay.motion = None;
            }
        }
    }

    /// Write the snapshot. Writes are serialized so the last one reflects the latest state.
    fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let _serial = self.snapshot_writes.lock();
        let entries = snapshot::capture(&self.registry.lock());
        if let Err(err) = snapshot::save(store.as_ref(), &self.config.snapshot_key, &entries) {
            warn!("overlay snapshot not saved: {err}");
            self.notices
                .warn("snapshot", format!("active overlays could not be saved: {err}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    use credentials::{
        CredentialCacheConfig, CredentialError, CredentialService, TokenGrant,
    };
    use foundation::time::{ManualClock, Timestamp};
    use layers::{GradientStop, Tier};
    use pretty_assertions::assert_eq;
    use runtime::NoticeLevel;
    use serde_json::json;
    use store::InMemoryStore;

    use super::*;
    use crate::placement::FOREGROUND_MARKER_ID;
    use crate::provider::{BoxFuture, StyleMetadata};
    use crate::surface::InMemorySurface;

    #[derive(Default)]
    struct FakeCredentials {
        calls: AtomicUsize,
        delay_ms: AtomicU64,
        fail: AtomicBool,
    }

    impl CredentialService for FakeCredentials {
        fn fetch(&self) -> credentials::BoxFuture<'_, Result<TokenGrant, CredentialError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let delay = self.delay_ms.load(Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                if self.fail.load(Ordering::SeqCst) {
                    return Err(CredentialError::FetchFailed("denied".into()));
                }
                Ok(TokenGrant {
                    access_token: "tok".into(),
                    expires_in: 3600,
                })
            })
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        calls: AtomicUsize,
        delay_ms: AtomicU64,
    }

    impl StyleProvider for FakeProvider {
        fn metadata(&self, kind: OverlayKind) -> BoxFuture<'_, Result<StyleMetadata, ProviderError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let delay = self.delay_ms.load(Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(StyleMetadata {
                    layer_name: format!("{}-layer", kind.layer_ref()),
                    tile_set: "run-00".into(),
                    min_zoom: 0,
                    max_zoom: 10,
                })
            })
        }

        fn tile_template(&self, kind: OverlayKind, metadata: &StyleMetadata) -> String {
            format!(
                "https://tiles.test/{}/{}/{{z}}/{{x}}/{{y}}",
                kind.layer_ref(),
                metadata.tile_set
            )
        }
    }

    struct Harness {
        engine: OverlayEngine,
        surface: Arc<InMemorySurface>,
        credentials: Arc<FakeCredentials>,
        provider: Arc<FakeProvider>,
        store: Arc<InMemoryStore>,
        clock: ManualClock,
    }

    fn baseline() -> Vec<String> {
        vec![
            "background".to_string(),
            FOREGROUND_MARKER_ID.to_string(),
            "vessel-labels".to_string(),
        ]
    }

    impl Harness {
        fn new() -> Self {
            Self::with_store(Arc::new(InMemoryStore::new()))
        }

        fn with_store(store: Arc<InMemoryStore>) -> Self {
            let surface = Arc::new(InMemorySurface::with_base_primitives(&[
                "background",
                FOREGROUND_MARKER_ID,
                "vessel-labels",
            ]));
            let credentials = Arc::new(FakeCredentials::default());
            let provider = Arc::new(FakeProvider::default());
            let clock = ManualClock::new(Timestamp::from_millis(1_000_000));
            let cache = CredentialCache::new(
                credentials.clone(),
                Arc::new(clock.clone()),
                None,
                CredentialCacheConfig::default(),
            );
            let engine = OverlayEngine::new(
                surface.clone(),
                provider.clone(),
                cache,
                Some(store.clone() as Arc<dyn KeyValueStore>),
                Arc::new(NoticeBus::new()),
                EngineConfig::default(),
            );
            Self {
                engine,
                surface,
                credentials,
                provider,
                store,
                clock,
            }
        }

        async fn activate(&self, kind: OverlayKind) -> ActivateOutcome {
            self.engine
                .activate(kind, OverlayConfiguration::new())
                .await
                .unwrap()
        }

        fn kinds(&self) -> Vec<OverlayKind> {
            self.engine.list_active().iter().map(|o| o.kind).collect()
        }

        fn snapshot(&self) -> Vec<snapshot::SnapshotEntry> {
            snapshot::load(self.store.as_ref(), DEFAULT_SNAPSHOT_KEY).unwrap()
        }
    }

    fn kind_of(id: &str) -> Option<OverlayKind> {
        OverlayKind::ALL
            .into_iter()
            .find(|k| id.starts_with(&format!("woce-{}-", k.as_str())))
    }

    /// Every bottom-tier primitive sits below every top-tier one, all below the marker.
    fn assert_tiers(surface: &InMemorySurface) {
        let order = surface.order();
        let marker = order.iter().position(|id| id == FOREGROUND_MARKER_ID).unwrap();
        let tier_at = |i: usize| kind_of(&order[i]).map(|k| k.tier());
        let bottoms: Vec<usize> = (0..order.len()).filter(|i| tier_at(*i) == Some(Tier::Bottom)).collect();
        let tops: Vec<usize> = (0..order.len()).filter(|i| tier_at(*i) == Some(Tier::Top)).collect();
        if let (Some(b), Some(t)) = (bottoms.last(), tops.first()) {
            assert!(b < t, "bottom tier above top tier: {order:?}");
        }
        for i in bottoms.iter().chain(&tops) {
            assert!(*i < marker, "overlay above the foreground marker: {order:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn activate_twice_is_idempotent() {
        let h = Harness::new();
        assert_eq!(h.activate(OverlayKind::Wind).await, ActivateOutcome::Activated);
        let mutations = h.surface.mutations();

        assert_eq!(h.activate(OverlayKind::Wind).await, ActivateOutcome::AlreadyActive);
        assert_eq!(h.surface.mutations(), mutations);
        assert_eq!(h.kinds(), vec![OverlayKind::Wind]);
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.surface
                .order()
                .iter()
                .filter(|id| id.starts_with("woce-wind-"))
                .count(),
            1
        );

        let notices = h.engine.notices().drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Info);
        assert_eq!(notices[0].subject, "wind");
    }

    #[tokio::test(start_paused = true)]
    async fn bottom_overlays_slide_under_a_later_top_overlay() {
        let h = Harness::new();
        for kind in [OverlayKind::Wind, OverlayKind::Swell, OverlayKind::CycloneTrack] {
            assert_eq!(h.activate(kind).await, ActivateOutcome::Activated);
        }
        assert_eq!(
            h.kinds(),
            vec![OverlayKind::Wind, OverlayKind::Swell, OverlayKind::CycloneTrack]
        );

        let active = h.engine.list_active();
        let cyclone = &active[2];
        assert_eq!(cyclone.anchor, FOREGROUND_MARKER_ID);

        let order = h.surface.order();
        let swell = order.iter().position(|id| id == "woce-swell-fill").unwrap();
        assert_eq!(order[swell + 1], cyclone.primitive_ids[0]);
        assert_eq!(order[swell - 1], "woce-wind-raster");
        assert_tiers(&h.surface);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivating_one_overlay_leaves_the_others() {
        let h = Harness::new();
        for kind in [OverlayKind::Wind, OverlayKind::Swell, OverlayKind::CycloneTrack] {
            h.activate(kind).await;
        }
        let before: Vec<ActiveOverlay> = h.engine.list_active();

        assert_eq!(
            h.engine.deactivate(OverlayKind::Swell).unwrap(),
            DeactivateOutcome::Removed
        );
        assert!(!h.surface.has_primitive("woce-swell-fill"));
        assert!(!h.surface.has_source("woce-swell-source"));

        for kept in before.iter().filter(|o| o.kind != OverlayKind::Swell) {
            assert!(h.surface.has_source(&kept.source_id));
            for id in &kept.primitive_ids {
                assert!(h.surface.has_primitive(id), "{id} was removed");
            }
        }
        let after = h.engine.list_active();
        assert_eq!(after[0].primitive_ids, before[0].primitive_ids);
        assert_eq!(after[1].primitive_ids, before[2].primitive_ids);
        assert_eq!(h.kinds(), vec![OverlayKind::Wind, OverlayKind::CycloneTrack]);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_is_exact() {
        let h = Harness::new();
        for kind in OverlayKind::ALL {
            assert_eq!(h.activate(kind).await, ActivateOutcome::Activated);
        }
        assert_eq!(h.surface.source_ids().len(), OverlayKind::ALL.len());

        for kind in [
            OverlayKind::Symbol,
            OverlayKind::Wind,
            OverlayKind::Nautical,
            OverlayKind::Current,
        ] {
            h.engine.deactivate(kind).unwrap();
        }
        h.activate(OverlayKind::Wind).await;
        assert_eq!(h.engine.deactivate_all().unwrap(), 5);

        assert_eq!(h.surface.order(), baseline());
        assert!(h.surface.source_ids().is_empty());
        assert!(h.engine.list_active().is_empty());
        assert!(h.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tiers_hold_for_interleaved_activations() {
        let sequences = [
            vec![OverlayKind::Pressure, OverlayKind::Wind, OverlayKind::Symbol, OverlayKind::Swell],
            vec![OverlayKind::Current, OverlayKind::Nautical, OverlayKind::PressureGradient, OverlayKind::CycloneTrack],
            vec![OverlayKind::Symbol, OverlayKind::Pressure, OverlayKind::Wind, OverlayKind::Current],
        ];
        for sequence in sequences {
            let h = Harness::new();
            for kind in &sequence {
                h.activate(*kind).await;
                assert_tiers(&h.surface);
            }
            h.engine.deactivate(sequence[0]).unwrap();
            h.activate(OverlayKind::Swell).await;
            assert_tiers(&h.surface);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_activations_share_one_credential_fetch() {
        let h = Harness::new();
        h.credentials.delay_ms.store(200, Ordering::SeqCst);

        let (a, b, c) = tokio::join!(
            h.engine.activate(OverlayKind::Wind, OverlayConfiguration::new()),
            h.engine.activate(OverlayKind::Swell, OverlayConfiguration::new()),
            h.engine.activate(OverlayKind::Pressure, OverlayConfiguration::new()),
        );
        assert_eq!(a.unwrap(), ActivateOutcome::Activated);
        assert_eq!(b.unwrap(), ActivateOutcome::Activated);
        assert_eq!(c.unwrap(), ActivateOutcome::Activated);
        assert_eq!(h.credentials.calls.load(Ordering::SeqCst), 1);
        assert_tiers(&h.surface);
    }

    #[tokio::test(start_paused = true)]
    async fn sources_carry_credential_and_bound_layer() {
        let h = Harness::new();
        h.activate(OverlayKind::Swell).await;
        h.activate(OverlayKind::Nautical).await;

        let swell = h.surface.source("woce-swell-source").unwrap();
        assert_eq!(
            swell.tiles,
            vec!["https://tiles.test/swell-height/run-00/{z}/{x}/{y}?access_token=tok"]
        );
        let fill = h.surface.primitive("woce-swell-fill").unwrap();
        assert_eq!(fill.spec.source_layer.as_deref(), Some("swell-height-layer"));

        let nautical = h.surface.source("woce-nautical-source").unwrap();
        assert!(!nautical.tiles[0].contains("access_token"));
        assert_eq!(h.credentials.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_insertion_rolls_back() {
        let h = Harness::new();
        h.surface.reject_primitive("woce-pressure-line");

        let err = h
            .engine
            .activate(OverlayKind::Pressure, OverlayConfiguration::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Surface(_)));
        assert_eq!(h.surface.order(), baseline());
        assert!(h.surface.source_ids().is_empty());
        assert_eq!(h.engine.state(OverlayKind::Pressure), OverlayState::Inactive);

        let notices = h.engine.notices().drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].subject, "pressure");

        h.surface.clear_faults();
        assert_eq!(h.activate(OverlayKind::Pressure).await, ActivateOutcome::Activated);
    }

    #[tokio::test(start_paused = true)]
    async fn credential_failure_inserts_nothing() {
        let h = Harness::new();
        h.credentials.fail.store(true, Ordering::SeqCst);

        let err = h
            .engine
            .activate(OverlayKind::Wind, OverlayConfiguration::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::Credential(CredentialError::FetchFailed("denied".into()))
        );
        assert_eq!(h.surface.order(), baseline());
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);

        assert_eq!(h.activate(OverlayKind::Nautical).await, ActivateOutcome::Activated);
        assert_eq!(h.credentials.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let h = Harness::new();
        h.provider.delay_ms.store(60_000, Ordering::SeqCst);

        let err = h
            .engine
            .activate(OverlayKind::Pressure, OverlayConfiguration::new())
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Provider(ProviderError::FetchTimeout));
        assert_eq!(h.engine.state(OverlayKind::Pressure), OverlayState::Inactive);
        assert!(h.surface.source_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_configuration_is_rejected_before_any_request() {
        let h = Harness::new();
        let config = OverlayConfiguration::new().with(
            "gradient",
            vec![GradientStop::new("abc", "#000"), GradientStop::new("1m", "#fff")],
        );
        let err = h.engine.activate(OverlayKind::Swell, config).await.unwrap_err();
        assert!(matches!(err, EngineError::Build(_)));
        assert_eq!(h.credentials.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.engine.notices().pending().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_cancels_a_pending_activation() {
        let h = Harness::new();
        h.provider.delay_ms.store(1_000, Ordering::SeqCst);

        let engine = h.engine.clone();
        let pending = tokio::spawn(async move {
            engine
                .activate(OverlayKind::Wind, OverlayConfiguration::new())
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.engine.state(OverlayKind::Wind), OverlayState::Activating);
        assert_eq!(
            h.engine.reconfigure(OverlayKind::Wind, OverlayConfiguration::new()),
            Err(EngineError::Busy(OverlayKind::Wind))
        );

        assert_eq!(
            h.engine.deactivate(OverlayKind::Wind).unwrap(),
            DeactivateOutcome::CancelledPending
        );
        assert_eq!(pending.await.unwrap().unwrap(), ActivateOutcome::Cancelled);
        assert_eq!(h.surface.order(), baseline());
        assert_eq!(h.engine.state(OverlayKind::Wind), OverlayState::Inactive);

        h.provider.delay_ms.store(0, Ordering::SeqCst);
        assert_eq!(h.activate(OverlayKind::Wind).await, ActivateOutcome::Activated);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_all_cancels_pending_activations() {
        let h = Harness::new();
        h.activate(OverlayKind::Wind).await;
        h.activate(OverlayKind::Pressure).await;
        h.provider.delay_ms.store(1_000, Ordering::SeqCst);

        let engine = h.engine.clone();
        let pending = tokio::spawn(async move {
            engine
                .activate(OverlayKind::Swell, OverlayConfiguration::new())
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(h.engine.deactivate_all().unwrap(), 2);
        assert_eq!(pending.await.unwrap().unwrap(), ActivateOutcome::Cancelled);
        assert_eq!(h.surface.order(), baseline());
        assert!(h.surface.source_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_inactive_is_a_no_op() {
        let h = Harness::new();
        let mutations = h.surface.mutations();
        assert_eq!(
            h.engine.deactivate(OverlayKind::Symbol).unwrap(),
            DeactivateOutcome::NotActive
        );
        assert_eq!(h.surface.mutations(), mutations);
        assert_eq!(h.engine.notices().drain()[0].level, NoticeLevel::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn reconfigure_sends_only_changed_properties() {
        let h = Harness::new();
        h.activate(OverlayKind::Wind).await;
        let mutations = h.surface.mutations();

        let config = OverlayConfiguration::new().with("opacity", 0.4);
        let report = h.engine.reconfigure(OverlayKind::Wind, config.clone()).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(h.surface.mutations(), mutations + 1);
        assert_eq!(
            h.surface.paint_property("woce-wind-raster", "raster-opacity"),
            Some(json!(0.4))
        );

        let again = h.engine.reconfigure(OverlayKind::Wind, config.clone()).unwrap();
        assert_eq!(again, ReconfigureReport::default());
        assert_eq!(h.engine.list_active()[0].config, config);
        assert_eq!(h.snapshot()[0].config, config);
    }

    #[tokio::test(start_paused = true)]
    async fn reconfigure_skips_rejected_properties() {
        let h = Harness::new();
        h.activate(OverlayKind::Pressure).await;
        h.surface.reject_property("line-color");

        let report = h
            .engine
            .reconfigure(
                OverlayKind::Pressure,
                OverlayConfiguration::new()
                    .with("lineColor", "#ff0000")
                    .with("lineWidth", 2.0),
            )
            .unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(
            h.surface.paint_property("woce-pressure-line", "line-width"),
            Some(json!(2.0))
        );
        let notices = h.engine.notices().drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn reconfigure_requires_an_active_overlay() {
        let h = Harness::new();
        assert_eq!(
            h.engine.reconfigure(OverlayKind::Current, OverlayConfiguration::new()),
            Err(EngineError::NotActive(OverlayKind::Current))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn current_animation_follows_configuration() {
        let h = Harness::new();
        let animated = OverlayConfiguration::new()
            .with("animationEnabled", true)
            .with("animationSpeed", 1.0);
        h.engine
            .activate(OverlayKind::Current, animated.clone())
            .await
            .unwrap();
        assert!(h.engine.is_animating(OverlayKind::Current));
        assert!(h.engine.list_active()[0].animation.is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            h.surface
                .paint_property("woce-current-line", "line-translate")
                .is_some()
        );

        h.engine
            .reconfigure(
                OverlayKind::Current,
                animated.clone().with("animationEnabled", false),
            )
            .unwrap();
        assert!(!h.engine.is_animating(OverlayKind::Current));
        assert_eq!(
            h.surface.paint_property("woce-current-line", "line-translate"),
            None
        );

        h.engine.reconfigure(OverlayKind::Current, animated).unwrap();
        assert!(h.engine.is_animating(OverlayKind::Current));

        h.engine.deactivate(OverlayKind::Current).unwrap();
        assert!(!h.engine.is_animating(OverlayKind::Current));
        assert_eq!(h.surface.order(), baseline());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_round_trips_through_restore() {
        let h = Harness::new();
        let wind = OverlayConfiguration::new().with("opacity", 0.5);
        h.engine.activate(OverlayKind::Wind, wind.clone()).await.unwrap();
        h.activate(OverlayKind::CycloneTrack).await;
        assert_eq!(
            h.snapshot().iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![OverlayKind::Wind, OverlayKind::CycloneTrack]
        );

        let restarted = Harness::with_store(h.store.clone());
        assert_eq!(restarted.engine.restore().await, 2);
        assert_eq!(
            restarted.kinds(),
            vec![OverlayKind::Wind, OverlayKind::CycloneTrack]
        );
        assert_eq!(restarted.engine.list_active()[0].config, wind);
        assert_tiers(&restarted.surface);

        restarted.engine.deactivate(OverlayKind::Wind).unwrap();
        assert_eq!(restarted.snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_activation_while_pending_is_a_no_op() {
        let h = Harness::new();
        h.provider.delay_ms.store(500, Ordering::SeqCst);

        let (first, second) = tokio::join!(
            h.engine.activate(OverlayKind::Wind, OverlayConfiguration::new()),
            h.engine.activate(OverlayKind::Wind, OverlayConfiguration::new()),
        );
        assert_eq!(first.unwrap(), ActivateOutcome::Activated);
        assert_eq!(second.unwrap(), ActivateOutcome::AlreadyActive);
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.surface
                .order()
                .iter()
                .filter(|id| id.starts_with("woce-wind-"))
                .count(),
            1
        );
        assert_eq!(h.surface.source_ids(), vec!["woce-wind-source".to_string()]);

        let notices = h.engine.notices().drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Info);
        assert_eq!(notices[0].subject, "wind");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_credential_is_used_when_refresh_fails() {
        let h = Harness::new();
        h.activate(OverlayKind::Wind).await;
        h.clock.advance(Duration::from_secs(2 * 3600));
        h.credentials.fail.store(true, Ordering::SeqCst);

        assert_eq!(h.activate(OverlayKind::Swell).await, ActivateOutcome::Activated);
        let swell = h.surface.source("woce-swell-source").unwrap();
        assert!(swell.tiles[0].ends_with("?access_token=tok"), "{:?}", swell.tiles);
        assert_eq!(h.credentials.calls.load(Ordering::SeqCst), 2);

        let notices = h.engine.notices().drain();
        let warnings: Vec<_> = notices
            .iter()
            .filter(|n| n.level == NoticeLevel::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].subject, "credentials");
    }

    #[tokio::test(start_paused = true)]
    async fn refused_removal_keeps_the_overlay_active() {
        let h = Harness::new();
        h.activate(OverlayKind::Pressure).await;
        h.engine.notices().drain();
        h.surface.pin("woce-pressure-border");

        let err = h.engine.deactivate(OverlayKind::Pressure).unwrap_err();
        assert!(matches!(err, EngineError::Surface(_)));
        assert_eq!(h.engine.state(OverlayKind::Pressure), OverlayState::Active);
        assert_eq!(
            h.engine.list_active()[0].primitive_ids,
            vec!["woce-pressure-border".to_string()]
        );
        assert!(!h.surface.has_primitive("woce-pressure-line"));
        assert!(h.surface.has_source("woce-pressure-source"));
        assert_eq!(h.snapshot().len(), 1);

        let notices = h.engine.notices().drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert_eq!(notices[0].subject, "pressure");

        h.surface.clear_faults();
        assert_eq!(
            h.engine.deactivate(OverlayKind::Pressure).unwrap(),
            DeactivateOutcome::Removed
        );
        assert_eq!(h.surface.order(), baseline());
        assert!(h.surface.source_ids().is_empty());
        assert_eq!(h.activate(OverlayKind::Pressure).await, ActivateOutcome::Activated);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_all_keeps_what_the_surface_refuses() {
        let h = Harness::new();
        h.activate(OverlayKind::Wind).await;
        h.activate(OverlayKind::Pressure).await;
        h.surface.pin("woce-wind-source");

        let err = h.engine.deactivate_all().unwrap_err();
        assert!(matches!(err, EngineError::Surface(_)));
        assert_eq!(h.kinds(), vec![OverlayKind::Wind]);
        assert!(h.engine.list_active()[0].primitive_ids.is_empty());
        assert!(!h.surface.has_source("woce-pressure-source"));
        assert_eq!(
            h.snapshot().iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![OverlayKind::Wind]
        );
        assert_eq!(h.engine.notices().drain().len(), 1);

        h.surface.clear_faults();
        assert_eq!(h.engine.deactivate_all().unwrap(), 1);
        assert_eq!(h.surface.order(), baseline());
        assert!(h.surface.source_ids().is_empty());
    }

    #[test]
    fn reconfigure_outside_a_runtime_reports_the_animation() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let h = Harness::new();
        runtime.block_on(h.activate(OverlayKind::Current));
        h.engine.notices().drain();

        let animated = OverlayConfiguration::new().with("animationEnabled", true);
        h.engine.reconfigure(OverlayKind::Current, animated).unwrap();
        assert!(!h.engine.is_animating(OverlayKind::Current));
        assert!(h.engine.list_active()[0].animation.is_none());

        let notices = h.engine.notices().drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert_eq!(notices[0].subject, "current");
    }
}
