//! Ordered record of overlays present on the surface, one per kind.

use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::ids::Id;
use layers::{AnimationSpec, OverlayConfiguration, OverlayDescriptor, OverlayKind};
use parking_lot::RwLock;
use runtime::AnimationHandle;
use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayState {
    Inactive,
    Activating,
    Active,
    Deactivating,
}

#[derive(Debug, Clone)]
pub struct ActiveOverlay {
    pub kind: OverlayKind,
    pub source_id: String,
    /// Creation order, which is also bottom-to-top draw order.
    pub primitive_ids: Vec<String>,
    pub config: OverlayConfiguration,
    pub descriptor: OverlayDescriptor,
    /// Anchor the primitives were inserted below.
    pub anchor: String,
    pub animation: Option<AnimationHandle>,
    /// Animation parameters read by the running loop on every frame.
    pub motion: Option<Arc<RwLock<AnimationSpec>>>,
}

impl ActiveOverlay {
    pub fn new(
        kind: OverlayKind,
        primitive_ids: Vec<String>,
        config: OverlayConfiguration,
        descriptor: OverlayDescriptor,
        anchor: String,
    ) -> Self {
        Self {
            kind,
            source_id: kind.source_id(),
            primitive_ids,
            config,
            descriptor,
            anchor,
            animation: None,
            motion: None,
        }
    }

    pub fn summary(&self) -> OverlaySummary {
        OverlaySummary {
            kind: self.kind,
            source_id: self.source_id.clone(),
            primitive_ids: self.primitive_ids.clone(),
            anchor: self.anchor.clone(),
            config: self.config.clone(),
            animating: self.animation.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySummary {
    pub kind: OverlayKind,
    pub source_id: String,
    pub primitive_ids: Vec<String>,
    pub anchor: String,
    pub config: OverlayConfiguration,
    pub animating: bool,
}

#[derive(Debug)]
enum Slot {
    Activating { ticket: Id },
    Active(ActiveOverlay),
    Deactivating,
}

/// Per-kind state machine plus activation order.
///
/// `Inactive -> Activating -> Active -> Deactivating -> Inactive`. A kind with no slot is
/// inactive. Only `Active` entries take part in ordering and placement.
#[derive(Debug, Default)]
pub struct OverlayRegistry {
    slots: BTreeMap<OverlayKind, Slot>,
    order: Vec<OverlayKind>,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, kind: OverlayKind) -> OverlayState {
        match self.slots.get(&kind) {
            None => OverlayState::Inactive,
            Some(Slot::Activating { .. }) => OverlayState::Activating,
            Some(Slot::Active(_)) => OverlayState::Active,
            Some(Slot::Deactivating) => OverlayState::Deactivating,
        }
    }

    /// Claim `kind` for activation. Fails with the current state unless inactive.
    pub fn begin_activation(&mut self, kind: OverlayKind, ticket: Id) -> Result<(), OverlayState> {
        match self.state(kind) {
            OverlayState::Inactive => {
                self.slots.insert(kind, Slot::Activating { ticket });
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Whether `ticket` still owns the pending activation of `kind`.
    pub fn holds_ticket(&self, kind: OverlayKind, ticket: Id) -> bool {
        matches!(self.slots.get(&kind), Some(Slot::Activating { ticket: t }) if *t == ticket)
    }

    /// Release a pending activation owned by `ticket`.
    pub fn abort_activation(&mut self, kind: OverlayKind, ticket: Id) {
        if self.holds_ticket(kind, ticket) {
            self.slots.remove(&kind);
        }
    }

    /// Cancel whatever activation of `kind` is pending. Returns `true` if one was.
    pub fn cancel_activation(&mut self, kind: OverlayKind) -> bool {
        if self.state(kind) == OverlayState::Activating {
            self.slots.remove(&kind);
            true
        } else {
            false
        }
    }

    /// Kinds with a pending activation.
    pub fn pending(&self) -> Vec<OverlayKind> {
        self.slots
            .iter()
            .filter(|(_, s)| matches!(s, Slot::Activating { .. }))
            .map(|(k, _)| *k)
            .collect()
    }

    /// Install an overlay whose primitives are on the surface. The caller must hold the
    /// activation ticket.
    pub fn complete_activation(&mut self, overlay: ActiveOverlay) {
        let kind = overlay.kind;
        self.order.retain(|k| *k != kind);
        self.order.push(kind);
        self.slots.insert(kind, Slot::Active(overlay));
    }

    /// Move an active overlay to `Deactivating`, handing back its record. The kind keeps
    /// its place in activation order until the deactivation finishes or is aborted.
    pub fn begin_deactivation(&mut self, kind: OverlayKind) -> Option<ActiveOverlay> {
        if self.state(kind) != OverlayState::Active {
            return None;
        }
        match self.slots.insert(kind, Slot::Deactivating) {
            Some(Slot::Active(overlay)) => Some(overlay),
            _ => None,
        }
    }

    pub fn finish_deactivation(&mut self, kind: OverlayKind) {
        if self.state(kind) == OverlayState::Deactivating {
            self.slots.remove(&kind);
            self.order.retain(|k| *k != kind);
        }
    }

    /// Put back an overlay whose removal did not complete, at its original position.
    pub fn abort_deactivation(&mut self, overlay: ActiveOverlay) {
        let kind = overlay.kind;
        if self.state(kind) == OverlayState::Deactivating {
            if !self.order.contains(&kind) {
                self.order.push(kind);
            }
            self.slots.insert(kind, Slot::Active(overlay));
        }
    }

    pub fn get(&self, kind: OverlayKind) -> Option<&ActiveOverlay> {
        match self.slots.get(&kind) {
            Some(Slot::Active(o)) => Some(o),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, kind: OverlayKind) -> Option<&mut ActiveOverlay> {
        match self.slots.get_mut(&kind) {
            Some(Slot::Active(o)) => Some(o),
            _ => None,
        }
    }

    /// Active overlays in activation order.
    pub fn active(&self) -> Vec<&ActiveOverlay> {
        self.order.iter().filter_map(|k| self.get(*k)).collect()
    }

    pub fn active_kinds(&self) -> Vec<OverlayKind> {
        self.active().iter().map(|o| o.kind).collect()
    }
}
