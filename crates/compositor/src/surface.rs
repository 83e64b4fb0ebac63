//! The map the overlays are drawn on.

use std::collections::{BTreeMap, BTreeSet};

use layers::{PrimitiveDescriptor, SourceDescriptor};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    Rejected { target: String, reason: String },
}

impl SurfaceError {
    pub fn rejected(target: impl Into<String>, reason: impl Into<String>) -> Self {
        SurfaceError::Rejected {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceError::Rejected { target, reason } => {
                write!(f, "surface rejected {target}: {reason}")
            }
        }
    }
}

impl std::error::Error for SurfaceError {}

/// A tile source as handed to the surface, with resolved tile URLs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSpec {
    #[serde(flatten)]
    pub descriptor: SourceDescriptor,
    /// URL templates with `{z}/{x}/{y}` placeholders. May carry a bearer credential.
    #[serde(skip)]
    pub tiles: Vec<String>,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

/// Narrow interface to the rendering surface.
///
/// Primitives form a single draw order, bottom first. `before_id` inserts immediately
/// below an existing primitive; `None` appends on top.
pub trait RenderSurface: Send + Sync {
    fn add_source(&self, id: &str, source: &SourceSpec) -> Result<(), SurfaceError>;
    fn remove_source(&self, id: &str) -> Result<(), SurfaceError>;
    fn add_primitive(
        &self,
        id: &str,
        source_id: &str,
        spec: &PrimitiveDescriptor,
        before_id: Option<&str>,
    ) -> Result<(), SurfaceError>;
    fn remove_primitive(&self, id: &str) -> Result<(), SurfaceError>;
    /// `None` resets the property to the surface default.
    fn set_paint_property(&self, id: &str, key: &str, value: Option<&Value>) -> Result<(), SurfaceError>;
    fn set_layout_property(&self, id: &str, key: &str, value: Option<&Value>) -> Result<(), SurfaceError>;
    fn set_filter(&self, id: &str, _filter: Option<&Value>) -> Result<(), SurfaceError> {
        Err(SurfaceError::rejected(id, "filters cannot be changed in place"))
    }
    fn has_primitive(&self, id: &str) -> bool;
    fn has_source(&self, id: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfacePrimitive {
    pub source_id: Option<String>,
    pub spec: PrimitiveDescriptor,
}

#[derive(Default)]
struct State {
    sources: BTreeMap<String, SourceSpec>,
    order: Vec<String>,
    primitives: BTreeMap<String, SurfacePrimitive>,
    rejected_ids: BTreeSet<String>,
    rejected_keys: BTreeSet<String>,
    pinned_ids: BTreeSet<String>,
    mutations: u64,
}

/// Surface kept in memory: draw order, sources and primitive properties.
///
/// Enforces the same rules a map renderer does (unique ids, existing anchors, no source
/// removal while primitives use it) and can be told to reject specific primitives,
/// removals or property keys.
#[derive(Default)]
pub struct InMemorySurface {
    state: Mutex<State>,
}

impl InMemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface pre-populated with non-overlay primitives, bottom first.
    pub fn with_base_primitives(ids: &[&str]) -> Self {
        let surface = Self::new();
        {
            let mut state = surface.state.lock();
            for id in ids {
                state.order.push(id.to_string());
                state.primitives.insert(
                    id.to_string(),
                    SurfacePrimitive {
                        source_id: None,
                        spec: PrimitiveDescriptor::new(layers::SubRole::Label, layers::PrimitiveType::Symbol),
                    },
                );
            }
        }
        surface
    }

    /// Draw order, bottom first.
    pub fn order(&self) -> Vec<String> {
        self.state.lock().order.clone()
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.state.lock().sources.keys().cloned().collect()
    }

    pub fn source(&self, id: &str) -> Option<SourceSpec> {
        self.state.lock().sources.get(id).cloned()
    }

    pub fn primitive(&self, id: &str) -> Option<SurfacePrimitive> {
        self.state.lock().primitives.get(id).cloned()
    }

    pub fn paint_property(&self, id: &str, key: &str) -> Option<Value> {
        self.state.lock().primitives.get(id)?.spec.paint.get(key).cloned()
    }

    /// Successful mutating calls so far.
    pub fn mutations(&self) -> u64 {
        self.state.lock().mutations
    }

    /// Reject any future `add_primitive` for `id`.
    pub fn reject_primitive(&self, id: &str) {
        self.state.lock().rejected_ids.insert(id.to_string());
    }

    /// Reject any future `remove_primitive` or `remove_source` for `id`.
    pub fn pin(&self, id: &str) {
        self.state.lock().pinned_ids.insert(id.to_string());
    }

    /// Reject any future property change for `key`.
    pub fn reject_property(&self, key: &str) {
        self.state.lock().rejected_keys.insert(key.to_string());
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.rejected_ids.clear();
        state.rejected_keys.clear();
        state.pinned_ids.clear();
    }

    fn update<F>(&self, id: &str, key: &str, apply: F) -> Result<(), SurfaceError>
    where
        F: FnOnce(&mut PrimitiveDescriptor),
    {
        let mut state = self.state.lock();
        if state.rejected_keys.contains(key) {
            return Err(SurfaceError::rejected(id, format!("property {key} rejected")));
        }
        let primitive = state
            .primitives
            .get_mut(id)
            .ok_or_else(|| SurfaceError::rejected(id, "no such primitive"))?;
        apply(&mut primitive.spec);
        state.mutations += 1;
        Ok(())
    }
}

fn set_or_reset(bag: &mut layers::descriptor::PropertyBag, key: &str, value: Option<&Value>) {
    match value {
        Some(v) => {
            bag.insert(key.to_string(), v.clone());
        }
        None => {
            bag.remove(key);
        }
    }
}

impl RenderSurface for InMemorySurface {
    fn add_source(&self, id: &str, source: &SourceSpec) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        if state.sources.contains_key(id) {
            return Err(SurfaceError::rejected(id, "source already exists"));
        }
        state.sources.insert(id.to_string(), source.clone());
        state.mutations += 1;
        Ok(())
    }

    fn remove_source(&self, id: &str) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        if state.pinned_ids.contains(id) {
            return Err(SurfaceError::rejected(id, "source pinned"));
        }
        if !state.sources.contains_key(id) {
            return Err(SurfaceError::rejected(id, "no such source"));
        }
        if let Some(user) = state
            .primitives
            .iter()
            .find(|(_, p)| p.source_id.as_deref() == Some(id))
            .map(|(pid, _)| pid.clone())
        {
            return Err(SurfaceError::rejected(id, format!("source in use by {user}")));
        }
        state.sources.remove(id);
        state.mutations += 1;
        Ok(())
    }

    fn add_primitive(
        &self,
        id: &str,
        source_id: &str,
        spec: &PrimitiveDescriptor,
        before_id: Option<&str>,
    ) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        if state.rejected_ids.contains(id) {
            return Err(SurfaceError::rejected(id, "primitive rejected"));
        }
        if state.primitives.contains_key(id) {
            return Err(SurfaceError::rejected(id, "primitive already exists"));
        }
        if !state.sources.contains_key(source_id) {
            return Err(SurfaceError::rejected(id, format!("unknown source {source_id}")));
        }
        let position = match before_id {
            Some(anchor) => state
                .order
                .iter()
                .position(|o| o == anchor)
                .ok_or_else(|| SurfaceError::rejected(id, format!("anchor {anchor} not found")))?,
            None => state.order.len(),
        };
        state.order.insert(position, id.to_string());
        state.primitives.insert(
            id.to_string(),
            SurfacePrimitive {
                source_id: Some(source_id.to_string()),
                spec: spec.clone(),
            },
        );
        state.mutations += 1;
        Ok(())
    }

    fn remove_primitive(&self, id: &str) -> Result<(), SurfaceError> {
        let mut state = self.state.lock();
        if state.pinned_ids.contains(id) {
            return Err(SurfaceError::rejected(id, "primitive pinned"));
        }
        if state.primitives.remove(id).is_none() {
            return Err(SurfaceError::rejected(id, "no such primitive"));
        }
        state.order.retain(|o| o != id);
        state.mutations += 1;
        Ok(())
    }

    fn set_paint_property(&self, id: &str, key: &str, value: Option<&Value>) -> Result<(), SurfaceError> {
        self.update(id, key, |spec| set_or_reset(&mut spec.paint, key, value))
    }

    fn set_layout_property(&self, id: &str, key: &str, value: Option<&Value>) -> Result<(), SurfaceError> {
        self.update(id, key, |spec| set_or_reset(&mut spec.layout, key, value))
    }

    fn set_filter(&self, id: &str, filter: Option<&Value>) -> Result<(), SurfaceError> {
        self.update(id, "filter", |spec| spec.filter = filter.cloned())
    }

    fn has_primitive(&self, id: &str) -> bool {
        self.state.lock().primitives.contains_key(id)
    }

    fn has_source(&self, id: &str) -> bool {
        self.state.lock().sources.contains_key(id)
    }
}
