//! Render-primitive descriptions produced by the builder.
//!
//! Descriptors are plain data: property bags hold style-expression JSON exactly as the
//! rendering surface consumes it. Identifiers are derived from the overlay kind and each
//! primitive's role, so two descriptors of the same kind always name the same primitives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::kind::OverlayKind;

pub type PropertyBag = BTreeMap<String, Value>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrimitiveType {
    Raster,
    Line,
    Fill,
    Symbol,
    Circle,
}

/// What a primitive contributes to its overlay.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubRole {
    Raster,
    Fill,
    Border,
    Line,
    Label,
    Clusters,
    ClusterCount,
    Points,
}

impl SubRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            SubRole::Raster => "raster",
            SubRole::Fill => "fill",
            SubRole::Border => "border",
            SubRole::Line => "line",
            SubRole::Label => "label",
            SubRole::Clusters => "clusters",
            SubRole::ClusterCount => "cluster-count",
            SubRole::Points => "points",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveDescriptor {
    pub role: SubRole,
    /// Groups primitives of a composite overlay (e.g. one track segment's border + line).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    #[serde(rename = "type")]
    pub primitive_type: PrimitiveType,
    /// Vector sub-layer inside the tile set, bound from provider metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default)]
    pub paint: PropertyBag,
    #[serde(default)]
    pub layout: PropertyBag,
}

impl PrimitiveDescriptor {
    pub fn new(role: SubRole, primitive_type: PrimitiveType) -> Self {
        Self {
            role,
            segment: None,
            primitive_type,
            source_layer: None,
            filter: None,
            paint: PropertyBag::new(),
            layout: PropertyBag::new(),
        }
    }

    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = Some(segment.into());
        self
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn paint(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.paint.insert(key.to_string(), value.into());
        self
    }

    pub fn layout(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.layout.insert(key.to_string(), value.into());
        self
    }

    pub fn visible(self, visible: bool) -> Self {
        self.layout("visibility", if visible { "visible" } else { "none" })
    }

    pub fn id_suffix(&self) -> String {
        match &self.segment {
            Some(segment) => format!("{segment}-{}", self.role.as_str()),
            None => self.role.as_str().to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Raster,
    Vector,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOptions {
    pub radius: u32,
    pub max_zoom: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterOptions>,
}

impl SourceDescriptor {
    pub fn raster(tile_size: u32) -> Self {
        Self {
            source_type: SourceType::Raster,
            tile_size: Some(tile_size),
            cluster: None,
        }
    }

    pub fn vector() -> Self {
        Self {
            source_type: SourceType::Vector,
            tile_size: None,
            cluster: None,
        }
    }

    pub fn clustered(radius: u32, max_zoom: u8) -> Self {
        Self {
            source_type: SourceType::Vector,
            tile_size: None,
            cluster: Some(ClusterOptions { radius, max_zoom }),
        }
    }
}

/// Continuous motion declared by an overlay: a cyclic translation of `property` on the
/// primitives with the listed roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationSpec {
    pub property: String,
    pub roles: Vec<SubRole>,
    pub distance_px: f64,
    pub enabled: bool,
    /// Cycles per second.
    pub speed: f64,
}

impl AnimationSpec {
    /// Property value at `phase` in `[0, 1)`.
    pub fn value_at(&self, phase: f64) -> Value {
        json!([self.distance_px * phase, 0.0])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayDescriptor {
    pub kind: OverlayKind,
    pub source: SourceDescriptor,
    /// Bottom-most first.
    pub primitives: Vec<PrimitiveDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<AnimationSpec>,
}

impl OverlayDescriptor {
    pub fn source_id(&self) -> String {
        self.kind.source_id()
    }

    pub fn primitive_id(&self, primitive: &PrimitiveDescriptor) -> String {
        self.kind.primitive_id(&primitive.id_suffix())
    }

    pub fn primitive_ids(&self) -> Vec<String> {
        self.primitives.iter().map(|p| self.primitive_id(p)).collect()
    }

    /// Ids of the primitives the animation drives.
    pub fn animated_ids(&self) -> Vec<String> {
        let Some(animation) = &self.animation else {
            return Vec::new();
        };
        self.primitives
            .iter()
            .filter(|p| animation.roles.contains(&p.role))
            .map(|p| self.primitive_id(p))
            .collect()
    }

    /// Bind every primitive of a vector source to the provider's sub-layer.
    pub fn bind_source_layer(&mut self, name: &str) {
        if self.source.source_type != SourceType::Vector {
            return;
        }
        for p in &mut self.primitives {
            p.source_layer = Some(name.to_string());
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyScope {
    Paint,
    Layout,
    Filter,
}

/// One property change. `value: None` resets the property to the surface default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyUpdate {
    pub primitive_id: String,
    pub scope: PropertyScope,
    pub key: String,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DescriptorDiff {
    pub updates: Vec<PropertyUpdate>,
    /// Source options differ; these cannot be changed in place.
    pub source_changed: bool,
    /// Primitives present on only one side; these cannot be changed in place.
    pub structure_changed: bool,
}

impl DescriptorDiff {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && !self.source_changed && !self.structure_changed
    }
}

/// Property-level changes turning `old` into `new`, in primitive order.
pub fn diff(old: &OverlayDescriptor, new: &OverlayDescriptor) -> DescriptorDiff {
    let mut out = DescriptorDiff {
        source_changed: old.source != new.source,
        ..DescriptorDiff::default()
    };

    let old_ids = old.primitive_ids();
    let new_ids = new.primitive_ids();
    out.structure_changed = old_ids != new_ids;

    for (id, next) in new_ids.iter().zip(&new.primitives) {
        let Some(prev) = old_ids
            .iter()
            .position(|o| o == id)
            .map(|i| &old.primitives[i])
        else {
            continue;
        };
        diff_bag(&mut out.updates, id, PropertyScope::Paint, &prev.paint, &next.paint);
        diff_bag(&mut out.updates, id, PropertyScope::Layout, &prev.layout, &next.layout);
        if prev.filter != next.filter {
            out.updates.push(PropertyUpdate {
                primitive_id: id.clone(),
                scope: PropertyScope::Filter,
                key: "filter".to_string(),
                value: next.filter.clone(),
            });
        }
    }
    out
}

fn diff_bag(
    out: &mut Vec<PropertyUpdate>,
    id: &str,
    scope: PropertyScope,
    prev: &PropertyBag,
    next: &PropertyBag,
) {
    for (key, value) in next {
        if prev.get(key) != Some(value) {
            out.push(PropertyUpdate {
                primitive_id: id.to_string(),
                scope,
                key: key.clone(),
                value: Some(value.clone()),
            });
        }
    }
    for key in prev.keys().filter(|k| !next.contains_key(*k)) {
        out.push(PropertyUpdate {
            primitive_id: id.to_string(),
            scope,
            key: key.clone(),
            value: None,
        });
    }
}
