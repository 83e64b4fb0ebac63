//! Overlay kinds, panel configuration and the descriptor builder.

pub mod builder;
pub mod config;
pub mod cyclone;
pub mod descriptor;
pub mod error;
pub mod gradient;
pub mod kind;
pub mod symbology;
pub mod units;

pub use builder::build;
pub use config::{ConfigValue, GradientStop, OverlayConfiguration};
pub use descriptor::{
    AnimationSpec, DescriptorDiff, OverlayDescriptor, PrimitiveDescriptor, PrimitiveType,
    PropertyScope, PropertyUpdate, SourceDescriptor, SourceType, SubRole, diff,
};
pub use error::BuildError;
pub use kind::{OverlayKind, Shape, Tier};
pub use units::SpeedUnit;
