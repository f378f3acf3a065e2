//! Core kernel for Kulisse: models, their spatial index, and the registry.
//!
//! This crate knows nothing about wall-clock pacing or configuration files.
//! Devices plug in through the [`Device`] trait; the `kl-simulation` crate
//! provides the concrete sensor and actuator variants and the world loop.

/// Key/value configuration sections and typed readers.
pub mod config;
/// The device trait and the context handed to devices during an update.
pub mod device;
/// Error types used throughout the crate.
pub mod error;
/// Kernel event log.
pub mod event;
/// Points, poses, sizes, and angle helpers.
pub mod geometry;
/// Model and world identifiers.
pub mod id;
/// Multi-resolution occupancy grid with raytracing.
pub mod matrix;
/// Models, their kinds, and lifecycle.
pub mod model;
/// The model registry: id and name indices plus the ownership forest.
pub mod registry;

/// Re-export configuration types.
pub use config::{ConfigValue, ModelConfig};
/// Re-export device types.
pub use device::{Detached, Device, UpdateContext};
/// Re-export error types.
pub use error::{CoreError, CoreResult};
/// Re-export event types.
pub use event::{EventLog, SimEvent, SimEventKind};
/// Re-export geometry types.
pub use geometry::{Point, Pose, Size};
/// Re-export identifiers.
pub use id::{ModelId, WorldId};
/// Re-export spatial index types.
pub use matrix::{MatrixConfig, RayHit, Region, Resolution, SpatialIndex};
/// Re-export model types.
pub use model::{Lifecycle, Model, ModelKind};
/// Re-export the registry.
pub use registry::ModelRegistry;
