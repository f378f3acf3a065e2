//! Device models, pacing, and the world driver for Kulisse.
//!
//! Builds on the kernel in [`kl_core`]: this crate supplies the concrete
//! sensor and actuator devices, the wall-clock/sim-clock pacing, JSON world
//! descriptions, and the [`World`] composition root that steps every model.

/// Simulation clock: simulated time and wall-clock pacing.
pub mod clock;
/// World-level settings.
pub mod config;
/// Concrete device implementations for every model kind.
pub mod devices;
/// Error types for the simulation crate.
pub mod error;
/// Configuration sources and JSON world descriptions.
pub mod loader;
/// The visualization collaborator seam.
pub mod visualizer;
/// The world: composition root and step loop.
pub mod world;

/// Re-export of [`clock::SimClock`].
pub use clock::SimClock;
/// Re-export of [`config::WorldConfig`].
pub use config::WorldConfig;
/// Re-exports of [`error::SimError`] and [`error::SimResult`].
pub use error::{SimError, SimResult};
/// Re-exports of the configuration-source types.
pub use loader::{ConfigSource, Section, WorldFile};
/// Re-exports of the visualizer types.
pub use visualizer::{HeadlessView, Poll, Snapshot, Visualizer};
/// Re-exports of [`world::World`] and [`world::RejectedSection`].
pub use world::{RejectedSection, World};
