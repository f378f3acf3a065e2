use rand::rngs::StdRng;

use crate::config::ModelConfig;
use crate::error::{CoreError, CoreResult};
use crate::event::{EventLog, SimEvent, SimEventKind};
use crate::geometry::{Point, Pose};
use crate::id::ModelId;
use crate::matrix::{RayHit, Region, SpatialIndex};
use crate::model::{Model, ModelKind};
use crate::registry::ModelRegistry;

/// The per-variant behaviour of a model.
///
/// The registry updates devices one at a time. While a device runs, its own
/// slot in the registry holds a [`Detached`] placeholder, so the device may
/// freely read every other model through the [`UpdateContext`].
pub trait Device: std::fmt::Debug {
    /// The model variant this device implements.
    fn kind(&self) -> ModelKind;

    /// Recompute derived state for simulated time `ctx.time`.
    ///
    /// Calling this twice with the same time and no intervening world change
    /// must produce the same state.
    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()>;

    /// Apply device-specific configuration keys.
    fn load(&mut self, _config: &ModelConfig) -> CoreResult<()> {
        Ok(())
    }

    /// Write device-specific configuration keys.
    fn save(&self, _config: &mut ModelConfig) {}

    /// One-line summary of the latest reading.
    fn describe(&self) -> String {
        String::new()
    }

    /// Support downcasting to concrete types for cross-device reads.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Support downcasting to concrete types for cross-device reads.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Placeholder device occupying a model's slot while its real device updates.
#[derive(Debug)]
pub struct Detached(pub ModelKind);

impl Device for Detached {
    fn kind(&self) -> ModelKind {
        self.0
    }
    fn update(&mut self, _ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Mutable context passed to a device during its update.
pub struct UpdateContext<'a> {
    /// The model being updated.
    pub model: ModelId,
    /// Current simulated time in milliseconds.
    pub time: u64,
    /// Every model of the world.
    pub registry: &'a mut ModelRegistry,
    /// The world's occupancy grid.
    pub matrix: &'a mut SpatialIndex,
    /// The world's seeded random source.
    pub rng: &'a mut StdRng,
    /// The world's event log.
    pub events: &'a mut EventLog,
}

impl UpdateContext<'_> {
    /// The model being updated.
    pub fn this(&self) -> CoreResult<&Model> {
        self.registry
            .lookup_by_id(self.model)
            .ok_or(CoreError::ModelNotFound(self.model))
    }

    /// Global pose of the model being updated.
    pub fn global_pose(&self) -> CoreResult<Pose> {
        self.registry
            .global_pose(self.model)
            .ok_or(CoreError::ModelNotFound(self.model))
    }

    /// Cast a ray that ignores every model in this model's ownership tree.
    pub fn raytrace(&self, origin: Point, heading: f64, max_range: f64) -> Option<RayHit> {
        let registry = &*self.registry;
        let root = registry.root_of(self.model);
        self.matrix
            .raytrace_filtered(origin, heading, max_range, |owner| {
                registry.root_of(owner) != root
            })
    }

    /// Return `true` if nothing unrelated to either end blocks the straight
    /// line from `from` to the model `target`.
    pub fn line_of_sight(&self, from: Point, target: ModelId) -> bool {
        let Some(target_pose) = self.registry.global_pose(target) else {
            return false;
        };
        let to = target_pose.point();
        let range = from.distance_to(to);
        let target_root = self.registry.root_of(target);
        match self.raytrace(from, from.angle_to(to), range) {
            None => true,
            Some(hit) => self.registry.root_of(hit.owner) == target_root,
        }
    }

    /// Move the model being updated to a new pose relative to its parent.
    ///
    /// Returns `Ok(false)` without moving when the model is an obstacle and
    /// its footprint at the new pose overlaps an unrelated occupant.
    pub fn move_to(&mut self, pose: Pose) -> CoreResult<bool> {
        let model = self.this()?;
        let parent_pose = model
            .parent()
            .and_then(|p| self.registry.global_pose(p))
            .unwrap_or_default();
        if model.obstacle_return {
            let candidate = Region::Rect {
                pose: parent_pose.compose(&pose),
                size: model.size,
            };
            let root = self.registry.root_of(self.model);
            let blocked = self
                .matrix
                .region_owners(&candidate)
                .into_iter()
                .any(|owner| self.registry.root_of(owner) != root);
            if blocked {
                return Ok(false);
            }
        }
        if let Some(model) = self.registry.get_mut(self.model) {
            model.pose = pose;
        }
        self.registry.refresh_occupancy(self.model, self.matrix);
        Ok(true)
    }

    /// Emit a simulation event at the current time.
    pub fn emit(&mut self, kind: SimEventKind, description: impl Into<String>) {
        self.events.push(SimEvent::new(self.time, kind, description));
    }

    /// Log and record that a required sibling could not be resolved.
    pub fn report_missing_reference(&mut self, reference: &str) {
        let name = self
            .this()
            .map(|m| m.name().to_string())
            .unwrap_or_default();
        tracing::warn!(model = %name, reference, "device reference not found; keeping last reading");
        self.emit(
            SimEventKind::MissingReference {
                model: self.model,
                reference: reference.to_string(),
            },
            format!("{name} cannot find {reference}"),
        );
    }
}
