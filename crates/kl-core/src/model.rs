use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::device::Device;
use crate::error::{CoreError, CoreResult};
use crate::geometry::{Pose, Size};
use crate::id::ModelId;
use crate::matrix::Region;

/// The variant of a model. Each variant has its own [`Device`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// A plain body or environment fixture.
    Basic,
    /// A scanning laser range-finder.
    Laser,
    /// A ring of sonar transducers.
    Sonar,
    /// A mobile base with odometry.
    Position,
    /// Classifies a laser's hits as anonymous or identified beacons.
    BeaconDetector,
    /// Detects beacon-bearing models by geometry.
    Fiducial,
    /// Detects coloured models and reports image blobs.
    BlobFinder,
}

impl ModelKind {
    /// Every kind, in declaration order.
    pub const ALL: [ModelKind; 7] = [
        Self::Basic,
        Self::Laser,
        Self::Sonar,
        Self::Position,
        Self::BeaconDetector,
        Self::Fiducial,
        Self::BlobFinder,
    ];

    /// The canonical type token, used in configuration and generated names.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Laser => "laser",
            Self::Sonar => "sonar",
            Self::Position => "position",
            Self::BeaconDetector => "beacon-detector",
            Self::Fiducial => "fiducial",
            Self::BlobFinder => "blob-finder",
        }
    }

    /// Parse a type token. Older world-file spellings are accepted as aliases.
    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "basic" | "model" => Ok(Self::Basic),
            "laser" => Ok(Self::Laser),
            "sonar" | "ranger" => Ok(Self::Sonar),
            "position" => Ok(Self::Position),
            "beacon-detector" | "lbd" => Ok(Self::BeaconDetector),
            "fiducial" | "fiducialfinder" => Ok(Self::Fiducial),
            "blob-finder" | "blobfinder" => Ok(Self::BlobFinder),
            other => Err(CoreError::UnknownModelType(other.to_string())),
        }
    }

    /// Footprint used when the configuration gives no size.
    pub fn default_size(&self) -> Size {
        match self {
            Self::Basic => Size::new(1.0, 1.0),
            Self::Position => Size::new(0.44, 0.38),
            Self::Laser => Size::new(0.15, 0.15),
            _ => Size::new(0.1, 0.1),
        }
    }

    /// Whether models of this kind occupy the spatial index by default.
    pub fn default_obstacle_return(&self) -> bool {
        matches!(self, Self::Basic | Self::Position)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Lifecycle of a model. Destroyed models are simply absent from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Allocated, no configuration applied yet.
    Created,
    /// Configuration applied, not yet updated.
    Configured,
    /// Updated at least once.
    Active,
}

/// One simulated entity: a body, a sensor device, or a fixture.
#[derive(Debug)]
pub struct Model {
    id: ModelId,
    name: String,
    kind: ModelKind,
    parent: Option<ModelId>,
    children: Vec<ModelId>,
    child_type_counts: HashMap<ModelKind, u32>,
    lifecycle: Lifecycle,
    last_update: Option<u64>,
    pub(crate) footprint: Option<Region>,
    pub(crate) device: Box<dyn Device>,

    /// Pose relative to the parent (or the world for top-level models).
    pub pose: Pose,
    /// Extent of the model's bounding rectangle.
    pub size: Size,
    /// Whether the model occupies the spatial index.
    pub obstacle_return: bool,
    /// Beacon id carried by the model, if it is beacon-bearing.
    pub fiducial_return: Option<u32>,
    /// Colour seen by blob finders.
    pub color: Option<String>,
}

impl Model {
    pub(crate) fn new(
        id: ModelId,
        name: String,
        parent: Option<ModelId>,
        device: Box<dyn Device>,
    ) -> Self {
        let kind = device.kind();
        Self {
            id,
            name,
            kind,
            parent,
            children: Vec::new(),
            child_type_counts: HashMap::new(),
            lifecycle: Lifecycle::Created,
            last_update: None,
            footprint: None,
            device,
            pose: Pose::default(),
            size: kind.default_size(),
            obstacle_return: kind.default_obstacle_return(),
            fiducial_return: None,
            color: None,
        }
    }

    /// The model's registry identifier.
    pub fn id(&self) -> ModelId {
        self.id
    }

    /// The model's name, unique among its siblings.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The model's variant.
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// The owning parent, or `None` for a top-level model.
    pub fn parent(&self) -> Option<ModelId> {
        self.parent
    }

    /// Owned children, in creation order.
    pub fn children(&self) -> &[ModelId] {
        &self.children
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Simulated time (ms) of the last update, if any.
    pub fn last_update(&self) -> Option<u64> {
        self.last_update
    }

    /// The region currently written to the spatial index for this model.
    pub fn footprint(&self) -> Option<Region> {
        self.footprint
    }

    /// Return `true` if this model carries a beacon id.
    pub fn is_beacon(&self) -> bool {
        self.fiducial_return.is_some()
    }

    /// The model's device.
    pub fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }

    /// The model's device, mutably.
    pub fn device_mut(&mut self) -> &mut dyn Device {
        self.device.as_mut()
    }

    /// Downcast the device to its concrete type.
    pub fn device_as<T: Device + 'static>(&self) -> Option<&T> {
        self.device.as_any().downcast_ref::<T>()
    }

    /// Downcast the device to its concrete type, mutably.
    pub fn device_as_mut<T: Device + 'static>(&mut self) -> Option<&mut T> {
        self.device.as_any_mut().downcast_mut::<T>()
    }

    /// Apply a configuration section. Unknown keys are ignored and missing
    /// keys keep their current values.
    ///
    /// Values are validated before anything is changed, so a malformed
    /// section leaves the model untouched.
    pub fn load(&mut self, config: &ModelConfig) -> CoreResult<()> {
        let pose = Pose::new(
            config.read_float("pose_x", self.pose.x)?,
            config.read_float("pose_y", self.pose.y)?,
            config.read_angle("pose_a", self.pose.a)?,
        );
        let size = Size::new(
            config.read_float("size_x", self.size.x)?,
            config.read_float("size_y", self.size.y)?,
        );
        if size.x < 0.0 || size.y < 0.0 {
            return Err(CoreError::MalformedValue {
                key: "size_x".to_string(),
                value: format!("{} x {}", size.x, size.y),
                expected: "non-negative extents",
            });
        }
        let obstacle_return = config.read_bool("obstacle_return", self.obstacle_return)?;
        let fiducial = config.read_int(
            "fiducial_return",
            self.fiducial_return.map(i64::from).unwrap_or(0),
        )?;
        let fiducial_return = match fiducial {
            0 => None,
            n => Some(u32::try_from(n).map_err(|_| CoreError::MalformedValue {
                key: "fiducial_return".to_string(),
                value: n.to_string(),
                expected: "a non-negative beacon id",
            })?),
        };

        self.device.load(config)?;

        self.pose = pose;
        self.size = size;
        self.obstacle_return = obstacle_return;
        self.fiducial_return = fiducial_return;
        if config.contains("color") {
            self.color = Some(config.read_string("color", ""));
        }
        self.lifecycle = Lifecycle::Configured;
        Ok(())
    }

    /// Serialize the model's parameters back into a configuration section.
    pub fn save(&self) -> ModelConfig {
        let mut config = ModelConfig::new()
            .with("name", self.name.as_str())
            .with("pose_x", self.pose.x)
            .with("pose_y", self.pose.y)
            .with("pose_a", self.pose.a.to_degrees())
            .with("size_x", self.size.x)
            .with("size_y", self.size.y)
            .with("obstacle_return", self.obstacle_return)
            .with("fiducial_return", self.fiducial_return.unwrap_or(0));
        if let Some(color) = &self.color {
            config.set("color", color.as_str());
        }
        self.device.save(&mut config);
        config
    }

    pub(crate) fn add_child(&mut self, child: ModelId) {
        self.children.push(child);
    }

    pub(crate) fn remove_child(&mut self, child: ModelId) {
        self.children.retain(|c| *c != child);
    }

    /// Bump and return the per-type instantiation counter for children of this model.
    pub fn next_child_index(&mut self, kind: ModelKind) -> u32 {
        let counter = self.child_type_counts.entry(kind).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }

    pub(crate) fn mark_updated(&mut self, time: u64) {
        self.lifecycle = Lifecycle::Active;
        self.last_update = Some(time);
    }
}
