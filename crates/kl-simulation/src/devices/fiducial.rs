use kl_core::geometry::normalize_angle;
use kl_core::{CoreResult, Device, ModelConfig, ModelId, ModelKind, UpdateContext};

/// A beacon-bearing model seen by a fiducial finder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiducialDetection {
    /// The detected model.
    pub model: ModelId,
    /// Beacon id, present only within `range_max_id`.
    pub id: Option<u32>,
    /// Distance to the beacon's centre in metres.
    pub range: f64,
    /// Bearing of the beacon relative to the finder's heading.
    pub bearing: f64,
    /// Heading of the beacon relative to the finder's heading.
    pub heading: f64,
}

/// Detects beacon-bearing models by geometry: range, field of view, and line of sight.
#[derive(Debug, Clone)]
pub struct FiducialFinder {
    /// Minimum detection range in metres.
    pub range_min: f64,
    /// Maximum detection range in metres.
    pub range_max: f64,
    /// Maximum range at which the beacon id can be read.
    pub range_max_id: f64,
    /// Field of view in radians.
    pub fov: f64,
    detections: Vec<FiducialDetection>,
}

impl Default for FiducialFinder {
    fn default() -> Self {
        Self {
            range_min: 0.0,
            range_max: 8.0,
            range_max_id: 5.0,
            fov: std::f64::consts::PI,
            detections: Vec::new(),
        }
    }
}

impl FiducialFinder {
    /// Beacons seen by the latest update, nearest first.
    pub fn detections(&self) -> &[FiducialDetection] {
        &self.detections
    }
}

impl Device for FiducialFinder {
    fn kind(&self) -> ModelKind {
        ModelKind::Fiducial
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        let pose = ctx.global_pose()?;
        let root = ctx.registry.root_of(ctx.model);
        let mut detections = Vec::new();
        for model in ctx.registry.iter() {
            let Some(beacon_id) = model.fiducial_return else {
                continue;
            };
            if ctx.registry.root_of(model.id()) == root {
                continue;
            }
            let Some(target) = ctx.registry.global_pose(model.id()) else {
                continue;
            };
            let range = pose.point().distance_to(target.point());
            if range < self.range_min || range > self.range_max {
                continue;
            }
            let bearing = pose.bearing_to(target.point());
            if bearing.abs() > self.fov / 2.0 {
                continue;
            }
            if !ctx.line_of_sight(pose.point(), model.id()) {
                continue;
            }
            detections.push(FiducialDetection {
                model: model.id(),
                id: (range <= self.range_max_id).then_some(beacon_id),
                range,
                bearing,
                heading: normalize_angle(target.a - pose.a),
            });
        }
        detections.sort_by(|a, b| a.range.total_cmp(&b.range));
        self.detections = detections;
        Ok(())
    }

    fn load(&mut self, config: &ModelConfig) -> CoreResult<()> {
        let range_min = config.read_float("range_min", self.range_min)?;
        let range_max = config.read_float("range_max", self.range_max)?;
        let range_max_id = config.read_float("range_max_id", self.range_max_id)?;
        let fov = config.read_angle("fov", self.fov)?;
        self.range_min = range_min;
        self.range_max = range_max;
        self.range_max_id = range_max_id;
        self.fov = fov;
        Ok(())
    }

    fn save(&self, config: &mut ModelConfig) {
        config.set("range_min", self.range_min);
        config.set("range_max", self.range_max);
        config.set("range_max_id", self.range_max_id);
        config.set("fov", self.fov.to_degrees());
    }

    fn describe(&self) -> String {
        let ids: Vec<String> = self
            .detections
            .iter()
            .map(|d| match d.id {
                Some(id) => format!("#{id}@{:.1}m", d.range),
                None => format!("?@{:.1}m", d.range),
            })
            .collect();
        if ids.is_empty() {
            "no fiducials".to_string()
        } else {
            ids.join(" ")
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
