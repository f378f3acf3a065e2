use std::collections::BTreeMap;
use std::f64::consts::TAU;

use kl_core::{CoreResult, Device, ModelConfig, ModelKind, Pose, UpdateContext};

use super::spread;

/// A ring of sonar transducers, each sampling a narrow cone with a few rays.
#[derive(Debug, Clone)]
pub struct Sonar {
    /// Minimum reportable range in metres.
    pub range_min: f64,
    /// Maximum range in metres.
    pub range_max: f64,
    /// Cone width of each transducer, in radians.
    pub fov: f64,
    /// Rays cast per cone.
    pub rays: usize,
    count: usize,
    overrides: BTreeMap<usize, Pose>,
    ranges: Vec<f64>,
}

impl Default for Sonar {
    fn default() -> Self {
        Self {
            range_min: 0.0,
            range_max: 5.0,
            fov: 15f64.to_radians(),
            rays: 3,
            count: 16,
            overrides: BTreeMap::new(),
            ranges: Vec::new(),
        }
    }
}

impl Sonar {
    /// Number of transducers.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Pose of transducer `i` relative to the sonar model. Transducers without
    /// an explicit pose face outward around a ring.
    pub fn transducer(&self, i: usize) -> Pose {
        match self.overrides.get(&i) {
            Some(pose) => *pose,
            None => Pose::new(0.0, 0.0, TAU * i as f64 / self.count.max(1) as f64),
        }
    }

    /// Latest range per transducer. Empty before the first update.
    pub fn ranges(&self) -> &[f64] {
        &self.ranges
    }
}

impl Device for Sonar {
    fn kind(&self) -> ModelKind {
        ModelKind::Sonar
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        let pose = ctx.global_pose()?;
        let mut ranges = Vec::with_capacity(self.count);
        for i in 0..self.count {
            let t = pose.compose(&self.transducer(i));
            let nearest = (0..self.rays.max(1))
                .map(|r| {
                    let heading = t.a + spread(self.fov, self.rays, r);
                    ctx.raytrace(t.point(), heading, self.range_max)
                        .map_or(self.range_max, |hit| hit.range.max(self.range_min))
                })
                .fold(self.range_max, f64::min);
            ranges.push(nearest);
        }
        self.ranges = ranges;
        Ok(())
    }

    fn load(&mut self, config: &ModelConfig) -> CoreResult<()> {
        let count = config.read_count("scount", self.count)?;
        let mut overrides = BTreeMap::new();
        for i in 0..count {
            if let Some([x, y, a]) = config.read_tuple::<3>(&format!("spose[{i}]"))? {
                overrides.insert(i, Pose::new(x, y, a.to_radians()));
            } else if let Some(existing) = self.overrides.get(&i) {
                overrides.insert(i, *existing);
            }
        }
        let range_min = config.read_float("range_min", self.range_min)?;
        let range_max = config.read_float("range_max", self.range_max)?;
        let fov = config.read_angle("fov", self.fov)?;
        let rays = config.read_count("rays", self.rays)?;
        self.range_min = range_min;
        self.range_max = range_max;
        self.fov = fov;
        self.rays = rays;
        self.count = count;
        self.overrides = overrides;
        Ok(())
    }

    fn save(&self, config: &mut ModelConfig) {
        config.set("scount", self.count);
        for (i, pose) in &self.overrides {
            config.set(
                format!("spose[{i}]"),
                format!("{} {} {}", pose.x, pose.y, pose.a.to_degrees()),
            );
        }
        config.set("range_min", self.range_min);
        config.set("range_max", self.range_max);
        config.set("fov", self.fov.to_degrees());
        config.set("rays", self.rays);
    }

    fn describe(&self) -> String {
        match self.ranges.iter().copied().reduce(f64::min) {
            Some(min) => format!("{} transducers, nearest {:.2} m", self.ranges.len(), min),
            None => "no scan yet".to_string(),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
