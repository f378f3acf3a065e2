use kl_core::{CoreError, CoreResult, Device, ModelConfig, ModelId, ModelKind, UpdateContext};

use super::spread;

/// One beam of a laser scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaserSample {
    /// Beam direction relative to the laser's heading, in radians.
    pub bearing: f64,
    /// Measured range in metres; `range_max` when nothing was hit.
    pub range: f64,
    /// The model the beam struck, if any.
    pub hit: Option<ModelId>,
}

/// A scanning laser range-finder: one raytrace per beam across its field of view.
#[derive(Debug, Clone)]
pub struct Laser {
    /// Minimum reportable range in metres.
    pub range_min: f64,
    /// Maximum range in metres.
    pub range_max: f64,
    /// Field of view in radians.
    pub fov: f64,
    /// Number of beams.
    pub samples: usize,
    readings: Vec<LaserSample>,
}

impl Default for Laser {
    fn default() -> Self {
        Self {
            range_min: 0.0,
            range_max: 8.0,
            fov: std::f64::consts::PI,
            samples: 180,
            readings: Vec::new(),
        }
    }
}

impl Laser {
    /// The latest scan, one sample per beam. Empty before the first update.
    pub fn readings(&self) -> &[LaserSample] {
        &self.readings
    }

    /// Bearing of beam `i` relative to the laser's heading.
    pub fn bearing(&self, i: usize) -> f64 {
        spread(self.fov, self.samples, i)
    }

    /// The closest sample that struck something.
    pub fn nearest_hit(&self) -> Option<&LaserSample> {
        self.readings
            .iter()
            .filter(|s| s.hit.is_some())
            .min_by(|a, b| a.range.total_cmp(&b.range))
    }
}

impl Device for Laser {
    fn kind(&self) -> ModelKind {
        ModelKind::Laser
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        let pose = ctx.global_pose()?;
        let origin = pose.point();
        let readings = (0..self.samples)
            .map(|i| {
                let bearing = self.bearing(i);
                match ctx.raytrace(origin, pose.a + bearing, self.range_max) {
                    Some(hit) => LaserSample {
                        bearing,
                        range: hit.range.max(self.range_min),
                        hit: Some(hit.owner),
                    },
                    None => LaserSample {
                        bearing,
                        range: self.range_max,
                        hit: None,
                    },
                }
            })
            .collect();
        self.readings = readings;
        Ok(())
    }

    fn load(&mut self, config: &ModelConfig) -> CoreResult<()> {
        let range_min = config.read_float("range_min", self.range_min)?;
        let range_max = config.read_float("range_max", self.range_max)?;
        let fov = config.read_angle("fov", self.fov)?;
        let samples = config.read_count("samples", self.samples)?;
        if samples == 0 {
            return Err(CoreError::MalformedValue {
                key: "samples".to_string(),
                value: "0".to_string(),
                expected: "at least one beam",
            });
        }
        if range_max < range_min {
            return Err(CoreError::MalformedValue {
                key: "range_max".to_string(),
                value: range_max.to_string(),
                expected: "a value not below range_min",
            });
        }
        self.range_min = range_min;
        self.range_max = range_max;
        self.fov = fov;
        self.samples = samples;
        Ok(())
    }

    fn save(&self, config: &mut ModelConfig) {
        config.set("range_min", self.range_min);
        config.set("range_max", self.range_max);
        config.set("fov", self.fov.to_degrees());
        config.set("samples", self.samples);
    }

    fn describe(&self) -> String {
        match self.nearest_hit() {
            Some(s) => format!(
                "{} beams, nearest {:.2} m at {:.0}\u{b0}",
                self.readings.len(),
                s.range,
                s.bearing.to_degrees()
            ),
            None if self.readings.is_empty() => "no scan yet".to_string(),
            None => format!("{} beams, clear", self.readings.len()),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
