use kl_core::{CoreError, CoreResult, MatrixConfig, ModelConfig};

/// World-level settings, read from the `world` section of a description.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    /// Display name of the world.
    pub name: String,
    /// Simulated milliseconds per cycle.
    pub interval_sim: u64,
    /// Minimum wall-clock milliseconds between cycles.
    pub interval_real: u64,
    /// Fine grid cell size in metres.
    pub resolution: f64,
    /// Medium grid cell size in metres.
    pub resolution_med: f64,
    /// Coarse grid cell size in metres.
    pub resolution_low: f64,
    /// World width in metres, centred on the origin.
    pub size_x: f64,
    /// World height in metres, centred on the origin.
    pub size_y: f64,
    /// RNG seed for deterministic simulation.
    pub seed: u64,
    /// Maximum event log size (oldest events dropped when exceeded). 0 = unlimited.
    pub max_events: usize,
    /// Whether the world starts paused.
    pub paused: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: "world".to_string(),
            interval_sim: 100,
            interval_real: 100,
            resolution: 0.02,
            resolution_med: 0.2,
            resolution_low: 1.0,
            size_x: 100.0,
            size_y: 100.0,
            seed: 42,
            max_events: 1000,
            paused: false,
        }
    }
}

impl WorldConfig {
    /// Set the world name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the simulated step in milliseconds.
    pub fn with_interval_sim(mut self, ms: u64) -> Self {
        self.interval_sim = ms;
        self
    }

    /// Set the wall-clock pacing in milliseconds.
    pub fn with_interval_real(mut self, ms: u64) -> Self {
        self.interval_real = ms;
        self
    }

    /// Set the world extent in metres.
    pub fn with_size(mut self, x: f64, y: f64) -> Self {
        self.size_x = x;
        self.size_y = y;
        self
    }

    /// Set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the maximum event log size (0 = unlimited).
    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }

    /// Start the world paused or running.
    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    /// Read settings from a flat section. Missing keys keep their defaults.
    pub fn from_config(config: &ModelConfig) -> CoreResult<Self> {
        let d = Self::default();
        let parsed = Self {
            name: config.read_string("name", &d.name),
            interval_sim: config.read_count("interval_sim", d.interval_sim as usize)? as u64,
            interval_real: config.read_count("interval_real", d.interval_real as usize)? as u64,
            resolution: positive(config, "resolution", d.resolution)?,
            resolution_med: positive(config, "resolution_med", d.resolution_med)?,
            resolution_low: positive(config, "resolution_low", d.resolution_low)?,
            size_x: positive(config, "size_x", d.size_x)?,
            size_y: positive(config, "size_y", d.size_y)?,
            seed: config.read_count("seed", d.seed as usize)? as u64,
            max_events: config.read_count("max_events", d.max_events)?,
            paused: config.read_bool("paused", d.paused)?,
        };
        Ok(parsed)
    }

    /// Write settings back to a flat section.
    pub fn to_config(&self) -> ModelConfig {
        ModelConfig::new()
            .with("name", self.name.as_str())
            .with("interval_sim", self.interval_sim as i64)
            .with("interval_real", self.interval_real as i64)
            .with("resolution", self.resolution)
            .with("resolution_med", self.resolution_med)
            .with("resolution_low", self.resolution_low)
            .with("size_x", self.size_x)
            .with("size_y", self.size_y)
            .with("seed", self.seed as i64)
            .with("max_events", self.max_events)
            .with("paused", self.paused)
    }

    /// Spatial index layout for these settings.
    pub fn matrix_config(&self) -> MatrixConfig {
        MatrixConfig::default()
            .with_extent(self.size_x, self.size_y)
            .with_resolutions(self.resolution, self.resolution_med, self.resolution_low)
    }
}

fn positive(config: &ModelConfig, key: &str, default: f64) -> CoreResult<f64> {
    let v = config.read_float(key, default)?;
    if v > 0.0 && v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::MalformedValue {
            key: key.to_string(),
            value: v.to_string(),
            expected: "a positive number",
        })
    }
}
