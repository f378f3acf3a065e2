use kl_core::{CoreResult, ModelConfig, ModelRegistry, SpatialIndex};

/// Read-only view of the world offered to a visualizer once per step.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    /// World name.
    pub name: &'a str,
    /// Every model.
    pub registry: &'a ModelRegistry,
    /// The occupancy grid.
    pub matrix: &'a SpatialIndex,
    /// Simulated time in milliseconds.
    pub sim_time: u64,
    /// Whether the world is paused.
    pub paused: bool,
}

/// What the visualizer asks of the world after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Poll {
    /// Keep going.
    #[default]
    Continue,
    /// Flip the pause flag.
    TogglePause,
    /// Stop the simulation.
    Quit,
}

/// The observer collaborator. Polled at the start of every step, paused or not.
pub trait Visualizer: std::fmt::Debug {
    /// Apply the `window` section of a world description.
    fn load(&mut self, _config: &ModelConfig) -> CoreResult<()> {
        Ok(())
    }

    /// Handle pending input and optionally render. Must not block.
    fn poll(&mut self, snapshot: &Snapshot<'_>) -> Poll;

    /// Settings to write back to the `window` section.
    fn save(&self) -> Option<ModelConfig> {
        None
    }
}

/// A visualizer without a display. Keeps its window settings for saving and
/// traces a line per frame.
#[derive(Debug, Clone, Default)]
pub struct HeadlessView {
    settings: ModelConfig,
    frames: u64,
}

impl HeadlessView {
    /// Create a view with no settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames polled so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Visualizer for HeadlessView {
    fn load(&mut self, config: &ModelConfig) -> CoreResult<()> {
        self.settings.merge(config);
        Ok(())
    }

    fn poll(&mut self, snapshot: &Snapshot<'_>) -> Poll {
        self.frames += 1;
        tracing::trace!(
            world = snapshot.name,
            frame = self.frames,
            sim_time = snapshot.sim_time,
            models = snapshot.registry.len(),
            paused = snapshot.paused,
            "frame"
        );
        Poll::Continue
    }

    fn save(&self) -> Option<ModelConfig> {
        Some(self.settings.clone())
    }
}
