use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use kl_core::geometry::rect_corners;
use kl_core::{
    CoreError, Device, EventLog, Model, ModelConfig, ModelId, ModelKind, ModelRegistry, Point,
    Pose, Region, SimEvent, SimEventKind, SpatialIndex, WorldId,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::clock::SimClock;
use crate::config::WorldConfig;
use crate::devices;
use crate::error::{SimError, SimResult};
use crate::loader::{ConfigSource, WINDOW_SECTION};
use crate::visualizer::{HeadlessView, Poll, Snapshot, Visualizer};

/// How long an idle step sleeps when asked to.
pub const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// A configuration section the loader skipped.
#[derive(Debug)]
pub struct RejectedSection {
    /// Index of the section in its source.
    pub index: usize,
    /// The section's declared type.
    pub kind: String,
    /// Why it was skipped.
    pub error: SimError,
}

/// The composition root: one spatial index, one model registry, one clock.
///
/// The world is driven by an outer loop calling [`World::step`] until it
/// returns `true`. Each due step updates every model once, in registry
/// order, then advances simulated time by one interval.
pub struct World {
    id: WorldId,
    config: WorldConfig,
    matrix: SpatialIndex,
    registry: ModelRegistry,
    clock: SimClock,
    rng: StdRng,
    events: EventLog,
    paused: bool,
    quit: bool,
    destroy_pending: bool,
    child_type_counts: HashMap<ModelKind, u32>,
    visualizer: Option<Box<dyn Visualizer>>,
    window_section: Option<usize>,
    source: Option<Box<dyn ConfigSource>>,
    section_models: Vec<(usize, ModelId)>,
    rejected: Vec<RejectedSection>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("sim_time", &self.clock.sim_time())
            .field("models", &self.registry.len())
            .field("paused", &self.paused)
            .finish()
    }
}

impl World {
    /// Create an empty world.
    pub fn new(config: WorldConfig) -> Self {
        let id = WorldId::new();
        tracing::info!(world = %id, name = %config.name, "world created");
        Self {
            id,
            matrix: SpatialIndex::new(config.matrix_config()),
            registry: ModelRegistry::new(),
            clock: SimClock::new(
                config.interval_sim,
                Duration::from_millis(config.interval_real),
            ),
            rng: StdRng::seed_from_u64(config.seed),
            events: EventLog::new(config.max_events),
            paused: config.paused,
            quit: false,
            destroy_pending: false,
            child_type_counts: HashMap::new(),
            visualizer: None,
            window_section: None,
            source: None,
            section_models: Vec::new(),
            rejected: Vec::new(),
            config,
        }
    }

    /// Build a world from a configuration source.
    ///
    /// A malformed `world` section fails the whole load. Every other problem
    /// is contained to its section: the section (and any section declared
    /// under it) is logged, recorded, and skipped.
    pub fn from_source(source: Box<dyn ConfigSource>) -> SimResult<Self> {
        let config = WorldConfig::from_config(source.world_config())?;
        let mut world = Self::new(config);
        let sections = source.sections().to_vec();
        world.source = Some(source);

        let mut created: HashMap<usize, ModelId> = HashMap::new();
        for (index, section) in sections.iter().enumerate() {
            match world.load_section(index, section, &created) {
                Ok(Some(id)) => {
                    created.insert(index, id);
                    world.section_models.push((index, id));
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(section = index, kind = %section.kind, %error, "configuration section skipped");
                    world.events.push(SimEvent::new(
                        world.clock.sim_time(),
                        SimEventKind::ConfigRejected { section: index },
                        format!("section {index} ({}): {error}", section.kind),
                    ));
                    world.rejected.push(RejectedSection {
                        index,
                        kind: section.kind.clone(),
                        error,
                    });
                }
            }
        }
        tracing::info!(
            world = %world.id,
            models = world.registry.len(),
            rejected = world.rejected.len(),
            "world loaded"
        );
        Ok(world)
    }

    fn load_section(
        &mut self,
        index: usize,
        section: &crate::loader::Section,
        created: &HashMap<usize, ModelId>,
    ) -> SimResult<Option<ModelId>> {
        if section.kind == WINDOW_SECTION {
            let mut view = HeadlessView::new();
            view.load(&section.config)?;
            self.visualizer = Some(Box::new(view));
            self.window_section = Some(index);
            return Ok(None);
        }
        let parent = match section.parent {
            None => None,
            Some(p) if p >= index => {
                return Err(SimError::BadParent {
                    section: index,
                    parent: p,
                });
            }
            Some(p) => Some(*created.get(&p).ok_or(SimError::ParentSkipped {
                section: index,
                parent: p,
            })?),
        };
        let kind = ModelKind::parse(&section.kind)?;
        let name = section
            .config
            .contains("name")
            .then(|| section.config.read_string("name", ""));
        self.create_model(parent, kind, name.as_deref(), &section.config)
            .map(Some)
    }

    // -----------------------------------------------------------------------
    // Model management
    // -----------------------------------------------------------------------

    /// Create and configure a model of a built-in kind.
    ///
    /// Without a name, one is generated as `<type>:<n>` for top-level models
    /// or `<parent>.<type>:<n>` for children, `<n>` counting per type within
    /// the parent scope.
    pub fn create_model(
        &mut self,
        parent: Option<ModelId>,
        kind: ModelKind,
        name: Option<&str>,
        config: &ModelConfig,
    ) -> SimResult<ModelId> {
        self.add_device(parent, devices::for_kind(kind), name, config)
    }

    /// Create and configure a model around an arbitrary device.
    pub fn add_device(
        &mut self,
        parent: Option<ModelId>,
        device: Box<dyn Device>,
        name: Option<&str>,
        config: &ModelConfig,
    ) -> SimResult<ModelId> {
        let kind = device.kind();
        let mut scoped = self.next_scoped_name(parent, kind)?;
        let name = match name {
            Some(n) => n.to_string(),
            None => {
                while self.registry.name_taken(parent, &scoped) {
                    scoped = self.next_scoped_name(parent, kind)?;
                }
                scoped
            }
        };

        let id = self.registry.create(parent, &name, device)?;
        let loaded = match self.registry.get_mut(id) {
            Some(model) => model.load(config),
            None => Err(CoreError::ModelNotFound(id)),
        };
        if let Err(error) = loaded {
            self.registry.destroy(id, &mut self.matrix)?;
            return Err(error.into());
        }
        self.registry.refresh_occupancy(id, &mut self.matrix);

        tracing::debug!(model = %id, name = %name, kind = %kind, "model created");
        self.events.push(SimEvent::new(
            self.clock.sim_time(),
            SimEventKind::ModelCreated { model: id },
            format!("{name} ({kind}) created"),
        ));
        Ok(id)
    }

    /// Consume the next `<type>:<n>` index in the scope of `parent`.
    fn next_scoped_name(&mut self, parent: Option<ModelId>, kind: ModelKind) -> SimResult<String> {
        match parent {
            Some(p) => {
                let parent_model = self
                    .registry
                    .get_mut(p)
                    .ok_or(CoreError::ParentNotFound(p))?;
                let index = parent_model.next_child_index(kind);
                Ok(format!("{}.{}:{index}", parent_model.name(), kind.token()))
            }
            None => {
                let counter = self.child_type_counts.entry(kind).or_insert(0);
                let index = *counter;
                *counter += 1;
                Ok(format!("{}:{index}", kind.token()))
            }
        }
    }

    /// Destroy a model and its subtree. Returns the removed ids.
    pub fn destroy_model(&mut self, id: ModelId) -> SimResult<Vec<ModelId>> {
        let removed = self.registry.destroy(id, &mut self.matrix)?;
        for mid in &removed {
            self.events.push(SimEvent::new(
                self.clock.sim_time(),
                SimEventKind::ModelDestroyed { model: *mid },
                format!("model {mid} destroyed"),
            ));
        }
        self.section_models.retain(|(_, mid)| !removed.contains(mid));
        Ok(removed)
    }

    /// Get a model by id.
    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.registry.lookup_by_id(id)
    }

    /// Get a model by name.
    pub fn lookup_by_name(&self, name: &str) -> Option<&Model> {
        self.registry.lookup_by_name(name)
    }

    /// Get a model mutably. Use [`World::set_pose`] to move it.
    pub fn model_mut(&mut self, id: ModelId) -> Option<&mut Model> {
        self.registry.get_mut(id)
    }

    /// Downcast a model's device, e.g. to command a [`devices::Position`].
    pub fn device_mut<T: Device + 'static>(&mut self, id: ModelId) -> Option<&mut T> {
        self.registry.get_mut(id)?.device_as_mut::<T>()
    }

    /// Place a model and refresh the occupancy of its subtree.
    pub fn set_pose(&mut self, id: ModelId, pose: Pose) -> SimResult<()> {
        let model = self
            .registry
            .get_mut(id)
            .ok_or(CoreError::ModelNotFound(id))?;
        model.pose = pose;
        self.registry.refresh_occupancy(id, &mut self.matrix);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Run one step against the current wall clock. Returns `true` once quit
    /// has been requested.
    pub fn step(&mut self, sleep_if_idle: bool) -> bool {
        self.step_at(Instant::now(), sleep_if_idle)
    }

    /// Run one step as if the wall clock read `now`.
    ///
    /// The visualizer is polled first. If the world is paused or the wall
    /// interval has not elapsed, nothing is updated and simulated time does
    /// not move; with `sleep_if_idle` the call then sleeps for [`IDLE_SLEEP`].
    pub fn step_at(&mut self, now: Instant, sleep_if_idle: bool) -> bool {
        if let Some(visualizer) = self.visualizer.as_mut() {
            let snapshot = Snapshot {
                name: &self.config.name,
                registry: &self.registry,
                matrix: &self.matrix,
                sim_time: self.clock.sim_time(),
                paused: self.paused,
            };
            match visualizer.poll(&snapshot) {
                Poll::Continue => {}
                Poll::TogglePause => self.paused = !self.paused,
                Poll::Quit => self.quit = true,
            }
        }
        if self.quit {
            return true;
        }

        if !self.paused && self.clock.is_due(now) {
            self.update_cycle();
            self.clock.complete_cycle(now);
        } else if sleep_if_idle {
            std::thread::sleep(IDLE_SLEEP);
        }
        self.quit
    }

    fn update_cycle(&mut self) {
        let time = self.clock.sim_time();
        for id in self.registry.ids() {
            if !self.registry.contains(id) {
                continue;
            }
            let result = self.registry.update_model(
                id,
                time,
                &mut self.matrix,
                &mut self.rng,
                &mut self.events,
            );
            if let Err(error) = result {
                tracing::warn!(model = %id, %error, "model update failed");
                self.events.push(SimEvent::new(
                    time,
                    SimEventKind::UpdateFailed { model: id },
                    error.to_string(),
                ));
            }
        }
    }

    /// Run steps without sleeping until `cycles` more cycles have completed
    /// or quit is requested. Returns the number of cycles run.
    pub fn run_cycles(&mut self, cycles: u64) -> u64 {
        let target = self.clock.cycles() + cycles;
        while self.clock.cycles() < target && !self.paused {
            if self.step(false) {
                break;
            }
            if !self.clock.is_due(Instant::now()) {
                std::thread::sleep(IDLE_SLEEP.min(self.clock.wall_interval()));
            }
        }
        cycles - (target - self.clock.cycles())
    }

    /// Suspend updates and simulated time. The visualizer is still polled.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume updates.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Flip the pause flag.
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Return `true` if the world is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Ask the driver loop to stop after the current step.
    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    /// Return `true` once quit has been requested.
    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    /// Mark the world for teardown by its owner.
    pub fn request_destroy(&mut self) {
        self.destroy_pending = true;
    }

    /// Return `true` if teardown has been requested.
    pub fn destroy_requested(&self) -> bool {
        self.destroy_pending
    }

    /// Change the wall-clock pacing. Zero runs cycles back to back.
    pub fn set_wall_interval(&mut self, interval: Duration) {
        self.clock.set_wall_interval(interval);
    }

    /// Attach a visualizer, replacing any loaded from a `window` section.
    pub fn set_visualizer(&mut self, visualizer: Box<dyn Visualizer>) {
        self.visualizer = Some(visualizer);
    }

    // -----------------------------------------------------------------------
    // Persistence and teardown
    // -----------------------------------------------------------------------

    /// Save every model created from a section back into the configuration
    /// source, then the visualizer settings, then persist the source.
    pub fn save(&mut self) -> SimResult<()> {
        let Some(source) = self.source.as_mut() else {
            tracing::debug!(world = %self.id, "no configuration source; nothing to save");
            return Ok(());
        };
        let mut world_config = self.config.clone();
        world_config.paused = self.paused;
        source.save_world(world_config.to_config());

        for (index, id) in &self.section_models {
            if let Some(model) = self.registry.lookup_by_id(*id) {
                source.save_section(*index, model.save());
            }
        }
        let window = self
            .window_section
            .zip(self.visualizer.as_ref().and_then(|v| v.save()));
        if let Some((index, settings)) = window {
            source.save_section(index, settings);
        }
        source.persist()?;
        tracing::info!(world = %self.id, models = self.section_models.len(), "world saved");
        Ok(())
    }

    /// Tear the world down, releasing every model and its occupancy.
    /// Returns the number of models released.
    pub fn destroy(mut self) -> usize {
        let count = self.registry.len();
        self.registry.clear(&mut self.matrix);
        tracing::info!(world = %self.id, models = count, "world destroyed");
        count
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// The world's unique id.
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// The world's name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Settings the world was built with.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Every model.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The occupancy grid.
    pub fn matrix(&self) -> &SpatialIndex {
        &self.matrix
    }

    /// The simulation clock.
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Current simulated time in milliseconds.
    pub fn sim_time(&self) -> u64 {
        self.clock.sim_time()
    }

    /// Kernel events recorded so far.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Sections skipped while loading.
    pub fn rejected_sections(&self) -> &[RejectedSection] {
        &self.rejected
    }

    /// Bounding box of every occupied footprint, or `None` for an empty world.
    pub fn dimensions(&self) -> Option<(Point, Point)> {
        let mut bounds: Option<(Point, Point)> = None;
        for model in self.registry.iter() {
            let Some(Region::Rect { pose, size }) = model.footprint() else {
                continue;
            };
            for corner in rect_corners(&pose, size) {
                bounds = Some(match bounds {
                    None => (corner, corner),
                    Some((lo, hi)) => (
                        Point::new(lo.x.min(corner.x), lo.y.min(corner.y)),
                        Point::new(hi.x.max(corner.x), hi.y.max(corner.y)),
                    ),
                });
            }
        }
        bounds
    }

    /// One-line description: id, name, model count, simulated time.
    pub fn summary(&self) -> String {
        format!(
            "world {} \"{}\": {} models, t={:.1}s{}",
            self.id,
            self.config.name,
            self.registry.len(),
            self.clock.sim_time() as f64 / 1000.0,
            if self.paused { " (paused)" } else { "" }
        )
    }
}

impl fmt::Display for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        let mut stack: Vec<(ModelId, usize)> =
            self.registry.roots().iter().rev().map(|id| (*id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            let Some(model) = self.registry.lookup_by_id(id) else {
                continue;
            };
            let reading = model.device().describe();
            write!(
                f,
                "{:indent$}{} {} [{}] {}",
                "",
                model.id(),
                model.name(),
                model.kind(),
                model.pose,
                indent = depth * 2 + 2
            )?;
            if reading.is_empty() {
                writeln!(f)?;
            } else {
                writeln!(f, " {reading}")?;
            }
            stack.extend(model.children().iter().rev().map(|c| (*c, depth + 1)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Laser, Position};
    use crate::loader::WorldFile;
    use kl_core::{ConfigValue, CoreResult, Lifecycle, UpdateContext};
    use tempfile::TempDir;

    fn world() -> World {
        World::new(WorldConfig::default())
    }

    fn laser_scenario() -> (World, ModelId, ModelId) {
        let mut w = World::new(
            WorldConfig::default()
                .with_interval_sim(100)
                .with_interval_real(100),
        );
        let laser = w
            .create_model(
                None,
                ModelKind::Laser,
                Some("laser"),
                &ModelConfig::new()
                    .with("fov", 180.0)
                    .with("samples", 5_i64),
            )
            .unwrap();
        let target = w
            .create_model(
                None,
                ModelKind::Basic,
                Some("target"),
                &ModelConfig::new()
                    .with("pose_x", 2.0)
                    .with("size_x", 0.04)
                    .with("size_y", 0.04),
            )
            .unwrap();
        (w, laser, target)
    }

    #[test]
    fn laser_scenario_reports_hit_ahead() {
        let (mut w, laser, target) = laser_scenario();
        assert!(!w.step_at(Instant::now(), false));
        assert_eq!(w.sim_time(), 100);

        let scan = w.model(laser).unwrap().device_as::<Laser>().unwrap().readings();
        assert_eq!(scan.len(), 5);
        assert!((scan[2].range - 2.0).abs() < 0.05);
        assert_eq!(scan[2].hit, Some(target));
        for i in [0, 1, 3, 4] {
            assert_eq!(scan[i].range, 8.0);
            assert_eq!(scan[i].hit, None);
        }
    }

    #[test]
    fn later_models_see_moves_made_earlier_in_the_cycle() {
        let mut w = world();
        let robot = w
            .create_model(
                None,
                ModelKind::Position,
                Some("robot"),
                &ModelConfig::new().with("pose_x", 3.0).with("vx", -10.0),
            )
            .unwrap();
        let laser = w
            .create_model(
                None,
                ModelKind::Laser,
                Some("laser"),
                &ModelConfig::new().with("samples", 5_i64),
            )
            .unwrap();
        assert!(robot < laser);

        let t0 = Instant::now();
        w.step_at(t0, false);
        let before = w.model(laser).unwrap().device_as::<Laser>().unwrap().readings()[2];
        assert!((before.range - 2.78).abs() < 0.05);

        // The robot moves 1 m during this cycle and the laser, updated after
        // it, already sees the new footprint.
        w.step_at(t0 + Duration::from_millis(100), false);
        assert!((w.model(robot).unwrap().pose.x - 2.0).abs() < 1e-9);
        let after = w.model(laser).unwrap().device_as::<Laser>().unwrap().readings()[2];
        assert_eq!(after.hit, Some(robot));
        assert!((after.range - 1.78).abs() < 0.05);
    }

    #[test]
    fn steps_below_wall_interval_do_nothing() {
        let (mut w, laser, _) = laser_scenario();
        let t0 = Instant::now();
        w.step_at(t0, false);
        assert_eq!(w.sim_time(), 100);
        for ms in [0, 10, 50, 99] {
            w.step_at(t0 + Duration::from_millis(ms), false);
        }
        assert_eq!(w.sim_time(), 100);
        assert_eq!(w.clock().cycles(), 1);
        assert_eq!(w.model(laser).unwrap().last_update(), Some(0));

        w.step_at(t0 + Duration::from_millis(100), false);
        assert_eq!(w.sim_time(), 200);
        assert_eq!(w.model(laser).unwrap().last_update(), Some(100));
    }

    #[test]
    fn lifecycle_reaches_active_on_first_update() {
        let (mut w, laser, _) = laser_scenario();
        assert_eq!(w.model(laser).unwrap().lifecycle(), Lifecycle::Configured);
        w.step_at(Instant::now(), false);
        assert_eq!(w.model(laser).unwrap().lifecycle(), Lifecycle::Active);
    }

    #[derive(Debug, Default)]
    struct Scripted {
        polls: u32,
        answers: Vec<Poll>,
    }

    impl Visualizer for Scripted {
        fn poll(&mut self, _snapshot: &Snapshot<'_>) -> Poll {
            let answer = self.answers.get(self.polls as usize).copied().unwrap_or_default();
            self.polls += 1;
            answer
        }
    }

    #[test]
    fn paused_world_polls_but_does_not_advance() {
        let mut w = World::new(WorldConfig::default().with_paused(true));
        w.set_visualizer(Box::new(Scripted::default()));
        let t0 = Instant::now();
        for i in 0..3 {
            w.step_at(t0 + Duration::from_secs(i), false);
        }
        assert_eq!(w.sim_time(), 0);
        w.resume();
        w.step_at(t0 + Duration::from_secs(4), false);
        assert_eq!(w.sim_time(), 100);
    }

    #[test]
    fn visualizer_can_pause_and_quit() {
        let mut w = world();
        w.set_visualizer(Box::new(Scripted {
            polls: 0,
            answers: vec![Poll::TogglePause, Poll::Continue, Poll::Quit],
        }));
        let t0 = Instant::now();
        assert!(!w.step_at(t0, false));
        assert!(w.is_paused());
        assert_eq!(w.sim_time(), 0);
        assert!(!w.step_at(t0 + Duration::from_secs(1), false));
        assert!(w.step_at(t0 + Duration::from_secs(2), false));
        assert!(w.quit_requested());
        assert_eq!(w.sim_time(), 0);
    }

    #[test]
    fn quit_is_sticky() {
        let mut w = world();
        w.request_quit();
        assert!(w.step_at(Instant::now(), false));
        assert_eq!(w.clock().cycles(), 0);
    }

    #[test]
    fn auto_names_are_scoped_per_type() {
        let mut w = world();
        let cfg = ModelConfig::new();
        let robot = w
            .create_model(None, ModelKind::Position, Some("robot"), &cfg)
            .unwrap();
        let l0 = w.create_model(Some(robot), ModelKind::Laser, None, &cfg).unwrap();
        let l1 = w.create_model(Some(robot), ModelKind::Laser, None, &cfg).unwrap();
        let s0 = w.create_model(Some(robot), ModelKind::Sonar, None, &cfg).unwrap();
        let b0 = w.create_model(None, ModelKind::Basic, Some("wall"), &cfg).unwrap();
        let b1 = w.create_model(None, ModelKind::Basic, None, &cfg).unwrap();

        assert_eq!(w.model(l0).unwrap().name(), "robot.laser:0");
        assert_eq!(w.model(l1).unwrap().name(), "robot.laser:1");
        assert_eq!(w.model(s0).unwrap().name(), "robot.sonar:0");
        assert_eq!(w.model(b0).unwrap().name(), "wall");
        assert_eq!(w.model(b1).unwrap().name(), "basic:1");
    }

    #[test]
    fn auto_names_skip_explicitly_taken_names() {
        let mut w = world();
        let cfg = ModelConfig::new();
        w.create_model(None, ModelKind::Basic, Some("basic:1"), &cfg).unwrap();
        w.create_model(None, ModelKind::Sonar, None, &cfg).unwrap();
        let next = w.create_model(None, ModelKind::Basic, None, &cfg).unwrap();
        assert_eq!(w.model(next).unwrap().name(), "basic:2");

        let robot = w
            .create_model(None, ModelKind::Position, Some("robot"), &cfg)
            .unwrap();
        w.create_model(Some(robot), ModelKind::Laser, Some("robot.laser:1"), &cfg)
            .unwrap();
        let child = w.create_model(Some(robot), ModelKind::Laser, None, &cfg).unwrap();
        assert_eq!(w.model(child).unwrap().name(), "robot.laser:2");
    }

    #[test]
    fn sibling_name_collision_is_rejected() {
        let mut w = world();
        let cfg = ModelConfig::new();
        w.create_model(None, ModelKind::Basic, Some("box"), &cfg).unwrap();
        let err = w
            .create_model(None, ModelKind::Basic, Some("box"), &cfg)
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::Core(CoreError::DuplicateName { .. })
        ));
        assert_eq!(w.registry().len(), 1);
    }

    #[test]
    fn malformed_config_creates_nothing() {
        let mut w = world();
        let err = w
            .create_model(
                None,
                ModelKind::Basic,
                Some("box"),
                &ModelConfig::new().with("pose_x", "left"),
            )
            .unwrap_err();
        assert!(matches!(err, SimError::Core(CoreError::MalformedValue { .. })));
        assert!(w.registry().is_empty());
        assert!(w.lookup_by_name("box").is_none());
        assert_eq!(w.matrix().occupied_cells(kl_core::Resolution::Fine), 0);
    }

    #[derive(Debug)]
    struct Faulty;

    impl Device for Faulty {
        fn kind(&self) -> ModelKind {
            ModelKind::Basic
        }
        fn update(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
            Err(CoreError::MissingReference {
                model: ctx.model.to_string(),
                reference: "anything".into(),
            })
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    #[test]
    fn failing_model_does_not_abort_the_cycle() {
        let mut w = world();
        let cfg = ModelConfig::new().with("obstacle_return", 0_i64);
        let faulty = w.add_device(None, Box::new(Faulty), Some("faulty"), &cfg).unwrap();
        let laser = w
            .create_model(None, ModelKind::Laser, Some("laser"), &ModelConfig::new())
            .unwrap();
        w.step_at(Instant::now(), false);
        assert_eq!(w.sim_time(), 100);
        assert_eq!(w.model(laser).unwrap().last_update(), Some(0));
        let failures = w.events().events_for_model(faulty);
        assert!(
            failures
                .iter()
                .any(|e| matches!(e.kind, SimEventKind::UpdateFailed { .. }))
        );
    }

    #[test]
    fn runtime_velocity_command_moves_robot() {
        let mut w = World::new(WorldConfig::default().with_interval_real(0));
        let robot = w
            .create_model(None, ModelKind::Position, Some("robot"), &ModelConfig::new())
            .unwrap();
        w.device_mut::<Position>(robot).unwrap().set_velocity(1.0, 0.0, 0.0);
        assert_eq!(w.run_cycles(11), 11);
        let x = w.model(robot).unwrap().pose.x;
        assert!((x - 1.0).abs() < 1e-9, "x = {x}");
    }

    #[test]
    fn destroy_model_clears_subtree_and_records_events() {
        let mut w = world();
        let cfg = ModelConfig::new();
        let robot = w
            .create_model(None, ModelKind::Position, Some("robot"), &cfg)
            .unwrap();
        let laser = w.create_model(Some(robot), ModelKind::Laser, None, &cfg).unwrap();
        let removed = w.destroy_model(robot).unwrap();
        assert_eq!(removed, vec![robot, laser]);
        assert!(w.model(laser).is_none());
        assert!(w.dimensions().is_none());
        assert_eq!(
            w.events()
                .count(|k| matches!(k, SimEventKind::ModelDestroyed { .. })),
            2
        );
        assert!(matches!(
            w.destroy_model(robot),
            Err(SimError::Core(CoreError::ModelNotFound(_)))
        ));
    }

    #[test]
    fn dimensions_cover_footprints() {
        let mut w = world();
        w.create_model(
            None,
            ModelKind::Basic,
            Some("a"),
            &ModelConfig::new().with("pose_x", -2.0),
        )
        .unwrap();
        w.create_model(
            None,
            ModelKind::Basic,
            Some("b"),
            &ModelConfig::new().with("pose_x", 3.0).with("pose_y", 1.0),
        )
        .unwrap();
        let (lo, hi) = w.dimensions().unwrap();
        assert!((lo.x + 2.5).abs() < 1e-9);
        assert!((lo.y + 0.5).abs() < 1e-9);
        assert!((hi.x - 3.5).abs() < 1e-9);
        assert!((hi.y - 1.5).abs() < 1e-9);
    }

    #[test]
    fn set_pose_refreshes_occupancy() {
        let mut w = world();
        let id = w
            .create_model(None, ModelKind::Basic, Some("box"), &ModelConfig::new())
            .unwrap();
        w.set_pose(id, Pose::new(10.0, 0.0, 0.0)).unwrap();
        assert!(!w.matrix().is_occupied(Point::new(0.5, 0.0)));
        assert!(w.matrix().is_occupied(Point::new(10.5, 0.0)));
    }

    fn description() -> WorldFile {
        WorldFile::from_json(
            r#"{ "world": { "name": "lab", "interval_real": 0 },
                 "sections": [
                   { "type": "position", "config": { "name": "robot", "pose_x": 1.0 } },
                   { "type": "laser", "parent": 0, "config": { "samples": 3 } },
                   { "type": "teleporter", "config": { "name": "bad" } },
                   { "type": "basic", "parent": 2 },
                   { "type": "basic", "config": { "name": "wall", "pose_x": "far" } },
                   { "type": "window", "config": { "scale": 20.0 } },
                   { "type": "beacon-detector", "parent": 1 },
                   { "type": "basic", "parent": 9 }
                 ] }"#,
        )
        .unwrap()
    }

    #[test]
    fn loader_skips_bad_sections_and_continues() {
        let w = World::from_source(Box::new(description())).unwrap();
        assert_eq!(w.name(), "lab");
        assert_eq!(w.registry().len(), 3);
        assert!(w.lookup_by_name("robot.laser:0").is_some());
        assert!(w.lookup_by_name("robot.laser:0.beacon-detector:0").is_some());

        let rejected: Vec<usize> = w.rejected_sections().iter().map(|r| r.index).collect();
        assert_eq!(rejected, vec![2, 3, 4, 7]);
        assert!(matches!(
            w.rejected_sections()[0].error,
            SimError::Core(CoreError::UnknownModelType(_))
        ));
        assert!(matches!(
            w.rejected_sections()[1].error,
            SimError::ParentSkipped { parent: 2, .. }
        ));
        assert!(matches!(
            w.rejected_sections()[3].error,
            SimError::BadParent { parent: 9, .. }
        ));
        assert_eq!(
            w.events()
                .count(|k| matches!(k, SimEventKind::ConfigRejected { .. })),
            4
        );
    }

    #[test]
    fn malformed_world_section_fails_the_load() {
        let file = WorldFile::from_json(r#"{ "world": { "resolution": -1 } }"#).unwrap();
        assert!(World::from_source(Box::new(file)).is_err());
    }

    #[test]
    fn save_round_trips_through_the_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lab.json");
        description().write(&path).unwrap();

        let mut w = World::from_source(Box::new(WorldFile::load(&path).unwrap())).unwrap();
        let robot = w.lookup_by_name("robot").unwrap().id();
        w.set_pose(robot, Pose::new(2.5, -1.0, 0.0)).unwrap();
        w.save().unwrap();

        let saved = WorldFile::load(&path).unwrap();
        assert_eq!(saved.sections[0].config.read_float("pose_x", 0.0).unwrap(), 2.5);
        assert_eq!(saved.sections[1].config.read_count("samples", 0).unwrap(), 3);
        assert_eq!(saved.sections[5].config.read_float("scale", 0.0).unwrap(), 20.0);
        assert_eq!(saved.sections[2].config.read_string("name", ""), "bad");

        let reloaded = World::from_source(Box::new(saved)).unwrap();
        assert_eq!(reloaded.registry().len(), w.registry().len());
        for model in w.registry().iter() {
            let twin = reloaded.lookup_by_name(model.name()).unwrap().save();
            for (key, value) in model.save().iter() {
                match (value, twin.get(key)) {
                    (ConfigValue::Float(a), Some(ConfigValue::Float(b))) => {
                        assert!((a - b).abs() < 1e-9, "{key}: {a} vs {b}");
                    }
                    (value, other) => assert_eq!(Some(value), other, "{key}"),
                }
            }
        }
    }

    #[test]
    fn example_world_loads_cleanly_and_runs() {
        let mut w = World::from_source(Box::new(WorldFile::example())).unwrap();
        assert!(w.rejected_sections().is_empty());
        w.set_wall_interval(Duration::ZERO);
        assert_eq!(w.run_cycles(3), 3);
        assert_eq!(w.sim_time(), 300);
        let text = w.to_string();
        assert!(text.contains("robot"));
        assert!(text.contains("robot.laser:0"));
    }

    #[test]
    fn destroy_releases_everything() {
        let w = World::from_source(Box::new(WorldFile::example())).unwrap();
        let count = w.registry().len();
        assert_eq!(w.destroy(), count);
    }

    #[test]
    fn summary_mentions_name_and_time() {
        let mut w = World::new(WorldConfig::default().with_name("arena"));
        w.pause();
        let s = w.summary();
        assert!(s.contains("\"arena\""));
        assert!(s.contains("0 models"));
        assert!(s.contains("paused"));
        w.toggle_pause();
        assert!(!w.is_paused());
        w.request_destroy();
        assert!(w.destroy_requested());
    }
}
