use kl_core::{CoreResult, Device, ModelConfig, ModelKind, Pose, SimEventKind, UpdateContext};
use rand::Rng;
use rand::rngs::StdRng;

/// A mobile base. Integrates a commanded velocity over simulated time and
/// keeps an odometry estimate of the distance travelled.
#[derive(Debug, Clone, Default)]
pub struct Position {
    /// Commanded velocity: `x`, `y` in m/s in the body frame, `a` in rad/s.
    pub velocity: Pose,
    /// Fractional odometry noise per axis.
    pub odom_error: Pose,
    odometry: Pose,
    stall: bool,
    last_time: Option<u64>,
}

impl Position {
    /// Command a new velocity (m/s, m/s, rad/s).
    pub fn set_velocity(&mut self, vx: f64, vy: f64, va: f64) {
        self.velocity = Pose::new(vx, vy, va);
    }

    /// Stop moving.
    pub fn stop(&mut self) {
        self.velocity = Pose::default();
    }

    /// Dead-reckoned pose relative to where the base started.
    pub fn odometry(&self) -> Pose {
        self.odometry
    }

    /// Return `true` if the last attempted move was blocked.
    pub fn is_stalled(&self) -> bool {
        self.stall
    }

    fn noisy(&self, delta: Pose, rng: &mut StdRng) -> Pose {
        let mut jitter = |value: f64, error: f64| {
            if error > 0.0 {
                value * (1.0 + error * rng.random_range(-1.0..=1.0))
            } else {
                value
            }
        };
        Pose::new(
            jitter(delta.x, self.odom_error.x),
            jitter(delta.y, self.odom_error.y),
            jitter(delta.a, self.odom_error.a),
        )
    }
}

impl Device for Position {
    fn kind(&self) -> ModelKind {
        ModelKind::Position
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        let dt = self
            .last_time
            .map_or(0, |last| ctx.time.saturating_sub(last)) as f64
            / 1000.0;
        self.last_time = Some(ctx.time);
        if dt == 0.0 || self.velocity == Pose::default() {
            return Ok(());
        }

        let delta = Pose::new(
            self.velocity.x * dt,
            self.velocity.y * dt,
            self.velocity.a * dt,
        );
        let target = ctx.this()?.pose.compose(&delta);
        if ctx.move_to(target)? {
            self.stall = false;
            let measured = self.noisy(delta, &mut *ctx.rng);
            self.odometry = self.odometry.compose(&measured);
        } else {
            if !self.stall {
                let this = ctx.this()?;
                let description = format!("{} stalled at {}", this.name(), this.pose);
                tracing::debug!(model = %ctx.model, "{description}");
                ctx.emit(SimEventKind::Stalled { model: ctx.model }, description);
            }
            self.stall = true;
        }
        Ok(())
    }

    fn load(&mut self, config: &ModelConfig) -> CoreResult<()> {
        let velocity = Pose::new(
            config.read_float("vx", self.velocity.x)?,
            config.read_float("vy", self.velocity.y)?,
            config.read_angle("va", self.velocity.a)?,
        );
        let odom_error = Pose::new(
            config.read_float("odom_error_x", self.odom_error.x)?,
            config.read_float("odom_error_y", self.odom_error.y)?,
            config.read_float("odom_error_a", self.odom_error.a)?,
        );
        self.velocity = velocity;
        self.odom_error = odom_error;
        Ok(())
    }

    fn save(&self, config: &mut ModelConfig) {
        config.set("vx", self.velocity.x);
        config.set("vy", self.velocity.y);
        config.set("va", self.velocity.a.to_degrees());
        config.set("odom_error_x", self.odom_error.x);
        config.set("odom_error_y", self.odom_error.y);
        config.set("odom_error_a", self.odom_error.a);
    }

    fn describe(&self) -> String {
        let state = if self.stall { "stalled" } else { "ok" };
        format!("odom {} ({state})", self.odometry)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
