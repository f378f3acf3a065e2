use kl_core::{CoreResult, Device, ModelConfig, ModelId, ModelKind, UpdateContext};

/// A coloured model as it appears in the blob finder's image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    /// Index of the matching colour channel.
    pub channel: usize,
    /// The model producing the blob.
    pub model: ModelId,
    /// Distance to the model's centre in metres.
    pub range: f64,
    /// Bearing of the model relative to the finder's heading.
    pub bearing: f64,
    /// Leftmost pixel column.
    pub left: u32,
    /// Rightmost pixel column.
    pub right: u32,
    /// Topmost pixel row.
    pub top: u32,
    /// Bottom pixel row.
    pub bottom: u32,
}

impl Blob {
    /// Pixel area of the blob's bounding box.
    pub fn area(&self) -> u32 {
        (self.right - self.left + 1) * (self.bottom - self.top + 1)
    }
}

/// Projects visible models whose colour matches a channel onto a small image.
#[derive(Debug, Clone)]
pub struct BlobFinder {
    /// Colours tracked, one per channel.
    pub channels: Vec<String>,
    /// Maximum detection range in metres.
    pub range_max: f64,
    /// Horizontal field of view in radians.
    pub fov: f64,
    /// Image width in pixels.
    pub image_w: u32,
    /// Image height in pixels.
    pub image_h: u32,
    blobs: Vec<Blob>,
}

impl Default for BlobFinder {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            range_max: 8.0,
            fov: 60f64.to_radians(),
            image_w: 80,
            image_h: 60,
            blobs: Vec::new(),
        }
    }
}

impl BlobFinder {
    /// Blobs from the latest update, ordered by channel then range.
    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    fn column(&self, angle: f64) -> u32 {
        let w = f64::from(self.image_w);
        let x = w / 2.0 - angle / self.fov * w;
        x.clamp(0.0, w - 1.0) as u32
    }

    fn row(&self, angle: f64) -> u32 {
        let h = f64::from(self.image_h);
        let vfov = self.fov * h / f64::from(self.image_w);
        let y = h / 2.0 - angle / vfov * h;
        y.clamp(0.0, h - 1.0) as u32
    }
}

impl Device for BlobFinder {
    fn kind(&self) -> ModelKind {
        ModelKind::BlobFinder
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        if self.channels.is_empty() || self.image_w == 0 || self.image_h == 0 {
            self.blobs.clear();
            return Ok(());
        }
        let pose = ctx.global_pose()?;
        let root = ctx.registry.root_of(ctx.model);
        let mut blobs = Vec::new();
        for model in ctx.registry.iter() {
            let Some(color) = model.color.as_deref() else {
                continue;
            };
            let Some(channel) = self.channels.iter().position(|c| c == color) else {
                continue;
            };
            if ctx.registry.root_of(model.id()) == root {
                continue;
            }
            let Some(target) = ctx.registry.global_pose(model.id()) else {
                continue;
            };
            let range = pose.point().distance_to(target.point());
            if range > self.range_max || range <= 0.0 {
                continue;
            }
            let bearing = pose.bearing_to(target.point());
            let half_width = model.size.radius().atan2(range);
            if bearing.abs() - half_width > self.fov / 2.0 {
                continue;
            }
            if !ctx.line_of_sight(pose.point(), model.id()) {
                continue;
            }
            blobs.push(Blob {
                channel,
                model: model.id(),
                range,
                bearing,
                left: self.column(bearing + half_width),
                right: self.column(bearing - half_width),
                top: self.row(half_width),
                bottom: self.row(-half_width),
            });
        }
        blobs.sort_by(|a, b| a.channel.cmp(&b.channel).then(a.range.total_cmp(&b.range)));
        self.blobs = blobs;
        Ok(())
    }

    fn load(&mut self, config: &ModelConfig) -> CoreResult<()> {
        let count = config.read_count("channels", self.channels.len())?;
        let channels = (0..count)
            .map(|i| {
                let current = self.channels.get(i).map(String::as_str).unwrap_or("");
                config.read_string(&format!("channel[{i}]"), current)
            })
            .collect();
        let image_w = config.read_count("image_w", self.image_w as usize)?;
        let image_h = config.read_count("image_h", self.image_h as usize)?;
        let range_max = config.read_float("range_max", self.range_max)?;
        let fov = config.read_angle("fov", self.fov)?;
        self.range_max = range_max;
        self.fov = fov;
        self.image_w = u32::try_from(image_w).unwrap_or(u32::MAX);
        self.image_h = u32::try_from(image_h).unwrap_or(u32::MAX);
        self.channels = channels;
        Ok(())
    }

    fn save(&self, config: &mut ModelConfig) {
        config.set("channels", self.channels.len());
        for (i, colour) in self.channels.iter().enumerate() {
            config.set(format!("channel[{i}]"), colour.as_str());
        }
        config.set("range_max", self.range_max);
        config.set("fov", self.fov.to_degrees());
        config.set("image_w", self.image_w);
        config.set("image_h", self.image_h);
    }

    fn describe(&self) -> String {
        if self.blobs.is_empty() {
            return "no blobs".to_string();
        }
        self.blobs
            .iter()
            .map(|b| format!("{}@{:.1}m", self.channels[b.channel], b.range))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
