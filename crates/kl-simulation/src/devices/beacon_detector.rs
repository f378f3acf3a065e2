use kl_core::{CoreResult, Device, ModelConfig, ModelId, ModelKind, UpdateContext};

use super::laser::Laser;

/// A beacon seen in a laser scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeaconDetection {
    /// The model that was struck.
    pub model: ModelId,
    /// Beacon id, present only when close enough to be identified.
    pub id: Option<u32>,
    /// Range of the nearest beam that struck the model.
    pub range: f64,
    /// Bearing of that beam relative to the laser.
    pub bearing: f64,
}

/// Classifies the hits of a referenced laser as anonymous or identified beacons.
///
/// The detector never raytraces. The laser is looked up by name every cycle;
/// when it cannot be found the previous detections are kept.
#[derive(Debug, Clone)]
pub struct BeaconDetector {
    /// Name of the laser to sample. `None` means the parent model.
    pub laser: Option<String>,
    /// Range within which any hit is reported.
    pub range_anon: f64,
    /// Range within which a beacon's id is also reported.
    pub range_id: f64,
    detections: Vec<BeaconDetection>,
    warned: bool,
}

impl Default for BeaconDetector {
    fn default() -> Self {
        Self {
            laser: None,
            range_anon: 4.0,
            range_id: 1.5,
            detections: Vec::new(),
            warned: false,
        }
    }
}

impl BeaconDetector {
    /// Beacons reported by the latest successful update.
    pub fn detections(&self) -> &[BeaconDetection] {
        &self.detections
    }

    fn reference_name(&self) -> String {
        self.laser
            .clone()
            .unwrap_or_else(|| "parent laser".to_string())
    }

    fn resolve_laser(&self, ctx: &UpdateContext<'_>) -> Option<ModelId> {
        let this = ctx.this().ok()?;
        let parent = this.parent();
        let candidate = match &self.laser {
            None => parent?,
            Some(name) => {
                let mut nearby = parent.into_iter().collect::<Vec<_>>();
                if let Some(p) = parent.and_then(|p| ctx.registry.lookup_by_id(p)) {
                    nearby.extend_from_slice(p.children());
                }
                nearby
                    .into_iter()
                    .filter_map(|id| ctx.registry.lookup_by_id(id))
                    .find(|m| m.name() == name)
                    .map(|m| m.id())
                    .or_else(|| ctx.registry.find_id_by_name(name))?
            }
        };
        let model = ctx.registry.lookup_by_id(candidate)?;
        model.device_as::<Laser>().map(|_| candidate)
    }
}

impl Device for BeaconDetector {
    fn kind(&self) -> ModelKind {
        ModelKind::BeaconDetector
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        let Some(laser_id) = self.resolve_laser(ctx) else {
            if !self.warned {
                self.warned = true;
                ctx.report_missing_reference(&self.reference_name());
            }
            return Ok(());
        };
        let Some(laser) = ctx
            .registry
            .lookup_by_id(laser_id)
            .and_then(|m| m.device_as::<Laser>())
        else {
            return Ok(());
        };

        let mut detections: Vec<BeaconDetection> = Vec::new();
        for sample in laser.readings() {
            let Some(owner) = sample.hit else { continue };
            if sample.range > self.range_anon {
                continue;
            }
            match detections.iter_mut().find(|d| d.model == owner) {
                Some(existing) if existing.range <= sample.range => {}
                Some(existing) => {
                    existing.range = sample.range;
                    existing.bearing = sample.bearing;
                }
                None => detections.push(BeaconDetection {
                    model: owner,
                    id: None,
                    range: sample.range,
                    bearing: sample.bearing,
                }),
            }
        }
        for detection in &mut detections {
            if detection.range <= self.range_id {
                detection.id = ctx
                    .registry
                    .lookup_by_id(detection.model)
                    .and_then(|m| m.fiducial_return);
            }
        }
        self.detections = detections;
        Ok(())
    }

    fn load(&mut self, config: &ModelConfig) -> CoreResult<()> {
        let range_anon = config.read_float("range_anon", self.range_anon)?;
        let range_id = config.read_float("range_id", self.range_id)?;
        if range_id > range_anon {
            tracing::warn!(
                range_id,
                range_anon,
                "beacon detector identifies beyond its anonymous range"
            );
        }
        if config.contains("laser") {
            self.laser = Some(config.read_string("laser", ""));
        }
        self.range_anon = range_anon;
        self.range_id = range_id;
        Ok(())
    }

    fn save(&self, config: &mut ModelConfig) {
        if let Some(laser) = &self.laser {
            config.set("laser", laser.as_str());
        }
        config.set("range_anon", self.range_anon);
        config.set("range_id", self.range_id);
    }

    fn describe(&self) -> String {
        let identified: Vec<String> = self
            .detections
            .iter()
            .filter_map(|d| d.id.map(|id| format!("#{id}")))
            .collect();
        if identified.is_empty() {
            format!("{} beacons", self.detections.len())
        } else {
            format!(
                "{} beacons, identified {}",
                self.detections.len(),
                identified.join(" ")
            )
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
