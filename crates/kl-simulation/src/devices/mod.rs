//! Concrete [`Device`] implementations, one per [`ModelKind`].

use kl_core::{Device, ModelKind};

/// A body or fixture with no derived state.
pub mod basic;
/// Beacon classification of a laser's hits.
pub mod beacon_detector;
/// Coloured-model detection projected onto an image.
pub mod blob_finder;
/// Beacon detection by geometry and line of sight.
pub mod fiducial;
/// Scanning laser range-finder.
pub mod laser;
/// Mobile base with velocity control and odometry.
pub mod position;
/// Ring of sonar transducers.
pub mod sonar;

pub use basic::Basic;
pub use beacon_detector::{BeaconDetection, BeaconDetector};
pub use blob_finder::{Blob, BlobFinder};
pub use fiducial::{FiducialDetection, FiducialFinder};
pub use laser::{Laser, LaserSample};
pub use position::Position;
pub use sonar::Sonar;

/// Build a device with default parameters for a model kind.
pub fn for_kind(kind: ModelKind) -> Box<dyn Device> {
    match kind {
        ModelKind::Basic => Box::new(Basic),
        ModelKind::Laser => Box::new(Laser::default()),
        ModelKind::Sonar => Box::new(Sonar::default()),
        ModelKind::Position => Box::new(Position::default()),
        ModelKind::BeaconDetector => Box::new(BeaconDetector::default()),
        ModelKind::Fiducial => Box::new(FiducialFinder::default()),
        ModelKind::BlobFinder => Box::new(BlobFinder::default()),
    }
}

/// Ray bearings spread evenly across `fov`, centred on zero.
pub(crate) fn spread(fov: f64, count: usize, i: usize) -> f64 {
    if count <= 1 {
        0.0
    } else {
        -fov / 2.0 + i as f64 * fov / (count - 1) as f64
    }
}

#[cfg(test)]
pub(crate) mod bench {
    use kl_core::{
        CoreResult, EventLog, ModelConfig, ModelId, ModelKind, ModelRegistry, SpatialIndex,
    };
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// A registry and grid wired together for exercising single devices.
    pub struct Bench {
        pub registry: ModelRegistry,
        pub matrix: SpatialIndex,
        pub rng: StdRng,
        pub events: EventLog,
    }

    impl Bench {
        pub fn new() -> Self {
            Self {
                registry: ModelRegistry::new(),
                matrix: SpatialIndex::default(),
                rng: StdRng::seed_from_u64(7),
                events: EventLog::new(0),
            }
        }

        pub fn add(
            &mut self,
            parent: Option<ModelId>,
            name: &str,
            kind: ModelKind,
            config: ModelConfig,
        ) -> ModelId {
            let id = self
                .registry
                .create(parent, name, super::for_kind(kind))
                .unwrap();
            self.registry.get_mut(id).unwrap().load(&config).unwrap();
            self.registry.refresh_occupancy(id, &mut self.matrix);
            id
        }

        pub fn update(&mut self, id: ModelId, time: u64) -> CoreResult<()> {
            self.registry.update_model(
                id,
                time,
                &mut self.matrix,
                &mut self.rng,
                &mut self.events,
            )
        }

        pub fn device<T: kl_core::Device + 'static>(&self, id: ModelId) -> &T {
            self.registry
                .lookup_by_id(id)
                .unwrap()
                .device_as::<T>()
                .unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_matching_device() {
        for kind in ModelKind::ALL {
            assert_eq!(for_kind(kind).kind(), kind);
        }
    }

    #[test]
    fn spread_covers_field_of_view() {
        let fov = std::f64::consts::PI;
        assert!((spread(fov, 5, 0) + fov / 2.0).abs() < 1e-12);
        assert!(spread(fov, 5, 2).abs() < 1e-12);
        assert!((spread(fov, 5, 4) - fov / 2.0).abs() < 1e-12);
        assert_eq!(spread(fov, 1, 0), 0.0);
    }
}
