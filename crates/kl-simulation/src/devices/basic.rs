use kl_core::{CoreResult, Device, ModelKind, UpdateContext};

/// Device of a plain body: walls, boxes, beacons.
#[derive(Debug, Clone, Copy, Default)]
pub struct Basic;

impl Device for Basic {
    fn kind(&self) -> ModelKind {
        ModelKind::Basic
    }

    fn update(&mut self, _ctx: &mut UpdateContext<'_>) -> CoreResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
