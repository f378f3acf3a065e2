//! Multi-resolution occupancy grid used for collision checks and raytracing.
//!
//! Three superimposed sparse grids are kept at fine, medium, and coarse
//! resolution. Every fine cell written by [`SpatialIndex::set_occupied`] also
//! marks every medium and coarse cell that overlaps it, so an empty coarse
//! cell guarantees that no fine cell inside it is occupied. Raytracing uses
//! that guarantee to skip empty space in large strides and only reports a
//! hit once a fine cell has been found occupied.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Pose, Size, rect_corners};
use crate::id::ModelId;

/// Nudge past a cell boundary so the next sample lands in the neighbouring cell.
const BOUNDARY_EPSILON: f64 = 1e-7;

/// Grid resolutions and world bounds for a [`SpatialIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixConfig {
    /// Pixels per metre of the fine (authoritative) grid.
    pub ppm_high: f64,
    /// Pixels per metre of the medium grid.
    pub ppm_med: f64,
    /// Pixels per metre of the coarse grid.
    pub ppm_low: f64,
    /// Lower-left corner of the world bounds.
    pub min: Point,
    /// Upper-right corner of the world bounds.
    pub max: Point,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            ppm_high: 50.0,
            ppm_med: 5.0,
            ppm_low: 1.0,
            min: Point::new(-50.0, -50.0),
            max: Point::new(50.0, 50.0),
        }
    }
}

impl MatrixConfig {
    /// Bounds of `width` x `height` metres centred on the origin.
    pub fn with_extent(mut self, width: f64, height: f64) -> Self {
        self.min = Point::new(-width / 2.0, -height / 2.0);
        self.max = Point::new(width / 2.0, height / 2.0);
        self
    }

    /// Set the three resolutions from cell sizes in metres.
    pub fn with_resolutions(mut self, fine: f64, medium: f64, coarse: f64) -> Self {
        self.ppm_high = 1.0 / fine;
        self.ppm_med = 1.0 / medium;
        self.ppm_low = 1.0 / coarse;
        self
    }

    fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// A shape that can be written to or cleared from the index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Region {
    /// A single point.
    Point(Point),
    /// A straight segment between two points.
    Line(Point, Point),
    /// The outline of an oriented rectangle centred on `pose`.
    Rect {
        /// Centre and orientation of the rectangle.
        pose: Pose,
        /// Extents of the rectangle.
        size: Size,
    },
}

/// One of the three grid levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The authoritative grid.
    Fine,
    /// The intermediate grid.
    Medium,
    /// The coarsest grid.
    Coarse,
}

/// The first occupied fine cell found along a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Distance from the ray origin to the entry point of the hit cell.
    pub range: f64,
    /// Entry point of the ray into the hit cell.
    pub point: Point,
    /// The model occupying the hit cell.
    pub owner: ModelId,
}

type Cell = (i64, i64);

/// One grid level. `counts` holds, per cell and owner, how many writes
/// (fine level) or occupied fine cells beneath (medium and coarse levels)
/// keep the owner in that cell.
#[derive(Debug, Clone)]
struct Layer {
    ppm: f64,
    cells: HashMap<Cell, Vec<ModelId>>,
    counts: HashMap<(Cell, ModelId), u32>,
}

impl Layer {
    fn new(ppm: f64) -> Self {
        Self {
            ppm,
            cells: HashMap::new(),
            counts: HashMap::new(),
        }
    }

    fn cell_of(&self, p: Point) -> Cell {
        ((p.x * self.ppm).floor() as i64, (p.y * self.ppm).floor() as i64)
    }

    /// Returns `true` if `owner` was not in `cell` before.
    fn insert(&mut self, cell: Cell, owner: ModelId) -> bool {
        let count = self.counts.entry((cell, owner)).or_insert(0);
        *count += 1;
        if *count > 1 {
            return false;
        }
        self.cells.entry(cell).or_default().push(owner);
        true
    }

    /// Returns `true` if `owner` no longer holds `cell`.
    fn remove(&mut self, cell: Cell, owner: ModelId) -> bool {
        let Some(count) = self.counts.get_mut(&(cell, owner)) else {
            return false;
        };
        *count -= 1;
        if *count > 0 {
            return false;
        }
        self.counts.remove(&(cell, owner));
        if let Some(owners) = self.cells.get_mut(&cell) {
            owners.retain(|o| *o != owner);
            if owners.is_empty() {
                self.cells.remove(&cell);
            }
        }
        true
    }

    fn clear(&mut self) {
        self.cells.clear();
        self.counts.clear();
    }

    fn owners(&self, cell: Cell) -> &[ModelId] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Cells of this layer overlapping the square fine cell `fine` of size `1/fine_ppm`.
    fn covering(&self, fine: Cell, fine_ppm: f64) -> impl Iterator<Item = Cell> + use<> {
        let scale = self.ppm / fine_ppm;
        let x0 = (fine.0 as f64 * scale).floor() as i64;
        let x1 = ((fine.0 + 1) as f64 * scale).floor() as i64;
        let y0 = (fine.1 as f64 * scale).floor() as i64;
        let y1 = ((fine.1 + 1) as f64 * scale).floor() as i64;
        (x0..=x1).flat_map(move |x| (y0..=y1).map(move |y| (x, y)))
    }

    /// Distance along the ray from `p` to where it leaves `cell`.
    fn exit_distance(&self, cell: Cell, p: Point, dx: f64, dy: f64) -> f64 {
        let axis = |index: i64, pos: f64, d: f64| {
            if d > 1e-12 {
                ((index + 1) as f64 / self.ppm - pos) / d
            } else if d < -1e-12 {
                (index as f64 / self.ppm - pos) / d
            } else {
                f64::INFINITY
            }
        };
        axis(cell.0, p.x, dx).min(axis(cell.1, p.y, dy)).max(0.0)
    }
}

/// The shared spatial occupancy structure of a world.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    config: MatrixConfig,
    fine: Layer,
    medium: Layer,
    coarse: Layer,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(MatrixConfig::default())
    }
}

impl SpatialIndex {
    /// Create an empty index.
    pub fn new(config: MatrixConfig) -> Self {
        Self {
            fine: Layer::new(config.ppm_high),
            medium: Layer::new(config.ppm_med),
            coarse: Layer::new(config.ppm_low),
            config,
        }
    }

    /// The resolutions and bounds this index was built with.
    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    /// Size of a fine cell in metres.
    pub fn fine_resolution(&self) -> f64 {
        1.0 / self.config.ppm_high
    }

    /// Mark the cells covered by `region` as occupied by `owner` at all levels.
    /// Parts of the region outside the world bounds are ignored.
    pub fn set_occupied(&mut self, region: &Region, owner: ModelId) {
        let fine_ppm = self.config.ppm_high;
        for cell in self.rasterize(region) {
            if !self.fine.insert(cell, owner) {
                continue;
            }
            for c in self.medium.covering(cell, fine_ppm) {
                self.medium.insert(c, owner);
            }
            for c in self.coarse.covering(cell, fine_ppm) {
                self.coarse.insert(c, owner);
            }
        }
    }

    /// Undo one [`SpatialIndex::set_occupied`] of `region` by `owner`.
    ///
    /// A medium or coarse cell keeps the owner while any fine cell beneath
    /// it is still held, including cells written by other regions.
    pub fn clear_occupied(&mut self, region: &Region, owner: ModelId) {
        let fine_ppm = self.config.ppm_high;
        for cell in self.rasterize(region) {
            if !self.fine.remove(cell, owner) {
                continue;
            }
            for c in self.medium.covering(cell, fine_ppm) {
                self.medium.remove(c, owner);
            }
            for c in self.coarse.covering(cell, fine_ppm) {
                self.coarse.remove(c, owner);
            }
        }
    }

    /// Drop every occupancy record.
    pub fn clear(&mut self) {
        self.fine.clear();
        self.medium.clear();
        self.coarse.clear();
    }

    /// Models occupying the fine cell containing `p`.
    pub fn owners_at(&self, p: Point) -> &[ModelId] {
        if !self.config.contains(p) {
            return &[];
        }
        self.fine.owners(self.fine.cell_of(p))
    }

    /// Return `true` if the fine cell containing `p` is occupied.
    pub fn is_occupied(&self, p: Point) -> bool {
        !self.owners_at(p).is_empty()
    }

    /// Distinct models occupying any fine cell covered by `region`.
    pub fn region_owners(&self, region: &Region) -> Vec<ModelId> {
        let mut owners = Vec::new();
        for cell in self.rasterize(region) {
            for o in self.fine.owners(cell) {
                if !owners.contains(o) {
                    owners.push(*o);
                }
            }
        }
        owners
    }

    /// Number of occupied cells at a level.
    pub fn occupied_cells(&self, level: Resolution) -> usize {
        self.layer(level).cells.len()
    }

    /// Return `true` if `owner` occupies any cell at the given level.
    pub fn contains_owner(&self, level: Resolution, owner: ModelId) -> bool {
        self.layer(level)
            .cells
            .values()
            .any(|owners| owners.contains(&owner))
    }

    /// Cast a ray and return the first occupied fine cell within `max_range`.
    pub fn raytrace(&self, origin: Point, heading: f64, max_range: f64) -> Option<RayHit> {
        self.raytrace_filtered(origin, heading, max_range, |_| true)
    }

    /// Cast a ray, considering only occupants for which `accept` returns `true`.
    ///
    /// The ray is first clipped to the world bounds. Empty coarse and medium
    /// cells are crossed in one step; a hit is only reported from the fine
    /// grid. The loop is bounded by twice the number of fine cells along the
    /// clipped ray, so the call always terminates.
    pub fn raytrace_filtered(
        &self,
        origin: Point,
        heading: f64,
        max_range: f64,
        accept: impl Fn(ModelId) -> bool,
    ) -> Option<RayHit> {
        if max_range.is_nan() || max_range <= 0.0 {
            return None;
        }
        let (dy, dx) = heading.sin_cos();
        let (t_start, t_end) = self.clip(origin, dx, dy, max_range)?;

        let max_steps = (2.0 * (t_end - t_start) * self.config.ppm_high).ceil() as usize + 4;
        let has_accepted = |layer: &Layer, cell: Cell| layer.owners(cell).iter().any(|o| accept(*o));

        let mut t = t_start;
        for _ in 0..max_steps {
            if t > t_end {
                return None;
            }
            let p = Point::new(origin.x + dx * t, origin.y + dy * t);

            let coarse = self.coarse.cell_of(p);
            if !has_accepted(&self.coarse, coarse) {
                t += self.coarse.exit_distance(coarse, p, dx, dy) + BOUNDARY_EPSILON;
                continue;
            }
            let medium = self.medium.cell_of(p);
            if !has_accepted(&self.medium, medium) {
                t += self.medium.exit_distance(medium, p, dx, dy) + BOUNDARY_EPSILON;
                continue;
            }
            let fine = self.fine.cell_of(p);
            if let Some(owner) = self.fine.owners(fine).iter().find(|o| accept(**o)) {
                return Some(RayHit {
                    range: t,
                    point: p,
                    owner: *owner,
                });
            }
            t += self.fine.exit_distance(fine, p, dx, dy) + BOUNDARY_EPSILON;
        }
        None
    }

    fn layer(&self, level: Resolution) -> &Layer {
        match level {
            Resolution::Fine => &self.fine,
            Resolution::Medium => &self.medium,
            Resolution::Coarse => &self.coarse,
        }
    }

    /// Parametric interval of the ray inside the world bounds, capped at `max_range`.
    fn clip(&self, origin: Point, dx: f64, dy: f64, max_range: f64) -> Option<(f64, f64)> {
        let mut t0: f64 = 0.0;
        let mut t1 = max_range;
        let slabs = [
            (origin.x, dx, self.config.min.x, self.config.max.x),
            (origin.y, dy, self.config.min.y, self.config.max.y),
        ];
        for (pos, d, lo, hi) in slabs {
            if d.abs() < 1e-12 {
                if pos < lo || pos > hi {
                    return None;
                }
                continue;
            }
            let (a, b) = ((lo - pos) / d, (hi - pos) / d);
            t0 = t0.max(a.min(b));
            t1 = t1.min(a.max(b));
        }
        (t0 <= t1).then_some((t0, t1))
    }

    /// Fine cells touched by a region, clipped to the world bounds.
    fn rasterize(&self, region: &Region) -> Vec<Cell> {
        let mut cells = Vec::new();
        match region {
            Region::Point(p) => self.rasterize_line(*p, *p, &mut cells),
            Region::Line(a, b) => self.rasterize_line(*a, *b, &mut cells),
            Region::Rect { pose, size } => {
                let corners = rect_corners(pose, *size);
                for i in 0..4 {
                    self.rasterize_line(corners[i], corners[(i + 1) % 4], &mut cells);
                }
            }
        }
        cells
    }

    fn rasterize_line(&self, a: Point, b: Point, cells: &mut Vec<Cell>) {
        let length = a.distance_to(b);
        let (dx, dy) = if length > 0.0 {
            ((b.x - a.x) / length, (b.y - a.y) / length)
        } else {
            (0.0, 0.0)
        };
        let Some((t0, t1)) = self.clip(a, dx, dy, length) else {
            return;
        };
        // Half-cell sampling never skips a cell the segment passes through
        // by more than a corner.
        let steps = ((t1 - t0) * self.config.ppm_high * 2.0).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let t = t0 + (t1 - t0) * i as f64 / steps as f64;
            let p = Point::new(a.x + dx * t, a.y + dy * t);
            if !self.config.contains(p) {
                continue;
            }
            let cell = self.fine.cell_of(p);
            if !cells.contains(&cell) {
                cells.push(cell);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    fn index() -> SpatialIndex {
        SpatialIndex::new(MatrixConfig::default().with_extent(20.0, 20.0))
    }

    #[test]
    fn set_marks_all_levels() {
        let mut m = index();
        m.set_occupied(&Region::Point(Point::new(2.0, 0.0)), ModelId(1));
        assert_eq!(m.occupied_cells(Resolution::Fine), 1);
        assert!(m.occupied_cells(Resolution::Medium) >= 1);
        assert!(m.occupied_cells(Resolution::Coarse) >= 1);
        assert!(m.is_occupied(Point::new(2.01, 0.01)));
        assert_eq!(m.owners_at(Point::new(2.0, 0.0)), &[ModelId(1)]);
    }

    #[test]
    fn clear_removes_only_that_owner() {
        let mut m = index();
        let region = Region::Line(Point::new(1.0, -1.0), Point::new(1.0, 1.0));
        m.set_occupied(&region, ModelId(1));
        m.set_occupied(&region, ModelId(2));
        m.clear_occupied(&region, ModelId(1));
        assert!(!m.contains_owner(Resolution::Fine, ModelId(1)));
        assert!(!m.contains_owner(Resolution::Coarse, ModelId(1)));
        assert!(m.contains_owner(Resolution::Fine, ModelId(2)));
        m.clear_occupied(&region, ModelId(2));
        assert_eq!(m.occupied_cells(Resolution::Fine), 0);
        assert_eq!(m.occupied_cells(Resolution::Medium), 0);
        assert_eq!(m.occupied_cells(Resolution::Coarse), 0);
    }

    #[test]
    fn clearing_one_region_keeps_owner_elsewhere_visible() {
        let mut m = index();
        m.set_occupied(&Region::Point(Point::new(2.0, 0.0)), ModelId(1));
        m.set_occupied(&Region::Point(Point::new(2.5, 0.0)), ModelId(1));
        m.clear_occupied(&Region::Point(Point::new(2.5, 0.0)), ModelId(1));
        assert!(m.is_occupied(Point::new(2.0, 0.0)));
        assert!(!m.is_occupied(Point::new(2.5, 0.0)));
        assert!(m.contains_owner(Resolution::Coarse, ModelId(1)));
        let hit = m.raytrace(Point::new(0.0, 0.0), 0.0, 8.0).unwrap();
        assert_eq!(hit.owner, ModelId(1));
        assert!((hit.range - 2.0).abs() <= m.fine_resolution());
    }

    #[test]
    fn overlapping_writes_need_matching_clears() {
        let mut m = index();
        let wall = Region::Line(Point::new(3.0, -1.0), Point::new(3.0, 1.0));
        m.set_occupied(&wall, ModelId(2));
        m.set_occupied(&wall, ModelId(2));
        m.clear_occupied(&wall, ModelId(2));
        assert!(m.raytrace(Point::new(0.0, 0.0), 0.0, 8.0).is_some());
        m.clear_occupied(&wall, ModelId(2));
        assert!(m.raytrace(Point::new(0.0, 0.0), 0.0, 8.0).is_none());
        assert_eq!(m.occupied_cells(Resolution::Coarse), 0);
        // Clearing what was never set changes nothing.
        m.set_occupied(&Region::Point(Point::new(1.0, 0.0)), ModelId(3));
        m.clear_occupied(&Region::Point(Point::new(1.0, 0.0)), ModelId(4));
        assert!(m.contains_owner(Resolution::Coarse, ModelId(3)));
    }

    #[test]
    fn long_segment_is_clipped_to_bounds() {
        let mut m = index();
        let line = Region::Line(Point::new(-1.0e6, 0.0), Point::new(1.0e6, 0.0));
        m.set_occupied(&line, ModelId(5));
        let across = (20.0 / m.fine_resolution()) as usize;
        let cells = m.occupied_cells(Resolution::Fine);
        assert!((across..=across + 2).contains(&cells));
        let off_world = Region::Line(Point::new(50.0, -1.0e6), Point::new(50.0, 1.0e6));
        m.set_occupied(&off_world, ModelId(6));
        assert!(!m.contains_owner(Resolution::Fine, ModelId(6)));
    }

    #[test]
    fn ray_hits_occupied_cell_at_distance() {
        let mut m = index();
        m.set_occupied(&Region::Point(Point::new(2.0, 0.0)), ModelId(3));
        let hit = m.raytrace(Point::new(0.0, 0.0), 0.0, 8.0).unwrap();
        assert_eq!(hit.owner, ModelId(3));
        assert!((hit.range - 2.0).abs() <= m.fine_resolution());
    }

    #[test]
    fn ray_hits_rect_edge_from_any_direction() {
        let mut m = index();
        let rect = Region::Rect {
            pose: Pose::new(0.0, 0.0, 0.0),
            size: Size::new(2.0, 2.0),
        };
        m.set_occupied(&rect, ModelId(4));
        for heading in [0.0, PI / 2.0, PI, -PI / 2.0] {
            let origin = Point::new(0.0, 0.0).advance(heading, -5.0);
            let hit = m.raytrace(origin, heading, 10.0).unwrap();
            assert!((hit.range - 4.0).abs() <= 2.0 * m.fine_resolution());
        }
    }

    #[test]
    fn ray_stops_at_max_range() {
        let mut m = index();
        m.set_occupied(&Region::Point(Point::new(5.0, 0.0)), ModelId(1));
        assert!(m.raytrace(Point::new(0.0, 0.0), 0.0, 4.0).is_none());
    }

    #[test]
    fn filtered_ray_passes_rejected_owners() {
        let mut m = index();
        m.set_occupied(&Region::Point(Point::new(1.0, 0.0)), ModelId(1));
        m.set_occupied(&Region::Point(Point::new(3.0, 0.0)), ModelId(2));
        let hit = m
            .raytrace_filtered(Point::new(0.0, 0.0), 0.0, 8.0, |o| o != ModelId(1))
            .unwrap();
        assert_eq!(hit.owner, ModelId(2));
        assert!((hit.range - 3.0).abs() <= m.fine_resolution());
    }

    #[test]
    fn outside_bounds_is_no_effect_and_no_hit() {
        let mut m = index();
        m.set_occupied(&Region::Point(Point::new(50.0, 50.0)), ModelId(1));
        assert_eq!(m.occupied_cells(Resolution::Fine), 0);
        assert!(m.raytrace(Point::new(40.0, 40.0), 0.0, 5.0).is_none());
        assert!(m.raytrace(Point::new(40.0, 0.0), PI, 5.0).is_none());
    }

    #[test]
    fn ray_from_outside_enters_bounds() {
        let mut m = index();
        m.set_occupied(&Region::Point(Point::new(-9.0, 0.0)), ModelId(1));
        let hit = m.raytrace(Point::new(-15.0, 0.0), 0.0, 10.0).unwrap();
        assert!((hit.range - 6.0).abs() <= m.fine_resolution());
    }

    #[test]
    fn region_owners_reports_overlap() {
        let mut m = index();
        m.set_occupied(
            &Region::Rect {
                pose: Pose::new(1.0, 1.0, 0.3),
                size: Size::new(0.5, 0.5),
            },
            ModelId(9),
        );
        let probe = Region::Line(Point::new(0.0, 1.0), Point::new(2.0, 1.0));
        assert_eq!(m.region_owners(&probe), vec![ModelId(9)]);
        let elsewhere = Region::Line(Point::new(5.0, 5.0), Point::new(6.0, 5.0));
        assert!(m.region_owners(&elsewhere).is_empty());
    }

    proptest! {
        #[test]
        fn empty_space_never_hits(
            x in -9.0f64..9.0,
            y in -9.0f64..9.0,
            heading in -PI..PI,
            range in 0.0f64..30.0,
        ) {
            let m = index();
            prop_assert!(m.raytrace(Point::new(x, y), heading, range).is_none());
        }

        #[test]
        fn ray_at_point_hits_within_one_cell(
            heading in -PI..PI,
            d in 0.5f64..8.0,
        ) {
            let mut m = index();
            let target = Point::new(0.0, 0.0).advance(heading, d);
            m.set_occupied(&Region::Point(target), ModelId(1));
            let hit = m.raytrace(Point::new(0.0, 0.0), heading, 9.0);
            prop_assert!(hit.is_some());
            let hit = hit.unwrap();
            prop_assert_eq!(hit.owner, ModelId(1));
            prop_assert!((hit.range - d).abs() <= 2.0 * m.fine_resolution());
        }
    }
}
