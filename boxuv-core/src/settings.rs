//! User-facing projection settings

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Upper bounds selectable for the tiling factor.
pub const TILING_RANGES: [f32; 5] = [0.01, 0.1, 1.0, 10.0, 100.0];

/// Lower bound of every tiling range.
pub const MIN_TILING: f32 = 0.001;

const DEFAULT_TILING_RANGE: usize = 2;

/// Which space vertex positions are projected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionSpace {
    /// World-space positions; faces are classified by their world normal.
    World,
    /// Local positions scaled by the lossy scale; the texture follows the
    /// object's rotation.
    LocalScaled,
}

/// Tiling, offset and rotation handling applied by the projector.
///
/// Values are kept inside their ranges by the setters; call
/// [`ProjectionSettings::clamped`] after deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionSettings {
    tiling_factor: f32,
    tiling_range: usize,
    uv_offset: [f32; 2],
    ignore_object_rotation: bool,
}

impl ProjectionSettings {
    pub fn new(tiling_factor: f32, uv_offset: [f32; 2], ignore_object_rotation: bool) -> Self {
        Self {
            tiling_factor,
            tiling_range: DEFAULT_TILING_RANGE,
            uv_offset,
            ignore_object_rotation,
        }
        .clamped()
    }

    /// Bring every field back inside its valid range.
    pub fn clamped(mut self) -> Self {
        self.tiling_range = self.tiling_range.min(TILING_RANGES.len() - 1);
        self.set_tiling_factor(self.tiling_factor);
        self.set_uv_offset(self.uv_offset);
        self
    }

    pub fn tiling_factor(&self) -> f32 {
        self.tiling_factor
    }

    /// Clamped to `[MIN_TILING, tiling_range_max()]`.
    pub fn set_tiling_factor(&mut self, tiling_factor: f32) {
        self.tiling_factor = if tiling_factor.is_nan() {
            MIN_TILING
        } else {
            tiling_factor.clamp(MIN_TILING, self.tiling_range_max())
        };
    }

    pub fn tiling_range(&self) -> usize {
        self.tiling_range
    }

    pub fn tiling_range_max(&self) -> f32 {
        TILING_RANGES[self.tiling_range]
    }

    /// Select a tiling range by index into [`TILING_RANGES`] and re-clamp
    /// the tiling factor into it.
    pub fn set_tiling_range(&mut self, index: usize) {
        self.tiling_range = index.min(TILING_RANGES.len() - 1);
        self.set_tiling_factor(self.tiling_factor);
    }

    pub fn uv_offset(&self) -> Vector2<f32> {
        Vector2::new(self.uv_offset[0], self.uv_offset[1])
    }

    /// Each component is clamped to `[0, 1]`.
    pub fn set_uv_offset(&mut self, offset: [f32; 2]) {
        self.uv_offset = offset.map(|c| if c.is_nan() { 0.0 } else { c.clamp(0.0, 1.0) });
    }

    pub fn ignore_object_rotation(&self) -> bool {
        self.ignore_object_rotation
    }

    pub fn set_ignore_object_rotation(&mut self, ignore: bool) {
        self.ignore_object_rotation = ignore;
    }

    pub fn space(&self) -> ProjectionSpace {
        if self.ignore_object_rotation {
            ProjectionSpace::World
        } else {
            ProjectionSpace::LocalScaled
        }
    }

    /// Scale a planar coordinate by the tiling factor and shift it by the offset.
    pub fn apply(&self, planar: Vector2<f32>) -> Vector2<f32> {
        planar * self.tiling_factor + self.uv_offset()
    }
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            tiling_factor: 1.0,
            tiling_range: DEFAULT_TILING_RANGE,
            uv_offset: [0.0, 0.0],
            ignore_object_rotation: true,
        }
    }
}
