// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::{DMat4, Mat4, Vec4};

use crate::settings::LodMorphRange;

/// Generic shared samplers a tile can carry in its device entry.
pub const MAX_SHARED_SAMPLERS: usize = 8;
/// LOD levels covered by the morph constants block.
pub const MAX_LODS: usize = 19;
/// Arena index of an unbound sampler slot.
pub const UNBOUND_INDEX: i32 = -1;

/// Per-tile record read by the terrain shader, one per tile in draw order.
/// Matrices of unbound slots are zero and never read.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct DeviceTile {
    pub model_view: [f32; 16],
    pub tile_key: [f32; 4],
    pub color_mat: [f32; 16],
    pub parent_mat: [f32; 16],
    pub elevation_mat: [f32; 16],
    pub normal_mat: [f32; 16],
    pub landcover_mat: [f32; 16],
    pub shared_mat: [[f32; 16]; MAX_SHARED_SAMPLERS],
    pub color_index: i32,
    pub parent_index: i32,
    pub elevation_index: i32,
    pub normal_index: i32,
    pub landcover_index: i32,
    pub shared_index: [i32; MAX_SHARED_SAMPLERS],
    pub draw_order: i32,
    pub _padding: [i32; 2],
}

impl DeviceTile {
    pub fn new(model_view: DMat4, tile_key: Vec4, draw_order: i32) -> Self {
        Self {
            model_view: model_view.as_mat4().to_cols_array(),
            tile_key: tile_key.to_array(),
            color_index: UNBOUND_INDEX,
            parent_index: UNBOUND_INDEX,
            elevation_index: UNBOUND_INDEX,
            normal_index: UNBOUND_INDEX,
            landcover_index: UNBOUND_INDEX,
            shared_index: [UNBOUND_INDEX; MAX_SHARED_SAMPLERS],
            draw_order,
            ..Self::zeroed()
        }
    }

    pub fn model_view_matrix(&self) -> Mat4 {
        Mat4::from_cols_array(&self.model_view)
    }

    pub fn shared_count(&self) -> usize {
        self.shared_index
            .iter()
            .filter(|&&index| index != UNBOUND_INDEX)
            .count()
    }
}

/// Morph coefficients for every LOD, uploaded once per context. The shader
/// blends towards the vertex's own position by
/// `clamp(x - distance * y, 0, 1)`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct SharedConstants {
    pub morph_constants: [[f32; 2]; MAX_LODS],
    pub _padding: [f32; 2],
}

impl SharedConstants {
    /// Blend factor pair that keeps a vertex at its own position at any
    /// distance.
    pub const NO_MORPH: [f32; 2] = [1.0, 0.0];

    /// For each LOD with range `[start, end]` the shader gets
    /// `end / (end - start)` and `1 / (end - start)`. Missing or degenerate
    /// ranges get [`SharedConstants::NO_MORPH`].
    pub fn from_lod_morph(ranges: &[LodMorphRange]) -> Self {
        let mut constants = Self::default();
        for (lod, range) in ranges.iter().take(MAX_LODS).enumerate() {
            if !range.is_valid() {
                continue;
            }
            let one_over_end_minus_start = 1.0 / (range.end - range.start);
            constants.morph_constants[lod] = [
                range.end * one_over_end_minus_start,
                one_over_end_minus_start,
            ];
        }
        constants
    }
}

impl Default for SharedConstants {
    fn default() -> Self {
        Self {
            morph_constants: [Self::NO_MORPH; MAX_LODS],
            _padding: [0.0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_tile_is_976_bytes() {
        // 14 mat4 = 896, vec4 key = 16, 16 i32 (indices, order, padding) = 64
        assert_eq!(std::mem::size_of::<DeviceTile>(), 976);
        assert_eq!(std::mem::size_of::<DeviceTile>() % 16, 0);
    }

    #[test]
    fn shared_constants_are_160_bytes() {
        assert_eq!(std::mem::size_of::<SharedConstants>(), 160);
    }

    #[test]
    fn new_tile_starts_unbound() {
        let tile = DeviceTile::new(DMat4::IDENTITY, Vec4::new(1.0, 2.0, 3.0, 4.0), 7);
        assert_eq!(tile.color_index, UNBOUND_INDEX);
        assert_eq!(tile.elevation_index, UNBOUND_INDEX);
        assert_eq!(tile.shared_count(), 0);
        assert_eq!(tile.tile_key, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(tile.draw_order, 7);
        assert_eq!(tile.model_view_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn morph_constants_follow_range() {
        let constants = SharedConstants::from_lod_morph(&[
            LodMorphRange::new(100.0, 200.0),
            LodMorphRange::DISABLED,
            LodMorphRange::new(25.0, 50.0),
        ]);

        let close =
            |a: [f32; 2], b: [f32; 2]| (a[0] - b[0]).abs() < 1e-5 && (a[1] - b[1]).abs() < 1e-7;

        assert!(close(constants.morph_constants[0], [2.0, 0.01]));
        assert_eq!(constants.morph_constants[1], SharedConstants::NO_MORPH);
        assert!(close(constants.morph_constants[2], [2.0, 0.04]));
        assert_eq!(constants.morph_constants[3], SharedConstants::NO_MORPH);
    }

    // Same expression as `vs_main` in terrain.wgsl.
    fn blend(morph: [f32; 2], distance: f32) -> f32 {
        (morph[0] - distance * morph[1]).clamp(0.0, 1.0)
    }

    #[test]
    fn disabled_lods_keep_own_position() {
        let defaults = SharedConstants::default();
        let unset = SharedConstants::from_lod_morph(&[]);
        let degenerate = SharedConstants::from_lod_morph(&[LodMorphRange::new(50.0, 10.0)]);

        for distance in [0.0, 1.0, 500.0, 1.0e6] {
            for lod in 0..MAX_LODS {
                assert_eq!(blend(defaults.morph_constants[lod], distance), 1.0);
                assert_eq!(blend(unset.morph_constants[lod], distance), 1.0);
            }
            assert_eq!(blend(degenerate.morph_constants[0], distance), 1.0);
        }
    }

    #[test]
    fn configured_lod_morphs_across_its_range() {
        let constants = SharedConstants::from_lod_morph(&[LodMorphRange::new(100.0, 200.0)]);
        let morph = constants.morph_constants[0];

        assert_eq!(blend(morph, 50.0), 1.0);
        assert!((blend(morph, 150.0) - 0.5).abs() < 1e-5);
        assert_eq!(blend(morph, 250.0), 0.0);
    }
}
