// renderer/tile.rs
use std::sync::Arc;

use glam::{DMat4, Mat4, Vec4};

use crate::asset::{ArenaTexture, SamplerRole, SharedGeometry};

/// Index of each fixed sampler slot. Color samplers live in a tile's
/// color list, the others in its shared list; generic shared samplers
/// follow from [`SamplerBinding::SHARED`] on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerBinding {
    Color = 0,
    ColorParent = 1,
    Elevation = 2,
    Normal = 3,
    LandCover = 4,
}

impl SamplerBinding {
    pub const SHARED: usize = 5;

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn role(self) -> SamplerRole {
        match self {
            SamplerBinding::Color => SamplerRole::Color,
            SamplerBinding::ColorParent => SamplerRole::ColorParent,
            SamplerBinding::Elevation => SamplerRole::Elevation,
            SamplerBinding::Normal => SamplerRole::Normal,
            SamplerBinding::LandCover => SamplerRole::LandCover,
        }
    }
}

/// One texture binding of a tile: an optional arena texture plus the matrix
/// that maps tile coordinates into it.
#[derive(Debug, Clone)]
pub struct Sampler {
    pub texture: Option<Arc<ArenaTexture>>,
    pub matrix: Mat4,
}

impl Sampler {
    pub const EMPTY: Sampler = Sampler {
        texture: None,
        matrix: Mat4::IDENTITY,
    };

    pub fn new(texture: Arc<ArenaTexture>, matrix: Mat4) -> Self {
        Self {
            texture: Some(texture),
            matrix,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.texture.is_some()
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::EMPTY
    }
}

pub type Samplers = Vec<Sampler>;

/// Everything needed to draw one terrain tile in one frame. Produced by the
/// terrain traversal; treated as immutable once published.
#[derive(Debug, Clone)]
pub struct TileRecord {
    pub geometry: Arc<SharedGeometry>,
    pub model_view: DMat4,
    pub key_value: Vec4,
    pub color_samplers: Option<Arc<Samplers>>,
    pub shared_samplers: Option<Arc<Samplers>>,
    pub draw_order: i32,
}

impl TileRecord {
    pub fn new(geometry: Arc<SharedGeometry>, model_view: DMat4, key_value: Vec4) -> Self {
        Self {
            geometry,
            model_view,
            key_value,
            color_samplers: None,
            shared_samplers: None,
            draw_order: 0,
        }
    }

    pub fn with_color_samplers(mut self, samplers: Arc<Samplers>) -> Self {
        self.color_samplers = Some(samplers);
        self
    }

    pub fn with_shared_samplers(mut self, samplers: Arc<Samplers>) -> Self {
        self.shared_samplers = Some(samplers);
        self
    }

    pub fn with_draw_order(mut self, draw_order: i32) -> Self {
        self.draw_order = draw_order;
        self
    }

    pub fn color_sampler(&self, binding: SamplerBinding) -> Option<&Sampler> {
        self.color_samplers.as_deref()?.get(binding.index())
    }

    pub fn shared_sampler(&self, binding: SamplerBinding) -> Option<&Sampler> {
        self.shared_samplers.as_deref()?.get(binding.index())
    }

    /// Generic shared samplers, i.e. everything past the fixed slots.
    pub fn extra_shared_samplers(&self) -> &[Sampler] {
        match self.shared_samplers.as_deref() {
            Some(samplers) if samplers.len() > SamplerBinding::SHARED => {
                &samplers[SamplerBinding::SHARED..]
            }
            _ => &[],
        }
    }
}

/// Builds a sampler list with `sampler` placed at `binding` and empty slots
/// before it.
pub fn samplers_with(binding: SamplerBinding, sampler: Sampler) -> Samplers {
    let mut samplers = vec![Sampler::EMPTY; binding.index() + 1];
    samplers[binding.index()] = sampler;
    samplers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::GeometryRange;

    fn tile() -> TileRecord {
        let geometry = Arc::new(SharedGeometry::new(GeometryRange {
            first_index: 0,
            index_count: 6,
            base_vertex: 0,
        }));
        TileRecord::new(geometry, DMat4::IDENTITY, Vec4::ZERO)
    }

    #[test]
    fn missing_lists_resolve_to_none() {
        let tile = tile();
        assert!(tile.color_sampler(SamplerBinding::Color).is_none());
        assert!(tile.shared_sampler(SamplerBinding::Elevation).is_none());
        assert!(tile.extra_shared_samplers().is_empty());
    }

    #[test]
    fn extra_shared_samplers_skip_fixed_slots() {
        let texture = Arc::new(ArenaTexture::new("detail"));
        let mut shared = vec![Sampler::EMPTY; SamplerBinding::SHARED];
        shared.push(Sampler::new(texture, Mat4::IDENTITY));

        let tile = tile().with_shared_samplers(Arc::new(shared));

        assert_eq!(tile.extra_shared_samplers().len(), 1);
        assert!(tile.extra_shared_samplers()[0].is_bound());
        assert!(!tile.shared_sampler(SamplerBinding::Normal).unwrap().is_bound());
    }

    #[test]
    fn samplers_with_places_binding() {
        let texture = Arc::new(ArenaTexture::new("elevation"));
        let samplers = samplers_with(
            SamplerBinding::Elevation,
            Sampler::new(texture, Mat4::IDENTITY),
        );
        assert_eq!(samplers.len(), 3);
        assert!(samplers[SamplerBinding::Elevation.index()].is_bound());
        assert!(!samplers[SamplerBinding::Color.index()].is_bound());
    }
}
