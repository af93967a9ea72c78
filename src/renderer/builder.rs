// renderer/builder.rs
use std::sync::{Arc, PoisonError, RwLock};

use glam::Mat4;

use crate::asset::SamplerRole;
use crate::renderer::arena::TextureArena;
use crate::renderer::context::GpuContext;
use crate::renderer::tile::{Sampler, SamplerBinding, TileRecord};
use crate::renderer::uniforms::{DeviceTile, MAX_SHARED_SAMPLERS, UNBOUND_INDEX};

/// One published tile set together with its device-side array. Immutable
/// once published; `device_tiles[i]` always describes `tiles[i]`.
#[derive(Debug, Default)]
pub struct TileSnapshot {
    generation: u64,
    tiles: Vec<Arc<TileRecord>>,
    device_tiles: Vec<DeviceTile>,
}

impl TileSnapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tiles(&self) -> &[Arc<TileRecord>] {
        &self.tiles
    }

    pub fn device_tiles(&self) -> &[DeviceTile] {
        &self.device_tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// What a call to [`PendingState::refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub rebuilt: bool,
    pub generation: u64,
    /// Shared samplers that did not fit the device entry and were skipped.
    pub dropped_samplers: usize,
}

/// The tile set every context draws from. One writer replaces it per frame,
/// any number of contexts read it. Readers keep the `Arc` they got, so a
/// snapshot never changes under a draw in progress.
#[derive(Debug, Default)]
pub struct PendingState {
    current: RwLock<Arc<TileSnapshot>>,
}

impl PendingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<TileSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Publishes `tiles` if it differs from the current set by length, order
    /// or element identity. Tiles mutated in place are not detected.
    pub fn refresh<C: GpuContext>(
        &self,
        tiles: Vec<Arc<TileRecord>>,
        arena: &dyn TextureArena<C>,
        use_land_cover: bool,
    ) -> RefreshOutcome {
        let current = self.snapshot();
        if same_tiles(&current.tiles, &tiles) {
            return RefreshOutcome {
                rebuilt: false,
                generation: current.generation,
                dropped_samplers: 0,
            };
        }

        let mut resolver = SamplerResolver {
            arena,
            use_land_cover,
            dropped: 0,
        };
        let device_tiles: Vec<DeviceTile> =
            tiles.iter().map(|tile| resolver.device_tile(tile)).collect();

        if resolver.dropped > 0 {
            log::warn!(
                "Dropped {} shared sampler(s): a tile can carry at most {}",
                resolver.dropped,
                MAX_SHARED_SAMPLERS
            );
        }

        let generation = current.generation + 1;
        log::trace!(
            "Rebuilt {} device tiles (generation {})",
            device_tiles.len(),
            generation
        );

        let snapshot = Arc::new(TileSnapshot {
            generation,
            tiles,
            device_tiles,
        });
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;

        RefreshOutcome {
            rebuilt: true,
            generation,
            dropped_samplers: resolver.dropped,
        }
    }
}

fn same_tiles(a: &[Arc<TileRecord>], b: &[Arc<TileRecord>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| Arc::ptr_eq(a, b))
}

struct SamplerResolver<'a, C: GpuContext> {
    arena: &'a dyn TextureArena<C>,
    use_land_cover: bool,
    dropped: usize,
}

impl<C: GpuContext> SamplerResolver<'_, C> {
    fn device_tile(&mut self, tile: &TileRecord) -> DeviceTile {
        let mut entry = DeviceTile::new(tile.model_view, tile.key_value, tile.draw_order);

        (entry.color_index, entry.color_mat) =
            self.resolve(tile.color_sampler(SamplerBinding::Color), SamplerRole::Color);
        (entry.parent_index, entry.parent_mat) = self.resolve(
            tile.color_sampler(SamplerBinding::ColorParent),
            SamplerRole::ColorParent,
        );
        (entry.elevation_index, entry.elevation_mat) = self.resolve(
            tile.shared_sampler(SamplerBinding::Elevation),
            SamplerRole::Elevation,
        );
        (entry.normal_index, entry.normal_mat) =
            self.resolve(tile.shared_sampler(SamplerBinding::Normal), SamplerRole::Normal);
        if self.use_land_cover {
            (entry.landcover_index, entry.landcover_mat) = self.resolve(
                tile.shared_sampler(SamplerBinding::LandCover),
                SamplerRole::LandCover,
            );
        }

        for (slot, sampler) in tile.extra_shared_samplers().iter().enumerate() {
            if !sampler.is_bound() {
                continue;
            }
            if slot >= MAX_SHARED_SAMPLERS {
                self.dropped += 1;
                continue;
            }
            (entry.shared_index[slot], entry.shared_mat[slot]) =
                self.resolve(Some(sampler), SamplerRole::Shared);
        }

        entry
    }

    fn resolve(&self, sampler: Option<&Sampler>, role: SamplerRole) -> (i32, [f32; 16]) {
        match sampler.and_then(|s| s.texture.as_ref().map(|texture| (texture, s.matrix))) {
            Some((texture, matrix)) => {
                texture.apply_role(role);
                (self.arena.add(texture), matrix.to_cols_array())
            }
            None => (UNBOUND_INDEX, Mat4::ZERO.to_cols_array()),
        }
    }
}
