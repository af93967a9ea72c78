// renderer/batch.rs
use std::sync::Arc;

use crate::renderer::builder::TileSnapshot;
use crate::renderer::context::GpuContext;
use crate::renderer::tile::TileRecord;
use crate::renderer::uniforms::DeviceTile;

/// Borrowed view of the tiles a layer draws this frame, in draw order.
/// Handed to custom renderers; nothing is copied.
#[derive(Debug, Clone, Copy)]
pub struct TileBatch<'a> {
    pub generation: u64,
    pub tiles: &'a [Arc<TileRecord>],
    pub device_tiles: &'a [DeviceTile],
}

impl<'a> TileBatch<'a> {
    pub fn new(snapshot: &'a TileSnapshot) -> Self {
        Self {
            generation: snapshot.generation(),
            tiles: snapshot.tiles(),
            device_tiles: snapshot.device_tiles(),
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a Arc<TileRecord>, &'a DeviceTile)> + 'a {
        self.tiles.iter().zip(self.device_tiles)
    }
}

/// Renders a layer's tiles itself instead of through the indirect path,
/// e.g. a patch layer with its own program.
pub trait PatchRenderer<C: GpuContext>: Send + Sync {
    fn draw(&self, context: &mut C, batch: &TileBatch<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{GeometryRange, SharedGeometry};
    use crate::renderer::arena::IndexArena;
    use crate::renderer::builder::PendingState;
    use crate::renderer::RecordingContext;
    use glam::{DMat4, Vec4};

    #[test]
    fn batch_borrows_snapshot_tiles() {
        let geometry = Arc::new(SharedGeometry::new(GeometryRange {
            first_index: 0,
            index_count: 6,
            base_vertex: 0,
        }));
        let tiles: Vec<Arc<TileRecord>> = (0..3)
            .map(|i| {
                Arc::new(TileRecord::new(
                    geometry.clone(),
                    DMat4::IDENTITY,
                    Vec4::new(i as f32, 0.0, 0.0, 0.0),
                ))
            })
            .collect();
        let state = PendingState::new();
        state.refresh::<RecordingContext>(tiles.clone(), &IndexArena::new(), true);

        let snapshot = state.snapshot();
        let batch = TileBatch::new(&snapshot);

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.generation, 1);
        for ((tile, entry), source) in batch.iter().zip(&tiles) {
            assert!(Arc::ptr_eq(tile, source));
            assert_eq!(entry.tile_key, source.key_value.to_array());
        }
    }
}
