use std::ops::Range;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::asset::GeometryRange;
use crate::renderer::context::ContextId;
use crate::renderer::tile::TileRecord;

/// One indexed indirect draw, laid out exactly as the GPU reads it.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq, Eq, Hash)]
pub struct DrawCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl DrawCommand {
    pub fn template(range: GeometryRange) -> Self {
        Self {
            index_count: range.index_count,
            instance_count: 1,
            first_index: range.first_index,
            base_vertex: range.base_vertex,
            first_instance: 0,
        }
    }

    /// Addresses tile `tile_index` of the tile array through the instance
    /// index.
    pub fn for_tile(self, tile_index: u32) -> Self {
        Self {
            first_instance: tile_index,
            ..self
        }
    }

    pub fn indices(&self) -> Range<u32> {
        self.first_index..self.first_index + self.index_count
    }

    pub fn instances(&self) -> Range<u32> {
        self.first_instance..self.first_instance + self.instance_count
    }
}

/// Rebuilds `commands` with one entry per tile, in tile order, from the
/// per-geometry templates of `context`.
pub fn assemble_commands(
    context: ContextId,
    tiles: &[Arc<TileRecord>],
    commands: &mut Vec<DrawCommand>,
) {
    commands.clear();
    commands.reserve(tiles.len());
    for (index, tile) in tiles.iter().enumerate() {
        let template = tile.geometry.get_or_create_draw_command(context);
        commands.push(template.for_tile(index as u32));
    }
}
