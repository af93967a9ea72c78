#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::{DMat4, DVec3, Mat4, Vec4};
use terrain_indirect::asset::{ArenaTexture, GeometryRange, SharedGeometry};
use terrain_indirect::renderer::{
    samplers_with, BufferId, DeviceTile, DrawCommand, GpuCall, IndexArena, RecordingContext,
    Sampler, SamplerBinding, TextureArena, TileRecord, TILE_BUFFER_SLOT,
};

/// Index arena that counts its calls and leaves a marker in the context on
/// every apply, so tests can check call order.
#[derive(Default)]
pub struct CountingArena {
    pub inner: IndexArena,
    pub adds: AtomicUsize,
    pub applies: AtomicUsize,
}

impl CountingArena {
    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }
}

pub const ARENA_APPLIED: &str = "arena applied";

impl TextureArena<RecordingContext> for CountingArena {
    fn add(&self, texture: &Arc<ArenaTexture>) -> i32 {
        self.adds.fetch_add(1, Ordering::SeqCst);
        TextureArena::<RecordingContext>::add(&self.inner, texture)
    }

    fn apply(&self, context: &mut RecordingContext) {
        self.applies.fetch_add(1, Ordering::SeqCst);
        self.inner.apply(context);
        context.record(GpuCall::Marker(ARENA_APPLIED.to_owned()));
    }
}

pub fn geometry(first_index: u32, index_count: u32, base_vertex: i32) -> Arc<SharedGeometry> {
    Arc::new(SharedGeometry::new(GeometryRange {
        first_index,
        index_count,
        base_vertex,
    }))
}

pub fn color_samplers(texture: &Arc<ArenaTexture>) -> Arc<Vec<Sampler>> {
    Arc::new(samplers_with(
        SamplerBinding::Color,
        Sampler::new(texture.clone(), Mat4::IDENTITY),
    ))
}

pub fn tile_at(geometry: &Arc<SharedGeometry>, x: f64, key: Vec4) -> Arc<TileRecord> {
    Arc::new(TileRecord::new(
        geometry.clone(),
        DMat4::from_translation(DVec3::new(x, 0.0, 0.0)),
        key,
    ))
}

pub fn plain_tiles(count: usize) -> Vec<Arc<TileRecord>> {
    let geometry = geometry(0, 6, 0);
    (0..count)
        .map(|i| tile_at(&geometry, i as f64, Vec4::new(i as f32, 0.0, 1.0, 0.0)))
        .collect()
}

/// Buffer most recently bound at the tile slot.
pub fn bound_tile_buffer(context: &RecordingContext) -> Option<BufferId> {
    context.calls().iter().rev().find_map(|call| match call {
        GpuCall::BindStorageBuffer { slot, buffer } if *slot == TILE_BUFFER_SLOT => Some(*buffer),
        _ => None,
    })
}

/// Commands buffer of the most recent multi-draw, with its count.
pub fn last_multi_draw(context: &RecordingContext) -> Option<(BufferId, u32)> {
    context.calls().iter().rev().find_map(|call| match call {
        GpuCall::MultiDrawIndexedIndirect { commands, count, .. } => Some((*commands, *count)),
        _ => None,
    })
}

pub fn device_tiles(context: &RecordingContext, buffer: BufferId, count: usize) -> Vec<DeviceTile> {
    let bytes = context.buffer_contents(buffer).expect("tile buffer exists");
    bytemuck::pod_collect_to_vec(&bytes[..count * std::mem::size_of::<DeviceTile>()])
}

pub fn draw_commands(
    context: &RecordingContext,
    buffer: BufferId,
    count: usize,
) -> Vec<DrawCommand> {
    let bytes = context.buffer_contents(buffer).expect("command buffer exists");
    bytemuck::pod_collect_to_vec(&bytes[..count * std::mem::size_of::<DrawCommand>()])
}

pub fn writes_to(context: &RecordingContext, buffer: BufferId) -> usize {
    context.count_calls(|call| {
        matches!(call, GpuCall::WriteBuffer { buffer: b, .. } if *b == buffer)
    })
}

pub fn created_buffers(context: &RecordingContext) -> usize {
    context.count_calls(|call| matches!(call, GpuCall::CreateBuffer { .. }))
}
