use std::marker::PhantomData;
use std::mem;

use bytemuck::Pod;

use crate::renderer::context::GpuContext;
use crate::renderer::uniforms::SharedConstants;

/// Device buffer holding an array of `T` that reallocates when an upload no
/// longer fits. A reallocation hands out a new buffer handle, so anything
/// bound to the old one has to be bound again.
pub(crate) struct GrowableBuffer<C: GpuContext, T> {
    pub(crate) buffer: C::Buffer,
    pub(crate) capacity: u32,
    pub(crate) len: u32,
    label: &'static str,
    usage: wgpu::BufferUsages,
    _element: PhantomData<T>,
}

impl<C: GpuContext, T: Pod> GrowableBuffer<C, T> {
    pub(crate) fn new(
        context: &mut C,
        label: &'static str,
        usage: wgpu::BufferUsages,
        capacity: u32,
    ) -> Self {
        let capacity = capacity.max(1);
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        let buffer = Self::allocate(context, label, usage, capacity);

        Self {
            buffer,
            capacity,
            len: 0,
            label,
            usage,
            _element: PhantomData,
        }
    }

    /// Writes `data` from the start of the buffer, growing first if needed.
    /// Returns true when the buffer was reallocated.
    pub(crate) fn upload(&mut self, context: &mut C, data: &[T]) -> bool {
        let required = data.len() as u32;
        let grew = required > self.capacity;
        if grew {
            self.grow(context, required);
        }

        if !data.is_empty() {
            context.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        }
        self.len = required;
        grew
    }

    fn grow(&mut self, context: &mut C, required: u32) {
        let new_capacity = required.max(self.capacity * 2).max(1);
        log::info!(
            "Growing {}: {} -> {}",
            self.label,
            self.capacity,
            new_capacity
        );

        self.buffer = Self::allocate(context, self.label, self.usage, new_capacity);
        self.capacity = new_capacity;
    }

    fn allocate(
        context: &mut C,
        label: &'static str,
        usage: wgpu::BufferUsages,
        capacity: u32,
    ) -> C::Buffer {
        context.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (capacity as usize * mem::size_of::<T>()) as u64,
            usage,
            mapped_at_creation: false,
        })
    }
}

/// Immutable morph constants buffer. Never written after creation.
pub(crate) fn create_shared_constants_buffer<C: GpuContext>(
    context: &mut C,
    constants: &SharedConstants,
) -> C::Buffer {
    use wgpu::util::BufferInitDescriptor;

    context.create_buffer_init(&BufferInitDescriptor {
        label: Some("TerrainSharedConstants"),
        contents: bytemuck::bytes_of(constants),
        usage: wgpu::BufferUsages::STORAGE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::{GpuCall, RecordingContext};
    use crate::renderer::{ContextId, DeviceTile};
    use bytemuck::Zeroable;

    #[test]
    fn upload_within_capacity_keeps_buffer() {
        let mut context = RecordingContext::new(ContextId::new(0));
        let mut tiles = GrowableBuffer::<_, DeviceTile>::new(
            &mut context,
            "TerrainTiles",
            wgpu::BufferUsages::STORAGE,
            4,
        );
        let before = tiles.buffer;

        let grew = tiles.upload(&mut context, &[DeviceTile::zeroed(); 3]);

        assert!(!grew);
        assert_eq!(tiles.buffer, before);
        assert_eq!(tiles.len, 3);
    }

    #[test]
    fn upload_past_capacity_reallocates() {
        let mut context = RecordingContext::new(ContextId::new(0));
        let mut tiles = GrowableBuffer::<_, DeviceTile>::new(
            &mut context,
            "TerrainTiles",
            wgpu::BufferUsages::STORAGE,
            2,
        );
        let before = tiles.buffer;

        let grew = tiles.upload(&mut context, &[DeviceTile::zeroed(); 5]);

        assert!(grew);
        assert_ne!(tiles.buffer, before);
        assert_eq!(tiles.capacity, 5);
        assert_eq!(
            context.buffer_contents(tiles.buffer).map(|bytes| bytes.len()),
            Some(5 * mem::size_of::<DeviceTile>())
        );
    }

    #[test]
    fn empty_upload_writes_nothing() {
        let mut context = RecordingContext::new(ContextId::new(0));
        let mut tiles = GrowableBuffer::<_, DeviceTile>::new(
            &mut context,
            "TerrainTiles",
            wgpu::BufferUsages::STORAGE,
            1,
        );
        context.take_calls();

        tiles.upload(&mut context, &[]);

        assert!(context.calls().is_empty());
    }

    #[test]
    fn shared_constants_are_not_writable() {
        let mut context = RecordingContext::new(ContextId::new(0));
        create_shared_constants_buffer(&mut context, &SharedConstants::default());

        match context.calls() {
            [GpuCall::CreateBuffer { usage, size, .. }] => {
                assert!(!usage.contains(wgpu::BufferUsages::COPY_DST));
                assert_eq!(*size, mem::size_of::<SharedConstants>() as u64);
            }
            calls => panic!("unexpected calls: {calls:?}"),
        }
    }
}
