// renderer/context.rs
use std::fmt;

use bitflags::bitflags;

use crate::renderer::draw::DrawCommand;

/// Shader-visible slot of the per-context tile array.
pub const TILE_BUFFER_SLOT: u32 = 31;
/// Shader-visible slot of the immutable morph constants block.
pub const SHARED_CONSTANTS_SLOT: u32 = 30;

/// Identifies one graphics context (one device/queue pair driven by one
/// render thread). Ids are small and dense, they index per-context arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u32);

impl ContextId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context #{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Triangles,
    Patches,
}

bitflags! {
    /// Optional GPU features a context reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Several indexed draws sourced from one indirect buffer.
        const MULTI_DRAW_INDIRECT = 1 << 0;
        /// Non-zero `first_instance` in indirect commands; the shader finds
        /// its tile through the instance index.
        const INDIRECT_FIRST_INSTANCE = 1 << 1;
        /// Storage buffers readable from the vertex stage.
        const VERTEX_STORAGE = 1 << 2;
        /// Hardware tessellation (patch primitives).
        const TESSELLATION = 1 << 3;
    }
}

impl Capabilities {
    /// Everything the indirect path needs for `topology`.
    pub fn required_for_indirect(topology: Topology) -> Self {
        let mut required = Self::MULTI_DRAW_INDIRECT
            | Self::INDIRECT_FIRST_INSTANCE
            | Self::VERTEX_STORAGE;
        if topology == Topology::Patches {
            required |= Self::TESSELLATION;
        }
        required
    }

    /// Everything the per-tile direct path needs for `topology`.
    pub fn required_for_direct(topology: Topology) -> Self {
        let mut required = Self::VERTEX_STORAGE;
        if topology == Topology::Patches {
            required |= Self::TESSELLATION;
        }
        required
    }
}

/// A required capability is absent in a context. The rendering path cannot
/// run there at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityError {
    pub context: ContextId,
    pub missing: Capabilities,
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lacks required GPU capabilities: {:?}",
            self.context, self.missing
        )
    }
}

impl std::error::Error for CapabilityError {}

/// Fails with every capability in `required` that `context` does not report.
pub fn require<C: GpuContext + ?Sized>(
    context: &C,
    required: Capabilities,
) -> Result<(), CapabilityError> {
    let missing = required - context.capabilities();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CapabilityError {
            context: context.id(),
            missing,
        })
    }
}

/// Proof that the indirect entry points were resolved for one context.
/// Only [`IndirectEntryPoints::resolve`] creates it, so a multi-draw can
/// never be issued in a context that was not checked first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndirectEntryPoints {
    context: ContextId,
    topology: Topology,
}

impl IndirectEntryPoints {
    pub fn resolve<C: GpuContext + ?Sized>(
        context: &C,
        topology: Topology,
    ) -> Result<Self, CapabilityError> {
        require(context, Capabilities::required_for_indirect(topology))?;
        Ok(Self {
            context: context.id(),
            topology,
        })
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }
}

/// The graphics API surface the terrain path drives. One value represents
/// one context; implementations decide what a buffer or a vertex format is
/// on their device.
pub trait GpuContext {
    type Buffer: Clone + PartialEq + fmt::Debug;
    type VertexFormat: fmt::Debug;

    fn id(&self) -> ContextId;

    fn capabilities(&self) -> Capabilities;

    fn create_buffer(&mut self, desc: &wgpu::BufferDescriptor<'_>) -> Self::Buffer;

    fn create_buffer_init(&mut self, desc: &wgpu::util::BufferInitDescriptor<'_>)
        -> Self::Buffer;

    /// Queues `data` for upload at `offset`. The CPU side may be reused as
    /// soon as this returns.
    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: wgpu::BufferAddress, data: &[u8]);

    fn create_vertex_format(
        &mut self,
        layout: &wgpu::VertexBufferLayout<'static>,
        topology: Topology,
    ) -> Self::VertexFormat;

    fn bind_storage_buffer(&mut self, slot: u32, buffer: &Self::Buffer);

    fn bind_vertex_format(&mut self, format: &Self::VertexFormat);

    fn multi_draw_indexed_indirect(
        &mut self,
        entry_points: &IndirectEntryPoints,
        commands: &Self::Buffer,
        count: u32,
    );

    fn draw_indexed(&mut self, topology: Topology, command: &DrawCommand);
}
