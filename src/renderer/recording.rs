// renderer/recording.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::renderer::context::{
    Capabilities, ContextId, GpuContext, IndirectEntryPoints, Topology,
};
use crate::renderer::draw::DrawCommand;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexFormatId(u64);

/// One call made against a [`RecordingContext`].
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateBuffer {
        buffer: BufferId,
        label: Option<String>,
        size: u64,
        usage: wgpu::BufferUsages,
    },
    WriteBuffer {
        buffer: BufferId,
        offset: u64,
        len: usize,
    },
    CreateVertexFormat {
        format: VertexFormatId,
        stride: u64,
        attributes: usize,
        topology: Topology,
    },
    BindStorageBuffer {
        slot: u32,
        buffer: BufferId,
    },
    BindVertexFormat {
        format: VertexFormatId,
    },
    MultiDrawIndexedIndirect {
        topology: Topology,
        commands: BufferId,
        count: u32,
    },
    DrawIndexed {
        topology: Topology,
        command: DrawCommand,
    },
    /// Free-form marker, for custom renderers that draw on their own.
    Marker(String),
}

/// Headless context that records every call and keeps buffer contents in
/// memory. Used to capture frames without a device, and by the tests.
#[derive(Debug)]
pub struct RecordingContext {
    id: ContextId,
    capabilities: Capabilities,
    calls: Vec<GpuCall>,
    buffers: HashMap<BufferId, Vec<u8>>,
}

impl RecordingContext {
    /// A context reporting everything but tessellation.
    pub fn new(id: ContextId) -> Self {
        Self::with_capabilities(id, Capabilities::all() - Capabilities::TESSELLATION)
    }

    pub fn with_capabilities(id: ContextId, capabilities: Capabilities) -> Self {
        Self {
            id,
            capabilities,
            calls: Vec::new(),
            buffers: HashMap::new(),
        }
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<GpuCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn count_calls(&self, predicate: impl Fn(&GpuCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn record(&mut self, call: GpuCall) {
        self.calls.push(call);
    }

    /// Current contents of `buffer`, sized to the buffer.
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    fn allocate(
        &mut self,
        label: Option<&str>,
        usage: wgpu::BufferUsages,
        data: Vec<u8>,
    ) -> BufferId {
        let buffer = BufferId(next_handle());
        self.calls.push(GpuCall::CreateBuffer {
            buffer,
            label: label.map(str::to_owned),
            size: data.len() as u64,
            usage,
        });
        self.buffers.insert(buffer, data);
        buffer
    }
}

impl GpuContext for RecordingContext {
    type Buffer = BufferId;
    type VertexFormat = VertexFormatId;

    fn id(&self) -> ContextId {
        self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_buffer(&mut self, desc: &wgpu::BufferDescriptor<'_>) -> BufferId {
        self.allocate(desc.label, desc.usage, vec![0; desc.size as usize])
    }

    fn create_buffer_init(&mut self, desc: &wgpu::util::BufferInitDescriptor<'_>) -> BufferId {
        self.allocate(desc.label, desc.usage, desc.contents.to_vec())
    }

    fn write_buffer(&mut self, buffer: &BufferId, offset: wgpu::BufferAddress, data: &[u8]) {
        let contents = self
            .buffers
            .get_mut(buffer)
            .unwrap_or_else(|| panic!("write to unknown buffer {buffer:?}"));
        let start = offset as usize;
        let end = start + data.len();
        assert!(
            end <= contents.len(),
            "write of {} bytes at {} overflows {:?} ({} bytes)",
            data.len(),
            offset,
            buffer,
            contents.len()
        );
        contents[start..end].copy_from_slice(data);

        self.calls.push(GpuCall::WriteBuffer {
            buffer: *buffer,
            offset,
            len: data.len(),
        });
    }

    fn create_vertex_format(
        &mut self,
        layout: &wgpu::VertexBufferLayout<'static>,
        topology: Topology,
    ) -> VertexFormatId {
        let format = VertexFormatId(next_handle());
        self.calls.push(GpuCall::CreateVertexFormat {
            format,
            stride: layout.array_stride,
            attributes: layout.attributes.len(),
            topology,
        });
        format
    }

    fn bind_storage_buffer(&mut self, slot: u32, buffer: &BufferId) {
        self.calls.push(GpuCall::BindStorageBuffer {
            slot,
            buffer: *buffer,
        });
    }

    fn bind_vertex_format(&mut self, format: &VertexFormatId) {
        self.calls.push(GpuCall::BindVertexFormat { format: *format });
    }

    fn multi_draw_indexed_indirect(
        &mut self,
        entry_points: &IndirectEntryPoints,
        commands: &BufferId,
        count: u32,
    ) {
        assert_eq!(entry_points.context(), self.id, "entry points of another context");
        self.calls.push(GpuCall::MultiDrawIndexedIndirect {
            topology: entry_points.topology(),
            commands: *commands,
            count,
        });
    }

    fn draw_indexed(&mut self, topology: Topology, command: &DrawCommand) {
        self.calls.push(GpuCall::DrawIndexed {
            topology,
            command: *command,
        });
    }
}
