// renderer/gpu.rs
use std::sync::atomic::{AtomicU64, Ordering};

use wgpu::util::DeviceExt;

use crate::renderer::context::{
    Capabilities, ContextId, GpuContext, IndirectEntryPoints, Topology, SHARED_CONSTANTS_SLOT,
    TILE_BUFFER_SLOT,
};
use crate::renderer::draw::DrawCommand;
use crate::renderer::pipeline_builder::PipelineBuilder;
use crate::renderer::uniforms::SharedConstants;
use crate::renderer::vertex::TerrainVertex;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Bind group index of each shader slot in the terrain pipeline layout.
fn bind_group_index(slot: u32) -> Option<u32> {
    match slot {
        TILE_BUFFER_SLOT => Some(0),
        SHARED_CONSTANTS_SLOT => Some(1),
        _ => None,
    }
}

pub fn create_terrain_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("TerrainShader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("../shader/terrain.wgsl").into()),
    })
}

/// Target formats the terrain pipelines render into.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
}

/// A device buffer plus, for storage buffers, the bind group exposing it.
#[derive(Debug, Clone)]
pub struct GpuBuffer {
    id: u64,
    pub buffer: wgpu::Buffer,
    bind_group: Option<wgpu::BindGroup>,
}

impl PartialEq for GpuBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone)]
pub struct GpuVertexFormat {
    pub pipeline: wgpu::RenderPipeline,
    pub topology: Topology,
}

struct GeometryPool {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

enum PassOp {
    SetBindGroup(u32, wgpu::BindGroup),
    SetPipeline(wgpu::RenderPipeline),
    DrawIndexed(DrawCommand),
    MultiDrawIndexedIndirect(wgpu::Buffer, u32),
}

/// One wgpu device/queue pair as a terrain context. Uploads go straight to
/// the queue; binds and draws are recorded and replayed into a render pass
/// with [`WgpuContext::record_pass`].
pub struct WgpuContext {
    id: ContextId,
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: Capabilities,
    config: PipelineConfig,
    shader: wgpu::ShaderModule,
    storage_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    default_constants: wgpu::BindGroup,
    geometry: Option<GeometryPool>,
    ops: Vec<PassOp>,
}

impl WgpuContext {
    pub fn new(
        id: ContextId,
        adapter: &wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: PipelineConfig,
    ) -> Self {
        let storage_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("TerrainStorageLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("TerrainPipelineLayout"),
            bind_group_layouts: &[&storage_layout, &storage_layout],
            push_constant_ranges: &[],
        });

        // Layers that do not own the constants still need group 1 bound.
        let zeroed = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("TerrainDefaultConstants"),
            contents: bytemuck::bytes_of(&SharedConstants::default()),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let default_constants = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("TerrainDefaultConstantsBindGroup"),
            layout: &storage_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: zeroed.as_entire_binding(),
            }],
        });

        let capabilities = capabilities_of(adapter, &device);
        log::info!("{} capabilities: {:?}", id, capabilities);

        Self {
            id,
            shader: create_terrain_shader(&device),
            device,
            queue,
            capabilities,
            config,
            storage_layout,
            pipeline_layout,
            default_constants,
            geometry: None,
            ops: Vec::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Replaces the shared vertex/index pool every terrain geometry range
    /// points into.
    pub fn upload_geometry(&mut self, vertices: &[TerrainVertex], indices: &[u16]) {
        let vertices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("TerrainVertices"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        // Index data must be a multiple of four bytes.
        let mut padded = indices.to_vec();
        if padded.len() % 2 == 1 {
            padded.push(0);
        }
        let indices = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("TerrainIndices"),
            contents: bytemuck::cast_slice(&padded),
            usage: wgpu::BufferUsages::INDEX,
        });
        self.geometry = Some(GeometryPool { vertices, indices });
    }

    /// Replays everything recorded since the last call into `pass`.
    pub fn record_pass(&mut self, pass: &mut wgpu::RenderPass<'_>) {
        let ops = std::mem::take(&mut self.ops);
        let Some(geometry) = &self.geometry else {
            if !ops.is_empty() {
                log::warn!("{}: no terrain geometry uploaded, dropping {} ops", self.id, ops.len());
            }
            return;
        };

        pass.set_bind_group(1, &self.default_constants, &[]);
        pass.set_vertex_buffer(0, geometry.vertices.slice(..));
        pass.set_index_buffer(geometry.indices.slice(..), wgpu::IndexFormat::Uint16);

        for op in ops {
            match op {
                PassOp::SetBindGroup(index, bind_group) => {
                    pass.set_bind_group(index, &bind_group, &[])
                }
                PassOp::SetPipeline(pipeline) => pass.set_pipeline(&pipeline),
                PassOp::DrawIndexed(command) => {
                    pass.draw_indexed(command.indices(), command.base_vertex, command.instances())
                }
                PassOp::MultiDrawIndexedIndirect(buffer, count) => {
                    pass.multi_draw_indexed_indirect(&buffer, 0, count)
                }
            }
        }
    }
}

fn capabilities_of(adapter: &wgpu::Adapter, device: &wgpu::Device) -> Capabilities {
    let downlevel = adapter.get_downlevel_capabilities().flags;
    let mut capabilities = Capabilities::empty();

    if downlevel.contains(wgpu::DownlevelFlags::INDIRECT_EXECUTION) {
        capabilities |= Capabilities::MULTI_DRAW_INDIRECT;
    }
    if device.features().contains(wgpu::Features::INDIRECT_FIRST_INSTANCE) {
        capabilities |= Capabilities::INDIRECT_FIRST_INSTANCE;
    }
    if downlevel.contains(wgpu::DownlevelFlags::VERTEX_STORAGE)
        && device.limits().max_storage_buffers_per_shader_stage >= 2
    {
        capabilities |= Capabilities::VERTEX_STORAGE;
    }

    capabilities
}

impl GpuContext for WgpuContext {
    type Buffer = GpuBuffer;
    type VertexFormat = GpuVertexFormat;

    fn id(&self) -> ContextId {
        self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn create_buffer(&mut self, desc: &wgpu::BufferDescriptor<'_>) -> GpuBuffer {
        let buffer = self.device.create_buffer(desc);
        self.wrap(buffer, desc.usage)
    }

    fn create_buffer_init(&mut self, desc: &wgpu::util::BufferInitDescriptor<'_>) -> GpuBuffer {
        let buffer = self.device.create_buffer_init(desc);
        self.wrap(buffer, desc.usage)
    }

    fn write_buffer(&mut self, buffer: &GpuBuffer, offset: wgpu::BufferAddress, data: &[u8]) {
        self.queue.write_buffer(&buffer.buffer, offset, data);
    }

    fn create_vertex_format(
        &mut self,
        layout: &wgpu::VertexBufferLayout<'static>,
        topology: Topology,
    ) -> GpuVertexFormat {
        let mut builder = PipelineBuilder::new(&self.device, &self.pipeline_layout, &self.shader)
            .with_label("TerrainPipeline")
            .with_vertex_buffer(layout.clone())
            .with_color_target(self.config.color_format)
            .with_topology(topology)
            .with_no_culling();
        if let Some(depth_format) = self.config.depth_format {
            builder = builder.with_depth(depth_format);
        }

        GpuVertexFormat {
            pipeline: builder.build(),
            topology,
        }
    }

    fn bind_storage_buffer(&mut self, slot: u32, buffer: &GpuBuffer) {
        let Some(index) = bind_group_index(slot) else {
            log::warn!("{}: no bind group for storage slot {}", self.id, slot);
            return;
        };
        match &buffer.bind_group {
            Some(bind_group) => self.ops.push(PassOp::SetBindGroup(index, bind_group.clone())),
            None => log::warn!("{}: buffer bound at slot {} has no storage usage", self.id, slot),
        }
    }

    fn bind_vertex_format(&mut self, format: &GpuVertexFormat) {
        self.ops.push(PassOp::SetPipeline(format.pipeline.clone()));
    }

    fn multi_draw_indexed_indirect(
        &mut self,
        _entry_points: &IndirectEntryPoints,
        commands: &GpuBuffer,
        count: u32,
    ) {
        self.ops
            .push(PassOp::MultiDrawIndexedIndirect(commands.buffer.clone(), count));
    }

    fn draw_indexed(&mut self, _topology: Topology, command: &DrawCommand) {
        self.ops.push(PassOp::DrawIndexed(*command));
    }
}

impl WgpuContext {
    fn wrap(&self, buffer: wgpu::Buffer, usage: wgpu::BufferUsages) -> GpuBuffer {
        let bind_group = usage.contains(wgpu::BufferUsages::STORAGE).then(|| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("TerrainStorageBindGroup"),
                layout: &self.storage_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        });

        GpuBuffer {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            buffer,
            bind_group,
        }
    }
}
