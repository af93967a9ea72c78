use std::error::Error;
use std::sync::Arc;

use glam::{DMat4, DVec3, Mat4, Vec4};
use terrain_indirect::asset::{ArenaTexture, GeometryRange, SharedGeometry};
use terrain_indirect::renderer::{
    samplers_with, PipelineConfig, Sampler, SamplerBinding, TerrainVertex, WgpuContext,
};
use terrain_indirect::{ContextId, IndexArena, LayerDrawable, TerrainSettings, TileRecord};

const TARGET_SIZE: u32 = 512;
const TILES_PER_SIDE: i32 = 8;
const FRAMES: u32 = 3;

fn main() {
    terrain_indirect::init_logging();

    let settings = match std::env::args().nth(1) {
        Some(path) => TerrainSettings::load_from_path(path),
        None => TerrainSettings::default(),
    };

    if let Err(err) = pollster::block_on(run(settings)) {
        log::error!("Terrain demo failed: {}", err);
        std::process::exit(1);
    }
}

async fn run(settings: TerrainSettings) -> Result<(), Box<dyn Error>> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await?;
    log::info!("Using adapter {:?}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("TerrainDevice"),
            required_features: adapter.features() & wgpu::Features::INDIRECT_FIRST_INSTANCE,
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await?;

    let color_format = wgpu::TextureFormat::Rgba8UnormSrgb;
    let depth_format = wgpu::TextureFormat::Depth32Float;
    let mut context = WgpuContext::new(
        ContextId::new(0),
        &adapter,
        device.clone(),
        queue.clone(),
        PipelineConfig {
            color_format,
            depth_format: Some(depth_format),
        },
    );

    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    let fine = Arc::new(SharedGeometry::new(grid_mesh(16, &mut vertices, &mut indices)));
    let coarse = Arc::new(SharedGeometry::new(grid_mesh(8, &mut vertices, &mut indices)));
    context.upload_geometry(&vertices, &indices);

    let arena = Arc::new(IndexArena::new());
    let layer: LayerDrawable<WgpuContext> =
        LayerDrawable::new("surface", settings, arena.clone());
    let tiles = build_tiles(&fine, &coarse);

    let color_view = create_target(&device, color_format).create_view(&Default::default());
    let depth_view = create_target(&device, depth_format).create_view(&Default::default());

    for frame in 0..FRAMES {
        let refresh = layer.refresh(tiles.clone());
        let outcome = layer.draw(&mut context)?;
        log::info!(
            "Frame {}: rebuilt={} generation={} -> {:?}",
            frame,
            refresh.rebuilt,
            refresh.generation,
            outcome
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("TerrainFrame"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("TerrainPass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.45,
                            g: 0.6,
                            b: 0.8,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            context.record_pass(&mut pass);
        }
        queue.submit(Some(encoder.finish()));
    }

    if let Some(stats) = layer.context_stats(ContextId::new(0)) {
        log::info!(
            "Context stats: {} tile uploads, {} command uploads, {} reallocations, {} submissions",
            stats.tile_uploads,
            stats.command_uploads,
            stats.reallocations,
            stats.submissions
        );
    }
    log::info!("Texture arena holds {} textures", arena.len());

    layer.release_resources(None);
    Ok(())
}

fn create_target(device: &wgpu::Device, format: wgpu::TextureFormat) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("TerrainTarget"),
        size: wgpu::Extent3d {
            width: TARGET_SIZE,
            height: TARGET_SIZE,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    })
}

/// Appends a `resolution` x `resolution` cell grid over the unit square to
/// the pool. Neighbor attributes snap odd samples onto the parent grid.
fn grid_mesh(
    resolution: u16,
    vertices: &mut Vec<TerrainVertex>,
    indices: &mut Vec<u16>,
) -> GeometryRange {
    let base_vertex = vertices.len() as i32;
    let first_index = indices.len() as u32;
    let row = resolution + 1;
    let height = |x: f32, z: f32| 0.05 * (x * 6.0).sin() * (z * 4.0).cos();

    for j in 0..row {
        for i in 0..row {
            let (u, v) = (i as f32 / resolution as f32, j as f32 / resolution as f32);
            let (pu, pv) = (
                (i & !1) as f32 / resolution as f32,
                (j & !1) as f32 / resolution as f32,
            );
            vertices.push(TerrainVertex {
                position: [u, height(u, v), v],
                normal: [0.0, 1.0, 0.0],
                uv: [u, v, 0.0],
                neighbor_position: [pu, height(pu, pv), pv],
                neighbor_normal: [0.0, 1.0, 0.0],
            });
        }
    }

    for j in 0..resolution {
        for i in 0..resolution {
            let a = j * row + i;
            let b = a + row;
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }

    GeometryRange {
        first_index,
        index_count: indices.len() as u32 - first_index,
        base_vertex,
    }
}

/// A ring of coarse tiles around fine ones, all under one camera.
fn build_tiles(fine: &Arc<SharedGeometry>, coarse: &Arc<SharedGeometry>) -> Vec<Arc<TileRecord>> {
    let grass = Arc::new(ArenaTexture::new("grass"));
    let rock = Arc::new(ArenaTexture::new("rock"));
    let grass_samplers = Arc::new(samplers_with(
        SamplerBinding::Color,
        Sampler::new(grass, Mat4::IDENTITY),
    ));
    let rock_samplers = Arc::new(samplers_with(
        SamplerBinding::Color,
        Sampler::new(rock, Mat4::IDENTITY),
    ));

    let half = TILES_PER_SIDE as f64 / 2.0;
    let projection = DMat4::perspective_rh(60f64.to_radians(), 1.0, 0.1, 100.0);
    let view = DMat4::look_at_rh(DVec3::new(0.0, 6.0, 9.0), DVec3::ZERO, DVec3::Y);

    let mut tiles = Vec::new();
    for y in 0..TILES_PER_SIDE {
        for x in 0..TILES_PER_SIDE {
            let edge = x == 0 || y == 0 || x == TILES_PER_SIDE - 1 || y == TILES_PER_SIDE - 1;
            let (geometry, lod) = if edge { (coarse, 3.0) } else { (fine, 4.0) };
            let samplers = if (x + y) % 2 == 0 {
                &grass_samplers
            } else {
                &rock_samplers
            };
            let model = DMat4::from_translation(DVec3::new(x as f64 - half, 0.0, y as f64 - half));

            tiles.push(Arc::new(
                TileRecord::new(
                    geometry.clone(),
                    projection * view * model,
                    Vec4::new(x as f32, y as f32, lod, 0.0),
                )
                .with_color_samplers(samplers.clone()),
            ));
        }
    }
    tiles
}
