pub mod arena;
pub mod batch;
pub mod builder;
pub mod context;
pub mod draw;
pub mod gpu;
mod internal;
pub mod layer;
pub mod pipeline_builder;
pub mod recording;
pub mod tile;
pub mod uniforms;
pub mod vertex;

pub use arena::{IndexArena, TextureArena};
pub use batch::{PatchRenderer, TileBatch};
pub use builder::{PendingState, RefreshOutcome, TileSnapshot};
pub use context::{
    Capabilities, CapabilityError, ContextId, GpuContext, IndirectEntryPoints, Topology,
    SHARED_CONSTANTS_SLOT, TILE_BUFFER_SLOT,
};
pub use draw::{assemble_commands, DrawCommand};
pub use gpu::{GpuBuffer, GpuVertexFormat, PipelineConfig, WgpuContext};
pub use internal::cache::ContextStats;
pub use layer::{ContextState, DrawError, DrawOutcome, DrawStrategy, LayerDrawable};
pub use recording::{BufferId, GpuCall, RecordingContext, VertexFormatId};
pub use tile::{samplers_with, Sampler, SamplerBinding, Samplers, TileRecord};
pub use uniforms::{DeviceTile, SharedConstants, MAX_LODS, MAX_SHARED_SAMPLERS, UNBOUND_INDEX};
pub use vertex::TerrainVertex;
