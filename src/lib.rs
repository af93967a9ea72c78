pub mod asset;
pub mod renderer;
pub mod settings;

pub use renderer::{
    ContextId, DrawError, DrawOutcome, GpuContext, IndexArena, LayerDrawable, TileRecord,
};
pub use settings::TerrainSettings;

/// Installs the `env_logger` backend at `info` level; `RUST_LOG` adds
/// per-module filters. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
