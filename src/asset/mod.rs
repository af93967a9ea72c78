pub mod geometry;
pub mod texture;

pub use geometry::{GeometryRange, SharedGeometry};
pub use texture::{ArenaTexture, SamplerRole, TexturePolicy};
