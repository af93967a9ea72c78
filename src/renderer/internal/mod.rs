pub mod buffers;
pub mod cache;
