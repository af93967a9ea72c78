use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::asset::ArenaTexture;
use crate::renderer::context::{ContextId, GpuContext};

/// Maps texture objects to the small integer indices shaders use to find
/// them. Shared by every layer and context; implementations synchronize
/// themselves.
pub trait TextureArena<C: GpuContext>: Send + Sync {
    /// Index of `texture`, assigned on first sight. The same texture object
    /// always yields the same index.
    fn add(&self, texture: &Arc<ArenaTexture>) -> i32;

    /// Makes the GPU-side table current in `context`. Called before every
    /// draw that reads arena indices.
    fn apply(&self, context: &mut C);
}

#[derive(Default)]
struct IndexTable {
    textures: Vec<Arc<ArenaTexture>>,
    lookup: HashMap<usize, i32>,
    applied: HashMap<ContextId, usize>,
}

/// Arena that only hands out indices and tracks how much of its table each
/// context has seen. Hosts that keep texture residency elsewhere read the
/// table back with [`IndexArena::textures`].
#[derive(Default)]
pub struct IndexArena {
    table: Mutex<IndexTable>,
}

impl IndexArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn textures(&self) -> Vec<Arc<ArenaTexture>> {
        self.lock().textures.clone()
    }

    pub fn index_of(&self, texture: &Arc<ArenaTexture>) -> Option<i32> {
        self.lock().lookup.get(&texture_key(texture)).copied()
    }

    /// Number of table entries `context` saw at its last apply.
    pub fn applied_len(&self, context: ContextId) -> Option<usize> {
        self.lock().applied.get(&context).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// The table keeps every texture alive, so an address is never reused while
// it is a key.
fn texture_key(texture: &Arc<ArenaTexture>) -> usize {
    Arc::as_ptr(texture) as usize
}

impl<C: GpuContext> TextureArena<C> for IndexArena {
    fn add(&self, texture: &Arc<ArenaTexture>) -> i32 {
        let mut table = self.lock();
        let key = texture_key(texture);
        if let Some(&index) = table.lookup.get(&key) {
            return index;
        }

        let index = table.textures.len() as i32;
        table.textures.push(texture.clone());
        table.lookup.insert(key, index);
        log::trace!("Texture '{}' assigned arena index {}", texture.label(), index);
        index
    }

    fn apply(&self, context: &mut C) {
        let mut table = self.lock();
        let len = table.textures.len();
        let previous = table.applied.insert(context.id(), len);
        if previous != Some(len) {
            log::debug!(
                "Texture arena table for {} now has {} entries",
                context.id(),
                len
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RecordingContext;

    fn add(arena: &IndexArena, texture: &Arc<ArenaTexture>) -> i32 {
        TextureArena::<RecordingContext>::add(arena, texture)
    }

    #[test]
    fn same_texture_yields_same_index() {
        let arena = IndexArena::new();
        let a = Arc::new(ArenaTexture::new("a"));
        let b = Arc::new(ArenaTexture::new("b"));

        assert_eq!(add(&arena, &a), 0);
        assert_eq!(add(&arena, &b), 1);
        assert_eq!(add(&arena, &a), 0);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.index_of(&b), Some(1));
    }

    #[test]
    fn equal_labels_are_distinct_textures() {
        let arena = IndexArena::new();
        let a = Arc::new(ArenaTexture::new("same"));
        let b = Arc::new(ArenaTexture::new("same"));

        assert_ne!(add(&arena, &a), add(&arena, &b));
    }

    #[test]
    fn apply_tracks_each_context() {
        let arena = IndexArena::new();
        let texture = Arc::new(ArenaTexture::new("a"));
        let mut first = RecordingContext::new(ContextId::new(0));
        let mut second = RecordingContext::new(ContextId::new(1));

        add(&arena, &texture);
        arena.apply(&mut first);

        assert_eq!(arena.applied_len(ContextId::new(0)), Some(1));
        assert_eq!(arena.applied_len(ContextId::new(1)), None);

        arena.apply(&mut second);
        assert_eq!(arena.applied_len(ContextId::new(1)), Some(1));
    }
}
