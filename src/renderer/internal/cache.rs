use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::renderer::batch::PatchRenderer;
use crate::renderer::context::{CapabilityError, ContextId, GpuContext, IndirectEntryPoints};
use crate::renderer::draw::DrawCommand;
use crate::renderer::internal::buffers::GrowableBuffer;
use crate::renderer::uniforms::DeviceTile;

/// Counters kept per context, see [`crate::renderer::LayerDrawable::context_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub tile_uploads: u64,
    pub command_uploads: u64,
    pub reallocations: u64,
    pub submissions: u64,
    pub tiles_submitted: u64,
}

/// What a context needs beyond the tile buffer, per draw strategy.
pub(crate) enum SurfaceResources<C: GpuContext> {
    Indirect {
        entry_points: IndirectEntryPoints,
        commands: GrowableBuffer<C, DrawCommand>,
        /// Dropped when the LOD configuration changes, recreated on the
        /// next draw.
        shared_constants: Option<C::Buffer>,
        vertex_format: C::VertexFormat,
    },
    Direct {
        vertex_format: C::VertexFormat,
    },
    Patch(Arc<dyn PatchRenderer<C>>),
}

/// Everything one context owns for one layer.
pub(crate) struct ContextResources<C: GpuContext> {
    pub(crate) tiles: GrowableBuffer<C, DeviceTile>,
    pub(crate) surface: SurfaceResources<C>,
    /// Command list last assembled for this context.
    pub(crate) command_list: Vec<DrawCommand>,
    pub(crate) uploaded_generation: Option<u64>,
    pub(crate) last_frame: Option<u64>,
    pub(crate) stats: ContextStats,
}

pub(crate) enum Slot<C: GpuContext> {
    Uninitialized,
    Live(Box<ContextResources<C>>),
    /// Initialization failed for good; release resets it.
    Failed(CapabilityError),
    Disposed,
}

impl<C: GpuContext> Slot<C> {
    /// Live resources of this slot, created with `init` if there are none.
    /// A failure sticks until the slot is released.
    pub(crate) fn get_or_try_init(
        &mut self,
        init: impl FnOnce() -> Result<ContextResources<C>, CapabilityError>,
    ) -> Result<&mut ContextResources<C>, CapabilityError> {
        match self {
            Slot::Live(_) => {}
            Slot::Failed(err) => return Err(*err),
            Slot::Uninitialized | Slot::Disposed => match init() {
                Ok(resources) => *self = Slot::Live(Box::new(resources)),
                Err(err) => {
                    *self = Slot::Failed(err);
                    return Err(err);
                }
            },
        }

        match self {
            Slot::Live(resources) => Ok(&mut **resources),
            _ => unreachable!("slot initialized above"),
        }
    }

    pub(crate) fn live(&self) -> Option<&ContextResources<C>> {
        match self {
            Slot::Live(resources) => Some(&**resources),
            _ => None,
        }
    }
}

/// Per-context slots, indexed by [`ContextId`]. The outer lock only guards
/// growth of the array; each context then locks its own slot, so contexts
/// drawing on different threads never wait on each other.
pub(crate) struct ContextCache<C: GpuContext> {
    slots: RwLock<Vec<Mutex<Slot<C>>>>,
}

impl<C: GpuContext> ContextCache<C> {
    pub(crate) fn new(capacity: usize) -> Self {
        let cache = Self {
            slots: RwLock::new(Vec::new()),
        };
        cache.ensure_capacity(capacity);
        cache
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Grows to at least `count` slots. Existing slots are left untouched.
    pub(crate) fn ensure_capacity(&self, count: usize) {
        if self.capacity() >= count {
            return;
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.len() < count {
            log::debug!("Growing per-context cache: {} -> {}", slots.len(), count);
            slots.resize_with(count, || Mutex::new(Slot::Uninitialized));
        }
    }

    /// Runs `f` on the slot of `context`, growing the array if the id is
    /// past its end.
    pub(crate) fn with_slot<R>(&self, context: ContextId, f: impl FnOnce(&mut Slot<C>) -> R) -> R {
        self.ensure_capacity(context.index() + 1);

        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut slot = slots[context.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut slot)
    }

    /// Like [`ContextCache::with_slot`], but `None` for ids past the end.
    pub(crate) fn with_existing_slot<R>(
        &self,
        context: ContextId,
        f: impl FnOnce(&mut Slot<C>) -> R,
    ) -> Option<R> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut slot = slots
            .get(context.index())?
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut slot))
    }

    /// Runs `f` on every slot, in context order.
    pub(crate) fn for_each_slot(&self, mut f: impl FnMut(ContextId, &mut Slot<C>)) {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        for (index, slot) in slots.iter().enumerate() {
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f(ContextId::new(index as u32), &mut slot);
        }
    }

    /// Drops the resources of one context, or of all with `None`.
    pub(crate) fn release(&self, context: Option<ContextId>) {
        match context {
            Some(context) => {
                if context.index() < self.capacity() {
                    self.with_slot(context, |slot| *slot = Slot::Disposed);
                    log::debug!("Released terrain resources for {}", context);
                }
            }
            None => {
                self.for_each_slot(|_, slot| *slot = Slot::Disposed);
                log::debug!("Released terrain resources for all contexts");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RecordingContext;

    fn cache() -> ContextCache<RecordingContext> {
        ContextCache::new(2)
    }

    fn is_uninitialized(cache: &ContextCache<RecordingContext>, id: u32) -> bool {
        cache.with_slot(ContextId::new(id), |slot| matches!(slot, Slot::Uninitialized))
    }

    #[test]
    fn ensure_capacity_only_grows() {
        let cache = cache();
        cache.ensure_capacity(8);
        assert_eq!(cache.capacity(), 8);

        cache.ensure_capacity(4);
        assert_eq!(cache.capacity(), 8);
    }

    #[test]
    fn unknown_context_grows_cache() {
        let cache = cache();
        assert!(is_uninitialized(&cache, 5));
        assert_eq!(cache.capacity(), 6);
    }

    #[test]
    fn growth_keeps_existing_slots() {
        let cache = cache();
        cache.with_slot(ContextId::new(1), |slot| *slot = Slot::Disposed);

        cache.ensure_capacity(16);

        assert!(cache.with_slot(ContextId::new(1), |slot| matches!(slot, Slot::Disposed)));
        assert!(is_uninitialized(&cache, 15));
    }

    #[test]
    fn release_one_leaves_others() {
        let cache = cache();
        cache.release(Some(ContextId::new(0)));

        assert!(cache.with_slot(ContextId::new(0), |slot| matches!(slot, Slot::Disposed)));
        assert!(is_uninitialized(&cache, 1));
    }

    #[test]
    fn failed_init_sticks_until_release() {
        let cache = cache();
        let id = ContextId::new(0);
        let err = CapabilityError {
            context: id,
            missing: crate::renderer::Capabilities::TESSELLATION,
        };

        let first = cache.with_slot(id, |slot| slot.get_or_try_init(|| Err(err)).is_err());
        let mut called = false;
        let second = cache.with_slot(id, |slot| {
            slot.get_or_try_init(|| {
                called = true;
                Err(err)
            })
            .err()
        });

        assert!(first);
        assert_eq!(second, Some(err));
        assert!(!called);

        cache.release(Some(id));
        assert!(cache.with_slot(id, |slot| matches!(slot, Slot::Disposed)));
    }

    #[test]
    fn existing_slot_lookup_does_not_grow() {
        let cache = cache();
        assert!(cache.with_existing_slot(ContextId::new(9), |_| ()).is_none());
        assert_eq!(cache.capacity(), 2);
    }

    #[test]
    fn release_past_end_does_not_grow() {
        let cache = cache();
        cache.release(Some(ContextId::new(40)));
        assert_eq!(cache.capacity(), 2);
    }
}
