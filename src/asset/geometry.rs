use std::sync::{Mutex, PoisonError};

use crate::renderer::{ContextId, DrawCommand};

/// Where a tile mesh lives inside the shared terrain vertex/index pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryRange {
    pub first_index: u32,
    pub index_count: u32,
    pub base_vertex: i32,
}

/// Reference-counted terrain tile geometry. Many tiles point at the same
/// instance when they share a topology, and each graphics context lazily
/// gets its own draw command template for it.
#[derive(Debug)]
pub struct SharedGeometry {
    range: GeometryRange,
    commands: Mutex<Vec<Option<DrawCommand>>>,
}

impl SharedGeometry {
    pub fn new(range: GeometryRange) -> Self {
        Self {
            range,
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn range(&self) -> GeometryRange {
        self.range
    }

    pub fn index_count(&self) -> u32 {
        self.range.index_count
    }

    /// Returns the command template for `context`, creating it on first use.
    /// Templates never carry per-tile addressing: `first_instance` is zero.
    pub fn get_or_create_draw_command(&self, context: ContextId) -> DrawCommand {
        let mut commands = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        let index = context.index();
        if commands.len() <= index {
            commands.resize(index + 1, None);
        }

        *commands[index].get_or_insert_with(|| {
            log::trace!(
                "Creating draw command template ({} indices) for {}",
                self.range.index_count,
                context
            );
            DrawCommand::template(self.range)
        })
    }

    pub fn cached_draw_command(&self, context: ContextId) -> Option<DrawCommand> {
        let commands = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        commands.get(context.index()).copied().flatten()
    }

    /// Forgets the template for one context, or for all of them with `None`.
    pub fn release_draw_commands(&self, context: Option<ContextId>) {
        let mut commands = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        match context {
            Some(context) => {
                if let Some(slot) = commands.get_mut(context.index()) {
                    *slot = None;
                }
            }
            None => commands.clear(),
        }
    }
}
