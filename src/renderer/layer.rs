// renderer/layer.rs
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::asset::SharedGeometry;
use crate::renderer::arena::TextureArena;
use crate::renderer::batch::{PatchRenderer, TileBatch};
use crate::renderer::builder::{PendingState, RefreshOutcome, TileSnapshot};
use crate::renderer::context::{
    require, Capabilities, CapabilityError, ContextId, GpuContext, IndirectEntryPoints,
    Topology, SHARED_CONSTANTS_SLOT, TILE_BUFFER_SLOT,
};
use crate::renderer::draw::assemble_commands;
use crate::renderer::internal::buffers::{create_shared_constants_buffer, GrowableBuffer};
use crate::renderer::internal::cache::{
    ContextCache, ContextResources, ContextStats, Slot, SurfaceResources,
};
use crate::renderer::tile::TileRecord;
use crate::renderer::uniforms::SharedConstants;
use crate::renderer::vertex::TerrainVertex;
use crate::settings::{LodMorphRange, SubmissionMode, TerrainSettings};

/// How a layer turns its tiles into draws. Chosen once, when the layer is
/// created.
pub enum DrawStrategy<C: GpuContext> {
    /// One multi-draw over a per-context command buffer.
    Indirect,
    /// One indexed draw per tile.
    Direct,
    /// The layer draws itself; it only gets the tile buffer and the batch.
    Patch(Arc<dyn PatchRenderer<C>>),
}

impl<C: GpuContext> DrawStrategy<C> {
    pub fn from_submission(mode: SubmissionMode) -> Self {
        match mode {
            SubmissionMode::Indirect => DrawStrategy::Indirect,
            SubmissionMode::Direct => DrawStrategy::Direct,
        }
    }

    fn required_capabilities(&self, topology: Topology) -> Capabilities {
        match self {
            DrawStrategy::Indirect => Capabilities::required_for_indirect(topology),
            DrawStrategy::Direct => Capabilities::required_for_direct(topology),
            DrawStrategy::Patch(_) => Capabilities::VERTEX_STORAGE,
        }
    }
}

impl<C: GpuContext> fmt::Debug for DrawStrategy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawStrategy::Indirect => f.write_str("Indirect"),
            DrawStrategy::Direct => f.write_str("Direct"),
            DrawStrategy::Patch(_) => f.write_str("Patch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Nothing to draw; no call reached the context.
    Skipped,
    Submitted { commands: u32 },
    Delegated { tiles: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawError {
    Capability(CapabilityError),
}

impl From<CapabilityError> for DrawError {
    fn from(e: CapabilityError) -> Self {
        DrawError::Capability(e)
    }
}

impl fmt::Display for DrawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawError::Capability(e) => write!(f, "Capability error: {}", e),
        }
    }
}

impl std::error::Error for DrawError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DrawError::Capability(e) => Some(e),
        }
    }
}

/// Lifecycle of a layer's resources in one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    /// Resources exist but the context has not drawn since the last refresh.
    Ready,
    /// The context drew during the current frame.
    Submitted,
    Failed,
    Disposed,
}

/// One terrain layer drawn with a shared tile set. Created once, refreshed
/// once per frame by a single writer, and drawn by every context.
pub struct LayerDrawable<C: GpuContext> {
    name: String,
    strategy: DrawStrategy<C>,
    settings: TerrainSettings,
    topology: Topology,
    shared_constants: SharedConstants,
    arena: Arc<dyn TextureArena<C>>,
    pending: PendingState,
    caches: ContextCache<C>,
    /// Every geometry a published tile set referenced, keyed by address.
    /// Their per-context templates go away on release.
    geometries: Mutex<HashMap<usize, Weak<SharedGeometry>>>,
    surface_draw_order: i32,
    frame: AtomicU64,
}

impl<C: GpuContext> LayerDrawable<C> {
    pub fn new(
        name: impl Into<String>,
        settings: TerrainSettings,
        arena: Arc<dyn TextureArena<C>>,
    ) -> Self {
        let strategy = DrawStrategy::from_submission(settings.submission);
        Self::with_strategy(name, settings, arena, strategy)
    }

    pub fn with_strategy(
        name: impl Into<String>,
        settings: TerrainSettings,
        arena: Arc<dyn TextureArena<C>>,
        strategy: DrawStrategy<C>,
    ) -> Self {
        let settings = settings.validate();
        let name = name.into();
        log::debug!("Creating terrain layer '{}' ({:?})", name, strategy);

        Self {
            name,
            topology: settings.topology(),
            shared_constants: SharedConstants::from_lod_morph(&settings.lod_morph),
            caches: ContextCache::new(settings.max_contexts as usize),
            strategy,
            settings,
            arena,
            pending: PendingState::new(),
            geometries: Mutex::new(HashMap::new()),
            surface_draw_order: 0,
            frame: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> &DrawStrategy<C> {
        &self.strategy
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    pub fn surface_draw_order(&self) -> i32 {
        self.surface_draw_order
    }

    /// Position of this layer among the surface layers of one pass. Only the
    /// layer at order zero binds the shared constants.
    pub fn set_surface_draw_order(&mut self, order: i32) {
        self.surface_draw_order = order;
    }

    pub fn snapshot(&self) -> Arc<TileSnapshot> {
        self.pending.snapshot()
    }

    /// Publishes this frame's tiles. Call once per frame, before any draw.
    pub fn refresh(&self, tiles: Vec<Arc<TileRecord>>) -> RefreshOutcome {
        self.frame.fetch_add(1, Ordering::AcqRel);
        let outcome = self
            .pending
            .refresh(tiles, &*self.arena, self.settings.use_land_cover);
        if outcome.rebuilt {
            self.track_geometries(&self.pending.snapshot());
        }
        outcome
    }

    /// Draws the current tile set in `context`. An empty set makes no call
    /// at all. A capability error is returned again on every later draw in
    /// that context until its resources are released.
    pub fn draw(&self, context: &mut C) -> Result<DrawOutcome, DrawError> {
        let snapshot = self.pending.snapshot();
        if snapshot.is_empty() {
            return Ok(DrawOutcome::Skipped);
        }

        let frame = self.frame.load(Ordering::Acquire);
        self.caches.with_slot(context.id(), |slot| -> Result<DrawOutcome, DrawError> {
            let resources = slot.get_or_try_init(|| {
                self.create_resources(context)
                    .inspect_err(|err| log::error!("Terrain layer '{}': {}", self.name, err))
            })?;

            self.restore_shared_constants(resources, context);
            self.upload(resources, context, &snapshot);

            self.arena.apply(context);
            context.bind_storage_buffer(TILE_BUFFER_SLOT, &resources.tiles.buffer);

            let outcome = self.submit(resources, context, &snapshot);
            resources.last_frame = Some(frame);
            resources.stats.submissions += 1;
            resources.stats.tiles_submitted += snapshot.len() as u64;
            Ok(outcome)
        })
    }

    /// Drops the resources of one context, or of every context with `None`.
    /// Other contexts keep theirs untouched.
    pub fn release_resources(&self, context: Option<ContextId>) {
        self.caches.release(context);

        let mut geometries = self.geometries.lock().unwrap_or_else(PoisonError::into_inner);
        geometries.retain(|_, geometry| match geometry.upgrade() {
            Some(geometry) => {
                geometry.release_draw_commands(context);
                true
            }
            None => false,
        });
    }

    /// Makes room for at least `count` contexts.
    pub fn resize_context_capacity(&self, count: usize) {
        self.caches.ensure_capacity(count);
    }

    pub fn context_capacity(&self) -> usize {
        self.caches.capacity()
    }

    /// Whether the next draw in `context` will upload the tile set.
    pub fn needs_upload(&self, context: ContextId) -> bool {
        let snapshot = self.pending.snapshot();
        if snapshot.is_empty() {
            return false;
        }
        self.caches
            .with_existing_slot(context, |slot| {
                slot.live().map(|resources| resources.uploaded_generation)
            })
            .flatten()
            .flatten()
            != Some(snapshot.generation())
    }

    pub fn context_state(&self, context: ContextId) -> ContextState {
        let frame = self.frame.load(Ordering::Acquire);
        self.caches
            .with_existing_slot(context, |slot| match slot {
                Slot::Uninitialized => ContextState::Uninitialized,
                Slot::Failed(_) => ContextState::Failed,
                Slot::Disposed => ContextState::Disposed,
                Slot::Live(resources) if resources.last_frame == Some(frame) => {
                    ContextState::Submitted
                }
                Slot::Live(_) => ContextState::Ready,
            })
            .unwrap_or(ContextState::Uninitialized)
    }

    pub fn context_stats(&self, context: ContextId) -> Option<ContextStats> {
        self.caches
            .with_existing_slot(context, |slot| slot.live().map(|resources| resources.stats))
            .flatten()
    }

    /// Replaces the LOD morph ranges. Every context drops its constants
    /// buffer and creates a new one on its next draw.
    pub fn reconfigure_lod_morph(&mut self, ranges: Vec<LodMorphRange>) {
        let mut settings = self.settings.clone();
        settings.lod_morph = ranges;
        self.settings = settings.validate();
        self.shared_constants = SharedConstants::from_lod_morph(&self.settings.lod_morph);

        self.caches.for_each_slot(|_, slot| {
            if let Slot::Live(resources) = slot {
                if let SurfaceResources::Indirect {
                    shared_constants, ..
                } = &mut resources.surface
                {
                    *shared_constants = None;
                }
            }
        });
        log::debug!("Terrain layer '{}' LOD morph reconfigured", self.name);
    }

    fn create_resources(&self, context: &mut C) -> Result<ContextResources<C>, CapabilityError> {
        require(context, self.strategy.required_capabilities(self.topology))?;

        let tiles = GrowableBuffer::new(
            context,
            "TerrainTiles",
            wgpu::BufferUsages::STORAGE,
            self.settings.initial_tile_capacity,
        );

        let surface = match &self.strategy {
            DrawStrategy::Indirect => SurfaceResources::Indirect {
                entry_points: IndirectEntryPoints::resolve(context, self.topology)?,
                commands: GrowableBuffer::new(
                    context,
                    "TerrainDrawCommands",
                    wgpu::BufferUsages::INDIRECT,
                    self.settings.initial_command_capacity,
                ),
                shared_constants: Some(create_shared_constants_buffer(
                    context,
                    &self.shared_constants,
                )),
                vertex_format: context
                    .create_vertex_format(&TerrainVertex::layout(), self.topology),
            },
            DrawStrategy::Direct => SurfaceResources::Direct {
                vertex_format: context
                    .create_vertex_format(&TerrainVertex::layout(), self.topology),
            },
            DrawStrategy::Patch(renderer) => SurfaceResources::Patch(renderer.clone()),
        };

        log::debug!(
            "Created terrain resources for layer '{}' in {}",
            self.name,
            context.id()
        );

        Ok(ContextResources {
            tiles,
            surface,
            command_list: Vec::new(),
            uploaded_generation: None,
            last_frame: None,
            stats: ContextStats::default(),
        })
    }

    fn restore_shared_constants(&self, resources: &mut ContextResources<C>, context: &mut C) {
        if let SurfaceResources::Indirect {
            shared_constants: shared_constants @ None,
            ..
        } = &mut resources.surface
        {
            *shared_constants = Some(create_shared_constants_buffer(
                context,
                &self.shared_constants,
            ));
        }
    }

    /// Uploads the snapshot if this context has not seen its generation.
    /// Every context uploads into its own buffers; the device array itself
    /// was built once, in `refresh`.
    fn upload(
        &self,
        resources: &mut ContextResources<C>,
        context: &mut C,
        snapshot: &TileSnapshot,
    ) {
        if resources.uploaded_generation == Some(snapshot.generation()) {
            return;
        }

        if resources.tiles.upload(context, snapshot.device_tiles()) {
            resources.stats.reallocations += 1;
        }
        resources.stats.tile_uploads += 1;

        if !matches!(resources.surface, SurfaceResources::Patch(_)) {
            assemble_commands(context.id(), snapshot.tiles(), &mut resources.command_list);
        }
        if let SurfaceResources::Indirect { commands, .. } = &mut resources.surface {
            if commands.upload(context, &resources.command_list) {
                resources.stats.reallocations += 1;
            }
            resources.stats.command_uploads += 1;
        }

        resources.uploaded_generation = Some(snapshot.generation());
    }

    fn submit(
        &self,
        resources: &ContextResources<C>,
        context: &mut C,
        snapshot: &TileSnapshot,
    ) -> DrawOutcome {
        let count = resources.command_list.len() as u32;
        match &resources.surface {
            SurfaceResources::Indirect {
                entry_points,
                commands,
                shared_constants,
                vertex_format,
            } => {
                if self.surface_draw_order == 0 {
                    if let Some(shared) = shared_constants {
                        context.bind_storage_buffer(SHARED_CONSTANTS_SLOT, shared);
                    }
                }
                context.bind_vertex_format(vertex_format);
                context.multi_draw_indexed_indirect(entry_points, &commands.buffer, count);
                DrawOutcome::Submitted { commands: count }
            }
            SurfaceResources::Direct { vertex_format } => {
                context.bind_vertex_format(vertex_format);
                for command in &resources.command_list {
                    context.draw_indexed(self.topology, command);
                }
                DrawOutcome::Submitted { commands: count }
            }
            SurfaceResources::Patch(renderer) => {
                let batch = TileBatch::new(snapshot);
                renderer.draw(context, &batch);
                DrawOutcome::Delegated { tiles: batch.len() }
            }
        }
    }

    fn track_geometries(&self, snapshot: &TileSnapshot) {
        let mut geometries = self.geometries.lock().unwrap_or_else(PoisonError::into_inner);
        for tile in snapshot.tiles() {
            geometries
                .entry(Arc::as_ptr(&tile.geometry) as usize)
                .or_insert_with(|| Arc::downgrade(&tile.geometry));
        }
    }
}
