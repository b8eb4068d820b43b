//! Declarative request router: translates tagged requests into resource
//! manager and frame-loop operations.
//!
//! Grounded in spec §4.12's request table, with the routing style borrowed
//! from `eclale_graphics::renderer::Renderer::render` — one method per
//! request kind, each touching exactly the resource-manager/frame-loop
//! state spec.md names, instead of a generic dynamic-dispatch visitor.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use ash::vk;

use lumen_core::{Container, Handle};
use lumen_gpu::{BufferKind, BufferRegion, Canvas, Context, DeviceShared};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasFlags {
    pub headless: bool,
    pub fps_override: bool,
}

pub struct GraphicsPipeline {
    pub canvas: Handle<CanvasEntry>,
    pub kind: u32,
    pub vertex_dat: Option<Handle<BufferRegion>>,
    pub bindings: Vec<(u32, Handle<BufferRegion>)>,
}

pub struct CanvasEntry {
    pub canvas: Canvas,
}

/// Errors produced by request misuse (spec §7's "misuse" category): these
/// are logged and substituted with a safe default rather than aborting the
/// frame loop.
#[derive(Debug, thiserror::Error)]
pub enum PresenterError {
    #[error("unknown canvas handle")]
    UnknownCanvas,
    #[error("unknown graphics pipeline handle")]
    UnknownGraphics,
    #[error("unknown dat handle")]
    UnknownDat,
    #[error("vertex source not set for graphics pipeline before draw")]
    VertexNotSet,
}

/// Owns the resource manager and every live canvas, and maps presenter
/// requests onto them. Spec component C13 (the `Client`/window-event half
/// lives in [`crate::client::Client`]).
pub struct Presenter {
    pub context: Arc<Context>,
    canvases: Container<CanvasEntry>,
    graphics: Container<GraphicsPipeline>,
    dats: Container<BufferRegion>,
}

impl Presenter {
    pub fn new(shared: Arc<DeviceShared>, queue: vk::Queue) -> Result<Self> {
        Ok(Self {
            context: Arc::new(Context::new(shared, queue)?),
            canvases: Container::new(),
            graphics: Container::new(),
            dats: Container::new(),
        })
    }

    pub fn create_canvas(&mut self, canvas: Canvas) -> Handle<CanvasEntry> {
        self.canvases.insert(CanvasEntry { canvas })
    }

    pub fn canvas_mut(&mut self, handle: Handle<CanvasEntry>) -> Result<&mut Canvas> {
        Ok(&mut self
            .canvases
            .get_mut(handle)
            .context(PresenterError::UnknownCanvas)?
            .canvas)
    }

    pub fn delete_canvas(&mut self, handle: Handle<CanvasEntry>) -> Result<()> {
        self.canvases.remove(handle).context(PresenterError::UnknownCanvas)?;
        Ok(())
    }

    pub fn create_graphics(
        &mut self,
        canvas: Handle<CanvasEntry>,
        kind: u32,
    ) -> Result<Handle<GraphicsPipeline>> {
        if !self.canvases.contains(canvas) {
            anyhow::bail!(PresenterError::UnknownCanvas);
        }
        Ok(self.graphics.insert(GraphicsPipeline {
            canvas,
            kind,
            vertex_dat: None,
            bindings: Vec::new(),
        }))
    }

    pub fn create_dat(&mut self, kind: BufferKind, size: u64) -> Result<Handle<BufferRegion>> {
        let region = self.context.allocate(kind, size, 16)?;
        Ok(self.dats.insert(region))
    }

    pub fn set_vertex(
        &mut self,
        graphics: Handle<GraphicsPipeline>,
        dat: Handle<BufferRegion>,
    ) -> Result<()> {
        if !self.dats.contains(dat) {
            anyhow::bail!(PresenterError::UnknownDat);
        }
        self.graphics
            .get_mut(graphics)
            .context(PresenterError::UnknownGraphics)?
            .vertex_dat = Some(dat);
        Ok(())
    }

    pub fn bind_dat(
        &mut self,
        graphics: Handle<GraphicsPipeline>,
        slot: u32,
        dat: Handle<BufferRegion>,
    ) -> Result<()> {
        if !self.dats.contains(dat) {
            anyhow::bail!(PresenterError::UnknownDat);
        }
        self.graphics
            .get_mut(graphics)
            .context(PresenterError::UnknownGraphics)?
            .bindings
            .push((slot, dat));
        Ok(())
    }

    pub fn upload_dat(&mut self, dat: Handle<BufferRegion>, data: &[u8]) -> Result<()> {
        let region = self.dats.get(dat).context(PresenterError::UnknownDat)?;
        self.context.upload(region, data)
    }

    /// `record_begin(canvas_id, …)` (spec §4.12): appends a begin-draw-group
    /// entry to the canvas's refill script.
    pub fn record_begin(&mut self, canvas: Handle<CanvasEntry>) -> Result<()> {
        self.canvas_mut(canvas)?.record_begin();
        Ok(())
    }

    /// `record_viewport(canvas_id, …)` (spec §4.12): appends a viewport
    /// entry, depth range fixed to `[0, 1]` as this workspace never reverses
    /// it.
    pub fn record_viewport(
        &mut self,
        canvas: Handle<CanvasEntry>,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<()> {
        self.canvas_mut(canvas)?
            .record_viewport(x, y, width, height, 0.0, 1.0);
        Ok(())
    }

    /// `record_draw(canvas_id, …)` (spec §4.12): resolves `graphics`'s bound
    /// vertex dat to a concrete buffer/offset and appends a draw entry for
    /// `vertex_count` vertices. Fails with [`PresenterError::VertexNotSet`]
    /// if [`Presenter::set_vertex`] was never called for this pipeline.
    pub fn record_draw(
        &mut self,
        canvas: Handle<CanvasEntry>,
        graphics: Handle<GraphicsPipeline>,
        vertex_count: u32,
    ) -> Result<()> {
        let pipeline = self
            .graphics
            .get(graphics)
            .context(PresenterError::UnknownGraphics)?;
        let vertex_dat = pipeline.vertex_dat.context(PresenterError::VertexNotSet)?;
        let region = self.dats.get(vertex_dat).context(PresenterError::UnknownDat)?;
        let vertex_buffer = self.context.buffer_handle(region.kind);
        let vertex_offset = region.offset();
        self.canvas_mut(canvas)?
            .record_draw(vertex_buffer, vertex_offset, vertex_count);
        Ok(())
    }

    /// `record_end(canvas_id, …)` (spec §4.12): appends an end-draw-group
    /// entry to the canvas's refill script.
    pub fn record_end(&mut self, canvas: Handle<CanvasEntry>) -> Result<()> {
        self.canvas_mut(canvas)?.record_end();
        Ok(())
    }

    /// Handles `WINDOW_RESIZE`: recreates the canvas's swapchain and marks
    /// it for refill so the next frame re-records draws at the new size,
    /// matching spec §4.5/§4.12.
    pub fn handle_resize(
        &mut self,
        canvas: Handle<CanvasEntry>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let canvas = self.canvas_mut(canvas)?;
        canvas.resize(vk::Extent2D { width, height })?;
        canvas.request_refill();
        Ok(())
    }
}
