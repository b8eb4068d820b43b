//! ImGui-equivalent overlay hook.
//!
//! Grounded in `eclale_graphics/src/gui/mod.rs`'s `GuiRenderer`: an
//! `egui_ash_renderer::Renderer` backed by its own `gpu_allocator` instance
//! (distinct from the one the resource manager uses, matching the
//! teacher's choice to keep the GUI allocator self-contained). This is the
//! implemented hook surface for the out-of-scope "ImGui overlay" external
//! collaborator named in spec §1/§6; overlay widget content itself is not
//! part of the core.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;
use egui_ash_renderer::{DynamicRendering, Options, Renderer};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};

use lumen_gpu::DeviceShared;

pub struct GuiOverlay {
    pub renderer: Renderer,
    pub context: egui::Context,
    pub winit_state: egui_winit::State,
}

impl GuiOverlay {
    pub fn new(
        shared: &Arc<DeviceShared>,
        color_format: vk::Format,
        depth_format: Option<vk::Format>,
        event_loop: &winit::event_loop::EventLoopWindowTarget<()>,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: shared.instance.raw.clone(),
            device: shared.raw.clone(),
            physical_device: shared.physical_device.raw,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let renderer = Renderer::with_gpu_allocator(
            Arc::new(Mutex::new(allocator)),
            shared.raw.clone(),
            DynamicRendering {
                color_attachment_format: color_format,
                depth_attachment_format: depth_format,
            },
            Options {
                srgb_framebuffer: true,
                ..Default::default()
            },
        )?;

        let context = egui::Context::default();
        let winit_state = egui_winit::State::new(
            context.clone(),
            egui::ViewportId::ROOT,
            event_loop,
            None,
            None,
        );

        Ok(Self {
            renderer,
            context,
            winit_state,
        })
    }

    /// True while the overlay wants exclusive input (a widget has focus,
    /// or the pointer is over a panel) — the client's capture-flag gate
    /// (spec §4.13) reads this before feeding mouse/keyboard events to the
    /// core state machines.
    pub fn wants_input(&self) -> bool {
        self.context.wants_pointer_input() || self.context.wants_keyboard_input()
    }
}
