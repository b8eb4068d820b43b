//! Demo application wiring the whole stack together: a window, a Vulkan
//! host and canvas, the resource-manager-backed presenter, and a panzoom
//! view controller driven by mouse gestures. Modeled on `eclale/src/main.rs`'s
//! winit event loop, generalized from one hard-coded track renderer to the
//! declarative request-router this workspace builds (spec.md §4.12/§4.13).
//!
//! There is no bundled vertex/fragment shader in this workspace (spec.md §1
//! keeps "specific graphics shaders" out of scope), so this demo never calls
//! `Presenter::record_draw` and every canvas refill records the clear-colour
//! pass only; an application linking against these crates supplies its own
//! pipeline and issues `record_begin`/`record_viewport`/`record_draw`/
//! `record_end` requests to append draws to the canvas's refill script.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use lumen_gpu::vk;
use lumen_gpu::{Canvas, Host, Instance, Surface};
use lumen_input::{CallbackMode, Event as AppEvent};
use lumen_interact::{Panzoom, Platform};
use lumen_present::{Client, Presenter};

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;

fn init_logging() {
    let env = env_logger::Env::default()
        .filter_or("LUMEN_LOG_LEVEL", "info")
        .write_style_or("LUMEN_LOG_STYLE", "auto");
    env_logger::init_from_env(env);
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

fn main() -> Result<()> {
    init_logging();

    // CLI/env surface (spec.md §6): DVZ_FPS/DVZ_DEBUG renamed to this
    // project's own prefix, same behavior (IMMEDIATE present mode / run the
    // frame loop indefinitely for the test harness instead of N frames).
    let fps_override = env_flag("LUMEN_FPS");
    let validation = env_flag("LUMEN_DEBUG");

    let mut client = Client::new()?;
    let window_id = client.create_window("lumen", DEFAULT_WIDTH, DEFAULT_HEIGHT)?;

    let (canvas, shared, queue) = {
        let window = client
            .window_mut(window_id)
            .expect("window was just created above");
        let display_handle = window.raw_display_handle();
        let window_handle = window.raw_window_handle();
        let size = window.inner_size();

        let instance = Instance::new(display_handle, validation)?;
        let surface = Surface::new(&instance, window_handle, display_handle)?;
        let host = Host::with_surface(instance, &surface)?;
        let queue = host.device_queue();
        let extent = vk::Extent2D {
            width: size.width.max(1),
            height: size.height.max(1),
        };
        let canvas = Canvas::new(host.shared.clone(), surface, queue, extent, fps_override)?;
        (canvas, host.shared.clone(), queue)
    };

    let mut presenter = Presenter::new(shared, queue)?;
    let canvas_handle = presenter.create_canvas(canvas);

    let presenter = Arc::new(Mutex::new(presenter));
    let panzoom = Arc::new(Mutex::new(Panzoom::new([
        DEFAULT_WIDTH as f64,
        DEFAULT_HEIGHT as f64,
    ])));
    let platform = Platform {
        is_macos: cfg!(target_os = "macos"),
    };

    {
        let window = client.window_mut(window_id).expect("window exists");

        let resize_presenter = presenter.clone();
        let resize_panzoom = panzoom.clone();
        window.events.register(
            AppEvent::Resize {
                width: 0,
                height: 0,
            }
            .kind_id(),
            CallbackMode::Sync,
            0,
            move |event| {
                let AppEvent::Resize { width, height } = *event else {
                    return;
                };
                if width == 0 || height == 0 {
                    return;
                }
                if let Err(err) = resize_presenter
                    .lock()
                    .handle_resize(canvas_handle, width, height)
                {
                    log::warn!("canvas resize failed: {err:#}");
                }
                resize_panzoom.lock().viewport_size = [width as f64, height as f64];
            },
        );

        let mouse_panzoom = panzoom.clone();
        window.on_mouse_event = Some(Box::new(move |event| {
            mouse_panzoom.lock().handle_mouse_event(event, platform);
        }));
    }

    log::info!("lumen running (fps_override={fps_override}, validation={validation})");

    client.run(move |_window| {
        let mut presenter = presenter.lock();
        let canvas = match presenter.canvas_mut(canvas_handle) {
            Ok(canvas) => canvas,
            Err(err) => {
                log::error!("canvas missing during redraw: {err:#}");
                return;
            }
        };
        if let Err(err) = canvas.frame() {
            log::error!("frame failed: {err:#}");
        }
        // Every view controller update lands here, ready for a presenter
        // request to upload it into a bound uniform `dat` once an
        // application has registered a graphics pipeline that consumes it.
        let _mvp = panzoom.lock().mvp();
    })
}
