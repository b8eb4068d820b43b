//! Scenario 6 (swapchain resize) from spec.md §8: resizing a canvas tears
//! down and recreates its swapchain against the new extent and marks a
//! refill pending, without losing in-flight-frame bookkeeping. Needs a real
//! window and a physical Vulkan device, so it is `#[ignore]`d — run with
//! `cargo test -- --ignored` on a machine with a display and a working
//! Vulkan ICD.

use winit::event_loop::EventLoop;
use winit::raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::WindowBuilder;

use lumen_gpu::vk;
use lumen_gpu::{Canvas, Host, Instance, Surface};

#[test]
#[ignore = "requires a window and a physical Vulkan device"]
fn canvas_resize_recreates_swapchain_at_new_extent() {
    let event_loop = EventLoop::new().expect("event loop");
    let window = WindowBuilder::new()
        .with_title("lumen swapchain resize test")
        .with_inner_size(winit::dpi::PhysicalSize::new(320, 240))
        .build(&event_loop)
        .expect("window");

    let display_handle = window.display_handle().unwrap().as_raw();
    let window_handle = window.window_handle().unwrap().as_raw();

    let instance = Instance::new(display_handle, false).expect("instance");
    let surface = Surface::new(&instance, window_handle, display_handle).expect("surface");
    let host = Host::with_surface(instance, &surface).expect("host");
    let queue = host.device_queue();

    let initial_extent = vk::Extent2D {
        width: 320,
        height: 240,
    };
    let mut canvas = Canvas::new(host.shared.clone(), surface, queue, initial_extent, false)
        .expect("canvas");
    assert_eq!(canvas.extent(), initial_extent);
    assert_eq!(canvas.depth_extent(), initial_extent);

    let new_extent = vk::Extent2D {
        width: 640,
        height: 480,
    };
    canvas.resize(new_extent).expect("resize");
    assert_eq!(canvas.extent(), new_extent);
    assert_eq!(canvas.depth_extent(), new_extent);

    // Resizing to a zero dimension (minimized window) is a documented
    // no-op, not an error.
    canvas
        .resize(vk::Extent2D {
            width: 0,
            height: 480,
        })
        .expect("zero-dimension resize is a no-op");
    assert_eq!(canvas.extent(), new_extent);
}
