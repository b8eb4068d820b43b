//! Scenario 1 (staging buffer growth) from spec.md §8: uploading more bytes
//! than the staging arena's default 16 MiB capacity must grow it to the next
//! power of two rather than failing, and the bump cursor must carry over so
//! existing regions stay valid. Needs a physical Vulkan device, so it is
//! `#[ignore]`d — run with `cargo test -- --ignored` on a machine with a
//! working Vulkan ICD (no window/display required, this is headless).

use raw_window_handle::{RawDisplayHandle, XlibDisplayHandle};

use lumen_gpu::{BufferKind, Context, Host};

#[test]
#[ignore = "requires a physical Vulkan device"]
fn staging_arena_grows_past_default_capacity() {
    // No real X connection needed: the instance only uses this to pick
    // extensions, and this test never creates a surface.
    let display_handle = RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0));
    let host = Host::new(display_handle, false).expect("headless vulkan host");
    let queue = host.device_queue();
    let context = Context::new(host.shared.clone(), queue).expect("resource context");

    let small = context
        .allocate(BufferKind::Staging, 1024, 16)
        .expect("small allocation within default capacity");
    assert_eq!(small.offset(), 0);

    // Bigger than the 16 MiB default capacity: must trigger growth instead
    // of erroring.
    let big_size = 32 * 1024 * 1024;
    let big = context
        .allocate(BufferKind::Staging, big_size, 16)
        .expect("allocation past default capacity should grow the arena");
    assert!(big.offset() >= small.offset() + small.size);
    assert_eq!(big.size, big_size);

    // The cursor carried over growth, so a further allocation keeps
    // advancing rather than aliasing an earlier region.
    let after = context
        .allocate(BufferKind::Staging, 64, 16)
        .expect("allocation after growth");
    assert!(after.offset() >= big.offset() + big.size);
}

#[test]
#[ignore = "requires a physical Vulkan device"]
fn multi_slice_region_spaces_offsets_by_aligned_size() {
    let display_handle = RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0));
    let host = Host::new(display_handle, false).expect("headless vulkan host");
    let queue = host.device_queue();
    let context = Context::new(host.shared.clone(), queue).expect("resource context");

    // Per-image uniform region: three slices, one per swapchain image.
    let region = context
        .buffers(BufferKind::UniformMappable, 3, 96)
        .expect("multi-slice uniform region");
    assert_eq!(region.count, 3);
    assert_eq!(region.offsets.len(), 3);
    for i in 0..region.offsets.len() - 1 {
        assert_eq!(region.offsets[i + 1], region.offsets[i] + region.aligned_size);
    }
    assert!(region.aligned_size >= region.size);

    // Each slice is independently writable/readable through the staging
    // arena without disturbing its neighbours.
    let first = vec![1u8; 96];
    let second = vec![2u8; 96];
    context
        .upload_slice(&region, 0, &first)
        .expect("upload slice 0");
    context
        .upload_slice(&region, 1, &second)
        .expect("upload slice 1");
    assert_eq!(context.download_slices(&region, 0, 1).unwrap(), first);
    assert_eq!(context.download_slices(&region, 1, 1).unwrap(), second);
}
