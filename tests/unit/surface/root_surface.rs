use super::*;
use crate::device::headless::HeadlessDevice;

fn rect(x: u32, y: u32, width: u32, height: u32) -> PixelRect {
    PixelRect {
        x,
        y,
        width,
        height,
    }
}

fn allocated(dev: &mut HeadlessDevice, use_surface: bool) -> RootSurface {
    let mut root = RootSurface::new();
    root.set_use_surface(dev, use_surface).unwrap();
    assert!(
        root.resize(dev, PixelSize::new(32, 24), true, ColorSpace::Srgb)
            .unwrap()
    );
    root
}

#[test]
fn nothing_is_allocated_until_resized() {
    let mut dev = HeadlessDevice::default();
    let mut root = RootSurface::new();
    assert_eq!(root.content(), None);
    assert!(root.begin_draw(&mut dev, None).is_err());
    assert!(root.present(&mut dev, PresentHints::default()).is_ok());

    assert!(
        root.resize(&mut dev, PixelSize::new(0, 10), true, ColorSpace::Srgb)
            .unwrap()
    );
    assert_eq!(root.content(), None);
}

#[test]
fn swap_chain_backing_follows_color_space() {
    let mut dev = HeadlessDevice::default();
    let mut root = allocated(&mut dev, false);
    let id = root.swap_chain().unwrap();
    let desc = dev.swap_chain(id).unwrap().desc;
    assert!(desc.is_root);
    assert_eq!(desc.format, SwapChainFormat::Bgra8);
    assert_eq!(desc.size, PixelSize::new(32, 24));
    assert_eq!(
        root.content(),
        Some(RootSurfaceContent::SwapChain {
            id,
            size: PixelSize::new(32, 24)
        })
    );

    assert!(
        !root
            .resize(&mut dev, PixelSize::new(32, 24), true, ColorSpace::Srgb)
            .unwrap()
    );
    assert_eq!(root.swap_chain(), Some(id));

    assert!(
        root.resize(&mut dev, PixelSize::new(32, 24), true, ColorSpace::Rec2020Pq)
            .unwrap()
    );
    let hdr = root.swap_chain().unwrap();
    assert_ne!(hdr, id);
    assert!(dev.swap_chain(id).is_none());
    assert_eq!(dev.swap_chain(hdr).unwrap().desc.format, SwapChainFormat::Rgb10A2);
}

#[test]
fn first_present_fills_both_buffers() {
    let mut dev = HeadlessDevice::default();
    let mut root = allocated(&mut dev, false);
    let id = root.swap_chain().unwrap();
    root.present(&mut dev, PresentHints::default()).unwrap();
    assert_eq!(dev.swap_chain(id).unwrap().present_count, 2);
    root.present(&mut dev, PresentHints::default()).unwrap();
    assert_eq!(dev.swap_chain(id).unwrap().present_count, 3);
}

#[test]
fn surface_backing_bumps_serial_per_draw() {
    let mut dev = HeadlessDevice::default();
    let mut root = allocated(&mut dev, true);
    let id = root.surface().unwrap();
    assert_eq!(root.swap_chain(), None);

    root.begin_draw(&mut dev, Some(rect(0, 0, 8, 8)))
        .unwrap();
    assert!(root.is_drawing());
    root.end_draw(&mut dev).unwrap();
    assert_eq!(
        root.content(),
        Some(RootSurfaceContent::Surface {
            id,
            serial: 1,
            size: PixelSize::new(32, 24)
        })
    );

    let presents = dev.present_count();
    root.present(&mut dev, PresentHints::default()).unwrap();
    assert_eq!(dev.present_count(), presents);
}

#[test]
fn switching_backing_reallocates() {
    let mut dev = HeadlessDevice::default();
    let mut root = allocated(&mut dev, false);
    let chain = root.swap_chain().unwrap();
    root.set_use_surface(&mut dev, true).unwrap();
    assert!(dev.swap_chain(chain).is_none());
    let surface = root.surface().unwrap();
    assert!(dev.surface_pixels_mut(surface).is_some());
    assert_eq!(root.size(), PixelSize::new(32, 24));
}

#[test]
fn drawing_blocks_resize_and_present() {
    let mut dev = HeadlessDevice::default();
    let mut root = allocated(&mut dev, false);
    root.begin_draw(&mut dev, None).unwrap();
    assert!(root.begin_draw(&mut dev, None).is_err());
    assert!(
        root.resize(&mut dev, PixelSize::new(8, 8), true, ColorSpace::Srgb)
            .is_err()
    );
    assert!(root.present(&mut dev, PresentHints::default()).is_err());
    assert!(root.set_use_surface(&mut dev, true).is_err());
    root.end_draw(&mut dev).unwrap();
    assert!(root.end_draw(&mut dev).is_err());
}

#[test]
fn update_rect_must_fit() {
    let mut dev = HeadlessDevice::default();
    let mut root = allocated(&mut dev, true);
    assert!(
        root.begin_draw(&mut dev, Some(rect(30, 0, 8, 8)))
            .is_err()
    );
    assert!(
        root.begin_draw(&mut dev, Some(rect(0, 0, 0, 8)))
            .is_err()
    );
    assert!(!root.is_drawing());
}

#[test]
fn release_drops_the_backing() {
    let mut dev = HeadlessDevice::default();
    let mut root = allocated(&mut dev, false);
    let id = root.swap_chain().unwrap();
    root.release(&mut dev).unwrap();
    assert_eq!(root.content(), None);
    assert!(dev.swap_chain(id).is_none());
    assert_eq!(dev.live_swap_chain_count(), 0);
}
