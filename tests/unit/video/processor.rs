use super::*;
use crate::device::headless::{HeadlessCounters, HeadlessDevice, HeadlessOpts};

fn sz(w: u32, h: u32) -> PixelSize {
    PixelSize::new(w, h)
}

#[test]
fn same_or_smaller_sizes_reuse_the_processor() {
    let mut dev = HeadlessDevice::default();
    let support = OverlaySupport::new();
    let mut cache = VideoProcessorCache::new();

    let first = cache
        .initialize_video_processor(&mut dev, &support, sz(100, 100), sz(50, 50), false)
        .unwrap();
    let again = cache
        .initialize_video_processor(&mut dev, &support, sz(100, 100), sz(50, 50), false)
        .unwrap();
    let smaller = cache
        .initialize_video_processor(&mut dev, &support, sz(64, 64), sz(10, 10), false)
        .unwrap();
    assert_eq!(first, again);
    assert_eq!(first, smaller);
    assert_eq!(
        HeadlessCounters::get(&dev.counters().video_processors_created),
        1
    );
    // The cached coverage is not shrunk by a smaller request.
    assert_eq!(cache.get(DynamicRange::Sdr).unwrap().input_size, sz(100, 100));
}

#[test]
fn a_larger_size_reallocates_exactly_once() {
    let mut dev = HeadlessDevice::default();
    let support = OverlaySupport::new();
    let mut cache = VideoProcessorCache::new();

    let first = cache
        .initialize_video_processor(&mut dev, &support, sz(100, 100), sz(50, 50), false)
        .unwrap();
    let bigger = cache
        .initialize_video_processor(&mut dev, &support, sz(100, 100), sz(51, 50), false)
        .unwrap();
    let same = cache
        .initialize_video_processor(&mut dev, &support, sz(100, 100), sz(51, 50), false)
        .unwrap();
    assert_ne!(first, bigger);
    assert_eq!(bigger, same);
    let counters = dev.counters();
    assert_eq!(HeadlessCounters::get(&counters.video_processors_created), 2);
    assert_eq!(HeadlessCounters::get(&counters.video_contexts_created), 1);
    assert_eq!(dev.live_video_processor_count(), 1);
}

#[test]
fn sdr_and_hdr_use_separate_slots() {
    let mut dev = HeadlessDevice::default();
    let support = OverlaySupport::new();
    let mut cache = VideoProcessorCache::new();
    let sdr = cache
        .initialize_video_processor(&mut dev, &support, sz(8, 8), sz(8, 8), false)
        .unwrap();
    let hdr = cache
        .initialize_video_processor(&mut dev, &support, sz(8, 8), sz(8, 8), true)
        .unwrap();
    assert_ne!(sdr, hdr);
    assert_ne!(
        cache.get(DynamicRange::Sdr).unwrap().context,
        cache.get(DynamicRange::Hdr).unwrap().context
    );
}

#[test]
fn context_failure_disables_overlays() {
    let mut dev = HeadlessDevice::new(HeadlessOpts {
        fail_video_context: true,
        ..HeadlessOpts::default()
    });
    let support = OverlaySupport::new();
    let mut cache = VideoProcessorCache::new();
    assert!(
        cache
            .get_or_create_video_processor(&mut dev, &support, DynamicRange::Sdr)
            .is_none()
    );
    assert!(!support.is_enabled());
}

#[test]
fn processor_failure_disables_overlays_and_keeps_the_context() {
    let mut dev = HeadlessDevice::new(HeadlessOpts {
        fail_video_processor: true,
        ..HeadlessOpts::default()
    });
    let support = OverlaySupport::new();
    let mut cache = VideoProcessorCache::new();
    assert!(
        cache
            .initialize_video_processor(&mut dev, &support, sz(4, 4), sz(4, 4), false)
            .is_none()
    );
    assert!(!support.is_enabled());
    let wrapper = cache.get(DynamicRange::Sdr).unwrap();
    assert_eq!(wrapper.processor, None);
    assert_eq!(wrapper.input_size, PixelSize::default());
}

#[test]
fn release_destroys_processors() {
    let mut dev = HeadlessDevice::default();
    let support = OverlaySupport::new();
    let mut cache = VideoProcessorCache::new();
    cache
        .initialize_video_processor(&mut dev, &support, sz(4, 4), sz(4, 4), false)
        .unwrap();
    cache
        .initialize_video_processor(&mut dev, &support, sz(4, 4), sz(4, 4), true)
        .unwrap();
    assert_eq!(dev.live_video_processor_count(), 2);
    cache.release(&mut dev);
    assert_eq!(dev.live_video_processor_count(), 0);
    assert!(cache.get(DynamicRange::Sdr).is_none());
}
