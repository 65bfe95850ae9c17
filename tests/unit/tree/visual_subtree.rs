use super::*;
use crate::device::{
    headless::HeadlessDevice,
    types::{SurfaceId, SwapChainId},
};

fn update(content: Option<VisualContent>) -> SubtreeUpdate {
    SubtreeUpdate {
        z_order: 1,
        content,
        content_serial: 0,
        offset: Vec2::ZERO,
        transform: Affine::IDENTITY,
        clip_rect: None,
        rounded_corners: None,
        opacity: 1.0,
        nearest_neighbor_filter: false,
    }
}

#[test]
fn first_update_builds_the_node_chain() {
    let mut dev = HeadlessDevice::default();
    let mut subtree = VisualSubtree::new();
    assert_eq!(subtree.container(), None);
    assert_eq!(subtree.z_order(), None);

    assert!(subtree.update(&mut dev, &update(None)).unwrap());
    let container = subtree.container().unwrap();
    assert_eq!(dev.live_visual_count(), 4);

    // clip -> rounded corners -> transform -> content
    let mut node = container;
    for _ in 0..3 {
        let children = &dev.visual(node).unwrap().children;
        assert_eq!(children.len(), 1);
        node = children[0];
    }
    assert!(dev.visual(node).unwrap().children.is_empty());
    assert_eq!(subtree.z_order(), Some(1));
}

#[test]
fn identical_update_touches_nothing() {
    let mut dev = HeadlessDevice::default();
    let mut subtree = VisualSubtree::new();
    let u = update(Some(VisualContent::SwapChain(SwapChainId(5))));
    subtree.update(&mut dev, &u).unwrap();
    let mutations = dev.visual_mutation_count();
    assert!(!subtree.update(&mut dev, &u).unwrap());
    assert_eq!(dev.visual_mutation_count(), mutations);
}

#[test]
fn each_changed_field_is_pushed_alone() {
    let mut dev = HeadlessDevice::default();
    let mut subtree = VisualSubtree::new();
    let mut u = update(None);
    subtree.update(&mut dev, &u).unwrap();

    u.offset = Vec2::new(3.0, 4.0);
    let before = dev.visual_mutation_count();
    assert!(subtree.update(&mut dev, &u).unwrap());
    assert_eq!(dev.visual_mutation_count(), before + 1);

    u.clip_rect = Some(Rect::new(0.0, 0.0, 10.0, 10.0));
    u.opacity = 0.5;
    let before = dev.visual_mutation_count();
    assert!(subtree.update(&mut dev, &u).unwrap());
    assert_eq!(dev.visual_mutation_count(), before + 2);

    let container = subtree.container().unwrap();
    let clip_node = dev.visual(container).unwrap();
    assert_eq!(clip_node.clip, Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
    assert_eq!(clip_node.opacity, 0.5);
    assert_eq!(
        subtree.visual_info(),
        VisualInfo {
            transform: Affine::IDENTITY,
            offset: Vec2::new(3.0, 4.0),
            clip_rect: Some(Rect::new(0.0, 0.0, 10.0, 10.0)),
        }
    );
}

#[test]
fn z_order_is_remembered_but_not_applied() {
    let mut dev = HeadlessDevice::default();
    let mut subtree = VisualSubtree::new();
    let mut u = update(None);
    subtree.update(&mut dev, &u).unwrap();
    u.z_order = 7;
    assert!(!subtree.update(&mut dev, &u).unwrap());
    assert_eq!(subtree.z_order(), Some(7));
}

#[test]
fn surface_serial_change_resets_content() {
    let mut dev = HeadlessDevice::default();
    let mut subtree = VisualSubtree::new();
    let mut u = update(Some(VisualContent::Surface(SurfaceId(9))));
    subtree.update(&mut dev, &u).unwrap();
    assert!(!subtree.update(&mut dev, &u).unwrap());
    u.content_serial = 1;
    assert!(subtree.update(&mut dev, &u).unwrap());
}

#[test]
fn swap_chain_serial_is_ignored() {
    let mut dev = HeadlessDevice::default();
    let mut subtree = VisualSubtree::new();
    let mut u = update(Some(VisualContent::SwapChain(SwapChainId(9))));
    subtree.update(&mut dev, &u).unwrap();
    u.content_serial = 4;
    assert!(!subtree.update(&mut dev, &u).unwrap());
}

#[test]
fn filter_and_rounded_corners_land_on_their_nodes() {
    let mut dev = HeadlessDevice::default();
    let mut subtree = VisualSubtree::new();
    let mut u = update(None);
    u.nearest_neighbor_filter = true;
    u.rounded_corners = Some(RoundedRect::new(0.0, 0.0, 10.0, 10.0, 2.0));
    subtree.update(&mut dev, &u).unwrap();

    let rounded = dev.visual(subtree.container().unwrap()).unwrap().children[0];
    assert_eq!(dev.visual(rounded).unwrap().rounded_clip, u.rounded_corners);
    let transform = dev.visual(rounded).unwrap().children[0];
    let content = dev.visual(transform).unwrap().children[0];
    assert_eq!(dev.visual(content).unwrap().filter, SamplingFilter::NearestNeighbor);
}

#[test]
fn release_destroys_all_nodes() {
    let mut dev = HeadlessDevice::default();
    let mut subtree = VisualSubtree::new();
    subtree.update(&mut dev, &update(None)).unwrap();
    subtree.release(&mut dev).unwrap();
    assert_eq!(dev.live_visual_count(), 0);
    assert_eq!(subtree.container(), None);
}
