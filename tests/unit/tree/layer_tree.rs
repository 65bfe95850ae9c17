use super::*;
use crate::{
    device::{
        headless::{HeadlessDevice, HeadlessOpts},
        types::{TextureFormat, TextureHandle},
    },
    foundation::core::{Point, Rgba8Premul, Vec2},
};

fn tree_with(dev: HeadlessDevice) -> DCLayerTree<HeadlessDevice> {
    DCLayerTree::new(dev, LayerTreeOpts::default(), OverlaySupport::new()).unwrap()
}

fn tree() -> DCLayerTree<HeadlessDevice> {
    tree_with(HeadlessDevice::default())
}

fn texture(tree: &mut DCLayerTree<HeadlessDevice>) -> TextureHandle {
    tree.device_mut().import_solid_texture(
        PixelSize::new(16, 16),
        Rgba8Premul::opaque(10, 20, 30),
        TextureFormat::Bgra8,
    )
}

fn video(tex: TextureHandle, z_order: i32, x: f64) -> OverlayParams {
    OverlayParams::new(z_order, Rect::new(x, 0.0, x + 16.0, 16.0))
        .with_image(OverlayImage::Texture(tex))
        .with_content_rect(Rect::new(0.0, 0.0, 16.0, 16.0))
}

fn root() -> RootSurfaceContent {
    RootSurfaceContent::SwapChain {
        id: SwapChainId(9000),
        size: PixelSize::new(64, 64),
    }
}

fn commits(tree: &DCLayerTree<HeadlessDevice>) -> u64 {
    tree.device().commit_count()
}

#[test]
fn empty_frame_without_root_does_not_commit() {
    let mut tree = tree();
    tree.commit_and_clear_pending_overlays(None).unwrap();
    assert_eq!(commits(&tree), 0);
    assert_eq!(tree.visual_subtree_count(), 0);
}

#[test]
fn children_follow_z_order_with_root_surface_in_place() {
    let mut tree = tree();
    let tex = texture(&mut tree);
    for (z, x) in [(5, 0.0), (-2, 16.0), (3, 32.0)] {
        assert!(tree.schedule_dc_layer(video(tex, z, x)));
    }
    tree.commit_and_clear_pending_overlays(Some(root())).unwrap();

    assert_eq!(tree.visual_subtree_count(), 4);
    let children = tree
        .device()
        .visual(tree.root_visual())
        .unwrap()
        .children
        .to_vec();
    assert_eq!(children, tree.ordered_containers());
    assert_eq!(Some(children[1]), tree.root_surface_visual());

    let offsets: Vec<Vec2> = (0..4)
        .map(|i| tree.swap_chain_visual_info_for_testing(i).unwrap().offset)
        .collect();
    assert_eq!(
        offsets,
        vec![
            Vec2::new(16.0, 0.0),
            Vec2::ZERO,
            Vec2::new(32.0, 0.0),
            Vec2::ZERO,
        ]
    );
}

#[test]
fn equal_z_orders_keep_submission_order() {
    let mut tree = tree();
    let tex = texture(&mut tree);
    tree.schedule_dc_layer(video(tex, 2, 32.0).with_layer_id(20));
    tree.schedule_dc_layer(video(tex, 2, 16.0).with_layer_id(10));
    tree.commit_and_clear_pending_overlays(None).unwrap();
    assert_eq!(
        tree.swap_chain_visual_info_for_testing(0).unwrap().offset,
        Vec2::new(32.0, 0.0)
    );
    assert_eq!(
        tree.swap_chain_visual_info_for_testing(1).unwrap().offset,
        Vec2::new(16.0, 0.0)
    );
}

#[test]
fn steady_state_skips_commit() {
    let mut tree = tree();
    let tex = texture(&mut tree);
    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.commit_and_clear_pending_overlays(Some(root())).unwrap();
    assert_eq!(commits(&tree), 1);

    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.commit_and_clear_pending_overlays(Some(root())).unwrap();
    assert_eq!(commits(&tree), 1);

    tree.schedule_dc_layer(video(tex, 1, 8.0));
    tree.commit_and_clear_pending_overlays(Some(root())).unwrap();
    assert_eq!(commits(&tree), 2);
}

#[test]
fn root_content_change_rebuilds_and_commits() {
    let mut tree = tree();
    tree.commit_and_clear_pending_overlays(Some(root())).unwrap();
    let first_root = tree.root_surface_visual();
    let other = RootSurfaceContent::SwapChain {
        id: SwapChainId(9001),
        size: PixelSize::new(64, 64),
    };
    tree.commit_and_clear_pending_overlays(Some(other)).unwrap();
    assert_eq!(commits(&tree), 2);
    // Same key, so the subtree survives and only its content changes.
    assert_eq!(tree.root_surface_visual(), first_root);
}

#[test]
fn stable_ids_keep_swap_chains_across_membership_changes() {
    let mut tree = tree();
    let tex = texture(&mut tree);
    tree.schedule_dc_layer(video(tex, 1, 0.0).with_layer_id(1));
    tree.schedule_dc_layer(video(tex, 2, 16.0).with_layer_id(2));
    tree.commit_and_clear_pending_overlays(None).unwrap();
    let chain_of_2 = tree.layer_swap_chain_for_testing(1).unwrap();
    let presents = tree.device().present_count();

    tree.schedule_dc_layer(video(tex, 2, 16.0).with_layer_id(2));
    tree.commit_and_clear_pending_overlays(None).unwrap();
    assert_eq!(tree.layer_swap_chain_for_testing(0), Some(chain_of_2));
    assert_eq!(tree.device().present_count(), presents);
    assert_eq!(tree.device().live_swap_chain_count(), 1);
    assert_eq!(tree.visual_subtree_count(), 1);
}

#[test]
fn dropped_subtrees_are_destroyed_after_detach() {
    let mut tree = tree();
    let tex = texture(&mut tree);
    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.schedule_dc_layer(video(tex, 2, 16.0));
    tree.commit_and_clear_pending_overlays(None).unwrap();
    assert_eq!(tree.device().live_visual_count(), 1 + 8);

    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.commit_and_clear_pending_overlays(None).unwrap();
    assert_eq!(tree.device().live_visual_count(), 1 + 4);
    assert_eq!(
        tree.device().visual(tree.root_visual()).unwrap().children.len(),
        1
    );
}

#[test]
fn second_root_surface_is_rejected_and_queue_drained() {
    let mut tree = tree();
    let tex = texture(&mut tree);
    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.commit_and_clear_pending_overlays(Some(root())).unwrap();
    let baseline = commits(&tree);

    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.schedule_dc_layer(video(tex, 0, 0.0));
    let err = tree.commit_and_clear_pending_overlays(Some(root())).unwrap_err();
    assert!(matches!(err, OverlayError::Validation(_)));
    assert_eq!(tree.pending_count(), 0);
    assert_eq!(commits(&tree), baseline);

    // Unchanged content, but the failed frame forces a rebuild and commit.
    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.commit_and_clear_pending_overlays(Some(root())).unwrap();
    assert_eq!(commits(&tree), baseline + 1);
}

#[test]
fn presenter_failure_fails_the_frame_without_commit() {
    let mut tree = tree_with(HeadlessDevice::new(HeadlessOpts {
        fail_presents: 1,
        ..HeadlessOpts::default()
    }));
    let tex = texture(&mut tree);
    tree.schedule_dc_layer(video(tex, 1, 0.0));
    let err = tree.commit_and_clear_pending_overlays(None).unwrap_err();
    assert!(matches!(err, OverlayError::Present(_)));
    assert_eq!(commits(&tree), 0);
    assert_eq!(tree.pending_count(), 0);

    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.commit_and_clear_pending_overlays(None).unwrap();
    assert_eq!(commits(&tree), 1);
}

#[test]
fn failed_present_keeps_previous_frame_swap_chains() {
    let mut tree = tree();
    let tex = texture(&mut tree);
    tree.schedule_dc_layer(video(tex, 1, 0.0).with_layer_id(1));
    tree.commit_and_clear_pending_overlays(None).unwrap();
    let chain = tree.layer_swap_chain_for_testing(0).unwrap();

    tree.device_mut().opts_mut().fail_presents = 1;
    tree.schedule_dc_layer(video(tex, 1, 0.0).with_layer_id(2));
    assert!(tree.commit_and_clear_pending_overlays(None).is_err());
    assert_eq!(commits(&tree), 1);
    assert_eq!(tree.layer_swap_chain_for_testing(0), Some(chain));
    assert!(tree.device().swap_chain(chain).is_some());

    tree.schedule_dc_layer(video(tex, 1, 0.0).with_layer_id(2));
    tree.commit_and_clear_pending_overlays(None).unwrap();
    assert_ne!(tree.layer_swap_chain_for_testing(0), Some(chain));
    assert!(tree.device().swap_chain(chain).is_none());
}

#[test]
fn commit_failure_is_reported() {
    let mut tree = tree_with(HeadlessDevice::new(HeadlessOpts {
        fail_commits: 1,
        ..HeadlessOpts::default()
    }));
    let tex = texture(&mut tree);
    tree.schedule_dc_layer(video(tex, 1, 0.0));
    let err = tree.commit_and_clear_pending_overlays(None).unwrap_err();
    assert!(matches!(err, OverlayError::Commit(_)));
}

#[test]
fn invalid_geometry_is_rejected() {
    let mut tree = tree();
    tree.schedule_dc_layer(OverlayParams::new(1, Rect::new(0.0, 0.0, f64::NAN, 1.0)));
    assert!(tree.commit_and_clear_pending_overlays(None).is_err());
}

#[test]
fn ink_visual_sits_on_top_of_the_root_surface() {
    let mut tree = tree();
    let tex = texture(&mut tree);
    let _sender = tree.init_delegated_ink_point_renderer_receiver().unwrap();
    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.commit_and_clear_pending_overlays(Some(root())).unwrap();

    let ink = tree.ink_renderer().visual().unwrap();
    let root_visual = tree.root_surface_visual().unwrap();
    assert_eq!(tree.ink_parent(), Some(root_visual));
    let children = &tree.device().visual(root_visual).unwrap().children;
    assert_eq!(children.last(), Some(&ink));

    // A trail update alone is enough to commit.
    let before = commits(&tree);
    tree.set_delegated_ink_trail_start_point(InkMetadata {
        point: Point::new(4.0, 4.0),
        diameter: 2.0,
        color: Rgba8Premul::opaque(0, 0, 0),
        timestamp_us: 1,
        presentation_area: Rect::new(0.0, 0.0, 64.0, 64.0),
    })
    .unwrap();
    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.commit_and_clear_pending_overlays(Some(root())).unwrap();
    assert_eq!(commits(&tree), before + 1);
}

#[test]
fn ink_needs_a_root_surface() {
    let mut tree = tree();
    let _sender = tree.init_delegated_ink_point_renderer_receiver().unwrap();
    tree.commit_and_clear_pending_overlays(None).unwrap();
    let err = tree
        .set_delegated_ink_trail_start_point(InkMetadata {
            point: Point::ORIGIN,
            diameter: 1.0,
            color: Rgba8Premul::opaque(0, 0, 0),
            timestamp_us: 0,
            presentation_area: Rect::new(0.0, 0.0, 1.0, 1.0),
        })
        .unwrap_err();
    assert!(matches!(err, OverlayError::Validation(_)));
}

#[test]
fn frame_rate_reaches_existing_presenters() {
    let mut tree = tree();
    let tex = texture(&mut tree);
    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.commit_and_clear_pending_overlays(None).unwrap();
    tree.set_frame_rate(25.0);
    let other = texture(&mut tree);
    tree.schedule_dc_layer(video(other, 1, 0.0));
    tree.commit_and_clear_pending_overlays(None).unwrap();

    let chain = tree.layer_swap_chain_for_testing(0).unwrap();
    let hints = tree.device().swap_chain(chain).unwrap().last_hints.unwrap();
    assert!((hints.present_duration.as_secs_f64() - 0.04).abs() < 1e-6);
}

#[test]
fn release_resources_leaves_only_the_root() {
    let mut tree = tree();
    let tex = texture(&mut tree);
    let _sender = tree.init_delegated_ink_point_renderer_receiver().unwrap();
    tree.schedule_dc_layer(video(tex, 1, 0.0));
    tree.commit_and_clear_pending_overlays(Some(root())).unwrap();
    assert!(
        tree.initialize_video_processor(PixelSize::new(4, 4), PixelSize::new(4, 4), true)
            .is_some()
    );

    tree.release_resources().unwrap();
    let dev = tree.device();
    assert_eq!(dev.live_visual_count(), 1);
    assert_eq!(dev.live_swap_chain_count(), 0);
    assert_eq!(dev.live_video_processor_count(), 0);
    assert_eq!(tree.visual_subtree_count(), 0);
    assert_eq!(tree.layer_swap_chain_for_testing(0), None);
}

#[test]
fn scheduling_only_queues() {
    let mut tree = tree();
    assert!(tree.schedule_dc_layer(OverlayParams::new(1, Rect::new(0.0, 0.0, 1.0, 1.0))));
    assert_eq!(tree.pending_count(), 1);
    tree.clear_pending();
    assert_eq!(tree.pending_count(), 0);
    assert_eq!(tree.device().visual_mutation_count(), 0);
}
