use std::{collections::HashMap, sync::mpsc};

use crate::{
    device::{
        backend::OverlayBackend,
        scope::ScopedDevice,
        types::{SurfaceId, SwapChainId, VideoProcessorId, VisualContent, VisualId},
    },
    foundation::core::{PixelSize, Rect},
    foundation::error::{OverlayError, OverlayResult},
    foundation::math::split_integral_translation,
    ink::renderer::{DEFAULT_MAX_INK_POINTS, DelegatedInkRenderer, InkMetadata, InkPoint},
    overlay::params::{OverlayImage, OverlayKey, OverlayParams, assign_keys},
    overlay::support::OverlaySupport,
    tree::visual_subtree::{SubtreeUpdate, VisualInfo, VisualSubtree},
    video::processor::VideoProcessorCache,
    video::swap_chain::{PresentOutcome, SwapChainPresenter, pass_through_outcome},
};

/// Capabilities and policy knobs of the overlay path.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LayerTreeOpts {
    /// Swap chains may be smaller than their on-screen bounds and stretched by the compositor.
    pub scaled_overlays_supported: bool,
    /// Never size a swap chain below its on-screen bounds.
    pub no_downscaled_overlay_promotion: bool,
    pub nv12_supported: bool,
    pub yuy2_supported: bool,
    /// Keep the video processor at 1:1 and let the visual transform do all scaling.
    pub disable_vp_scaling: bool,
    pub max_ink_points: usize,
}

impl Default for LayerTreeOpts {
    fn default() -> Self {
        Self {
            scaled_overlays_supported: true,
            no_downscaled_overlay_promotion: false,
            nv12_supported: true,
            yuy2_supported: true,
            disable_vp_scaling: false,
            max_ink_points: DEFAULT_MAX_INK_POINTS,
        }
    }
}

/// The window's own back buffer, composited at z-order 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootSurfaceContent {
    SwapChain { id: SwapChainId, size: PixelSize },
    /// `serial` changes whenever the surface was redrawn in place.
    Surface { id: SurfaceId, serial: u64, size: PixelSize },
}

impl RootSurfaceContent {
    /// Handle identity, ignoring redraw serials.
    pub fn handle(&self) -> VisualContent {
        match *self {
            Self::SwapChain { id, .. } => VisualContent::SwapChain(id),
            Self::Surface { id, .. } => VisualContent::Surface(id),
        }
    }

    pub fn size(&self) -> PixelSize {
        match *self {
            Self::SwapChain { size, .. } | Self::Surface { size, .. } => size,
        }
    }

    fn to_params(self) -> OverlayParams {
        let image = match self {
            Self::SwapChain { id, .. } => OverlayImage::SwapChain(id),
            Self::Surface { id, serial, .. } => OverlayImage::DCompSurface { surface: id, serial },
        };
        let size = self.size().to_size();
        OverlayParams::new(0, Rect::from_origin_size((0.0, 0.0), size)).with_image(image)
    }
}

/// Reconciles each frame's overlay list into the compositor's retained visual tree.
///
/// Overlays are scheduled with [`DCLayerTree::schedule_dc_layer`] and applied together by
/// [`DCLayerTree::commit_and_clear_pending_overlays`]. Subtrees and swap-chain presenters persist
/// across frames keyed by [`OverlayKey`]; the root's child list is only rebuilt when ordering or
/// membership changes, and the device is only committed when something changed.
pub struct DCLayerTree<B: OverlayBackend> {
    device: ScopedDevice<B>,
    opts: LayerTreeOpts,
    support: OverlaySupport,
    root_visual: VisualId,

    pending: Vec<OverlayParams>,
    presenters: HashMap<OverlayKey, SwapChainPresenter>,
    /// Non-root keys of the last frame, in z-order.
    presenter_order: Vec<OverlayKey>,
    subtrees: HashMap<OverlayKey, VisualSubtree>,
    /// Keys of the last frame, in z-order; equals the root's child order after a rebuild.
    subtree_order: Vec<OverlayKey>,
    /// Dropped subtrees whose visuals are destroyed after the next rebuild detaches them.
    retired: Vec<VisualSubtree>,
    root_surface_visual: Option<VisualId>,
    last_root_content: Option<VisualContent>,
    needs_rebuild: bool,

    video_processors: VideoProcessorCache,
    ink: DelegatedInkRenderer,
    ink_parent: Option<VisualId>,
    ink_needs_commit: bool,
    frame_rate: f32,
}

impl<B: OverlayBackend> DCLayerTree<B> {
    /// Take ownership of `device` and bind a fresh root visual to it.
    pub fn new(device: B, opts: LayerTreeOpts, support: OverlaySupport) -> OverlayResult<Self> {
        let mut device = ScopedDevice::new(device);
        let root_visual = device.create_visual()?;
        device.set_root_visual(root_visual)?;
        let ink = DelegatedInkRenderer::new(opts.max_ink_points);
        Ok(Self {
            device,
            opts,
            support,
            root_visual,
            pending: Vec::new(),
            presenters: HashMap::new(),
            presenter_order: Vec::new(),
            subtrees: HashMap::new(),
            subtree_order: Vec::new(),
            retired: Vec::new(),
            root_surface_visual: None,
            last_root_content: None,
            needs_rebuild: false,
            video_processors: VideoProcessorCache::new(),
            ink,
            ink_parent: None,
            ink_needs_commit: false,
            frame_rate: 0.0,
        })
    }

    pub fn opts(&self) -> &LayerTreeOpts {
        &self.opts
    }

    pub fn support(&self) -> &OverlaySupport {
        &self.support
    }

    pub fn root_visual(&self) -> VisualId {
        self.root_visual
    }

    pub fn device(&self) -> &B {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut B {
        &mut self.device
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Queue `params` for the next commit. Returns false only if the queue cannot grow.
    pub fn schedule_dc_layer(&mut self, params: OverlayParams) -> bool {
        if self.pending.try_reserve(1).is_err() {
            tracing::warn!("overlay queue allocation failed");
            return false;
        }
        self.pending.push(params);
        true
    }

    /// Drop every queued overlay without touching the compositor.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Apply this frame's overlays (plus `root_surface` at z-order 0) to the visual tree.
    ///
    /// The pending queue is always drained. Any failure fails the whole frame and forces a full
    /// rebuild on the next one.
    #[tracing::instrument(skip_all)]
    pub fn commit_and_clear_pending_overlays(
        &mut self,
        root_surface: Option<RootSurfaceContent>,
    ) -> OverlayResult<()> {
        let overlays = std::mem::take(&mut self.pending);
        let result = self.reconcile(overlays, root_surface);
        match &result {
            Ok(()) => self.needs_rebuild = false,
            Err(err) => {
                tracing::warn!(%err, "overlay commit failed");
                self.needs_rebuild = true;
            }
        }
        result
    }

    fn reconcile(
        &mut self,
        mut overlays: Vec<OverlayParams>,
        root_surface: Option<RootSurfaceContent>,
    ) -> OverlayResult<()> {
        let root_content = root_surface.map(|r| r.handle());
        if root_content != self.last_root_content {
            self.needs_rebuild = true;
            self.last_root_content = root_content;
        }

        if let Some(root) = root_surface {
            overlays.push(root.to_params());
        }
        for params in &overlays {
            params.validate()?;
        }
        overlays.sort_by_key(|p| p.z_order);
        let keys = assign_keys(&overlays)?;
        tracing::debug!(overlays = overlays.len(), "reconciling overlays");

        let outcomes = self.present_overlays(&overlays, &keys)?;
        let mut needs_commit = self.update_subtrees(&overlays, &keys, &outcomes)?;

        self.root_surface_visual = self
            .subtrees
            .get(&OverlayKey::RootSurface)
            .and_then(VisualSubtree::container);
        if self.ink.has_been_initialized() && self.ink_parent != self.root_surface_visual {
            self.needs_rebuild = true;
        }

        if self.needs_rebuild {
            self.rebuild_visual_tree(&keys)?;
            needs_commit = true;
        }
        self.subtree_order = keys;

        if needs_commit || self.ink_needs_commit {
            self.device.flush()?;
            self.ink_needs_commit = false;
            tracing::trace!("committed overlay tree");
        }
        Ok(())
    }

    /// One presenter per non-root key, each presented in z-order.
    fn present_overlays(
        &mut self,
        overlays: &[OverlayParams],
        keys: &[OverlayKey],
    ) -> OverlayResult<Vec<PresentOutcome>> {
        let presenter_keys: Vec<OverlayKey> = keys
            .iter()
            .copied()
            .filter(|k| *k != OverlayKey::RootSurface)
            .collect();
        if presenter_keys != self.presenter_order {
            self.needs_rebuild = true;
        }

        let device = &mut *self.device;
        let mut outcomes = Vec::with_capacity(overlays.len());
        for (params, key) in overlays.iter().zip(keys) {
            if *key == OverlayKey::RootSurface {
                outcomes.push(pass_through_outcome(params));
                continue;
            }
            let presenter = self
                .presenters
                .entry(*key)
                .or_insert_with(|| SwapChainPresenter::new(self.frame_rate));
            let outcome = presenter.present_to_swap_chain(
                device,
                &mut self.video_processors,
                &self.support,
                &self.opts,
                params,
            )?;
            outcomes.push(outcome);
        }

        // Committed visuals still reference the old swap chains until this frame has presented.
        let stale: Vec<OverlayKey> = self
            .presenters
            .keys()
            .copied()
            .filter(|k| !presenter_keys.contains(k))
            .collect();
        for key in stale {
            if let Some(mut presenter) = self.presenters.remove(&key) {
                presenter.release(device)?;
            }
        }
        self.presenter_order = presenter_keys;
        Ok(outcomes)
    }

    /// One subtree per key, updated from the presenter outcome.
    fn update_subtrees(
        &mut self,
        overlays: &[OverlayParams],
        keys: &[OverlayKey],
        outcomes: &[PresentOutcome],
    ) -> OverlayResult<bool> {
        if keys != self.subtree_order.as_slice() {
            self.needs_rebuild = true;
        }
        let stale: Vec<OverlayKey> = self
            .subtrees
            .keys()
            .copied()
            .filter(|k| !keys.contains(k))
            .collect();
        for key in stale {
            if let Some(subtree) = self.subtrees.remove(&key) {
                self.retired.push(subtree);
            }
        }

        let device = &mut *self.device;
        let mut needs_commit = false;
        for ((params, key), outcome) in overlays.iter().zip(keys).zip(outcomes) {
            let subtree = self.subtrees.entry(*key).or_default();
            if subtree.z_order() != Some(params.z_order) {
                self.needs_rebuild = true;
            }
            let (offset, transform) = split_integral_translation(outcome.transform);
            let update = SubtreeUpdate {
                z_order: params.z_order,
                content: outcome.content,
                content_serial: outcome.content_serial,
                offset,
                transform,
                clip_rect: outcome.clip_rect,
                rounded_corners: params.rounded_corner_bounds,
                opacity: params.opacity,
                nearest_neighbor_filter: params.nearest_neighbor_filter,
            };
            needs_commit |= subtree.update(device, &update)?;
        }
        Ok(needs_commit)
    }

    /// Re-add every container in z-order, then put the ink visual back on top of the root surface.
    fn rebuild_visual_tree(&mut self, keys: &[OverlayKey]) -> OverlayResult<()> {
        let device = &mut *self.device;
        device.remove_all_visuals(self.root_visual)?;
        for key in keys {
            if let Some(container) = self.subtrees.get(key).and_then(VisualSubtree::container) {
                device.add_visual(self.root_visual, container)?;
            }
        }

        if let Some(ink_visual) = self.ink.visual()
            && self.ink_parent != self.root_surface_visual
        {
            if let Some(old_parent) = self.ink_parent.take() {
                device.remove_visual(old_parent, ink_visual)?;
            }
            if let Some(parent) = self.root_surface_visual {
                device.add_visual(parent, ink_visual)?;
                self.ink_parent = Some(parent);
            }
        }

        for mut subtree in self.retired.drain(..) {
            subtree.release(device)?;
        }
        tracing::debug!(children = keys.len(), "rebuilt visual tree");
        Ok(())
    }

    /// Processor able to convert `input_size` into `output_size`, or `None` when hardware
    /// overlays had to be disabled.
    pub fn initialize_video_processor(
        &mut self,
        input_size: PixelSize,
        output_size: PixelSize,
        is_hdr: bool,
    ) -> Option<VideoProcessorId> {
        self.video_processors.initialize_video_processor(
            &mut *self.device,
            &self.support,
            input_size,
            output_size,
            is_hdr,
        )
    }

    pub fn video_processors(&self) -> &VideoProcessorCache {
        &self.video_processors
    }

    pub fn set_frame_rate(&mut self, frame_rate: f32) {
        self.frame_rate = frame_rate;
        for presenter in self.presenters.values_mut() {
            presenter.set_frame_rate(frame_rate);
        }
    }

    /// Create the ink visual and return the channel pointer points are delivered on.
    ///
    /// The visual is attached above the root surface at the next commit.
    pub fn init_delegated_ink_point_renderer_receiver(
        &mut self,
    ) -> OverlayResult<mpsc::Sender<InkPoint>> {
        if !self.ink.has_been_initialized() {
            self.ink.initialize(&mut *self.device)?;
            self.needs_rebuild = true;
        }
        Ok(self.ink.bind_receiver())
    }

    pub fn set_delegated_ink_trail_start_point(&mut self, metadata: InkMetadata) -> OverlayResult<()> {
        if !self.ink.has_been_initialized() {
            return Err(OverlayError::validation(
                "delegated ink trail requested before the point receiver was initialized",
            ));
        }
        if self.root_surface_visual.is_none() {
            return Err(OverlayError::validation(
                "delegated ink needs a root surface visual to attach to",
            ));
        }
        if self.ink.set_trail_start_point(&mut *self.device, metadata)? {
            self.ink_needs_commit = true;
        }
        Ok(())
    }

    pub fn ink_renderer(&self) -> &DelegatedInkRenderer {
        &self.ink
    }

    /// Parent of the ink visual after the last rebuild.
    pub fn ink_parent(&self) -> Option<VisualId> {
        self.ink_parent
    }

    /// Destroy every subtree, presenter and processor. The root visual stays bound.
    pub fn release_resources(&mut self) -> OverlayResult<()> {
        let device = &mut *self.device;
        device.remove_all_visuals(self.root_visual)?;

        if let Some(ink_visual) = self.ink.visual()
            && let Some(parent) = self.ink_parent.take()
        {
            device.remove_visual(parent, ink_visual)?;
        }
        self.ink.release(device)?;

        for (_, mut presenter) in self.presenters.drain() {
            presenter.release(device)?;
        }
        for (_, mut subtree) in self.subtrees.drain() {
            subtree.release(device)?;
        }
        for mut subtree in self.retired.drain(..) {
            subtree.release(device)?;
        }
        self.video_processors.release(device);

        self.presenter_order.clear();
        self.subtree_order.clear();
        self.root_surface_visual = None;
        self.last_root_content = None;
        self.pending.clear();
        self.needs_rebuild = true;
        Ok(())
    }

    /// Commit now instead of waiting for the drop-time flush.
    pub fn flush(&mut self) -> OverlayResult<()> {
        self.device.flush()
    }

    /// Consume the tree with one last commit of the device.
    pub fn finish(self) -> OverlayResult<()> {
        self.device.finish()
    }

    pub fn visual_subtree_count(&self) -> usize {
        self.subtrees.len()
    }

    /// Container of the z-order 0 subtree after the last commit.
    pub fn root_surface_visual(&self) -> Option<VisualId> {
        self.root_surface_visual
    }

    /// Containers attached to the root, in the order the last commit applied.
    pub fn ordered_containers(&self) -> Vec<VisualId> {
        self.subtree_order
            .iter()
            .filter_map(|k| self.subtrees.get(k).and_then(VisualSubtree::container))
            .collect()
    }

    /// Swap chain of the `index`-th non-root overlay of the last frame, in z-order.
    pub fn layer_swap_chain_for_testing(&self, index: usize) -> Option<SwapChainId> {
        let key = self.presenter_order.get(index)?;
        self.presenters.get(key)?.swap_chain()
    }

    pub fn layer_presenter_for_testing(&self, index: usize) -> Option<&SwapChainPresenter> {
        let key = self.presenter_order.get(index)?;
        self.presenters.get(key)
    }

    /// Placement of the `index`-th subtree of the last frame (root surface included), in z-order.
    pub fn swap_chain_visual_info_for_testing(&self, index: usize) -> Option<VisualInfo> {
        let key = self.subtree_order.get(index)?;
        Some(self.subtrees.get(key)?.visual_info())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tree/layer_tree.rs"]
mod tests;
