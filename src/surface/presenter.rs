use std::sync::mpsc;

use crate::{
    device::{
        backend::OverlayBackend,
        types::{PixelRect, PresentHints},
    },
    foundation::core::PixelSize,
    foundation::error::{OverlayError, OverlayResult},
    ink::renderer::{InkMetadata, InkPoint},
    overlay::params::{ColorSpace, OverlayParams},
    overlay::support::OverlaySupport,
    surface::root_surface::RootSurface,
    tree::layer_tree::{DCLayerTree, LayerTreeOpts},
};

/// Options for [`DCompPresenter`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SurfaceOpts {
    /// Accept hardware overlays; when off only the root surface is composited.
    pub enable_dc_layers: bool,
    /// Initial root surface size; empty defers allocation to the first [`DCompPresenter::resize`].
    pub root_size: PixelSize,
    pub root_has_alpha: bool,
    pub root_color_space: ColorSpace,
    pub layer_tree: LayerTreeOpts,
}

impl Default for SurfaceOpts {
    fn default() -> Self {
        Self {
            enable_dc_layers: true,
            root_size: PixelSize::default(),
            root_has_alpha: true,
            root_color_space: ColorSpace::Srgb,
            layer_tree: LayerTreeOpts::default(),
        }
    }
}

/// Outcome of a swap as seen by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapResult {
    Ack,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresenterStats {
    pub swaps: u64,
    pub failed_swaps: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenterState {
    Uninitialized,
    Initialized,
    Destroyed,
}

fn live_tree<B: OverlayBackend>(
    state: PresenterState,
    tree: &mut Option<DCLayerTree<B>>,
) -> OverlayResult<&mut DCLayerTree<B>> {
    match state {
        PresenterState::Uninitialized => {
            Err(OverlayError::validation("presenter used before initialize"))
        }
        PresenterState::Destroyed => Err(OverlayError::validation("presenter used after destroy")),
        PresenterState::Initialized => tree
            .as_mut()
            .ok_or_else(|| OverlayError::validation("presenter has no layer tree")),
    }
}

/// Per-window frame driver: root surface plus overlay layer tree.
///
/// Lifecycle is `Uninitialized -> Initialized -> Destroyed`. Between swaps any number of overlays
/// may be scheduled; each swap presents the root surface and then commits the overlays. Overlays
/// must be scheduled again every frame.
pub struct DCompPresenter<B: OverlayBackend> {
    opts: SurfaceOpts,
    support: OverlaySupport,
    state: PresenterState,
    tree: Option<DCLayerTree<B>>,
    root: RootSurface,
    enable_dc_layers: bool,
    frame_rate: f32,
    stats: PresenterStats,
}

impl<B: OverlayBackend> DCompPresenter<B> {
    pub fn new(opts: SurfaceOpts, support: OverlaySupport) -> Self {
        let enable_dc_layers = opts.enable_dc_layers;
        Self {
            opts,
            support,
            state: PresenterState::Uninitialized,
            tree: None,
            root: RootSurface::new(),
            enable_dc_layers,
            frame_rate: 0.0,
            stats: PresenterStats::default(),
        }
    }

    pub fn state(&self) -> PresenterState {
        self.state
    }

    pub fn stats(&self) -> PresenterStats {
        self.stats
    }

    pub fn support(&self) -> &OverlaySupport {
        &self.support
    }

    pub fn root_surface(&self) -> &RootSurface {
        &self.root
    }

    pub fn tree(&self) -> Option<&DCLayerTree<B>> {
        self.tree.as_ref()
    }

    pub fn tree_mut(&mut self) -> Option<&mut DCLayerTree<B>> {
        self.tree.as_mut()
    }

    pub fn device(&self) -> Option<&B> {
        self.tree.as_ref().map(DCLayerTree::device)
    }

    pub fn device_mut(&mut self) -> Option<&mut B> {
        self.tree.as_mut().map(DCLayerTree::device_mut)
    }

    /// Whether overlays scheduled now would be accepted.
    pub fn dc_layers_enabled(&self) -> bool {
        self.enable_dc_layers && self.support.is_enabled()
    }

    /// Bind the presenter to `device` and allocate the initial root surface.
    #[tracing::instrument(skip_all)]
    pub fn initialize(&mut self, device: B) -> OverlayResult<()> {
        if self.state != PresenterState::Uninitialized {
            return Err(OverlayError::validation("presenter is already initialized"));
        }
        let mut tree = DCLayerTree::new(device, self.opts.layer_tree.clone(), self.support.clone())?;
        tree.set_frame_rate(self.frame_rate);
        self.root
            .set_use_surface(tree.device_mut(), self.enable_dc_layers)?;
        if !self.opts.root_size.is_empty() {
            self.root.resize(
                tree.device_mut(),
                self.opts.root_size,
                self.opts.root_has_alpha,
                self.opts.root_color_space,
            )?;
        }
        self.tree = Some(tree);
        self.state = PresenterState::Initialized;
        tracing::debug!("presenter initialized");
        Ok(())
    }

    /// Reallocate the root surface if its size or format changed.
    pub fn resize(
        &mut self,
        size: PixelSize,
        has_alpha: bool,
        color_space: ColorSpace,
    ) -> OverlayResult<bool> {
        let tree = live_tree(self.state, &mut self.tree)?;
        self.root
            .resize(tree.device_mut(), size, has_alpha, color_space)
    }

    /// Open the root surface for producer drawing.
    pub fn begin_draw(&mut self, update_rect: Option<PixelRect>) -> OverlayResult<()> {
        let tree = live_tree(self.state, &mut self.tree)?;
        self.root.begin_draw(tree.device_mut(), update_rect)
    }

    pub fn end_draw(&mut self) -> OverlayResult<()> {
        let tree = live_tree(self.state, &mut self.tree)?;
        self.root.end_draw(tree.device_mut())
    }

    /// Queue an overlay for the next swap.
    ///
    /// Returns `Ok(false)` when overlays are disabled (by the caller or by a hardware failure) or
    /// the queue cannot grow.
    pub fn schedule_dc_layer(&mut self, params: OverlayParams) -> OverlayResult<bool> {
        let accept = self.dc_layers_enabled();
        let tree = live_tree(self.state, &mut self.tree)?;
        if !accept {
            return Ok(false);
        }
        Ok(tree.schedule_dc_layer(params))
    }

    /// Present the whole root surface and commit the scheduled overlays.
    #[tracing::instrument(skip_all)]
    pub fn swap_buffers(&mut self) -> SwapResult {
        self.finish_frame(None)
    }

    /// Like [`DCompPresenter::swap_buffers`], with only `rect` of the root surface damaged.
    #[tracing::instrument(skip(self))]
    pub fn post_sub_buffer(&mut self, rect: PixelRect) -> SwapResult {
        self.finish_frame(Some(rect))
    }

    fn finish_frame(&mut self, damage: Option<PixelRect>) -> SwapResult {
        self.stats.swaps += 1;
        match self.try_finish_frame(damage) {
            Ok(()) => SwapResult::Ack,
            Err(err) => {
                self.stats.failed_swaps += 1;
                tracing::error!(%err, "swap failed");
                if err.is_fatal_to_device() {
                    self.support.disable("device failure during swap");
                }
                SwapResult::Failed
            }
        }
    }

    fn try_finish_frame(&mut self, damage: Option<PixelRect>) -> OverlayResult<()> {
        let overlays_enabled = self.dc_layers_enabled();
        let tree = live_tree(self.state, &mut self.tree)?;
        if !overlays_enabled {
            tree.clear_pending();
        }
        if let Some(rect) = damage
            && !rect.fits_within(self.root.size())
        {
            tree.clear_pending();
            return Err(OverlayError::validation(format!(
                "damage rect {rect:?} outside root surface {:?}",
                self.root.size()
            )));
        }

        let hints = PresentHints::for_frame_rate(self.frame_rate, damage);
        if let Err(err) = self.root.present(tree.device_mut(), hints) {
            tree.clear_pending();
            return Err(err);
        }
        tree.commit_and_clear_pending_overlays(self.root.content())
    }

    /// Forward the content frame rate to every overlay swap chain.
    pub fn set_frame_rate(&mut self, frame_rate: f32) {
        self.frame_rate = frame_rate;
        if let Some(tree) = self.tree.as_mut() {
            tree.set_frame_rate(frame_rate);
        }
    }

    /// Turn overlay promotion on or off. The root surface switches between a compositor surface
    /// (overlays on) and a swap chain (overlays off).
    pub fn set_enable_dc_layers(&mut self, enable: bool) -> OverlayResult<()> {
        if self.state == PresenterState::Destroyed {
            return Err(OverlayError::validation("presenter used after destroy"));
        }
        self.enable_dc_layers = enable;
        if let Some(tree) = self.tree.as_mut() {
            self.root.set_use_surface(tree.device_mut(), enable)?;
            if !enable {
                tree.clear_pending();
            }
        }
        Ok(())
    }

    pub fn init_delegated_ink_point_renderer_receiver(
        &mut self,
    ) -> OverlayResult<mpsc::Sender<InkPoint>> {
        live_tree(self.state, &mut self.tree)?.init_delegated_ink_point_renderer_receiver()
    }

    pub fn set_delegated_ink_trail_start_point(&mut self, metadata: InkMetadata) -> OverlayResult<()> {
        live_tree(self.state, &mut self.tree)?.set_delegated_ink_trail_start_point(metadata)
    }

    /// Release the root surface and every overlay resource, then commit the device one last time.
    #[tracing::instrument(skip_all)]
    pub fn destroy(&mut self) -> OverlayResult<()> {
        if self.state == PresenterState::Destroyed {
            return Ok(());
        }
        self.state = PresenterState::Destroyed;
        let Some(mut tree) = self.tree.take() else {
            return Ok(());
        };
        let released = self
            .root
            .release(tree.device_mut())
            .and_then(|()| tree.release_resources());
        // Dropping the tree still flushes the device if the release failed part way.
        released?;
        tree.finish()
    }
}

impl<B: OverlayBackend> Drop for DCompPresenter<B> {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            tracing::warn!(%err, "presenter teardown failed");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surface/presenter.rs"]
mod tests;
