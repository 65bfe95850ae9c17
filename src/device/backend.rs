use crate::{
    device::types::{
        BlitRequest, DynamicRange, PixelRect, PresentHints, SamplingFilter, SurfaceId,
        SwapChainDesc, SwapChainId, TextureHandle, VideoContextId, VideoProcessorId, VisualContent,
        VisualId,
    },
    foundation::core::{Affine, PixelSize, Rect, RoundedRect, Vec2},
    foundation::error::OverlayResult,
    ink::renderer::InkTrail,
};

/// Retained visual tree of the OS compositor.
///
/// Mutations are buffered by the compositor and become visible together on [`commit`]. Property
/// setters only fail when the compositor is out of memory.
///
/// [`commit`]: CompositionDevice::commit
pub trait CompositionDevice {
    fn create_visual(&mut self) -> OverlayResult<VisualId>;

    fn destroy_visual(&mut self, visual: VisualId) -> OverlayResult<()>;

    /// Bind `visual` as the root of the window's composition target.
    fn set_root_visual(&mut self, visual: VisualId) -> OverlayResult<()>;

    /// Append `child` above all current children of `parent`.
    fn add_visual(&mut self, parent: VisualId, child: VisualId) -> OverlayResult<()>;

    fn remove_visual(&mut self, parent: VisualId, child: VisualId) -> OverlayResult<()>;

    fn remove_all_visuals(&mut self, parent: VisualId) -> OverlayResult<()>;

    fn set_offset(&mut self, visual: VisualId, offset: Vec2) -> OverlayResult<()>;

    fn set_transform(&mut self, visual: VisualId, transform: Affine) -> OverlayResult<()>;

    /// Rectangular clip in the visual's local space.
    fn set_clip(&mut self, visual: VisualId, clip: Option<Rect>) -> OverlayResult<()>;

    fn set_rounded_clip(
        &mut self,
        visual: VisualId,
        clip: Option<RoundedRect>,
    ) -> OverlayResult<()>;

    fn set_opacity(&mut self, visual: VisualId, opacity: f32) -> OverlayResult<()>;

    fn set_content(
        &mut self,
        visual: VisualId,
        content: Option<VisualContent>,
    ) -> OverlayResult<()>;

    fn set_interpolation(&mut self, visual: VisualId, filter: SamplingFilter)
    -> OverlayResult<()>;

    fn create_surface(&mut self, size: PixelSize, has_alpha: bool) -> OverlayResult<SurfaceId>;

    fn destroy_surface(&mut self, surface: SurfaceId) -> OverlayResult<()>;

    /// Open `update_rect` of `surface` for drawing.
    fn begin_draw(&mut self, surface: SurfaceId, update_rect: PixelRect) -> OverlayResult<()>;

    fn end_draw(&mut self, surface: SurfaceId) -> OverlayResult<()>;

    /// Replace the ink trail rendered by `visual`.
    fn update_ink_trail(&mut self, visual: VisualId, trail: &InkTrail) -> OverlayResult<()>;

    /// Atomically apply every buffered mutation.
    fn commit(&mut self) -> OverlayResult<()>;
}

/// Video-processing and swap-chain side of the device.
pub trait VideoDevice {
    fn create_video_context(&mut self, range: DynamicRange) -> OverlayResult<VideoContextId>;

    fn create_video_processor(
        &mut self,
        context: VideoContextId,
        input_size: PixelSize,
        output_size: PixelSize,
    ) -> OverlayResult<VideoProcessorId>;

    fn destroy_video_processor(&mut self, processor: VideoProcessorId) -> OverlayResult<()>;

    fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> OverlayResult<SwapChainId>;

    fn destroy_swap_chain(&mut self, swap_chain: SwapChainId) -> OverlayResult<()>;

    /// Copy CPU pixels into a (new or reused) staging texture.
    fn upload_pixels(
        &mut self,
        staging: Option<TextureHandle>,
        pixels: &image::RgbaImage,
    ) -> OverlayResult<TextureHandle>;

    fn blit(&mut self, processor: VideoProcessorId, request: &BlitRequest) -> OverlayResult<()>;

    fn present(&mut self, swap_chain: SwapChainId, hints: PresentHints) -> OverlayResult<()>;
}

/// Everything the layer tree needs from a backend.
pub trait OverlayBackend: CompositionDevice + VideoDevice {}

impl<T: CompositionDevice + VideoDevice + ?Sized> OverlayBackend for T {}
