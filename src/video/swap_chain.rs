use crate::{
    device::{
        backend::VideoDevice,
        types::{
            BlitRequest, PresentHints, SwapChainDesc, SwapChainFormat, SwapChainId,
            TextureFormat, TextureHandle, VisualContent,
        },
    },
    foundation::core::{Affine, PixelSize, Rect},
    foundation::error::{OverlayError, OverlayResult},
    foundation::math::{enclosing_bounds, rect_is_empty},
    overlay::params::{ColorSpace, HdrMetadata, OverlayImage, OverlayParams},
    overlay::support::OverlaySupport,
    tree::layer_tree::LayerTreeOpts,
    video::processor::VideoProcessorCache,
};

/// What a presenter hands back to the tree for one overlay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PresentOutcome {
    pub(crate) content: Option<VisualContent>,
    pub(crate) content_serial: u64,
    /// Maps content pixels to root space.
    pub(crate) transform: Affine,
    pub(crate) clip_rect: Option<Rect>,
}

impl PresentOutcome {
    fn empty(clip_rect: Option<Rect>) -> Self {
        Self {
            content: None,
            content_serial: 0,
            transform: Affine::IDENTITY,
            clip_rect,
        }
    }
}

/// Inputs that decide whether an unchanged swap chain needs a new present.
#[derive(Clone, Debug, PartialEq)]
struct PresentedFrame {
    image: OverlayImage,
    content_rect: Rect,
    color_space: ColorSpace,
    hdr_metadata: Option<HdrMetadata>,
}

fn is_axis_aligned(transform: Affine) -> bool {
    let [_, b, c, _, _, _] = transform.as_coeffs();
    b == 0.0 && c == 0.0
}

/// Transform mapping `content_rect` of a caller-owned buffer onto `quad_rect`.
pub(crate) fn pass_through_outcome(params: &OverlayParams) -> PresentOutcome {
    let (content, serial) = match &params.image {
        Some(OverlayImage::SwapChain(id)) => (Some(VisualContent::SwapChain(*id)), 0),
        Some(OverlayImage::DCompSurface { surface, serial }) => {
            (Some(VisualContent::Surface(*surface)), *serial)
        }
        _ => (None, 0),
    };
    let quad = params.quad_rect;
    let src = params.content_rect;
    let sx = if src.width() > 0.0 { quad.width() / src.width() } else { 1.0 };
    let sy = if src.height() > 0.0 { quad.height() / src.height() } else { 1.0 };
    let transform = params.transform
        * Affine::translate(quad.origin().to_vec2())
        * Affine::scale_non_uniform(sx, sy)
        * Affine::translate(-src.origin().to_vec2());

    let clip_rect = if is_axis_aligned(params.transform) {
        let bounds = params.transform.transform_rect_bbox(quad);
        Some(match params.clip_rect {
            Some(clip) => clip.intersect(bounds),
            None => bounds,
        })
    } else {
        params.clip_rect
    };

    PresentOutcome {
        content,
        content_serial: serial,
        transform,
        clip_rect,
    }
}

pub(crate) fn choose_format(
    opts: &LayerTreeOpts,
    texture_format: TextureFormat,
    color_space: ColorSpace,
) -> SwapChainFormat {
    if color_space.is_hdr() {
        return SwapChainFormat::Rgb10A2;
    }
    if texture_format.is_yuv() {
        if opts.nv12_supported {
            return SwapChainFormat::Nv12;
        }
        if opts.yuy2_supported {
            return SwapChainFormat::Yuy2;
        }
    }
    SwapChainFormat::Bgra8
}

/// Swap-chain size and the visual transform that stretches it over the on-screen quad.
///
/// The size follows the integer on-screen bounds; the transform maps the swap chain exactly onto
/// `quad_rect` through the caller's own transform, so mirroring and sub-pixel placement survive.
pub(crate) fn calculate_swap_chain_size(
    opts: &LayerTreeOpts,
    params: &OverlayParams,
    format: SwapChainFormat,
) -> (PixelSize, Affine) {
    let quad = params.quad_rect;
    let onscreen = if is_axis_aligned(params.transform) {
        PixelSize::from_ceiled(enclosing_bounds(params.transform, quad).size())
    } else {
        PixelSize::from_ceiled(quad.size())
    };
    let content = PixelSize::from_ceiled(params.content_rect.size());

    let mut size = if opts.disable_vp_scaling {
        content
    } else if opts.scaled_overlays_supported && !opts.no_downscaled_overlay_promotion {
        onscreen.set_to_min(content)
    } else {
        onscreen
    };
    if format.is_yuv() {
        size = size.round_up_to_even();
    }
    if size.is_empty() {
        return (size, Affine::IDENTITY);
    }

    let transform = params.transform
        * Affine::translate(quad.origin().to_vec2())
        * Affine::scale_non_uniform(
            quad.width() / f64::from(size.width),
            quad.height() / f64::from(size.height),
        );
    (size, transform)
}

/// Turns one overlay's image into swap-chain content, recreating and presenting only when needed.
pub struct SwapChainPresenter {
    swap_chain: Option<SwapChainId>,
    desc: Option<SwapChainDesc>,
    staging: Option<(u64, u64, TextureHandle)>,
    last_presented: Option<PresentedFrame>,
    frame_rate: f32,
    present_count: u64,
}

impl SwapChainPresenter {
    pub fn new(frame_rate: f32) -> Self {
        Self {
            swap_chain: None,
            desc: None,
            staging: None,
            last_presented: None,
            frame_rate,
            present_count: 0,
        }
    }

    pub fn swap_chain(&self) -> Option<SwapChainId> {
        self.swap_chain
    }

    pub fn swap_chain_size(&self) -> Option<PixelSize> {
        self.desc.map(|d| d.size)
    }

    pub fn format(&self) -> Option<SwapChainFormat> {
        self.desc.map(|d| d.format)
    }

    /// Number of presents this presenter issued.
    pub fn present_count(&self) -> u64 {
        self.present_count
    }

    pub fn set_frame_rate(&mut self, frame_rate: f32) {
        self.frame_rate = frame_rate;
    }

    pub fn release<D: VideoDevice + ?Sized>(&mut self, device: &mut D) -> OverlayResult<()> {
        if let Some(id) = self.swap_chain.take() {
            device.destroy_swap_chain(id)?;
        }
        self.desc = None;
        self.last_presented = None;
        Ok(())
    }

    fn texture_for<D: VideoDevice + ?Sized>(
        &mut self,
        device: &mut D,
        image: &OverlayImage,
    ) -> OverlayResult<Option<TextureHandle>> {
        match image {
            OverlayImage::Texture(handle) => Ok(Some(*handle)),
            OverlayImage::SharedMemory(shared) => {
                if let Some((id, revision, handle)) = self.staging
                    && id == shared.id
                    && revision == shared.revision
                {
                    return Ok(Some(handle));
                }
                let previous = self.staging.map(|(_, _, handle)| handle);
                let handle = device.upload_pixels(previous, &shared.pixels)?;
                self.staging = Some((shared.id, shared.revision, handle));
                Ok(Some(handle))
            }
            OverlayImage::SwapChain(_) | OverlayImage::DCompSurface { .. } => Ok(None),
        }
    }

    /// Produce the content, transform and clip for `params`.
    #[tracing::instrument(skip_all, fields(z_order = params.z_order))]
    pub(crate) fn present_to_swap_chain<D: VideoDevice + ?Sized>(
        &mut self,
        device: &mut D,
        processors: &mut VideoProcessorCache,
        support: &OverlaySupport,
        opts: &LayerTreeOpts,
        params: &OverlayParams,
    ) -> OverlayResult<PresentOutcome> {
        if let Some(color) = params.background_color {
            self.release(device)?;
            let quad = params.quad_rect;
            let transform = params.transform
                * Affine::translate(quad.origin().to_vec2())
                * Affine::scale_non_uniform(quad.width(), quad.height());
            return Ok(PresentOutcome {
                content: if rect_is_empty(quad) {
                    None
                } else {
                    Some(VisualContent::SolidColor(color))
                },
                content_serial: 0,
                transform,
                clip_rect: params.clip_rect,
            });
        }

        let Some(image) = params.image.as_ref() else {
            self.release(device)?;
            return Ok(PresentOutcome::empty(params.clip_rect));
        };
        if rect_is_empty(params.quad_rect) {
            self.release(device)?;
            return Ok(PresentOutcome::empty(params.clip_rect));
        }
        if image.is_pass_through() {
            self.release(device)?;
            return Ok(pass_through_outcome(params));
        }

        let Some(texture) = self.texture_for(device, image)? else {
            return Ok(PresentOutcome::empty(params.clip_rect));
        };
        let format = choose_format(opts, texture.format, params.color_space);
        let (size, transform) = calculate_swap_chain_size(opts, params, format);
        if size.is_empty() {
            self.release(device)?;
            return Ok(PresentOutcome::empty(params.clip_rect));
        }

        let desc = SwapChainDesc {
            size,
            format,
            has_alpha: !format.is_yuv(),
            protected_video_type: params.protected_video_type,
            is_root: false,
        };
        let first_present = self.swap_chain.is_none() || self.desc != Some(desc);
        if first_present {
            self.release(device)?;
            self.swap_chain = Some(device.create_swap_chain(&desc)?);
            self.desc = Some(desc);
            tracing::debug!(?size, ?format, "created overlay swap chain");
        }
        let Some(swap_chain) = self.swap_chain else {
            return Err(OverlayError::present("swap chain missing after creation"));
        };

        let frame = PresentedFrame {
            image: image.clone(),
            content_rect: params.content_rect,
            color_space: params.color_space,
            hdr_metadata: params.hdr_metadata,
        };
        if first_present || self.last_presented.as_ref() != Some(&frame) {
            self.last_presented = None;
            let input_size = PixelSize::from_ceiled(params.content_rect.size());
            let is_hdr = format == SwapChainFormat::Rgb10A2;
            let processor = processors
                .initialize_video_processor(device, support, input_size, size, is_hdr)
                .ok_or_else(|| OverlayError::device("no video processor for overlay"))?;

            let output_color_space = match format {
                SwapChainFormat::Rgb10A2 => params.color_space,
                SwapChainFormat::Nv12 | SwapChainFormat::Yuy2 => ColorSpace::Rec709,
                SwapChainFormat::Bgra8 => ColorSpace::Srgb,
            };
            device.blit(
                processor,
                &BlitRequest {
                    source: texture,
                    source_rect: params.content_rect,
                    target: swap_chain,
                    target_size: size,
                    input_color_space: params.color_space,
                    output_color_space,
                    hdr_metadata: params.hdr_metadata,
                },
            )?;

            let hints = PresentHints::for_frame_rate(self.frame_rate, None);
            device.present(swap_chain, hints)?;
            self.present_count += 1;
            if first_present {
                // Fill the second buffer too, so the first flip never shows garbage.
                device.present(swap_chain, hints)?;
                self.present_count += 1;
            }
            self.last_presented = Some(frame);
        }

        Ok(PresentOutcome {
            content: Some(VisualContent::SwapChain(swap_chain)),
            content_serial: 0,
            transform,
            clip_rect: params.clip_rect,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/video/swap_chain.rs"]
mod tests;
