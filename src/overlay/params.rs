use std::sync::Arc;

use crate::{
    device::types::{SurfaceId, SwapChainId, TextureHandle},
    foundation::core::{Affine, Rect, Rgba8Premul, RoundedRect, validate_affine, validate_rect},
    foundation::error::{OverlayError, OverlayResult},
};

/// Colour space of overlay content, forwarded to swap-chain configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ColorSpace {
    #[default]
    Srgb,
    Rec709,
    Rec2020Pq,
    Rec2020Hlg,
    ScRgbLinear,
}

impl ColorSpace {
    pub fn is_hdr(self) -> bool {
        matches!(self, Self::Rec2020Pq | Self::Rec2020Hlg | Self::ScRgbLinear)
    }
}

/// Static HDR metadata (SMPTE ST 2086 / CTA-861.3 subset).
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HdrMetadata {
    pub max_content_light_level: u32,
    pub max_frame_average_light_level: u32,
    pub max_mastering_luminance: f32,
    pub min_mastering_luminance: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ProtectedVideoType {
    #[default]
    Clear,
    SoftwareProtected,
    HardwareProtected,
}

/// CPU-side pixels uploaded through a staging texture before presentation.
///
/// Identity is `(id, revision)`: producers bump `revision` when they rewrite the pixels.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SharedImage {
    pub id: u64,
    pub revision: u64,
    #[serde(skip, default = "empty_pixels")]
    pub pixels: Arc<image::RgbaImage>,
}

fn empty_pixels() -> Arc<image::RgbaImage> {
    Arc::new(image::RgbaImage::new(0, 0))
}

impl SharedImage {
    pub fn new(id: u64, revision: u64, pixels: image::RgbaImage) -> Self {
        Self {
            id,
            revision,
            pixels: Arc::new(pixels),
        }
    }
}

impl PartialEq for SharedImage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.revision == other.revision
    }
}

/// Pixel content an overlay samples from.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum OverlayImage {
    /// Hardware texture; converted into a swap chain by the video processor.
    Texture(TextureHandle),
    /// CPU planes; uploaded, then handled like a texture.
    SharedMemory(SharedImage),
    /// Caller-owned swap chain, shown as-is.
    SwapChain(SwapChainId),
    /// Caller-owned composition surface. `serial` changes whenever its pixels were redrawn.
    DCompSurface { surface: SurfaceId, serial: u64 },
}

impl OverlayImage {
    /// Images that are already compositor content and skip the presenter's swap chain.
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::SwapChain(_) | Self::DCompSurface { .. })
    }
}

fn default_opacity() -> f32 {
    1.0
}

fn default_transform() -> Affine {
    Affine::IDENTITY
}

/// One overlay request for the next commit.
///
/// Every overlay must be re-submitted each frame; only the compositor resources behind it persist.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OverlayParams {
    /// Optional caller-assigned identity that stays stable across frames.
    #[serde(default)]
    pub layer_id: Option<u64>,
    #[serde(default)]
    pub image: Option<OverlayImage>,
    /// 0 is the root surface, negative values are underlays.
    ///
    /// Only caller-owned buffers (swap chain or composition surface) may sit at 0; a colour or
    /// sampled image there fails validation.
    pub z_order: i32,
    /// Source sub-rectangle of the image, in image pixels.
    pub content_rect: Rect,
    /// Destination rectangle in layer space (before `transform`).
    pub quad_rect: Rect,
    #[serde(default = "default_transform")]
    pub transform: Affine,
    /// Clip in root space.
    #[serde(default)]
    pub clip_rect: Option<Rect>,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Rounded-corner clip in root space.
    #[serde(default)]
    pub rounded_corner_bounds: Option<RoundedRect>,
    #[serde(default)]
    pub protected_video_type: ProtectedVideoType,
    #[serde(default)]
    pub color_space: ColorSpace,
    #[serde(default)]
    pub hdr_metadata: Option<HdrMetadata>,
    /// Solid colour quad; when set `image` is ignored.
    #[serde(default)]
    pub background_color: Option<Rgba8Premul>,
    #[serde(default)]
    pub nearest_neighbor_filter: bool,
}

impl OverlayParams {
    /// An unclipped, opaque overlay covering `quad_rect` and sampling the same rectangle.
    pub fn new(z_order: i32, quad_rect: Rect) -> Self {
        Self {
            layer_id: None,
            image: None,
            z_order,
            content_rect: quad_rect,
            quad_rect,
            transform: Affine::IDENTITY,
            clip_rect: None,
            opacity: 1.0,
            rounded_corner_bounds: None,
            protected_video_type: ProtectedVideoType::Clear,
            color_space: ColorSpace::Srgb,
            hdr_metadata: None,
            background_color: None,
            nearest_neighbor_filter: false,
        }
    }

    pub fn with_layer_id(mut self, id: u64) -> Self {
        self.layer_id = Some(id);
        self
    }

    pub fn with_image(mut self, image: OverlayImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_content_rect(mut self, rect: Rect) -> Self {
        self.content_rect = rect;
        self
    }

    pub fn with_transform(mut self, transform: Affine) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_clip_rect(mut self, clip: Rect) -> Self {
        self.clip_rect = Some(clip);
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_rounded_corners(mut self, bounds: RoundedRect) -> Self {
        self.rounded_corner_bounds = Some(bounds);
        self
    }

    pub fn with_background_color(mut self, color: Rgba8Premul) -> Self {
        self.background_color = Some(color);
        self
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    pub fn with_hdr_metadata(mut self, metadata: HdrMetadata) -> Self {
        self.hdr_metadata = Some(metadata);
        self
    }

    pub fn with_protected_video_type(mut self, kind: ProtectedVideoType) -> Self {
        self.protected_video_type = kind;
        self
    }

    pub fn with_nearest_neighbor_filter(mut self, enabled: bool) -> Self {
        self.nearest_neighbor_filter = enabled;
        self
    }

    pub fn validate(&self) -> OverlayResult<()> {
        validate_rect("quad_rect", self.quad_rect)?;
        validate_rect("content_rect", self.content_rect)?;
        validate_affine("transform", self.transform)?;
        if let Some(clip) = self.clip_rect {
            validate_rect("clip_rect", clip)?;
        }
        if let Some(rounded) = self.rounded_corner_bounds {
            validate_rect("rounded_corner_bounds", rounded.rect())?;
        }
        if !self.opacity.is_finite() || !(0.0..=1.0).contains(&self.opacity) {
            return Err(OverlayError::validation("opacity must be within [0, 1]"));
        }
        let presents_content = self.background_color.is_some()
            || self.image.as_ref().is_some_and(|image| !image.is_pass_through());
        if self.z_order == 0 && presents_content {
            return Err(OverlayError::validation(
                "z_order 0 is reserved for the root surface buffer",
            ));
        }
        Ok(())
    }

    /// True when the overlay carries a colour rather than sampled pixels.
    pub fn is_solid_color(&self) -> bool {
        self.background_color.is_some()
    }
}

/// Identity of a layer within one frame.
///
/// `Stable` comes from [`OverlayParams::layer_id`]; `Slot` is the position among this frame's
/// overlays on the same side of the root surface and is used when no id was given.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerId {
    Stable(u64),
    Slot(u32),
}

/// Reconciliation key for visual subtrees and swap-chain presenters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OverlayKey {
    Underlay(LayerId),
    RootSurface,
    Overlay(LayerId),
}

/// Assign keys to an overlay list already sorted by z-order.
pub(crate) fn assign_keys(sorted: &[OverlayParams]) -> OverlayResult<Vec<OverlayKey>> {
    let mut keys = Vec::with_capacity(sorted.len());
    let mut underlay_slot = 0u32;
    let mut overlay_slot = 0u32;
    for params in sorted {
        let key = match params.z_order {
            0 => OverlayKey::RootSurface,
            z if z < 0 => {
                let id = layer_id_for(params, &mut underlay_slot);
                OverlayKey::Underlay(id)
            }
            _ => {
                let id = layer_id_for(params, &mut overlay_slot);
                OverlayKey::Overlay(id)
            }
        };
        if keys.contains(&key) {
            return Err(match key {
                OverlayKey::RootSurface => OverlayError::validation(
                    "at most one overlay per frame may use z_order 0 (the root surface)",
                ),
                _ => OverlayError::validation(format!("duplicate overlay layer key {key:?}")),
            });
        }
        keys.push(key);
    }
    Ok(keys)
}

/// Check one frame's overlays the way a commit would, without touching a device.
///
/// `with_root_surface` accounts for the z-order 0 entry the frame driver adds for its own surface.
pub fn validate_overlay_list(
    overlays: &[OverlayParams],
    with_root_surface: bool,
) -> OverlayResult<()> {
    let mut sorted = overlays.to_vec();
    if with_root_surface {
        sorted.push(OverlayParams::new(0, Rect::ZERO));
    }
    for params in &sorted {
        params.validate()?;
    }
    sorted.sort_by_key(|p| p.z_order);
    assign_keys(&sorted).map(|_| ())
}

fn layer_id_for(params: &OverlayParams, slot: &mut u32) -> LayerId {
    let id = match params.layer_id {
        Some(id) => LayerId::Stable(id),
        None => LayerId::Slot(*slot),
    };
    *slot = slot.saturating_add(1);
    id
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/params.rs"]
mod tests;
