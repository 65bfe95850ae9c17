use std::time::Duration;

use crate::{
    foundation::core::{PixelSize, Rect, Rgba8Premul},
    overlay::params::{ColorSpace, HdrMetadata, ProtectedVideoType},
};

macro_rules! handle_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(pub u64);
    };
}

handle_id!(
    /// A node in the compositor's retained visual tree.
    VisualId
);
handle_id!(
    /// A flip-model swap chain that can be set as visual content.
    SwapChainId
);
handle_id!(
    /// A compositor-owned drawing surface that can be set as visual content.
    SurfaceId
);
handle_id!(VideoContextId);
handle_id!(VideoProcessorId);

/// Pixel layout of a hardware texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TextureFormat {
    #[default]
    Bgra8,
    Nv12,
    P010,
}

impl TextureFormat {
    pub fn is_yuv(self) -> bool {
        matches!(self, Self::Nv12 | Self::P010)
    }
}

/// Hardware texture published by a producer; compared by handle, never by pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TextureHandle {
    pub id: u64,
    pub size: PixelSize,
    #[serde(default)]
    pub format: TextureFormat,
}

/// Swap-chain buffer formats understood by the overlay hardware.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SwapChainFormat {
    Bgra8,
    Nv12,
    Yuy2,
    Rgb10A2,
}

impl SwapChainFormat {
    pub fn is_yuv(self) -> bool {
        matches!(self, Self::Nv12 | Self::Yuy2)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub size: PixelSize,
    pub format: SwapChainFormat,
    pub has_alpha: bool,
    pub protected_video_type: ProtectedVideoType,
    /// Root back buffers are drawn by producers; overlay swap chains are only blitted into.
    pub is_root: bool,
}

/// Which of the two cached video processors a request uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DynamicRange {
    Sdr,
    Hdr,
}

impl DynamicRange {
    pub fn index(self) -> usize {
        match self {
            Self::Sdr => 0,
            Self::Hdr => 1,
        }
    }

    pub fn from_is_hdr(is_hdr: bool) -> Self {
        if is_hdr { Self::Hdr } else { Self::Sdr }
    }
}

/// One video-processor conversion of `source` into the back buffer of `target`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlitRequest {
    pub source: TextureHandle,
    /// Region of `source` to read, in texture pixels.
    pub source_rect: Rect,
    pub target: SwapChainId,
    /// Size the region is scaled to; equals the swap-chain size.
    pub target_size: PixelSize,
    pub input_color_space: ColorSpace,
    pub output_color_space: ColorSpace,
    pub hdr_metadata: Option<HdrMetadata>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresentHints {
    /// Expected time each frame stays on screen; zero when the frame rate is unknown.
    pub present_duration: Duration,
    /// Region of the back buffer that changed; `None` means the whole buffer.
    pub dirty_rect: Option<PixelRect>,
}

impl PresentHints {
    /// Hints for a swap chain presenting at `frame_rate` frames per second.
    pub fn for_frame_rate(frame_rate: f32, dirty_rect: Option<PixelRect>) -> Self {
        let present_duration = if frame_rate.is_finite() && frame_rate > 0.0 {
            Duration::from_secs_f64(1.0 / f64::from(frame_rate))
        } else {
            Duration::ZERO
        };
        Self {
            present_duration,
            dirty_rect,
        }
    }
}

/// Integer rectangle in buffer pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn from_size(size: PixelSize) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.width,
            height: size.height,
        }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the rectangle lies inside a buffer of `size`.
    pub fn fits_within(self, size: PixelSize) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(size.width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(size.height)
    }
}

/// What a visual displays.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum VisualContent {
    SwapChain(SwapChainId),
    Surface(SurfaceId),
    /// A 1x1 colour tile; the visual transform scales it to the quad.
    SolidColor(Rgba8Premul),
}

/// Bitmap sampling mode for a visual's content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SamplingFilter {
    #[default]
    Linear,
    NearestNeighbor,
}

impl SamplingFilter {
    pub fn from_nearest(nearest: bool) -> Self {
        if nearest {
            Self::NearestNeighbor
        } else {
            Self::Linear
        }
    }
}
