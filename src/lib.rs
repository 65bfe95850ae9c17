//! Retained overlay layer-tree reconciler for DirectComposition-style compositors.
//!
//! Each frame the caller schedules overlay requests (video frames, solid colours, externally
//! presented buffers) and commits them together with the window's root surface. The tree keeps
//! one visual subtree and one swap-chain presenter per overlay across frames and only touches the
//! compositor for what actually changed:
//!
//! - [`DCompPresenter`] drives a window: root surface, overlay scheduling, swaps, teardown
//! - [`DCLayerTree`] reconciles overlay lists into the visual tree with minimal mutations
//! - [`HeadlessDevice`] is an in-memory compositor with a software scan-out for tests and tools
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod device;
pub(crate) mod ink;
pub(crate) mod overlay;
pub(crate) mod surface;
pub(crate) mod tree;
pub(crate) mod video;

pub use crate::foundation::core::{
    Affine, PixelSize, Point, Rect, Rgba8Premul, RoundedRect, RoundedRectRadii, Size, Vec2,
};
pub use crate::foundation::error::{OverlayError, OverlayResult};

pub use crate::device::backend::{CompositionDevice, OverlayBackend, VideoDevice};
pub use crate::device::headless::{
    HeadlessCounters, HeadlessDevice, HeadlessOpts, SwapChainInfo, VisualState,
};
pub use crate::device::scope::ScopedDevice;
pub use crate::device::types::{
    BlitRequest, DynamicRange, PixelRect, PresentHints, SamplingFilter, SurfaceId, SwapChainDesc,
    SwapChainFormat, SwapChainId, TextureFormat, TextureHandle, VideoContextId, VideoProcessorId,
    VisualContent, VisualId,
};
pub use crate::ink::renderer::{
    DEFAULT_MAX_INK_POINTS, DelegatedInkRenderer, InkMetadata, InkPoint, InkTrail,
};
pub use crate::overlay::params::{
    ColorSpace, HdrMetadata, LayerId, OverlayImage, OverlayKey, OverlayParams, ProtectedVideoType,
    SharedImage, validate_overlay_list,
};
pub use crate::overlay::support::OverlaySupport;
pub use crate::surface::presenter::{
    DCompPresenter, PresenterState, PresenterStats, SurfaceOpts, SwapResult,
};
pub use crate::surface::root_surface::RootSurface;
pub use crate::tree::layer_tree::{DCLayerTree, LayerTreeOpts, RootSurfaceContent};
pub use crate::tree::visual_subtree::VisualInfo;
pub use crate::video::processor::{VideoProcessorCache, VideoProcessorWrapper};
pub use crate::video::swap_chain::SwapChainPresenter;
