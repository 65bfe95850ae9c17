use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use smallvec::SmallVec;

use crate::{
    device::{
        backend::{CompositionDevice, VideoDevice},
        raster,
        types::{
            BlitRequest, DynamicRange, PixelRect, PresentHints, SamplingFilter, SurfaceId,
            SwapChainDesc, SwapChainId, TextureFormat, TextureHandle, VideoContextId,
            VideoProcessorId, VisualContent, VisualId,
        },
    },
    foundation::core::{Affine, PixelSize, Rect, Rgba8Premul, RoundedRect, Vec2},
    foundation::error::{OverlayError, OverlayResult},
    ink::renderer::InkTrail,
};

/// Failure injection and presentation options for [`HeadlessDevice`].
#[derive(Clone, Debug)]
pub struct HeadlessOpts {
    /// Colour behind all visuals when composing.
    pub clear_color: Rgba8Premul,
    pub fail_video_context: bool,
    pub fail_video_processor: bool,
    /// Number of upcoming presents that fail.
    pub fail_presents: u32,
    /// Number of upcoming commits that fail.
    pub fail_commits: u32,
}

impl Default for HeadlessOpts {
    fn default() -> Self {
        Self {
            clear_color: Rgba8Premul::opaque(0, 0, 0),
            fail_video_context: false,
            fail_video_processor: false,
            fail_presents: 0,
            fail_commits: 0,
        }
    }
}

/// Call counters, shareable so they can be read after the device is gone.
#[derive(Debug, Default)]
pub struct HeadlessCounters {
    pub commits: AtomicU64,
    pub presents: AtomicU64,
    pub visual_mutations: AtomicU64,
    pub swap_chains_created: AtomicU64,
    pub swap_chains_destroyed: AtomicU64,
    pub video_contexts_created: AtomicU64,
    pub video_processors_created: AtomicU64,
    pub blits: AtomicU64,
    pub uploads: AtomicU64,
}

impl HeadlessCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Properties of one visual as the compositor holds them.
#[derive(Clone, Debug, PartialEq)]
pub struct VisualState {
    pub parent: Option<VisualId>,
    pub children: SmallVec<[VisualId; 4]>,
    pub offset: Vec2,
    pub transform: Affine,
    pub clip: Option<Rect>,
    pub rounded_clip: Option<RoundedRect>,
    pub opacity: f32,
    pub content: Option<VisualContent>,
    pub filter: SamplingFilter,
    pub ink: Option<InkTrail>,
}

impl Default for VisualState {
    fn default() -> Self {
        Self {
            parent: None,
            children: SmallVec::new(),
            offset: Vec2::ZERO,
            transform: Affine::IDENTITY,
            clip: None,
            rounded_clip: None,
            opacity: 1.0,
            content: None,
            filter: SamplingFilter::Linear,
            ink: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SwapChainInfo {
    pub desc: SwapChainDesc,
    pub present_count: u64,
    pub last_hints: Option<PresentHints>,
}

struct SwapChainState {
    info: SwapChainInfo,
    back: image::RgbaImage,
    front: image::RgbaImage,
}

struct SurfaceState {
    pixels: image::RgbaImage,
    drawing: Option<PixelRect>,
}

struct TextureState {
    pixels: image::RgbaImage,
}

#[derive(Clone, Copy, Debug)]
struct ProcessorState {
    input_size: PixelSize,
    output_size: PixelSize,
}

/// The committed scene: what a screen would show.
#[derive(Clone, Debug, Default)]
pub(crate) struct Scene {
    pub(crate) root: Option<VisualId>,
    pub(crate) visuals: HashMap<VisualId, VisualState>,
}

/// Content pixels a scene refers to.
pub(crate) trait ContentSource {
    fn content_pixels(&self, content: VisualContent) -> Option<ContentPixels<'_>>;
}

pub(crate) enum ContentPixels<'a> {
    Image(&'a image::RgbaImage),
    Solid(Rgba8Premul),
}

/// In-memory retained compositor with a software scan-out.
///
/// Holds pending and committed copies of the visual tree; [`HeadlessDevice::compose`] renders the
/// committed one. Swap-chain front buffers are live, as on real hardware.
pub struct HeadlessDevice {
    opts: HeadlessOpts,
    counters: Arc<HeadlessCounters>,
    next_id: u64,

    pending: Scene,
    committed: Scene,

    swap_chains: HashMap<SwapChainId, SwapChainState>,
    surfaces: HashMap<SurfaceId, SurfaceState>,
    textures: HashMap<u64, TextureState>,
    contexts: HashMap<VideoContextId, DynamicRange>,
    processors: HashMap<VideoProcessorId, ProcessorState>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessOpts::default())
    }
}

impl HeadlessDevice {
    pub fn new(opts: HeadlessOpts) -> Self {
        Self {
            opts,
            counters: Arc::new(HeadlessCounters::default()),
            next_id: 1,
            pending: Scene::default(),
            committed: Scene::default(),
            swap_chains: HashMap::new(),
            surfaces: HashMap::new(),
            textures: HashMap::new(),
            contexts: HashMap::new(),
            processors: HashMap::new(),
        }
    }

    pub fn opts_mut(&mut self) -> &mut HeadlessOpts {
        &mut self.opts
    }

    pub fn counters(&self) -> Arc<HeadlessCounters> {
        Arc::clone(&self.counters)
    }

    pub fn commit_count(&self) -> u64 {
        HeadlessCounters::get(&self.counters.commits)
    }

    pub fn present_count(&self) -> u64 {
        HeadlessCounters::get(&self.counters.presents)
    }

    pub fn visual_mutation_count(&self) -> u64 {
        HeadlessCounters::get(&self.counters.visual_mutations)
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Register a hardware texture filled with `pixels` (premultiplied RGBA8).
    pub fn import_texture(
        &mut self,
        pixels: image::RgbaImage,
        format: TextureFormat,
    ) -> TextureHandle {
        let id = self.alloc_id();
        let size = PixelSize::new(pixels.width(), pixels.height());
        self.textures.insert(id, TextureState { pixels });
        TextureHandle { id, size, format }
    }

    /// Register a texture filled with a single colour.
    pub fn import_solid_texture(
        &mut self,
        size: PixelSize,
        color: Rgba8Premul,
        format: TextureFormat,
    ) -> TextureHandle {
        let pixels =
            image::RgbaImage::from_pixel(size.width, size.height, image::Rgba(color.to_array()));
        self.import_texture(pixels, format)
    }

    pub fn visual(&self, id: VisualId) -> Option<&VisualState> {
        self.pending.visuals.get(&id)
    }

    pub fn committed_visual(&self, id: VisualId) -> Option<&VisualState> {
        self.committed.visuals.get(&id)
    }

    pub fn committed_root(&self) -> Option<VisualId> {
        self.committed.root
    }

    pub fn live_visual_count(&self) -> usize {
        self.pending.visuals.len()
    }

    pub fn swap_chain(&self, id: SwapChainId) -> Option<&SwapChainInfo> {
        self.swap_chains.get(&id).map(|s| &s.info)
    }

    pub fn live_swap_chain_count(&self) -> usize {
        self.swap_chains.len()
    }

    pub fn live_video_processor_count(&self) -> usize {
        self.processors.len()
    }

    /// Back buffer of a swap chain, for producers drawing root content.
    pub fn swap_chain_back_buffer_mut(&mut self, id: SwapChainId) -> Option<&mut image::RgbaImage> {
        self.swap_chains.get_mut(&id).map(|s| &mut s.back)
    }

    /// Pixels of a surface; drawing is only meaningful between `begin_draw` and `end_draw`.
    pub fn surface_pixels_mut(&mut self, id: SurfaceId) -> Option<&mut image::RgbaImage> {
        self.surfaces.get_mut(&id).map(|s| &mut s.pixels)
    }

    /// Render the committed visual tree into a `size` frame.
    pub fn compose(&self, size: PixelSize) -> image::RgbaImage {
        raster::compose(&self.committed, self, size, self.opts.clear_color)
    }

    fn node_mut(&mut self, id: VisualId) -> OverlayResult<&mut VisualState> {
        HeadlessCounters::bump(&self.counters.visual_mutations);
        self.pending
            .visuals
            .get_mut(&id)
            .ok_or_else(|| OverlayError::device(format!("unknown visual {id:?}")))
    }

    fn detach(&mut self, child: VisualId) {
        let parent = self.pending.visuals.get(&child).and_then(|n| n.parent);
        if let Some(parent) = parent
            && let Some(p) = self.pending.visuals.get_mut(&parent)
        {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.pending.visuals.get_mut(&child) {
            c.parent = None;
        }
    }
}

impl ContentSource for HeadlessDevice {
    fn content_pixels(&self, content: VisualContent) -> Option<ContentPixels<'_>> {
        match content {
            VisualContent::SwapChain(id) => self
                .swap_chains
                .get(&id)
                .map(|s| ContentPixels::Image(&s.front)),
            VisualContent::Surface(id) => self
                .surfaces
                .get(&id)
                .map(|s| ContentPixels::Image(&s.pixels)),
            VisualContent::SolidColor(color) => Some(ContentPixels::Solid(color)),
        }
    }
}

impl CompositionDevice for HeadlessDevice {
    fn create_visual(&mut self) -> OverlayResult<VisualId> {
        let id = VisualId(self.alloc_id());
        self.pending.visuals.insert(id, VisualState::default());
        Ok(id)
    }

    fn destroy_visual(&mut self, visual: VisualId) -> OverlayResult<()> {
        self.detach(visual);
        let children = self
            .pending
            .visuals
            .remove(&visual)
            .map(|n| n.children)
            .unwrap_or_default();
        for child in children {
            if let Some(c) = self.pending.visuals.get_mut(&child) {
                c.parent = None;
            }
        }
        if self.pending.root == Some(visual) {
            self.pending.root = None;
        }
        Ok(())
    }

    fn set_root_visual(&mut self, visual: VisualId) -> OverlayResult<()> {
        if !self.pending.visuals.contains_key(&visual) {
            return Err(OverlayError::device(format!("unknown visual {visual:?}")));
        }
        self.pending.root = Some(visual);
        Ok(())
    }

    fn add_visual(&mut self, parent: VisualId, child: VisualId) -> OverlayResult<()> {
        if parent == child || !self.pending.visuals.contains_key(&child) {
            return Err(OverlayError::device(format!(
                "cannot add visual {child:?} to {parent:?}"
            )));
        }
        if self.pending.visuals.get(&child).and_then(|c| c.parent).is_some() {
            return Err(OverlayError::device(format!(
                "visual {child:?} already has a parent"
            )));
        }
        self.node_mut(parent)?.children.push(child);
        if let Some(c) = self.pending.visuals.get_mut(&child) {
            c.parent = Some(parent);
        }
        Ok(())
    }

    fn remove_visual(&mut self, parent: VisualId, child: VisualId) -> OverlayResult<()> {
        let node = self.node_mut(parent)?;
        let before = node.children.len();
        node.children.retain(|c| *c != child);
        if node.children.len() == before {
            return Err(OverlayError::device(format!(
                "visual {child:?} is not a child of {parent:?}"
            )));
        }
        if let Some(c) = self.pending.visuals.get_mut(&child) {
            c.parent = None;
        }
        Ok(())
    }

    fn remove_all_visuals(&mut self, parent: VisualId) -> OverlayResult<()> {
        let children = std::mem::take(&mut self.node_mut(parent)?.children);
        for child in children {
            if let Some(c) = self.pending.visuals.get_mut(&child) {
                c.parent = None;
            }
        }
        Ok(())
    }

    fn set_offset(&mut self, visual: VisualId, offset: Vec2) -> OverlayResult<()> {
        self.node_mut(visual)?.offset = offset;
        Ok(())
    }

    fn set_transform(&mut self, visual: VisualId, transform: Affine) -> OverlayResult<()> {
        self.node_mut(visual)?.transform = transform;
        Ok(())
    }

    fn set_clip(&mut self, visual: VisualId, clip: Option<Rect>) -> OverlayResult<()> {
        self.node_mut(visual)?.clip = clip;
        Ok(())
    }

    fn set_rounded_clip(
        &mut self,
        visual: VisualId,
        clip: Option<RoundedRect>,
    ) -> OverlayResult<()> {
        self.node_mut(visual)?.rounded_clip = clip;
        Ok(())
    }

    fn set_opacity(&mut self, visual: VisualId, opacity: f32) -> OverlayResult<()> {
        self.node_mut(visual)?.opacity = opacity;
        Ok(())
    }

    fn set_content(
        &mut self,
        visual: VisualId,
        content: Option<VisualContent>,
    ) -> OverlayResult<()> {
        self.node_mut(visual)?.content = content;
        Ok(())
    }

    fn set_interpolation(
        &mut self,
        visual: VisualId,
        filter: SamplingFilter,
    ) -> OverlayResult<()> {
        self.node_mut(visual)?.filter = filter;
        Ok(())
    }

    fn create_surface(&mut self, size: PixelSize, _has_alpha: bool) -> OverlayResult<SurfaceId> {
        if size.is_empty() {
            return Err(OverlayError::device("surface size must be non-empty"));
        }
        let id = SurfaceId(self.alloc_id());
        self.surfaces.insert(
            id,
            SurfaceState {
                pixels: image::RgbaImage::new(size.width, size.height),
                drawing: None,
            },
        );
        Ok(id)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) -> OverlayResult<()> {
        self.surfaces.remove(&surface);
        Ok(())
    }

    fn begin_draw(&mut self, surface: SurfaceId, update_rect: PixelRect) -> OverlayResult<()> {
        let state = self
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| OverlayError::device(format!("unknown surface {surface:?}")))?;
        if state.drawing.is_some() {
            return Err(OverlayError::device("begin_draw while already drawing"));
        }
        state.drawing = Some(update_rect);
        Ok(())
    }

    fn end_draw(&mut self, surface: SurfaceId) -> OverlayResult<()> {
        let state = self
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| OverlayError::device(format!("unknown surface {surface:?}")))?;
        if state.drawing.take().is_none() {
            return Err(OverlayError::device("end_draw without begin_draw"));
        }
        Ok(())
    }

    fn update_ink_trail(&mut self, visual: VisualId, trail: &InkTrail) -> OverlayResult<()> {
        self.node_mut(visual)?.ink = Some(trail.clone());
        Ok(())
    }

    fn commit(&mut self) -> OverlayResult<()> {
        if self.opts.fail_commits > 0 {
            self.opts.fail_commits -= 1;
            return Err(OverlayError::commit("injected commit failure"));
        }
        self.committed = self.pending.clone();
        HeadlessCounters::bump(&self.counters.commits);
        Ok(())
    }
}

impl VideoDevice for HeadlessDevice {
    fn create_video_context(&mut self, range: DynamicRange) -> OverlayResult<VideoContextId> {
        if self.opts.fail_video_context {
            return Err(OverlayError::device("injected video context failure"));
        }
        let id = VideoContextId(self.alloc_id());
        self.contexts.insert(id, range);
        HeadlessCounters::bump(&self.counters.video_contexts_created);
        Ok(id)
    }

    fn create_video_processor(
        &mut self,
        context: VideoContextId,
        input_size: PixelSize,
        output_size: PixelSize,
    ) -> OverlayResult<VideoProcessorId> {
        if self.opts.fail_video_processor {
            return Err(OverlayError::device("injected video processor failure"));
        }
        if !self.contexts.contains_key(&context) {
            return Err(OverlayError::device(format!(
                "unknown video context {context:?}"
            )));
        }
        let id = VideoProcessorId(self.alloc_id());
        self.processors.insert(
            id,
            ProcessorState {
                input_size,
                output_size,
            },
        );
        HeadlessCounters::bump(&self.counters.video_processors_created);
        Ok(id)
    }

    fn destroy_video_processor(&mut self, processor: VideoProcessorId) -> OverlayResult<()> {
        self.processors.remove(&processor);
        Ok(())
    }

    fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> OverlayResult<SwapChainId> {
        if desc.size.is_empty() {
            return Err(OverlayError::device("swap chain size must be non-empty"));
        }
        let id = SwapChainId(self.alloc_id());
        let blank = image::RgbaImage::new(desc.size.width, desc.size.height);
        self.swap_chains.insert(
            id,
            SwapChainState {
                info: SwapChainInfo {
                    desc: *desc,
                    present_count: 0,
                    last_hints: None,
                },
                back: blank.clone(),
                front: blank,
            },
        );
        HeadlessCounters::bump(&self.counters.swap_chains_created);
        Ok(id)
    }

    fn destroy_swap_chain(&mut self, swap_chain: SwapChainId) -> OverlayResult<()> {
        if self.swap_chains.remove(&swap_chain).is_some() {
            HeadlessCounters::bump(&self.counters.swap_chains_destroyed);
        }
        Ok(())
    }

    fn upload_pixels(
        &mut self,
        staging: Option<TextureHandle>,
        pixels: &image::RgbaImage,
    ) -> OverlayResult<TextureHandle> {
        HeadlessCounters::bump(&self.counters.uploads);
        let size = PixelSize::new(pixels.width(), pixels.height());
        if let Some(handle) = staging
            && handle.size == size
            && let Some(tex) = self.textures.get_mut(&handle.id)
        {
            tex.pixels.copy_from_slice(pixels.as_raw());
            return Ok(handle);
        }
        if let Some(old) = staging {
            self.textures.remove(&old.id);
        }
        Ok(self.import_texture(pixels.clone(), TextureFormat::Bgra8))
    }

    fn blit(&mut self, processor: VideoProcessorId, request: &BlitRequest) -> OverlayResult<()> {
        let proc_state = *self
            .processors
            .get(&processor)
            .ok_or_else(|| OverlayError::device(format!("unknown processor {processor:?}")))?;
        let source_size = PixelSize::from_ceiled(request.source_rect.size());
        if !proc_state.input_size.contains(source_size)
            || !proc_state.output_size.contains(request.target_size)
        {
            return Err(OverlayError::present(format!(
                "video processor {:?}x{:?} cannot convert {:?} into {:?}",
                proc_state.input_size, proc_state.output_size, source_size, request.target_size
            )));
        }
        let texture = self.textures.get(&request.source.id).ok_or_else(|| {
            OverlayError::present(format!("unknown texture {}", request.source.id))
        })?;
        let chain = self
            .swap_chains
            .get_mut(&request.target)
            .ok_or_else(|| OverlayError::present(format!("unknown swap chain {:?}", request.target)))?;
        raster::scale_into(&texture.pixels, request.source_rect, &mut chain.back);
        HeadlessCounters::bump(&self.counters.blits);
        Ok(())
    }

    fn present(&mut self, swap_chain: SwapChainId, hints: PresentHints) -> OverlayResult<()> {
        if self.opts.fail_presents > 0 {
            self.opts.fail_presents -= 1;
            return Err(OverlayError::present("injected present failure"));
        }
        let chain = self
            .swap_chains
            .get_mut(&swap_chain)
            .ok_or_else(|| OverlayError::present(format!("unknown swap chain {swap_chain:?}")))?;
        chain.front.copy_from_slice(chain.back.as_raw());
        chain.info.present_count += 1;
        chain.info.last_hints = Some(hints);
        HeadlessCounters::bump(&self.counters.presents);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/device/headless.rs"]
mod tests;
