use crate::{
    device::{
        backend::OverlayBackend,
        types::{
            PixelRect, PresentHints, SurfaceId, SwapChainDesc, SwapChainFormat, SwapChainId,
        },
    },
    foundation::core::PixelSize,
    foundation::error::{OverlayError, OverlayResult},
    overlay::params::{ColorSpace, ProtectedVideoType},
    tree::layer_tree::RootSurfaceContent,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Backing {
    /// Flip-model back buffer, presented by the surface itself.
    SwapChain { id: SwapChainId, needs_double_present: bool },
    /// Compositor surface; drawing is published by the next commit.
    Surface { id: SurfaceId, serial: u64 },
}

/// The window's back buffer, drawn by the producer and composited at z-order 0.
///
/// With DC layers enabled it is a compositor surface drawn in place; otherwise a swap chain.
#[derive(Debug)]
pub struct RootSurface {
    backing: Option<Backing>,
    size: PixelSize,
    has_alpha: bool,
    color_space: ColorSpace,
    use_surface: bool,
    drawing: Option<PixelRect>,
}

impl Default for RootSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RootSurface {
    pub fn new() -> Self {
        Self {
            backing: None,
            size: PixelSize::default(),
            has_alpha: true,
            color_space: ColorSpace::Srgb,
            use_surface: false,
            drawing: None,
        }
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing.is_some()
    }

    pub fn uses_surface(&self) -> bool {
        self.use_surface
    }

    /// What the layer tree composites at z-order 0, if anything was allocated.
    pub fn content(&self) -> Option<RootSurfaceContent> {
        let size = self.size;
        match self.backing? {
            Backing::SwapChain { id, .. } => Some(RootSurfaceContent::SwapChain { id, size }),
            Backing::Surface { id, serial } => Some(RootSurfaceContent::Surface { id, serial, size }),
        }
    }

    pub fn swap_chain(&self) -> Option<SwapChainId> {
        match self.backing? {
            Backing::SwapChain { id, .. } => Some(id),
            Backing::Surface { .. } => None,
        }
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        match self.backing? {
            Backing::Surface { id, .. } => Some(id),
            Backing::SwapChain { .. } => None,
        }
    }

    /// Reallocate the backing if any of the parameters changed. Returns whether it did.
    pub fn resize<D: OverlayBackend + ?Sized>(
        &mut self,
        device: &mut D,
        size: PixelSize,
        has_alpha: bool,
        color_space: ColorSpace,
    ) -> OverlayResult<bool> {
        if self.drawing.is_some() {
            return Err(OverlayError::validation("cannot resize the root surface while drawing"));
        }
        let unchanged = self.backing.is_some()
            && self.size == size
            && self.has_alpha == has_alpha
            && self.color_space == color_space;
        if unchanged {
            return Ok(false);
        }
        self.size = size;
        self.has_alpha = has_alpha;
        self.color_space = color_space;
        self.reallocate(device)?;
        Ok(true)
    }

    /// Switch between a compositor surface and a swap chain, keeping the current size.
    pub fn set_use_surface<D: OverlayBackend + ?Sized>(
        &mut self,
        device: &mut D,
        use_surface: bool,
    ) -> OverlayResult<()> {
        if self.use_surface == use_surface {
            return Ok(());
        }
        if self.drawing.is_some() {
            return Err(OverlayError::validation(
                "cannot switch root surface backing while drawing",
            ));
        }
        self.use_surface = use_surface;
        if self.backing.is_some() {
            self.reallocate(device)?;
        }
        Ok(())
    }

    fn reallocate<D: OverlayBackend + ?Sized>(&mut self, device: &mut D) -> OverlayResult<()> {
        self.release(device)?;
        if self.size.is_empty() {
            return Ok(());
        }
        self.backing = Some(if self.use_surface {
            let id = device.create_surface(self.size, self.has_alpha)?;
            Backing::Surface { id, serial: 0 }
        } else {
            let format = if self.color_space.is_hdr() {
                SwapChainFormat::Rgb10A2
            } else {
                SwapChainFormat::Bgra8
            };
            let id = device.create_swap_chain(&SwapChainDesc {
                size: self.size,
                format,
                has_alpha: self.has_alpha,
                protected_video_type: ProtectedVideoType::Clear,
                is_root: true,
            })?;
            Backing::SwapChain {
                id,
                needs_double_present: true,
            }
        });
        tracing::debug!(size = ?self.size, surface = self.use_surface, "allocated root surface");
        Ok(())
    }

    /// Open `update_rect` (the whole surface when `None`) for drawing.
    pub fn begin_draw<D: OverlayBackend + ?Sized>(
        &mut self,
        device: &mut D,
        update_rect: Option<PixelRect>,
    ) -> OverlayResult<()> {
        let backing = self
            .backing
            .ok_or_else(|| OverlayError::validation("root surface has no backing to draw into"))?;
        if self.drawing.is_some() {
            return Err(OverlayError::validation("begin_draw while already drawing"));
        }
        let rect = update_rect.unwrap_or_else(|| PixelRect::from_size(self.size));
        if rect.is_empty() || !rect.fits_within(self.size) {
            return Err(OverlayError::validation(format!(
                "update rect {rect:?} outside root surface {:?}",
                self.size
            )));
        }
        if let Backing::Surface { id, .. } = backing {
            device.begin_draw(id, rect)?;
        }
        self.drawing = Some(rect);
        Ok(())
    }

    pub fn end_draw<D: OverlayBackend + ?Sized>(&mut self, device: &mut D) -> OverlayResult<()> {
        if self.drawing.take().is_none() {
            return Err(OverlayError::validation("end_draw without begin_draw"));
        }
        if let Some(Backing::Surface { id, serial }) = self.backing {
            device.end_draw(id)?;
            self.backing = Some(Backing::Surface {
                id,
                serial: serial.wrapping_add(1),
            });
        }
        Ok(())
    }

    /// Present the swap chain; the first present after allocation fills both buffers.
    ///
    /// Surfaces need no present: the layer-tree commit publishes them.
    pub fn present<D: OverlayBackend + ?Sized>(
        &mut self,
        device: &mut D,
        hints: PresentHints,
    ) -> OverlayResult<()> {
        if self.drawing.is_some() {
            return Err(OverlayError::validation("present while the root surface is drawing"));
        }
        let Some(Backing::SwapChain {
            id,
            needs_double_present,
        }) = self.backing
        else {
            return Ok(());
        };
        device.present(id, hints)?;
        if needs_double_present {
            device.present(id, hints)?;
            self.backing = Some(Backing::SwapChain {
                id,
                needs_double_present: false,
            });
        }
        Ok(())
    }

    pub fn release<D: OverlayBackend + ?Sized>(&mut self, device: &mut D) -> OverlayResult<()> {
        self.drawing = None;
        match self.backing.take() {
            Some(Backing::SwapChain { id, .. }) => device.destroy_swap_chain(id),
            Some(Backing::Surface { id, .. }) => device.destroy_surface(id),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surface/root_surface.rs"]
mod tests;
