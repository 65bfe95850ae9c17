use crate::{
    device::{
        backend::CompositionDevice,
        types::{SamplingFilter, VisualContent, VisualId},
    },
    foundation::core::{Affine, Rect, RoundedRect, Vec2},
    foundation::error::OverlayResult,
};

/// Per-subtree placement as last applied, exposed for verification.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisualInfo {
    pub transform: Affine,
    pub offset: Vec2,
    pub clip_rect: Option<Rect>,
}

/// Everything one frame asks of a subtree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SubtreeUpdate {
    pub(crate) z_order: i32,
    pub(crate) content: Option<VisualContent>,
    /// Bumped by producers that redraw a surface in place.
    pub(crate) content_serial: u64,
    pub(crate) offset: Vec2,
    pub(crate) transform: Affine,
    pub(crate) clip_rect: Option<Rect>,
    pub(crate) rounded_corners: Option<RoundedRect>,
    pub(crate) opacity: f32,
    pub(crate) nearest_neighbor_filter: bool,
}

#[derive(Clone, Copy, Debug)]
struct Nodes {
    /// Attached to the tree root; carries the clip rect and opacity.
    clip: VisualId,
    rounded_corners: VisualId,
    /// Carries offset and transform.
    transform: VisualId,
    /// Carries content and sampling filter.
    content: VisualId,
}

/// Chain of visuals for one overlay: clip -> rounded corners -> transform -> content.
///
/// Every property is cached and only pushed to the device when it differs from what was last
/// applied. z-order is remembered but never applied here: ordering is the position of
/// [`VisualSubtree::container`] in the root's child list.
#[derive(Debug)]
pub(crate) struct VisualSubtree {
    nodes: Option<Nodes>,
    z_order: Option<i32>,
    content: Option<VisualContent>,
    content_serial: u64,
    offset: Vec2,
    transform: Affine,
    clip_rect: Option<Rect>,
    rounded_corners: Option<RoundedRect>,
    opacity: f32,
    nearest_neighbor_filter: bool,
}

impl Default for VisualSubtree {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualSubtree {
    /// Cached values start at the device defaults for a fresh visual.
    pub(crate) fn new() -> Self {
        Self {
            nodes: None,
            z_order: None,
            content: None,
            content_serial: 0,
            offset: Vec2::ZERO,
            transform: Affine::IDENTITY,
            clip_rect: None,
            rounded_corners: None,
            opacity: 1.0,
            nearest_neighbor_filter: false,
        }
    }

    pub(crate) fn container(&self) -> Option<VisualId> {
        self.nodes.map(|n| n.clip)
    }

    pub(crate) fn z_order(&self) -> Option<i32> {
        self.z_order
    }

    pub(crate) fn content(&self) -> Option<VisualContent> {
        self.content
    }

    pub(crate) fn visual_info(&self) -> VisualInfo {
        VisualInfo {
            transform: self.transform,
            offset: self.offset,
            clip_rect: self.clip_rect,
        }
    }

    fn ensure_nodes<D: CompositionDevice + ?Sized>(&mut self, device: &mut D) -> OverlayResult<(Nodes, bool)> {
        if let Some(nodes) = self.nodes {
            return Ok((nodes, false));
        }
        let nodes = Nodes {
            clip: device.create_visual()?,
            rounded_corners: device.create_visual()?,
            transform: device.create_visual()?,
            content: device.create_visual()?,
        };
        device.add_visual(nodes.clip, nodes.rounded_corners)?;
        device.add_visual(nodes.rounded_corners, nodes.transform)?;
        device.add_visual(nodes.transform, nodes.content)?;
        self.nodes = Some(nodes);
        Ok((nodes, true))
    }

    /// Apply `update`, returning whether anything was sent to the device.
    pub(crate) fn update<D: CompositionDevice + ?Sized>(
        &mut self,
        device: &mut D,
        update: &SubtreeUpdate,
    ) -> OverlayResult<bool> {
        let (nodes, mut needs_commit) = self.ensure_nodes(device)?;
        self.z_order = Some(update.z_order);

        if self.clip_rect != update.clip_rect {
            device.set_clip(nodes.clip, update.clip_rect)?;
            self.clip_rect = update.clip_rect;
            needs_commit = true;
        }

        if self.opacity != update.opacity {
            device.set_opacity(nodes.clip, update.opacity)?;
            self.opacity = update.opacity;
            needs_commit = true;
        }

        if self.rounded_corners != update.rounded_corners {
            device.set_rounded_clip(nodes.rounded_corners, update.rounded_corners)?;
            self.rounded_corners = update.rounded_corners;
            needs_commit = true;
        }

        if self.offset != update.offset {
            device.set_offset(nodes.transform, update.offset)?;
            self.offset = update.offset;
            needs_commit = true;
        }

        if self.transform != update.transform {
            device.set_transform(nodes.transform, update.transform)?;
            self.transform = update.transform;
            needs_commit = true;
        }

        let content_changed = self.content != update.content
            || (matches!(update.content, Some(VisualContent::Surface(_)))
                && self.content_serial != update.content_serial);
        if content_changed {
            device.set_content(nodes.content, update.content)?;
            self.content = update.content;
            self.content_serial = update.content_serial;
            needs_commit = true;
        }

        if self.nearest_neighbor_filter != update.nearest_neighbor_filter {
            device.set_interpolation(
                nodes.content,
                SamplingFilter::from_nearest(update.nearest_neighbor_filter),
            )?;
            self.nearest_neighbor_filter = update.nearest_neighbor_filter;
            needs_commit = true;
        }

        Ok(needs_commit)
    }

    /// Destroy the node chain. The container must already be detached from its parent.
    pub(crate) fn release<D: CompositionDevice + ?Sized>(&mut self, device: &mut D) -> OverlayResult<()> {
        if let Some(nodes) = self.nodes.take() {
            device.destroy_visual(nodes.content)?;
            device.destroy_visual(nodes.transform)?;
            device.destroy_visual(nodes.rounded_corners)?;
            device.destroy_visual(nodes.clip)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/tree/visual_subtree.rs"]
mod tests;
