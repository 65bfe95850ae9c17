use std::{collections::BTreeMap, sync::mpsc};

use crate::{
    device::{backend::CompositionDevice, types::VisualId},
    foundation::core::{Point, Rect, Rgba8Premul},
    foundation::error::{OverlayError, OverlayResult},
};

/// Upper bound on buffered pointer points when no explicit capacity is configured.
pub const DEFAULT_MAX_INK_POINTS: usize = 128;

/// A pointer sample forwarded from the input thread.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InkPoint {
    pub point: Point,
    /// Event time in microseconds; points are ordered by it, then by pointer.
    pub timestamp_us: u64,
    pub pointer_id: i32,
}

/// Where the trail starts this frame and how it looks.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InkMetadata {
    pub point: Point,
    pub diameter: f32,
    pub color: Rgba8Premul,
    pub timestamp_us: u64,
    /// Region the trail may draw into, relative to the root surface.
    pub presentation_area: Rect,
}

/// Trail geometry handed to the compositor.
#[derive(Clone, Debug, PartialEq)]
pub struct InkTrail {
    pub color: Rgba8Premul,
    pub diameter: f32,
    pub points: Vec<Point>,
}

/// Renders a low-latency ink trail on a dedicated visual above the root surface.
///
/// The tree owns where the visual lives; this type owns what it shows.
pub struct DelegatedInkRenderer {
    visual: Option<VisualId>,
    metadata: Option<InkMetadata>,
    /// Keyed by `(timestamp_us, pointer_id)` so simultaneous pointers coexist.
    points: BTreeMap<(u64, i32), InkPoint>,
    max_points: usize,
    pointer_id: Option<i32>,
    receiver: Option<mpsc::Receiver<InkPoint>>,
    trails_started: u64,
}

impl DelegatedInkRenderer {
    pub fn new(max_points: usize) -> Self {
        Self {
            visual: None,
            metadata: None,
            points: BTreeMap::new(),
            max_points: max_points.max(1),
            pointer_id: None,
            receiver: None,
            trails_started: 0,
        }
    }

    pub fn has_been_initialized(&self) -> bool {
        self.visual.is_some()
    }

    pub fn visual(&self) -> Option<VisualId> {
        self.visual
    }

    pub fn trails_started(&self) -> u64 {
        self.trails_started
    }

    pub fn buffered_point_count(&self) -> usize {
        self.points.len()
    }

    /// Create the ink visual on first use.
    pub fn initialize<D: CompositionDevice + ?Sized>(&mut self, device: &mut D) -> OverlayResult<()> {
        if self.visual.is_none() {
            self.visual = Some(device.create_visual()?);
        }
        Ok(())
    }

    /// Open a new point channel; the previous one, if any, is dropped.
    pub fn bind_receiver(&mut self) -> mpsc::Sender<InkPoint> {
        let (tx, rx) = mpsc::channel();
        self.receiver = Some(rx);
        tx
    }

    pub fn store_point(&mut self, point: InkPoint) {
        if let Some(metadata) = &self.metadata
            && point.timestamp_us < metadata.timestamp_us
        {
            return;
        }
        self.points
            .insert((point.timestamp_us, point.pointer_id), point);
        while self.points.len() > self.max_points {
            self.points.pop_first();
        }
    }

    fn drain_receiver(&mut self) {
        let mut received = Vec::new();
        if let Some(rx) = &self.receiver {
            loop {
                match rx.try_recv() {
                    Ok(point) => received.push(point),
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => {
                        tracing::debug!("ink point sender disconnected");
                        self.receiver = None;
                        break;
                    }
                }
            }
        }
        for point in received {
            self.store_point(point);
        }
    }

    /// Anchor the trail at `metadata` and push the buffered points after it to the visual.
    ///
    /// Returns whether the visual changed and needs a commit.
    pub fn set_trail_start_point<D: CompositionDevice + ?Sized>(
        &mut self,
        device: &mut D,
        metadata: InkMetadata,
    ) -> OverlayResult<bool> {
        let visual = self
            .visual
            .ok_or_else(|| OverlayError::validation("delegated ink renderer is not initialized"))?;
        if !metadata.diameter.is_finite() || metadata.diameter <= 0.0 {
            return Err(OverlayError::validation("ink diameter must be positive"));
        }

        let starts_new_trail = match &self.metadata {
            None => true,
            Some(prev) => prev.color != metadata.color || prev.diameter != metadata.diameter,
        };
        if starts_new_trail {
            self.trails_started += 1;
            self.pointer_id = None;
        }

        let area_changed = self
            .metadata
            .is_none_or(|prev| prev.presentation_area != metadata.presentation_area);
        if area_changed {
            device.set_clip(visual, Some(metadata.presentation_area))?;
        }

        self.metadata = Some(metadata);
        self.drain_receiver();
        self.points
            .retain(|(timestamp, _), _| *timestamp >= metadata.timestamp_us);

        if self.pointer_id.is_none() {
            self.pointer_id = self
                .points
                .values()
                .find(|p| p.timestamp_us == metadata.timestamp_us)
                .or_else(|| self.points.values().next())
                .map(|p| p.pointer_id);
        }

        let mut points = vec![metadata.point];
        points.extend(
            self.points
                .values()
                .filter(|p| p.timestamp_us > metadata.timestamp_us)
                .filter(|p| self.pointer_id.is_none_or(|id| id == p.pointer_id))
                .map(|p| p.point),
        );

        device.update_ink_trail(
            visual,
            &InkTrail {
                color: metadata.color,
                diameter: metadata.diameter,
                points,
            },
        )?;
        Ok(true)
    }

    /// Destroy the ink visual; the caller must have detached it.
    pub fn release<D: CompositionDevice + ?Sized>(&mut self, device: &mut D) -> OverlayResult<()> {
        if let Some(visual) = self.visual.take() {
            device.destroy_visual(visual)?;
        }
        self.metadata = None;
        self.points.clear();
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/ink/renderer.rs"]
mod tests;
