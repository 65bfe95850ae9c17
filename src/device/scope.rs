use std::ops::{Deref, DerefMut};

use crate::{device::backend::CompositionDevice, foundation::error::OverlayResult};

/// Owns a compositor device and commits it one last time when dropped.
///
/// Releasing compositor objects leaves the device dirty until the next commit; a dirty device
/// whose process dies can leave stale content on screen. Every exit path therefore flushes.
pub struct ScopedDevice<B: CompositionDevice> {
    device: B,
    finished: bool,
}

impl<B: CompositionDevice> ScopedDevice<B> {
    pub fn new(device: B) -> Self {
        Self {
            device,
            finished: false,
        }
    }

    /// Commit now, reporting the error instead of logging it.
    pub fn flush(&mut self) -> OverlayResult<()> {
        self.device.commit()
    }

    /// Final commit with the error reported; the drop-time commit is skipped afterwards.
    pub fn finish(mut self) -> OverlayResult<()> {
        self.finished = true;
        self.device.commit()
    }
}

impl<B: CompositionDevice> Deref for ScopedDevice<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.device
    }
}

impl<B: CompositionDevice> DerefMut for ScopedDevice<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.device
    }
}

impl<B: CompositionDevice> Drop for ScopedDevice<B> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.device.commit() {
            tracing::warn!(%err, "final device commit failed");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/device/scope.rs"]
mod tests;
