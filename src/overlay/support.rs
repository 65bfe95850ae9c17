use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Shared switch recording whether hardware overlays may still be used.
///
/// Clones observe the same flag. Once a device-level failure disables overlays, every surface
/// holding a clone falls back to compositing only its root surface; the flag is never re-enabled
/// automatically.
#[derive(Clone, Debug)]
pub struct OverlaySupport {
    enabled: Arc<AtomicBool>,
}

impl Default for OverlaySupport {
    fn default() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl OverlaySupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Returns `true` if this call flipped the switch.
    pub fn disable(&self, reason: &str) -> bool {
        let was_enabled = self.enabled.swap(false, Ordering::AcqRel);
        if was_enabled {
            tracing::error!(reason, "disabling hardware overlay support");
        }
        was_enabled
    }
}
