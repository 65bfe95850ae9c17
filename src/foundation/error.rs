/// Convenience result type used across the overlay tree.
pub type OverlayResult<T> = Result<T, OverlayError>;

/// Error taxonomy for overlay reconciliation.
///
/// The variants map onto how a failure is recovered from: validation errors are caller defects,
/// device errors disable the hardware overlay path, present and commit errors fail a single frame.
#[derive(thiserror::Error, Debug)]
pub enum OverlayError {
    /// Caller violated an invariant of the tree (duplicate root layer, bad geometry, misuse after
    /// destroy).
    #[error("validation error: {0}")]
    Validation(String),

    /// Compositor or video device resources could not be created.
    #[error("device error: {0}")]
    Device(String),

    /// A swap-chain presenter failed to produce content for the frame.
    #[error("present error: {0}")]
    Present(String),

    /// The compositor rejected a batched commit.
    #[error("commit error: {0}")]
    Commit(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OverlayError {
    /// Build a [`OverlayError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`OverlayError::Device`] value.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Build a [`OverlayError::Present`] value.
    pub fn present(msg: impl Into<String>) -> Self {
        Self::Present(msg.into())
    }

    /// Build a [`OverlayError::Commit`] value.
    pub fn commit(msg: impl Into<String>) -> Self {
        Self::Commit(msg.into())
    }

    /// Whether this failure should switch off hardware overlays instead of failing one frame.
    pub fn is_fatal_to_device(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
