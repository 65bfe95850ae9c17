use crate::foundation::error::{OverlayError, OverlayResult};

pub use kurbo::{Affine, Point, Rect, RoundedRect, RoundedRectRadii, Size, Vec2};

/// Integer pixel dimensions of a swap chain, texture or processor surface.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when `other` fits inside `self` on both axes.
    pub fn contains(self, other: PixelSize) -> bool {
        self.width >= other.width && self.height >= other.height
    }

    pub fn set_to_min(self, other: PixelSize) -> PixelSize {
        PixelSize::new(self.width.min(other.width), self.height.min(other.height))
    }

    /// Smallest integer size that covers `size`; negative or non-finite inputs clamp to zero.
    pub fn from_ceiled(size: Size) -> Self {
        fn ceil_u32(v: f64) -> u32 {
            if !v.is_finite() || v <= 0.0 {
                return 0;
            }
            v.ceil().min(f64::from(u32::MAX)) as u32
        }
        Self::new(ceil_u32(size.width), ceil_u32(size.height))
    }

    /// Round odd dimensions up; chroma-subsampled formats need even sizes.
    pub fn round_up_to_even(self) -> Self {
        fn even(v: u32) -> u32 {
            if v % 2 == 1 { v.saturating_add(1) } else { v }
        }
        Self::new(even(self.width), even(self.height))
    }

    pub fn byte_len_rgba8(self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4)
    }

    pub fn to_size(self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }
}

/// Premultiplied RGBA8 (r,g,b already multiplied by a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8Premul {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8Premul {
    pub fn transparent() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        }
    }

    pub fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn from_straight_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        fn premul(c: u8, a: u8) -> u8 {
            let c = u16::from(c);
            let a = u16::from(a);
            (((c * a) + 127) / 255) as u8
        }

        Self {
            r: premul(r, a),
            g: premul(g, a),
            b: premul(b, a),
            a,
        }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_array(px: [u8; 4]) -> Self {
        Self {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3],
        }
    }
}

/// Rectangles and transforms coming from callers must be finite; NaN geometry would poison every
/// cached-value comparison in the tree.
pub fn validate_rect(name: &str, rect: Rect) -> OverlayResult<()> {
    if !(rect.x0.is_finite() && rect.y0.is_finite() && rect.x1.is_finite() && rect.y1.is_finite())
    {
        return Err(OverlayError::validation(format!("{name} must be finite")));
    }
    if rect.x1 < rect.x0 || rect.y1 < rect.y0 {
        return Err(OverlayError::validation(format!(
            "{name} must have non-negative extent"
        )));
    }
    Ok(())
}

pub fn validate_affine(name: &str, transform: Affine) -> OverlayResult<()> {
    if !transform.is_finite() {
        return Err(OverlayError::validation(format!("{name} must be finite")));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
