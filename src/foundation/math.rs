use crate::foundation::core::{Affine, Rect, Vec2};

pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn mul_div255_u8(x: u16, y: u16) -> u8 {
    mul_div255_u16(x, y) as u8
}

/// Premultiplied source-over with an extra layer opacity.
pub(crate) fn over(dst: [u8; 4], src: [u8; 4], opacity: f32) -> [u8; 4] {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255_u8(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255_u8(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255_u8(u16::from(src[i]), op);
        let dc = mul_div255_u8(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

const INTEGRAL_EPSILON: f64 = 1e-6;

fn is_integral(v: f64) -> bool {
    (v - v.round()).abs() <= INTEGRAL_EPSILON
}

/// Split `transform` into `(offset, residual)`.
///
/// A pure translation by whole pixels becomes an offset with an identity residual, so the
/// compositor can place the visual without resampling. Anything else keeps the full transform and
/// a zero offset.
pub(crate) fn split_integral_translation(transform: Affine) -> (Vec2, Affine) {
    let [a, b, c, d, e, f] = transform.as_coeffs();
    let is_translation = a == 1.0 && b == 0.0 && c == 0.0 && d == 1.0;
    if is_translation && is_integral(e) && is_integral(f) {
        return (Vec2::new(e.round(), f.round()), Affine::IDENTITY);
    }
    (Vec2::ZERO, transform)
}

/// Integer-aligned bounding box of `rect` after `transform`.
pub(crate) fn enclosing_bounds(transform: Affine, rect: Rect) -> Rect {
    transform.transform_rect_bbox(rect).expand()
}

pub(crate) fn rect_is_empty(rect: Rect) -> bool {
    rect.width() <= 0.0 || rect.height() <= 0.0
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
