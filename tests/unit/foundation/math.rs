use super::*;

#[test]
fn mul_div255_variants_align() {
    for x in [0u16, 1, 127, 255] {
        for y in [0u16, 1, 127, 255] {
            assert_eq!(u16::from(mul_div255_u8(x, y)), mul_div255_u16(x, y));
        }
    }
}

#[test]
fn over_opacity_0_is_noop() {
    let dst = [1, 2, 3, 4];
    let src = [200, 200, 200, 200];
    assert_eq!(over(dst, src, 0.0), dst);
}

#[test]
fn over_src_opaque_replaces_dst() {
    let dst = [0, 0, 0, 255];
    let src = [255, 0, 0, 255];
    assert_eq!(over(dst, src, 1.0), src);
}

#[test]
fn integral_translation_becomes_offset() {
    let (offset, rest) = split_integral_translation(Affine::translate((10.0, -3.0)));
    assert_eq!(offset, Vec2::new(10.0, -3.0));
    assert_eq!(rest, Affine::IDENTITY);
}

#[test]
fn fractional_or_scaled_transform_is_kept_whole() {
    let t = Affine::translate((10.5, 0.0));
    assert_eq!(split_integral_translation(t), (Vec2::ZERO, t));

    let t = Affine::translate((4.0, 4.0)) * Affine::scale(2.0);
    assert_eq!(split_integral_translation(t), (Vec2::ZERO, t));
}

#[test]
fn enclosing_bounds_rounds_outward() {
    let r = enclosing_bounds(
        Affine::scale(0.5),
        Rect::new(1.0, 1.0, 5.0, 7.0),
    );
    assert_eq!(r, Rect::new(0.0, 0.0, 3.0, 4.0));
}

#[test]
fn empty_rect_detection() {
    assert!(rect_is_empty(Rect::new(0.0, 0.0, 0.0, 10.0)));
    assert!(!rect_is_empty(Rect::new(0.0, 0.0, 1.0, 1.0)));
}
