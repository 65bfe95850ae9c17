use super::*;

#[test]
fn pixel_size_contains_is_per_axis() {
    let big = PixelSize::new(100, 50);
    assert!(big.contains(PixelSize::new(100, 50)));
    assert!(big.contains(PixelSize::new(10, 10)));
    assert!(!big.contains(PixelSize::new(101, 10)));
    assert!(!big.contains(PixelSize::new(10, 51)));
}

#[test]
fn pixel_size_from_ceiled_clamps_negative_and_nan() {
    assert_eq!(
        PixelSize::from_ceiled(Size::new(10.2, 3.0)),
        PixelSize::new(11, 3)
    );
    assert_eq!(
        PixelSize::from_ceiled(Size::new(-4.0, f64::NAN)),
        PixelSize::new(0, 0)
    );
}

#[test]
fn pixel_size_round_up_to_even() {
    assert_eq!(
        PixelSize::new(31, 48).round_up_to_even(),
        PixelSize::new(32, 48)
    );
    assert_eq!(PixelSize::new(0, 1).round_up_to_even(), PixelSize::new(0, 2));
}

#[test]
fn premul_conversion_rounds() {
    let c = Rgba8Premul::from_straight_rgba(255, 128, 0, 128);
    assert_eq!(c.a, 128);
    assert_eq!(c.r, 128);
    assert_eq!(c.g, 64);
    assert_eq!(c.b, 0);
}

#[test]
fn validate_rect_rejects_non_finite_and_inverted() {
    assert!(validate_rect("quad_rect", Rect::new(0.0, 0.0, 1.0, 1.0)).is_ok());
    assert!(validate_rect("quad_rect", Rect::new(0.0, 0.0, f64::NAN, 1.0)).is_err());
    assert!(validate_rect("quad_rect", Rect::new(5.0, 0.0, 1.0, 1.0)).is_err());
}

#[test]
fn validate_affine_rejects_infinity() {
    assert!(validate_affine("transform", Affine::IDENTITY).is_ok());
    assert!(validate_affine("transform", Affine::scale(f64::INFINITY)).is_err());
}
