// tests/property_based.rs
//
// Property-based tests for geometry, colour parsing and GPS formatting.
// Each property runs 64 random cases.

use proptest::prelude::*;
use rasterkit::engine::pipeline::{aspect_rect, crop, rotated_size};
use rasterkit::{Color, GpsCoordinate, Raster, Rect, ScalingType, Size};

const TOLERANCE: f32 = 1e-3;

fn dimension() -> impl Strategy<Value = f32> {
    1.0f32..4000.0
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn prop_aspect_fit_stays_inside_target(
        sw in dimension(), sh in dimension(), tw in dimension(), th in dimension()
    ) {
        let rect = aspect_rect(Size::new(sw, sh), Size::new(tw, th), ScalingType::AspectFit);
        prop_assert!(rect.width <= tw * (1.0 + TOLERANCE));
        prop_assert!(rect.height <= th * (1.0 + TOLERANCE));
        prop_assert!(rect.x >= -tw * TOLERANCE);
        prop_assert!(rect.y >= -th * TOLERANCE);
    }

    #[test]
    fn prop_aspect_fill_covers_target(
        sw in dimension(), sh in dimension(), tw in dimension(), th in dimension()
    ) {
        let rect = aspect_rect(Size::new(sw, sh), Size::new(tw, th), ScalingType::AspectFill);
        prop_assert!(rect.width >= tw * (1.0 - TOLERANCE));
        prop_assert!(rect.height >= th * (1.0 - TOLERANCE));
        // Centred: equal overflow on both sides.
        prop_assert!((rect.x + rect.max_x() - tw).abs() <= tw * TOLERANCE + TOLERANCE);
        prop_assert!((rect.y + rect.max_y() - th).abs() <= th * TOLERANCE + TOLERANCE);
    }

    #[test]
    fn prop_axes_independent_matches_target(
        sw in dimension(), sh in dimension(), tw in dimension(), th in dimension()
    ) {
        let rect = aspect_rect(Size::new(sw, sh), Size::new(tw, th), ScalingType::AxesIndependent);
        prop_assert_eq!(rect, Rect::new(0.0, 0.0, tw, th));
    }

    #[test]
    fn prop_rotated_size_bounds_the_source(
        w in 1u32..2000, h in 1u32..2000, radians in -7.0f32..7.0
    ) {
        let size = rotated_size(w, h, radians);
        let (sin, cos) = radians.sin_cos();
        let expected_w = w as f32 * cos.abs() + h as f32 * sin.abs();
        let expected_h = w as f32 * sin.abs() + h as f32 * cos.abs();
        prop_assert!((size.width - expected_w).abs() <= 1.0 + expected_w * TOLERANCE);
        prop_assert!((size.height - expected_h).abs() <= 1.0 + expected_h * TOLERANCE);
        // The diagonal never shrinks.
        let diagonal = ((w * w + h * h) as f32).sqrt();
        prop_assert!(size.width.max(size.height) >= diagonal / std::f32::consts::SQRT_2 - 1.0);
    }

    #[test]
    fn prop_hex_round_trip(r: u8, g: u8, b: u8, a: u8) {
        let color = Color::rgba8(r, g, b, a);
        let hex = color.to_hex_string(true);
        let parsed = Color::from_hex(&hex).unwrap();
        prop_assert_eq!(parsed.to_rgba8(), [r, g, b, a]);

        let opaque = Color::from_hex(&color.to_hex_string(false)).unwrap();
        prop_assert_eq!(opaque.to_rgba8(), [r, g, b, 255]);
    }

    #[test]
    fn prop_gps_dms_round_trip(value in -179.9999f64..179.9999, latitude: bool) {
        let value = if latitude { value / 2.0 } else { value };
        let coordinate = GpsCoordinate::new(value, latitude);
        let parsed: GpsCoordinate = coordinate.dms_string().parse().unwrap();
        prop_assert_eq!(&parsed.reference, &coordinate.reference);
        prop_assert!((parsed.value - coordinate.value).abs() < 1e-4);
        prop_assert!((parsed.normalized().value - value).abs() < 1e-4);
    }

    #[test]
    fn prop_crop_within_bounds_succeeds(
        w in 1u32..64, h in 1u32..64,
        fx in 0.0f32..1.0, fy in 0.0f32..1.0, fw in 0.01f32..1.0, fh in 0.01f32..1.0
    ) {
        let raster = Raster::filled(w, h, [9, 8, 7, 255]).unwrap();
        let x = (fx * w as f32).floor().min(w as f32 - 1.0);
        let y = (fy * h as f32).floor().min(h as f32 - 1.0);
        let cw = ((w as f32 - x) * fw).ceil().max(1.0);
        let ch = ((h as f32 - y) * fh).ceil().max(1.0);
        let out = crop(&raster, Rect::new(x, y, cw, ch)).unwrap();
        prop_assert_eq!(out.dimensions(), (cw as u32, ch as u32));
        prop_assert_eq!(out.rgba_at(0, 0), Some([9, 8, 7, 255]));
    }
}
