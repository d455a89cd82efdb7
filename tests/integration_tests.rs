// tests/integration_tests.rs
//
// End-to-end tests through the public API: building containers, reading them
// back from bytes and files, metadata round trips and fluent pipelines.

use rasterkit::engine::pipeline::rect_path;
use rasterkit::engine::{AlphaInfo, ColorModel};
use rasterkit::metadata::{GifProperties, GpsProperties};
use rasterkit::{
    Color, ContainerBuilder, FileThumbnail, FlipType, GpsCoordinates,
    ImageContainer, ImageProperties, ImageType, Operation, Orientation, Raster, RasterHandle,
    RasterKitError, Rect, ScalingType, Size,
};
use std::io::Write;

fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Raster {
    Raster::filled(width, height, rgba).unwrap()
}

/// Deterministic noise so JPEG sizes respond to quality.
fn noisy(width: u32, height: u32) -> Raster {
    let mut state: u32 = 0x1234_5678;
    let data = (0..width * height * 3)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect();
    Raster::from_packed(width, height, ColorModel::Rgb, AlphaInfo::None, data).unwrap()
}

mod containers {
    use super::*;

    #[test]
    fn four_frame_gif_round_trip() {
        let colors = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255], [255, 255, 0, 255]];
        let mut builder = ContainerBuilder::new();
        for (i, rgba) in colors.iter().enumerate() {
            let props = ImageProperties::new().with_gif(GifProperties::with_delay(0.2 * (i + 1) as f64));
            builder.add(solid(6, 4, *rgba), Some(props));
        }
        let container = builder.build(ImageType::Gif).unwrap();

        assert_eq!(container.image_type(), ImageType::Gif);
        assert_eq!(container.count(), 4);
        assert!(container.frame(-1).is_none());
        assert!(container.frame(4).is_none());

        let first = container.frame(0).unwrap();
        assert_eq!(first.orientation(), Orientation::Up);
        assert_eq!(first.pixel_size(), Size::new(6.0, 4.0));
        assert!((first.gif_delay() - 0.2).abs() < 0.011);

        let last = container.frame(3).unwrap();
        assert!((last.gif_delay() - 0.8).abs() < 0.011);
        let px = last.raster().unwrap().rgba_at(2, 2).unwrap();
        assert!(px[0] > 200 && px[1] > 200 && px[2] < 50, "{px:?}");
    }

    #[test]
    fn tiff_pages_keep_their_pixels() {
        let pages = vec![solid(3, 3, [10, 20, 30, 255]), solid(5, 2, [200, 100, 50, 255])];
        let container = ImageContainer::from_rasters(pages, ImageType::Tiff).unwrap();
        assert_eq!(container.count(), 2);
        let second = container.frame(1).unwrap();
        assert_eq!(second.raster().unwrap().dimensions(), (5, 2));
        assert_eq!(second.raster().unwrap().rgba_at(4, 1), Some([200, 100, 50, 255]));
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let source = noisy(16, 16);
        let container = ImageContainer::from_raster(&source).unwrap();
        let decoded = container.first().unwrap().raster().unwrap();
        for (x, y) in [(0, 0), (7, 3), (15, 15)] {
            assert_eq!(decoded.rgba_at(x, y), source.rgba_at(x, y));
        }
    }

    #[test]
    fn several_frames_cannot_become_jpeg() {
        let err = ImageContainer::build(vec![solid(2, 2, [0; 4]), solid(2, 2, [0; 4])], ImageType::Jpeg, 0.8)
            .unwrap_err();
        assert!(matches!(err, RasterKitError::CannotCreateDestination { .. }));
    }

    #[test]
    fn same_type_encode_returns_source_bytes() {
        let container = ImageContainer::from_rasters(vec![solid(4, 4, [1, 2, 3, 255])], ImageType::Png).unwrap();
        assert_eq!(container.encode(None, false).unwrap(), container.data());
        let jpeg = container.encode(Some(ImageType::Jpeg), false).unwrap();
        assert_eq!(ImageContainer::from_bytes(jpeg).unwrap().image_type(), ImageType::Jpeg);
    }

    #[test]
    fn files_load_from_disk() {
        let png = RasterHandle::new(solid(9, 7, [0, 0, 0, 255])).png_data(false).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&png).unwrap();
        file.flush().unwrap();

        let container = ImageContainer::from_path(file.path()).unwrap();
        assert_eq!(container.first().unwrap().pixel_size(), Size::new(9.0, 7.0));
        let handle = RasterHandle::from_path(file.path()).unwrap();
        assert_eq!(handle.size().unwrap(), Size::new(9.0, 7.0));
        assert!(matches!(
            ImageContainer::from_path("/no/such/image.png"),
            Err(RasterKitError::FileReadFailed { .. })
        ));
    }
}

mod metadata {
    use super::*;

    #[test]
    fn gps_survives_a_jpeg_round_trip() {
        let coords = GpsCoordinates::new(-33.8568, 151.2153);
        let props = ImageProperties::new().with_gps(GpsProperties::from_coordinates(&coords));
        let handle = RasterHandle::new(solid(8, 8, [50, 50, 50, 255])).with_properties(props);

        let container = ImageContainer::from_bytes(handle.jpeg_data(Some(0.9), false).unwrap()).unwrap();
        assert!(container.has_location());
        let (lat, lon) = container.location().unwrap().decimal_degrees();
        assert!((lat + 33.8568).abs() < 1e-4, "{lat}");
        assert!((lon - 151.2153).abs() < 1e-4, "{lon}");

        let stripped = ImageContainer::from_bytes(handle.jpeg_data(Some(0.9), true).unwrap()).unwrap();
        assert!(!stripped.has_location());
        assert!(stripped.location().is_none());
    }

    #[test]
    fn gps_survives_jpeg_to_tiff_re_export() {
        let coords = GpsCoordinates::new(43.468365, 11.881635);
        let props = ImageProperties::new().with_gps(GpsProperties::from_coordinates(&coords));
        let handle = RasterHandle::new(solid(8, 8, [50, 50, 50, 255])).with_properties(props);
        let jpeg = ImageContainer::from_bytes(handle.jpeg_data(Some(0.9), false).unwrap()).unwrap();

        let tiff = ImageContainer::from_bytes(jpeg.encode(Some(ImageType::Tiff), false).unwrap()).unwrap();
        assert_eq!(tiff.image_type(), ImageType::Tiff);
        let (lat, lon) = tiff.location().unwrap().decimal_degrees();
        assert!((lat - 43.468365).abs() < 1e-4, "{lat}");
        assert!((lon - 11.881635).abs() < 1e-4, "{lon}");

        let stripped = ImageContainer::from_bytes(jpeg.encode(Some(ImageType::Tiff), true).unwrap()).unwrap();
        assert!(stripped.location().is_none());
        assert!(stripped.first().unwrap().properties().gps.is_none());
    }

    #[test]
    fn void_first_frame_yields_the_second_location() {
        let mut void = GpsProperties::from_coordinates(&GpsCoordinates::new(10.0, 20.0));
        void.status = Some("V".to_string());
        let located = GpsProperties::from_coordinates(&GpsCoordinates::new(43.468365, 11.881635));
        let mut builder = ContainerBuilder::new();
        builder.add(solid(4, 4, [0, 0, 0, 255]), Some(ImageProperties::new().with_gps(void)));
        builder.add(solid(4, 4, [9, 9, 9, 255]), Some(ImageProperties::new().with_gps(located)));
        let container = builder.build(ImageType::Tiff).unwrap();

        assert!(container.first().unwrap().location().is_none());
        let (lat, lon) = container.location().unwrap().decimal_degrees();
        assert!((lat - 43.468365).abs() < 1e-4, "{lat}");
        assert!((lon - 11.881635).abs() < 1e-4, "{lon}");
    }

    #[test]
    fn void_gps_status_has_no_location() {
        let mut gps = GpsProperties::from_coordinates(&GpsCoordinates::new(10.0, 20.0));
        gps.status = Some("V".to_string());
        let props = ImageProperties::new().with_gps(gps);
        assert!(props.gps_properties().is_none());
        assert!(props.location().is_none());
        assert!(!props.has_location());
    }

    #[test]
    fn orientation_is_read_and_removed() {
        // Tall 2x4 image tagged as rotated: displayed it is 4 wide.
        let mut source = RasterHandle::new(solid(2, 4, [0, 0, 0, 255]));
        source = source
            .fill_path(Color::rgb(1.0, 0.0, 0.0), &rect_path(Rect::new(0.0, 0.0, 1.0, 1.0)).unwrap())
            .unwrap()
            .with_properties(ImageProperties::new().with_orientation(Orientation::Right));
        let container = ImageContainer::from_bytes(source.png_data(false).unwrap()).unwrap();
        let frame = container.first().unwrap();
        assert_eq!(frame.orientation(), Orientation::Right);

        let upright = frame.removing_orientation().unwrap();
        let raster = upright.raster().unwrap();
        assert_eq!(raster.dimensions(), (4, 2));
        // Clockwise quarter turn moves the top-left pixel to the top-right.
        assert_eq!(raster.rgba_at(3, 0), Some([255, 0, 0, 255]));
        assert_eq!(upright.properties().unwrap().orientation(), Orientation::Up);
    }

    #[test]
    fn dpi_round_trips_through_png() {
        let props = ImageProperties::new().with_dpi(300.0, 300.0);
        let handle = RasterHandle::new(solid(2, 2, [0, 0, 0, 255])).with_properties(props);
        let container = ImageContainer::from_bytes(handle.png_data(false).unwrap()).unwrap();
        let (x, y) = container.first().unwrap().dpi();
        assert!((x - 300.0).abs() < 1.0 && (y - 300.0).abs() < 1.0, "{x}x{y}");
    }

    #[test]
    fn tiff_keeps_unequal_dpi_axes() {
        let mut builder = ContainerBuilder::new();
        builder.add(solid(3, 3, [0, 0, 0, 255]), Some(ImageProperties::new().with_dpi(300.0, 150.0)));
        let container = builder.build(ImageType::Tiff).unwrap();
        assert_eq!(container.first().unwrap().dpi(), (300.0, 150.0));
    }
}

mod encoding {
    use super::*;

    #[test]
    fn jpeg_size_falls_with_compression() {
        let handle = RasterHandle::new(noisy(96, 96));
        let sizes: Vec<usize> = [1.0, 0.6, 0.3, 0.0]
            .iter()
            .map(|q| handle.jpeg_data(Some(*q), false).unwrap().len())
            .collect();
        assert!(sizes.windows(2).all(|w| w[0] > w[1]), "{sizes:?}");
    }

    #[test]
    fn tiff_data_decodes_back() {
        let handle = RasterHandle::new(solid(5, 5, [90, 80, 70, 255]));
        let container = ImageContainer::from_bytes(handle.tiff_data().unwrap()).unwrap();
        assert_eq!(container.image_type(), ImageType::Tiff);
        assert_eq!(container.first().unwrap().raster().unwrap().rgba_at(2, 2), Some([90, 80, 70, 255]));
    }
}

mod pipelines {
    use super::*;

    #[test]
    fn queued_operations_match_fluent_calls() {
        let handle = RasterHandle::new(noisy(20, 10));
        let ops = [
            Operation::Crop { rect: Rect::new(2.0, 2.0, 12.0, 6.0) },
            Operation::Flip { flip: FlipType::Vertically },
            Operation::Scale { scaling: ScalingType::AxesIndependent, size: Size::new(12.0, 6.0) },
        ];
        let queued = handle.apply(&ops).unwrap();
        let fluent = handle
            .crop(Rect::new(2.0, 2.0, 12.0, 6.0))
            .unwrap()
            .flip(FlipType::Vertically)
            .unwrap()
            .scale(ScalingType::AxesIndependent, Size::new(12.0, 6.0))
            .unwrap();
        assert_eq!(queued.raster().unwrap(), fluent.raster().unwrap());
    }

    #[test]
    fn composite_and_mask_combine_handles() {
        let base = RasterHandle::new(solid(10, 10, [0, 0, 255, 255]));
        let overlay = RasterHandle::new(solid(10, 10, [255, 0, 0, 255]));
        let composed = base.composite(&overlay, Some(Rect::new(0.0, 0.0, 5.0, 10.0)), None).unwrap();
        let left = composed.raster().unwrap().rgba_at(2, 5).unwrap();
        let right = composed.raster().unwrap().rgba_at(8, 5).unwrap();
        assert!(left[0] >= 250 && left[2] <= 5, "{left:?}");
        assert_eq!(right, [0, 0, 255, 255]);

        let hole = RasterHandle::create(Size::new(10.0, 10.0), None, |ctx, _| {
            ctx.set_fill_color(Color::BLACK);
            ctx.fill_rect(Rect::new(0.0, 0.0, 10.0, 5.0))
        })
        .unwrap();
        let masked = composed.mask(&hole).unwrap();
        assert!(masked.raster().unwrap().rgba_at(2, 2).unwrap()[3] >= 250);
        assert_eq!(masked.raster().unwrap().rgba_at(2, 8).map(|p| p[3]), Some(0));
    }

    #[test]
    fn grayscale_then_tint_keeps_alpha() {
        let handle = RasterHandle::new(solid(4, 4, [200, 40, 40, 128]));
        let out = handle.grayscale(true).unwrap().tint(Color::rgb(0.0, 0.0, 1.0), true).unwrap();
        let px = out.raster().unwrap().rgba_at(1, 1).unwrap();
        assert!(px[3].abs_diff(128) <= 1, "{px:?}");
        assert!(px[2] >= px[0] && px[2] >= px[1], "{px:?}");
    }
}

mod thumbnails {
    use super::*;

    #[test]
    fn frame_and_file_thumbnails_agree_on_size() {
        let png = RasterHandle::new(solid(800, 400, [10, 10, 10, 255])).png_data(false).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        std::fs::write(&path, &png).unwrap();

        let container = ImageContainer::from_path(&path).unwrap();
        let frame_thumb = container.first().unwrap().thumbnail(Some(200)).unwrap();
        let file_thumb = FileThumbnail::render(&path, Size::new(200.0, 200.0), 1.0, false).unwrap();
        assert_eq!(frame_thumb.dimensions(), (200, 100));
        assert_eq!(file_thumb.raster().dimensions(), frame_thumb.dimensions());
    }
}
