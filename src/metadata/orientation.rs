// src/metadata/orientation.rs
//
// EXIF orientation values and the geometry needed to undo them.

use std::fmt;
use tiny_skia::Transform;

/// The eight EXIF orientations (tag 0x0112).
///
/// Each value describes how the stored pixels must be transformed to be
/// displayed upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[default]
    Up,
    UpMirrored,
    Down,
    DownMirrored,
    LeftMirrored,
    Right,
    RightMirrored,
    Left,
}

/// Un-rotation recipe for an orientation.
///
/// `degrees` is counter-clockwise on screen: drawing the mirrored source
/// rotated by `-degrees` clockwise yields the upright image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientationTransform {
    pub degrees: f32,
    pub swap_dimensions: bool,
    pub mirrored: bool,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Orientation::Up,
        Orientation::UpMirrored,
        Orientation::Down,
        Orientation::DownMirrored,
        Orientation::LeftMirrored,
        Orientation::Right,
        Orientation::RightMirrored,
        Orientation::Left,
    ];

    /// `None` for values outside 1..=8.
    pub fn from_exif(value: u32) -> Option<Self> {
        Some(match value {
            1 => Orientation::Up,
            2 => Orientation::UpMirrored,
            3 => Orientation::Down,
            4 => Orientation::DownMirrored,
            5 => Orientation::LeftMirrored,
            6 => Orientation::Right,
            7 => Orientation::RightMirrored,
            8 => Orientation::Left,
            _ => return None,
        })
    }

    pub fn exif_value(&self) -> u16 {
        match self {
            Orientation::Up => 1,
            Orientation::UpMirrored => 2,
            Orientation::Down => 3,
            Orientation::DownMirrored => 4,
            Orientation::LeftMirrored => 5,
            Orientation::Right => 6,
            Orientation::RightMirrored => 7,
            Orientation::Left => 8,
        }
    }

    pub fn transform(&self) -> OrientationTransform {
        let (degrees, swap_dimensions, mirrored) = match self {
            Orientation::Up => (0.0, false, false),
            Orientation::UpMirrored => (0.0, false, true),
            Orientation::Right => (-90.0, true, false),
            Orientation::RightMirrored => (-90.0, true, true),
            Orientation::Down => (180.0, false, false),
            Orientation::DownMirrored => (180.0, false, true),
            Orientation::Left => (90.0, true, false),
            Orientation::LeftMirrored => (90.0, true, true),
        };
        OrientationTransform {
            degrees,
            swap_dimensions,
            mirrored,
        }
    }

    pub fn is_mirrored(&self) -> bool {
        self.transform().mirrored
    }

    pub fn swaps_dimensions(&self) -> bool {
        self.transform().swap_dimensions
    }

    /// Pixel size of the upright image for a stored `width` x `height`.
    pub fn oriented_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

impl OrientationTransform {
    /// Maps source pixel space (`width` x `height`) onto the upright output.
    ///
    /// Mirroring happens in source space, then the image turns about its
    /// centre and is re-centred in the (possibly swapped) output.
    pub fn to_transform(&self, width: f32, height: f32) -> Transform {
        let (out_w, out_h) = if self.swap_dimensions {
            (height, width)
        } else {
            (width, height)
        };
        let mut t = Transform::from_translate(out_w / 2.0, out_h / 2.0)
            .pre_rotate(-self.degrees)
            .pre_translate(-width / 2.0, -height / 2.0);
        if self.mirrored {
            t = t.pre_translate(width, 0.0).pre_scale(-1.0, 1.0);
        }
        t
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Orientation::Up => "up",
            Orientation::UpMirrored => "upMirrored",
            Orientation::Down => "down",
            Orientation::DownMirrored => "downMirrored",
            Orientation::LeftMirrored => "leftMirrored",
            Orientation::Right => "right",
            Orientation::RightMirrored => "rightMirrored",
            Orientation::Left => "left",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::Point;

    fn map(o: Orientation, w: f32, h: f32, x: f32, y: f32) -> (f32, f32) {
        let mut p = [Point::from_xy(x, y)];
        o.transform().to_transform(w, h).map_points(&mut p);
        (p[0].x.round(), p[0].y.round())
    }

    #[test]
    fn exif_values_round_trip() {
        for o in Orientation::ALL {
            assert_eq!(Orientation::from_exif(o.exif_value() as u32), Some(o));
        }
        assert_eq!(Orientation::from_exif(0), None);
        assert_eq!(Orientation::from_exif(9), None);
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        assert_eq!(Orientation::Right.oriented_size(40, 10), (10, 40));
        assert_eq!(Orientation::Down.oriented_size(40, 10), (40, 10));
        assert_eq!(Orientation::LeftMirrored.oriented_size(3, 7), (7, 3));
    }

    #[test]
    fn up_is_identity() {
        assert_eq!(map(Orientation::Up, 4.0, 2.0, 1.0, 1.0), (1.0, 1.0));
    }

    #[test]
    fn right_turns_clockwise() {
        // Top-left corner of a 4x2 source lands at the top-right of the 2x4 output.
        assert_eq!(map(Orientation::Right, 4.0, 2.0, 0.0, 0.0), (2.0, 0.0));
        assert_eq!(map(Orientation::Left, 4.0, 2.0, 0.0, 0.0), (0.0, 4.0));
    }

    #[test]
    fn mirrored_quarter_turns_are_transpose_and_transverse() {
        // Transpose keeps (x, y) -> (y, x).
        assert_eq!(map(Orientation::LeftMirrored, 4.0, 2.0, 3.0, 1.0), (1.0, 3.0));
        // Transverse maps (x, y) -> (h - y, w - x).
        assert_eq!(map(Orientation::RightMirrored, 4.0, 2.0, 3.0, 1.0), (1.0, 1.0));
    }

    #[test]
    fn down_mirrored_is_vertical_flip() {
        assert_eq!(map(Orientation::DownMirrored, 4.0, 2.0, 1.0, 0.0), (1.0, 2.0));
        assert_eq!(map(Orientation::UpMirrored, 4.0, 2.0, 1.0, 0.0), (3.0, 0.0));
    }
}
