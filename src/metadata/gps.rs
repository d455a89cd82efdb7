// src/metadata/gps.rs
//
// GPS coordinates: hemisphere-referenced values, degree/minute/second
// decomposition and string forms.

use crate::error::RasterKitError;
use std::fmt;
use std::str::FromStr;

/// One coordinate: a magnitude plus a hemisphere letter (`N`, `S`, `E`, `W`).
#[derive(Clone, Debug, PartialEq)]
pub struct GpsCoordinate {
    pub value: f64,
    pub reference: String,
}

impl GpsCoordinate {
    pub fn with_reference(value: f64, reference: impl Into<String>) -> Self {
        Self {
            value,
            reference: reference.into(),
        }
    }

    /// Derives the hemisphere from the sign of a signed decimal value.
    pub fn new(value: f64, is_latitude: bool) -> Self {
        let reference = match (is_latitude, value < 0.0) {
            (true, false) => "N",
            (true, true) => "S",
            (false, false) => "E",
            (false, true) => "W",
        };
        Self::with_reference(value.abs(), reference)
    }

    /// Signed form referenced to `N`/`E`.
    pub fn normalized(&self) -> Self {
        match self.reference.as_str() {
            "S" => Self::with_reference(-self.value, "N"),
            "W" => Self::with_reference(-self.value, "E"),
            _ => self.clone(),
        }
    }

    pub fn degrees(&self) -> u32 {
        self.value.abs().trunc() as u32
    }

    pub fn minutes(&self) -> u32 {
        (self.value.abs().fract() * 60.0).trunc() as u32
    }

    pub fn seconds(&self) -> f64 {
        (self.value.abs().fract() * 60.0).fract() * 60.0
    }

    /// `43° 28′ 6.114″ N`
    pub fn dms_string(&self) -> String {
        format!(
            "{}° {}′ {}″ {}",
            self.degrees(),
            self.minutes(),
            format_fraction(self.seconds()),
            self.reference
        )
    }

    /// `43.468 N`
    pub fn string_value(&self) -> String {
        format!("{} {}", format_fraction(self.value), self.reference)
    }

    pub fn is_latitude(&self) -> bool {
        matches!(self.reference.as_str(), "N" | "S")
    }

    /// Degrees, minutes and seconds as EXIF rationals (numerator, denominator).
    pub fn dms_rationals(&self) -> [(u32, u32); 3] {
        let seconds = (self.seconds() * 10_000.0).round().clamp(0.0, u32::MAX as f64) as u32;
        [(self.degrees(), 1), (self.minutes(), 1), (seconds, 10_000)]
    }
}

impl fmt::Display for GpsCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.reference)
    }
}

/// Parses either a DMS string (`43° 28′ 6.114″ N`, ASCII `'`/`"` accepted)
/// or a decimal string (`43.468365 N`).
impl FromStr for GpsCoordinate {
    type Err = RasterKitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| RasterKitError::invalid_coordinate(s.to_string(), reason);
        let (body, reference) = match s.char_indices().last() {
            Some((idx, c)) if matches!(c, 'N' | 'S' | 'E' | 'W') => (s[..idx].trim(), c),
            _ => return Err(invalid("missing hemisphere reference".to_string())),
        };

        let numbers: Vec<f64> = body
            .split(|c: char| matches!(c, '°' | '′' | '″' | '\'' | '"') || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<f64>()
                    .map_err(|_| invalid(format!("invalid number '{part}'")))
            })
            .collect::<Result<_, _>>()?;

        let value = match numbers.as_slice() {
            [deg] => *deg,
            [deg, min] => deg + min / 60.0,
            [deg, min, sec] => deg + min / 60.0 + sec / 3600.0,
            _ => return Err(invalid("expected 1 to 3 components".to_string())),
        };
        if !value.is_finite() {
            return Err(invalid("non-finite value".to_string()));
        }
        Ok(Self::with_reference(value, reference.to_string()))
    }
}

/// A latitude/longitude pair.
#[derive(Clone, Debug, PartialEq)]
pub struct GpsCoordinates {
    pub latitude: GpsCoordinate,
    pub longitude: GpsCoordinate,
}

impl GpsCoordinates {
    pub fn from_parts(
        latitude: f64,
        latitude_ref: impl Into<String>,
        longitude: f64,
        longitude_ref: impl Into<String>,
    ) -> Self {
        Self {
            latitude: GpsCoordinate::with_reference(latitude, latitude_ref),
            longitude: GpsCoordinate::with_reference(longitude, longitude_ref),
        }
    }

    /// From signed decimal degrees.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: GpsCoordinate::new(latitude, true),
            longitude: GpsCoordinate::new(longitude, false),
        }
    }

    pub fn normalized(&self) -> Self {
        Self {
            latitude: self.latitude.normalized(),
            longitude: self.longitude.normalized(),
        }
    }

    /// Signed (latitude, longitude) in decimal degrees.
    pub fn decimal_degrees(&self) -> (f64, f64) {
        let n = self.normalized();
        (n.latitude.value, n.longitude.value)
    }

    pub fn string_value(&self) -> String {
        format!(
            "{}, {}",
            self.latitude.string_value(),
            self.longitude.string_value()
        )
    }

    pub fn dms_string(&self) -> String {
        format!("{}, {}", self.latitude.dms_string(), self.longitude.dms_string())
    }
}

impl fmt::Display for GpsCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// At most three fraction digits, trailing zeros trimmed.
fn format_fraction(value: f64) -> String {
    let formatted = format!("{value:.3}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod decomposition_tests {
        use super::*;

        #[test]
        fn dms_truncates_rather_than_rounds() {
            let c = GpsCoordinate::with_reference(43.468365, "N");
            assert_eq!(c.degrees(), 43);
            assert_eq!(c.minutes(), 28);
            assert!((c.seconds() - 6.114).abs() < 1e-3);
            assert_eq!(c.dms_string(), "43° 28′ 6.114″ N");
        }

        #[test]
        fn dms_rationals_keep_four_second_decimals() {
            let c = GpsCoordinate::with_reference(43.468365, "N");
            let [(d, 1), (m, 1), (s, 10_000)] = c.dms_rationals() else {
                panic!("unexpected denominators");
            };
            assert_eq!((d, m), (43, 28));
            assert!((s as f64 / 10_000.0 - 6.114).abs() < 1e-3);
        }

        #[test]
        fn seconds_never_reach_sixty() {
            let c = GpsCoordinate::with_reference(10.999_999_9, "E");
            assert_eq!(c.minutes(), 59);
            assert!(c.seconds() < 60.0);
        }

        #[test]
        fn string_value_trims_fraction() {
            assert_eq!(
                GpsCoordinate::with_reference(11.881635, "E").string_value(),
                "11.882 E"
            );
            assert_eq!(GpsCoordinate::with_reference(5.0, "N").string_value(), "5 N");
        }
    }

    mod normalization_tests {
        use super::*;

        #[test]
        fn south_and_west_become_negative() {
            let c = GpsCoordinates::from_parts(33.86, "S", 151.21, "W").normalized();
            assert_eq!(c.latitude.reference, "N");
            assert_eq!(c.longitude.reference, "E");
            assert!(c.latitude.value < 0.0);
            assert!(c.longitude.value < 0.0);
        }

        #[test]
        fn signed_constructor_derives_reference() {
            let c = GpsCoordinates::new(-33.86, 151.21);
            assert_eq!(c.latitude.reference, "S");
            assert_eq!(c.longitude.reference, "E");
            assert_eq!(c.decimal_degrees(), (-33.86, 151.21));
        }

        #[test]
        fn north_east_unchanged() {
            let c = GpsCoordinate::with_reference(1.5, "N");
            assert_eq!(c.normalized(), c);
        }
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn dms_round_trip_within_tolerance() {
            let lat = GpsCoordinate::with_reference(43.468365, "N");
            let lon = GpsCoordinate::with_reference(11.881635, "E");
            for c in [lat, lon] {
                let parsed: GpsCoordinate = c.dms_string().parse().unwrap();
                assert_eq!(parsed.reference, c.reference);
                assert!((parsed.value - c.value).abs() < 0.0001);
            }
        }

        #[test]
        fn ascii_marks_and_decimal_forms_parse() {
            let a: GpsCoordinate = "43° 28' 6.114\" N".parse().unwrap();
            assert!((a.value - 43.468365).abs() < 0.0001);
            let b: GpsCoordinate = "11.881635 E".parse().unwrap();
            assert_eq!(b.value, 11.881635);
        }

        #[test]
        fn malformed_strings_rejected() {
            for input in ["43.5", "abc N", "1 2 3 4 N", "inf N"] {
                let err = input.parse::<GpsCoordinate>().unwrap_err();
                assert!(
                    matches!(err, RasterKitError::InvalidCoordinate { ref value, .. } if value == input),
                    "{input}: {err}"
                );
                assert!(err.is_recoverable());
            }
        }
    }
}
