// ABOUTME: Encoded polyline codec (signed varint deltas, 5-bit groups, 1e5 scale)
// ABOUTME: Turns provider route geometry into ordered latitude/longitude pairs

use serde::{Deserialize, Serialize};

const PRECISION: f64 = 1e5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolylineError {
    #[error("polyline truncated at byte {0}")]
    Truncated(usize),
    #[error("invalid polyline character {byte:#04x} at byte {position}")]
    InvalidByte { byte: u8, position: usize },
    #[error("polyline value overflows at byte {0}")]
    Overflow(usize),
}

/// Decode an encoded polyline into its coordinate sequence.
///
/// An empty string decodes to an empty sequence. Input that ends in the
/// middle of a value is rejected instead of producing a partial point.
pub fn decode(encoded: &str) -> Result<Vec<LatLng>, PolylineError> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while index < bytes.len() {
        lat += next_delta(bytes, &mut index)?;
        lng += next_delta(bytes, &mut index)?;
        points.push(LatLng::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
    }

    Ok(points)
}

/// Encode a coordinate sequence with the same algorithm `decode` reverses.
pub fn encode(points: &[LatLng]) -> String {
    let mut out = String::new();
    let mut prev_lat: i64 = 0;
    let mut prev_lng: i64 = 0;

    for point in points {
        let lat = (point.lat * PRECISION).round() as i64;
        let lng = (point.lng * PRECISION).round() as i64;
        push_value(&mut out, lat - prev_lat);
        push_value(&mut out, lng - prev_lng);
        prev_lat = lat;
        prev_lng = lng;
    }

    out
}

fn next_delta(bytes: &[u8], index: &mut usize) -> Result<i64, PolylineError> {
    let mut result: i64 = 0;
    let mut shift = 0u32;

    loop {
        let position = *index;
        let byte = *bytes.get(position).ok_or(PolylineError::Truncated(position))?;
        if !(63..=126).contains(&byte) {
            return Err(PolylineError::InvalidByte { byte, position });
        }
        if shift > 60 {
            return Err(PolylineError::Overflow(position));
        }

        let chunk = i64::from(byte - 63);
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        *index += 1;

        if chunk < 0x20 {
            break;
        }
    }

    // zigzag: low bit carries the sign
    Ok(if result & 1 == 1 { !(result >> 1) } else { result >> 1 })
}

fn push_value(out: &mut String, value: i64) {
    let mut v = if value < 0 { !(value << 1) } else { value << 1 };
    while v >= 0x20 {
        out.push(char::from((0x20 | (v & 0x1f)) as u8 + 63));
        v >>= 5;
    }
    out.push(char::from(v as u8 + 63));
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSIC: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    #[test]
    fn test_decode_classic_vector() {
        let points = decode(CLASSIC).unwrap();
        assert_eq!(
            points,
            vec![
                LatLng::new(38.5, -120.2),
                LatLng::new(40.7, -120.95),
                LatLng::new(43.252, -126.453),
            ]
        );
    }

    #[test]
    fn test_encode_classic_vector() {
        let points = [
            LatLng::new(38.5, -120.2),
            LatLng::new(40.7, -120.95),
            LatLng::new(43.252, -126.453),
        ];
        assert_eq!(encode(&points), CLASSIC);
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let original = [
            LatLng::new(52.520008, 13.404954),
            LatLng::new(52.516275, 13.377704),
            LatLng::new(-33.868820, 151.209296),
            LatLng::new(0.0, 0.0),
            LatLng::new(-89.99999, 179.99999),
        ];
        let decoded = decode(&encode(&original)).unwrap();
        assert_eq!(decoded.len(), original.len());
        for (a, b) in original.iter().zip(&decoded) {
            assert!((a.lat - b.lat).abs() <= 1e-5, "lat {} vs {}", a.lat, b.lat);
            assert!((a.lng - b.lng).abs() <= 1e-5, "lng {} vs {}", a.lng, b.lng);
        }
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn test_decode_truncated_input() {
        // drop the final character so the last longitude never terminates
        let truncated = &CLASSIC[..CLASSIC.len() - 1];
        assert!(matches!(decode(truncated), Err(PolylineError::Truncated(_))));
    }

    #[test]
    fn test_decode_rejects_latitude_without_longitude() {
        // "_p~iF" is a complete latitude delta with nothing after it
        assert_eq!(decode("_p~iF"), Err(PolylineError::Truncated(5)));
    }

    #[test]
    fn test_decode_invalid_byte() {
        assert!(matches!(
            decode("_p~iF ps|U"),
            Err(PolylineError::InvalidByte { byte: b' ', .. })
        ));
    }
}
