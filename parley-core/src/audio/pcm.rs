//! PCM16 little-endian codec and the transport text encoding.
//!
//! Pure functions, no state. Samples scale by `32768` and positive values
//! saturate at `i16::MAX`, so the full signed range is used and every sample in
//! [-1.0, 1.0] survives a round trip within `1 / 32768`.
//! Decoding always divides by `32768.0`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::{ParleyError, Result};

/// Encode f32 samples as signed 16-bit little-endian PCM.
///
/// Samples outside [-1.0, 1.0] are clamped. NaN encodes as silence.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        out.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }
    out
}

/// Decode signed 16-bit little-endian PCM into f32 samples.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Encode raw bytes for the text transport.
pub fn to_transport(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode transport text back to raw bytes.
///
/// # Errors
/// Returns `ParleyError::Decode` when the text is not valid base64.
pub fn from_transport(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text.trim())
        .map_err(|e| ParleyError::Decode(format!("transport decode: {e}")))
}

#[inline]
fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s >= 0.0 {
        (s * 32768.0).round().min(i16::MAX as f32) as i16
    } else {
        (s * 32768.0).round() as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_scale_maps_to_i16_extremes() {
        let bytes = encode_pcm16(&[1.0, -1.0, 0.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MIN);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), 0);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let bytes = encode_pcm16(&[3.5, -7.0, f32::NAN]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MIN);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), 0);
    }

    #[test]
    fn encoding_is_little_endian() {
        // 0.5 * 32768 = 16384 = 0x4000
        let bytes = encode_pcm16(&[0.5]);
        assert_eq!(bytes, vec![0x00, 0x40]);
    }

    #[test]
    fn round_trip_within_one_quantisation_step() {
        let samples: Vec<f32> = (0..2_000)
            .map(|i| ((i as f32 * 0.37).sin() * 0.999).clamp(-1.0, 1.0))
            .chain([1.0, -1.0, 0.0, 1e-6, -1e-6])
            .collect();
        let decoded = decode_pcm16(&encode_pcm16(&samples));
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.iter()) {
            approx::assert_abs_diff_eq!(*a, *b, epsilon = 1.0 / 32768.0 + f32::EPSILON);
        }
    }

    #[test]
    fn trailing_odd_byte_is_truncated() {
        let mut bytes = encode_pcm16(&[0.25, -0.25]);
        bytes.push(0x7f);
        let decoded = decode_pcm16(&bytes);
        assert_eq!(decoded.len(), 2);
        assert!(decode_pcm16(&[0x01]).is_empty());
    }

    #[test]
    fn transport_round_trip_is_exact() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![0xff, 0x00],
            (0..=255u8).collect(),
            encode_pcm16(&[0.1, -0.9, 0.33]),
        ];
        for bytes in cases {
            let text = to_transport(&bytes);
            assert_eq!(from_transport(&text).expect("decode transport"), bytes);
        }
    }

    #[test]
    fn malformed_transport_text_is_a_decode_error() {
        let err = from_transport("not*base64!").unwrap_err();
        assert!(matches!(err, ParleyError::Decode(_)));
    }
}
