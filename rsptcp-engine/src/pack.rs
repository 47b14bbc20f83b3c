//! Conversion of raw device samples into the client wire format.

use num_complex::Complex;
use rsptcp_messages::BitWidth;

/// 16-bit sample to offset-binary byte: `sample / 64 + 127`, clamped.
pub fn to_offset_byte(sample: i16) -> u8 {
    (sample as i32 / 64 + 127).clamp(0, u8::MAX as i32) as u8
}

/// Pack a block into `out` (cleared first) in the requested bit width.
/// Interleaved I then Q; 16-bit values are little-endian.
pub fn pack_block(samples: &[Complex<i16>], width: BitWidth, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * width.bytes_per_pair());
    match width {
        BitWidth::Sixteen => {
            for s in samples {
                out.extend_from_slice(&s.re.to_le_bytes());
                out.extend_from_slice(&s.im.to_le_bytes());
            }
        }
        BitWidth::Eight => {
            for s in samples {
                out.push(to_offset_byte(s.re));
                out.push(to_offset_byte(s.im));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inverse of the 8-bit transform, up to the quantisation step.
    fn from_offset_byte(b: u8) -> i16 {
        (b as i16 - 127) * 64
    }

    #[test]
    fn test_pack16_little_endian_interleaved() {
        let samples = [Complex::new(0x1234i16, -2i16), Complex::new(-32768, 32767)];
        let mut out = Vec::new();
        pack_block(&samples, BitWidth::Sixteen, &mut out);
        assert_eq!(
            out,
            vec![0x34, 0x12, 0xFE, 0xFF, 0x00, 0x80, 0xFF, 0x7F]
        );
    }

    #[test]
    fn test_pack8_offset_binary() {
        let samples = [Complex::new(0i16, 64i16), Complex::new(-64, 6400)];
        let mut out = Vec::new();
        pack_block(&samples, BitWidth::Eight, &mut out);
        assert_eq!(out, vec![127, 128, 126, 227]);
    }

    #[test]
    fn test_pack8_clamps_extremes() {
        assert_eq!(to_offset_byte(i16::MIN), 0);
        assert_eq!(to_offset_byte(i16::MAX), 255);
        assert_eq!(to_offset_byte(-8128), 0);
        assert_eq!(to_offset_byte(8128), 254);
        assert_eq!(to_offset_byte(8192), 255);
    }

    #[test]
    fn test_pack8_stable_under_approximate_inverse() {
        for x in (i16::MIN..=i16::MAX).step_by(97) {
            let once = to_offset_byte(x);
            let twice = to_offset_byte(from_offset_byte(once));
            assert!(
                (once as i32 - twice as i32).abs() <= 1,
                "x={x} once={once} twice={twice}"
            );
        }
    }

    #[test]
    fn test_pack_reuses_buffer() {
        let mut out = vec![0xAA; 32];
        pack_block(&[Complex::new(1, 1)], BitWidth::Eight, &mut out);
        assert_eq!(out.len(), 2);
    }
}
