use crate::BitWidth;

/// Length of the welcome header sent once per connection.
pub const HEADER_LEN: usize = 100;

/// Protocol family magic at offset 0.
pub const HEADER_MAGIC: [u8; 4] = *b"RTL0";

/// The fixed 100-byte header existing rtl_tcp clients expect on connect.
///
/// Everything not listed here is zero. Client software parses these offsets
/// byte for byte, so the layout must not move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WelcomeHeader {
    /// Sample format of the stream that follows (offset 6).
    pub bit_width: BitWidth,
    /// Receiver type code (offset 7).
    pub tuner_type: u8,
    /// Number of gain steps the client may address (offset 11).
    pub gain_count: u8,
    /// ASCII model tag (offsets 15..19).
    pub model: [u8; 4],
}

impl WelcomeHeader {
    pub const RSP2_TUNER_TYPE: u8 = 8;
    pub const RSP2_GAIN_COUNT: u8 = 100;
    pub const RSP2_MODEL: [u8; 4] = *b"RSP2";

    pub fn rsp2(bit_width: BitWidth) -> Self {
        Self {
            bit_width,
            tuner_type: Self::RSP2_TUNER_TYPE,
            gain_count: Self::RSP2_GAIN_COUNT,
            model: Self::RSP2_MODEL,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&HEADER_MAGIC);
        buf[6] = self.bit_width.code();
        buf[7] = self.tuner_type;
        buf[11] = self.gain_count;
        buf[15..19].copy_from_slice(&self.model);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsp2_header_layout() {
        let bytes = WelcomeHeader::rsp2(BitWidth::Sixteen).to_bytes();

        let mut expected = [0u8; HEADER_LEN];
        expected[..4].copy_from_slice(b"RTL0");
        expected[6] = 2;
        expected[7] = 8;
        expected[11] = 100;
        expected[15..19].copy_from_slice(b"RSP2");

        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_header_carries_bit_width_code() {
        let bytes = WelcomeHeader::rsp2(BitWidth::Eight).to_bytes();
        assert_eq!(bytes[6], 1);
        assert!(bytes[19..].iter().all(|&b| b == 0));
    }
}
