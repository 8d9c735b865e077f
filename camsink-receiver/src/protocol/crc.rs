//! CRC-32 for frame checksums.
//!
//! The CHECKSUM field covers `MAC || KIND || SEQUENCE || DATA_LEN ||
//! PAYLOAD`, i.e. everything between the start marker and the checksum
//! itself. The algorithm is CRC-32/ISO-HDLC, the same variant used by
//! zlib and Ethernet.

use crc_all::CrcAlgo;

/// Calculates the CRC-32/ISO-HDLC checksum over a slice of bytes.
///
/// Polynomial 0x04c11db7, initial value 0xffffffff, output XOR
/// 0xffffffff, with bit reflection on input and output.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = CRC32_INIT;
    CRC32.update_crc(&mut crc, data);
    CRC32.finish_crc(&crc)
}

const CRC32_INIT: u32 = 0xffff_ffff;

const CRC32: CrcAlgo<u32> = CrcAlgo::<u32>::new(
    0x04c1_1db7, // polynomial
    32,          // width
    CRC32_INIT,  // init
    0xffff_ffff, // xorout
    true,        // reflect
);

#[cfg(test)]
mod tests {
    use test_case::test_case;

    // Check values for CRC-32/ISO-HDLC from the published catalogue plus a
    // couple of degenerate inputs.
    #[test_case(b"123456789", 0xcbf4_3926; "catalogue check value")]
    #[test_case(b"", 0x0000_0000; "empty input")]
    #[test_case(&[0x00], 0xd202_ef8d; "single zero byte")]
    fn calculate(data: &[u8], expect: u32) {
        assert_eq!(super::crc32(data), expect);
    }

    #[test]
    fn sensitive_to_single_bit_flip() {
        let a = super::crc32(b"camsink frame payload");
        let b = super::crc32(b"camsink frame paylaod");
        assert_ne!(a, b);
    }
}
