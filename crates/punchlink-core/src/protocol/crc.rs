//! The SI protocol's CRC16 variant
//!
//! This is not CRC-16/CCITT: the register is seeded from the first two data
//! bytes, the input is zero-padded to an even length, and inputs shorter than
//! three bytes are passed through without any checksum computation at all.
//! That quirk is load-bearing and must be preserved.

const CRC_POLYNOM: u32 = 0x8005;
const CRC_BITF: u32 = 0x8000;

/// Compute the SI CRC16 of `data`, returned high byte first.
pub fn crc16(data: &[u8]) -> [u8; 2] {
    if data.len() < 3 {
        // Too short to checksum: the protocol just echoes the bytes.
        return [
            data.first().copied().unwrap_or(0x00),
            data.get(1).copied().unwrap_or(0x00),
        ];
    }

    let mut padded = data.to_vec();
    if padded.len() % 2 == 0 {
        padded.extend_from_slice(&[0x00, 0x00]);
    } else {
        padded.push(0x00);
    }

    let mut crc: u32 = (padded[0] as u32) * 0x100 + padded[1] as u32;
    for chunk in padded[2..].chunks_exact(2) {
        let mut val: u32 = (chunk[0] as u32) * 0x100 + chunk[1] as u32;
        for _ in 0..16 {
            if crc & CRC_BITF != 0 {
                crc <<= 1;
                if val & CRC_BITF != 0 {
                    crc += 1;
                }
                crc ^= CRC_POLYNOM;
            } else {
                crc <<= 1;
                if val & CRC_BITF != 0 {
                    crc += 1;
                }
            }
            val <<= 1;
        }
        crc &= 0xffff;
    }
    [(crc >> 8) as u8, (crc & 0xff) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trivial_inputs_pass_through() {
        assert_eq!(crc16(&[]), [0x00, 0x00]);
        assert_eq!(crc16(&[0x5a]), [0x5a, 0x00]);
        assert_eq!(crc16(&[0x12, 0x34]), [0x12, 0x34]);
    }

    #[test]
    fn test_deterministic() {
        let a = crc16(&[0xf0, 0x01, 0x4d]);
        assert_eq!(a, crc16(&[0xf0, 0x01, 0x4d]));
        let b = crc16(&[0xf0, 0x01, 0x53]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sensitive_to_every_byte() {
        let base = [0x83, 0x02, 0x00, 0x80, 0x11, 0x22, 0x33];
        let reference = crc16(&base);
        for i in 0..base.len() {
            let mut corrupted = base;
            corrupted[i] ^= 0x01;
            assert_ne!(crc16(&corrupted), reference, "byte {} not covered", i);
        }
    }
}
