use crc::{Crc, CRC_16_KERMIT};

const KERMIT: Crc<u16> = Crc::<u16>::new(&CRC_16_KERMIT);

/// CRC-16/Kermit: poly 0x1021, init 0, reflected in and out, no final XOR.
pub fn checksum(bytes: &[u8]) -> u16 {
    KERMIT.checksum(bytes)
}
