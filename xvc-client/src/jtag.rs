//! Fixed JTAG sequences and IDCODE decoding.
//!
//! The sequences assume nothing about the TAP state other than what the
//! previous sequence left behind: [`RESET_TAP`] works from any state and ends
//! in Run-Test/Idle, [`ENTER_SHIFT_DR`] goes from Run-Test/Idle to Shift-DR.
//! After a TAP reset every device selects either its IDCODE register
//! (32 bits, bit 0 set) or BYPASS (1 bit, captures 0) as data register.
use std::fmt::Display;

use xvc_protocol::{Message, vector_len};

/// Length of the IDCODE register.
pub const IDCODE_BITS: u32 = 32;

/// A fixed TMS/TDI pattern.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TmsSequence {
    pub num_bits: u32,
    pub tms: &'static [u8],
    pub tdi: &'static [u8],
}

impl TmsSequence {
    pub fn message(&self) -> Message {
        Message::Shift {
            num_bits: self.num_bits,
            tms: self.tms.into(),
            tdi: self.tdi.into(),
        }
    }
}

/// Five clocks with TMS high reach Test-Logic-Reset from any state, the sixth
/// (TMS low) moves on to Run-Test/Idle.
pub const RESET_TAP: TmsSequence = TmsSequence {
    num_bits: 6,
    tms: &[0x1F],
    tdi: &[0x3F],
};

/// Run-Test/Idle -> Select-DR-Scan -> Capture-DR -> Shift-DR.
/// The first clock keeps the TAP in Run-Test/Idle.
pub const ENTER_SHIFT_DR: TmsSequence = TmsSequence {
    num_bits: 4,
    tms: &[0x02],
    tdi: &[0x0F],
};

/// A 32 bit JTAG IDCODE.
///
/// ```text
/// 31    28 27            12 11               1   0
/// | version | part number  | manufacturer JEP106 | 1 |
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct IdCode(u32);

/// JEP106 codes as they appear in bits 11..1: continuation count in the upper
/// four bits, the seven bit manufacturer id (without parity) below.
const MANUFACTURERS: &[(u16, &str)] = &[
    (0x009, "Intel"),
    (0x017, "Texas Instruments"),
    (0x020, "STMicroelectronics"),
    (0x021, "Lattice Semiconductor"),
    (0x041, "Infineon"),
    (0x049, "Xilinx/AMD"),
    (0x06E, "Altera/Intel"),
    (0x23B, "ARM"),
];

impl IdCode {
    pub const fn new(raw: u32) -> IdCode {
        IdCode(raw)
    }

    /// Builds an IDCODE from the first four bytes of a TDO vector.
    pub fn from_tdo(tdo: &[u8]) -> Option<IdCode> {
        let bytes: [u8; 4] = tdo.get(..4)?.try_into().ok()?;
        Some(IdCode(u32::from_le_bytes(bytes)))
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn version(&self) -> u8 {
        (self.0 >> 28) as u8
    }

    pub fn part_number(&self) -> u16 {
        (self.0 >> 12) as u16
    }

    /// The 11 bit JEP106 manufacturer field.
    pub fn manufacturer(&self) -> u16 {
        ((self.0 >> 1) & 0x7FF) as u16
    }

    /// Number of 0x7F continuation codes preceding the manufacturer id.
    pub fn jep106_bank(&self) -> u8 {
        (self.manufacturer() >> 7) as u8
    }

    pub fn jep106_id(&self) -> u8 {
        (self.manufacturer() & 0x7F) as u8
    }

    /// Bit 0 must be set and the manufacturer id may not be the 0x7F continuation
    /// code. All-ones is what a floating or missing TDO reads as.
    pub fn is_valid(&self) -> bool {
        self.0 & 1 == 1 && self.jep106_id() != 0x7F && self.0 != u32::MAX
    }

    pub fn manufacturer_name(&self) -> Option<&'static str> {
        let code = self.manufacturer();
        MANUFACTURERS
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, name)| *name)
    }
}

impl From<u32> for IdCode {
    fn from(value: u32) -> Self {
        IdCode(value)
    }
}

impl Display for IdCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// One entry of a scanned JTAG chain, in TDO order (closest to TDO first).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChainDevice {
    Identified(IdCode),
    Bypass,
}

/// Result of [`decode_chain`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChainScan {
    pub devices: Vec<ChainDevice>,
    /// Set when the ones shifted in on TDI were seen at the end of the chain.
    /// If not set, the chain is longer than scanned or TDO is stuck low.
    pub complete: bool,
}

fn tdo_bit(tdo: &[u8], index: usize) -> bool {
    (tdo[index / 8] >> (index % 8)) & 1 == 1
}

/// Walks the TDO captured while shifting ones through DR right after a TAP reset.
pub fn decode_chain(tdo: &[u8], num_bits: usize, max_devices: usize) -> ChainScan {
    let num_bits = num_bits.min(tdo.len() * 8);
    let mut scan = ChainScan::default();
    let mut pos = 0;
    while pos < num_bits {
        if !tdo_bit(tdo, pos) {
            if scan.devices.len() == max_devices {
                break;
            }
            scan.devices.push(ChainDevice::Bypass);
            pos += 1;
            continue;
        }
        if pos + IDCODE_BITS as usize > num_bits {
            break;
        }
        let word = (0..IDCODE_BITS as usize)
            .filter(|i| tdo_bit(tdo, pos + i))
            .fold(0u32, |acc, i| acc | (1 << i));
        if word == u32::MAX {
            scan.complete = true;
            break;
        }
        if scan.devices.len() == max_devices {
            break;
        }
        scan.devices.push(ChainDevice::Identified(IdCode(word)));
        pos += IDCODE_BITS as usize;
    }
    scan
}

/// A byte aligned piece of a larger shift.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Chunk {
    pub byte_offset: usize,
    pub num_bits: u32,
}

impl Chunk {
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.byte_offset..self.byte_offset + vector_len(self.num_bits)
    }
}

/// Splits a shift of `num_bits` into chunks whose vectors fit into `max_bytes`.
/// All chunks but the last are a whole number of bytes.
pub fn chunk_plan(num_bits: u32, max_bytes: usize) -> impl Iterator<Item = Chunk> {
    let chunk_bits = u32::try_from(max_bytes.max(1).saturating_mul(8)).unwrap_or(u32::MAX & !7);
    let mut done = 0u32;
    std::iter::from_fn(move || {
        if done >= num_bits {
            return None;
        }
        let bits = (num_bits - done).min(chunk_bits);
        let chunk = Chunk {
            byte_offset: (done / 8) as usize,
            num_bits: bits,
        };
        done += bits;
        Some(chunk)
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn push_bits(stream: &mut Vec<bool>, value: u32, count: usize) {
        stream.extend((0..count).map(|i| (value >> i) & 1 == 1));
    }

    fn pack(stream: &[bool]) -> Vec<u8> {
        let mut out = vec![0u8; stream.len().div_ceil(8)];
        for (i, bit) in stream.iter().enumerate() {
            if *bit {
                out[i / 8] |= 1 << (i % 8);
            }
        }
        out
    }

    #[test]
    fn sequences_match_their_vectors() {
        for seq in [RESET_TAP, ENTER_SHIFT_DR] {
            assert_eq!(seq.tms.len(), vector_len(seq.num_bits));
            assert_eq!(seq.tdi.len(), vector_len(seq.num_bits));
        }
        assert_eq!(
            RESET_TAP.message().to_bytes(),
            b"shift:\x06\x00\x00\x00\x1F\x3F"
        );
    }

    #[test]
    fn xilinx_idcode_fields() {
        // XC7A35T
        let id = IdCode::new(0x0362_D093);
        assert_eq!(id.version(), 0);
        assert_eq!(id.part_number(), 0x362D);
        assert_eq!(id.manufacturer(), 0x049);
        assert_eq!(id.jep106_bank(), 0);
        assert_eq!(id.manufacturer_name(), Some("Xilinx/AMD"));
        assert!(id.is_valid());
        assert_eq!(id.to_string(), "0362D093");
    }

    #[test]
    fn arm_idcode_uses_continuation_bank() {
        let id = IdCode::new(0x4BA0_0477);
        assert_eq!(id.version(), 4);
        assert_eq!(id.jep106_bank(), 4);
        assert_eq!(id.jep106_id(), 0x3B);
        assert_eq!(id.manufacturer_name(), Some("ARM"));
    }

    #[test]
    fn invalid_idcodes() {
        assert!(!IdCode::new(0).is_valid());
        assert!(!IdCode::new(u32::MAX).is_valid());
        assert!(!IdCode::new(0x0000_00FF).is_valid());
        assert_eq!(IdCode::new(0x0000_0003).manufacturer_name(), None);
    }

    #[test]
    fn idcode_from_tdo_is_little_endian() {
        let id = IdCode::from_tdo(&[0x93, 0xD0, 0x62, 0x03]).unwrap();
        assert_eq!(id.raw(), 0x0362_D093);
        assert_eq!(IdCode::from_tdo(&[0x93, 0xD0]), None);
    }

    #[test]
    fn chain_with_bypass_device() {
        let mut stream = Vec::new();
        push_bits(&mut stream, 0x0362_D093, 32);
        stream.push(false);
        push_bits(&mut stream, 0x4BA0_0477, 32);
        push_bits(&mut stream, u32::MAX, 32);
        let tdo = pack(&stream);

        let scan = decode_chain(&tdo, stream.len(), 8);
        assert!(scan.complete);
        assert_eq!(
            scan.devices,
            vec![
                ChainDevice::Identified(IdCode::new(0x0362_D093)),
                ChainDevice::Bypass,
                ChainDevice::Identified(IdCode::new(0x4BA0_0477)),
            ]
        );
    }

    #[test]
    fn chain_stuck_low_is_incomplete() {
        let tdo = vec![0u8; 12];
        let scan = decode_chain(&tdo, 96, 4);
        assert!(!scan.complete);
        assert_eq!(scan.devices, vec![ChainDevice::Bypass; 4]);
    }

    #[test]
    fn chain_stuck_high_has_no_devices() {
        let scan = decode_chain(&[0xFF; 8], 64, 4);
        assert!(scan.complete);
        assert!(scan.devices.is_empty());
    }

    #[test]
    fn chunks_are_byte_aligned() {
        let chunks: Vec<Chunk> = chunk_plan(21, 1).collect();
        assert_eq!(
            chunks,
            vec![
                Chunk { byte_offset: 0, num_bits: 8 },
                Chunk { byte_offset: 1, num_bits: 8 },
                Chunk { byte_offset: 2, num_bits: 5 },
            ]
        );
        assert_eq!(chunks[2].byte_range(), 2..3);
    }

    #[test]
    fn single_chunk_when_it_fits() {
        let chunks: Vec<Chunk> = chunk_plan(32, 2048).collect();
        assert_eq!(chunks, vec![Chunk { byte_offset: 0, num_bits: 32 }]);
        assert_eq!(chunk_plan(0, 16).count(), 0);
    }
}
