use std::fmt::Display;

use crate::error::ReadError;

/// The version of the protocol.
/// A version always consists of a major and a minor part.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version {
    major: usize,
    minor: usize,
}

impl Version {
    /// Version 1.0 of the protocol
    pub const V1_0: Version = Version { major: 1, minor: 0 };

    /// Returns the latest supported version
    pub fn latest() -> Version {
        Version::V1_0
    }

    pub fn major(&self) -> usize {
        self.major
    }

    pub fn minor(&self) -> usize {
        self.minor
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::latest()
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Number of bytes needed to carry `num_bits` bits of a TMS, TDI or TDO vector.
pub fn vector_len(num_bits: u32) -> usize {
    num_bits.div_ceil(8) as usize
}

/// A request sent from the client to the server.
///
/// Every request is answered by exactly one reply, and replies arrive in the
/// order the requests were sent. XVC 1.0 has no way to report errors, so a
/// server that cannot serve a request typically closes the connection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    /// Asks for the server's protocol version and maximum vector length.
    /// Answered by an [`XvcInfo`] line.
    GetInfo,
    /// Requests a TCK period. Answered by the period (in ns) the cable actually uses.
    SetTck { period_ns: u32 },
    /// Clocks `num_bits` TCK cycles, driving TMS and TDI from the vectors.
    /// Answered by the TDO vector, which has the same length as `tms` and `tdi`.
    ///
    /// Bit 0 of byte 0 is clocked first.
    Shift {
        num_bits: u32,
        tms: Box<[u8]>,
        tdi: Box<[u8]>,
    },
}

impl Message {
    /// Builds a [`Message::Shift`], checking that both vectors have exactly
    /// `ceil(num_bits / 8)` bytes.
    pub fn shift(
        num_bits: u32,
        tms: impl Into<Box<[u8]>>,
        tdi: impl Into<Box<[u8]>>,
    ) -> Result<Message, ReadError> {
        let tms = tms.into();
        let tdi = tdi.into();
        let expected = vector_len(num_bits);
        if tms.len() != expected || tdi.len() != expected {
            return Err(ReadError::VectorLength {
                num_bits,
                expected,
                tms: tms.len(),
                tdi: tdi.len(),
            });
        }
        Ok(Message::Shift { num_bits, tms, tdi })
    }
}

/// Server capabilities, sent in reply to [`Message::GetInfo`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct XvcInfo {
    version: Version,
    max_vector_len: u32,
}

impl XvcInfo {
    pub fn new(version: Version, max_vector_len: u32) -> XvcInfo {
        XvcInfo {
            version,
            max_vector_len,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The largest vector, in bytes, the server accepts in a single shift
    pub fn max_vector_len(&self) -> u32 {
        self.max_vector_len
    }
}

impl Default for XvcInfo {
    fn default() -> XvcInfo {
        XvcInfo {
            version: Version::default(),
            max_vector_len: 10 * 1024 * 1024,
        }
    }
}

impl Display for XvcInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "xvcServer_v{}:{}", self.version, self.max_vector_len)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_ordering() {
        assert!(Version { major: 1, minor: 0 } < Version { major: 1, minor: 1 });
        assert!(Version { major: 2, minor: 0 } > Version { major: 1, minor: 0 });
        assert_eq!(Version::latest().to_string(), "1.0");
    }

    #[test]
    fn vector_len_rounds_up() {
        assert_eq!(vector_len(0), 0);
        assert_eq!(vector_len(1), 1);
        assert_eq!(vector_len(8), 1);
        assert_eq!(vector_len(9), 2);
        assert_eq!(vector_len(32), 4);
    }

    #[test]
    fn shift_rejects_mismatched_vectors() {
        match Message::shift(9, vec![0u8; 2], vec![0u8; 1]) {
            Err(ReadError::VectorLength {
                num_bits,
                expected,
                tms,
                tdi,
            }) => {
                assert_eq!(num_bits, 9);
                assert_eq!(expected, 2);
                assert_eq!(tms, 2);
                assert_eq!(tdi, 1);
            }
            other => panic!("expected VectorLength, got {:?}", other),
        }
    }

    #[test]
    fn info_display_has_no_newline() {
        let info = XvcInfo::new(Version::V1_0, 2048);
        assert_eq!(info.to_string(), "xvcServer_v1.0:2048");
    }
}
