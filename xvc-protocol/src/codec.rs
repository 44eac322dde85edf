/// Blocking read and write implementations for the protocol messages
use std::io::{self, Read, Write};

use crate::{
    error::ReadError,
    protocol::{Message, Version, XvcInfo, vector_len},
};

const XVC_INFO_PREFIX: &[u8] = b"xvcServer_v";

/// Upper bound for an info line, newline included. Real servers send about 25 bytes.
pub const MAX_INFO_LINE: usize = 64;

impl XvcInfo {
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writeln!(writer, "{}", self)
    }

    /// Reads and parses a newline terminated info line.
    pub fn from_reader(reader: &mut impl Read) -> Result<XvcInfo, ReadError> {
        XvcInfo::parse(&XvcInfo::read_line(reader)?)
    }

    /// Reads the info line as sent, newline included.
    ///
    /// The line is consumed byte by byte so that nothing following the
    /// newline is taken from the reader.
    pub fn read_line(reader: &mut impl Read) -> Result<Vec<u8>, ReadError> {
        let mut line = Vec::with_capacity(32);
        let mut byte = [0u8; 1];
        loop {
            match reader.read(&mut byte) {
                Ok(0) if line.is_empty() => {
                    return Err(ReadError::IoError(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed before the info line",
                    )));
                }
                Ok(0) => {
                    return Err(ReadError::Truncated {
                        expected: line.len() + 1,
                        got: line.len(),
                    });
                }
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
            line.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
            if line.len() >= MAX_INFO_LINE {
                return Err(ReadError::TooManyBytes {
                    max: MAX_INFO_LINE,
                    got: line.len(),
                });
            }
        }
        Ok(line)
    }

    /// Parses `xvcServer_v{version}:{max_vector_len}`, with or without trailing newline.
    pub fn parse(line: &[u8]) -> Result<XvcInfo, ReadError> {
        let line = line.trim_ascii_end();
        let rest = line.strip_prefix(XVC_INFO_PREFIX).ok_or_else(|| {
            ReadError::InvalidFormat(format!(
                "Invalid prefix in info message: {}",
                line.escape_ascii()
            ))
        })?;

        let colon_index = rest.iter().position(|b| *b == b':').ok_or_else(|| {
            ReadError::InvalidFormat("Missing ':' separator in info message".to_string())
        })?;
        let (version_part, len_part) = rest.split_at(colon_index);

        let version = match version_part {
            b"1.0" => Version::V1_0,
            _ => {
                return Err(ReadError::UnsupportedVersion(
                    String::from_utf8_lossy(version_part).to_string(),
                ));
            }
        };

        let max_vector_len = str::from_utf8(&len_part[1..])?.parse::<u32>()?;
        Ok(XvcInfo::new(version, max_vector_len))
    }
}

fn read_u32_le(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

impl Message {
    const CMD_NAME_GET_INFO: &[u8; 7] = b"getinfo";
    const CMD_NAME_SET_TCK: &[u8; 6] = b"settck";
    const CMD_NAME_SHIFT: &[u8; 5] = b"shift";
    const CMD_DELIMITER: u8 = b':';

    /// Reads the remainder of a command whose two-byte prefix has already been
    /// consumed and checks it against `name` followed by the delimiter.
    fn expect_command(
        reader: &mut impl Read,
        prefix: [u8; 2],
        name: &[u8],
    ) -> Result<(), ReadError> {
        let mut cmd = Vec::with_capacity(name.len() + 1);
        cmd.extend_from_slice(&prefix);
        cmd.resize(name.len() + 1, 0);
        reader.read_exact(&mut cmd[2..])?;
        if &cmd[..name.len()] != name || cmd[name.len()] != Self::CMD_DELIMITER {
            return Err(ReadError::InvalidCommand(
                String::from_utf8_lossy(&cmd).to_string(),
            ));
        }
        Ok(())
    }

    /// Decodes a single request. Shifts whose vectors would exceed
    /// `max_shift_bytes` are rejected before the vectors are read.
    pub fn from_reader(
        reader: &mut impl Read,
        max_shift_bytes: usize,
    ) -> Result<Message, ReadError> {
        let mut prefix = [0u8; 2];
        reader.read_exact(&mut prefix)?;
        match &prefix {
            b"ge" => {
                Self::expect_command(reader, prefix, Self::CMD_NAME_GET_INFO)?;
                Ok(Message::GetInfo)
            }
            b"se" => {
                Self::expect_command(reader, prefix, Self::CMD_NAME_SET_TCK)?;
                let period_ns = read_u32_le(reader)?;
                Ok(Message::SetTck { period_ns })
            }
            b"sh" => {
                Self::expect_command(reader, prefix, Self::CMD_NAME_SHIFT)?;
                let num_bits = read_u32_le(reader)?;
                let num_bytes = vector_len(num_bits);
                if num_bytes > max_shift_bytes {
                    return Err(ReadError::TooManyBytes {
                        max: max_shift_bytes,
                        got: num_bytes,
                    });
                }
                let mut tms = vec![0u8; num_bytes].into_boxed_slice();
                reader.read_exact(&mut tms)?;
                let mut tdi = vec![0u8; num_bytes].into_boxed_slice();
                reader.read_exact(&mut tdi)?;
                Ok(Message::Shift { num_bits, tms, tdi })
            }
            _ => Err(ReadError::InvalidCommandPrefix(
                String::from_utf8_lossy(&prefix).to_string(),
            )),
        }
    }

    /// Number of bytes [`Message::write_to`] produces.
    pub fn encoded_len(&self) -> usize {
        match self {
            Message::GetInfo => Self::CMD_NAME_GET_INFO.len() + 1,
            Message::SetTck { .. } => Self::CMD_NAME_SET_TCK.len() + 1 + 4,
            Message::Shift { tms, tdi, .. } => {
                Self::CMD_NAME_SHIFT.len() + 1 + 4 + tms.len() + tdi.len()
            }
        }
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        match self {
            Message::GetInfo => {
                writer.write_all(Self::CMD_NAME_GET_INFO)?;
                writer.write_all(&[Self::CMD_DELIMITER])
            }
            Message::SetTck { period_ns } => {
                writer.write_all(Self::CMD_NAME_SET_TCK)?;
                writer.write_all(&[Self::CMD_DELIMITER])?;
                writer.write_all(&period_ns.to_le_bytes())
            }
            Message::Shift { num_bits, tms, tdi } => {
                writer.write_all(Self::CMD_NAME_SHIFT)?;
                writer.write_all(&[Self::CMD_DELIMITER])?;
                writer.write_all(&num_bits.to_le_bytes())?;
                writer.write_all(tms)?;
                writer.write_all(tdi)
            }
        }
    }

    /// Encodes the message into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        // Writing into a Vec cannot fail
        let _ = self.write_to(&mut out);
        out
    }
}
