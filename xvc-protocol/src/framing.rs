//! Framing of XVC traffic for [`tokio_util::codec`].
//!
//! XVC replies carry no header, so a reply can only be delimited by knowing
//! which request it answers. [`ClientCodec`] remembers every message it encodes
//! and uses that queue to cut the incoming byte stream into [`Response`]s.
use std::collections::VecDeque;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    codec::MAX_INFO_LINE,
    error::ReadError,
    protocol::{Message, XvcInfo, vector_len},
};

/// A reply sent from the server to the client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response {
    Info(XvcInfo),
    TckPeriod(u32),
    Tdo(Box<[u8]>),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Pending {
    Info,
    TckPeriod,
    Tdo(usize),
}

impl From<&Message> for Pending {
    fn from(message: &Message) -> Self {
        match message {
            Message::GetInfo => Pending::Info,
            Message::SetTck { .. } => Pending::TckPeriod,
            Message::Shift { num_bits, .. } => Pending::Tdo(vector_len(*num_bits)),
        }
    }
}

/// Client side codec: encodes [`Message`]s and decodes the matching [`Response`]s.
#[derive(Debug, Default)]
pub struct ClientCodec {
    pending: VecDeque<Pending>,
}

impl ClientCodec {
    pub fn new() -> ClientCodec {
        ClientCodec::default()
    }

    /// Number of requests whose reply has not been decoded yet.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}

impl Encoder<Message> for ClientCodec {
    type Error = ReadError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.encoded_len());
        item.write_to(&mut dst.writer())?;
        self.pending.push_back(Pending::from(&item));
        Ok(())
    }
}

impl Decoder for ClientCodec {
    type Item = Response;
    type Error = ReadError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pending) = self.pending.front().copied() else {
            if src.is_empty() {
                return Ok(None);
            }
            return Err(ReadError::Unsolicited(src.len()));
        };

        let response = match pending {
            Pending::Info => {
                let Some(newline) = src.iter().position(|b| *b == b'\n') else {
                    if src.len() >= MAX_INFO_LINE {
                        return Err(ReadError::TooManyBytes {
                            max: MAX_INFO_LINE,
                            got: src.len(),
                        });
                    }
                    return Ok(None);
                };
                let line = src.split_to(newline + 1);
                Response::Info(XvcInfo::parse(&line)?)
            }
            Pending::TckPeriod => {
                if src.len() < 4 {
                    return Ok(None);
                }
                Response::TckPeriod(src.get_u32_le())
            }
            Pending::Tdo(len) => {
                if src.len() < len {
                    src.reserve(len - src.len());
                    return Ok(None);
                }
                Response::Tdo(src.split_to(len).to_vec().into_boxed_slice())
            }
        };
        self.pending.pop_front();
        Ok(Some(response))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(response) => Ok(Some(response)),
            None if buf.is_empty() => Ok(None),
            None => {
                let expected = match self.pending.front() {
                    Some(Pending::Tdo(len)) => *len,
                    Some(Pending::TckPeriod) => 4,
                    _ => buf.len() + 1,
                };
                Err(ReadError::Truncated {
                    expected,
                    got: buf.len(),
                })
            }
        }
    }
}
