use std::{collections::VecDeque, io};

use bytes::BytesMut;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, ToSocketAddrs},
    time::{self, timeout},
};
use tokio_util::codec::{Decoder, Encoder};
use xvc_protocol::{
    Message, XvcInfo,
    framing::{ClientCodec, Response},
    vector_len,
};

use crate::{
    client::scan_bits,
    config::Config,
    error::ClientError,
    jtag::{self, ChainScan, ENTER_SHIFT_DR, IDCODE_BITS, IdCode, RESET_TAP, TmsSequence},
};

/// Async XVC client over any byte stream.
///
/// Shifts that have to be split because of the server's maximum vector length
/// are pipelined: all chunks are written before the replies are read.
pub struct AsyncXvcClient<S> {
    io: S,
    codec: ClientCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    config: Config,
    info: Option<XvcInfo>,
}

/// Request bytes a split shift may have in flight before replies are read.
/// Has to stay below the socket buffer sizes, otherwise client and server can
/// both block writing.
const PIPELINE_WINDOW: usize = 32 * 1024;

/// Calls `connect` until it succeeds, giving every attempt `connect_timeout`
/// and retrying `connect_retries` times.
async fn connect_with_retries<T, F, Fut>(
    config: &Config,
    mut connect: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let mut attempt = 0;
    loop {
        let result = match timeout(config.connect_timeout, connect()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::from(io::ErrorKind::TimedOut)),
        };
        match result {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < config.connect_retries => {
                attempt += 1;
                log::warn!(
                    "Connection failed ({}), retry {} of {} in {:?}",
                    e,
                    attempt,
                    config.connect_retries,
                    config.retry_delay
                );
                time::sleep(config.retry_delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

impl AsyncXvcClient<TcpStream> {
    pub async fn connect(addr: impl ToSocketAddrs, config: Config) -> Result<Self, ClientError> {
        let addr = &addr;
        let tcp = connect_with_retries(&config, move || TcpStream::connect(addr)).await?;
        tcp.set_nodelay(true)?;
        if let Ok(peer) = tcp.peer_addr() {
            log::info!("Connected to XVC server at {}", peer);
        }
        Ok(AsyncXvcClient::new(tcp, config))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncXvcClient<S> {
    pub fn new(io: S, config: Config) -> Self {
        AsyncXvcClient {
            io,
            codec: ClientCodec::new(),
            read_buf: BytesMut::with_capacity(256),
            write_buf: BytesMut::with_capacity(256),
            config,
            info: None,
        }
    }

    pub fn into_inner(self) -> S {
        self.io
    }

    pub fn info(&self) -> Option<&XvcInfo> {
        self.info.as_ref()
    }

    async fn send(
        &mut self,
        messages: impl IntoIterator<Item = Message>,
    ) -> Result<(), ClientError> {
        for message in messages {
            self.codec.encode(message, &mut self.write_buf)?;
        }
        let rw_timeout = self.config.read_write_timeout;
        timeout(rw_timeout, self.io.write_all(&self.write_buf))
            .await
            .map_err(|_| ClientError::Timeout)??;
        self.write_buf.clear();
        timeout(rw_timeout, self.io.flush())
            .await
            .map_err(|_| ClientError::Timeout)??;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Response, ClientError> {
        let rw_timeout = self.config.read_write_timeout;
        loop {
            if let Some(response) = self.codec.decode(&mut self.read_buf)? {
                return Ok(response);
            }
            let read = timeout(rw_timeout, self.io.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| ClientError::Timeout)??;
            if read == 0 {
                return match self.codec.decode_eof(&mut self.read_buf)? {
                    Some(response) => Ok(response),
                    None => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                };
            }
        }
    }

    async fn receive_tdo(&mut self) -> Result<Box<[u8]>, ClientError> {
        match self.receive().await? {
            Response::Tdo(tdo) => {
                log::trace!("Shift result TDO data: {:02x?}", &tdo[..]);
                Ok(tdo)
            }
            other => Err(ClientError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Query server capabilities and version information.
    pub async fn get_info(&mut self) -> Result<XvcInfo, ClientError> {
        log::debug!("Sending getinfo");
        self.send([Message::GetInfo]).await?;
        match self.receive().await? {
            Response::Info(info) => {
                log::debug!("Server info: {}", info);
                self.info = Some(info.clone());
                Ok(info)
            }
            other => Err(ClientError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// Set the TCK period, returning the period the server applied.
    pub async fn set_tck(&mut self, period_ns: u32) -> Result<u32, ClientError> {
        log::debug!("Sending settck: period_ns={}", period_ns);
        self.send([Message::SetTck { period_ns }]).await?;
        match self.receive().await? {
            Response::TckPeriod(applied) => Ok(applied),
            other => Err(ClientError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    /// See [`crate::XvcClient::shift`].
    pub async fn shift(
        &mut self,
        num_bits: u32,
        tms: &[u8],
        tdi: &[u8],
    ) -> Result<Box<[u8]>, ClientError> {
        let message = Message::shift(num_bits, tms, tdi)?;
        let max = self.info.as_ref().map(|info| info.max_vector_len() as usize);
        match max {
            Some(max) if vector_len(num_bits) > max => {
                log::debug!("Splitting shift of {} bits into {} byte chunks", num_bits, max);
                let mut tdo = Vec::with_capacity(vector_len(num_bits));
                let mut in_flight = VecDeque::new();
                let mut in_flight_bytes = 0;
                for chunk in jtag::chunk_plan(num_bits, max) {
                    let range = chunk.byte_range();
                    let message = Message::shift(chunk.num_bits, &tms[range.clone()], &tdi[range])?;
                    let len = message.encoded_len();
                    while in_flight_bytes + len > PIPELINE_WINDOW {
                        let Some(sent) = in_flight.pop_front() else {
                            break;
                        };
                        tdo.extend_from_slice(&self.receive_tdo().await?);
                        in_flight_bytes -= sent;
                    }
                    self.send([message]).await?;
                    in_flight.push_back(len);
                    in_flight_bytes += len;
                }
                for _ in 0..in_flight.len() {
                    tdo.extend_from_slice(&self.receive_tdo().await?);
                }
                Ok(tdo.into_boxed_slice())
            }
            _ => {
                log::debug!("Sending shift: num_bits={}", num_bits);
                self.send([message]).await?;
                self.receive_tdo().await
            }
        }
    }

    pub async fn run_sequence(&mut self, sequence: &TmsSequence) -> Result<Box<[u8]>, ClientError> {
        self.send([sequence.message()]).await?;
        self.receive_tdo().await
    }

    pub async fn reset_tap(&mut self) -> Result<Box<[u8]>, ClientError> {
        self.run_sequence(&RESET_TAP).await
    }

    pub async fn enter_shift_dr(&mut self) -> Result<Box<[u8]>, ClientError> {
        self.run_sequence(&ENTER_SHIFT_DR).await
    }

    pub async fn read_dr32(&mut self) -> Result<u32, ClientError> {
        let zeros = [0u8; 4];
        let tdo = self.shift(IDCODE_BITS, &zeros, &zeros).await?;
        IdCode::from_tdo(&tdo)
            .map(|id| id.raw())
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("{} byte TDO", tdo.len())))
    }

    pub async fn read_idcode(&mut self) -> Result<IdCode, ClientError> {
        self.reset_tap().await?;
        self.enter_shift_dr().await?;
        let id = IdCode::new(self.read_dr32().await?);
        if !id.is_valid() {
            log::warn!("Data register holds {} which is not a valid IDCODE", id);
        }
        Ok(id)
    }

    pub async fn scan_chain(&mut self, max_devices: usize) -> Result<ChainScan, ClientError> {
        let num_bits = scan_bits(max_devices);
        self.reset_tap().await?;
        self.enter_shift_dr().await?;
        let tms = vec![0u8; vector_len(num_bits)];
        let tdi = vec![0xFFu8; vector_len(num_bits)];
        let tdo = self.shift(num_bits, &tms, &tdi).await?;
        let scan = jtag::decode_chain(&tdo, num_bits as usize, max_devices);
        if !scan.complete {
            log::warn!("Chain end not seen after {} devices", scan.devices.len());
        }
        self.reset_tap().await?;
        Ok(scan)
    }
}
