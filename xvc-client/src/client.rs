use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    thread,
    time::Duration,
};

use xvc_protocol::{Message, XvcInfo, vector_len};

use crate::{
    config::Config,
    error::ClientError,
    jtag::{self, ChainScan, ENTER_SHIFT_DR, IDCODE_BITS, IdCode, RESET_TAP, TmsSequence},
};

/// Blocking XVC client for remote JTAG operations.
///
/// Requests are sent one at a time; each call waits for the server's reply.
/// After an error the connection state is unknown and the client should be dropped.
pub struct XvcClient {
    tcp: TcpStream,
    info: Option<XvcInfo>,
}

fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(tcp) => return Ok(tcp),
            Err(e) => {
                log::debug!("Connecting to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable)))
}

impl XvcClient {
    /// Connects with the default [`Config`].
    pub fn connect(addr: impl ToSocketAddrs) -> Result<XvcClient, ClientError> {
        XvcClient::connect_with(addr, Config::default())
    }

    pub fn connect_with(
        addr: impl ToSocketAddrs,
        config: Config,
    ) -> Result<XvcClient, ClientError> {
        let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(ClientError::NoAddress);
        }

        let mut attempt = 0;
        let tcp = loop {
            match connect_any(&addrs, config.connect_timeout) {
                Ok(tcp) => break tcp,
                Err(e) if attempt < config.connect_retries => {
                    attempt += 1;
                    log::warn!(
                        "Connection failed ({}), retry {} of {} in {:?}",
                        e,
                        attempt,
                        config.connect_retries,
                        config.retry_delay
                    );
                    thread::sleep(config.retry_delay);
                }
                Err(e) => return Err(e.into()),
            }
        };

        tcp.set_read_timeout(Some(config.read_write_timeout))?;
        tcp.set_write_timeout(Some(config.read_write_timeout))?;
        tcp.set_nodelay(true)?;
        if let Ok(peer) = tcp.peer_addr() {
            log::info!("Connected to XVC server at {}", peer);
        }
        Ok(XvcClient { tcp, info: None })
    }

    /// Query server capabilities and version information.
    /// The result is kept and used to split oversized shifts.
    pub fn get_info(&mut self) -> Result<XvcInfo, ClientError> {
        self.get_info_line().map(|(info, _)| info)
    }

    /// Like [`XvcClient::get_info`], but also returns the info line exactly as
    /// the server sent it.
    pub fn get_info_line(&mut self) -> Result<(XvcInfo, Vec<u8>), ClientError> {
        log::debug!("Sending getinfo");
        self.tcp.write_all(&Message::GetInfo.to_bytes())?;
        let line = XvcInfo::read_line(&mut self.tcp)?;
        let info = XvcInfo::parse(&line)?;
        log::debug!("Server info: {}", info);
        self.info = Some(info.clone());
        Ok((info, line))
    }

    /// Server info from the last [`XvcClient::get_info`] call.
    pub fn info(&self) -> Option<&XvcInfo> {
        self.info.as_ref()
    }

    /// Set the JTAG Test Clock (TCK) period.
    /// # Returns
    ///
    /// The actual TCK period set by the server.
    // May differ from requested, if the server does not support the requested rate.
    pub fn set_tck(&mut self, period_ns: u32) -> Result<u32, ClientError> {
        log::debug!("Sending settck: period_ns={}", period_ns);
        self.tcp
            .write_all(&Message::SetTck { period_ns }.to_bytes())?;
        let mut buf = [0u8; 4];
        self.tcp.read_exact(&mut buf)?;
        let applied = u32::from_le_bytes(buf);
        log::debug!("Server applied period_ns={}", applied);
        Ok(applied)
    }

    /// Perform a JTAG shift operation.
    ///
    /// # Arguments
    ///
    /// * `num_bits` - Number of bits to shift
    /// * `tms` - Test Mode Select vector (length must be ⌈num_bits / 8⌉)
    /// * `tdi` - Test Data In vector (length must be ⌈num_bits / 8⌉)
    ///
    /// # Returns
    ///
    /// Test Data Out vector from the JTAG chain of the same length as `tms` and `tdi`.
    /// Shifts larger than the server's maximum vector length are split into
    /// several requests if the server info has been queried.
    pub fn shift(
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
                for chunk in jtag::chunk_plan(num_bits, max) {
                    let range = chunk.byte_range();
                    let message = Message::shift(chunk.num_bits, &tms[range.clone()], &tdi[range])?;
                    tdo.extend_from_slice(&self.exchange_shift(message)?);
                }
                Ok(tdo.into_boxed_slice())
            }
            _ => self.exchange_shift(message),
        }
    }

    fn exchange_shift(&mut self, message: Message) -> Result<Box<[u8]>, ClientError> {
        let Message::Shift { num_bits, tms, tdi } = &message else {
            return Err(ClientError::UnexpectedResponse(format!("{:?} is not a shift", message)));
        };
        log::debug!("Sending shift: num_bits={}", num_bits);
        log::trace!("Shift TMS data: {:02x?}", &tms[..]);
        log::trace!("Shift TDI data: {:02x?}", &tdi[..]);
        self.tcp.write_all(&message.to_bytes())?;
        let mut tdo = vec![0u8; vector_len(*num_bits)];
        self.tcp.read_exact(&mut tdo)?;
        log::trace!("Shift result TDO data: {:02x?}", &tdo[..]);
        Ok(tdo.into_boxed_slice())
    }

    /// Clocks a fixed sequence and returns the TDO it produced.
    pub fn run_sequence(&mut self, sequence: &TmsSequence) -> Result<Box<[u8]>, ClientError> {
        self.exchange_shift(sequence.message())
    }

    /// Resets the TAP and leaves it in Run-Test/Idle.
    pub fn reset_tap(&mut self) -> Result<Box<[u8]>, ClientError> {
        self.run_sequence(&RESET_TAP)
    }

    /// Moves the TAP from Run-Test/Idle to Shift-DR.
    pub fn enter_shift_dr(&mut self) -> Result<Box<[u8]>, ClientError> {
        self.run_sequence(&ENTER_SHIFT_DR)
    }

    /// Shifts 32 zero bits through DR and returns what came out of TDO.
    /// The TAP stays in Shift-DR.
    pub fn read_dr32(&mut self) -> Result<u32, ClientError> {
        let zeros = [0u8; 4];
        let tdo = self.shift(IDCODE_BITS, &zeros, &zeros)?;
        IdCode::from_tdo(&tdo)
            .map(|id| id.raw())
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("{} byte TDO", tdo.len())))
    }

    /// Reads the IDCODE of the device closest to TDO.
    pub fn read_idcode(&mut self) -> Result<IdCode, ClientError> {
        self.reset_tap()?;
        self.enter_shift_dr()?;
        let id = IdCode::new(self.read_dr32()?);
        if !id.is_valid() {
            log::warn!("Data register holds {} which is not a valid IDCODE", id);
        }
        Ok(id)
    }

    /// Lists the devices on the chain, up to `max_devices`.
    pub fn scan_chain(&mut self, max_devices: usize) -> Result<ChainScan, ClientError> {
        let num_bits = scan_bits(max_devices);
        self.reset_tap()?;
        self.enter_shift_dr()?;
        let tms = vec![0u8; vector_len(num_bits)];
        let tdi = vec![0xFFu8; vector_len(num_bits)];
        let tdo = self.shift(num_bits, &tms, &tdi)?;
        let scan = jtag::decode_chain(&tdo, num_bits as usize, max_devices);
        if !scan.complete {
            log::warn!("Chain end not seen after {} devices", scan.devices.len());
        }
        self.reset_tap()?;
        Ok(scan)
    }
}

/// Enough bits to shift `max_devices` IDCODEs out and see the TDI ones arrive.
pub(crate) fn scan_bits(max_devices: usize) -> u32 {
    u32::try_from(max_devices.saturating_add(1))
        .unwrap_or(u32::MAX)
        .saturating_mul(IDCODE_BITS)
}
