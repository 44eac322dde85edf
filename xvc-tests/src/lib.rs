//! Scripted XVC peer for end-to-end tests of the clients.
//!
//! The peer does not model a TAP. Shifts are answered from a queue of
//! prepared TDO vectors, and everything received is recorded for inspection.
use std::{
    collections::VecDeque,
    io::{self, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use xvc_protocol::{Message, Version, XvcInfo, vector_len};

/// How the fake server answers.
#[derive(Clone, Debug)]
pub struct Script {
    max_vector_len: u32,
    min_tck_period: u32,
    tdo: VecDeque<Vec<u8>>,
    fill: u8,
    close_after: Option<usize>,
    silent: bool,
}

impl Default for Script {
    fn default() -> Self {
        Script {
            max_vector_len: 2048,
            min_tck_period: 0,
            tdo: VecDeque::new(),
            fill: 0,
            close_after: None,
            silent: false,
        }
    }
}

impl Script {
    pub fn new() -> Script {
        Script::default()
    }

    pub fn max_vector_len(mut self, len: u32) -> Self {
        self.max_vector_len = len;
        self
    }

    /// Periods below this are answered with this value.
    pub fn min_tck_period(mut self, period_ns: u32) -> Self {
        self.min_tck_period = period_ns;
        self
    }

    /// Queues the TDO for the next shift. Shorter vectors are padded with the
    /// fill byte, longer ones truncated.
    pub fn tdo(mut self, tdo: impl Into<Vec<u8>>) -> Self {
        self.tdo.push_back(tdo.into());
        self
    }

    /// TDO byte used once the queue is empty.
    pub fn fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    /// Closes the connection after receiving `count` messages, without answering the last.
    pub fn close_after(mut self, count: usize) -> Self {
        self.close_after = Some(count);
        self
    }

    /// Reads requests but never answers.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

pub struct FakeServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Message>>>,
    handle: JoinHandle<()>,
}

impl FakeServer {
    /// Listens on an ephemeral localhost port and serves a single client.
    pub fn start(script: Script) -> io::Result<FakeServer> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));
        let record = received.clone();
        let handle = thread::spawn(move || accept_one(listener, script, &record));
        Ok(FakeServer {
            addr,
            received,
            handle,
        })
    }

    /// Starts listening on `addr` only once `delay` has passed.
    /// Connections made before that are refused.
    pub fn start_after(addr: SocketAddr, delay: Duration, script: Script) -> FakeServer {
        let received = Arc::new(Mutex::new(Vec::new()));
        let record = received.clone();
        let handle = thread::spawn(move || {
            thread::sleep(delay);
            match TcpListener::bind(addr) {
                Ok(listener) => accept_one(listener, script, &record),
                Err(e) => log::error!("Fake server could not bind {}: {}", addr, e),
            }
        });
        FakeServer {
            addr,
            received,
            handle,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Waits for the client to disconnect and returns everything it sent.
    pub fn join(self) -> Vec<Message> {
        let FakeServer {
            handle, received, ..
        } = self;
        let _ = handle.join();
        received.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

/// A localhost address nothing listens on.
pub fn unused_addr() -> io::Result<SocketAddr> {
    TcpListener::bind("127.0.0.1:0")?.local_addr()
}

fn accept_one(listener: TcpListener, script: Script, record: &Mutex<Vec<Message>>) {
    match listener.accept() {
        Ok((tcp, _)) => {
            if let Err(e) = serve(tcp, script, record) {
                log::debug!("Fake server stopped: {}", e);
            }
        }
        Err(e) => log::error!("Fake server accept failed: {}", e),
    }
}

fn serve(mut tcp: TcpStream, mut script: Script, record: &Mutex<Vec<Message>>) -> io::Result<()> {
    let mut count = 0;
    loop {
        let message = match Message::from_reader(&mut tcp, script.max_vector_len as usize) {
            Ok(message) => message,
            Err(e) if e.is_disconnect() => return Ok(()),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
        };
        count += 1;
        if let Ok(mut received) = record.lock() {
            received.push(message.clone());
        }
        if script.close_after == Some(count) {
            return Ok(());
        }
        if script.silent {
            continue;
        }

        match message {
            Message::GetInfo => {
                XvcInfo::new(Version::V1_0, script.max_vector_len).write_to(&mut tcp)?;
            }
            Message::SetTck { period_ns } => {
                tcp.write_all(&period_ns.max(script.min_tck_period).to_le_bytes())?;
            }
            Message::Shift { num_bits, .. } => {
                let mut tdo = script.tdo.pop_front().unwrap_or_default();
                tdo.resize(vector_len(num_bits), script.fill);
                tcp.write_all(&tdo)?;
            }
        }
    }
}

/// Packs `(value, bit count)` fields LSB first into a TDO vector of `total_bits`,
/// padding with ones.
pub fn tdo_stream(fields: &[(u32, usize)], total_bits: usize) -> Vec<u8> {
    let mut bits: Vec<bool> = fields
        .iter()
        .flat_map(|(value, count)| (0..*count).map(move |i| (value >> i) & 1 == 1))
        .collect();
    bits.resize(total_bits, true);
    let mut out = vec![0u8; total_bits.div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}
