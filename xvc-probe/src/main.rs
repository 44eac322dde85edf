//! # XVC Probe
//!
//! Connects to an XVC (Xilinx Virtual Cable) server, resets the JTAG TAP and
//! reads the IDCODE of the device closest to TDO. Further subcommands expose
//! the raw XVC requests and a chain scan.
use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{Parser, Subcommand};
use clap_num::{maybe_hex, number_range};
use env_logger::Env;
use xvc_client::{
    Builder, ClientError, XvcClient,
    jtag::{ChainDevice, IdCode},
};

const MAX_SCAN_DEVICES: usize = 64;

fn scan_device_count(s: &str) -> Result<usize, String> {
    number_range(s, 1, MAX_SCAN_DEVICES)
}

fn timeout_millis(s: &str) -> Result<u64, String> {
    number_range(s, 1, u64::MAX)
}

#[derive(Subcommand, Eq, PartialEq, Clone, Debug)]
enum Command {
    /// Reset the TAP and read the IDCODE of the first device
    Idcode {
        #[arg(long, help = "Fail if the data register does not hold a valid IDCODE")]
        strict: bool,
    },
    /// Print the server's version and maximum vector length
    Info,
    /// Request a TCK period
    Settck {
        #[arg(value_parser = maybe_hex::<u32>, help = "Period in nanoseconds")]
        period_ns: u32,
    },
    /// Shift raw TMS/TDI vectors, given as hex bytes in wire order
    Shift {
        #[arg(value_parser = maybe_hex::<u32>)]
        num_bits: u32,
        #[arg(value_parser = parse_hex)]
        tms: HexVector,
        #[arg(value_parser = parse_hex)]
        tdi: HexVector,
    },
    /// List the devices on the JTAG chain
    Scan {
        #[arg(short, long, default_value = "8", value_parser = scan_device_count)]
        max_devices: usize,
    },
}

#[derive(Parser, Debug)]
#[command(about = "Read JTAG IDCODEs through a Xilinx Virtual Cable (XVC) server", long_about=None)]
struct Args {
    #[arg(short, long, default_value = "2542")]
    port: u16,

    #[arg(short, long, default_value = "127.0.0.1")]
    ip: IpAddr,

    #[arg(
        short,
        long,
        default_value = "30000",
        value_parser = timeout_millis,
        help = "Read/write timeout in milliseconds"
    )]
    timeout_ms: u64,

    #[arg(short, long, default_value = "0", help = "Connection retries")]
    retries: u32,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct HexVector(Vec<u8>);

/// Parses hex bytes such as `1f3f` or `0x1F_3F`; the first byte is clocked first.
fn parse_hex(s: &str) -> Result<HexVector, String> {
    let digits: String = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
        .chars()
        .filter(|c| *c != '_')
        .collect();
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("'{}' is not hex", s));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("'{}' has an odd number of hex digits", s));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| format!("'{}' is not hex: {}", s, e))
        })
        .collect::<Result<Vec<u8>, String>>()
        .map(HexVector)
}

/// Renders a reply the way a Python bytes literal prints.
fn escaped(bytes: &[u8]) -> String {
    format!("b'{}'", bytes.escape_ascii())
}

fn idcode_line(id: &IdCode) -> String {
    format!("IDCODE: {}", id)
}

fn describe(id: &IdCode) -> String {
    let manufacturer = id.manufacturer_name().unwrap_or("unknown");
    format!(
        "  version:      {:X}\n  part number:  {:04X}\n  manufacturer: {:03X} ({})",
        id.version(),
        id.part_number(),
        id.manufacturer(),
        manufacturer
    )
}

fn run_idcode(client: &mut XvcClient, strict: bool) -> Result<(), Box<dyn Error>> {
    let (_, line) = client.get_info_line()?;
    println!("{}", escaped(&line));
    println!("{}", escaped(&client.reset_tap()?));
    println!("{}", escaped(&client.enter_shift_dr()?));

    let id = IdCode::new(client.read_dr32()?);
    println!("{}", idcode_line(&id));
    if id.is_valid() {
        println!("{}", describe(&id));
    } else if strict {
        return Err(ClientError::InvalidIdCode(id.raw()).into());
    } else {
        log::warn!("{} is not a valid IDCODE", id);
    }
    Ok(())
}

fn run_scan(client: &mut XvcClient, max_devices: usize) -> Result<(), Box<dyn Error>> {
    client.get_info()?;
    let scan = client.scan_chain(max_devices)?;
    for (index, device) in scan.devices.iter().enumerate() {
        match device {
            ChainDevice::Identified(id) => println!("{}: {}\n{}", index, id, describe(id)),
            ChainDevice::Bypass => println!("{}: BYPASS", index),
        }
    }
    if scan.devices.is_empty() {
        println!("No devices found");
    }
    if !scan.complete {
        println!(
            "Chain end not reached, the chain may have more than {} devices or TDO is stuck low",
            max_devices
        );
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::debug!(
        "Parsed arguments: ip={}, port={}, timeout_ms={}",
        args.ip,
        args.port,
        args.timeout_ms
    );

    let config = Builder::new()
        .rw_timeout(Duration::from_millis(args.timeout_ms))
        .retries(args.retries, Duration::from_millis(500))
        .build();

    let addr = SocketAddr::new(args.ip, args.port);
    log::info!("Connecting to {}", addr);
    let mut client = XvcClient::connect_with(addr, config)?;

    match args.command.unwrap_or(Command::Idcode { strict: false }) {
        Command::Idcode { strict } => run_idcode(&mut client, strict)?,
        Command::Info => println!("{}", client.get_info()?),
        Command::Settck { period_ns } => {
            let applied = client.set_tck(period_ns)?;
            if applied != period_ns {
                log::warn!("Requested {} ns, server uses {} ns", period_ns, applied);
            }
            println!("{}", applied);
        }
        Command::Shift { num_bits, tms, tdi } => {
            client.get_info()?;
            let tdo = client.shift(num_bits, &tms.0, &tdi.0)?;
            let hex: String = tdo.iter().map(|b| format!("{:02X}", b)).collect();
            println!("{}", hex);
        }
        Command::Scan { max_devices } => run_scan(&mut client, max_devices)?,
    }
    Ok(())
}
