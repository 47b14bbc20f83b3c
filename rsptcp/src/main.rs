use rsptcp_engine::{Server, SessionConfig, SignalSource, SimulatedDriver};
use rsptcp_messages::{Antenna, BitWidth, Decibels, Hertz};

use clap::Parser;
use log::{LevelFilter, info};
use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rsptcp", about = "rtl_tcp compatible I/Q server for the RSP2")]
struct Cli {
    /// Listen address
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    address: IpAddr,

    /// Listen port
    #[arg(short = 'p', long, default_value_t = 7890)]
    port: u16,

    /// Frequency in Hz
    #[arg(short = 'f', long, default_value_t = 178_352_000,
          value_parser = clap::value_parser!(u32).range(0..=i32::MAX as i64))]
    frequency: u32,

    /// Sampling rate in Hz (384000, 512000, 1024000, 2048000, 4096000 or 8192000)
    #[arg(short = 's', long, default_value_t = 2_048_000)]
    sample_rate: u32,

    /// Gain reduction in dB
    #[arg(short = 'g', long, default_value_t = 50,
          value_parser = clap::value_parser!(u8).range(0..=100))]
    gain_reduction: u8,

    /// Bit width: 1 means 8 bit, 2 means 16 bit
    #[arg(short = 'W', long, default_value_t = 2,
          value_parser = clap::value_parser!(u8).range(1..=2))]
    bit_width: u8,

    /// Device index
    #[arg(short = 'd', long, default_value_t = 0,
          value_parser = clap::value_parser!(u32).range(0..=8))]
    device_index: u32,

    /// Antenna: 1 means Antenna A, 2 means Antenna B
    #[arg(short = 'T', long, default_value_t = 1,
          value_parser = clap::value_parser!(i32).range(1..=2))]
    antenna: i32,

    /// Offset of the simulated test tone from the tuned frequency, in Hz
    #[arg(long, default_value_t = 10_000.0, allow_negative_numbers = true)]
    tone_offset: f64,

    /// Replay interleaved 16-bit I/Q from this file instead of a tone
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            frequency: Hertz(self.frequency as u64),
            sample_rate: Hertz(self.sample_rate as u64),
            gain_reduction: self.gain_reduction,
            bit_width: BitWidth::from_code(self.bit_width).unwrap_or_default(),
            antenna: Antenna::from_selector(self.antenna).unwrap_or_default(),
            device_index: self.device_index,
            ..Default::default()
        }
    }

    fn signal_source(&self) -> SignalSource {
        match &self.replay {
            Some(path) => SignalSource::File { path: path.clone() },
            None => SignalSource::Tone {
                offset_hz: self.tone_offset,
                level: Decibels(-6.0),
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let engine_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "{:<5} - {} - {}",
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .filter_level(LevelFilter::Warn)
        .filter_module("rsptcp", engine_level)
        .filter_module("rsptcp_engine", engine_level)
        .parse_default_env()
        .init();

    let config = cli.session_config();
    let driver = SimulatedDriver::new(cli.signal_source())?;
    let mut server = Server::bind((cli.address, cli.port), driver, config)?;
    info!("Listening on {}", server.local_addr()?);

    server.run()
}
