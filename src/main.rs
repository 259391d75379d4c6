// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use clap::{Parser, Subcommand, ValueEnum};
use serialport::{DataBits, Parity, StopBits};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use xmodem::{ModemError, RealSerialPort, SeekSource, Variant, WriteSink, MAX_PACKET_LEN};

#[derive(Parser)]
#[command(name = "xmodem")]
#[command(about = "XMODEM, XMODEM-CRC and XMODEM-1K file transfer over RS-232", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyUSB0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "9600")]
    baud: u32,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, default_value = "8", value_name="BITS")]
    data_bits: u8,

    /// Parity (none, odd, or even)
    #[arg(long, default_value = "none")]
    parity: String,

    /// Stop bits (1 or 2)
    #[arg(long, default_value = "1", value_name="BITS")]
    stop_bits: u8,

    /// Transfer mode
    #[arg(short, long, value_enum, default_value_t = Mode::Xmodem)]
    mode: Mode,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// 128-byte packets with an 8-bit checksum
    Xmodem,
    /// 128-byte packets with CRC-16, falling back to checksum
    Crc,
    /// 1024-byte packets with CRC-16
    #[value(name = "1k")]
    OneK,
}

impl From<Mode> for Variant {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Xmodem => Variant::Basic,
            Mode::Crc => Variant::Crc,
            Mode::OneK => Variant::OneK,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file
    Send {
        /// File to send
        file: PathBuf,
    },
    /// Receive a file
    Receive {
        /// File to write
        file: PathBuf,

        /// Strip trailing CP/M EOF (0x1A) padding from the last block
        #[arg(long)]
        trim_padding: bool,
    },
}

fn parse_data_bits(bits: u8) -> Result<DataBits, String> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(format!("Invalid data bits: {}. Must be 5, 6, 7, or 8", bits)),
    }
}

fn parse_parity(parity: &str) -> Result<Parity, String> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(format!("Invalid parity: {}. Must be 'none', 'odd', or 'even'", parity)),
    }
}

fn parse_stop_bits(bits: u8) -> Result<StopBits, String> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(format!("Invalid stop bits: {}. Must be 1 or 2", bits)),
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let settings = parse_data_bits(cli.data_bits).and_then(|data_bits| {
        let parity = parse_parity(&cli.parity)?;
        let stop_bits = parse_stop_bits(cli.stop_bits)?;
        Ok((data_bits, parity, stop_bits))
    });
    let (data_bits, parity, stop_bits) = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let variant = Variant::from(cli.mode);
    println!("Opening serial port: {}", cli.port);
    println!("Settings: {} baud, {:?}, {:?}, {:?}, {}", cli.baud, data_bits, parity, stop_bits, variant);

    let mut serial_port = match RealSerialPort::open(&cli.port, cli.baud, data_bits, parity, stop_bits) {
        Ok(port) => port,
        Err(e) => {
            eprintln!("Failed to open serial port: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Send { file } => {
            println!("\nSending file: {}", file.display());
            send_file(&mut serial_port, &file, variant)
        }
        Commands::Receive { file, trim_padding } => {
            println!("\nReceiving file: {}", file.display());
            receive_file(&mut serial_port, &file, variant, trim_padding)
        }
    };

    // The port is released whether or not the transfer worked
    let closed = serial_port.close();

    let mut status = ExitCode::SUCCESS;
    match result {
        Ok(()) => println!("\nTransfer complete!"),
        Err(e) => {
            eprintln!("Transfer failed: {}", e);
            status = ExitCode::FAILURE;
        }
    }
    if let Err(e) = closed {
        eprintln!("Error closing serial port: {}", e);
        status = ExitCode::FAILURE;
    }
    status
}

fn send_file(serial_port: &mut RealSerialPort, file: &Path, variant: Variant) -> Result<(), ModemError> {
    let reader = File::open(file).map_err(ModemError::Channel)?;
    let mut source = SeekSource::new(reader).map_err(ModemError::Channel)?;
    let mut buffer = [0u8; MAX_PACKET_LEN];

    xmodem::transmit(&mut source, &mut buffer, serial_port, variant)?;
    tracing::info!(bytes = source.position(), "file sent");
    Ok(())
}

fn receive_file(serial_port: &mut RealSerialPort, file: &Path, variant: Variant, trim_padding: bool) -> Result<(), ModemError> {
    let writer = File::create(file).map_err(ModemError::Channel)?;
    let mut sink = WriteSink::new(BufWriter::new(writer), trim_padding);
    let mut buffer = [0u8; MAX_PACKET_LEN];

    xmodem::receive(&mut sink, &mut buffer, serial_port, variant)?;
    sink.into_inner().flush().map_err(ModemError::Channel)?;
    Ok(())
}
