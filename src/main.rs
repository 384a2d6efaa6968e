#[macro_use]
extern crate log;

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, TermLogger, TerminalMode};

use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::PathBuf;

use anyhow::Context;
use indicatif::ProgressBar;

use eprom_client::protocol::RECORD_COUNT;
use eprom_client::{Options, Programmer, Summary};

#[derive(Clone, Debug, StructOpt)]
pub struct Args {
    #[structopt(subcommand)]
    operation: Operation,

    /// Serial port to connect to
    #[structopt(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial port baud rate
    #[structopt(long, default_value = "9600")]
    baud: usize,

    #[structopt(flatten)]
    options: Options,

    /// Log level for console output
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, Debug, StructOpt)]
pub enum Operation {
    /// Read the whole EPROM into a binary file
    Read {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    /// Write a binary file to the EPROM
    Write {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    /// Query the programmer firmware version
    Version,
}

enum Local {
    Output(BufWriter<File>),
    Input(BufReader<File>),
    None,
}

fn main() -> anyhow::Result<()> {
    // Parse out arguments
    let o = Args::from_args();

    // Configure logger, all levels to stderr so stdout carries only results
    let _ = TermLogger::init(o.log_level, Config::default(), TerminalMode::Stderr);

    // Open local files before touching the port
    let local = match &o.operation {
        Operation::Read { file } => Local::Output(BufWriter::new(
            File::create(file)
                .with_context(|| format!("cannot open output file: {}", file.display()))?,
        )),
        Operation::Write { file } => Local::Input(BufReader::new(
            File::open(file)
                .with_context(|| format!("cannot open input file: {}", file.display()))?,
        )),
        Operation::Version => Local::None,
    };

    info!("Connecting to serial port {} at {} baud", o.port, o.baud);

    let mut p = Programmer::linux(&o.port, o.baud, o.options.clone())
        .map_err(|e| anyhow::anyhow!("{:?}", e))
        .with_context(|| format!("cannot open serial port: {}", o.port))?;

    let n = p.init()?;
    if n > 0 {
        debug!("Discarded {} stale bytes", n);
    }

    let pb = ProgressBar::new(RECORD_COUNT as u64);

    let summary = match local {
        Local::None => {
            let version = p.version()?;
            println!("\nVERSION: {}\n", version);
            return Ok(());
        }
        Local::Output(mut f) => {
            info!("Reading EPROM");
            let s = p.read_rom(&mut f, |_| pb.inc(1));
            pb.finish_and_clear();

            let s = s?;
            f.flush().context("cannot flush output file")?;
            s
        }
        Local::Input(mut f) => {
            info!("Writing EPROM");
            let s = p.write_rom(&mut f, |_| pb.inc(1));
            pb.finish_and_clear();
            s?
        }
    };

    report(&summary);

    Ok(())
}

fn report(s: &Summary) {
    info!(
        "Transferred {} in {} records",
        bytefmt::format(s.bytes as u64),
        s.records
    );

    if s.checksum_mismatches > 0 {
        warn!("{} records had checksum mismatches", s.checksum_mismatches);
    }
    if s.failed > 0 {
        error!("{} records failed", s.failed);
    }
}
