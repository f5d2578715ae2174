use std::io::{BufRead, Seek, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ReaderError;
use crate::extremes::{aggregate, aggregate_parallel};
use crate::reader::RecordReader;
use crate::record::Record;
use crate::report::{write_preamble, write_report};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_USAGE: u8 = 1;
pub const EXIT_UNREADABLE: u8 = 2;
pub const EXIT_NO_RECORDS: u8 = 3;
/// Any other failure, such as a broken stdout. Shares the usage code.
pub const EXIT_FAILURE: u8 = EXIT_USAGE;

/// Reports the easternmost, westernmost, northernmost and southernmost
/// postal code of every state in a CSV file.
#[derive(Parser, Debug)]
#[command(name = "postal_extremes", version)]
pub struct Args {
    /// CSV file: one header line, then zip,place,state,county,lat,lon rows
    pub input: PathBuf,

    /// Skip malformed rows with a warning instead of failing the whole load
    #[arg(long)]
    pub skip_invalid: bool,

    /// Aggregate on the rayon thread pool
    #[arg(long)]
    pub parallel: bool,

    /// Read the input through a memory map
    #[arg(long)]
    pub mmap: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Only log errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }
}

/// Failures that map onto a specific process exit code.
#[derive(Error, Debug)]
pub enum Failure {
    #[error("Could not open file '{path}'")]
    Unreadable {
        path: String,
        #[source]
        source: ReaderError,
    },

    #[error("Could not load records from '{path}'")]
    InvalidRecords {
        path: String,
        #[source]
        source: ReaderError,
    },

    #[error("No valid records found in file.")]
    NoRecords,
}

impl Failure {
    pub fn exit_code(&self) -> u8 {
        match self {
            Failure::Unreadable { .. } => EXIT_UNREADABLE,
            Failure::InvalidRecords { .. } | Failure::NoRecords => EXIT_NO_RECORDS,
        }
    }
}

/// Exit code for an error returned by [`run`].
pub fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .downcast_ref::<Failure>()
        .map_or(EXIT_FAILURE, Failure::exit_code)
}

pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_level = args.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("postal_extremes={}", log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();

    debug!("Logging initialized at level: {}", log_level);
}

/// Loads the input named by `args`, aggregates it and writes the report to `out`.
pub fn run(args: &Args, out: &mut impl Write) -> Result<()> {
    let path = args.input.display().to_string();
    let unreadable = |source| Failure::Unreadable { path: path.clone(), source };

    if args.mmap {
        let reader = RecordReader::open_mapped(&args.input).map_err(unreadable)?;
        process(reader, args, out)
    } else {
        let reader = RecordReader::open_path(&args.input).map_err(unreadable)?;
        process(reader, args, out)
    }
}

fn process<R: BufRead + Seek>(
    mut reader: RecordReader<R>,
    args: &Args,
    out: &mut impl Write,
) -> Result<()> {
    write_preamble(out, reader.source_name()).context("Failed to write report")?;

    let records = load(&mut reader, args.skip_invalid).map_err(|source| {
        Failure::InvalidRecords { path: reader.source_name().to_owned(), source }
    })?;
    if records.is_empty() {
        return Err(Failure::NoRecords.into());
    }

    let result = if args.parallel {
        aggregate_parallel(&records)
    } else {
        aggregate(&records)
    };

    write_report(out, records.len(), &result).context("Failed to write report")?;
    out.flush().context("Failed to write report")?;
    Ok(())
}

fn load<R: BufRead + Seek>(
    reader: &mut RecordReader<R>,
    skip_invalid: bool,
) -> std::result::Result<Vec<Record>, ReaderError> {
    if !skip_invalid {
        return reader.read_all();
    }

    let mut records = Vec::new();
    let mut skipped = 0usize;
    loop {
        match reader.next_record() {
            Ok(Some(record)) => records.push(record),
            Ok(None) => break,
            Err(ReaderError::Parse { line_number, reason, .. }) => {
                warn!("Skipping line {}: {}", line_number, reason);
                skipped += 1;
            }
            Err(error) => return Err(error),
        }
    }

    if skipped > 0 {
        warn!("Skipped {} invalid lines in {}", skipped, reader.source_name());
    }
    Ok(records)
}
