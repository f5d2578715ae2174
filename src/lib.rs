//! Per-state geographic extremes of a postal code CSV file.
//!
//! [`RecordReader`] turns a headed, comma separated source into [`Record`]s
//! and [`aggregate`] folds them into the easternmost, westernmost,
//! northernmost and southernmost code of every region.

pub mod cli;
pub mod error;
pub mod extremes;
pub mod reader;
pub mod record;
pub mod report;

pub use error::{ParseFailure, ReaderError};
pub use extremes::{aggregate, aggregate_parallel, AggregateResult, Extreme, RegionExtremes};
pub use reader::{split_fields, RecordReader};
pub use record::Record;
