use std::io::{self, Write};

use crate::extremes::{AggregateResult, Extreme};

const KEY_WIDTH: usize = 8;
const COLUMN_WIDTH: usize = 15;
const CODE_WIDTH: usize = 5;
const COLUMNS: [&str; 4] = ["Easternmost", "Westernmost", "Northernmost", "Southernmost"];

pub fn write_preamble(out: &mut impl Write, source_name: &str) -> io::Result<()> {
    writeln!(out, "Reading ZIP code data from: {source_name}")?;
    writeln!(out, "Processing records...")?;
    writeln!(out)?;
    Ok(())
}

/// Writes the record count, the per region table and the region count.
pub fn write_report(
    out: &mut impl Write,
    record_count: usize,
    result: &AggregateResult,
) -> io::Result<()> {
    writeln!(out, "Total records read: {record_count}")?;
    writeln!(out)?;
    writeln!(out, "Analysis Results:")?;
    writeln!(out, "=================")?;
    writeln!(out)?;

    write!(out, "{:<KEY_WIDTH$}", "State")?;
    for column in COLUMNS {
        write!(out, "{:<COLUMN_WIDTH$}", column)?;
    }
    writeln!(out)?;
    writeln!(out, "{}", "-".repeat(KEY_WIDTH + COLUMN_WIDTH * COLUMNS.len()))?;

    for (region_key, extremes) in result.iter() {
        let slots = [
            extremes.eastmost,
            extremes.westmost,
            extremes.northmost,
            extremes.southmost,
        ];

        write!(out, "{:<KEY_WIDTH$}", region_key)?;
        for (index, slot) in slots.iter().enumerate() {
            write!(out, "{}", format_code(slot))?;
            if index + 1 < slots.len() {
                write!(out, "{:width$}", "", width = COLUMN_WIDTH - CODE_WIDTH)?;
            }
        }
        writeln!(out)?;
    }

    writeln!(out)?;
    writeln!(out, "Total states/territories: {}", result.len())?;
    Ok(())
}

// Regions built by `aggregate` always fill every slot; a hand-built one may not.
fn format_code(slot: &Option<Extreme>) -> String {
    match slot {
        Some(extreme) => format!("{:0CODE_WIDTH$}", extreme.code),
        None => "-".repeat(CODE_WIDTH),
    }
}
