// CSV reader for 14-channel EEG recordings.
// Supports:
// - A header row naming the channels (matched case-insensitively, any column order)
// - An optional `time` / `timestamp` column used as the time vector
// - Headerless files with exactly 14 numeric columns in montage order
//
// Extra named columns are ignored. Anything else that does not yield a clean
// N x 14 matrix is a validation error raised before any filtering starts.

use crate::channels::{channel_index, ChannelMatrix, CHANNEL_COUNT, CHANNEL_NAMES};
use crate::error::{Result, SrkfError};
use crate::mmap_utils::mmap_file;
use std::path::Path;

const TIME_COLUMNS: &[&str] = &["time", "timestamp"];

/// Column layout resolved from the first record.
#[derive(Debug, Clone)]
struct ColumnLayout {
    /// Source column for each montage channel.
    channel_columns: [usize; CHANNEL_COUNT],
    time_column: Option<usize>,
    has_header: bool,
}

impl ColumnLayout {
    fn min_width(&self) -> usize {
        let max_channel = self.channel_columns.iter().copied().max().unwrap_or(0);
        self.time_column.map_or(max_channel, |t| t.max(max_channel)) + 1
    }
}

/// Read a recording from disk.
pub fn read_channel_csv<P: AsRef<Path>>(path: P, sampling_rate: f64) -> Result<ChannelMatrix> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SrkfError::Validation(format!(
            "Input file not found: {}",
            path.display()
        )));
    }
    let mmap = mmap_file(path)?;
    log::debug!("Mapped {} ({} bytes)", path.display(), mmap.len());
    parse_channel_csv(&mmap[..], sampling_rate)
}

/// Parse CSV bytes into a [`ChannelMatrix`].
pub fn parse_channel_csv(bytes: &[u8], sampling_rate: f64) -> Result<ChannelMatrix> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut records = reader.records();
    let first = match records.next() {
        Some(rec) => rec.map_err(malformed)?,
        None => return Err(SrkfError::Validation("File is empty".to_string())),
    };

    let layout = resolve_layout(&first)?;
    let width = layout.min_width();

    let mut rows: Vec<[f64; CHANNEL_COUNT]> = Vec::new();
    let mut time: Vec<f64> = Vec::new();

    let mut push_record = |record: &csv::StringRecord| -> Result<()> {
        let line = record.position().map_or(0, |p| p.line());
        if record.iter().all(|f| f.is_empty()) {
            return Ok(());
        }
        if record.len() < width {
            return Err(SrkfError::Validation(format!(
                "Line {} has {} values, expected at least {}",
                line,
                record.len(),
                width
            )));
        }

        let mut row = [0.0; CHANNEL_COUNT];
        for (ch, &col) in layout.channel_columns.iter().enumerate() {
            row[ch] = parse_cell(&record[col], line, CHANNEL_NAMES[ch])?;
        }
        rows.push(row);

        if let Some(col) = layout.time_column {
            time.push(parse_cell(&record[col], line, "time")?);
        }
        Ok(())
    };

    if !layout.has_header {
        push_record(&first)?;
    }
    for record in records {
        push_record(&record.map_err(malformed)?)?;
    }

    if rows.is_empty() {
        return Err(SrkfError::Validation(
            "File contains a header but no samples".to_string(),
        ));
    }

    log::info!(
        "Parsed {} samples x {} channels (header: {}, time column: {})",
        rows.len(),
        CHANNEL_COUNT,
        layout.has_header,
        layout.time_column.is_some()
    );

    if layout.time_column.is_some() {
        ChannelMatrix::new(rows, time, sampling_rate)
    } else {
        ChannelMatrix::from_rows(rows, sampling_rate)
    }
}

/// Reader errors (bad UTF-8, broken quoting) are input errors, not I/O failures.
fn malformed(err: csv::Error) -> SrkfError {
    let line = err.position().map_or(0, |p| p.line());
    SrkfError::Validation(format!("Malformed CSV at line {}: {}", line, err))
}

fn resolve_layout(first: &csv::StringRecord) -> Result<ColumnLayout> {
    let has_header = first.iter().any(|f| f.parse::<f64>().is_err());

    if !has_header {
        if first.len() != CHANNEL_COUNT {
            return Err(SrkfError::Validation(format!(
                "Headerless CSV must have {} EEG columns, found {}",
                CHANNEL_COUNT,
                first.len()
            )));
        }
        let mut channel_columns = [0usize; CHANNEL_COUNT];
        for (i, c) in channel_columns.iter_mut().enumerate() {
            *c = i;
        }
        return Ok(ColumnLayout {
            channel_columns,
            time_column: None,
            has_header: false,
        });
    }

    let mut found: [Option<usize>; CHANNEL_COUNT] = [None; CHANNEL_COUNT];
    let mut time_column = None;

    for (col, name) in first.iter().enumerate() {
        if let Some(ch) = channel_index(name) {
            if found[ch].is_some() {
                return Err(SrkfError::Validation(format!(
                    "Duplicate EEG column '{}'",
                    CHANNEL_NAMES[ch]
                )));
            }
            found[ch] = Some(col);
        } else if TIME_COLUMNS.iter().any(|t| t.eq_ignore_ascii_case(name)) {
            if time_column.is_none() {
                time_column = Some(col);
            }
        } else {
            log::debug!("Ignoring column '{}'", name);
        }
    }

    let missing: Vec<&str> = found
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_none())
        .map(|(ch, _)| CHANNEL_NAMES[ch])
        .collect();
    if !missing.is_empty() {
        return Err(SrkfError::Validation(format!(
            "CSV missing EEG columns: {}",
            missing.join(", ")
        )));
    }

    let mut channel_columns = [0usize; CHANNEL_COUNT];
    for (ch, col) in found.iter().enumerate() {
        channel_columns[ch] = col.unwrap_or_default();
    }

    Ok(ColumnLayout {
        channel_columns,
        time_column,
        has_header: true,
    })
}

fn parse_cell(value: &str, line: u64, column: &str) -> Result<f64> {
    let v = value.parse::<f64>().map_err(|_| {
        SrkfError::Validation(format!(
            "Invalid numeric value '{}' at line {}, column {}",
            value, line, column
        ))
    })?;
    if !v.is_finite() {
        return Err(SrkfError::Validation(format!(
            "Non-finite value '{}' at line {}, column {}",
            value, line, column
        )));
    }
    Ok(v)
}
