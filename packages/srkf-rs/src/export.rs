//! Tabular exports of a finished session.
//!
//! Three CSV tables per session (`amp`, `y`, `welch`) plus a JSON report.
//! Columns appear only for series that succeeded, in canonical order.

use crate::channels::SeriesLabel;
use crate::error::{Result, SrkfError};
use crate::filter_bank::FilterRunResult;
use crate::spectral::WelchResult;
use crate::stats::SessionComparison;
use crate::store::SessionRecord;
use crate::types::PowerScale;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Largest magnitude written to a table (single-precision storage limit).
pub const EXPORT_LIMIT: f64 = 3.4e38;

/// Non-finite values become 0.0; finite values are clamped to ±[`EXPORT_LIMIT`].
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-EXPORT_LIMIT, EXPORT_LIMIT)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    /// Per-sample amplitude of every series
    Amp,
    /// Per-sample mean observation of the filtered series
    Y,
    /// Welch spectra
    Welch,
}

impl ExportKind {
    pub const ALL: [ExportKind; 3] = [ExportKind::Amp, ExportKind::Y, ExportKind::Welch];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Amp => "amp",
            ExportKind::Y => "y",
            ExportKind::Welch => "welch",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportKind {
    type Err = SrkfError;

    fn from_str(s: &str) -> Result<Self> {
        ExportKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                SrkfError::Validation(format!("Unknown export kind '{}'. Use amp, y or welch", s))
            })
    }
}

fn write_table<W: Write>(
    writer: W,
    header: &[String],
    index: &[f64],
    columns: &[&[f64]],
) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(header)?;
    for (i, &x) in index.iter().enumerate() {
        let mut row = Vec::with_capacity(columns.len() + 1);
        row.push(sanitize(x).to_string());
        for col in columns {
            row.push(sanitize(col.get(i).copied().unwrap_or(0.0)).to_string());
        }
        csv.write_record(&row)?;
    }
    csv.flush()?;
    Ok(())
}

/// `time,Original,All,WC,NWC`
pub fn write_amplitude_csv<W: Write>(run: &FilterRunResult, writer: W) -> Result<()> {
    let amps = run.amplitudes();
    let mut header = vec!["time".to_string()];
    header.extend(amps.keys().map(|l| l.to_string()));
    let columns: Vec<&[f64]> = amps.values().copied().collect();
    write_table(writer, &header, &run.time, &columns)
}

/// `time,All,WC,NWC`
pub fn write_observation_csv<W: Write>(run: &FilterRunResult, writer: W) -> Result<()> {
    let obs = run.observations();
    let mut header = vec!["time".to_string()];
    header.extend(obs.keys().map(|l| l.to_string()));
    let columns: Vec<&[f64]> = obs.values().copied().collect();
    write_table(writer, &header, &run.time, &columns)
}

/// `Frequency,Power_Original,Power_All,Power_WC,Power_NWC`
pub fn write_welch_csv<W: Write>(welch: &WelchResult, writer: W) -> Result<()> {
    let mut header = vec!["Frequency".to_string()];
    header.extend(welch.power.keys().map(|l| format!("Power_{}", l)));
    let columns: Vec<&[f64]> = welch.power.values().map(|v| v.as_slice()).collect();
    write_table(writer, &header, &welch.frequencies, &columns)
}

/// Read a table written by [`write_welch_csv`].
///
/// The segment length is inferred from the bin count (`2 * (bins - 1)`).
pub fn read_welch_csv<P: AsRef<Path>>(path: P, scale: PowerScale) -> Result<WelchResult> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    parse_welch_csv(&bytes, scale).map_err(|e| match e {
        SrkfError::Validation(msg) => {
            SrkfError::Validation(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

pub fn parse_welch_csv(bytes: &[u8], scale: PowerScale) -> Result<WelchResult> {
    let malformed = |e: csv::Error| SrkfError::Validation(format!("Malformed spectrum table: {}", e));
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(bytes);
    let header = reader.headers().map_err(malformed)?.clone();

    if header.get(0).map(|h| h.eq_ignore_ascii_case("frequency")) != Some(true) {
        return Err(SrkfError::Validation(
            "Spectrum table must start with a Frequency column".to_string(),
        ));
    }
    let labels = header
        .iter()
        .skip(1)
        .map(|h| {
            h.strip_prefix("Power_")
                .ok_or_else(|| SrkfError::Validation(format!("Unexpected column '{}'", h)))
                .and_then(SeriesLabel::from_str)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut frequencies = Vec::new();
    let mut columns = vec![Vec::new(); labels.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(malformed)?;
        let mut cells = record.iter().map(|cell| {
            cell.parse::<f64>().map_err(|_| {
                SrkfError::Validation(format!("Non-numeric value '{}' in row {}", cell, row + 1))
            })
        });
        frequencies.push(cells.next().transpose()?.unwrap_or(0.0));
        for col in columns.iter_mut() {
            col.push(cells.next().transpose()?.unwrap_or(0.0));
        }
    }
    if frequencies.is_empty() {
        return Err(SrkfError::Validation("Spectrum table has no rows".to_string()));
    }

    let segment_length = 2 * (frequencies.len() - 1).max(1);
    Ok(WelchResult {
        frequencies,
        power: labels.into_iter().zip(columns).collect(),
        segment_length,
        scale,
    })
}

/// `From_Session,To_Session,Statistic,P_Value`; an undefined statistic is left empty.
pub fn write_comparison_csv<W: Write>(rows: &[SessionComparison], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["From_Session", "To_Session", "Statistic", "P_Value"])?;
    for row in rows {
        let statistic = if row.statistic.is_finite() {
            row.statistic.to_string()
        } else {
            String::new()
        };
        csv.write_record([
            row.from_session.as_str(),
            row.to_session.as_str(),
            statistic.as_str(),
            row.p_value.to_string().as_str(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Write one export table of a finished session.
pub fn write_export<W: Write>(record: &SessionRecord, kind: ExportKind, writer: W) -> Result<()> {
    let missing = || {
        SrkfError::Validation(format!(
            "Session {} has no {} data (status: {})",
            record.session_id, kind, record.status
        ))
    };
    match kind {
        ExportKind::Amp => write_amplitude_csv(record.result.as_ref().ok_or_else(missing)?, writer),
        ExportKind::Y => write_observation_csv(record.result.as_ref().ok_or_else(missing)?, writer),
        ExportKind::Welch => write_welch_csv(record.welch.as_ref().ok_or_else(missing)?, writer),
    }
}

/// One row of the amplitude table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRow {
    pub time: f64,
    pub values: BTreeMap<SeriesLabel, f64>,
}

/// First `n` rows of the amplitude table.
pub fn preview(run: &FilterRunResult, n: usize) -> Vec<PreviewRow> {
    let amps = run.amplitudes();
    run.time
        .iter()
        .take(n)
        .enumerate()
        .map(|(i, &time)| PreviewRow {
            time,
            values: amps
                .iter()
                .map(|(&label, col)| (label, sanitize(col[i])))
                .collect(),
        })
        .collect()
}

/// Session report as pretty-printed JSON.
pub fn report_json(record: &SessionRecord) -> Result<String> {
    Ok(serde_json::to_string_pretty(record)?)
}

/// Directory of per-session artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// `<data_local_dir>/srkf/sessions`, or `./srkf/sessions` when the platform has none
    pub fn default_root() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("srkf")
            .join("sessions")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self, session_id: &str, kind: ExportKind) -> PathBuf {
        self.root.join(format!("{}_{}.csv", session_id, kind))
    }

    pub fn report_path(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("{}_report.json", session_id))
    }

    /// Write every available table and the JSON report; returns the files written.
    pub fn save(&self, record: &SessionRecord) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.root)?;
        let mut written = Vec::new();

        for kind in ExportKind::ALL {
            let available = match kind {
                ExportKind::Amp | ExportKind::Y => record.result.is_some(),
                ExportKind::Welch => record.welch.is_some(),
            };
            if !available {
                continue;
            }
            let path = self.table_path(&record.session_id, kind);
            let file = fs::File::create(&path)?;
            write_export(record, kind, std::io::BufWriter::new(file))?;
            written.push(path);
        }

        let report = self.report_path(&record.session_id);
        fs::write(&report, report_json(record)?)?;
        written.push(report);

        log::info!(
            "Saved {} artifacts for session {} to {}",
            written.len(),
            record.session_id,
            self.root.display()
        );
        Ok(written)
    }

    /// Load a previously saved report.
    pub fn load(&self, session_id: &str) -> Result<SessionRecord> {
        let path = self.report_path(session_id);
        if !path.exists() {
            return Err(SrkfError::Validation(format!(
                "No saved report for session {}",
                session_id
            )));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
