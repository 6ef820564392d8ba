use crate::cli::{self, BatchArgs};
use crate::exit_codes;
use crate::output;
use crate::params;
use rayon::prelude::*;
use serde::Serialize;
use srkf_rs::{
    consecutive_comparisons, write_comparison_csv, ArtifactStore, RecordingSource, RunStatus,
    SeriesLabel, SessionRequest, SessionRunner, WelchResult,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// One row of the batch summary
#[derive(Debug, Serialize)]
struct BatchRow {
    file: String,
    variant: String,
    session_id: String,
    /// `None` when skipped after an earlier failure
    #[serde(serialize_with = "serialize_status")]
    status: Option<RunStatus>,
    processing_time_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip)]
    welch: Option<WelchResult>,
}

fn status_label(status: Option<RunStatus>) -> String {
    status.map_or_else(|| "skipped".to_string(), |s| s.to_string())
}

fn serialize_status<S: serde::Serializer>(
    status: &Option<RunStatus>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&status_label(*status))
}

#[derive(Debug, Default, PartialEq)]
struct Tally {
    succeeded: usize,
    partial: usize,
    failed: usize,
    skipped: usize,
}

impl Tally {
    fn from_rows(rows: &[BatchRow]) -> Self {
        let mut tally = Tally::default();
        for row in rows {
            match row.status {
                Some(RunStatus::Completed) => tally.succeeded += 1,
                Some(RunStatus::PartiallyFailed) => tally.partial += 1,
                None => tally.skipped += 1,
                Some(_) => tally.failed += 1,
            }
        }
        tally
    }

    fn exit_code(&self) -> i32 {
        if self.partial == 0 && self.failed == 0 && self.skipped == 0 {
            exit_codes::SUCCESS
        } else if self.succeeded == 0 && self.partial == 0 {
            exit_codes::EXECUTION_ERROR
        } else {
            exit_codes::PARTIAL_FAILURE
        }
    }
}

pub async fn execute(args: BatchArgs) -> i32 {
    // Resolve file list
    let files = match resolve_files(&args) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if files.is_empty() {
        eprintln!("Error: No matching files found");
        return exit_codes::INPUT_ERROR;
    }

    let variants = cli::expand_variants(&args.variants);
    if let Err(msg) = params::validate_selection(&variants, &args.mask) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }
    if args.wilcoxon && args.output_dir.is_none() {
        eprintln!("Error: --wilcoxon requires --output-dir");
        return exit_codes::INPUT_ERROR;
    }

    let jobs: Vec<(String, String)> = files
        .iter()
        .flat_map(|f| variants.iter().map(move |v| (f.clone(), v.clone())))
        .collect();

    // Dry-run mode: print session list and exit
    if args.dry_run {
        for (file, variant) in &jobs {
            println!("{}\t{}", file, variant);
        }
        if !args.quiet {
            eprintln!("{} file(s) x {} variant(s)", files.len(), variants.len());
        }
        return exit_codes::SUCCESS;
    }

    let config = match params::build_config(&args.engine) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    let runner = match SessionRunner::new(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    // Create output directory if specified
    let artifacts = match args.output_dir {
        Some(ref dir) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Error: Failed to create output directory '{}': {}", dir, e);
                return exit_codes::EXECUTION_ERROR;
            }
            Some(ArtifactStore::new(dir))
        }
        None => None,
    };

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(n) = args.jobs {
        pool = pool.num_threads(n.max(1));
    }
    let pool = match pool.build() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: Failed to start worker pool: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if !args.quiet {
        eprintln!(
            "Running {} session(s) on {} thread(s)...",
            jobs.len(),
            pool.current_num_threads()
        );
    }

    let start_time = Instant::now();
    let handle = tokio::runtime::Handle::current();
    let total = jobs.len();
    let quiet = args.quiet;
    let continue_on_error = args.continue_on_error;
    let keep_spectra = args.wilcoxon;
    let mask = args.mask.clone();

    let joined = tokio::task::spawn_blocking(move || {
        let stop = AtomicBool::new(false);
        pool.install(|| {
            jobs.par_iter()
                .enumerate()
                .map(|(i, (file, variant))| {
                    let session_id = params::batch_session_id(file, variant);
                    if stop.load(Ordering::Relaxed) {
                        return BatchRow {
                            file: file.clone(),
                            variant: variant.clone(),
                            session_id,
                            status: None,
                            processing_time_secs: 0.0,
                            error: None,
                            welch: None,
                        };
                    }
                    if !quiet {
                        eprintln!("[{}/{}] {} {}...", i + 1, total, file, variant);
                    }

                    let request = SessionRequest::new(
                        RecordingSource::CsvFile(PathBuf::from(file)),
                        variant.as_str(),
                        mask.as_str(),
                    )
                    .with_session_id(session_id.as_str());
                    let record = handle.block_on(runner.run(request));

                    let mut row = BatchRow {
                        file: file.clone(),
                        variant: variant.clone(),
                        session_id,
                        status: Some(record.status),
                        processing_time_secs: record.processing_time_secs,
                        error: record.error.clone(),
                        welch: if keep_spectra { record.welch.clone() } else { None },
                    };
                    if let Some(ref store) = artifacts {
                        if let Err(e) = store.save(&record) {
                            row.status = Some(RunStatus::Failed);
                            row.error = Some(format!("Failed to write artifacts: {}", e));
                        }
                    }
                    if row.status == Some(RunStatus::Failed) {
                        if !quiet {
                            eprintln!(
                                "  {} {} failed: {}",
                                row.file,
                                row.variant,
                                row.error.as_deref().unwrap_or("unknown error")
                            );
                        }
                        if !continue_on_error {
                            stop.store(true, Ordering::Relaxed);
                        }
                    }
                    row
                })
                .collect::<Vec<BatchRow>>()
        })
    })
    .await;

    let rows = match joined {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("Error: batch worker failed: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if args.json {
        if let Err(code) = output::print_json(&rows) {
            return code;
        }
    } else {
        print_table(&rows);
    }

    if let (true, Some(dir)) = (args.wilcoxon, args.output_dir.as_deref()) {
        match write_comparisons(&rows, &variants, Path::new(dir)) {
            Ok(written) => {
                if !args.quiet {
                    eprintln!("Wrote {} signed-rank table(s) to {}", written.len(), dir);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    }

    let tally = Tally::from_rows(&rows);
    if !args.quiet {
        eprintln!(
            "Batch complete: {}/{} completed, {} partial, {} failed, {} skipped, {:.1}s",
            tally.succeeded,
            rows.len(),
            tally.partial,
            tally.failed,
            tally.skipped,
            start_time.elapsed().as_secs_f64()
        );
    }
    tally.exit_code()
}

fn print_table(rows: &[BatchRow]) {
    println!(
        "{:<32} {:<24} {:<18} {:>10}",
        "File", "Variant", "Status", "Time (s)"
    );
    println!("{}", "-".repeat(87));
    for row in rows {
        let name = std::path::Path::new(&row.file)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&row.file);
        println!(
            "{:<32} {:<24} {:<18} {:>10.3}",
            name,
            row.variant,
            status_label(row.status),
            row.processing_time_secs
        );
    }
}

/// Compare WC spectra of consecutive files per variant; writes `<variant>_wilcoxon_wc.csv`.
///
/// Variants with fewer than two spectra are skipped with a warning.
fn write_comparisons(
    rows: &[BatchRow],
    variants: &[String],
    dir: &Path,
) -> Result<Vec<PathBuf>, String> {
    let mut written = Vec::new();
    for variant in variants {
        let sessions: Vec<(String, WelchResult)> = rows
            .iter()
            .filter(|r| &r.variant == variant)
            .filter_map(|r| r.welch.clone().map(|w| (r.session_id.clone(), w)))
            .collect();
        if sessions.len() < 2 {
            log::warn!(
                "{}: {} spectrum(s), need two for a signed-rank table",
                variant,
                sessions.len()
            );
            continue;
        }
        let comparisons = consecutive_comparisons(&sessions, SeriesLabel::Winning)
            .map_err(|e| format!("{}: {}", variant, e))?;
        let path = dir.join(format!("{}_wilcoxon_wc.csv", variant));
        let file = std::fs::File::create(&path)
            .map_err(|e| format!("Failed to create '{}': {}", path.display(), e))?;
        write_comparison_csv(&comparisons, std::io::BufWriter::new(file))
            .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
        written.push(path);
    }
    Ok(written)
}

fn resolve_files(args: &BatchArgs) -> Result<Vec<String>, String> {
    if let Some(ref pattern) = args.glob {
        resolve_glob(pattern)
    } else if let Some(ref files) = args.files {
        Ok(files.clone())
    } else {
        Err("One of --glob or --files must be specified".to_string())
    }
}

pub(crate) fn resolve_glob(pattern: &str) -> Result<Vec<String>, String> {
    let paths = glob::glob(pattern)
        .map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files: Vec<String> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    if let Some(s) = path.to_str() {
                        files.push(s.to_string());
                    }
                }
            }
            Err(e) => {
                log::warn!("glob error: {}", e);
            }
        }
    }
    files.sort();
    Ok(files)
}
