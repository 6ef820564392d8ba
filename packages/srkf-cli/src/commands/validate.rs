use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use srkf_rs::{read_channel_csv, CHANNEL_COUNT, DEFAULT_SAMPLING_RATE};
use std::path::Path;

#[derive(Serialize)]
struct ValidateOutput {
    file: String,
    exists: bool,
    valid: bool,
    channels: usize,
    samples: Option<usize>,
    sampling_rate: f64,
    duration_secs: Option<f64>,
    size_bytes: Option<u64>,
    error: Option<String>,
}

pub fn execute(args: ValidateArgs) -> i32 {
    let path = Path::new(&args.file);
    let exists = path.is_file();
    let sampling_rate = args.fs.unwrap_or(DEFAULT_SAMPLING_RATE);

    let size_bytes = std::fs::metadata(path).ok().map(|m| m.len());

    let parsed = if !exists {
        Err(format!("File not found: {}", args.file))
    } else if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
        Err(format!("Invalid sampling rate: {}", sampling_rate))
    } else {
        read_channel_csv(path, sampling_rate).map_err(|e| e.to_string())
    };

    let (samples, duration_secs, error) = match parsed {
        Ok(matrix) => {
            let duration = match (matrix.time().first(), matrix.time().last()) {
                (Some(first), Some(last)) => Some(last - first),
                _ => None,
            };
            (Some(matrix.len()), duration, None)
        }
        Err(e) => (None, None, Some(e)),
    };

    let result = ValidateOutput {
        file: args.file.clone(),
        exists,
        valid: error.is_none(),
        channels: CHANNEL_COUNT,
        samples,
        sampling_rate,
        duration_secs,
        size_bytes,
        error: error.clone(),
    };

    if args.json {
        if let Err(code) = output::print_json(&result) {
            return code;
        }
    } else if let Some(ref err) = error {
        eprintln!("Error: {}", err);
    } else {
        println!(
            "File '{}' is valid ({} channels, {} samples, {:.2}s at {} Hz)",
            args.file,
            CHANNEL_COUNT,
            samples.unwrap_or(0),
            duration_secs.unwrap_or(0.0),
            sampling_rate
        );
    }

    if error.is_some() {
        exit_codes::INPUT_ERROR
    } else {
        exit_codes::SUCCESS
    }
}
