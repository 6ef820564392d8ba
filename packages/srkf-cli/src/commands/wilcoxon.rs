use crate::cli::WilcoxonArgs;
use crate::commands::batch::resolve_glob;
use crate::exit_codes;
use crate::output;
use crate::params;
use srkf_rs::{
    consecutive_comparisons, read_welch_csv, write_comparison_csv, PowerScale, SeriesLabel,
    WelchResult,
};
use std::path::Path;

pub fn execute(args: WilcoxonArgs) -> i32 {
    let files = match (&args.glob, &args.files) {
        (Some(pattern), _) => match resolve_glob(pattern) {
            Ok(f) => f,
            Err(msg) => {
                eprintln!("Error: {}", msg);
                return exit_codes::INPUT_ERROR;
            }
        },
        (None, Some(files)) => files.clone(),
        (None, None) => {
            eprintln!("Error: One of --glob or --files must be specified");
            return exit_codes::INPUT_ERROR;
        }
    };

    let label: SeriesLabel = match args.series.parse() {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let mut sessions: Vec<(String, WelchResult)> = Vec::with_capacity(files.len());
    for file in &files {
        if let Err(msg) = params::validate_file(file) {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
        // The scale does not affect ranks
        match read_welch_csv(file, PowerScale::default()) {
            Ok(welch) => sessions.push((session_name(file), welch)),
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::INPUT_ERROR;
            }
        }
    }

    let comparisons = match consecutive_comparisons(&sessions, label) {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let text = if args.json {
        output::to_json(&comparisons, false)
    } else {
        let mut buf = Vec::new();
        write_comparison_csv(&comparisons, &mut buf)
            .map_err(|e| e.to_string())
            .and_then(|_| String::from_utf8(buf).map_err(|e| e.to_string()))
            .map(|csv| csv.trim_end().to_string())
    };
    let text = match text {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if let Err(e) = output::write_output(&text, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    exit_codes::SUCCESS
}

/// `rec01_Potter_Givens_welch.csv` -> `rec01_Potter_Givens`
fn session_name(file: &str) -> String {
    let stem = Path::new(file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file);
    stem.strip_suffix("_welch").unwrap_or(stem).to_string()
}
