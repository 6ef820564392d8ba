use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use srkf_rs::{ArtifactStore, RecordingSource, RunStatus, SessionRecord, SessionRequest, SessionRunner};
use std::path::PathBuf;

pub async fn execute(args: RunArgs) -> i32 {
    // Validate file
    if let Err(msg) = params::validate_file(&args.file) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let config = match params::build_config(&args.engine) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if let Err(msg) = params::validate_selection(std::slice::from_ref(&args.variant), &args.mask) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let runner = match SessionRunner::new(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let mut request = SessionRequest::new(
        RecordingSource::CsvFile(PathBuf::from(&args.file)),
        args.variant.as_str(),
        args.mask.as_str(),
    );
    if let Some(ref id) = args.session_id {
        request = request.with_session_id(id.as_str());
    }

    if !args.quiet {
        eprintln!("Running {} on {}...", args.variant, args.file);
        eprintln!("  Session: {}", request.session_id);
        eprintln!("  Mask: {}", args.mask);
    }

    let record = runner.run(request).await;

    if let Some(ref dir) = args.output_dir {
        match ArtifactStore::new(dir).save(&record) {
            Ok(paths) => {
                if !args.quiet {
                    eprintln!("Wrote {} artifacts to {}", paths.len(), dir);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    }

    let json = match output::to_json(&record, args.compact) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error serializing report: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };
    if let Err(e) = output::write_output(&json, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    if !args.quiet {
        if let Some(ref path) = args.output {
            eprintln!("Report written to {}", path);
        }
    }

    if !args.quiet {
        eprintln!(
            "Session {} {} in {:.3}s",
            record.session_id, record.status, record.processing_time_secs
        );
        if let Some(ref err) = record.error {
            eprintln!("  Reason: {}", err);
        }
    }

    exit_code_for(&record)
}

/// Exit code for a terminal session record.
pub fn exit_code_for(record: &SessionRecord) -> i32 {
    match record.status {
        RunStatus::Completed => exit_codes::SUCCESS,
        RunStatus::PartiallyFailed => exit_codes::PARTIAL_FAILURE,
        RunStatus::Failed if record.error_kind.as_deref() == Some("validation") => {
            exit_codes::INPUT_ERROR
        }
        _ => exit_codes::EXECUTION_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srkf_rs::SrkfError;

    #[test]
    fn test_exit_code_for_statuses() {
        let mut record = SessionRecord::pending("s", "Potter_Givens");
        record.status = RunStatus::Completed;
        assert_eq!(exit_code_for(&record), exit_codes::SUCCESS);

        record.status = RunStatus::PartiallyFailed;
        assert_eq!(exit_code_for(&record), exit_codes::PARTIAL_FAILURE);

        record.fail(&SrkfError::Validation("bad mask".to_string()));
        assert_eq!(exit_code_for(&record), exit_codes::INPUT_ERROR);

        record.fail(&SrkfError::Cancelled("timed out after 1.0s".to_string()));
        assert_eq!(exit_code_for(&record), exit_codes::EXECUTION_ERROR);
    }
}
