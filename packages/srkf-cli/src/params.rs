use crate::cli::ConfigArgs;
use srkf_rs::{ChannelMask, EngineConfig, VariantId};
use std::path::Path;

/// Load the engine configuration and apply flag overrides.
pub fn build_config(args: &ConfigArgs) -> Result<EngineConfig, String> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };

    if let Some(fs) = args.fs {
        config.sampling_rate = fs;
    }
    if let Some(segment) = args.segment {
        config.spectral.segment_length = segment;
    }
    if let Some(overlap) = args.overlap {
        config.spectral.overlap = overlap;
    }
    if let Some(q) = args.process_noise {
        config.filter.process_noise_std = q;
    }
    if let Some(r) = args.measurement_noise {
        config.filter.measurement_noise_var = r;
    }
    if args.timeout_secs.is_some() {
        config.timeout_secs = args.timeout_secs;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Existence check for an input recording.
pub fn validate_file(file_path: &str) -> Result<(), String> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("Input file not found: {}", file_path));
    }
    if !path.is_file() {
        return Err(format!("Input path is not a file: {}", file_path));
    }
    Ok(())
}

/// Check variant names and the mask before any file is read.
pub fn validate_selection(variants: &[String], mask: &str) -> Result<(), String> {
    if variants.is_empty() {
        return Err("At least one variant must be specified".to_string());
    }
    for v in variants {
        v.parse::<VariantId>().map_err(|e| e.to_string())?;
    }
    mask.parse::<ChannelMask>().map_err(|e| e.to_string())?;
    Ok(())
}

/// Session id for one file x variant pair of a batch
pub fn batch_session_id(file_path: &str, variant: &str) -> String {
    let stem = Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recording");
    format!("{}_{}", stem, variant)
}
