use crate::cli::InfoArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use srkf_rs::variants::VARIANT_COUNT;
use srkf_rs::{ArtifactStore, EngineConfig, CHANNEL_NAMES};

#[derive(Serialize)]
struct InfoOutput {
    cli_version: String,
    platform: String,
    arch: String,
    channels: Vec<&'static str>,
    variant_count: usize,
    artifact_dir: String,
    config_env: Option<String>,
    defaults: EngineConfig,
}

pub fn execute(args: InfoArgs) -> i32 {
    let info = InfoOutput {
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        channels: CHANNEL_NAMES.to_vec(),
        variant_count: VARIANT_COUNT,
        artifact_dir: ArtifactStore::default_root().display().to_string(),
        config_env: std::env::var("SRKF_CONFIG").ok(),
        defaults: EngineConfig::default(),
    };

    if args.json {
        if let Err(code) = output::print_json(&info) {
            return code;
        }
    } else {
        let d = &info.defaults;
        println!("srkf CLI v{}", info.cli_version);
        println!("Platform: {} ({})", info.platform, info.arch);
        println!();
        println!("Channels ({}): {}", info.channels.len(), info.channels.join(", "));
        println!("Variants: {}", info.variant_count);
        println!("Artifact directory: {}", info.artifact_dir);
        match info.config_env {
            Some(ref path) => println!("Config ($SRKF_CONFIG): {}", path),
            None => println!("Config ($SRKF_CONFIG): not set"),
        }
        println!();
        println!("Defaults:");
        println!("  Sampling rate: {} Hz", d.sampling_rate);
        println!(
            "  Noise: process std {}, measurement var {}",
            d.filter.process_noise_std, d.filter.measurement_noise_var
        );
        println!(
            "  Welch: segment {}, overlap {}",
            d.spectral.segment_length, d.spectral.overlap
        );
    }

    exit_codes::SUCCESS
}
