pub mod channels;
pub mod error;
pub mod export;
pub mod filter_bank;
pub mod kernel;
pub mod mmap_utils;
pub mod process;
pub mod profiling;
pub mod reader;
pub mod runner;
pub mod spectral;
pub mod stats;
pub mod store;
pub mod types;
pub mod update;
pub mod variants;

pub use channels::{ChannelMask, ChannelMatrix, SeriesLabel, CHANNEL_COUNT, CHANNEL_NAMES};
pub use error::{Result, SrkfError};
pub use export::{read_welch_csv, write_comparison_csv, ArtifactStore, ExportKind};
pub use filter_bank::{CancellationFlag, FilterBank, FilterRunResult, SeriesFailure, SeriesOutput};
pub use kernel::KernelKind;
pub use reader::{parse_channel_csv, read_channel_csv};
pub use runner::{RecordingSource, SessionRequest, SessionRunner};
pub use spectral::{SpectralAnalyzer, WelchResult};
pub use stats::{consecutive_comparisons, signed_rank, SessionComparison, SignedRankTest};
pub use store::{RunStatus, SessionRecord, SessionStore, SessionSummary};
pub use types::*;
pub use update::{FilterState, Measurement, UpdateRule};
pub use variants::{VariantId, VariantMetadata};
