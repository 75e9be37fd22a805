//! Media probing and the four Analyzer variants.
//!
//! Grounded on `media/analyzer.rs`'s `FfmpegAnalyzer` (ffprobe invocation via
//! `tokio::task::spawn_blocking`, serde-deserialized ffprobe JSON) for the
//! Rust probe idiom, and on the original implementation's
//! `transcoding/analysis.py` (`SourceAnalyzer`, `MKVPlaylistAnalyzer`,
//! `MKVSegmentAnalyzer`, `FFProbeHLSAnalyzer`) for the four variants' exact
//! fallback rules (§4.2).

mod probe;
mod variants;

pub use probe::{ProbeFormat, ProbeOutput, ProbeStream, Prober};
pub use variants::{HlsResultAnalyzer, PlaylistAnalyzer, SegmentAnalyzer, SourceAnalyzer};

use async_trait::async_trait;

use crate::error::Result;
use crate::metadata::Metadata;

/// Capability set replacing inheritance-based Extractor/Analyzer/Strategy
/// polymorphism (§9 redesign flag): one `analyze` entry point per variant,
/// each built on the shared `Prober`.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, uri: &str) -> Result<Metadata>;
}
