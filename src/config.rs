use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, WorkerError};

/// Operator-tunable configuration, enumerated exactly per the external
/// interfaces this worker honors. No reflective/dynamic config object:
/// unknown keys in the TOML file are rejected by serde's default strictness.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Base URI for the scratch workspace (`file://`, `dav://`, `davs://`).
    pub temp_uri: String,
    /// Base URI for the published HLS package store.
    pub results_uri: String,
    /// Database connection string for the job catalog (Postgres).
    pub database_url: String,

    #[serde(default = "default_chunk_duration")]
    pub chunk_duration: u64,
    #[serde(default = "default_segment_duration")]
    pub segment_duration: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: f64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,
    #[serde(default = "default_encode_timeout")]
    pub encode_timeout: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub edges: Vec<String>,
    #[serde(default = "default_url_template")]
    pub url_template: String,
    /// Seconds to wait after soft-stop before hard-killing the encoder (§4.7 `T`).
    #[serde(default = "default_soft_stop_grace")]
    pub soft_stop_grace: u64,
}

fn default_chunk_duration() -> u64 {
    60
}

fn default_segment_duration() -> u64 {
    2
}

fn default_connect_timeout() -> f64 {
    1.0
}

fn default_request_timeout() -> f64 {
    1.0
}

fn default_encode_timeout() -> u64 {
    3600
}

/// One transcode pipeline per logical CPU by default, mirroring the host's
/// own hardware-detection habits elsewhere in this codebase.
fn default_concurrency() -> usize {
    num_cpus::get().max(1)
}

fn default_url_template() -> String {
    "{edge}/results/{basename}/index.m3u8".to_string()
}

fn default_soft_stop_grace() -> u64 {
    10
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            temp_uri: "file:///tmp/transcode-worker".to_string(),
            results_uri: "file:///tmp/transcode-worker-results".to_string(),
            database_url: "postgres://localhost/video_transcoding".to_string(),
            chunk_duration: default_chunk_duration(),
            segment_duration: default_segment_duration(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            encode_timeout: default_encode_timeout(),
            concurrency: default_concurrency(),
            edges: Vec::new(),
            url_template: default_url_template(),
            soft_stop_grace: default_soft_stop_grace(),
        }
    }
}

impl WorkerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: WorkerConfig =
            toml::from_str(&content).map_err(|e| WorkerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_duration == 0 {
            return Err(WorkerError::Config("chunk_duration must be >= 1".into()));
        }
        if self.segment_duration == 0 {
            return Err(WorkerError::Config("segment_duration must be >= 1".into()));
        }
        if self.connect_timeout <= 0.0 || self.request_timeout <= 0.0 {
            return Err(WorkerError::Config(
                "connect_timeout/request_timeout must be > 0".into(),
            ));
        }
        if self.encode_timeout == 0 {
            return Err(WorkerError::Config("encode_timeout must be >= 1".into()));
        }
        if self.concurrency == 0 {
            return Err(WorkerError::Config("concurrency must be >= 1".into()));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| WorkerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Renders `url_template` against each configured edge, substituting
    /// `{edge}` and `{basename}`. One URL per edge, in configuration order.
    pub fn playback_urls(&self, basename: &str) -> Vec<String> {
        self.edges
            .iter()
            .map(|edge| {
                self.url_template
                    .replace("{edge}", edge.trim_end_matches('/'))
                    .replace("{basename}", basename)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = WorkerConfig::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_chunk_duration_rejected() {
        let mut cfg = WorkerConfig::default();
        cfg.chunk_duration = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn playback_urls_substitutes_edge_and_basename_per_edge() {
        let mut cfg = WorkerConfig::default();
        cfg.edges = vec!["https://edge1.example".into(), "https://edge2.example/".into()];
        let urls = cfg.playback_urls("b1a2c3d4");
        assert_eq!(
            urls,
            vec![
                "https://edge1.example/results/b1a2c3d4/index.m3u8",
                "https://edge2.example/results/b1a2c3d4/index.m3u8",
            ]
        );
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let cfg = WorkerConfig::load(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(cfg.chunk_duration, default_chunk_duration());
    }
}
