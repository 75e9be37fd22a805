//! Raw probe invocation, shared by all four Analyzer variants.
//!
//! Grounded on `media/analyzer.rs`'s ffprobe JSON structs and its
//! `spawn_blocking`-wrapped `Command::new("ffprobe")` invocation.

use serde::Deserialize;
use std::process::Command;

use crate::error::{Result, WorkerError};

#[derive(Debug, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    pub format: ProbeFormat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProbeStream {
    pub codec_type: String,
    #[serde(default)]
    pub codec_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default)]
    pub channels: Option<u32>,
    #[serde(default)]
    pub sample_rate: Option<String>,
    #[serde(default)]
    pub display_aspect_ratio: Option<String>,
    #[serde(default)]
    pub sample_aspect_ratio: Option<String>,
    #[serde(default)]
    pub r_frame_rate: Option<String>,
    #[serde(default)]
    pub nb_frames: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub tags: Option<std::collections::HashMap<String, String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProbeFormat {
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub bit_rate: Option<String>,
}

/// Runs `ffprobe` against a URI (or local path) and returns the parsed JSON.
/// `allowed_extensions` mirrors the probe CLI contract (§6) for playlists
/// whose segments don't end in standard container extensions.
pub struct Prober {
    allowed_extensions: Option<String>,
}

impl Prober {
    pub fn new() -> Self {
        Self {
            allowed_extensions: None,
        }
    }

    pub fn with_allowed_extensions(mut self, ext: impl Into<String>) -> Self {
        self.allowed_extensions = Some(ext.into());
        self
    }

    pub async fn probe(&self, uri: &str) -> Result<ProbeOutput> {
        let uri = uri.to_string();
        let allowed_extensions = self.allowed_extensions.clone();
        tokio::task::spawn_blocking(move || {
            let mut cmd = Command::new("ffprobe");
            cmd.args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ]);
            if let Some(ext) = &allowed_extensions {
                cmd.args(["-allowed_extensions", ext]);
            }
            cmd.arg(&uri);
            let output = cmd
                .output()
                .map_err(|e| WorkerError::Analyze(format!("failed to spawn ffprobe: {e}")))?;
            if !output.status.success() {
                let err = String::from_utf8_lossy(&output.stderr);
                return Err(WorkerError::Analyze(format!(
                    "ffprobe exited with {}: {}",
                    output.status, err
                )));
            }
            serde_json::from_slice::<ProbeOutput>(&output.stdout)
                .map_err(|e| WorkerError::Analyze(format!("unparseable ffprobe output: {e}")))
        })
        .await
        .map_err(|e| WorkerError::Analyze(format!("ffprobe task panicked: {e}")))?
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

pub fn parse_fps(r_frame_rate: &str) -> Option<f64> {
    if let Some((num, den)) = r_frame_rate.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        Some(num / den)
    } else {
        r_frame_rate.parse().ok()
    }
}

pub fn parse_f64(s: &Option<String>) -> Option<f64> {
    s.as_ref().and_then(|v| v.parse().ok())
}

pub fn parse_u64(s: &Option<String>) -> Option<u64> {
    s.as_ref().and_then(|v| v.parse::<f64>().ok()).map(|v| v as u64)
}

/// Parses `num:den` style display/sample aspect ratio strings into a ratio.
pub fn parse_ratio(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once(':') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        Some(num / den)
    } else {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fps_handles_fraction() {
        assert_eq!(parse_fps("30000/1001"), Some(30000.0 / 1001.0));
    }

    #[test]
    fn parse_fps_handles_decimal() {
        assert_eq!(parse_fps("25"), Some(25.0));
    }

    #[test]
    fn parse_ratio_handles_colon_form() {
        assert_eq!(parse_ratio("16:9"), Some(16.0 / 9.0));
    }
}
