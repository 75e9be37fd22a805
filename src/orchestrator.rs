//! Sentinel-driven resumable pipeline: Initialize -> Analyze -> Select ->
//! Split -> Enumerate chunks -> Process each chunk -> Concat+Segment ->
//! Cleanup. Every expensive step's output is guarded by a sentinel artifact
//! under the temp workspace; a step whose sentinel already exists is skipped
//! and its cached result loaded instead of recomputed, which is how the
//! pipeline survives a worker restart mid-job without duplicating work.
//!
//! Grounded on `orchestrator.rs`'s `transcode_media` (the teacher's single
//! linear function driving analyze -> plan -> encode -> verify) generalized
//! into the eight-step pipeline, and on the original implementation's
//! `transcoding/tasks.py::process_video` for the exact sentinel filenames and
//! step order. Holds no database handle -- constructed from a workspace pair,
//! a preset, and a basename, so it is unit-testable against a local
//! filesystem workspace alone.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analyzer::{Analyzer, HlsResultAnalyzer, PlaylistAnalyzer, SegmentAnalyzer, SourceAnalyzer};
use crate::encoder::{
    enumerate_chunks, encoder_version, run_encoder, Segmentor, SplitResult, Splitter, Transcoder,
    VariantInput,
};
use crate::error::{Result, WorkerError};
use crate::metadata::{merge_metadata, Metadata};
use crate::profile::Profile;
use crate::workspace::{Collection, Workspace};

const SOURCE_CONTAINER_EXT: &str = "mkv";

/// Minimum acceptable ratio of final output duration to source duration.
/// Grounded on the original's `Transcoder.validate`/`DURATION_DELTA`.
const DURATION_DELTA: f64 = 0.95;

#[derive(Debug, Serialize, Deserialize)]
struct ChunkSentinel {
    metadata: Metadata,
    encoder_version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SplitSentinel {
    video_playlist: String,
    audio_playlist: String,
    #[serde(default)]
    post_split_metadata: Option<Metadata>,
}

/// Drives one job's pipeline to completion or to a propagated error. The
/// caller (Job Runner) is responsible for translating the returned error
/// into a job status and for wiring cancellation into `run_encoder`'s
/// `CancelHandle` -- this type only sequences the steps.
pub struct Orchestrator {
    temp: Arc<dyn Workspace>,
    store: Arc<dyn Workspace>,
    basename: String,
    preset: crate::profile::Preset,
    soft_stop_grace: Duration,
    /// Operator-configured chunk length for the Split step (`WorkerConfig::chunk_duration`).
    chunk_duration: u64,
    /// Operator-configured HLS segment length for the Segmentor step (`WorkerConfig::segment_duration`).
    segment_duration: u64,
    /// Wall-clock budget for a single encoder invocation before it is
    /// cancelled (`WorkerConfig::encode_timeout`).
    encode_timeout: Duration,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        temp: Arc<dyn Workspace>,
        store: Arc<dyn Workspace>,
        basename: impl Into<String>,
        preset: crate::profile::Preset,
        soft_stop_grace: Duration,
        chunk_duration: u64,
        segment_duration: u64,
        encode_timeout: Duration,
    ) -> Self {
        Self {
            temp,
            store,
            basename: basename.into(),
            preset,
            soft_stop_grace,
            chunk_duration,
            segment_duration,
            encode_timeout,
        }
    }

    fn sources(&self) -> Collection {
        Collection::root()
            .collection(&self.basename)
            .collection("sources")
    }

    fn results(&self) -> Collection {
        Collection::root()
            .collection(&self.basename)
            .collection("results")
    }

    fn job_root(&self) -> Collection {
        Collection::root().collection(&self.basename)
    }

    /// Runs the full pipeline against `source_uri`, returning the final,
    /// authoritative Metadata as probed from the published master playlist.
    pub async fn run(&self, source_uri: &str) -> Result<Metadata> {
        self.initialize().await?;
        let source_meta = self.analyze(source_uri).await?;
        let profile = self.select_profile(&source_meta).await?;
        let split = self.split(source_uri, &profile).await?;
        let chunks = enumerate_chunks_from_playlist(&*self.temp, &self.sources(), &split).await?;
        let merged = self.process_chunks(&chunks, &profile).await?;
        let result = self.concat_and_segment(&chunks, &profile, &merged).await?;
        validate_duration(&source_meta, &result)?;
        self.cleanup_on_success().await?;
        Ok(result)
    }

    async fn initialize(&self) -> Result<()> {
        self.temp.ensure_collection(&self.sources()).await?;
        self.temp.ensure_collection(&self.results()).await?;
        self.store.ensure_collection(&self.job_root()).await?;
        Ok(())
    }

    async fn analyze(&self, source_uri: &str) -> Result<Metadata> {
        let sentinel = self.sources().file("source.json");
        if self.temp.exists(sentinel.resource()).await? {
            let bytes = self.temp.read(&sentinel).await?;
            return serde_json::from_slice(&bytes)
                .map_err(|e| WorkerError::Analyze(format!("corrupt source.json: {e}")));
        }
        let meta = SourceAnalyzer::new().analyze(source_uri).await?;
        let bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| WorkerError::Analyze(format!("failed to serialize metadata: {e}")))?;
        self.temp.write(&sentinel, &bytes).await?;
        Ok(meta)
    }

    async fn select_profile(&self, source_meta: &Metadata) -> Result<Profile> {
        let sentinel = self.sources().file("profile.json");
        if self.temp.exists(sentinel.resource()).await? {
            let bytes = self.temp.read(&sentinel).await?;
            return serde_json::from_slice(&bytes)
                .map_err(|e| WorkerError::Profile(format!("corrupt profile.json: {e}")));
        }
        let video = source_meta
            .video()
            .ok_or_else(|| WorkerError::Profile("source has no video stream".into()))?;
        let audio = source_meta
            .audio()
            .ok_or_else(|| WorkerError::Profile("source has no audio stream".into()))?;
        let profile = self.preset.select_profile(video, audio)?;
        let bytes = serde_json::to_vec_pretty(&profile)
            .map_err(|e| WorkerError::Profile(format!("failed to serialize profile: {e}")))?;
        self.temp.write(&sentinel, &bytes).await?;
        Ok(profile)
    }

    async fn split(&self, source_uri: &str, profile: &Profile) -> Result<SplitResult> {
        let sentinel = self.sources().file("split.json");
        if self.temp.exists(sentinel.resource()).await? {
            let bytes = self.temp.read(&sentinel).await?;
            let sentinel: SplitSentinel = serde_json::from_slice(&bytes)
                .map_err(|e| WorkerError::Analyze(format!("corrupt split.json: {e}")))?;
            return Ok(SplitResult {
                video_playlist_path: sentinel.video_playlist,
                audio_playlist_path: sentinel.audio_playlist,
            });
        }

        let video_playlist = self.temp.absolute_uri(self.sources().file("source-video.m3u8").resource());
        let audio_playlist = self.temp.absolute_uri(self.sources().file("source-audio.m3u8").resource());

        let splitter = Splitter::new(
            source_uri,
            video_playlist.to_string(),
            audio_playlist.to_string(),
            self.chunk_duration,
        );
        let (handle, _cancel) = run_encoder(
            splitter.build(),
            "splitter".into(),
            self.soft_stop_grace,
            self.encode_timeout,
        );
        handle
            .await
            .map_err(|e| WorkerError::Encode("splitter".into(), format!("task panicked: {e}")))??;

        let result = splitter.result();
        let post_split_metadata = PlaylistAnalyzer::new(SOURCE_CONTAINER_EXT)
            .analyze(&result.video_playlist_path)
            .await
            .ok();
        let sentinel_bytes = serde_json::to_vec_pretty(&SplitSentinel {
            video_playlist: result.video_playlist_path.clone(),
            audio_playlist: result.audio_playlist_path.clone(),
            post_split_metadata,
        })
        .map_err(|e| WorkerError::Analyze(format!("failed to serialize split result: {e}")))?;
        self.temp
            .write(&self.sources().file("split.json"), &sentinel_bytes)
            .await?;
        Ok(result)
    }

    async fn process_chunks(&self, chunks: &[String], profile: &Profile) -> Result<Metadata> {
        let mut running: Option<Metadata> = None;
        for chunk in chunks {
            let sentinel = self.results().file(format!("{chunk}.json"));
            let chunk_meta = if self.temp.exists(sentinel.resource()).await? {
                let bytes = self.temp.read(&sentinel).await?;
                let sentinel: ChunkSentinel = serde_json::from_slice(&bytes)
                    .map_err(|e| WorkerError::Analyze(format!("corrupt {chunk}.json: {e}")))?;
                sentinel.metadata
            } else {
                self.transcode_one_chunk(chunk, profile).await?
            };
            running = Some(merge_metadata(running, chunk_meta));
        }
        running.ok_or_else(|| WorkerError::Analyze("source produced zero chunks".into()))
    }

    async fn transcode_one_chunk(&self, chunk: &str, profile: &Profile) -> Result<Metadata> {
        let source_chunk = self.temp.absolute_uri(self.sources().file(chunk).resource());
        let output = self.temp.absolute_uri(self.results().file(chunk).resource());

        let transcoder = Transcoder::new(
            source_chunk.to_string(),
            output.to_string(),
            profile.video.clone(),
            SOURCE_CONTAINER_EXT,
        );
        let (handle, _cancel) = run_encoder(
            transcoder.build(),
            "transcoder".into(),
            self.soft_stop_grace,
            self.encode_timeout,
        );
        handle
            .await
            .map_err(|e| WorkerError::Encode("transcoder".into(), format!("task panicked: {e}")))??;

        let meta = SegmentAnalyzer::new(SOURCE_CONTAINER_EXT)
            .analyze(output.as_str())
            .await?;
        let sentinel = ChunkSentinel {
            metadata: meta.clone(),
            encoder_version: encoder_version().await.unwrap_or_else(|_| "unknown".to_string()),
        };
        let bytes = serde_json::to_vec_pretty(&sentinel)
            .map_err(|e| WorkerError::Analyze(format!("failed to serialize chunk metadata: {e}")))?;
        self.temp
            .write(&self.results().file(format!("{chunk}.json")), &bytes)
            .await?;
        Ok(meta)
    }

    async fn concat_and_segment(
        &self,
        chunks: &[String],
        profile: &Profile,
        merged: &Metadata,
    ) -> Result<Metadata> {
        let concat_list = build_ffconcat(chunks);
        self.temp
            .write(&self.results().file("concat.ffconcat"), concat_list.as_bytes())
            .await?;
        let concat_uri = self
            .temp
            .absolute_uri(self.results().file("concat.ffconcat").resource());
        let audio_playlist_uri = self
            .temp
            .absolute_uri(self.sources().file("source-audio.m3u8").resource());

        let master_uri = self.store.absolute_uri(self.job_root().file("index.m3u8").resource());
        let variants: Vec<VariantInput> = profile
            .video
            .iter()
            .map(|track| VariantInput {
                track: track.clone(),
                concat_list_path: concat_uri.to_string(),
            })
            .collect();
        let audio_track = profile
            .audio
            .first()
            .cloned()
            .ok_or_else(|| WorkerError::Profile("profile selected zero audio tracks".into()))?;

        let segmentor = Segmentor::new(
            variants,
            audio_track,
            audio_playlist_uri.to_string(),
            self.segment_duration as f64,
            master_uri
                .to_string()
                .trim_end_matches("/index.m3u8")
                .to_string(),
            "index.m3u8".to_string(),
            merged.clone(),
        );
        let (handle, _cancel) = run_encoder(
            segmentor.build(),
            "segmentor".into(),
            self.soft_stop_grace,
            self.encode_timeout,
        );
        handle
            .await
            .map_err(|e| WorkerError::Encode("segmentor".into(), format!("task panicked: {e}")))??;

        HlsResultAnalyzer::new().analyze(master_uri.as_str()).await
    }

    /// On success the entire temp tree is discarded -- nothing left behind
    /// to resume. On error the store tree is discarded instead and the temp
    /// tree is preserved for forensic resume (DESIGN.md open question #4).
    async fn cleanup_on_success(&self) -> Result<()> {
        self.temp.delete_collection(&self.job_root()).await
    }

    pub async fn cleanup_on_error(&self) -> Result<()> {
        self.store.delete_collection(&self.job_root()).await
    }
}

async fn enumerate_chunks_from_playlist(
    temp: &dyn Workspace,
    sources: &Collection,
    split: &SplitResult,
) -> Result<Vec<String>> {
    let _ = &split.audio_playlist_path;
    let playlist_file = sources.file("source-video.m3u8");
    let bytes = temp.read(&playlist_file).await?;
    let content = String::from_utf8(bytes)
        .map_err(|e| WorkerError::Analyze(format!("non-utf8 playlist: {e}")))?;
    Ok(enumerate_chunks(&content))
}

/// Rejects a result whose duration collapsed relative to the source --
/// chunk boundaries dropped or the segmentor silently truncating a rendition.
/// Grounded on the original's `Transcoder.validate`: source duration is the
/// max of its single video/audio stream, output duration is the min across
/// every rendition the Segmentor produced.
fn validate_duration(source: &Metadata, result: &Metadata) -> Result<()> {
    let src_duration = source
        .video()
        .map(|v| v.duration)
        .unwrap_or(0.0)
        .max(source.audio().map(|a| a.duration).unwrap_or(0.0));

    let dst_duration = result
        .videos
        .iter()
        .map(|v| v.duration)
        .chain(result.audios.iter().map(|a| a.duration))
        .fold(None::<f64>, |acc, d| Some(acc.map_or(d, |m| m.min(d))))
        .unwrap_or(0.0);

    if dst_duration < DURATION_DELTA * src_duration {
        return Err(WorkerError::Validation(format!(
            "output duration {dst_duration:.3}s is below {DURATION_DELTA} of source duration {src_duration:.3}s"
        )));
    }
    Ok(())
}

fn build_ffconcat(chunks: &[String]) -> String {
    let mut out = String::from("ffconcat version 1.0\n");
    for chunk in chunks {
        out.push_str(&format!("file '{chunk}'\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffconcat_lists_chunks_in_order() {
        let list = build_ffconcat(&["c1".to_string(), "c2".to_string()]);
        assert_eq!(list, "ffconcat version 1.0\nfile 'c1'\nfile 'c2'\n");
    }

    fn stream(duration: f64) -> crate::metadata::VideoStreamMeta {
        crate::metadata::VideoStreamMeta {
            width: 1920,
            height: 1080,
            dar: 1.777,
            par: 1.0,
            frame_rate: 30.0,
            frames: (duration * 30.0) as u64,
            bitrate: 5_000_000,
            duration,
            scenes: vec![],
        }
    }

    #[test]
    fn validate_duration_accepts_a_result_within_tolerance() {
        let source = Metadata {
            uri: "src".into(),
            videos: vec![stream(100.0)],
            audios: vec![],
        };
        let result = Metadata {
            uri: "dst".into(),
            videos: vec![stream(96.0), stream(96.0)],
            audios: vec![],
        };
        assert!(validate_duration(&source, &result).is_ok());
    }

    #[test]
    fn validate_duration_rejects_a_truncated_result() {
        let source = Metadata {
            uri: "src".into(),
            videos: vec![stream(100.0)],
            audios: vec![],
        };
        let result = Metadata {
            uri: "dst".into(),
            videos: vec![stream(100.0), stream(50.0)],
            audios: vec![],
        };
        let err = validate_duration(&source, &result).unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));
    }
}
