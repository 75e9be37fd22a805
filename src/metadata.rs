//! Stream metadata and the three reconstruction equations the Analyzer uses
//! to normalize inconsistent probe output.
//!
//! Grounded exactly on the original implementation's
//! `transcoding/metadata.py` (`fix_par`, `fix_frames`, `fix_samples`):
//! reconstruct whichever single value is missing from the other two; never
//! fabricate both; when all three are present but inconsistent beyond
//! tolerance, recompute the single least-reliable one.

use serde::{Deserialize, Serialize};

const DAR_TOLERANCE: f64 = 1e-3;
const COUNT_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoStreamMeta {
    pub width: u32,
    pub height: u32,
    pub dar: f64,
    pub par: f64,
    pub frame_rate: f64,
    pub frames: u64,
    pub bitrate: u64,
    pub duration: f64,
    #[serde(default)]
    pub scenes: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioStreamMeta {
    pub channels: u32,
    pub sampling_rate: u32,
    pub samples: u64,
    pub bitrate: u64,
    pub duration: f64,
    #[serde(default)]
    pub scenes: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Metadata {
    pub uri: String,
    pub videos: Vec<VideoStreamMeta>,
    pub audios: Vec<AudioStreamMeta>,
}

impl Metadata {
    pub fn video(&self) -> Option<&VideoStreamMeta> {
        self.videos.first()
    }

    pub fn audio(&self) -> Option<&AudioStreamMeta> {
        self.audios.first()
    }
}

/// Raw, possibly-partial fields read straight off the probe before
/// normalization. `None` means "the probe didn't report this field", which is
/// different from a reported zero.
#[derive(Debug, Clone, Default)]
pub struct RawVideoFields {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dar: Option<f64>,
    pub par: Option<f64>,
    pub frame_rate: Option<f64>,
    pub frames: Option<u64>,
    pub bitrate: Option<u64>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RawAudioFields {
    pub channels: Option<u32>,
    pub sampling_rate: Option<u32>,
    pub samples: Option<u64>,
    pub bitrate: Option<u64>,
    pub duration: Option<f64>,
}

/// Normalize aspect ratio fields. `None` for width/height means the stream
/// must be rejected by the caller (§4.2: "If width or height is missing the
/// stream is rejected").
pub fn fix_par(raw: &RawVideoFields) -> Option<(f64, f64)> {
    let width = raw.width? as f64;
    let height = raw.height? as f64;
    if width == 0.0 || height == 0.0 {
        return None;
    }
    let ratio = width / height;

    let (mut par, mut dar) = match (raw.par, raw.dar) {
        (Some(par), Some(dar)) => (par, dar),
        (None, Some(dar)) => (dar / ratio, dar),
        (Some(par), None) => (par, par * ratio),
        (None, None) => (1.0, ratio),
    };

    if (dar - ratio * par).abs() >= DAR_TOLERANCE {
        // PAR is the least-reliable value of the pair; recompute it from DAR.
        par = dar / ratio;
    }
    // Keep dar consistent in the returned tuple regardless of which branch ran.
    dar = ratio * par;
    Some((par, dar))
}

/// Reconstruct whichever of (duration, frame_rate, frames) is missing.
/// Returns `None` if two or more are unknown (never fabricate both).
pub fn fix_frames(raw: &RawVideoFields) -> Option<(f64, f64, u64)> {
    let known = [
        raw.duration.is_some(),
        raw.frame_rate.is_some(),
        raw.frames.is_some(),
    ]
    .iter()
    .filter(|x| **x)
    .count();
    if known < 2 {
        return None;
    }

    let (mut duration, frame_rate, mut frames) = match (raw.duration, raw.frame_rate, raw.frames) {
        (Some(d), Some(fr), Some(f)) => (d, fr, f),
        (None, Some(fr), Some(f)) => (f as f64 / fr, fr, f),
        (Some(d), None, Some(f)) => (d, f as f64 / d, f),
        (Some(d), Some(fr), None) => (d, fr, (d * fr).round() as u64),
        _ => unreachable!("known >= 2 guarantees exactly one None case handled above"),
    };

    if (frames as f64 - duration * frame_rate).abs() > COUNT_TOLERANCE {
        // frames is directly observed and duration is usually reliable;
        // frame_rate is the least-reliable of the three, recompute it.
        let recomputed_rate = frames as f64 / duration;
        return Some((duration, recomputed_rate, frames));
    }
    duration = frames as f64 / frame_rate;
    frames = (duration * frame_rate).round() as u64;
    Some((duration, frame_rate, frames))
}

/// Same reconstruction policy as `fix_frames`, for (duration, sampling_rate,
/// samples). sampling_rate is preferred (48000-class values are reliable);
/// samples is recomputed when the equation is inconsistent by >1.
pub fn fix_samples(raw: &RawAudioFields) -> Option<(f64, u32, u64)> {
    let known = [
        raw.duration.is_some(),
        raw.sampling_rate.is_some(),
        raw.samples.is_some(),
    ]
    .iter()
    .filter(|x| **x)
    .count();
    if known < 2 {
        return None;
    }

    let (duration, sampling_rate, mut samples) =
        match (raw.duration, raw.sampling_rate, raw.samples) {
            (Some(d), Some(sr), Some(s)) => (d, sr, s),
            (None, Some(sr), Some(s)) => (s as f64 / sr as f64, sr, s),
            (Some(d), None, Some(s)) => (d, (s as f64 / d).round() as u32, s),
            (Some(d), Some(sr), None) => (d, sr, (d * sr as f64).round() as u64),
            _ => unreachable!("known >= 2 guarantees exactly one None case handled above"),
        };

    if (samples as f64 - duration * sampling_rate as f64).abs() > COUNT_TOLERANCE {
        samples = (duration * sampling_rate as f64).round() as u64;
    }
    Some((duration, sampling_rate, samples))
}

/// Strips internal/diagnostic-only fields before `Metadata` is persisted to
/// the job catalog's public-facing `metadata` column -- `scenes` is
/// per-pipeline scene-change data, not part of the public contract a client
/// polling job status should see.
pub fn public_metadata(meta: &Metadata) -> serde_json::Value {
    let videos: Vec<_> = meta
        .videos
        .iter()
        .map(|v| {
            serde_json::json!({
                "width": v.width,
                "height": v.height,
                "dar": v.dar,
                "par": v.par,
                "frame_rate": v.frame_rate,
                "frames": v.frames,
                "bitrate": v.bitrate,
                "duration": v.duration,
            })
        })
        .collect();
    let audios: Vec<_> = meta
        .audios
        .iter()
        .map(|a| {
            serde_json::json!({
                "channels": a.channels,
                "sampling_rate": a.sampling_rate,
                "samples": a.samples,
                "bitrate": a.bitrate,
                "duration": a.duration,
            })
        })
        .collect();
    serde_json::json!({
        "uri": meta.uri,
        "videos": videos,
        "audios": audios,
    })
}

/// Shortest duration across every output video and audio stream -- the job
/// catalog's `duration` column reflects the weakest link, not just the first
/// video rendition.
pub fn min_duration(meta: &Metadata) -> Option<f64> {
    meta.videos
        .iter()
        .map(|v| v.duration)
        .chain(meta.audios.iter().map(|a| a.duration))
        .fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.min(d))))
}

/// Position-wise merge of per-chunk metadata into running whole-video
/// metadata, per §4.5's merge rule. Bitrate is never computed here -- it is
/// carried over from the source metadata by the caller.
pub fn merge_metadata(running: Option<Metadata>, chunk: Metadata) -> Metadata {
    let Some(running) = running else {
        return chunk;
    };
    let videos = running
        .videos
        .into_iter()
        .zip(chunk.videos.into_iter())
        .map(|(r, c)| VideoStreamMeta {
            duration: r.duration + c.duration,
            frames: r.frames + c.frames,
            scenes: r.scenes.into_iter().chain(c.scenes).collect(),
            ..r
        })
        .collect();
    let audios = running
        .audios
        .into_iter()
        .zip(chunk.audios.into_iter())
        .map(|(r, c)| AudioStreamMeta {
            duration: r.duration + c.duration,
            samples: r.samples + c.samples,
            scenes: r.scenes.into_iter().chain(c.scenes).collect(),
            ..r
        })
        .collect();
    Metadata {
        uri: running.uri,
        videos,
        audios,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn par_reconstructed_from_dar() {
        let raw = RawVideoFields {
            width: Some(1920),
            height: Some(1080),
            dar: Some(1920.0 / 1080.0),
            par: None,
            ..Default::default()
        };
        let (par, dar) = fix_par(&raw).unwrap();
        assert!((par - 1.0).abs() < DAR_TOLERANCE);
        assert!((dar - (1920.0 / 1080.0) * par).abs() < DAR_TOLERANCE);
    }

    #[test]
    fn missing_width_is_rejected() {
        let raw = RawVideoFields {
            width: None,
            height: Some(1080),
            ..Default::default()
        };
        assert!(fix_par(&raw).is_none());
    }

    #[test]
    fn both_dar_and_par_missing_defaults_to_square_pixels() {
        let raw = RawVideoFields {
            width: Some(640),
            height: Some(480),
            ..Default::default()
        };
        let (par, dar) = fix_par(&raw).unwrap();
        assert_eq!(par, 1.0);
        assert!((dar - 640.0 / 480.0).abs() < DAR_TOLERANCE);
    }

    #[test]
    fn frames_reconstructed_from_duration_and_rate() {
        let raw = RawVideoFields {
            duration: Some(10.0),
            frame_rate: Some(30.0),
            frames: None,
            ..Default::default()
        };
        let (duration, frame_rate, frames) = fix_frames(&raw).unwrap();
        assert_eq!(frames, 300);
        assert_eq!(duration, 10.0);
        assert_eq!(frame_rate, 30.0);
    }

    #[test]
    fn frames_two_unknown_gives_up() {
        let raw = RawVideoFields {
            duration: Some(10.0),
            ..Default::default()
        };
        assert!(fix_frames(&raw).is_none());
    }

    #[test]
    fn inconsistent_frame_rate_is_recomputed() {
        let raw = RawVideoFields {
            duration: Some(10.0),
            frame_rate: Some(1.0), // deliberately wrong
            frames: Some(300),
            ..Default::default()
        };
        let (_, frame_rate, frames) = fix_frames(&raw).unwrap();
        assert_eq!(frames, 300);
        assert_eq!(frame_rate, 30.0);
    }

    #[test]
    fn samples_reconstructed_preferring_sampling_rate() {
        let raw = RawAudioFields {
            duration: Some(10.0),
            sampling_rate: Some(48000),
            samples: Some(1), // inconsistent, should be recomputed
            ..Default::default()
        };
        let (_, sampling_rate, samples) = fix_samples(&raw).unwrap();
        assert_eq!(sampling_rate, 48000);
        assert_eq!(samples, 480000);
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let meta = Metadata {
            uri: "file:///dst/index.m3u8".into(),
            videos: vec![VideoStreamMeta {
                width: 1920,
                height: 1080,
                dar: 1.777,
                par: 1.0,
                frame_rate: 30.0,
                frames: 300,
                bitrate: 5_000_000,
                duration: 10.0,
                scenes: vec![1.2, 3.4],
            }],
            audios: vec![AudioStreamMeta {
                channels: 2,
                sampling_rate: 48_000,
                samples: 480_000,
                bitrate: 192_000,
                duration: 10.0,
                scenes: vec![],
            }],
        };
        let bytes = serde_json::to_vec(&meta).unwrap();
        let round_tripped: Metadata = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(round_tripped, meta);
    }

    #[test]
    fn public_metadata_strips_scenes() {
        let meta = Metadata {
            uri: "x".into(),
            videos: vec![VideoStreamMeta {
                width: 1920,
                height: 1080,
                dar: 1.777,
                par: 1.0,
                frame_rate: 30.0,
                frames: 300,
                bitrate: 5_000_000,
                duration: 10.0,
                scenes: vec![1.0, 2.0],
            }],
            audios: vec![],
        };
        let value = public_metadata(&meta);
        assert!(value["videos"][0].get("scenes").is_none());
        assert_eq!(value["videos"][0]["duration"], 10.0);
    }

    #[test]
    fn min_duration_is_the_shortest_stream() {
        let meta = Metadata {
            uri: "x".into(),
            videos: vec![
                VideoStreamMeta {
                    duration: 12.0,
                    ..sample_video_for_duration()
                },
                VideoStreamMeta {
                    duration: 9.5,
                    ..sample_video_for_duration()
                },
            ],
            audios: vec![AudioStreamMeta {
                channels: 2,
                sampling_rate: 48_000,
                samples: 480_000,
                bitrate: 192_000,
                duration: 10.0,
                scenes: vec![],
            }],
        };
        assert_eq!(min_duration(&meta), Some(9.5));
    }

    fn sample_video_for_duration() -> VideoStreamMeta {
        VideoStreamMeta {
            width: 1920,
            height: 1080,
            dar: 1.777,
            par: 1.0,
            frame_rate: 30.0,
            frames: 300,
            bitrate: 5_000_000,
            duration: 0.0,
            scenes: vec![],
        }
    }

    #[test]
    fn merge_sums_duration_and_frames() {
        let base = Metadata {
            uri: "x".into(),
            videos: vec![VideoStreamMeta {
                width: 1920,
                height: 1080,
                dar: 1.777,
                par: 1.0,
                frame_rate: 30.0,
                frames: 150,
                bitrate: 5_000_000,
                duration: 5.0,
                scenes: vec![],
            }],
            audios: vec![],
        };
        let chunk = Metadata {
            uri: "x".into(),
            videos: vec![VideoStreamMeta {
                frames: 150,
                duration: 5.0,
                ..base.videos[0].clone()
            }],
            audios: vec![],
        };
        let merged = merge_metadata(Some(base), chunk);
        assert_eq!(merged.videos[0].frames, 300);
        assert_eq!(merged.videos[0].duration, 10.0);
    }
}
