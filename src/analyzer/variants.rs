use async_trait::async_trait;

use super::probe::{parse_f64, parse_fps, parse_ratio, parse_u64, ProbeOutput, ProbeStream, Prober};
use super::Analyzer;
use crate::error::{Result, WorkerError};
use crate::metadata::{
    fix_frames, fix_par, fix_samples, AudioStreamMeta, Metadata, RawAudioFields, RawVideoFields,
    VideoStreamMeta,
};

fn raw_video_fields(s: &ProbeStream, fmt_duration: Option<f64>) -> RawVideoFields {
    let dar = s
        .display_aspect_ratio
        .as_deref()
        .and_then(parse_ratio);
    let par = s
        .sample_aspect_ratio
        .as_deref()
        .and_then(parse_ratio);
    RawVideoFields {
        width: s.width,
        height: s.height,
        dar,
        par,
        frame_rate: s.r_frame_rate.as_deref().and_then(parse_fps),
        frames: s.nb_frames.as_ref().and_then(|v| v.parse().ok()),
        bitrate: parse_u64(&s.bit_rate),
        duration: parse_f64(&s.duration).or(fmt_duration),
    }
}

fn raw_audio_fields(s: &ProbeStream, fmt_duration: Option<f64>) -> RawAudioFields {
    RawAudioFields {
        channels: s.channels,
        sampling_rate: s
            .sample_rate
            .as_ref()
            .and_then(|v| v.parse().ok()),
        samples: None, // ffprobe rarely reports nb_samples at the format level we probe
        bitrate: parse_u64(&s.bit_rate),
        duration: parse_f64(&s.duration).or(fmt_duration),
    }
}

fn build_video_meta(s: &ProbeStream, fmt_duration: Option<f64>) -> Result<VideoStreamMeta> {
    let raw = raw_video_fields(s, fmt_duration);
    let (par, dar) = fix_par(&raw)
        .ok_or_else(|| WorkerError::Analyze("video stream missing width/height".into()))?;
    let (duration, frame_rate, frames) =
        fix_frames(&raw).unwrap_or((raw.duration.unwrap_or(0.0), raw.frame_rate.unwrap_or(0.0), 0));
    Ok(VideoStreamMeta {
        width: raw.width.unwrap_or(0),
        height: raw.height.unwrap_or(0),
        dar,
        par,
        frame_rate,
        frames,
        bitrate: raw.bitrate.unwrap_or(0),
        duration,
        scenes: Vec::new(),
    })
}

fn build_audio_meta(s: &ProbeStream, fmt_duration: Option<f64>) -> AudioStreamMeta {
    let raw = raw_audio_fields(s, fmt_duration);
    let (duration, sampling_rate, samples) =
        fix_samples(&raw).unwrap_or((raw.duration.unwrap_or(0.0), raw.sampling_rate.unwrap_or(0), 0));
    AudioStreamMeta {
        channels: raw.channels.unwrap_or(0),
        sampling_rate,
        samples,
        bitrate: raw.bitrate.unwrap_or(0),
        duration,
        scenes: Vec::new(),
    }
}

fn split_streams(probe: &ProbeOutput) -> (Vec<&ProbeStream>, Vec<&ProbeStream>) {
    let videos = probe
        .streams
        .iter()
        .filter(|s| s.codec_type == "video")
        .collect();
    let audios = probe
        .streams
        .iter()
        .filter(|s| s.codec_type == "audio")
        .collect();
    (videos, audios)
}

/// Container-level tool with rich per-track info: no fallbacks needed, every
/// field is expected to be present on the stream itself.
pub struct SourceAnalyzer {
    prober: Prober,
}

impl SourceAnalyzer {
    pub fn new() -> Self {
        Self {
            prober: Prober::new(),
        }
    }
}

impl Default for SourceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Analyzer for SourceAnalyzer {
    async fn analyze(&self, uri: &str) -> Result<Metadata> {
        let probe = self.prober.probe(uri).await?;
        let fmt_duration = parse_f64(&probe.format.duration);
        let (videos, audios) = split_streams(&probe);
        let videos = videos
            .into_iter()
            .map(|s| build_video_meta(s, fmt_duration))
            .collect::<Result<Vec<_>>>()?;
        let audios = audios
            .into_iter()
            .map(|s| build_audio_meta(s, fmt_duration))
            .collect();
        Ok(Metadata {
            uri: uri.to_string(),
            videos,
            audios,
        })
    }
}

/// Stream-of-segments container: when only one stream is present, duration
/// falls back to the container duration (grounded on `MKVPlaylistAnalyzer`).
pub struct PlaylistAnalyzer {
    prober: Prober,
}

impl PlaylistAnalyzer {
    pub fn new(allowed_extensions: impl Into<String>) -> Self {
        Self {
            prober: Prober::new().with_allowed_extensions(allowed_extensions),
        }
    }
}

#[async_trait]
impl Analyzer for PlaylistAnalyzer {
    async fn analyze(&self, uri: &str) -> Result<Metadata> {
        let probe = self.prober.probe(uri).await?;
        let fmt_duration = parse_f64(&probe.format.duration);
        let single_stream = probe.streams.len() == 1;
        let (videos, audios) = split_streams(&probe);
        let duration_fallback = |s: &ProbeStream| -> Option<f64> {
            if single_stream && parse_f64(&s.duration).is_none() {
                fmt_duration
            } else {
                None
            }
        };
        let videos = videos
            .into_iter()
            .map(|s| build_video_meta(s, duration_fallback(s).or(fmt_duration)))
            .collect::<Result<Vec<_>>>()?;
        let audios = audios
            .into_iter()
            .map(|s| build_audio_meta(s, duration_fallback(s).or(fmt_duration)))
            .collect();
        Ok(Metadata {
            uri: uri.to_string(),
            videos,
            audios,
        })
    }
}

/// Extends `PlaylistAnalyzer`: bitrate falls back to container bitrate when
/// the per-stream value is zero and only one stream exists (grounded on
/// `MKVSegmentAnalyzer`).
pub struct SegmentAnalyzer {
    prober: Prober,
}

impl SegmentAnalyzer {
    pub fn new(allowed_extensions: impl Into<String>) -> Self {
        Self {
            prober: Prober::new().with_allowed_extensions(allowed_extensions),
        }
    }
}

#[async_trait]
impl Analyzer for SegmentAnalyzer {
    async fn analyze(&self, uri: &str) -> Result<Metadata> {
        let probe = self.prober.probe(uri).await?;
        let fmt_duration = parse_f64(&probe.format.duration);
        let fmt_bitrate = parse_u64(&probe.format.bit_rate);
        let single_stream = probe.streams.len() == 1;
        let (videos, audios) = split_streams(&probe);

        let mut video_metas = Vec::new();
        for s in videos {
            let mut raw = raw_video_fields(
                s,
                if single_stream && parse_f64(&s.duration).is_none() {
                    fmt_duration
                } else {
                    None
                },
            );
            if single_stream && raw.bitrate.unwrap_or(0) == 0 {
                raw.bitrate = fmt_bitrate;
            }
            let (par, dar) = fix_par(&raw)
                .ok_or_else(|| WorkerError::Analyze("video stream missing width/height".into()))?;
            let (duration, frame_rate, frames) = fix_frames(&raw)
                .unwrap_or((raw.duration.unwrap_or(0.0), raw.frame_rate.unwrap_or(0.0), 0));
            video_metas.push(VideoStreamMeta {
                width: raw.width.unwrap_or(0),
                height: raw.height.unwrap_or(0),
                dar,
                par,
                frame_rate,
                frames,
                bitrate: raw.bitrate.unwrap_or(0),
                duration,
                scenes: Vec::new(),
            });
        }

        let mut audio_metas = Vec::new();
        for s in audios {
            let mut raw = raw_audio_fields(
                s,
                if single_stream && parse_f64(&s.duration).is_none() {
                    fmt_duration
                } else {
                    None
                },
            );
            if single_stream && raw.bitrate.unwrap_or(0) == 0 {
                raw.bitrate = fmt_bitrate;
            }
            let (duration, sampling_rate, samples) = fix_samples(&raw).unwrap_or((
                raw.duration.unwrap_or(0.0),
                raw.sampling_rate.unwrap_or(0),
                0,
            ));
            audio_metas.push(AudioStreamMeta {
                channels: raw.channels.unwrap_or(0),
                sampling_rate,
                samples,
                bitrate: raw.bitrate.unwrap_or(0),
                duration,
                scenes: Vec::new(),
            });
        }

        Ok(Metadata {
            uri: uri.to_string(),
            videos: video_metas,
            audios: audio_metas,
        })
    }
}

/// Probes the final HLS master/variant output. Skips audio streams marked as
/// alternative-group members (an HLS "comment" tag); prefers per-stream
/// bitrate, else the HLS variant-bandwidth tag divided by 1.1 (the encoder
/// adds ~10% container overhead). Grounded on `FFProbeHLSAnalyzer`.
pub struct HlsResultAnalyzer {
    prober: Prober,
}

impl HlsResultAnalyzer {
    pub fn new() -> Self {
        Self {
            prober: Prober::new(),
        }
    }
}

impl Default for HlsResultAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

const HLS_BANDWIDTH_OVERHEAD: f64 = 1.1;

#[async_trait]
impl Analyzer for HlsResultAnalyzer {
    async fn analyze(&self, uri: &str) -> Result<Metadata> {
        let probe = self.prober.probe(uri).await?;
        let fmt_duration = parse_f64(&probe.format.duration);

        let mut videos = Vec::new();
        let mut audios = Vec::new();
        for s in &probe.streams {
            let is_alt_group = s
                .tags
                .as_ref()
                .and_then(|t| t.get("comment"))
                .map(|c| !c.is_empty())
                .unwrap_or(false);
            if is_alt_group {
                continue;
            }
            match s.codec_type.as_str() {
                "video" => {
                    let raw = raw_video_fields(
                        s,
                        if parse_f64(&s.duration).is_none() {
                            fmt_duration
                        } else {
                            None
                        },
                    );
                    let (par, dar) = fix_par(&raw).ok_or_else(|| {
                        WorkerError::Analyze("video stream missing width/height".into())
                    })?;
                    let (duration, frame_rate, frames) = fix_frames(&raw).unwrap_or((
                        raw.duration.unwrap_or(0.0),
                        raw.frame_rate.unwrap_or(0.0),
                        0,
                    ));
                    videos.push(VideoStreamMeta {
                        width: raw.width.unwrap_or(0),
                        height: raw.height.unwrap_or(0),
                        dar,
                        par,
                        frame_rate,
                        frames,
                        bitrate: raw.bitrate.unwrap_or(0),
                        duration,
                        scenes: Vec::new(),
                    });
                }
                "audio" => {
                    let mut raw = raw_audio_fields(
                        s,
                        if parse_f64(&s.duration).is_none() {
                            fmt_duration
                        } else {
                            None
                        },
                    );
                    if raw.bitrate.unwrap_or(0) == 0 {
                        raw.bitrate = s
                            .tags
                            .as_ref()
                            .and_then(|t| t.get("variant_bitrate"))
                            .and_then(|v| v.parse::<f64>().ok())
                            .map(|v| (v / HLS_BANDWIDTH_OVERHEAD) as u64);
                    }
                    let (duration, sampling_rate, samples) = fix_samples(&raw).unwrap_or((
                        raw.duration.unwrap_or(0.0),
                        raw.sampling_rate.unwrap_or(0),
                        0,
                    ));
                    audios.push(AudioStreamMeta {
                        channels: raw.channels.unwrap_or(0),
                        sampling_rate,
                        samples,
                        bitrate: raw.bitrate.unwrap_or(0),
                        duration,
                        scenes: Vec::new(),
                    });
                }
                _ => {}
            }
        }

        Ok(Metadata {
            uri: uri.to_string(),
            videos,
            audios,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_stream(
        duration: Option<&str>,
        r_frame_rate: Option<&str>,
        nb_frames: Option<&str>,
        bit_rate: Option<&str>,
    ) -> ProbeStream {
        ProbeStream {
            codec_type: "video".to_string(),
            codec_name: "h264".to_string(),
            width: Some(1920),
            height: Some(1080),
            channels: None,
            sample_rate: None,
            display_aspect_ratio: Some("16:9".to_string()),
            sample_aspect_ratio: None,
            r_frame_rate: r_frame_rate.map(String::from),
            nb_frames: nb_frames.map(String::from),
            duration: duration.map(String::from),
            bit_rate: bit_rate.map(String::from),
            tags: None,
        }
    }

    fn audio_stream(
        duration: Option<&str>,
        sample_rate: Option<&str>,
        bit_rate: Option<&str>,
    ) -> ProbeStream {
        ProbeStream {
            codec_type: "audio".to_string(),
            codec_name: "aac".to_string(),
            width: None,
            height: None,
            channels: Some(2),
            sample_rate: sample_rate.map(String::from),
            display_aspect_ratio: None,
            sample_aspect_ratio: None,
            r_frame_rate: None,
            nb_frames: None,
            duration: duration.map(String::from),
            bit_rate: bit_rate.map(String::from),
            tags: None,
        }
    }

    #[test]
    fn build_video_meta_reconstructs_frames_from_rate_and_duration() {
        let stream = video_stream(Some("10.0"), Some("30/1"), None, Some("5000000"));
        let meta = build_video_meta(&stream, None).unwrap();
        assert_eq!(meta.frames, 300);
        assert_eq!(meta.frame_rate, 30.0);
        assert_eq!(meta.bitrate, 5_000_000);
    }

    #[test]
    fn build_video_meta_rejects_stream_missing_dimensions() {
        let mut stream = video_stream(Some("10.0"), Some("30/1"), None, None);
        stream.width = None;
        assert!(build_video_meta(&stream, None).is_err());
    }

    #[test]
    fn build_audio_meta_prefers_sampling_rate_over_reported_samples() {
        let stream = audio_stream(Some("10.0"), Some("48000"), None);
        let mut raw = raw_audio_fields(&stream, None);
        raw.samples = Some(1); // deliberately inconsistent with duration * rate
        let (_, sampling_rate, samples) =
            fix_samples(&raw).expect("duration + sampling_rate present");
        assert_eq!(sampling_rate, 48000);
        assert_eq!(samples, 480_000);
        let meta = build_audio_meta(&stream, None);
        assert_eq!(meta.sampling_rate, 48000);
    }

    #[test]
    fn split_streams_separates_by_codec_type_and_ignores_others() {
        let probe = ProbeOutput {
            streams: vec![
                video_stream(Some("10.0"), Some("30/1"), None, None),
                audio_stream(Some("10.0"), Some("48000"), None),
                ProbeStream {
                    codec_type: "data".to_string(),
                    ..audio_stream(None, None, None)
                },
            ],
            format: ProbeFormat {
                duration: Some("10.0".to_string()),
                bit_rate: None,
            },
        };
        let (videos, audios) = split_streams(&probe);
        assert_eq!(videos.len(), 1);
        assert_eq!(audios.len(), 1);
    }

    #[test]
    fn raw_video_fields_falls_back_to_container_duration_when_stream_duration_missing() {
        let stream = video_stream(None, Some("25/1"), None, None);
        let raw = raw_video_fields(&stream, Some(42.0));
        assert_eq!(raw.duration, Some(42.0));
    }
}
