//! Preset catalog and profile selection.
//!
//! Grounded exactly on the original implementation's
//! `transcoding/profiles.py` (`VideoCondition::is_valid`,
//! `AudioCondition::is_valid`, `Preset::select_profile`): iterate profiles in
//! declaration order, first match wins, independently for video and audio.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};
use crate::metadata::{AudioStreamMeta, VideoStreamMeta};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoTrack {
    pub id: String,
    pub codec: String,
    pub crf: u32,
    pub preset: String,
    pub max_rate: u64,
    pub buf_size: u64,
    pub profile: String,
    pub pix_fmt: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub gop_size: u32,
    pub force_key_frames: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioTrack {
    pub id: String,
    pub codec: String,
    pub bitrate: u64,
    pub channels: u32,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct VideoCondition {
    #[serde(default)]
    pub min_width: u32,
    #[serde(default)]
    pub min_height: u32,
    #[serde(default)]
    pub min_bitrate: u64,
    #[serde(default)]
    pub min_frame_rate: f64,
    #[serde(default)]
    pub min_dar: f64,
    #[serde(default)]
    pub max_dar: f64,
}

impl VideoCondition {
    pub fn is_valid(&self, meta: &VideoStreamMeta) -> bool {
        meta.width >= self.min_width
            && meta.height >= self.min_height
            && meta.bitrate >= self.min_bitrate
            && meta.frame_rate >= self.min_frame_rate
            && (self.min_dar == 0.0 || meta.dar >= self.min_dar)
            && (self.max_dar == 0.0 || meta.dar <= self.max_dar)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AudioCondition {
    #[serde(default)]
    pub min_sample_rate: u32,
    #[serde(default)]
    pub min_bitrate: u64,
}

impl AudioCondition {
    pub fn is_valid(&self, meta: &AudioStreamMeta) -> bool {
        meta.bitrate >= self.min_bitrate && meta.sampling_rate >= self.min_sample_rate
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoProfile {
    pub condition: VideoCondition,
    pub segment_duration: f64,
    /// Track ids (into the preset's registry) this profile emits.
    pub video: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioProfile {
    pub condition: AudioCondition,
    pub audio: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Container {
    pub segment_duration: Option<f64>,
}

/// A selected, materialized Profile: concrete track specs plus container options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub video: Vec<VideoTrack>,
    pub audio: Vec<AudioTrack>,
    pub container: Container,
}

/// The full catalog of candidate outputs a source may be matched against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preset {
    pub video_profiles: Vec<VideoProfile>,
    pub audio_profiles: Vec<AudioProfile>,
    pub video: Vec<VideoTrack>,
    pub audio: Vec<AudioTrack>,
}

impl Preset {
    /// First-match-wins selection, independently for video and audio, then
    /// materialize concrete track specs by id lookup. Tie-break is purely
    /// declaration order -- no scoring.
    pub fn select_profile(
        &self,
        video: &VideoStreamMeta,
        audio: &AudioStreamMeta,
    ) -> Result<Profile> {
        let video_profile = self
            .video_profiles
            .iter()
            .find(|vp| vp.condition.is_valid(video))
            .ok_or_else(|| WorkerError::Profile("no compatible video profiles".into()))?;

        let audio_profile = self
            .audio_profiles
            .iter()
            .find(|ap| ap.condition.is_valid(audio))
            .ok_or_else(|| WorkerError::Profile("no compatible audio profiles".into()))?;

        let video_tracks = self
            .video
            .iter()
            .filter(|t| video_profile.video.contains(&t.id))
            .cloned()
            .collect();
        let audio_tracks = self
            .audio
            .iter()
            .filter(|t| audio_profile.audio.contains(&t.id))
            .cloned()
            .collect();

        Ok(Profile {
            video: video_tracks,
            audio: audio_tracks,
            container: Container {
                segment_duration: Some(video_profile.segment_duration),
            },
        })
    }
}

/// Built-in fallback preset used when no catalog entry is supplied: four
/// video renditions (1080/720/480/360) on a descending CRF/maxrate ladder,
/// one stereo AAC audio rendition. Mirrors the original's `DEFAULT_PRESET`
/// fallback in `tasks.py::init_preset`.
pub fn default_preset() -> Preset {
    let ladder = [
        ("1080p", 1920u32, 1080u32, 23u32, 5_000_000u64, 10_000_000u64),
        ("720p", 1280, 720, 23, 3_000_000, 6_000_000),
        ("480p", 854, 480, 25, 1_500_000, 3_000_000),
        ("360p", 640, 360, 28, 800_000, 1_600_000),
    ];

    let video_tracks: Vec<VideoTrack> = ladder
        .iter()
        .map(|(id, w, h, crf, max_rate, buf_size)| VideoTrack {
            id: (*id).to_string(),
            codec: "libx264".to_string(),
            crf: *crf,
            preset: "slow".to_string(),
            max_rate: *max_rate,
            buf_size: *buf_size,
            profile: "high".to_string(),
            pix_fmt: "yuv420p".to_string(),
            width: *w,
            height: *h,
            frame_rate: 0.0, // 0 = preserve source frame rate
            gop_size: 0,     // computed at transcode time from segment duration
            force_key_frames: "expr:gte(t,n_forced*4)".to_string(),
        })
        .collect();

    let video_profiles = vec![
        VideoProfile {
            condition: VideoCondition {
                min_width: 1280,
                min_height: 720,
                ..Default::default()
            },
            segment_duration: 4.0,
            video: vec![
                "1080p".into(),
                "720p".into(),
                "480p".into(),
                "360p".into(),
            ],
        },
        VideoProfile {
            condition: VideoCondition {
                min_width: 854,
                min_height: 480,
                ..Default::default()
            },
            segment_duration: 4.0,
            video: vec!["480p".into(), "360p".into()],
        },
        VideoProfile {
            condition: VideoCondition {
                min_width: 640,
                min_height: 360,
                ..Default::default()
            },
            segment_duration: 4.0,
            video: vec!["360p".into()],
        },
    ];

    let audio_tracks = vec![AudioTrack {
        id: "stereo".into(),
        codec: "aac".into(),
        bitrate: 192_000,
        channels: 2,
        sample_rate: 48_000,
    }];

    let audio_profiles = vec![AudioProfile {
        condition: AudioCondition::default(),
        audio: vec!["stereo".into()],
    }];

    Preset {
        video_profiles,
        audio_profiles,
        video: video_tracks,
        audio: audio_tracks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_video(width: u32, height: u32) -> VideoStreamMeta {
        VideoStreamMeta {
            width,
            height,
            dar: width as f64 / height as f64,
            par: 1.0,
            frame_rate: 30.0,
            frames: 360,
            bitrate: 5_000_000,
            duration: 12.0,
            scenes: vec![],
        }
    }

    fn sample_audio() -> AudioStreamMeta {
        AudioStreamMeta {
            channels: 2,
            sampling_rate: 48_000,
            samples: 576_000,
            bitrate: 192_000,
            duration: 12.0,
            scenes: vec![],
        }
    }

    #[test]
    fn first_match_wins_for_1080p_source() {
        let preset = default_preset();
        let profile = preset
            .select_profile(&sample_video(1920, 1080), &sample_audio())
            .unwrap();
        assert_eq!(profile.video.len(), 4);
        assert_eq!(profile.audio.len(), 1);
    }

    #[test]
    fn small_source_falls_through_to_fewer_renditions() {
        let preset = default_preset();
        let profile = preset
            .select_profile(&sample_video(640, 360), &sample_audio())
            .unwrap();
        assert_eq!(profile.video.len(), 1);
        assert_eq!(profile.video[0].id, "360p");
    }

    #[test]
    fn below_every_condition_is_a_profile_error() {
        let preset = default_preset();
        let err = preset
            .select_profile(&sample_video(320, 240), &sample_audio())
            .unwrap_err();
        assert!(matches!(err, WorkerError::Profile(_)));
    }
}
