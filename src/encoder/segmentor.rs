use tokio::process::Command;

use crate::metadata::Metadata;
use crate::profile::{AudioTrack, VideoTrack};

/// One variant's location within the concat-listed intermediate output,
/// keyed by the `VideoTrack::id` it corresponds to.
pub struct VariantInput {
    pub track: VideoTrack,
    pub concat_list_path: String,
}

/// Muxes the per-chunk concat lists plus the audio playlist into the final
/// HLS rendition set: one `.ts` segment sequence and master playlist per
/// variant, all renditions sharing a single audio input linked by
/// `var_stream_map` to one audio group. Grounded on
/// `media/ffmpeg/mod.rs`'s `FFmpegCommandBuilder` and the original's
/// `transcoding/outputs.py::HLSOutput`/`SegmentOutput` (`var_stream_map`,
/// `hls_segment_filename`, `master_pl_name` field names).
pub struct Segmentor {
    variants: Vec<VariantInput>,
    audio: AudioTrack,
    audio_playlist_path: String,
    segment_duration: f64,
    output_dir: String,
    master_playlist_name: String,
    /// Pre-segmentation merged metadata, carried through for parity with the
    /// original's `HLSSegmentor(src, dst, profile=profile, meta=meta)` call
    /// shape. The segmentor itself doesn't need any of its fields to build
    /// the ffmpeg invocation -- the authoritative final Metadata comes from
    /// probing the published master playlist afterward.
    merged: Metadata,
}

impl Segmentor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        variants: Vec<VariantInput>,
        audio: AudioTrack,
        audio_playlist_path: impl Into<String>,
        segment_duration: f64,
        output_dir: impl Into<String>,
        master_playlist_name: impl Into<String>,
        merged: Metadata,
    ) -> Self {
        Self {
            variants,
            audio,
            audio_playlist_path: audio_playlist_path.into(),
            segment_duration,
            output_dir: output_dir.into(),
            master_playlist_name: master_playlist_name.into(),
            merged,
        }
    }

    pub fn merged_metadata(&self) -> &Metadata {
        &self.merged
    }

    /// One `v:` entry per video variant, naming the shared audio group but
    /// not embedding a per-variant audio index, plus a single trailing `a:0`
    /// entry for the one shared audio input: `v:0,agroup:audio,name:1080p
    /// v:1,agroup:audio,name:720p a:0,agroup:audio,name:stereo`.
    fn var_stream_map(&self) -> String {
        let mut entries: Vec<String> = self
            .variants
            .iter()
            .enumerate()
            .map(|(idx, v)| format!("v:{idx},agroup:audio,name:{}", v.track.id))
            .collect();
        entries.push(format!("a:0,agroup:audio,name:{}", self.audio.id));
        entries.join(" ")
    }

    pub fn build(&self) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-y"]);

        for variant in &self.variants {
            cmd.args(["-f", "concat", "-safe", "0", "-i", &variant.concat_list_path]);
        }
        cmd.args(["-i", &self.audio_playlist_path]);

        for idx in 0..self.variants.len() {
            cmd.args(["-map", &format!("{idx}:v:0")]);
            cmd.args([&format!("-c:v:{idx}"), "copy"]);
        }
        let audio_input_idx = self.variants.len();
        cmd.args(["-map", &format!("{audio_input_idx}:a:0")]);
        cmd.args(["-c:a:0", "copy"]);

        cmd.args([
            "-var_stream_map",
            &self.var_stream_map(),
            "-master_pl_name",
            &self.master_playlist_name,
            "-hls_playlist_type",
            "vod",
            "-hls_flags",
            "independent_segments",
            "-hls_segment_filename",
            &format!("{}/%v/seg-%05d.ts", self.output_dir),
            "-hls_time",
            &self.segment_duration.to_string(),
            "-hls_audio_group",
            "audio",
            "-hls_audio_rendition_name",
            &self.audio.id,
            "-f",
            "hls",
            &format!("{}/%v/index.m3u8", self.output_dir),
        ]);

        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track(id: &str) -> VideoTrack {
        VideoTrack {
            id: id.to_string(),
            codec: "libx264".into(),
            crf: 23,
            preset: "slow".into(),
            max_rate: 5_000_000,
            buf_size: 10_000_000,
            profile: "high".into(),
            pix_fmt: "yuv420p".into(),
            width: 1920,
            height: 1080,
            frame_rate: 0.0,
            gop_size: 0,
            force_key_frames: String::new(),
        }
    }

    fn sample_audio() -> AudioTrack {
        AudioTrack {
            id: "stereo".into(),
            codec: "aac".into(),
            bitrate: 192_000,
            channels: 2,
            sample_rate: 48_000,
        }
    }

    fn sample_segmentor(variants: Vec<VariantInput>) -> Segmentor {
        Segmentor::new(
            variants,
            sample_audio(),
            "audio.m3u8".into(),
            4.0,
            "out".into(),
            "master.m3u8".into(),
            Metadata::default(),
        )
    }

    #[test]
    fn var_stream_map_has_one_v_entry_per_variant_and_a_single_shared_a_entry() {
        let segmentor = sample_segmentor(vec![
            VariantInput {
                track: sample_track("1080p"),
                concat_list_path: "1080p.ffconcat".into(),
            },
            VariantInput {
                track: sample_track("720p"),
                concat_list_path: "720p.ffconcat".into(),
            },
        ]);
        assert_eq!(
            segmentor.var_stream_map(),
            "v:0,agroup:audio,name:1080p v:1,agroup:audio,name:720p a:0,agroup:audio,name:stereo"
        );
    }

    #[test]
    fn build_maps_a_single_shared_audio_input_regardless_of_variant_count() {
        let segmentor = sample_segmentor(vec![
            VariantInput {
                track: sample_track("1080p"),
                concat_list_path: "1080p.ffconcat".into(),
            },
            VariantInput {
                track: sample_track("720p"),
                concat_list_path: "720p.ffconcat".into(),
            },
            VariantInput {
                track: sample_track("480p"),
                concat_list_path: "480p.ffconcat".into(),
            },
        ]);
        let cmd = segmentor.build();
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let input_count = args.iter().filter(|a| a.as_str() == "-i").count();
        assert_eq!(input_count, 4, "3 concat inputs + 1 shared audio input");

        let map_args: Vec<&String> = args
            .iter()
            .zip(args.iter().skip(1))
            .filter(|(flag, _)| flag.as_str() == "-map")
            .map(|(_, v)| v)
            .collect();
        assert_eq!(map_args, vec!["0:v:0", "1:v:0", "2:v:0", "3:a:0"]);
    }
}
