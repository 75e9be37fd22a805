use tokio::process::Command;

use crate::profile::VideoTrack;

/// Produces one multi-rendition MPEG-TS segment from one source chunk.
/// Audio is not re-encoded here -- it is handled separately in the audio
/// split pipeline. Grounded on `media/ffmpeg/mod.rs`'s `FFmpegCommandBuilder`
/// and the original's `transcoding/codecs.py`/`outputs.py` field/flag names.
pub struct Transcoder {
    source_chunk: String,
    output: String,
    tracks: Vec<VideoTrack>,
    /// Splitter's frozen segment container, passed to ffmpeg's
    /// `allowed_extensions` so it can demux a non-standard extension.
    allowed_extensions: String,
}

impl Transcoder {
    pub fn new(
        source_chunk: impl Into<String>,
        output: impl Into<String>,
        tracks: Vec<VideoTrack>,
        allowed_extensions: impl Into<String>,
    ) -> Self {
        Self {
            source_chunk: source_chunk.into(),
            output: output.into(),
            tracks,
            allowed_extensions: allowed_extensions.into(),
        }
    }

    pub fn build(&self) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-hide_banner",
            "-y",
            "-allowed_extensions",
            &self.allowed_extensions,
            "-i",
            &self.source_chunk,
        ]);

        for (idx, track) in self.tracks.iter().enumerate() {
            cmd.args(["-map", "0:v:0"]);
            let prefix = format!("-c:v:{idx}");
            cmd.args([&prefix, &track.codec]);
            cmd.args([&format!("-crf:v:{idx}"), &track.crf.to_string()]);
            cmd.args([&format!("-preset:v:{idx}"), &track.preset]);
            cmd.args([&format!("-maxrate:v:{idx}"), &track.max_rate.to_string()]);
            cmd.args([&format!("-bufsize:v:{idx}"), &track.buf_size.to_string()]);
            cmd.args([&format!("-profile:v:{idx}"), &track.profile]);
            cmd.args([&format!("-pix_fmt:v:{idx}"), &track.pix_fmt]);
            cmd.args([
                &format!("-vf:{idx}"),
                &format!("scale={}:{}", track.width, track.height),
            ]);
            if track.frame_rate > 0.0 {
                cmd.args([&format!("-r:v:{idx}"), &track.frame_rate.to_string()]);
            }
            if track.gop_size > 0 {
                cmd.args([&format!("-g:v:{idx}"), &track.gop_size.to_string()]);
            }
            if !track.force_key_frames.is_empty() {
                cmd.args([&format!("-force_key_frames:{idx}"), &track.force_key_frames]);
            }
        }

        cmd.args([
            "-copyts",
            "-muxdelay",
            "0",
            "-avoid_negative_ts",
            "disabled",
            "-f",
            "mpegts",
            &self.output,
        ]);
        cmd
    }
}
