use tokio::process::Command;

/// Demuxes the source into a video-only and an audio-only playlist via
/// stream-copy. Frozen segment container is Matroska (see DESIGN.md open
/// question #2); `allowed_extensions` passed to later probes is therefore
/// always `mkv`.
pub struct Splitter {
    source: String,
    video_playlist: String,
    audio_playlist: String,
    chunk_duration: u64,
}

pub struct SplitResult {
    pub video_playlist_path: String,
    pub audio_playlist_path: String,
}

impl Splitter {
    pub fn new(
        source: impl Into<String>,
        video_playlist: impl Into<String>,
        audio_playlist: impl Into<String>,
        chunk_duration: u64,
    ) -> Self {
        Self {
            source: source.into(),
            video_playlist: video_playlist.into(),
            audio_playlist: audio_playlist.into(),
            chunk_duration,
        }
    }

    pub fn result(&self) -> SplitResult {
        SplitResult {
            video_playlist_path: self.video_playlist.clone(),
            audio_playlist_path: self.audio_playlist.clone(),
        }
    }

    /// Builds the ffmpeg invocation: two segment-muxer outputs, stream-copy,
    /// `copyts=true`/`avoid_negative_ts=disabled` to preserve cut points
    /// across negative timestamps.
    pub fn build(&self) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-y", "-i", &self.source]);

        let video_chunk_pattern = self.video_playlist.replace(".m3u8", "-%05d.mkv");
        cmd.args([
            "-map",
            "0:v:0",
            "-c",
            "copy",
            "-copyts",
            "-avoid_negative_ts",
            "disabled",
            "-f",
            "segment",
            "-segment_format",
            "matroska",
            "-segment_time",
            &self.chunk_duration.to_string(),
            "-segment_list",
            &self.video_playlist,
            "-segment_list_type",
            "m3u8",
            &video_chunk_pattern,
        ]);

        let audio_chunk_pattern = self.audio_playlist.replace(".m3u8", "-%05d.mkv");
        cmd.args([
            "-map",
            "0:a:0",
            "-c",
            "copy",
            "-copyts",
            "-avoid_negative_ts",
            "disabled",
            "-f",
            "segment",
            "-segment_format",
            "matroska",
            "-segment_time",
            &self.chunk_duration.to_string(),
            "-segment_list",
            &self.audio_playlist,
            "-segment_list_type",
            "m3u8",
            &audio_chunk_pattern,
        ]);

        cmd
    }
}

/// Parses an M3U8 media playlist into the ordered chunk list, per §4.5 step
/// 5: "the ordered list of non-comment lines is the chunk filename list".
/// Chunk order must never be re-sorted -- `m3u8_rs` preserves segment order
/// as written by the Splitter's `-segment_list_type m3u8` output.
pub fn enumerate_chunks(playlist_content: &str) -> Vec<String> {
    match m3u8_rs::parse_media_playlist_res(playlist_content.as_bytes()) {
        Ok(playlist) => playlist.segments.into_iter().map(|s| s.uri).collect(),
        Err(_) => playlist_content
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
            .map(|line| line.trim().to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_chunks_preserves_order_and_skips_comments() {
        let playlist = "#EXTM3U\n#EXT-X-VERSION:3\nchunk-00000.mkv\n#EXTINF:60,\nchunk-00001.mkv\nchunk-00002.mkv\n#EXT-X-ENDLIST\n";
        let chunks = enumerate_chunks(playlist);
        assert_eq!(
            chunks,
            vec!["chunk-00000.mkv", "chunk-00001.mkv", "chunk-00002.mkv"]
        );
    }
}
