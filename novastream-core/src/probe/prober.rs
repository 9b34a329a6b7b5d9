//! Shells out to the configured prober binary to extract the metadata
//! `ProbeCache` stores (spec.md §4.2).
//!
//! Grounded in `other_examples/.../borisgk-sratim__src-streaming-process.rs`'s
//! `FFProbeFrame`/`FFProbeFrameOutput` deserialize pattern: a private raw
//! struct shaped like `ffprobe -of json` output, reduced into the crate's own
//! public type rather than exposed directly.

use super::{AudioStream, ProbeResult, SubtitleStream};
use crate::config::ProbeConfig;
use crate::error::{NovaError, Result};
use crate::remuxer::Remuxer;
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;

pub struct Prober {
    remuxer: Arc<dyn Remuxer>,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(remuxer: Arc<dyn Remuxer>, config: ProbeConfig) -> Self {
        Self { remuxer, config }
    }

    /// Probe `input` (a URL or `-` for stdin) for stream metadata (spec.md
    /// §4.2). `stdin_data` carries the ranged-pipe prefix when the source
    /// adapter chose `InputForm::RangedPipe`.
    pub async fn probe(&self, input: &str, stdin_data: Option<Bytes>) -> Result<ProbeResult> {
        let args = self.build_args(input, stdin_data.is_some());
        let stdout = self.remuxer.probe(&args, stdin_data).await?;
        let raw: RawProbe = serde_json::from_str(&stdout)
            .map_err(|e| NovaError::ProbeFailed(format!("malformed probe JSON: {e}")))?;
        Ok(reduce(raw))
    }

    fn build_args(&self, input: &str, stdin: bool) -> Vec<String> {
        let mut args = vec![
            "-show_format".to_string(),
            "-show_streams".to_string(),
            "-of".to_string(),
            "json".to_string(),
            "-probesize".to_string(),
            self.config.probesize_bytes.to_string(),
            "-analyzeduration".to_string(),
            self.config.analyzeduration_micros.to_string(),
        ];
        if stdin {
            args.push("-i".to_string());
            args.push("pipe:0".to_string());
        } else {
            args.push("-i".to_string());
            args.push(input.to_string());
        }
        args
    }
}

#[derive(Debug, Deserialize)]
struct RawProbe {
    #[serde(default)]
    format: Option<RawFormat>,
    #[serde(default)]
    streams: Vec<RawStream>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
    index: usize,
    codec_type: String,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    channels: Option<u32>,
    #[serde(default)]
    tags: Option<RawTags>,
    #[serde(default)]
    disposition: Option<RawDisposition>,
    #[serde(default)]
    color_transfer: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawTags {
    #[serde(default, alias = "LANGUAGE")]
    language: Option<String>,
    #[serde(default, alias = "TITLE")]
    title: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDisposition {
    #[serde(default)]
    default: Option<u32>,
    #[serde(default)]
    forced: Option<u32>,
}

fn reduce(raw: RawProbe) -> ProbeResult {
    let duration_secs = raw
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let mut video_codec = None;
    let mut color_transfer = None;
    let mut audio_streams = Vec::new();
    let mut subtitle_streams = Vec::new();
    let mut has_incompatible_audio = false;
    let mut has_compatible_audio = false;

    for stream in raw.streams {
        match stream.codec_type.as_str() {
            "video" if video_codec.is_none() => {
                video_codec = stream.codec_name.clone();
                color_transfer = stream.color_transfer.clone();
            }
            "audio" => {
                let codec = stream.codec_name.clone().unwrap_or_default();
                if super::is_incompatible_audio_codec(&codec) {
                    has_incompatible_audio = true;
                } else if super::is_compatible_audio_codec(&codec) {
                    has_compatible_audio = true;
                }
                let tags = stream.tags.unwrap_or_default();
                let disposition = stream.disposition.unwrap_or_default();
                audio_streams.push(AudioStream {
                    index: stream.index,
                    codec,
                    language: tags.language,
                    title: tags.title,
                    is_default: disposition.default.unwrap_or(0) != 0,
                    is_forced: disposition.forced.unwrap_or(0) != 0,
                    channels: stream.channels,
                });
            }
            "subtitle" => {
                let codec = stream.codec_name.clone().unwrap_or_default();
                if super::is_text_subtitle_codec(&codec) {
                    let tags = stream.tags.unwrap_or_default();
                    let disposition = stream.disposition.unwrap_or_default();
                    subtitle_streams.push(SubtitleStream {
                        index: stream.index,
                        codec,
                        language: tags.language,
                        title: tags.title,
                        is_default: disposition.default.unwrap_or(0) != 0,
                        is_forced: disposition.forced.unwrap_or(0) != 0,
                    });
                }
            }
            _ => {}
        }
    }

    ProbeResult {
        duration_secs,
        video_codec,
        color_transfer,
        audio_streams,
        subtitle_streams,
        has_incompatible_audio,
        has_compatible_audio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remuxer::RemuxChild;
    use async_trait::async_trait;
    use std::path::Path;

    struct FakeRemuxer {
        stdout: String,
    }

    #[async_trait]
    impl Remuxer for FakeRemuxer {
        async fn probe(&self, _args: &[String], _stdin_data: Option<Bytes>) -> Result<String> {
            Ok(self.stdout.clone())
        }
        fn run(&self, _args: &[String], _cwd: &Path, _pipe_stdin: bool) -> Result<RemuxChild> {
            unreachable!("not used in these tests")
        }
    }

    const SAMPLE_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "hevc", "color_transfer": "smpte2084"},
            {"index": 1, "codec_type": "audio", "codec_name": "truehd", "channels": 8,
             "tags": {"language": "eng", "title": "Director's Commentary"},
             "disposition": {"default": 1, "forced": 0}},
            {"index": 2, "codec_type": "audio", "codec_name": "aac", "channels": 2,
             "tags": {"language": "eng"}, "disposition": {"default": 0, "forced": 0}},
            {"index": 3, "codec_type": "subtitle", "codec_name": "subrip",
             "tags": {"language": "eng"}, "disposition": {"default": 1, "forced": 0}},
            {"index": 4, "codec_type": "subtitle", "codec_name": "hdmv_pgs_subtitle"}
        ],
        "format": {"duration": "5400.5"}
    }"#;

    #[tokio::test]
    async fn probe_reduces_raw_json_into_probe_result() {
        let prober = Prober::new(
            Arc::new(FakeRemuxer {
                stdout: SAMPLE_JSON.to_string(),
            }),
            ProbeConfig::default(),
        );
        let result = prober.probe("http://example.com/movie.mkv", None).await.unwrap();

        assert_eq!(result.duration_secs, 5400.5);
        assert_eq!(result.video_codec.as_deref(), Some("hevc"));
        assert_eq!(result.color_transfer.as_deref(), Some("smpte2084"));
        assert!(result.has_incompatible_audio);
        assert!(result.has_compatible_audio);
        assert_eq!(result.audio_streams.len(), 2);
        // Only the text-based subtitle stream survives the whitelist.
        assert_eq!(result.subtitle_streams.len(), 1);
        assert_eq!(result.subtitle_streams[0].codec, "subrip");
    }

    #[tokio::test]
    async fn probe_rejects_malformed_json() {
        let prober = Prober::new(
            Arc::new(FakeRemuxer {
                stdout: "not json".to_string(),
            }),
            ProbeConfig::default(),
        );
        let err = prober.probe("http://example.com/x.mkv", None).await.unwrap_err();
        assert!(matches!(err, NovaError::ProbeFailed(_)));
    }
}
