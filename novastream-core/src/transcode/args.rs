//! Builds the remuxer command line for a single pipeline run (spec.md §4.5).
//! Kept separate from `pipeline.rs` so the argument logic can be unit tested
//! without spawning a process, matching the teacher's split between
//! `ffmpeg_utils` (process plumbing) and `audio_plan`/`playlist::codec`
//! (pure decision logic).

use crate::probe::{is_compatible_audio_codec, looks_like_commentary, AudioStream, ProbeResult};
use crate::session::types::VideoFlags;

/// Everything the argument builder needs to know about one run.
pub struct RunSpec<'a> {
    pub input: &'a str,
    pub probe: &'a ProbeResult,
    pub transcoding_offset: f64,
    pub duration: f64,
    pub video_flags: VideoFlags,
    pub audio_track_index: i32,
    pub subtitle_track_indices: &'a [usize],
    pub force_aac: bool,
    pub segment_duration_secs: f64,
    pub output_seek_threshold_secs: f64,
    pub start_segment_number: i64,
}

/// Build the full `ffmpeg`-shaped argument vector for one transcode run.
/// Output always targets fMP4 `.m4s` segments plus one `.vtt` output per
/// subtitle track (spec.md §4.5).
pub fn build_args(spec: &RunSpec<'_>) -> Vec<String> {
    let mut args = Vec::new();
    let remaining = (spec.duration - spec.transcoding_offset).max(0.0);

    // --- Seeking (spec.md §4.5) ---
    let use_input_seek = spec.transcoding_offset >= spec.output_seek_threshold_secs;
    if use_input_seek {
        push(&mut args, ["-ss", &spec.transcoding_offset.to_string()]);
    }
    push(&mut args, ["-i", spec.input]);
    if !use_input_seek && spec.transcoding_offset > 0.0 {
        push(&mut args, ["-ss", &spec.transcoding_offset.to_string()]);
    }

    // --- Duration limit ---
    if spec.duration > 0.0 {
        push(&mut args, ["-t", &remaining.to_string()]);
    }

    // --- Video ---
    push(&mut args, ["-map", "0:v:0", "-c:v", "copy"]);
    apply_video_tagging(&mut args, spec.probe, spec.video_flags);

    // --- Audio ---
    apply_audio_args(&mut args, spec.probe, spec.audio_track_index, spec.force_aac);

    // --- HLS output ---
    push(
        &mut args,
        [
            "-hls_time",
            &format!("{}", spec.segment_duration_secs),
            "-hls_list_size",
            "0",
            "-hls_playlist_type",
            "event",
            "-hls_flags",
            "independent_segments+temp_file",
            "-hls_segment_type",
            "fmp4",
            "-hls_fmp4_init_filename",
            "init.mp4",
            "-max_muxing_queue_size",
            "1024",
            "-start_number",
            &spec.start_segment_number.to_string(),
        ],
    );
    args.push("-f".to_string());
    args.push("hls".to_string());
    args.push("stream.m3u8".to_string());

    // --- Subtitles: one extra -map/-c:s/-f output per text track ---
    for &idx in spec.subtitle_track_indices {
        args.push("-map".to_string());
        args.push(format!("0:s:{idx}"));
        args.push("-c:s".to_string());
        args.push("webvtt".to_string());
        args.push("-f".to_string());
        args.push("webvtt".to_string());
        args.push("-flush_packets".to_string());
        args.push("1".to_string());
        args.push(format!("subtitles_{idx}.vtt"));
    }

    args
}

fn push<'a, const N: usize>(args: &mut Vec<String>, items: [&'a str; N]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

fn apply_video_tagging(args: &mut Vec<String>, probe: &ProbeResult, flags: VideoFlags) {
    let is_hevc = probe.video_codec.as_deref() == Some("hevc");

    if flags.has_dv && !flags.dv_disabled {
        let tag = if flags.dv_profile == 5 || flags.dv_profile == 7 {
            "dvhe"
        } else {
            "dvh1"
        };
        push(args, ["-tag:v", tag]);
        push(args, ["-bsf:v", "hevc_metadata=colour_primaries=9:transfer_characteristics=16:matrix_coefficients=9"]);
        push(args, ["-strict", "-2"]);
        return;
    }

    if flags.has_hdr && !flags.hdr_metadata_disabled {
        if is_hevc {
            push(args, ["-tag:v", "hvc1"]);
        }
        push(args, ["-bsf:v", "hevc_metadata=colour_primaries=9:transfer_characteristics=16:matrix_coefficients=9"]);
        return;
    }

    if is_hevc {
        push(args, ["-tag:v", "hvc1"]);
    }
}

fn apply_audio_args(args: &mut Vec<String>, probe: &ProbeResult, requested_index: i32, force_aac: bool) {
    let chosen = select_audio_stream(probe, requested_index);

    let Some(stream) = chosen else {
        return;
    };

    args.push("-map".to_string());
    args.push(format!("0:a:{}", audio_position(probe, stream.index)));

    let needs_transcode = force_aac || !is_compatible_audio_codec(&stream.codec);
    if needs_transcode {
        push(
            args,
            [
                "-c:a",
                "aac",
                "-ac",
                "6",
                "-b:a",
                "192k",
                "-af",
                "aresample=async=1000",
            ],
        );
    } else {
        push(args, ["-c:a", "copy"]);
    }
}

/// Select which audio stream to transcode (spec.md §4.5): an explicit
/// non-negative index wins outright; auto-selection skips commentary tracks
/// unless no other compatible track exists.
fn select_audio_stream(probe: &ProbeResult, requested_index: i32) -> Option<&AudioStream> {
    if requested_index >= 0 {
        return probe
            .audio_streams
            .iter()
            .find(|s| s.index == requested_index as usize);
    }

    let non_commentary = probe.audio_streams.iter().find(|s| {
        is_compatible_audio_codec(&s.codec) && !s.title.as_deref().is_some_and(looks_like_commentary)
    });
    non_commentary
        .or_else(|| probe.audio_streams.iter().find(|s| !s.title.as_deref().is_some_and(looks_like_commentary)))
        .or_else(|| probe.audio_streams.first())
}

fn audio_position(probe: &ProbeResult, stream_index: usize) -> usize {
    probe
        .audio_streams
        .iter()
        .position(|s| s.index == stream_index)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::SubtitleStream;

    fn sample_probe() -> ProbeResult {
        ProbeResult {
            duration_secs: 3600.0,
            video_codec: Some("hevc".to_string()),
            color_transfer: Some("smpte2084".to_string()),
            audio_streams: vec![
                AudioStream {
                    index: 0,
                    codec: "truehd".to_string(),
                    language: Some("eng".to_string()),
                    title: Some("Director's Commentary".to_string()),
                    is_default: true,
                    is_forced: false,
                    channels: Some(8),
                },
                AudioStream {
                    index: 1,
                    codec: "ac3".to_string(),
                    language: Some("eng".to_string()),
                    title: None,
                    is_default: false,
                    is_forced: false,
                    channels: Some(6),
                },
            ],
            subtitle_streams: vec![SubtitleStream {
                index: 2,
                codec: "subrip".to_string(),
                language: Some("eng".to_string()),
                title: None,
                is_default: true,
                is_forced: false,
            }],
            has_incompatible_audio: true,
            has_compatible_audio: true,
        }
    }

    #[test]
    fn auto_selects_non_commentary_compatible_track_over_commentary_first_track() {
        let probe = sample_probe();
        let chosen = select_audio_stream(&probe, -1).unwrap();
        assert_eq!(chosen.index, 1);
    }

    #[test]
    fn explicit_index_overrides_commentary_skip() {
        let probe = sample_probe();
        let chosen = select_audio_stream(&probe, 0).unwrap();
        assert_eq!(chosen.index, 0);
    }

    #[test]
    fn dv_tagging_uses_dvhe_for_profile_five() {
        let probe = sample_probe();
        let spec = RunSpec {
            input: "http://x/movie.mkv",
            probe: &probe,
            transcoding_offset: 0.0,
            duration: 3600.0,
            video_flags: VideoFlags {
                has_dv: true,
                dv_profile: 5,
                dv_disabled: false,
                has_hdr: false,
                hdr_metadata_disabled: false,
            },
            audio_track_index: -1,
            subtitle_track_indices: &[2],
            force_aac: false,
            segment_duration_secs: 2.0,
            output_seek_threshold_secs: 30.0,
            start_segment_number: 0,
        };
        let args = build_args(&spec);
        let tag_pos = args.iter().position(|a| a == "-tag:v").unwrap();
        assert_eq!(args[tag_pos + 1], "dvhe");
    }

    #[test]
    fn small_offset_uses_output_seek_after_input() {
        let probe = sample_probe();
        let spec = RunSpec {
            input: "http://x/movie.mkv",
            probe: &probe,
            transcoding_offset: 10.0,
            duration: 3600.0,
            video_flags: VideoFlags::default(),
            audio_track_index: -1,
            subtitle_track_indices: &[],
            force_aac: false,
            segment_duration_secs: 2.0,
            output_seek_threshold_secs: 30.0,
            start_segment_number: 0,
        };
        let args = build_args(&spec);
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        // -ss after -i: the first `-ss` occurrence should follow `-i`.
        let ss_pos = args.iter().position(|a| a == "-ss").unwrap();
        assert!(ss_pos > input_pos);
    }

    #[test]
    fn large_offset_uses_input_seek_before_input() {
        let probe = sample_probe();
        let spec = RunSpec {
            input: "http://x/movie.mkv",
            probe: &probe,
            transcoding_offset: 600.0,
            duration: 3600.0,
            video_flags: VideoFlags::default(),
            audio_track_index: -1,
            subtitle_track_indices: &[],
            force_aac: false,
            segment_duration_secs: 2.0,
            output_seek_threshold_secs: 30.0,
            start_segment_number: 0,
        };
        let args = build_args(&spec);
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        let ss_pos = args.iter().position(|a| a == "-ss").unwrap();
        assert!(ss_pos < input_pos);
    }

    #[test]
    fn subtitle_outputs_are_appended_per_track() {
        let probe = sample_probe();
        let spec = RunSpec {
            input: "http://x/movie.mkv",
            probe: &probe,
            transcoding_offset: 0.0,
            duration: 3600.0,
            video_flags: VideoFlags::default(),
            audio_track_index: -1,
            subtitle_track_indices: &[2],
            force_aac: false,
            segment_duration_secs: 2.0,
            output_seek_threshold_secs: 30.0,
            start_segment_number: 0,
        };
        let args = build_args(&spec);
        assert!(args.iter().any(|a| a == "subtitles_2.vtt"));
    }
}
