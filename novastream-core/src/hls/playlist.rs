//! Live-to-VOD playlist rewriting (spec.md §4.7). Pure string transform so
//! it can be tested without touching the filesystem — grounded in the
//! teacher's style of keeping playlist logic (`hls-vod-lib/src/playlist/`)
//! separate from the HTTP handlers that serve it.

const VIDEO_RANGE_TAG: &str = "#EXT-X-VIDEO-RANGE:PQ";
const START_OFFSET_TAG: &str = "#EXT-X-START:TIME-OFFSET=0,PRECISE=YES";
const ENDLIST_TAG: &str = "#EXT-X-ENDLIST";

/// Everything the rewriter needs to know about the session whose playlist
/// it's rewriting.
pub struct PlaylistContext<'a> {
    pub has_dv: bool,
    pub has_hdr: bool,
    pub start_offset: f64,
    pub duration: f64,
    pub segment_duration_secs: f64,
    pub highest_existing_segment: i64,
    /// Caller's auth token, appended as `?token=...` to every rewritten
    /// filename reference. Empty means "no token required".
    pub token: &'a str,
}

/// Rewrite a raw `stream.m3u8` for a client (spec.md §4.7). Idempotent: if
/// `raw` has already been rewritten with the same token, running it again
/// through this function returns an identical string (spec.md §8).
pub fn rewrite_playlist(raw: &str, ctx: &PlaylistContext<'_>) -> String {
    let mut lines: Vec<String> = raw.lines().map(str::to_string).collect();

    let needs_video_range =
        (ctx.has_dv || ctx.has_hdr) && !lines.iter().any(|l| l == VIDEO_RANGE_TAG);
    let needs_start_offset =
        ctx.start_offset == 0.0 && !lines.iter().any(|l| l == START_OFFSET_TAG);

    if needs_video_range || needs_start_offset {
        let insert_at = lines
            .iter()
            .position(|l| l == "#EXTM3U")
            .map(|i| i + 1)
            .unwrap_or(0);
        let mut to_insert = Vec::new();
        if needs_video_range {
            to_insert.push(VIDEO_RANGE_TAG.to_string());
        }
        if needs_start_offset {
            to_insert.push(START_OFFSET_TAG.to_string());
        }
        for (offset, line) in to_insert.into_iter().enumerate() {
            lines.insert(insert_at + offset, line);
        }
    }

    let already_ended = lines.iter().any(|l| l == ENDLIST_TAG);
    if ctx.duration > 0.0 && !already_ended {
        for line in lines.iter_mut() {
            if line == "#EXT-X-PLAYLIST-TYPE:EVENT" {
                *line = "#EXT-X-PLAYLIST-TYPE:VOD".to_string();
            }
        }
        append_synthetic_segments(&mut lines, ctx);
        lines.push(ENDLIST_TAG.to_string());
    }

    rewrite_filenames(&mut lines, ctx.token);

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn append_synthetic_segments(lines: &mut Vec<String>, ctx: &PlaylistContext<'_>) {
    let remaining = (ctx.duration - ctx.start_offset).max(0.0);
    if ctx.segment_duration_secs <= 0.0 {
        return;
    }
    let mut total_expected = (remaining / ctx.segment_duration_secs).ceil() as i64;
    if total_expected > 0 {
        let last_dur = remaining - (total_expected - 1) as f64 * ctx.segment_duration_secs;
        if last_dur < 0.1 {
            total_expected -= 1;
        }
    }

    let start = ctx.highest_existing_segment + 1;
    for i in start..total_expected {
        let dur = if i == total_expected - 1 {
            remaining - i as f64 * ctx.segment_duration_secs
        } else {
            ctx.segment_duration_secs
        };
        lines.push(format!("#EXTINF:{dur:.6},"));
        lines.push(format!("segment{i}.m4s"));
    }
}

/// Matches a segment/init/subtitle filename, with an optional existing query
/// string, wherever it appears — as a bare URI line or inside an attribute
/// like `#EXT-X-MAP:URI="init.mp4"`.
fn filename_pattern() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r#"(segment\d+\.m4s|init\.mp4|subtitles_\d+\.vtt)(\?[^\s"]*)?"#).unwrap()
    })
}

fn rewrite_filenames(lines: &mut [String], token: &str) {
    if token.is_empty() {
        return;
    }
    for line in lines.iter_mut() {
        let rewritten = filename_pattern()
            .replace_all(line, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                match caps.get(2) {
                    Some(q) if q.as_str().contains("token=") => format!("{name}{}", q.as_str()),
                    Some(q) => format!("{name}{}&token={token}", q.as_str()),
                    None => format!("{name}?token={token}"),
                }
            })
            .into_owned();
        *line = rewritten;
    }
}
