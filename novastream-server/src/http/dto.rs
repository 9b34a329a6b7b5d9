//! Wire types for the HTTP surface (spec.md §6).

use serde::{Deserialize, Serialize};

/// `profile{ID,Name,ClientIP}` (spec.md §6): carried through from the
/// caller for logging/telemetry. Not otherwise interpreted here — auth and
/// per-profile policy are the surrounding system's concern.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProfileInfo {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "ClientIP", default)]
    pub client_ip: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub path: String,
    #[serde(rename = "originalPath")]
    pub original_path: String,
    #[serde(rename = "startOffset", default)]
    pub start_offset: f64,
    #[serde(rename = "audioTrackIndex", default = "default_track_index")]
    pub audio_track_index: i32,
    #[serde(rename = "subtitleTrackIndex", default = "default_track_index")]
    pub subtitle_track_index: i32,
    #[serde(rename = "forceAAC", default)]
    pub force_aac: bool,
    #[serde(rename = "hasDV", default)]
    pub has_dv: bool,
    #[serde(rename = "dvProfile", default)]
    pub dv_profile: u8,
    #[serde(rename = "hasHDR", default)]
    pub has_hdr: bool,
    #[serde(default)]
    pub profile: ProfileInfo,
}

fn default_track_index() -> i32 {
    -1
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "playlistUrl")]
    pub playlist_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeepAliveQuery {
    pub time: Option<f64>,
    #[serde(rename = "bufferStart")]
    pub buffer_start: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeepAliveResponse {
    #[serde(rename = "startOffset")]
    pub start_offset: f64,
    #[serde(rename = "actualStartOffset")]
    pub actual_start_offset: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeekQuery {
    pub time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeekResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "startOffset")]
    pub start_offset: f64,
    #[serde(rename = "actualStartOffset")]
    pub actual_start_offset: f64,
    pub duration: f64,
    #[serde(rename = "playlistUrl")]
    pub playlist_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubtitleQuery {
    pub track: Option<usize>,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(rename = "fatalError", skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
    pub duration: f64,
    #[serde(rename = "segmentsCreated")]
    pub segments_created: u64,
    #[serde(rename = "maxSegmentRequested")]
    pub max_segment_requested: i64,
    pub paused: bool,
    #[serde(rename = "bitstreamErrors")]
    pub bitstream_errors: u32,
    #[serde(rename = "hdrMetadataDisabled")]
    pub hdr_metadata_disabled: bool,
    #[serde(rename = "dvDisabled")]
    pub dv_disabled: bool,
    #[serde(rename = "recoveryAttempts")]
    pub recovery_attempts: u32,
}
