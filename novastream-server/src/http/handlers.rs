//! Request handlers for the seven routes of spec.md §6, plus the
//! `/healthz`/`/version` ambient-ops routes.
//!
//! Grounded in the teacher's `handlers.rs`
//! (`hls-vod-server/src/http/handlers.rs`): free functions taking `&AppState`
//! plus extracted parameters, returning `Result<Response, HttpError>`, with
//! headers built by hand rather than through a response-body wrapper type.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{as_segment_error, HttpError};
use crate::http::dto::{
    CreateSessionRequest, CreateSessionResponse, KeepAliveQuery, KeepAliveResponse, SeekQuery,
    SeekResponse, StatusResponse, SubtitleQuery, TokenQuery,
};
use crate::state::AppState;
use novastream_core::hls::mime_for;
use novastream_core::session::SessionParams;

fn parse_session_id(raw: &str) -> Result<Uuid, HttpError> {
    Uuid::parse_str(raw).map_err(|_| HttpError::BadRequest(format!("invalid session id: {raw}")))
}

/// `POST /hls/sessions` (spec.md §6).
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, HttpError> {
    let params = SessionParams {
        path: req.path,
        original_path: req.original_path,
        start_offset: req.start_offset,
        audio_track_index: req.audio_track_index,
        subtitle_track_index: req.subtitle_track_index,
        force_aac: req.force_aac,
        has_dv: req.has_dv,
        dv_profile: req.dv_profile,
        has_hdr: req.has_hdr,
    };

    let session = state.manager.create(params).await?;

    // No session-side auth is performed on this token (spec.md §4.7's
    // playlist rewriting treats it as an opaque passthrough value); it only
    // needs to be unguessable enough to not collide across sessions.
    let token = Uuid::new_v4().simple().to_string();
    let playlist_url = format!("/hls/{}/stream.m3u8?token={}", session.id, token);

    Ok(Json(CreateSessionResponse {
        session_id: session.id.to_string(),
        playlist_url,
    }))
}

/// `GET /hls/{id}/stream.m3u8?token=` (spec.md §6).
pub async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Response, HttpError> {
    let id = parse_session_id(&id)?;
    let session = state.manager.get(id)?;
    let playlist = state
        .manager
        .hls()
        .serve_playlist(&session, &query.token)
        .await?;

    let mut response = playlist.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(mime_for("stream.m3u8")));
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(response)
}

/// `GET /hls/{id}/{segment}?token=` (spec.md §6). `token` is accepted but not
/// otherwise used to serve a segment (spec.md §4.7: auth is out of scope).
pub async fn get_segment(
    State(state): State<Arc<AppState>>,
    Path((id, segment)): Path<(String, String)>,
    Query(_query): Query<TokenQuery>,
) -> Result<Response, HttpError> {
    let id = parse_session_id(&id)?;
    let session = state.manager.get(id)?;
    let bytes = state
        .manager
        .hls()
        .serve_segment(&session, &segment)
        .await
        .map_err(as_segment_error)?;

    let mut response = bytes.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(mime_for(&segment)));
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000"),
    );
    Ok(response)
}

/// `GET /hls/{id}/subtitles?track=N&token=` (spec.md §6).
pub async fn get_subtitles(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SubtitleQuery>,
) -> Result<Response, HttpError> {
    let id = parse_session_id(&id)?;
    let session = state.manager.get(id)?;
    let input = session.source_path.clone();
    let bytes = state
        .manager
        .subtitles()
        .read_or_extract(&session, query.track, &input)
        .await
        .map_err(as_segment_error)?;

    let mut response = bytes.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(mime_for("subtitles.vtt")));
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(response)
}

/// `POST /hls/{id}/keepalive?time=T&bufferStart=S` (spec.md §6).
pub async fn keep_alive(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<KeepAliveQuery>,
) -> Result<Json<KeepAliveResponse>, HttpError> {
    let id = parse_session_id(&id)?;
    let timing = state.manager.keep_alive(id, query.time, query.buffer_start)?;

    Ok(Json(KeepAliveResponse {
        start_offset: timing.start_offset,
        actual_start_offset: timing.actual_start_offset,
        duration: timing.duration,
    }))
}

/// `POST /hls/{id}/seek?time=T` (spec.md §6).
pub async fn seek(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SeekQuery>,
) -> Result<Json<SeekResponse>, HttpError> {
    let id = parse_session_id(&id)?;
    let outcome = state.manager.seek(id, query.time).await?;

    let token = Uuid::new_v4().simple().to_string();
    let playlist_url = format!("/hls/{}/stream.m3u8?token={}", outcome.session_id, token);

    Ok(Json(SeekResponse {
        session_id: outcome.session_id.to_string(),
        start_offset: outcome.start_offset,
        actual_start_offset: outcome.actual_start_offset,
        duration: outcome.duration,
        playlist_url,
    }))
}

/// `GET /hls/{id}/status` (spec.md §6).
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, HttpError> {
    let id = parse_session_id(&id)?;
    let snapshot = state.manager.status(id)?;

    Ok(Json(StatusResponse {
        status: snapshot.status.to_string(),
        fatal_error: snapshot.fatal_error,
        duration: snapshot.duration,
        segments_created: snapshot.segments_created,
        max_segment_requested: snapshot.max_segment_requested,
        paused: snapshot.paused,
        bitstream_errors: snapshot.bitstream_errors,
        hdr_metadata_disabled: snapshot.hdr_metadata_disabled,
        dv_disabled: snapshot.dv_disabled,
        recovery_attempts: snapshot.recovery_attempts,
    }))
}

/// `DELETE /hls/{id}` (spec.md §6): idempotent and always `204` (spec.md §7).
pub async fn cleanup(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    if let Ok(id) = parse_session_id(&id) {
        state.manager.cleanup(id).await;
    }
    StatusCode::NO_CONTENT
}

/// `GET /healthz`: liveness probe, grounded in the teacher's `health_check`.
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// `GET /version`: build/version info, grounded in the teacher's
/// `version_check`. The teacher also reports its linked FFmpeg version;
/// this server never links FFmpeg in-process (the remuxer is an external
/// command), so that key is omitted rather than fabricated.
pub async fn version_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
