//! `mdhd`/`tfdt` box parsing for `ActualStartOffset` (spec.md §4.7).
//!
//! `walk_boxes` is carried over almost verbatim from the teacher's
//! `hls-vod-lib/src/segment/isobmff.rs` — the same linear pre-order box
//! scan, reused here instead of reinvented, per spec.md §9's "do not take
//! a dependency on a generic fMP4 library for this narrow use."

use crate::error::{NovaError, Result};
use std::path::Path;

const CONTAINERS: &[&[u8; 4]] = &[b"moov", b"trak", b"mdia", b"moof", b"traf"];

/// Walk all top-level boxes in `data`, recursing into `containers`.
/// `callback` runs for every box in pre-order traversal.
pub fn walk_boxes<'a, F>(data: &'a [u8], containers: &[&[u8; 4]], callback: &mut F)
where
    F: FnMut(&[u8; 4], &'a [u8]),
{
    let mut pos = 0;
    while pos + 8 <= data.len() {
        let size = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        if size < 8 || pos + size > data.len() {
            break;
        }
        let btype: &[u8; 4] = &data[pos + 4..pos + 8].try_into().unwrap();
        let payload = &data[pos + 8..pos + size];

        callback(btype, payload);

        if containers.contains(&btype) {
            walk_boxes(payload, containers, callback);
        }

        pos += size;
    }
}

/// Parse `mdhd`'s timescale out of an `init.mp4` buffer (first `mdhd` found,
/// which is the video track's for every NovaStream output).
pub fn parse_mdhd_timescale(init_mp4: &[u8]) -> Option<u32> {
    let mut timescale = None;
    walk_boxes(init_mp4, CONTAINERS, &mut |btype, payload| {
        if timescale.is_some() || btype != b"mdhd" || payload.is_empty() {
            return;
        }
        let version = payload[0];
        // version(1) + flags(3), then version-dependent time fields.
        let ts_offset = if version == 1 {
            4 + 8 + 8 // creation/modification times are 64-bit
        } else {
            4 + 4 + 4
        };
        if payload.len() >= ts_offset + 4 {
            timescale = Some(u32::from_be_bytes([
                payload[ts_offset],
                payload[ts_offset + 1],
                payload[ts_offset + 2],
                payload[ts_offset + 3],
            ]));
        }
    });
    timescale
}

/// Parse `tfdt`'s `baseMediaDecodeTime` out of a segment buffer.
pub fn parse_tfdt_base_media_decode_time(segment: &[u8]) -> Option<u64> {
    let mut base_time = None;
    walk_boxes(segment, CONTAINERS, &mut |btype, payload| {
        if base_time.is_some() || btype != b"tfdt" || payload.is_empty() {
            return;
        }
        let version = payload[0];
        if version == 1 {
            if payload.len() >= 4 + 8 {
                let bytes: [u8; 8] = payload[4..12].try_into().unwrap();
                base_time = Some(u64::from_be_bytes(bytes));
            }
        } else if payload.len() >= 4 + 4 {
            let bytes: [u8; 4] = payload[4..8].try_into().unwrap();
            base_time = Some(u32::from_be_bytes(bytes) as u64);
        }
    });
    base_time
}

/// Read `init.mp4` and the first segment under `dir` and compute
/// `ActualStartOffset = baseMediaDecodeTime / timescale` (spec.md §4.7).
pub async fn read_actual_start_offset(dir: &Path, first_segment_number: i64) -> Result<f64> {
    let init_bytes = tokio::fs::read(dir.join("init.mp4"))
        .await
        .map_err(NovaError::Io)?;
    let timescale = parse_mdhd_timescale(&init_bytes)
        .ok_or_else(|| NovaError::Transient("init.mp4 has no mdhd timescale".to_string()))?;

    let segment_path = dir.join(format!("segment{first_segment_number}.m4s"));
    let segment_bytes = tokio::fs::read(&segment_path).await.map_err(NovaError::Io)?;
    let base_time = parse_tfdt_base_media_decode_time(&segment_bytes)
        .ok_or_else(|| NovaError::Transient("segment has no tfdt baseMediaDecodeTime".to_string()))?;

    if timescale == 0 {
        return Err(NovaError::Transient("mdhd timescale is zero".to_string()));
    }
    Ok(base_time as f64 / timescale as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let size = (8 + payload.len()) as u32;
        let mut out = size.to_be_bytes().to_vec();
        out.extend_from_slice(box_type);
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn parses_version_zero_mdhd_timescale() {
        let mut mdhd_payload = vec![0u8]; // version
        mdhd_payload.extend_from_slice(&[0, 0, 0]); // flags
        mdhd_payload.extend_from_slice(&[0; 4]); // creation_time
        mdhd_payload.extend_from_slice(&[0; 4]); // modification_time
        mdhd_payload.extend_from_slice(&90000u32.to_be_bytes()); // timescale
        let mdhd = make_box(b"mdhd", &mdhd_payload);
        let mdia = make_box(b"mdia", &mdhd);
        let trak = make_box(b"trak", &mdia);
        let moov = make_box(b"moov", &trak);

        assert_eq!(parse_mdhd_timescale(&moov), Some(90000));
    }

    #[test]
    fn parses_version_one_tfdt_base_media_decode_time() {
        let mut tfdt_payload = vec![1u8]; // version
        tfdt_payload.extend_from_slice(&[0, 0, 0]); // flags
        tfdt_payload.extend_from_slice(&123456789u64.to_be_bytes());
        let tfdt = make_box(b"tfdt", &tfdt_payload);
        let traf = make_box(b"traf", &tfdt);
        let moof = make_box(b"moof", &traf);

        assert_eq!(parse_tfdt_base_media_decode_time(&moof), Some(123456789));
    }

    #[test]
    fn missing_box_returns_none() {
        assert_eq!(parse_mdhd_timescale(&[]), None);
        assert_eq!(parse_tfdt_base_media_decode_time(b"not a box stream"), None);
    }
}
