//! H.264 Annex-B / AVCC helpers (C7): NALU framing, keyframe detection, and
//! `fmtp` synthesis from a parameter-set bitstream.

use base64::{engine::general_purpose::STANDARD, Engine};

pub const NALU_TYPE_PFRAME: u8 = 1;
pub const NALU_TYPE_IFRAME: u8 = 5;
pub const NALU_TYPE_SEI: u8 = 6;
pub const NALU_TYPE_SPS: u8 = 7;
pub const NALU_TYPE_PPS: u8 = 8;
pub const NALU_TYPE_AUD: u8 = 9;

const PROFILE_BASELINE: u8 = 0x42;
const PROFILE_MAIN: u8 = 0x4D;
const PROFILE_HIGH: u8 = 0x64;
const CAPABILITY_BASELINE: u8 = 0xE0;
const CAPABILITY_MAIN: u8 = 0x40;

/// NALU type of the AVCC unit at the start of `b` (4-byte BE length prefix
/// followed by the NALU header byte).
pub fn nalu_type(b: &[u8]) -> Option<u8> {
    b.get(4).map(|header| header & 0x1F)
}

fn avcc_unit_size(b: &[u8]) -> Option<usize> {
    if b.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize + 4)
}

/// Whether any NALU in this AVCC access unit is an IDR (keyframe) slice.
pub fn is_keyframe(mut b: &[u8]) -> bool {
    loop {
        match nalu_type(b) {
            Some(NALU_TYPE_PFRAME) => return false,
            Some(NALU_TYPE_IFRAME) => return true,
            _ => {}
        }
        let Some(size) = avcc_unit_size(b) else {
            return false;
        };
        if size < b.len() {
            b = &b[size..];
        } else {
            return false;
        }
    }
}

/// Concatenate two AVCC bitstreams (typically parameter sets followed by an
/// access unit).
pub fn join(ps: &[u8], access_unit: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ps.len() + access_unit.len());
    out.extend_from_slice(ps);
    out.extend_from_slice(access_unit);
    out
}

/// Sanitize a (possibly empty or malformed) `fmtp` line into a
/// `profile-level-id` hex string, preferring `sprop-parameter-sets`'s SPS
/// when present and falling back to a high-profile 4.1 default. Some
/// cameras advertise profile/level combinations players reject, so only a
/// small allow-list of values is ever returned.
pub fn get_profile_level_id(fmtp: &str) -> String {
    let mut profile = PROFILE_HIGH;
    let mut capability = 0u8;
    let mut level = 41u8;

    let conf: Option<[u8; 3]> = fmtp
        .split(';')
        .find_map(|part| part.trim().strip_prefix("sprop-parameter-sets="))
        .and_then(|s| s.split(',').next())
        .and_then(|sps_b64| STANDARD.decode(sps_b64).ok())
        .filter(|sps| sps.len() >= 4)
        .map(|sps| [sps[1], sps[2], sps[3]])
        .or_else(|| {
            fmtp.split(';')
                .find_map(|part| part.trim().strip_prefix("profile-level-id="))
                .and_then(|s| hex::decode(s).ok())
                .filter(|bytes| bytes.len() == 3)
                .map(|bytes| [bytes[0], bytes[1], bytes[2]])
        });

    if let Some([p, c, l]) = conf {
        if matches!(p, PROFILE_BASELINE | PROFILE_MAIN) {
            profile = p;
        }
        if matches!(c, CAPABILITY_BASELINE | CAPABILITY_MAIN) {
            capability = c;
        }
        if matches!(l, 30 | 31 | 40) {
            level = l;
        }
    }

    format!("{profile:02X}{capability:02X}{level:02X}")
}

/// Extract `(sps, pps)` from an fmtp line's `sprop-parameter-sets`.
pub fn get_parameter_set(fmtp: &str) -> (Vec<u8>, Vec<u8>) {
    let Some(value) = fmtp
        .split(';')
        .find_map(|part| part.trim().strip_prefix("sprop-parameter-sets="))
    else {
        return (Vec::new(), Vec::new());
    };
    let value = value.split(';').next().unwrap_or(value);
    let Some((sps_b64, pps_b64)) = value.split_once(',') else {
        return (Vec::new(), Vec::new());
    };
    (
        STANDARD.decode(sps_b64).unwrap_or_default(),
        STANDARD.decode(pps_b64).unwrap_or_default(),
    )
}

/// Build an `fmtp` line from an AVCC bitstream containing SPS/PPS (and
/// optionally other NALUs, which are skipped).
pub fn get_fmtp_line(avc: &[u8]) -> String {
    let mut s = String::from("packetization-mode=1");
    let mut rest = avc;

    loop {
        let Some(size) = avcc_unit_size(rest) else {
            break;
        };
        match nalu_type(rest) {
            Some(NALU_TYPE_SPS) if rest.len() >= 8 => {
                s.push_str(";profile-level-id=");
                s.push_str(&hex::encode(&rest[5..8]));
                s.push_str(";sprop-parameter-sets=");
                s.push_str(&STANDARD.encode(&rest[4..size.min(rest.len())]));
            }
            Some(NALU_TYPE_PPS) => {
                s.push(',');
                s.push_str(&STANDARD.encode(&rest[4..size.min(rest.len())]));
            }
            _ => {}
        }

        if size < rest.len() {
            rest = &rest[size..];
        } else {
            break;
        }
    }

    s
}

/// Convert an Annex-B bitstream (`00 00 00 01` / `00 00 01` start codes) to
/// AVCC (4-byte BE length prefixes), for adapters that only speak one or the
/// other.
pub fn annexb_to_avcc(annexb: &[u8]) -> Vec<u8> {
    let starts = find_start_codes(annexb);
    let mut out = Vec::with_capacity(annexb.len());

    for (i, &(start, hdr_len)) in starts.iter().enumerate() {
        let nalu_start = start + hdr_len;
        let nalu_end = starts
            .get(i + 1)
            .map(|&(next_start, _)| next_start)
            .unwrap_or(annexb.len());
        let nalu = &annexb[nalu_start..nalu_end];
        out.extend_from_slice(&(nalu.len() as u32).to_be_bytes());
        out.extend_from_slice(nalu);
    }

    out
}

/// Convert AVCC back to Annex-B using 4-byte start codes throughout.
pub fn avcc_to_annexb(avcc: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(avcc.len());
    let mut rest = avcc;
    while let Some(size) = avcc_unit_size(rest) {
        let end = size.min(rest.len());
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(&rest[4..end]);
        if size < rest.len() {
            rest = &rest[size..];
        } else {
            break;
        }
    }
    out
}

fn find_start_codes(b: &[u8]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 2 < b.len() {
        if b[i] == 0 && b[i + 1] == 0 {
            if b[i + 2] == 1 {
                out.push((i, 3));
                i += 3;
                continue;
            }
            if i + 3 < b.len() && b[i + 2] == 0 && b[i + 3] == 1 {
                out.push((i, 4));
                i += 4;
                continue;
            }
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avcc_unit(nalu_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut body = vec![nalu_type];
        body.extend_from_slice(payload);
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn keyframe_detected_from_idr_slice() {
        let au = avcc_unit(NALU_TYPE_IFRAME, &[0xAA, 0xBB]);
        assert!(is_keyframe(&au));
    }

    #[test]
    fn non_idr_slice_is_not_a_keyframe() {
        let au = avcc_unit(NALU_TYPE_PFRAME, &[0xAA, 0xBB]);
        assert!(!is_keyframe(&au));
    }

    #[test]
    fn profile_level_id_defaults_to_high_41_when_empty() {
        assert_eq!(get_profile_level_id(""), "640029");
    }

    #[test]
    fn profile_level_id_sanitizes_unsupported_level() {
        // level byte 0x50 (80) isn't in the allow-list, falls back to 41 (0x29).
        assert_eq!(get_profile_level_id("profile-level-id=425032"), "420029");
    }

    #[test]
    fn annexb_round_trips_through_avcc() {
        let annexb = [0, 0, 0, 1, 0x67, 1, 2, 3, 0, 0, 1, 0x68, 4, 5];
        let avcc = annexb_to_avcc(&annexb);
        let back = avcc_to_annexb(&avcc);
        assert_eq!(back, vec![0, 0, 0, 1, 0x67, 1, 2, 3, 0, 0, 0, 1, 0x68, 4, 5]);
    }

    #[test]
    fn fmtp_line_contains_sps_and_pps() {
        let sps = avcc_unit(NALU_TYPE_SPS, &[0x42, 0xE0, 0x1F, 0x00]);
        let pps = avcc_unit(NALU_TYPE_PPS, &[0xCE, 0x3C, 0x80]);
        let avc = join(&sps, &pps);
        let fmtp = get_fmtp_line(&avc);
        assert!(fmtp.contains("profile-level-id=42e01f"));
        assert!(fmtp.contains("sprop-parameter-sets="));
        let (decoded_sps, decoded_pps) = get_parameter_set(&fmtp);
        assert_eq!(decoded_sps, sps[4..]);
        assert_eq!(decoded_pps, pps[4..]);
    }
}
