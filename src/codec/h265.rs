//! H.265/HEVC Annex-B / AVCC helpers (C7): NALU framing, keyframe detection,
//! and VPS/SPS/PPS extraction from an `fmtp` line.

use base64::{engine::general_purpose::STANDARD, Engine};

pub const NALU_TYPE_PFRAME: u8 = 1;
pub const NALU_TYPE_IFRAME: u8 = 19;
pub const NALU_TYPE_IFRAME2: u8 = 20;
pub const NALU_TYPE_IFRAME3: u8 = 21;
pub const NALU_TYPE_VPS: u8 = 32;
pub const NALU_TYPE_SPS: u8 = 33;
pub const NALU_TYPE_PPS: u8 = 34;
pub const NALU_TYPE_PREFIX_SEI: u8 = 39;
pub const NALU_TYPE_SUFFIX_SEI: u8 = 40;
pub const NALU_TYPE_FU: u8 = 49;

/// NALU type of the AVCC unit at the start of `b`: HEVC packs it into bits
/// 1-6 of the header byte, one bit further in than H.264's.
pub fn nalu_type(b: &[u8]) -> Option<u8> {
    b.get(4).map(|header| (header >> 1) & 0x3F)
}

fn avcc_unit_size(b: &[u8]) -> Option<usize> {
    if b.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize + 4)
}

pub fn is_keyframe(mut b: &[u8]) -> bool {
    loop {
        match nalu_type(b) {
            Some(NALU_TYPE_PFRAME) => return false,
            Some(NALU_TYPE_IFRAME) | Some(NALU_TYPE_IFRAME2) | Some(NALU_TYPE_IFRAME3) => {
                return true
            }
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

/// NALU types present in one AVCC access unit, in order.
pub fn types(mut data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let Some(t) = nalu_type(data) else { break };
        out.push(t);
        let Some(size) = avcc_unit_size(data) else {
            break;
        };
        if size < data.len() {
            data = &data[size..];
        } else {
            break;
        }
    }
    out
}

fn field(fmtp: &str, key: &str) -> Option<Vec<u8>> {
    let value = fmtp
        .split(';')
        .find_map(|part| part.trim().strip_prefix(key))?;
    let value = value.split(';').next().unwrap_or(value);
    STANDARD.decode(value).ok()
}

/// Extract `(vps, sps, pps)` from an fmtp line's `sprop-vps`/`sprop-sps`/`sprop-pps`.
pub fn get_parameter_set(fmtp: &str) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
    if fmtp.is_empty() {
        return (Vec::new(), Vec::new(), Vec::new());
    }
    (
        field(fmtp, "sprop-vps=").unwrap_or_default(),
        field(fmtp, "sprop-sps=").unwrap_or_default(),
        field(fmtp, "sprop-pps=").unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avcc_unit(nalu_type: u8, payload: &[u8]) -> Vec<u8> {
        // HEVC header is two bytes; type occupies bits 1-6 of the first.
        let mut body = vec![(nalu_type << 1) & 0x7E, 0x01];
        body.extend_from_slice(payload);
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn keyframe_detected_from_idr_w_radl() {
        let au = avcc_unit(NALU_TYPE_IFRAME, &[0xAA]);
        assert!(is_keyframe(&au));
    }

    #[test]
    fn trailing_r_slice_is_not_a_keyframe() {
        let au = avcc_unit(NALU_TYPE_PFRAME, &[0xAA]);
        assert!(!is_keyframe(&au));
    }

    #[test]
    fn parameter_sets_round_trip_through_fmtp() {
        let vps = b"vps-bytes".to_vec();
        let sps = b"sps-bytes".to_vec();
        let pps = b"pps-bytes".to_vec();
        let fmtp = format!(
            "sprop-vps={};sprop-sps={};sprop-pps={}",
            STANDARD.encode(&vps),
            STANDARD.encode(&sps),
            STANDARD.encode(&pps)
        );
        assert_eq!(get_parameter_set(&fmtp), (vps, sps, pps));
    }

    #[test]
    fn empty_fmtp_yields_empty_sets() {
        assert_eq!(
            get_parameter_set(""),
            (Vec::new(), Vec::new(), Vec::new())
        );
    }
}
