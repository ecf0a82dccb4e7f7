//! SDP encode/decode (§4.5), wrapping `sdp-types`. Sprop parameter handling
//! only ever copies from a codec's own `fmtp`/parameter-set data; it never
//! fabricates a default SPS/PPS for a codec that didn't offer one.

use sdp_types::{Connection, Media as SdpMedia, Origin, Session, Time};

use crate::core::media::{Codec, CodecName, Direction, Kind, Media};
use crate::error::{AppError, Result};

fn codec_name_to_rtp(name: CodecName) -> String {
    name.as_str().to_string()
}

/// Maps an `a=rtpmap` encoding name to a [`CodecName`], or `None` if the
/// registry doesn't recognize it. A remote peer can advertise arbitrarily
/// many distinct unknown names (vendor/ONVIF extensions); returning `None`
/// here rather than synthesizing a new variant per name keeps that path
/// allocation-free.
fn rtp_name_to_codec(name: &str) -> Option<CodecName> {
    match name.to_ascii_uppercase().as_str() {
        "H264" => Some(CodecName::H264),
        "H265" | "HEVC" => Some(CodecName::H265),
        "OPUS" => Some(CodecName::Opus),
        "PCMA" => Some(CodecName::Pcma),
        "PCMU" => Some(CodecName::Pcmu),
        "MPEG4-GENERIC" => Some(CodecName::Aac),
        _ => None,
    }
}

fn kind_str(kind: Kind) -> &'static str {
    match kind {
        Kind::Video => "video",
        Kind::Audio => "audio",
        Kind::Application => "application",
    }
}

/// Build an SDP document describing `medias`, in the order given.
pub fn marshal_sdp(session_name: &str, medias: &[Media]) -> Vec<u8> {
    let mut session = Session {
        origin: Origin {
            username: "-".to_string(),
            sess_id: "0".to_string(),
            sess_version: "0".to_string(),
            nettype: "IN".to_string(),
            addrtype: "IP4".to_string(),
            unicast_address: "0.0.0.0".to_string(),
        },
        session_name: session_name.to_string(),
        session_description: None,
        uri: None,
        emails: Vec::new(),
        phones: Vec::new(),
        connection: Some(Connection {
            nettype: "IN".to_string(),
            addrtype: "IP4".to_string(),
            connection_address: "0.0.0.0".to_string(),
            ttl: None,
            num_addresses: None,
        }),
        bandwidths: Vec::new(),
        time_descriptions: vec![Time {
            start_time: 0,
            stop_time: 0,
            repeat_times: Vec::new(),
        }],
        attributes: Vec::new(),
        medias: Vec::new(),
    };

    for (index, media) in medias.iter().enumerate() {
        let mut attributes = Vec::new();
        attributes.push(("control".to_string(), Some(format!("trackID={index}"))));
        attributes.push((
            match media.direction {
                Direction::Recvonly => "recvonly",
                Direction::Sendonly => "sendonly",
                Direction::Sendrecv => "sendrecv",
            }
            .to_string(),
            None,
        ));

        let mut formats = Vec::new();
        for codec in &media.codecs {
            formats.push(codec.payload_type.to_string());
            let rate_part = match codec.channels {
                Some(ch) => format!("{}/{}/{}", codec_name_to_rtp(codec.name), codec.clock_rate, ch),
                None => format!("{}/{}", codec_name_to_rtp(codec.name), codec.clock_rate),
            };
            attributes.push((
                "rtpmap".to_string(),
                Some(format!("{} {}", codec.payload_type, rate_part)),
            ));
            if !codec.fmtp_line.is_empty() {
                attributes.push((
                    "fmtp".to_string(),
                    Some(format!("{} {}", codec.payload_type, codec.fmtp_line)),
                ));
            }
        }

        session.medias.push(SdpMedia {
            media: kind_str(media.kind).to_string(),
            port: 0,
            num_ports: None,
            proto: "RTP/AVP".to_string(),
            fmt: formats.join(" "),
            connection: None,
            bandwidths: Vec::new(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| sdp_types::Attribute { attribute: k, value: v })
                .collect(),
        });
    }

    let mut out = Vec::new();
    session.write(&mut out).expect("writing to a Vec never fails");
    out
}

/// Parse an SDP body into our `Media` descriptors. Each `m=` line becomes one
/// `Media`; its `a=rtpmap`/`a=fmtp` attributes become its codec list.
pub fn unmarshal_sdp(body: &[u8]) -> Result<Vec<Media>> {
    let text = std::str::from_utf8(body).map_err(|e| AppError::Protocol(e.to_string()))?;
    let session = Session::parse(text.as_bytes()).map_err(|e| AppError::Protocol(e.to_string()))?;

    let mut medias = Vec::new();
    for (index, sdp_media) in session.medias.iter().enumerate() {
        let kind = match sdp_media.media.as_str() {
            "video" => Kind::Video,
            "audio" => Kind::Audio,
            _ => Kind::Application,
        };

        let mut media = Media::new(kind, Direction::Sendrecv);
        media.id = format!("trackID={index}");

        let payload_types: Vec<u8> = sdp_media
            .fmt
            .split_whitespace()
            .filter_map(|pt| pt.parse().ok())
            .collect();

        for pt in payload_types {
            let rtpmap = sdp_media.attributes.iter().find(|a| {
                a.attribute == "rtpmap"
                    && a.value
                        .as_deref()
                        .map(|v| v.starts_with(&pt.to_string()))
                        .unwrap_or(false)
            });

            let Some(rtpmap) = rtpmap else { continue };
            let Some(value) = &rtpmap.value else { continue };
            let Some((_, rate_part)) = value.split_once(' ') else {
                continue;
            };
            let mut parts = rate_part.split('/');
            let Some(name) = rtp_name_to_codec(parts.next().unwrap_or_default()) else {
                // Unrecognized encoding name (vendor/ONVIF extension): keep the
                // media with an empty codec list rather than invent a variant.
                continue;
            };
            let clock_rate: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(90_000);
            let channels: Option<u16> = parts.next().and_then(|s| s.parse().ok());

            let fmtp_line = sdp_media
                .attributes
                .iter()
                .find(|a| {
                    a.attribute == "fmtp"
                        && a.value
                            .as_deref()
                            .map(|v| v.starts_with(&pt.to_string()))
                            .unwrap_or(false)
                })
                .and_then(|a| a.value.as_deref())
                .and_then(|v| v.split_once(' '))
                .map(|(_, fmtp)| fmtp.to_string())
                .unwrap_or_default();

            let mut codec = Codec::new(name, clock_rate, pt).with_fmtp(fmtp_line);
            if let Some(ch) = channels {
                codec = codec.with_channels(ch);
            }
            media.codecs.push(codec);
        }

        medias.push(media);
    }

    Ok(medias)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media::{Direction, Kind};

    #[test]
    fn marshal_then_unmarshal_preserves_codec_fields() {
        let mut media = Media::new(Kind::Video, Direction::Recvonly);
        media
            .codecs
            .push(Codec::new(CodecName::H264, 90_000, 96).with_fmtp("packetization-mode=1"));

        let bytes = marshal_sdp("mediahub", &[media]);
        let parsed = unmarshal_sdp(&bytes).unwrap();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].codecs[0].name, CodecName::H264);
        assert_eq!(parsed[0].codecs[0].clock_rate, 90_000);
        assert_eq!(
            parsed[0].codecs[0].fmtp_field("packetization-mode"),
            Some("1")
        );
    }

    #[test]
    fn unrecognized_codec_name_keeps_the_media_with_an_empty_codec_list() {
        let body = b"v=0\r\n\
o=- 0 0 IN IP4 0.0.0.0\r\n\
s=mediahub\r\n\
c=IN IP4 0.0.0.0\r\n\
t=0 0\r\n\
m=application 0 RTP/AVP 107\r\n\
a=rtpmap:107 VND.ONVIF.METADATA/90000\r\n";

        let medias = unmarshal_sdp(body).unwrap();
        assert_eq!(medias.len(), 1);
        assert!(medias[0].codecs.is_empty());
    }
}
