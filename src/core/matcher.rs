//! Codec matcher (C2): decides whether a producer media and a consumer media
//! can be joined, and on which codec pairing.

use super::media::{Codec, CodecName, Media};

/// H.264 profile_idc byte values, shared with `codec::h264::get_profile_level_id`.
const H264_BASELINE: u8 = 0x42;
const H264_MAIN: u8 = 0x4D;
const H264_HIGH: u8 = 0x64;

fn h264_profile_byte(codec: &Codec) -> Option<u8> {
    let id = codec.fmtp_field("profile-level-id")?;
    let bytes = hex::decode(id).ok()?;
    bytes.first().copied()
}

/// baseline/main/constrained-baseline are mutually interchangeable; high only
/// matches high unless the consumer explicitly lists a compatible profile.
fn h264_profiles_compatible(producer: u8, consumer: u8) -> bool {
    // Constrained-baseline doesn't have its own profile_idc; it's signalled via
    // the constraint_set flags on top of baseline/main, which we don't parse
    // here, so baseline/main are treated as the interchangeable set.
    let interchangeable = |p: u8| matches!(p, H264_BASELINE | H264_MAIN);
    if producer == consumer {
        return true;
    }
    if producer == H264_HIGH || consumer == H264_HIGH {
        return false;
    }
    interchangeable(producer) && interchangeable(consumer)
}

fn packetization_mode(codec: &Codec) -> &str {
    codec.fmtp_field("packetization-mode").unwrap_or("1")
}

fn h264_compatible(producer: &Codec, consumer: &Codec) -> bool {
    if packetization_mode(producer) != packetization_mode(consumer) {
        return false;
    }
    match (h264_profile_byte(producer), h264_profile_byte(consumer)) {
        (Some(p), Some(c)) => h264_profiles_compatible(p, c),
        _ => true,
    }
}

fn h265_compatible(producer: &Codec, consumer: &Codec) -> bool {
    for field in ["profile-id", "tier-flag", "level-id"] {
        match (producer.fmtp_field(field), consumer.fmtp_field(field)) {
            (Some(p), Some(c)) if p != c => return false,
            _ => {}
        }
    }
    true
}

fn aac_compatible(producer: &Codec, consumer: &Codec) -> bool {
    match (producer.fmtp_field("config"), consumer.fmtp_field("config")) {
        (Some(p), Some(c)) => p == c,
        // Either side may legitimately omit `config` until negotiation completes;
        // the spec only requires agreement when both sides state one.
        _ => true,
    }
}

/// Inherit sprop parameter sets from the producer codec into the consumer
/// codec when the consumer didn't already carry its own (§4.2 step 3).
fn inherit_sprop(producer: &Codec, consumer: &Codec) -> Codec {
    let mut chosen = consumer.clone();
    let keys: &[&str] = match consumer.name {
        CodecName::H264 => &["sprop-parameter-sets"],
        CodecName::H265 => &["sprop-vps", "sprop-sps", "sprop-pps"],
        _ => return chosen,
    };

    let missing = keys.iter().all(|k| chosen.fmtp_field(k).is_none());
    if !missing {
        return chosen;
    }

    let mut extra = Vec::new();
    for key in keys {
        if let Some(value) = producer.fmtp_field(key) {
            extra.push(format!("{key}={value}"));
        }
    }
    if extra.is_empty() {
        return chosen;
    }
    if chosen.fmtp_line.is_empty() {
        chosen.fmtp_line = extra.join(";");
    } else {
        chosen.fmtp_line = format!("{};{}", chosen.fmtp_line, extra.join(";"));
    }
    chosen
}

fn codecs_match(producer: &Codec, consumer: &Codec) -> bool {
    if producer.name != consumer.name || producer.clock_rate != consumer.clock_rate {
        return false;
    }
    match producer.name {
        CodecName::H264 => h264_compatible(producer, consumer),
        CodecName::H265 => h265_compatible(producer, consumer),
        CodecName::Aac => aac_compatible(producer, consumer),
        _ => true,
    }
}

/// Match one producer media against one consumer media.
///
/// Iterates consumer codecs in preference order (consumer preference
/// dominates); for each, iterates producer codecs and ties break on the
/// earlier producer codec. Returns `(producer_codec, consumer_codec)` with
/// sprop parameters inherited into the consumer codec, or `None`.
pub fn match_media(producer: &Media, consumer: &Media) -> Option<(Codec, Codec)> {
    for consumer_codec in &consumer.codecs {
        for producer_codec in &producer.codecs {
            if codecs_match(producer_codec, consumer_codec) {
                let chosen_consumer = inherit_sprop(producer_codec, consumer_codec);
                return Some((producer_codec.clone(), chosen_consumer));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media::{Direction, Kind};

    fn h264(pt: u8, fmtp: &str) -> Codec {
        Codec::new(CodecName::H264, 90_000, pt).with_fmtp(fmtp)
    }

    #[test]
    fn matches_baseline_and_constrained_baseline() {
        let producer = h264(96, "packetization-mode=1;profile-level-id=42e01f");
        let consumer = h264(97, "packetization-mode=1;profile-level-id=4de01f");
        assert!(codecs_match(&producer, &consumer));
    }

    #[test]
    fn high_profile_is_self_only() {
        let producer = h264(96, "packetization-mode=1;profile-level-id=640029");
        let consumer = h264(97, "packetization-mode=1;profile-level-id=42e01f");
        assert!(!codecs_match(&producer, &consumer));
    }

    #[test]
    fn mismatched_packetization_mode_fails() {
        let producer = h264(96, "packetization-mode=0");
        let consumer = h264(97, "packetization-mode=1");
        assert!(!codecs_match(&producer, &consumer));
    }

    #[test]
    fn consumer_inherits_missing_sprop_parameter_sets() {
        let mut producer_media = Media::new(Kind::Video, Direction::Recvonly);
        producer_media
            .codecs
            .push(h264(96, "packetization-mode=1;sprop-parameter-sets=Z0IAH5WoFAFuQA==,aM48gA=="));

        let mut consumer_media = Media::new(Kind::Video, Direction::Sendonly);
        consumer_media
            .codecs
            .push(h264(96, "packetization-mode=1"));

        let (_, chosen) = match_media(&producer_media, &consumer_media).expect("should match");
        assert_eq!(
            chosen.fmtp_field("sprop-parameter-sets"),
            Some("Z0IAH5WoFAFuQA==,aM48gA==")
        );
    }

    #[test]
    fn consumer_preference_order_dominates() {
        let mut producer_media = Media::new(Kind::Audio, Direction::Recvonly);
        producer_media
            .codecs
            .push(Codec::new(CodecName::Pcmu, 8000, 0));
        producer_media
            .codecs
            .push(Codec::new(CodecName::Opus, 48000, 111));

        let mut consumer_media = Media::new(Kind::Audio, Direction::Sendonly);
        consumer_media
            .codecs
            .push(Codec::new(CodecName::Opus, 48000, 111));
        consumer_media
            .codecs
            .push(Codec::new(CodecName::Pcmu, 8000, 0));

        let (producer_codec, _) = match_media(&producer_media, &consumer_media).expect("match");
        assert_eq!(producer_codec.name, CodecName::Opus);
    }

    #[test]
    fn no_match_returns_none() {
        let mut producer_media = Media::new(Kind::Audio, Direction::Recvonly);
        producer_media
            .codecs
            .push(Codec::new(CodecName::Pcmu, 8000, 0));

        let mut consumer_media = Media::new(Kind::Audio, Direction::Sendonly);
        consumer_media
            .codecs
            .push(Codec::new(CodecName::Opus, 48000, 111));

        assert!(match_media(&producer_media, &consumer_media).is_none());
    }
}
