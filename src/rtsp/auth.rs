//! RTSP authentication (§6): HTTP Basic and Digest credential validation
//! against a single configured username/password.

use base64::{engine::general_purpose::STANDARD, Engine};
use md5::{Digest, Md5};
use rtsp_types::headers::AUTHORIZATION;
use rtsp_types::Request;

const REALM: &str = "mediahub";

pub struct Credentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// `WWW-Authenticate` challenge header value sent with a 401 response.
pub fn digest_challenge(nonce: &str) -> String {
    format!(r#"Digest realm="{REALM}", nonce="{nonce}""#)
}

pub fn basic_challenge() -> String {
    format!(r#"Basic realm="{REALM}""#)
}

/// `true` if the request's `Authorization` header satisfies `credentials`,
/// under either scheme. A request with no header at all is never valid but
/// is reported separately by the caller (go2rtc tolerates a first
/// unauthenticated request from some clients that resend with credentials).
pub fn validate<B>(request: &Request<B>, credentials: &Credentials<'_>, method: &str, nonce: &str) -> bool {
    let Some(header) = request.header(&AUTHORIZATION) else {
        return false;
    };
    let header = header.as_str();

    if let Some(encoded) = header.strip_prefix("Basic ") {
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(text) = String::from_utf8(decoded) else {
            return false;
        };
        return text == format!("{}:{}", credentials.username, credentials.password);
    }

    if let Some(rest) = header.strip_prefix("Digest ") {
        return validate_digest(rest, credentials, method, nonce);
    }

    false
}

fn digest_field<'a>(fields: &'a str, key: &str) -> Option<&'a str> {
    fields.split(',').find_map(|part| {
        let part = part.trim();
        part.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
            .map(|v| v.trim_matches('"'))
    })
}

fn validate_digest(fields: &str, credentials: &Credentials<'_>, method: &str, expected_nonce: &str) -> bool {
    let Some(username) = digest_field(fields, "username") else {
        return false;
    };
    let Some(realm) = digest_field(fields, "realm") else {
        return false;
    };
    let Some(nonce) = digest_field(fields, "nonce") else {
        return false;
    };
    let Some(uri) = digest_field(fields, "uri") else {
        return false;
    };
    let Some(response) = digest_field(fields, "response") else {
        return false;
    };

    if username != credentials.username || nonce != expected_nonce {
        return false;
    }

    let ha1 = md5_hex(&format!("{username}:{realm}:{}", credentials.password));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    let expected = md5_hex(&format!("{ha1}:{nonce}:{ha2}"));

    response == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtsp_types::Method;

    fn request_with_auth(header: &str) -> Request<Vec<u8>> {
        Request::builder(Method::Describe, rtsp_types::Version::V1_0)
            .header(AUTHORIZATION, header)
            .build(Vec::new())
    }

    #[test]
    fn basic_credentials_match() {
        let creds = Credentials {
            username: "admin",
            password: "secret",
        };
        let encoded = STANDARD.encode("admin:secret");
        let req = request_with_auth(&format!("Basic {encoded}"));
        assert!(validate(&req, &creds, "DESCRIBE", "nonce"));
    }

    #[test]
    fn basic_credentials_mismatch_fails() {
        let creds = Credentials {
            username: "admin",
            password: "secret",
        };
        let encoded = STANDARD.encode("admin:wrong");
        let req = request_with_auth(&format!("Basic {encoded}"));
        assert!(!validate(&req, &creds, "DESCRIBE", "nonce"));
    }

    #[test]
    fn digest_response_matches_rfc2069_formula() {
        let creds = Credentials {
            username: "admin",
            password: "secret",
        };
        let ha1 = md5_hex("admin:mediahub:secret");
        let ha2 = md5_hex("DESCRIBE:rtsp://host/stream");
        let response = md5_hex(&format!("{ha1}:abc123:{ha2}"));

        let header = format!(
            r#"Digest username="admin", realm="mediahub", nonce="abc123", uri="rtsp://host/stream", response="{response}""#
        );
        let req = request_with_auth(&header);
        assert!(validate(&req, &creds, "DESCRIBE", "abc123"));
    }
}
