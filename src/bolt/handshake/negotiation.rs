//! Client-side version negotiation.
//!
//! The client opens with a four-byte magic prefix followed by four
//! proposed versions; the server answers with the single version it
//! selected, or zero when nothing matched.

use super::{BoltVersion, HandshakeError, BOLT_MAGIC, HANDSHAKE_REQUEST_SIZE};

/// Build the 20-byte handshake request: magic + four proposal slots.
pub fn build_request(proposals: &[BoltVersion]) -> [u8; HANDSHAKE_REQUEST_SIZE] {
    let mut request = [0u8; HANDSHAKE_REQUEST_SIZE];
    request[0..4].copy_from_slice(&BOLT_MAGIC);
    for (i, version) in proposals.iter().take(4).enumerate() {
        let offset = 4 + i * 4;
        request[offset..offset + 4].copy_from_slice(&version.to_bytes());
    }
    request
}

/// Interpret the server's four-byte answer.
///
/// Zero means the server supports none of the proposals; any other
/// value must be one of the versions this driver knows, selected from
/// the proposal list.
pub fn parse_response(response: [u8; 4]) -> Result<BoltVersion, HandshakeError> {
    let raw = u32::from_be_bytes(response);
    if raw == 0 {
        return Err(HandshakeError::NoSupportedVersion);
    }
    BoltVersion::from_u32(raw).ok_or(HandshakeError::UnknownVersion(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout() {
        let request = build_request(&BoltVersion::PROPOSED);

        assert_eq!(&request[0..4], &BOLT_MAGIC);
        assert_eq!(&request[4..8], &[0x00, 0x05, 0x00, 0x00]); // 5.0
        assert_eq!(&request[8..12], &[0x00, 0x04, 0x00, 0x04]); // 4.4
        assert_eq!(&request[12..16], &[0x00, 0x04, 0x00, 0x03]); // 4.3
        assert_eq!(&request[16..20], &[0x00, 0x04, 0x00, 0x00]); // 4.0
    }

    #[test]
    fn unused_slots_are_zero() {
        let request = build_request(&[BoltVersion::V5_0]);
        assert_eq!(&request[8..20], &[0u8; 12]);
    }

    #[test]
    fn response_selects_version() {
        assert_eq!(
            parse_response([0x00, 0x05, 0x00, 0x00]).unwrap(),
            BoltVersion::V5_0
        );
        assert_eq!(
            parse_response([0x00, 0x04, 0x00, 0x03]).unwrap(),
            BoltVersion::V4_3
        );
    }

    #[test]
    fn zero_response_is_fatal() {
        assert_eq!(
            parse_response([0, 0, 0, 0]).unwrap_err(),
            HandshakeError::NoSupportedVersion
        );
    }

    #[test]
    fn unknown_version_is_fatal() {
        assert_eq!(
            parse_response([0x00, 0x03, 0x00, 0x00]).unwrap_err(),
            HandshakeError::UnknownVersion(0x0003_0000)
        );
    }
}
