//! Frame codec: a 4 byte big-endian body length followed by a binary plist dictionary.

use crate::error::Error;
use itertools::Itertools;
use plist::{Dictionary, Value};
use std::io::Cursor;

/// Size of the frame length prefix.
pub const HEADER_LEN: usize = 4;

/// Upper bound for a frame body, anything larger is treated as a corrupted header.
pub const MAX_BODY_LENGTH: u32 = 1 << 24;

/// Read body length from a frame header.
///
/// # Arguments
///
/// * `header`: first four bytes of a frame
pub fn parse_length(header: [u8; HEADER_LEN]) -> Result<u32, Error> {
    let length = u32::from_be_bytes(header);
    if length > MAX_BODY_LENGTH {
        return Err(Error::OversizedFrame { length, header });
    }
    Ok(length)
}

/// Serialize dictionary into a complete frame (length prefix included).
pub fn encode(message: Dictionary) -> Result<Vec<u8>, Error> {
    let mut frame = vec![0u8; HEADER_LEN];
    Value::Dictionary(message)
        .to_writer_binary(&mut frame)
        .map_err(Error::Encode)?;

    let body_len = frame.len() - HEADER_LEN;
    let length = u32::try_from(body_len)
        .ok()
        .filter(|len| *len <= MAX_BODY_LENGTH)
        .ok_or(Error::FrameTooLarge(body_len))?;
    frame[..HEADER_LEN].copy_from_slice(&length.to_be_bytes());
    Ok(frame)
}

/// Deserialize a frame body (without length prefix) into a dictionary.
pub fn decode(body: &[u8]) -> Result<Dictionary, Error> {
    Value::from_reader(Cursor::new(body))
        .map_err(Error::MalformedPayload)?
        .into_dictionary()
        .ok_or(Error::NotADictionary)
}

/// Replace every byte outside of printable ascii with a dot.
pub fn escape_printable(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if (b' '..b'~').contains(&b) {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// Printable multi-line preview of raw bytes, `columns` chars per line and at most `lines` lines.
pub fn preview(bytes: &[u8], columns: usize, lines: usize) -> String {
    let columns = columns.max(1);
    let limit = columns.saturating_mul(lines);
    let shown = &bytes[..bytes.len().min(limit)];
    let mut text = shown
        .chunks(columns)
        .map(escape_printable)
        .join("\n");
    if shown.len() < bytes.len() {
        text.push_str("...");
    }
    text
}

#[cfg(test)]
mod test {
    use crate::error::Error;
    use crate::protocol::codec::{
        decode, encode, escape_printable, parse_length, preview, HEADER_LEN, MAX_BODY_LENGTH,
    };
    use plist::{Dictionary, Value};

    fn sample() -> Dictionary {
        let mut inner = Dictionary::new();
        inner.insert("WIRTargetIdentifierKey".to_string(), Value::from(42u32));
        inner.insert("WIRSocketDataKey".to_string(), Value::from("{\"id\":1}"));
        inner.insert("flag".to_string(), Value::Boolean(true));
        inner.insert("blob".to_string(), Value::Data(vec![0, 1, 2, 255]));

        let mut message = Dictionary::new();
        message.insert("messageName".to_string(), Value::from("WIRSocketDataMessage"));
        message.insert("msgData".to_string(), Value::Dictionary(inner));
        message
    }

    #[test]
    fn test_encode_decode() {
        let frame = encode(sample()).unwrap();
        let header: [u8; HEADER_LEN] = frame[..HEADER_LEN].try_into().unwrap();
        let length = parse_length(header).unwrap() as usize;
        assert_eq!(length, frame.len() - HEADER_LEN);
        assert!(frame[HEADER_LEN..].starts_with(b"bplist00"));

        let decoded = decode(&frame[HEADER_LEN..]).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_decode_malformed() {
        let frame = encode(sample()).unwrap();
        let truncated = &frame[HEADER_LEN..frame.len() - 10];
        assert!(matches!(decode(truncated), Err(Error::MalformedPayload(_))));
        assert!(matches!(
            decode(b"bplist00\x01\x02\x03"),
            Err(Error::MalformedPayload(_))
        ));
        assert!(matches!(decode(b""), Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_not_a_dictionary() {
        let mut body = vec![];
        Value::from("just a string")
            .to_writer_binary(&mut body)
            .unwrap();
        assert!(matches!(decode(&body), Err(Error::NotADictionary)));
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length([0, 0, 1, 0]).unwrap(), 256);
        assert_eq!(
            parse_length(MAX_BODY_LENGTH.to_be_bytes()).unwrap(),
            MAX_BODY_LENGTH
        );
        assert!(matches!(
            parse_length((MAX_BODY_LENGTH + 1).to_be_bytes()),
            Err(Error::OversizedFrame { length, .. }) if length == MAX_BODY_LENGTH + 1
        ));
    }

    #[test]
    fn test_escape_and_preview() {
        assert_eq!(escape_printable(b"ab\x00\n~c"), "ab...c");

        struct TestCase {
            input: &'static [u8],
            expected: &'static str,
        }
        let cases = [
            TestCase {
                input: b"abcd",
                expected: "abc\nd",
            },
            TestCase {
                input: b"abcdef",
                expected: "abc\ndef",
            },
            TestCase {
                input: b"abcdefg",
                expected: "abc\ndef...",
            },
        ];
        for tc in cases {
            assert_eq!(preview(tc.input, 3, 2), tc.expected);
        }
    }
}
