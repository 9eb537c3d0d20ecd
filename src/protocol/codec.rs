//! Record codec (encode/decode)
//!
//! One message is one JSON object followed by `\n`.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

use super::{Error, MAX_RECORD_LEN, Message, MessageType, Result};

/// Encode a message to a self-delimited record
///
/// # Format
///
/// ```text
/// {"type":"<tag>", ...fields}\n
/// ```
pub fn encode(message: &Message) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(256).writer();
    serde_json::to_writer(&mut buf, message)?;
    let mut bytes = buf.into_inner();
    bytes.put_u8(b'\n');
    Ok(bytes.freeze())
}

/// Decode a message from one record
///
/// Trailing whitespace, including the record terminator, is ignored.
///
/// # Errors
///
/// Returns an error if:
/// - Record, without its terminator, is longer than [`MAX_RECORD_LEN`]
/// - Record is not a JSON object
/// - The `type` tag is missing or unknown
/// - A key required by the tagged type is missing or has the wrong shape
pub fn decode(record: &[u8]) -> Result<Message> {
    let record = record.trim_ascii_end();
    if record.len() > MAX_RECORD_LEN {
        return Err(Error::RecordTooLarge {
            max: MAX_RECORD_LEN,
        });
    }

    let value: Value = serde_json::from_slice(record)?;
    let Value::Object(ref fields) = value else {
        return Err(Error::NotAnObject);
    };

    let tag = fields
        .get("type")
        .and_then(Value::as_str)
        .ok_or(Error::MissingType)?;
    if MessageType::from_tag(tag).is_none() {
        return Err(Error::UnknownType {
            tag: tag.to_owned(),
        });
    }

    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChapChallenge, ChapInitial, ChapResult, TicketRequest};

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = Message::from(ChapChallenge {
            challenge: vec![7u8; 32],
        });
        let encoded = encode(&original).unwrap();
        let decoded = decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_record_is_single_line() {
        let encoded = encode(&Message::from(ChapInitial {
            id: "multi\nline".into(),
        }))
        .unwrap();

        assert_eq!(encoded.last(), Some(&b'\n'));
        assert_eq!(encoded.iter().filter(|&&b| b == b'\n').count(), 1);
    }

    #[test]
    fn test_decode_field_order_independent() {
        let a = decode(br#"{"type":"Ticket Request","service":"echo","id":"alice"}"#).unwrap();
        let b = decode(br#"{"id":"alice","service":"echo","type":"Ticket Request"}"#).unwrap();

        assert_eq!(a, b);
        assert_eq!(
            a,
            Message::from(TicketRequest {
                service: "echo".into(),
                id: "alice".into(),
            })
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        let result = decode(br#"{"type":"RFC1994 Goodbye","id":"alice"}"#);
        assert!(matches!(result, Err(Error::UnknownType { tag }) if tag == "RFC1994 Goodbye"));
    }

    #[test]
    fn test_decode_missing_type() {
        let result = decode(br#"{"id":"alice"}"#);
        assert!(matches!(result, Err(Error::MissingType)));

        let result = decode(br#"{"type":7,"id":"alice"}"#);
        assert!(matches!(result, Err(Error::MissingType)));
    }

    #[test]
    fn test_decode_missing_key() {
        let result = decode(br#"{"type":"Ticket Request","service":"echo"}"#);
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn test_decode_not_an_object() {
        let result = decode(br#"["RFC1994 Result", true]"#);
        assert!(matches!(result, Err(Error::NotAnObject)));
    }

    #[test]
    fn test_decode_garbage() {
        let result = decode(b"\x00\x01garbage");
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn test_decode_wrong_field_shape() {
        let result = decode(br#"{"type":"RFC1994 Result","result":"yes"}"#);
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[test]
    fn test_decode_record_too_large() {
        let mut record = br#"{"type":"RFC1994 Initial","id":""#.to_vec();
        record.extend(std::iter::repeat_n(b'a', MAX_RECORD_LEN));
        record.extend_from_slice(br#""}"#);

        let result = decode(&record);
        assert!(matches!(result, Err(Error::RecordTooLarge { .. })));
    }

    #[test]
    fn test_decode_record_at_limit_with_terminator() {
        let head = br#"{"type":"RFC1994 Initial","id":""#;
        let tail = br#""}"#;
        let mut record = head.to_vec();
        record.extend(std::iter::repeat_n(b'a', MAX_RECORD_LEN - head.len() - tail.len()));
        record.extend_from_slice(tail);
        assert_eq!(record.len(), MAX_RECORD_LEN);
        record.push(b'\n');

        let Message::ChapInitial(initial) = decode(&record).unwrap() else {
            panic!("expected an initial record");
        };
        assert_eq!(initial.id.len(), MAX_RECORD_LEN - head.len() - tail.len());
    }

    #[test]
    fn test_decode_tolerates_crlf() {
        let decoded = decode(b"{\"type\":\"RFC1994 Result\",\"result\":true}\r\n").unwrap();
        assert_eq!(decoded, Message::from(ChapResult { result: true }));
    }

    // Property-based tests
    #[cfg(test)]
    mod proptests {
        use super::*;
        use crate::protocol::ServiceMessage;
        use proptest::prelude::*;

        fn bytes_strategy() -> impl Strategy<Value = Vec<u8>> {
            prop::collection::vec(any::<u8>(), 0..=256)
        }

        proptest! {
            /// Property: byte fields survive the base64 text encoding
            #[test]
            fn prop_service_message_roundtrip(
                service in "[a-z]{1,16}",
                id in "\\PC{0,24}",
                payload in bytes_strategy(),
                nonce in bytes_strategy(),
                iv in bytes_strategy(),
            ) {
                let original = Message::from(ServiceMessage {
                    service,
                    id,
                    encrypted_payload: payload,
                    nonce,
                    iv,
                });
                let decoded = decode(&encode(&original).unwrap()).unwrap();
                prop_assert_eq!(decoded, original);
            }

            /// Property: arbitrary bytes never panic the decoder
            #[test]
            fn prop_decode_never_panics(record in prop::collection::vec(any::<u8>(), 0..512)) {
                let _ = decode(&record);
            }

            /// Property: dropping any field of a record is a decode fault
            #[test]
            fn prop_missing_field_rejected(drop_idx in 0usize..5) {
                let full = Message::from(ServiceMessage {
                    service: "echo".into(),
                    id: "alice".into(),
                    encrypted_payload: vec![1, 2, 3],
                    nonce: vec![4, 5, 6],
                    iv: vec![7, 8, 9],
                });
                let mut value = serde_json::to_value(&full).unwrap();
                let obj = value.as_object_mut().unwrap();
                let key = ["service", "id", "encrypted-payload", "nonce", "iv"][drop_idx];
                obj.remove(key);

                let record = serde_json::to_vec(&value).unwrap();
                prop_assert!(decode(&record).is_err());
            }
        }
    }
}
