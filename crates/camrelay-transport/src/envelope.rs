//! Multipart framing on the ZeroMQ wire.
//!
//! Frames travel as `[reply_to, frame]` when the session announces its
//! inbound address, or as a bare `[frame]` otherwise. The frame part is never
//! touched.

use bytes::{Bytes, BytesMut};
use zeromq::ZmqMessage;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("expected 1 or 2 message parts, got {0}")]
    PartCount(usize),
    #[error("reply_to is not valid UTF-8")]
    ReplyToEncoding,
}

/// Wrap a frame for the pipeline.
pub fn seal(reply_to: Option<&Bytes>, frame: Bytes) -> ZmqMessage {
    match reply_to {
        Some(addr) => {
            let mut msg = ZmqMessage::from(addr.clone());
            msg.push_back(frame);
            msg
        }
        None => ZmqMessage::from(frame),
    }
}

/// Split a received frame message into `(reply_to, frame)`.
pub fn open(msg: ZmqMessage) -> Result<(Option<String>, Bytes), EnvelopeError> {
    let mut parts = msg.into_vec();
    match parts.len() {
        1 => Ok((None, parts.remove(0))),
        2 => {
            let frame = parts.remove(1);
            let reply_to = String::from_utf8(parts.remove(0).to_vec())
                .map_err(|_| EnvelopeError::ReplyToEncoding)?;
            Ok((Some(reply_to), frame))
        }
        n => Err(EnvelopeError::PartCount(n)),
    }
}

/// Join the parts of a result message in order.
pub fn concat(msg: ZmqMessage) -> Bytes {
    let mut parts = msg.into_vec();
    if parts.len() == 1 {
        return parts.remove(0);
    }
    let total = parts.iter().map(Bytes::len).sum();
    let mut out = BytesMut::with_capacity(total);
    for part in parts {
        out.extend_from_slice(&part);
    }
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_with_reply_to_has_two_parts() {
        let addr = Bytes::from_static(b"tcp://127.0.0.1:40001");
        let msg = seal(Some(&addr), Bytes::from_static(b"\x01\x02"));
        assert_eq!(msg.len(), 2);
        let (reply_to, frame) = open(msg).unwrap();
        assert_eq!(reply_to.as_deref(), Some("tcp://127.0.0.1:40001"));
        assert_eq!(&frame[..], b"\x01\x02");
    }

    #[test]
    fn sealed_without_reply_to_is_bare() {
        let msg = seal(None, Bytes::from_static(b"\xff\xd8"));
        assert_eq!(msg.len(), 1);
        let (reply_to, frame) = open(msg).unwrap();
        assert!(reply_to.is_none());
        assert_eq!(&frame[..], b"\xff\xd8");
    }

    #[test]
    fn three_parts_rejected() {
        let mut msg = ZmqMessage::from(Bytes::from_static(b"a"));
        msg.push_back(Bytes::from_static(b"b"));
        msg.push_back(Bytes::from_static(b"c"));
        assert_eq!(open(msg), Err(EnvelopeError::PartCount(3)));
    }

    #[test]
    fn binary_reply_to_rejected() {
        let mut msg = ZmqMessage::from(Bytes::from_static(b"\xff\xfe"));
        msg.push_back(Bytes::from_static(b"frame"));
        assert_eq!(open(msg), Err(EnvelopeError::ReplyToEncoding));
    }

    #[test]
    fn concat_joins_in_order() {
        let mut msg = ZmqMessage::from(Bytes::from_static(b"{\"caption\":"));
        msg.push_back(Bytes::from_static(b"\"x\"}"));
        assert_eq!(&concat(msg)[..], b"{\"caption\":\"x\"}");
    }

    #[test]
    fn concat_single_part_is_identity() {
        let msg = ZmqMessage::from(Bytes::from_static(b"only"));
        assert_eq!(&concat(msg)[..], b"only");
    }
}
