use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::AnvilMessage;

/// Length prefix plus type tag.
pub const FRAME_HEADER_LEN: usize = 5;

/// Codec for Anvil frames: `[u32 BE len][u8 tag][payload]`, `len` covering
/// the tag and the payload.
pub struct AnvilCodec;

impl AnvilCodec {
    /// Encode a message into one frame.
    pub fn encode(msg: &AnvilMessage, max_frame: usize) -> ProtocolResult<Vec<u8>> {
        let payload = Self::encode_payload(msg)?;
        let len = payload.len() + 1;
        if len > max_frame {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: max_frame,
            });
        }
        let len = u32::try_from(len).map_err(|_| ProtocolError::FrameTooLarge {
            size: len,
            max: max_frame,
        })?;
        let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(msg.type_tag());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode one frame from the front of `data`. Returns (message, bytes_consumed).
    pub fn decode(data: &[u8], max_frame: usize) -> ProtocolResult<(AnvilMessage, usize)> {
        if data.len() < FRAME_HEADER_LEN {
            return Err(ProtocolError::FramingError("too short".into()));
        }
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&data[..FRAME_HEADER_LEN]);
        let (len, tag) = Self::parse_header(&header, max_frame)?;
        let total = 4 + len;
        if data.len() < total {
            return Err(ProtocolError::FramingError(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let msg = Self::decode_body(tag, &data[FRAME_HEADER_LEN..total])?;
        Ok((msg, total))
    }

    /// Encode payload only (no framing).
    pub fn encode_payload(msg: &AnvilMessage) -> ProtocolResult<Vec<u8>> {
        bincode::serialize(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode payload only (no framing).
    pub fn decode_payload(data: &[u8]) -> ProtocolResult<AnvilMessage> {
        bincode::deserialize(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }

    /// Read one frame from an async stream.
    ///
    /// Returns `Ok(None)` on a clean end of stream before any header byte.
    /// The length is checked against `max_frame` before the payload is read.
    pub async fn read_frame<R>(reader: &mut R, max_frame: usize) -> ProtocolResult<Option<AnvilMessage>>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; FRAME_HEADER_LEN];
        let first = reader.read(&mut header[..1]).await?;
        if first == 0 {
            return Ok(None);
        }
        reader.read_exact(&mut header[1..]).await.map_err(eof_as_closed)?;
        let (len, tag) = Self::parse_header(&header, max_frame)?;

        let mut payload = vec![0u8; len - 1];
        reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;
        let msg = Self::decode_body(tag, &payload)?;
        debug!(msg = msg.type_name(), bytes = len, "frame received");
        Ok(Some(msg))
    }

    /// Like [`read_frame`](Self::read_frame) but treats end of stream as an error.
    pub async fn expect_frame<R>(reader: &mut R, max_frame: usize) -> ProtocolResult<AnvilMessage>
    where
        R: AsyncRead + Unpin,
    {
        Self::read_frame(reader, max_frame)
            .await?
            .ok_or(ProtocolError::ConnectionClosed)
    }

    /// Encode and write one frame, then flush.
    pub async fn write_frame<W>(writer: &mut W, msg: &AnvilMessage, max_frame: usize) -> ProtocolResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = Self::encode(msg, max_frame)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        debug!(msg = msg.type_name(), bytes = frame.len(), "frame sent");
        Ok(())
    }

    fn parse_header(header: &[u8; FRAME_HEADER_LEN], max_frame: usize) -> ProtocolResult<(usize, u8)> {
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len < 1 {
            return Err(ProtocolError::FramingError("zero-length frame".into()));
        }
        if len > max_frame {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: max_frame,
            });
        }
        let tag = header[4];
        if !AnvilMessage::is_known_tag(tag) {
            return Err(ProtocolError::InvalidMessageType(tag));
        }
        Ok((len, tag))
    }

    fn decode_body(tag: u8, payload: &[u8]) -> ProtocolResult<AnvilMessage> {
        let msg = Self::decode_payload(payload)?;
        if msg.type_tag() != tag {
            return Err(ProtocolError::FramingError(format!(
                "tag {} does not match {} payload",
                tag,
                msg.type_name()
            )));
        }
        Ok(msg)
    }
}

fn eof_as_closed(err: std::io::Error) -> ProtocolError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionClosed
    } else {
        ProtocolError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::*;
    use anvil_refs::RefUpdate;
    use anvil_types::{CommitId, ObjectId, OperationId};

    const MAX: usize = DEFAULT_MAX_FRAME_SIZE;

    fn op(b: u8) -> OperationId {
        OperationId::new(ObjectId::from_hash([b; 32]))
    }

    fn roundtrip(msg: AnvilMessage) {
        let encoded = AnvilCodec::encode(&msg, MAX).unwrap();
        let (decoded, consumed) = AnvilCodec::decode(&encoded, MAX).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn push_request_roundtrip() {
        roundtrip(AnvilMessage::PushRequest {
            heads: vec![op(2)],
            have_ops: vec![op(1), op(2)],
            updates: vec![RefUpdate::bookmark(
                "main",
                None,
                Some(CommitId::new(ObjectId::from_hash([9; 32]))),
            )],
        });
    }

    #[test]
    fn push_result_roundtrip() {
        roundtrip(AnvilMessage::PushResult {
            status: PushStatus::Conflict,
            new_op_head: Some(op(3)),
            ref_results: vec![RefResult::Rejected {
                kind: anvil_refs::RefKind::Tag,
                name: "v1".into(),
                reason: "protected".into(),
            }],
        });
    }

    #[test]
    fn type_tags_unique_and_known() {
        let msgs = vec![
            AnvilMessage::Connect { repository: "r".into(), token: None },
            AnvilMessage::hello(),
            AnvilMessage::FetchRequest { have_ops: vec![], want_refs: vec![], depth: None },
            AnvilMessage::FetchResponse { ops_to_send: vec![], object_count: 0 },
            AnvilMessage::PushRequest { heads: vec![], have_ops: vec![], updates: vec![] },
            AnvilMessage::PushNegotiate { common_op: None, need_objects: true },
            AnvilMessage::PackData { chunk: vec![] },
            AnvilMessage::PackEnd { object_count: 0, checksum: [0; 32] },
            AnvilMessage::PushResult { status: PushStatus::Ok, new_op_head: None, ref_results: vec![] },
            AnvilMessage::Error { code: 0, message: String::new() },
        ];
        let mut tags: Vec<u8> = msgs.iter().map(|m| m.type_tag()).collect();
        assert!(tags.iter().all(|t| AnvilMessage::is_known_tag(*t)));
        let len = tags.len();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), len, "type tags should be unique");
    }

    #[test]
    fn decode_truncated() {
        let err = AnvilCodec::decode(&[0, 0, 0], MAX).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_zero_length() {
        let err = AnvilCodec::decode(&[0u8, 0, 0, 0, 0], MAX).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_rejects_tag_mismatch() {
        let mut frame = AnvilCodec::encode(&AnvilMessage::hello(), MAX).unwrap();
        frame[4] = 7;
        let err = AnvilCodec::decode(&frame, MAX).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        let mut frame = AnvilCodec::encode(&AnvilMessage::hello(), MAX).unwrap();
        frame[4] = 42;
        let err = AnvilCodec::decode(&frame, MAX).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessageType(42)));
    }

    #[test]
    fn encode_refuses_oversized() {
        let msg = AnvilMessage::PackData { chunk: vec![0; 128] };
        let err = AnvilCodec::encode(&msg, 64).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { max: 64, .. }));
    }

    #[tokio::test]
    async fn async_roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let msg = AnvilMessage::FetchRequest {
            have_ops: vec![op(7)],
            want_refs: vec!["main".into()],
            depth: Some(1),
        };
        AnvilCodec::write_frame(&mut a, &msg, MAX).await.unwrap();
        let got = AnvilCodec::expect_frame(&mut b, MAX).await.unwrap();
        assert_eq!(got, msg);
    }

    #[tokio::test]
    async fn oversized_header_rejected_before_payload() {
        // Only the header is ever written; a reader that tried to buffer the
        // declared payload would block forever instead of failing.
        let (mut a, mut b) = tokio::io::duplex(64);
        let mut header = (1u32 << 30).to_be_bytes().to_vec();
        header.push(7);
        tokio::io::AsyncWriteExt::write_all(&mut a, &header).await.unwrap();

        let err = AnvilCodec::read_frame(&mut b, MAX).await.unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { size, .. } if size == 1 << 30));
    }

    #[tokio::test]
    async fn clean_eof_is_none() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert!(AnvilCodec::read_frame(&mut b, MAX).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_is_closed() {
        let (mut a, mut b) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut a, &[0, 0, 0, 9, 2, 1]).await.unwrap();
        drop(a);
        let err = AnvilCodec::read_frame(&mut b, MAX).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }
}
