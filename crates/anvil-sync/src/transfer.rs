//! Moving packs across a session as `PackData` chunks and a `PackEnd`.

use anvil_pack::{PackEntry, PackReader, PackSummary, PackWriter};
use anvil_protocol::{AnvilCodec, AnvilMessage};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Serialize `entries` into a pack off the async runtime.
pub async fn build_pack(entries: Vec<PackEntry>) -> SyncResult<(Vec<u8>, PackSummary)> {
    let built = tokio::task::spawn_blocking(move || {
        let mut writer = PackWriter::new();
        for entry in entries {
            writer.add_entry(entry);
        }
        writer.finish()
    })
    .await??;
    Ok(built)
}

/// Stream a finished pack as chunks followed by its summary.
pub async fn send_pack<W>(
    writer: &mut W,
    pack: &[u8],
    summary: PackSummary,
    config: &SyncConfig,
) -> SyncResult<()>
where
    W: AsyncWrite + Unpin,
{
    let chunk_size = config.effective_chunk_size();
    let mut chunks = 0usize;
    for chunk in pack.chunks(chunk_size) {
        let msg = AnvilMessage::PackData {
            chunk: chunk.to_vec(),
        };
        AnvilCodec::write_frame(writer, &msg, config.max_frame_size).await?;
        chunks += 1;
    }
    let end = AnvilMessage::PackEnd {
        object_count: summary.object_count,
        checksum: summary.checksum,
    };
    AnvilCodec::write_frame(writer, &end, config.max_frame_size).await?;
    debug!(
        bytes = pack.len(),
        chunks,
        objects = summary.object_count,
        "sent pack"
    );
    Ok(())
}

/// Collect `PackData` chunks until `PackEnd`, enforcing the pack size limit
/// and checking the announced summary against the pack itself.
pub async fn receive_pack<R>(reader: &mut R, config: &SyncConfig) -> SyncResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::new();
    loop {
        match AnvilCodec::expect_frame(reader, config.max_frame_size).await? {
            AnvilMessage::PackData { chunk } => {
                if buf.len() + chunk.len() > config.max_pack_size {
                    return Err(SyncError::PackTooLarge {
                        max: config.max_pack_size,
                    });
                }
                buf.extend_from_slice(&chunk);
            }
            AnvilMessage::PackEnd {
                object_count,
                checksum,
            } => {
                let summary = PackReader::new().summary(&buf)?;
                if summary.object_count != object_count || summary.checksum != checksum {
                    return Err(SyncError::PackSummaryMismatch(format!(
                        "announced {object_count} objects, pack holds {}",
                        summary.object_count
                    )));
                }
                debug!(bytes = buf.len(), objects = object_count, "received pack");
                return Ok(buf.to_vec());
            }
            AnvilMessage::Error { code, message } => {
                return Err(SyncError::Remote { code, message });
            }
            other => {
                return Err(anvil_protocol::ProtocolError::UnexpectedMessage {
                    expected: "PackData",
                    got: other.type_name(),
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_store::{ObjectKind, StoredObject};

    fn entries(n: u8) -> Vec<PackEntry> {
        (0..n)
            .map(|i| PackEntry::from_object(StoredObject::new(ObjectKind::File, vec![i; 300])))
            .collect()
    }

    #[tokio::test]
    async fn chunked_pack_roundtrip() {
        let config = SyncConfig {
            pack_chunk_size: 50,
            ..SyncConfig::default()
        };
        let (pack, summary) = build_pack(entries(5)).await.unwrap();
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);

        let send_config = config.clone();
        let sender = tokio::spawn(async move {
            send_pack(&mut a, &pack, summary, &send_config).await.unwrap();
            pack
        });
        let received = receive_pack(&mut b, &config).await.unwrap();
        let sent = sender.await.unwrap();
        assert_eq!(received, sent);
        assert_eq!(PackReader::new().read_all(&received).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn oversized_pack_is_refused() {
        let config = SyncConfig {
            pack_chunk_size: 16,
            max_pack_size: 32,
            ..SyncConfig::default()
        };
        let (pack, summary) = build_pack(entries(3)).await.unwrap();
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);
        let send_config = config.clone();
        tokio::spawn(async move {
            // The receiver hangs up part way; the send error is expected.
            let _ = send_pack(&mut a, &pack, summary, &send_config).await;
        });
        let err = receive_pack(&mut b, &config).await.unwrap_err();
        assert!(matches!(err, SyncError::PackTooLarge { max: 32 }));
    }

    #[tokio::test]
    async fn lying_summary_is_refused() {
        let config = SyncConfig::default();
        let (pack, mut summary) = build_pack(entries(2)).await.unwrap();
        summary.object_count = 3;
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);
        send_pack(&mut a, &pack, summary, &config).await.unwrap();
        let err = receive_pack(&mut b, &config).await.unwrap_err();
        assert!(matches!(err, SyncError::PackSummaryMismatch(_)));
    }
}
