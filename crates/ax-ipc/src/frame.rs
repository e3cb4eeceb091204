//! Wire framing: 4-byte big-endian length, then that many bytes of JSON.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{IpcError, IpcResult};

/// Frame size cap. Oversized frames terminate the connection.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Read one frame. Returns `Ok(None)` on clean EOF at a frame boundary.
///
/// # Errors
///
/// Returns [`IpcError::BadFrame`] for an oversized length prefix, or an I/O
/// error for a short read.
pub async fn read_frame<R>(reader: &mut R) -> IpcResult<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(IpcError::Io(e)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(IpcError::BadFrame(format!(
            "frame length {len} exceeds cap {MAX_FRAME_LEN}"
        )));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|_| IpcError::ConnectionClosed)?;
    Ok(Some(payload))
}

/// Write one frame.
///
/// # Errors
///
/// Returns [`IpcError::BadFrame`] if the payload exceeds the cap, or an I/O
/// error from the writer.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> IpcResult<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(IpcError::BadFrame(format!(
            "payload length {} exceeds cap {MAX_FRAME_LEN}",
            payload.len()
        )));
    }
    #[allow(clippy::cast_possible_truncation)]
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, br#"{"action":"memory_list"}"#)
            .await
            .unwrap();

        let mut reader = buf.as_slice();
        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(frame, br#"{"action":"memory_list"}"#);
        // Clean EOF after the frame.
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_chunks_buffer_until_complete() {
        // A frame split across arbitrary chunk boundaries still parses:
        // tokio's read_exact loops over partial reads.
        let mut buf = Vec::new();
        write_frame(&mut buf, b"0123456789").await.unwrap();

        let (mut client, mut server) = tokio::io::duplex(4);
        let write_task = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            for chunk in buf.chunks(3) {
                client.write_all(chunk).await.unwrap();
            }
        });

        let frame = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(frame, b"0123456789");
        write_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&u32::MAX.to_be_bytes());
        buf.extend_from_slice(b"junk");

        let mut reader = buf.as_slice();
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(IpcError::BadFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_connection_closed() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100u32.to_be_bytes());
        buf.extend_from_slice(b"only a few bytes");

        let mut reader = buf.as_slice();
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(IpcError::ConnectionClosed)
        ));
    }
}
