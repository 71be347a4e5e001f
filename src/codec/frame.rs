//! OpenWire frame-level read/write helpers.
//!
//! Every frame on the wire is `u32 length` followed by `length` bytes: a
//! `u8` type tag and the per-type body. `length` excludes the length field
//! itself. This module owns only that outer envelope; the per-command body
//! is the responsibility of [`crate::codec`].

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::codec::errors::CodecError;

/// Default cap on a frame's declared length (§4.C).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 100 * 1024 * 1024;

/// Default I/O timeout for a single frame read/write.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

async fn io_with_timeout<F, T>(timeout_dur: Duration, operation: F) -> Result<T, CodecError>
where
    F: std::future::Future<Output = std::io::Result<T>>,
{
    timeout(timeout_dur, operation)
        .await
        .map_err(|_| CodecError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "frame I/O timed out")))?
        .map_err(Into::into)
}

/// Read one length-prefixed frame's body (type tag + payload) from `r`.
///
/// Rejects frames whose declared length exceeds `max_frame_size` without
/// allocating the payload, per testable property S6.
///
/// # Errors
/// Returns [`CodecError::OversizedFrameBounded`] if the declared length
/// exceeds `max_frame_size`, or an I/O error on read failure.
pub async fn read_frame<R: AsyncRead + Unpin>(
    r: &mut R,
    max_frame_size: u32,
    io_timeout: Duration,
) -> Result<Vec<u8>, CodecError> {
    let mut len_buf = [0u8; 4];
    io_with_timeout(io_timeout, r.read_exact(&mut len_buf)).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > max_frame_size {
        return Err(CodecError::OversizedFrameBounded(len, max_frame_size));
    }
    let mut body = vec![0u8; len as usize];
    io_with_timeout(io_timeout, r.read_exact(&mut body)).await?;
    Ok(body)
}

/// Write one length-prefixed frame containing `body` to `w`.
///
/// # Errors
/// Returns [`CodecError::OversizedFrame`] if `body` exceeds `u32::MAX`
/// bytes, or an I/O error on write failure.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    w: &mut W,
    body: &[u8],
    io_timeout: Duration,
) -> Result<(), CodecError> {
    let len = u32::try_from(body.len()).map_err(|_| CodecError::OversizedFrame)?;
    io_with_timeout(io_timeout, async {
        w.write_all(&len.to_be_bytes()).await?;
        w.write_all(body).await
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello", DEFAULT_IO_TIMEOUT).await.expect("write");
        let mut cur = Cursor::new(buf);
        let body = read_frame(&mut cur, DEFAULT_MAX_FRAME_SIZE, DEFAULT_IO_TIMEOUT)
            .await
            .expect("read");
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn self_delimits_two_concatenated_frames() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"first", DEFAULT_IO_TIMEOUT).await.expect("write");
        write_frame(&mut buf, b"second", DEFAULT_IO_TIMEOUT).await.expect("write");
        let mut cur = Cursor::new(buf);
        let first = read_frame(&mut cur, DEFAULT_MAX_FRAME_SIZE, DEFAULT_IO_TIMEOUT)
            .await
            .expect("read first");
        assert_eq!(first, b"first");
        let second = read_frame(&mut cur, DEFAULT_MAX_FRAME_SIZE, DEFAULT_IO_TIMEOUT)
            .await
            .expect("read second");
        assert_eq!(second, b"second");
    }

    #[tokio::test]
    async fn rejects_oversized_frame_without_allocating() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(200u32 * 1024 * 1024).to_be_bytes());
        let mut cur = Cursor::new(buf);
        let err = read_frame(&mut cur, DEFAULT_MAX_FRAME_SIZE, DEFAULT_IO_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, CodecError::OversizedFrameBounded(_, _)));
    }
}
