//! A frame declaring a 200 MiB body must be rejected by its length header
//! alone, before any attempt to allocate or read the payload.

use std::io::Cursor;
use std::time::Duration;

use openwire_core::codec::errors::CodecError;
use openwire_core::codec::frame::{read_frame, DEFAULT_MAX_FRAME_SIZE};

#[tokio::test]
async fn oversized_declared_length_is_rejected_without_reading_the_body() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(200u32 * 1024 * 1024).to_be_bytes());
    // No payload bytes follow; a correct implementation never gets far
    // enough to need them.
    let mut cursor = Cursor::new(buf);

    let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE, Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        CodecError::OversizedFrameBounded(declared, max) => {
            assert_eq!(declared, 200 * 1024 * 1024);
            assert_eq!(max, DEFAULT_MAX_FRAME_SIZE);
        }
        other => panic!("expected OversizedFrameBounded, got {other:?}"),
    }
}
