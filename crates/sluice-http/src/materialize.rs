//! Draining a decoded body into a seekable buffer.

use std::io::{Seek, Write};

use sluice_core::SpooledBody;

use crate::body::BodyError;

/// Write every chunk into a [`SpooledBody`] and rewind it.
///
/// The buffer stays in memory until it holds more than `memfile_max` bytes,
/// then moves to an anonymous temporary file once. The first chunk error
/// aborts the drain; the partial buffer is dropped and its file removed.
pub fn materialize<I>(chunks: I, memfile_max: usize) -> Result<SpooledBody, BodyError>
where
    I: IntoIterator<Item = Result<Vec<u8>, BodyError>>,
{
    let mut body = SpooledBody::new(memfile_max);
    for chunk in chunks {
        body.write_all(&chunk?)?;
    }
    body.rewind()?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyConfig, ChunkedReader, LengthReader};
    use std::io::{Cursor, Read};

    fn read_all(mut body: SpooledBody) -> Vec<u8> {
        let mut out = Vec::new();
        body.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn small_body_stays_in_memory() {
        let config = BodyConfig::default();
        let chunks = LengthReader::new(Cursor::new(b"abc".to_vec()), 3, &config);
        let body = materialize(chunks, config.memfile_max()).unwrap();
        assert!(!body.is_spooled());
        assert_eq!(read_all(body), b"abc");
    }

    #[test]
    fn large_body_spills_and_round_trips() {
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let config = BodyConfig::new().with_bufsize(333);
        let chunks = LengthReader::new(Cursor::new(payload.clone()), 5000, &config);

        let body = materialize(chunks, 1024).unwrap();
        assert!(body.is_spooled());
        assert_eq!(body.len(), 5000);
        assert_eq!(read_all(body), payload);
    }

    #[test]
    fn spill_point_does_not_change_contents() {
        let payload = b"0123456789abcdef".repeat(8);
        for threshold in [0, 1, 15, 16, 17, 127, 128, 129] {
            let chunks = payload.chunks(7).map(|c| Ok(c.to_vec()));
            let body = materialize(chunks, threshold).unwrap();
            assert_eq!(body.is_spooled(), payload.len() > threshold, "threshold {threshold}");
            assert_eq!(read_all(body), payload, "threshold {threshold}");
        }
    }

    #[test]
    fn chunk_error_aborts() {
        let config = BodyConfig::default();
        let chunks = ChunkedReader::new(Cursor::new(b"3\r\nabcXX".to_vec()), &config);
        assert_eq!(
            materialize(chunks, 16).unwrap_err(),
            BodyError::MalformedChunkedBody {
                detail: "expected CRLF after chunk data"
            }
        );
    }
}
