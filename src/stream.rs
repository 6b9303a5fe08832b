//! Length-exact byte stream helpers.
//!
//! Every wire record in this crate is read and written through these two
//! functions so that short reads/writes and clean peer shutdown are
//! distinguished consistently at a single place.

use std::io::{Read, Write};

use crate::error::{Result, UsbIpError};

/// Read exactly `n` bytes from `reader`.
///
/// A zero-byte read on the first attempt is reported as [`UsbIpError::EndOfStream`]
/// (the peer closed at a frame boundary); any other short read is
/// [`UsbIpError::IncompleteRead`]. Underlying I/O errors are surfaced verbatim.
pub fn read_exact<R: Read>(reader: &mut R, n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    let read_now = reader.read(&mut buf)?;
    if read_now == 0 {
        return Err(UsbIpError::EndOfStream);
    }
    if read_now != n {
        return Err(UsbIpError::IncompleteRead {
            expected: n,
            actual: read_now,
        });
    }
    Ok(buf)
}

/// Write all of `buf` to `writer`. No partial-write retry is attempted beyond
/// what a single `write` call accepts; a short write is reported as
/// [`UsbIpError::IncompleteWrite`].
pub fn write_all<W: Write>(writer: &mut W, buf: &[u8]) -> Result<()> {
    let written = writer.write(buf)?;
    if written < buf.len() {
        return Err(UsbIpError::IncompleteWrite {
            expected: buf.len(),
            actual: written,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_exact_returns_requested_bytes() {
        let mut cursor = Cursor::new(vec![1, 2, 3, 4]);
        let out = read_exact(&mut cursor, 4).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn read_exact_reports_end_of_stream_on_empty() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let err = read_exact(&mut cursor, 4).unwrap_err();
        assert!(matches!(err, UsbIpError::EndOfStream));
    }

    #[test]
    fn read_exact_reports_incomplete_on_short_read() {
        let mut cursor = Cursor::new(vec![1, 2]);
        let err = read_exact(&mut cursor, 4).unwrap_err();
        assert!(matches!(
            err,
            UsbIpError::IncompleteRead {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn write_all_round_trips_through_a_buffer() {
        let mut buf = Vec::new();
        write_all(&mut buf, &[1, 2, 3]).unwrap();
        assert_eq!(buf, vec![1, 2, 3]);
    }
}
