//! Bounded-buffer stream copying.

use std::io::{self, ErrorKind, Read, Write};

/// Default chunk size for stream copies (8 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Copy everything from `reader` to `writer` through a buffer of at most
/// `chunk_size` bytes, then flush. Returns the number of bytes copied.
pub fn copy_stream<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    Ok(total)
}
