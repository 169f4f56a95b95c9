use std::io::{self, Read};

/// Read exactly `len` bytes from `r` into a new buffer.
pub fn read_vec<R: Read + ?Sized>(r: &mut R, len: u64) -> io::Result<Vec<u8>> {
    let mut v = Vec::with_capacity(len.min(1 << 24) as usize);
    r.take(len).read_to_end(&mut v)?;
    if v.len() as u64 != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("short read: wanted {} bytes, got {}", len, v.len()),
        ));
    }
    Ok(v)
}

pub fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let offs = start_offset + (i as u64) * 16;
        let hexs: String = chunk.iter().map(|b| format!("{:02x} ", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}  {:<48}  |{}|\n", offs, hexs, ascii));
    }
    out
}
