//! Sample table leaves: `stts`, `ctts`, `stss`, `stsc`, `stsz`, `stco` / `co64`.
//!
//! Each table is read strictly. The declared entry count must describe the
//! payload exactly, otherwise decoding fails with `Error::Malformed`.
use crate::boxes::{BoxHeader, FourCC};
use crate::error::{Error, Result};
use crate::leaf::{check_count, count_u32, finish, FullHeader, Leaf};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Decoding time to sample.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SttsBox {
    pub full: FullHeader,
    pub entries: Vec<SttsEntry>,
}

impl SttsBox {
    pub fn sample_count(&self) -> u64 {
        self.entries.iter().map(|e| e.sample_count as u64).sum()
    }
}

impl Leaf for SttsBox {
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        let count = cur.read_u32::<BigEndian>()?;
        let n = check_count(hdr.typ, &cur, count, 8)?;
        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            entries.push(SttsEntry {
                sample_count: cur.read_u32::<BigEndian>()?,
                sample_delta: cur.read_u32::<BigEndian>()?,
            });
        }
        Ok(SttsBox { full, entries })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"stts")
    }

    fn payload_size(&self) -> u64 {
        8 + 8 * self.entries.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.full.write(w)?;
        w.write_u32::<BigEndian>(count_u32(self.entries.len())?)?;
        for e in &self.entries {
            w.write_u32::<BigEndian>(e.sample_count)?;
            w.write_u32::<BigEndian>(e.sample_delta)?;
        }
        Ok(())
    }

    fn summary(&self) -> String {
        format!("entries={} samples={}", self.entries.len(), self.sample_count())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CttsEntry {
    pub sample_count: u32,
    /// Unsigned in version 0, signed in version 1. Stored as the same 32 bits.
    pub sample_offset: i32,
}

/// Composition time to sample.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CttsBox {
    pub full: FullHeader,
    pub entries: Vec<CttsEntry>,
}

impl Leaf for CttsBox {
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        let count = cur.read_u32::<BigEndian>()?;
        let n = check_count(hdr.typ, &cur, count, 8)?;
        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            entries.push(CttsEntry {
                sample_count: cur.read_u32::<BigEndian>()?,
                sample_offset: cur.read_i32::<BigEndian>()?,
            });
        }
        Ok(CttsBox { full, entries })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"ctts")
    }

    fn payload_size(&self) -> u64 {
        8 + 8 * self.entries.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.full.write(w)?;
        w.write_u32::<BigEndian>(count_u32(self.entries.len())?)?;
        for e in &self.entries {
            w.write_u32::<BigEndian>(e.sample_count)?;
            w.write_i32::<BigEndian>(e.sample_offset)?;
        }
        Ok(())
    }

    fn summary(&self) -> String {
        format!("ver={} entries={}", self.full.version, self.entries.len())
    }
}

/// Sync samples, as 1-based sample numbers in increasing order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StssBox {
    pub full: FullHeader,
    pub entries: Vec<u32>,
}

impl Leaf for StssBox {
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        let count = cur.read_u32::<BigEndian>()?;
        let n = check_count(hdr.typ, &cur, count, 4)?;
        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            entries.push(cur.read_u32::<BigEndian>()?);
        }
        Ok(StssBox { full, entries })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"stss")
    }

    fn payload_size(&self) -> u64 {
        8 + 4 * self.entries.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.full.write(w)?;
        w.write_u32::<BigEndian>(count_u32(self.entries.len())?)?;
        for e in &self.entries {
            w.write_u32::<BigEndian>(*e)?;
        }
        Ok(())
    }

    fn summary(&self) -> String {
        format!("entries={}", self.entries.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StscEntry {
    /// 1-based index of the first chunk of this run.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Sample to chunk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StscBox {
    pub full: FullHeader,
    pub entries: Vec<StscEntry>,
}

impl Leaf for StscBox {
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        let count = cur.read_u32::<BigEndian>()?;
        let n = check_count(hdr.typ, &cur, count, 12)?;
        let mut entries: Vec<StscEntry> = Vec::with_capacity(n);
        for _ in 0..n {
            let e = StscEntry {
                first_chunk: cur.read_u32::<BigEndian>()?,
                samples_per_chunk: cur.read_u32::<BigEndian>()?,
                sample_description_index: cur.read_u32::<BigEndian>()?,
            };
            let floor = entries.last().map(|p| p.first_chunk.saturating_add(1)).unwrap_or(1);
            if e.first_chunk < floor {
                return Err(Error::malformed(
                    hdr.typ,
                    format!("first_chunk {} out of order", e.first_chunk),
                ));
            }
            entries.push(e);
        }
        Ok(StscBox { full, entries })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"stsc")
    }

    fn payload_size(&self) -> u64 {
        8 + 12 * self.entries.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.full.write(w)?;
        w.write_u32::<BigEndian>(count_u32(self.entries.len())?)?;
        for e in &self.entries {
            w.write_u32::<BigEndian>(e.first_chunk)?;
            w.write_u32::<BigEndian>(e.samples_per_chunk)?;
            w.write_u32::<BigEndian>(e.sample_description_index)?;
        }
        Ok(())
    }

    fn summary(&self) -> String {
        format!("entries={}", self.entries.len())
    }
}

/// Sample sizes. With a non-zero `sample_size` every sample has that size
/// and `entry_sizes` is empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StszBox {
    pub full: FullHeader,
    pub sample_size: u32,
    pub sample_count: u32,
    pub entry_sizes: Vec<u32>,
}

impl StszBox {
    pub fn with_sizes(entry_sizes: Vec<u32>) -> Result<Self> {
        Ok(StszBox {
            full: FullHeader::default(),
            sample_size: 0,
            sample_count: count_u32(entry_sizes.len())?,
            entry_sizes,
        })
    }

    /// Size of the 0-based sample `i`.
    pub fn size_of(&self, i: usize) -> Option<u32> {
        if self.sample_size != 0 {
            (i < self.sample_count as usize).then_some(self.sample_size)
        } else {
            self.entry_sizes.get(i).copied()
        }
    }
}

impl Leaf for StszBox {
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        let sample_size = cur.read_u32::<BigEndian>()?;
        let sample_count = cur.read_u32::<BigEndian>()?;
        let mut entry_sizes = Vec::new();
        if sample_size == 0 {
            let n = check_count(hdr.typ, &cur, sample_count, 4)?;
            entry_sizes.reserve_exact(n);
            for _ in 0..n {
                entry_sizes.push(cur.read_u32::<BigEndian>()?);
            }
        }
        finish(hdr.typ, &cur)?;
        Ok(StszBox {
            full,
            sample_size,
            sample_count,
            entry_sizes,
        })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"stsz")
    }

    fn payload_size(&self) -> u64 {
        12 + 4 * self.entry_sizes.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.full.write(w)?;
        w.write_u32::<BigEndian>(self.sample_size)?;
        if self.sample_size == 0 {
            w.write_u32::<BigEndian>(count_u32(self.entry_sizes.len())?)?;
            for s in &self.entry_sizes {
                w.write_u32::<BigEndian>(*s)?;
            }
        } else {
            w.write_u32::<BigEndian>(self.sample_count)?;
        }
        Ok(())
    }

    fn summary(&self) -> String {
        format!("sample_size={} samples={}", self.sample_size, self.sample_count)
    }
}

/// Chunk offsets. One type serves both `stco` (32-bit) and `co64` (64-bit);
/// `large` selects the encoding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StcoBox {
    pub large: bool,
    pub full: FullHeader,
    pub entries: Vec<u64>,
}

impl StcoBox {
    pub fn new(large: bool, entries: Vec<u64>) -> Self {
        StcoBox {
            large,
            full: FullHeader::default(),
            entries,
        }
    }
}

impl Leaf for StcoBox {
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let large = hdr.typ == b"co64";
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        let count = cur.read_u32::<BigEndian>()?;
        let n = check_count(hdr.typ, &cur, count, if large { 8 } else { 4 })?;
        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            let off = if large {
                cur.read_u64::<BigEndian>()?
            } else {
                cur.read_u32::<BigEndian>()? as u64
            };
            entries.push(off);
        }
        Ok(StcoBox { large, full, entries })
    }

    fn typ(&self) -> FourCC {
        if self.large {
            FourCC::new(b"co64")
        } else {
            FourCC::new(b"stco")
        }
    }

    fn payload_size(&self) -> u64 {
        let w = if self.large { 8 } else { 4 };
        8 + w * self.entries.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.full.write(w)?;
        w.write_u32::<BigEndian>(count_u32(self.entries.len())?)?;
        for &off in &self.entries {
            if self.large {
                w.write_u64::<BigEndian>(off)?;
            } else {
                let off = u32::try_from(off)
                    .map_err(|_| Error::SizeOverflow("chunk offset does not fit in stco"))?;
                w.write_u32::<BigEndian>(off)?;
            }
        }
        Ok(())
    }

    fn summary(&self) -> String {
        format!("chunks={}", self.entries.len())
    }
}
