//! Structured leaf boxes.
//!
//! Every structured leaf parses its payload into typed fields and writes them
//! back in the same layout. Fields that are not interpreted are kept as raw
//! bytes so re-encoding reproduces the input exactly.
use crate::boxes::{BoxHeader, FourCC, Mp4Box};
use crate::error::{Error, Result};
use crate::sample_table::{CttsBox, StcoBox, StscBox, StssBox, StszBox, SttsBox};
use crate::source::SharedSource;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Cursor, Read, Write};

/// Behaviour shared by all structured leaves.
pub trait Leaf: Sized {
    /// Parse a payload of exactly `hdr.payload_len()` bytes.
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self>;
    fn typ(&self) -> FourCC;
    fn payload_size(&self) -> u64;
    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()>;
    /// One-line description of the decoded fields, for dumps.
    fn summary(&self) -> String;
}

/// Borrow a specific leaf type out of a `LeafBox`.
pub trait FromLeaf {
    fn from_leaf(l: &LeafBox) -> Option<&Self>;
}

/// Version and flags of a "full box".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FullHeader {
    pub version: u8,
    pub flags: u32,
}

impl FullHeader {
    pub fn read<R: Read + ?Sized>(r: &mut R) -> io::Result<Self> {
        let version = r.read_u8()?;
        let flags = r.read_u24::<BigEndian>()?;
        Ok(FullHeader { version, flags })
    }

    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.version)?;
        w.write_u24::<BigEndian>(self.flags & 0x00ff_ffff)
    }

    fn check_version(&self, typ: FourCC, max: u8) -> Result<()> {
        if self.version > max {
            return Err(Error::malformed(typ, format!("unsupported version {}", self.version)));
        }
        Ok(())
    }
}

pub(crate) fn remaining(cur: &Cursor<&[u8]>) -> u64 {
    (cur.get_ref().len() as u64).saturating_sub(cur.position())
}

pub(crate) fn rest(cur: &mut Cursor<&[u8]>) -> Vec<u8> {
    let pos = cur.position() as usize;
    let v = cur.get_ref()[pos..].to_vec();
    cur.set_position(cur.get_ref().len() as u64);
    v
}

pub(crate) fn finish(typ: FourCC, cur: &Cursor<&[u8]>) -> Result<()> {
    match remaining(cur) {
        0 => Ok(()),
        n => Err(Error::malformed(typ, format!("{} trailing bytes", n))),
    }
}

/// Check that `count` entries of `entry_size` bytes exactly fill what is left.
pub(crate) fn check_count(typ: FourCC, cur: &Cursor<&[u8]>, count: u32, entry_size: u64) -> Result<usize> {
    let need = count as u64 * entry_size;
    let have = remaining(cur);
    if need != have {
        return Err(Error::malformed(
            typ,
            format!("{} entries need {} bytes, payload has {}", count, need, have),
        ));
    }
    Ok(count as usize)
}

pub(crate) fn count_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::SizeOverflow("entry count does not fit in 32 bits"))
}

fn read_vtime<R: Read + ?Sized>(r: &mut R, version: u8) -> io::Result<u64> {
    if version == 1 {
        r.read_u64::<BigEndian>()
    } else {
        r.read_u32::<BigEndian>().map(u64::from)
    }
}

fn write_vtime<W: Write + ?Sized>(w: &mut W, version: u8, v: u64, what: &'static str) -> Result<()> {
    if version == 1 {
        w.write_u64::<BigEndian>(v)?;
    } else {
        let v = u32::try_from(v).map_err(|_| Error::SizeOverflow(what))?;
        w.write_u32::<BigEndian>(v)?;
    }
    Ok(())
}

fn vtime_size(version: u8) -> u64 {
    if version == 1 { 8 } else { 4 }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FtypBox {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

impl Leaf for FtypBox {
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        if payload.len() < 8 || payload.len() % 4 != 0 {
            return Err(Error::malformed(hdr.typ, format!("payload length {}", payload.len())));
        }
        let mut cur = Cursor::new(payload);
        let mut major = [0u8; 4];
        cur.read_exact(&mut major)?;
        let minor_version = cur.read_u32::<BigEndian>()?;
        let mut compatible_brands = Vec::with_capacity((payload.len() - 8) / 4);
        while remaining(&cur) >= 4 {
            let mut b = [0u8; 4];
            cur.read_exact(&mut b)?;
            compatible_brands.push(FourCC(b));
        }
        Ok(FtypBox {
            major_brand: FourCC(major),
            minor_version,
            compatible_brands,
        })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"ftyp")
    }

    fn payload_size(&self) -> u64 {
        8 + 4 * self.compatible_brands.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.major_brand.0)?;
        w.write_u32::<BigEndian>(self.minor_version)?;
        for b in &self.compatible_brands {
            w.write_all(&b.0)?;
        }
        Ok(())
    }

    fn summary(&self) -> String {
        let brands: Vec<String> = self.compatible_brands.iter().map(|b| b.to_string()).collect();
        format!(
            "major={} minor={} compatible=[{}]",
            self.major_brand,
            self.minor_version,
            brands.join(",")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MvhdBox {
    pub full: FullHeader,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// rate, volume, matrix, pre_defined and next_track_ID.
    pub rest: Vec<u8>,
}

impl MvhdBox {
    pub fn set_duration(&mut self, duration: u64) {
        self.duration = duration;
        if duration > u32::MAX as u64 {
            self.full.version = 1;
        }
    }
}

impl Leaf for MvhdBox {
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        full.check_version(hdr.typ, 1)?;
        let creation_time = read_vtime(&mut cur, full.version)?;
        let modification_time = read_vtime(&mut cur, full.version)?;
        let timescale = cur.read_u32::<BigEndian>()?;
        let duration = read_vtime(&mut cur, full.version)?;
        Ok(MvhdBox {
            full,
            creation_time,
            modification_time,
            timescale,
            duration,
            rest: rest(&mut cur),
        })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"mvhd")
    }

    fn payload_size(&self) -> u64 {
        4 + 3 * vtime_size(self.full.version) + 4 + self.rest.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let v = self.full.version;
        self.full.write(w)?;
        write_vtime(w, v, self.creation_time, "mvhd creation time")?;
        write_vtime(w, v, self.modification_time, "mvhd modification time")?;
        w.write_u32::<BigEndian>(self.timescale)?;
        write_vtime(w, v, self.duration, "mvhd duration")?;
        w.write_all(&self.rest)?;
        Ok(())
    }

    fn summary(&self) -> String {
        format!(
            "ver={} timescale={} duration={}",
            self.full.version, self.timescale, self.duration
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TkhdBox {
    pub full: FullHeader,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub reserved: u32,
    pub duration: u64,
    /// layer, alternate_group, volume, matrix, width and height.
    pub rest: Vec<u8>,
}

impl TkhdBox {
    pub fn set_duration(&mut self, duration: u64) {
        self.duration = duration;
        if duration > u32::MAX as u64 {
            self.full.version = 1;
        }
    }
}

impl Leaf for TkhdBox {
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        full.check_version(hdr.typ, 1)?;
        let creation_time = read_vtime(&mut cur, full.version)?;
        let modification_time = read_vtime(&mut cur, full.version)?;
        let track_id = cur.read_u32::<BigEndian>()?;
        let reserved = cur.read_u32::<BigEndian>()?;
        let duration = read_vtime(&mut cur, full.version)?;
        Ok(TkhdBox {
            full,
            creation_time,
            modification_time,
            track_id,
            reserved,
            duration,
            rest: rest(&mut cur),
        })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"tkhd")
    }

    fn payload_size(&self) -> u64 {
        4 + 3 * vtime_size(self.full.version) + 8 + self.rest.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let v = self.full.version;
        self.full.write(w)?;
        write_vtime(w, v, self.creation_time, "tkhd creation time")?;
        write_vtime(w, v, self.modification_time, "tkhd modification time")?;
        w.write_u32::<BigEndian>(self.track_id)?;
        w.write_u32::<BigEndian>(self.reserved)?;
        write_vtime(w, v, self.duration, "tkhd duration")?;
        w.write_all(&self.rest)?;
        Ok(())
    }

    fn summary(&self) -> String {
        format!(
            "ver={} track_id={} duration={}",
            self.full.version, self.track_id, self.duration
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdhdBox {
    pub full: FullHeader,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// Packed ISO-639-2/T code.
    pub language: u16,
    pub pre_defined: u16,
}

impl MdhdBox {
    pub fn set_duration(&mut self, duration: u64) {
        self.duration = duration;
        if duration > u32::MAX as u64 {
            self.full.version = 1;
        }
    }

    pub fn language_code(&self) -> String {
        (0..3)
            .rev()
            .map(|i| (((self.language >> (i * 5)) & 0x1f) as u8 + 0x60) as char)
            .collect()
    }
}

impl Leaf for MdhdBox {
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        full.check_version(hdr.typ, 1)?;
        let creation_time = read_vtime(&mut cur, full.version)?;
        let modification_time = read_vtime(&mut cur, full.version)?;
        let timescale = cur.read_u32::<BigEndian>()?;
        let duration = read_vtime(&mut cur, full.version)?;
        let language = cur.read_u16::<BigEndian>()?;
        let pre_defined = cur.read_u16::<BigEndian>()?;
        finish(hdr.typ, &cur)?;
        Ok(MdhdBox {
            full,
            creation_time,
            modification_time,
            timescale,
            duration,
            language,
            pre_defined,
        })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"mdhd")
    }

    fn payload_size(&self) -> u64 {
        4 + 3 * vtime_size(self.full.version) + 4 + 4
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let v = self.full.version;
        self.full.write(w)?;
        write_vtime(w, v, self.creation_time, "mdhd creation time")?;
        write_vtime(w, v, self.modification_time, "mdhd modification time")?;
        w.write_u32::<BigEndian>(self.timescale)?;
        write_vtime(w, v, self.duration, "mdhd duration")?;
        w.write_u16::<BigEndian>(self.language)?;
        w.write_u16::<BigEndian>(self.pre_defined)?;
        Ok(())
    }

    fn summary(&self) -> String {
        format!(
            "ver={} timescale={} duration={} lang={}",
            self.full.version,
            self.timescale,
            self.duration,
            self.language_code()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HdlrBox {
    pub full: FullHeader,
    pub pre_defined: u32,
    pub handler_type: FourCC,
    pub reserved: [u8; 12],
    /// Raw name bytes, usually NUL-terminated UTF-8.
    pub name: Vec<u8>,
}

impl HdlrBox {
    pub fn name_lossy(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

impl Leaf for HdlrBox {
    fn decode(_hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        let pre_defined = cur.read_u32::<BigEndian>()?;
        let mut handler_type = [0u8; 4];
        cur.read_exact(&mut handler_type)?;
        let mut reserved = [0u8; 12];
        cur.read_exact(&mut reserved)?;
        Ok(HdlrBox {
            full,
            pre_defined,
            handler_type: FourCC(handler_type),
            reserved,
            name: rest(&mut cur),
        })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"hdlr")
    }

    fn payload_size(&self) -> u64 {
        24 + self.name.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.full.write(w)?;
        w.write_u32::<BigEndian>(self.pre_defined)?;
        w.write_all(&self.handler_type.0)?;
        w.write_all(&self.reserved)?;
        w.write_all(&self.name)?;
        Ok(())
    }

    fn summary(&self) -> String {
        format!("handler={} name={:?}", self.handler_type, self.name_lossy())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElstEntry {
    pub segment_duration: u64,
    pub media_time: i64,
    pub media_rate_integer: i16,
    pub media_rate_fraction: i16,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElstBox {
    pub full: FullHeader,
    pub entries: Vec<ElstEntry>,
}

impl ElstBox {
    /// A single normal-rate edit covering `segment_duration`, starting at
    /// `media_time` in the media timeline.
    pub fn single(segment_duration: u64, media_time: i64) -> Self {
        let wide = segment_duration > u32::MAX as u64 || i32::try_from(media_time).is_err();
        ElstBox {
            full: FullHeader {
                version: if wide { 1 } else { 0 },
                flags: 0,
            },
            entries: vec![ElstEntry {
                segment_duration,
                media_time,
                media_rate_integer: 1,
                media_rate_fraction: 0,
            }],
        }
    }

    fn entry_size(&self) -> u64 {
        if self.full.version == 1 { 20 } else { 12 }
    }
}

impl Leaf for ElstBox {
    fn decode(hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        full.check_version(hdr.typ, 1)?;
        let count = cur.read_u32::<BigEndian>()?;
        let entry_size = if full.version == 1 { 20 } else { 12 };
        let n = check_count(hdr.typ, &cur, count, entry_size)?;
        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            let (segment_duration, media_time) = if full.version == 1 {
                (cur.read_u64::<BigEndian>()?, cur.read_i64::<BigEndian>()?)
            } else {
                (
                    cur.read_u32::<BigEndian>()? as u64,
                    cur.read_i32::<BigEndian>()? as i64,
                )
            };
            entries.push(ElstEntry {
                segment_duration,
                media_time,
                media_rate_integer: cur.read_i16::<BigEndian>()?,
                media_rate_fraction: cur.read_i16::<BigEndian>()?,
            });
        }
        Ok(ElstBox { full, entries })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"elst")
    }

    fn payload_size(&self) -> u64 {
        8 + self.entry_size() * self.entries.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.full.write(w)?;
        w.write_u32::<BigEndian>(count_u32(self.entries.len())?)?;
        for e in &self.entries {
            if self.full.version == 1 {
                w.write_u64::<BigEndian>(e.segment_duration)?;
                w.write_i64::<BigEndian>(e.media_time)?;
            } else {
                let d = u32::try_from(e.segment_duration)
                    .map_err(|_| Error::SizeOverflow("elst segment duration"))?;
                let t = i32::try_from(e.media_time)
                    .map_err(|_| Error::SizeOverflow("elst media time"))?;
                w.write_u32::<BigEndian>(d)?;
                w.write_i32::<BigEndian>(t)?;
            }
            w.write_i16::<BigEndian>(e.media_rate_integer)?;
            w.write_i16::<BigEndian>(e.media_rate_fraction)?;
        }
        Ok(())
    }

    fn summary(&self) -> String {
        let list: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("{}@{}", e.segment_duration, e.media_time))
            .collect();
        format!("ver={} entries=[{}]", self.full.version, list.join(","))
    }
}

/// Sample descriptions. Only the full-box prefix is interpreted; the
/// sample-entry records are preserved as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct StsdBox {
    pub full: FullHeader,
    pub data: Vec<u8>,
}

impl StsdBox {
    pub fn entry_count(&self) -> Option<u32> {
        let b: [u8; 4] = self.data.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(b))
    }

    /// Format of the first sample entry, e.g. `avc1` or `mp4a`.
    pub fn first_format(&self) -> Option<FourCC> {
        let b: [u8; 4] = self.data.get(8..12)?.try_into().ok()?;
        Some(FourCC(b))
    }
}

impl Leaf for StsdBox {
    fn decode(_hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(payload);
        let full = FullHeader::read(&mut cur)?;
        Ok(StsdBox {
            full,
            data: rest(&mut cur),
        })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"stsd")
    }

    fn payload_size(&self) -> u64 {
        4 + self.data.len() as u64
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.full.write(w)?;
        w.write_all(&self.data)?;
        Ok(())
    }

    fn summary(&self) -> String {
        let format = self.first_format().map(|f| f.to_string()).unwrap_or_default();
        format!(
            "entries={} format={}",
            self.entry_count().unwrap_or(0),
            format
        )
    }
}

/// Where the bytes of an `mdat` payload live.
#[derive(Clone)]
pub enum MdatData {
    Inline(Vec<u8>),
    /// A span of a shared source, read only when the box is encoded.
    Source {
        source: SharedSource,
        offset: u64,
        len: u64,
    },
}

impl fmt::Debug for MdatData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MdatData::Inline(v) => write!(f, "Inline({} bytes)", v.len()),
            MdatData::Source { offset, len, .. } => {
                write!(f, "Source {{ offset: {}, len: {} }}", offset, len)
            }
        }
    }
}

impl PartialEq for MdatData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MdatData::Inline(a), MdatData::Inline(b)) => a == b,
            (
                MdatData::Source { offset: a, len: al, .. },
                MdatData::Source { offset: b, len: bl, .. },
            ) => a == b && al == bl,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdatBox {
    pub data: MdatData,
}

impl MdatBox {
    pub fn from_source(source: SharedSource, offset: u64, len: u64) -> Self {
        MdatBox {
            data: MdatData::Source { source, offset, len },
        }
    }
}

impl Leaf for MdatBox {
    fn decode(_hdr: &BoxHeader, payload: &[u8]) -> Result<Self> {
        Ok(MdatBox {
            data: MdatData::Inline(payload.to_vec()),
        })
    }

    fn typ(&self) -> FourCC {
        FourCC::new(b"mdat")
    }

    fn payload_size(&self) -> u64 {
        match &self.data {
            MdatData::Inline(v) => v.len() as u64,
            MdatData::Source { len, .. } => *len,
        }
    }

    fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        match &self.data {
            MdatData::Inline(v) => w.write_all(v)?,
            MdatData::Source { source, offset, len } => {
                let mut r = source.open_range(*offset, *len)?;
                let n = io::copy(&mut r, w)?;
                if n != *len {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("mdat: copied {} of {} bytes", n, len),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    fn summary(&self) -> String {
        match &self.data {
            MdatData::Inline(v) => format!("inline {} bytes", v.len()),
            MdatData::Source { offset, len, .. } => format!("source {}+{}", offset, len),
        }
    }
}

macro_rules! leaf_boxes {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// Closed set of structured leaf boxes.
        #[derive(Debug, Clone, PartialEq)]
        pub enum LeafBox {
            $($variant($ty),)*
        }

        impl LeafBox {
            pub fn typ(&self) -> FourCC {
                match self { $(LeafBox::$variant(b) => b.typ(),)* }
            }
            pub fn payload_size(&self) -> u64 {
                match self { $(LeafBox::$variant(b) => b.payload_size(),)* }
            }
            pub fn encode_payload<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
                match self { $(LeafBox::$variant(b) => b.encode_payload(w),)* }
            }
            pub fn summary(&self) -> String {
                match self { $(LeafBox::$variant(b) => b.summary(),)* }
            }
        }

        $(
            impl From<$ty> for LeafBox {
                fn from(b: $ty) -> Self {
                    LeafBox::$variant(b)
                }
            }
            impl From<$ty> for Mp4Box {
                fn from(b: $ty) -> Self {
                    Mp4Box::Leaf(LeafBox::$variant(b))
                }
            }
            impl FromLeaf for $ty {
                fn from_leaf(l: &LeafBox) -> Option<&Self> {
                    match l {
                        LeafBox::$variant(b) => Some(b),
                        _ => None,
                    }
                }
            }
        )*
    };
}

leaf_boxes! {
    Ftyp(FtypBox),
    Mvhd(MvhdBox),
    Tkhd(TkhdBox),
    Elst(ElstBox),
    Mdhd(MdhdBox),
    Hdlr(HdlrBox),
    Stsd(StsdBox),
    Stts(SttsBox),
    Ctts(CttsBox),
    Stss(StssBox),
    Stsc(StscBox),
    Stsz(StszBox),
    Stco(StcoBox),
    Mdat(MdatBox),
}
