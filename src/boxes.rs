use crate::error::{Error, Result};
use crate::leaf::{FromLeaf, FtypBox, LeafBox};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(b: &[u8; 4]) -> Self {
        FourCC(*b)
    }
    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else {
            None
        }
    }
    pub fn as_str_lossy(&self) -> String {
        self.0
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }
}
impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}
impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}
impl PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        &self.0 == *other
    }
}

pub const UUID: FourCC = FourCC::new(b"uuid");

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoxKey {
    FourCC(FourCC),
    Uuid([u8; 16]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxHeader {
    pub size: u64,          // total size including header, or 0=to parent end
    pub typ: FourCC,        // 4CC or b"uuid"
    pub uuid: Option<[u8; 16]>,
    pub header_size: u64,   // 8, 16, 24 or 32
}

/// Total encoded size of a box with `payload` bytes of content.
///
/// The compact 32-bit size field is used whenever the total fits, otherwise
/// the extended 64-bit form.
pub fn boxed_size(has_uuid: bool, payload: u64) -> u64 {
    let small = if has_uuid { 24 } else { 8 };
    match payload.checked_add(small) {
        Some(total) if total <= u32::MAX as u64 => total,
        _ => payload.saturating_add(small + 8),
    }
}

impl BoxHeader {
    /// Header for a box about to be written with `payload_len` bytes of content.
    pub fn for_payload(typ: FourCC, uuid: Option<[u8; 16]>, payload_len: u64) -> Result<Self> {
        let small = if uuid.is_some() { 24 } else { 8 };
        let compact = payload_len.checked_add(small);
        let header_size = match compact {
            Some(total) if total <= u32::MAX as u64 => small,
            _ => small + 8,
        };
        let size = payload_len
            .checked_add(header_size)
            .ok_or(Error::SizeOverflow("box size exceeds 64 bits"))?;
        Ok(BoxHeader {
            size,
            typ,
            uuid,
            header_size,
        })
    }

    /// Read a header. A declared size of 0 is kept as 0; the caller resolves
    /// it against the enclosing region.
    pub fn read<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let size32 = r.read_u32::<BigEndian>()?;
        let mut typ = [0u8; 4];
        r.read_exact(&mut typ)?;
        let typ = FourCC(typ);

        let mut size = size32 as u64;
        let mut header_size = 8;
        if size32 == 1 {
            size = r.read_u64::<BigEndian>()?;
            header_size += 8;
        }

        let mut uuid = None;
        if typ == UUID {
            let mut u = [0u8; 16];
            r.read_exact(&mut u)?;
            uuid = Some(u);
            header_size += 16;
        }

        if size != 0 && size < header_size {
            return Err(Error::InvalidSize { typ, size });
        }
        log::trace!("header {} size {} header_size {}", typ, size, header_size);

        Ok(BoxHeader {
            size,
            typ,
            uuid,
            header_size,
        })
    }

    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let uuid_len = if self.uuid.is_some() { 16 } else { 0 };
        if self.header_size == 16 + uuid_len {
            w.write_u32::<BigEndian>(1)?;
            w.write_all(&self.typ.0)?;
            w.write_u64::<BigEndian>(self.size)?;
        } else {
            let size = u32::try_from(self.size)
                .map_err(|_| Error::SizeOverflow("box size does not fit in 32-bit header"))?;
            w.write_u32::<BigEndian>(size)?;
            w.write_all(&self.typ.0)?;
        }
        if let Some(u) = &self.uuid {
            w.write_all(u)?;
        }
        Ok(())
    }

    pub fn payload_len(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }

    pub fn key(&self) -> BoxKey {
        match self.uuid {
            Some(u) => BoxKey::Uuid(u),
            None => BoxKey::FourCC(self.typ),
        }
    }
}

/// A box whose payload is kept as raw bytes and written back verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueBox {
    pub typ: FourCC,
    pub uuid: Option<[u8; 16]>,
    pub data: Vec<u8>,
}

/// A box holding an ordered list of child boxes.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerBox {
    typ: FourCC,
    children: Vec<Mp4Box>,
}

impl ContainerBox {
    pub fn new(typ: FourCC, children: Vec<Mp4Box>) -> Self {
        ContainerBox { typ, children }
    }

    pub fn typ(&self) -> FourCC {
        self.typ
    }

    pub fn children(&self) -> &[Mp4Box] {
        &self.children
    }

    pub fn into_children(self) -> Vec<Mp4Box> {
        self.children
    }

    pub fn payload_size(&self) -> u64 {
        self.children
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(c.size()))
    }

    /// Total encoded size, header included.
    pub fn size(&self) -> u64 {
        boxed_size(false, self.payload_size())
    }

    /// First direct child of the given type.
    pub fn child(&self, typ: &[u8; 4]) -> Option<&Mp4Box> {
        self.children.iter().find(|c| c.typ() == typ)
    }

    /// First direct child container of the given type.
    pub fn container(&self, typ: &[u8; 4]) -> Option<&ContainerBox> {
        self.child(typ).and_then(Mp4Box::as_container)
    }

    pub fn containers<'a>(&'a self, typ: &'a [u8; 4]) -> impl Iterator<Item = &'a ContainerBox> + 'a {
        self.children
            .iter()
            .filter(move |c| c.typ() == typ)
            .filter_map(Mp4Box::as_container)
    }

    /// Walk down a chain of nested containers, e.g. `[b"mdia", b"minf", b"stbl"]`.
    pub fn container_path(&self, path: &[&[u8; 4]]) -> Option<&ContainerBox> {
        path.iter().try_fold(self, |c, typ| c.container(typ))
    }

    /// First direct child decoded as the structured leaf `T`.
    pub fn leaf<T: FromLeaf>(&self) -> Option<&T> {
        self.children.iter().find_map(|c| match c {
            Mp4Box::Leaf(l) => T::from_leaf(l),
            _ => None,
        })
    }
}

/// Any box: a container, a structured leaf or an opaque leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Mp4Box {
    Container(ContainerBox),
    Leaf(LeafBox),
    Opaque(OpaqueBox),
}

impl Mp4Box {
    pub fn typ(&self) -> FourCC {
        match self {
            Mp4Box::Container(c) => c.typ,
            Mp4Box::Leaf(l) => l.typ(),
            Mp4Box::Opaque(o) => o.typ,
        }
    }

    fn uuid(&self) -> Option<[u8; 16]> {
        match self {
            Mp4Box::Opaque(o) => o.uuid,
            _ => None,
        }
    }

    pub fn payload_size(&self) -> u64 {
        match self {
            Mp4Box::Container(c) => c.payload_size(),
            Mp4Box::Leaf(l) => l.payload_size(),
            Mp4Box::Opaque(o) => o.data.len() as u64,
        }
    }

    /// Total encoded size, header included.
    pub fn size(&self) -> u64 {
        match self {
            Mp4Box::Container(c) => c.size(),
            _ => boxed_size(self.uuid().is_some(), self.payload_size()),
        }
    }

    pub fn header(&self) -> Result<BoxHeader> {
        BoxHeader::for_payload(self.typ(), self.uuid(), self.payload_size())
    }

    /// Write the box. Exactly `self.size()` bytes are written on success.
    pub fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        self.header()?.write(w)?;
        match self {
            Mp4Box::Container(c) => {
                for child in &c.children {
                    child.encode(w)?;
                }
                Ok(())
            }
            Mp4Box::Leaf(l) => l.encode_payload(w),
            Mp4Box::Opaque(o) => {
                w.write_all(&o.data)?;
                Ok(())
            }
        }
    }

    pub fn as_container(&self) -> Option<&ContainerBox> {
        match self {
            Mp4Box::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_leaf<T: FromLeaf>(&self) -> Option<&T> {
        match self {
            Mp4Box::Leaf(l) => T::from_leaf(l),
            _ => None,
        }
    }
}

impl From<ContainerBox> for Mp4Box {
    fn from(c: ContainerBox) -> Self {
        Mp4Box::Container(c)
    }
}

impl From<OpaqueBox> for Mp4Box {
    fn from(o: OpaqueBox) -> Self {
        Mp4Box::Opaque(o)
    }
}

impl From<LeafBox> for Mp4Box {
    fn from(l: LeafBox) -> Self {
        Mp4Box::Leaf(l)
    }
}

/// A decoded file: the ordered top-level boxes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mp4 {
    pub boxes: Vec<Mp4Box>,
}

impl Mp4 {
    pub fn size(&self) -> u64 {
        self.boxes.iter().fold(0u64, |acc, b| acc.saturating_add(b.size()))
    }

    pub fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        for b in &self.boxes {
            b.encode(w)?;
        }
        Ok(())
    }

    pub fn file_type(&self) -> Option<&FtypBox> {
        self.boxes.iter().find_map(|b| b.as_leaf::<FtypBox>())
    }

    pub fn movie(&self) -> Option<&ContainerBox> {
        self.boxes
            .iter()
            .filter(|b| b.typ() == b"moov")
            .find_map(Mp4Box::as_container)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &ContainerBox> {
        self.movie().into_iter().flat_map(|m| m.containers(b"trak"))
    }
}
