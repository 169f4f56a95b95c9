use crate::boxes::{BoxHeader, ContainerBox, FourCC, Mp4, Mp4Box, OpaqueBox};
use crate::error::{Error, Result};
use crate::known_boxes::{ChildRule, KnownBox, Occurs};
use crate::leaf::MdatBox;
use crate::registry::{default_registry, Registry};
use crate::source::{ByteRangeSource, MemorySource, SharedSource};
use crate::util::read_vec;
use std::io::{self, Read};
use std::sync::{Arc, OnceLock};

// size + type + largesize + uuid
const MAX_HEADER: u64 = 32;

fn builtin_registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(default_registry)
}

/// Decode a whole file with the built-in decoders.
pub fn decode(source: SharedSource, size: u64) -> Result<Mp4> {
    decode_with(source, size, builtin_registry())
}

/// Decode an in-memory file.
pub fn decode_bytes(data: impl Into<Arc<[u8]>>) -> Result<Mp4> {
    let src = MemorySource::new(data);
    let size = src.size();
    decode(Arc::new(src), size)
}

/// Decode the first `size` bytes of `source` into top-level boxes.
///
/// `mdat` payloads are not read; they are recorded as spans of `source`.
pub fn decode_with(source: SharedSource, size: u64, registry: &Registry) -> Result<Mp4> {
    let mut boxes = Vec::new();
    let mut pos = 0u64;
    while pos < size {
        let left = size - pos;
        let hdr = {
            let mut r = source.open_range(pos, left.min(MAX_HEADER))?;
            BoxHeader::read(&mut r)?
        };
        let box_size = if hdr.size == 0 { left } else { hdr.size };
        if box_size > left || box_size < hdr.header_size {
            return Err(Error::InvalidSize {
                typ: hdr.typ,
                size: hdr.size,
            });
        }
        let payload_start = pos + hdr.header_size;
        let payload_len = box_size - hdr.header_size;

        let b: Mp4Box = if hdr.typ == b"mdat" {
            log::trace!("mdat at {} len {}", payload_start, payload_len);
            MdatBox::from_source(source.clone(), payload_start, payload_len).into()
        } else {
            let mut r = source.open_range(payload_start, payload_len)?;
            decode_body(&hdr, payload_len, &mut r, registry)?
        };
        boxes.push(b);
        pos += box_size;
    }
    Ok(Mp4 { boxes })
}

/// Decode one box's payload from `r`, which yields exactly `len` bytes.
fn decode_body(hdr: &BoxHeader, len: u64, r: &mut dyn Read, registry: &Registry) -> Result<Mp4Box> {
    if hdr.uuid.is_none() {
        if let Some(rules) = KnownBox::from(hdr.typ).child_rules() {
            let children = parse_children(hdr.typ, rules, r, len, registry)?;
            return Ok(ContainerBox::new(hdr.typ, children).into());
        }
    }

    let payload = read_vec(r, len)?;
    match registry.decode(&hdr.key(), hdr, &payload) {
        Some(res) => res,
        None => Ok(OpaqueBox {
            typ: hdr.typ,
            uuid: hdr.uuid,
            data: payload,
        }
        .into()),
    }
}

/// Decode the children of a strict container whose payload is `len` bytes.
pub fn parse_children(
    enclosing: FourCC,
    rules: &[ChildRule],
    r: &mut dyn Read,
    len: u64,
    registry: &Registry,
) -> Result<Vec<Mp4Box>> {
    let mut kids = Vec::new();
    let mut seen = vec![0usize; rules.len()];
    let mut left = len;

    while left > 0 {
        let hdr = BoxHeader::read(&mut (&mut *r).take(left))?;
        let size = if hdr.size == 0 { left } else { hdr.size };
        if size > left {
            return Err(Error::InvalidSize {
                typ: hdr.typ,
                size: hdr.size,
            });
        }

        let idx = rules
            .iter()
            .position(|rule| rule.typ == hdr.typ)
            .ok_or(Error::BadFormat {
                enclosing,
                unexpected: hdr.typ,
            })?;
        seen[idx] += 1;
        if seen[idx] > 1 && rules[idx].occurs != Occurs::Many {
            return Err(Error::DuplicateChild {
                enclosing,
                duplicate: hdr.typ,
            });
        }

        let payload_len = size - hdr.header_size;
        let mut sub = (&mut *r).take(payload_len);
        kids.push(decode_body(&hdr, payload_len, &mut sub, registry)?);
        io::copy(&mut sub, &mut io::sink())?;
        left -= size;
    }

    for (rule, n) in rules.iter().zip(&seen) {
        if rule.occurs == Occurs::One && *n == 0 {
            return Err(Error::MissingChild {
                enclosing,
                missing: rule.typ,
            });
        }
    }
    Ok(kids)
}
