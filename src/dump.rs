//! Human-readable and JSON views of a box tree.
use crate::boxes::{Mp4, Mp4Box};
use crate::known_boxes::KnownBox;
use crate::util::hex_dump;
use serde::Serialize;
use std::fmt::Write as _;

/// Bytes of opaque payload shown in a text dump.
const PREVIEW_BYTES: usize = 32;

/// JSON-friendly description of one box and its subtree.
#[derive(Debug, Clone, Serialize)]
pub struct BoxSummary {
    pub offset: u64,
    pub size: u64,
    pub typ: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub full_name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<BoxSummary>,
}

impl Mp4Box {
    /// Indented tree, one line per box, starting at offset 0.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        dump_box(&mut out, self, 0, 0);
        out
    }

    pub fn summary(&self, offset: u64) -> BoxSummary {
        let (kind, decoded, children) = match self {
            Mp4Box::Container(c) => {
                let mut pos = offset + self.header_len();
                let kids = c
                    .children()
                    .iter()
                    .map(|k| {
                        let s = k.summary(pos);
                        pos += k.size();
                        s
                    })
                    .collect();
                ("container", None, kids)
            }
            Mp4Box::Leaf(l) => ("leaf", Some(l.summary()), Vec::new()),
            Mp4Box::Opaque(_) => ("opaque", None, Vec::new()),
        };
        BoxSummary {
            offset,
            size: self.size(),
            typ: self.typ().to_string(),
            uuid: match self {
                Mp4Box::Opaque(o) => o.uuid.map(hex::encode),
                _ => None,
            },
            full_name: KnownBox::from(self.typ()).full_name().to_string(),
            kind: kind.to_string(),
            decoded,
            children,
        }
    }

    fn header_len(&self) -> u64 {
        self.size() - self.payload_size()
    }
}

impl Mp4 {
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut pos = 0;
        for b in &self.boxes {
            dump_box(&mut out, b, 0, pos);
            pos += b.size();
        }
        out
    }

    pub fn summaries(&self) -> Vec<BoxSummary> {
        let mut pos = 0;
        self.boxes
            .iter()
            .map(|b| {
                let s = b.summary(pos);
                pos += b.size();
                s
            })
            .collect()
    }
}

fn dump_box(out: &mut String, b: &Mp4Box, depth: usize, offset: u64) {
    let indent = "  ".repeat(depth);
    let _ = write!(
        out,
        "{indent}{:>8} {:>10} {}",
        format!("{:#x}", offset),
        b.size(),
        b.typ()
    );
    match b {
        Mp4Box::Container(c) => {
            let _ = writeln!(out, " (container)");
            let mut pos = offset + b.header_len();
            for child in c.children() {
                dump_box(out, child, depth + 1, pos);
                pos += child.size();
            }
        }
        Mp4Box::Leaf(l) => {
            let _ = writeln!(out, " {}", l.summary());
        }
        Mp4Box::Opaque(o) => {
            match o.uuid {
                Some(u) => {
                    let _ = writeln!(out, " uuid={}", hex::encode(u));
                }
                None => out.push('\n'),
            }
            let n = o.data.len().min(PREVIEW_BYTES);
            if n > 0 {
                let data_offset = offset + b.header_len();
                for line in hex_dump(&o.data[..n], data_offset).lines() {
                    let _ = writeln!(out, "{indent}    {line}");
                }
            }
        }
    }
}
