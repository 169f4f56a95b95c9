mod common;

use common::*;
use mp4clip::boxes::{ContainerBox, Mp4Box};
use mp4clip::parser::decode_bytes;
use mp4clip::Error;

/// Encode a file, swapping the children of every container of type
/// `target` for what `edit` returns.
fn edited_file(target: &[u8; 4], edit: impl Fn(Vec<Mp4Box>) -> Vec<Mp4Box>) -> Vec<u8> {
    let mp4 = decode_bytes(build_file(&[ten_second_track()], 1000)).unwrap();
    rewrite_file(mp4, &|b| match b {
        Mp4Box::Container(c) if c.typ() == target => {
            let typ = c.typ();
            ContainerBox::new(typ, edit(c.into_children())).into()
        }
        other => other,
    })
}

#[test]
fn foreign_child_in_mdia_is_bad_format() {
    let data = edited_file(b"mdia", |mut kids| {
        kids.push(opaque(b"zzzz", vec![0; 4]));
        kids
    });
    match decode_bytes(data).unwrap_err() {
        Error::BadFormat {
            enclosing,
            unexpected,
        } => {
            assert_eq!(enclosing, cc(b"mdia"));
            assert_eq!(unexpected, cc(b"zzzz"));
        }
        other => panic!("expected BadFormat, got {other}"),
    }
}

#[test]
fn bad_format_message_names_both_boxes() {
    let data = edited_file(b"stbl", |mut kids| {
        kids.insert(1, opaque(b"mdat", vec![0; 4]));
        kids
    });
    let msg = decode_bytes(data).unwrap_err().to_string();
    assert!(msg.contains("stbl"), "{msg}");
    assert!(msg.contains("mdat"), "{msg}");
}

#[test]
fn missing_mandatory_child() {
    let data = edited_file(b"mdia", |kids| {
        kids.into_iter().filter(|k| k.typ() != cc(b"mdhd")).collect()
    });
    match decode_bytes(data).unwrap_err() {
        Error::MissingChild { enclosing, missing } => {
            assert_eq!(enclosing, cc(b"mdia"));
            assert_eq!(missing, cc(b"mdhd"));
        }
        other => panic!("expected MissingChild, got {other}"),
    }
}

#[test]
fn duplicate_at_most_once_child() {
    let data = edited_file(b"trak", |mut kids| {
        let tkhd = kids[0].clone();
        kids.insert(1, tkhd);
        kids
    });
    match decode_bytes(data).unwrap_err() {
        Error::DuplicateChild {
            enclosing,
            duplicate,
        } => {
            assert_eq!(enclosing, cc(b"trak"));
            assert_eq!(duplicate, cc(b"tkhd"));
        }
        other => panic!("expected DuplicateChild, got {other}"),
    }
}

#[test]
fn many_children_are_allowed() {
    let data = edited_file(b"moov", |mut kids| {
        kids.push(opaque(b"free", vec![0; 2]));
        kids.push(opaque(b"free", vec![0; 3]));
        kids
    });
    let mp4 = decode_bytes(data).unwrap();
    let frees = mp4
        .movie()
        .unwrap()
        .children()
        .iter()
        .filter(|k| k.typ() == cc(b"free"))
        .count();
    assert_eq!(frees, 2);
}

#[test]
fn child_running_past_parent_is_invalid_size() {
    let mut data = build_file(&[ten_second_track()], 1000);
    // moov starts right after the 28-byte ftyp; its first child is mvhd.
    let mvhd_size_at = 28 + 8;
    assert_eq!(&data[mvhd_size_at + 4..mvhd_size_at + 8], b"mvhd");
    data[mvhd_size_at..mvhd_size_at + 4].copy_from_slice(&0x0100_0000u32.to_be_bytes());
    match decode_bytes(data).unwrap_err() {
        Error::InvalidSize { typ, .. } => assert_eq!(typ, cc(b"mvhd")),
        other => panic!("expected InvalidSize, got {other}"),
    }
}
