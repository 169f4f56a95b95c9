use mp4clip::boxes::{BoxHeader, BoxKey, FourCC, Mp4Box};
use mp4clip::leaf::{FtypBox, MdatData};
use mp4clip::parser::decode_bytes;
use mp4clip::Error;
use std::io::Cursor;

fn make_minimal_file() -> Vec<u8> {
    // [ftyp box]
    // size: 20, type: "ftyp", payload: 12 bytes
    let mut v = Vec::new();
    v.extend_from_slice(&20u32.to_be_bytes());
    v.extend_from_slice(b"ftyp");
    // major brand "isom"
    v.extend_from_slice(b"isom");
    // minor version
    v.extend_from_slice(&512u32.to_be_bytes());
    // one compatible brand "isom"
    v.extend_from_slice(b"isom");
    v
}

#[test]
fn read_single_ftyp_header() {
    let data = make_minimal_file();
    let mut cur = Cursor::new(data);

    let hdr = BoxHeader::read(&mut cur).expect("header");

    assert_eq!(hdr.size, 20);
    assert_eq!(hdr.typ, FourCC(*b"ftyp"));
    assert_eq!(hdr.header_size, 8);
    assert_eq!(hdr.payload_len(), 12);
    assert_eq!(hdr.key(), BoxKey::FourCC(FourCC(*b"ftyp")));
}

#[test]
fn read_large_size_header() {
    let mut v = Vec::new();
    v.extend_from_slice(&1u32.to_be_bytes());
    v.extend_from_slice(b"free");
    v.extend_from_slice(&20u64.to_be_bytes());
    v.extend_from_slice(&[0; 4]);

    let hdr = BoxHeader::read(&mut Cursor::new(&v)).expect("header");
    assert_eq!(hdr.size, 20);
    assert_eq!(hdr.header_size, 16);
    assert_eq!(hdr.payload_len(), 4);
}

#[test]
fn read_uuid_header() {
    let uuid = [0xa5u8; 16];
    let mut v = Vec::new();
    v.extend_from_slice(&26u32.to_be_bytes());
    v.extend_from_slice(b"uuid");
    v.extend_from_slice(&uuid);
    v.extend_from_slice(&[1, 2]);

    let hdr = BoxHeader::read(&mut Cursor::new(&v)).expect("header");
    assert_eq!(hdr.header_size, 24);
    assert_eq!(hdr.uuid, Some(uuid));
    assert_eq!(hdr.key(), BoxKey::Uuid(uuid));
}

#[test]
fn header_smaller_than_itself_is_rejected() {
    let mut v = Vec::new();
    v.extend_from_slice(&4u32.to_be_bytes());
    v.extend_from_slice(b"free");

    let err = BoxHeader::read(&mut Cursor::new(&v)).unwrap_err();
    assert!(matches!(err, Error::InvalidSize { size: 4, .. }), "{err}");
}

#[test]
fn header_write_picks_compact_or_large_form() {
    let small = BoxHeader::for_payload(FourCC(*b"free"), None, 10).unwrap();
    assert_eq!(small.header_size, 8);
    assert_eq!(small.size, 18);
    let mut out = Vec::new();
    small.write(&mut out).unwrap();
    assert_eq!(out, [0, 0, 0, 18, b'f', b'r', b'e', b'e']);

    let big = BoxHeader::for_payload(FourCC(*b"mdat"), None, u32::MAX as u64).unwrap();
    assert_eq!(big.header_size, 16);
    assert_eq!(big.size, u32::MAX as u64 + 16);
    let mut out = Vec::new();
    big.write(&mut out).unwrap();
    assert_eq!(&out[..8], &[0, 0, 0, 1, b'm', b'd', b'a', b't']);
    assert_eq!(&out[8..], &(u32::MAX as u64 + 16).to_be_bytes());
}

#[test]
fn decode_minimal_ftyp() {
    let mp4 = decode_bytes(make_minimal_file()).expect("decode");
    assert_eq!(mp4.boxes.len(), 1);

    let ftyp = mp4.file_type().expect("ftyp");
    assert_eq!(ftyp.major_brand, FourCC(*b"isom"));
    assert_eq!(ftyp.minor_version, 512);
    assert_eq!(ftyp.compatible_brands, vec![FourCC(*b"isom")]);
    assert_eq!(mp4.boxes[0].size(), 20);
    assert!(mp4.boxes[0].as_leaf::<FtypBox>().is_some());
}

#[test]
fn unknown_top_level_box_is_opaque() {
    let mut v = make_minimal_file();
    v.extend_from_slice(&12u32.to_be_bytes());
    v.extend_from_slice(b"zzzz");
    v.extend_from_slice(&[9, 8, 7, 6]);

    let mp4 = decode_bytes(v).expect("decode");
    match &mp4.boxes[1] {
        Mp4Box::Opaque(o) => {
            assert_eq!(o.typ, FourCC(*b"zzzz"));
            assert_eq!(o.data, vec![9, 8, 7, 6]);
        }
        other => panic!("expected opaque box, got {:?}", other),
    }
}

#[test]
fn size_zero_extends_to_end_of_file() {
    let mut v = make_minimal_file();
    v.extend_from_slice(&0u32.to_be_bytes());
    v.extend_from_slice(b"mdat");
    v.extend_from_slice(&[0xaa; 100]);

    let mp4 = decode_bytes(v).expect("decode");
    assert_eq!(mp4.boxes.len(), 2);
    let mdat = &mp4.boxes[1];
    assert_eq!(mdat.typ(), FourCC(*b"mdat"));
    assert_eq!(mdat.size(), 108);
    match mdat {
        Mp4Box::Leaf(l) => assert_eq!(l.summary(), "source 28+100"),
        other => panic!("expected mdat leaf, got {:?}", other),
    }
}

#[test]
fn mdat_payload_is_a_source_span() {
    let mut v = make_minimal_file();
    v.extend_from_slice(&16u32.to_be_bytes());
    v.extend_from_slice(b"mdat");
    v.extend_from_slice(&[1; 8]);

    let mp4 = decode_bytes(v).expect("decode");
    let mdat = mp4.boxes[1]
        .as_leaf::<mp4clip::leaf::MdatBox>()
        .expect("mdat");
    match &mdat.data {
        MdatData::Source { offset, len, .. } => {
            assert_eq!(*offset, 28);
            assert_eq!(*len, 8);
        }
        MdatData::Inline(_) => panic!("mdat payload was read during decode"),
    }
}

#[test]
fn box_running_past_end_is_rejected() {
    let mut v = make_minimal_file();
    v.extend_from_slice(&100u32.to_be_bytes());
    v.extend_from_slice(b"free");
    v.extend_from_slice(&[0; 4]);

    let err = decode_bytes(v).unwrap_err();
    assert!(matches!(err, Error::InvalidSize { size: 100, .. }), "{err}");
}

#[test]
fn truncated_header_is_an_io_error() {
    let mut v = make_minimal_file();
    v.extend_from_slice(&[0, 0, 0]);

    let err = decode_bytes(v).unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err}");
}
