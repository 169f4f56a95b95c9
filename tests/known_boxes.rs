use mp4clip::boxes::FourCC;
use mp4clip::known_boxes::{rule_for, KnownBox, Occurs};

#[test]
fn known_box_from_ftyp() {
    let cc = FourCC(*b"ftyp");
    let kb = KnownBox::from(cc);
    assert!(matches!(kb, KnownBox::Ftyp));
    assert_eq!(kb.full_name(), "File Type Box");
}

#[test]
fn known_box_unknown_keeps_fourcc() {
    let kb = KnownBox::from(FourCC(*b"zzzz"));
    assert_eq!(kb, KnownBox::Unknown(FourCC(*b"zzzz")));
    assert_eq!(kb.full_name(), "Unknown Box");
    assert!(kb.child_rules().is_none());
}

#[test]
fn known_box_classifies_container() {
    for typ in [b"moov", b"trak", b"edts", b"mdia", b"minf", b"dinf", b"stbl"] {
        assert!(KnownBox::from(FourCC(*typ)).is_container(), "{:?}", typ);
    }
    for typ in [b"ftyp", b"mdat", b"stsd", b"udta", b"meta"] {
        assert!(!KnownBox::from(FourCC(*typ)).is_container(), "{:?}", typ);
    }
}

#[test]
fn mdia_rules() {
    let rules = KnownBox::Mdia.child_rules().unwrap();
    assert_eq!(rule_for(rules, FourCC(*b"mdhd")).unwrap().occurs, Occurs::One);
    assert_eq!(rule_for(rules, FourCC(*b"hdlr")).unwrap().occurs, Occurs::Optional);
    assert_eq!(rule_for(rules, FourCC(*b"minf")).unwrap().occurs, Occurs::Optional);
    assert!(rule_for(rules, FourCC(*b"stbl")).is_none());
}

#[test]
fn stbl_rules() {
    let rules = KnownBox::Stbl.child_rules().unwrap();
    assert_eq!(rule_for(rules, FourCC(*b"stsd")).unwrap().occurs, Occurs::One);
    assert_eq!(rule_for(rules, FourCC(*b"co64")).unwrap().occurs, Occurs::Optional);
    assert_eq!(rule_for(rules, FourCC(*b"sbgp")).unwrap().occurs, Occurs::Many);
    assert!(rule_for(rules, FourCC(*b"mdat")).is_none());
}

#[test]
fn moov_allows_many_tracks() {
    let rules = KnownBox::Moov.child_rules().unwrap();
    assert_eq!(rule_for(rules, FourCC(*b"trak")).unwrap().occurs, Occurs::Many);
    assert_eq!(rule_for(rules, FourCC(*b"mvhd")).unwrap().occurs, Occurs::One);
}

#[test]
fn unsliceable_sample_boxes() {
    for typ in [b"sbgp", b"sdtp", b"subs", b"saiz", b"saio", b"stps", b"padb", b"stsh", b"cslg"] {
        assert!(KnownBox::from(FourCC(*typ)).is_unsliceable_sample_box(), "{:?}", typ);
    }
    for typ in [b"stts", b"stsd", b"sgpd"] {
        assert!(!KnownBox::from(FourCC(*typ)).is_unsliceable_sample_box(), "{:?}", typ);
    }
}
