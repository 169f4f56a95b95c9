use crate::boxes::FourCC;

/// How often a child type may appear inside a strict container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurs {
    /// Exactly once.
    One,
    /// At most once.
    Optional,
    /// Any number of times.
    Many,
}

#[derive(Debug, Clone, Copy)]
pub struct ChildRule {
    pub typ: FourCC,
    pub occurs: Occurs,
}

const fn one(b: &[u8; 4]) -> ChildRule {
    ChildRule { typ: FourCC::new(b), occurs: Occurs::One }
}
const fn opt(b: &[u8; 4]) -> ChildRule {
    ChildRule { typ: FourCC::new(b), occurs: Occurs::Optional }
}
const fn many(b: &[u8; 4]) -> ChildRule {
    ChildRule { typ: FourCC::new(b), occurs: Occurs::Many }
}

static MOOV_RULES: &[ChildRule] = &[
    one(b"mvhd"),
    many(b"trak"),
    opt(b"iods"),
    opt(b"udta"),
    opt(b"meta"),
    opt(b"mvex"),
    many(b"free"),
    many(b"skip"),
];

static TRAK_RULES: &[ChildRule] = &[
    one(b"tkhd"),
    one(b"mdia"),
    opt(b"edts"),
    opt(b"tref"),
    opt(b"udta"),
    opt(b"meta"),
    opt(b"trgr"),
];

static EDTS_RULES: &[ChildRule] = &[opt(b"elst")];

static MDIA_RULES: &[ChildRule] = &[one(b"mdhd"), opt(b"hdlr"), opt(b"minf")];

static MINF_RULES: &[ChildRule] = &[
    opt(b"vmhd"),
    opt(b"smhd"),
    opt(b"hmhd"),
    opt(b"nmhd"),
    opt(b"sthd"),
    opt(b"gmhd"),
    opt(b"hdlr"),
    opt(b"dinf"),
    opt(b"stbl"),
];

static DINF_RULES: &[ChildRule] = &[one(b"dref")];

static STBL_RULES: &[ChildRule] = &[
    one(b"stsd"),
    opt(b"stts"),
    opt(b"ctts"),
    opt(b"cslg"),
    opt(b"stss"),
    opt(b"stps"),
    opt(b"sdtp"),
    opt(b"stsh"),
    opt(b"padb"),
    opt(b"stsc"),
    opt(b"stsz"),
    opt(b"stz2"),
    opt(b"stco"),
    opt(b"co64"),
    many(b"sgpd"),
    many(b"sbgp"),
    many(b"subs"),
    many(b"saiz"),
    many(b"saio"),
];

/// Typed view over the box types this crate knows by name.
///
/// Anything not in this list becomes `KnownBox::Unknown(fourcc)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownBox {
    Ftyp,
    Moov,
    Mdat,
    Free,
    Skip,
    Wide,
    Meta,
    Udta,
    Uuid,

    Mvhd,
    Trak,
    Mvex,
    Iods,

    Tkhd,
    Edts,
    Elst,
    Tref,
    Trgr,
    Mdia,

    Mdhd,
    Hdlr,
    Minf,

    Vmhd,
    Smhd,
    Hmhd,
    Nmhd,
    Sthd,
    Gmhd,
    Dinf,
    Dref,
    Stbl,

    Stsd,
    Stts,
    Ctts,
    Cslg,
    Stss,
    Stps,
    Sdtp,
    Stsh,
    Padb,
    Stsc,
    Stsz,
    Stz2,
    Stco,
    Co64,
    Sgpd,
    Sbgp,
    Subs,
    Saiz,
    Saio,

    Unknown(FourCC),
}

impl From<FourCC> for KnownBox {
    fn from(cc: FourCC) -> Self {
        use KnownBox::*;
        match &cc.0 {
            b"ftyp" => Ftyp,
            b"moov" => Moov,
            b"mdat" => Mdat,
            b"free" => Free,
            b"skip" => Skip,
            b"wide" => Wide,
            b"meta" => Meta,
            b"udta" => Udta,
            b"uuid" => Uuid,
            b"mvhd" => Mvhd,
            b"trak" => Trak,
            b"mvex" => Mvex,
            b"iods" => Iods,
            b"tkhd" => Tkhd,
            b"edts" => Edts,
            b"elst" => Elst,
            b"tref" => Tref,
            b"trgr" => Trgr,
            b"mdia" => Mdia,
            b"mdhd" => Mdhd,
            b"hdlr" => Hdlr,
            b"minf" => Minf,
            b"vmhd" => Vmhd,
            b"smhd" => Smhd,
            b"hmhd" => Hmhd,
            b"nmhd" => Nmhd,
            b"sthd" => Sthd,
            b"gmhd" => Gmhd,
            b"dinf" => Dinf,
            b"dref" => Dref,
            b"stbl" => Stbl,
            b"stsd" => Stsd,
            b"stts" => Stts,
            b"ctts" => Ctts,
            b"cslg" => Cslg,
            b"stss" => Stss,
            b"stps" => Stps,
            b"sdtp" => Sdtp,
            b"stsh" => Stsh,
            b"padb" => Padb,
            b"stsc" => Stsc,
            b"stsz" => Stsz,
            b"stz2" => Stz2,
            b"stco" => Stco,
            b"co64" => Co64,
            b"sgpd" => Sgpd,
            b"sbgp" => Sbgp,
            b"subs" => Subs,
            b"saiz" => Saiz,
            b"saio" => Saio,
            _ => Unknown(cc),
        }
    }
}

impl KnownBox {
    pub fn full_name(&self) -> &'static str {
        use KnownBox::*;
        match self {
            Ftyp => "File Type Box",
            Moov => "Movie Box",
            Mdat => "Media Data Box",
            Free => "Free Space Box",
            Skip => "Skip Box",
            Wide => "Wide Box",
            Meta => "Meta Box",
            Udta => "User Data Box",
            Uuid => "User Extension Box",
            Mvhd => "Movie Header Box",
            Trak => "Track Box",
            Mvex => "Movie Extends Box",
            Iods => "Object Descriptor Box",
            Tkhd => "Track Header Box",
            Edts => "Edit Box",
            Elst => "Edit List Box",
            Tref => "Track Reference Box",
            Trgr => "Track Group Box",
            Mdia => "Media Box",
            Mdhd => "Media Header Box",
            Hdlr => "Handler Reference Box",
            Minf => "Media Information Box",
            Vmhd => "Video Media Header Box",
            Smhd => "Sound Media Header Box",
            Hmhd => "Hint Media Header Box",
            Nmhd => "Null Media Header Box",
            Sthd => "Subtitle Media Header Box",
            Gmhd => "Generic Media Header Box",
            Dinf => "Data Information Box",
            Dref => "Data Reference Box",
            Stbl => "Sample Table Box",
            Stsd => "Sample Description Box",
            Stts => "Decoding Time to Sample Box",
            Ctts => "Composition Time to Sample Box",
            Cslg => "Composition to Decode Box",
            Stss => "Sync Sample Box",
            Stps => "Partial Sync Sample Box",
            Sdtp => "Independent and Disposable Samples Box",
            Stsh => "Shadow Sync Sample Box",
            Padb => "Padding Bits Box",
            Stsc => "Sample To Chunk Box",
            Stsz => "Sample Size Box",
            Stz2 => "Compact Sample Size Box",
            Stco => "Chunk Offset Box",
            Co64 => "64-bit Chunk Offset Box",
            Sgpd => "Sample Group Description Box",
            Sbgp => "Sample To Group Box",
            Subs => "Sub-Sample Information Box",
            Saiz => "Sample Auxiliary Information Sizes Box",
            Saio => "Sample Auxiliary Information Offsets Box",
            Unknown(_) => "Unknown Box",
        }
    }

    /// Child rules for containers decoded strictly. `None` for everything
    /// else, including containers such as `udta` and `meta` that are kept
    /// opaque.
    pub fn child_rules(&self) -> Option<&'static [ChildRule]> {
        use KnownBox::*;
        match self {
            Moov => Some(MOOV_RULES),
            Trak => Some(TRAK_RULES),
            Edts => Some(EDTS_RULES),
            Mdia => Some(MDIA_RULES),
            Minf => Some(MINF_RULES),
            Dinf => Some(DINF_RULES),
            Stbl => Some(STBL_RULES),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        self.child_rules().is_some()
    }

    /// Sample-indexed boxes that cannot be sliced along with the sample
    /// tables and are left out of a clip.
    pub fn is_unsliceable_sample_box(&self) -> bool {
        use KnownBox::*;
        matches!(self, Sbgp | Sdtp | Subs | Saiz | Saio | Stps | Padb | Stsh | Cslg)
    }
}

/// Find the rule for `child` inside a strict container.
pub fn rule_for(rules: &[ChildRule], child: FourCC) -> Option<&ChildRule> {
    rules.iter().find(|r| r.typ == child)
}
