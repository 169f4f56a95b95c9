use crate::boxes::FourCC;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad format: {enclosing} cannot contain {unexpected}")]
    BadFormat { enclosing: FourCC, unexpected: FourCC },
    #[error("bad format: {enclosing} is missing mandatory child {missing}")]
    MissingChild { enclosing: FourCC, missing: FourCC },
    #[error("bad format: {enclosing} contains more than one {duplicate}")]
    DuplicateChild { enclosing: FourCC, duplicate: FourCC },
    #[error("invalid box size {size} for {typ}")]
    InvalidSize { typ: FourCC, size: u64 },
    #[error("malformed {typ}: {reason}")]
    Malformed { typ: FourCC, reason: String },
    #[error("no track has samples at or after the requested start time")]
    EmptyClip,
    #[error("size overflow: {0}")]
    SizeOverflow(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn malformed(typ: FourCC, reason: impl Into<String>) -> Self {
        Error::Malformed {
            typ,
            reason: reason.into(),
        }
    }
}
