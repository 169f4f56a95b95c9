use crate::boxes::{BoxHeader, BoxKey, FourCC, Mp4Box};
use crate::error::Result;
use crate::leaf::{ElstBox, FtypBox, HdlrBox, Leaf, LeafBox, MdhdBox, MvhdBox, StsdBox, TkhdBox};
use crate::sample_table::{CttsBox, StcoBox, StscBox, StssBox, StszBox, SttsBox};
use std::collections::HashMap;
use std::marker::PhantomData;

/// Decodes the payload of one box type into a finished `Mp4Box`.
///
/// `payload` is exactly `hdr.payload_len()` bytes.
pub trait BoxDecoder: Send + Sync {
    fn decode(&self, hdr: &BoxHeader, payload: &[u8]) -> Result<Mp4Box>;
}

impl<F> BoxDecoder for F
where
    F: Fn(&BoxHeader, &[u8]) -> Result<Mp4Box> + Send + Sync,
{
    fn decode(&self, hdr: &BoxHeader, payload: &[u8]) -> Result<Mp4Box> {
        self(hdr, payload)
    }
}

/// Decoder for one of the built-in structured leaves.
pub struct LeafDecoder<T>(PhantomData<fn() -> T>);

impl<T> LeafDecoder<T> {
    pub fn new() -> Self {
        LeafDecoder(PhantomData)
    }
}

impl<T> Default for LeafDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Leaf + Into<LeafBox>> BoxDecoder for LeafDecoder<T> {
    fn decode(&self, hdr: &BoxHeader, payload: &[u8]) -> Result<Mp4Box> {
        T::decode(hdr, payload).map(|b| Mp4Box::Leaf(b.into()))
    }
}

/// Registry of leaf decoders keyed by box type.
///
/// Boxes without a registered decoder are kept opaque.
#[derive(Default)]
pub struct Registry {
    map: HashMap<BoxKey, BoxDecoderEntry>,
}

struct BoxDecoderEntry {
    inner: Box<dyn BoxDecoder>,
    name: String,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Return a new registry with the given decoder added.
    ///
    /// `name` is human-readable and used only for logging.
    pub fn with_decoder(mut self, key: BoxKey, name: &str, dec: Box<dyn BoxDecoder>) -> Self {
        self.map.insert(
            key,
            BoxDecoderEntry {
                inner: dec,
                name: name.to_string(),
            },
        );
        self
    }

    pub fn contains(&self, key: &BoxKey) -> bool {
        self.map.contains_key(key)
    }

    /// Decode a payload with the registered decoder.
    ///
    /// Returns `None` if no decoder exists for the given key.
    pub fn decode(&self, key: &BoxKey, hdr: &BoxHeader, payload: &[u8]) -> Option<Result<Mp4Box>> {
        self.map.get(key).map(|d| {
            log::trace!("decode {} with {}", hdr.typ, d.name);
            d.inner.decode(hdr, payload)
        })
    }
}

fn leaf<T: Leaf + Into<LeafBox> + 'static>() -> Box<dyn BoxDecoder> {
    Box::new(LeafDecoder::<T>::new())
}

fn key(b: &[u8; 4]) -> BoxKey {
    BoxKey::FourCC(FourCC::new(b))
}

/// Registry with decoders for every built-in structured leaf.
///
/// `mdat` is not registered: top-level media data is recorded as a span of
/// the source and never read during decode.
pub fn default_registry() -> Registry {
    Registry::new()
        .with_decoder(key(b"ftyp"), "ftyp", leaf::<FtypBox>())
        .with_decoder(key(b"mvhd"), "mvhd", leaf::<MvhdBox>())
        .with_decoder(key(b"tkhd"), "tkhd", leaf::<TkhdBox>())
        .with_decoder(key(b"elst"), "elst", leaf::<ElstBox>())
        .with_decoder(key(b"mdhd"), "mdhd", leaf::<MdhdBox>())
        .with_decoder(key(b"hdlr"), "hdlr", leaf::<HdlrBox>())
        .with_decoder(key(b"stsd"), "stsd", leaf::<StsdBox>())
        .with_decoder(key(b"stts"), "stts", leaf::<SttsBox>())
        .with_decoder(key(b"ctts"), "ctts", leaf::<CttsBox>())
        .with_decoder(key(b"stss"), "stss", leaf::<StssBox>())
        .with_decoder(key(b"stsc"), "stsc", leaf::<StscBox>())
        .with_decoder(key(b"stsz"), "stsz", leaf::<StszBox>())
        .with_decoder(key(b"stco"), "stco", leaf::<StcoBox>())
        .with_decoder(key(b"co64"), "co64", leaf::<StcoBox>())
}
