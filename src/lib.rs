pub mod boxes;
pub mod clip;
pub mod dump;
pub mod error;
pub mod known_boxes;
pub mod leaf;
pub mod parser;
pub mod registry;
pub mod sample_table;
pub mod samples;
pub mod source;
pub mod util;

pub use boxes::{BoxHeader, BoxKey, ContainerBox, FourCC, Mp4, Mp4Box, OpaqueBox};
pub use clip::{build_clip, build_clip_with, Clip, ClipOptions};
pub use error::{Error, Result};
pub use leaf::LeafBox;
pub use parser::{decode, decode_bytes, decode_with};
pub use registry::{default_registry, Registry};
pub use source::{ByteRangeSource, FileSource, MemorySource, SharedSource};
