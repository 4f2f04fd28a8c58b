pub mod atom;
pub mod file;
pub mod optimize;
pub mod parser;
pub mod reader;
pub mod registry;
pub mod save;
pub mod tracks;
pub mod validation;
pub mod writer;

pub use atom::{AtomData, AtomId, AtomKind, AtomTree, FourCC};
pub use file::{Mp4Error, Mp4File};
pub use optimize::{OptimizeOptions, Optimizer, PaddingSize};
pub use parser::{Mp4Parser, ParseError};
pub use reader::Mp4Reader;
pub use registry::AtomRegistry;
pub use save::{SaveScenario, Saver};
pub use tracks::{TrackSettings, TrackSettingsMap};
pub use writer::{Mp4Writer, WriteError};
