pub mod abi;
pub mod bridge;
pub mod error;
pub mod reader;
pub mod wide;
pub mod writer;

pub use abi::{AbiDescriptor, ArchiveHandle, CodeTable, Outcome};
pub use bridge::PluginBridge;
pub use error::{NativeKind, NkxError};
pub use reader::{ArchiveReader, EntryInfo, ExtractSummary};
pub use writer::{ArchiveWriter, PackSummary};
