// Library exports for testing and reuse

pub mod band;
pub mod chunking;
pub mod cli;
pub mod collection;
pub mod datatype;
pub mod error;
pub mod function;
#[cfg(feature = "gdal")]
pub mod gdal_source;
pub mod histogram;
pub mod mask;
pub mod process;
pub mod reader;
pub mod source;
pub mod stats;

// Re-export commonly used types
pub use band::Band;
pub use chunking::{Chunk, ChunkGrid, ChunkPolicy};
pub use collection::{BandCollection, Colors};
pub use datatype::{DataType, Pixel};
pub use error::{GeoImageError, Result};
pub use function::{Function, FunctionPipeline, Operation};
pub use mask::{Mask, MaskStack, Predicate};
pub use reader::{Tile, TiledReader};
pub use source::{BandMetadata, MemorySource, RasterSource, SharedSource};
pub use stats::Statistics;
