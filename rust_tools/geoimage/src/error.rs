use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoImageError {
    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Raster source error: {0}")]
    Source(String),

    #[error("Chunk {index} out of range (raster has {count} chunks)")]
    ChunkOutOfRange { index: usize, count: usize },

    #[error("Band {index} out of range (collection has {count} bands)")]
    BandOutOfRange { index: usize, count: usize },

    #[error("No band of color {0}")]
    ColorNotFound(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Raster size mismatch: expected {expected:?}, got {actual:?}")]
    SizeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Invalid chunk size: {0} (must be positive)")]
    InvalidChunkSize(usize),

    #[error("Invalid number of histogram bins: {0}")]
    InvalidBins(usize),

    #[error("Invalid percentile: {0} (must be in [0, 100))")]
    InvalidPercentile(f64),

    #[error("Band has no valid pixels")]
    NoValidPixels,

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid function expression: {0}")]
    InvalidFunction(String),

    #[error("Unknown mask predicate: {0}")]
    UnknownPredicate(String),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid tile size: {0} (must be multiple of 16)")]
    InvalidTileSize(usize),

    #[error("Invalid gain: {0} (must be non-zero)")]
    InvalidGain(f64),
}

pub type Result<T> = std::result::Result<T, GeoImageError>;
