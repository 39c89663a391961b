//! Backing storage for raster bands.
//!
//! The core only ever sees a [`RasterSource`]: a rectangular grid of typed
//! samples per band plus a little scalar metadata. Band numbers are 1-based,
//! windows are [`Chunk`] rectangles, and pixel values cross the boundary as
//! raw stored values in `f64` (no gain/offset applied).

use crate::chunking::Chunk;
use crate::datatype::{quantize, DataType};
use crate::error::{GeoImageError, Result};
use log::debug;
use ndarray::{s, Array2};
use parking_lot::RwLock;
use std::sync::Arc;

/// Reference-counted handle to a backing raster, shared by every band that
/// reads from it.
pub type SharedSource = Arc<dyn RasterSource>;

/// Metadata domain listing named sub-datasets.
pub const SUBDATASETS_DOMAIN: &str = "SUBDATASETS";

/// Per-band metadata as stored by the source.
#[derive(Debug, Clone, PartialEq)]
pub struct BandMetadata {
    pub description: String,
    pub gain: f64,
    pub offset: f64,
    pub nodata: Option<f64>,
}

impl Default for BandMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            gain: 1.0,
            offset: 0.0,
            nodata: None,
        }
    }
}

pub trait RasterSource: Send + Sync {
    /// Name of the source (file path, sub-dataset name, ...).
    fn name(&self) -> &str;

    /// `(width, height)` in pixels.
    fn size(&self) -> (usize, usize);

    fn band_count(&self) -> usize;

    fn data_type(&self, band: usize) -> Result<DataType>;

    fn band_metadata(&self, band: usize) -> Result<BandMetadata>;

    /// Read a window of raw stored values.
    fn read_window(&self, band: usize, window: &Chunk) -> Result<Array2<f64>>;

    /// Write a window of raw values; the source converts them to its storage type.
    fn write_window(&self, band: usize, window: &Chunk, data: &Array2<f64>) -> Result<()>;

    /// `KEY=VALUE` entries of a metadata domain; empty if the domain is absent.
    fn metadata_domain(&self, domain: &str) -> Vec<String>;

    /// Open one of the sub-datasets listed in [`SUBDATASETS_DOMAIN`].
    fn open_subdataset(&self, name: &str) -> Result<SharedSource>;

    /// GDAL-ordered affine geotransform, when the source is georeferenced.
    fn geo_transform(&self) -> Option<[f64; 6]> {
        None
    }

    /// Spatial reference as WKT, when known.
    fn projection(&self) -> Option<String> {
        None
    }
}

/// Check that `window` lies inside a `width x height` raster.
pub(crate) fn check_window(window: &Chunk, width: usize, height: usize) -> Result<()> {
    if window.col_end() > width || window.row_end() > height {
        return Err(GeoImageError::Source(format!(
            "window {}x{} at ({}, {}) exceeds raster {}x{}",
            window.width, window.height, window.col_offset, window.row_offset, width, height
        )));
    }
    Ok(())
}

struct MemoryBand {
    data_type: DataType,
    metadata: BandMetadata,
    data: RwLock<Array2<f64>>,
}

/// Raster held entirely in memory. Used for tests and for derived products.
pub struct MemorySource {
    name: String,
    width: usize,
    height: usize,
    bands: Vec<MemoryBand>,
    subdatasets: Vec<(String, SharedSource)>,
    geo_transform: Option<[f64; 6]>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GeoImageError::InvalidDimensions(width, height));
        }
        Ok(Self {
            name: name.into(),
            width,
            height,
            bands: Vec::new(),
            subdatasets: Vec::new(),
            geo_transform: None,
        })
    }

    /// Append a band. `data` is `(rows, cols)` and is quantized to `data_type`.
    pub fn with_band(mut self, data_type: DataType, data: Array2<f64>) -> Result<Self> {
        let (rows, cols) = data.dim();
        if (cols, rows) != (self.width, self.height) {
            return Err(GeoImageError::SizeMismatch {
                expected: (self.width, self.height),
                actual: (cols, rows),
            });
        }
        let data = data.mapv(|v| quantize(data_type, v));
        self.bands.push(MemoryBand {
            data_type,
            metadata: BandMetadata::default(),
            data: RwLock::new(data),
        });
        Ok(self)
    }

    /// Append a band filled with a constant.
    pub fn with_filled_band(self, data_type: DataType, value: f64) -> Result<Self> {
        let data = Array2::from_elem((self.height, self.width), value);
        self.with_band(data_type, data)
    }

    /// Replace the stored metadata of the most recently added band.
    pub fn with_metadata(mut self, metadata: BandMetadata) -> Result<Self> {
        let count = self.bands.len();
        let band = self
            .bands
            .last_mut()
            .ok_or(GeoImageError::BandOutOfRange { index: 0, count })?;
        band.metadata = metadata;
        Ok(self)
    }

    pub fn with_subdataset(mut self, name: impl Into<String>, source: SharedSource) -> Self {
        self.subdatasets.push((name.into(), source));
        self
    }

    pub fn with_geo_transform(mut self, geo_transform: [f64; 6]) -> Self {
        self.geo_transform = Some(geo_transform);
        self
    }

    pub fn into_shared(self) -> SharedSource {
        Arc::new(self)
    }

    fn band(&self, band: usize) -> Result<&MemoryBand> {
        if band == 0 || band > self.bands.len() {
            return Err(GeoImageError::BandOutOfRange {
                index: band,
                count: self.bands.len(),
            });
        }
        Ok(&self.bands[band - 1])
    }
}

impl RasterSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn data_type(&self, band: usize) -> Result<DataType> {
        Ok(self.band(band)?.data_type)
    }

    fn band_metadata(&self, band: usize) -> Result<BandMetadata> {
        Ok(self.band(band)?.metadata.clone())
    }

    fn read_window(&self, band: usize, window: &Chunk) -> Result<Array2<f64>> {
        let memory_band = self.band(band)?;
        check_window(window, self.width, self.height)?;
        let data = memory_band.data.read();
        Ok(data
            .slice(s![
                window.row_offset..window.row_end(),
                window.col_offset..window.col_end()
            ])
            .to_owned())
    }

    fn write_window(&self, band: usize, window: &Chunk, data: &Array2<f64>) -> Result<()> {
        let memory_band = self.band(band)?;
        check_window(window, self.width, self.height)?;
        let (rows, cols) = data.dim();
        if (cols, rows) != (window.width, window.height) {
            return Err(GeoImageError::SizeMismatch {
                expected: (window.width, window.height),
                actual: (cols, rows),
            });
        }
        let data_type = memory_band.data_type;
        let mut stored = memory_band.data.write();
        stored
            .slice_mut(s![
                window.row_offset..window.row_end(),
                window.col_offset..window.col_end()
            ])
            .zip_mut_with(data, |dst, &src| *dst = quantize(data_type, src));
        debug!(
            "{}: wrote band {} chunk {} ({}x{})",
            self.name, band, window.index, window.width, window.height
        );
        Ok(())
    }

    fn metadata_domain(&self, domain: &str) -> Vec<String> {
        if domain != SUBDATASETS_DOMAIN {
            return Vec::new();
        }
        self.subdatasets
            .iter()
            .enumerate()
            .flat_map(|(i, (name, _))| {
                [
                    format!("SUBDATASET_{}_NAME={}", i + 1, name),
                    format!("SUBDATASET_{}_DESC={}", i + 1, name),
                ]
            })
            .collect()
    }

    fn open_subdataset(&self, name: &str) -> Result<SharedSource> {
        self.subdatasets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, source)| Arc::clone(source))
            .ok_or_else(|| GeoImageError::Source(format!("no sub-dataset named {}", name)))
    }

    fn geo_transform(&self) -> Option<[f64; 6]> {
        self.geo_transform
    }
}
