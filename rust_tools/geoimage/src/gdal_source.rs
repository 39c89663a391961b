//! GDAL-backed [`RasterSource`].

use crate::chunking::Chunk;
use crate::datatype::DataType;
use crate::error::{GeoImageError, Result};
use crate::source::{check_window, BandMetadata, RasterSource, SharedSource};
use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::{Dataset, DatasetOptions, Driver, DriverManager, GdalOpenFlags, Metadata};
use log::{debug, info};
use ndarray::Array2;
use parking_lot::Mutex;
use std::sync::Arc;

/// Compression schemes accepted for GeoTIFF outputs.
pub const COMPRESSION_TYPES: [&str; 4] = ["DEFLATE", "LZW", "ZSTD", "NONE"];

/// Validate compression type
pub fn validate_compression(compression: &str) -> Result<()> {
    if !COMPRESSION_TYPES.contains(&compression) {
        return Err(GeoImageError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

/// Validate tile size (must be multiple of 16)
pub fn validate_tile_size(tile_size: usize) -> Result<()> {
    if tile_size == 0 || tile_size % 16 != 0 {
        return Err(GeoImageError::InvalidTileSize(tile_size));
    }
    Ok(())
}

/// Layout of a GeoTIFF created for derived bands.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub data_type: DataType,
    pub compression: String,
    pub block_size: usize,
    pub nodata: Option<f64>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            data_type: DataType::Float32,
            compression: "DEFLATE".to_string(),
            block_size: 512,
            nodata: None,
        }
    }
}

impl OutputOptions {
    pub fn validate(&self) -> Result<()> {
        validate_compression(&self.compression)?;
        validate_tile_size(self.block_size)
    }

    /// GTiff creation options for a tiled output.
    pub fn creation_options(&self) -> Vec<String> {
        vec![
            format!("COMPRESS={}", self.compression),
            "TILED=YES".to_string(),
            format!("BLOCKXSIZE={}", self.block_size),
            format!("BLOCKYSIZE={}", self.block_size),
            "BIGTIFF=IF_SAFER".to_string(),
        ]
    }
}

fn data_type_of(band_type: GdalDataType) -> Result<DataType> {
    match band_type {
        GdalDataType::UInt8 => Ok(DataType::UInt8),
        GdalDataType::UInt16 => Ok(DataType::UInt16),
        GdalDataType::Int16 => Ok(DataType::Int16),
        GdalDataType::UInt32 => Ok(DataType::UInt32),
        GdalDataType::Int32 => Ok(DataType::Int32),
        GdalDataType::Float32 => Ok(DataType::Float32),
        GdalDataType::Float64 => Ok(DataType::Float64),
        other => Err(GeoImageError::UnsupportedDataType(format!("{:?}", other))),
    }
}

fn create_typed<T: GdalType>(
    driver: &Driver,
    path: &str,
    size: (usize, usize),
    num_bands: usize,
    options: &CslStringList,
) -> Result<Dataset> {
    Ok(driver.create_with_band_type_with_options::<T, _>(
        path, size.0, size.1, num_bands, options,
    )?)
}

/// A GDAL dataset shared between bands; access is serialised by a mutex.
pub struct GdalSource {
    name: String,
    width: usize,
    height: usize,
    band_count: usize,
    dataset: Mutex<Dataset>,
}

impl GdalSource {
    /// Open read-only.
    pub fn open(path: &str) -> Result<Self> {
        info!("Opening raster: {}", path);
        Self::from_dataset(path, Dataset::open(path)?)
    }

    /// Open for reading and writing.
    pub fn open_update(path: &str) -> Result<Self> {
        info!("Opening raster for update: {}", path);
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_RASTER,
            ..Default::default()
        };
        Self::from_dataset(path, Dataset::open_ex(path, options)?)
    }

    /// Create a tiled GeoTIFF of `size` with `num_bands` bands, copying the
    /// georeferencing of `template` when it has any.
    pub fn create(
        path: &str,
        size: (usize, usize),
        num_bands: usize,
        template: Option<&dyn RasterSource>,
        options: &OutputOptions,
    ) -> Result<Self> {
        options.validate()?;
        info!("Creating output dataset: {}", path);

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut gdal_options = CslStringList::new();
        for opt in options.creation_options() {
            gdal_options.add_string(&opt)?;
        }

        let mut dataset = match options.data_type {
            DataType::UInt8 => create_typed::<u8>(&driver, path, size, num_bands, &gdal_options)?,
            DataType::UInt16 => create_typed::<u16>(&driver, path, size, num_bands, &gdal_options)?,
            DataType::Int16 => create_typed::<i16>(&driver, path, size, num_bands, &gdal_options)?,
            DataType::UInt32 => create_typed::<u32>(&driver, path, size, num_bands, &gdal_options)?,
            DataType::Int32 => create_typed::<i32>(&driver, path, size, num_bands, &gdal_options)?,
            DataType::Float32 => create_typed::<f32>(&driver, path, size, num_bands, &gdal_options)?,
            DataType::Float64 => create_typed::<f64>(&driver, path, size, num_bands, &gdal_options)?,
            DataType::Int8 => {
                return Err(GeoImageError::UnsupportedDataType(
                    "Int8 GeoTIFF output".to_string(),
                ))
            }
        };

        if let Some(template) = template {
            if let Some(geo_transform) = template.geo_transform() {
                dataset.set_geo_transform(&geo_transform)?;
            }
            if let Some(projection) = template.projection() {
                dataset.set_projection(&projection)?;
            }
        }
        if let Some(nodata) = options.nodata {
            for band_index in 1..=num_bands {
                dataset
                    .rasterband(band_index)?
                    .set_no_data_value(Some(nodata))?;
            }
        }

        Self::from_dataset(path, dataset)
    }

    fn from_dataset(name: &str, dataset: Dataset) -> Result<Self> {
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count() as usize;
        debug!(
            "{}: {}x{} pixels, {} bands",
            name, width, height, band_count
        );
        Ok(Self {
            name: name.to_string(),
            width,
            height,
            band_count,
            dataset: Mutex::new(dataset),
        })
    }

    pub fn into_shared(self) -> SharedSource {
        Arc::new(self)
    }

    fn check_band(&self, band: usize) -> Result<()> {
        if band == 0 || band > self.band_count {
            return Err(GeoImageError::BandOutOfRange {
                index: band,
                count: self.band_count,
            });
        }
        Ok(())
    }
}

impl RasterSource for GdalSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn band_count(&self) -> usize {
        self.band_count
    }

    fn data_type(&self, band: usize) -> Result<DataType> {
        self.check_band(band)?;
        let dataset = self.dataset.lock();
        let rasterband = dataset.rasterband(band)?;
        data_type_of(rasterband.band_type())
    }

    fn band_metadata(&self, band: usize) -> Result<BandMetadata> {
        self.check_band(band)?;
        let dataset = self.dataset.lock();
        let rasterband = dataset.rasterband(band)?;
        Ok(BandMetadata {
            description: rasterband.description().unwrap_or_default(),
            gain: rasterband.scale().unwrap_or(1.0),
            offset: rasterband.offset().unwrap_or(0.0),
            nodata: rasterband.no_data_value(),
        })
    }

    fn read_window(&self, band: usize, window: &Chunk) -> Result<Array2<f64>> {
        self.check_band(band)?;
        check_window(window, self.width, self.height)?;
        let dataset = self.dataset.lock();
        let rasterband = dataset.rasterband(band)?;

        let buffer = rasterband.read_as::<f64>(
            (window.col_offset as isize, window.row_offset as isize),
            (window.width, window.height),
            (window.width, window.height),
            None,
        )?;

        let data_vec: Vec<f64> = buffer.into_iter().collect();
        Ok(Array2::from_shape_vec((window.height, window.width), data_vec)?)
    }

    fn write_window(&self, band: usize, window: &Chunk, data: &Array2<f64>) -> Result<()> {
        self.check_band(band)?;
        check_window(window, self.width, self.height)?;
        let (rows, cols) = data.dim();
        if (cols, rows) != (window.width, window.height) {
            return Err(GeoImageError::SizeMismatch {
                expected: (window.width, window.height),
                actual: (cols, rows),
            });
        }

        let dataset = self.dataset.lock();
        let mut rasterband = dataset.rasterband(band)?;
        // row-major iteration matches GDAL's buffer layout
        let mut buffer = Buffer::new((window.width, window.height), data.iter().copied().collect());
        rasterband.write(
            (window.col_offset as isize, window.row_offset as isize),
            (window.width, window.height),
            &mut buffer,
        )?;

        debug!(
            "Wrote chunk {} to band {} at ({},{}) size {}x{}",
            window.index, band, window.col_offset, window.row_offset, window.width, window.height
        );
        Ok(())
    }

    fn metadata_domain(&self, domain: &str) -> Vec<String> {
        self.dataset
            .lock()
            .metadata_domain(domain)
            .unwrap_or_default()
    }

    fn open_subdataset(&self, name: &str) -> Result<SharedSource> {
        Ok(GdalSource::open(name)?.into_shared())
    }

    fn geo_transform(&self) -> Option<[f64; 6]> {
        self.dataset.lock().geo_transform().ok()
    }

    fn projection(&self) -> Option<String> {
        let projection = self.dataset.lock().projection();
        (!projection.is_empty()).then_some(projection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::BandCollection;
    use ndarray::arr2;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_compression() {
        assert!(validate_compression("DEFLATE").is_ok());
        assert!(validate_compression("ZSTD").is_ok());
        assert!(validate_compression("jpeg").is_err());
    }

    #[test]
    fn test_validate_tile_size() {
        assert!(validate_tile_size(256).is_ok());
        assert!(validate_tile_size(0).is_err());
        assert!(validate_tile_size(100).is_err());
    }

    #[test]
    fn test_creation_options() {
        let opts = OutputOptions {
            block_size: 256,
            ..Default::default()
        }
        .creation_options();
        assert_eq!(opts.len(), 5);
        assert!(opts.contains(&"COMPRESS=DEFLATE".to_string()));
        assert!(opts.contains(&"BLOCKXSIZE=256".to_string()));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let tmp = NamedTempFile::with_suffix(".tif").unwrap();
        let path = tmp.path().to_str().unwrap();
        let options = OutputOptions {
            data_type: DataType::Int16,
            block_size: 16,
            nodata: Some(-1.0),
            ..Default::default()
        };
        let source = GdalSource::create(path, (3, 2), 1, None, &options)
            .unwrap()
            .into_shared();

        let values = arr2(&[[1.0, 2.0, 3.0], [4.0, -1.0, 6.0]]);
        source.write_window(1, &Chunk::full(3, 2), &values).unwrap();
        assert_eq!(source.read_window(1, &Chunk::full(3, 2)).unwrap(), values);
        assert_eq!(source.data_type(1).unwrap(), DataType::Int16);

        let collection = BandCollection::open(source).unwrap();
        let stats = collection.band(1).unwrap().compute_stats().unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.max, 6.0);
    }
}
