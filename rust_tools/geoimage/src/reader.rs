//! Tile-by-tile access to a band's pixels.

use crate::band::Band;
use crate::chunking::{Chunk, ChunkGrid};
use crate::datatype::Pixel;
use crate::error::{GeoImageError, Result};
use log::debug;
use ndarray::{Array2, Zip};

/// True when `value` is the band's nodata sentinel.
pub fn is_nodata(value: f64, nodata: Option<f64>) -> bool {
    matches!(nodata, Some(nd) if value == nd)
}

/// Pixel values of one tile and which of them hold data.
///
/// Validity is decided from the stored values, before calibration or any
/// function runs, so a transformed value equal to the nodata sentinel stays
/// valid.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub values: Array2<f64>,
    pub valid: Array2<bool>,
}

impl Tile {
    /// Tile with every pixel valid.
    pub fn new(values: Array2<f64>) -> Self {
        let valid = Array2::from_elem(values.raw_dim(), true);
        Self { values, valid }
    }

    /// Tile whose pixels equal to `nodata` are invalid.
    pub fn with_nodata(values: Array2<f64>, nodata: Option<f64>) -> Self {
        let valid = values.mapv(|v| !is_nodata(v, nodata));
        Self { values, valid }
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .zip(self.valid.iter())
            .filter(|(_, &ok)| ok)
            .map(|(&v, _)| v)
    }

    pub fn num_valid(&self) -> usize {
        self.valid.iter().filter(|&&ok| ok).count()
    }

    /// Overwrite every invalid pixel with `fill`.
    pub fn fill_invalid(&mut self, fill: f64) {
        Zip::from(&mut self.values)
            .and(&self.valid)
            .for_each(|v, &ok| {
                if !ok {
                    *v = fill;
                }
            });
    }
}

/// Reads and writes one band in the tiles of its [`ChunkGrid`].
///
/// Values read are calibrated (`stored * gain + offset`); stored nodata
/// values are passed through unchanged and flagged invalid in the [`Tile`].
pub struct TiledReader<'a> {
    band: &'a Band,
    grid: ChunkGrid,
}

impl<'a> TiledReader<'a> {
    pub fn new(band: &'a Band) -> Result<Self> {
        let (width, height) = band.size();
        let grid = ChunkGrid::new(width, height, band.chunk_policy())?;
        Ok(Self { band, grid })
    }

    pub fn band(&self) -> &Band {
        self.band
    }

    pub fn grid(&self) -> &ChunkGrid {
        &self.grid
    }

    pub fn num_chunks(&self) -> usize {
        self.grid.num_chunks()
    }

    pub fn chunk(&self, index: usize) -> Result<Chunk> {
        self.grid.chunk(index)
    }

    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        self.grid.iter()
    }

    /// Calibrated pixels of 1-based tile `index`.
    pub fn read(&self, index: usize) -> Result<Array2<f64>> {
        let chunk = self.grid.chunk(index)?;
        self.read_chunk(&chunk)
    }

    /// Calibrated pixels of tile `index` converted to `T`.
    pub fn read_as<T: Pixel>(&self, index: usize) -> Result<Array2<T>> {
        Ok(self.read(index)?.mapv(T::from_f64))
    }

    /// Calibrated pixels of tile `index` with the band's functions applied.
    pub fn read_transformed(&self, index: usize) -> Result<Array2<f64>> {
        let chunk = self.grid.chunk(index)?;
        Ok(self.read_transformed_tile(&chunk)?.values)
    }

    pub fn read_chunk(&self, chunk: &Chunk) -> Result<Array2<f64>> {
        Ok(self.read_tile(chunk)?.values)
    }

    pub fn read_transformed_chunk(&self, chunk: &Chunk) -> Result<Array2<f64>> {
        Ok(self.read_transformed_tile(chunk)?.values)
    }

    /// Calibrated tile with validity taken from the stored values.
    pub fn read_tile(&self, chunk: &Chunk) -> Result<Tile> {
        debug!(
            "Reading band {} chunk {}: offset=({},{}), size=({},{})",
            self.band.index(),
            chunk.index,
            chunk.col_offset,
            chunk.row_offset,
            chunk.width,
            chunk.height
        );
        let data = self.band.source().read_window(self.band.index(), chunk)?;
        check_tile_shape(&data, chunk)?;

        let mut tile = Tile::with_nodata(data, self.band.nodata());
        let (gain, offset) = (self.band.gain(), self.band.offset());
        if gain != 1.0 || offset != 0.0 {
            Zip::from(&mut tile.values)
                .and(&tile.valid)
                .for_each(|v, &ok| {
                    if ok {
                        *v = *v * gain + offset;
                    }
                });
        }
        Ok(tile)
    }

    /// [`read_tile`](Self::read_tile) with the band's functions applied to
    /// valid pixels.
    pub fn read_transformed_tile(&self, chunk: &Chunk) -> Result<Tile> {
        let mut tile = self.read_tile(chunk)?;
        self.band
            .functions()
            .apply_tile(&mut tile.values, &tile.valid);
        Ok(tile)
    }

    /// Write calibrated values into tile `index`, undoing gain/offset.
    /// Values equal to the band's nodata are written as nodata.
    pub fn write(&self, index: usize, data: &Array2<f64>) -> Result<()> {
        let chunk = self.grid.chunk(index)?;
        self.write_chunk(&chunk, data)
    }

    pub fn write_chunk(&self, chunk: &Chunk, data: &Array2<f64>) -> Result<()> {
        let tile = Tile::with_nodata(data.clone(), self.band.nodata());
        self.write_tile_as::<f64>(chunk, &tile)
    }

    /// Write a tile through the stored representation `T`. Valid pixels are
    /// de-calibrated, invalid ones are written as they are.
    pub fn write_tile_as<T: Pixel>(&self, chunk: &Chunk, tile: &Tile) -> Result<()> {
        check_tile_shape(&tile.values, chunk)?;
        if tile.valid.dim() != tile.values.dim() {
            let (rows, cols) = tile.valid.dim();
            return Err(GeoImageError::SizeMismatch {
                expected: (chunk.width, chunk.height),
                actual: (cols, rows),
            });
        }
        let stored = self.to_stored::<T>(tile)?.mapv(T::as_f64);
        self.band
            .source()
            .write_window(self.band.index(), chunk, &stored)
    }

    /// Undo gain/offset on valid pixels and convert to `T`.
    pub fn to_stored<T: Pixel>(&self, tile: &Tile) -> Result<Array2<T>> {
        let (gain, offset) = (self.band.gain(), self.band.offset());
        if gain == 0.0 {
            return Err(GeoImageError::InvalidGain(gain));
        }
        Ok(Zip::from(&tile.values)
            .and(&tile.valid)
            .map_collect(|&v, &ok| {
                if ok {
                    T::from_f64((v - offset) / gain)
                } else {
                    T::from_f64(v)
                }
            }))
    }
}

fn check_tile_shape(data: &Array2<f64>, chunk: &Chunk) -> Result<()> {
    let (rows, cols) = data.dim();
    if (cols, rows) != (chunk.width, chunk.height) {
        return Err(GeoImageError::SizeMismatch {
            expected: (chunk.width, chunk.height),
            actual: (cols, rows),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkPolicy;
    use crate::datatype::DataType;
    use crate::source::{BandMetadata, MemorySource};
    use ndarray::arr2;

    fn band_with(values: Array2<f64>, metadata: BandMetadata) -> Band {
        let (rows, cols) = values.dim();
        let source = MemorySource::new("mem", cols, rows)
            .unwrap()
            .with_band(DataType::Int16, values)
            .unwrap()
            .with_metadata(metadata)
            .unwrap()
            .into_shared();
        Band::open(source, 1).unwrap()
    }

    #[test]
    fn test_read_applies_gain_offset_but_not_to_nodata() {
        let band = band_with(
            arr2(&[[1.0, 2.0], [-1.0, 4.0]]),
            BandMetadata {
                gain: 2.0,
                offset: 10.0,
                nodata: Some(-1.0),
                ..Default::default()
            },
        );
        let reader = band.reader().unwrap();
        assert_eq!(reader.num_chunks(), 1);
        assert_eq!(reader.read(1).unwrap(), arr2(&[[12.0, 14.0], [-1.0, 18.0]]));
    }

    #[test]
    fn test_read_out_of_range() {
        let band = band_with(Array2::zeros((2, 2)), BandMetadata::default());
        let reader = band.reader().unwrap();
        assert!(matches!(
            reader.read(2),
            Err(GeoImageError::ChunkOutOfRange { index: 2, count: 1 })
        ));
        assert!(reader.read(0).is_err());
    }

    #[test]
    fn test_read_as_typed() {
        let band = band_with(arr2(&[[1.0, 300.0]]), BandMetadata::default());
        let tile: Array2<u8> = band.reader().unwrap().read_as(1).unwrap();
        assert_eq!(tile, arr2(&[[1u8, 255u8]]));
    }

    #[test]
    fn test_tiles_reassemble_raster() {
        let values = Array2::from_shape_fn((5, 7), |(r, c)| (r * 7 + c) as f64);
        let mut band = band_with(values.clone(), BandMetadata::default());
        band.set_chunk_policy(ChunkPolicy::with_tile_shape(3, 2).unwrap());

        let reader = band.reader().unwrap();
        let mut rebuilt = Array2::<f64>::zeros((5, 7));
        for chunk in reader.chunks() {
            let tile = reader.read(chunk.index).unwrap();
            rebuilt
                .slice_mut(ndarray::s![
                    chunk.row_offset..chunk.row_end(),
                    chunk.col_offset..chunk.col_end()
                ])
                .assign(&tile);
        }
        assert_eq!(rebuilt, values);
    }

    #[test]
    fn test_to_stored_rounds_into_type() {
        let band = band_with(
            Array2::zeros((1, 3)),
            BandMetadata {
                gain: 0.1,
                nodata: Some(-1.0),
                ..Default::default()
            },
        );
        let reader = band.reader().unwrap();
        let tile = Tile::with_nodata(arr2(&[[0.52, -1.0, 1.0]]), Some(-1.0));
        let stored: Array2<i16> = reader.to_stored(&tile).unwrap();
        assert_eq!(stored, arr2(&[[5i16, -1, 10]]));
    }

    #[test]
    fn test_write_inverts_calibration() {
        let band = band_with(
            Array2::zeros((1, 2)),
            BandMetadata {
                gain: 0.5,
                offset: 1.0,
                nodata: Some(0.0),
                ..Default::default()
            },
        );
        let reader = band.reader().unwrap();
        reader.write(1, &arr2(&[[3.0, 0.0]])).unwrap();
        let raw = band.source().read_window(1, &Chunk::full(2, 1)).unwrap();
        assert_eq!(raw, arr2(&[[4.0, 0.0]]));
        assert_eq!(reader.read(1).unwrap(), arr2(&[[3.0, 0.0]]));
    }

    #[test]
    fn test_validity_comes_from_stored_values() {
        // stored 5 calibrates onto the nodata value but is still data
        let band = band_with(
            arr2(&[[5.0, 7.0, 0.0]]),
            BandMetadata {
                offset: -5.0,
                nodata: Some(0.0),
                ..Default::default()
            },
        );
        let tile = band.reader().unwrap().read_tile(&Chunk::full(3, 1)).unwrap();
        assert_eq!(tile.values, arr2(&[[0.0, 2.0, 0.0]]));
        assert_eq!(tile.valid, arr2(&[[true, true, false]]));
        assert_eq!(tile.valid_values().collect::<Vec<_>>(), vec![0.0, 2.0]);
    }

    #[test]
    fn test_write_tile_keeps_invalid_pixels_verbatim() {
        let band = band_with(
            Array2::zeros((1, 2)),
            BandMetadata {
                gain: 2.0,
                nodata: Some(-1.0),
                ..Default::default()
            },
        );
        let mut tile = Tile::new(arr2(&[[8.0, 8.0]]));
        tile.valid[[0, 1]] = false;
        tile.fill_invalid(-1.0);
        band.reader()
            .unwrap()
            .write_tile_as::<i16>(&Chunk::full(2, 1), &tile)
            .unwrap();
        let raw = band.source().read_window(1, &Chunk::full(2, 1)).unwrap();
        assert_eq!(raw, arr2(&[[4.0, -1.0]]));
    }

    #[test]
    fn test_zero_gain_rejected_on_write() {
        let band = band_with(
            Array2::zeros((1, 1)),
            BandMetadata {
                gain: 0.0,
                ..Default::default()
            },
        );
        assert!(matches!(
            band.reader().unwrap().write(1, &arr2(&[[3.0]])),
            Err(GeoImageError::InvalidGain(_))
        ));
    }
}
