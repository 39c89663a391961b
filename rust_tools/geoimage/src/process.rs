//! Deriving one band from another, tile by tile.

use crate::band::Band;
use crate::chunking::Chunk;
use crate::datatype::Pixel;
use crate::error::{GeoImageError, Result};
use crate::reader::TiledReader;
use log::{debug, info};
use rayon::prelude::*;

/// Write `source`'s pixels into `destination`.
///
/// Each tile of the source is read (calibrated), run through the source's
/// functions, then through its masks, converted to the destination's data
/// type and written at the same rectangle. Source nodata and masked pixels
/// become the destination's nodata value, falling back to the source's,
/// then to zero. Tiles are independent and processed in parallel.
pub fn process(destination: &Band, source: &Band) -> Result<()> {
    if destination.size() != source.size() {
        return Err(GeoImageError::SizeMismatch {
            expected: source.size(),
            actual: destination.size(),
        });
    }
    source.masks().check_size(source.size())?;

    info!(
        "Processing band {} of {} into band {} of {} ({})",
        source.index(),
        source.source().name(),
        destination.index(),
        destination.source().name(),
        destination.data_type()
    );

    let result = crate::dispatch_pixel!(destination.data_type(), T => {
        process_as::<T>(destination, source)
    });
    // partial writes also change pixel values
    destination.invalidate_stats();
    result
}

fn process_as<T: Pixel>(destination: &Band, source: &Band) -> Result<()> {
    let reader = source.reader()?;
    let writer = destination.reader()?;
    let fill = destination.nodata().or(source.nodata()).unwrap_or(0.0);
    let chunks: Vec<Chunk> = reader.chunks().collect();

    chunks
        .par_iter()
        .try_for_each(|chunk| process_chunk::<T>(&reader, &writer, chunk, fill))?;

    debug!(
        "Processed {} chunks into band {}",
        chunks.len(),
        destination.index()
    );
    Ok(())
}

fn process_chunk<T: Pixel>(
    reader: &TiledReader<'_>,
    writer: &TiledReader<'_>,
    chunk: &Chunk,
    fill: f64,
) -> Result<()> {
    let mut tile = reader.read_transformed_tile(chunk)?;
    reader.band().masks().apply_tile(&mut tile, chunk)?;
    tile.fill_invalid(fill);
    writer.write_tile_as::<T>(chunk, &tile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkPolicy;
    use crate::datatype::DataType;
    use crate::function::{Function, Operation};
    use crate::mask::{Mask, Predicate};
    use crate::source::{BandMetadata, MemorySource};
    use ndarray::{arr2, Array2};

    fn band(data_type: DataType, values: Array2<f64>, nodata: Option<f64>) -> Band {
        let (rows, cols) = values.dim();
        let source = MemorySource::new("mem", cols, rows)
            .unwrap()
            .with_band(data_type, values)
            .unwrap()
            .with_metadata(BandMetadata {
                nodata,
                ..Default::default()
            })
            .unwrap()
            .into_shared();
        Band::open(source, 1).unwrap()
    }

    fn read_all(band: &Band) -> Array2<f64> {
        let (width, height) = band.size();
        band.source()
            .read_window(band.index(), &Chunk::full(width, height))
            .unwrap()
    }

    #[test]
    fn test_functions_then_masks() {
        let mut src = band(DataType::Float32, arr2(&[[0.0, 1.0, 2.0]]), None);
        src.add_function(Function::new(Operation::Multiply, 2.0));
        let mask = Mask::new(src.clone(), Predicate::NotEqual(0.0));
        src.add_mask(mask);

        let dst = band(DataType::Float32, Array2::zeros((1, 3)), Some(-9999.0));
        dst.process_from(&src).unwrap();
        assert_eq!(read_all(&dst), arr2(&[[-9999.0, 2.0, 4.0]]));
    }

    #[test]
    fn test_source_nodata_becomes_destination_nodata() {
        let mut src = band(DataType::Int16, arr2(&[[-1.0, 5.0]]), Some(-1.0));
        src.add_function(Function::new(Operation::Add, 1.0));
        let dst = band(DataType::Int16, Array2::zeros((1, 2)), Some(-32768.0));
        dst.process_from(&src).unwrap();
        assert_eq!(read_all(&dst), arr2(&[[-32768.0, 6.0]]));
    }

    #[test]
    fn test_calibrated_value_equal_to_nodata_is_kept() {
        let mut src = band(DataType::Int16, arr2(&[[5.0, 7.0]]), Some(0.0));
        src.set_offset(-5.0);
        let dst = band(DataType::Int16, Array2::zeros((1, 2)), Some(-1.0));
        dst.process_from(&src).unwrap();
        assert_eq!(read_all(&dst), arr2(&[[0.0, 2.0]]));
    }

    #[test]
    fn test_fill_is_written_as_stored_value() {
        let src = band(DataType::Int16, arr2(&[[-1.0, 6.0]]), Some(-1.0));
        let mut dst = band(DataType::Int16, Array2::zeros((1, 2)), Some(-100.0));
        dst.set_gain(2.0).unwrap();
        dst.process_from(&src).unwrap();
        assert_eq!(read_all(&dst), arr2(&[[-100.0, 3.0]]));
    }

    #[test]
    fn test_destination_type_conversion() {
        let mut src = band(DataType::Float64, arr2(&[[0.4, 100.0, 3.6]]), None);
        src.add_function(Function::new(Operation::Multiply, 3.0));
        let dst = band(DataType::UInt8, Array2::zeros((1, 3)), None);
        dst.process_from(&src).unwrap();
        assert_eq!(read_all(&dst), arr2(&[[1.0, 255.0, 11.0]]));
    }

    #[test]
    fn test_many_tiles() {
        let values = Array2::from_shape_fn((37, 23), |(r, c)| (r * 23 + c) as f64);
        let mut src = band(DataType::Int32, values.clone(), None);
        src.set_chunk_policy(ChunkPolicy::with_tile_shape(5, 4).unwrap());
        src.add_function(Function::new(Operation::Subtract, 1.0));

        let dst = band(DataType::Int32, Array2::zeros((37, 23)), None);
        dst.process_from(&src).unwrap();
        assert_eq!(read_all(&dst), values.mapv(|v| v - 1.0));
    }

    #[test]
    fn test_invalidates_destination_stats() {
        let src = band(DataType::Float32, arr2(&[[4.0, 6.0]]), None);
        let dst = band(DataType::Float32, arr2(&[[1.0, 1.0]]), None);
        assert_eq!(dst.compute_stats().unwrap().mean, 1.0);
        dst.process_from(&src).unwrap();
        assert!(!dst.stats_valid());
        assert_eq!(dst.compute_stats().unwrap().mean, 5.0);
    }

    #[test]
    fn test_size_mismatch() {
        let src = band(DataType::Float32, Array2::zeros((2, 2)), None);
        let dst = band(DataType::Float32, Array2::zeros((2, 3)), None);
        assert!(matches!(
            dst.process_from(&src),
            Err(GeoImageError::SizeMismatch { .. })
        ));
    }
}
