//! Two-pass streaming statistics over a band's tiles.

use crate::error::Result;
use crate::reader::TiledReader;
use log::{debug, info};
use std::fmt;

/// Descriptive statistics of a band's valid pixels.
///
/// Valid pixels are those whose stored value is not the band's nodata;
/// statistics are taken over their calibrated, function-applied values.
///
/// With no valid pixels `count` is zero, `mean`, `stdev` and `skewness` are
/// NaN, and `min`/`max` keep their starting sentinels `f64::MAX` and
/// `f64::MIN`. These are the bounds of the working `f64` values, not of the
/// band's data type: calibrated and transformed values may leave the range
/// of the stored type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stdev: f64,
    pub skewness: f64,
    pub count: u64,
}

impl Statistics {
    pub fn has_valid_pixels(&self) -> bool {
        self.count > 0
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn variance(&self) -> f64 {
        self.stdev * self.stdev
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Min = {}, Max = {}, Mean = {} +/- {}",
            self.min, self.max, self.mean, self.stdev
        )
    }
}

/// Compute statistics over every tile of `reader`'s band.
///
/// Pass one gathers count, sum, min and max. Pass two re-reads the band to
/// accumulate the second and third central moments around the pass-one mean.
pub fn compute_statistics(reader: &TiledReader<'_>) -> Result<Statistics> {
    let num_chunks = reader.num_chunks();
    info!(
        "Computing statistics for band {} ({} chunks)",
        reader.band().index(),
        num_chunks
    );

    let mut count = 0u64;
    let mut total = 0.0f64;
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    for chunk in reader.chunks() {
        let tile = reader.read_transformed_tile(&chunk)?;
        for value in tile.valid_values() {
            total += value;
            count += 1;
            if value > max {
                max = value;
            }
            if value < min {
                min = value;
            }
        }
    }
    let n = count as f64;
    let mean = total / n;

    let mut sum2 = 0.0f64;
    let mut sum3 = 0.0f64;
    for chunk in reader.chunks() {
        let tile = reader.read_transformed_tile(&chunk)?;
        for value in tile.valid_values() {
            let d = value - mean;
            sum2 += d * d;
            sum3 += d * d * d;
        }
    }
    let variance = sum2 / n;
    let stdev = variance.sqrt();
    let skewness = (sum3 / n) / stdev.powi(3);

    debug!(
        "Band {} statistics: count={}, min={}, max={}, mean={}, stdev={}, skew={}",
        reader.band().index(),
        count,
        min,
        max,
        mean,
        stdev,
        skewness
    );

    Ok(Statistics {
        min,
        max,
        mean,
        stdev,
        skewness,
        count,
    })
}
