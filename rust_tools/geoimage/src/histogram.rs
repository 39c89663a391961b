//! Histograms over [min, max] and percentile estimates derived from them.

use crate::band::Band;
use crate::error::{GeoImageError, Result};
use log::{debug, warn};
use ndarray::Array1;

/// Number of bins used when estimating percentiles.
pub const PERCENTILE_BINS: usize = 100;

/// Fraction of valid pixels falling in each of `bins` equal-width bins over
/// the band's [min, max]. With `cumulative` the result is a running sum
/// ending at 1.
pub fn histogram(band: &Band, bins: usize, cumulative: bool) -> Result<Array1<f64>> {
    if bins == 0 {
        return Err(GeoImageError::InvalidBins(bins));
    }
    let stats = band.compute_stats()?;
    if !stats.has_valid_pixels() {
        return Err(GeoImageError::NoValidPixels);
    }
    let range = stats.range();
    if range == 0.0 {
        warn!(
            "Band {} has a single value ({}), all pixels fall in the first bin",
            band.index(),
            stats.min
        );
    }

    let scale = bins as f64 / range;
    let last = bins - 1;
    let mut hist = Array1::<f64>::zeros(bins);
    let mut num_pixels = 0u64;

    let reader = band.reader()?;
    for chunk in reader.chunks() {
        let tile = reader.read_transformed_tile(&chunk)?;
        for value in tile.valid_values() {
            let bin = if range > 0.0 {
                // negative and NaN positions saturate to 0
                (((value - stats.min) * scale).floor() as usize).min(last)
            } else {
                0
            };
            hist[bin] += 1.0;
            num_pixels += 1;
        }
    }

    hist /= num_pixels as f64;
    if cumulative {
        for i in 1..bins {
            hist[i] += hist[i - 1];
        }
    }
    debug!(
        "Band {} histogram: {} bins over [{}, {}], {} pixels",
        band.index(),
        bins,
        stats.min,
        stats.max,
        num_pixels
    );
    Ok(hist)
}

/// Estimate the value below which `p` percent of valid pixels fall.
///
/// `p == 0` gives the minimum and any `p >= 99` the maximum. Other values
/// interpolate the 100-bin cumulative histogram.
pub fn percentile(band: &Band, p: f64) -> Result<f64> {
    if !(0.0..100.0).contains(&p) {
        return Err(GeoImageError::InvalidPercentile(p));
    }
    let stats = band.compute_stats()?;
    if !stats.has_valid_pixels() {
        return Err(GeoImageError::NoValidPixels);
    }
    if p == 0.0 {
        return Ok(stats.min);
    }
    if p >= 99.0 {
        return Ok(stats.max);
    }

    let bins = PERCENTILE_BINS;
    let hist = histogram(band, bins, true)? * 100.0;
    let interval = stats.range() / (bins as f64 - 1.0);
    let xaxis = Array1::from_shape_fn(bins, |i| stats.min + i as f64 * interval);

    let mut ind = 1;
    while ind < bins - 1 && hist[ind] < p {
        ind += 1;
    }
    let step = hist[ind] - hist[ind - 1];
    let frac = if step > 0.0 {
        (p - hist[ind - 1]) / step
    } else {
        0.0
    };
    let position = ((ind - 1) as f64 + frac).clamp(0.0, (bins - 1) as f64);
    Ok(interpolate(&xaxis, position))
}

/// Linear interpolation of `values` at fractional index `position`.
fn interpolate(values: &Array1<f64>, position: f64) -> f64 {
    let last = values.len() - 1;
    let i0 = (position.floor() as usize).min(last);
    if i0 == last {
        return values[last];
    }
    let frac = position - i0 as f64;
    values[i0] + frac * (values[i0 + 1] - values[i0])
}
