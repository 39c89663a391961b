//! Boolean rasters that suppress pixels during derivation.

use crate::band::Band;
use crate::chunking::Chunk;
use crate::error::{GeoImageError, Result};
use crate::reader::Tile;
use ndarray::{Array2, Zip};
use std::fmt;
use std::str::FromStr;

/// Test turning a mask band's value into keep (`true`) / suppress (`false`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicate {
    /// Any pixel holding data.
    Valid,
    Above(f64),
    Below(f64),
    Equal(f64),
    NotEqual(f64),
    /// Inclusive range.
    Between(f64, f64),
}

impl Predicate {
    pub fn evaluate(&self, value: f64) -> bool {
        match *self {
            Predicate::Valid => true,
            Predicate::Above(t) => value > t,
            Predicate::Below(t) => value < t,
            Predicate::Equal(t) => value == t,
            Predicate::NotEqual(t) => value != t,
            Predicate::Between(lo, hi) => value >= lo && value <= hi,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Valid => write!(f, "valid"),
            Predicate::Above(t) => write!(f, "> {}", t),
            Predicate::Below(t) => write!(f, "< {}", t),
            Predicate::Equal(t) => write!(f, "== {}", t),
            Predicate::NotEqual(t) => write!(f, "!= {}", t),
            Predicate::Between(lo, hi) => write!(f, "between {} {}", lo, hi),
        }
    }
}

/// Parses the [`Display`](fmt::Display) form, e.g. `"> 0"` or `"between 1 5"`.
impl FromStr for Predicate {
    type Err = GeoImageError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            ["valid"] => Ok(Predicate::Valid),
            [">", t] => Ok(Predicate::Above(threshold(t, s)?)),
            ["<", t] => Ok(Predicate::Below(threshold(t, s)?)),
            ["==", t] => Ok(Predicate::Equal(threshold(t, s)?)),
            ["!=", t] => Ok(Predicate::NotEqual(threshold(t, s)?)),
            ["between", lo, hi] => Ok(Predicate::Between(threshold(lo, s)?, threshold(hi, s)?)),
            _ => Err(GeoImageError::UnknownPredicate(s.to_string())),
        }
    }
}

fn threshold(text: &str, expression: &str) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|_| GeoImageError::UnknownPredicate(expression.to_string()))
}

/// A band and the predicate that turns it into a boolean raster.
#[derive(Debug, Clone)]
pub struct Mask {
    band: Band,
    predicate: Predicate,
}

impl Mask {
    pub fn new(band: Band, predicate: Predicate) -> Self {
        Self { band, predicate }
    }

    pub fn band(&self) -> &Band {
        &self.band
    }

    pub fn predicate(&self) -> Predicate {
        self.predicate
    }

    /// Boolean tile for `chunk`; pixels whose stored mask-band value is
    /// nodata are always `false`.
    pub fn evaluate(&self, chunk: &Chunk) -> Result<Array2<bool>> {
        let reader = self.band.reader()?;
        let tile = reader.read_transformed_tile(chunk)?;
        Ok(Zip::from(&tile.values)
            .and(&tile.valid)
            .map_collect(|&v, &ok| ok && self.predicate.evaluate(v)))
    }

    pub fn info(&self) -> String {
        format!(
            "{} (band {} of {})",
            self.predicate,
            self.band.index(),
            self.band.source().name()
        )
    }
}

/// Ordered masks; a pixel survives only where every mask is true.
#[derive(Debug, Clone, Default)]
pub struct MaskStack {
    masks: Vec<Mask>,
}

impl MaskStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mask: Mask) {
        self.masks.push(mask);
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Mask> {
        self.masks.iter()
    }

    /// Every mask must cover a raster of `size`.
    pub fn check_size(&self, size: (usize, usize)) -> Result<()> {
        for mask in &self.masks {
            let actual = mask.band.size();
            if actual != size {
                return Err(GeoImageError::SizeMismatch {
                    expected: size,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Mark pixels of `tile` that any mask rejects as invalid.
    pub fn apply_tile(&self, tile: &mut Tile, chunk: &Chunk) -> Result<()> {
        for mask in &self.masks {
            let keep = mask.evaluate(chunk)?;
            tile.valid.zip_mut_with(&keep, |ok, &k| *ok &= k);
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a MaskStack {
    type Item = &'a Mask;
    type IntoIter = std::slice::Iter<'a, Mask>;

    fn into_iter(self) -> Self::IntoIter {
        self.masks.iter()
    }
}
