//! Ordered bands of one raster, addressable by position or by color.

use crate::band::Band;
use crate::chunking::ChunkPolicy;
use crate::error::{GeoImageError, Result};
use crate::source::{SharedSource, SUBDATASETS_DOMAIN};
use crate::stats::Statistics;
use log::{debug, info};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Color (role) names mapped to 1-based band positions.
///
/// Names are case-insensitive. Each position carries at most one color.
/// Removing a position drops its color and shifts later positions down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Colors {
    entries: BTreeMap<String, usize>,
}

impl Colors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `color` with position `index`, replacing any previous color
    /// of that position. Index 0 removes the color.
    pub fn set(&mut self, color: &str, index: usize) {
        let color = color.to_ascii_lowercase();
        self.entries.retain(|c, i| *i != index || *c == color);
        if index == 0 {
            self.entries.remove(&color);
        } else {
            self.entries.insert(color, index);
        }
    }

    /// Position of `color`, if present.
    pub fn get(&self, color: &str) -> Option<usize> {
        self.entries
            .get(&color.to_ascii_lowercase())
            .copied()
            .filter(|&i| i > 0)
    }

    /// Color at position `index`, if any.
    pub fn color_of(&self, index: usize) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, &i)| i == index)
            .map(|(c, _)| c.as_str())
    }

    /// Forget position `index` and renumber everything after it.
    pub fn remove_index(&mut self, index: usize) {
        self.entries.retain(|_, i| *i != index);
        for i in self.entries.values_mut() {
            if *i > index {
                *i -= 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(c, &i)| (c.as_str(), i))
    }
}

/// The bands of a raster source.
pub struct BandCollection {
    source: SharedSource,
    name: String,
    product: String,
    bands: Vec<Band>,
    colors: Colors,
}

impl BandCollection {
    /// Collection with no bands loaded.
    pub fn empty(source: SharedSource) -> Self {
        let name = source.name().to_string();
        Self {
            source,
            name,
            product: String::new(),
            bands: Vec::new(),
            colors: Colors::new(),
        }
    }

    /// Open `source` and load its bands.
    pub fn open(source: SharedSource) -> Result<Self> {
        let mut collection = Self::empty(source);
        collection.load_bands()?;
        Ok(collection)
    }

    /// Append one band per raw band of the source or, when the source lists
    /// sub-datasets, one band per sub-dataset. In the latter case the
    /// collection is re-pointed at the largest sub-dataset.
    pub fn load_bands(&mut self) -> Result<()> {
        let names: Vec<String> = self
            .source
            .metadata_domain(SUBDATASETS_DOMAIN)
            .iter()
            .filter_map(|entry| entry.split_once('='))
            .filter(|(key, _)| key.ends_with("_NAME"))
            .map(|(_, value)| value.to_string())
            .collect();

        if names.is_empty() {
            let count = self.source.band_count();
            info!("Loading {} bands from {}", count, self.name);
            for index in 1..=count {
                self.bands.push(Band::open(Arc::clone(&self.source), index)?);
            }
            return Ok(());
        }

        info!("Loading {} sub-datasets from {}", names.len(), self.name);
        let first_new = self.bands.len();
        for name in &names {
            let sub = self.source.open_subdataset(name)?;
            self.bands.push(Band::open(sub, 1)?);
        }

        let mut largest = first_new;
        for i in first_new..self.bands.len() {
            if self.bands[i].num_pixels() > self.bands[largest].num_pixels() {
                largest = i;
            }
        }
        let replacement = Arc::clone(self.bands[largest].source());
        debug!(
            "Re-pointing {} at sub-dataset {} ({}x{})",
            self.name,
            replacement.name(),
            replacement.size().0,
            replacement.size().1
        );
        self.source = replacement;
        Ok(())
    }

    pub fn source(&self) -> &SharedSource {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn set_product(&mut self, product: impl Into<String>) {
        self.product = product.into();
    }

    /// `(width, height)` of the backing source.
    pub fn size(&self) -> (usize, usize) {
        self.source.size()
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn colors(&self) -> &Colors {
        &self.colors
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index == 0 || index > self.bands.len() {
            return Err(GeoImageError::BandOutOfRange {
                index,
                count: self.bands.len(),
            });
        }
        Ok(())
    }

    /// Band at 1-based position `index`.
    pub fn band(&self, index: usize) -> Result<&Band> {
        self.check_index(index)?;
        Ok(&self.bands[index - 1])
    }

    pub fn band_mut(&mut self, index: usize) -> Result<&mut Band> {
        self.check_index(index)?;
        Ok(&mut self.bands[index - 1])
    }

    /// Band carrying `color`.
    pub fn get(&self, color: &str) -> Result<&Band> {
        let index = self
            .colors
            .get(color)
            .ok_or_else(|| GeoImageError::ColorNotFound(color.to_string()))?;
        self.band(index)
    }

    pub fn get_mut(&mut self, color: &str) -> Result<&mut Band> {
        let index = self
            .colors
            .get(color)
            .ok_or_else(|| GeoImageError::ColorNotFound(color.to_string()))?;
        self.band_mut(index)
    }

    pub fn set_color(&mut self, color: &str, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.colors.set(color, index);
        Ok(())
    }

    /// Assign colors positionally; empty names leave a band uncolored.
    pub fn set_colors<S: AsRef<str>>(&mut self, colors: &[S]) -> Result<()> {
        if colors.len() > self.bands.len() {
            return Err(GeoImageError::BandOutOfRange {
                index: colors.len(),
                count: self.bands.len(),
            });
        }
        for (i, color) in colors.iter().enumerate() {
            let color = color.as_ref().trim();
            if !color.is_empty() {
                self.colors.set(color, i + 1);
            }
        }
        Ok(())
    }

    /// Append a band. Colors are left untouched.
    pub fn add_band(&mut self, band: Band) {
        self.bands.push(band);
    }

    /// Remove the band at 1-based `index`, renumbering colors after it.
    pub fn remove_band(&mut self, index: usize) -> Result<Band> {
        self.check_index(index)?;
        let band = self.bands.remove(index - 1);
        self.colors.remove_index(index);
        Ok(band)
    }

    /// Keep only bands whose color is in `keep`, preserving their order.
    pub fn prune_bands<S: AsRef<str>>(&mut self, keep: &[S]) -> Result<()> {
        for index in (1..=self.bands.len()).rev() {
            let retained = self.colors.color_of(index).is_some_and(|color| {
                keep.iter()
                    .any(|k| k.as_ref().eq_ignore_ascii_case(color))
            });
            if !retained {
                self.remove_band(index)?;
            }
        }
        Ok(())
    }

    /// Band descriptions in order.
    pub fn band_names(&self) -> Vec<String> {
        self.bands
            .iter()
            .map(|b| b.description().to_string())
            .collect()
    }

    pub fn set_chunk_policy(&mut self, policy: ChunkPolicy) {
        for band in &mut self.bands {
            band.set_chunk_policy(policy);
        }
    }

    pub fn compute_stats(&self) -> Result<Vec<Statistics>> {
        self.bands.iter().map(Band::compute_stats).collect()
    }

    /// Process every band into the band at the same position of `destination`.
    pub fn process_into(&self, destination: &BandCollection) -> Result<()> {
        if destination.num_bands() != self.num_bands() {
            return Err(GeoImageError::BandOutOfRange {
                index: self.num_bands(),
                count: destination.num_bands(),
            });
        }
        for (src, dst) in self.bands.iter().zip(&destination.bands) {
            dst.process_from(src)?;
        }
        Ok(())
    }

    /// Map coordinates of the top-left corner, when georeferenced.
    pub fn top_left(&self) -> Option<(f64, f64)> {
        self.source.geo_transform().map(|gt| (gt[0], gt[3]))
    }

    /// Map coordinates of the lower-right corner, when georeferenced.
    pub fn lower_right(&self) -> Option<(f64, f64)> {
        let (width, height) = self.size();
        let (w, h) = (width as f64, height as f64);
        self.source
            .geo_transform()
            .map(|gt| (gt[0] + w * gt[1] + h * gt[2], gt[3] + w * gt[4] + h * gt[5]))
    }

    pub fn info(&self, band_info: bool, show_stats: bool) -> Result<String> {
        let (width, height) = self.size();
        let mut info = String::new();
        let _ = writeln!(
            info,
            "{} - {} bands ({}x{}) {}",
            self.name,
            self.bands.len(),
            width,
            height,
            self.product
        );
        if let (Some(tl), Some(lr)) = (self.top_left(), self.lower_right()) {
            let _ = writeln!(info, "\tGeo Coordinates (top left): {}, {}", tl.0, tl.1);
            let _ = writeln!(info, "\tGeo Coordinates (lower right): {}, {}", lr.0, lr.1);
        }
        if band_info {
            for (i, band) in self.bands.iter().enumerate() {
                let color = self
                    .colors
                    .color_of(i + 1)
                    .map(|c| format!(" ({})", c))
                    .unwrap_or_default();
                let _ = write!(info, "\tBand {}{}: {}", i + 1, color, band.info(show_stats)?);
            }
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataType;
    use crate::source::{BandMetadata, MemorySource};

    fn collection(num_bands: usize) -> BandCollection {
        let mut source = MemorySource::new("scene.tif", 4, 3).unwrap();
        for b in 0..num_bands {
            source = source
                .with_filled_band(DataType::UInt16, b as f64)
                .unwrap()
                .with_metadata(BandMetadata {
                    description: format!("band{}", b + 1),
                    ..Default::default()
                })
                .unwrap();
        }
        BandCollection::open(source.into_shared()).unwrap()
    }

    #[test]
    fn test_colors_remove_shifts_later_entries() {
        let mut colors = Colors::new();
        colors.set("red", 1);
        colors.set("green", 2);
        colors.set("blue", 3);
        colors.remove_index(2);
        assert_eq!(colors.get("red"), Some(1));
        assert_eq!(colors.get("green"), None);
        assert_eq!(colors.get("blue"), Some(2));
    }

    #[test]
    fn test_colors_one_per_position() {
        let mut colors = Colors::new();
        colors.set("red", 1);
        colors.set("NIR", 1);
        assert_eq!(colors.get("red"), None);
        assert_eq!(colors.get("nir"), Some(1));
        assert_eq!(colors.color_of(1), Some("nir"));
        colors.set("nir", 0);
        assert!(colors.is_empty());
    }

    #[test]
    fn test_open_loads_raw_bands() {
        let c = collection(3);
        assert_eq!(c.num_bands(), 3);
        assert_eq!(c.band_names(), vec!["band1", "band2", "band3"]);
        assert_eq!(c.band(2).unwrap().index(), 2);
        assert!(matches!(
            c.band(4),
            Err(GeoImageError::BandOutOfRange { index: 4, count: 3 })
        ));
    }

    #[test]
    fn test_remove_band_keeps_color_lookups_correct() {
        let mut c = collection(3);
        c.set_colors(&["red", "green", "blue"]).unwrap();
        let removed = c.remove_band(1).unwrap();
        assert_eq!(removed.description(), "band1");
        assert_eq!(c.get("blue").unwrap().description(), "band3");
        assert!(matches!(c.get("red"), Err(GeoImageError::ColorNotFound(_))));
        assert!(c.remove_band(5).is_err());
    }

    #[test]
    fn test_add_band_leaves_colors() {
        let mut c = collection(1);
        c.set_color("pan", 1).unwrap();
        let copy = c.band(1).unwrap().clone();
        c.add_band(copy);
        assert_eq!(c.num_bands(), 2);
        assert_eq!(c.colors().len(), 1);
        assert!(c.set_color("red", 3).is_err());
    }

    #[test]
    fn test_prune_keeps_order() {
        let mut c = collection(4);
        c.set_colors(&["blue", "", "red", "green"]).unwrap();
        c.prune_bands(&["green", "BLUE"]).unwrap();
        assert_eq!(c.band_names(), vec!["band1", "band4"]);
        assert_eq!(c.get("green").unwrap().description(), "band4");
        assert_eq!(c.get("blue").unwrap().description(), "band1");
    }

    #[test]
    fn test_get_mut_by_color() {
        let mut c = collection(2);
        c.set_colors(&["red", "nir"]).unwrap();
        c.get_mut("nir").unwrap().set_gain(2.0).unwrap();
        assert_eq!(c.band(2).unwrap().gain(), 2.0);
    }

    #[test]
    fn test_subdatasets_repoint_to_largest() {
        let small = MemorySource::new("small", 2, 2)
            .unwrap()
            .with_filled_band(DataType::Float32, 1.0)
            .unwrap()
            .into_shared();
        let large = MemorySource::new("large", 4, 4)
            .unwrap()
            .with_filled_band(DataType::Float32, 2.0)
            .unwrap()
            .into_shared();
        let also_large = MemorySource::new("also_large", 4, 4)
            .unwrap()
            .with_filled_band(DataType::Float32, 3.0)
            .unwrap()
            .into_shared();
        let container = MemorySource::new("container.hdf", 1, 1)
            .unwrap()
            .with_subdataset("small", small)
            .with_subdataset("large", large)
            .with_subdataset("also_large", also_large)
            .into_shared();

        let c = BandCollection::open(container).unwrap();
        assert_eq!(c.num_bands(), 3);
        assert_eq!(c.source().name(), "large");
        assert_eq!(c.size(), (4, 4));
        assert_eq!(c.name(), "container.hdf");
    }

    #[test]
    fn test_info_report() {
        let source = MemorySource::new("scene.tif", 2, 2)
            .unwrap()
            .with_filled_band(DataType::UInt8, 1.0)
            .unwrap()
            .with_geo_transform([100.0, 30.0, 0.0, 500.0, 0.0, -30.0])
            .into_shared();
        let mut c = BandCollection::open(source).unwrap();
        c.set_product("TOA");
        c.set_color("red", 1).unwrap();

        let info = c.info(true, false).unwrap();
        let lines: Vec<&str> = info.lines().collect();
        assert_eq!(lines[0], "scene.tif - 1 bands (2x2) TOA");
        assert_eq!(lines[1], "\tGeo Coordinates (top left): 100, 500");
        assert_eq!(lines[2], "\tGeo Coordinates (lower right): 160, 440");
        assert_eq!(lines[3], "\tBand 1 (red): 2 x 2 Byte: ");
    }
}
