//! A single raster plane and its derived state.

use crate::chunking::{ChunkGrid, ChunkPolicy};
use crate::datatype::DataType;
use crate::error::{GeoImageError, Result};
use crate::function::{Function, FunctionPipeline};
use crate::histogram;
use crate::mask::{Mask, MaskStack};
use crate::process;
use crate::reader::TiledReader;
use crate::source::SharedSource;
use crate::stats::{compute_statistics, Statistics};
use log::debug;
use ndarray::Array1;
use parking_lot::RwLock;
use std::fmt;
use std::fmt::Write as _;
use std::sync::Arc;

/// One band of a raster source, with calibration, nodata, attached
/// functions and masks, and cached statistics.
///
/// The statistics cache is cleared by every setter that changes the values
/// the band exposes (gain, offset, nodata, functions, masks) and when the
/// band is written by [`Band::process_from`].
pub struct Band {
    source: SharedSource,
    index: usize,
    data_type: DataType,
    description: String,
    gain: f64,
    offset: f64,
    nodata: Option<f64>,
    chunk_policy: ChunkPolicy,
    functions: FunctionPipeline,
    masks: MaskStack,
    stats: RwLock<Option<Statistics>>,
}

impl Band {
    /// Band `index` (1-based) of `source`, with the source's stored metadata.
    pub fn open(source: SharedSource, index: usize) -> Result<Self> {
        let data_type = source.data_type(index)?;
        let metadata = source.band_metadata(index)?;
        debug!(
            "Opened band {} of {} ({}, gain={}, offset={}, nodata={:?})",
            index,
            source.name(),
            data_type,
            metadata.gain,
            metadata.offset,
            metadata.nodata
        );
        Ok(Self {
            source,
            index,
            data_type,
            description: metadata.description,
            gain: metadata.gain,
            offset: metadata.offset,
            nodata: metadata.nodata,
            chunk_policy: ChunkPolicy::default(),
            functions: FunctionPipeline::new(),
            masks: MaskStack::new(),
            stats: RwLock::new(None),
        })
    }

    pub fn source(&self) -> &SharedSource {
        &self.source
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// `(width, height)` in pixels.
    pub fn size(&self) -> (usize, usize) {
        self.source.size()
    }

    pub fn num_pixels(&self) -> usize {
        let (width, height) = self.size();
        width * height
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Fails with [`GeoImageError::InvalidGain`] for a zero gain, which
    /// could not be undone on write.
    pub fn set_gain(&mut self, gain: f64) -> Result<()> {
        if gain == 0.0 {
            return Err(GeoImageError::InvalidGain(gain));
        }
        self.gain = gain;
        self.invalidate_stats();
        Ok(())
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: f64) {
        self.offset = offset;
        self.invalidate_stats();
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn has_nodata(&self) -> bool {
        self.nodata.is_some()
    }

    pub fn set_nodata(&mut self, value: f64) {
        self.nodata = Some(value);
        self.invalidate_stats();
    }

    pub fn clear_nodata(&mut self) {
        self.nodata = None;
        self.invalidate_stats();
    }

    pub fn chunk_policy(&self) -> &ChunkPolicy {
        &self.chunk_policy
    }

    pub fn set_chunk_policy(&mut self, policy: ChunkPolicy) {
        self.chunk_policy = policy;
    }

    pub fn chunk_grid(&self) -> Result<ChunkGrid> {
        let (width, height) = self.size();
        ChunkGrid::new(width, height, &self.chunk_policy)
    }

    pub fn reader(&self) -> Result<TiledReader<'_>> {
        TiledReader::new(self)
    }

    pub fn functions(&self) -> &FunctionPipeline {
        &self.functions
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
        self.invalidate_stats();
    }

    /// Copy of this band, sharing its source, with `function` appended.
    pub fn derive(&self, function: Function) -> Band {
        let mut band = self.clone();
        band.add_function(function);
        band
    }

    pub fn masks(&self) -> &MaskStack {
        &self.masks
    }

    pub fn add_mask(&mut self, mask: Mask) {
        self.masks.push(mask);
        self.invalidate_stats();
    }

    pub fn stats_valid(&self) -> bool {
        self.stats.read().is_some()
    }

    /// Cached snapshot, if still valid.
    pub fn cached_stats(&self) -> Option<Statistics> {
        *self.stats.read()
    }

    pub(crate) fn invalidate_stats(&self) {
        *self.stats.write() = None;
    }

    /// Statistics of the band's valid pixels, computed on first use.
    pub fn compute_stats(&self) -> Result<Statistics> {
        if let Some(stats) = self.cached_stats() {
            return Ok(stats);
        }
        let stats = compute_statistics(&self.reader()?)?;
        *self.stats.write() = Some(stats);
        Ok(stats)
    }

    pub fn histogram(&self, bins: usize, cumulative: bool) -> Result<Array1<f64>> {
        histogram::histogram(self, bins, cumulative)
    }

    pub fn percentile(&self, p: f64) -> Result<f64> {
        histogram::percentile(self, p)
    }

    /// Derive this band's pixels from `source`: see [`process::process`].
    pub fn process_from(&self, source: &Band) -> Result<()> {
        process::process(self, source)
    }

    /// Multi-line report: size, type, calibration, optional statistics,
    /// then attached functions and masks.
    pub fn info(&self, show_stats: bool) -> Result<String> {
        let (width, height) = self.size();
        let mut info = String::new();
        let _ = writeln!(
            info,
            "{} x {} {}: {}",
            width, height, self.data_type, self.description
        );
        let _ = write!(info, "\t\tGain = {}, Offset = {}", self.gain, self.offset);
        match self.nodata {
            Some(nd) => {
                let _ = writeln!(info, ", NoData = {}", nd);
            }
            None => info.push('\n'),
        }
        if show_stats {
            let _ = writeln!(info, "\t\t{}", self.compute_stats()?);
        }
        if !self.functions.is_empty() {
            info.push_str("\t\tFunctions:\n");
        }
        for function in &self.functions {
            let _ = writeln!(info, "\t\t\t{}", function);
        }
        if !self.masks.is_empty() {
            info.push_str("\t\tMasks:\n");
        }
        for mask in &self.masks {
            let _ = writeln!(info, "\t\t\t{}", mask.info());
        }
        Ok(info)
    }
}

impl Clone for Band {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            index: self.index,
            data_type: self.data_type,
            description: self.description.clone(),
            gain: self.gain,
            offset: self.offset,
            nodata: self.nodata,
            chunk_policy: self.chunk_policy,
            functions: self.functions.clone(),
            masks: self.masks.clone(),
            stats: RwLock::new(self.cached_stats()),
        }
    }
}

impl fmt::Debug for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Band")
            .field("source", &self.source.name())
            .field("index", &self.index)
            .field("data_type", &self.data_type)
            .field("gain", &self.gain)
            .field("offset", &self.offset)
            .field("nodata", &self.nodata)
            .field("functions", &self.functions.len())
            .field("masks", &self.masks.len())
            .field("stats", &self.cached_stats())
            .finish()
    }
}
