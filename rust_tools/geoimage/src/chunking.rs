use crate::error::{GeoImageError, Result};
use log::debug;

/// Bytes per pixel of the working (`f64`) tile buffers.
pub const WORKING_PIXEL_BYTES: usize = std::mem::size_of::<f64>();

/// Default memory budget for a single tile buffer (128 MiB).
pub const DEFAULT_CHUNK_BYTES: usize = 128 * 1024 * 1024;

/// How a raster is cut into tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPolicy {
    /// Largest tile whose working buffer fits in `max_bytes`.
    Budget { max_bytes: usize },
    /// Fixed nominal tile shape.
    TileShape { cols: usize, rows: usize },
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        ChunkPolicy::Budget {
            max_bytes: DEFAULT_CHUNK_BYTES,
        }
    }
}

impl ChunkPolicy {
    pub fn with_budget(max_bytes: usize) -> Result<Self> {
        if max_bytes == 0 {
            return Err(GeoImageError::InvalidChunkSize(max_bytes));
        }
        Ok(ChunkPolicy::Budget { max_bytes })
    }

    pub fn with_megabytes(megabytes: usize) -> Result<Self> {
        Self::with_budget(megabytes.saturating_mul(1024 * 1024))
    }

    pub fn with_tile_shape(cols: usize, rows: usize) -> Result<Self> {
        if cols == 0 {
            return Err(GeoImageError::InvalidChunkSize(cols));
        }
        if rows == 0 {
            return Err(GeoImageError::InvalidChunkSize(rows));
        }
        Ok(ChunkPolicy::TileShape { cols, rows })
    }

    /// Nominal `(cols, rows)` of a tile for a raster of the given size.
    ///
    /// A budget that holds at least one full row gives full-width strips,
    /// otherwise square tiles.
    pub fn tile_shape(&self, raster_width: usize, raster_height: usize) -> (usize, usize) {
        match *self {
            ChunkPolicy::TileShape { cols, rows } => (cols.max(1), rows.max(1)),
            ChunkPolicy::Budget { max_bytes } => {
                let max_pixels = (max_bytes / WORKING_PIXEL_BYTES).max(1);
                if raster_width > 0 && max_pixels >= raster_width {
                    let rows = (max_pixels / raster_width).clamp(1, raster_height.max(1));
                    (raster_width, rows)
                } else {
                    let side = ((max_pixels as f64).sqrt().floor() as usize).max(1);
                    (side, side)
                }
            }
        }
    }
}

/// One tile of a raster. `index` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub row_offset: usize,
    pub col_offset: usize,
    pub width: usize,
    pub height: usize,
}

impl Chunk {
    /// A single chunk covering a whole `width x height` raster.
    pub fn full(width: usize, height: usize) -> Self {
        Chunk {
            index: 1,
            row_offset: 0,
            col_offset: 0,
            width,
            height,
        }
    }

    pub fn num_pixels(&self) -> usize {
        self.width * self.height
    }

    pub fn row_end(&self) -> usize {
        self.row_offset + self.height
    }

    pub fn col_end(&self) -> usize {
        self.col_offset + self.width
    }
}

/// Row-major tiling of a raster.
#[derive(Debug, Clone)]
pub struct ChunkGrid {
    raster_width: usize,
    raster_height: usize,
    tile_cols: usize,
    tile_rows: usize,
    pub num_chunks_x: usize,
    pub num_chunks_y: usize,
}

impl ChunkGrid {
    pub fn new(raster_width: usize, raster_height: usize, policy: &ChunkPolicy) -> Result<Self> {
        if raster_width == 0 || raster_height == 0 {
            return Err(GeoImageError::InvalidDimensions(raster_width, raster_height));
        }
        let (tile_cols, tile_rows) = policy.tile_shape(raster_width, raster_height);

        let num_chunks_x = raster_width.div_ceil(tile_cols);
        let num_chunks_y = raster_height.div_ceil(tile_rows);

        debug!(
            "ChunkGrid: {}x{} raster, tile {}x{} → {}x{} chunks ({} total)",
            raster_width,
            raster_height,
            tile_cols,
            tile_rows,
            num_chunks_x,
            num_chunks_y,
            num_chunks_x * num_chunks_y
        );

        Ok(Self {
            raster_width,
            raster_height,
            tile_cols,
            tile_rows,
            num_chunks_x,
            num_chunks_y,
        })
    }

    pub fn num_chunks(&self) -> usize {
        self.num_chunks_x * self.num_chunks_y
    }

    pub fn raster_size(&self) -> (usize, usize) {
        (self.raster_width, self.raster_height)
    }

    pub fn tile_shape(&self) -> (usize, usize) {
        (self.tile_cols, self.tile_rows)
    }

    /// Rectangle of 1-based chunk `index`.
    pub fn chunk(&self, index: usize) -> Result<Chunk> {
        let count = self.num_chunks();
        if index == 0 || index > count {
            return Err(GeoImageError::ChunkOutOfRange { index, count });
        }
        let linear = index - 1;
        let chunk_y = linear / self.num_chunks_x;
        let chunk_x = linear % self.num_chunks_x;

        let col_offset = chunk_x * self.tile_cols;
        let row_offset = chunk_y * self.tile_rows;
        let col_end = (col_offset + self.tile_cols).min(self.raster_width);
        let row_end = (row_offset + self.tile_rows).min(self.raster_height);

        Ok(Chunk {
            index,
            row_offset,
            col_offset,
            width: col_end - col_offset,
            height: row_end - row_offset,
        })
    }

    pub fn iter(&self) -> ChunkIterator<'_> {
        ChunkIterator::new(self)
    }
}

pub struct ChunkIterator<'a> {
    grid: &'a ChunkGrid,
    next_index: usize,
}

impl<'a> ChunkIterator<'a> {
    fn new(grid: &'a ChunkGrid) -> Self {
        Self {
            grid,
            next_index: 1,
        }
    }
}

impl<'a> Iterator for ChunkIterator<'a> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.grid.chunk(self.next_index).ok()?;
        self.next_index += 1;
        Some(chunk)
    }
}
