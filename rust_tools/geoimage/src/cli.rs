use crate::chunking::ChunkPolicy;
use crate::datatype::DataType;
use crate::error::Result;
use crate::function::Function;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "geoimage")]
#[command(about = "Report statistics, histograms and percentiles of raster bands, and derive new bands")]
#[command(version)]
pub struct Args {
    /// Input raster path (any GDAL-readable dataset)
    #[arg(value_name = "FILE")]
    pub input: String,

    /// Output GeoTIFF receiving the processed bands
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Include statistics in the band report
    #[arg(short, long)]
    pub stats: bool,

    /// Print a histogram with this many bins for every band
    #[arg(long, value_name = "BINS")]
    pub histogram: Option<usize>,

    /// Make the printed histogram cumulative
    #[arg(long, requires = "histogram")]
    pub cumulative: bool,

    /// Print the estimated percentile of every band (repeatable)
    #[arg(short, long, value_name = "P")]
    pub percentile: Vec<f64>,

    /// Override nodata value (default: read from input)
    #[arg(long, value_name = "VALUE", allow_hyphen_values = true)]
    pub nodata: Option<f64>,

    /// Override gain (default: read from input)
    #[arg(long, value_name = "VALUE", allow_hyphen_values = true)]
    pub gain: Option<f64>,

    /// Override offset (default: read from input)
    #[arg(long, value_name = "VALUE", allow_hyphen_values = true)]
    pub offset: Option<f64>,

    /// Function applied to every band, e.g. "multiply 0.0001" (repeatable)
    #[arg(short, long = "function", value_name = "FUNCTION", allow_hyphen_values = true)]
    pub functions: Vec<String>,

    /// Mask out pixels that are not above this value
    #[arg(long, value_name = "VALUE", allow_hyphen_values = true)]
    pub mask_above: Option<f64>,

    /// Color names assigned to bands in order, e.g. red,green,blue
    #[arg(long, value_name = "COLORS", value_delimiter = ',')]
    pub colors: Vec<String>,

    /// Keep only the bands with these colors (repeatable)
    #[arg(short, long, value_name = "COLOR")]
    pub keep: Vec<String>,

    /// Memory budget per tile in megabytes
    #[arg(long, value_name = "MB", default_value_t = 128)]
    pub chunk_mb: usize,

    /// Output data type (default: type of the first input band)
    #[arg(long, value_name = "TYPE")]
    pub data_type: Option<String>,

    /// Output compression: DEFLATE, LZW, ZSTD or NONE
    #[arg(long, value_name = "TYPE", default_value = "DEFLATE")]
    pub compress: String,

    /// Output tile size (must be multiple of 16)
    #[arg(long, value_name = "PIXELS", default_value_t = 512)]
    pub block_size: usize,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn chunk_policy(&self) -> Result<ChunkPolicy> {
        ChunkPolicy::with_megabytes(self.chunk_mb)
    }

    pub fn parsed_functions(&self) -> Result<Vec<Function>> {
        self.functions.iter().map(|f| f.parse()).collect()
    }

    pub fn parsed_data_type(&self) -> Result<Option<DataType>> {
        self.data_type.as_deref().map(str::parse::<DataType>).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Operation;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "geoimage",
            "scene.tif",
            "-o",
            "out.tif",
            "--stats",
            "--histogram",
            "50",
            "--cumulative",
            "-p",
            "5",
            "-p",
            "95",
            "--nodata",
            "-9999",
            "--function",
            "multiply 0.0001",
            "--colors",
            "red,green,,nir",
            "--keep",
            "nir",
            "--data-type",
            "float32",
        ])
        .unwrap();

        assert_eq!(args.input, "scene.tif");
        assert_eq!(args.output.as_deref(), Some("out.tif"));
        assert_eq!(args.histogram, Some(50));
        assert_eq!(args.percentile, vec![5.0, 95.0]);
        assert_eq!(args.nodata, Some(-9999.0));
        assert_eq!(args.colors, vec!["red", "green", "", "nir"]);
        assert_eq!(
            args.parsed_functions().unwrap(),
            vec![Function::new(Operation::Multiply, 0.0001)]
        );
        assert_eq!(args.parsed_data_type().unwrap(), Some(DataType::Float32));
        assert_eq!(args.chunk_mb, 128);
    }

    #[test]
    fn test_cumulative_requires_histogram() {
        assert!(Args::try_parse_from(["geoimage", "a.tif", "--cumulative"]).is_err());
    }

    #[test]
    fn test_bad_values_surface_as_errors() {
        let args = Args::try_parse_from([
            "geoimage",
            "a.tif",
            "--function",
            "frobnicate 2",
            "--data-type",
            "complex64",
            "--chunk-mb",
            "0",
        ])
        .unwrap();
        assert!(args.parsed_functions().is_err());
        assert!(args.parsed_data_type().is_err());
        assert!(args.chunk_policy().is_err());
    }
}
