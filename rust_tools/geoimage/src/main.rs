use clap::Parser;
use env_logger::Env;
use log::{info, warn};

use geoimage::cli::Args;
use geoimage::gdal_source::{GdalSource, OutputOptions};
use geoimage::{BandCollection, Mask, Predicate, Result};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("=== GeoImage ===");

    // Set thread pool size if specified
    if let Some(n_threads) = args.threads {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
        {
            Ok(()) => info!("Using {} threads", n_threads),
            Err(e) => warn!("Could not size thread pool: {}", e),
        }
    } else {
        info!("Using all available threads");
    }

    let policy = args.chunk_policy()?;
    let functions = args.parsed_functions()?;
    let output_type = args.parsed_data_type()?;

    let input = GdalSource::open(&args.input)?.into_shared();
    let mut collection = BandCollection::open(input)?;
    collection.set_chunk_policy(policy);

    if !args.colors.is_empty() {
        collection.set_colors(&args.colors)?;
    }
    if !args.keep.is_empty() {
        collection.prune_bands(&args.keep)?;
        info!("Kept {} bands", collection.num_bands());
    }

    for index in 1..=collection.num_bands() {
        let band = collection.band_mut(index)?;
        if let Some(nodata) = args.nodata {
            band.set_nodata(nodata);
        }
        if let Some(gain) = args.gain {
            band.set_gain(gain)?;
        }
        if let Some(offset) = args.offset {
            band.set_offset(offset);
        }
        for function in &functions {
            band.add_function(*function);
        }
        if let Some(threshold) = args.mask_above {
            let mask = Mask::new(band.clone(), Predicate::Above(threshold));
            band.add_mask(mask);
        }
    }

    print!("{}", collection.info(true, args.stats)?);

    for (i, band) in collection.bands().iter().enumerate() {
        if let Some(bins) = args.histogram {
            let counts: Vec<String> = band
                .histogram(bins, args.cumulative)?
                .iter()
                .map(|c| c.to_string())
                .collect();
            println!("Band {} histogram: {}", i + 1, counts.join(" "));
        }
        for &p in &args.percentile {
            println!("Band {} percentile {}: {}", i + 1, p, band.percentile(p)?);
        }
    }

    if let Some(output) = &args.output {
        let first = collection.band(1)?;
        let options = OutputOptions {
            data_type: output_type.unwrap_or(first.data_type()),
            compression: args.compress.clone(),
            block_size: args.block_size,
            nodata: args.nodata.or(first.nodata()),
        };
        info!("Writing output: {} ({})", output, options.data_type);

        let created = GdalSource::create(
            output,
            collection.size(),
            collection.num_bands(),
            Some(collection.source().as_ref()),
            &options,
        )?;
        let mut destination = BandCollection::open(created.into_shared())?;
        destination.set_chunk_policy(policy);
        collection.process_into(&destination)?;
    }

    info!("=== Done! ===");
    Ok(())
}
