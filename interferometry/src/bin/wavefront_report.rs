//! Wavefront report
//!
//! Runs the phase-shifting analysis on an NPZ acquisition archive and prints
//! surface statistics, Seidel aberrations and Zernike coefficients. The
//! computed maps can be written to an NPZ archive for plotting.
//!
//! The archive holds an `Images` stack of 5·k frames, and optionally a
//! `Masks` stack with `Masks_type` codes. When masks are present their union
//! defines the pupil; otherwise every pixel is analysed.

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use interferometry::{
    analyze, Aberration, AnalysisConfig, InterferogramDataset, MaskPolicy, WavefrontAnalysis,
    ZernikeIndexing,
};
use log::{info, warn};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Wavefront Report",
    about = "Analyses five-frame phase-shifting interferograms",
    long_about = None
)]
struct Args {
    /// NPZ archive holding the interferograms
    input: PathBuf,

    /// Index of the interferogram set to analyse
    #[arg(long, default_value_t = 0)]
    set: usize,

    /// Analyse every set of the archive
    #[arg(long)]
    all_sets: bool,

    /// JSON analysis configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of Zernike terms fitted
    #[arg(long)]
    max_order: Option<usize>,

    /// Zernike ordering (fringe, noll, ansi)
    #[arg(long, value_parser = parse_indexing)]
    indexing: Option<ZernikeIndexing>,

    /// Aberrations removed from the surface, comma separated
    #[arg(long, value_delimiter = ',')]
    aberrations: Option<Vec<Aberration>>,

    /// Illumination wavelength in nanometres
    #[arg(long)]
    wavelength_nm: Option<f64>,

    /// Side of the PSF grid
    #[arg(long)]
    psf_size: Option<usize>,

    /// PSF zoom exponent
    #[arg(long)]
    zoom: Option<u32>,

    /// Surface scale, 0.5 for a double-pass setup
    #[arg(long)]
    wedge_factor: Option<f64>,

    /// Write the computed maps of the (first) analysed set to this NPZ file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Save the effective configuration to this JSON file
    #[arg(long)]
    write_config: Option<PathBuf>,
}

fn parse_indexing(s: &str) -> Result<ZernikeIndexing, String> {
    match s.to_ascii_lowercase().as_str() {
        "fringe" => Ok(ZernikeIndexing::Fringe),
        "noll" => Ok(ZernikeIndexing::Noll),
        "ansi" | "osa" => Ok(ZernikeIndexing::Ansi),
        other => Err(format!("unknown Zernike indexing '{other}'")),
    }
}

fn build_config(args: &Args) -> Result<AnalysisConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load_from_file(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(max_order) = args.max_order {
        config.max_order = max_order;
    }
    if let Some(indexing) = args.indexing {
        config.indexing = indexing;
    }
    if let Some(aberrations) = &args.aberrations {
        config.aberrations = aberrations.clone();
    }
    if let Some(wavelength) = args.wavelength_nm {
        config.wavelength_nm = wavelength;
    }
    if let Some(size) = args.psf_size {
        config.psf_size = size;
    }
    if let Some(zoom) = args.zoom {
        config.psf_zoom = zoom;
    }
    if let Some(factor) = args.wedge_factor {
        config.wedge_factor = factor;
    }
    config.validate()?;
    Ok(config)
}

fn print_report(index: usize, analysis: &WavefrontAnalysis) {
    let wavelength = analysis.config.wavelength_nm;
    let title = format!("Set {index}");
    println!("\n{title}");
    println!("{}", "=".repeat(title.len()));

    if let Some(region) = &analysis.crop {
        println!("Cropped to {}x{} pixels", region.width(), region.height());
    }
    let diagnostics = &analysis.unwrap_outcome.diagnostics;
    println!(
        "Unwrap: {} (offset std {:.2e}, problematic {:.2}%)",
        if analysis.unwrap_outcome.reliable {
            "reliable"
        } else {
            "UNRELIABLE"
        },
        diagnostics.offset_std,
        diagnostics.problematic_ratio * 100.0
    );

    println!("\nSurface (waves)");
    println!("  measured:  {}", analysis.surface_statistics);
    println!("  corrected: {}", analysis.corrected_statistics);
    let nm = analysis.corrected_statistics.to_nanometers(wavelength);
    println!(
        "  corrected: PV {:.1} nm, RMS {:.1} nm",
        nm.peak_to_valley, nm.rms
    );

    println!("\nSeidel aberrations");
    print!("{}", analysis.seidel);

    println!("\nZernike coefficients ({:?})", analysis.coefficients.indexing);
    println!("{:>4} {:>4} {:>4} {:>10} {:>10}", "#", "n", "m", "waves", "nm");
    for (position, (mode, value)) in analysis.coefficients.iter_modes().enumerate() {
        if value != 0.0 {
            println!(
                "{:>4} {:>4} {:>4} {:>10.4} {:>10.2}",
                position,
                mode.n,
                mode.m,
                value,
                value * wavelength
            );
        }
    }

    println!("\nFocal plane");
    println!("  Strehl ratio: {:.4}", analysis.strehl_ratio());
    let radii = analysis.circled_energy.radii_micrometers(
        wavelength,
        analysis.config.f_number,
        analysis.config.psf_zoom,
    );
    for fraction in [0.5, 0.8] {
        if let Some(r) = analysis.circled_energy.radius_enclosing(fraction) {
            let um = radii[r as usize];
            println!(
                "  EE{:.0}: {:.0} px ({:.2} µm)",
                fraction * 100.0,
                r,
                um
            );
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = build_config(&args)?;
    if let Some(path) = &args.write_config {
        config.save_to_file(path)?;
        info!("Configuration written to {}", path.display());
    }

    let dataset = InterferogramDataset::load_npz(&args.input)?;
    info!(
        "Loaded {} set(s) and {} mask(s) from {}",
        dataset.len(),
        dataset.masks.len(),
        args.input.display()
    );
    let policy = if dataset.masks.is_empty() {
        MaskPolicy::AllValid
    } else {
        MaskPolicy::Union(dataset.masks.clone())
    };

    let indices: Vec<usize> = if args.all_sets {
        (0..dataset.len()).collect()
    } else {
        vec![args.set]
    };

    let progress = args.all_sets.then(|| {
        let pb = ProgressBar::new(indices.len() as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
        }
        pb.set_message("Analysing sets");
        pb
    });

    let mut analyses = Vec::with_capacity(indices.len());
    for &index in &indices {
        let frames = dataset.set(index).ok_or_else(|| {
            format!(
                "set {index} out of range, archive holds {} set(s)",
                dataset.len()
            )
        })?;
        match analyze(frames, &policy, &config, None) {
            Ok(analysis) => analyses.push((index, analysis)),
            Err(e) if args.all_sets => warn!("Set {index} skipped: {e}"),
            Err(e) => return Err(e.into()),
        }
        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }
    if let Some(pb) = progress {
        pb.finish_with_message("Done");
    }

    for (index, analysis) in &analyses {
        print_report(*index, analysis);
    }

    if let (Some(path), Some((index, analysis))) = (&args.output, analyses.first()) {
        analysis.save_npz(path)?;
        println!("\nSet {index} products written to {}", path.display());
    }

    Ok(())
}
