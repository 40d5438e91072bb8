use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::{FormattedDuration, ProgressBar, ProgressStyle};
use ndarray::prelude::*;

use tsource::constants::*;
use tsource::beam::*;
use tsource::geometry::*;
use tsource::source::*;
use tsource::setup::*;

fn read_bunch(input: &Configuration) -> Result<ElectronBunch, Box<dyn Error>> {
    let mut bunch = ElectronBunch::default()
        .with_gamma(input.real("electron", "gamma")?)
        .with_number(input.real("electron", "charge")? / ELEMENTARY_CHARGE)
        .with_energy_spread(input.real("electron", "energy_spread")?)
        .with_length(input.real("electron", "length")?);

    let eps = input.reals_n::<2>("electron", "emittance")?;
    let beta = input.reals_n::<2>("electron", "beta")?;
    bunch = bunch.with_emittance(eps[0], eps[1]).with_beta(beta[0], beta[1]);

    if let Some(d) = input.reals_n::<3>("electron", "direction").optional()? {
        bunch = bunch.with_direction(Vec3::from(d))?;
    }
    if let Some(r) = input.reals_n::<3>("electron", "shift").optional()? {
        bunch = bunch.with_shift(Vec3::from(r));
    }

    Ok(bunch)
}

fn read_laser(input: &Configuration) -> Result<LaserPulse, Box<dyn Error>> {
    let mut laser = LaserPulse::default()
        .with_photon_energy(input.real("laser", "photon_energy")?)
        .with_pulse_energy(input.real("laser", "pulse_energy")?)
        .with_length(input.real("laser", "length")?)
        .with_rayleigh_length(input.real("laser", "rayleigh_length")?)
        .with_frequency(input.real("laser", "frequency")?);

    if let Some(xi) = input.reals_n::<3>("laser", "polarization").optional()? {
        laser = laser.with_polarization(xi);
    }
    if let Some(d) = input.reals_n::<3>("laser", "direction").optional()? {
        laser = laser.with_direction(Vec3::from(d))?;
    }
    if let Some(r) = input.reals_n::<3>("laser", "shift").optional()? {
        laser = laser.with_shift(Vec3::from(r));
    }

    Ok(laser)
}

fn read_source(input: &Configuration) -> Result<ThomsonSource, Box<dyn Error>> {
    let mut source = ThomsonSource::new(read_bunch(input)?, read_laser(input)?)?;

    if let Some(n) = input.integer("control", "threads").optional()? {
        source = source.with_threads(n.max(1) as usize)?;
    }
    if let Some(seed) = input.integer("control", "seed").optional()? {
        source = source.with_seed(seed as u64);
    }
    if let Some(precision) = input.real("control", "precision").optional()? {
        source = source.with_precision(precision);
    }
    if let Some(samples) = input.integer("control", "samples").optional()? {
        source = source.with_samples(samples.max(1) as usize);
    }
    if let Some(cutoff) = input.real("control", "spread_cutoff").optional()? {
        source = source.with_spread_cutoff(cutoff);
    }
    if let Some(xi) = input.reals_n::<3>("rays", "fixed_polarization").optional()? {
        source = source.with_fixed_polarization(Some(xi));
    }

    Ok(source)
}

fn write_spectrum(source: &ThomsonSource, input: &Configuration, spread: bool, path: &Path, token: &CancellationToken) -> Result<(), Box<dyn Error>> {
    let tx = input.real("spectrum", "x_angle").optional()?.unwrap_or(0.0);
    let ty = input.real("spectrum", "y_angle").optional()?.unwrap_or(0.0);
    let min_energy = input.real("spectrum", "min_energy")?;
    let max_energy = input.real("spectrum", "max_energy")?;
    let points = input.integer("spectrum", "points")?.max(2) as usize;

    let n = source.direction_at(tx, ty);
    let energies = Array1::linspace(min_energy, max_energy, points);
    let flux = source.spectrum(n, &energies, spread, token)?;
    let stokes = source.polarization_spectrum(n, &energies, spread, token)?;

    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "# energy (eV)  flux (photons/s/sr/eV)  Q/I  U/I  V/I")?;
    for (i, (&e, &f)) in energies.iter().zip(flux.iter()).enumerate() {
        let sv = StokesVector::new(stokes[[i, 0]], stokes[[i, 1]], stokes[[i, 2]], stokes[[i, 3]]).normalized();
        writeln!(
            file, "{:.9e} {:.9e} {:.6e} {:.6e} {:.6e}",
            e / ELEMENTARY_CHARGE, f * ELEMENTARY_CHARGE, sv[0], sv[1], sv[2]
        )?;
    }

    Ok(())
}

fn write_angular_map(source: &ThomsonSource, input: &Configuration, spread: bool, path: &Path, token: &CancellationToken) -> Result<(), Box<dyn Error>> {
    let x_range = input.real("angular", "x_range")?;
    let y_range = input.real("angular", "y_range")?;
    let points = input.integer("angular", "points")?.max(2) as usize;

    let xs = Array1::linspace(-x_range, x_range, points);
    let ys = Array1::linspace(-y_range, y_range, points);
    let map = source.angular_map(&xs, &ys, spread, token)?;

    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "# x angle (rad)  y angle (rad)  flux (photons/s/sr)")?;
    for ((i, j), f) in map.indexed_iter() {
        writeln!(file, "{:.9e} {:.9e} {:.9e}", xs[i], ys[j], f)?;
    }

    Ok(())
}

fn write_rays(source: &ThomsonSource, input: &Configuration, path: &Path, token: &CancellationToken) -> Result<(), Box<dyn Error>> {
    let count = input.integer("rays", "count")?.max(0) as usize;
    let mut settings = RaySettings::new(
        input.real("rays", "x_range")?,
        input.real("rays", "y_range")?,
        input.real("rays", "min_energy")?,
        input.real("rays", "max_energy")?,
    );
    if let Some(k) = input.real("rays", "spread_range").optional()? {
        settings = settings.with_spread(k);
    }

    let pb = ProgressBar::new(count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} rays (ETA {eta})")
            .progress_chars("#>-")
    );

    let stats = RayStatistics::new();
    let rays = source.generate_rays(count, settings, &stats, token, |i| pb.set_position(i as u64))?;
    pb.finish_and_clear();

    log::info!(
        "{} rays from {} proposals, acceptance = {:.3e}, flux in window = {:.3e} photons/s",
        rays.len(), stats.attempted(), stats.acceptance_ratio(), stats.flux_estimate()
    );

    let mut file = BufWriter::new(File::create(path)?);
    for (i, ray) in rays.iter().enumerate() {
        let record = ray.to_record(i);
        let line: Vec<String> = record.iter().map(|x| format!("{:.12e}", x)).collect();
        writeln!(file, "{}", line.join(" "))?;
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let path = args
        .get(1)
        .ok_or_else(|| InputError::InvalidInputFile("no file supplied".to_owned()))?;
    let path = PathBuf::from(path);
    let output_dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();

    let mut input = Configuration::from_file(&path)?;
    input.with_context("constants")?;

    let runtime = std::time::Instant::now();
    let token = CancellationToken::new();
    let mut source = read_source(&input)?;
    let spread = input.bool("control", "spread").optional()?.unwrap_or(false);

    log::info!(
        "Running with {} threads: gamma = {:.3e}, photon energy = {:.3} eV, on-axis energy = {:.3} keV",
        source.threads(), source.bunch().gamma(), source.laser().photon_energy() / ELEMENTARY_CHARGE,
        source.energy(source.bunch().direction(), source.bunch().direction()) / (1.0e3 * ELEMENTARY_CHARGE)
    );

    if input.bool("control", "monte_carlo").optional()?.unwrap_or(false) {
        source.calculate_geometric_factor(&token)?;
    }
    log::info!(
        "total flux = {:.4e} photons/s, geometric factor = {:.4}, flux = {:.4e} photons/s",
        source.total_flux(), source.geometric_factor(), source.full_flux()
    );

    if input.has_section("spectrum") {
        let file = output_dir.join("spectrum.dat");
        write_spectrum(&source, &input, spread, &file, &token)?;
        log::info!("Spectrum written to {}, RT = {}", file.display(), FormattedDuration(runtime.elapsed()));
    }

    if input.has_section("angular") {
        let file = output_dir.join("angular.dat");
        write_angular_map(&source, &input, spread, &file, &token)?;
        log::info!("Angular distribution written to {}, RT = {}", file.display(), FormattedDuration(runtime.elapsed()));
    }

    if input.has_section("rays") {
        let file = output_dir.join("rays.dat");
        write_rays(&source, &input, &file, &token)?;
        log::info!("Rays written to {}, RT = {}", file.display(), FormattedDuration(runtime.elapsed()));
    }

    let counts = source.diagnostics().counts();
    if counts.is_clean() {
        log::info!("Finished in {}", FormattedDuration(runtime.elapsed()));
    } else {
        log::warn!("Finished in {} with {}", FormattedDuration(runtime.elapsed()), counts);
    }

    Ok(())
}
