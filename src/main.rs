use clap::Parser;
use log::{error, info, warn};
use nalgebra::DMatrix;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use rust_wfc::{
    read_run_config, report_checksum, Communicator, InnerProduct, ProcessingUnit, RunConfig,
    ThreadComm, WaveFunctions, WfResult,
};

/// Drive the wave-function kernels on an in-process rank group.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.yml")]
    config: String,

    /// Override the number of ranks of the config file
    #[arg(short, long)]
    ranks: Option<usize>,
}

/// Fill the local rows from the global row index so that every rank count
/// produces the same global data.
fn populate(wf: &mut WaveFunctions, seed: u64) {
    let normal = Normal::new(0.0, 1.0).unwrap();
    let rank = wf.rank();
    let num_wf = wf.num_wf();

    let offset = wf.pw_distribution().offset(rank);
    let pw = wf.pw_coeffs_mut().host_mut();
    for r in 0..pw.nrows() {
        let g = offset + r;
        let mut rng = StdRng::seed_from_u64(seed ^ (g as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
        for j in 0..num_wf {
            let im = if g == 0 { 0.0 } else { normal.sample(&mut rng) };
            pw[(r, j)] = Complex64::new(normal.sample(&mut rng), im) / (1.0 + g as f64).sqrt();
        }
    }

    let Some(offset) = wf.mt_distribution().map(|d| d.offset(rank)) else {
        return;
    };
    if let Some(mt) = wf.mt_coeffs_mut() {
        let mt = mt.host_mut();
        for r in 0..mt.nrows() {
            let mut rng = StdRng::seed_from_u64(!seed ^ (offset + r) as u64);
            for j in 0..num_wf {
                mt[(r, j)] = Complex64::new(normal.sample(&mut rng), normal.sample(&mut rng));
            }
        }
    }
}

fn run_rank(comm: &ThreadComm, config: &RunConfig) -> WfResult<()> {
    let pu = config.processing_unit;
    let pw_distr = config.pw_distribution();
    let mt_distr = config.mt_distribution();
    let new_wf = || match &mt_distr {
        Some(mt) => WaveFunctions::new_full_potential(&pw_distr, mt, comm.rank(), config.num_wf, pu),
        None => WaveFunctions::new(&pw_distr, comm.rank(), config.num_wf, pu),
    };

    let mut psi = new_wf();
    populate(&mut psi, config.seed);
    let mut phi = new_wf();
    if pu == ProcessingUnit::Accelerator {
        psi.allocate_on_device();
        psi.copy_to_device();
        phi.allocate_on_device();
    }

    // same seed on every rank: the change-of-basis matrix is replicated
    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let nwf = config.basis_size;
    let mtrx = DMatrix::from_fn(nwf, config.num_wf, |_, _| {
        Complex64::new(normal.sample(&mut rng), normal.sample(&mut rng))
    });
    phi.transform_from(&psi, nwf, &mtrx, config.num_wf)?;
    if pu == ProcessingUnit::Accelerator {
        phi.copy_to_host();
    }

    let mut ip = InnerProduct::new(comm, pu);
    let mut ovlp = DMatrix::zeros(config.num_wf, config.num_wf);
    ip.inner(&phi, 0, config.num_wf, &phi, 0, config.num_wf, &mut ovlp, 0, 0)?;
    if comm.is_root() {
        let trace: f64 = ovlp.diagonal().iter().map(|z| z.re).sum();
        info!("trace of the {}x{} overlap: {:.10}", config.num_wf, config.num_wf, trace);
    }

    if !phi.full_potential() {
        let mut ovlp_real = DMatrix::zeros(config.num_wf, config.num_wf);
        ip.inner_real(&phi, 0, config.num_wf, &phi, 0, config.num_wf, &mut ovlp_real, 0, 0)?;
        if comm.is_root() {
            info!("trace of the real overlap: {:.10}", ovlp_real.trace());
        }
    }

    if config.print_checksum {
        report_checksum(comm, "psi", psi.checksum());
        report_checksum(comm, "phi", phi.checksum());
        let ovlp_sum: Complex64 = ovlp.iter().sum();
        // the overlap is replicated, so only rank 0 contributes
        let local = if comm.is_root() { ovlp_sum } else { Complex64::new(0.0, 0.0) };
        report_checksum(comm, "overlap", local);
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match read_run_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to read {}: {}", args.config, e);
            std::process::exit(1);
        }
    };
    if let Some(ranks) = args.ranks {
        if ranks == 0 {
            warn!("ignoring --ranks 0, keeping {} ranks", config.num_ranks);
        } else {
            config.num_ranks = ranks;
        }
    }

    info!(
        "{} ranks, {} plane waves, {} wave functions, {:?}{}",
        config.num_ranks,
        config.num_gvec,
        config.num_wf,
        config.processing_unit,
        if config.full_potential.is_some() { ", full potential" } else { "" }
    );

    let results = ThreadComm::run(config.num_ranks, |comm| run_rank(comm, &config));
    for (rank, result) in results.into_iter().enumerate() {
        if let Err(e) = result {
            error!("rank {}: {}", rank, e);
            std::process::exit(1);
        }
    }
}
