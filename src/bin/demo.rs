//! pde-demo: end-to-end private database exploration on a synthetic dataset
//!
//! Plays both roles in one process: the client generates keys and a request,
//! the server evaluates it over a synthetic database, and the client decrypts
//! the score and compares it with the plaintext computation.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pde_explore::engine::ClearEngine;
use pde_explore::lut::ScoringFunction;
use pde_explore::params::PdeParams;
use pde_explore::pde::{plaintext_score, Client, Database, DenseDatabase, Server};

#[derive(Parser)]
#[command(name = "pde-demo")]
#[command(about = "Private database exploration demo on a synthetic dataset")]
#[command(version)]
struct Args {
    /// Number of database rows
    #[arg(long, default_value = "1024")]
    rows: usize,

    /// Number of features (one scoring function each)
    #[arg(long, default_value = "4")]
    cols: usize,

    /// Seed for the dataset and the engine (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Per-row threshold on the summed scores
    #[arg(long, default_value = "3")]
    local_threshold: f64,

    /// Threshold on the number of passing rows (default: rows / 100)
    #[arg(long)]
    global_threshold: Option<f64>,

    /// Parameter file (JSON); overrides --small
    #[arg(long)]
    params: Option<PathBuf>,

    /// Use the small test parameters (2^4 to 2^6)
    #[arg(long)]
    small: bool,

    /// Log decrypted intermediates (needs RUST_LOG=debug)
    #[arg(long)]
    debug_keys: bool,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let params = match (&args.params, args.small) {
        (Some(path), _) => PdeParams::from_json_file(path)
            .with_context(|| format!("Failed to load parameters from {}", path.display()))?,
        (None, true) => PdeParams::test_small(),
        (None, false) => PdeParams::paper_default(),
    };
    params.validate().wrap_err("Invalid parameters")?;

    let seed = args.seed.unwrap_or_else(rand::random);
    let global_threshold = args.global_threshold.unwrap_or((args.rows / 100) as f64);

    info!("Private database exploration demo");
    info!(
        "Resolutions: {} -> {}",
        params.min_resolution(),
        params.max_resolution()
    );
    info!("Database: {} x {} (seed {})", args.rows, args.cols, seed);
    info!(
        "Thresholds: local {}, global {}",
        args.local_threshold, global_threshold
    );

    let engine = ClearEngine::with_seed(seed);
    let db = DenseDatabase::synthetic(args.rows, args.cols, seed);

    // One indicator x > 1.5 per feature over [0, 4), two grid points per slot
    let points = 2 * params.min_resolution().ring_dim();
    let functions = (0..db.dims().1)
        .map(|_| ScoringFunction::indicator((0.0, 4.0), points, 1.5, 1.0))
        .collect::<Result<Vec<_>, _>>()?;

    let client_start = Instant::now();
    let (client, keys) = Client::init(&engine, params.clone())?;
    let request = client.gen_request(
        keys,
        &functions,
        args.local_threshold,
        global_threshold,
        args.rows,
    )?;
    let sizes = request.sizes()?;
    info!("Client init: {:.2?}", client_start.elapsed());
    info!(
        "Request size: {:.2} MB (keys {:.2} MB, tables {:.2} MB)",
        sizes.total() as f64 / 1048576.0,
        sizes.keys as f64 / 1048576.0,
        sizes.tables as f64 / 1048576.0
    );

    let mut server = Server::new(&engine);
    if args.debug_keys {
        server = server.with_debug_keys(client.secrets().clone());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    spinner.set_message("Processing request");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let server_start = Instant::now();
    let score = server.process_request(&request, &db);
    spinner.finish_and_clear();
    let score = score.wrap_err("Server failed to process the request")?;
    info!("Server: {:.2?}", server_start.elapsed());
    info!("Bootstraps: {}", engine.bootstrap_count());

    let decrypted = client.decrypt(&score)?;
    let expected = plaintext_score(&db, &functions, args.local_threshold, global_threshold)?;
    let got = decrypted.first().copied().unwrap_or(f64::NAN);

    println!("Decrypted score: {:10.7}", got);
    println!("Expected score:  {:10.7}", expected);
    println!("Error:           {:.3e}", (got - expected).abs());

    Ok(())
}
