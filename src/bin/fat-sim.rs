//! fat-sim command line driver
//!
//! Exercises a cluster table from the outside: a fixed demo scenario and a
//! seeded random smoke run.

use anyhow::Context;
use clap::{Parser, Subcommand};
use fat_sim::{ClusterId, ClusterTable, TableConfig, CHAIN_END};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fat-sim")]
#[command(about = "In-memory FAT cluster allocation simulator")]
struct Args {
    /// TOML file with `pointer_bits` and `cluster_bytes`
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Print the full per-cluster status after every step
    #[arg(long, global = true)]
    full_status: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate 3, 5, 7 and 16 KiB files on 1 KiB and 2 KiB cluster tables
    Demo {
        /// Pointer width of both demo tables
        #[arg(short = 'b', long, default_value = "4")]
        pointer_bits: u32,
    },

    /// Run random allocate/append/list/seek/delete operations
    Smoke {
        /// Number of random operations
        #[arg(short = 'n', long, default_value = "20")]
        steps: usize,

        /// RNG seed (random if omitted)
        #[arg(short = 's', long)]
        seed: Option<u64>,

        /// Pointer width (ignored when --config is given)
        #[arg(short = 'b', long, default_value = "16")]
        pointer_bits: u32,

        /// Cluster size in bytes (ignored when --config is given)
        #[arg(short = 'C', long, default_value = "2048")]
        cluster_bytes: u64,

        /// Dump the final table as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Allocate,
    Append,
    List,
    Seek,
    Delete,
}

impl Action {
    fn random(rng: &mut StdRng) -> Self {
        match rng.gen_range(0..5) {
            0 => Action::Allocate,
            1 => Action::Append,
            2 => Action::List,
            3 => Action::Seek,
            _ => Action::Delete,
        }
    }
}

fn print_status(table: &ClusterTable, full: bool) {
    if full {
        println!("{}", table.status_snapshot());
    } else {
        println!("  {}", table.stats());
    }
}

fn load_config(path: Option<&PathBuf>, fallback: TableConfig) -> anyhow::Result<TableConfig> {
    match path {
        Some(path) => TableConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            fallback.validate()?;
            Ok(fallback)
        }
    }
}

fn run_demo(pointer_bits: u32, full: bool) -> anyhow::Result<()> {
    let mut small = ClusterTable::new(pointer_bits, 1024)?;
    let mut large = ClusterTable::new(pointer_bits, 2048)?;

    println!("1 KiB clusters:");
    print_status(&small, full);
    println!("2 KiB clusters:");
    print_status(&large, full);

    let mut starts = Vec::new();
    for kib in [3u64, 5, 7, 16] {
        let bytes = kib * 1024;

        println!("Adding file of {} bytes (1 KiB clusters)", bytes);
        match small.allocate(bytes) {
            Ok(allocation) => starts.push(allocation.start()),
            Err(e) => {
                println!("Error: {}", e);
                starts.push(None);
            }
        }
        print_status(&small, full);

        println!("Adding file of {} bytes (2 KiB clusters)", bytes);
        if let Err(e) = large.allocate(bytes) {
            println!("Error: {}", e);
        }
        print_status(&large, full);
    }

    println!("Removing files 1 and 3 (1 KiB clusters)");
    for start in [starts[0], starts[2]].into_iter().flatten() {
        small.delete_file(start)?;
    }
    print_status(&small, full);

    small.verify()?;
    large.verify()?;
    Ok(())
}

fn describe(target: Option<ClusterId>) -> String {
    target.map_or_else(|| "none".to_string(), |id| id.to_string())
}

fn run_action(
    table: &mut ClusterTable,
    files: &mut Vec<ClusterId>,
    action: Action,
    bytes: u64,
    target: Option<ClusterId>,
    offset: u64,
) -> fat_sim::Result<()> {
    // Without a remembered file, operate on an id no table can contain
    let handle = target.unwrap_or(CHAIN_END);

    match action {
        Action::Allocate => {
            println!("Allocating file of {} bytes", bytes);
            if let Some(start) = table.allocate(bytes)?.start() {
                files.push(start);
            }
        }
        Action::Append => {
            println!(
                "Appending {} bytes to file at cluster {}",
                bytes,
                describe(target)
            );
            table.append(handle, bytes)?;
        }
        Action::List => {
            println!("Listing clusters of file at cluster {}", describe(target));
            let clusters = table.get_cluster_list(handle)?;
            if !clusters.is_empty() {
                println!("Cluster list: {:?}", clusters);
            }
        }
        Action::Seek => {
            println!(
                "Seeking offset {} in file at cluster {}",
                offset,
                describe(target)
            );
            println!(
                "Found cluster: {}",
                describe(table.seek_cluster(handle, offset)?)
            );
        }
        Action::Delete => {
            println!("Deleting file at cluster {}", describe(target));
            table.delete_file(handle)?;
            files.retain(|&start| Some(start) != target);
        }
    }

    Ok(())
}

fn run_smoke(
    config: TableConfig,
    steps: usize,
    seed: Option<u64>,
    full: bool,
    json: bool,
) -> anyhow::Result<()> {
    let seed = seed.unwrap_or_else(rand::random);
    info!("Smoke run: {} steps, seed {}", steps, seed);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut table = ClusterTable::from_config(&config)?;
    let mut files: Vec<ClusterId> = Vec::new();

    for step in 0..steps {
        let action = Action::random(&mut rng);
        let bytes = rng.gen_range(1..=20u64) * 1024;
        let target = (!files.is_empty()).then(|| files[rng.gen_range(0..files.len())]);
        let offset = rng.gen_range(0..10_000u64);

        print!("[{}] ", step);
        if let Err(e) = run_action(&mut table, &mut files, action, bytes, target, offset) {
            println!("Error: {}", e);
        }

        table
            .verify()
            .with_context(|| format!("table inconsistent after step {}", step))?;
        print_status(&table, full);
    }

    if json {
        println!("{}", table.status_snapshot().to_json()?);
    }

    info!("Smoke run finished: {}", table.stats());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Demo { pointer_bits } => {
            let config = load_config(args.config.as_ref(), TableConfig::new(pointer_bits, 1024))?;
            run_demo(config.pointer_bits, args.full_status)
        }
        Command::Smoke {
            steps,
            seed,
            pointer_bits,
            cluster_bytes,
            json,
        } => {
            let config = load_config(
                args.config.as_ref(),
                TableConfig::new(pointer_bits, cluster_bytes),
            )?;
            run_smoke(config, steps, seed, args.full_status, json)
        }
    }
}
