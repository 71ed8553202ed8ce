use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Vec3;
use hlod_common::{MaterialId, Transform};
use hlod_runtime::{CapabilityRegistry, HlodConfig, HlodSystem};
use hlod_scene::{Mesh, ProxyDesc};
use hlod_tools::{HierarchyInspector, volume_gizmos};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hlod-cli", about = "CLI tool for HLOD operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Populate a synthetic scene and build its hierarchy under a time budget
    Demo {
        /// Number of proxies to spawn
        #[arg(short, long, default_value = "500")]
        proxies: usize,
        /// Distinct materials cycled across proxies
        #[arg(short, long, default_value = "1")]
        materials: u64,
        /// Move this many proxies after the first build
        #[arg(long, default_value = "0")]
        moves: usize,
        /// Configuration file (.json, .yaml, .yml)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print every volume
        #[arg(long)]
        tree: bool,
    },
    /// Write the default configuration to a file
    InitConfig {
        /// Output path (.json, .yaml, .yml)
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("hlod-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("scene: {}", hlod_scene::crate_info());
            println!("volume: {}", hlod_volume::crate_info());
            println!("sched: {}", hlod_sched::crate_info());
            println!("build: {}", hlod_build::crate_info());
            println!("runtime: {}", hlod_runtime::crate_info());
            println!("tools: {}", hlod_tools::crate_info());
            let registry = CapabilityRegistry::with_builtins();
            println!("simplifiers: {}", registry.simplifier_names().join(", "));
            println!("batchers: {}", registry.batcher_names().join(", "));
        }
        Commands::Demo {
            proxies,
            materials,
            moves,
            config,
            tree,
        } => {
            let config = match config {
                Some(path) => HlodConfig::load(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => HlodConfig::default(),
            };
            run_demo(config, proxies, materials.max(1), moves, tree)?;
        }
        Commands::InitConfig { path } => {
            HlodConfig::default()
                .save(&path)
                .with_context(|| format!("writing config {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

/// Proxies laid out on a square grid with a little height variation.
fn grid_position(i: usize, side: usize) -> Vec3 {
    let x = (i % side) as f32 * 4.0;
    let z = (i / side) as f32 * 4.0;
    let y = ((i * 7) % 5) as f32 * 0.5;
    Vec3::new(x, y, z)
}

fn run_demo(
    config: HlodConfig,
    proxies: usize,
    materials: u64,
    moves: usize,
    print_tree: bool,
) -> anyhow::Result<()> {
    let mut system = HlodSystem::new(config, &CapabilityRegistry::with_builtins())?;
    if let Some(reason) = system.lod_generation_disabled() {
        println!("LOD generation disabled: {reason}");
    }

    let cube = system.scene_mut().add_mesh(Mesh::unit_cube("rock"));
    let side = (proxies as f32).sqrt().ceil().max(1.0) as usize;
    let mut ids = Vec::with_capacity(proxies);
    for i in 0..proxies {
        let desc = ProxyDesc::new(format!("rock{i}"), cube, MaterialId(i as u64 % materials))
            .at(grid_position(i, side));
        ids.push(system.scene_mut().spawn(desc)?);
    }
    println!("Spawned {proxies} proxies");

    system.sync_scene();
    system.update_all();
    let quanta = drain(&mut system);
    println!("Initial build: {quanta} quanta");
    println!("{}", HierarchyInspector::summary(&system));

    if moves > 0 {
        let offset = Vec3::new(side as f32 * 8.0, 0.0, 0.0);
        for (i, id) in ids.iter().take(moves).enumerate() {
            let target = Transform::from_position(grid_position(i, side) + offset);
            system.scene_mut().set_transform(*id, target)?;
        }
        system.sync_scene();
        system.update_all();
        let quanta = drain(&mut system);
        println!("After {moves} moves: {quanta} quanta");
        println!("{}", HierarchyInspector::summary(&system));
    }

    let events = system.drain_events();
    println!("HLOD events: {}", events.len());

    if print_tree {
        for info in HierarchyInspector::list_volumes(&system) {
            println!("{info}");
        }
    }
    let gizmos = volume_gizmos(&system);
    if !gizmos.is_empty() {
        println!("Volume gizmos: {}", gizmos.len());
    }
    Ok(())
}

/// Run one quantum per simulated frame until the queue drains.
fn drain(system: &mut HlodSystem) -> usize {
    let mut quanta = 0;
    while system.queue_depth() > 0 {
        let report = system.run_quantum();
        quanta += 1;
        tracing::debug!(
            steps = report.steps,
            elapsed = ?report.elapsed,
            queue = system.queue_depth(),
            "frame"
        );
        if report.waiting {
            std::thread::yield_now();
        }
    }
    quanta
}
