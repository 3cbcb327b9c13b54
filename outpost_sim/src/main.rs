// Headless runner for the outpost simulation.
//
// Builds a small scripted colony (a few agents, ore deposits, a build site
// behind a path-flattening job, a repeating mining job) on flat heightmap
// terrain, runs it for a fixed number of ticks and logs every narrative
// event. Midway through, a rock slide blocks part of the map to exercise
// terrain-change handling. Finished tasks are pruned from the graph every
// few hundred ticks. Useful for eyeballing scheduler behavior and for
// profiling outside the test harness.
//
// Logging goes through `env_logger`; set `RUST_LOG=debug` (or `trace`) for
// the library's internal lifecycle messages.
//
// Usage:
//   headless [OPTIONS]
//     --config <PATH>   JSON `SimConfig` (default: built-in defaults)
//     --ticks <N>       Ticks to run (default: 600)
//     --dt <SECONDS>    Seconds per tick (default: 0.05)

use std::path::PathBuf;

use glam::{Vec2, Vec3};
use log::{debug, error, info};
use outpost_sim::actionable::WorkSite;
use outpost_sim::config::SimConfig;
use outpost_sim::profile::AgentKind;
use outpost_sim::sim::Sim;
use outpost_sim::task::{LeafTask, NewTask, TaskTarget};
use outpost_sim::terrain::HeightmapTerrain;
use outpost_sim::types::{ActionKind, Bounds, CellCoord, ResourceKind, TaskCategory};

/// Ticks between sweeps of finished tasks out of the graph.
const PRUNE_INTERVAL: u64 = 200;

struct Options {
    config: Option<PathBuf>,
    ticks: u64,
    dt: f32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let options = parse_args();

    let config = match &options.config {
        Some(path) => match SimConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => SimConfig::default(),
    };

    let mut sim = build_colony(config);
    let slide_tick = options.ticks / 2;
    let mut finished = 0usize;

    for tick in 0..options.ticks {
        if tick == slide_tick {
            rock_slide(&mut sim);
        }
        for event in sim.tick(options.dt).events {
            if matches!(event.kind, outpost_sim::event::SimEventKind::TaskFinished { .. }) {
                finished += 1;
            }
            info!("[tick {:>5}] {:?}", event.tick, event.kind);
        }
        if (tick + 1) % PRUNE_INTERVAL == 0 {
            let pruned = sim.prune_finished_tasks();
            if pruned > 0 {
                debug!("pruned {pruned} finished tasks, {} remain", sim.tasks().len());
            }
        }
    }

    let idle = sim.agents().filter(|a| a.is_idle()).count();
    info!(
        "done after {:.1}s: {finished} tasks finished, {} still queued, {idle}/{} agents idle",
        sim.elapsed(),
        sim.queue().len(),
        sim.agents().count()
    );
}

fn world_point(sim: &Sim<HeightmapTerrain>, x: i32, y: i32) -> Vec3 {
    let cell = sim.grid().clamp(CellCoord::new(x, y));
    sim.grid().world_position(cell, sim.terrain())
}

/// Scripted starting state: three ore deposits, a build site whose wall
/// waits on a flattened approach, a repeating mining job and a scout move.
fn build_colony(config: SimConfig) -> Sim<HeightmapTerrain> {
    let grid = &config.grid;
    let mut terrain = HeightmapTerrain::flat(
        grid.width,
        grid.height,
        grid.cell_size,
        Vec2::from(grid.origin),
    );
    // A low ridge across the middle with a gap.
    let w = grid.width as i32;
    let h = grid.height as i32;
    terrain.fill_walkable(
        Bounds::new(CellCoord::new(w / 4, h / 2), CellCoord::new(w - 4, h / 2)),
        false,
    );
    for x in 0..w {
        terrain.set_penalty(CellCoord::new(x, h / 3), 20);
    }

    let mut sim = Sim::new(config, terrain);

    for (x, y, resource) in [
        (w - 6, h - 6, ResourceKind::Ore),
        (6, h - 8, ResourceKind::Ore),
        (w - 10, 4, ResourceKind::Silver),
    ] {
        let position = world_point(&sim, x, y);
        sim.add_actionable(Box::new(WorkSite::deposit(position, resource, 2.0)));
    }
    let site_pos = world_point(&sim, w / 2, h - 5);
    let site = sim.add_actionable(Box::new(WorkSite::new(site_pos, 6.0)));
    let approach_pos = world_point(&sim, w / 2, h - 8);
    let approach = sim.add_actionable(Box::new(WorkSite::new(approach_pos, 3.0)));

    let flatten = sim.create_task(NewTask::new(
        TaskCategory::Build,
        "flatten the approach",
        vec![
            LeafTask::new("flatten", TaskTarget::Position(approach_pos), ActionKind::FlattenPath)
                .with_actionable(approach),
        ],
    ));
    sim.create_task(
        NewTask::new(
            TaskCategory::Build,
            "raise the wall",
            vec![
                LeafTask::new("build", TaskTarget::Position(site_pos), ActionKind::Build)
                    .with_actionable(site),
            ],
        )
        .blocked_by(flatten),
    );
    let depot = world_point(&sim, 2, 2);
    sim.create_task(
        NewTask::new(
            TaskCategory::Mine,
            "haul ore",
            vec![
                LeafTask::new("mine", TaskTarget::Nearest(ResourceKind::Ore), ActionKind::Mine),
                LeafTask::new("store", TaskTarget::Position(depot), ActionKind::DropOff),
            ],
        )
        .repeat(3),
    );
    let corner = world_point(&sim, w - 1, h - 1);
    sim.create_task(NewTask::new(
        TaskCategory::Move,
        "scout the far corner",
        vec![LeafTask::new("scout", TaskTarget::Position(corner), ActionKind::PickUp)],
    ));

    for (kind, x, y) in [
        (AgentKind::Worker, 1, 1),
        (AgentKind::Miner, 3, 1),
        (AgentKind::Builder, 1, 3),
        (AgentKind::AdvancedBuilder, 3, 3),
    ] {
        let position = world_point(&sim, x, y);
        sim.spawn_agent(kind, position);
    }
    sim
}

/// Block a band below the ridge and tell the sim about it.
fn rock_slide(sim: &mut Sim<HeightmapTerrain>) {
    let w = sim.grid().width();
    let h = sim.grid().height();
    let bounds = Bounds::new(CellCoord::new(w / 3, h / 4), CellCoord::new(w / 3 + 1, h / 2 - 2));
    sim.terrain_mut().fill_walkable(bounds, false);
    sim.terrain_changed(bounds);
    info!("rock slide across {}..{}", bounds.min, bounds.max);
}

fn parse_args() -> Options {
    let mut options = Options {
        config: None,
        ticks: 600,
        dt: 0.05,
    };
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                options.config = args.get(i).map(PathBuf::from).or_else(|| {
                    eprintln!("--config requires a path");
                    std::process::exit(1);
                });
            }
            "--ticks" => {
                i += 1;
                options.ticks = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--ticks requires a valid number");
                    std::process::exit(1);
                });
            }
            "--dt" => {
                i += 1;
                options.dt = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .filter(|dt: &f32| *dt > 0.0)
                    .unwrap_or_else(|| {
                        eprintln!("--dt requires a positive number of seconds");
                        std::process::exit(1);
                    });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    options
}

fn print_usage() {
    println!("Usage: headless [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <PATH>   JSON SimConfig (default: built-in defaults)");
    println!("  --ticks <N>       Ticks to run (default: 600)");
    println!("  --dt <SECONDS>    Seconds per tick (default: 0.05)");
    println!("  --help, -h        Show this help");
}
