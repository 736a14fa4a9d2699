//! Marchscape - headless reveal demo.
//!
//! Builds a sphere field behind a loading screen, then reveals its surface
//! a few cells per frame until everything is visible.
//!
//! Usage: cargo run --release -- [OPTIONS]
//!
//! Options:
//!   --size <N>             Edge length of the sphere field (default: 48)
//!   --cells-per-tick <N>   Candidate cells revealed per frame (default: 256)
//!   --max-frames <N>       Give up after this many frames (default: 100000)
//!   --config <PATH>        Revealer config JSON (default: built-in)

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use marchscape::core::{Error, FrameTimer, Result, Tick, logging};
use marchscape::reveal::{
    CrossingMarker, MeshRevealer, RevealStepper, RevealerConfig, VertexBuffer, VoxelGrid,
};
use marchscape::scene::{
    Entity, InitContext, SceneGraph, SceneNodeId, add_async_with_loading_screen,
};

type Revealer = MeshRevealer<VertexBuffer>;

/// Top level scene: builds the field and revealer during initialize.
struct SphereScene {
    size: u32,
    cells_per_tick: usize,
    config: RevealerConfig,
    revealer: Arc<OnceLock<Arc<Revealer>>>,
    last_logged: usize,
}

impl Entity for SphereScene {
    fn initialize(&mut self, ctx: &mut InitContext) -> Result<()> {
        ctx.report_progress(5)?;
        let field = VoxelGrid::sphere(self.size, self.size, self.size)?;
        log::info!("Sphere field: {} occupied samples", field.occupied());
        ctx.report_progress(40)?;

        let revealer = Arc::new(MeshRevealer::new(
            Arc::new(field),
            CrossingMarker,
            [VertexBuffer::new(), VertexBuffer::new()],
            &self.config,
        )?);
        ctx.report_progress(90)?;

        ctx.add_child(RevealStepper::new(revealer.clone()).with_cells_per_tick(self.cells_per_tick));
        // set once per scene
        let _ = self.revealer.set(revealer);
        Ok(())
    }

    fn draw(&mut self, tick: &Tick) {
        let Some(revealer) = self.revealer.get() else {
            return;
        };
        let mesh = revealer.current_mesh();
        if mesh.primitive_count() >= self.last_logged + 10_000 {
            self.last_logged = mesh.primitive_count();
            log::info!(
                "frame {}: {} primitives visible ({} of {} cells)",
                tick.frame,
                mesh.primitive_count(),
                revealer.revealed_cells(),
                revealer.candidate_count()
            );
        }
    }
}

fn main() {
    logging::init();

    if let Err(err) = run() {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let size = parse_u32_arg(&args, "--size").unwrap_or(48);
    let cells_per_tick = parse_usize_arg(&args, "--cells-per-tick").unwrap_or(256);
    let max_frames = parse_u64_arg(&args, "--max-frames").unwrap_or(100_000);
    let config = match parse_str_arg(&args, "--config") {
        Some(path) => RevealerConfig::load(path)?,
        None => RevealerConfig::default(),
    };

    println!("=== Marchscape ===");
    println!("Field:  {}^3 sphere", size);
    println!("Pace:   {} cells per tick", cells_per_tick);
    println!("Iso:    {}", config.iso_level);
    println!();

    let mut graph = SceneGraph::new();
    let root = graph.insert_root("world")?;
    let revealer = Arc::new(OnceLock::new());
    let scene = add_async_with_loading_screen(
        &mut graph,
        root,
        SphereScene {
            size,
            cells_per_tick,
            config,
            revealer: revealer.clone(),
            last_logged: 0,
        },
    )?;

    let start = Instant::now();
    let mut timer = FrameTimer::new();
    let mut finished = false;
    while timer.frame_count() < max_frames {
        let tick = timer.tick();
        graph.update(root, &tick);
        graph.draw(root, &tick);

        if graph.failed_nodes().contains(&scene) {
            return Err(Error::Initialization {
                node: scene,
                reason: format!("{:?}", graph.state(scene)),
            });
        }
        if let Some(revealer) = revealer.get() {
            if revealer.is_complete() && !revealer.is_busy() {
                finished = true;
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    report(&graph, root, revealer.get(), timer.frame_count(), start.elapsed());
    if !finished {
        log::warn!("Stopped after {} frames before the reveal finished", max_frames);
    }
    Ok(())
}

fn report(
    graph: &SceneGraph,
    root: SceneNodeId,
    revealer: Option<&Arc<Revealer>>,
    frames: u64,
    elapsed: Duration,
) {
    println!();
    println!("=== Reveal Complete ===");
    println!("Frames:     {} in {:.2}s", frames, elapsed.as_secs_f64());
    println!("Nodes:      {} ({} under root)", graph.node_count(), graph.children(root).len());
    if let Some(revealer) = revealer {
        let mesh = revealer.current_mesh();
        println!("Candidates: {}", revealer.candidate_count());
        println!("Extracted:  {} cells", revealer.extracted_cells());
        println!("Visible:    {} primitives", mesh.primitive_count());
        println!("Uploads:    {} to front buffer", mesh.upload_count());
    }
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u64_arg(args: &[String], flag: &str) -> Option<u64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
