use std::f32::consts::PI;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context as _;
use clap::Parser;
use glam::{EulerRot, Quat, Vec3, Vec4};
use order::{Camera, IndirectDrawBuffers, OrderConfig, OrderPass, Splat, SplatStore, SymMat3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use render::{Context, OffscreenTarget, RenderConfig, Splatter};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs the splat visibility & ordering pass over a synthetic cloud, on the
/// host and optionally on the GPU, and reports how many splats survive.
#[derive(Parser)]
struct Args {
    /// Number of splats to generate
    #[arg(short = 'n', long, default_value_t = 100_000)]
    splats: usize,

    /// Seed for the synthetic cloud
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Frames to run, orbiting the camera a little each frame
    #[arg(short, long, default_value_t = 4)]
    frames: u32,

    /// JSON file with ordering options
    #[arg(long)]
    order_config: Option<PathBuf>,

    /// JSON file with render options
    #[arg(long)]
    render_config: Option<PathBuf>,

    /// Also run the GPU pass and draw into an offscreen target
    #[arg(long)]
    gpu: bool,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,
}

fn synthetic_cloud(count: usize, seed: u64) -> SplatStore {
    let mut rng = StdRng::seed_from_u64(seed);
    let splats: Vec<Splat> = (0..count)
        .map(|_| {
            let position = Vec3::new(
                rng.random_range(-4.0..4.0),
                rng.random_range(-4.0..4.0),
                rng.random_range(-4.0..4.0),
            );
            let scale = Vec3::new(
                rng.random_range(0.001..0.08),
                rng.random_range(0.001..0.08),
                rng.random_range(0.001..0.08),
            );
            let rotation = Quat::from_euler(
                EulerRot::YXZ,
                rng.random_range(-PI..PI),
                rng.random_range(-PI..PI),
                rng.random_range(-PI..PI),
            );
            let color = Vec4::new(rng.random(), rng.random(), rng.random(), rng.random_range(0.2..1.0));
            Splat::new(position, SymMat3::from_scale_rotation(scale, rotation)).with_color(color)
        })
        .collect();
    SplatStore::from_splats(&splats)
}

fn camera_for_frame(frame: u32, aspect: f32) -> Camera {
    let angle = frame as f32 * 0.1;
    let eye = Vec3::new(10.0 * angle.sin(), 2.0, 10.0 * angle.cos());
    Camera::new(aspect).looking_at(eye, Vec3::ZERO)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let order_config = match &args.order_config {
        Some(path) => OrderConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => OrderConfig::default(),
    };
    let render_config = match &args.render_config {
        Some(path) => RenderConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RenderConfig::default(),
    };

    let store = synthetic_cloud(args.splats, args.seed);
    info!(splats = store.point_count(), seed = args.seed, "generated cloud");

    let aspect = args.width as f32 / args.height.max(1) as f32;
    let pass = OrderPass::new(order_config.clone())?;
    let mut out = IndirectDrawBuffers::new(store.point_count());
    let mut host_counts = Vec::with_capacity(args.frames as usize);
    for frame in 0..args.frames {
        out.reset();
        let camera = camera_for_frame(frame, aspect).uniform();
        let start = Instant::now();
        let stats = pass.run(&camera, &store, &out)?;
        info!(
            frame,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            visible = stats.visible,
            outside_frustum = stats.outside_frustum,
            degenerate = stats.degenerate,
            "host pass"
        );
        host_counts.push(stats.visible);
    }

    if !args.gpu {
        return Ok(());
    }

    let ctx = Context::headless().await?;
    let mut splatter = Splatter::new(&ctx, render_config)?;
    splatter.set_splats(&ctx, &store, &order_config)?;
    let mut target = OffscreenTarget::new(&ctx.device, args.width, args.height, 3)?;

    for frame in 0..args.frames {
        let camera = camera_for_frame(frame, aspect).uniform();
        let start = Instant::now();
        let index = splatter.render(&ctx, &camera, &mut target)?;
        let record_submit_ms = start.elapsed().as_secs_f64() * 1000.0;
        let Some(resources) = splatter.frame(index) else {
            continue;
        };
        let command = resources.draw_buffers().read_command(&ctx)?;
        let host = host_counts[frame as usize];
        info!(
            frame,
            record_submit_ms,
            gpu_visible = command.instance_count,
            host_visible = host,
            "gpu pass"
        );
        if command.instance_count != host {
            tracing::warn!(
                frame,
                difference = command.instance_count as i64 - host as i64,
                "gpu and host visible counts differ"
            );
        }
    }

    Ok(())
}
