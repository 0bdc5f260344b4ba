//! Gradient-descent locomotion trainer.
//!
//! Builds a (optionally mutated) robot morphology, then repeats
//! forward rollout -> backward sweep -> SGD update on the controller
//! parameters. The loss is the negated mean final x of the robot, so a
//! falling loss means the robot walks further to the right.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use diffmpm::{Scene, SimConfig, Simulation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

mod robot;

#[derive(Parser, Debug)]
#[command(about = "Trains a soft robot's actuation policy by gradient descent")]
struct Args {
    /// Gradient-descent iterations.
    #[arg(long, default_value_t = 50)]
    iters: usize,
    /// Rollout length in time steps.
    #[arg(long, default_value_t = 1024)]
    steps: usize,
    /// SGD learning rate.
    #[arg(long, default_value_t = 0.1)]
    lr: f64,
    /// Per-cell morphology mutation probability.
    #[arg(long, default_value_t = 0.05)]
    mutation_rate: f64,
    /// RNG seed for the mutation and the weight initialization.
    #[arg(long)]
    seed: Option<u64>,
    /// File the final layout and loss are appended to.
    #[arg(long, default_value = "output.txt")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let cfg = SimConfig {
        max_steps: args.steps,
        ..SimConfig::default()
    };

    let mut layout = robot::seed_layout();
    robot::mutate(&mut layout, args.mutation_rate, &mut rng);

    let mut scene = Scene::new(cfg.dx());
    scene.set_offset(0.1, 0.03);
    robot::build(&mut scene, &layout, 0.0, 0.1, cfg.dx());
    log::info!(
        "morphology: {} cells, {} particles, {} actuators",
        robot::placed_cells(&layout),
        scene.n_particles(),
        scene.n_actuators()
    );

    let mut sim = Simulation::new(cfg, &scene).context("building the simulation engine")?;
    for w in sim.controller.weights.iter_mut() {
        *w = rng.gen_range(-0.01..0.01);
    }

    let mut loss = 0.0;
    for iter in 0..args.iters {
        loss = sim
            .run_forward(args.steps)
            .with_context(|| format!("forward rollout, iteration {iter}"))?;
        sim.run_backward()
            .with_context(|| format!("backward sweep, iteration {iter}"))?;

        let ctrl = &mut sim.controller;
        for (w, g) in ctrl.weights.iter_mut().zip(&ctrl.grad_weights) {
            *w -= args.lr * g;
        }
        for (b, g) in ctrl.bias.iter_mut().zip(&ctrl.grad_bias) {
            *b -= args.lr * g;
        }
        log::info!("iter {iter}: loss {loss:.6}");
    }

    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.output)
        .with_context(|| format!("opening {}", args.output.display()))?;
    writeln!(out, "layout:")?;
    for row in layout.iter() {
        writeln!(out, "{row:3?}")?;
    }
    writeln!(out, "loss = {loss:.6}")?;

    Ok(())
}
