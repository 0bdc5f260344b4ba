//! Finite-difference validation of the reverse-mode gradients.
//!
//! The controller parameters are the optimizer's inputs, so the checks
//! target `grad_weights` and `grad_bias`: perturb one parameter, re-run the
//! forward rollout, and compare the central difference against the adjoint.
//! Short horizons on a coarse grid keep the probes cheap while still pushing
//! gradients through every kernel (P2G, grid update with floor contact,
//! G2P, actuation).

use diffmpm::scene::UNACTUATED;
use diffmpm::{ParticleKind, Scene, SimConfig, Simulation};

const STEPS: usize = 8;
const FD_H: f64 = 1e-5;
const REL_TOL: f64 = 1e-3;

fn test_config() -> SimConfig {
    SimConfig {
        n_grid: 32,
        max_steps: 16,
        ..SimConfig::default()
    }
}

fn test_scene(cfg: &SimConfig) -> Scene {
    let dx = cfg.dx();
    let mut scene = Scene::new(dx);
    scene.set_n_actuators(1);
    // An actuated block with a passive tail, asymmetric on purpose so no
    // gradient component vanishes by symmetry.
    scene.add_rect(0.4, 0.3, 2.0 * dx, 2.0 * dx, 0, ParticleKind::Solid);
    scene.add_rect(0.4 + 2.0 * dx, 0.3, 2.0 * dx, dx, UNACTUATED, ParticleKind::Solid);
    scene
}

/// Deterministic, non-degenerate parameter values for every probe.
fn seed_parameters(sim: &mut Simulation) {
    for (i, w) in sim.controller.weights.iter_mut().enumerate() {
        *w = 0.05 * (i as f64 + 1.0);
    }
    sim.controller.bias[0] = 0.02;
}

fn loss_with(cfg: &SimConfig, scene: &Scene, perturb: impl Fn(&mut Simulation)) -> f64 {
    let mut sim = Simulation::new(cfg.clone(), scene).unwrap();
    seed_parameters(&mut sim);
    perturb(&mut sim);
    sim.run_forward(STEPS).unwrap()
}

fn assert_gradient_close(analytic: f64, numeric: f64, label: &str) {
    let scale = analytic.abs().max(numeric.abs()).max(1e-6);
    let err = (analytic - numeric).abs();
    assert!(
        err <= REL_TOL * scale,
        "{label}: adjoint {analytic:.3e} vs finite difference {numeric:.3e} (err {err:.3e})"
    );
}

#[test]
fn weight_gradients_match_finite_differences() {
    let cfg = test_config();
    let scene = test_scene(&cfg);

    let mut sim = Simulation::new(cfg.clone(), &scene).unwrap();
    seed_parameters(&mut sim);
    sim.run_forward(STEPS).unwrap();
    sim.run_backward().unwrap();

    for k in 0..cfg.n_sin_waves {
        let plus = loss_with(&cfg, &scene, |s| s.controller.weights[k] += FD_H);
        let minus = loss_with(&cfg, &scene, |s| s.controller.weights[k] -= FD_H);
        let numeric = (plus - minus) / (2.0 * FD_H);
        assert_gradient_close(
            sim.controller.grad_weights[k],
            numeric,
            &format!("weights[{k}]"),
        );
    }
}

#[test]
fn bias_gradient_matches_finite_difference() {
    let cfg = test_config();
    let scene = test_scene(&cfg);

    let mut sim = Simulation::new(cfg.clone(), &scene).unwrap();
    seed_parameters(&mut sim);
    sim.run_forward(STEPS).unwrap();
    sim.run_backward().unwrap();

    let plus = loss_with(&cfg, &scene, |s| s.controller.bias[0] += FD_H);
    let minus = loss_with(&cfg, &scene, |s| s.controller.bias[0] -= FD_H);
    let numeric = (plus - minus) / (2.0 * FD_H);
    assert_gradient_close(sim.controller.grad_bias[0], numeric, "bias[0]");
}

#[test]
fn gradients_survive_floor_contact() {
    // Start the robot low enough that its stencil overlaps the friction
    // boundary during the rollout, so the sliding-branch Jacobian is on the
    // differentiation path.
    let cfg = test_config();
    let dx = cfg.dx();
    let mut scene = Scene::new(dx);
    scene.set_n_actuators(1);
    // Anchored low enough that the bottom particle row's stencil includes
    // clamped floor cells from the very first step.
    scene.add_rect(0.4, 2.2 * dx, 2.0 * dx, 2.0 * dx, 0, ParticleKind::Solid);

    let mut sim = Simulation::new(cfg.clone(), &scene).unwrap();
    seed_parameters(&mut sim);
    sim.run_forward(STEPS).unwrap();
    sim.run_backward().unwrap();

    let plus = loss_with(&cfg, &scene, |s| s.controller.bias[0] += FD_H);
    let minus = loss_with(&cfg, &scene, |s| s.controller.bias[0] -= FD_H);
    let numeric = (plus - minus) / (2.0 * FD_H);
    assert_gradient_close(sim.controller.grad_bias[0], numeric, "bias[0] near floor");
}

#[test]
fn unreferenced_actuator_gets_zero_gradient() {
    let cfg = test_config();
    let dx = cfg.dx();
    let mut scene = Scene::new(dx);
    scene.set_n_actuators(1);
    scene.add_rect(0.4, 0.3, 2.0 * dx, 2.0 * dx, UNACTUATED, ParticleKind::Solid);

    let mut sim = Simulation::new(cfg, &scene).unwrap();
    seed_parameters(&mut sim);
    sim.run_forward(STEPS).unwrap();
    sim.run_backward().unwrap();

    assert!(sim.controller.grad_weights.iter().all(|&g| g == 0.0));
    assert!(sim.controller.grad_bias.iter().all(|&g| g == 0.0));
}

#[test]
fn backward_seeds_solid_position_gradients() {
    let cfg = test_config();
    let scene = test_scene(&cfg);
    let mut sim = Simulation::new(cfg, &scene).unwrap();
    seed_parameters(&mut sim);
    sim.run_forward(STEPS).unwrap();
    sim.run_backward().unwrap();

    let last = STEPS - 1;
    let n_solid = sim.n_solid_particles() as f64;
    let idx = sim.trajectory.idx(last, 0);
    assert_eq!(sim.trajectory.grad_pos[idx].x, -1.0 / n_solid);
    // Gradients reached the initial state through every intermediate step.
    let first = sim.trajectory.grad_pos[sim.trajectory.idx(0, 0)];
    assert!(first.x.is_finite() && first.x != 0.0);
}
