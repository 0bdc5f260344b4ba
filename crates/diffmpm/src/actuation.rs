//! Sinusoidal-basis actuation controller.
//!
//! Each actuator's activation is a pure function of the time step and the
//! controller parameters - no recurrence - so every step can be evaluated and
//! differentiated independently:
//!
//! `activation[t, a] = tanh(bias[a] + sum_j weights[a, j] *
//! sin(omega * t * dt + 2 pi j / n_sin_waves))`

use crate::config::SimConfig;

/// Controller parameters, their gradient accumulators, and the per-step
/// activation table shared with the P2G kernel.
pub struct ActuationController {
    n_actuators: usize,
    n_sin_waves: usize,
    omega: f64,
    dt: f64,
    /// Basis weights, flat-indexed `actuator * n_sin_waves + wave`.
    pub weights: Vec<f64>,
    /// Per-actuator bias.
    pub bias: Vec<f64>,
    /// Accumulated loss gradient w.r.t. `weights`.
    pub grad_weights: Vec<f64>,
    /// Accumulated loss gradient w.r.t. `bias`.
    pub grad_bias: Vec<f64>,
    /// Activation table, flat-indexed `step * n_actuators + actuator`.
    activation: Vec<f64>,
    /// Loss gradient w.r.t. the activation table, filled by the P2G adjoint.
    grad_activation: Vec<f64>,
}

impl ActuationController {
    pub fn new(n_actuators: usize, cfg: &SimConfig) -> Self {
        Self {
            n_actuators,
            n_sin_waves: cfg.n_sin_waves,
            omega: cfg.actuation_omega,
            dt: cfg.dt,
            weights: vec![0.0; n_actuators * cfg.n_sin_waves],
            bias: vec![0.0; n_actuators],
            grad_weights: vec![0.0; n_actuators * cfg.n_sin_waves],
            grad_bias: vec![0.0; n_actuators],
            activation: vec![0.0; n_actuators * cfg.max_steps],
            grad_activation: vec![0.0; n_actuators * cfg.max_steps],
        }
    }

    #[inline]
    pub fn n_actuators(&self) -> usize {
        self.n_actuators
    }

    #[inline]
    pub fn n_sin_waves(&self) -> usize {
        self.n_sin_waves
    }

    #[inline]
    fn phase(&self, t: usize, wave: usize) -> f64 {
        self.omega * t as f64 * self.dt
            + 2.0 * std::f64::consts::PI * wave as f64 / self.n_sin_waves as f64
    }

    /// Evaluate every actuator's activation for step `t`.
    pub fn compute_step(&mut self, t: usize) {
        for a in 0..self.n_actuators {
            let mut u = self.bias[a];
            for j in 0..self.n_sin_waves {
                u += self.weights[a * self.n_sin_waves + j] * self.phase(t, j).sin();
            }
            self.activation[t * self.n_actuators + a] = u.tanh();
        }
    }

    /// Backpropagate the activation gradients of step `t` into the weight and
    /// bias gradient accumulators (additive across steps and particles).
    pub fn adjoint_step(&mut self, t: usize) {
        for a in 0..self.n_actuators {
            let act = self.activation[t * self.n_actuators + a];
            let upstream = self.grad_activation[t * self.n_actuators + a];
            // tanh'(u) = 1 - tanh(u)^2
            let u_bar = upstream * (1.0 - act * act);
            for j in 0..self.n_sin_waves {
                self.grad_weights[a * self.n_sin_waves + j] += u_bar * self.phase(t, j).sin();
            }
            self.grad_bias[a] += u_bar;
        }
    }

    /// Activation row for step `t`, read by P2G.
    #[inline]
    pub fn activations(&self, t: usize) -> &[f64] {
        let start = t * self.n_actuators;
        &self.activation[start..start + self.n_actuators]
    }

    /// Activation row and its gradient row for step `t`, borrowed together
    /// for the P2G adjoint.
    #[inline]
    pub(crate) fn step_rows_mut(&mut self, t: usize) -> (&[f64], &mut [f64]) {
        let start = t * self.n_actuators;
        let end = start + self.n_actuators;
        (
            &self.activation[start..end],
            &mut self.grad_activation[start..end],
        )
    }

    /// Zero the activation table and its gradients (start of a rollout).
    pub fn clear_activations(&mut self) {
        self.activation.fill(0.0);
        self.grad_activation.fill(0.0);
    }

    /// Zero the parameter gradient accumulators (start of a backward sweep).
    pub fn clear_gradients(&mut self) {
        self.grad_weights.fill(0.0);
        self.grad_bias.fill(0.0);
        self.grad_activation.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn controller() -> ActuationController {
        let cfg = SimConfig {
            max_steps: 8,
            ..Default::default()
        };
        let mut ctrl = ActuationController::new(2, &cfg);
        for (i, w) in ctrl.weights.iter_mut().enumerate() {
            *w = 0.1 * (i as f64 + 1.0);
        }
        ctrl.bias[0] = 0.05;
        ctrl.bias[1] = -0.3;
        ctrl
    }

    #[test]
    fn activation_matches_formula_and_is_bounded() {
        let mut ctrl = controller();
        ctrl.compute_step(3);
        let acts = ctrl.activations(3);
        for (a, &act) in acts.iter().enumerate() {
            let mut u = ctrl.bias[a];
            for j in 0..ctrl.n_sin_waves() {
                u += ctrl.weights[a * ctrl.n_sin_waves() + j] * ctrl.phase(3, j).sin();
            }
            assert_relative_eq!(act, u.tanh(), epsilon = 1e-15);
            assert!(act.abs() < 1.0);
        }
    }

    #[test]
    fn adjoint_matches_finite_difference() {
        let mut ctrl = controller();
        ctrl.compute_step(2);
        ctrl.step_rows_mut(2).1[0] = 1.0;
        ctrl.adjoint_step(2);
        let analytic = ctrl.grad_weights[1];

        let h = 1e-7;
        let probe = |w: f64| {
            let mut c = controller();
            c.weights[1] = w;
            c.compute_step(2);
            c.activations(2)[0]
        };
        let base = controller().weights[1];
        let fd = (probe(base + h) - probe(base - h)) / (2.0 * h);
        assert_relative_eq!(analytic, fd, epsilon = 1e-6);
    }
}
