//! Quadratic B-spline kernel functions for the particle/grid transfers.
//!
//! Both transfer directions use the same 3-node stencil per axis. The adjoint
//! pass also differentiates through the interpolation weights, so the weight
//! derivatives live here next to the weights themselves.

use glam::{DMat2, DVec2, IVec2};

/// Base grid cell and fractional offset for a particle position.
///
/// The stencil covers cells `base + {0,1,2}` per axis; `fx` is the particle's
/// offset from `base` in cell units, always in (0.5, 1.5).
#[inline]
pub fn base_and_frac(position: DVec2, inv_dx: f64) -> (IVec2, DVec2) {
    let scaled = position * inv_dx;
    let base = (scaled - 0.5).floor();
    (base.as_ivec2(), scaled - base)
}

/// Per-axis quadratic B-spline weights over the 3-cell stencil.
///
/// `w[i]` holds the weight of stencil node `i` for both axes; the 2D weight
/// of node `(i, j)` is `w[i].x * w[j].y`. The three weights per axis sum to 1
/// (partition of unity) and have zero first moment about the particle.
#[inline]
pub fn bspline_weights(fx: DVec2) -> [DVec2; 3] {
    let a = DVec2::splat(1.5) - fx;
    let b = fx - DVec2::ONE;
    let c = fx - DVec2::splat(0.5);
    [0.5 * a * a, DVec2::splat(0.75) - b * b, 0.5 * c * c]
}

/// Derivatives of [`bspline_weights`] with respect to `fx`, per axis.
#[inline]
pub fn bspline_weight_derivatives(fx: DVec2) -> [DVec2; 3] {
    [fx - 1.5, -2.0 * (fx - DVec2::ONE), fx - 0.5]
}

/// APIC D matrix inverse for quadratic B-splines: `D = (dx^2/4) I`.
#[inline]
pub fn apic_d_inverse(dx: f64) -> f64 {
    4.0 / (dx * dx)
}

/// Rotation factor of the 2D polar decomposition `F = R S`.
///
/// With `a = f00 + f11` and `b = f10 - f01`, the closest rotation to `F` is
/// `R = [[a, -b], [b, a]] / sqrt(a^2 + b^2)`. Valid while `det F > 0`.
#[inline]
pub fn polar_rotation(f: DMat2) -> DMat2 {
    let a = f.x_axis.x + f.y_axis.y;
    let b = f.x_axis.y - f.y_axis.x;
    let inv_h = 1.0 / (a * a + b * b).sqrt();
    let c = a * inv_h;
    let s = b * inv_h;
    DMat2::from_cols(DVec2::new(c, s), DVec2::new(-s, c))
}

/// Adjoint of [`polar_rotation`]: gradient w.r.t. `F` given the gradient
/// w.r.t. `R`, through `c = a/h`, `s = b/h`, `h = sqrt(a^2 + b^2)`.
#[inline]
pub fn polar_rotation_adjoint(f: DMat2, r_bar: DMat2) -> DMat2 {
    let a = f.x_axis.x + f.y_axis.y;
    let b = f.x_axis.y - f.y_axis.x;
    let h3 = (a * a + b * b).powf(1.5);
    let c_bar = r_bar.x_axis.x + r_bar.y_axis.y;
    let s_bar = r_bar.x_axis.y - r_bar.y_axis.x;
    let a_bar = (b * b * c_bar - a * b * s_bar) / h3;
    let b_bar = (a * a * s_bar - a * b * c_bar) / h3;
    DMat2::from_cols(DVec2::new(a_bar, b_bar), DVec2::new(-b_bar, a_bar))
}

/// Outer product `a b^T`.
#[inline]
pub fn outer_product(a: DVec2, b: DVec2) -> DMat2 {
    DMat2::from_cols(a * b.x, a * b.y)
}

/// Frobenius inner product of two matrices.
#[inline]
pub fn frobenius_dot(a: DMat2, b: DMat2) -> f64 {
    a.x_axis.dot(b.x_axis) + a.y_axis.dot(b.y_axis)
}
