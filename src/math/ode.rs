//! Adaptive Dormand–Prince 5(4) integrator.
//!
//! This is deliberately small: fixed-size state (`[f64; N]`), a fallible
//! right-hand side, and output at a caller-provided non-decreasing list of
//! points. Steps are clipped so that every output point is hit exactly, so no
//! dense-output interpolation is needed.
//!
//! The right-hand side is fallible because the cosmology model rejects
//! unphysical states instead of returning NaN; that error aborts the
//! integration and is passed through unchanged. The one exception is
//! [`ModelError::DensityOverflow`]: like a non-finite stage value it only means
//! the trial step was too long, so the step is rejected and retried shorter.

use crate::error::ModelError;

/// Right-hand side of `dy/dx = f(x, y)`.
pub trait OdeSystem<const N: usize> {
    fn rhs(&self, x: f64, y: &[f64; N]) -> Result<[f64; N], ModelError>;
}

/// Step-size control settings.
#[derive(Debug, Clone)]
pub struct OdeOptions {
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance.
    pub atol: f64,
    /// Initial step size; `0.0` picks one from the local derivative scale.
    pub h0: f64,
    /// Smallest step before giving up.
    pub h_min: f64,
    /// Largest step.
    pub h_max: f64,
    /// Maximum number of attempted steps per call.
    pub max_steps: usize,
}

impl Default for OdeOptions {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-10,
            h0: 0.0,
            h_min: 1e-12,
            h_max: 0.5,
            max_steps: 100_000,
        }
    }
}

// Dormand–Prince coefficients.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;

// 5th-order weights (advancing solution).
const B1: f64 = 35.0 / 384.0;
const B3: f64 = 500.0 / 1113.0;
const B4: f64 = 125.0 / 192.0;
const B5: f64 = -2187.0 / 6784.0;
const B6: f64 = 11.0 / 84.0;

// 4th-order weights (error estimate only).
const BS1: f64 = 5179.0 / 57600.0;
const BS3: f64 = 7571.0 / 16695.0;
const BS4: f64 = 393.0 / 640.0;
const BS5: f64 = -92097.0 / 339200.0;
const BS6: f64 = 187.0 / 2100.0;
const BS7: f64 = 1.0 / 40.0;

const E1: f64 = B1 - BS1;
const E3: f64 = B3 - BS3;
const E4: f64 = B4 - BS4;
const E5: f64 = B5 - BS5;
const E6: f64 = B6 - BS6;
const E7: f64 = -BS7;

/// Step shrink applied after a trial step overflowed.
const OVERFLOW_SHRINK: f64 = 0.2;

/// Integrate from `(x0, y0)` and return the state at every point in `outputs`.
///
/// `outputs` must be non-decreasing and start at or after `x0`. An output equal
/// to the current position (including `x0` itself) returns the current state
/// without stepping.
pub fn integrate<S, const N: usize>(
    sys: &S,
    x0: f64,
    y0: [f64; N],
    outputs: &[f64],
    opts: &OdeOptions,
) -> Result<Vec<[f64; N]>, ModelError>
where
    S: OdeSystem<N>,
{
    let mut x = x0;
    let mut y = y0;
    let mut k1 = sys.rhs(x, &y)?;
    let mut h = initial_step(sys, x0, &y, &k1, outputs, opts);
    let mut steps = 0usize;
    let mut out = Vec::with_capacity(outputs.len());

    for (index, &target) in outputs.iter().enumerate() {
        if !target.is_finite() {
            return Err(ModelError::NonFiniteQuery { index });
        }
        if target < x {
            return Err(ModelError::QueryBeforeInitial { x: target, x_ini: x });
        }

        while x < target {
            if steps >= opts.max_steps {
                return Err(ModelError::StepLimit {
                    max_steps: opts.max_steps,
                    x,
                    target,
                });
            }
            steps += 1;

            let remaining = target - x;
            let h_try = h.min(opts.h_max).min(remaining);
            let Some((y_new, k7, err_norm)) = dopri_step(sys, x, &y, &k1, h_try, opts)? else {
                h = h_try * OVERFLOW_SHRINK;
                if h < opts.h_min {
                    return Err(ModelError::StepUnderflow { x });
                }
                continue;
            };

            if err_norm <= 1.0 {
                // Snap onto the target so round-off cannot leave a sliver behind.
                x = if h_try >= remaining { target } else { x + h_try };
                y = y_new;
                k1 = k7;
            }

            let factor = if err_norm == 0.0 {
                5.0
            } else {
                (0.9 * err_norm.powf(-0.2)).clamp(0.2, 5.0)
            };
            // Keep the unclipped step when it was only shortened to land on a target.
            let base = if err_norm <= 1.0 { h } else { h_try };
            h = base * factor;
            if h < opts.h_min && x < target {
                return Err(ModelError::StepUnderflow { x });
            }
        }

        out.push(y);
    }

    Ok(out)
}

/// Starting step from the scale of `y0` and its derivatives (Hairer, Nørsett &
/// Wanner, *Solving ODEs I*, II.4), capped by `h_max` and the span.
fn initial_step<S, const N: usize>(
    sys: &S,
    x0: f64,
    y0: &[f64; N],
    f0: &[f64; N],
    outputs: &[f64],
    opts: &OdeOptions,
) -> f64
where
    S: OdeSystem<N>,
{
    if opts.h0 > 0.0 {
        return opts.h0;
    }
    let span = outputs.last().map(|&xe| (xe - x0).abs()).unwrap_or(0.0);
    let cap = if span > 0.0 { opts.h_max.min(span) } else { opts.h_max };

    let scale: [f64; N] = std::array::from_fn(|i| opts.atol + opts.rtol * y0[i].abs());
    let d0 = rms_norm(y0, &scale);
    let d1 = rms_norm(f0, &scale);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
    let h0 = h0.min(cap);

    let y1: [f64; N] = std::array::from_fn(|i| y0[i] + h0 * f0[i]);
    let h1 = match sys.rhs(x0 + h0, &y1) {
        Ok(f1) if f1.iter().all(|v| v.is_finite()) => {
            let diff: [f64; N] = std::array::from_fn(|i| f1[i] - f0[i]);
            let d2 = rms_norm(&diff, &scale) / h0;
            let dmax = d1.max(d2);
            if dmax <= 1e-15 {
                (h0 * 1e-3).max(1e-6)
            } else {
                (0.01 / dmax).powf(0.2)
            }
        }
        // The trial point failed; keep the first estimate.
        _ => h0,
    };

    (100.0 * h0).min(h1).min(cap).max(opts.h_min)
}

fn rms_norm<const N: usize>(v: &[f64; N], scale: &[f64; N]) -> f64 {
    if N == 0 {
        return 0.0;
    }
    let sum: f64 = v.iter().zip(scale).map(|(a, s)| (a / s) * (a / s)).sum();
    (sum / N as f64).sqrt()
}

/// Right-hand side at a trial stage; `None` when the stage overflowed.
fn stage<S, const N: usize>(sys: &S, x: f64, y: &[f64; N]) -> Result<Option<[f64; N]>, ModelError>
where
    S: OdeSystem<N>,
{
    if y.iter().any(|v| !v.is_finite()) {
        return Ok(None);
    }
    match sys.rhs(x, y) {
        Ok(k) if k.iter().all(|v| v.is_finite()) => Ok(Some(k)),
        Ok(_) | Err(ModelError::DensityOverflow { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

/// One Dormand–Prince step. Returns the 5th-order solution, the FSAL slope at
/// the new point, and the scaled RMS error norm, or `None` if a stage overflowed.
fn dopri_step<S, const N: usize>(
    sys: &S,
    x: f64,
    y: &[f64; N],
    k1: &[f64; N],
    h: f64,
    opts: &OdeOptions,
) -> Result<Option<([f64; N], [f64; N], f64)>, ModelError>
where
    S: OdeSystem<N>,
{
    let mut tmp = [0.0; N];

    for i in 0..N {
        tmp[i] = y[i] + h * A21 * k1[i];
    }
    let Some(k2) = stage(sys, x + C2 * h, &tmp)? else {
        return Ok(None);
    };

    for i in 0..N {
        tmp[i] = y[i] + h * (A31 * k1[i] + A32 * k2[i]);
    }
    let Some(k3) = stage(sys, x + C3 * h, &tmp)? else {
        return Ok(None);
    };

    for i in 0..N {
        tmp[i] = y[i] + h * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
    }
    let Some(k4) = stage(sys, x + C4 * h, &tmp)? else {
        return Ok(None);
    };

    for i in 0..N {
        tmp[i] = y[i] + h * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
    }
    let Some(k5) = stage(sys, x + C5 * h, &tmp)? else {
        return Ok(None);
    };

    for i in 0..N {
        tmp[i] = y[i] + h * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
    }
    let Some(k6) = stage(sys, x + h, &tmp)? else {
        return Ok(None);
    };

    let mut y_new = [0.0; N];
    for i in 0..N {
        y_new[i] = y[i] + h * (B1 * k1[i] + B3 * k3[i] + B4 * k4[i] + B5 * k5[i] + B6 * k6[i]);
    }
    let Some(k7) = stage(sys, x + h, &y_new)? else {
        return Ok(None);
    };

    let mut err_sq = 0.0;
    for i in 0..N {
        let ei = h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
        let scale = opts.atol + opts.rtol * y[i].abs().max(y_new[i].abs());
        err_sq += (ei / scale) * (ei / scale);
    }
    let err_norm = (err_sq / N as f64).sqrt();

    Ok(Some((y_new, k7, err_norm)))
}
