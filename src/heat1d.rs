//! Explicit finite-difference heat diffusion on a rod with fixed zero ends.
//!
//! The rod `[0, l]` starts from `f(x) = x * sqrt((l - x)^3)` and advances with
//! the three-point stencil
//! `T_i <- T_i + alpha*dt/dx^2 * (T_{i-1} - 2 T_i + T_{i+1})`.

use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::{domain::RectDomain, error::FegridError};

/// Largest diffusion number for which the explicit scheme is stable
pub const STABILITY_LIMIT: f64 = 0.5;

pub const DEFAULT_ALPHA: f64 = 1.0;
pub const DEFAULT_STEPS: usize = 1000;
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct HeatRod {
    domain: RectDomain,
    length: f64,
    dt: f64,
    alpha: f64,
    values: Vec<f64>,
}

fn require_positive(value: f64, name: &str) -> Result<(), FegridError> {
    if !(value > 0.0) || !value.is_finite() {
        return Err(FegridError::Input(format!(
            "{name} must be positive and finite, got {value}"
        )));
    }
    Ok(())
}

/// The initial temperature profile `x * sqrt((l - x)^3)`
pub fn initial_temperature(x: f64, length: f64) -> f64 {
    let remaining = (length - x).max(0.0);
    x * (remaining * remaining * remaining).sqrt()
}

impl HeatRod {
    /// Builds a rod with `round(length / dx) + 1` grid points, all at zero
    ///
    /// # Arguments
    /// * `length` - Rod length
    /// * `dx` - Space step
    /// * `dt` - Time step
    /// * `alpha` - Thermal diffusivity
    pub fn new(length: f64, dx: f64, dt: f64, alpha: f64) -> Result<HeatRod, FegridError> {
        require_positive(length, "Length")?;
        require_positive(dx, "Space step")?;
        require_positive(dt, "Time step")?;
        require_positive(alpha, "Diffusivity")?;
        if dx > length {
            return Err(FegridError::Input(format!(
                "Space step {dx} exceeds rod length {length}"
            )));
        }

        let intervals = (length / dx).round() as usize;
        let last = intervals as f64 * dx;
        if (last - length).abs() > 1e-9 * length {
            warn!("space step {dx} does not divide length {length}; last grid point at {last}");
        }

        let domain = RectDomain::new(intervals + 1, 1, dx, 0.0);
        let rod = HeatRod {
            values: vec![0.0; intervals + 1],
            domain,
            length,
            dt,
            alpha,
        };

        let r = rod.diffusion_number();
        if r > STABILITY_LIMIT {
            warn!("diffusion number {r:.4} exceeds {STABILITY_LIMIT}; the explicit scheme is unstable");
        }

        Ok(rod)
    }

    /// `alpha * dt / dx^2`
    pub fn diffusion_number(&self) -> f64 {
        let dx = self.domain.dx();
        self.alpha * self.dt / (dx * dx)
    }

    /// Sets the initial profile and pins both ends to zero
    pub fn initialize(&mut self) {
        for (value, &x) in self.values.iter_mut().zip(self.domain.x_coords()) {
            *value = initial_temperature(x, self.length);
        }
        if let Some(first) = self.values.first_mut() {
            *first = 0.0;
        }
        if let Some(last) = self.values.last_mut() {
            *last = 0.0;
        }
    }

    /// Advances one time step from the previous time level
    ///
    /// # Returns
    /// The largest absolute change of any grid value
    pub fn step(&mut self) -> f64 {
        let r = self.diffusion_number();
        let previous = self.values.clone();
        let mut max_change: f64 = 0.0;

        for i in 1..previous.len().saturating_sub(1) {
            let change = r * (previous[i - 1] - 2.0 * previous[i] + previous[i + 1]);
            self.values[i] = previous[i] + change;
            max_change = max_change.max(change.abs());
        }

        max_change
    }

    pub fn coordinates(&self) -> &[f64] {
        self.domain.x_coords()
    }

    pub fn domain(&self) -> &RectDomain {
        &self.domain
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Drives a rod through its time steps
#[derive(Debug, Clone, Copy)]
pub struct HeatSolution {
    pub num_steps: usize,
    pub tolerance: f64,
}

impl Default for HeatSolution {
    fn default() -> Self {
        HeatSolution {
            num_steps: DEFAULT_STEPS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl HeatSolution {
    /// Applies the initial condition with `T(0) = T(l) = 0`
    pub fn apply_boundary_conditions(&self, rod: &mut HeatRod) {
        rod.initialize();
        info!(
            "boundary conditions applied: T(0) = 0, T({}) = 0",
            rod.length
        );
    }

    /// Steps until `num_steps` is reached or the largest change drops below
    /// `tolerance`
    ///
    /// # Returns
    /// The number of steps taken
    pub fn iterate(&self, rod: &mut HeatRod) -> usize {
        let bar = ProgressBar::new(self.num_steps as u64);

        let mut taken = 0;
        for step in 0..self.num_steps {
            let change = rod.step();
            taken = step + 1;
            bar.inc(1);
            debug!("step {taken}: largest change {change:e}");

            if change < self.tolerance {
                info!("converged after {taken} steps (change {change:e})");
                break;
            }
        }
        bar.finish_and_clear();

        taken
    }

    /// Prints the temperature distribution to stdout
    pub fn print_results(&self, rod: &HeatRod) {
        println!("Final Temperature Distribution:");
        for (x, t) in rod.coordinates().iter().zip(rod.values()) {
            println!("x = {x:.6}, T(x) = {t:.6}");
        }
    }
}
