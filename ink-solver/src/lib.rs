//! Interactive geometric constraint solver for sketch and ink drawing tools.
//!
//! A [`Sketch`] owns handles (draggable points), scalar variables and the
//! constraints between them. Every frame, [`Sketch::solve`] splits the
//! constraints into independent clusters, pins down whatever can be computed
//! directly, and hands what remains to a numeric [`Minimizer`].

pub use crate::cluster::Cluster;
pub use crate::constraints::Constraint;
pub use crate::error::{MinimizerError, SolverError, TextualError};
pub use crate::handle::{Component, Handle, Point};
pub use crate::id::{ConstraintId, HandleId, IdGenerator, VarId};
pub use crate::minimizer::{Bfgs, Minimizer, Minimum, StopReason};
pub use crate::persist::SerializedSketch;
pub use crate::sketch::Sketch;
pub use crate::solver::SolveReport;
pub use crate::variable::{Offset, Quantity, Represents, Variable};

/// Grouping constraints into independent problems.
mod cluster;
/// Each kind of constraint we support.
mod constraints;
mod error;
/// Optional presentation-driven tweaks to the core solve.
mod extensions;
/// Draggable points.
mod handle;
/// IDs of variables, handles and constraints.
mod id;
/// Values known before the minimizer runs.
mod knowns;
/// Numeric minimization.
mod minimizer;
/// Saving and restoring a sketch.
mod persist;
/// The scene root: owns everything and drives solves.
mod sketch;
/// Per-cluster solve orchestration.
mod solver;
/// Parser for textual representation of sketches.
pub mod textual;
/// Scalar variables and unification.
mod variable;
mod vector;

const EPSILON: f64 = 1e-5;

/// Tuning for the default minimizer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Give up on a cluster after this many iterations.
    /// Its values are left as they were for this frame.
    pub max_iterations: usize,
    /// Converged once every gradient component is smaller than this.
    pub gradient_tolerance: f64,
    /// Converged once a step moves every parameter by less than this.
    pub step_tolerance: f64,
    /// Step used for central-difference gradients.
    pub finite_difference_step: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            gradient_tolerance: 1e-8,
            step_tolerance: 1e-8,
            finite_difference_step: 1e-6,
        }
    }
}

/// Switches for optional behaviour layered on top of the core solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolveOptions {
    /// Hold the length and angle of every polar vector that isn't being
    /// dragged, so it moves rigidly instead of stretching.
    pub stabilize_gizmos: bool,
}
