//! Primal heuristic engine for mixed-integer linear programs.
//!
//! Two tightly coupled subsystems try to produce a good feasible integer
//! solution without a branch-and-bound tree:
//!
//! 1. The **Volume Algorithm** ([`volume::VolumeAlgorithm`]) runs an
//!    approximate Lagrangian dual ascent on a reformulated problem whose
//!    rows are all `=` or `>=`, producing a smoothed continuous estimate
//!    `x_bar` and a lower bound.
//! 2. **Fix-and-propagate** ([`propagate::FixAndPropagate`]) dives on
//!    `x_bar` with several rounding strategies in parallel
//!    ([`heuristic::Heuristic`]), propagating domains after every fixing,
//!    optionally backtracking on infeasibility, and polishing feasible
//!    candidates with a one-opt pass.
//!
//! The engine proves nothing: it either returns an improved incumbent or
//! reports that no strategy found one.

#![warn(clippy::all)]

pub mod conflict;
pub mod error;
pub mod heuristic;
pub mod propagate;
pub mod reformulate;
pub mod settings;
pub mod strategy;
pub mod volume;

pub use error::{EngineError, EngineResult};
pub use heuristic::{Heuristic, OneOptMode};
pub use propagate::{FixAndPropagate, InitialSolutionMode};
pub use settings::AlgorithmSettings;
pub use strategy::Rounding;
pub use volume::VolumeAlgorithm;
