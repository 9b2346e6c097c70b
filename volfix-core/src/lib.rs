//! Core data structures for the volfix primal heuristic engine.
//!
//! This crate provides the pieces shared by the Volume Algorithm and the
//! fix-and-propagate diver:
//!
//! - **Numeric kernel** ([`Num`], [`StableSum`]): epsilon-tolerant
//!   comparisons and compensated summation. Direct `==` on activities or
//!   objective values is never used in the engine.
//! - **Problem model** ([`Problem`], [`ProblemBuilder`]): an immutable
//!   minimization MILP with the constraint matrix stored in both row-major
//!   and column-major form.
//! - **Probing view** ([`ProbingView`]): a reversible bound-tightening
//!   overlay with domain propagation, a fixings trail and an infeasibility
//!   latch.
//! - **Sparse linear algebra** ([`linalg`]): the handful of residual and
//!   affine operations the Volume Algorithm is built from.
//! - **Instance readers** ([`io`]): MPS and PBO parsers, gz-transparent.

#![warn(clippy::all)]

pub mod io;
pub mod linalg;
pub mod num;
pub mod probing;
pub mod problem;
pub mod timer;

pub use num::{Num, StableSum};
pub use probing::{BoundChange, Fixing, ProbingView};
pub use problem::{
    ColFlags, ConstraintMatrix, Objective, Problem, ProblemBuilder, RowFlags, VariableDomains,
};
pub use timer::Timer;
