//! Engine configuration.

/// Parameters for the Volume Algorithm and the fix-and-propagate diver.
///
/// All state the engine needs is passed through this block explicitly;
/// there is no global configuration.
#[derive(Debug, Clone)]
pub struct AlgorithmSettings {
    // === Overall ===
    /// Wall-clock limit in seconds.
    pub time_limit_secs: f64,

    /// Worker threads for the parallel diving phase.
    pub threads: usize,

    /// Seed for the random rounding strategy and random initial solutions.
    pub seed: u64,

    // === Volume algorithm ===
    /// Initial smoothing weight for the primal convex combination.
    pub alpha: f64,

    /// Upper bound for the smoothing weight.
    pub alpha_max: f64,

    /// Initial step-size scaling factor.
    pub f: f64,

    /// Lower bound for the step-size factor.
    pub f_min: f64,

    /// Upper bound for the step-size factor.
    pub f_max: f64,

    /// Multiplier applied to `f` on green (strong improvement) iterations.
    pub f_strong_incr_factor: f64,

    /// Multiplier applied to `f` after enough yellow iterations.
    pub f_weak_incr_factor: f64,

    /// Multiplier applied to `f` after enough red iterations.
    pub f_decr_factor: f64,

    /// Relative duality-gap tolerance.
    pub obj_reltol: f64,

    /// Absolute duality-gap tolerance, used when the bound is near zero.
    pub obj_abstol: f64,

    /// Absolute tolerance on the average constraint violation.
    pub con_abstol: f64,

    /// Yellow iterations before `f` gets a weak increase.
    pub weak_improvement_iter_limit: usize,

    /// Red iterations before `f` is decreased.
    pub non_improvement_iter_limit: usize,

    /// Fraction of integer variables that must be stably integral to stop.
    pub fixed_int_var_threshold: f64,

    /// Iterations a variable must keep its integral value to count as
    /// stable.
    pub fixed_int_var_window: usize,

    /// Volume iteration limit.
    pub max_iterations: usize,

    /// Rows whose max/min absolute coefficient ratio exceeds this are
    /// dropped by the opt-in hard-constraint filter.
    pub threshold_hard_constraints: f64,

    // === Fix-and-propagate ===
    /// Successful backtracks allowed per dive.
    pub max_backtracks: usize,
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        Self {
            time_limit_secs: 600.0,
            threads: 8,
            seed: 0,

            alpha: 0.5,
            alpha_max: 0.1,
            f: 0.2,
            f_min: 5e-4,
            f_max: 2.0,
            f_strong_incr_factor: 2.0,
            f_weak_incr_factor: 1.1,
            f_decr_factor: 0.66,
            obj_reltol: 0.01,
            obj_abstol: 0.01,
            con_abstol: 0.02,
            weak_improvement_iter_limit: 2,
            non_improvement_iter_limit: 20,
            fixed_int_var_threshold: 0.8,
            fixed_int_var_window: 20,
            max_iterations: 500,
            threshold_hard_constraints: 1.0,

            max_backtracks: 16,
        }
    }
}

impl AlgorithmSettings {
    /// Set the wall-clock limit in seconds.
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit_secs = seconds;
        self
    }

    /// Set the worker thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Set the randomization seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the volume iteration limit.
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }
}
