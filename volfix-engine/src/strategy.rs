//! Rounding strategies for the fix-and-propagate dive.
//!
//! A strategy proposes the next `(column, value)` fixing from the
//! continuous estimate and the current probing view. The family is a
//! tagged enum rather than trait objects: each parallel task owns one
//! variant and dispatch is monomorphic.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use volfix_core::num::Num;
use volfix_core::probing::{Fixing, ProbingView};

/// Strategy family choosing the next variable to round.
///
/// Candidates are always the unfixed integral columns whose estimate value
/// is still fractional; when none remain the strategy returns `None` and
/// the driver completes the leftover columns directly.
pub enum Rounding {
    /// Round the column with the largest distance to the nearest integer,
    /// to the nearest integer. Ties break towards the lowest index.
    Fractional,

    /// Rank columns by a Farkas-style score (the reduced cost when one was
    /// supplied, the objective coefficient otherwise) and round against the
    /// score's sign. `round_up` decides the direction when the score is
    /// zero.
    Farkas {
        /// Direction taken on a zero score.
        round_up: bool,
        /// Optional reduced costs `c - pi^T A` from a dual iterate.
        reduced_costs: Option<Vec<f64>>,
    },

    /// Pick a random candidate and round it up with probability equal to
    /// its fractional part.
    Random {
        /// Seeded generator; identical seeds reproduce identical dives.
        rng: ChaCha8Rng,
    },
}

impl Rounding {
    /// Fractional rounding.
    pub fn fractional() -> Self {
        Rounding::Fractional
    }

    /// Farkas rounding with the given tie orientation.
    pub fn farkas(round_up: bool) -> Self {
        Rounding::Farkas {
            round_up,
            reduced_costs: None,
        }
    }

    /// Seeded random rounding.
    pub fn random(seed: u64) -> Self {
        Rounding::Random {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Supply reduced costs to a Farkas strategy; other variants ignore
    /// them.
    pub fn set_reduced_costs(&mut self, costs: Vec<f64>) {
        if let Rounding::Farkas { reduced_costs, .. } = self {
            *reduced_costs = Some(costs);
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Rounding::Fractional => "fractional",
            Rounding::Farkas { round_up: false, .. } => "farkas-down",
            Rounding::Farkas { round_up: true, .. } => "farkas-up",
            Rounding::Random { .. } => "random",
        }
    }

    /// Choose the next fixing, or `None` when every integral column is
    /// either fixed or already integer-valued on the estimate.
    ///
    /// The returned value always lies within the view's current bounds.
    pub fn select_rounding_variable(
        &mut self,
        x: &[f64],
        view: &ProbingView<'_>,
        num: Num,
    ) -> Option<Fixing> {
        match self {
            Rounding::Fractional => select_fractional(x, view, num),
            Rounding::Farkas {
                round_up,
                reduced_costs,
            } => select_farkas(x, view, num, *round_up, reduced_costs.as_deref()),
            Rounding::Random { rng } => select_random(x, view, num, rng),
        }
    }
}

fn is_candidate(x: &[f64], view: &ProbingView<'_>, num: Num, col: usize) -> bool {
    view.is_integer_variable(col) && !view.is_fixed(col) && !num.is_integral(x[col])
}

/// Clamp a proposed integer value into the column's current domain.
fn clamp_into_domain(view: &ProbingView<'_>, col: usize, value: f64) -> f64 {
    value
        .max(view.probing_lower_bounds()[col])
        .min(view.probing_upper_bounds()[col])
}

fn select_fractional(x: &[f64], view: &ProbingView<'_>, num: Num) -> Option<Fixing> {
    let mut best: Option<(usize, f64)> = None;
    for col in 0..x.len() {
        if !is_candidate(x, view, num, col) {
            continue;
        }
        let distance = (x[col] - num.round(x[col])).abs();
        if best.map_or(true, |(_, d)| distance > d) {
            best = Some((col, distance));
        }
    }
    best.map(|(col, _)| Fixing {
        column: col,
        value: clamp_into_domain(view, col, num.round(x[col])),
    })
}

fn select_farkas(
    x: &[f64],
    view: &ProbingView<'_>,
    num: Num,
    round_up: bool,
    reduced_costs: Option<&[f64]>,
) -> Option<Fixing> {
    let objective = view.get_obj();
    let score = |col: usize| reduced_costs.map_or(objective[col], |rc| rc[col]);

    let mut best: Option<(usize, f64)> = None;
    for col in 0..x.len() {
        if !is_candidate(x, view, num, col) {
            continue;
        }
        let magnitude = score(col).abs();
        if best.map_or(true, |(_, m)| magnitude > m) {
            best = Some((col, magnitude));
        }
    }

    best.map(|(col, _)| {
        let s = score(col);
        // a positive cost favours the floor under minimization
        let value = if num.is_zero(s) {
            if round_up {
                num.feas_ceil(x[col])
            } else {
                num.feas_floor(x[col])
            }
        } else if s > 0.0 {
            num.feas_floor(x[col])
        } else {
            num.feas_ceil(x[col])
        };
        Fixing {
            column: col,
            value: clamp_into_domain(view, col, value),
        }
    })
}

fn select_random(
    x: &[f64],
    view: &ProbingView<'_>,
    num: Num,
    rng: &mut ChaCha8Rng,
) -> Option<Fixing> {
    let candidates: Vec<usize> = (0..x.len())
        .filter(|&col| is_candidate(x, view, num, col))
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let col = candidates[rng.gen_range(0..candidates.len())];
    let fraction = x[col] - x[col].floor();
    let value = if rng.gen::<f64>() < fraction {
        x[col].ceil()
    } else {
        x[col].floor()
    };
    Some(Fixing {
        column: col,
        value: clamp_into_domain(view, col, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use volfix_core::problem::{Problem, ProblemBuilder};

    fn unconstrained_integers(n: usize, obj: Vec<f64>) -> Problem {
        let mut builder = ProblemBuilder::new();
        builder.set_num_cols(n);
        builder.set_num_rows(0);
        builder.set_obj_all(obj);
        builder.set_col_lb_all(vec![0.0; n]);
        builder.set_col_ub_all(vec![1.0; n]);
        builder.set_col_integral_all(vec![true; n]);
        builder.build()
    }

    #[test]
    fn test_fractional_picks_most_fractional() {
        let problem = unconstrained_integers(3, vec![0.0; 3]);
        let view = ProbingView::new(&problem, Num::default());
        let mut strategy = Rounding::fractional();

        let x = [0.9, 0.5, 0.2];
        let fixing = strategy
            .select_rounding_variable(&x, &view, Num::default())
            .unwrap();
        assert_eq!(fixing.column, 1);
        // 0.5 rounds to the nearest integer
        assert!(fixing.value == 0.0 || fixing.value == 1.0);
    }

    #[test]
    fn test_fractional_ties_break_by_index() {
        let problem = unconstrained_integers(3, vec![0.0; 3]);
        let view = ProbingView::new(&problem, Num::default());
        let mut strategy = Rounding::fractional();

        let x = [0.7, 0.3, 0.7];
        let fixing = strategy
            .select_rounding_variable(&x, &view, Num::default())
            .unwrap();
        assert_eq!(fixing.column, 0);
        assert_eq!(fixing.value, 1.0);
    }

    #[test]
    fn test_all_integral_returns_none() {
        let problem = unconstrained_integers(2, vec![0.0; 2]);
        let view = ProbingView::new(&problem, Num::default());

        let x = [1.0, 0.0];
        for mut strategy in [
            Rounding::fractional(),
            Rounding::farkas(false),
            Rounding::random(7),
        ] {
            assert!(strategy
                .select_rounding_variable(&x, &view, Num::default())
                .is_none());
        }
    }

    #[test]
    fn test_farkas_follows_objective_sign() {
        let problem = unconstrained_integers(2, vec![3.0, -5.0]);
        let view = ProbingView::new(&problem, Num::default());
        let x = [0.4, 0.4];

        // |c1| = 5 dominates, and a negative cost rounds up.
        let mut strategy = Rounding::farkas(false);
        let fixing = strategy
            .select_rounding_variable(&x, &view, Num::default())
            .unwrap();
        assert_eq!(fixing.column, 1);
        assert_eq!(fixing.value, 1.0);
    }

    #[test]
    fn test_farkas_orientation_on_zero_score() {
        let problem = unconstrained_integers(1, vec![0.0]);
        let view = ProbingView::new(&problem, Num::default());
        let x = [0.5];

        let mut down = Rounding::farkas(false);
        let fixing = down
            .select_rounding_variable(&x, &view, Num::default())
            .unwrap();
        assert_eq!(fixing.value, 0.0);

        let mut up = Rounding::farkas(true);
        let fixing = up
            .select_rounding_variable(&x, &view, Num::default())
            .unwrap();
        assert_eq!(fixing.value, 1.0);
    }

    #[test]
    fn test_farkas_prefers_reduced_costs_when_present() {
        let problem = unconstrained_integers(2, vec![10.0, 0.1]);
        let view = ProbingView::new(&problem, Num::default());
        let x = [0.4, 0.4];

        let mut strategy = Rounding::farkas(false);
        strategy.set_reduced_costs(vec![0.0, -2.0]);
        let fixing = strategy
            .select_rounding_variable(&x, &view, Num::default())
            .unwrap();
        assert_eq!(fixing.column, 1);
        assert_eq!(fixing.value, 1.0);
    }

    #[test]
    fn test_random_is_reproducible() {
        let problem = unconstrained_integers(4, vec![0.0; 4]);
        let view = ProbingView::new(&problem, Num::default());
        let x = [0.3, 0.6, 0.5, 0.8];

        let mut a = Rounding::random(123);
        let mut b = Rounding::random(123);
        for _ in 0..4 {
            let fa = a.select_rounding_variable(&x, &view, Num::default());
            let fb = b.select_rounding_variable(&x, &view, Num::default());
            assert_eq!(fa, fb);
        }
    }

    #[test]
    fn test_values_respect_tightened_bounds() {
        let problem = unconstrained_integers(1, vec![0.0]);
        let mut view = ProbingView::new(&problem, Num::default());
        // narrow x0 to [1, 1] by fixing, then reset and use a half-open
        // tightening instead
        view.set_probing_column(0, 1.0);
        assert!(view.is_fixed(0));
        view.reset();

        let x = [0.4];
        let mut strategy = Rounding::fractional();
        let fixing = strategy
            .select_rounding_variable(&x, &view, Num::default())
            .unwrap();
        assert!(view.is_within_bounds(fixing.column, fixing.value));
    }
}
