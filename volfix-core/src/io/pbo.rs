//! Pseudo-Boolean (OPB/PBO) reader.
//!
//! The first non-comment statement is `min: <linear expr> ;`; every later
//! statement is `<linear expr> (>=|=) <integer> ;`. All variables are
//! binary. `~x` denotes `1 - x` and is expanded while parsing: the constant
//! part moves into the right-hand side (or the objective offset).

use std::collections::HashMap;
use std::io::BufRead;

use super::ParseError;
use crate::problem::{Problem, ProblemBuilder};

#[derive(Debug, Default)]
struct PboData {
    var_index: HashMap<String, usize>,
    n_vars: usize,
    obj: Vec<(usize, f64)>,
    obj_offset: f64,
    // per constraint: terms, is_equation, side (already offset-adjusted)
    rows: Vec<(Vec<(usize, f64)>, bool, f64)>,
}

impl PboData {
    fn var(&mut self, name: &str) -> usize {
        *self.var_index.entry(name.to_string()).or_insert_with(|| {
            self.n_vars += 1;
            self.n_vars - 1
        })
    }
}

/// Parse a PBO/OPB instance from a buffered reader.
pub fn parse_pbo<R: BufRead>(reader: R, name: &str) -> Result<Problem, ParseError> {
    let mut data = PboData::default();
    let mut statement = String::new();
    let mut statement_start = 0usize;
    let mut seen_objective = false;

    for (lineno, line) in reader.lines().enumerate() {
        let lineno = lineno + 1;
        let line = line?;
        if line.trim_start().starts_with('*') || line.trim().is_empty() {
            continue;
        }
        if statement.is_empty() {
            statement_start = lineno;
        }
        statement.push(' ');
        statement.push_str(&line);

        // statements may span lines; process every complete one
        while let Some(end) = statement.find(';') {
            let complete: String = statement.drain(..=end).collect();
            let complete = complete.trim_end_matches(';').trim().to_string();
            if complete.is_empty() {
                continue;
            }
            parse_statement(&mut data, &complete, statement_start, &mut seen_objective)?;
            statement_start = lineno;
        }
    }

    if !statement.trim().is_empty() {
        return Err(ParseError::syntax(
            statement_start,
            "unterminated statement (missing ';')",
        ));
    }
    if !seen_objective {
        return Err(ParseError::syntax(1, "missing 'min:' objective"));
    }

    let mut builder = ProblemBuilder::new();
    builder.set_name(name);
    builder.set_num_cols(data.n_vars);
    builder.set_num_rows(data.rows.len());
    builder.set_obj_offset(data.obj_offset);
    for j in 0..data.n_vars {
        builder.set_col_lb(j, 0.0);
        builder.set_col_ub(j, 1.0);
        builder.set_col_integral(j, true);
    }
    for &(col, coeff) in &data.obj {
        builder.set_obj(col, coeff);
    }
    for (i, (terms, is_equation, side)) in data.rows.iter().enumerate() {
        for &(col, coeff) in terms {
            builder.add_entry(i, col, coeff);
        }
        builder.set_row_lhs(i, *side);
        if *is_equation {
            builder.set_row_rhs(i, *side);
        }
    }
    Ok(builder.build())
}

fn parse_statement(
    data: &mut PboData,
    statement: &str,
    lineno: usize,
    seen_objective: &mut bool,
) -> Result<(), ParseError> {
    if let Some(expr) = statement
        .strip_prefix("min:")
        .or_else(|| statement.strip_prefix("min :"))
    {
        if *seen_objective {
            return Err(ParseError::syntax(lineno, "duplicate objective"));
        }
        *seen_objective = true;
        let (terms, offset) = parse_terms(data, expr, lineno)?;
        data.obj = terms;
        data.obj_offset = offset;
        return Ok(());
    }
    if !*seen_objective {
        return Err(ParseError::syntax(
            lineno,
            "first statement must be the 'min:' objective",
        ));
    }

    let (lhs_text, is_equation, side_text) = if let Some(pos) = statement.find(">=") {
        (&statement[..pos], false, &statement[pos + 2..])
    } else if let Some(pos) = statement.find('=') {
        (&statement[..pos], true, &statement[pos + 1..])
    } else {
        return Err(ParseError::syntax(
            lineno,
            "constraint without '>=' or '=' relation",
        ));
    };

    let side: f64 = side_text.trim().parse().map_err(|_| {
        ParseError::syntax(lineno, format!("invalid right-hand side '{side_text}'"))
    })?;
    let (terms, offset) = parse_terms(data, lhs_text, lineno)?;
    // `~x` expansion left a constant on the lhs; fold it into the side
    data.rows.push((terms, is_equation, side - offset));
    Ok(())
}

/// Parse a linear expression into `(coefficient, variable)` terms plus the
/// constant produced by complemented literals.
fn parse_terms(
    data: &mut PboData,
    expr: &str,
    lineno: usize,
) -> Result<(Vec<(usize, f64)>, f64), ParseError> {
    let mut terms: Vec<(usize, f64)> = Vec::new();
    let mut offset = 0.0;
    let mut pending: Option<f64> = None;

    for token in expr.split_whitespace() {
        if let Ok(value) = token.parse::<f64>() {
            if pending.is_some() {
                return Err(ParseError::syntax(
                    lineno,
                    format!("coefficient '{value}' without a variable"),
                ));
            }
            pending = Some(value);
            continue;
        }

        let coeff = pending.take().unwrap_or(1.0);
        let (negated, var_name) = match token.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        if var_name.is_empty() {
            return Err(ParseError::syntax(lineno, "empty variable name"));
        }
        let col = data.var(var_name);
        if negated {
            // a * (1 - x) = a - a x
            offset += coeff;
            terms.push((col, -coeff));
        } else {
            terms.push((col, coeff));
        }
    }

    if pending.is_some() {
        return Err(ParseError::syntax(lineno, "trailing coefficient"));
    }
    Ok((terms, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::num::Num;
    use crate::problem::{ColFlags, RowFlags};
    use std::io::Cursor;

    const SMALL_PBO: &str = "\
* #variable= 3 #constraint= 2
min: +1 x1 +2 x2 -1 x3 ;
+1 x1 +1 x2 >= 1 ;
+1 x1 +1 ~x2 +1 x3 = 2 ;
";

    #[test]
    fn test_parse_small_instance() {
        let problem = parse_pbo(Cursor::new(SMALL_PBO), "small").unwrap();

        assert_eq!(problem.n_cols(), 3);
        assert_eq!(problem.n_rows(), 2);
        assert_eq!(problem.objective().coefficients, vec![1.0, 2.0, -1.0]);

        for j in 0..3 {
            assert!(problem.col_flags()[j].test(ColFlags::INTEGRAL));
            assert_eq!(problem.lower_bounds()[j], 0.0);
            assert_eq!(problem.upper_bounds()[j], 1.0);
        }

        // x1 + x2 >= 1
        assert!(problem.matrix().row_flags()[0].test(RowFlags::RHS_INF));
        assert_eq!(problem.matrix().lhs()[0], 1.0);

        // x1 + (1 - x2) + x3 = 2 becomes x1 - x2 + x3 = 1.
        assert!(problem.matrix().row_flags()[1].test(RowFlags::EQUATION));
        assert_eq!(problem.matrix().lhs()[1], 1.0);
        let row1: Vec<(usize, f64)> = problem
            .matrix()
            .row(1)
            .iter()
            .map(|(j, &v)| (j, v))
            .collect();
        assert_eq!(row1, vec![(0, 1.0), (1, -1.0), (2, 1.0)]);
    }

    #[test]
    fn test_complement_in_objective() {
        let pbo = "min: +3 ~x1 ;\n+1 x1 >= 0 ;\n";
        let problem = parse_pbo(Cursor::new(pbo), "t").unwrap();
        // 3 (1 - x1) = 3 - 3 x1
        assert_eq!(problem.objective().coefficients, vec![-3.0]);
        assert_eq!(problem.objective().offset, 3.0);
        assert_eq!(problem.compute_objective(&[1.0]), 0.0);
    }

    #[test]
    fn test_solution_feasibility_roundtrip() {
        let problem = parse_pbo(Cursor::new(SMALL_PBO), "small").unwrap();
        let num = Num::default();
        // x = (1, 0, 0): row 0 gives 1 >= 1; row 1 gives 1 - 0 + 0 = 1.
        assert!(problem.is_primal_feasible(&[1.0, 0.0, 0.0], num));
        // x = (0, 0, 0) violates row 0.
        assert!(!problem.is_primal_feasible(&[0.0, 0.0, 0.0], num));
    }

    #[test]
    fn test_missing_objective_is_an_error() {
        let pbo = "+1 x1 >= 1 ;\n";
        assert!(parse_pbo(Cursor::new(pbo), "t").is_err());
    }

    #[test]
    fn test_unterminated_statement_is_an_error() {
        let pbo = "min: +1 x1 ;\n+1 x1 >= 1\n";
        assert!(parse_pbo(Cursor::new(pbo), "t").is_err());
    }
}
