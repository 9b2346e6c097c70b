//! MPS reader (fixed and free form).

use std::collections::HashMap;
use std::io::BufRead;

use super::ParseError;
use crate::problem::{Problem, ProblemBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Start,
    ObjSense,
    Rows,
    Columns,
    Rhs,
    Ranges,
    Bounds,
    Done,
}

#[derive(Debug, Clone, Copy)]
struct ColData {
    lb: f64,
    ub: f64,
    lb_set: bool,
    ub_set: bool,
    integral: bool,
    obj: f64,
}

impl Default for ColData {
    fn default() -> Self {
        Self {
            lb: 0.0,
            ub: f64::INFINITY,
            lb_set: false,
            ub_set: false,
            integral: false,
            obj: 0.0,
        }
    }
}

/// Parse an MPS instance from a buffered reader.
///
/// Supports ROWS (N/L/G/E), COLUMNS with INTORG/INTEND markers, RHS,
/// RANGES, BOUNDS (UP LO FX FR MI PL BV UI LI) and an optional OBJSENSE
/// section. Maximization objectives are negated on the fly; the engine
/// always minimizes.
pub fn parse_mps<R: BufRead>(reader: R, fallback_name: &str) -> Result<Problem, ParseError> {
    let mut section = Section::Start;
    let mut name = fallback_name.to_string();
    let mut maximize = false;

    // row bookkeeping: sense is one of 'L', 'G', 'E'; the first N row is the
    // objective, later N rows are ignored.
    let mut row_index: HashMap<String, usize> = HashMap::new();
    let mut row_sense: Vec<char> = Vec::new();
    let mut obj_row: Option<String> = None;
    let mut free_rows: HashMap<String, ()> = HashMap::new();

    let mut col_index: HashMap<String, usize> = HashMap::new();
    let mut cols: Vec<ColData> = Vec::new();

    let mut entries: Vec<(usize, usize, f64)> = Vec::new();
    let mut rhs: Vec<Option<f64>> = Vec::new();
    let mut ranges: Vec<Option<f64>> = Vec::new();
    let mut obj_offset = 0.0;

    let mut in_integer_block = false;

    for (lineno, line) in reader.lines().enumerate() {
        let lineno = lineno + 1;
        let line = line?;
        if line.starts_with('*') || line.trim().is_empty() {
            continue;
        }

        let indented = line.starts_with(' ') || line.starts_with('\t');
        if !indented {
            let mut tokens = line.split_whitespace();
            let keyword = tokens.next().unwrap_or("").to_ascii_uppercase();
            section = match keyword.as_str() {
                "NAME" => {
                    if let Some(n) = tokens.next() {
                        name = n.to_string();
                    }
                    Section::Start
                }
                "OBJSENSE" => {
                    // the sense may follow on the same line
                    if let Some(sense) = tokens.next() {
                        maximize = sense.to_ascii_uppercase().starts_with("MAX");
                        Section::Start
                    } else {
                        Section::ObjSense
                    }
                }
                "ROWS" => Section::Rows,
                "COLUMNS" => Section::Columns,
                "RHS" => Section::Rhs,
                "RANGES" => Section::Ranges,
                "BOUNDS" => Section::Bounds,
                "ENDATA" => Section::Done,
                other => {
                    return Err(ParseError::syntax(
                        lineno,
                        format!("unknown section '{other}'"),
                    ))
                }
            };
            if section == Section::Done {
                break;
            }
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        match section {
            Section::ObjSense => {
                maximize = tokens
                    .first()
                    .is_some_and(|t| t.to_ascii_uppercase().starts_with("MAX"));
            }
            Section::Rows => {
                if tokens.len() < 2 {
                    return Err(ParseError::syntax(lineno, "row needs a sense and a name"));
                }
                let sense = tokens[0].to_ascii_uppercase();
                let row_name = tokens[1];
                match sense.as_str() {
                    "N" => {
                        if obj_row.is_none() {
                            obj_row = Some(row_name.to_string());
                        } else {
                            free_rows.insert(row_name.to_string(), ());
                        }
                    }
                    "L" | "G" | "E" => {
                        let idx = row_sense.len();
                        row_sense.push(sense.chars().next().unwrap());
                        row_index.insert(row_name.to_string(), idx);
                        rhs.push(None);
                        ranges.push(None);
                    }
                    other => {
                        return Err(ParseError::syntax(
                            lineno,
                            format!("unknown row sense '{other}'"),
                        ))
                    }
                }
            }
            Section::Columns => {
                if tokens.len() >= 3 && tokens[1].trim_matches('\'') == "MARKER" {
                    match tokens[2].trim_matches('\'') {
                        "INTORG" => in_integer_block = true,
                        "INTEND" => in_integer_block = false,
                        other => {
                            return Err(ParseError::syntax(
                                lineno,
                                format!("unknown marker '{other}'"),
                            ))
                        }
                    }
                    continue;
                }
                if tokens.len() < 3 || tokens.len() % 2 == 0 {
                    return Err(ParseError::syntax(lineno, "malformed column entry"));
                }
                let col = *col_index
                    .entry(tokens[0].to_string())
                    .or_insert_with(|| {
                        cols.push(ColData {
                            integral: in_integer_block,
                            ..ColData::default()
                        });
                        cols.len() - 1
                    });
                for pair in tokens[1..].chunks(2) {
                    let value = parse_value(pair[1], lineno)?;
                    if obj_row.as_deref() == Some(pair[0]) {
                        cols[col].obj = value;
                    } else if free_rows.contains_key(pair[0]) {
                        continue;
                    } else if let Some(&row) = row_index.get(pair[0]) {
                        entries.push((row, col, value));
                    } else {
                        return Err(ParseError::syntax(
                            lineno,
                            format!("unknown row '{}'", pair[0]),
                        ));
                    }
                }
            }
            Section::Rhs | Section::Ranges => {
                // the set name in the first column is optional
                let start = if tokens.len() % 2 == 1 { 1 } else { 0 };
                for pair in tokens[start..].chunks(2) {
                    if pair.len() != 2 {
                        return Err(ParseError::syntax(lineno, "malformed side entry"));
                    }
                    let value = parse_value(pair[1], lineno)?;
                    if section == Section::Rhs && obj_row.as_deref() == Some(pair[0]) {
                        // RHS on the objective row is the negated constant
                        obj_offset = -value;
                        continue;
                    }
                    let Some(&row) = row_index.get(pair[0]) else {
                        return Err(ParseError::syntax(
                            lineno,
                            format!("unknown row '{}'", pair[0]),
                        ));
                    };
                    if section == Section::Rhs {
                        rhs[row] = Some(value);
                    } else {
                        ranges[row] = Some(value);
                    }
                }
            }
            Section::Bounds => {
                if tokens.len() < 2 {
                    return Err(ParseError::syntax(lineno, "malformed bound entry"));
                }
                let kind = tokens[0].to_ascii_uppercase();
                let needs_value = matches!(kind.as_str(), "UP" | "LO" | "FX" | "UI" | "LI");
                let (col_name, value) = if needs_value {
                    if tokens.len() >= 4 {
                        (tokens[2], Some(parse_value(tokens[3], lineno)?))
                    } else if tokens.len() == 3 {
                        (tokens[1], Some(parse_value(tokens[2], lineno)?))
                    } else {
                        return Err(ParseError::syntax(lineno, "bound entry needs a value"));
                    }
                } else {
                    (*tokens.last().unwrap(), None)
                };
                let Some(&col) = col_index.get(col_name) else {
                    return Err(ParseError::syntax(
                        lineno,
                        format!("unknown column '{col_name}'"),
                    ));
                };
                let data = &mut cols[col];
                match kind.as_str() {
                    "UP" => {
                        data.ub = value.unwrap();
                        data.ub_set = true;
                    }
                    "LO" => {
                        data.lb = value.unwrap();
                        data.lb_set = true;
                    }
                    "FX" => {
                        data.lb = value.unwrap();
                        data.ub = value.unwrap();
                        data.lb_set = true;
                        data.ub_set = true;
                    }
                    "FR" => {
                        data.lb = f64::NEG_INFINITY;
                        data.ub = f64::INFINITY;
                    }
                    "MI" => data.lb = f64::NEG_INFINITY,
                    "PL" => data.ub = f64::INFINITY,
                    "BV" => {
                        data.lb = 0.0;
                        data.ub = 1.0;
                        data.lb_set = true;
                        data.ub_set = true;
                        data.integral = true;
                    }
                    "UI" => {
                        data.ub = value.unwrap();
                        data.ub_set = true;
                        data.integral = true;
                    }
                    "LI" => {
                        data.lb = value.unwrap();
                        data.lb_set = true;
                        data.integral = true;
                    }
                    other => {
                        return Err(ParseError::syntax(
                            lineno,
                            format!("unknown bound type '{other}'"),
                        ))
                    }
                }
            }
            Section::Start | Section::Done => {
                return Err(ParseError::syntax(lineno, "data outside of any section"));
            }
        }
    }

    let n_rows = row_sense.len();
    let n_cols = cols.len();

    let mut builder = ProblemBuilder::new();
    builder.set_name(name);
    builder.reserve(entries.len(), n_rows, n_cols);
    builder.set_num_cols(n_cols);
    builder.set_num_rows(n_rows);

    let sign = if maximize { -1.0 } else { 1.0 };
    builder.set_obj_offset(sign * obj_offset);
    for (j, data) in cols.iter().enumerate() {
        builder.set_obj(j, sign * data.obj);
        if data.lb.is_finite() {
            builder.set_col_lb(j, data.lb);
        } else {
            builder.set_col_lb_inf(j, true);
        }
        if data.ub.is_finite() {
            builder.set_col_ub(j, data.ub);
        } else {
            builder.set_col_ub_inf(j, true);
        }
        builder.set_col_integral(j, data.integral);
    }

    for i in 0..n_rows {
        let side = rhs[i].unwrap_or(0.0);
        let (mut lhs_val, mut rhs_val) = match row_sense[i] {
            'L' => (f64::NEG_INFINITY, side),
            'G' => (side, f64::INFINITY),
            _ => (side, side),
        };
        if let Some(range) = ranges[i] {
            match row_sense[i] {
                'L' => lhs_val = rhs_val - range.abs(),
                'G' => rhs_val = lhs_val + range.abs(),
                _ => {
                    if range >= 0.0 {
                        rhs_val = lhs_val + range;
                    } else {
                        lhs_val = rhs_val + range;
                    }
                }
            }
        }
        if lhs_val.is_finite() {
            builder.set_row_lhs(i, lhs_val);
        }
        if rhs_val.is_finite() {
            builder.set_row_rhs(i, rhs_val);
        }
    }

    builder.add_entry_all(entries);
    if maximize {
        log::info!("maximization instance: objective negated");
    }
    Ok(builder.build())
}

fn parse_value(token: &str, lineno: usize) -> Result<f64, ParseError> {
    token
        .parse::<f64>()
        .map_err(|_| ParseError::syntax(lineno, format!("invalid number '{token}'")))
}
