//! C ABI for the volfix heuristic engine.
//!
//! An external MIP solver drives the engine through an opaque handle:
//! [`setup`] reads an instance and returns the handle, [`call_algorithm`]
//! runs fix-and-propagate on a continuous estimate, [`perform_one_opt`]
//! polishes an integer solution, [`call_simple_heuristic`] tries the
//! estimate-free fallback and [`delete_problem_instance`] releases the
//! handle. The handle owns the problem, the settings and the conflict rows
//! collected so far; ownership never crosses the boundary in any other
//! form.

#![warn(clippy::all)]

use std::borrow::Cow;
use std::ffi::CStr;
use std::os::raw::{c_char, c_double, c_int, c_void};
use std::ptr;
use std::slice;

use volfix_core::num::Num;
use volfix_core::timer::Timer;
use volfix_engine::conflict::{append_conflicts, ConflictRow};
use volfix_engine::reformulate::with_objective_cutoff;
use volfix_engine::{AlgorithmSettings, Heuristic, OneOptMode};

/// Everything an embedding solver session needs, behind one opaque
/// pointer.
struct HeuristicHandle {
    problem: volfix_core::problem::Problem,
    num: Num,
    settings: AlgorithmSettings,
    conflicts: Vec<ConflictRow>,
    add_cutoff: bool,
}

fn init_logging(verbosity_level: c_int) {
    let level = match verbosity_level {
        n if n <= 0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let _ = env_logger::Builder::new().filter_level(level).try_init();
}

fn one_opt_mode(raw: c_int) -> OneOptMode {
    match raw {
        1 => OneOptMode::FeasibilityCheck,
        2 => OneOptMode::Propagate,
        _ => OneOptMode::Off,
    }
}

/// Read the instance at `filename` and return an opaque handle.
///
/// `*result` receives 0 on success and 1 on a setup or parse failure (in
/// which case the returned pointer is null). `add_cutoff_constraint`
/// makes later [`call_algorithm`] invocations extend the problem with an
/// objective cutoff against the incumbent.
///
/// # Safety
///
/// `filename` must be a valid NUL-terminated C string and `result` a valid
/// pointer to an `int`.
#[no_mangle]
pub unsafe extern "C" fn setup(
    filename: *const c_char,
    result: *mut c_int,
    verbosity_level: c_int,
    _current_time_stamp: c_double,
    add_cutoff_constraint: c_int,
) -> *mut c_void {
    init_logging(verbosity_level);

    if filename.is_null() {
        *result = 1;
        return ptr::null_mut();
    }
    let Ok(path) = CStr::from_ptr(filename).to_str() else {
        eprintln!("setup: filename is not valid UTF-8");
        *result = 1;
        return ptr::null_mut();
    };

    match volfix_core::io::read_problem(path) {
        Ok(problem) => {
            log::info!(
                "loaded instance '{}': {} rows, {} cols",
                problem.name(),
                problem.n_rows(),
                problem.n_cols()
            );
            *result = 0;
            let handle = Box::new(HeuristicHandle {
                problem,
                num: Num::default(),
                settings: AlgorithmSettings::default(),
                conflicts: Vec::new(),
                add_cutoff: add_cutoff_constraint != 0,
            });
            Box::into_raw(handle) as *mut c_void
        }
        Err(error) => {
            eprintln!("setup: {error}");
            *result = 1;
            ptr::null_mut()
        }
    }
}

/// Run fix-and-propagate (plus optional one-opt) on a continuous estimate.
///
/// Returns 1 when a solution better than `*current_obj_value` was found;
/// the solution is then in `result` and `*current_obj_value` is updated.
/// With a nonzero `infeasible_copy_strategy` the best-effort assignment of
/// an infeasible dive is copied out even on failure.
///
/// # Safety
///
/// `heuristic_void_ptr` must come from [`setup`]; `cont_solution` and
/// `result` must point to `n_cols` doubles; `current_obj_value` must be a
/// valid pointer.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn call_algorithm(
    heuristic_void_ptr: *mut c_void,
    cont_solution: *mut c_double,
    result: *mut c_double,
    n_cols: c_int,
    current_obj_value: *mut c_double,
    infeasible_copy_strategy: c_int,
    apply_conflicts: c_int,
    size_of_constraints: c_int,
    max_backtracks: c_int,
    perform_one_opt: c_int,
    remaining_time_in_sec: c_double,
) -> c_int {
    let handle = &mut *(heuristic_void_ptr as *mut HeuristicHandle);
    let n = n_cols as usize;
    if n != handle.problem.n_cols() {
        log::error!(
            "call_algorithm: expected {} columns, got {n}",
            handle.problem.n_cols()
        );
        return 0;
    }

    let estimate = slice::from_raw_parts(cont_solution, n);
    let out = slice::from_raw_parts_mut(result, n);
    let num = handle.num;
    let incumbent_obj = *current_obj_value;

    let mut settings = handle.settings.clone();
    settings.max_backtracks = max_backtracks.max(0) as usize;

    // Work on an extended copy when a cutoff or collected conflicts apply.
    let mut effective: Cow<'_, volfix_core::problem::Problem> = Cow::Borrowed(&handle.problem);
    if handle.add_cutoff && incumbent_obj.is_finite() {
        effective = Cow::Owned(with_objective_cutoff(&effective, incumbent_obj, num));
    }
    if apply_conflicts != 0
        && !handle.conflicts.is_empty()
        && handle.conflicts.len() >= size_of_constraints.max(0) as usize
    {
        effective = Cow::Owned(append_conflicts(&effective, &handle.conflicts));
        log::info!(
            "call_algorithm: applied {} collected conflicts",
            handle.conflicts.len()
        );
        handle.conflicts.clear();
    }

    let timer = Timer::new(remaining_time_in_sec.max(0.0));
    let mut heuristic = Heuristic::new(&effective, num, settings);
    heuristic.setup();

    let mut best_obj = incumbent_obj;
    let mut best_solution = Vec::new();
    let found = heuristic.perform_fix_and_propagate(
        estimate,
        &timer,
        one_opt_mode(perform_one_opt),
        &mut best_obj,
        &mut best_solution,
    );

    if apply_conflicts != 0 {
        handle.conflicts.extend(heuristic.extract_conflicts());
    }

    let improved = found && (!incumbent_obj.is_finite() || num.is_lt(best_obj, incumbent_obj));
    if improved {
        out.copy_from_slice(&best_solution);
        *current_obj_value = best_obj;
        return 1;
    }

    if infeasible_copy_strategy != 0 {
        // best effort: hand back the least-objective infeasible assignment
        let best_infeasible = heuristic
            .candidates()
            .filter(|(infeasible, _, _)| *infeasible)
            .map(|(_, _, solution)| solution)
            .min_by(|a, b| {
                handle
                    .problem
                    .compute_objective(a)
                    .total_cmp(&handle.problem.compute_objective(b))
            });
        if let Some(solution) = best_infeasible {
            out.copy_from_slice(solution);
        }
    }
    0
}

/// One-opt polish of an integer solution in place.
///
/// # Safety
///
/// `heuristic_void_ptr` must come from [`setup`]; `sol` must point to
/// `n_cols` doubles; `current_obj_value` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn perform_one_opt(
    heuristic_void_ptr: *mut c_void,
    sol: *mut c_double,
    n_cols: c_int,
    perform_opt_one: c_int,
    current_obj_value: *mut c_double,
    remaining_time_in_sec: c_double,
) {
    let handle = &mut *(heuristic_void_ptr as *mut HeuristicHandle);
    let n = n_cols as usize;
    if n != handle.problem.n_cols() {
        log::error!(
            "perform_one_opt: expected {} columns, got {n}",
            handle.problem.n_cols()
        );
        return;
    }

    let solution = slice::from_raw_parts_mut(sol, n);
    let timer = Timer::new(remaining_time_in_sec.max(0.0));
    let heuristic = Heuristic::new(&handle.problem, handle.num, handle.settings.clone());

    let mut obj_value = if current_obj_value.is_null() || !(*current_obj_value).is_finite() {
        handle.problem.compute_objective(solution)
    } else {
        *current_obj_value
    };

    heuristic.improve_with_one_opt(
        solution,
        &mut obj_value,
        one_opt_mode(perform_opt_one),
        &timer,
    );
    if !current_obj_value.is_null() {
        *current_obj_value = obj_value;
    }
}

/// Estimate-free fallback: try the fixed initial-assignment modes and
/// return 1 if any produced a feasible solution.
///
/// # Safety
///
/// `heuristic_void_ptr` must come from [`setup`]; `result` must point to
/// `n_cols` doubles; `current_obj_value` must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn call_simple_heuristic(
    heuristic_void_ptr: *mut c_void,
    result: *mut c_double,
    current_obj_value: *mut c_double,
) -> c_int {
    let handle = &mut *(heuristic_void_ptr as *mut HeuristicHandle);
    let n = handle.problem.n_cols();
    let out = slice::from_raw_parts_mut(result, n);

    let mut heuristic = Heuristic::new(&handle.problem, handle.num, handle.settings.clone());
    heuristic.setup();

    let mut best_obj = *current_obj_value;
    let mut best_solution = Vec::new();
    if heuristic.find_any_solution(&mut best_obj, &mut best_solution) {
        out.copy_from_slice(&best_solution);
        *current_obj_value = best_obj;
        1
    } else {
        0
    }
}

/// Release a handle returned by [`setup`].
///
/// # Safety
///
/// `heuristic_void_ptr` must come from [`setup`] and must not be used
/// afterwards. A null pointer is ignored.
#[no_mangle]
pub unsafe extern "C" fn delete_problem_instance(heuristic_void_ptr: *mut c_void) {
    if !heuristic_void_ptr.is_null() {
        drop(Box::from_raw(heuristic_void_ptr as *mut HeuristicHandle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::io::Write;

    const PARTITION_PBO: &str = "\
min: +5 x1 -1 x2 -1 x3 -1 x4 +5 x5 ;
+1 x1 +1 x2 = 1 ;
+1 x4 +1 x5 = 1 ;
";

    fn write_instance() -> (std::path::PathBuf, CString) {
        let path = std::env::temp_dir().join(format!(
            "volfix_ffi_test_{}.opb",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(PARTITION_PBO.as_bytes()).unwrap();
        let c_path = CString::new(path.to_str().unwrap()).unwrap();
        (path, c_path)
    }

    #[test]
    fn test_setup_call_and_teardown() {
        let (path, c_path) = write_instance();
        let mut status: c_int = -1;

        unsafe {
            let handle = setup(c_path.as_ptr(), &mut status, 0, 0.0, 0);
            assert_eq!(status, 0);
            assert!(!handle.is_null());

            let mut estimate = [0.4, 0.6, 0.7, 0.4, 0.6];
            let mut out = [0.0; 5];
            let mut obj = f64::INFINITY;
            let found = call_algorithm(
                handle,
                estimate.as_mut_ptr(),
                out.as_mut_ptr(),
                5,
                &mut obj,
                0,
                0,
                0,
                8,
                2,
                60.0,
            );

            assert_eq!(found, 1);
            assert_eq!(obj, -3.0);
            assert_eq!(out, [0.0, 1.0, 1.0, 1.0, 0.0]);

            // Polishing the optimum changes nothing.
            let mut obj_after = obj;
            perform_one_opt(handle, out.as_mut_ptr(), 5, 2, &mut obj_after, 60.0);
            assert_eq!(obj_after, obj);

            let mut simple = [0.0; 5];
            let mut simple_obj = f64::INFINITY;
            let found_simple = call_simple_heuristic(handle, simple.as_mut_ptr(), &mut simple_obj);
            assert_eq!(found_simple, 1);

            delete_problem_instance(handle);
        }
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_setup_with_missing_file_fails() {
        let c_path = CString::new("/nonexistent/volfix.mps").unwrap();
        let mut status: c_int = -1;
        unsafe {
            let handle = setup(c_path.as_ptr(), &mut status, 0, 0.0, 0);
            assert_eq!(status, 1);
            assert!(handle.is_null());
        }
    }
}
