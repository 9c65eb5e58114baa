//! Small numeric helpers for building index and coordinate tensors.

use crate::error::{GTensorError, Result};

fn check_finite(op: &str, values: &[f64]) -> Result<()> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(bad) => Err(GTensorError::InvalidArgument(format!(
            "{op} arguments must be finite, got {bad}"
        ))),
        None => Ok(()),
    }
}

fn stalled(op: &str, value: f64, step: f64) -> GTensorError {
    GTensorError::InvalidArgument(format!("{op} step {step} does not advance from {value}"))
}

/// `start, start + step, ...` while below `end`. A step that is not
/// positive is treated as 1. All arguments must be finite.
pub fn range(start: f64, end: f64, step: f64) -> Result<Vec<f64>> {
    check_finite("range", &[start, end, step])?;
    let step = if step > 0.0 { step } else { 1.0 };
    let mut values = Vec::new();
    let mut v = start;
    while v < end {
        values.push(v);
        let next = v + step;
        if next == v {
            return Err(stalled("range", v, step));
        }
        v = next;
    }
    Ok(values)
}

/// Every point of the grid from `start` to `end` (both inclusive) with the
/// given per-coordinate step. The first coordinate varies fastest.
pub fn grid(start: &[f64], end: &[f64], step: &[f64]) -> Result<Vec<Vec<f64>>> {
    if start.len() != step.len() || end.len() != step.len() {
        return Err(GTensorError::InvalidArgument(format!(
            "grid arguments differ in length: {}, {}, {}",
            start.len(),
            end.len(),
            step.len()
        )));
    }
    for coords in [start, end, step] {
        check_finite("grid", coords)?;
    }
    if let Some(bad) = step.iter().find(|s| **s <= 0.0) {
        return Err(GTensorError::InvalidArgument(format!(
            "grid steps must be positive, got {bad}"
        )));
    }

    let mut points = vec![start.to_vec()];
    let mut current = start.to_vec();
    let mut i = 0;
    while i < current.len() {
        // Carry into the next coordinate when this one would pass its end.
        let carry_start = i;
        while i < current.len() && current[i] + step[i] > end[i] {
            i += 1;
        }
        if i < current.len() {
            let next = current[i] + step[i];
            if next == current[i] {
                return Err(stalled("grid", current[i], step[i]));
            }
            current[i] = next;
            current[carry_start..i].copy_from_slice(&start[carry_start..i]);
            points.push(current.clone());
            i = 0;
        }
    }
    Ok(points)
}
