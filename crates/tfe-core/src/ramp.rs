//! Stepped ramps of a numeric parameter.
//!
//! A ramp reads the present value once, then writes set-points spaced by
//! `step` toward the target with a fixed delay between writes. The number of
//! writes is `ceil(|target - current| / step)` and the final write is the
//! target itself, so the output never passes the target. A zero-distance
//! ramp writes nothing.
//!
//! The starting value is read only once: changes made by someone else while
//! the ramp runs are not noticed.

use crate::error::{InstrumentError, InstrumentResult};
use crate::parameter::Parameter;
use std::time::Duration;

/// Upper bound on the number of set-points in one ramp.
pub const MAX_RAMP_STEPS: usize = 1_000_000;

// Absorbs representation error so 0.3 / 0.1 counts as 3 steps, not 4.
const STEP_EPSILON: f64 = 1e-9;

/// Compute the set-points written when ramping from `current` to `target`.
pub fn plan_ramp(current: f64, target: f64, step: f64) -> InstrumentResult<Vec<f64>> {
    if !step.is_finite() || step <= 0.0 {
        return Err(InstrumentError::validation(
            "step",
            format!("ramp step must be a positive number, got {}", step),
        ));
    }
    if !current.is_finite() || !target.is_finite() {
        return Err(InstrumentError::validation(
            "target",
            format!("cannot ramp from {} to {}", current, target),
        ));
    }

    let distance = target - current;
    if distance == 0.0 {
        return Ok(Vec::new());
    }

    let ratio = distance.abs() / step;
    let steps = (ratio - STEP_EPSILON).ceil().max(1.0);
    if steps > MAX_RAMP_STEPS as f64 {
        return Err(InstrumentError::validation(
            "step",
            format!("ramp of {} with step {} needs too many steps", distance, step),
        ));
    }
    let steps = steps as usize;
    let direction = distance.signum();

    Ok((1..=steps)
        .map(|i| {
            if i == steps {
                target
            } else {
                current + direction * step * i as f64
            }
        })
        .collect())
}

/// Ramp `parameter` to `target`, returning the number of writes made.
///
/// The target is checked against the parameter's domain before the first
/// write, so an unreachable target fails without moving the output.
pub async fn run_ramp(
    parameter: &Parameter<f64>,
    target: f64,
    step: f64,
    delay: Duration,
) -> InstrumentResult<usize> {
    parameter.validate(&target)?;
    let current = parameter.get().await?;
    let points = plan_ramp(current, target, step)?;

    tracing::info!(
        parameter = %parameter.name(),
        from = current,
        to = target,
        steps = points.len(),
        "Starting ramp"
    );

    let count = points.len();
    for (index, point) in points.into_iter().enumerate() {
        parameter.set(point).await?;
        if index + 1 < count {
            tokio::time::sleep(delay).await;
        }
    }
    Ok(count)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parameter::Domain;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_plan_counts_ceiling_steps() {
        assert_eq!(
            plan_ramp(0.0, 1.0, 0.25).unwrap(),
            vec![0.25, 0.5, 0.75, 1.0]
        );
        // 1 / 0.3 is 3.33, so four writes with the last clamped to the target
        let down = plan_ramp(1.0, 0.0, 0.3).unwrap();
        assert_eq!(down.len(), 4);
        assert!((down[0] - 0.7).abs() < 1e-12);
        assert_eq!(down[3], 0.0);

        assert_eq!(plan_ramp(0.0, 0.3, 0.1).unwrap().len(), 3);
        assert_eq!(plan_ramp(0.0, 0.05, 0.1).unwrap(), vec![0.05]);
        assert!(plan_ramp(2.5, 2.5, 0.1).unwrap().is_empty());
    }

    #[test]
    fn test_plan_rejects_bad_step() {
        for step in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            let err = plan_ramp(0.0, 1.0, step).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert!(plan_ramp(0.0, 10.0, 1e-9).is_err());
    }

    fn simulated_voltage(initial: f64) -> (Parameter<f64>, Arc<Mutex<Vec<f64>>>) {
        let level = Arc::new(Mutex::new(initial));
        let writes = Arc::new(Mutex::new(Vec::new()));
        let read_level = Arc::clone(&level);
        let write_log = Arc::clone(&writes);
        let param = Parameter::new("voltage")
            .with_unit("V")
            .with_domain(Domain::numbers(-10.0, 10.0))
            .with_hardware_read(move || {
                let v = *read_level.lock();
                Box::pin(async move { Ok(v) })
            })
            .with_hardware_write(move |v| {
                *level.lock() = v;
                write_log.lock().push(v);
                Box::pin(async { Ok(()) })
            });
        (param, writes)
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ramp_writes_each_point() {
        let (param, writes) = simulated_voltage(0.0);
        let start = tokio::time::Instant::now();

        let count = run_ramp(&param, 1.0, 0.25, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(count, 4);
        assert_eq!(*writes.lock(), vec![0.25, 0.5, 0.75, 1.0]);
        assert_eq!(param.get().await.unwrap(), 1.0);
        // Three delays between four writes
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_distance_ramp_writes_nothing() {
        let (param, writes) = simulated_voltage(2.0);
        let count = run_ramp(&param, 2.0, 0.5, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(writes.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_domain_target_moves_nothing() {
        let (param, writes) = simulated_voltage(0.0);
        let err = run_ramp(&param, 12.0, 0.5, Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(writes.lock().is_empty());
    }
}
