//! Averaged trace acquisition
//!
//! # Sequence
//!
//! ```text
//! idle ─► configure trigger ─► wait for completion ─► read trace ─► restore
//!                                     │                                ▲
//!                                     └──────── (error) ───────────────┘
//! ```
//!
//! - `count == 1`: hardware averaging off, one bus trigger, no wait.
//! - `count > 1`: hardware averaging on with `avgnum = count`, one bus
//!   trigger, then `*OPC?`, which only returns once the average is complete.
//!
//! Before triggering, the transport timeout is raised to
//! `count × sweep_time + SWEEP_BUFFER` so a stalled analyzer fails as a
//! [`InstrumentError::Timeout`] instead of hanging.
//!
//! The trace format, trigger source and transport timeout in effect before
//! the call are restored afterwards, whether or not the acquisition
//! succeeded.

use crate::params::VnaParameters;
use std::time::Duration;
use tfe_core::codec::{self, TraceData};
use tfe_core::error::{InstrumentError, InstrumentResult};
use tfe_core::transport::SharedTransport;
use tracing::{debug, info, warn};

/// Margin added to the computed sweep time.
pub const SWEEP_BUFFER: Duration = Duration::from_millis(500);

/// Format the analyzer is switched to while acquiring.
pub const ACQUISITION_FORMAT: &str = "PLOG";

/// Client-side timeout for `count` sweeps of `sweep_time` seconds each.
pub fn acquisition_timeout(count: u32, sweep_time: f64) -> InstrumentResult<Duration> {
    let seconds = f64::from(count) * sweep_time + SWEEP_BUFFER.as_secs_f64();
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        InstrumentError::Protocol(format!(
            "sweep time {} s gives an unusable timeout for {} sweeps",
            sweep_time, count
        ))
    })
}

/// Snapshot of the settings an acquisition overwrites.
struct SavedState {
    trform: String,
    trigger_source: String,
    timeout: Duration,
}

/// Acquire an averaged trace in log-magnitude/phase pairs.
pub async fn averaged_trace(
    transport: &SharedTransport,
    params: &VnaParameters,
    count: u32,
) -> InstrumentResult<TraceData> {
    if count == 0 {
        return Err(InstrumentError::validation(
            "count",
            "number of averages must be at least 1",
        ));
    }

    let saved = SavedState {
        trform: params.trform.get().await?,
        trigger_source: params.trigger_source.get().await?,
        timeout: transport.timeout(),
    };

    let result = acquire(transport, params, count).await;
    let restored = restore(transport, params, saved).await;

    match (result, restored) {
        (Ok(trace), Ok(())) => Ok(trace),
        (Ok(_), Err(restore_err)) => Err(restore_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(restore_err)) => {
            warn!(error = %restore_err, "Failed to restore analyzer state after acquisition error");
            Err(err)
        }
    }
}

async fn acquire(
    transport: &SharedTransport,
    params: &VnaParameters,
    count: u32,
) -> InstrumentResult<TraceData> {
    params.trform.set(ACQUISITION_FORMAT.to_string()).await?;
    params.trigger_source.set("BUS".to_string()).await?;

    if count == 1 {
        params.averaging.set(0).await?;
        params.average_trigger.set(0).await?;
        let timeout = acquisition_timeout(count, params.sweep_time.get().await?)?;
        transport.set_timeout(timeout);
        transport.write(":TRIG:SING").await?;
    } else {
        params.averaging.set(1).await?;
        params.average_trigger.set(1).await?;
        params.avgnum.set(i64::from(count)).await?;
        let timeout = acquisition_timeout(count, params.sweep_time.get().await?)?;
        transport.set_timeout(timeout);

        info!(
            averages = count,
            timeout_s = timeout.as_secs_f64(),
            "Waiting for averaging to complete"
        );
        transport.write(":TRIG:SING").await?;

        let complete = codec::parse_int(&transport.ask("*OPC?").await?)?;
        if complete != 1 {
            return Err(InstrumentError::Protocol(format!(
                "operation complete query returned {}",
                complete
            )));
        }
    }

    let values = codec::parse_float_list(&transport.ask(":CALC:DATA:FDATA?").await?)?;
    debug!(values = values.len(), "Read formatted trace data");
    Ok(codec::reshape_pairs(values))
}

async fn restore(
    transport: &SharedTransport,
    params: &VnaParameters,
    saved: SavedState,
) -> InstrumentResult<()> {
    // Timeout first so the restoring commands run with the normal bound
    transport.set_timeout(saved.timeout);
    let trigger = params.trigger_source.restore(saved.trigger_source).await;
    let format = params.trform.restore(saved.trform).await;
    trigger.and(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_timeout() {
        assert_eq!(
            acquisition_timeout(1, 0.25).unwrap(),
            Duration::from_millis(750)
        );
        assert_eq!(
            acquisition_timeout(100, 0.5).unwrap(),
            Duration::from_millis(50_500)
        );
        assert!(acquisition_timeout(2, f64::NAN).is_err());
        assert!(acquisition_timeout(2, -1.0).is_err());
    }
}
