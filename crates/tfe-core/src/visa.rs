//! VISA transport
//!
//! Wraps `visa-rs` so any VISA resource (`GPIB0::16::INSTR`,
//! `TCPIP0::10.0.0.5::hislip0::INSTR`, `USB0::...::INSTR`) can back a driver.
//! VISA calls are blocking, so each request runs on Tokio's blocking pool and
//! the await is bounded by the transport timeout.

use crate::error::{InstrumentError, InstrumentResult};
use crate::transport::{Transport, DEFAULT_TIMEOUT};
use async_trait::async_trait;
use std::ffi::CString;
use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use std::time::Duration;
use visa_rs::prelude::*;

/// Transport over a VISA session.
pub struct VisaTransport {
    resource: String,
    session: Arc<std::sync::Mutex<visa_rs::Instrument>>,
    timeout: parking_lot::Mutex<Duration>,
    terminator: String,
}

impl VisaTransport {
    /// Open `resource` through the default resource manager.
    pub fn open(resource: &str, open_timeout: Duration) -> InstrumentResult<Self> {
        let rm = DefaultRM::new().map_err(visa_error)?;
        let name = CString::new(resource)
            .map_err(|e| InstrumentError::Config(format!("invalid VISA resource: {}", e)))?;
        let session = rm
            .open(&name.into(), AccessMode::NO_LOCK, open_timeout)
            .map_err(visa_error)?;

        tracing::info!(resource = %resource, "Opened VISA session");

        Ok(Self {
            resource: resource.to_string(),
            session: Arc::new(std::sync::Mutex::new(session)),
            timeout: parking_lot::Mutex::new(DEFAULT_TIMEOUT),
            terminator: "\n".to_string(),
        })
    }

    pub fn with_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.terminator = terminator.into();
        self
    }

    pub fn with_timeout(self, duration: Duration) -> Self {
        *self.timeout.lock() = duration;
        self
    }

    async fn run_blocking(&self, command: &str, expect_reply: bool) -> InstrumentResult<String> {
        let session = Arc::clone(&self.session);
        let line = format!("{}{}", command, self.terminator);
        let limit = self.timeout();

        let task = tokio::task::spawn_blocking(move || -> InstrumentResult<String> {
            let mut instr = session
                .lock()
                .map_err(|_| InstrumentError::Transport("VISA session lock poisoned".into()))?;
            instr.write_all(line.as_bytes())?;
            if !expect_reply {
                return Ok(String::new());
            }
            let mut reply = String::new();
            BufReader::new(&*instr).read_line(&mut reply)?;
            Ok(reply.trim().to_string())
        });

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(InstrumentError::Transport(format!(
                "VISA task failed: {}",
                join
            ))),
            Err(_) => Err(InstrumentError::Timeout {
                command: command.to_string(),
                timeout: limit,
            }),
        }
    }
}

#[async_trait]
impl Transport for VisaTransport {
    async fn write(&self, command: &str) -> InstrumentResult<()> {
        tracing::debug!(resource = %self.resource, cmd = %command, "VISA write");
        self.run_blocking(command, false).await.map(|_| ())
    }

    async fn ask(&self, command: &str) -> InstrumentResult<String> {
        tracing::debug!(resource = %self.resource, cmd = %command, "VISA query");
        self.run_blocking(command, true).await
    }

    fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
    }

    fn terminator(&self) -> &str {
        &self.terminator
    }
}

fn visa_error(err: visa_rs::Error) -> InstrumentError {
    InstrumentError::Transport(format!("VISA: {}", err))
}
