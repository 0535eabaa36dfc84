//! Simulated SCPI instrument for testing without hardware.
//!
//! [`MockScpiTransport`] behaves like a forgiving SCPI device:
//! - `HEADER value` stores `value` under `HEADER`, and `HEADER?` returns it
//! - scripted replies override stored values for a given query
//! - scripted failures make a query or command time out or disconnect
//! - every call is recorded for later assertions
//!
//! Headers are compared the way instruments compare them: the leading colon
//! is optional, case is ignored and a numeric suffix of `1` may be omitted,
//! so `:SOUR1:POW:STOP 5` is answered by `:SOUR:POW:STOP?`.

use crate::error::{InstrumentError, InstrumentResult};
use crate::transport::{Transport, DEFAULT_TIMEOUT};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// One request seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Write(String),
    Ask(String),
}

impl MockCall {
    pub fn command(&self) -> &str {
        match self {
            MockCall::Write(c) | MockCall::Ask(c) => c,
        }
    }
}

/// Failure injected for a query or command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Disconnect,
}

#[derive(Default)]
struct MockState {
    values: HashMap<String, String>,
    replies: HashMap<String, VecDeque<String>>,
    failures: HashMap<String, MockFailure>,
    calls: Vec<MockCall>,
    timeouts: Vec<Duration>,
}

/// Simulated SCPI device.
pub struct MockScpiTransport {
    state: Mutex<MockState>,
    timeout: Mutex<Duration>,
    terminator: String,
}

impl Default for MockScpiTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScpiTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            timeout: Mutex::new(DEFAULT_TIMEOUT),
            terminator: "\n".to_string(),
        }
    }

    /// Preset the value returned for `HEADER?`.
    pub fn with_value(self, header: &str, value: &str) -> Self {
        self.set_value(header, value);
        self
    }

    /// Script the reply to `query`.
    pub fn with_reply(self, query: &str, reply: &str) -> Self {
        self.set_reply(query, reply);
        self
    }

    pub fn set_value(&self, header: &str, value: &str) {
        self.state
            .lock()
            .values
            .insert(normalize_header(header), value.to_string());
    }

    /// Current stored value for `header`.
    pub fn value(&self, header: &str) -> Option<String> {
        self.state
            .lock()
            .values
            .get(&normalize_header(header))
            .cloned()
    }

    /// Replace any scripted replies for `query` with `reply`.
    pub fn set_reply(&self, query: &str, reply: &str) {
        self.state
            .lock()
            .replies
            .insert(normalize_command(query), VecDeque::from([reply.to_string()]));
    }

    /// Queue successive replies for `query`; the last one repeats.
    pub fn push_replies(&self, query: &str, replies: &[&str]) {
        let mut state = self.state.lock();
        let queue = state.replies.entry(normalize_command(query)).or_default();
        queue.extend(replies.iter().map(|r| r.to_string()));
    }

    /// Make `command` (query or write, matched on its header) fail.
    pub fn fail_on(&self, command: &str, failure: MockFailure) {
        self.state
            .lock()
            .failures
            .insert(normalize_header(command), failure);
    }

    pub fn clear_failure(&self, command: &str) {
        self.state.lock().failures.remove(&normalize_header(command));
    }

    /// All calls in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Commands sent with `write`, in order.
    pub fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::Write(w) => Some(w.clone()),
                MockCall::Ask(_) => None,
            })
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Every timeout passed to `set_timeout`, in order.
    pub fn timeout_history(&self) -> Vec<Duration> {
        self.state.lock().timeouts.clone()
    }

    fn failure(&self, command: &str) -> InstrumentResult<()> {
        let failure = self
            .state
            .lock()
            .failures
            .get(&normalize_header(command))
            .copied();
        match failure {
            None => Ok(()),
            Some(MockFailure::Timeout) => Err(InstrumentError::Timeout {
                command: command.to_string(),
                timeout: self.timeout(),
            }),
            Some(MockFailure::Disconnect) => Err(InstrumentError::Transport(format!(
                "simulated disconnect during '{}'",
                command
            ))),
        }
    }
}

#[async_trait]
impl Transport for MockScpiTransport {
    async fn write(&self, command: &str) -> InstrumentResult<()> {
        self.state
            .lock()
            .calls
            .push(MockCall::Write(command.to_string()));
        self.failure(command)?;

        let (header, argument) = split_command(command);
        if let Some(argument) = argument {
            self.state
                .lock()
                .values
                .insert(normalize_header(header), argument.to_string());
        }
        Ok(())
    }

    async fn ask(&self, command: &str) -> InstrumentResult<String> {
        self.state
            .lock()
            .calls
            .push(MockCall::Ask(command.to_string()));
        self.failure(command)?;

        let mut state = self.state.lock();
        if let Some(queue) = state.replies.get_mut(&normalize_command(command)) {
            let reply = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(reply) = reply {
                return Ok(reply);
            }
        }

        let (header, _) = split_command(command);
        if let Some(value) = state.values.get(&normalize_header(header)) {
            return Ok(value.clone());
        }

        match normalize_header(header).as_str() {
            "*OPC" => Ok("1".to_string()),
            "*IDN" => Ok("Simulated,Mock SCPI,0,1.0".to_string()),
            _ => Err(InstrumentError::Timeout {
                command: command.to_string(),
                timeout: *self.timeout.lock(),
            }),
        }
    }

    fn timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
        self.state.lock().timeouts.push(timeout);
    }

    fn terminator(&self) -> &str {
        &self.terminator
    }
}

/// Split `HEADER argument` at the first space.
fn split_command(command: &str) -> (&str, Option<&str>) {
    match command.trim().split_once(' ') {
        Some((header, argument)) => (header, Some(argument.trim())),
        None => (command.trim(), None),
    }
}

/// Canonical header: no leading colon, no `?`, uppercase, `NODE1` → `NODE`.
pub fn normalize_header(command: &str) -> String {
    let (header, _) = split_command(command);
    header
        .trim_start_matches(':')
        .trim_end_matches('?')
        .split(':')
        .map(|node| {
            let upper = node.to_uppercase();
            let bytes = upper.as_bytes();
            let default_suffix = bytes.len() > 1
                && bytes[bytes.len() - 1] == b'1'
                && bytes[bytes.len() - 2].is_ascii_alphabetic();
            if default_suffix {
                upper[..upper.len() - 1].to_string()
            } else {
                upper
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

/// Canonical form of a whole query, header plus argument.
fn normalize_command(command: &str) -> String {
    let (header, argument) = split_command(command);
    let query = if header.ends_with('?') { "?" } else { "" };
    match argument {
        Some(argument) => format!("{}{} {}", normalize_header(header), query, argument),
        None => format!("{}{}", normalize_header(header), query),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(":SENS1:FREQ:STAR?"), "SENS:FREQ:STAR");
        assert_eq!(normalize_header("sens:freq:star 4e9"), "SENS:FREQ:STAR");
        assert_eq!(normalize_header(":SOUR1:POW:STOP"), "SOUR:POW:STOP");
        assert_eq!(normalize_header("CALC2:MEAS11:DATA:SDATA?"), "CALC2:MEAS11:DATA:SDATA");
        assert_eq!(normalize_header("*OPC?"), "*OPC");
    }

    #[tokio::test]
    async fn test_write_then_query_round_trip() {
        let mock = MockScpiTransport::new();
        mock.write(":SOUR1:POW:STOP -5").await.unwrap();
        assert_eq!(mock.ask(":SOUR:POW:STOP?").await.unwrap(), "-5");
        assert_eq!(mock.value("SOUR1:POW:STOP").as_deref(), Some("-5"));
        assert_eq!(
            mock.calls(),
            vec![
                MockCall::Write(":SOUR1:POW:STOP -5".into()),
                MockCall::Ask(":SOUR:POW:STOP?".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_scripted_replies_and_failures() {
        let mock = MockScpiTransport::new().with_reply(":CALC1:DATA? FDATA", "1,0,2,0");
        mock.push_replies("*OPC?", &["0", "1"]);

        assert_eq!(mock.ask("CALC:DATA? FDATA").await.unwrap(), "1,0,2,0");
        assert_eq!(mock.ask("*OPC?").await.unwrap(), "0");
        assert_eq!(mock.ask("*OPC?").await.unwrap(), "1");
        assert_eq!(mock.ask("*OPC?").await.unwrap(), "1");

        let err = mock.ask(":SENS1:SWE:TIME?").await.unwrap_err();
        assert!(err.is_transport());

        mock.fail_on("*OPC?", MockFailure::Timeout);
        let err = mock.ask("*OPC?").await.unwrap_err();
        assert!(matches!(err, InstrumentError::Timeout { .. }));

        mock.fail_on(":TRIG:SING", MockFailure::Disconnect);
        let err = mock.write(":TRIG:SING").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);

        mock.clear_failure("*OPC?");
        assert_eq!(mock.ask("*OPC?").await.unwrap(), "1");
    }

    #[test]
    fn test_timeout_history() {
        let mock = MockScpiTransport::new();
        mock.set_timeout(Duration::from_secs(3));
        mock.set_timeout(Duration::from_secs(5));
        assert_eq!(mock.timeout(), Duration::from_secs(5));
        assert_eq!(
            mock.timeout_history(),
            vec![Duration::from_secs(3), Duration::from_secs(5)]
        );
    }
}
