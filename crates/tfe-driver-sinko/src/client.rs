//! ACE register access.
//!
//! The evaluation board is reached through the Analog Devices ACE
//! application, which exposes a register-level request client for the
//! board selected by a context path such as
//! `\System\Subsystem_1\EVAL-AD5760SDZ\AD5760`. Register values are read
//! back as hex text and written as decimal text.

use crate::conversion::{parse_register, CONTROL_REGISTER, DATA_REGISTER};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tfe_core::error::{InstrumentError, InstrumentResult};
use tfe_core::transport::{self, SharedTransport};
use tracing::debug;

/// Register-level access to one board.
#[async_trait]
pub trait RegisterClient: Send + Sync {
    /// Read register `address`, returning its value as hex text.
    async fn read_register(&self, address: &str) -> InstrumentResult<String>;

    /// Write the decimal text `value` to register `address`.
    async fn write_register(&self, address: &str, value: &str) -> InstrumentResult<()>;
}

// =============================================================================
// AceBridgeClient
// =============================================================================

/// ACE request client reached through the line-based remoting bridge.
///
/// The bridge forwards `REG:CONT`, `REG:READ?` and `REG:WRIT` to the ACE
/// request client, one request per line.
pub struct AceBridgeClient {
    transport: SharedTransport,
    context_path: String,
}

impl AceBridgeClient {
    /// Connect to the bridge at `host:port` and select `context_path`.
    pub async fn connect(
        address: &str,
        context_path: &str,
        timeout: Duration,
        terminator: &str,
    ) -> InstrumentResult<Self> {
        let transport = transport::open(address, timeout, terminator).await?;
        Self::with_transport(transport, context_path).await
    }

    pub async fn with_transport(
        transport: SharedTransport,
        context_path: &str,
    ) -> InstrumentResult<Self> {
        if context_path.trim().is_empty() {
            return Err(InstrumentError::Config(
                "ACE context path must not be empty".to_string(),
            ));
        }
        transport
            .write(&format!("REG:CONT '{}'", context_path))
            .await?;
        debug!(context_path, "Selected ACE context");
        Ok(Self {
            transport,
            context_path: context_path.to_string(),
        })
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }
}

#[async_trait]
impl RegisterClient for AceBridgeClient {
    async fn read_register(&self, address: &str) -> InstrumentResult<String> {
        self.transport.ask(&format!("REG:READ? {}", address)).await
    }

    async fn write_register(&self, address: &str, value: &str) -> InstrumentResult<()> {
        self.transport
            .write(&format!("REG:WRIT {},{}", address, value))
            .await
    }
}

// =============================================================================
// SimulatedBoard
// =============================================================================

#[derive(Debug, Default)]
struct BoardState {
    registers: HashMap<String, u32>,
    writes: Vec<(String, String)>,
    offline: bool,
}

/// In-memory AD5760 board.
///
/// Writes to the data register are stored left-justified, so reads return
/// the 20-bit form of the 16-bit code that was written.
#[derive(Debug, Default)]
pub struct SimulatedBoard {
    state: Mutex<BoardState>,
}

impl SimulatedBoard {
    /// A board at 0 V with the output clamped to ground.
    pub fn new() -> Self {
        let board = Self::default();
        {
            let mut state = board.state.lock();
            state.registers.insert(DATA_REGISTER.to_string(), 0x80000);
            state.registers.insert(CONTROL_REGISTER.to_string(), 790);
        }
        board
    }

    /// Raw register value.
    pub fn register(&self, address: &str) -> Option<u32> {
        self.state.lock().registers.get(address).copied()
    }

    /// Every write made, as `(address, value)` text pairs.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.state.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Make every following request fail as if ACE went away.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    fn check_online(&self) -> InstrumentResult<()> {
        if self.state.lock().offline {
            return Err(InstrumentError::Transport(
                "ACE remoting server not reachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RegisterClient for SimulatedBoard {
    async fn read_register(&self, address: &str) -> InstrumentResult<String> {
        self.check_online()?;
        let value = self.register(address).ok_or_else(|| {
            InstrumentError::Protocol(format!("no register at address {}", address))
        })?;
        Ok(format!("{:X}", value))
    }

    async fn write_register(&self, address: &str, value: &str) -> InstrumentResult<()> {
        self.check_online()?;
        let parsed: u32 = value.parse().map_err(|_| {
            InstrumentError::Protocol(format!("register value '{}' is not decimal", value))
        })?;
        let stored = if address == DATA_REGISTER {
            parsed << 4
        } else {
            parsed
        };

        let mut state = self.state.lock();
        state.registers.insert(address.to_string(), stored);
        state.writes.push((address.to_string(), value.to_string()));
        Ok(())
    }
}

/// Read and decode one register.
pub(crate) async fn read_code(client: &dyn RegisterClient, address: &str) -> InstrumentResult<u32> {
    let reply = client.read_register(address).await?;
    parse_register(&reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tfe_core::mock::MockScpiTransport;

    #[tokio::test]
    async fn test_bridge_commands() {
        let mock = Arc::new(MockScpiTransport::new().with_reply("REG:READ? 1", "80000"));
        let client = AceBridgeClient::with_transport(mock.clone(), r"\System\Subsystem_1\AD5760")
            .await
            .unwrap();

        assert_eq!(client.read_register("1").await.unwrap(), "80000");
        client.write_register("2", "786").await.unwrap();
        assert_eq!(
            mock.writes(),
            vec![r"REG:CONT '\System\Subsystem_1\AD5760'", "REG:WRIT 2,786"]
        );
    }

    #[tokio::test]
    async fn test_bridge_requires_context() {
        let mock = Arc::new(MockScpiTransport::new());
        assert!(AceBridgeClient::with_transport(mock.clone(), " ")
            .await
            .is_err());
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_board_left_justifies_data() {
        let board = SimulatedBoard::new();
        board.write_register("1", "49152").await.unwrap();
        assert_eq!(board.read_register("1").await.unwrap(), "C0000");
        assert_eq!(read_code(&board, "2").await.unwrap(), 790);

        board.set_offline(true);
        assert!(board.read_register("1").await.unwrap_err().is_transport());
    }
}
