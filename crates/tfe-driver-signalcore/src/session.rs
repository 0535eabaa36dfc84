//! Device session and scoped handle acquisition.
//!
//! The SC5511A library hands out a handle per `open_device` call. By default
//! every operation opens a handle, makes its call and closes it again, which
//! keeps the device free for other programs between calls. A batch of
//! operations can instead share one handle with [`DeviceSession::hold_open`]
//! and [`DeviceSession::release`].
//!
//! Handles are only reachable through a [`HandleGuard`], which closes a
//! handle it opened when dropped, on the error path as well. A handle is
//! never used after it has been closed.

use crate::library::{DeviceHandle, Sc5511aLibrary};
use parking_lot::Mutex;
use std::sync::Arc;
use tfe_core::error::{InstrumentError, InstrumentResult};
use tracing::{debug, warn};

/// One SC5511A, addressed by serial number.
pub struct DeviceSession {
    serial: String,
    library: Arc<dyn Sc5511aLibrary>,
    held: Mutex<Option<DeviceHandle>>,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("serial", &self.serial)
            .field("held", &*self.held.lock())
            .finish()
    }
}

/// A handle valid for the guard's lifetime.
pub struct HandleGuard<'a> {
    session: &'a DeviceSession,
    handle: DeviceHandle,
    owned: bool,
}

impl HandleGuard<'_> {
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    pub fn library(&self) -> &dyn Sc5511aLibrary {
        self.session.library.as_ref()
    }
}

impl Drop for HandleGuard<'_> {
    fn drop(&mut self) {
        if self.owned {
            if let Err(e) = self.session.library.close_device(self.handle) {
                warn!(serial = %self.session.serial, error = %e, "Error closing SC5511A handle");
            }
        }
    }
}

impl DeviceSession {
    pub fn new(serial: &str, library: Arc<dyn Sc5511aLibrary>) -> Self {
        Self {
            serial: serial.to_string(),
            library,
            held: Mutex::new(None),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Borrow the held handle, or open one that closes with the guard.
    pub fn acquire(&self) -> InstrumentResult<HandleGuard<'_>> {
        if let Some(handle) = *self.held.lock() {
            return Ok(HandleGuard {
                session: self,
                handle,
                owned: false,
            });
        }
        let handle = self.library.open_device(&self.serial)?;
        Ok(HandleGuard {
            session: self,
            handle,
            owned: true,
        })
    }

    /// Run `op` with a scoped handle.
    pub fn with_handle<R>(
        &self,
        op: impl FnOnce(&dyn Sc5511aLibrary, DeviceHandle) -> InstrumentResult<R>,
    ) -> InstrumentResult<R> {
        let guard = self.acquire()?;
        op(guard.library(), guard.handle())
    }

    /// Run `op` on the blocking pool with a scoped handle.
    pub async fn call<R, F>(session: &Arc<Self>, op: F) -> InstrumentResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&dyn Sc5511aLibrary, DeviceHandle) -> InstrumentResult<R> + Send + 'static,
    {
        let session = Arc::clone(session);
        tokio::task::spawn_blocking(move || session.with_handle(op))
            .await
            .map_err(|e| InstrumentError::Transport(format!("SC5511A call aborted: {}", e)))?
    }

    /// Keep one handle open for the following operations.
    pub fn hold_open(&self) -> InstrumentResult<()> {
        let mut held = self.held.lock();
        if held.is_none() {
            *held = Some(self.library.open_device(&self.serial)?);
            debug!(serial = %self.serial, "Holding SC5511A handle open");
        }
        Ok(())
    }

    /// Close the handle kept by [`hold_open`](Self::hold_open).
    pub fn release(&self) -> InstrumentResult<()> {
        match self.held.lock().take() {
            Some(handle) => {
                debug!(serial = %self.serial, "Releasing SC5511A handle");
                self.library.close_device(handle)
            }
            None => Ok(()),
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.lock().is_some()
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(serial = %self.serial, error = %e, "Error releasing SC5511A handle");
        }
    }
}
