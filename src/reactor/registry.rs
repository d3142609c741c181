use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("number of clients dropped below zero")]
pub struct UnderflowError;

/// Count of live client connections.
///
/// Owned by the reactor and only touched from its thread, so plain `&mut`
/// access is the whole synchronization story. Every `connected` must be paired
/// with exactly one `disconnected`.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    live: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new connection and returns the new total.
    pub fn connected(&mut self) -> u64 {
        self.live += 1;
        self.live
    }

    /// Records a disconnect. Fails without changing the count when it is already zero.
    pub fn disconnected(&mut self) -> Result<u64, UnderflowError> {
        self.live = self.live.checked_sub(1).ok_or(UnderflowError)?;
        Ok(self.live)
    }

    pub fn live(&self) -> u64 {
        self.live
    }
}
