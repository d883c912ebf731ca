//! Connection state machine shared by every input source.

use crate::types::{ApiStatus, ConnectionState};

/// A state change observed on a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Tracks the connection state and API health of one device.
///
/// `Error` is terminal: native status reports are ignored until
/// [`ConnectionMachine::reinitialize`] is called.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMachine {
    state: ConnectionState,
    api_status: ApiStatus,
    error_details: Option<String>,
    degraded_warned: bool,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A machine whose native handle could not be created.
    pub fn failed(details: impl Into<String>) -> Self {
        let mut machine = Self::new();
        machine.fail(details);
        machine
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn api_status(&self) -> ApiStatus {
        self.api_status
    }

    pub fn error_details(&self) -> Option<&str> {
        self.error_details.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_error(&self) -> bool {
        self.state == ConnectionState::Error
    }

    /// Fold in one native status report. Returns the transition, if any.
    pub fn observe(&mut self, state: ConnectionState, status: ApiStatus) -> Option<Transition> {
        if self.is_error() {
            return None;
        }

        let from = self.state;
        self.state = state;
        self.api_status = status;

        if state == ConnectionState::Connected && !status.is_ok() {
            if !self.degraded_warned {
                log::warn!("Controller connected with degraded API status {:?}", status);
                self.degraded_warned = true;
            }
        } else {
            self.degraded_warned = false;
        }

        if from == state {
            return None;
        }
        log::info!("Connection state {:?} -> {:?}", from, state);
        Some(Transition { from, to: state })
    }

    /// Enter the terminal `Error` state.
    pub fn fail(&mut self, details: impl Into<String>) {
        let details = details.into();
        log::error!("Connection failed: {}", details);
        self.state = ConnectionState::Error;
        self.api_status = ApiStatus::Unavailable;
        self.error_details = Some(details);
        self.degraded_warned = false;
    }

    /// Leave `Error` for `Disconnected`. No-op in any other state.
    pub fn reinitialize(&mut self) {
        if self.is_error() {
            log::info!("Reinitializing connection after error");
            *self = Self::new();
        }
    }

    /// Force `Disconnected`, clearing any error.
    pub fn shutdown(&mut self) {
        *self = Self::new();
    }
}
