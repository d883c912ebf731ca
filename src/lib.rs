//! # daybridge - frame-synchronized VR device state
//!
//! Converts asynchronous controller, headset and phone-emulator telemetry into
//! a deterministic snapshot that is read once per render frame. Provides:
//! - Right-handed native to left-handed engine coordinate conversion
//! - A connection state machine with a terminal `Error` state
//! - Edge-triggered button and touch state derived from level polling
//! - Listener dispatch with replay of the last value
//! - A TCP client for the phone controller emulator
//! - C FFI for integration with C/C++ engine hosts
//!
//! ## Quick Start
//! ```no_run
//! use daybridge::{BridgeConfig, DeviceBridge, EmulatorProvider};
//!
//! let config = BridgeConfig::from_env();
//! let provider = EmulatorProvider::connect(&config.emulator).unwrap();
//! let mut bridge = DeviceBridge::new(Box::new(provider), None);
//! bridge.listeners().button.subscribe(|b| println!("button {:?} down={}", b.code, b.down));
//! loop {
//!     bridge.end_of_frame();
//!     let snapshot = bridge.snapshot();
//!     if snapshot.is_connected() {
//!         println!("orientation: {:?}", snapshot.orientation());
//!     }
//! #   break;
//! }
//! ```

pub mod error;
pub mod types;
pub mod coords;
pub mod sample;
pub mod protocol;
pub mod queue;
pub mod connection;
pub mod snapshot;
pub mod dispatch;
pub mod headset;
pub mod controller;
pub mod emulator;
pub mod config;
pub mod pump;
pub mod ffi;

pub use config::{BridgeConfig, EmulatorConfig, EmulatorMode};
pub use connection::ConnectionMachine;
pub use controller::{ControllerApi, ControllerProvider, NativeControllerState};
pub use dispatch::{Dispatcher, Listeners, SubscriptionId};
pub use emulator::{EmulatorClient, EmulatorProvider, LinkStatus};
pub use error::{BridgeError, DecodeError};
pub use headset::{HeadsetApi, HeadsetBridge, HeadsetEvent, QueuedHeadsetSource, RecenterEvent, SafetyRegionEvent};
pub use pump::{DeviceBridge, FrameReading, InputSource};
pub use queue::EventQueue;
pub use sample::RawSample;
pub use snapshot::DeviceSnapshot;
pub use types::*;

/// Result type alias for daybridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
