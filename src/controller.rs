//! Native controller provider.
//!
//! The controller API is polled synchronously once per frame. The native
//! layer re-populates a single persistent [`NativeControllerState`], which is
//! then converted into engine space.

use crate::connection::ConnectionMachine;
use crate::coords;
use crate::pump::{FrameReading, InputSource};
use crate::snapshot::{FieldTimestamps, FrameInput};
use crate::types::{ApiStatus, BatteryLevel, Button, Buttons, ConnectionState};
use crate::Result;
use glam::{Quat, Vec3};

/// Length of the native `button_state` array.
pub const BUTTON_COUNT: usize = 9;

/// Controller state in the native layout. Right-handed.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeControllerState {
    pub connection_state: i32,
    pub api_status: i32,
    /// Quaternion `[x, y, z, w]`.
    pub orientation: [f32; 4],
    pub position: [f32; 3],
    pub gyro: [f32; 3],
    pub accel: [f32; 3],
    pub is_touching: u8,
    pub touch_pos: [f32; 2],
    pub button_state: [u8; BUTTON_COUNT],
    pub recentering: u8,
    pub recentered: u8,
    pub battery_charging: u8,
    pub battery_level: i32,
    pub last_orientation_timestamp: i64,
    pub last_gyro_timestamp: i64,
    pub last_accel_timestamp: i64,
    pub last_position_timestamp: i64,
    pub last_touch_timestamp: i64,
    pub last_button_timestamp: i64,
    pub last_battery_timestamp: i64,
    pub last_recenter_timestamp: i64,
}

impl Default for NativeControllerState {
    fn default() -> Self {
        NativeControllerState {
            connection_state: 0,
            api_status: ApiStatus::Unavailable as i32,
            orientation: [0.0, 0.0, 0.0, 1.0],
            position: [0.0; 3],
            gyro: [0.0; 3],
            accel: [0.0; 3],
            is_touching: 0,
            touch_pos: [0.0; 2],
            button_state: [0; BUTTON_COUNT],
            recentering: 0,
            recentered: 0,
            battery_charging: 0,
            battery_level: 0,
            last_orientation_timestamp: 0,
            last_gyro_timestamp: 0,
            last_accel_timestamp: 0,
            last_position_timestamp: 0,
            last_touch_timestamp: 0,
            last_button_timestamp: 0,
            last_battery_timestamp: 0,
            last_recenter_timestamp: 0,
        }
    }
}

impl NativeControllerState {
    pub fn button_levels(&self) -> Buttons {
        Button::ALL
            .iter()
            .filter(|b| self.button_state[b.native_index()] != 0)
            .fold(Buttons::empty(), |acc, b| acc | b.flag())
    }

    /// Convert to an engine-space frame input.
    pub fn to_frame_input(&self, battery_supported: bool) -> FrameInput {
        let raw = Quat::from_array(self.orientation);
        let orientation = if raw.length_squared() > f32::EPSILON {
            coords::controller_orientation(raw.normalize())
        } else {
            Quat::IDENTITY
        };

        let (battery_charging, battery_level) = if battery_supported {
            (
                self.battery_charging != 0,
                BatteryLevel::from_native(self.battery_level),
            )
        } else {
            (false, BatteryLevel::Unknown)
        };

        FrameInput {
            orientation,
            gyro: coords::angular_velocity(Vec3::from_array(self.gyro)),
            accel: coords::acceleration(Vec3::from_array(self.accel)),
            position: coords::position(Vec3::from_array(self.position)),
            touch_pos: coords::touch_position(self.touch_pos[0], self.touch_pos[1]),
            touching: self.is_touching != 0,
            buttons: self.button_levels(),
            recentering: self.recentering != 0,
            recentered: self.recentered != 0,
            battery_charging,
            battery_level,
            timestamps: FieldTimestamps {
                orientation: self.last_orientation_timestamp,
                gyro: self.last_gyro_timestamp,
                accel: self.last_accel_timestamp,
                position: self.last_position_timestamp,
                touch: self.last_touch_timestamp,
                buttons: self.last_button_timestamp,
                battery: self.last_battery_timestamp,
                recenter: self.last_recenter_timestamp,
            },
        }
    }
}

/// Native controller service.
pub trait ControllerApi {
    /// Re-populate `out` with the current state of controller `index`.
    fn update_state(&mut self, index: i32, out: &mut NativeControllerState);

    fn pause(&mut self);

    fn resume(&mut self);

    fn supports_battery(&self) -> bool {
        false
    }

    /// Release the native handle. Called exactly once.
    fn destroy(&mut self);
}

/// Frame source backed by a [`ControllerApi`].
pub struct ControllerProvider {
    api: Option<Box<dyn ControllerApi>>,
    native: NativeControllerState,
    connection: ConnectionMachine,
    index: i32,
    battery_supported: bool,
}

impl ControllerProvider {
    /// Create the native API and start it.
    ///
    /// A construction failure leaves the provider in `Error` for good: every
    /// later poll reports the cached error without touching the native layer.
    pub fn open<F>(create: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn ControllerApi>>,
    {
        match create() {
            Ok(mut api) => {
                api.resume();
                let battery_supported = api.supports_battery();
                log::info!(
                    "Controller API ready (battery reporting: {})",
                    battery_supported
                );
                ControllerProvider {
                    api: Some(api),
                    native: NativeControllerState::default(),
                    connection: ConnectionMachine::new(),
                    index: 0,
                    battery_supported,
                }
            }
            Err(e) => ControllerProvider {
                api: None,
                native: NativeControllerState::default(),
                connection: ConnectionMachine::failed(e.to_string()),
                index: 0,
                battery_supported: false,
            },
        }
    }

    pub fn battery_supported(&self) -> bool {
        self.battery_supported
    }

    /// The raw native state from the most recent poll.
    pub fn native_state(&self) -> &NativeControllerState {
        &self.native
    }

    fn live_api(&mut self) -> Option<&mut (dyn ControllerApi + 'static)> {
        if self.connection.is_error() {
            return None;
        }
        self.api.as_deref_mut()
    }
}

impl InputSource for ControllerProvider {
    fn connection(&self) -> &ConnectionMachine {
        &self.connection
    }

    fn read_frame(&mut self) -> FrameReading {
        if self.connection.is_error() {
            return FrameReading::default();
        }
        let Some(api) = self.api.as_mut() else {
            return FrameReading::default();
        };
        api.update_state(self.index, &mut self.native);

        self.connection.observe(
            ConnectionState::from_native(self.native.connection_state),
            ApiStatus::from_native(self.native.api_status),
        );
        FrameReading {
            input: self.native.to_frame_input(self.battery_supported),
            samples: Vec::new(),
        }
    }

    fn pause(&mut self) {
        if let Some(api) = self.live_api() {
            api.pause();
        }
    }

    fn resume(&mut self) {
        if let Some(api) = self.live_api() {
            api.resume();
        }
    }

    fn shutdown(&mut self) {
        if let Some(mut api) = self.api.take() {
            log::info!("Destroying controller API");
            api.destroy();
        }
        self.connection.shutdown();
    }
}

impl Drop for ControllerProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}
