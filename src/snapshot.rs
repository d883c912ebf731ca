//! Frame-synchronized device state.
//!
//! The snapshot is the single read surface for consumers. It is written once
//! per frame by the pump and never replaced, so references held by game code
//! stay valid.

use crate::connection::ConnectionMachine;
use crate::types::{ApiStatus, BatteryLevel, Button, Buttons, ConnectionState};
use glam::{Quat, Vec2, Vec3};

/// Transitions of one boolean level between two consecutive frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Edge {
    pub down: bool,
    pub up: bool,
}

impl Edge {
    pub fn between(prev: bool, now: bool) -> Self {
        Edge {
            down: now && !prev,
            up: !now && prev,
        }
    }
}

/// Turns a level-triggered boolean into per-frame edges.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeTracker {
    level: bool,
    edge: Edge,
}

impl EdgeTracker {
    /// Record this frame's level. Edges compare against the previous frame.
    pub fn update(&mut self, level: bool) -> Edge {
        self.edge = Edge::between(self.level, level);
        self.level = level;
        self.edge
    }

    /// Keep the level, report no edges.
    pub fn hold(&mut self) {
        self.edge = Edge::default();
    }

    pub fn level(&self) -> bool {
        self.level
    }

    pub fn edge(&self) -> Edge {
        self.edge
    }
}

/// Device-clock time each field was last updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldTimestamps {
    pub orientation: i64,
    pub gyro: i64,
    pub accel: i64,
    pub position: i64,
    pub touch: i64,
    pub buttons: i64,
    pub battery: i64,
    pub recenter: i64,
}

impl FieldTimestamps {
    /// Fold in newer stamps. Stamps never move backwards.
    pub fn merge(&mut self, other: &FieldTimestamps) {
        self.orientation = self.orientation.max(other.orientation);
        self.gyro = self.gyro.max(other.gyro);
        self.accel = self.accel.max(other.accel);
        self.position = self.position.max(other.position);
        self.touch = self.touch.max(other.touch);
        self.buttons = self.buttons.max(other.buttons);
        self.battery = self.battery.max(other.battery);
        self.recenter = self.recenter.max(other.recenter);
    }
}

/// One frame's level readings from an input source.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameInput {
    pub orientation: Quat,
    pub gyro: Vec3,
    pub accel: Vec3,
    pub position: Vec3,
    pub touch_pos: Vec2,
    pub touching: bool,
    pub buttons: Buttons,
    pub recentering: bool,
    pub recentered: bool,
    pub battery_charging: bool,
    pub battery_level: BatteryLevel,
    pub timestamps: FieldTimestamps,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    frame: u64,
    state: ConnectionState,
    api_status: ApiStatus,
    error_details: Option<String>,
    orientation: Quat,
    gyro: Vec3,
    accel: Vec3,
    position: Vec3,
    touch_pos: Vec2,
    touch: EdgeTracker,
    buttons: Buttons,
    buttons_down: Buttons,
    buttons_up: Buttons,
    recentering: bool,
    recentered: bool,
    battery_charging: bool,
    battery_level: BatteryLevel,
    timestamps: FieldTimestamps,
}

impl DeviceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one frame.
    ///
    /// While the device is not connected, levels keep their last-known values
    /// and every edge reads false.
    pub fn update(&mut self, connection: &ConnectionMachine, input: &FrameInput) {
        self.frame += 1;
        self.state = connection.state();
        self.api_status = connection.api_status();
        if self.error_details.as_deref() != connection.error_details() {
            self.error_details = connection.error_details().map(str::to_owned);
        }

        if !connection.is_connected() {
            self.touch.hold();
            self.buttons_down = Buttons::empty();
            self.buttons_up = Buttons::empty();
            self.recentered = false;
            return;
        }

        self.orientation = input.orientation;
        self.gyro = input.gyro;
        self.accel = input.accel;
        self.position = input.position;
        self.touch_pos = input.touch_pos;
        self.touch.update(input.touching);

        self.buttons_down = input.buttons & !self.buttons;
        self.buttons_up = self.buttons & !input.buttons;
        self.buttons = input.buttons;

        self.recentering = input.recentering;
        self.recentered = input.recentered;
        self.battery_charging = input.battery_charging;
        self.battery_level = input.battery_level;
        self.timestamps.merge(&input.timestamps);
    }

    /// Return to the construction defaults, keeping the frame counter.
    pub fn reset(&mut self) {
        let frame = self.frame;
        *self = Self::default();
        self.frame = frame;
    }

    /// Number of updates applied so far.
    pub fn frame(&self) -> u64 {
        self.frame
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

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    /// Angular velocity in rad/s.
    pub fn gyro(&self) -> Vec3 {
        self.gyro
    }

    pub fn accel(&self) -> Vec3 {
        self.accel
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn touch_pos(&self) -> Vec2 {
        self.touch_pos
    }

    pub fn is_touching(&self) -> bool {
        self.touch.level()
    }

    pub fn touch_down(&self) -> bool {
        self.touch.edge().down
    }

    pub fn touch_up(&self) -> bool {
        self.touch.edge().up
    }

    pub fn buttons(&self) -> Buttons {
        self.buttons
    }

    pub fn buttons_down(&self) -> Buttons {
        self.buttons_down
    }

    pub fn buttons_up(&self) -> Buttons {
        self.buttons_up
    }

    pub fn button(&self, button: Button) -> bool {
        self.buttons.contains(button.flag())
    }

    pub fn button_down(&self, button: Button) -> bool {
        self.buttons_down.contains(button.flag())
    }

    pub fn button_up(&self, button: Button) -> bool {
        self.buttons_up.contains(button.flag())
    }

    pub fn recentering(&self) -> bool {
        self.recentering
    }

    /// True for the single frame after a recenter completes.
    pub fn recentered(&self) -> bool {
        self.recentered
    }

    pub fn battery_charging(&self) -> bool {
        self.battery_charging
    }

    pub fn battery_level(&self) -> BatteryLevel {
        self.battery_level
    }

    pub fn timestamps(&self) -> &FieldTimestamps {
        &self.timestamps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionState;

    fn connected() -> ConnectionMachine {
        let mut machine = ConnectionMachine::new();
        machine.observe(ConnectionState::Connected, ApiStatus::Ok);
        machine
    }

    fn pressing(buttons: Buttons) -> FrameInput {
        FrameInput {
            buttons,
            ..Default::default()
        }
    }

    #[test]
    fn defaults_are_disconnected_identity() {
        let snapshot = DeviceSnapshot::new();
        assert_eq!(snapshot.state(), ConnectionState::Disconnected);
        assert_eq!(snapshot.orientation(), Quat::IDENTITY);
        assert_eq!(snapshot.battery_level(), BatteryLevel::Unknown);
        assert_eq!(snapshot.frame(), 0);
    }

    #[test]
    fn button_press_and_release_edges() {
        let machine = connected();
        let mut snapshot = DeviceSnapshot::new();

        snapshot.update(&machine, &pressing(Buttons::APP));
        assert!(snapshot.button_down(Button::App));
        assert!(snapshot.button(Button::App));
        assert!(!snapshot.button_up(Button::App));

        snapshot.update(&machine, &pressing(Buttons::APP));
        assert!(!snapshot.button_down(Button::App));
        assert!(snapshot.button(Button::App));

        snapshot.update(&machine, &pressing(Buttons::empty()));
        assert!(snapshot.button_up(Button::App));
        assert!(!snapshot.button(Button::App));
    }

    #[test]
    fn disconnect_holds_levels_and_suppresses_edges() {
        let mut machine = connected();
        let mut snapshot = DeviceSnapshot::new();
        snapshot.update(
            &machine,
            &FrameInput {
                touching: true,
                buttons: Buttons::CLICK,
                ..Default::default()
            },
        );
        assert!(snapshot.touch_down());

        machine.observe(ConnectionState::Disconnected, ApiStatus::Unavailable);
        snapshot.update(&machine, &FrameInput::default());
        assert!(!snapshot.is_connected());
        assert!(snapshot.button(Button::Click));
        assert!(snapshot.is_touching());
        assert!(!snapshot.button_up(Button::Click));
        assert!(!snapshot.touch_up());
        assert!(!snapshot.touch_down());
    }

    #[test]
    fn timestamps_never_regress() {
        let machine = connected();
        let mut snapshot = DeviceSnapshot::new();
        let mut input = FrameInput::default();
        input.timestamps.gyro = 200;
        snapshot.update(&machine, &input);
        input.timestamps.gyro = 150;
        snapshot.update(&machine, &input);
        assert_eq!(snapshot.timestamps().gyro, 200);
    }

    #[test]
    fn error_details_follow_the_machine() {
        let machine = ConnectionMachine::failed("native init failed");
        let mut snapshot = DeviceSnapshot::new();
        snapshot.update(&machine, &FrameInput::default());
        assert_eq!(snapshot.state(), ConnectionState::Error);
        assert_eq!(snapshot.error_details(), Some("native init failed"));
    }
}
