//! Decoded, engine-space telemetry samples.
//!
//! Every sample is immutable once built and already expressed in the
//! left-handed engine convention. Timestamps are on the device clock.

use crate::error::DecodeError;
use crate::types::{BatteryLevel, Button};
use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GyroSample {
    pub timestamp: i64,
    /// Angular velocity in rad/s.
    pub angular_velocity: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelSample {
    pub timestamp: i64,
    /// Linear acceleration in m/s².
    pub acceleration: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub timestamp: i64,
    pub orientation: Quat,
}

/// Key codes as reported by the phone app (Android `KeyEvent` codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonCode {
    Home,
    VolumeDown,
    VolumeUp,
    Click,
    App,
}

impl ButtonCode {
    pub fn from_key_code(code: i32) -> Option<Self> {
        match code {
            3 => Some(ButtonCode::Home),
            24 => Some(ButtonCode::VolumeDown),
            25 => Some(ButtonCode::VolumeUp),
            66 => Some(ButtonCode::Click),
            82 => Some(ButtonCode::App),
            _ => None,
        }
    }

    pub fn key_code(self) -> i32 {
        match self {
            ButtonCode::Home => 3,
            ButtonCode::VolumeDown => 24,
            ButtonCode::VolumeUp => 25,
            ButtonCode::Click => 66,
            ButtonCode::App => 82,
        }
    }

    pub fn button(self) -> Button {
        match self {
            ButtonCode::Home => Button::Home,
            ButtonCode::VolumeDown => Button::VolumeDown,
            ButtonCode::VolumeUp => Button::VolumeUp,
            ButtonCode::Click => Button::Click,
            ButtonCode::App => Button::App,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonSample {
    pub timestamp: i64,
    pub code: ButtonCode,
    pub down: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySample {
    pub timestamp: i64,
    pub charging: bool,
    pub level: BatteryLevel,
}

/// Touch action codes. Values match Android's `MotionEvent` constants.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionAction {
    Down = 0,
    Up = 1,
    Move = 2,
    Cancel = 3,
    PointerDown = 5,
    PointerUp = 6,
    HoverMove = 7,
    HoverEnter = 9,
    HoverExit = 10,
}

impl MotionAction {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(MotionAction::Down),
            1 => Some(MotionAction::Up),
            2 => Some(MotionAction::Move),
            3 => Some(MotionAction::Cancel),
            5 => Some(MotionAction::PointerDown),
            6 => Some(MotionAction::PointerUp),
            7 => Some(MotionAction::HoverMove),
            9 => Some(MotionAction::HoverEnter),
            10 => Some(MotionAction::HoverExit),
            _ => None,
        }
    }

    fn addresses_pointer(self) -> bool {
        matches!(self, MotionAction::PointerDown | MotionAction::PointerUp)
    }
}

pub const ACTION_MASK: i32 = 0xff;
pub const ACTION_POINTER_INDEX_MASK: i32 = 0xff00;
pub const ACTION_POINTER_INDEX_SHIFT: i32 = 8;

/// Pack an action and pointer index the way Android's `MotionEvent` does.
pub fn pack_action(action: MotionAction, pointer_index: usize) -> i32 {
    (action as i32) | (((pointer_index as i32) << ACTION_POINTER_INDEX_SHIFT) & ACTION_POINTER_INDEX_MASK)
}

/// Split a packed action code into `(action, pointer_index)`.
pub fn unpack_action(code: i32) -> Result<(MotionAction, usize), DecodeError> {
    let action =
        MotionAction::from_code(code & ACTION_MASK).ok_or(DecodeError::UnknownAction(code))?;
    let index = ((code & ACTION_POINTER_INDEX_MASK) >> ACTION_POINTER_INDEX_SHIFT) as usize;
    Ok((action, index))
}

/// One active finger on the touch surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pointer {
    pub finger_id: i32,
    pub normalized_x: f32,
    pub normalized_y: f32,
}

/// A touch/motion event with its action pointer resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSample {
    pub timestamp: i64,
    action: MotionAction,
    pointer_index: usize,
    /// Device time since the most recent `Down`. Zero on `Down`, never negative.
    relative_timestamp: i64,
    pointers: Vec<Pointer>,
}

impl MotionSample {
    /// Build from a logical pointer id.
    ///
    /// `PointerDown`/`PointerUp` resolve `pointer_id` to its index in `pointers`;
    /// an id that is not present falls back to index 0 with a warning.
    pub fn new(
        timestamp: i64,
        action: MotionAction,
        pointer_id: i32,
        relative_timestamp: i64,
        pointers: Vec<Pointer>,
    ) -> Self {
        let mut pointer_index = 0;
        if action.addresses_pointer() {
            pointer_index = match pointers.iter().position(|p| p.finger_id == pointer_id) {
                Some(i) => i,
                None => {
                    log::warn!(
                        "Could not find finger id {} in the supplied list of {} pointers",
                        pointer_id,
                        pointers.len()
                    );
                    0
                }
            };
        }

        MotionSample {
            timestamp,
            action,
            pointer_index,
            relative_timestamp: relative_timestamp.max(0),
            pointers,
        }
    }

    /// Build from a packed wire action code.
    ///
    /// `last_down` is the timestamp of the most recent `Down` on this stream.
    pub fn from_packed(
        timestamp: i64,
        packed_action: i32,
        last_down: Option<i64>,
        pointers: Vec<Pointer>,
    ) -> Result<Self, DecodeError> {
        let (action, mut pointer_index) = unpack_action(packed_action)?;
        if action == MotionAction::Down {
            pointer_index = 0;
        }
        if pointer_index >= pointers.len() && pointer_index != 0 {
            log::warn!(
                "Action pointer index {} out of range for {} pointers",
                pointer_index,
                pointers.len()
            );
            pointer_index = 0;
        }

        let relative_timestamp = match (action, last_down) {
            (MotionAction::Down, _) => 0,
            (_, Some(down)) => timestamp.saturating_sub(down).max(0),
            (_, None) => 0,
        };

        Ok(MotionSample {
            timestamp,
            action,
            pointer_index,
            relative_timestamp,
            pointers,
        })
    }

    pub fn action_masked(&self) -> MotionAction {
        self.action
    }

    pub fn action_index(&self) -> usize {
        self.pointer_index
    }

    /// The action in Android's packed encoding.
    pub fn action_packed(&self) -> i32 {
        pack_action(self.action, self.pointer_index)
    }

    /// The pointer this action applies to, if any pointers are present.
    pub fn action_pointer(&self) -> Option<&Pointer> {
        self.pointers.get(self.pointer_index)
    }

    pub fn relative_timestamp(&self) -> i64 {
        self.relative_timestamp
    }

    pub fn pointers(&self) -> &[Pointer] {
        &self.pointers
    }
}

/// Any decoded telemetry sample.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSample {
    Gyro(GyroSample),
    Accel(AccelSample),
    Motion(MotionSample),
    Orientation(OrientationSample),
    Button(ButtonSample),
    Battery(BatterySample),
}

impl RawSample {
    pub fn timestamp(&self) -> i64 {
        match self {
            RawSample::Gyro(s) => s.timestamp,
            RawSample::Accel(s) => s.timestamp,
            RawSample::Motion(s) => s.timestamp,
            RawSample::Orientation(s) => s.timestamp,
            RawSample::Button(s) => s.timestamp,
            RawSample::Battery(s) => s.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finger(id: i32) -> Pointer {
        Pointer {
            finger_id: id,
            normalized_x: 0.5,
            normalized_y: 0.25,
        }
    }

    #[test]
    fn pack_round_trips_action_and_index() {
        let code = pack_action(MotionAction::PointerUp, 2);
        assert_eq!(code, 0x0206);
        let (action, index) = unpack_action(code).unwrap();
        assert_eq!(action, MotionAction::PointerUp);
        assert_eq!(index, 2);
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(matches!(unpack_action(4), Err(DecodeError::UnknownAction(4))));
    }

    #[test]
    fn pointer_down_resolves_finger_id() {
        let sample = MotionSample::new(10, MotionAction::PointerDown, 7, 5, vec![finger(3), finger(7)]);
        assert_eq!(sample.action_index(), 1);
        assert_eq!(sample.action_pointer().unwrap().finger_id, 7);
        assert_eq!(sample.action_packed(), 0x0105);
    }

    #[test]
    fn pointer_down_with_unknown_finger_falls_back_to_first() {
        let sample = MotionSample::new(10, MotionAction::PointerDown, 99, 5, vec![finger(3), finger(7)]);
        assert_eq!(sample.action_index(), 0);
        assert_eq!(sample.action_pointer().unwrap().finger_id, 3);
    }

    #[test]
    fn down_always_uses_first_pointer() {
        let sample =
            MotionSample::from_packed(1000, pack_action(MotionAction::Down, 1), None, vec![finger(1), finger(2)])
                .unwrap();
        assert_eq!(sample.action_index(), 0);
        assert_eq!(sample.relative_timestamp(), 0);
    }

    #[test]
    fn relative_timestamp_never_negative() {
        let sample =
            MotionSample::from_packed(900, MotionAction::Move as i32, Some(1000), vec![finger(1)]).unwrap();
        assert_eq!(sample.relative_timestamp(), 0);
    }

    #[test]
    fn relative_timestamp_saturates_on_extreme_clocks() {
        let sample =
            MotionSample::from_packed(1, MotionAction::Move as i32, Some(i64::MIN), vec![finger(1)]).unwrap();
        assert_eq!(sample.relative_timestamp(), i64::MAX);

        let sample =
            MotionSample::from_packed(i64::MIN, MotionAction::Move as i32, Some(i64::MAX), vec![finger(1)])
                .unwrap();
        assert_eq!(sample.relative_timestamp(), 0);
    }

    #[test]
    fn key_codes_map_to_buttons() {
        assert_eq!(ButtonCode::from_key_code(66), Some(ButtonCode::Click));
        assert_eq!(ButtonCode::from_key_code(82).map(ButtonCode::button), Some(Button::App));
        assert_eq!(ButtonCode::from_key_code(4), None);
    }
}
