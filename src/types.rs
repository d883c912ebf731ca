/// Availability of a tracked peripheral.
///
/// Only `Connected` carries authoritative pose and button data.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    Scanning = 1,
    Connecting = 2,
    Connected = 3,
    /// Native handle could not be created. Requires reinitialization.
    Error = 4,
}

impl ConnectionState {
    /// Map a native `gvr_controller_connection_state` code.
    ///
    /// The native API never reports `Error`; unknown codes read as disconnected.
    pub fn from_native(code: i32) -> Self {
        match code {
            1 => ConnectionState::Scanning,
            2 => ConnectionState::Connecting,
            3 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Health of the backing service, reported alongside the connection state.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ApiStatus {
    Ok = 0,
    Unsupported = 1,
    NotAuthorized = 2,
    #[default]
    Unavailable = 3,
    ApiServiceObsolete = 4,
    ApiClientObsolete = 5,
    ApiMalfunction = 6,
}

impl ApiStatus {
    /// Map a native `gvr_controller_api_status` code. Unknown codes read as unavailable.
    pub fn from_native(code: i32) -> Self {
        match code {
            0 => ApiStatus::Ok,
            1 => ApiStatus::Unsupported,
            2 => ApiStatus::NotAuthorized,
            4 => ApiStatus::ApiServiceObsolete,
            5 => ApiStatus::ApiClientObsolete,
            6 => ApiStatus::ApiMalfunction,
            _ => ApiStatus::Unavailable,
        }
    }

    pub fn is_ok(self) -> bool {
        self == ApiStatus::Ok
    }
}

/// Coarse battery level, as reported by the controller firmware.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BatteryLevel {
    #[default]
    Unknown = 0,
    CriticalLow = 1,
    Low = 2,
    Medium = 3,
    AlmostFull = 4,
    Full = 5,
}

impl BatteryLevel {
    pub fn from_native(code: i32) -> Self {
        match code {
            1 => BatteryLevel::CriticalLow,
            2 => BatteryLevel::Low,
            3 => BatteryLevel::Medium,
            4 => BatteryLevel::AlmostFull,
            5 => BatteryLevel::Full,
            _ => BatteryLevel::Unknown,
        }
    }
}

bitflags::bitflags! {
    /// Level state of the logical controller buttons.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[repr(C)]
    pub struct Buttons: u32 {
        const CLICK       = 1 << 0;
        const APP         = 1 << 1;
        const HOME        = 1 << 2;
        const VOLUME_UP   = 1 << 3;
        const VOLUME_DOWN = 1 << 4;
    }
}

/// A single logical controller button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Click,
    App,
    Home,
    VolumeUp,
    VolumeDown,
}

impl Button {
    pub const ALL: [Button; 5] = [
        Button::Click,
        Button::App,
        Button::Home,
        Button::VolumeUp,
        Button::VolumeDown,
    ];

    pub fn flag(self) -> Buttons {
        match self {
            Button::Click => Buttons::CLICK,
            Button::App => Buttons::APP,
            Button::Home => Buttons::HOME,
            Button::VolumeUp => Buttons::VOLUME_UP,
            Button::VolumeDown => Buttons::VOLUME_DOWN,
        }
    }

    /// Index into the native `button_state` array (`gvr_controller_button`).
    pub fn native_index(self) -> usize {
        match self {
            Button::Click => 1,
            Button::Home => 2,
            Button::App => 3,
            Button::VolumeUp => 4,
            Button::VolumeDown => 5,
        }
    }
}

/// Safety region feature supported by the running headset.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SafetyRegionType {
    #[default]
    None = 0,
    Cylinder = 1,
}

impl SafetyRegionType {
    pub fn from_native(code: i32) -> Self {
        match code {
            1 => SafetyRegionType::Cylinder,
            _ => SafetyRegionType::None,
        }
    }
}

/// Why the headset recentered.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecenterEventType {
    #[default]
    None = 0,
    Restart = 1,
    Aligned = 2,
    Don = 3,
}

impl RecenterEventType {
    pub fn from_native(code: i32) -> Self {
        match code {
            1 => RecenterEventType::Restart,
            2 => RecenterEventType::Aligned,
            3 => RecenterEventType::Don,
            _ => RecenterEventType::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_native_codes_fall_back() {
        assert_eq!(ConnectionState::from_native(42), ConnectionState::Disconnected);
        assert_eq!(ApiStatus::from_native(-1), ApiStatus::Unavailable);
        assert_eq!(BatteryLevel::from_native(9), BatteryLevel::Unknown);
    }

    #[test]
    fn button_flags_are_distinct() {
        let all = Button::ALL
            .iter()
            .fold(Buttons::empty(), |acc, b| acc | b.flag());
        assert_eq!(all, Buttons::all());
    }
}
