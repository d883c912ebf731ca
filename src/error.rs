use std::fmt;

/// Errors surfaced by the bridge to its owner.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Native controller API could not be created: {0}")]
    NativeInit(String),

    #[error("Device bridge is shut down")]
    ShutDown,

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    #[error("Emulator is disabled by configuration")]
    EmulatorDisabled,
}

/// Errors raised while decoding a single telemetry packet.
///
/// A decode failure only ever drops the offending sample.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("protobuf decode error: {0}")]
    Proto(#[from] prost::DecodeError),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unknown motion action code 0x{0:04x}")]
    UnknownAction(i32),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &dyn fmt::Display) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
