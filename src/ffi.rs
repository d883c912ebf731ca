//! C FFI layer for daybridge.
//!
//! Provides an opaque handle-based API for engine hosts written in C/C++.
//! The generated C header is written to `include/daybridge.h` by cbindgen.
//!
//! A bridge handle belongs to the frame thread. Headset queue handles may be
//! used from any thread. No entry point lets a panic cross the ABI.

use crate::config::BridgeConfig;
use crate::controller::{ControllerApi, ControllerProvider, NativeControllerState};
use crate::dispatch::SubscriptionId;
use crate::emulator::EmulatorProvider;
use crate::error::{BridgeError, LastError};
use crate::headset::{HeadsetBridge, HeadsetProperties, NativeHeadsetEvent, QueuedHeadsetSource, SafetyRegionEvent};
use crate::pump::{DeviceBridge, InputSource};
use crate::queue::EventQueue;
use crate::types::SafetyRegionType;
use std::ffi::{c_char, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

static LAST_ERROR: LastError = LastError::new();

/// Opaque bridge handle for C consumers.
pub struct DbrBridge {
    bridge: DeviceBridge,
    recenter_sub: Option<SubscriptionId>,
    safety_sub: Option<SubscriptionId>,
}

/// Opaque headset event queue handle. Safe to use from any thread.
pub struct DbrHeadsetQueue(Arc<EventQueue<NativeHeadsetEvent>>);

/// Native controller service, as C function pointers.
///
/// `update_state` is required; the other entries may be null.
#[repr(C)]
pub struct DbrControllerVtable {
    pub ctx: *mut c_void,
    pub update_state: Option<unsafe extern "C" fn(*mut c_void, c_int, *mut NativeControllerState)>,
    pub pause: Option<unsafe extern "C" fn(*mut c_void)>,
    pub resume: Option<unsafe extern "C" fn(*mut c_void)>,
    pub supports_battery: Option<unsafe extern "C" fn(*mut c_void) -> u8>,
    pub destroy: Option<unsafe extern "C" fn(*mut c_void)>,
}

/// Headset properties in C-compatible layout. `has_*` flags mark valid fields.
#[repr(C)]
pub struct DbrHeadsetProperties {
    pub positional_tracking: u8,
    pub has_floor_height: u8,
    pub floor_height: f32,
    pub has_recenter_transform: u8,
    /// Right-handed, row-major.
    pub recenter_transform: [f32; 16],
    pub has_safety_region: u8,
    /// 0 = none, 1 = cylinder.
    pub safety_region_type: c_int,
    pub safety_cylinder_inner_radius: f32,
    pub safety_cylinder_outer_radius: f32,
}

/// Frame snapshot in C-compatible layout. Engine (left-handed) space.
#[repr(C)]
#[derive(Default)]
pub struct DbrSnapshot {
    pub frame: u64,
    pub connection_state: c_int,
    pub api_status: c_int,
    /// Quaternion [x, y, z, w].
    pub orientation: [f32; 4],
    pub gyro: [f32; 3],
    pub accel: [f32; 3],
    pub position: [f32; 3],
    pub touch_pos: [f32; 2],
    pub is_touching: u8,
    pub touch_down: u8,
    pub touch_up: u8,
    /// `Buttons` bit sets.
    pub buttons: u32,
    pub buttons_down: u32,
    pub buttons_up: u32,
    pub recentering: u8,
    pub recentered: u8,
    pub battery_charging: u8,
    pub battery_level: c_int,
}

pub type DbrRecenterCallback = unsafe extern "C" fn(ctx: *mut c_void, recenter_type: c_int, timestamp_ns: i64);
pub type DbrSafetyRegionCallback = unsafe extern "C" fn(ctx: *mut c_void, entered: u8, timestamp_ns: i64);

struct FfiController {
    vtable: DbrControllerVtable,
    update_state: unsafe extern "C" fn(*mut c_void, c_int, *mut NativeControllerState),
}

impl ControllerApi for FfiController {
    fn update_state(&mut self, index: i32, out: &mut NativeControllerState) {
        // SAFETY: the host guarantees the vtable stays valid until destroy.
        unsafe { (self.update_state)(self.vtable.ctx, index, out) }
    }

    fn pause(&mut self) {
        if let Some(pause) = self.vtable.pause {
            unsafe { pause(self.vtable.ctx) }
        }
    }

    fn resume(&mut self) {
        if let Some(resume) = self.vtable.resume {
            unsafe { resume(self.vtable.ctx) }
        }
    }

    fn supports_battery(&self) -> bool {
        match self.vtable.supports_battery {
            Some(f) => unsafe { f(self.vtable.ctx) != 0 },
            None => false,
        }
    }

    fn destroy(&mut self) {
        if let Some(destroy) = self.vtable.destroy.take() {
            unsafe { destroy(self.vtable.ctx) }
        }
    }
}

fn guard<T>(on_panic: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => v,
        Err(_) => {
            LAST_ERROR.set(&"internal panic in daybridge");
            on_panic
        }
    }
}

fn into_handle(bridge: DeviceBridge) -> *mut DbrBridge {
    Box::into_raw(Box::new(DbrBridge {
        bridge,
        recenter_sub: None,
        safety_sub: None,
    }))
}

/// Create a bridge reading the phone emulator configured by `DAYBRIDGE_*`
/// environment variables.
/// Returns NULL on error (check dbr_last_error()).
#[no_mangle]
pub extern "C" fn dbr_emulator_bridge_create() -> *mut DbrBridge {
    guard(std::ptr::null_mut(), || {
        let config = BridgeConfig::from_env();
        match EmulatorProvider::connect(&config.emulator) {
            Ok(provider) => into_handle(DeviceBridge::exclusive(Box::new(provider), None)),
            Err(e) => {
                LAST_ERROR.set(&e);
                std::ptr::null_mut()
            }
        }
    })
}

/// Create a bridge over a native controller service.
///
/// A null vtable, or one without `update_state`, still yields a bridge; it
/// reports the `Error` connection state permanently.
///
/// # Safety
/// `vtable` must point to a valid `DbrControllerVtable`, or be null. Its
/// function pointers and `ctx` must remain valid until `destroy` is called.
#[no_mangle]
pub unsafe extern "C" fn dbr_native_bridge_create(vtable: *const DbrControllerVtable) -> *mut DbrBridge {
    guard(std::ptr::null_mut(), || {
        let provider = ControllerProvider::open(|| {
            let vtable = vtable
                .as_ref()
                .ok_or_else(|| BridgeError::NativeInit("controller vtable is null".into()))?;
            let update_state = vtable
                .update_state
                .ok_or_else(|| BridgeError::NativeInit("controller vtable has no update_state".into()))?;
            let api = FfiController {
                vtable: DbrControllerVtable {
                    ctx: vtable.ctx,
                    update_state: vtable.update_state,
                    pause: vtable.pause,
                    resume: vtable.resume,
                    supports_battery: vtable.supports_battery,
                    destroy: vtable.destroy,
                },
                update_state,
            };
            Ok(Box::new(api) as Box<dyn ControllerApi>)
        });
        if let Some(details) = provider_error(&provider) {
            LAST_ERROR.set(&details);
        }
        into_handle(DeviceBridge::exclusive(Box::new(provider), None))
    })
}

fn provider_error(provider: &ControllerProvider) -> Option<String> {
    provider.connection().error_details().map(str::to_owned)
}

/// Attach a headset event source. Returns a queue handle that native
/// callbacks push events into, or NULL on error, which includes a disabled
/// bridge. Release it with `dbr_headset_queue_release`.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null. `props` must point to a
/// valid `DbrHeadsetProperties`, or be null.
#[no_mangle]
pub unsafe extern "C" fn dbr_bridge_attach_headset(
    bridge: *mut DbrBridge,
    props: *const DbrHeadsetProperties,
) -> *mut DbrHeadsetQueue {
    guard(std::ptr::null_mut(), || {
        let Some(handle) = bridge.as_mut() else {
            return std::ptr::null_mut();
        };
        let properties = props.as_ref().map(headset_properties).unwrap_or_default();
        let queue = Arc::new(EventQueue::new());
        let source = QueuedHeadsetSource::new(queue.clone(), properties);
        match handle.bridge.set_headset(HeadsetBridge::new(Box::new(source))) {
            Ok(()) => Box::into_raw(Box::new(DbrHeadsetQueue(queue))),
            Err(e) => {
                LAST_ERROR.set(&e);
                std::ptr::null_mut()
            }
        }
    })
}

fn headset_properties(p: &DbrHeadsetProperties) -> HeadsetProperties {
    HeadsetProperties {
        positional_tracking: p.positional_tracking != 0,
        floor_height: (p.has_floor_height != 0).then_some(p.floor_height),
        recenter_transform: (p.has_recenter_transform != 0).then_some(p.recenter_transform),
        safety_region_type: (p.has_safety_region != 0).then(|| SafetyRegionType::from_native(p.safety_region_type)),
        safety_cylinder_inner_radius: (p.has_safety_region != 0).then_some(p.safety_cylinder_inner_radius),
        safety_cylinder_outer_radius: (p.has_safety_region != 0).then_some(p.safety_cylinder_outer_radius),
    }
}

/// Queue a headset event. May be called from any thread.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `queue` must be a valid queue pointer and `event` a valid event pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn dbr_headset_queue_push(
    queue: *const DbrHeadsetQueue,
    event: *const NativeHeadsetEvent,
) -> c_int {
    guard(-1, || match (queue.as_ref(), event.as_ref()) {
        (Some(queue), Some(event)) => {
            queue.0.enqueue(*event);
            0
        }
        _ => -1,
    })
}

/// Release a headset queue handle. Events already queued stay queued.
///
/// # Safety
/// `queue` must be a pointer returned by `dbr_bridge_attach_headset`, or null.
#[no_mangle]
pub unsafe extern "C" fn dbr_headset_queue_release(queue: *mut DbrHeadsetQueue) {
    guard((), || {
        if !queue.is_null() {
            drop(Box::from_raw(queue));
        }
    })
}

/// Run the end-of-frame pump. Returns 0 on success, -1 on error.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn dbr_bridge_end_of_frame(bridge: *mut DbrBridge) -> c_int {
    guard(-1, || match bridge.as_mut() {
        Some(handle) => {
            handle.bridge.end_of_frame();
            0
        }
        None => -1,
    })
}

/// Copy the current snapshot into `out`. Returns 0 on success, -1 on error.
///
/// # Safety
/// `bridge` must be a valid bridge pointer and `out` a valid snapshot pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn dbr_bridge_read_snapshot(bridge: *const DbrBridge, out: *mut DbrSnapshot) -> c_int {
    guard(-1, || {
        let Some(handle) = bridge.as_ref() else {
            return -1;
        };
        if out.is_null() {
            return -1;
        }
        let s = handle.bridge.snapshot();
        out.write(DbrSnapshot {
            frame: s.frame(),
            connection_state: s.state() as c_int,
            api_status: s.api_status() as c_int,
            orientation: s.orientation().to_array(),
            gyro: s.gyro().to_array(),
            accel: s.accel().to_array(),
            position: s.position().to_array(),
            touch_pos: s.touch_pos().to_array(),
            is_touching: s.is_touching() as u8,
            touch_down: s.touch_down() as u8,
            touch_up: s.touch_up() as u8,
            buttons: s.buttons().bits(),
            buttons_down: s.buttons_down().bits(),
            buttons_up: s.buttons_up().bits(),
            recentering: s.recentering() as u8,
            recentered: s.recentered() as u8,
            battery_charging: s.battery_charging() as u8,
            battery_level: s.battery_level() as c_int,
        });
        0
    })
}

/// Returns true if the bridge's device is connected.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn dbr_bridge_is_connected(bridge: *const DbrBridge) -> bool {
    guard(false, || bridge.as_ref().is_some_and(|h| h.bridge.is_connected()))
}

/// Set (or clear, with a null `cb`) the headset recenter callback. The
/// callback runs on the frame thread inside `dbr_bridge_end_of_frame`.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null. `ctx` must remain valid
/// for as long as the callback is installed.
#[no_mangle]
pub unsafe extern "C" fn dbr_bridge_set_recenter_callback(
    bridge: *mut DbrBridge,
    cb: Option<DbrRecenterCallback>,
    ctx: *mut c_void,
) -> c_int {
    guard(-1, || {
        let Some(handle) = bridge.as_mut() else {
            return -1;
        };
        let recenter = &handle.bridge.listeners().recenter;
        if let Some(id) = handle.recenter_sub.take() {
            recenter.unsubscribe(id);
        }
        if let Some(cb) = cb {
            handle.recenter_sub = Some(recenter.subscribe(move |e| unsafe {
                cb(ctx, e.recenter_type as c_int, e.timestamp_ns)
            }));
        }
        0
    })
}

/// Set (or clear, with a null `cb`) the safety region callback.
///
/// # Safety
/// Same requirements as `dbr_bridge_set_recenter_callback`.
#[no_mangle]
pub unsafe extern "C" fn dbr_bridge_set_safety_region_callback(
    bridge: *mut DbrBridge,
    cb: Option<DbrSafetyRegionCallback>,
    ctx: *mut c_void,
) -> c_int {
    guard(-1, || {
        let Some(handle) = bridge.as_mut() else {
            return -1;
        };
        let safety = &handle.bridge.listeners().safety_region;
        if let Some(id) = handle.safety_sub.take() {
            safety.unsubscribe(id);
        }
        if let Some(cb) = cb {
            handle.safety_sub = Some(safety.subscribe(move |e| {
                let (entered, ts) = match *e {
                    SafetyRegionEvent::Enter { timestamp_ns } => (1, timestamp_ns),
                    SafetyRegionEvent::Exit { timestamp_ns } => (0, timestamp_ns),
                };
                unsafe { cb(ctx, entered, ts) }
            }));
        }
        0
    })
}

/// Forward an application pause to the native service.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn dbr_bridge_pause(bridge: *mut DbrBridge) {
    guard((), || {
        if let Some(handle) = bridge.as_mut() {
            handle.bridge.pause();
        }
    })
}

/// Forward an application resume to the native service.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn dbr_bridge_resume(bridge: *mut DbrBridge) {
    guard((), || {
        if let Some(handle) = bridge.as_mut() {
            handle.bridge.resume();
        }
    })
}

/// Shut a bridge down and free it.
///
/// # Safety
/// `bridge` must be a pointer returned by one of the create functions, or null.
#[no_mangle]
pub unsafe extern "C" fn dbr_bridge_destroy(bridge: *mut DbrBridge) {
    guard((), || {
        if !bridge.is_null() {
            drop(Box::from_raw(bridge));
        }
    })
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next daybridge API call.
#[no_mangle]
pub extern "C" fn dbr_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
