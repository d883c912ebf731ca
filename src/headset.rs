//! Headset event stream and headset properties.
//!
//! Headset events are leveled: the pump polls until the source reports
//! [`HeadsetEvent::Invalid`], dispatching everything that arrived since the
//! previous frame.

use crate::coords::Pose3;
use crate::dispatch::Dispatcher;
use crate::queue::EventQueue;
use crate::types::{RecenterEventType, SafetyRegionType};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Upper bound on events consumed in one frame.
pub const MAX_EVENTS_PER_FRAME: usize = 1024;

// -- Native event type codes --
pub const EVENT_INVALID: i32 = 0;
pub const EVENT_RECENTER: i32 = 1;
pub const EVENT_SAFETY_REGION_EXIT: i32 = 2;
pub const EVENT_SAFETY_REGION_ENTER: i32 = 3;

/// Headset event as produced by the native layer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeHeadsetEvent {
    pub timestamp_ns: i64,
    pub event_type: i32,
    pub flags: u32,
    /// Valid for recenter events only.
    pub recenter_type: i32,
    pub recenter_flags: u32,
    /// Right-handed, row-major `float[4][4]`. Valid for recenter events only.
    pub pose_transform: [f32; 16],
}

const IDENTITY_ROW_MAJOR: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

impl NativeHeadsetEvent {
    pub fn with_code(timestamp_ns: i64, event_type: i32) -> Self {
        NativeHeadsetEvent {
            timestamp_ns,
            event_type,
            flags: 0,
            recenter_type: 0,
            recenter_flags: 0,
            pose_transform: IDENTITY_ROW_MAJOR,
        }
    }

    pub fn recenter(timestamp_ns: i64, recenter_type: RecenterEventType, pose_transform: [f32; 16]) -> Self {
        NativeHeadsetEvent {
            recenter_type: recenter_type as i32,
            pose_transform,
            ..Self::with_code(timestamp_ns, EVENT_RECENTER)
        }
    }

    pub fn safety_region(timestamp_ns: i64, entered: bool) -> Self {
        let code = if entered {
            EVENT_SAFETY_REGION_ENTER
        } else {
            EVENT_SAFETY_REGION_EXIT
        };
        Self::with_code(timestamp_ns, code)
    }
}

/// The headset was recentered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecenterEvent {
    pub timestamp_ns: i64,
    pub recenter_type: RecenterEventType,
    pub flags: u32,
    /// Recentered head pose, engine space.
    pub pose: Pose3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyRegionEvent {
    Enter { timestamp_ns: i64 },
    Exit { timestamp_ns: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadsetEvent {
    /// No more events this frame.
    Invalid,
    Recenter(RecenterEvent),
    SafetyRegionEnter { timestamp_ns: i64 },
    SafetyRegionExit { timestamp_ns: i64 },
    Unknown(i32),
}

impl HeadsetEvent {
    pub fn from_native(raw: &NativeHeadsetEvent) -> Self {
        match raw.event_type {
            EVENT_INVALID => HeadsetEvent::Invalid,
            EVENT_RECENTER => HeadsetEvent::Recenter(RecenterEvent {
                timestamp_ns: raw.timestamp_ns,
                recenter_type: RecenterEventType::from_native(raw.recenter_type),
                flags: raw.recenter_flags,
                pose: Pose3::from_native_row_major(&raw.pose_transform),
            }),
            EVENT_SAFETY_REGION_EXIT => HeadsetEvent::SafetyRegionExit {
                timestamp_ns: raw.timestamp_ns,
            },
            EVENT_SAFETY_REGION_ENTER => HeadsetEvent::SafetyRegionEnter {
                timestamp_ns: raw.timestamp_ns,
            },
            code => HeadsetEvent::Unknown(code),
        }
    }
}

/// Native headset service.
///
/// Property queries are fallible: `None` means the headset does not report it.
pub trait HeadsetApi {
    fn supports_positional_tracking(&self) -> bool;

    /// Next pending event, or [`HeadsetEvent::Invalid`] when none remain.
    fn poll_event(&mut self) -> HeadsetEvent;

    fn floor_height(&self) -> Option<f32> {
        None
    }

    /// Right-handed, row-major recenter transform.
    fn recenter_transform(&self) -> Option<[f32; 16]> {
        None
    }

    fn safety_region_type(&self) -> Option<SafetyRegionType> {
        None
    }

    fn safety_cylinder_inner_radius(&self) -> Option<f32> {
        None
    }

    fn safety_cylinder_outer_radius(&self) -> Option<f32> {
        None
    }

    /// Called when the pump hits [`MAX_EVENTS_PER_FRAME`] before seeing
    /// [`HeadsetEvent::Invalid`]. Returns whether events are left for the next frame.
    fn end_capped_frame(&mut self) -> bool {
        true
    }

    /// Drop pending events without delivering them. Returns how many were dropped.
    fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while dropped < MAX_EVENTS_PER_FRAME && self.poll_event() != HeadsetEvent::Invalid {
            dropped += 1;
        }
        dropped
    }

    /// Discard pending events and release the native service.
    fn shutdown(&mut self) {}
}

/// Static headset properties for a [`QueuedHeadsetSource`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeadsetProperties {
    pub positional_tracking: bool,
    pub floor_height: Option<f32>,
    pub recenter_transform: Option<[f32; 16]>,
    pub safety_region_type: Option<SafetyRegionType>,
    pub safety_cylinder_inner_radius: Option<f32>,
    pub safety_cylinder_outer_radius: Option<f32>,
}

/// Headset source fed by native callbacks on arbitrary threads.
///
/// Each frame's polling sees exactly the events queued before its first poll;
/// anything pushed mid-frame waits for the next frame. A queued `Invalid` ends
/// the frame early, and whatever follows it is delivered next frame.
pub struct QueuedHeadsetSource {
    queue: Arc<EventQueue<NativeHeadsetEvent>>,
    batch: VecDeque<NativeHeadsetEvent>,
    frame_open: bool,
    properties: HeadsetProperties,
}

impl QueuedHeadsetSource {
    pub fn new(queue: Arc<EventQueue<NativeHeadsetEvent>>, properties: HeadsetProperties) -> Self {
        QueuedHeadsetSource {
            queue,
            batch: VecDeque::new(),
            frame_open: false,
            properties,
        }
    }

    pub fn queue(&self) -> &Arc<EventQueue<NativeHeadsetEvent>> {
        &self.queue
    }
}

impl HeadsetApi for QueuedHeadsetSource {
    fn supports_positional_tracking(&self) -> bool {
        self.properties.positional_tracking
    }

    fn poll_event(&mut self) -> HeadsetEvent {
        if !self.frame_open {
            self.batch.extend(self.queue.drain_all());
            self.frame_open = true;
        }
        match self.batch.pop_front().map(|raw| HeadsetEvent::from_native(&raw)) {
            Some(HeadsetEvent::Invalid) | None => {
                self.frame_open = false;
                HeadsetEvent::Invalid
            }
            Some(event) => event,
        }
    }

    fn floor_height(&self) -> Option<f32> {
        self.properties.floor_height
    }

    fn recenter_transform(&self) -> Option<[f32; 16]> {
        self.properties.recenter_transform
    }

    fn safety_region_type(&self) -> Option<SafetyRegionType> {
        self.properties.safety_region_type
    }

    fn safety_cylinder_inner_radius(&self) -> Option<f32> {
        self.properties.safety_cylinder_inner_radius
    }

    fn safety_cylinder_outer_radius(&self) -> Option<f32> {
        self.properties.safety_cylinder_outer_radius
    }

    fn end_capped_frame(&mut self) -> bool {
        self.frame_open = false;
        !self.batch.is_empty()
    }

    fn discard_pending(&mut self) -> usize {
        let dropped = self.batch.len() + self.queue.clear();
        self.batch.clear();
        self.frame_open = false;
        dropped
    }

    fn shutdown(&mut self) {
        let dropped = self.discard_pending();
        if dropped > 0 {
            log::debug!("Discarded {} pending headset events", dropped);
        }
    }
}

/// Drives a [`HeadsetApi`] once per frame and exposes its properties in engine space.
pub struct HeadsetBridge {
    api: Box<dyn HeadsetApi>,
    reported_unknown: HashSet<i32>,
    reported_untracked: bool,
}

impl HeadsetBridge {
    pub fn new(api: Box<dyn HeadsetApi>) -> Self {
        if !api.supports_positional_tracking() {
            log::info!("Headset has no positional tracking; headset events disabled");
        }
        HeadsetBridge {
            api,
            reported_unknown: HashSet::new(),
            reported_untracked: false,
        }
    }

    pub fn supports_positional_tracking(&self) -> bool {
        self.api.supports_positional_tracking()
    }

    /// Poll until `Invalid`, dispatching each event in order.
    ///
    /// Without positional tracking nothing is dispatched, but pending events
    /// are still drained. Returns the number of events dispatched.
    pub fn pump(&mut self, dispatcher: &Dispatcher) -> usize {
        if !self.api.supports_positional_tracking() {
            let dropped = self.api.discard_pending();
            if dropped > 0 && !self.reported_untracked {
                log::info!("Discarding headset events: positional tracking unsupported");
                self.reported_untracked = true;
            }
            return 0;
        }

        let mut dispatched = 0;
        for _ in 0..MAX_EVENTS_PER_FRAME {
            match self.api.poll_event() {
                HeadsetEvent::Invalid => return dispatched,
                HeadsetEvent::Recenter(event) => {
                    log::debug!("Headset recenter: {:?}", event.recenter_type);
                    dispatcher.recenter.notify(event);
                    dispatched += 1;
                }
                HeadsetEvent::SafetyRegionEnter { timestamp_ns } => {
                    dispatcher
                        .safety_region
                        .notify(SafetyRegionEvent::Enter { timestamp_ns });
                    dispatched += 1;
                }
                HeadsetEvent::SafetyRegionExit { timestamp_ns } => {
                    dispatcher
                        .safety_region
                        .notify(SafetyRegionEvent::Exit { timestamp_ns });
                    dispatched += 1;
                }
                HeadsetEvent::Unknown(code) => {
                    if self.reported_unknown.insert(code) {
                        log::warn!("Skipping unrecognized headset event type {}", code);
                    }
                }
            }
        }

        if self.api.end_capped_frame() {
            log::warn!(
                "Headset produced more than {} events this frame; deferring the rest",
                MAX_EVENTS_PER_FRAME
            );
        }
        dispatched
    }

    /// Floor height relative to the tracking origin, in meters.
    pub fn floor_height(&self) -> Option<f32> {
        self.api.floor_height()
    }

    pub fn recenter_transform(&self) -> Option<Pose3> {
        self.api
            .recenter_transform()
            .map(|raw| Pose3::from_native_row_major(&raw))
    }

    pub fn safety_region_type(&self) -> Option<SafetyRegionType> {
        self.api.safety_region_type()
    }

    pub fn safety_cylinder_inner_radius(&self) -> Option<f32> {
        self.api.safety_cylinder_inner_radius()
    }

    pub fn safety_cylinder_outer_radius(&self) -> Option<f32> {
        self.api.safety_cylinder_outer_radius()
    }

    pub fn shutdown(&mut self) {
        self.api.shutdown();
    }
}
