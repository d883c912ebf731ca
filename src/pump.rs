//! End-of-frame pump.
//!
//! [`DeviceBridge`] owns every piece of bridge state. Call
//! [`DeviceBridge::end_of_frame`] once per render frame on the frame thread;
//! everything else reads the resulting [`DeviceSnapshot`] or subscribes to
//! the [`Dispatcher`].

use crate::connection::ConnectionMachine;
use crate::dispatch::Dispatcher;
use crate::error::BridgeError;
use crate::headset::HeadsetBridge;
use crate::sample::RawSample;
use crate::snapshot::{DeviceSnapshot, FrameInput};
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};

/// Everything a source observed since the previous frame.
#[derive(Debug, Clone, Default)]
pub struct FrameReading {
    /// Level state at the end of the frame.
    pub input: FrameInput,
    /// Individual samples, in arrival order, for listener dispatch.
    pub samples: Vec<RawSample>,
}

/// A controller-like device polled once per frame.
pub trait InputSource {
    fn connection(&self) -> &ConnectionMachine;

    /// Collect this frame's state. Must not block.
    fn read_frame(&mut self) -> FrameReading;

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    /// Stop background work, discard queued data and release native
    /// resources. Must be idempotent.
    fn shutdown(&mut self);
}

static EXCLUSIVE_LIVE: AtomicBool = AtomicBool::new(false);

pub struct DeviceBridge {
    snapshot: DeviceSnapshot,
    source: Option<Box<dyn InputSource>>,
    headset: Option<HeadsetBridge>,
    dispatcher: Dispatcher,
    enabled: bool,
    holds_exclusive: bool,
}

impl DeviceBridge {
    pub fn new(source: Box<dyn InputSource>, headset: Option<HeadsetBridge>) -> Self {
        DeviceBridge {
            snapshot: DeviceSnapshot::new(),
            source: Some(source),
            headset,
            dispatcher: Dispatcher::new(),
            enabled: true,
            holds_exclusive: false,
        }
    }

    /// Build the process-wide bridge.
    ///
    /// Only one exclusive bridge may be live at a time. A second one logs an
    /// error, shuts its sources down and is returned disabled.
    pub fn exclusive(source: Box<dyn InputSource>, headset: Option<HeadsetBridge>) -> Self {
        let acquired = EXCLUSIVE_LIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        let mut bridge = Self::new(source, headset);
        if acquired {
            bridge.holds_exclusive = true;
        } else {
            log::error!("A device bridge is already live; this instance is disabled");
            bridge.shutdown();
        }
        bridge
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Advance the bridge by one frame.
    ///
    /// The source is read, the snapshot advanced, the frame's samples
    /// dispatched, then the headset event stream is drained.
    pub fn end_of_frame(&mut self) {
        if !self.enabled {
            return;
        }

        if let Some(source) = self.source.as_mut() {
            let reading = source.read_frame();
            self.snapshot.update(source.connection(), &reading.input);
            if !reading.samples.is_empty() {
                self.dispatcher.dispatch_samples(&reading.samples);
            }
        }

        if let Some(headset) = self.headset.as_mut() {
            headset.pump(&self.dispatcher);
        }
    }

    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.snapshot
    }

    pub fn listeners(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Attach a headset event source, replacing any previous one.
    ///
    /// A disabled or shut down bridge refuses the headset and shuts it down.
    pub fn set_headset(&mut self, mut headset: HeadsetBridge) -> Result<()> {
        if !self.enabled {
            log::warn!("Ignoring headset attached to a disabled device bridge");
            headset.shutdown();
            return Err(BridgeError::ShutDown);
        }
        if let Some(mut old) = self.headset.replace(headset) {
            old.shutdown();
        }
        Ok(())
    }

    pub fn headset(&self) -> Option<&HeadsetBridge> {
        self.headset.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot.is_connected()
    }

    pub fn pause(&mut self) {
        if !self.enabled {
            return;
        }
        if let Some(source) = self.source.as_mut() {
            source.pause();
        }
    }

    pub fn resume(&mut self) {
        if !self.enabled {
            return;
        }
        if let Some(source) = self.source.as_mut() {
            source.resume();
        }
    }

    /// Stop all sources and report `Disconnected`. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.shutdown();
            self.snapshot.update(source.connection(), &FrameInput::default());
        }
        if let Some(headset) = self.headset.as_mut() {
            headset.shutdown();
        }
        self.headset = None;
        if self.enabled {
            log::info!("Device bridge shut down");
        }
        self.enabled = false;
        if self.holds_exclusive {
            self.holds_exclusive = false;
            EXCLUSIVE_LIVE.store(false, Ordering::Release);
        }
    }
}

impl Drop for DeviceBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
