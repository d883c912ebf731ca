use bytes::Bytes;
use daybridge::controller::BUTTON_COUNT;
use daybridge::headset::NativeHeadsetEvent;
use daybridge::protocol::{build, PhoneEvent};
use daybridge::sample::{MotionAction, MotionSample, Pointer};
use daybridge::{
    ApiStatus, BridgeError, Button, ConnectionState, ControllerApi, ControllerProvider, DeviceBridge,
    EmulatorProvider, EventQueue, HeadsetApi, HeadsetBridge, HeadsetEvent, LinkStatus,
    NativeControllerState, RecenterEventType, SafetyRegionEvent,
};
use prost::Message;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

// -- Headset --

struct ScriptedHeadset {
    events: VecDeque<HeadsetEvent>,
}

impl HeadsetApi for ScriptedHeadset {
    fn supports_positional_tracking(&self) -> bool {
        true
    }

    fn poll_event(&mut self) -> HeadsetEvent {
        self.events.pop_front().unwrap_or(HeadsetEvent::Invalid)
    }
}

#[derive(Default)]
struct IdleController;

impl ControllerApi for IdleController {
    fn update_state(&mut self, _index: i32, out: &mut NativeControllerState) {
        out.connection_state = ConnectionState::Disconnected as i32;
    }
    fn pause(&mut self) {}
    fn resume(&mut self) {}
    fn destroy(&mut self) {}
}

fn idle_source() -> Box<ControllerProvider> {
    Box::new(ControllerProvider::open(|| {
        Ok(Box::new(IdleController) as Box<dyn ControllerApi>)
    }))
}

#[test]
fn headset_drain_stops_at_invalid_and_keeps_order() {
    let recenter = match HeadsetEvent::from_native(&NativeHeadsetEvent::recenter(
        100,
        RecenterEventType::Aligned,
        [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    )) {
        HeadsetEvent::Recenter(r) => r,
        other => panic!("unexpected event {:?}", other),
    };
    let headset = ScriptedHeadset {
        events: VecDeque::from(vec![
            HeadsetEvent::Recenter(recenter),
            HeadsetEvent::SafetyRegionEnter { timestamp_ns: 200 },
            HeadsetEvent::Invalid,
            // Must not be consumed this frame.
            HeadsetEvent::SafetyRegionExit { timestamp_ns: 300 },
        ]),
    };
    let mut bridge = DeviceBridge::new(idle_source(), Some(HeadsetBridge::new(Box::new(headset))));

    let log = Rc::new(RefCell::new(Vec::new()));
    let l = log.clone();
    bridge
        .listeners()
        .recenter
        .subscribe(move |e| l.borrow_mut().push(format!("recenter@{}", e.timestamp_ns)));
    let l = log.clone();
    bridge.listeners().safety_region.subscribe(move |e| {
        l.borrow_mut().push(match e {
            SafetyRegionEvent::Enter { timestamp_ns } => format!("enter@{}", timestamp_ns),
            SafetyRegionEvent::Exit { timestamp_ns } => format!("exit@{}", timestamp_ns),
        })
    });

    bridge.end_of_frame();
    assert_eq!(*log.borrow(), vec!["recenter@100", "enter@200"]);

    bridge.end_of_frame();
    assert_eq!(*log.borrow(), vec!["recenter@100", "enter@200", "exit@300"]);
}

// -- Emulator --

fn connected_emulator() -> (EmulatorProvider, Arc<EventQueue<Bytes>>) {
    let frames = Arc::new(EventQueue::new());
    let link = LinkStatus::new();
    link.set(ConnectionState::Connected);
    (EmulatorProvider::from_parts(frames.clone(), link), frames)
}

fn push(frames: &EventQueue<Bytes>, event: PhoneEvent) {
    frames.enqueue(Bytes::from(event.encode_to_vec()));
}

fn finger(id: i32, x: f32, y: f32) -> Pointer {
    Pointer {
        finger_id: id,
        normalized_x: x,
        normalized_y: y,
    }
}

#[test]
fn emulator_touch_scenario_reports_relative_timestamps() {
    let (provider, frames) = connected_emulator();
    let mut bridge = DeviceBridge::new(Box::new(provider), None);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    bridge
        .listeners()
        .touch
        .subscribe(move |m: &MotionSample| s.borrow_mut().push((m.action_masked(), m.relative_timestamp())));

    push(&frames, build::motion(1000, MotionAction::Down as i32, &[finger(0, 0.25, 0.5)]));
    bridge.end_of_frame();
    assert!(bridge.snapshot().touch_down());
    assert!(bridge.snapshot().is_touching());

    push(&frames, build::motion(1050, MotionAction::Move as i32, &[finger(0, 0.3, 0.5)]));
    bridge.end_of_frame();
    assert!(!bridge.snapshot().touch_down());
    assert!((bridge.snapshot().touch_pos().x - 0.3).abs() < 1e-6);

    assert_eq!(
        *seen.borrow(),
        vec![(MotionAction::Down, 0), (MotionAction::Move, 50)]
    );

    push(&frames, build::motion(1100, MotionAction::Up as i32, &[finger(0, 0.3, 0.5)]));
    bridge.end_of_frame();
    assert!(bridge.snapshot().touch_up());
}

#[test]
fn extreme_touch_clock_does_not_break_the_frame() {
    let (provider, frames) = connected_emulator();
    let mut bridge = DeviceBridge::new(Box::new(provider), None);
    let relative = Rc::new(RefCell::new(Vec::new()));
    let r = relative.clone();
    bridge
        .listeners()
        .touch
        .subscribe(move |m: &MotionSample| r.borrow_mut().push(m.relative_timestamp()));

    push(&frames, build::motion(i64::MIN, MotionAction::Down as i32, &[finger(0, 0.5, 0.5)]));
    push(&frames, build::motion(1, MotionAction::Move as i32, &[finger(0, 0.6, 0.5)]));
    bridge.end_of_frame();

    assert_eq!(*relative.borrow(), vec![0, i64::MAX]);
    assert!(bridge.snapshot().is_touching());
    assert_eq!(bridge.snapshot().frame(), 1);
}

#[test]
fn late_subscriber_is_replayed_the_last_sample() {
    let (provider, frames) = connected_emulator();
    let mut bridge = DeviceBridge::new(Box::new(provider), None);
    push(&frames, build::gyro(10, 0.0, 0.0, 1.0));
    push(&frames, build::gyro(20, 0.0, 0.0, 2.0));
    bridge.end_of_frame();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    bridge.listeners().gyro.subscribe(move |g| s.borrow_mut().push(g.timestamp));
    assert_eq!(*seen.borrow(), vec![20]);
}

#[test]
fn pointer_down_lookup_failure_falls_back_to_first_pointer() {
    let sample = MotionSample::new(
        5,
        MotionAction::PointerDown,
        42,
        0,
        vec![finger(1, 0.1, 0.1), finger(2, 0.9, 0.9)],
    );
    assert_eq!(sample.action_index(), 0);
    assert_eq!(sample.action_pointer().map(|p| p.finger_id), Some(1));
}

// -- Controller --

struct ScriptedController {
    frames: Rc<RefCell<VecDeque<NativeControllerState>>>,
    calls: Rc<RefCell<u32>>,
}

impl ControllerApi for ScriptedController {
    fn update_state(&mut self, _index: i32, out: &mut NativeControllerState) {
        *self.calls.borrow_mut() += 1;
        if let Some(next) = self.frames.borrow_mut().pop_front() {
            *out = next;
        }
    }
    fn pause(&mut self) {}
    fn resume(&mut self) {}
    fn destroy(&mut self) {}
}

fn controller_frame(connected: bool, pressed: &[Button]) -> NativeControllerState {
    let mut state = NativeControllerState {
        connection_state: if connected { 3 } else { 0 },
        api_status: ApiStatus::Ok as i32,
        ..Default::default()
    };
    let mut buttons = [0u8; BUTTON_COUNT];
    for b in pressed {
        buttons[b.native_index()] = 1;
    }
    state.button_state = buttons;
    state
}

fn scripted_bridge(frames: Vec<NativeControllerState>) -> (DeviceBridge, Rc<RefCell<u32>>) {
    let calls = Rc::new(RefCell::new(0));
    let api = ScriptedController {
        frames: Rc::new(RefCell::new(frames.into())),
        calls: calls.clone(),
    };
    let provider = ControllerProvider::open(|| Ok(Box::new(api) as Box<dyn ControllerApi>));
    (DeviceBridge::new(Box::new(provider), None), calls)
}

#[test]
fn controller_polling_produces_edges() {
    let (mut bridge, calls) = scripted_bridge(vec![
        controller_frame(true, &[]),
        controller_frame(true, &[Button::Click]),
        controller_frame(true, &[Button::Click, Button::VolumeUp]),
        controller_frame(true, &[Button::VolumeUp]),
    ]);

    bridge.end_of_frame();
    assert!(bridge.is_connected());
    assert!(!bridge.snapshot().button(Button::Click));

    bridge.end_of_frame();
    assert!(bridge.snapshot().button_down(Button::Click));

    bridge.end_of_frame();
    assert!(!bridge.snapshot().button_down(Button::Click));
    assert!(bridge.snapshot().button_down(Button::VolumeUp));

    bridge.end_of_frame();
    assert!(bridge.snapshot().button_up(Button::Click));
    assert!(bridge.snapshot().button(Button::VolumeUp));
    assert_eq!(*calls.borrow(), 4);
}

#[test]
fn disconnect_suppresses_spurious_release() {
    let (mut bridge, _) = scripted_bridge(vec![
        controller_frame(true, &[Button::App]),
        controller_frame(false, &[]),
        controller_frame(false, &[]),
    ]);

    bridge.end_of_frame();
    assert!(bridge.snapshot().button_down(Button::App));

    bridge.end_of_frame();
    assert_eq!(bridge.snapshot().state(), ConnectionState::Disconnected);
    assert!(!bridge.snapshot().button_up(Button::App));
    assert!(bridge.snapshot().button(Button::App));

    bridge.end_of_frame();
    assert!(!bridge.snapshot().button_up(Button::App));
}

#[test]
fn construction_failure_is_permanent_and_makes_no_native_calls() {
    let attempts = Rc::new(RefCell::new(0));
    let a = attempts.clone();
    let provider = ControllerProvider::open(move || {
        *a.borrow_mut() += 1;
        Err(BridgeError::NativeInit("controller service not installed".into()))
    });
    let mut bridge = DeviceBridge::new(Box::new(provider), None);

    for _ in 0..10 {
        bridge.end_of_frame();
    }
    assert_eq!(*attempts.borrow(), 1);
    assert_eq!(bridge.snapshot().state(), ConnectionState::Error);
    assert!(bridge
        .snapshot()
        .error_details()
        .is_some_and(|d| d.contains("not installed")));
    assert!(!bridge.is_connected());
}

#[test]
fn shutdown_reports_disconnected() {
    let (mut bridge, _) = scripted_bridge(vec![controller_frame(true, &[])]);
    bridge.end_of_frame();
    assert!(bridge.is_connected());
    bridge.shutdown();
    assert_eq!(bridge.snapshot().state(), ConnectionState::Disconnected);
    bridge.shutdown();
}
