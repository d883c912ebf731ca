//! Phone emulator input source.
//!
//! A phone running the controller emulator app streams its sensors over TCP.
//! A background reader thread only splits the byte stream into frames and
//! queues them; decoding, recentering and dispatch happen on the frame thread.

use crate::config::EmulatorConfig;
use crate::connection::ConnectionMachine;
use crate::coords;
use crate::error::BridgeError;
use crate::protocol::{FrameDecoder, PhoneEventDecoder};
use crate::pump::{FrameReading, InputSource};
use crate::queue::EventQueue;
use crate::sample::{
    AccelSample, ButtonCode, ButtonSample, GyroSample, MotionAction, MotionSample, OrientationSample,
    RawSample,
};
use crate::snapshot::{FieldTimestamps, FrameInput};
use crate::types::{ApiStatus, BatteryLevel, Buttons, ConnectionState};
use crate::Result;
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use glam::{Quat, Vec2, Vec3};
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Socket read slice; bounds how long a stop request can go unnoticed.
const READ_SLICE: Duration = Duration::from_millis(100);

/// Socket state published by the reader thread.
#[derive(Debug, Clone, Default)]
pub struct LinkStatus(Arc<AtomicU8>);

impl LinkStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_native(self.0.load(Ordering::Acquire) as i32)
    }
}

/// Handle to the background socket reader.
pub struct EmulatorClient {
    frames: Arc<EventQueue<Bytes>>,
    link: LinkStatus,
    stop_flag: Arc<AtomicBool>,
    wake: Option<Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl EmulatorClient {
    /// Start the reader thread. It connects, and reconnects, on its own.
    pub fn start(config: &EmulatorConfig) -> Result<EmulatorClient> {
        let address = config.address().ok_or(BridgeError::EmulatorDisabled)?;
        let frames = Arc::new(EventQueue::new());
        let link = LinkStatus::new();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (wake, wait) = crossbeam_channel::bounded(0);

        let reader = Reader {
            address,
            config: config.clone(),
            frames: frames.clone(),
            link: link.clone(),
            stop_flag: stop_flag.clone(),
            wait,
        };
        let thread = std::thread::Builder::new()
            .name("daybridge-emulator".into())
            .spawn(move || reader.run())
            .map_err(|source| BridgeError::Spawn {
                name: "emulator",
                source,
            })?;

        Ok(EmulatorClient {
            frames,
            link,
            stop_flag,
            wake: Some(wake),
            thread: Some(thread),
        })
    }

    pub fn frames(&self) -> &Arc<EventQueue<Bytes>> {
        &self.frames
    }

    pub fn link(&self) -> &LinkStatus {
        &self.link
    }

    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::Relaxed)
    }

    /// Stop the reader and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        // Dropping the sender interrupts a pending reconnect wait.
        self.wake.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for EmulatorClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Reader {
    address: String,
    config: EmulatorConfig,
    frames: Arc<EventQueue<Bytes>>,
    link: LinkStatus,
    stop_flag: Arc<AtomicBool>,
    wait: Receiver<()>,
}

impl Reader {
    fn stopped(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }

    fn run(self) {
        log::info!("Emulator reader started ({})", self.address);
        let mut last_attempt: Option<Instant> = None;

        while !self.stopped() {
            if let Some(last) = last_attempt {
                let wait = self.config.reconnect_interval.saturating_sub(last.elapsed());
                if !wait.is_zero() {
                    match self.wait.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            }
            last_attempt = Some(Instant::now());

            self.link.set(ConnectionState::Connecting);
            if self.config.uses_adb_forward() {
                adb_forward(&self.config);
            }

            match self.connect() {
                Ok(stream) => {
                    log::info!("Emulator connected to {}", self.address);
                    self.link.set(ConnectionState::Connected);
                    match self.read_stream(stream) {
                        Ok(()) => log::info!("Emulator connection closed"),
                        Err(e) => log::warn!("Emulator connection lost: {}", e),
                    }
                }
                Err(e) => log::debug!("Emulator connect to {} failed: {}", self.address, e),
            }
            self.link.set(ConnectionState::Disconnected);
        }

        self.link.set(ConnectionState::Disconnected);
        log::info!("Emulator reader stopping (stop flag set)");
    }

    fn connect(&self) -> io::Result<TcpStream> {
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "address did not resolve");
        for addr in self.address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.config.read_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(READ_SLICE))?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// Pump one connection until it closes, errors, idles out or a stop is requested.
    fn read_stream(&self, mut stream: TcpStream) -> io::Result<()> {
        let mut decoder = FrameDecoder::new(self.config.max_frame_len);
        let mut buf = [0u8; 4096];
        let mut last_data = Instant::now();

        loop {
            if self.stopped() {
                return Ok(());
            }
            match stream.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    last_data = Instant::now();
                    decoder.push(&buf[..n]);
                    while let Some(frame) = decoder
                        .next_frame()
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
                    {
                        self.frames.enqueue(frame);
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    if last_data.elapsed() >= self.config.read_timeout {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("no data for {:?}", self.config.read_timeout),
                        ));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Tunnel the emulator port to a USB-tethered phone.
fn adb_forward(config: &EmulatorConfig) {
    let port = format!("tcp:{}", config.port);
    match std::process::Command::new(&config.adb_path)
        .args(["forward", &port, &port])
        .output()
    {
        Ok(out) if out.status.success() => log::trace!("adb forward {} ok", port),
        Ok(out) => log::warn!(
            "adb forward {} failed: {}",
            port,
            String::from_utf8_lossy(&out.stderr).trim()
        ),
        Err(e) => log::warn!("Could not run '{}': {}", config.adb_path, e),
    }
}

/// Level state accumulated from the phone stream.
#[derive(Debug, Clone)]
struct PhoneState {
    yaw_correction: Quat,
    last_raw_orientation: Option<Quat>,
    orientation: Quat,
    gyro: Vec3,
    accel: Vec3,
    touch_pos: Vec2,
    touching: bool,
    touch_pressed_this_frame: bool,
    touch_release_pending: bool,
    buttons: Buttons,
    pressed_this_frame: Buttons,
    release_pending: Buttons,
    recentering: bool,
    recentered: bool,
    timestamps: FieldTimestamps,
}

impl Default for PhoneState {
    fn default() -> Self {
        PhoneState {
            yaw_correction: Quat::IDENTITY,
            last_raw_orientation: None,
            orientation: Quat::IDENTITY,
            gyro: Vec3::ZERO,
            accel: Vec3::ZERO,
            touch_pos: Vec2::ZERO,
            touching: false,
            touch_pressed_this_frame: false,
            touch_release_pending: false,
            buttons: Buttons::empty(),
            pressed_this_frame: Buttons::empty(),
            release_pending: Buttons::empty(),
            recentering: false,
            recentered: false,
            timestamps: FieldTimestamps::default(),
        }
    }
}

impl PhoneState {
    /// Start a new frame: apply releases held over from the previous one.
    ///
    /// A press and release that land in the same frame would otherwise never
    /// show up as a level, so the release waits one frame.
    fn begin_frame(&mut self) {
        self.buttons.remove(self.release_pending);
        self.release_pending = Buttons::empty();
        self.pressed_this_frame = Buttons::empty();
        if self.touch_release_pending {
            self.touching = false;
            self.touch_release_pending = false;
        }
        self.touch_pressed_this_frame = false;
        self.recentered = false;
    }

    fn recenter(&mut self) {
        if let Some(raw) = self.last_raw_orientation {
            self.yaw_correction = Quat::from_axis_angle(Vec3::Y, -coords::yaw(raw));
        }
        self.orientation = Quat::IDENTITY;
        self.recentering = false;
        self.recentered = true;
        log::debug!("Emulator recentered");
    }

    /// Fold one decoded sample in. Returns the sample as it should be
    /// dispatched, in controller convention, or `None` if it is ignored.
    fn apply(&mut self, sample: RawSample) -> Option<RawSample> {
        match sample {
            RawSample::Gyro(g) => {
                self.gyro = coords::phone_to_controller(g.angular_velocity);
                self.timestamps.gyro = g.timestamp;
                Some(RawSample::Gyro(GyroSample {
                    timestamp: g.timestamp,
                    angular_velocity: self.gyro,
                }))
            }
            RawSample::Accel(a) => {
                self.accel = coords::phone_to_controller(a.acceleration);
                self.timestamps.accel = a.timestamp;
                Some(RawSample::Accel(AccelSample {
                    timestamp: a.timestamp,
                    acceleration: self.accel,
                }))
            }
            RawSample::Orientation(o) => {
                let raw = coords::phone_to_controller_orientation(o.orientation).normalize();
                let first = self.last_raw_orientation.is_none();
                self.last_raw_orientation = Some(raw);
                if first {
                    self.recenter();
                } else {
                    self.orientation = (self.yaw_correction * raw).normalize();
                }
                self.timestamps.orientation = o.timestamp;
                Some(RawSample::Orientation(OrientationSample {
                    timestamp: o.timestamp,
                    orientation: self.orientation,
                }))
            }
            RawSample::Motion(m) => self.apply_motion(m).map(RawSample::Motion),
            RawSample::Button(b) => {
                self.apply_button(&b);
                Some(RawSample::Button(b))
            }
            RawSample::Battery(_) => None,
        }
    }

    fn apply_motion(&mut self, motion: MotionSample) -> Option<MotionSample> {
        if motion.pointers().is_empty() {
            return None;
        }
        if let Some(p) = motion.action_pointer() {
            self.touch_pos = coords::touch_position(p.normalized_x, p.normalized_y);
        }
        match motion.action_masked() {
            MotionAction::Down | MotionAction::PointerDown | MotionAction::Move | MotionAction::PointerUp => {
                if !self.touching {
                    self.touch_pressed_this_frame = true;
                }
                self.touching = true;
                self.touch_release_pending = false;
            }
            MotionAction::Up | MotionAction::Cancel => {
                if self.touch_pressed_this_frame {
                    self.touch_release_pending = true;
                } else {
                    self.touching = false;
                }
            }
            MotionAction::HoverMove | MotionAction::HoverEnter | MotionAction::HoverExit => {}
        }
        self.timestamps.touch = motion.timestamp;
        Some(motion)
    }

    fn apply_button(&mut self, sample: &ButtonSample) {
        let flag = sample.code.button().flag();
        if sample.down {
            self.buttons.insert(flag);
            self.pressed_this_frame.insert(flag);
            self.release_pending.remove(flag);
            if sample.code == ButtonCode::Home {
                self.recentering = true;
            }
        } else {
            if self.pressed_this_frame.contains(flag) {
                self.release_pending.insert(flag);
            } else {
                self.buttons.remove(flag);
            }
            if sample.code == ButtonCode::Home {
                self.recenter();
                self.timestamps.recenter = sample.timestamp;
            }
        }
        self.timestamps.buttons = sample.timestamp;
    }

    fn frame_input(&self) -> FrameInput {
        FrameInput {
            orientation: self.orientation,
            gyro: self.gyro,
            accel: self.accel,
            position: Vec3::ZERO,
            touch_pos: self.touch_pos,
            touching: self.touching,
            buttons: self.buttons,
            recentering: self.recentering,
            recentered: self.recentered,
            battery_charging: false,
            battery_level: BatteryLevel::Full,
            timestamps: self.timestamps,
        }
    }
}

/// Frame source fed by the phone emulator.
pub struct EmulatorProvider {
    client: Option<EmulatorClient>,
    frames: Arc<EventQueue<Bytes>>,
    link: LinkStatus,
    decoder: PhoneEventDecoder,
    connection: ConnectionMachine,
    state: PhoneState,
}

impl EmulatorProvider {
    /// Start a socket client for `config` and read from it.
    pub fn connect(config: &EmulatorConfig) -> Result<Self> {
        let client = EmulatorClient::start(config)?;
        let mut provider = Self::from_parts(client.frames().clone(), client.link().clone());
        provider.client = Some(client);
        Ok(provider)
    }

    /// Read from an existing frame queue and link status.
    pub fn from_parts(frames: Arc<EventQueue<Bytes>>, link: LinkStatus) -> Self {
        EmulatorProvider {
            client: None,
            frames,
            link,
            decoder: PhoneEventDecoder::new(),
            connection: ConnectionMachine::new(),
            state: PhoneState::default(),
        }
    }

    pub fn frames(&self) -> &Arc<EventQueue<Bytes>> {
        &self.frames
    }

    pub fn link(&self) -> &LinkStatus {
        &self.link
    }
}

impl InputSource for EmulatorProvider {
    fn connection(&self) -> &ConnectionMachine {
        &self.connection
    }

    fn read_frame(&mut self) -> FrameReading {
        let link = self.link.get();
        let status = if link == ConnectionState::Connected {
            ApiStatus::Ok
        } else {
            ApiStatus::Unavailable
        };
        self.connection.observe(link, status);

        self.state.begin_frame();
        let mut samples = Vec::new();
        for frame in self.frames.drain_all() {
            match self.decoder.decode(&frame) {
                Ok(Some(sample)) => samples.extend(self.state.apply(sample)),
                Ok(None) => {}
                Err(e) => log::warn!("Dropping malformed phone event: {}", e),
            }
        }

        FrameReading {
            input: self.state.frame_input(),
            samples,
        }
    }

    fn shutdown(&mut self) {
        if let Some(client) = self.client.take() {
            client.stop();
        }
        let dropped = self.frames.clear();
        if dropped > 0 {
            log::debug!("Discarded {} queued phone frames", dropped);
        }
        self.link.set(ConnectionState::Disconnected);
        self.connection.shutdown();
    }
}

impl Drop for EmulatorProvider {
    fn drop(&mut self) {
        self.shutdown();
    }
}
