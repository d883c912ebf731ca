//! Phone emulator wire protocol.
//!
//! The phone app streams frames over TCP. Each frame is a 4-byte big-endian
//! length followed by a protobuf-encoded [`PhoneEvent`].

use crate::coords;
use crate::error::DecodeError;
use crate::sample::{
    AccelSample, ButtonCode, ButtonSample, GyroSample, MotionSample, OrientationSample, Pointer,
    RawSample,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use glam::Vec3;
use prost::Message as _;

// -- Transport --
pub const PHONE_EVENT_PORT: u16 = 7003;
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload accepted from the wire; guards against a corrupt length prefix.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Top-level message sent by the phone app.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PhoneEvent {
    #[prost(enumeration = "phone_event::Type", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(message, optional, tag = "2")]
    pub motion_event: Option<phone_event::MotionEvent>,
    #[prost(message, optional, tag = "3")]
    pub gyroscope_event: Option<phone_event::GyroscopeEvent>,
    #[prost(message, optional, tag = "4")]
    pub accelerometer_event: Option<phone_event::AccelerometerEvent>,
    #[prost(message, optional, tag = "5")]
    pub depth_map_event: Option<phone_event::DepthMapEvent>,
    #[prost(message, optional, tag = "6")]
    pub orientation_event: Option<phone_event::OrientationEvent>,
    #[prost(message, optional, tag = "7")]
    pub key_event: Option<phone_event::KeyEvent>,
}

pub mod phone_event {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Motion = 1,
        Gyroscope = 2,
        Accelerometer = 3,
        DepthMap = 4,
        Orientation = 5,
        Key = 6,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct MotionEvent {
        #[prost(int64, optional, tag = "1")]
        pub timestamp: Option<i64>,
        #[prost(int32, optional, tag = "2")]
        pub action: Option<i32>,
        #[prost(message, repeated, tag = "3")]
        pub pointers: Vec<motion_event::Pointer>,
    }

    pub mod motion_event {
        #[derive(Clone, PartialEq, prost::Message)]
        pub struct Pointer {
            #[prost(int32, optional, tag = "1")]
            pub id: Option<i32>,
            #[prost(float, optional, tag = "2")]
            pub normalized_x: Option<f32>,
            #[prost(float, optional, tag = "3")]
            pub normalized_y: Option<f32>,
        }
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GyroscopeEvent {
        #[prost(int64, optional, tag = "1")]
        pub timestamp: Option<i64>,
        #[prost(float, optional, tag = "2")]
        pub x: Option<f32>,
        #[prost(float, optional, tag = "3")]
        pub y: Option<f32>,
        #[prost(float, optional, tag = "4")]
        pub z: Option<f32>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct AccelerometerEvent {
        #[prost(int64, optional, tag = "1")]
        pub timestamp: Option<i64>,
        #[prost(float, optional, tag = "2")]
        pub x: Option<f32>,
        #[prost(float, optional, tag = "3")]
        pub y: Option<f32>,
        #[prost(float, optional, tag = "4")]
        pub z: Option<f32>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct DepthMapEvent {
        #[prost(int64, optional, tag = "1")]
        pub timestamp: Option<i64>,
        #[prost(int32, optional, tag = "2")]
        pub width: Option<i32>,
        #[prost(int32, optional, tag = "3")]
        pub height: Option<i32>,
        #[prost(sint32, repeated, tag = "4")]
        pub z_distances: Vec<i32>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct OrientationEvent {
        #[prost(int64, optional, tag = "1")]
        pub timestamp: Option<i64>,
        #[prost(float, optional, tag = "2")]
        pub x: Option<f32>,
        #[prost(float, optional, tag = "3")]
        pub y: Option<f32>,
        #[prost(float, optional, tag = "4")]
        pub z: Option<f32>,
        #[prost(float, optional, tag = "5")]
        pub w: Option<f32>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct KeyEvent {
        /// 0 = key down, 1 = key up (Android `KeyEvent` actions).
        #[prost(int32, optional, tag = "1")]
        pub action: Option<i32>,
        #[prost(int32, optional, tag = "2")]
        pub code: Option<i32>,
        #[prost(int64, optional, tag = "3")]
        pub timestamp: Option<i64>,
    }
}

/// Prefix an encoded [`PhoneEvent`] with its big-endian length.
pub fn encode_frame(event: &PhoneEvent) -> Bytes {
    let len = event.encoded_len();
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + len);
    buf.put_u32(len as u32);
    // BytesMut grows on demand, so encoding cannot run out of capacity.
    let _ = event.encode(&mut buf);
    buf.freeze()
}

/// Incremental splitter for the length-delimited frame stream.
///
/// Bytes are pushed as they arrive from the socket; complete payloads are
/// popped with [`FrameDecoder::next_frame`].
pub struct FrameDecoder {
    buf: BytesMut,
    max_len: usize,
}

impl FrameDecoder {
    pub fn new(max_len: usize) -> Self {
        FrameDecoder {
            buf: BytesMut::with_capacity(4096),
            max_len,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete payload, if one has fully arrived.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, DecodeError> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > self.max_len {
            return Err(DecodeError::FrameTooLarge {
                len,
                max: self.max_len,
            });
        }
        if self.buf.len() < LENGTH_PREFIX_SIZE + len {
            return Ok(None);
        }
        self.buf.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// Bytes received but not yet returned as a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, DecodeError> {
    value.ok_or(DecodeError::MissingField(field))
}

fn vec3(x: Option<f32>, y: Option<f32>, z: Option<f32>) -> Result<Vec3, DecodeError> {
    Ok(Vec3::new(
        required(x, "x")?,
        required(y, "y")?,
        required(z, "z")?,
    ))
}

/// Stateful decoder from wire payloads to engine-space samples.
///
/// Tracks the most recent touch `Down` so motion samples carry timestamps
/// relative to it. Must see payloads in arrival order.
#[derive(Debug, Default)]
pub struct PhoneEventDecoder {
    last_down: Option<i64>,
    last_timestamp: Option<i64>,
}

impl PhoneEventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one payload.
    ///
    /// Returns `Ok(None)` for well-formed events this bridge does not consume
    /// (depth maps, unknown event types, unknown key codes).
    pub fn decode(&mut self, payload: &[u8]) -> Result<Option<RawSample>, DecodeError> {
        let event = PhoneEvent::decode(payload)?;
        let type_code = required(event.r#type, "type")?;

        let sample = match phone_event::Type::try_from(type_code) {
            Ok(phone_event::Type::Motion) => {
                let motion = required(event.motion_event, "motion_event")?;
                Some(RawSample::Motion(self.decode_motion(motion)?))
            }
            Ok(phone_event::Type::Gyroscope) => {
                let gyro = required(event.gyroscope_event, "gyroscope_event")?;
                let timestamp = required(gyro.timestamp, "timestamp")?;
                let raw = vec3(gyro.x, gyro.y, gyro.z)?;
                Some(RawSample::Gyro(GyroSample {
                    timestamp,
                    angular_velocity: coords::angular_velocity(raw),
                }))
            }
            Ok(phone_event::Type::Accelerometer) => {
                let accel = required(event.accelerometer_event, "accelerometer_event")?;
                let timestamp = required(accel.timestamp, "timestamp")?;
                let raw = vec3(accel.x, accel.y, accel.z)?;
                Some(RawSample::Accel(AccelSample {
                    timestamp,
                    acceleration: coords::acceleration(raw),
                }))
            }
            Ok(phone_event::Type::Orientation) => {
                let o = required(event.orientation_event, "orientation_event")?;
                let timestamp = required(o.timestamp, "timestamp")?;
                let orientation = coords::stream_orientation(
                    required(o.x, "x")?,
                    required(o.y, "y")?,
                    required(o.z, "z")?,
                    required(o.w, "w")?,
                );
                Some(RawSample::Orientation(OrientationSample {
                    timestamp,
                    orientation,
                }))
            }
            Ok(phone_event::Type::Key) => {
                let key = required(event.key_event, "key_event")?;
                let code = required(key.code, "code")?;
                let action = required(key.action, "action")?;
                // Key events may omit a timestamp; they inherit the stream clock.
                let timestamp = key
                    .timestamp
                    .or(self.last_timestamp)
                    .ok_or(DecodeError::MissingField("timestamp"))?;
                match ButtonCode::from_key_code(code) {
                    Some(code) => Some(RawSample::Button(ButtonSample {
                        timestamp,
                        code,
                        down: action == 0,
                    })),
                    None => {
                        log::debug!("Ignoring unmapped key code {}", code);
                        None
                    }
                }
            }
            Ok(phone_event::Type::DepthMap) => {
                log::trace!("Skipping depth map event");
                None
            }
            Err(_) => {
                log::debug!("Unsupported PhoneEvent type: {}", type_code);
                None
            }
        };

        if let Some(sample) = &sample {
            self.last_timestamp = Some(sample.timestamp());
        }
        Ok(sample)
    }

    fn decode_motion(&mut self, motion: phone_event::MotionEvent) -> Result<MotionSample, DecodeError> {
        let timestamp = required(motion.timestamp, "timestamp")?;
        let action = required(motion.action, "action")?;
        let pointers = motion
            .pointers
            .into_iter()
            .map(|p| {
                Ok(Pointer {
                    finger_id: required(p.id, "pointer.id")?,
                    normalized_x: required(p.normalized_x, "pointer.normalized_x")?,
                    normalized_y: required(p.normalized_y, "pointer.normalized_y")?,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let sample = MotionSample::from_packed(timestamp, action, self.last_down, pointers)?;
        if sample.action_masked() == crate::sample::MotionAction::Down {
            self.last_down = Some(timestamp);
        }
        Ok(sample)
    }
}

/// Convenience builders for well-formed events, used by simulators and tests.
pub mod build {
    use super::phone_event::{self, motion_event};
    use super::PhoneEvent;
    use crate::sample::{ButtonCode, Pointer};

    pub fn motion(timestamp: i64, action: i32, pointers: &[Pointer]) -> PhoneEvent {
        PhoneEvent {
            r#type: Some(phone_event::Type::Motion as i32),
            motion_event: Some(phone_event::MotionEvent {
                timestamp: Some(timestamp),
                action: Some(action),
                pointers: pointers
                    .iter()
                    .map(|p| motion_event::Pointer {
                        id: Some(p.finger_id),
                        normalized_x: Some(p.normalized_x),
                        normalized_y: Some(p.normalized_y),
                    })
                    .collect(),
            }),
            ..Default::default()
        }
    }

    pub fn gyro(timestamp: i64, x: f32, y: f32, z: f32) -> PhoneEvent {
        PhoneEvent {
            r#type: Some(phone_event::Type::Gyroscope as i32),
            gyroscope_event: Some(phone_event::GyroscopeEvent {
                timestamp: Some(timestamp),
                x: Some(x),
                y: Some(y),
                z: Some(z),
            }),
            ..Default::default()
        }
    }

    pub fn accel(timestamp: i64, x: f32, y: f32, z: f32) -> PhoneEvent {
        PhoneEvent {
            r#type: Some(phone_event::Type::Accelerometer as i32),
            accelerometer_event: Some(phone_event::AccelerometerEvent {
                timestamp: Some(timestamp),
                x: Some(x),
                y: Some(y),
                z: Some(z),
            }),
            ..Default::default()
        }
    }

    pub fn orientation(timestamp: i64, x: f32, y: f32, z: f32, w: f32) -> PhoneEvent {
        PhoneEvent {
            r#type: Some(phone_event::Type::Orientation as i32),
            orientation_event: Some(phone_event::OrientationEvent {
                timestamp: Some(timestamp),
                x: Some(x),
                y: Some(y),
                z: Some(z),
                w: Some(w),
            }),
            ..Default::default()
        }
    }

    pub fn key(timestamp: i64, code: ButtonCode, down: bool) -> PhoneEvent {
        PhoneEvent {
            r#type: Some(phone_event::Type::Key as i32),
            key_event: Some(phone_event::KeyEvent {
                action: Some(if down { 0 } else { 1 }),
                code: Some(code.key_code()),
                timestamp: Some(timestamp),
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{pack_action, MotionAction};
    use prost::Message;

    fn finger(id: i32) -> Pointer {
        Pointer {
            finger_id: id,
            normalized_x: 0.2,
            normalized_y: 0.8,
        }
    }

    fn payload(event: &PhoneEvent) -> Vec<u8> {
        event.encode_to_vec()
    }

    #[test]
    fn test_touch_down_then_move_relative_timestamps() {
        let mut decoder = PhoneEventDecoder::new();
        let down = decoder
            .decode(&payload(&build::motion(1000, MotionAction::Down as i32, &[finger(0)])))
            .unwrap();
        let moved = decoder
            .decode(&payload(&build::motion(1050, MotionAction::Move as i32, &[finger(0)])))
            .unwrap();

        match (down, moved) {
            (Some(RawSample::Motion(d)), Some(RawSample::Motion(m))) => {
                assert_eq!(d.action_masked(), MotionAction::Down);
                assert_eq!(d.relative_timestamp(), 0);
                assert_eq!(m.action_masked(), MotionAction::Move);
                assert_eq!(m.relative_timestamp(), 50);
            }
            other => panic!("unexpected samples: {:?}", other),
        }
    }

    #[test]
    fn test_gyro_converted_at_decode() {
        let mut decoder = PhoneEventDecoder::new();
        let sample = decoder.decode(&payload(&build::gyro(5, 1.0, 2.0, 3.0))).unwrap();
        match sample {
            Some(RawSample::Gyro(g)) => assert_eq!(g.angular_velocity, Vec3::new(-1.0, -2.0, 3.0)),
            other => panic!("unexpected sample: {:?}", other),
        }
    }

    #[test]
    fn test_orientation_flips_z() {
        let mut decoder = PhoneEventDecoder::new();
        let sample = decoder
            .decode(&payload(&build::orientation(5, 0.1, 0.2, 0.3, 0.9)))
            .unwrap();
        match sample {
            Some(RawSample::Orientation(o)) => {
                assert!((o.orientation.z + 0.3).abs() < 1e-6);
                assert!((o.orientation.w - 0.9).abs() < 1e-6);
            }
            other => panic!("unexpected sample: {:?}", other),
        }
    }

    #[test]
    fn test_missing_timestamp_is_an_error() {
        let mut event = build::accel(5, 0.0, 9.8, 0.0);
        if let Some(accel) = event.accelerometer_event.as_mut() {
            accel.timestamp = None;
        }
        let err = PhoneEventDecoder::new().decode(&payload(&event)).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("timestamp")));
    }

    #[test]
    fn test_garbage_payload_is_an_error() {
        let result = PhoneEventDecoder::new().decode(&[0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert!(result.is_err());
    }

    #[test]
    fn test_key_event_inherits_stream_clock() {
        let mut decoder = PhoneEventDecoder::new();
        decoder.decode(&payload(&build::gyro(77, 0.0, 0.0, 0.0))).unwrap();
        let mut event = build::key(0, ButtonCode::App, true);
        if let Some(key) = event.key_event.as_mut() {
            key.timestamp = None;
        }
        match decoder.decode(&payload(&event)).unwrap() {
            Some(RawSample::Button(b)) => {
                assert_eq!(b.timestamp, 77);
                assert!(b.down);
                assert_eq!(b.code, ButtonCode::App);
            }
            other => panic!("unexpected sample: {:?}", other),
        }
    }

    #[test]
    fn test_pointer_up_keeps_packed_index() {
        let mut decoder = PhoneEventDecoder::new();
        let code = pack_action(MotionAction::PointerUp, 1);
        match decoder
            .decode(&payload(&build::motion(10, code, &[finger(4), finger(9)])))
            .unwrap()
        {
            Some(RawSample::Motion(m)) => assert_eq!(m.action_pointer().unwrap().finger_id, 9),
            other => panic!("unexpected sample: {:?}", other),
        }
    }

    #[test]
    fn test_frame_decoder_handles_split_frames() {
        let a = encode_frame(&build::gyro(1, 0.0, 0.0, 0.0));
        let b = encode_frame(&build::accel(2, 0.0, 0.0, 0.0));
        let mut stream = a.to_vec();
        stream.extend_from_slice(&b);

        let mut frames = FrameDecoder::new(MAX_FRAME_LEN);
        frames.push(&stream[..3]);
        assert!(frames.next_frame().unwrap().is_none());
        frames.push(&stream[3..a.len() + 2]);
        let first = frames.next_frame().unwrap().unwrap();
        assert_eq!(&first[..], &a[LENGTH_PREFIX_SIZE..]);
        assert!(frames.next_frame().unwrap().is_none());
        frames.push(&stream[a.len() + 2..]);
        let second = frames.next_frame().unwrap().unwrap();
        assert_eq!(&second[..], &b[LENGTH_PREFIX_SIZE..]);
        assert_eq!(frames.pending(), 0);
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut frames = FrameDecoder::new(16);
        frames.push(&1000u32.to_be_bytes());
        assert!(matches!(
            frames.next_frame(),
            Err(DecodeError::FrameTooLarge { len: 1000, max: 16 })
        ));
    }
}
