use daybridge::coords::{self, same_rotation};
use daybridge::protocol::{FrameDecoder, PhoneEventDecoder, MAX_FRAME_LEN};
use daybridge::snapshot::{DeviceSnapshot, FrameInput};
use daybridge::{ApiStatus, Button, Buttons, ConnectionMachine, ConnectionState};
use glam::{Quat, Vec3};
use proptest::prelude::*;

fn machine(connected: bool) -> ConnectionMachine {
    let mut m = ConnectionMachine::new();
    let state = if connected {
        ConnectionState::Connected
    } else {
        ConnectionState::Disconnected
    };
    m.observe(state, ApiStatus::Ok);
    m
}

fn unit_quat() -> impl Strategy<Value = Quat> {
    (
        -1.0f32..1.0,
        -1.0f32..1.0,
        -1.0f32..1.0,
        0.01f32..std::f32::consts::PI,
    )
        .prop_filter("axis must be non-degenerate", |(x, y, z, _)| {
            x * x + y * y + z * z > 1e-3
        })
        .prop_map(|(x, y, z, angle)| Quat::from_axis_angle(Vec3::new(x, y, z).normalize(), angle))
}

proptest! {
    #[test]
    fn edges_match_level_transitions(
        frames in prop::collection::vec((any::<bool>(), 0u32..32), 1..64)
    ) {
        let mut snapshot = DeviceSnapshot::new();
        let mut level = Buttons::empty();

        for (connected, bits) in frames {
            let pressed = Buttons::from_bits_truncate(bits);
            snapshot.update(
                &machine(connected),
                &FrameInput { buttons: pressed, touching: bits & 1 == 1, ..Default::default() },
            );

            if connected {
                for b in Button::ALL {
                    let was = level.contains(b.flag());
                    let now = pressed.contains(b.flag());
                    prop_assert_eq!(snapshot.button_down(b), now && !was);
                    prop_assert_eq!(snapshot.button_up(b), !now && was);
                    prop_assert_eq!(snapshot.button(b), now);
                }
                level = pressed;
            } else {
                prop_assert!(snapshot.buttons_down().is_empty());
                prop_assert!(snapshot.buttons_up().is_empty());
                prop_assert!(!snapshot.touch_down() && !snapshot.touch_up());
                prop_assert_eq!(snapshot.buttons(), level);
            }
        }
    }

    #[test]
    fn stream_orientation_round_trips(q in unit_quat()) {
        let lh = coords::stream_orientation(q.x, q.y, q.z, q.w);
        let back = coords::stream_orientation(lh.x, lh.y, lh.z, lh.w);
        prop_assert!((back - q).length() < 1e-5);
    }

    #[test]
    fn controller_orientation_round_trips(q in unit_quat()) {
        let back = coords::controller_orientation(coords::controller_orientation(q));
        prop_assert!(same_rotation(back, q, 1e-5));
    }

    #[test]
    fn vector_conversions_round_trip(x in -100.0f32..100.0, y in -100.0f32..100.0, z in -100.0f32..100.0) {
        let v = Vec3::new(x, y, z);
        prop_assert!((coords::angular_velocity(coords::angular_velocity(v)) - v).length() < 1e-5);
        prop_assert!((coords::acceleration(coords::acceleration(v)) - v).length() < 1e-5);
        prop_assert!((coords::controller_to_phone(coords::phone_to_controller(v)) - v).length() < 1e-4);
    }

    #[test]
    fn decoders_never_panic_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let mut frames = FrameDecoder::new(MAX_FRAME_LEN);
        frames.push(&bytes);
        let mut events = PhoneEventDecoder::new();
        let _ = events.decode(&bytes);
        while let Ok(Some(frame)) = frames.next_frame() {
            let _ = events.decode(&frame);
        }
    }
}
