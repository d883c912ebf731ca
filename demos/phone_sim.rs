//! Pretend to be the phone emulator app.
//!
//! Listens on the emulator port and streams a slowly yawing orientation with
//! gyro data, tapping the click button once a second.
//!
//! Usage: cargo run --example phone_sim
//! Then run the `stream` example with DAYBRIDGE_ADB_FORWARD=0.

use daybridge::protocol::{build, encode_frame, PHONE_EVENT_PORT};
use daybridge::sample::ButtonCode;
use glam::{Quat, Vec3};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let listener = match TcpListener::bind(("127.0.0.1", PHONE_EVENT_PORT)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind port {}: {}", PHONE_EVENT_PORT, e);
            std::process::exit(1);
        }
    };
    println!("Phone simulator listening on port {}", PHONE_EVENT_PORT);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                println!("Bridge connected");
                if let Err(e) = serve(stream) {
                    println!("Bridge disconnected: {}", e);
                }
            }
            Err(e) => eprintln!("Accept failed: {}", e),
        }
    }
}

fn serve(mut stream: TcpStream) -> std::io::Result<()> {
    let start = Instant::now();
    let mut tick: u64 = 0;
    loop {
        let t = start.elapsed();
        let ts = t.as_nanos() as i64;
        let angle = t.as_secs_f32() * 0.5;
        // Phone lying flat: yaw is a rotation about the phone's Z axis.
        let q = Quat::from_axis_angle(Vec3::Z, angle);

        stream.write_all(&encode_frame(&build::orientation(ts, q.x, q.y, q.z, q.w)))?;
        stream.write_all(&encode_frame(&build::gyro(ts, 0.0, 0.0, 0.5)))?;
        stream.write_all(&encode_frame(&build::accel(ts, 0.0, 0.0, 9.81)))?;

        if tick % 100 == 0 {
            stream.write_all(&encode_frame(&build::key(ts, ButtonCode::Click, true)))?;
        } else if tick % 100 == 10 {
            stream.write_all(&encode_frame(&build::key(ts, ButtonCode::Click, false)))?;
        }

        tick += 1;
        std::thread::sleep(Duration::from_millis(10));
    }
}
