//! Stream phone emulator state to stdout at a simulated 60 Hz frame rate.
//!
//! Usage: cargo run --example stream
//! Configure with DAYBRIDGE_EMULATOR_MODE=usb|wifi and friends.
//! Press Ctrl+C to stop.

use daybridge::{BridgeConfig, Button, DeviceBridge, EmulatorProvider};
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let config = BridgeConfig::from_env();
    let provider = match EmulatorProvider::connect(&config.emulator) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to start emulator client: {}", e);
            std::process::exit(1);
        }
    };

    let mut bridge = DeviceBridge::exclusive(Box::new(provider), None);
    bridge.listeners().button.subscribe(|b| {
        println!(
            "button {:?} {}",
            b.code,
            if b.down { "down" } else { "up" }
        );
    });

    println!(
        "Waiting for phone at {} (Ctrl+C to stop)...",
        config.emulator.address().unwrap_or_default()
    );

    let frame = Duration::from_micros(16_667);
    let start = Instant::now();
    let mut last_report = Instant::now();
    let mut was_connected = false;

    loop {
        let frame_start = Instant::now();
        bridge.end_of_frame();
        let s = bridge.snapshot();

        if s.is_connected() != was_connected {
            was_connected = s.is_connected();
            println!("--- {:?} ({:?}) ---", s.state(), s.api_status());
        }
        if s.recentered() {
            println!("--- recentered ---");
        }
        if s.button_down(Button::Click) || s.touch_down() {
            println!("touch down at [{:.3}, {:.3}]", s.touch_pos().x, s.touch_pos().y);
        }

        if last_report.elapsed() >= Duration::from_secs(1) && s.is_connected() {
            let q = s.orientation();
            let g = s.gyro();
            println!(
                "t={:<8.1} quat=[{:+.3}, {:+.3}, {:+.3}, {:+.3}]  gyro=[{:+.3}, {:+.3}, {:+.3}]  buttons={:?}",
                start.elapsed().as_secs_f64(),
                q.x, q.y, q.z, q.w,
                g.x, g.y, g.z,
                s.buttons(),
            );
            last_report = Instant::now();
        }

        if let Some(rest) = frame.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }
}
