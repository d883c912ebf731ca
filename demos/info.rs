//! Print the bridge configuration resolved from the environment.

fn main() {
    env_logger::init();

    let config = daybridge::BridgeConfig::from_env();
    let emu = &config.emulator;
    println!("Emulator mode:      {:?}", emu.mode);
    match emu.address() {
        Some(addr) => println!("Emulator address:   {}", addr),
        None => println!("Emulator address:   (disabled)"),
    }
    println!("adb forward:        {}", emu.uses_adb_forward());
    println!("Reconnect interval: {:?}", emu.reconnect_interval);
    println!("Read timeout:       {:?}", emu.read_timeout);
    println!("Max frame:          {} bytes", emu.max_frame_len);
}
