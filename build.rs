use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    modem: Modem,
    pulse: Pulse,
    loopback: Loopback,
    control: Control,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Modem {
    #[serde(default)]
    card_name: String,
}

#[derive(Deserialize)]
struct Pulse {
    pactl: String,
    #[serde(default)]
    server: String,
}

#[derive(Deserialize)]
struct Loopback {
    fast_adjust_threshold_msec: u32,
    max_latency_msec: u32,
}

#[derive(Deserialize)]
struct Control {
    local_ip: String,
    local_port: u16,
    buffer_size: usize,
}


// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 应用信息
    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 调制解调器
    println!("cargo:rustc-env=MODEM_CARD_NAME={}", config.modem.card_name);

    // PulseAudio
    println!("cargo:rustc-env=PULSE_PACTL={}", config.pulse.pactl);
    println!("cargo:rustc-env=PULSE_SERVER={}", config.pulse.server);

    // Loopback tuning
    println!(
        "cargo:rustc-env=LOOPBACK_FAST_ADJUST_THRESHOLD_MSEC={}",
        config.loopback.fast_adjust_threshold_msec
    );
    println!("cargo:rustc-env=LOOPBACK_MAX_LATENCY_MSEC={}", config.loopback.max_latency_msec);

    // 控制通道
    println!("cargo:rustc-env=CONTROL_LOCAL_IP={}", config.control.local_ip);
    println!("cargo:rustc-env=CONTROL_LOCAL_PORT={}", config.control.local_port);
    println!("cargo:rustc-env=CONTROL_BUFFER_SIZE={}", config.control.buffer_size);
}
