use crate::audio::LoopbackTuning;

/// 运行时覆盖调制解调器声卡名的环境变量
pub const MODEM_ENV: &str = "CALL_AUDIO_MODEM";

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: &'static str,
    pub app_version: &'static str,

    // 调制解调器（动态部分，可在运行时修改）
    pub modem_card_name: Option<String>,

    // PulseAudio 配置
    pub pactl: &'static str,
    pub pulse_server: Option<&'static str>,

    // Loopback 参数
    pub fast_adjust_threshold_msec: u32,
    pub max_latency_msec: u32,

    // 控制通道配置
    pub control_local_ip: &'static str,
    pub control_local_port: u16,
    pub control_buffer_size: usize,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            app_name: env!("APP_NAME"),
            app_version: env!("APP_VERSION"),

            modem_card_name: non_empty(env!("MODEM_CARD_NAME")).map(str::to_string),

            pactl: env!("PULSE_PACTL"),
            pulse_server: non_empty(env!("PULSE_SERVER")),

            fast_adjust_threshold_msec: env!("LOOPBACK_FAST_ADJUST_THRESHOLD_MSEC")
                .parse()
                .map_err(|_| "Failed to parse LOOPBACK_FAST_ADJUST_THRESHOLD_MSEC")?,
            max_latency_msec: env!("LOOPBACK_MAX_LATENCY_MSEC")
                .parse()
                .map_err(|_| "Failed to parse LOOPBACK_MAX_LATENCY_MSEC")?,

            control_local_ip: env!("CONTROL_LOCAL_IP"),
            control_local_port: env!("CONTROL_LOCAL_PORT")
                .parse()
                .map_err(|_| "Failed to parse CONTROL_LOCAL_PORT")?,
            control_buffer_size: env!("CONTROL_BUFFER_SIZE")
                .parse()
                .map_err(|_| "Failed to parse CONTROL_BUFFER_SIZE")?,
        })
    }

    /// Applies overrides taken from the process environment.
    pub fn apply_env(&mut self) {
        if let Ok(modem) = std::env::var(MODEM_ENV) {
            let modem = modem.trim();
            if !modem.is_empty() {
                self.modem_card_name = Some(modem.to_string());
            }
        }
    }

    pub fn loopback_tuning(&self) -> LoopbackTuning {
        LoopbackTuning {
            fast_adjust_threshold_msec: self.fast_adjust_threshold_msec,
            max_latency_msec: self.max_latency_msec,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}

fn non_empty(value: &'static str) -> Option<&'static str> {
    let value = value.trim();
    if value.is_empty() { None } else { Some(value) }
}
