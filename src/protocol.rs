use serde::Deserialize;
use serde_json::json;

use crate::audio::Direction;

/// Requests accepted on the control bridge.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// 单方向开关
    Loopback { direction: Direction, state: Switch },
    /// 通话状态，active 建立双向，idle 全部拆除
    Call { state: CallState },
    Status,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Switch {
    On,
    Off,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Active,
    Idle,
}

pub fn status_reply(
    ready: bool,
    modem: Option<&str>,
    from_network: &[u32],
    to_network: &[u32],
) -> String {
    json!({
        "type": "status",
        "ready": ready,
        "modem": modem,
        "loopbacks": {
            "from_network": from_network,
            "to_network": to_network,
        },
    })
    .to_string()
}

pub fn error_reply(text: &str) -> String {
    json!({ "type": "error", "text": text }).to_string()
}
