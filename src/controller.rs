use crate::audio::{AudioSystem, Direction};
use crate::control_bridge::{ControlBridge, ControlEvent};
use crate::protocol::{CallState, ControlMessage, Switch, error_reply, status_reply};
use std::sync::Arc;

/// Turns control messages into loopback operations. Call state is decided by
/// whoever sends the messages; nothing here tracks it.
pub struct CoreController {
    audio: AudioSystem,
    bridge: Arc<ControlBridge>,
}

impl CoreController {
    pub fn new(audio: AudioSystem, bridge: Arc<ControlBridge>) -> Self {
        Self { audio, bridge }
    }

    pub async fn handle_control_event(&mut self, event: ControlEvent) {
        let ControlEvent::Message(text, peer) = event;
        log::debug!("Received control message from {}: {}", peer, text);
        if let Some(reply) = self.process_message(&text).await {
            if let Err(e) = self.bridge.send_to(&reply, peer).await {
                log::warn!("Failed to reply to {}: {}", peer, e);
            }
        }
    }

    /// Returns the reply owed to the sender, if any.
    async fn process_message(&self, text: &str) -> Option<String> {
        let msg: ControlMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Malformed control message '{}': {}", text, e);
                return Some(error_reply(&format!("Malformed control message: {}", e)));
            }
        };

        let result = match msg {
            ControlMessage::Loopback { direction, state } => {
                self.switch(direction, state).map(|_| None)
            }
            ControlMessage::Call { state } => {
                let switch = match state {
                    CallState::Active => Switch::On,
                    CallState::Idle => Switch::Off,
                };
                log::info!("Call is {:?}, turning call audio {:?}", state, switch);
                Direction::ALL
                    .into_iter()
                    .try_for_each(|direction| self.switch(direction, switch))
                    .map(|_| None)
            }
            ControlMessage::Status => self.status().await.map(Some),
        };

        result.unwrap_or_else(|e| {
            log::warn!("{:#}", e);
            Some(error_reply(&format!("{:#}", e)))
        })
    }

    fn switch(&self, direction: Direction, state: Switch) -> anyhow::Result<()> {
        match state {
            Switch::On => self.audio.ensure_loopback(direction),
            Switch::Off => self.audio.ensure_no_loopback(direction),
        }
    }

    async fn status(&self) -> anyhow::Result<String> {
        let ready = self.audio.connection().is_ready();
        let modem = self.audio.modem();
        let (from_network, to_network) = if modem.is_some() {
            (
                self.audio.loopbacks(Direction::FromNetwork).await?,
                self.audio.loopbacks(Direction::ToNetwork).await?,
            )
        } else {
            (Vec::new(), Vec::new())
        };
        Ok(status_reply(ready, modem, &from_network, &to_network))
    }
}
