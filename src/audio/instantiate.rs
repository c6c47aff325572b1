//! Creation of a loopback route between a modem device and the default
//! input/output.

use super::LOOPBACK_MODULE;
use super::card_lookup::resolve_master;
use super::connection::Connection;
use super::direction::Direction;
use super::props::PropertySet;

/// Fixed latency tuning passed to every loopback module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackTuning {
    pub fast_adjust_threshold_msec: u32,
    pub max_latency_msec: u32,
}

impl Default for LoopbackTuning {
    fn default() -> Self {
        Self {
            fast_adjust_threshold_msec: 100,
            max_latency_msec: 25,
        }
    }
}

fn stream_properties(media_label: &str, echo_cancel: bool) -> PropertySet {
    let props = PropertySet::new()
        .with("media.role", "phone")
        .with("media.icon_name", "phone")
        .with("media.name", media_label);
    if echo_cancel {
        props.with("filter.want", "echo-cancel")
    } else {
        props
    }
}

/// Wraps a value in single quotes for a module argument string.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if matches!(c, '\'' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Module arguments for a loopback anchored on `master`.
///
/// Echo cancellation is requested on the side that receives call audio: the
/// sink input when audio comes from the network, the source output when it
/// goes to the network.
pub fn loopback_args(
    direction: Direction,
    master: &str,
    media_label: &str,
    tuning: LoopbackTuning,
) -> String {
    let sink_input = stream_properties(media_label, direction == Direction::FromNetwork);
    let source_output = stream_properties(media_label, direction == Direction::ToNetwork);
    let anchor = direction.master_kind();

    format!(
        "{anchor}={master} {anchor}_dont_move=true \
         fast_adjust_threshold_msec={fast} max_latency_msec={max} \
         sink_input_properties={sink_input} source_output_properties={source_output}",
        anchor = anchor,
        master = master,
        fast = tuning.fast_adjust_threshold_msec,
        max = tuning.max_latency_msec,
        sink_input = quote(&sink_input.to_module_arg()),
        source_output = quote(&source_output.to_module_arg()),
    )
}

/// State carried through one instantiation. Holds its own connection handle
/// until the module request has been answered.
struct InstantiateLoopback {
    connection: Connection,
    card_name: String,
    direction: Direction,
    media_label: String,
    tuning: LoopbackTuning,
    master: Option<String>,
}

impl InstantiateLoopback {
    async fn run(mut self) {
        let kind = self.direction.master_kind();
        log::debug!("Finding {} for ALSA card '{}'", kind, self.card_name);
        let master = match resolve_master(&self.connection, &self.card_name, kind).await {
            Ok(Some(master)) => master,
            Ok(None) => {
                log::warn!("Could not find {} for ALSA card '{}'", kind, self.card_name);
                return;
            }
            Err(e) => {
                self.connection.escalate(e);
                return;
            }
        };
        let master = self.master.insert(master).as_str();

        log::debug!(
            "Instantiating loopback module with {} '{}' (ALSA card '{}')",
            kind,
            master,
            self.card_name
        );
        let args = loopback_args(self.direction, master, &self.media_label, self.tuning);

        match self.connection.server().load_module(LOOPBACK_MODULE, &args).await {
            Ok(index) => log::info!(
                "Instantiated loopback module {} with {} '{}' (ALSA card '{}')",
                index,
                kind,
                master,
                self.card_name
            ),
            Err(e) => log::warn!(
                "Error instantiating loopback module with {} '{}' (ALSA card '{}'): {:#}",
                kind,
                master,
                self.card_name,
                e
            ),
        }
    }
}

/// Creates a loopback for `card_name` in `direction`. Fire and forget; the
/// outcome is only logged. Needs a `LocalSet`.
pub fn instantiate_loopback(
    connection: &Connection,
    card_name: &str,
    direction: Direction,
    media_label: &str,
    tuning: LoopbackTuning,
) {
    let request = InstantiateLoopback {
        connection: connection.clone(),
        card_name: card_name.to_string(),
        direction,
        media_label: media_label.to_string(),
        tuning,
        master: None,
    };
    tokio::task::spawn_local(request.run());
}
