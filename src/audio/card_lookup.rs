//! One-shot lookups that scan a whole device listing.
//!
//! Listings are always drained to the end; the first matching record wins and
//! later matches are only logged.

use anyhow::{Context, Result};

use super::connection::Connection;
use super::props::{ALSA_CARD_NAME, DEVICE_CLASS, PropertySet, matches_alsa_card};
use super::server::{DeviceKind, DeviceRecord, Listing};

/// An in-flight lookup of ALSA card `card_name` among the server's devices.
struct AlsaCardLookup {
    card_name: String,
    kind: DeviceKind,
    object_name: Option<String>,
}

impl AlsaCardLookup {
    fn observe(&mut self, device: DeviceRecord) {
        if self.object_name.is_some() {
            log::debug!("Skipping {} {} '{}'", self.kind, device.index, device.name);
            return;
        }
        if !matches_alsa_card(&device.properties, &self.card_name) {
            log::debug!(
                "The {} {} '{}' is not ALSA card '{}'",
                self.kind,
                device.index,
                device.name,
                self.card_name
            );
            return;
        }
        log::debug!(
            "The {} {} '{}' is ALSA card '{}'",
            self.kind,
            device.index,
            device.name,
            self.card_name
        );
        self.object_name = Some(device.name);
    }
}

/// Maps an ALSA card name to the name of the server's source or sink for it.
///
/// `Ok(None)` when no device of `kind` is that card. An error means the
/// listing itself failed, which the caller must treat as fatal.
pub async fn resolve_master(
    connection: &Connection,
    card_name: &str,
    kind: DeviceKind,
) -> Result<Option<String>> {
    let mut lookup = AlsaCardLookup {
        card_name: card_name.to_string(),
        kind,
        object_name: None,
    };
    let mut listing = connection.server().list_devices(kind);
    loop {
        match listing.next().await {
            Listing::Item(device) => lookup.observe(device),
            Listing::End => {
                log::debug!("End of {} list reached", kind);
                return Ok(lookup.object_name);
            }
            Listing::Failed(e) => {
                return Err(e).with_context(|| format!("Error listing audio server {}s", kind));
            }
        }
    }
}

fn modem_card_name(props: &PropertySet) -> Option<&str> {
    if !props.matches(DEVICE_CLASS, "modem") {
        return None;
    }
    props.get(ALSA_CARD_NAME)
}

/// Finds the ALSA card name of the first card whose class is "modem".
pub async fn discover_modem(connection: &Connection) -> Result<Option<String>> {
    let mut modem: Option<String> = None;
    let mut listing = connection.server().list_devices(DeviceKind::Card);
    loop {
        match listing.next().await {
            Listing::Item(card) => {
                let Some(alsa_card) = modem_card_name(&card.properties) else {
                    continue;
                };
                match &modem {
                    Some(found) => log::debug!(
                        "Ignoring card '{}', alsa: '{}'; already using '{}'",
                        card.name,
                        alsa_card,
                        found
                    ),
                    None => {
                        log::debug!("Found card '{}', alsa: '{}'", card.name, alsa_card);
                        modem = Some(alsa_card.to_string());
                    }
                }
            }
            Listing::End => return Ok(modem),
            Listing::Failed(e) => return Err(e).context("Failed to get card information"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::{MockServer, alsa_props, local, modem_props};
    use std::rc::Rc;

    #[tokio::test]
    async fn resolves_matching_source() {
        local(async {
            let server = Rc::new(MockServer::new());
            server.add_device(DeviceKind::Source, "alsa_input.builtin", alsa_props("Built-in"));
            server.add_device(DeviceKind::Source, "alsa_input.modem", alsa_props("SIMCom"));
            let connection = Connection::connect(server).await.unwrap();

            let master = resolve_master(&connection, "SIMCom", DeviceKind::Source)
                .await
                .unwrap();
            assert_eq!(master.as_deref(), Some("alsa_input.modem"));
        })
        .await;
    }

    #[tokio::test]
    async fn first_match_wins() {
        local(async {
            let server = Rc::new(MockServer::new());
            server.set_listing_turns(2);
            server.add_device(DeviceKind::Sink, "first", alsa_props("SIMCom"));
            server.add_device(DeviceKind::Sink, "second", alsa_props("SIMCom"));
            let connection = Connection::connect(server).await.unwrap();

            let master = resolve_master(&connection, "SIMCom", DeviceKind::Sink)
                .await
                .unwrap();
            assert_eq!(master.as_deref(), Some("first"));
        })
        .await;
    }

    #[tokio::test]
    async fn kind_is_respected() {
        local(async {
            let server = Rc::new(MockServer::new());
            server.add_device(DeviceKind::Sink, "alsa_output.modem", alsa_props("SIMCom"));
            let connection = Connection::connect(server).await.unwrap();

            let master = resolve_master(&connection, "SIMCom", DeviceKind::Source)
                .await
                .unwrap();
            assert_eq!(master, None);
        })
        .await;
    }

    #[tokio::test]
    async fn listing_failure_is_an_error() {
        local(async {
            let server = Rc::new(MockServer::new());
            let connection = Connection::connect(server.clone()).await.unwrap();
            server.fail_listings(true);
            assert!(resolve_master(&connection, "SIMCom", DeviceKind::Sink).await.is_err());
        })
        .await;
    }

    #[tokio::test]
    async fn first_modem_card_wins() {
        local(async {
            let server = Rc::new(MockServer::new());
            server.add_device(DeviceKind::Card, "alsa_card.builtin", alsa_props("Built-in"));
            server.add_device(DeviceKind::Card, "alsa_card.modem1", modem_props("hw:1"));
            server.add_device(DeviceKind::Card, "alsa_card.modem2", modem_props("hw:2"));
            let connection = Connection::connect(server).await.unwrap();

            assert_eq!(discover_modem(&connection).await.unwrap().as_deref(), Some("hw:1"));
        })
        .await;
    }

    #[tokio::test]
    async fn modem_without_alsa_name_is_skipped() {
        local(async {
            let server = Rc::new(MockServer::new());
            server.add_device(
                DeviceKind::Card,
                "bluez_card",
                PropertySet::new().with(DEVICE_CLASS, "modem"),
            );
            server.add_device(DeviceKind::Card, "alsa_card.modem", modem_props("hw:3"));
            let connection = Connection::connect(server).await.unwrap();

            assert_eq!(discover_modem(&connection).await.unwrap().as_deref(), Some("hw:3"));
        })
        .await;
    }

    #[tokio::test]
    async fn no_modem_card() {
        local(async {
            let server = Rc::new(MockServer::new());
            server.add_device(DeviceKind::Card, "alsa_card.builtin", alsa_props("Built-in"));
            let connection = Connection::connect(server).await.unwrap();

            assert_eq!(discover_modem(&connection).await.unwrap(), None);
        })
        .await;
    }
}
