//! The session facade: one connection, one modem, and the two route
//! operations callers need during a voice call.

use std::cell::{Cell, OnceCell};
use std::rc::Rc;

use anyhow::{Result, anyhow};

use super::card_lookup::discover_modem;
use super::connection::Connection;
use super::direction::Direction;
use super::find_loopback::{find_loopback, find_loopback_modules};
use super::instantiate::{LoopbackTuning, instantiate_loopback};
use super::server::AudioServer;
use super::teardown;

pub struct AudioSystem {
    connection: Connection,
    /// ALSA card name of the modem. Set at most once.
    modem: Rc<OnceCell<String>>,
    tuning: LoopbackTuning,
}

impl AudioSystem {
    /// Connects to the audio server and waits until it is ready. Without a
    /// `modem` hint the first modem-class card is looked up in the background.
    pub async fn start(
        server: Rc<dyn AudioServer>,
        modem: Option<String>,
        tuning: LoopbackTuning,
    ) -> Result<Self> {
        let connection = Connection::connect(server).await?;
        Ok(Self::with_connection(connection, modem, tuning))
    }

    pub fn with_connection(
        connection: Connection,
        modem: Option<String>,
        tuning: LoopbackTuning,
    ) -> Self {
        let system = Self {
            connection,
            modem: Rc::new(OnceCell::new()),
            tuning,
        };
        match modem {
            Some(card) => {
                log::info!("Using modem ALSA card '{}'", card);
                let _ = system.modem.set(card);
            }
            None => system.discover_modem_when_ready(),
        }
        system
    }

    fn discover_modem_when_ready(&self) {
        let modem = self.modem.clone();
        let searching = Rc::new(Cell::new(false));
        self.connection.on_state_change(move |connection, state| {
            if !state.is_usable() || modem.get().is_some() || searching.get() {
                return;
            }
            searching.set(true);
            let connection = connection.clone();
            let modem = modem.clone();
            let searching = searching.clone();
            tokio::task::spawn_local(async move {
                match discover_modem(&connection).await {
                    Ok(Some(card)) => {
                        log::info!("Found modem ALSA card '{}'", card);
                        let _ = modem.set(card);
                    }
                    Ok(None) => log::warn!("No modem card found"),
                    Err(e) => connection.escalate(e),
                }
                searching.set(false);
            });
        });
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn modem(&self) -> Option<&str> {
        self.modem.get().map(String::as_str)
    }

    fn require_modem(&self) -> Result<&str> {
        self.modem()
            .ok_or_else(|| anyhow!("Modem ALSA card is not known yet"))
    }

    /// Makes sure a loopback exists for `direction`. An existing one is left
    /// alone. Fails synchronously only when the modem is still unknown.
    pub fn ensure_loopback(&self, direction: Direction) -> Result<()> {
        let card_name = self.require_modem()?;
        let connection = self.connection.clone();
        let tuning = self.tuning;
        find_loopback(&self.connection, card_name, direction, move |card_name, direction, modules| {
            if !modules.is_empty() {
                log::warn!(
                    "{} loopback module(s) for ALSA card '{}' {} already exist",
                    modules.len(),
                    card_name,
                    direction.master_kind()
                );
                return;
            }
            log::debug!(
                "Instantiating loopback module for ALSA card '{}' {}",
                card_name,
                direction.master_kind()
            );
            instantiate_loopback(
                &connection,
                &card_name,
                direction,
                direction.media_label(),
                tuning,
            );
        });
        Ok(())
    }

    /// Removes every loopback for `direction`.
    pub fn ensure_no_loopback(&self, direction: Direction) -> Result<()> {
        let card_name = self.require_modem()?;
        teardown::ensure_no_loopback(&self.connection, card_name, direction);
        Ok(())
    }

    /// Indices of the loopback modules currently routing `direction`.
    pub async fn loopbacks(&self, direction: Direction) -> Result<Vec<u32>> {
        let card_name = self.require_modem()?.to_string();
        find_loopback_modules(&self.connection, &card_name, direction)
            .await
            .ok_or_else(|| anyhow!("Loopback search for {} was abandoned", direction))
    }
}
