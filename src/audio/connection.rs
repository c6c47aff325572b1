//! The single control channel to the audio server.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow, bail};
use tokio::sync::{Notify, watch};

use super::server::{AudioServer, ConnectionState};

/// Shared handle to the control channel. Cloning it takes another reference;
/// requests that outlive their caller keep one for their whole lifetime.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<Inner>,
}

struct Inner {
    server: Rc<dyn AudioServer>,
    state: watch::Receiver<ConnectionState>,
    fatal: RefCell<Option<anyhow::Error>>,
    fatal_notify: Notify,
}

impl Connection {
    pub fn new(server: Rc<dyn AudioServer>) -> Self {
        let state = server.state();
        Self {
            inner: Rc::new(Inner {
                server,
                state,
                fatal: RefCell::new(None),
                fatal_notify: Notify::new(),
            }),
        }
    }

    /// Connects and waits, pumping the event loop, until the channel is usable.
    /// A later transition to `Failed` is escalated through [`Connection::fatal`].
    pub async fn connect(server: Rc<dyn AudioServer>) -> Result<Self> {
        let connection = Self::new(server);
        connection.start()?;
        connection.wait_ready().await?;
        connection.on_state_change(|connection, state| {
            if state == ConnectionState::Failed {
                connection.escalate(anyhow!("Error in audio server connection"));
            }
        });
        Ok(connection)
    }

    pub fn start(&self) -> Result<()> {
        log::debug!("Connecting to audio server");
        self.inner
            .server
            .connect()
            .context("Error connecting to audio server")
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_usable()
    }

    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.inner.state.clone();
        loop {
            let state = *rx.borrow_and_update();
            log::debug!("Audio server connection state: {:?}", state);
            if state == ConnectionState::Failed {
                bail!("Error in audio server connection");
            }
            if state.is_usable() {
                return Ok(());
            }
            rx.changed()
                .await
                .context("Audio server went away while connecting")?;
        }
    }

    /// Calls `observer` with the current state and then with every change,
    /// for as long as the connection is alive. Needs a `LocalSet`.
    pub fn on_state_change<F>(&self, mut observer: F)
    where
        F: FnMut(&Connection, ConnectionState) + 'static,
    {
        let mut rx = self.inner.state.clone();
        let weak = Rc::downgrade(&self.inner);
        tokio::task::spawn_local(async move {
            let mut state = *rx.borrow_and_update();
            loop {
                match weak.upgrade() {
                    Some(inner) => observer(&Connection { inner }, state),
                    None => break,
                }
                if rx.changed().await.is_err() {
                    break;
                }
                state = *rx.borrow_and_update();
            }
        });
    }

    pub fn server(&self) -> &dyn AudioServer {
        &*self.inner.server
    }

    /// Records an unrecoverable error. Only the first one is kept.
    pub fn escalate(&self, err: anyhow::Error) {
        log::error!("{:#}", err);
        let mut slot = self.inner.fatal.borrow_mut();
        if slot.is_none() {
            *slot = Some(err);
            self.inner.fatal_notify.notify_one();
        }
    }

    /// Resolves with the first escalated error.
    pub async fn fatal(&self) -> anyhow::Error {
        loop {
            if let Some(err) = self.inner.fatal.borrow_mut().take() {
                return err;
            }
            self.inner.fatal_notify.notified().await;
        }
    }
}
