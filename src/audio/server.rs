//! The control channel to the audio server, seen as an abstract request/reply interface.
//!
//! Every call either returns immediately with a handle that is resolved later
//! (listings) or is an `async fn` whose continuation runs on the thread that
//! issued it. Implementations are `!Send` and live inside a `LocalSet`.

use std::fmt;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::props::PropertySet;

/// Lifecycle of the control channel, as reported by the audio server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connecting,
    Authorizing,
    SettingName,
    Ready,
    Terminated,
    Failed,
}

impl ConnectionState {
    /// Ready and Terminated both let queued requests be issued.
    pub fn is_usable(self) -> bool {
        matches!(self, ConnectionState::Ready | ConnectionState::Terminated)
    }
}

/// Server objects that carry a property set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Card,
    Source,
    Sink,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Card => "card",
            DeviceKind::Source => "source",
            DeviceKind::Sink => "sink",
        })
    }
}

/// Streams attached to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Playback stream, attached to a sink.
    SinkInput,
    /// Capture stream, attached to a source.
    SourceOutput,
}

impl StreamKind {
    /// Kind of the device a stream of this kind is attached to.
    pub fn device_kind(self) -> DeviceKind {
        match self {
            StreamKind::SinkInput => DeviceKind::Sink,
            StreamKind::SourceOutput => DeviceKind::Source,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamKind::SinkInput => "sink input",
            StreamKind::SourceOutput => "source output",
        })
    }
}

/// A card, source or sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub index: u32,
    pub name: String,
    pub properties: PropertySet,
}

/// A sink input or source output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub index: u32,
    pub name: String,
    /// `None` when the stream is not owned by a module.
    pub owner_module: Option<u32>,
    /// Index of the sink (for sink inputs) or source (for source outputs).
    pub device: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub index: u32,
    pub name: String,
}

/// One delivery of a listing.
#[derive(Debug)]
pub enum Listing<T> {
    Item(T),
    End,
    Failed(anyhow::Error),
}

/// Producer half of an [`Enumeration`].
pub struct ListingSender<T> {
    tx: mpsc::UnboundedSender<Listing<T>>,
}

impl<T> ListingSender<T> {
    /// Returns false once the consumer has gone away.
    pub fn item(&self, item: T) -> bool {
        self.tx.send(Listing::Item(item)).is_ok()
    }

    pub fn end(self) {
        let _ = self.tx.send(Listing::End);
    }

    pub fn fail(self, err: anyhow::Error) {
        let _ = self.tx.send(Listing::Failed(err));
    }

    /// Delivers a whole listing that was fetched in one go.
    pub fn finish(self, result: Result<Vec<T>>) {
        match result {
            Ok(items) => {
                for item in items {
                    if !self.item(item) {
                        return;
                    }
                }
                self.end();
            }
            Err(e) => self.fail(e),
        }
    }
}

/// A finite listing that is consumed once, record by record, and ends with
/// either [`Listing::End`] or [`Listing::Failed`].
pub struct Enumeration<T> {
    rx: mpsc::UnboundedReceiver<Listing<T>>,
    finished: bool,
}

impl<T> Enumeration<T> {
    pub fn channel() -> (ListingSender<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ListingSender { tx }, Self { rx, finished: false })
    }

    /// An enumeration whose records are already known.
    #[cfg(test)]
    pub fn ready(result: Result<Vec<T>>) -> Self {
        let (sender, enumeration) = Self::channel();
        sender.finish(result);
        enumeration
    }

    /// Next delivery. After a terminal delivery this keeps returning `End`.
    pub async fn next(&mut self) -> Listing<T> {
        if self.finished {
            return Listing::End;
        }
        match self.rx.recv().await {
            Some(Listing::Item(item)) => Listing::Item(item),
            Some(terminal) => {
                self.finished = true;
                terminal
            }
            None => {
                self.finished = true;
                Listing::Failed(anyhow!("listing closed before end of list"))
            }
        }
    }
}

/// Requests the routing core issues against the audio server.
#[async_trait(?Send)]
pub trait AudioServer {
    /// Starts connecting. Progress is reported through [`AudioServer::state`].
    fn connect(&self) -> Result<()>;

    fn state(&self) -> watch::Receiver<ConnectionState>;

    fn list_devices(&self, kind: DeviceKind) -> Enumeration<DeviceRecord>;

    fn list_streams(&self, kind: StreamKind) -> Enumeration<StreamRecord>;

    /// `Ok(None)` when no object has that index.
    async fn device_by_index(&self, kind: DeviceKind, index: u32) -> Result<Option<DeviceRecord>>;

    async fn module_by_index(&self, index: u32) -> Result<Option<ModuleRecord>>;

    /// Loads a module and returns its index.
    async fn load_module(&self, name: &str, args: &str) -> Result<u32>;

    async fn unload_module(&self, index: u32) -> Result<()>;
}
