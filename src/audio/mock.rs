//! Scripted in-memory audio server for tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::rc::Rc;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::{LocalSet, yield_now};

use super::props::{ALSA_CARD_NAME, DEVICE_API, DEVICE_CLASS, PropertySet};
use super::server::{
    AudioServer, ConnectionState, DeviceKind, DeviceRecord, Enumeration, ModuleRecord,
    StreamKind, StreamRecord,
};
use super::LOOPBACK_MODULE;

/// Runs `f` inside a fresh `LocalSet`.
pub async fn local<F: Future>(f: F) -> F::Output {
    LocalSet::new().run_until(f).await
}

/// Gives every spawned task plenty of turns to run to completion.
pub async fn settle() {
    turns(256).await;
}

async fn turns(n: usize) {
    for _ in 0..n {
        yield_now().await;
    }
}

pub fn alsa_props(card_name: &str) -> PropertySet {
    PropertySet::new()
        .with(DEVICE_CLASS, "sound")
        .with(DEVICE_API, "alsa")
        .with(ALSA_CARD_NAME, card_name)
}

pub fn modem_props(card_name: &str) -> PropertySet {
    PropertySet::new()
        .with(DEVICE_CLASS, "modem")
        .with(ALSA_CARD_NAME, card_name)
}

/// A phone with a modem card "SIMCom" exposing one source and one sink.
pub fn phone() -> Rc<MockServer> {
    let server = Rc::new(MockServer::new());
    server.add_device(DeviceKind::Card, "alsa_card.platform-sound", alsa_props("Built-in"));
    server.add_device(DeviceKind::Card, "alsa_card.modem", modem_props("SIMCom"));
    server.add_device(DeviceKind::Source, "alsa_input.builtin", alsa_props("Built-in"));
    server.add_device(DeviceKind::Source, "alsa_input.modem", alsa_props("SIMCom"));
    server.add_device(DeviceKind::Sink, "alsa_output.modem", alsa_props("SIMCom"));
    server
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub index: u32,
    pub name: String,
    pub args: String,
}

pub struct MockServer {
    state: Rc<watch::Sender<ConnectionState>>,
    script: RefCell<Vec<ConnectionState>>,
    next_index: Cell<u32>,
    devices: RefCell<HashMap<DeviceKind, Vec<DeviceRecord>>>,
    streams: RefCell<HashMap<StreamKind, Vec<StreamRecord>>>,
    modules: RefCell<Vec<ModuleRecord>>,
    module_delays: RefCell<HashMap<u32, usize>>,
    listing_turns: Cell<usize>,
    fail_listings: Cell<bool>,
    fail_loads: Cell<bool>,
    failing_unloads: RefCell<HashSet<u32>>,
    failing_devices: RefCell<HashSet<u32>>,
    loaded: RefCell<Vec<LoadedModule>>,
    unloaded: RefCell<Vec<u32>>,
    module_fetches: Cell<usize>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::with_script(vec![
            ConnectionState::Connecting,
            ConnectionState::Authorizing,
            ConnectionState::SettingName,
            ConnectionState::Ready,
        ])
    }

    /// States reported, in order, once `connect` is called.
    pub fn with_script(script: Vec<ConnectionState>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Unconnected);
        Self {
            state: Rc::new(state),
            script: RefCell::new(script),
            next_index: Cell::new(0),
            devices: RefCell::new(HashMap::new()),
            streams: RefCell::new(HashMap::new()),
            modules: RefCell::new(Vec::new()),
            module_delays: RefCell::new(HashMap::new()),
            listing_turns: Cell::new(0),
            fail_listings: Cell::new(false),
            fail_loads: Cell::new(false),
            failing_unloads: RefCell::new(HashSet::new()),
            failing_devices: RefCell::new(HashSet::new()),
            loaded: RefCell::new(Vec::new()),
            unloaded: RefCell::new(Vec::new()),
            module_fetches: Cell::new(0),
        }
    }

    fn allocate(&self) -> u32 {
        let index = self.next_index.get();
        self.next_index.set(index + 1);
        index
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub fn add_device(&self, kind: DeviceKind, name: &str, properties: PropertySet) -> u32 {
        let index = self.allocate();
        self.devices
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push(DeviceRecord { index, name: name.to_string(), properties });
        index
    }

    pub fn add_module(&self, name: &str) -> u32 {
        let index = self.allocate();
        self.modules.borrow_mut().push(ModuleRecord { index, name: name.to_string() });
        index
    }

    pub fn add_stream(
        &self,
        kind: StreamKind,
        name: &str,
        owner_module: Option<u32>,
        device: u32,
    ) -> u32 {
        let index = self.allocate();
        self.streams.borrow_mut().entry(kind).or_default().push(StreamRecord {
            index,
            name: name.to_string(),
            owner_module,
            device,
        });
        index
    }

    /// Holds the answer to a fetch of module `index` for `turns` scheduler turns.
    pub fn delay_module(&self, index: u32, turns: usize) {
        self.module_delays.borrow_mut().insert(index, turns);
    }

    /// Yields `turns` times between delivered listing records.
    pub fn set_listing_turns(&self, turns: usize) {
        self.listing_turns.set(turns);
    }

    pub fn fail_listings(&self, fail: bool) {
        self.fail_listings.set(fail);
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.set(fail);
    }

    pub fn fail_unload(&self, index: u32) {
        self.failing_unloads.borrow_mut().insert(index);
    }

    /// Fetching device `index` by index answers with an error.
    pub fn fail_device(&self, index: u32) {
        self.failing_devices.borrow_mut().insert(index);
    }

    pub fn loaded(&self) -> Vec<LoadedModule> {
        self.loaded.borrow().clone()
    }

    pub fn unloaded(&self) -> Vec<u32> {
        self.unloaded.borrow().clone()
    }

    pub fn module_fetches(&self) -> usize {
        self.module_fetches.get()
    }

    /// Loopback modules currently loaded.
    pub fn loopbacks(&self) -> Vec<u32> {
        self.modules
            .borrow()
            .iter()
            .filter(|m| m.name == LOOPBACK_MODULE)
            .map(|m| m.index)
            .collect()
    }

    fn enumerate<T: Clone + 'static>(&self, records: Vec<T>) -> Enumeration<T> {
        if self.fail_listings.get() {
            return Enumeration::ready(Err(anyhow!("Protocol error")));
        }
        let gap = self.listing_turns.get();
        if gap == 0 {
            return Enumeration::ready(Ok(records));
        }
        let (sender, enumeration) = Enumeration::channel();
        tokio::task::spawn_local(async move {
            for record in records {
                turns(gap).await;
                if !sender.item(record) {
                    return;
                }
            }
            turns(gap).await;
            sender.end();
        });
        enumeration
    }

    fn find_device(&self, name: &str) -> Option<(DeviceKind, u32)> {
        self.devices.borrow().iter().find_map(|(kind, records)| {
            records.iter().find(|d| d.name == name).map(|d| (*kind, d.index))
        })
    }
}

#[async_trait(?Send)]
impl AudioServer for MockServer {
    fn connect(&self) -> Result<()> {
        let script = self.script.borrow_mut().split_off(0);
        let state = self.state.clone();
        tokio::task::spawn_local(async move {
            for next in script {
                yield_now().await;
                state.send_replace(next);
            }
        });
        Ok(())
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn list_devices(&self, kind: DeviceKind) -> Enumeration<DeviceRecord> {
        let records = self.devices.borrow().get(&kind).cloned().unwrap_or_default();
        self.enumerate(records)
    }

    fn list_streams(&self, kind: StreamKind) -> Enumeration<StreamRecord> {
        let records = self.streams.borrow().get(&kind).cloned().unwrap_or_default();
        self.enumerate(records)
    }

    async fn device_by_index(&self, kind: DeviceKind, index: u32) -> Result<Option<DeviceRecord>> {
        yield_now().await;
        if self.failing_devices.borrow().contains(&index) {
            bail!("No such entity");
        }
        Ok(self
            .devices
            .borrow()
            .get(&kind)
            .and_then(|records| records.iter().find(|d| d.index == index).cloned()))
    }

    async fn module_by_index(&self, index: u32) -> Result<Option<ModuleRecord>> {
        self.module_fetches.set(self.module_fetches.get() + 1);
        let delay = self.module_delays.borrow().get(&index).copied().unwrap_or(1);
        turns(delay).await;
        Ok(self.modules.borrow().iter().find(|m| m.index == index).cloned())
    }

    async fn load_module(&self, name: &str, args: &str) -> Result<u32> {
        yield_now().await;
        if self.fail_loads.get() {
            bail!("Module initialization failed");
        }
        let index = self.add_module(name);
        self.loaded.borrow_mut().push(LoadedModule {
            index,
            name: name.to_string(),
            args: args.to_string(),
        });

        // A loopback anchored on a master device gets a stream on that device.
        let master = args.split_whitespace().find_map(|token| {
            token
                .strip_prefix("source=")
                .or_else(|| token.strip_prefix("sink="))
        });
        if let Some((kind, device)) = master.and_then(|m| self.find_device(m)) {
            let stream_kind = match kind {
                DeviceKind::Sink => StreamKind::SinkInput,
                _ => StreamKind::SourceOutput,
            };
            self.add_stream(stream_kind, "Loopback", Some(index), device);
        }
        Ok(index)
    }

    async fn unload_module(&self, index: u32) -> Result<()> {
        yield_now().await;
        if self.failing_unloads.borrow().contains(&index) {
            bail!("No such entity");
        }
        self.modules.borrow_mut().retain(|m| m.index != index);
        for records in self.streams.borrow_mut().values_mut() {
            records.retain(|s| s.owner_module != Some(index));
        }
        self.unloaded.borrow_mut().push(index);
        Ok(())
    }
}
