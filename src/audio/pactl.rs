//! PulseAudio backend driven through the `pactl` command line.
//!
//! Listings use `pactl --format=json`, so pactl 16 or newer is required.
//! Lookups by index are answered by listing and picking the index.

use std::process::Stdio;
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::watch;

use super::props::PropertySet;
use super::server::{
    AudioServer, ConnectionState, DeviceKind, DeviceRecord, Enumeration, ModuleRecord,
    StreamKind, StreamRecord,
};

/// pactl's marker for "no index".
const INVALID_INDEX: u64 = u32::MAX as u64;

#[derive(Debug, Clone)]
struct Pactl {
    program: String,
    server: Option<String>,
    client_name: String,
}

impl Pactl {
    /// 子进程执行（tokio::process，异步非阻塞）
    async fn run(&self, args: &[&str]) -> Result<String> {
        let mut command = Command::new(&self.program);
        command.arg(format!("--client-name={}", self.client_name));
        if let Some(server) = &self.server {
            command.arg(format!("--server={}", server));
        }
        log::debug!("Executing {} {}", self.program, args.join(" "));

        let output = command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.program))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let err_str = String::from_utf8_lossy(&output.stderr);
            bail!("{} {} failed: {}", self.program, args.join(" "), err_str.trim())
        }
    }

    async fn list<T: DeserializeOwned>(&self, what: &str) -> Result<Vec<T>> {
        let json = self.run(&["--format=json", "list", what]).await?;
        parse_listing(&json).with_context(|| format!("Failed to parse pactl {} listing", what))
    }

    async fn devices(&self, kind: DeviceKind) -> Result<Vec<DeviceRecord>> {
        let what = match kind {
            DeviceKind::Card => "cards",
            DeviceKind::Source => "sources",
            DeviceKind::Sink => "sinks",
        };
        let devices: Vec<PactlDevice> = self.list(what).await?;
        Ok(devices.into_iter().map(DeviceRecord::from).collect())
    }

    async fn streams(&self, kind: StreamKind) -> Result<Vec<StreamRecord>> {
        let what = match kind {
            StreamKind::SinkInput => "sink-inputs",
            StreamKind::SourceOutput => "source-outputs",
        };
        let streams: Vec<PactlStream> = self.list(what).await?;
        Ok(streams.into_iter().filter_map(PactlStream::into_record).collect())
    }
}

fn parse_listing<T: DeserializeOwned>(json: &str) -> Result<Vec<T>> {
    let json = json.trim();
    // pactl prints nothing at all for some empty listings.
    if json.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(json)?)
}

/// Accepts a number, a numeric string, an empty string or null.
fn optional_index<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let index = match &value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(index
        .filter(|&i| i < INVALID_INDEX)
        .map(|i| i as u32))
}

#[derive(Debug, Deserialize)]
struct PactlDevice {
    index: u32,
    name: String,
    #[serde(default)]
    properties: PropertySet,
}

impl From<PactlDevice> for DeviceRecord {
    fn from(device: PactlDevice) -> Self {
        DeviceRecord {
            index: device.index,
            name: device.name,
            properties: device.properties,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PactlStream {
    index: u32,
    #[serde(default, deserialize_with = "optional_index")]
    owner_module: Option<u32>,
    #[serde(default, deserialize_with = "optional_index")]
    sink: Option<u32>,
    #[serde(default, deserialize_with = "optional_index")]
    source: Option<u32>,
    #[serde(default)]
    properties: PropertySet,
}

impl PactlStream {
    fn into_record(self) -> Option<StreamRecord> {
        let Some(device) = self.sink.or(self.source) else {
            log::debug!("Stream {} is not attached to a device", self.index);
            return None;
        };
        let name = self
            .properties
            .get("media.name")
            .or_else(|| self.properties.get("application.name"))
            .unwrap_or_default()
            .to_string();
        Some(StreamRecord {
            index: self.index,
            name,
            owner_module: self.owner_module,
            device,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PactlModule {
    index: u32,
    name: String,
}

pub struct PactlServer {
    pactl: Rc<Pactl>,
    state: Rc<watch::Sender<ConnectionState>>,
}

impl PactlServer {
    pub fn new(program: &str, server: Option<&str>, client_name: &str) -> Self {
        let (state, _) = watch::channel(ConnectionState::Unconnected);
        Self {
            pactl: Rc::new(Pactl {
                program: program.to_string(),
                server: server.map(str::to_string),
                client_name: client_name.to_string(),
            }),
            state: Rc::new(state),
        }
    }

    fn enumerate<T, F, Fut>(&self, fetch: F) -> Enumeration<T>
    where
        T: 'static,
        F: FnOnce(Rc<Pactl>) -> Fut + 'static,
        Fut: std::future::Future<Output = Result<Vec<T>>> + 'static,
    {
        let (sender, enumeration) = Enumeration::channel();
        let pactl = self.pactl.clone();
        tokio::task::spawn_local(async move {
            sender.finish(fetch(pactl).await);
        });
        enumeration
    }
}

#[async_trait(?Send)]
impl AudioServer for PactlServer {
    fn connect(&self) -> Result<()> {
        self.state.send_replace(ConnectionState::Connecting);
        let pactl = self.pactl.clone();
        let state = self.state.clone();
        tokio::task::spawn_local(async move {
            state.send_replace(ConnectionState::Authorizing);
            match pactl.run(&["info"]).await {
                Ok(info) => {
                    state.send_replace(ConnectionState::SettingName);
                    if let Some(line) = info.lines().find(|l| l.starts_with("Server Name:")) {
                        log::info!("Connected to audio server ({})", line.trim());
                    }
                    state.send_replace(ConnectionState::Ready);
                }
                Err(e) => {
                    log::error!("{:#}", e);
                    state.send_replace(ConnectionState::Failed);
                }
            }
        });
        Ok(())
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn list_devices(&self, kind: DeviceKind) -> Enumeration<DeviceRecord> {
        self.enumerate(move |pactl| async move { pactl.devices(kind).await })
    }

    fn list_streams(&self, kind: StreamKind) -> Enumeration<StreamRecord> {
        self.enumerate(move |pactl| async move { pactl.streams(kind).await })
    }

    async fn device_by_index(&self, kind: DeviceKind, index: u32) -> Result<Option<DeviceRecord>> {
        let devices = self.pactl.devices(kind).await?;
        Ok(devices.into_iter().find(|d| d.index == index))
    }

    async fn module_by_index(&self, index: u32) -> Result<Option<ModuleRecord>> {
        let modules: Vec<PactlModule> = self.pactl.list("modules").await?;
        Ok(modules
            .into_iter()
            .find(|m| m.index == index)
            .map(|m| ModuleRecord { index: m.index, name: m.name }))
    }

    async fn load_module(&self, name: &str, args: &str) -> Result<u32> {
        let stdout = self.pactl.run(&["load-module", name, args]).await?;
        stdout
            .trim()
            .parse()
            .with_context(|| format!("Unexpected load-module output '{}'", stdout.trim()))
    }

    async fn unload_module(&self, index: u32) -> Result<()> {
        self.pactl.run(&["unload-module", &index.to_string()]).await?;
        Ok(())
    }
}
