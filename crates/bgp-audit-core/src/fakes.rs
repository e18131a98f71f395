//! In-memory remote client (testing only)
//!
//! `ScriptedClient` satisfies the [`RemoteClient`] contract without touching
//! the network. Each hostname gets a [`DeviceScript`] describing how connect,
//! fetch and close behave, with optional latency. The client records connect
//! attempts, executed commands, closes and peak session concurrency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Device, SessionError};
use crate::session::{RemoteClient, Session};

// ---------------------------------------------------------------------------
// DeviceScript
// ---------------------------------------------------------------------------

/// Scripted behaviour of one device.
#[derive(Debug, Clone)]
pub struct DeviceScript {
    pub connect: Result<(), SessionError>,
    pub connect_latency: Duration,
    pub output: Result<String, SessionError>,
    pub fetch_latency: Duration,
    pub close: Result<(), SessionError>,
    pub close_latency: Duration,
}

impl DeviceScript {
    /// A healthy device returning `text` for any command.
    pub fn config(text: impl Into<String>) -> Self {
        Self {
            connect: Ok(()),
            connect_latency: Duration::ZERO,
            output: Ok(text.into()),
            fetch_latency: Duration::ZERO,
            close: Ok(()),
            close_latency: Duration::ZERO,
        }
    }

    pub fn connect_error(err: SessionError) -> Self {
        Self {
            connect: Err(err),
            ..Self::config("")
        }
    }

    pub fn fetch_error(err: SessionError) -> Self {
        Self {
            output: Err(err),
            ..Self::config("")
        }
    }

    pub fn with_connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    pub fn with_fetch_latency(mut self, latency: Duration) -> Self {
        self.fetch_latency = latency;
        self
    }

    pub fn with_close_error(mut self, err: SessionError) -> Self {
        self.close = Err(err);
        self
    }

    pub fn with_close_latency(mut self, latency: Duration) -> Self {
        self.close_latency = latency;
        self
    }
}

// ---------------------------------------------------------------------------
// ScriptedClient
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Recorded {
    connect_attempts: HashMap<String, usize>,
    commands: HashMap<String, Vec<String>>,
    connect_order: Vec<String>,
    closed: usize,
}

#[derive(Debug, Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(self: &Arc<Self>) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(Arc::clone(self))
    }
}

/// Decrements the gauge when the session (or failed connect) goes away.
#[derive(Debug)]
struct GaugeGuard(Arc<Gauge>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory client driven by per-host scripts.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    scripts: HashMap<String, DeviceScript>,
    fallback: Option<DeviceScript>,
    recorded: Arc<Mutex<Recorded>>,
    gauge: Arc<Gauge>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, hostname: &str, script: DeviceScript) -> Self {
        self.scripts.insert(hostname.to_string(), script);
        self
    }

    /// Script used for hosts without their own entry.
    pub fn with_fallback(mut self, script: DeviceScript) -> Self {
        self.fallback = Some(script);
        self
    }

    pub fn connect_attempts(&self, hostname: &str) -> usize {
        let recorded = self.recorded.lock().unwrap();
        recorded.connect_attempts.get(hostname).copied().unwrap_or(0)
    }

    pub fn commands_for(&self, hostname: &str) -> Vec<String> {
        let recorded = self.recorded.lock().unwrap();
        recorded.commands.get(hostname).cloned().unwrap_or_default()
    }

    /// Hostnames in the order their first connect attempt started.
    pub fn connect_order(&self) -> Vec<String> {
        self.recorded.lock().unwrap().connect_order.clone()
    }

    pub fn closed_count(&self) -> usize {
        self.recorded.lock().unwrap().closed
    }

    /// Sessions (including in-progress connects) alive right now.
    pub fn in_flight(&self) -> usize {
        self.gauge.current.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously alive sessions observed.
    pub fn peak_in_flight(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteClient for ScriptedClient {
    async fn connect(&self, device: &Device) -> Result<Box<dyn Session>, SessionError> {
        let hostname = device.hostname.clone();
        {
            let mut recorded = self.recorded.lock().unwrap();
            let attempts = recorded
                .connect_attempts
                .entry(hostname.clone())
                .or_insert(0);
            *attempts += 1;
            if *attempts == 1 {
                recorded.connect_order.push(hostname.clone());
            }
        }

        let script = self
            .scripts
            .get(&hostname)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| SessionError::Transport(format!("unknown host {hostname}")))?;

        let guard = self.gauge.enter();
        tokio::time::sleep(script.connect_latency).await;
        script.connect.clone()?;

        Ok(Box::new(ScriptedSession {
            hostname,
            script,
            recorded: Arc::clone(&self.recorded),
            _guard: guard,
        }))
    }
}

struct ScriptedSession {
    hostname: String,
    script: DeviceScript,
    recorded: Arc<Mutex<Recorded>>,
    _guard: GaugeGuard,
}

#[async_trait]
impl Session for ScriptedSession {
    async fn execute(&mut self, command: &str) -> Result<String, SessionError> {
        self.recorded
            .lock()
            .unwrap()
            .commands
            .entry(self.hostname.clone())
            .or_default()
            .push(command.to_string());
        tokio::time::sleep(self.script.fetch_latency).await;
        self.script.output.clone()
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        tokio::time::sleep(self.script.close_latency).await;
        self.recorded.lock().unwrap().closed += 1;
        self.script.close.clone()
    }
}
