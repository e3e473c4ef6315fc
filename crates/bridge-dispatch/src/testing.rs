//! Test doubles shared by the gateway and scheduler tests.

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use bridge_core::{
    Connectivity, Credentials, MessageReceipt, OutboundContent, TransportClient, TransportError,
};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::RandomSource;

/// Connectivity flag flipped by tests.
pub struct StaticConnectivity(AtomicBool);

impl StaticConnectivity {
    pub fn new(connected: bool) -> Self {
        Self(AtomicBool::new(connected))
    }

    pub fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }
}

impl Connectivity for StaticConnectivity {
    fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One call recorded by `FakeTransport`.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub jid: String,
    pub content: OutboundContent,
    pub at: Instant,
}

/// Transport that records sends. Recipients starting with `bad` are rejected.
#[derive(Default)]
pub struct FakeTransport {
    pub sent: Mutex<Vec<SentMessage>>,
}

impl FakeTransport {
    pub fn jids(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.jid.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl TransportClient for FakeTransport {
    async fn connect(&self, _credentials: Option<Credentials>) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(
        &self,
        jid: &str,
        content: OutboundContent,
    ) -> Result<MessageReceipt, TransportError> {
        let mut sent = self.sent.lock();
        sent.push(SentMessage {
            jid: jid.to_string(),
            content,
            at: Instant::now(),
        });
        if jid.starts_with("bad") {
            return Err(TransportError::Rejected("number not on network".to_string()));
        }
        Ok(MessageReceipt {
            id: format!("msg-{}", sent.len()),
        })
    }
}

/// Random source replaying scripted picks and a fixed fraction for ranges.
pub struct ScriptedRandom {
    picks: VecDeque<usize>,
    fraction: f64,
}

impl ScriptedRandom {
    pub fn new(picks: impl IntoIterator<Item = usize>, fraction: f64) -> Self {
        Self {
            picks: picks.into_iter().collect(),
            fraction,
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn pick(&mut self, len: usize) -> usize {
        self.picks.pop_front().unwrap_or(0) % len
    }

    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        (high - low).mul_add(self.fraction, low)
    }
}
