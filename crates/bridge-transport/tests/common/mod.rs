//! Shared fixture: a full bridge stack over an in-memory transport.

#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bridge_core::{
    BroadcastHub, Credentials, MessageReceipt, OutboundContent, TransportClient, TransportError,
    TransportEvent,
};
use bridge_dispatch::{
    BulkScheduler, DispatchGateway, GatewayConfig, RngSource, SchedulerConfig,
};
use bridge_session::{SessionConfig, SessionController, storage::MemoryCredentialStore};
use bridge_transport::AppState;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Transport that accepts every send except recipients starting with `bad`.
#[derive(Default)]
pub struct LoopbackTransport {
    pub sent: Mutex<Vec<(String, OutboundContent)>>,
    pub disconnects: AtomicUsize,
}

#[async_trait]
impl TransportClient for LoopbackTransport {
    async fn connect(&self, _credentials: Option<Credentials>) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(
        &self,
        jid: &str,
        content: OutboundContent,
    ) -> Result<MessageReceipt, TransportError> {
        let mut sent = self.sent.lock();
        sent.push((jid.to_string(), content));
        if jid.starts_with("bad") {
            return Err(TransportError::Rejected("number not on network".to_string()));
        }
        Ok(MessageReceipt {
            id: format!("msg-{}", sent.len()),
        })
    }
}

pub struct Bridge {
    pub state: AppState,
    pub transport: Arc<LoopbackTransport>,
}

impl Bridge {
    pub fn new() -> Self {
        let transport = Arc::new(LoopbackTransport::default());
        let hub = Arc::new(BroadcastHub::default());
        let session = Arc::new(SessionController::new(
            transport.clone(),
            Arc::new(MemoryCredentialStore::new()),
            hub.clone(),
            SessionConfig::default(),
        ));
        let gateway = Arc::new(DispatchGateway::new(
            session.clone(),
            transport.clone(),
            GatewayConfig::default(),
        ));
        let scheduler = Arc::new(BulkScheduler::new(
            gateway.clone(),
            hub,
            Box::new(RngSource::seeded(7)),
            SchedulerConfig::default(),
            CancellationToken::new(),
        ));
        Self {
            state: AppState::new(session, gateway, scheduler),
            transport,
        }
    }

    /// Feed one lifecycle event through the session controller.
    pub async fn drive(&self, event: TransportEvent) {
        self.state.session.handle_event(event).await;
    }
}
