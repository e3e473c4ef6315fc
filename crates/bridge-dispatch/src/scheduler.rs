//! Paced bulk sending.

use std::{sync::Arc, time::Duration};

use bridge_core::{BridgeEvent, BroadcastHub, Contact, MessageTemplate};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{DispatchGateway, RandomSource, RatePolicy, RateWindow, policy::secs};

/// Default pause while the hourly cap is saturated.
pub const DEFAULT_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(60);

/// Bulk job error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Bulk job needs at least one message template")]
    NoTemplates,
    #[error("Invalid delay config: {0}")]
    InvalidPolicy(String),
    #[error("A bulk job is already running")]
    AlreadyRunning,
    #[error("Session is not connected")]
    NotConnected,
}

/// A validated bulk job.
#[derive(Debug, Clone)]
pub struct BulkJob {
    contacts: Vec<Contact>,
    templates: Vec<MessageTemplate>,
    policy: RatePolicy,
}

impl BulkJob {
    /// Validate and build a job.
    ///
    /// # Errors
    /// Returns error if there are no templates or the policy is invalid.
    pub fn new(
        contacts: Vec<Contact>,
        templates: Vec<MessageTemplate>,
        policy: RatePolicy,
    ) -> Result<Self, JobError> {
        if templates.is_empty() {
            return Err(JobError::NoTemplates);
        }
        policy.validate().map_err(JobError::InvalidPolicy)?;
        Ok(Self {
            contacts,
            templates,
            policy,
        })
    }

    /// Number of contacts.
    #[must_use]
    pub fn total(&self) -> usize {
        self.contacts.len()
    }
}

/// Final tally of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkSummary {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
    pub cancelled: bool,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Pause between re-checks while the hourly cap is saturated.
    pub rate_limit_pause: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rate_limit_pause: DEFAULT_RATE_LIMIT_PAUSE,
        }
    }
}

/// Runs bulk jobs one at a time.
///
/// Contacts are sent strictly in order with a single send in flight.
/// Every wait is cancellable, through `cancel` or the shutdown token.
pub struct BulkScheduler {
    gateway: Arc<DispatchGateway>,
    hub: Arc<BroadcastHub>,
    random: Mutex<Box<dyn RandomSource>>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
    active: Mutex<Option<CancellationToken>>,
}

/// Clears the active slot when a job task ends, however it ends.
struct ActiveJob(Arc<BulkScheduler>);

impl Drop for ActiveJob {
    fn drop(&mut self) {
        *self.0.active.lock() = None;
    }
}

impl BulkScheduler {
    /// Create a scheduler. Jobs stop when `shutdown` is cancelled.
    #[must_use]
    pub fn new(
        gateway: Arc<DispatchGateway>,
        hub: Arc<BroadcastHub>,
        random: Box<dyn RandomSource>,
        config: SchedulerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            hub,
            random: Mutex::new(random),
            config,
            shutdown,
            active: Mutex::new(None),
        }
    }

    /// Start a job in the background.
    ///
    /// # Errors
    /// `NotConnected` if the session is down, `AlreadyRunning` if another
    /// job holds the slot.
    pub fn start(self: &Arc<Self>, job: BulkJob) -> Result<JoinHandle<BulkSummary>, JobError> {
        if !self.gateway.is_connected() {
            return Err(JobError::NotConnected);
        }

        let cancel = {
            let mut active = self.active.lock();
            if active.is_some() {
                return Err(JobError::AlreadyRunning);
            }
            let token = self.shutdown.child_token();
            *active = Some(token.clone());
            token
        };

        let scheduler = Arc::clone(self);
        let guard = ActiveJob(Arc::clone(self));
        Ok(tokio::spawn(async move {
            let summary = scheduler.run(job, cancel).await;
            // Free the slot before the final event, so a client reacting
            // to it can start the next job.
            drop(guard);
            scheduler.report(&summary);
            summary
        }))
    }

    /// Cancel the active job. Returns `false` if none is running.
    pub fn cancel(&self) -> bool {
        self.active.lock().as_ref().is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// Whether a job is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    async fn run(&self, job: BulkJob, cancel: CancellationToken) -> BulkSummary {
        let BulkJob {
            contacts,
            templates,
            policy,
        } = job;
        let mut summary = BulkSummary {
            sent: 0,
            failed: 0,
            total: contacts.len(),
            cancelled: false,
        };
        tracing::info!(
            total = summary.total,
            templates = templates.len(),
            messages_per_hour = policy.messages_per_hour,
            "bulk job started"
        );

        if !pause(&cancel, policy.initial_delay()).await {
            return cancelled(summary);
        }

        let mut window = RateWindow::new(policy.messages_per_hour, Instant::now());
        for (index, contact) in contacts.iter().enumerate() {
            while window.is_saturated(Instant::now()) {
                tracing::info!(
                    sent = summary.sent,
                    messages_per_hour = policy.messages_per_hour,
                    "hourly cap reached, pausing"
                );
                if !pause(&cancel, self.config.rate_limit_pause).await {
                    return cancelled(summary);
                }
            }

            let pick = self.random.lock().pick(templates.len()) % templates.len();
            let request = templates[pick].request_for(contact);

            match self.gateway.send(&request).await {
                Ok(_) => {
                    window.record(Instant::now());
                    summary.sent += 1;
                    self.hub.publish(&BridgeEvent::BulkProgress {
                        sent: summary.sent,
                        total: summary.total,
                        current_contact: contact.clone(),
                    });
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(phone = %contact.phone, "Bulk send failed: {e}");
                    self.hub.publish(&BridgeEvent::BulkError {
                        contact: contact.clone(),
                        error: e.to_string(),
                    });
                }
            }

            if index + 1 < summary.total {
                let delay = self.next_delay(&policy);
                tracing::debug!(delay_secs = delay.as_secs_f64(), "waiting before next send");
                if !pause(&cancel, delay).await {
                    return cancelled(summary);
                }
            }
        }

        summary
    }

    fn next_delay(&self, policy: &RatePolicy) -> Duration {
        let mut random = self.random.lock();
        let base = random.uniform(policy.min_interval_secs, policy.max_interval_secs);
        let extra = random.uniform(0.0, policy.random_extra_secs);
        secs(base + extra)
    }

    fn report(&self, summary: &BulkSummary) {
        let event = if summary.cancelled {
            tracing::info!(sent = summary.sent, total = summary.total, "bulk job cancelled");
            BridgeEvent::BulkCancelled {
                sent: summary.sent,
                total: summary.total,
            }
        } else {
            tracing::info!(
                sent = summary.sent,
                failed = summary.failed,
                total = summary.total,
                "bulk job complete"
            );
            BridgeEvent::BulkComplete {
                sent: summary.sent,
                total: summary.total,
            }
        };
        self.hub.publish(&event);
    }
}

const fn cancelled(mut summary: BulkSummary) -> BulkSummary {
    summary.cancelled = true;
    summary
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use bridge_core::{Attachment, OutboundContent, SessionState};
    use serde_json::Value;
    use tokio::sync::mpsc::Receiver;

    use super::*;
    use crate::{
        GatewayConfig,
        testing::{FakeTransport, ScriptedRandom, StaticConnectivity},
    };

    struct Harness {
        scheduler: Arc<BulkScheduler>,
        transport: Arc<FakeTransport>,
        session: Arc<StaticConnectivity>,
        events: Receiver<Arc<str>>,
    }

    fn harness(random: Box<dyn RandomSource>) -> Harness {
        let transport = Arc::new(FakeTransport::default());
        let session = Arc::new(StaticConnectivity::new(true));
        let gateway = Arc::new(DispatchGateway::new(
            session.clone(),
            transport.clone(),
            GatewayConfig::default(),
        ));
        let hub = Arc::new(BroadcastHub::default());
        let (_id, mut events) = hub.subscribe(&SessionState::Connected);
        events.try_recv().unwrap();
        let scheduler = Arc::new(BulkScheduler::new(
            gateway,
            hub,
            random,
            SchedulerConfig::default(),
            CancellationToken::new(),
        ));
        Harness {
            scheduler,
            transport,
            session,
            events,
        }
    }

    fn steady(fraction: f64) -> Box<dyn RandomSource> {
        Box::new(ScriptedRandom::new(Vec::<usize>::new(), fraction))
    }

    fn zero_policy(messages_per_hour: u32) -> RatePolicy {
        RatePolicy {
            initial_delay_secs: 0.0,
            min_interval_secs: 0.0,
            max_interval_secs: 0.0,
            random_extra_secs: 0.0,
            messages_per_hour,
        }
    }

    fn contacts(phones: &[&str]) -> Vec<Contact> {
        phones.iter().map(|p| Contact::new(*p)).collect()
    }

    fn drain(rx: &mut Receiver<Arc<str>>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_contacts_progress_then_complete() {
        let mut h = harness(steady(0.0));
        let job = BulkJob::new(
            contacts(&["A", "B"]),
            vec![MessageTemplate::text("hi")],
            zero_policy(100),
        )
        .unwrap();

        let summary = h.scheduler.start(job).unwrap().await.unwrap();
        assert_eq!(
            summary,
            BulkSummary {
                sent: 2,
                failed: 0,
                total: 2,
                cancelled: false,
            }
        );

        let events = drain(&mut h.events);
        let kinds: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, ["bulk_progress", "bulk_progress", "bulk_complete"]);
        assert_eq!(events[0]["currentContact"]["phone"], "A");
        assert_eq!(events[0]["sent"], 1);
        assert_eq!(events[1]["currentContact"]["phone"], "B");
        assert_eq!(events[1]["sent"], 2);
        assert_eq!(events[2]["sent"], 2);
        assert_eq!(events[2]["total"], 2);
        assert_eq!(
            h.transport.jids(),
            ["A@s.whatsapp.net", "B@s.whatsapp.net"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_item_does_not_stop_job() {
        let mut h = harness(steady(0.0));
        let job = BulkJob::new(
            contacts(&["1", "bad", "3"]),
            vec![MessageTemplate::text("hi")],
            zero_policy(100),
        )
        .unwrap();

        let summary = h.scheduler.start(job).unwrap().await.unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.failed, 1);

        let events = drain(&mut h.events);
        let kinds: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(
            kinds,
            ["bulk_progress", "bulk_error", "bulk_progress", "bulk_complete"]
        );
        assert_eq!(events[1]["contact"]["phone"], "bad");
        assert!(events[1]["error"].as_str().unwrap().contains("not on network"));
        for event in &events {
            if event["type"] == "bulk_progress" {
                assert!(event["sent"].as_u64() <= event["total"].as_u64());
            }
        }
        assert_eq!(events[3]["sent"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_job_reports_errors() {
        let mut h = harness(steady(0.0));
        let policy = RatePolicy {
            min_interval_secs: 10.0,
            max_interval_secs: 10.0,
            ..zero_policy(100)
        };
        let job = BulkJob::new(contacts(&["1", "2"]), vec![MessageTemplate::text("x")], policy)
            .unwrap();

        let handle = h.scheduler.start(job).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        h.session.set(false);
        let summary = handle.await.unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 1);
        let events = drain(&mut h.events);
        assert_eq!(events[1]["type"], "bulk_error");
        assert_eq!(events[1]["error"], "Session is not connected");
        assert_eq!(h.transport.count(), 1);
    }

    #[tokio::test]
    async fn test_refuses_to_start_when_disconnected() {
        let h = harness(steady(0.0));
        h.session.set(false);
        let job = BulkJob::new(contacts(&["1"]), vec![MessageTemplate::text("x")], zero_policy(1))
            .unwrap();

        assert_eq!(h.scheduler.start(job).unwrap_err(), JobError::NotConnected);
        assert!(!h.scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_active_job() {
        let h = harness(steady(0.0));
        let slow = RatePolicy {
            initial_delay_secs: 30.0,
            ..zero_policy(10)
        };
        let first = BulkJob::new(contacts(&["1"]), vec![MessageTemplate::text("x")], slow).unwrap();
        let second =
            BulkJob::new(contacts(&["2"]), vec![MessageTemplate::text("y")], zero_policy(10))
                .unwrap();

        let handle = h.scheduler.start(first).unwrap();
        assert!(h.scheduler.is_running());
        assert_eq!(
            h.scheduler.start(second.clone()).unwrap_err(),
            JobError::AlreadyRunning
        );

        handle.await.unwrap();
        assert!(!h.scheduler.is_running());
        h.scheduler.start(second).unwrap().await.unwrap();
        assert_eq!(h.transport.jids(), ["1@s.whatsapp.net", "2@s.whatsapp.net"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_next_job_accepted_once_completion_is_seen() {
        let mut h = harness(steady(0.0));
        let first = BulkJob::new(contacts(&["1"]), vec![MessageTemplate::text("x")], zero_policy(10))
            .unwrap();
        let handle = h.scheduler.start(first).unwrap();

        loop {
            let frame = h.events.recv().await.unwrap();
            let event: Value = serde_json::from_str(&frame).unwrap();
            if event["type"] == "bulk_complete" {
                break;
            }
        }
        assert!(!h.scheduler.is_running());
        let second = BulkJob::new(contacts(&["2"]), vec![MessageTemplate::text("y")], zero_policy(10))
            .unwrap();
        let next = h.scheduler.start(second).unwrap();

        handle.await.unwrap();
        next.await.unwrap();
        assert_eq!(h.transport.jids(), ["1@s.whatsapp.net", "2@s.whatsapp.net"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_follows_policy() {
        let h = harness(steady(0.5));
        let policy = RatePolicy {
            initial_delay_secs: 10.0,
            min_interval_secs: 4.0,
            max_interval_secs: 8.0,
            random_extra_secs: 2.0,
            messages_per_hour: 100,
        };
        let job = BulkJob::new(contacts(&["1", "2", "3"]), vec![MessageTemplate::text("x")], policy)
            .unwrap();

        let started = Instant::now();
        h.scheduler.start(job).unwrap().await.unwrap();

        // Each gap is 6s base (midpoint of 4..8) plus 1s extra (midpoint of 0..2).
        let offsets: Vec<u64> = h
            .transport
            .sent
            .lock()
            .iter()
            .map(|m| (m.at - started).as_secs())
            .collect();
        assert_eq!(offsets, [10, 17, 24]);
        // No trailing delay after the last contact.
        assert_eq!((Instant::now() - started).as_secs(), 24);
    }

    #[tokio::test(start_paused = true)]
    async fn test_template_chosen_by_random_source() {
        let h = harness(Box::new(ScriptedRandom::new([1, 0, 1], 0.0)));
        let templates = vec![
            MessageTemplate::text("first"),
            MessageTemplate {
                text: "caption".to_string(),
                attachment: Some(Attachment::Image {
                    url: "https://x/i.png".to_string(),
                }),
            },
        ];
        let job = BulkJob::new(contacts(&["1", "2", "3"]), templates, zero_policy(100)).unwrap();
        h.scheduler.start(job).unwrap().await.unwrap();

        let contents: Vec<OutboundContent> =
            h.transport.sent.lock().iter().map(|m| m.content.clone()).collect();
        assert!(matches!(contents[0], OutboundContent::Image { .. }));
        assert_eq!(
            contents[1],
            OutboundContent::Text {
                text: "first".to_string()
            }
        );
        assert!(matches!(contents[2], OutboundContent::Image { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hourly_cap_holds_in_every_rolling_hour() {
        let h = harness(steady(0.0));
        let phones: Vec<String> = (0..7).map(|i| i.to_string()).collect();
        let phones: Vec<&str> = phones.iter().map(String::as_str).collect();
        let job = BulkJob::new(contacts(&phones), vec![MessageTemplate::text("x")], zero_policy(3))
            .unwrap();

        let summary = h.scheduler.start(job).unwrap().await.unwrap();
        assert_eq!(summary.sent, 7);

        let times: Vec<Instant> = h.transport.sent.lock().iter().map(|m| m.at).collect();
        for (i, start) in times.iter().enumerate() {
            let in_hour = times[i..]
                .iter()
                .filter(|t| t.duration_since(*start) < Duration::from_secs(3600))
                .count();
            assert!(in_hour <= 3, "{in_hour} sends within an hour of send {i}");
        }
        // The cap engaged: the job could not finish inside one hour.
        assert!(times[6].duration_since(times[0]) >= Duration::from_secs(7200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_at_next_wait() {
        let mut h = harness(steady(0.0));
        let policy = RatePolicy {
            min_interval_secs: 60.0,
            max_interval_secs: 60.0,
            ..zero_policy(100)
        };
        let job = BulkJob::new(
            contacts(&["1", "2", "3"]),
            vec![MessageTemplate::text("x")],
            policy,
        )
        .unwrap();

        let handle = h.scheduler.start(job).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(h.scheduler.cancel());
        let summary = handle.await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.sent, 1);
        assert!(!h.scheduler.is_running());
        assert!(!h.scheduler.cancel());

        let events = drain(&mut h.events);
        let last = events.last().unwrap();
        assert_eq!(last["type"], "bulk_cancelled");
        assert_eq!(last["sent"], 1);
        assert_eq!(last["total"], 3);
    }

    #[test]
    fn test_job_validation() {
        assert_eq!(
            BulkJob::new(contacts(&["1"]), vec![], zero_policy(1)).unwrap_err(),
            JobError::NoTemplates
        );
        assert!(matches!(
            BulkJob::new(contacts(&["1"]), vec![MessageTemplate::text("x")], zero_policy(0)),
            Err(JobError::InvalidPolicy(_))
        ));
    }
}
