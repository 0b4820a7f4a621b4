//! The messaging fabric: publish/subscribe and request/reply between
//! subsystems.
//!
//! [`MessagingFabric`] is the trait boundary; [`InProcessFabric`] is the
//! only implementation shipped here (no external broker). Every subject is
//! fan-out: `subscribe` hands each caller its own `tokio::sync::mpsc`
//! receiver fed by a shared `tokio::sync::broadcast` bus. This crate does
//! not use the fabric for work handoff between router and worker — task
//! assignment is a durable row write (`agent_instances.current_task_id`)
//! under optimistic locking, not a queue-group subject, so there is no
//! exactly-one-consumer delivery mode here. The fabric is the channel for
//! events, heartbeats, and `HUMAN_APPROVAL` suspend/resume. A durable append
//! log lives in `conductor-db`'s `events` table and is written alongside
//! every publish so subscribers that were not listening yet can replay
//! history.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Duration, timeout};

/// A fan-out or queue-group messaging contract.
///
/// Object-safe: every method returns a concrete or boxed type, so
/// implementations can be stored as `Arc<dyn MessagingFabric>`.
#[async_trait]
pub trait MessagingFabric: Send + Sync {
    /// Publish a message to every current subscriber of `subject`.
    async fn publish(&self, subject: &str, payload: Value) -> Result<()>;

    /// Subscribe to `subject`, returning a receiver of future messages.
    /// Messages published before the subscription was registered are not
    /// delivered through this channel (use the durable event log for replay).
    async fn subscribe(&self, subject: &str) -> Result<Subscription>;

    /// Publish to `subject` and wait for exactly one reply on an
    /// ephemeral reply subject, up to `timeout_duration`.
    async fn request(
        &self,
        subject: &str,
        payload: Value,
        timeout_duration: Duration,
    ) -> Result<Value>;
}

/// A handle to an active subscription.
pub struct Subscription {
    receiver: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    /// Receive the next message, or `None` if the fabric dropped the
    /// subject (all publishers gone).
    pub async fn recv(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }
}

/// Envelope carried over a request's reply-subject channel.
struct PendingReply {
    reply_tx: oneshot::Sender<Value>,
}

/// The only `MessagingFabric` implementation in this crate: entirely
/// in-process, subjects keyed by string, no cross-process delivery.
#[derive(Default)]
pub struct InProcessFabric {
    subjects: Mutex<HashMap<String, broadcast::Sender<Value>>>,
    pending_replies: Mutex<HashMap<String, PendingReply>>,
}

impl InProcessFabric {
    pub fn new() -> Self {
        Self::default()
    }

    fn subject_sender(&self, subject: &str) -> broadcast::Sender<Value> {
        let mut subjects = self.subjects.lock().expect("subjects mutex poisoned");
        subjects
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(1024).0)
            .clone()
    }
}

#[async_trait]
impl MessagingFabric for InProcessFabric {
    async fn publish(&self, subject: &str, payload: Value) -> Result<()> {
        // If this is a reply to an in-flight request, resolve it directly
        // rather than going through the broadcast bus.
        if let Some(pending) = self
            .pending_replies
            .lock()
            .expect("pending_replies mutex poisoned")
            .remove(subject)
        {
            let _ = pending.reply_tx.send(payload);
            return Ok(());
        }

        let sender = self.subject_sender(subject);
        // A send with zero subscribers is not an error: the subject may
        // simply have no listeners yet.
        let _ = sender.send(payload);
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        let sender = self.subject_sender(subject);
        let mut broadcast_rx = sender.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(value) => {
                        if tx.send(value).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription { receiver: rx })
    }

    async fn request(
        &self,
        subject: &str,
        payload: Value,
        timeout_duration: Duration,
    ) -> Result<Value> {
        let reply_subject = format!("_reply.{}", uuid::Uuid::new_v4());
        let (reply_tx, reply_rx) = oneshot::channel();

        self.pending_replies
            .lock()
            .expect("pending_replies mutex poisoned")
            .insert(reply_subject.clone(), PendingReply { reply_tx });

        let envelope = serde_json::json!({ "reply_to": reply_subject, "payload": payload });
        self.publish(subject, envelope).await?;

        match timeout(timeout_duration, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => bail!("request to {subject} was dropped before a reply arrived"),
            Err(_) => {
                self.pending_replies
                    .lock()
                    .expect("pending_replies mutex poisoned")
                    .remove(&reply_subject);
                bail!("request to {subject} timed out after {timeout_duration:?}")
            }
        }
    }
}

/// Persist a domain event to the durable log, independent of whether any
/// in-process subscriber is listening. Callers typically do this
/// alongside (not instead of) a `publish` call.
pub async fn append_to_log(
    pool: &sqlx::PgPool,
    event: &crate::events::DomainEvent,
) -> Result<conductor_db::models::DomainEvent> {
    let new_event = conductor_db::queries::events::NewEvent {
        event_type: event.event_type,
        aggregate_id: event.aggregate_id,
        aggregate_type: event.aggregate_type.clone(),
        tenant_id: event.tenant_id.clone(),
        correlation_id: event.correlation_id,
        causation_id: event.causation_id,
        payload: event.payload.clone(),
        metadata: event.metadata.clone(),
    };
    conductor_db::queries::events::insert_event(pool, &new_event)
        .await
        .context("failed to append event to durable log")
}
