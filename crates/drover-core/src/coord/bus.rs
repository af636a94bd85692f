//! Message bus: one bounded mailbox per agent plus a bounded history.
//!
//! - Sending to a full mailbox suspends the sender until the recipient drains
//!   a slot. Messages are never dropped for a registered recipient.
//! - Messages for an agent with no mailbox are recorded in history only.
//! - History keeps the most recent `history_capacity` messages (drop-oldest).
//! - Every message is also fanned out to `subscribe()` observers. Slow
//!   observers lag and lose messages; mailboxes never do.

use std::collections::{HashMap, VecDeque};

use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, trace};

use crate::domain::{AgentId, Message, MessageBody, Resource};

pub struct MessageBus {
    mailboxes: Mutex<HashMap<AgentId, mpsc::Sender<Message>>>,
    history: Mutex<VecDeque<Message>>,
    tap: broadcast::Sender<Message>,
    queue_capacity: usize,
    history_capacity: usize,
}

/// Receiving end of an agent's mailbox.
pub struct Mailbox {
    agent: AgentId,
    rx: mpsc::Receiver<Message>,
}

impl MessageBus {
    pub fn new(queue_capacity: usize, history_capacity: usize) -> Self {
        let queue_capacity = queue_capacity.max(1);
        let history_capacity = history_capacity.max(1);
        let (tap, _) = broadcast::channel(history_capacity);
        Self {
            mailboxes: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            tap,
            queue_capacity,
            history_capacity,
        }
    }

    /// Open a mailbox for `agent`, replacing any previous one.
    pub async fn register(&self, agent: AgentId) -> Mailbox {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let replaced = self.mailboxes.lock().await.insert(agent.clone(), tx);
        debug!(agent_id = %agent, replaced = replaced.is_some(), "mailbox registered");
        Mailbox { agent, rx }
    }

    pub async fn unregister(&self, agent: &AgentId) {
        if self.mailboxes.lock().await.remove(agent).is_some() {
            debug!(agent_id = %agent, "mailbox unregistered");
        }
    }

    /// Record and deliver `message`. Suspends while the recipient's mailbox is full.
    pub async fn send(&self, message: Message) {
        trace!(from = %message.from, to = %message.to, kind = message.kind(), "bus send");
        {
            let mut history = self.history.lock().await;
            if history.len() == self.history_capacity {
                history.pop_front();
            }
            history.push_back(message.clone());
        }
        // No observers is fine.
        let _ = self.tap.send(message.clone());

        let sender = self.mailboxes.lock().await.get(&message.to).cloned();
        let Some(sender) = sender else {
            return;
        };
        let to = message.to.clone();
        if sender.send(message).await.is_err() {
            debug!(agent_id = %to, "mailbox closed before delivery");
        }
    }

    /// Most recent messages, oldest first.
    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.iter().cloned().collect()
    }

    /// The last `n` messages, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<Message> {
        let history = self.history.lock().await;
        let skip = history.len().saturating_sub(n);
        history.iter().skip(skip).cloned().collect()
    }

    /// Live feed of every message sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tap.subscribe()
    }
}

impl Mailbox {
    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    /// `None` once the mailbox has been replaced or unregistered and drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next `ResourcePreempted` addressed here, skipping other kinds.
    pub async fn next_preemption(&mut self) -> Option<Resource> {
        while let Some(message) = self.rx.recv().await {
            match message.body {
                MessageBody::ResourcePreempted { resource, reason } => {
                    debug!(agent_id = %self.agent, %resource, %reason, "preemption received");
                    return Some(resource);
                }
                _ => trace!(agent_id = %self.agent, kind = message.kind(), "ignored while running"),
            }
        }
        None
    }
}
