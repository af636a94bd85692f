//! Priority leases over device resources.
//!
//! All decisions (grant, preempt, enqueue, hand-off) happen on `LeaseTable`
//! under one lock, so the table never shows two live leases for the same
//! resource. Side effects that may suspend (bus notification, checkpoint)
//! run after the lock is dropped.
//!
//! Wait queues are max-heaps keyed by (priority, arrival): higher priority
//! first, FIFO among equals. Each waiter parks on its own one-slot channel.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use super::bus::MessageBus;
use crate::domain::{AgentId, Message, MessageBody, Resource, ResourceLease, ResourceRequest};
use crate::ports::{Clock, StateStore};

pub struct ResourceManager {
    table: Mutex<LeaseTable>,
    bus: Arc<MessageBus>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    /// Lease length for grants handed to waiters on release.
    default_lease: Duration,
}

impl ResourceManager {
    pub fn new(
        bus: Arc<MessageBus>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        default_lease: Duration,
    ) -> Self {
        Self {
            table: Mutex::new(LeaseTable::default()),
            bus,
            store,
            clock,
            default_lease,
        }
    }

    /// Claim `resource` for `requester`, waiting up to `timeout` if it is held
    /// by someone of equal or higher priority. `None` means the wait timed out.
    ///
    /// A strictly higher priority revokes the current lease on the spot; the
    /// previous owner gets a `ResourcePreempted` message and a checkpoint.
    pub async fn acquire(
        &self,
        resource: Resource,
        requester: &AgentId,
        priority: i32,
        timeout: Duration,
    ) -> Option<ResourceLease> {
        let claim = {
            let mut table = self.table.lock().await;
            table.claim(
                ResourceRequest {
                    resource: resource.clone(),
                    requester: requester.clone(),
                    priority,
                },
                self.clock.now(),
                timeout,
            )
        };

        match claim {
            Claim::Granted(lease) => {
                debug!(%resource, owner = %requester, priority, "lease granted");
                Some(lease)
            }
            Claim::Preempted { lease, victim } => {
                info!(
                    %resource,
                    owner = %requester,
                    previous_owner = %victim.owner,
                    priority,
                    previous_priority = victim.priority,
                    "lease preempted"
                );
                self.notify_preempted(&victim, requester).await;
                Some(lease)
            }
            Claim::Queued { seq, mut grant } => {
                debug!(%resource, requester = %requester, priority, "waiting for lease");
                match tokio::time::timeout(timeout, &mut grant).await {
                    Ok(Ok(lease)) => {
                        debug!(%resource, owner = %requester, "lease handed off");
                        Some(lease)
                    }
                    Ok(Err(_)) => None,
                    Err(_) => {
                        let mut table = self.table.lock().await;
                        if table.withdraw(&resource, seq) {
                            warn!(%resource, requester = %requester, ?timeout, "lease wait timed out");
                            None
                        } else {
                            // Handed off after the deadline but before we got the lock.
                            grant.try_recv().ok()
                        }
                    }
                }
            }
        }
    }

    /// Release `resource` if `owner` holds it and hand it to the best waiter.
    /// Returns false (and does nothing) for a non-owner.
    pub async fn release(&self, resource: &Resource, owner: &AgentId) -> bool {
        let mut table = self.table.lock().await;
        let released = table.release(resource, owner, self.clock.now(), self.default_lease);
        if released {
            debug!(%resource, owner = %owner, "lease released");
        }
        released
    }

    pub async fn current_leases(&self) -> Vec<ResourceLease> {
        let table = self.table.lock().await;
        let mut leases: Vec<ResourceLease> = table.leases.values().cloned().collect();
        leases.sort_by_key(|lease| lease.resource.to_string());
        leases
    }

    pub async fn holder(&self, resource: &Resource) -> Option<AgentId> {
        self.table
            .lock()
            .await
            .leases
            .get(resource)
            .map(|lease| lease.owner.clone())
    }

    /// Number of requests parked on `resource`.
    pub async fn waiting(&self, resource: &Resource) -> usize {
        self.table
            .lock()
            .await
            .waiters
            .get(resource)
            .map_or(0, BinaryHeap::len)
    }

    async fn notify_preempted(&self, victim: &ResourceLease, requester: &AgentId) {
        self.bus
            .send(Message::new(
                AgentId::resource_manager(),
                victim.owner.clone(),
                MessageBody::ResourcePreempted {
                    resource: victim.resource.clone(),
                    reason: format!("Higher priority task: {requester}"),
                },
            ))
            .await;

        let state = self
            .store
            .checkpoint(&victim.owner, vec![victim.resource.clone()])
            .await;
        self.bus
            .send(Message::new(
                AgentId::resource_manager(),
                AgentId::orchestrator(),
                MessageBody::StateCheckpoint {
                    state: Box::new(state),
                },
            ))
            .await;
    }
}

enum Claim {
    Granted(ResourceLease),
    Preempted {
        lease: ResourceLease,
        victim: ResourceLease,
    },
    Queued {
        seq: u64,
        grant: oneshot::Receiver<ResourceLease>,
    },
}

struct Waiter {
    request: ResourceRequest,
    seq: u64,
    grant: oneshot::Sender<ResourceLease>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier arrival.
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct LeaseTable {
    leases: HashMap<Resource, ResourceLease>,
    waiters: HashMap<Resource, BinaryHeap<Waiter>>,
    next_seq: u64,
}

impl LeaseTable {
    fn claim(&mut self, request: ResourceRequest, now: DateTime<Utc>, lease_for: Duration) -> Claim {
        let current = self
            .leases
            .get(&request.resource)
            .map(|lease| (lease.owner == request.requester, lease.priority));

        match current {
            None | Some((true, _)) => {
                let lease = new_lease(&request, now, lease_for);
                self.leases.insert(request.resource.clone(), lease.clone());
                Claim::Granted(lease)
            }
            Some((false, held)) if request.priority > held => {
                let lease = new_lease(&request, now, lease_for);
                let victim = self
                    .leases
                    .insert(request.resource.clone(), lease.clone())
                    .unwrap_or_else(|| lease.clone());
                Claim::Preempted { lease, victim }
            }
            Some((false, _)) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                let (tx, rx) = oneshot::channel();
                self.waiters
                    .entry(request.resource.clone())
                    .or_default()
                    .push(Waiter {
                        request,
                        seq,
                        grant: tx,
                    });
                Claim::Queued { seq, grant: rx }
            }
        }
    }

    fn release(
        &mut self,
        resource: &Resource,
        owner: &AgentId,
        now: DateTime<Utc>,
        lease_for: Duration,
    ) -> bool {
        match self.leases.get(resource) {
            Some(lease) if &lease.owner == owner => {}
            _ => return false,
        }
        self.leases.remove(resource);
        self.hand_off(resource, now, lease_for);
        true
    }

    /// Grant the free `resource` to the best live waiter, skipping abandoned ones.
    fn hand_off(&mut self, resource: &Resource, now: DateTime<Utc>, lease_for: Duration) {
        let Some(queue) = self.waiters.get_mut(resource) else {
            return;
        };
        while let Some(waiter) = queue.pop() {
            let lease = new_lease(&waiter.request, now, lease_for);
            match waiter.grant.send(lease.clone()) {
                Ok(()) => {
                    self.leases.insert(resource.clone(), lease);
                    break;
                }
                Err(_) => debug!(%resource, requester = %waiter.request.requester, "waiter gone"),
            }
        }
        if queue.is_empty() {
            self.waiters.remove(resource);
        }
    }

    /// Drop a parked request. False if it was already handed a lease.
    fn withdraw(&mut self, resource: &Resource, seq: u64) -> bool {
        let Some(queue) = self.waiters.get_mut(resource) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|waiter| waiter.seq != seq);
        let removed = queue.len() < before;
        if queue.is_empty() {
            self.waiters.remove(resource);
        }
        removed
    }
}

fn new_lease(request: &ResourceRequest, now: DateTime<Utc>, lease_for: Duration) -> ResourceLease {
    let length = chrono::Duration::from_std(lease_for).unwrap_or(chrono::Duration::MAX);
    ResourceLease {
        resource: request.resource.clone(),
        owner: request.requester.clone(),
        acquired_at: now,
        expires_at: now.checked_add_signed(length).unwrap_or(DateTime::<Utc>::MAX_UTC),
        priority: request.priority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryStateStore;
    use crate::ports::SystemClock;

    const LONG: Duration = Duration::from_secs(30);

    fn manager() -> (ResourceManager, Arc<MessageBus>, Arc<InMemoryStateStore>) {
        let bus = Arc::new(MessageBus::new(8, 64));
        let store = Arc::new(InMemoryStateStore::new(100));
        let manager = ResourceManager::new(bus.clone(), store.clone(), Arc::new(SystemClock), LONG);
        (manager, bus, store)
    }

    fn request(resource: Resource, requester: &str, priority: i32) -> ResourceRequest {
        ResourceRequest {
            resource,
            requester: AgentId::new(requester),
            priority,
        }
    }

    fn queued(claim: Claim) -> oneshot::Receiver<ResourceLease> {
        match claim {
            Claim::Queued { grant, .. } => grant,
            _ => panic!("expected the request to be queued"),
        }
    }

    #[tokio::test]
    async fn free_resource_is_granted_immediately() {
        let (manager, _, _) = manager();
        let owner = AgentId::new("SYSTEM_a");

        let lease = manager.acquire(Resource::screen(), &owner, 1, LONG).await.unwrap();
        assert_eq!(lease.owner, owner);
        assert!(lease.expires_at > lease.acquired_at);
        assert_eq!(manager.holder(&Resource::screen()).await, Some(owner));
    }

    #[tokio::test]
    async fn owner_can_reacquire_without_waiting() {
        let (manager, _, _) = manager();
        let owner = AgentId::new("SYSTEM_a");

        manager.acquire(Resource::screen(), &owner, 1, LONG).await.unwrap();
        let again = manager.acquire(Resource::screen(), &owner, 4, LONG).await.unwrap();
        assert_eq!(again.priority, 4);
        assert_eq!(manager.current_leases().await.len(), 1);
    }

    #[tokio::test]
    async fn higher_priority_preempts_and_notifies_holder() {
        let (manager, bus, store) = manager();
        let low = AgentId::new("MEDIA_video");
        let high = AgentId::new("SYSTEM_settings");
        let mut inbox = bus.register(low.clone()).await;

        manager.acquire(Resource::Screen { exclusive: false }, &low, 1, LONG).await.unwrap();
        let lease = manager.acquire(Resource::screen(), &high, 5, LONG).await.unwrap();

        assert_eq!(lease.owner, high);
        assert_eq!(manager.holder(&Resource::screen()).await, Some(high));
        assert_eq!(manager.current_leases().await.len(), 1);

        let notice = inbox.try_recv().expect("holder is told about the preemption");
        assert!(matches!(
            notice.body,
            MessageBody::ResourcePreempted { ref reason, .. } if reason == "Higher priority task: SYSTEM_settings"
        ));

        let checkpoint = store.restore_state(&low).await.expect("victim is checkpointed");
        assert_eq!(checkpoint.resources_held, vec![Resource::screen()]);
    }

    #[tokio::test]
    async fn release_hands_off_to_waiter() {
        let (manager, _, _) = manager();
        let manager = Arc::new(manager);
        let first = AgentId::new("SYSTEM_a");
        let second = AgentId::new("SYSTEM_b");

        manager.acquire(Resource::screen(), &first, 3, LONG).await.unwrap();

        let waiter = {
            let manager = manager.clone();
            let second = second.clone();
            tokio::spawn(async move { manager.acquire(Resource::screen(), &second, 3, LONG).await })
        };
        while manager.waiting(&Resource::screen()).await == 0 {
            tokio::task::yield_now().await;
        }

        assert!(manager.release(&Resource::screen(), &first).await);
        let lease = waiter.await.unwrap().expect("waiter gets the lease");
        assert_eq!(lease.owner, second);
        assert_eq!(manager.holder(&Resource::screen()).await, Some(second));
    }

    #[tokio::test]
    async fn release_by_non_owner_is_ignored() {
        let (manager, _, _) = manager();
        let owner = AgentId::new("SYSTEM_a");
        manager.acquire(Resource::screen(), &owner, 1, LONG).await.unwrap();

        assert!(!manager.release(&Resource::screen(), &AgentId::new("intruder")).await);
        assert_eq!(manager.holder(&Resource::screen()).await, Some(owner));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_screen_claims_never_overlap() {
        use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

        let (manager, _, _) = manager();
        let manager = Arc::new(manager);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut claims = tokio::task::JoinSet::new();
        for i in 0..40 {
            let manager = manager.clone();
            let active = active.clone();
            let peak = peak.clone();
            claims.spawn(async move {
                let agent = AgentId::new(format!("SYSTEM_{i}"));
                // Both flavours of the screen are the same resource.
                let screen = Resource::Screen {
                    exclusive: i % 2 == 0,
                };
                let lease = manager.acquire(screen.clone(), &agent, 1, LONG).await?;
                let now = active.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                peak.fetch_max(now, AtomicOrdering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                active.fetch_sub(1, AtomicOrdering::SeqCst);
                manager.release(&screen, &agent).await;
                Some(lease)
            });
        }

        let mut granted = 0;
        while let Some(joined) = claims.join_next().await {
            if joined.unwrap().is_some() {
                granted += 1;
            }
        }
        assert_eq!(granted, 40);
        assert_eq!(peak.load(AtomicOrdering::SeqCst), 1);
        assert!(manager.current_leases().await.is_empty());
        assert_eq!(manager.waiting(&Resource::screen()).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_and_leaves_the_queue() {
        let (manager, _, _) = manager();
        manager
            .acquire(Resource::app("com.whatsapp"), &AgentId::new("SOCIAL_a"), 5, LONG)
            .await
            .unwrap();

        let lease = manager
            .acquire(
                Resource::app("com.whatsapp"),
                &AgentId::new("SOCIAL_b"),
                5,
                Duration::from_millis(200),
            )
            .await;
        assert!(lease.is_none());
        assert_eq!(manager.waiting(&Resource::app("com.whatsapp")).await, 0);
    }

    #[test]
    fn waiters_are_served_by_priority_then_arrival() {
        let now = Utc::now();
        let mut table = LeaseTable::default();
        let screen = Resource::screen();

        assert!(matches!(
            table.claim(request(screen.clone(), "holder", 9), now, LONG),
            Claim::Granted(_)
        ));
        let mut early_low = queued(table.claim(request(screen.clone(), "early_low", 1), now, LONG));
        let mut mid = queued(table.claim(request(screen.clone(), "mid", 3), now, LONG));
        let mut late_low = queued(table.claim(request(screen.clone(), "late_low", 1), now, LONG));

        assert!(table.release(&screen, &AgentId::new("holder"), now, LONG));
        assert_eq!(mid.try_recv().unwrap().owner.as_str(), "mid");
        assert!(early_low.try_recv().is_err());

        assert!(table.release(&screen, &AgentId::new("mid"), now, LONG));
        assert_eq!(early_low.try_recv().unwrap().owner.as_str(), "early_low");

        assert!(table.release(&screen, &AgentId::new("early_low"), now, LONG));
        assert_eq!(late_low.try_recv().unwrap().owner.as_str(), "late_low");
        assert!(table.waiters.is_empty());
    }

    #[test]
    fn hand_off_skips_abandoned_waiters() {
        let now = Utc::now();
        let mut table = LeaseTable::default();
        let storage = Resource::storage("/sdcard/Download");

        let _ = table.claim(request(storage.clone(), "holder", 2), now, LONG);
        let gone = queued(table.claim(request(storage.clone(), "gone", 2), now, LONG));
        let mut alive = queued(table.claim(request(storage.clone(), "alive", 2), now, LONG));
        drop(gone);

        assert!(table.release(&storage, &AgentId::new("holder"), now, LONG));
        assert_eq!(alive.try_recv().unwrap().owner.as_str(), "alive");
        assert_eq!(table.leases[&storage].owner.as_str(), "alive");
    }

    #[test]
    fn equal_priority_never_preempts() {
        let now = Utc::now();
        let mut table = LeaseTable::default();
        let _ = table.claim(request(Resource::screen(), "a", 4), now, LONG);

        let claim = table.claim(request(Resource::screen(), "b", 4), now, LONG);
        assert!(matches!(claim, Claim::Queued { .. }));
        assert_eq!(table.leases[&Resource::screen()].owner.as_str(), "a");
    }
}
