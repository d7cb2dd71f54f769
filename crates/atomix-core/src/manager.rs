//! Partition-group membership manager.
//!
//! Converges this node's view of the system management group and the
//! named data partition groups with the rest of the cluster.
//!
//! ## Design
//!
//! - All group-state mutation and event posting happens on one spawned
//!   manager task (the manager context). Inbound bootstrap requests,
//!   outbound reply merges, cluster membership events, and scheduled
//!   retries are marshaled onto it through a command channel.
//! - At start, local state is seeded from configuration, then a
//!   bootstrap loop queries every other cluster member in parallel and
//!   merges the replies. Rounds are retried on a Fibonacci schedule
//!   (1, 1, 2, 3, 5, 5, ... seconds): without bound while the system
//!   group is unknown, and for at most five rounds while only data
//!   groups are missing.
//! - A peer that has not yet subscribed to the bootstrap subject, or
//!   that times out, is retried individually every second until it
//!   answers or the manager stops. Any other transport error drops
//!   that peer's contribution for the round.
//! - Merging never removes members: unions are filtered against the
//!   live cluster roster, and only departure events shrink groups.
//!   Two records with the same name but different types are a
//!   configuration conflict; the inbound delta is rejected and the
//!   manager keeps serving its current view.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot, Notify, RwLock};
use tokio::time;
use tracing::{debug, info, warn};

use atomix_proto::codec;
use atomix_proto::constants::{
    BOOTSTRAP_SUBJECT, FIBONACCI_BACKOFF_SECS, MAX_PARTITION_GROUP_ATTEMPTS,
    PEER_RETRY_INTERVAL_SECS,
};
use atomix_proto::defaults::DEFAULT_MANAGER_CHANNEL_SIZE;
use atomix_proto::error::{AtomixError, AtomixResult};
use atomix_proto::group::{PartitionGroupInfo, PartitionGroupMembership};
use atomix_proto::member::MemberId;

use atomix_cluster::membership::{ClusterMembership, MemberEventKind};
use atomix_cluster::messaging::{ClusterMessaging, InboundRequest, Subscription};

use crate::config::PartitionGroupsConfig;
use crate::event::{ListenerId, ListenerRegistry, PartitionGroupMembershipEvent};
use crate::registry::PartitionGroupTypeRegistry;

/// Work items marshaled onto the manager task.
enum Command {
    /// Begin a new bootstrap round.
    StartRound { attempt: usize },
    /// Merge a peer's view into local state.
    Merge(PartitionGroupInfo),
    /// All peer queries of a round have settled.
    RoundDone { attempt: usize },
}

#[derive(Default)]
struct GroupState {
    system_group: Option<PartitionGroupMembership>,
    groups: HashMap<String, PartitionGroupMembership>,
}

struct ManagerInner {
    membership: Arc<dyn ClusterMembership>,
    messaging: Arc<dyn ClusterMessaging>,
    registry: PartitionGroupTypeRegistry,
    state: RwLock<GroupState>,
    listeners: ListenerRegistry,
    started: AtomicBool,
    stopped: AtomicBool,
    shutdown: Notify,
}

impl ManagerInner {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Snapshot of the local view as a bootstrap envelope. Groups are
    /// sorted by name so equal views encode to equal bytes.
    async fn local_info(&self) -> PartitionGroupInfo {
        let state = self.state.read().await;
        let mut groups: Vec<PartitionGroupMembership> = state.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.group.cmp(&b.group));
        PartitionGroupInfo::new(
            self.membership.local_member().id,
            state.system_group.clone(),
            groups,
        )
    }

    /// Union of two member sets, restricted to members the cluster
    /// membership service still knows. Stale peers cannot resurrect
    /// departed members through bootstrap.
    async fn live_union(
        &self,
        local: &BTreeSet<MemberId>,
        peer: &BTreeSet<MemberId>,
    ) -> BTreeSet<MemberId> {
        let mut merged = BTreeSet::new();
        for id in local.iter().chain(peer.iter()) {
            if self.membership.member(id).await.is_some() {
                merged.insert(id.clone());
            }
        }
        merged
    }

    /// Merge a peer's envelope into local state and post events for
    /// every group that changed. Runs on the manager task.
    ///
    /// Processing stops at the first configuration conflict; groups
    /// merged earlier in the envelope keep their merge.
    async fn merge_info(&self, info: PartitionGroupInfo) -> AtomixResult<()> {
        let mut events = Vec::new();
        let result = self.merge_into_state(&info, &mut events).await;
        for event in events {
            self.listeners.post(event);
        }
        result
    }

    async fn merge_into_state(
        &self,
        info: &PartitionGroupInfo,
        events: &mut Vec<PartitionGroupMembershipEvent>,
    ) -> AtomixResult<()> {
        let mut state = self.state.write().await;

        if let Some(peer_system) = &info.system_group {
            let local_system = state.system_group.clone();
            match local_system {
                None => {
                    let mut record = peer_system.clone();
                    record.system = true;
                    info!(
                        "bootstrapped management group {} from {}",
                        record, info.member_id
                    );
                    events.push(PartitionGroupMembershipEvent::members_changed(record.clone()));
                    state.system_group = Some(record);
                }
                Some(local_system) => {
                    if local_system.group != peer_system.group
                        || local_system.group_type() != peer_system.group_type()
                    {
                        return Err(AtomixError::ConfigurationConflict {
                            group: peer_system.group.clone(),
                        });
                    }
                    let merged = self
                        .live_union(&local_system.members, &peer_system.members)
                        .await;
                    if merged.difference(&local_system.members).next().is_some() {
                        let record = local_system.with_members(merged);
                        debug!(
                            "updated management group {} from {}",
                            record, info.member_id
                        );
                        events.push(PartitionGroupMembershipEvent::members_changed(
                            record.clone(),
                        ));
                        state.system_group = Some(record);
                    }
                }
            }
        }

        for peer_group in &info.groups {
            let local_group = state.groups.get(&peer_group.group).cloned();
            match local_group {
                None => {
                    let mut record = peer_group.clone();
                    record.system = false;
                    info!(
                        "bootstrapped partition group {} from {}",
                        record, info.member_id
                    );
                    events.push(PartitionGroupMembershipEvent::members_changed(record.clone()));
                    state.groups.insert(record.group.clone(), record);
                }
                Some(local_group) => {
                    if local_group.group != peer_group.group
                        || local_group.group_type() != peer_group.group_type()
                    {
                        return Err(AtomixError::ConfigurationConflict {
                            group: peer_group.group.clone(),
                        });
                    }
                    let merged = self
                        .live_union(&local_group.members, &peer_group.members)
                        .await;
                    if merged.difference(&local_group.members).next().is_some() {
                        let record = local_group.with_members(merged);
                        debug!(
                            "updated partition group {} from {}",
                            record, info.member_id
                        );
                        events.push(PartitionGroupMembershipEvent::members_changed(
                            record.clone(),
                        ));
                        state.groups.insert(record.group.clone(), record);
                    }
                }
            }
        }

        Ok(())
    }

    /// Strip a departed member from every group it participated in,
    /// posting one event per group that actually changed. Runs on the
    /// manager task.
    async fn handle_member_removed(&self, id: &MemberId) {
        let mut events = Vec::new();
        {
            let mut state = self.state.write().await;

            if let Some(system) = &state.system_group {
                if system.contains(id) {
                    let mut members = system.members.clone();
                    members.remove(id);
                    let record = system.with_members(members);
                    info!("member {} removed from management group", id);
                    events.push(PartitionGroupMembershipEvent::members_changed(
                        record.clone(),
                    ));
                    state.system_group = Some(record);
                }
            }

            let mut changed = Vec::new();
            for group in state.groups.values() {
                if group.contains(id) {
                    let mut members = group.members.clone();
                    members.remove(id);
                    changed.push(group.with_members(members));
                }
            }
            for record in changed {
                info!("member {} removed from partition group {}", id, record.group);
                events.push(PartitionGroupMembershipEvent::members_changed(
                    record.clone(),
                ));
                state.groups.insert(record.group.clone(), record);
            }
        }
        for event in events {
            self.listeners.post(event);
        }
    }

    /// Merge an inbound bootstrap request and reply with the local
    /// view. Merge failures are logged, never propagated to the peer.
    async fn handle_bootstrap_request(&self, request: InboundRequest) {
        match codec::decode::<PartitionGroupInfo>(&request.payload) {
            Ok(info) => {
                debug!("received bootstrap request from {}", info.member_id);
                if let Err(e) = self.merge_info(info).await {
                    warn!("{}", e);
                }
            }
            Err(_) => warn!("malformed bootstrap request from {}", request.sender),
        }

        let reply = self.local_info().await;
        match codec::encode(&reply) {
            Ok(payload) => request.responder.respond(payload),
            Err(e) => warn!("failed to encode bootstrap reply: {}", e),
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        // Signal any remaining background tasks to stop.
        self.shutdown.notify_waiters();
    }
}

/// The partition-group membership service.
///
/// Cheap to clone; clones share the same state and lifecycle.
#[derive(Clone)]
pub struct PartitionGroupMembershipManager {
    inner: Arc<ManagerInner>,
}

impl PartitionGroupMembershipManager {
    pub fn new(
        membership: Arc<dyn ClusterMembership>,
        messaging: Arc<dyn ClusterMessaging>,
        registry: PartitionGroupTypeRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                membership,
                messaging,
                registry,
                state: RwLock::new(GroupState::default()),
                listeners: ListenerRegistry::new(),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
        }
    }

    /// Start the manager: seed local state from `config`, subscribe to
    /// cluster events and the bootstrap subject, and run the bootstrap
    /// loop. Completes once the system group is known and either data
    /// groups were found or the retry limit for them is reached.
    /// Returns `Stopped` if [`stop`](Self::stop) wins the race.
    pub async fn start(&self, config: PartitionGroupsConfig) -> AtomixResult<()> {
        if self.inner.is_stopped() {
            return Err(AtomixError::Stopped);
        }
        if let Some(system) = &config.system_group {
            self.inner.registry.require(&system.group_type)?;
        }
        for group in config.groups.values() {
            self.inner.registry.require(&group.group_type)?;
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(AtomixError::AlreadyStarted);
        }

        let local_id = self.inner.membership.local_member().id;
        {
            let mut state = self.inner.state.write().await;
            state.system_group = config
                .system_group
                .clone()
                .map(|cfg| PartitionGroupMembership::solo(cfg, local_id.clone(), true));
            for (name, cfg) in &config.groups {
                state.groups.insert(
                    name.clone(),
                    PartitionGroupMembership::solo(cfg.clone(), local_id.clone(), false),
                );
            }
        }

        let subscription = self.inner.messaging.subscribe(BOOTSTRAP_SUBJECT).await?;
        let member_events = self.inner.membership.subscribe();
        let (cmd_tx, cmd_rx) = mpsc::channel(DEFAULT_MANAGER_CHANNEL_SIZE);
        let (start_tx, start_rx) = oneshot::channel();

        tokio::spawn(Self::run(
            self.inner.clone(),
            cmd_tx,
            cmd_rx,
            subscription,
            member_events,
            start_tx,
        ));

        match start_rx.await {
            Ok(()) => {
                info!("started");
                Ok(())
            }
            Err(_) => Err(AtomixError::Stopped),
        }
    }

    /// Stop the manager. Idempotent; safe to call before, during, or
    /// after a pending `start`.
    pub async fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.messaging.unsubscribe(BOOTSTRAP_SUBJECT).await;
        self.inner.shutdown.notify_waiters();
        info!("stopped");
    }

    /// The current system group record, if one is known.
    pub async fn system_membership(&self) -> Option<PartitionGroupMembership> {
        let state = self.inner.state.read().await;
        state.system_group.clone()
    }

    /// The named group record. Falls back to the system record when the
    /// name matches the system group.
    pub async fn membership(&self, group: &str) -> Option<PartitionGroupMembership> {
        let state = self.inner.state.read().await;
        if let Some(record) = state.groups.get(group) {
            return Some(record.clone());
        }
        match &state.system_group {
            Some(system) if system.group == group => Some(system.clone()),
            _ => None,
        }
    }

    /// Snapshot of all non-system group records.
    pub async fn memberships(&self) -> Vec<PartitionGroupMembership> {
        let state = self.inner.state.read().await;
        state.groups.values().cloned().collect()
    }

    /// Register a membership event listener. Listeners run on the
    /// manager context and must not block.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&PartitionGroupMembershipEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.add_listener(Arc::new(listener))
    }

    /// Deregister a membership event listener.
    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.listeners.remove_listener(id);
    }

    /// Channel-backed event stream, convenient for tests and observers.
    pub fn watch(&self) -> mpsc::UnboundedReceiver<PartitionGroupMembershipEvent> {
        self.inner.listeners.watch()
    }

    /// The manager task: owns all state mutation and event posting.
    async fn run(
        inner: Arc<ManagerInner>,
        cmd_tx: mpsc::Sender<Command>,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut subscription: Subscription,
        mut member_events: tokio::sync::broadcast::Receiver<
            atomix_cluster::membership::MemberEvent,
        >,
        start_tx: oneshot::Sender<()>,
    ) {
        let local_id = inner.membership.local_member().id;
        let mut start_tx = Some(start_tx);

        // Announce the groups seeded from local configuration.
        {
            let state = inner.state.read().await;
            let mut seeded = Vec::new();
            if let Some(system) = &state.system_group {
                seeded.push(system.clone());
            }
            let mut names: Vec<String> = state.groups.keys().cloned().collect();
            names.sort();
            for name in &names {
                seeded.push(state.groups[name].clone());
            }
            drop(state);
            for record in seeded {
                inner
                    .listeners
                    .post(PartitionGroupMembershipEvent::members_changed(record));
            }
        }

        tokio::spawn(Self::run_round(inner.clone(), cmd_tx.clone(), 0));

        let shutdown = inner.shutdown.notified();
        tokio::pin!(shutdown);
        let mut subscription_open = true;
        let mut events_open = true;

        loop {
            if inner.is_stopped() {
                break;
            }
            tokio::select! {
                _ = &mut shutdown => break,

                command = cmd_rx.recv() => {
                    let Some(command) = command else { break };
                    match command {
                        Command::StartRound { attempt } => {
                            tokio::spawn(Self::run_round(
                                inner.clone(),
                                cmd_tx.clone(),
                                attempt,
                            ));
                        }
                        Command::Merge(info) => {
                            if let Err(e) = inner.merge_info(info).await {
                                warn!("{}", e);
                            }
                        }
                        Command::RoundDone { attempt } => {
                            Self::on_round_done(&inner, &cmd_tx, attempt, &mut start_tx).await;
                        }
                    }
                }

                request = subscription.accept(), if subscription_open => {
                    match request {
                        Some(request) => inner.handle_bootstrap_request(request).await,
                        None => subscription_open = false,
                    }
                }

                event = member_events.recv(), if events_open => {
                    match event {
                        Ok(event) => match event.kind {
                            MemberEventKind::Added => {
                                if event.member.id != local_id {
                                    debug!("member {} added, bootstrapping it", event.member.id);
                                    tokio::spawn(Self::bootstrap_peer(
                                        inner.clone(),
                                        cmd_tx.clone(),
                                        event.member.id,
                                    ));
                                }
                            }
                            MemberEventKind::Removed => {
                                inner.handle_member_removed(&event.member.id).await;
                            }
                        },
                        Err(RecvError::Lagged(n)) => {
                            warn!("member event stream lagged by {}", n);
                        }
                        Err(RecvError::Closed) => events_open = false,
                    }
                }
            }
        }
    }

    /// Decide whether the bootstrap loop is done after a round.
    async fn on_round_done(
        inner: &Arc<ManagerInner>,
        cmd_tx: &mpsc::Sender<Command>,
        attempt: usize,
        start_tx: &mut Option<oneshot::Sender<()>>,
    ) {
        let (system_known, groups_empty) = {
            let state = inner.state.read().await;
            (state.system_group.is_some(), state.groups.is_empty())
        };

        if !system_known {
            warn!(
                "failed to locate the management group via bootstrap; ensure partition \
                 groups are configured either locally or on a reachable peer"
            );
            Self::schedule_retry(inner.clone(), cmd_tx.clone(), attempt);
        } else if groups_empty && attempt < MAX_PARTITION_GROUP_ATTEMPTS {
            warn!(
                "failed to locate partition groups via bootstrap; ensure partition \
                 groups are configured either locally or on a reachable peer"
            );
            Self::schedule_retry(inner.clone(), cmd_tx.clone(), attempt);
        } else if let Some(tx) = start_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Schedule the next bootstrap round on the Fibonacci backoff
    /// schedule. The retry observes the stop flag and exits without
    /// effect once the manager is stopped.
    fn schedule_retry(inner: Arc<ManagerInner>, cmd_tx: mpsc::Sender<Command>, attempt: usize) {
        let index = attempt.min(FIBONACCI_BACKOFF_SECS.len() - 1);
        let delay = Duration::from_secs(FIBONACCI_BACKOFF_SECS[index]);
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.shutdown.notified() => {}
                _ = time::sleep(delay) => {
                    if !inner.is_stopped() {
                        let _ = cmd_tx
                            .send(Command::StartRound { attempt: attempt + 1 })
                            .await;
                    }
                }
            }
        });
    }

    /// Run one bootstrap round: query every other cluster member in
    /// parallel and report completion once all queries settled.
    async fn run_round(inner: Arc<ManagerInner>, cmd_tx: mpsc::Sender<Command>, attempt: usize) {
        let local_id = inner.membership.local_member().id;
        let peers: Vec<MemberId> = inner
            .membership
            .members()
            .await
            .into_iter()
            .map(|member| member.id)
            .filter(|id| *id != local_id)
            .collect();

        debug!("bootstrap round {} against {} peer(s)", attempt, peers.len());

        let mut handles = Vec::new();
        for peer in peers {
            handles.push(tokio::spawn(Self::bootstrap_peer(
                inner.clone(),
                cmd_tx.clone(),
                peer,
            )));
        }
        for handle in handles {
            let _ = handle.await;
        }

        let _ = cmd_tx.send(Command::RoundDone { attempt }).await;
    }

    /// Query one peer, retrying every second while it has no handler
    /// registered or times out. Other errors drop the peer's
    /// contribution for this round.
    async fn bootstrap_peer(inner: Arc<ManagerInner>, cmd_tx: mpsc::Sender<Command>, peer: MemberId) {
        loop {
            if inner.is_stopped() {
                return;
            }

            let info = inner.local_info().await;
            let payload = match codec::encode(&info) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("failed to encode bootstrap request: {}", e);
                    return;
                }
            };

            debug!("bootstrapping from member {}", peer);
            match inner.messaging.send(BOOTSTRAP_SUBJECT, &peer, payload).await {
                Ok(reply) => {
                    match codec::decode::<PartitionGroupInfo>(&reply) {
                        Ok(info) => {
                            let _ = cmd_tx.send(Command::Merge(info)).await;
                        }
                        Err(_) => warn!("malformed bootstrap reply from {}", peer),
                    }
                    return;
                }
                Err(e) if e.is_recoverable() => {
                    debug!("bootstrap of {} not ready ({}), retrying", peer, e);
                    tokio::select! {
                        _ = inner.shutdown.notified() => return,
                        _ = time::sleep(Duration::from_secs(PEER_RETRY_INTERVAL_SECS)) => {}
                    }
                }
                Err(e) => {
                    debug!("failed to bootstrap from member {}: {}", peer, e);
                    return;
                }
            }
        }
    }
}
