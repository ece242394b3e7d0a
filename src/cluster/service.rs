use super::consensus::ConsensusCore;
use super::persistence::ConsensusStore;
use super::protocol::*;
use super::transport::ClusterTransport;
use super::types::*;
use crate::error::ClusterError;
use crate::transfer::OrderTransfer;

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const TRANSFER_RETRY: Duration = Duration::from_secs(1);

/// Cluster membership, leader election and peer liveness for one service.
///
/// The consensus log only carries membership. The leader additionally probes
/// every peer and hands the orders of a peer that went offline to a healthy
/// service.
pub struct ClusterService {
    service_id: String,
    address: String,
    settings: ClusterSettings,
    core: Mutex<ConsensusCore>,
    persistence: ConsensusStore,
    transport: Arc<dyn ClusterTransport>,
    transfer: Arc<dyn OrderTransfer>,
    peers: DashMap<String, PeerHealth>,
    leader_tx: watch::Sender<Option<LeaderInfo>>,
    commit_tx: watch::Sender<u64>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    liveness: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterService {
    pub fn new(
        service_id: String,
        address: String,
        settings: ClusterSettings,
        transport: Arc<dyn ClusterTransport>,
        transfer: Arc<dyn OrderTransfer>,
    ) -> Arc<Self> {
        let address = base_url(&address);
        let core = ConsensusCore::new(service_id.clone(), address.clone(), settings.heartbeat);
        let persistence = ConsensusStore::new(settings.data_dir.as_deref());
        let (leader_tx, _) = watch::channel(None);
        let (commit_tx, _) = watch::channel(0);

        Arc::new(Self {
            service_id,
            address,
            settings,
            core: Mutex::new(core),
            persistence,
            transport,
            transfer,
            peers: DashMap::new(),
            leader_tx,
            commit_tx,
            tasks: Mutex::new(Vec::new()),
            liveness: Mutex::new(None),
        })
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Loads the persisted log, then joins `seed`, bootstraps a fresh cluster or
    /// recovers, and starts the background loops.
    ///
    /// The HTTP endpoints of this node must already be served when joining, as the
    /// leader replicates to us before it acknowledges the join.
    pub async fn start(self: &Arc<Self>, seed: Option<String>) -> Result<(), ClusterError> {
        let state = self.persistence.load().await?;
        let has_log = !state.log.is_empty();
        self.core.lock().restore(state);

        match seed {
            Some(_) if has_log => return Err(ClusterError::ExistingLog),
            Some(seed) => {
                self.spawn_loops();
                tracing::info!("Joining cluster via {}", seed);

                let response = self
                    .transport
                    .join(
                        &seed,
                        JoinRequest {
                            service_id: self.service_id.clone(),
                            address: self.address.clone(),
                        },
                    )
                    .await?;

                tracing::info!(
                    "Joined cluster led by {} at log index {}",
                    response.leader_id,
                    response.index
                );
            }
            None if !has_log => {
                self.core.lock().bootstrap();
                self.persist().await?;
                self.publish();
                tracing::info!("Bootstrapped new cluster as {}", self.service_id);
                self.spawn_loops();
            }
            None => {
                tracing::info!("Recovering cluster state from {:?}", self.persistence.path());
                self.spawn_loops();
            }
        }

        Ok(())
    }

    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Some(task) = self.liveness.lock().take() {
            task.abort();
        }
    }

    pub fn is_leader(&self) -> bool {
        self.core.lock().is_leader()
    }

    /// Address of the current leader.
    pub fn leader_address(&self) -> Result<String, ClusterError> {
        self.core
            .lock()
            .leader()
            .map(|leader| leader.address.clone())
            .ok_or(ClusterError::NoLeader)
    }

    /// Subscribes to leader changes.
    pub fn leader_changes(&self) -> watch::Receiver<Option<LeaderInfo>> {
        self.leader_tx.subscribe()
    }

    pub fn membership(&self) -> Vec<Member> {
        self.core.lock().membership()
    }

    /// Accepts a new member. Only the leader appends; everyone else points the
    /// caller at the leader.
    pub async fn register_peer(&self, req: JoinRequest) -> Result<JoinResponse, ClusterError> {
        let address = base_url(&req.address);

        let index = {
            let mut core = self.core.lock();
            if !core.is_leader() {
                return Err(match core.leader() {
                    Some(leader) => ClusterError::RedirectRequired {
                        leader_addr: leader.address.clone(),
                    },
                    None => ClusterError::NoLeader,
                });
            }

            let known = core
                .membership()
                .iter()
                .any(|m| m.service_id == req.service_id && m.address == address);
            if known {
                None
            } else {
                Some(core.append_command(Command::Join {
                    service_id: req.service_id.clone(),
                    address: address.clone(),
                }))
            }
        };

        let Some(index) = index else {
            tracing::info!("{} is already a member", req.service_id);
            return Ok(JoinResponse {
                leader_id: self.service_id.clone(),
                index: self.core.lock().commit_index(),
            });
        };

        self.persist().await?;
        self.peers
            .insert(req.service_id.clone(), PeerHealth::new(address.clone()));
        tracing::info!("Appended join of {} ({}) at index {}", req.service_id, address, index);

        self.replicate().await;
        self.wait_for_commit(index).await?;

        Ok(JoinResponse {
            leader_id: self.service_id.clone(),
            index,
        })
    }

    pub async fn handle_vote(&self, req: VoteRequest) -> Result<VoteResponse, ClusterError> {
        let response = self.core.lock().handle_vote_request(&req);
        self.persist().await?;
        self.publish();

        tracing::debug!(
            "Vote for {} in term {}: {}",
            req.candidate_id,
            req.term,
            response.vote_granted
        );
        Ok(response)
    }

    pub async fn handle_append(&self, req: AppendRequest) -> Result<AppendResponse, ClusterError> {
        let (response, changed) = {
            let mut core = self.core.lock();
            let before = (core.current_term(), core.last_log_index(), core.voted_for.clone());
            let response = core.handle_append_request(&req);
            let after = (core.current_term(), core.last_log_index(), core.voted_for.clone());
            (response, before != after)
        };

        if changed {
            self.persist().await?;
        }
        self.publish();
        Ok(response)
    }

    pub fn heartbeat(&self) -> HeartbeatResponse {
        HeartbeatResponse {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            service_id: self.service_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: "OK".to_string(),
            generated_at: Utc::now(),
        }
    }

    /// Cluster view of the leader. Other nodes answer with a redirect.
    pub fn describe(&self) -> Result<ClusterDescription, ClusterError> {
        let core = self.core.lock();
        if !core.is_leader() {
            return Err(match core.leader() {
                Some(leader) => ClusterError::RedirectRequired {
                    leader_addr: leader.address.clone(),
                },
                None => ClusterError::NoLeader,
            });
        }

        let peers = core
            .peers()
            .into_iter()
            .map(|member| {
                let health = self.peers.get(&member.service_id).map(|h| h.clone());
                PeerDescription {
                    online: health.as_ref().map(|h| h.online).unwrap_or(true),
                    consecutive_failures: health
                        .as_ref()
                        .map(|h| h.consecutive_failures)
                        .unwrap_or(0),
                    last_activity_ms_ago: health
                        .as_ref()
                        .map(|h| h.last_activity.elapsed().as_millis() as u64)
                        .unwrap_or(0),
                    service_id: member.service_id,
                    address: member.address,
                }
            })
            .collect();

        Ok(ClusterDescription {
            service_id: self.service_id.clone(),
            leader: core.leader().map(|leader| leader.service_id.clone()),
            term: core.current_term(),
            commit_index: core.commit_index(),
            peers,
        })
    }

    pub fn peer_health(&self, service_id: &str) -> Option<PeerHealth> {
        self.peers.get(service_id).map(|entry| entry.clone())
    }

    /// Starts every member with a clean record, as if it had just been heard from.
    fn reset_peer_health(&self) {
        let members = self.core.lock().peers();

        self.peers.clear();
        for member in members {
            self.peers
                .insert(member.service_id, PeerHealth::new(member.address));
        }
    }

    // ============================================================
    // Background loops
    // ============================================================

    fn spawn_loops(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();

        let service = self.clone();
        tasks.push(tokio::spawn(async move {
            service.consensus_loop().await;
        }));

        let service = self.clone();
        tasks.push(tokio::spawn(async move {
            service.leadership_loop().await;
        }));

        tracing::info!("Cluster background tasks started");
    }

    /// Drives elections on followers and replication on the leader.
    async fn consensus_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.settings.heartbeat);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            if self.is_leader() {
                self.replicate().await;
                continue;
            }

            let election_due = self.core.lock().election_due();
            if election_due {
                if let Err(e) = self.run_election().await {
                    tracing::error!("Election failed: {}", e);
                }
            }
        }
    }

    /// Starts the liveness loop whenever this node becomes leader.
    async fn leadership_loop(self: Arc<Self>) {
        let mut changes = self.leader_changes();

        loop {
            let leading = changes
                .borrow_and_update()
                .as_ref()
                .map(|leader| leader.service_id == self.service_id)
                .unwrap_or(false);

            {
                let mut liveness = self.liveness.lock();
                match (leading, liveness.is_some()) {
                    (true, false) => {
                        tracing::info!("Became leader, starting liveness checks");
                        self.reset_peer_health();
                        let service = self.clone();
                        *liveness = Some(tokio::spawn(async move {
                            service.liveness_loop().await;
                        }));
                    }
                    (false, true) => {
                        tracing::info!("Lost leadership, stopping liveness checks");
                        if let Some(task) = liveness.take() {
                            task.abort();
                        }
                    }
                    _ => {}
                }
            }

            if changes.changed().await.is_err() {
                break;
            }
        }
    }

    async fn liveness_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.settings.liveness_interval);

        loop {
            interval.tick().await;

            if !self.is_leader() {
                break;
            }
            self.check_peers().await;
        }
    }

    /// Probes every peer once and starts a transfer for each one that just went offline.
    pub async fn check_peers(self: &Arc<Self>) {
        let members = self.core.lock().peers();

        let probes = members.iter().map(|member| {
            let transport = self.transport.clone();
            let address = member.address.clone();
            async move { transport.probe(&address).await }
        });
        let results = join_all(probes).await;

        for (member, result) in members.into_iter().zip(results) {
            let went_offline = {
                let mut health = self
                    .peers
                    .entry(member.service_id.clone())
                    .or_insert_with(|| PeerHealth::new(member.address.clone()));
                health.address = member.address.clone();

                match result {
                    Ok(_) => {
                        if !health.online {
                            tracing::info!("Peer {} is back online", member.service_id);
                        }
                        health.last_activity = Instant::now();
                        health.consecutive_failures = 0;
                        health.online = true;
                        false
                    }
                    Err(e) => {
                        health.consecutive_failures += 1;
                        tracing::warn!(
                            "Probe of {} failed ({} in a row): {}",
                            member.service_id,
                            health.consecutive_failures,
                            e
                        );

                        if health.online
                            && health.consecutive_failures >= self.settings.max_missed_heartbeats
                            && health.last_activity.elapsed() > self.settings.offline_after()
                        {
                            health.online = false;
                            true
                        } else {
                            false
                        }
                    }
                }
            };

            if went_offline {
                tracing::warn!("Peer {} is offline, transferring its orders", member.service_id);
                let service = self.clone();
                let source = member.service_id.clone();
                tokio::spawn(async move {
                    service.transfer_orders(source).await;
                });
            }
        }
    }

    /// Finds a service willing to take over `source`'s orders: online peers first,
    /// then this node. Retries every second for as long as we lead.
    pub async fn transfer_orders(&self, source: String) {
        while self.is_leader() {
            let candidates: Vec<(String, String)> = self
                .peers
                .iter()
                .filter(|entry| entry.value().online && entry.key() != &source)
                .map(|entry| (entry.key().clone(), entry.value().address.clone()))
                .collect();

            for (service_id, address) in candidates {
                let request = TransferRequest {
                    service_id: source.clone(),
                };
                match self.transport.request_transfer(&address, request).await {
                    Ok(_) => {
                        tracing::info!("{} took over the orders of {}", service_id, source);
                        return;
                    }
                    Err(e) => {
                        tracing::warn!("{} refused transfer of {}: {}", service_id, source, e);
                    }
                }
            }

            match self.transfer.transfer(&source).await {
                Ok(report) => {
                    tracing::info!(
                        "Took over {} orders of {} locally",
                        report.dispatched,
                        source
                    );
                    return;
                }
                Err(e) => tracing::error!("Local transfer of {} failed: {}", source, e),
            }

            tokio::time::sleep(TRANSFER_RETRY).await;
        }
    }

    // ============================================================
    // Consensus plumbing
    // ============================================================

    async fn run_election(&self) -> Result<(), ClusterError> {
        let (request, peers) = {
            let mut core = self.core.lock();
            (core.start_election(), core.peers())
        };
        self.persist().await?;
        self.publish();

        tracing::info!("Starting election for term {}", request.term);

        let votes = peers.iter().map(|peer| {
            let transport = self.transport.clone();
            let request = request.clone();
            let address = peer.address.clone();
            async move { transport.request_vote(&address, request).await }
        });
        let responses: Vec<VoteResponse> = join_all(votes)
            .await
            .into_iter()
            .filter_map(|result| result.ok())
            .collect();

        let won = {
            let mut core = self.core.lock();
            let won = core.count_votes(request.term, &responses);
            if won {
                core.become_leader();
            }
            won
        };

        self.persist().await?;
        self.publish();

        if won {
            tracing::info!("Won election for term {}", request.term);
            self.replicate().await;
        }
        Ok(())
    }

    /// Sends one round of append-entries to every peer.
    async fn replicate(&self) {
        let requests: Vec<(Member, AppendRequest)> = {
            let core = self.core.lock();
            if !core.is_leader() {
                return;
            }
            core.peers()
                .into_iter()
                .map(|peer| {
                    let request = core.append_request_for(&peer.service_id);
                    (peer, request)
                })
                .collect()
        };

        let sends = requests.iter().map(|(peer, request)| {
            let transport = self.transport.clone();
            let address = peer.address.clone();
            let request = request.clone();
            async move { transport.append_entries(&address, request).await }
        });
        let responses = join_all(sends).await;

        {
            let mut core = self.core.lock();
            for ((peer, request), response) in requests.iter().zip(responses) {
                match response {
                    Ok(response) => {
                        if let Some(mut health) = self.peers.get_mut(&peer.service_id) {
                            health.last_activity = Instant::now();
                        }
                        core.handle_append_response(&peer.service_id, request, &response);
                    }
                    Err(e) => tracing::trace!("Append to {} failed: {}", peer.service_id, e),
                }
            }
            // A single-node leader commits on append.
            core.advance_commit();
        }

        if let Err(e) = self.persist().await {
            tracing::error!("{}", e);
        }
        self.publish();
    }

    async fn wait_for_commit(&self, index: u64) -> Result<(), ClusterError> {
        let mut commits = self.commit_tx.subscribe();

        let committed = async {
            loop {
                let committed = *commits.borrow_and_update();
                if committed >= index {
                    return true;
                }
                if commits.changed().await.is_err() {
                    return false;
                }
            }
        };

        match tokio::time::timeout(self.settings.commit_timeout(), committed).await {
            Ok(true) => Ok(()),
            _ => Err(ClusterError::CommitTimeout { index }),
        }
    }

    async fn persist(&self) -> Result<(), ClusterError> {
        self.persistence
            .save_with(|| self.core.lock().persistent_state())
            .await
    }

    /// Pushes the current leader and commit index to their watchers.
    fn publish(&self) {
        let (leader, commit_index) = {
            let core = self.core.lock();
            (core.leader().cloned(), core.commit_index())
        };

        self.leader_tx.send_if_modified(|current| {
            if *current != leader {
                tracing::info!(
                    "Leader is now {}",
                    leader
                        .as_ref()
                        .map(|l| l.service_id.as_str())
                        .unwrap_or("unknown")
                );
                *current = leader;
                true
            } else {
                false
            }
        });
        self.commit_tx.send_if_modified(|current| {
            if *current != commit_index {
                *current = commit_index;
                true
            } else {
                false
            }
        });
    }
}
