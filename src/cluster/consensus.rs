//! Consensus core.
//!
//! Term, vote and log bookkeeping for a single node, kept free of I/O so the
//! service can drive it under a short lock and send RPCs outside of it.
//! Log indices start at 1; index 0 stands for the empty prefix.

use super::protocol::{AppendRequest, AppendResponse, VoteRequest, VoteResponse};
use super::types::{Command, LeaderInfo, LogEntry, Member, PersistentState, Role};

use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct ConsensusCore {
    service_id: String,
    address: String,
    heartbeat: Duration,

    pub(crate) role: Role,
    pub(crate) current_term: u64,
    pub(crate) voted_for: Option<String>,
    pub(crate) log: Vec<LogEntry>,
    pub(crate) commit_index: u64,
    pub(crate) leader: Option<LeaderInfo>,

    next_index: HashMap<String, u64>,
    match_index: HashMap<String, u64>,

    last_heard: Instant,
    election_timeout: Duration,
}

impl ConsensusCore {
    pub fn new(service_id: String, address: String, heartbeat: Duration) -> Self {
        let mut core = Self {
            service_id,
            address,
            heartbeat,
            role: Role::Follower,
            current_term: 0,
            voted_for: None,
            log: Vec::new(),
            commit_index: 0,
            leader: None,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            last_heard: Instant::now(),
            election_timeout: heartbeat * 4,
        };
        core.reset_election_timer();
        core
    }

    pub fn restore(&mut self, state: PersistentState) {
        self.current_term = state.current_term;
        self.voted_for = state.voted_for;
        self.log = state.log;
    }

    pub fn persistent_state(&self) -> PersistentState {
        PersistentState {
            current_term: self.current_term,
            voted_for: self.voted_for.clone(),
            log: self.log.clone(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn leader(&self) -> Option<&LeaderInfo> {
        self.leader.as_ref()
    }

    pub fn current_term(&self) -> u64 {
        self.current_term
    }

    pub fn commit_index(&self) -> u64 {
        self.commit_index
    }

    pub fn has_log(&self) -> bool {
        !self.log.is_empty()
    }

    pub fn last_log_index(&self) -> u64 {
        self.log.len() as u64
    }

    pub fn last_log_term(&self) -> u64 {
        self.log.last().map(|entry| entry.term).unwrap_or(0)
    }

    fn term_at(&self, index: u64) -> Option<u64> {
        if index == 0 {
            return Some(0);
        }
        self.log.get(index as usize - 1).map(|entry| entry.term)
    }

    /// Every member that ever joined, with the latest address it joined with.
    pub fn membership(&self) -> Vec<Member> {
        let mut members: Vec<Member> = Vec::new();

        for entry in &self.log {
            if let Command::Join {
                service_id,
                address,
            } = &entry.command
            {
                match members.iter_mut().find(|m| &m.service_id == service_id) {
                    Some(member) => member.address = address.clone(),
                    None => members.push(Member {
                        service_id: service_id.clone(),
                        address: address.clone(),
                    }),
                }
            }
        }

        members
    }

    /// Members other than the local node.
    pub fn peers(&self) -> Vec<Member> {
        self.membership()
            .into_iter()
            .filter(|m| m.service_id != self.service_id)
            .collect()
    }

    pub fn is_member(&self, service_id: &str) -> bool {
        self.membership().iter().any(|m| m.service_id == service_id)
    }

    pub fn quorum(&self) -> usize {
        self.membership().len() / 2 + 1
    }

    pub fn reset_election_timer(&mut self) {
        let low = self.heartbeat.as_millis() as u64 * 4;
        let high = self.heartbeat.as_millis() as u64 * 8;
        let timeout_ms = rand::thread_rng().gen_range(low..=high.max(low));

        self.election_timeout = Duration::from_millis(timeout_ms);
        self.last_heard = Instant::now();
    }

    /// Whether this node should start an election now.
    pub fn election_due(&self) -> bool {
        self.role != Role::Leader
            && self.is_member(&self.service_id)
            && self.last_heard.elapsed() >= self.election_timeout
    }

    /// Steps down to follower when `term` is newer than ours. Returns whether it did.
    pub fn observe_term(&mut self, term: u64) -> bool {
        if term <= self.current_term {
            return false;
        }

        self.current_term = term;
        self.voted_for = None;
        self.role = Role::Follower;
        self.leader = None;
        true
    }

    /// Seeds a single-node cluster: one `Join` for ourselves, committed, leading term 1.
    pub fn bootstrap(&mut self) {
        self.current_term = 1;
        self.voted_for = Some(self.service_id.clone());
        self.log = vec![LogEntry {
            term: 1,
            index: 1,
            command: Command::Join {
                service_id: self.service_id.clone(),
                address: self.address.clone(),
            },
        }];
        self.commit_index = 1;
        self.role = Role::Leader;
        self.leader = Some(self.own_leader_info());
    }

    pub fn start_election(&mut self) -> VoteRequest {
        self.current_term += 1;
        self.role = Role::Candidate;
        self.voted_for = Some(self.service_id.clone());
        self.leader = None;
        self.reset_election_timer();

        VoteRequest {
            term: self.current_term,
            candidate_id: self.service_id.clone(),
            last_log_index: self.last_log_index(),
            last_log_term: self.last_log_term(),
        }
    }

    pub fn handle_vote_request(&mut self, req: &VoteRequest) -> VoteResponse {
        self.observe_term(req.term);

        let up_to_date =
            (req.last_log_term, req.last_log_index) >= (self.last_log_term(), self.last_log_index());
        let free_vote = self
            .voted_for
            .as_ref()
            .map(|candidate| candidate == &req.candidate_id)
            .unwrap_or(true);

        let granted = req.term == self.current_term && up_to_date && free_vote;
        if granted {
            self.voted_for = Some(req.candidate_id.clone());
            self.reset_election_timer();
        }

        VoteResponse {
            term: self.current_term,
            vote_granted: granted,
        }
    }

    /// Counts a vote for the current candidacy. Returns true once it wins.
    pub fn count_votes(&mut self, term: u64, responses: &[VoteResponse]) -> bool {
        for response in responses {
            if self.observe_term(response.term) {
                return false;
            }
        }

        if self.role != Role::Candidate || self.current_term != term {
            return false;
        }

        let granted = 1 + responses.iter().filter(|r| r.vote_granted).count();
        granted >= self.quorum()
    }

    pub fn become_leader(&mut self) {
        self.role = Role::Leader;
        self.leader = Some(self.own_leader_info());
        self.append_command(Command::Noop);

        let next = self.last_log_index();
        self.next_index.clear();
        self.match_index.clear();
        for peer in self.peers() {
            self.next_index.insert(peer.service_id.clone(), next);
            self.match_index.insert(peer.service_id, 0);
        }
    }

    /// Appends a command to the leader's log and returns its index.
    pub fn append_command(&mut self, command: Command) -> u64 {
        let index = self.last_log_index() + 1;
        self.log.push(LogEntry {
            term: self.current_term,
            index,
            command,
        });
        self.advance_commit();
        index
    }

    pub fn append_request_for(&self, peer_id: &str) -> AppendRequest {
        let last = self.last_log_index();
        let next = self
            .next_index
            .get(peer_id)
            .copied()
            .unwrap_or(last + 1)
            .clamp(1, last + 1);
        let prev_log_index = next - 1;

        AppendRequest {
            term: self.current_term,
            leader_id: self.service_id.clone(),
            leader_address: self.address.clone(),
            prev_log_index,
            prev_log_term: self.term_at(prev_log_index).unwrap_or(0),
            entries: self.log[prev_log_index as usize..].to_vec(),
            leader_commit: self.commit_index,
        }
    }

    pub fn handle_append_request(&mut self, req: &AppendRequest) -> AppendResponse {
        if req.term < self.current_term {
            return AppendResponse {
                term: self.current_term,
                success: false,
                match_index: self.last_log_index(),
            };
        }

        self.observe_term(req.term);
        self.role = Role::Follower;
        self.leader = Some(LeaderInfo {
            service_id: req.leader_id.clone(),
            address: req.leader_address.clone(),
            term: req.term,
        });
        self.reset_election_timer();

        if self.term_at(req.prev_log_index) != Some(req.prev_log_term) {
            return AppendResponse {
                term: self.current_term,
                success: false,
                match_index: self.last_log_index().min(req.prev_log_index.saturating_sub(1)),
            };
        }

        for entry in &req.entries {
            match self.term_at(entry.index) {
                Some(term) if term == entry.term => continue,
                Some(_) => {
                    self.log.truncate(entry.index as usize - 1);
                    self.log.push(entry.clone());
                }
                None => self.log.push(entry.clone()),
            }
        }

        let last_new = req.prev_log_index + req.entries.len() as u64;
        if req.leader_commit > self.commit_index {
            self.commit_index = self.commit_index.max(req.leader_commit.min(last_new));
        }

        AppendResponse {
            term: self.current_term,
            success: true,
            match_index: last_new,
        }
    }

    pub fn handle_append_response(
        &mut self,
        peer_id: &str,
        sent: &AppendRequest,
        response: &AppendResponse,
    ) {
        if self.observe_term(response.term) {
            return;
        }
        if self.role != Role::Leader || self.current_term != sent.term {
            return;
        }

        if response.success {
            let matched = sent.prev_log_index + sent.entries.len() as u64;
            let entry = self.match_index.entry(peer_id.to_string()).or_insert(0);
            *entry = (*entry).max(matched);
            self.next_index.insert(peer_id.to_string(), matched + 1);
            self.advance_commit();
        } else {
            let next = (response.match_index + 1).min(sent.prev_log_index).max(1);
            self.next_index.insert(peer_id.to_string(), next);
        }
    }

    /// Commits the highest index of the current term stored on a quorum.
    pub fn advance_commit(&mut self) -> bool {
        if self.role != Role::Leader {
            return false;
        }

        let quorum = self.quorum();
        let peers = self.peers();

        for index in (self.commit_index + 1..=self.last_log_index()).rev() {
            if self.term_at(index) != Some(self.current_term) {
                continue;
            }

            let replicas = 1 + peers
                .iter()
                .filter(|p| self.match_index.get(&p.service_id).copied().unwrap_or(0) >= index)
                .count();

            if replicas >= quorum {
                self.commit_index = index;
                return true;
            }
        }

        false
    }

    fn own_leader_info(&self) -> LeaderInfo {
        LeaderInfo {
            service_id: self.service_id.clone(),
            address: self.address.clone(),
            term: self.current_term,
        }
    }
}
