//! # Discovery Node
//!
//! One participant on the discovery channel. A node:
//!
//! - stores verified records it published or fetched ([`RecordStore`]),
//! - tracks peers from their announcements ([`PeerTable`]),
//! - answers `hash-request` frames for chips it holds,
//! - resolves chips it does not hold by probing known peers, the local
//!   node, public gateways, and finally a `hash-request` broadcast.
//!
//! ## Lifecycle
//!
//! [`DiscoveryNode::start`] spawns a background task that announces this
//! node periodically, prunes stale peers, and dispatches incoming frames.
//! [`DiscoveryNode::stop`] signals the task over a watch channel and waits
//! for it. Dropping a running node aborts the task.
//!
//! Lookups do not depend on the background task: a node that was never
//! started can still publish, look up and serve records over HTTP.

use std::sync::Arc;

use meld_core::{ChipUid, ContentDigest, Timestamp};
use meld_crypto::IdentityRecord;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::bus::LocalBus;
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::gateway::GatewayClient;
use crate::messages::{
    DiscoveryMessage, HashRequest, HashResponse, IdentityAnnouncement, PeerAnnouncement,
};
use crate::peers::{PeerId, PeerNode, PeerTable};
use crate::store::{locator_hash, RecordStore};

struct RunningTask {
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

struct NodeInner {
    config: DiscoveryConfig,
    bus: LocalBus,
    gateway: GatewayClient,
    peers: RwLock<PeerTable>,
    records: RwLock<RecordStore>,
}

/// A discovery participant. See the module docs.
pub struct DiscoveryNode {
    inner: Arc<NodeInner>,
    task: Mutex<Option<RunningTask>>,
}

impl std::fmt::Debug for DiscoveryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryNode")
            .field("peer_id", &self.inner.config.peer_id)
            .field("running", &self.is_running())
            .finish()
    }
}

impl DiscoveryNode {
    pub fn new(config: DiscoveryConfig, bus: LocalBus) -> Result<Self, DiscoveryError> {
        Ok(Self {
            inner: Arc::new(NodeInner {
                config,
                bus,
                gateway: GatewayClient::new()?,
                peers: RwLock::new(PeerTable::new()),
                records: RwLock::new(RecordStore::new()),
            }),
            task: Mutex::new(None),
        })
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.inner.config.peer_id
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.inner.config
    }

    /// Spawn the background task. Must be called within a Tokio runtime.
    pub fn start(&self) -> Result<(), DiscoveryError> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(DiscoveryError::AlreadyRunning);
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        // Subscribe before returning so no frame published after `start` is missed.
        let frames = self.inner.bus.subscribe();
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            tracing::debug!(peer_id = %inner.config.peer_id, "discovery task starting");
            inner.clone().run(frames, shutdown_rx).await;
            tracing::debug!(peer_id = %inner.config.peer_id, "discovery task stopped");
        });
        *task = Some(RunningTask {
            shutdown_tx,
            handle,
        });
        tracing::info!(peer_id = %self.peer_id(), "discovery node started");
        Ok(())
    }

    /// Signal the background task and wait for it to finish. No-op if not running.
    pub async fn stop(&self) {
        let running = self.task.lock().take();
        if let Some(RunningTask {
            shutdown_tx,
            handle,
        }) = running
        {
            let _ = shutdown_tx.send(());
            if let Err(e) = handle.await {
                tracing::warn!(peer_id = %self.peer_id(), error = %e, "discovery task ended abnormally");
            }
            tracing::info!(peer_id = %self.peer_id(), "discovery node stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Verify, store and announce a record. Returns its content hash.
    pub fn publish_record(&self, record: IdentityRecord) -> Result<ContentDigest, DiscoveryError> {
        let chip_uid = record.chip_uid.clone();
        let hash = self.inner.records.write().insert(record)?;
        self.inner
            .send(&DiscoveryMessage::IdentityAnnouncement(IdentityAnnouncement {
                chip_uid: chip_uid.clone(),
                content_hash: hash,
                timestamp: Timestamp::now(),
            }))?;
        tracing::info!(chip_uid = %chip_uid, content_hash = %hash, "identity record published");
        Ok(hash)
    }

    /// Broadcast a peer announcement now, outside the periodic schedule.
    pub fn announce(&self) -> Result<(), DiscoveryError> {
        self.inner.announce()
    }

    /// Resolve a content hash or locator hash from local storage only.
    pub fn record_by_hash(&self, hash: &ContentDigest) -> Option<IdentityRecord> {
        self.inner.records.read().get(hash).cloned()
    }

    /// The locally stored current record for a chip.
    pub fn local_record(&self, chip_uid: &ChipUid) -> Option<IdentityRecord> {
        self.inner.records.read().current_for(chip_uid).cloned()
    }

    /// Known peers, most recently seen first.
    pub fn peers(&self) -> Vec<PeerNode> {
        self.inner.peers.read().snapshot()
    }

    pub fn record_count(&self) -> usize {
        self.inner.records.read().len()
    }

    /// Resolve the current record for a chip.
    ///
    /// Order: local store, peers that announced one of the chip's hashes,
    /// the local node, public gateways, then a `hash-request` broadcast.
    /// Every record found is verified and stored before it is returned.
    /// Returns `None` if nothing verifiable turns up.
    ///
    /// The HTTP probes share `probe_deadline` and the broadcast waits at most
    /// `broadcast_timeout`, so a lookup is bounded by their sum.
    pub async fn lookup(&self, chip_uid: &ChipUid) -> Option<IdentityRecord> {
        if let Some(record) = self.local_record(chip_uid) {
            return Some(record);
        }
        let probed =
            tokio::time::timeout(self.inner.config.probe_deadline, self.inner.probe_http(chip_uid))
                .await
                .unwrap_or_else(|_| {
                    tracing::debug!(chip_uid = %chip_uid, "HTTP probes exceeded deadline");
                    None
                });
        let found = match probed {
            Some(record) => Some(record),
            None => self.inner.broadcast_lookup(chip_uid).await,
        };
        let record = found?;
        if let Err(e) = self.inner.records.write().insert(record.clone()) {
            tracing::debug!(chip_uid = %chip_uid, error = %e, "discarding unverifiable record");
            return None;
        }
        Some(record)
    }
}

impl Drop for DiscoveryNode {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.handle.abort();
        }
    }
}

impl NodeInner {
    fn send(&self, message: &DiscoveryMessage) -> Result<usize, DiscoveryError> {
        Ok(self.bus.publish(message.encode()?))
    }

    fn announce(&self) -> Result<(), DiscoveryError> {
        let known_hashes = self.records.read().known_hashes();
        self.send(&DiscoveryMessage::PeerAnnouncement(PeerAnnouncement {
            peer_id: self.config.peer_id.clone(),
            endpoint: self.config.endpoint.clone(),
            timestamp: Timestamp::now(),
            known_hashes,
        }))?;
        Ok(())
    }

    fn prune_peers(&self) {
        let removed = self
            .peers
            .write()
            .prune(Timestamp::now(), self.config.peer_ttl);
        if removed > 0 {
            tracing::debug!(removed, "pruned stale peers");
        }
    }

    async fn run(
        self: Arc<Self>,
        mut frames: broadcast::Receiver<String>,
        mut shutdown_rx: watch::Receiver<()>,
    ) {
        let mut announce = tokio::time::interval(self.config.announce_interval.max(MIN_TICK));
        announce.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut prune = tokio::time::interval(self.config.prune_interval.max(MIN_TICK));
        prune.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = announce.tick() => {
                    if let Err(e) = self.announce() {
                        tracing::warn!(error = %e, "peer announcement failed");
                    }
                }
                _ = prune.tick() => self.prune_peers(),
                frame = frames.recv() => match frame {
                    Ok(frame) => self.handle_frame(&frame),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "discovery task lagged; frames dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    fn handle_frame(&self, frame: &str) {
        let message = match DiscoveryMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed discovery frame");
                return;
            }
        };
        match message {
            DiscoveryMessage::PeerAnnouncement(announcement) => {
                if announcement.peer_id == self.config.peer_id {
                    return;
                }
                if self.peers.write().observe(&announcement, Timestamp::now()) {
                    tracing::debug!(peer_id = %announcement.peer_id, "discovered peer");
                }
            }
            DiscoveryMessage::IdentityAnnouncement(announcement) => {
                self.records
                    .write()
                    .hint(announcement.chip_uid, announcement.content_hash);
            }
            DiscoveryMessage::HashRequest(request) => {
                if request.requester_id == self.config.peer_id {
                    return;
                }
                let record = self.records.read().current_for(&request.chip_uid).cloned();
                if let Some(record) = record {
                    let response = DiscoveryMessage::HashResponse(HashResponse {
                        chip_uid: request.chip_uid,
                        request_id: request.request_id,
                        record,
                    });
                    if let Err(e) = self.send(&response) {
                        tracing::warn!(error = %e, "failed to answer hash request");
                    }
                }
            }
            DiscoveryMessage::HashResponse(response) => {
                if response.record.chip_uid != response.chip_uid {
                    return;
                }
                if let Err(e) = self.records.write().insert(response.record) {
                    tracing::debug!(error = %e, "discarding unverifiable gossiped record");
                }
            }
        }
    }

    async fn probe_http(&self, chip_uid: &ChipUid) -> Option<IdentityRecord> {
        let hints = self.records.read().hints_for(chip_uid);

        let holders: Vec<(PeerNode, ContentDigest)> = {
            let peers = self.peers.read();
            hints
                .iter()
                .flat_map(|hash| {
                    peers
                        .holders_of(hash)
                        .into_iter()
                        .map(move |peer| (peer, *hash))
                })
                .collect()
        };
        for (peer, hash) in holders {
            let Some(endpoint) = peer.endpoint.as_ref() else {
                continue;
            };
            if let Some(record) = self
                .gateway
                .fetch(endpoint, &hash, self.config.gateway_timeout)
                .await
                .filter(|r| r.chip_uid == *chip_uid)
            {
                tracing::debug!(chip_uid = %chip_uid, peer_id = %peer.peer_id, "resolved from peer");
                return Some(record);
            }
        }

        let mut candidates = hints;
        match locator_hash(chip_uid) {
            Ok(locator) => candidates.push(locator),
            Err(e) => tracing::debug!(error = %e, "locator hash unavailable"),
        }

        let endpoints = self
            .config
            .local_node
            .iter()
            .map(|url| (url, self.config.local_probe_timeout))
            .chain(
                self.config
                    .gateways
                    .iter()
                    .map(|url| (url, self.config.gateway_timeout)),
            );
        for (base, timeout) in endpoints {
            for hash in &candidates {
                if let Some(record) = self
                    .gateway
                    .fetch(base, hash, timeout)
                    .await
                    .filter(|r| r.chip_uid == *chip_uid)
                {
                    tracing::debug!(chip_uid = %chip_uid, gateway = %base, "resolved from gateway");
                    return Some(record);
                }
            }
        }
        None
    }

    async fn broadcast_lookup(&self, chip_uid: &ChipUid) -> Option<IdentityRecord> {
        let mut frames = self.bus.subscribe();
        let request_id = Uuid::new_v4();
        let request = DiscoveryMessage::HashRequest(HashRequest {
            chip_uid: chip_uid.clone(),
            request_id,
            requester_id: self.config.peer_id.clone(),
        });
        if let Err(e) = self.send(&request) {
            tracing::warn!(error = %e, "failed to broadcast hash request");
            return None;
        }

        let deadline = tokio::time::Instant::now() + self.config.broadcast_timeout;
        loop {
            let frame = match tokio::time::timeout_at(deadline, frames.recv()).await {
                Err(_) => {
                    tracing::debug!(chip_uid = %chip_uid, %request_id, "hash request timed out");
                    return None;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Ok(frame)) => frame,
            };
            let Ok(DiscoveryMessage::HashResponse(response)) = DiscoveryMessage::decode(&frame)
            else {
                continue;
            };
            if response.request_id == request_id
                && response.record.chip_uid == *chip_uid
                && response.record.is_authentic()
            {
                return Some(response.record);
            }
        }
    }
}

const MIN_TICK: std::time::Duration = std::time::Duration::from_millis(1);
