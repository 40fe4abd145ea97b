use crate::collector::Collector;
use crate::error::WalkError;
use crate::filter::{Admission, NeighborFilter};
use crate::inventory::reconciler::Reconciler;
use crate::model::{DeviceRecord, DeviceStatus, Neighbor, QueueEntry};
use crate::parsers::identity::clean_hostname;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Hard cap on idle-timeout extensions.
const MAX_TIMEOUT_RESETS: u32 = 10;
/// Remaining fraction of the window below which an extension is considered.
const EXTEND_THRESHOLD: f64 = 0.2;
/// How long the queue may sit empty with idle workers before the engine
/// concludes no further work is coming. Admissions only originate from
/// in-flight workers, so one poll interval of slack is enough.
const QUEUE_IDLE_GRACE: Duration = Duration::from_millis(500);
/// Worker wait between polls of an empty queue.
const POP_WAIT: Duration = Duration::from_millis(250);

/// Cooperative cancellation flag shared with workers and collectors.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Engine tunables, typically derived from the `[discovery]` section.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_workers: usize,
    pub discovery_timeout: Duration,
    pub enable_progress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            discovery_timeout: Duration::from_secs(7200),
            enable_progress: true,
        }
    }
}

/// A seed device admitted at depth zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    pub hostname: String,
    pub ip: String,
}

struct EngineState {
    queue: VecDeque<QueueEntry>,
    visited_ips: HashSet<String>,
    visited_names: HashSet<String>,
    in_flight: usize,
    total_queued: u64,
    total_completed: u64,
    new_devices: u64,
    failed: u64,
    skipped: u64,
    boundary: u64,
    unwritten: u64,
    timeout_resets: u32,
    deadline: Instant,
    admitted_in_window: bool,
    last_admission: Instant,
    store_fatal: bool,
}

impl EngineState {
    fn new(discovery_timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            queue: VecDeque::new(),
            visited_ips: HashSet::new(),
            visited_names: HashSet::new(),
            in_flight: 0,
            total_queued: 0,
            total_completed: 0,
            new_devices: 0,
            failed: 0,
            skipped: 0,
            boundary: 0,
            unwritten: 0,
            timeout_resets: 0,
            deadline: now + discovery_timeout,
            admitted_in_window: false,
            last_admission: now,
            store_fatal: false,
        }
    }

    fn processed(&self) -> u64 {
        self.total_completed + self.failed
    }

    /// Check-and-insert against both visited sets; atomic under the engine
    /// mutex.
    fn mark_visited(&mut self, ip: &str, name: &str) -> bool {
        let fresh_ip = ip.is_empty() || !self.visited_ips.contains(ip);
        let fresh_name = name.is_empty() || !self.visited_names.contains(name);
        if !fresh_ip || !fresh_name {
            return false;
        }
        if !ip.is_empty() {
            self.visited_ips.insert(ip.to_string());
        }
        if !name.is_empty() {
            self.visited_names.insert(name.to_string());
        }
        true
    }

    fn should_stop(&self) -> bool {
        if !self.queue.is_empty() || self.in_flight > 0 {
            return false;
        }
        Instant::now() >= self.deadline || self.last_admission.elapsed() >= QUEUE_IDLE_GRACE
    }

    /// Idle-based timeout extension: with under 20% of the window left and
    /// at least one admission since the last check, push the deadline out by
    /// a full window. Capped at [`MAX_TIMEOUT_RESETS`].
    fn maybe_extend_deadline(&mut self, discovery_timeout: Duration) {
        if self.timeout_resets >= MAX_TIMEOUT_RESETS {
            return;
        }
        if !self.admitted_in_window {
            return;
        }
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.as_secs_f64() < discovery_timeout.as_secs_f64() * EXTEND_THRESHOLD {
            self.deadline = Instant::now() + discovery_timeout;
            self.timeout_resets += 1;
            self.admitted_in_window = false;
            info!(resets = self.timeout_resets, "Discovery window extended by idle timer");
            if self.timeout_resets == MAX_TIMEOUT_RESETS {
                warn!("Idle extension cap reached; discovery will end at the current deadline");
            }
        }
    }
}

/// Final accounting of one discovery run.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySummary {
    pub queued: u64,
    pub completed: u64,
    pub new_devices: u64,
    pub failed: u64,
    pub boundary: u64,
    pub skipped: u64,
    pub timeout_resets: u32,
    pub unwritten: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
    pub store_failed: bool,
}

impl Display for DiscoverySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Discovery finished: {} queued, {} completed, {} new, {} failed, {} boundary, {} skipped, {} resets, {} unwritten in {}s{}",
            self.queued,
            self.completed,
            self.new_devices,
            self.failed,
            self.boundary,
            self.skipped,
            self.timeout_resets,
            self.unwritten,
            self.elapsed.as_secs(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// The concurrent discovery engine: a FIFO work queue drained by a fixed
/// worker pool, with atomic visited tracking and an idle-extended deadline.
pub struct DiscoveryEngine {
    config: EngineConfig,
    filter: NeighborFilter,
    collector: Arc<dyn Collector>,
    reconciler: Arc<Reconciler>,
    state: Arc<Mutex<EngineState>>,
    cancel: CancelToken,
}

impl DiscoveryEngine {
    pub fn new(
        config: EngineConfig,
        filter: NeighborFilter,
        collector: Arc<dyn Collector>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        let state = Arc::new(Mutex::new(EngineState::new(config.discovery_timeout)));
        Self {
            config,
            filter,
            collector,
            reconciler,
            state,
            cancel: CancelToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run discovery to completion and return the summary.
    pub async fn run(self: Arc<Self>, seeds: Vec<Seed>) -> Result<DiscoverySummary, WalkError> {
        let started = Instant::now();

        for seed in &seeds {
            self.admit_seed(seed);
        }
        let queued = {
            let state = self.state.lock();
            info!(seeds = seeds.len(), queued = state.total_queued, "Discovery starting");
            state.total_queued
        };
        if queued == 0 {
            return Ok(self.summary(started));
        }

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.max_workers {
            let engine = Arc::clone(&self);
            workers.spawn(async move {
                engine.worker_loop(worker_id).await;
            });
        }
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Discovery worker panicked");
            }
        }

        let summary = self.summary(started);
        info!(%summary, "Discovery complete");
        Ok(summary)
    }

    fn summary(&self, started: Instant) -> DiscoverySummary {
        let state = self.state.lock();
        DiscoverySummary {
            queued: state.total_queued,
            completed: state.total_completed,
            new_devices: state.new_devices,
            failed: state.failed,
            boundary: state.boundary,
            skipped: state.skipped,
            timeout_resets: state.timeout_resets,
            unwritten: state.unwritten,
            elapsed: started.elapsed(),
            cancelled: self.cancel.is_cancelled() && !state.store_fatal,
            store_failed: state.store_fatal,
        }
    }

    async fn worker_loop(&self, worker_id: usize) {
        debug!(worker_id, "Worker started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let entry = {
                let mut state = self.state.lock();
                if state.store_fatal || state.should_stop() {
                    break;
                }
                match state.queue.pop_front() {
                    Some(entry) => {
                        state.in_flight += 1;
                        Some(entry)
                    }
                    None => None,
                }
            };
            let Some(entry) = entry else {
                tokio::time::sleep(POP_WAIT).await;
                continue;
            };

            debug!(worker_id, ip = %entry.ip, depth = entry.depth, "Processing queue entry");
            self.process_entry(entry).await;

            let mut state = self.state.lock();
            state.in_flight -= 1;
            state.maybe_extend_deadline(self.config.discovery_timeout);
        }
        debug!(worker_id, "Worker exiting");
    }

    async fn process_entry(&self, entry: QueueEntry) {
        // Session I/O is blocking ssh2 under the hood
        let collector = Arc::clone(&self.collector);
        let cancel = self.cancel.clone();
        let blocking_entry = entry.clone();
        let record = tokio::task::spawn_blocking(move || {
            collector.collect(&blocking_entry, &cancel)
        })
        .await;

        let record = match record {
            Ok(record) => record,
            Err(e) => {
                error!(ip = %entry.ip, error = %e, "Collector task panicked");
                let mut state = self.state.lock();
                state.failed += 1;
                self.emit_progress(&state);
                return;
            }
        };

        let walked = record.is_walked();
        match self.reconciler.persist_with_retry(&record).await {
            Ok((_, is_new)) => {
                if walked && is_new {
                    self.state.lock().new_devices += 1;
                }
            }
            Err(e) if e.is_transient() => {
                warn!(hostname = %record.identity.hostname, error = %e,
                      "Store retries exhausted; buffering record");
                log_unwritten(&record);
                self.state.lock().unwritten += 1;
            }
            Err(e) => {
                error!(error = %e, "Fatal store error; aborting discovery");
                self.state.lock().store_fatal = true;
                self.cancel.cancel();
            }
        }

        if walked {
            for neighbor in &record.neighbors {
                self.admit_neighbor(neighbor, &entry).await;
            }
        }

        let mut state = self.state.lock();
        if walked {
            state.total_completed += 1;
            println!(
                "[OK] {} ({}) {}",
                record.identity.hostname, entry.ip, record.identity.platform
            );
        } else {
            state.failed += 1;
            println!(
                "[FAIL] {} ({}) {}",
                record.identity.hostname,
                entry.ip,
                record.failure.as_deref().unwrap_or("unknown")
            );
        }
        self.emit_progress(&state);
    }

    fn admit_seed(&self, seed: &Seed) {
        let name = clean_hostname(&seed.hostname);
        let mut state = self.state.lock();
        if seed.ip.is_empty() || !state.mark_visited(&seed.ip, &name) {
            debug!(hostname = %seed.hostname, "Duplicate seed dropped");
            return;
        }
        state.queue.push_back(QueueEntry {
            hostname_hint: seed.hostname.clone(),
            ip: seed.ip.clone(),
            depth: 0,
            origin: "seed".to_string(),
        });
        state.total_queued += 1;
        state.admitted_in_window = true;
        state.last_admission = Instant::now();
    }

    async fn admit_neighbor(&self, neighbor: &Neighbor, parent: &QueueEntry) {
        let name = neighbor.remote_hostname.clone();
        let admission = {
            let mut state = self.state.lock();
            let already_visited = state.visited_ips.contains(&neighbor.remote_ip)
                || state.visited_names.contains(&name);
            let admission = self.filter.evaluate(neighbor, parent.depth, already_visited);
            match admission {
                Admission::Queue => {
                    if !state.mark_visited(&neighbor.remote_ip, &name) {
                        // Lost a race with another worker
                        return;
                    }
                    state.queue.push_back(QueueEntry {
                        hostname_hint: name.clone(),
                        ip: neighbor.remote_ip.clone(),
                        depth: parent.depth + 1,
                        origin: parent.hostname_hint.clone(),
                    });
                    state.total_queued += 1;
                    state.admitted_in_window = true;
                    state.last_admission = Instant::now();
                }
                Admission::Boundary | Admission::Skip(_) => {
                    // Disposition once; repeats drop at the visited check
                    state.mark_visited(&neighbor.remote_ip, &name);
                    if admission == Admission::Boundary {
                        state.boundary += 1;
                    } else {
                        state.skipped += 1;
                    }
                }
                Admission::Drop => {}
            }
            admission
        };

        let status = match admission {
            Admission::Boundary => Some(DeviceStatus::Boundary),
            Admission::Skip(_) => Some(DeviceStatus::Skipped),
            _ => None,
        };
        if let Some(status) = status {
            if let Err(e) = self.reconciler.record_disposition(neighbor, status).await {
                warn!(remote = %neighbor.remote_hostname, error = %e,
                      "Could not persist neighbor disposition");
            }
        }
    }

    fn emit_progress(&self, state: &EngineState) {
        if !self.config.enable_progress || state.total_queued == 0 {
            return;
        }
        let done = state.processed();
        let pct = done * 100 / state.total_queued;
        let remaining = state.total_queued.saturating_sub(done);
        println!(
            "****** ({} of {}) {}% complete - {} remaining ******",
            done, state.total_queued, pct, remaining
        );
    }
}

/// Flush handling for a record the store never accepted; summarized by the
/// `unwritten` counter. Retained for operator follow-up at debug level.
pub fn log_unwritten(record: &DeviceRecord) {
    debug!(
        hostname = %record.identity.hostname,
        ip = %record.identity.primary_ip,
        "Record not persisted"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse_glob_list;
    use crate::inventory::{Inventory, MemoryInventory};
    use crate::model::{DeviceIdentity, NeighborProtocol};
    use std::collections::{BTreeSet, HashMap};

    /// Scripted collector: canned records keyed by IP.
    struct ScriptedCollector {
        records: HashMap<String, DeviceRecord>,
    }

    impl Collector for ScriptedCollector {
        fn collect(&self, entry: &QueueEntry, _cancel: &CancelToken) -> DeviceRecord {
            match self.records.get(&entry.ip) {
                Some(record) => record.clone(),
                None => DeviceRecord::failed(
                    DeviceIdentity::observed(clean_hostname(&entry.hostname_hint), &entry.ip),
                    "connect-refused",
                ),
            }
        }
    }

    fn neighbor(hostname: &str, ip: &str, caps: &[&str]) -> Neighbor {
        Neighbor {
            local_port: "Gi1/0/1".to_string(),
            remote_hostname: hostname.to_string(),
            remote_port: "Gi1/0/2".to_string(),
            remote_ip: ip.to_string(),
            remote_platform: "cisco WS-C2960X".to_string(),
            remote_capabilities: caps.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
            remote_serial: None,
            protocol: NeighborProtocol::Cdp,
        }
    }

    fn walked(hostname: &str, serial: &str, ip: &str, neighbors: Vec<Neighbor>) -> DeviceRecord {
        let mut identity = DeviceIdentity::observed(hostname, ip);
        identity.serial = serial.to_string();
        identity.status = DeviceStatus::Walked;
        DeviceRecord {
            identity,
            interfaces: Vec::new(),
            vlans: Vec::new(),
            neighbors,
            transport: None,
            failure: None,
        }
    }

    fn engine_with(
        records: Vec<(&str, DeviceRecord)>,
        max_depth: u32,
        exclude_capabilities: &str,
    ) -> (Arc<DiscoveryEngine>, Arc<MemoryInventory>) {
        let inventory = Arc::new(MemoryInventory::new());
        let reconciler = Arc::new(Reconciler::new(inventory.clone()));
        let filter = NeighborFilter::new(
            max_depth,
            Vec::new(),
            parse_glob_list(exclude_capabilities),
            Vec::new(),
            Vec::new(),
        );
        let collector = Arc::new(ScriptedCollector {
            records: records
                .into_iter()
                .map(|(ip, r)| (ip.to_string(), r))
                .collect(),
        });
        let engine = DiscoveryEngine::new(
            EngineConfig {
                max_workers: 4,
                discovery_timeout: Duration::from_secs(30),
                enable_progress: false,
            },
            filter,
            collector,
            reconciler,
        );
        (Arc::new(engine), inventory)
    }

    #[tokio::test]
    async fn test_seed_with_excluded_phone_neighbor() {
        let core = walked(
            "CORE-A",
            "S1",
            "10.1.1.1",
            vec![
                neighbor("SW01", "10.1.1.10", &["Switch"]),
                neighbor("IPPHONE", "10.1.1.99", &["Phone"]),
            ],
        );
        let sw = walked("SW01", "S2", "10.1.1.10", Vec::new());
        let (engine, inventory) = engine_with(
            vec![("10.1.1.1", core), ("10.1.1.10", sw)],
            9,
            "*phone*,host",
        );

        let summary = engine
            .run(vec![Seed {
                hostname: "CORE-A".to_string(),
                ip: "10.1.1.1".to_string(),
            }])
            .await
            .unwrap();

        assert_eq!(summary.queued, 2);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.new_devices, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);

        let phone = inventory.devices_by_hostname("IPPHONE").await.unwrap();
        assert_eq!(phone.len(), 1);
        assert_eq!(phone[0].identity.status, DeviceStatus::Skipped);
    }

    #[tokio::test]
    async fn test_no_ip_or_cleaned_hostname_queues_twice() {
        // Both devices advertise each other; the cycle must not re-queue
        let core = walked(
            "CORE-A",
            "S1",
            "10.1.1.1",
            vec![neighbor("SW01", "10.1.1.10", &["Switch"])],
        );
        let sw = walked(
            "SW01",
            "S2",
            "10.1.1.10",
            vec![neighbor("CORE-A", "10.1.1.1", &["Switch"])],
        );
        let (engine, _) = engine_with(vec![("10.1.1.1", core), ("10.1.1.10", sw)], 9, "");

        let summary = engine
            .run(vec![Seed {
                hostname: "CORE-A".to_string(),
                ip: "10.1.1.1".to_string(),
            }])
            .await
            .unwrap();

        assert_eq!(summary.queued, 2);
        assert_eq!(summary.completed, 2);
    }

    #[tokio::test]
    async fn test_unreachable_seed_does_not_block_others() {
        let sw = walked("SW01", "S2", "10.1.1.10", Vec::new());
        let (engine, inventory) = engine_with(vec![("10.1.1.10", sw)], 9, "");

        let summary = engine
            .run(vec![
                Seed {
                    hostname: "DEAD-SW".to_string(),
                    ip: "10.9.9.9".to_string(),
                },
                Seed {
                    hostname: "SW01".to_string(),
                    ip: "10.1.1.10".to_string(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(summary.queued, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);

        let dead = inventory.devices_by_hostname("DEAD-SW").await.unwrap();
        assert_eq!(dead[0].identity.status, DeviceStatus::Failed);
    }

    #[tokio::test]
    async fn test_depth_boundary_is_persisted_not_walked() {
        let core = walked(
            "CORE-A",
            "S1",
            "10.1.1.1",
            vec![neighbor("SW01", "10.1.1.10", &["Switch"])],
        );
        let sw = walked("SW01", "S2", "10.1.1.10", Vec::new());
        let (engine, inventory) = engine_with(vec![("10.1.1.1", core), ("10.1.1.10", sw)], 0, "");

        let summary = engine
            .run(vec![Seed {
                hostname: "CORE-A".to_string(),
                ip: "10.1.1.1".to_string(),
            }])
            .await
            .unwrap();

        // max_depth 0 walks only the seed
        assert_eq!(summary.queued, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.boundary, 1);

        let sw_rows = inventory.devices_by_hostname("SW01").await.unwrap();
        assert_eq!(sw_rows[0].identity.status, DeviceStatus::Boundary);
    }

    #[tokio::test]
    async fn test_neighbor_without_ip_dropped_silently() {
        let core = walked(
            "CORE-A",
            "S1",
            "10.1.1.1",
            vec![neighbor("DARKSW", "", &["Switch"])],
        );
        let (engine, inventory) = engine_with(vec![("10.1.1.1", core)], 9, "");

        let summary = engine
            .run(vec![Seed {
                hostname: "CORE-A".to_string(),
                ip: "10.1.1.1".to_string(),
            }])
            .await
            .unwrap();

        assert_eq!(summary.queued, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.skipped, 0);

        // The edge still created a placeholder so the graph is complete,
        // but nothing was queued for it
        let dark = inventory.devices_by_hostname("DARKSW").await.unwrap();
        assert_eq!(dark.len(), 1);
        assert_eq!(dark[0].identity.status, DeviceStatus::Observed);
    }

    #[tokio::test]
    async fn test_second_run_has_no_new_devices() {
        let core = walked(
            "CORE-A",
            "S1",
            "10.1.1.1",
            vec![neighbor("SW01", "10.1.1.10", &["Switch"])],
        );
        let sw = walked("SW01", "S2", "10.1.1.10", Vec::new());

        let inventory = Arc::new(MemoryInventory::new());
        let reconciler = Arc::new(Reconciler::new(inventory.clone()));
        let seeds = vec![Seed {
            hostname: "CORE-A".to_string(),
            ip: "10.1.1.1".to_string(),
        }];

        let mut totals = Vec::new();
        for _ in 0..2 {
            let collector = Arc::new(ScriptedCollector {
                records: HashMap::from([
                    ("10.1.1.1".to_string(), core.clone()),
                    ("10.1.1.10".to_string(), sw.clone()),
                ]),
            });
            let engine = Arc::new(DiscoveryEngine::new(
                EngineConfig {
                    max_workers: 2,
                    discovery_timeout: Duration::from_secs(30),
                    enable_progress: false,
                },
                NeighborFilter::new(9, Vec::new(), Vec::new(), Vec::new(), Vec::new()),
                collector,
                reconciler.clone(),
            ));
            totals.push(engine.run(seeds.clone()).await.unwrap());
        }

        assert_eq!(totals[0].new_devices, 2);
        assert_eq!(totals[1].new_devices, 0);
        assert_eq!(inventory.all_devices().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_workers() {
        let core = walked(
            "CORE-A",
            "S1",
            "10.1.1.1",
            vec![neighbor("SW01", "10.1.1.10", &["Switch"])],
        );
        let (engine, _) = engine_with(vec![("10.1.1.1", core)], 9, "");
        engine.cancel_token().cancel();

        let summary = engine
            .run(vec![Seed {
                hostname: "CORE-A".to_string(),
                ip: "10.1.1.1".to_string(),
            }])
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.completed, 0);
    }
}
