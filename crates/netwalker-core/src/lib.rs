pub mod channel;
pub mod collector;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod filter;
pub mod inventory;
pub mod logging;
pub mod model;
pub mod parsers;
pub mod platform;
pub mod report;
pub mod secrets;

// Import lazy_static for common regex patterns
#[macro_use]
extern crate lazy_static;

// Common regex patterns module
pub mod patterns {
    use regex::Regex;

    lazy_static! {
        // Device prompt at end of output, user or privileged mode
        pub static ref GENERIC_PROMPT_PATTERN: Regex = Regex::new(r"(?m)[>#]\s*$").unwrap();

        // Line ending normalization
        pub static ref CRLF_PATTERN: Regex = Regex::new(r"\r\n").unwrap();

        // Dotted-quad addresses inside parsed output
        pub static ref IP_ADDRESS_PATTERN: Regex =
            Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap();
    }
}

// Re-export core types
pub use collector::{Collector, CollectorSettings, SessionCollector};
pub use config::{
    load_seed_file, merge_seeds, parse_seed_list, resolve_credentials, WalkerConfig,
};
pub use connection::{Credentials, DeviceSession, SessionConfig};
pub use engine::{CancelToken, DiscoveryEngine, DiscoverySummary, EngineConfig, Seed};
pub use error::{StoreError, WalkError};
pub use filter::{Admission, GlobPattern, NeighborFilter, SkipReason};
pub use inventory::reconciler::Reconciler;
pub use inventory::store::SqliteInventory;
pub use inventory::{Inventory, MemoryInventory};
pub use logging::init_logging;
pub use model::{
    AdjacencyEdge, DeviceIdentity, DeviceRecord, DeviceStatus, Interface, Neighbor, Platform,
    QueueEntry, Transport, VlanRecord,
};
pub use platform::{commands_for, detect, CommandPlan};
pub use report::{ReportSink, TextReport};
