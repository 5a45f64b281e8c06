//! # Cadence Core Library
//!
//! Core logic for the Cadence daily request scheduler. An operator works
//! through each tracked account's milestone requests in order, and each
//! request only becomes eligible once the account's in-game clock has
//! caught up with it. The core turns catalog data into a batched daily
//! plan, reports when every task becomes ready, and records completions.
//!
//! ## Architecture
//!
//! - **Grouper**: Turns raw candidate requests into ordered groups, and
//!   synthesizes purchase timings from neighbouring levels
//! - **Planner**: Round-robin batching across games, one task per account per batch
//! - **Readiness**: Pure countdown evaluation (blocked, cooldown, initial delay)
//! - **Completion**: Gateway-first completion recording with ledger updates
//! - **Storage**: SQLite-backed operational cache and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`Engine`]: Owns the plan and drives generation and completion
//! - [`AccountGateway`]: Trait for the backing catalog and progress store
//! - [`OperationalCache`]: Assignment history, completion anchors and the ledger
//! - [`Config`]: Application configuration management

pub mod cache;
pub mod completion;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod grouper;
pub mod model;
pub mod planner;
pub mod readiness;
pub mod storage;

pub use cache::{CacheRetention, CacheStore, MemoryStore, OperationalCache, SqliteStore};
pub use completion::{Completion, CompletionOutcome, CompletionRecorder};
pub use engine::{Engine, GenerateReport, Skipped};
pub use error::{CacheError, ConfigError, CoreError, GatewayError, InvariantError};
pub use events::Event;
pub use gateway::{AccountGateway, GameCatalog, InMemoryGateway};
pub use grouper::{group_requests, interpolate_purchase_time, JitterSource};
pub use model::{
    Account, AccountCompletionRecord, AccountStartState, AccountTaskAssignment, CompletedDailyTask,
    DailyTask, Game, GameBatch, Level, Milestone, PurchaseEvent, RequestGroup, RequestItem,
    RequestKind, RequestType,
};
pub use planner::{account_batch_indices, plan_batches, BatchPlan, GameTasks};
pub use readiness::{evaluate, evaluate_batches, Readiness, ReadinessState, TaskStatus};
pub use storage::{data_dir, Config, EngineConfig, StorageConfig};
