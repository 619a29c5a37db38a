//! Forgeline-Core: Release Assembly and Auto-Integration Engine
//!
//! This crate implements the release engine over the storage abstractions of
//! `forgeline-state`:
//!
//! - `VersionAllocator`: race-free next-version issuance per branch
//! - `resolver`: effective dependency sets (declarations + name patterns)
//! - `VersionBumpCalculator`: minimal semantic bump between two dependency
//!   snapshots
//! - `ReleaseLifecycle`: the release state machine, mutation gate, and audit
//!   trail; the sole writer of release state
//! - `AutoIntegrationEngine`: cascading creation of product releases when a
//!   dependency enters ASSEMBLED
//!
//! ## Layer 1 - Domain/Orchestration
//!
//! Wire everything with [`engine::wire`]; releases created or transitioned
//! into ASSEMBLED then propagate into dependent product branches on detached
//! tasks.

pub mod allocator;
pub mod bump;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod resolver;
pub mod telemetry;
pub mod version;

pub use allocator::VersionAllocator;
pub use bump::VersionBumpCalculator;
pub use engine::{wire, AutoIntegrationEngine};
pub use error::{EngineError, Result};
pub use lifecycle::{AssembledHook, ReleaseInput, ReleaseLifecycle, ReleaseUpdate};
pub use notify::{NoopSink, NotificationSink, RecordingSink, ReleaseEventType};
pub use resolver::{resolve_effective_dependencies, ComponentListing};
pub use telemetry::{init_tracing, LogFormat};
pub use version::{
    BumpAction, CommitActionClassifier, ConventionalCommitClassifier, VersionSchema,
};
