//! Forgeline-State: Release Evidence Storage Layer
//!
//! This crate provides the persistence abstractions for the Forgeline release
//! assembly engine. It defines the domain records (releases, branches,
//! components, version assignments) and the async storage traits the engine
//! writes through, plus in-memory fakes for testing.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: record integrity and uniqueness guarantees.
//!
//! ## Key Components
//!
//! - `Release`, `BranchRecord`, `ComponentRecord`: the domain records
//! - `ReleaseStore`, `BranchProvider`, `VersionAssignmentStore`: storage traits
//! - `AuditLog`: append-only pre-save snapshots
//! - `fakes`: in-memory implementations of every trait

mod error;
pub mod fakes;
mod model;
pub mod stores;

pub use error::{StorageError, StorageResult};
pub use model::{
    AssignmentType, AutoIntegrate, BranchRecord, BranchType, ChildComponent, ComponentRecord,
    DependencyPattern, DependencyStatus, Lifecycle, ParentRelease, Release, Removable, TagRecord,
    UpdateAction, UpdateEvent, UpdateScope, UpdateStrength, VersionAssignment, VersionType,
};
pub use stores::{
    AuditLog, BranchProvider, CommitLog, ComponentProvider, ReleaseStore, VersionAssignmentStore,
};
