//! Client synchronization: versioned snapshots, per-table timelines,
//! session lifecycle, and the sync orchestrator.

pub mod diff;
pub mod errors;
pub mod service;
pub mod session;
pub mod snapshot;
pub mod timeline;

pub use diff::{DiffOp, DiffOpKind, StateDiff};
pub use errors::{DiffError, SessionError, SyncError};
pub use service::{
    ConnectResponse, ConsistencyReport, SyncRequest, SyncResponse, SyncService, TableBlinds,
};
pub use session::{
    ClientSession, DisconnectReason, ReconnectResponse, ResumeToken, SessionManager, SessionStatus,
};
pub use snapshot::{SnapshotManager, StateSnapshot};
pub use timeline::{Attribution, GapReport, TimelineEntry, TimelineManager};
