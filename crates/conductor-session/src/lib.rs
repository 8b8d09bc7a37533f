//! Run state and persistence for the Conductor engine.
//!
//! # Main types
//!
//! - [`RunState`]: The single record threaded through a run.
//! - [`StateDelta`]: A partial update returned by a node, merged per field.
//! - [`StateStore`]: Versioned, write-through owner of every run.
//! - [`CheckpointStore`]: Durable checkpoint backends (SQLite, file, memory).
//! - [`TranscriptStore`]: JSONL log of node events per run.

/// Checkpoint trait and the file and in-memory backends.
pub mod checkpoint;
/// Partial updates and their merge rules.
pub mod delta;
/// SQLite checkpoint backend.
pub mod sqlite;
/// The run state record.
pub mod state;
/// Versioned state store.
pub mod store;
/// Node event log.
pub mod transcript;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use delta::StateDelta;
pub use sqlite::SqliteCheckpointStore;
pub use state::{
    RunOutcome, RunPhase, RunState, RunStatus, SubmissionRecord, Subtask, SubtaskFailure,
    WorkerKind,
};
pub use store::{Snapshot, StateStore};
pub use transcript::{FileTranscriptStore, TranscriptEntry, TranscriptEvent, TranscriptStore};
