//! Memo domain model.
//!
//! # Responsibility
//! - Define the canonical memo snapshot used by every storage backend and
//!   every migration step.
//!
//! # Invariants
//! - Every memo is identified by a stable `MemoId`.
//! - Snapshots are immutable; changes produce new values.

pub mod memo;
