//! Local directory walker
//!
//! Enumerates files under a root on a dedicated thread and hands them to
//! the digest pool through a bounded channel.
//!
//! ```text
//! ┌──────────────────────┐      paths (bounded)     ┌──────────────────┐
//! │  walker thread       │ ───────────────────────▶ │  Digest workers  │
//! │  walkdir + skip re   │                          └──────────────────┘
//! └──────────┬───────────┘
//!            │ exactly one Result<(), WalkError>
//!            ▼
//!        completion
//! ```

pub mod files;

pub use files::{walk_files, FileWalk};
