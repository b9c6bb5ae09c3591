//! Workspace archive streaming

mod ignore;
mod stream;
mod walk;

pub use ignore::IgnoreSet;
pub use stream::{build_archive, ArchiveStream};
pub use walk::{FileEntry, WorkspaceWalk};
