//! Typed remote shell requests
//!
//! Each variant is one operation the controller asks a host's shell to
//! perform. `render` is the only place where these requests become command
//! strings, so composition and quoting are decided once.
//!
//! # Rendered forms
//!
//! With the default [`RemoteLayout`](crate::RemoteLayout):
//!
//! ```text
//! mkdir -p job && rm -rf job/*
//! cat > job/mesh.tar && cd job && tar -xf mesh.tar
//! cd job && echo ready
//! touch job/output.log
//! sh -c 'cd job && RANK=0 python train.py > output.log 2>&1'
//! setsid <command> > /dev/null 2>&1 < /dev/null &
//! tail -f job/output.log
//! pkill -9 python && rm -rf job
//! ```
//!
//! User supplied commands (pre-run steps, the job itself) are shell snippets
//! by design and are inserted verbatim. Paths are quoted with
//! [`quote`](crate::quote).

use std::fmt;

use crate::quote::quote;

/// Environment variable carrying the host's index into the job
pub const RANK_VAR: &str = "RANK";

/// A single request to a remote shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    /// Create the job directory and remove anything inside it
    PrepareDir { dir: String },

    /// Write stdin to `dir/archive`, then extract it inside `dir`
    ReceiveArchive { dir: String, archive: String },

    /// Run a user command from inside `dir`
    InDir { dir: String, command: String },

    /// Create an empty file (or refresh an existing one)
    Touch { path: String },

    /// The job body: run `command` inside `dir` with its rank exported and
    /// all output appended to `log`, as one `sh -c` word
    Job {
        dir: String,
        command: String,
        rank: usize,
        log: String,
    },

    /// Detach `command` from the session: new session, streams closed,
    /// backgrounded
    Detach { command: String },

    /// Follow a file as it grows
    Tail { path: String },

    /// Kill processes matching `pattern` and remove `dir`
    Cleanup { pattern: String, dir: String },

    /// A raw command passed through unchanged
    Raw(String),
}

impl RemoteCommand {
    /// Render the request as the command string sent to the host
    pub fn render(&self) -> String {
        match self {
            RemoteCommand::PrepareDir { dir } => {
                let dir = quote(dir);
                format!("mkdir -p {dir} && rm -rf {dir}/*")
            }
            RemoteCommand::ReceiveArchive { dir, archive } => {
                let dir = quote(dir);
                let archive = quote(archive);
                format!("cat > {dir}/{archive} && cd {dir} && tar -xf {archive}")
            }
            RemoteCommand::InDir { dir, command } => {
                format!("cd {} && {}", quote(dir), command)
            }
            RemoteCommand::Touch { path } => format!("touch {}", quote(path)),
            RemoteCommand::Job {
                dir,
                command,
                rank,
                log,
            } => {
                let body = format!(
                    "cd {} && {}={} {} > {} 2>&1",
                    quote(dir),
                    RANK_VAR,
                    rank,
                    command,
                    quote(log)
                );
                format!("sh -c {}", quote(&body))
            }
            RemoteCommand::Detach { command } => {
                format!("setsid {command} > /dev/null 2>&1 < /dev/null &")
            }
            RemoteCommand::Tail { path } => format!("tail -f {}", quote(path)),
            RemoteCommand::Cleanup { pattern, dir } => {
                format!("pkill -9 {} && rm -rf {}", quote(pattern), quote(dir))
            }
            RemoteCommand::Raw(command) => command.clone(),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<String> for RemoteCommand {
    fn from(command: String) -> Self {
        RemoteCommand::Raw(command)
    }
}

impl From<&str> for RemoteCommand {
    fn from(command: &str) -> Self {
        RemoteCommand::Raw(command.to_string())
    }
}
