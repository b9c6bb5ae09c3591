//! Scriptable in-memory transport
//!
//! Commands are matched against rules by substring, first match wins;
//! unmatched commands succeed silently. Everything a session does (commands,
//! stdin bytes, signals, disconnects) is recorded for assertions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use mesh_core::config::Cluster;
use mesh_core::error::{ChannelError, ConnectionError};
use mesh_core::traits::{ChannelEvent, RemoteChannel, Transport};
use mesh_core::types::{Host, Signal};

use crate::connector::Connector;
use crate::session::Session;

/// How a scripted command ends
#[derive(Debug, Clone, PartialEq, Eq)]
enum Ending {
    Exit(u32),
    Signal(String),
    /// Channel closes with no exit report
    Close,
    /// Never ends, ignores signals
    Hang,
    /// Runs until signalled, then dies of SIGTERM
    UntilSignal,
}

/// Scripted behaviour of one remote command
#[derive(Debug, Clone)]
pub struct MockCommand {
    stdout: Vec<Bytes>,
    stderr: Vec<Bytes>,
    ending: Ending,
    wait_for_eof: bool,
    stall_stdin: bool,
    rejected: bool,
}

impl MockCommand {
    fn ending(ending: Ending) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            ending,
            wait_for_eof: false,
            stall_stdin: false,
            rejected: false,
        }
    }

    pub fn exit(status: u32) -> Self {
        Self::ending(Ending::Exit(status))
    }

    pub fn signal(name: &str) -> Self {
        Self::ending(Ending::Signal(name.to_string()))
    }

    pub fn close() -> Self {
        Self::ending(Ending::Close)
    }

    pub fn hang() -> Self {
        Self::ending(Ending::Hang)
    }

    pub fn until_signal() -> Self {
        Self::ending(Ending::UntilSignal)
    }

    pub fn rejected() -> Self {
        Self {
            rejected: true,
            ..Self::exit(0)
        }
    }

    pub fn stdout(mut self, data: impl AsRef<[u8]>) -> Self {
        self.stdout.push(Bytes::copy_from_slice(data.as_ref()));
        self
    }

    pub fn stderr(mut self, data: impl AsRef<[u8]>) -> Self {
        self.stderr.push(Bytes::copy_from_slice(data.as_ref()));
        self
    }

    /// Hold the exit until stdin is closed, like `cat`
    pub fn wait_for_eof(mut self) -> Self {
        self.wait_for_eof = true;
        self
    }

    /// Never accept stdin, like a peer whose receive window stays shut
    pub fn stall_stdin(mut self) -> Self {
        self.stall_stdin = true;
        self
    }
}

/// One command executed on a mock transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecRecord {
    pub command: String,
    pub stdin: Vec<u8>,
    pub eof: bool,
    pub signals: Vec<Signal>,
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<(String, MockCommand)>,
    execs: Vec<ExecRecord>,
    disconnects: usize,
    stall_open: bool,
}

/// In-memory [`Transport`]; clones share state
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script commands containing `pattern`
    pub fn on(self, pattern: impl Into<String>, command: MockCommand) -> Self {
        self.lock().rules.push((pattern.into(), command));
        self
    }

    /// Never confirm a channel open
    pub fn stall_channels(self) -> Self {
        self.lock().stall_open = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn execs(&self) -> Vec<ExecRecord> {
        self.lock().execs.clone()
    }

    pub fn last_exec(&self) -> Option<ExecRecord> {
        self.lock().execs.last().cloned()
    }

    /// Commands in execution order
    pub fn commands(&self) -> Vec<String> {
        self.lock().execs.iter().map(|e| e.command.clone()).collect()
    }

    /// Signals delivered to any command, in order
    pub fn signals(&self) -> Vec<Signal> {
        self.lock()
            .execs
            .iter()
            .flat_map(|e| e.signals.iter().copied())
            .collect()
    }

    pub fn disconnects(&self) -> usize {
        self.lock().disconnects
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Channel = MockChannel;

    async fn open_channel(&self) -> Result<MockChannel, ChannelError> {
        let stalled = self.lock().stall_open;
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(MockChannel {
            state: Arc::clone(&self.state),
            record: None,
            script: None,
            queue: VecDeque::new(),
            eof: false,
            signalled: false,
            finished: false,
        })
    }

    async fn disconnect(&self) {
        self.lock().disconnects += 1;
    }
}

/// Channel handed out by [`MockTransport`]
#[derive(Debug)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
    record: Option<usize>,
    script: Option<MockCommand>,
    queue: VecDeque<ChannelEvent>,
    eof: bool,
    signalled: bool,
    finished: bool,
}

impl MockChannel {
    fn with_record(&self, update: impl FnOnce(&mut ExecRecord)) {
        if let Some(index) = self.record {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(record) = state.execs.get_mut(index) {
                update(record);
            }
        }
    }
}

#[async_trait]
impl RemoteChannel for MockChannel {
    async fn exec(&mut self, command: &str) -> Result<(), ChannelError> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let script = state
            .rules
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, script)| script.clone())
            .unwrap_or_else(|| MockCommand::exit(0));
        state.execs.push(ExecRecord {
            command: command.to_string(),
            ..Default::default()
        });
        self.record = Some(state.execs.len() - 1);
        drop(state);

        if script.rejected {
            self.queue.push_back(ChannelEvent::Rejected);
            self.finished = true;
        } else {
            self.queue
                .extend(script.stdout.iter().cloned().map(ChannelEvent::Stdout));
            self.queue
                .extend(script.stderr.iter().cloned().map(ChannelEvent::Stderr));
        }
        self.script = Some(script);
        Ok(())
    }

    async fn send_stdin(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        if self.finished {
            return Err(ChannelError::Request("channel closed".into()));
        }
        if self.script.as_ref().is_some_and(|s| s.stall_stdin) {
            std::future::pending::<()>().await;
        }
        self.with_record(|r| r.stdin.extend_from_slice(data));
        Ok(())
    }

    async fn send_eof(&mut self) -> Result<(), ChannelError> {
        self.eof = true;
        self.with_record(|r| r.eof = true);
        Ok(())
    }

    async fn signal(&mut self, signal: Signal) -> Result<(), ChannelError> {
        self.signalled = true;
        self.with_record(|r| r.signals.push(signal));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }
            let ending = match &self.script {
                Some(script) if script.wait_for_eof && !self.eof => None,
                Some(script) => Some(script.ending.clone()),
                None => return None,
            };
            match ending {
                None | Some(Ending::Hang) => std::future::pending::<()>().await,
                Some(Ending::UntilSignal) if !self.signalled => {
                    std::future::pending::<()>().await
                }
                Some(Ending::UntilSignal) => {
                    self.queue.push_back(ChannelEvent::ExitSignal("TERM".into()));
                    self.finished = true;
                }
                Some(Ending::Exit(status)) => {
                    self.queue.push_back(ChannelEvent::Eof);
                    self.queue.push_back(ChannelEvent::ExitStatus(status));
                    self.finished = true;
                }
                Some(Ending::Signal(name)) => {
                    self.queue.push_back(ChannelEvent::ExitSignal(name));
                    self.finished = true;
                }
                Some(Ending::Close) => self.finished = true,
            }
        }
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.finished = true;
        self.queue.clear();
        Ok(())
    }
}

/// [`Connector`] producing mock sessions, one transport per host
#[derive(Debug, Default)]
pub struct MockConnector {
    script: Vec<(String, MockCommand)>,
    unreachable: HashSet<Host>,
    grace: Option<Duration>,
    transports: Mutex<HashMap<Host, MockTransport>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script commands containing `pattern` on every host
    pub fn on(mut self, pattern: impl Into<String>, command: MockCommand) -> Self {
        self.script.push((pattern.into(), command));
        self
    }

    /// Make connecting to `host` fail
    pub fn unreachable(mut self, host: impl Into<Host>) -> Self {
        self.unreachable.insert(host.into());
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = Some(grace);
        self
    }

    /// The transport used for `host`, once connected
    pub fn transport(&self, host: &Host) -> Option<MockTransport> {
        self.transports
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(host)
            .cloned()
    }

    /// Number of hosts connected so far
    pub fn connected(&self) -> usize {
        self.transports
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(
        &self,
        _cluster: &Cluster,
        host: &Host,
        cancel: &CancellationToken,
    ) -> Result<Session<MockTransport>, ConnectionError> {
        if cancel.is_cancelled() {
            return Err(ConnectionError::Cancelled);
        }
        if self.unreachable.contains(host) {
            return Err(ConnectionError::Dial {
                host: host.to_string(),
                message: "connection refused".into(),
            });
        }

        let transport = self
            .script
            .iter()
            .cloned()
            .fold(MockTransport::new(), |t, (pattern, command)| {
                t.on(pattern, command)
            });
        self.transports
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(host.clone(), transport.clone());

        let session = Session::new(host.clone(), transport);
        Ok(match self.grace {
            Some(grace) => session.with_grace(grace),
            None => session,
        })
    }
}
