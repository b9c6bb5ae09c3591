//! Remote session primitives
//!
//! A [`Session`] owns one authenticated connection to one host and exposes
//! the operations a run is built from: run a command to completion, launch
//! one detached, upload an archive, follow a file, and capture a command's
//! output. Every primitive observes a [`CancellationToken`]. When the token
//! fires while a remote command is running, the command gets `SIGTERM` and
//! the session waits at most the grace period for it to exit before giving
//! up on it.

use std::borrow::Cow;
use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use mesh_core::error::{ChannelError, RunError, TailError, TransferError};
use mesh_core::traits::{ChannelEvent, RemoteChannel, Transport};
use mesh_core::types::{Host, Signal};
use mesh_protocol::{RemoteCommand, RemoteLayout};

/// How long a signalled command may take to exit
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on output kept by [`Session::run_and_capture`]
pub const CAPTURE_LIMIT: usize = 1024 * 1024;

/// Size of reads from a stdin source
const STDIN_CHUNK: usize = 32 * 1024;

/// Output of a captured command, kept even when the command failed
#[derive(Debug)]
pub struct Captured {
    /// Interleaved stdout and stderr
    pub output: Vec<u8>,
    pub status: Result<(), RunError>,
}

impl Captured {
    /// Output decoded lossily as UTF-8
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }

    /// Output if the command succeeded
    pub fn into_result(self) -> Result<Vec<u8>, RunError> {
        self.status.map(|()| self.output)
    }
}

/// A borrowed output destination
pub type Sink<'a> = &'a mut (dyn Write + Send + 'a);

/// Where a command's output goes
enum Output<'a> {
    Split { stdout: Sink<'a>, stderr: Sink<'a> },
    /// Both streams into one sink
    Merged(Sink<'a>),
    /// Stdout into the sink, stderr dropped
    StdoutOnly(Sink<'a>),
    Capture { buf: Vec<u8>, limit: usize },
    Discard,
}

impl Output<'_> {
    fn stdout(&mut self, data: &[u8]) -> Result<(), RunError> {
        match self {
            Output::Split { stdout: sink, .. }
            | Output::Merged(sink)
            | Output::StdoutOnly(sink) => sink.write_all(data).map_err(RunError::Output),
            _ => self.capture(data),
        }
    }

    fn stderr(&mut self, data: &[u8]) -> Result<(), RunError> {
        match self {
            Output::Split { stderr: sink, .. } | Output::Merged(sink) => {
                sink.write_all(data).map_err(RunError::Output)
            }
            Output::StdoutOnly(_) => Ok(()),
            _ => self.capture(data),
        }
    }

    fn capture(&mut self, data: &[u8]) -> Result<(), RunError> {
        if let Output::Capture { buf, limit } = self {
            if buf.len() + data.len() > *limit {
                return Err(RunError::OutputLimit { limit: *limit });
            }
            buf.extend_from_slice(data);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RunError> {
        match self {
            Output::Split { stdout, stderr } => {
                stdout.flush().map_err(RunError::Output)?;
                stderr.flush().map_err(RunError::Output)
            }
            Output::Merged(sink) | Output::StdoutOnly(sink) => {
                sink.flush().map_err(RunError::Output)
            }
            _ => Ok(()),
        }
    }
}

/// Why driving a command stopped early
enum DriveError {
    Run(RunError),
    /// The stdin source failed
    Input(io::Error),
}

impl From<RunError> for DriveError {
    fn from(err: RunError) -> Self {
        DriveError::Run(err)
    }
}

impl From<ChannelError> for DriveError {
    fn from(err: ChannelError) -> Self {
        DriveError::Run(err.into())
    }
}

impl DriveError {
    fn into_run(self) -> RunError {
        match self {
            DriveError::Run(err) => err,
            DriveError::Input(err) => RunError::Output(err),
        }
    }
}

/// One connection to one host
pub struct Session<T: Transport> {
    host: Host,
    transport: Option<T>,
    grace: Duration,
}

impl<T: Transport> Session<T> {
    /// Wrap an established transport
    pub fn new(host: Host, transport: T) -> Self {
        Self {
            host,
            transport: Some(transport),
            grace: DEFAULT_GRACE,
        }
    }

    /// Override the grace period given to signalled commands
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Run `command` to completion, streaming its output into the sinks
    pub async fn exec<'w>(
        &self,
        command: &RemoteCommand,
        stdout: Sink<'w>,
        stderr: Sink<'w>,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        let mut output = Output::Split { stdout, stderr };
        self.run(command, None::<tokio::io::Empty>, &mut output, cancel)
            .await
            .map_err(DriveError::into_run)
    }

    /// Like [`exec`](Self::exec) with stdout and stderr sent to one sink
    pub async fn exec_merged<'w>(
        &self,
        command: &RemoteCommand,
        output: Sink<'w>,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        let mut output = Output::Merged(output);
        self.run(command, None::<tokio::io::Empty>, &mut output, cancel)
            .await
            .map_err(DriveError::into_run)
    }

    /// Launch `command` detached from the session and return once the
    /// launch request has completed.
    ///
    /// The command is wrapped with `setsid` and its streams are redirected
    /// away, so it keeps running after the session closes. Cancellation
    /// abandons the launch request but never signals anything.
    pub async fn exec_detached(
        &self,
        command: &RemoteCommand,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        let detached = RemoteCommand::Detach {
            command: command.render(),
        };
        let launch = async {
            let mut output = Output::Discard;
            self.run(&detached, None::<tokio::io::Empty>, &mut output, &CancellationToken::new())
                .await
                .map_err(DriveError::into_run)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RunError::Cancelled),
            result = launch => result,
        }
    }

    /// Stream an archive into the remote job directory and extract it there
    pub async fn send_archive<R>(
        &self,
        archive: R,
        layout: &RemoteLayout,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let command = RemoteCommand::ReceiveArchive {
            dir: layout.job_dir.clone(),
            archive: layout.archive_name.clone(),
        };
        let mut output = Output::Capture {
            buf: Vec::new(),
            limit: CAPTURE_LIMIT,
        };

        let result = self.run(&command, Some(archive), &mut output, cancel).await;
        if let (Err(_), Output::Capture { buf, .. }) = (&result, &output) {
            if !buf.is_empty() {
                tracing::debug!(
                    "[{}] extraction output: {}",
                    self.host,
                    String::from_utf8_lossy(buf).trim_end()
                );
            }
        }

        result.map_err(|err| match err {
            DriveError::Run(err) => TransferError::Remote(err),
            DriveError::Input(err) => TransferError::Archive(err),
        })
    }

    /// Follow `path` into `stdout` until the remote stream ends or the
    /// token is cancelled
    pub async fn tail<'w>(
        &self,
        path: &str,
        stdout: Sink<'w>,
        cancel: &CancellationToken,
    ) -> Result<(), TailError> {
        let command = RemoteCommand::Tail {
            path: path.to_string(),
        };
        let mut output = Output::StdoutOnly(stdout);
        self.run(&command, None::<tokio::io::Empty>, &mut output, cancel)
            .await
            .map_err(|err| TailError::from(err.into_run()))
    }

    /// Run `command` to completion and keep its combined output.
    ///
    /// Intended for small diagnostic output; more than [`CAPTURE_LIMIT`]
    /// bytes fails the command with [`RunError::OutputLimit`].
    pub async fn run_and_capture(
        &self,
        command: &RemoteCommand,
        cancel: &CancellationToken,
    ) -> Captured {
        let mut output = Output::Capture {
            buf: Vec::new(),
            limit: CAPTURE_LIMIT,
        };
        let status = self
            .run(command, None::<tokio::io::Empty>, &mut output, cancel)
            .await
            .map_err(DriveError::into_run);
        let output = match output {
            Output::Capture { buf, .. } => buf,
            _ => Vec::new(),
        };
        Captured { output, status }
    }

    /// Release the connection. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(transport) = self.transport.take() {
            if tokio::time::timeout(self.grace, transport.disconnect())
                .await
                .is_err()
            {
                tracing::debug!("[{}] disconnect did not finish in {:?}", self.host, self.grace);
            }
        }
    }

    async fn run<R>(
        &self,
        command: &RemoteCommand,
        stdin: Option<R>,
        output: &mut Output<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), DriveError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled.into());
        }
        let transport = self.transport.as_ref().ok_or(ChannelError::SessionClosed)?;
        let mut channel = match unless_cancelled(cancel, transport.open_channel()).await {
            Some(opened) => opened?,
            None => return Err(RunError::Cancelled.into()),
        };

        let rendered = command.render();
        tracing::debug!("[{}] exec: {}", self.host, rendered);

        let result = self
            .drive(&mut channel, &rendered, stdin, output, cancel)
            .await;
        let flushed = output.flush();
        match tokio::time::timeout(self.grace, channel.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::trace!("[{}] closing channel: {}", self.host, e),
            Err(_) => tracing::debug!("[{}] channel close did not finish in {:?}", self.host, self.grace),
        }
        result?;
        flushed?;
        Ok(())
    }

    async fn drive<R>(
        &self,
        channel: &mut T::Channel,
        command: &str,
        mut stdin: Option<R>,
        output: &mut Output<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), DriveError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match unless_cancelled(cancel, channel.exec(command)).await {
            Some(sent) => sent?,
            None => return Err(self.abort(channel).await),
        }

        let mut buf = vec![0u8; STDIN_CHUNK];
        let mut exit: Option<Result<(), RunError>> = None;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(self.abort(channel).await),

                read = read_input(&mut stdin, &mut buf) => match read {
                    Ok(0) => {
                        stdin = None;
                        match unless_cancelled(cancel, channel.send_eof()).await {
                            Some(Ok(())) => {}
                            Some(Err(e)) => tracing::debug!("[{}] sending eof: {}", self.host, e),
                            None => return Err(self.abort(channel).await),
                        }
                    }
                    Ok(n) => match unless_cancelled(cancel, channel.send_stdin(&buf[..n])).await {
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            // Keep reading events: the exit status explains why
                            tracing::debug!("[{}] remote stopped accepting input: {}", self.host, e);
                            stdin = None;
                        }
                        None => return Err(self.abort(channel).await),
                    },
                    Err(e) => {
                        self.terminate(channel).await;
                        return Err(DriveError::Input(e));
                    }
                },

                event = channel.next_event() => {
                    let handled = match event {
                        Some(ChannelEvent::Stdout(data)) => output.stdout(&data),
                        Some(ChannelEvent::Stderr(data)) => output.stderr(&data),
                        Some(ChannelEvent::ExitStatus(0)) => {
                            exit = Some(Ok(()));
                            stdin = None;
                            Ok(())
                        }
                        Some(ChannelEvent::ExitStatus(status)) => {
                            exit = Some(Err(RunError::Exit { status }));
                            stdin = None;
                            Ok(())
                        }
                        Some(ChannelEvent::ExitSignal(signal)) => {
                            exit = Some(Err(RunError::Signal { signal }));
                            stdin = None;
                            Ok(())
                        }
                        Some(ChannelEvent::Eof) => Ok(()),
                        Some(ChannelEvent::Rejected) => return Err(RunError::Rejected.into()),
                        None => {
                            return exit.unwrap_or(Err(RunError::Closed)).map_err(DriveError::Run);
                        }
                    };
                    if let Err(err) = handled {
                        if exit.is_none() {
                            self.terminate(channel).await;
                        }
                        return Err(err.into());
                    }
                }
            }
        }
    }

    /// Stop the command on behalf of a cancelled token
    async fn abort(&self, channel: &mut T::Channel) -> DriveError {
        self.terminate(channel).await;
        RunError::Cancelled.into()
    }

    /// Signal the command and wait, at most the grace period, for it to go
    async fn terminate(&self, channel: &mut T::Channel) {
        let host = &self.host;
        let drain = async {
            if let Err(e) = channel.signal(Signal::Term).await {
                tracing::debug!("[{}] sending SIGTERM: {}", host, e);
            }
            while let Some(event) = channel.next_event().await {
                if matches!(
                    event,
                    ChannelEvent::ExitStatus(_) | ChannelEvent::ExitSignal(_)
                ) {
                    return;
                }
            }
        };
        if tokio::time::timeout(self.grace, drain).await.is_err() {
            tracing::warn!(
                "[{}] command still running {:?} after SIGTERM, abandoning it",
                host,
                self.grace
            );
        }
    }
}

/// Await a channel request unless `cancel` fires first.
///
/// Opening a channel and writing to it both wait on the remote end, which
/// may never answer.
async fn unless_cancelled<F: Future>(cancel: &CancellationToken, request: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = request => Some(output),
    }
}

async fn read_input<R>(input: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match input {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}
