//! Lazily produced tar stream
//!
//! A blocking producer walks the workspace and writes tar data into a
//! bounded channel in fixed-size chunks; the async side reads those chunks
//! through [`ArchiveStream`]. The channel bound is the only buffering, so
//! memory stays flat no matter how large the workspace is.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

use super::{FileEntry, IgnoreSet, WorkspaceWalk};

/// Size of each chunk handed to the reader
const CHUNK_SIZE: usize = 64 * 1024;

/// Number of chunks the producer may run ahead of the reader
const CHANNEL_DEPTH: usize = 16;

enum Piece {
    Data(Bytes),
    Failed(io::Error),
    Done,
}

type ChunkStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// The read side of a workspace archive
///
/// Yields the tar bytes in order. A producer failure arrives as an I/O error
/// from `poll_read`; a producer that stops without finishing (for example
/// because it panicked) arrives as `UnexpectedEof`.
pub struct ArchiveStream {
    inner: StreamReader<ChunkStream, Bytes>,
}

impl ArchiveStream {
    fn new(mut rx: mpsc::Receiver<Piece>) -> Self {
        let mut finished = false;
        let chunks = stream::poll_fn(move |cx| {
            if finished {
                return Poll::Ready(None);
            }
            let item = match ready!(rx.poll_recv(cx)) {
                Some(Piece::Data(chunk)) => Some(Ok(chunk)),
                Some(Piece::Failed(err)) => {
                    finished = true;
                    Some(Err(err))
                }
                Some(Piece::Done) => {
                    finished = true;
                    None
                }
                None => {
                    finished = true;
                    Some(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "archive producer stopped before finishing",
                    )))
                }
            };
            Poll::Ready(item)
        });
        let chunks: ChunkStream = Box::pin(chunks);
        Self {
            inner: StreamReader::new(chunks),
        }
    }
}

impl AsyncRead for ArchiveStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Start archiving `root` in the background.
///
/// Must be called from within a tokio runtime. Entries matching `ignore`
/// are left out and ignored directories are not descended.
pub fn build_archive(root: impl Into<PathBuf>, ignore: IgnoreSet) -> ArchiveStream {
    let root = root.into();
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let writer = ChunkWriter::new(tx.clone());
        let last = match write_archive(&root, &ignore, writer) {
            Ok(()) => Piece::Done,
            Err(e) => {
                tracing::warn!("Archiving {} failed: {}", root.display(), e);
                Piece::Failed(e)
            }
        };
        // The reader may already be gone
        let _ = tx.blocking_send(last);
    });

    ArchiveStream::new(rx)
}

fn write_archive(root: &Path, ignore: &IgnoreSet, writer: ChunkWriter) -> io::Result<()> {
    let mut builder = tar::Builder::new(writer);
    let mut count = 0usize;

    WorkspaceWalk::new(root, ignore).for_each(|entry| {
        append_entry(&mut builder, &entry)?;
        count += 1;
        Ok(())
    })?;

    let mut writer = builder.into_inner()?;
    writer.flush()?;
    tracing::debug!("Archived {} entries from {}", count, root.display());
    Ok(())
}

fn append_entry<W: Write>(builder: &mut tar::Builder<W>, entry: &FileEntry) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_metadata(&entry.metadata);
    header.set_mode(entry.mode());
    header.set_mtime(entry.mtime());

    if entry.is_dir() {
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        builder.append_data(&mut header, &entry.relative, io::empty())
    } else {
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(entry.size());
        let file = File::open(&entry.path)?;
        let reader = ExactReader::new(file, entry.size(), &entry.relative);
        builder.append_data(&mut header, &entry.relative, reader)
    }
}

/// Reads exactly `len` bytes, failing if the source runs short.
///
/// The tar header is written before the body, so a file that shrinks
/// between stat and read would otherwise produce a corrupt archive.
struct ExactReader<'a, R> {
    inner: R,
    remaining: u64,
    path: &'a Path,
}

impl<'a, R: Read> ExactReader<'a, R> {
    fn new(inner: R, len: u64, path: &'a Path) -> Self {
        Self {
            inner,
            remaining: len,
            path,
        }
    }
}

impl<R: Read> Read for ExactReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} shrank while being archived", self.path.display()),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// `Write` adapter sending fixed-size chunks over the bounded channel
struct ChunkWriter {
    tx: mpsc::Sender<Piece>,
    buf: BytesMut,
}

impl ChunkWriter {
    fn new(tx: mpsc::Sender<Piece>) -> Self {
        Self {
            tx,
            buf: BytesMut::with_capacity(CHUNK_SIZE),
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx
            .blocking_send(Piece::Data(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive reader was dropped"))
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = CHUNK_SIZE - self.buf.len();
        let n = data.len().min(room);
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}
