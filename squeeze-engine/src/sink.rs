use std::{
    io::{self, Write},
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Bytes buffered by the writer before a chunk is handed to the consumer.
pub const CHUNK_SIZE: usize = 64 * 1024;

type Chunk = io::Result<Bytes>;

/// Bounded pipe from a blocking writer to an async byte stream. At most
/// `capacity` chunks are queued; a full queue blocks the writer.
pub fn archive_channel(capacity: usize) -> (ChannelWriter, ArchiveBody) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelWriter {
            tx,
            buf: BytesMut::with_capacity(CHUNK_SIZE),
        },
        ArchiveBody {
            inner: ReceiverStream::new(rx),
        },
    )
}

/// `std::io::Write` end of [`archive_channel`]. Must only be used from a
/// blocking thread (`spawn_blocking`), never from async code.
pub struct ChannelWriter {
    tx: mpsc::Sender<Chunk>,
    buf: BytesMut,
}

impl ChannelWriter {
    /// Handle that can end the stream with an error after the writer is gone.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.tx.clone(),
        }
    }

    fn send_pending(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| consumer_gone())
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.tx.is_closed() {
            return Err(consumer_gone());
        }
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_pending()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_pending()
    }
}

fn consumer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "archive consumer closed")
}

/// Marks the stream as invalid so the consumer never mistakes a truncated
/// archive for a complete one.
#[derive(Clone)]
pub struct AbortHandle {
    tx: mpsc::Sender<Chunk>,
}

impl AbortHandle {
    pub async fn abort(self, reason: impl ToString) {
        let err = io::Error::other(reason.to_string());
        if self.tx.send(Err(err)).await.is_err() {
            log::debug!("archive consumer already closed, abort not delivered");
        }
    }
}

/// Async end of [`archive_channel`]; ends when every writer and abort handle
/// is dropped.
pub struct ArchiveBody {
    inner: ReceiverStream<Chunk>,
}

impl ArchiveBody {
    pub async fn next_chunk(&mut self) -> Option<Chunk> {
        self.inner.next().await
    }
}

impl Stream for ArchiveBody {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
