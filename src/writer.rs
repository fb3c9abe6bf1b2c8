//! Reliable writer and the per-connection writer task.
//!
//! [`send_all`] writes a whole buffer to a stream that may accept only part of
//! it per call. Each partial write suspends on the stream's write readiness
//! (the tokio waker registered by `poll_write`), so the writer never spins.
//!
//! Callers never touch the stream directly. Every connection has exactly one
//! writer task that owns the write half and drains a bounded queue one frame
//! at a time, so writes to a stream are never interleaved:
//!
//! ```text
//! send()      ─┐
//! handlers    ─┼─► mpsc::Sender<Bytes> ─► Writer Task ─► send_all ─► Socket
//! dispatcher  ─┘
//! ```
//!
//! The writer task must run on the same runtime that drives the connection's
//! read loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{RemoteAddressBookError, Result};
use crate::protocol::{encode_frame, Command};

/// Write every byte of `data`, suspending on write readiness after each
/// partial write.
///
/// # Errors
///
/// `StreamClosed` if the stream stops accepting bytes (a zero-length write),
/// `Io` with the underlying cause for any other failure.
pub async fn send_all<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let total = data.len();
    let mut offset = 0;

    while offset < total {
        match writer.write(&data[offset..]).await {
            Ok(0) => {
                return Err(RemoteAddressBookError::StreamClosed {
                    written: offset,
                    total,
                })
            }
            Ok(n) => offset += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(RemoteAddressBookError::Io(e)),
        }
    }

    writer.flush().await?;
    Ok(())
}

/// Handle for queueing frames on a connection's writer task.
///
/// Cheap to clone. Sending never blocks: it either queues the frame or fails
/// immediately.
#[derive(Clone, Debug)]
pub struct CommandSender {
    /// Channel sender for encoded frames.
    tx: mpsc::Sender<Bytes>,
    /// Frames queued but not yet written.
    pending: Arc<AtomicUsize>,
}

impl CommandSender {
    /// Queue an encoded frame.
    ///
    /// # Errors
    ///
    /// `Backpressure` if the queue is full, `ConnectionClosed` if the writer
    /// task has stopped.
    pub fn send(&self, frame: Bytes) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(frame).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => RemoteAddressBookError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => RemoteAddressBookError::ConnectionClosed,
            }
        })
    }

    /// Encode and queue a command.
    pub fn send_command(&self, command: &Command) -> Result<()> {
        self.send(encode_frame(command)?)
    }

    /// Get the number of frames queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Check if the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task on `runtime` and return a sender for it.
///
/// The task ends cleanly when every [`CommandSender`] is dropped, and with an
/// error when the stream fails.
pub fn spawn_writer_task<W>(
    writer: W,
    queue_capacity: usize,
    runtime: &Handle,
) -> (CommandSender, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let sender = CommandSender {
        tx,
        pending: pending.clone(),
    };
    let task = runtime.spawn(writer_loop(rx, writer, pending));

    (sender, task)
}

/// Main writer loop - one queued frame at a time.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let result = send_all(&mut writer, &frame).await;
        pending.fetch_sub(1, Ordering::Release);
        result?;
    }

    tracing::debug!("writer queue closed, shutting down write half");
    let _ = writer.shutdown().await;
    Ok(())
}
