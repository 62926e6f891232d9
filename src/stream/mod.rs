//! Buffered non-blocking I/O over a single socket.
//!
//! [`Stream`] wraps one socket and exposes the two read shapes the
//! connection layer needs — read-until-delimiter and read-exactly-n —
//! as suspending operations over an internal read buffer, plus an
//! ordered write queue drained by [`Stream::flush`]. Calling a read
//! returns a lazy future; the I/O happens when the reactor polls it.
//! Taking `&mut self` means a second read cannot be submitted while one
//! is outstanding.
//!
//! The read buffer is capped at `max_buffer_size`; socket reads go
//! through a fixed scratch buffer sized to never exceed the cap. Filling
//! the cap without satisfying the pending read is a
//! [`StreamError::BufferOverflow`] and kills the stream.

use std::cmp;
use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task;
use tracing::trace;

use crate::ensure;
use crate::protocol::StreamError;

const SCRATCH_SIZE: usize = 4 * 1024;

/// A buffered reader/writer over one socket.
pub struct Stream<S> {
    io: S,
    read_buf: BytesMut,
    write_queue: VecDeque<Bytes>,
    max_buffer_size: usize,
    closed: bool,
}

impl<S> Stream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: S, max_buffer_size: usize) -> Self {
        Self {
            io,
            read_buf: BytesMut::new(),
            write_queue: VecDeque::new(),
            max_buffer_size,
            closed: false,
        }
    }

    /// Bytes read from the socket but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// True while the write queue is non-empty.
    pub fn writing(&self) -> bool {
        !self.write_queue.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read until `delimiter` appears in the buffer; returns everything
    /// up to and including it, consumed from the buffer.
    ///
    /// The scan resumes where it left off as new bytes arrive (rewound
    /// by one delimiter length, for a delimiter split across reads). A
    /// read whose delimiter is already buffered at submission completes
    /// on the next reactor tick, never synchronously, so completion
    /// ordering is uniform whether or not the socket was ahead of us.
    pub async fn read_until(&mut self, delimiter: &[u8]) -> Result<Bytes, StreamError> {
        ensure!(!self.closed, StreamError::Closed);
        debug_assert!(!delimiter.is_empty());

        let mut filled = false;
        let mut scanned: usize = 0;
        loop {
            if self.read_buf.len() >= delimiter.len() {
                let from = scanned.saturating_sub(delimiter.len() - 1);
                if let Some(at) = find(&self.read_buf[from..], delimiter) {
                    let end = from + at + delimiter.len();
                    if !filled {
                        // satisfied at submission: defer to the next tick
                        task::yield_now().await;
                    }
                    return Ok(self.read_buf.split_to(end).freeze());
                }
                scanned = self.read_buf.len();
            }
            self.fill().await?;
            filled = true;
        }
    }

    /// Read exactly `n` bytes, consumed from the buffer.
    ///
    /// Completes on the next reactor tick when the bytes are already
    /// buffered at submission, like [`Self::read_until`].
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes, StreamError> {
        ensure!(!self.closed, StreamError::Closed);
        if n > self.max_buffer_size {
            let limit = self.max_buffer_size;
            self.close().await;
            return Err(StreamError::BufferOverflow { limit });
        }

        if self.read_buf.len() >= n {
            // satisfied at submission: defer to the next tick
            task::yield_now().await;
        }
        while self.read_buf.len() < n {
            self.fill().await?;
        }
        Ok(self.read_buf.split_to(n).freeze())
    }

    /// Append a chunk to the write queue. Dropped if the stream is
    /// already closed.
    pub fn write(&mut self, chunk: Bytes) {
        if self.closed {
            trace!("dropping write on a closed stream");
            return;
        }
        if !chunk.is_empty() {
            self.write_queue.push_back(chunk);
        }
    }

    /// Drain the write queue to the socket in submission order. A
    /// partial send keeps the unsent tail at the head of the queue.
    pub async fn flush(&mut self) -> Result<(), StreamError> {
        ensure!(!self.closed, StreamError::Closed);

        while let Some(mut chunk) = self.write_queue.pop_front() {
            if let Err(e) = self.io.write_all_buf(&mut chunk).await {
                if chunk.has_remaining() {
                    self.write_queue.push_front(chunk);
                }
                return Err(e.into());
            }
        }
        self.io.flush().await?;
        Ok(())
    }

    /// Shut the socket down and mark the stream closed. Queued writes
    /// and buffered reads are dropped, not delivered.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.write_queue.clear();
        self.read_buf.clear();
        let _ = self.io.shutdown().await;
    }

    /// Pull more bytes from the socket into the read buffer, capped so
    /// the buffer never exceeds `max_buffer_size`. A full buffer with an
    /// unsatisfiable read closes the stream before the error returns.
    async fn fill(&mut self) -> Result<(), StreamError> {
        if self.read_buf.len() >= self.max_buffer_size {
            let limit = self.max_buffer_size;
            self.close().await;
            return Err(StreamError::BufferOverflow { limit });
        }

        let mut scratch = [0u8; SCRATCH_SIZE];
        let want = cmp::min(SCRATCH_SIZE, self.max_buffer_size - self.read_buf.len());
        let n = self.io.read(&mut scratch[..want]).await?;
        if n == 0 {
            return Err(StreamError::PeerClosed);
        }
        self.read_buf.extend_from_slice(&scratch[..n]);
        Ok(())
    }
}

/// The write facet of a stream, object-safe so a request can hold it
/// without knowing the transport type.
#[async_trait(?Send)]
pub trait ResponseSink {
    /// Append a chunk to the write queue.
    fn write(&mut self, chunk: Bytes);

    /// Drain the write queue in submission order.
    async fn flush(&mut self) -> Result<(), StreamError>;

    fn is_closed(&self) -> bool;

    fn writing(&self) -> bool;
}

#[async_trait(?Send)]
impl<S> ResponseSink for Stream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn write(&mut self, chunk: Bytes) {
        Stream::write(self, chunk);
    }

    async fn flush(&mut self) -> Result<(), StreamError> {
        Stream::flush(self).await
    }

    fn is_closed(&self) -> bool {
        Stream::is_closed(self)
    }

    fn writing(&self) -> bool {
        Stream::writing(self)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::io::duplex;
    use tokio::task::yield_now;

    #[tokio::test]
    async fn read_until_finds_a_delimiter_split_across_arrivals() {
        let (mut client, server) = duplex(1024);
        let mut stream = Stream::new(server, 1024);

        let writer = async move {
            client.write_all(b"GET / HTTP/1.1\r\nHost: x\r").await.unwrap();
            client.flush().await.unwrap();
            yield_now().await;
            client.write_all(b"\n\r\nleftover").await.unwrap();
            client
        };

        let (head, _client) = tokio::join!(stream.read_until(b"\r\n\r\n"), writer);
        assert_eq!(&head.unwrap()[..], b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(stream.buffered(), b"leftover".len());
    }

    #[tokio::test]
    async fn read_exact_consumes_only_what_was_asked_for() {
        let (mut client, server) = duplex(1024);
        let mut stream = Stream::new(server, 1024);

        client.write_all(b"abcdefgh").await.unwrap();

        let first = stream.read_exact(3).await.unwrap();
        assert_eq!(&first[..], b"abc");

        // the rest is already buffered; the read still defers a tick
        assert!(stream.read_exact(5).now_or_never().is_none());

        let second = stream.read_exact(5).await.unwrap();
        assert_eq!(&second[..], b"defgh");
        assert_eq!(stream.buffered(), 0);
    }

    #[tokio::test]
    async fn read_until_overflows_when_the_delimiter_never_arrives() {
        let (mut client, server) = duplex(1024);
        let mut stream = Stream::new(server, 16);

        client.write_all(&[b'a'; 64]).await.unwrap();

        let result = stream.read_until(b"\r\n\r\n").await;
        assert!(matches!(result, Err(StreamError::BufferOverflow { limit: 16 })));
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn read_exact_beyond_the_cap_is_rejected_up_front() {
        let (_client, server) = duplex(1024);
        let mut stream = Stream::new(server, 16);

        let result = stream.read_exact(17).await;
        assert!(matches!(result, Err(StreamError::BufferOverflow { limit: 16 })));
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn eof_with_an_outstanding_read_is_peer_closed() {
        let (client, server) = duplex(1024);
        let mut stream = Stream::new(server, 1024);

        drop(client);

        let result = stream.read_until(b"\r\n").await;
        assert!(matches!(result, Err(StreamError::PeerClosed)));
    }

    #[tokio::test]
    async fn writes_drain_in_submission_order() {
        let (mut client, server) = duplex(1024);
        let mut stream = Stream::new(server, 1024);

        stream.write(Bytes::from_static(b"one "));
        stream.write(Bytes::from_static(b"two "));
        stream.write(Bytes::from_static(b"three"));
        assert!(stream.writing());

        stream.flush().await.unwrap();
        assert!(!stream.writing());

        let mut received = [0u8; 13];
        client.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"one two three");
    }

    #[tokio::test]
    async fn bytes_in_equal_bytes_out() {
        // read side: everything written by the peer is either consumed
        // by reads or still buffered; write side: everything submitted
        // is on the wire after a flush.
        let (mut client, server) = duplex(1024);
        let mut stream = Stream::new(server, 1024);

        client.write_all(b"0123456789").await.unwrap();

        let consumed = stream.read_exact(4).await.unwrap();
        assert_eq!(consumed.len() + stream.buffered(), 10);

        stream.write(Bytes::from_static(b"abc"));
        stream.write(Bytes::from_static(b"def"));
        stream.flush().await.unwrap();

        let mut received = [0u8; 6];
        client.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"abcdef");
    }

    #[tokio::test]
    async fn closed_stream_rejects_reads_and_drops_writes() {
        let (_client, server) = duplex(1024);
        let mut stream = Stream::new(server, 1024);

        stream.write(Bytes::from_static(b"queued"));
        stream.close().await;

        assert!(stream.is_closed());
        assert!(!stream.writing());
        assert!(matches!(stream.read_until(b"\r\n").await, Err(StreamError::Closed)));
        assert!(matches!(stream.read_exact(1).await, Err(StreamError::Closed)));

        stream.write(Bytes::from_static(b"dropped"));
        assert!(!stream.writing());
    }

    #[tokio::test]
    async fn buffered_delimiter_completes_on_the_next_tick_never_synchronously() {
        let (mut client, server) = duplex(1024);
        let mut stream = Stream::new(server, 1024);

        client.write_all(b"first\r\nsecond\r\n").await.unwrap();

        let first = stream.read_until(b"\r\n").await.unwrap();
        assert_eq!(&first[..], b"first\r\n");

        // the second line is already buffered, so no socket data is
        // needed, but the first poll must not complete
        assert!(stream.read_until(b"\r\n").now_or_never().is_none());

        let second = stream.read_until(b"\r\n").await.unwrap();
        assert_eq!(&second[..], b"second\r\n");
    }
}
