//! Traced connection stream
//!
//! Decorates the probe's TCP stream so the write and read boundaries of the
//! HTTP exchange land in the trace recorder: the request counts as written
//! when the transport is flushed after the last write, and the first
//! non-empty read marks the first response byte.

use std::io::{self, IoSlice};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::trace::{TraceEvent, TraceRecorder};

/// Stream wrapper that records write-completion and first-byte events.
#[derive(Debug)]
pub struct TracedStream<S> {
    inner: S,
    recorder: Arc<TraceRecorder>,
    last_write: Option<Instant>,
    request_committed: bool,
    first_byte_seen: bool,
}

impl<S> TracedStream<S> {
    pub fn new(inner: S, recorder: Arc<TraceRecorder>) -> Self {
        Self {
            inner,
            recorder,
            last_write: None,
            request_committed: false,
            first_byte_seen: false,
        }
    }

    fn note_write(&mut self, written: usize) {
        if written > 0 && !self.request_committed {
            self.last_write = Some(Instant::now());
        }
    }

    fn commit_request(&mut self) {
        if self.request_committed {
            return;
        }
        if let Some(at) = self.last_write {
            self.recorder.record_at(TraceEvent::WroteRequest, at);
            self.request_committed = true;
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TracedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &poll {
            if !this.first_byte_seen && buf.filled().len() > before {
                this.commit_request();
                this.recorder.record(TraceEvent::GotFirstResponseByte);
                this.first_byte_seen = true;
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TracedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.note_write(*n);
        }
        poll
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(n)) = &poll {
            this.note_write(*n);
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_flush(cx);
        if let Poll::Ready(Ok(())) = &poll {
            this.commit_request();
        }
        poll
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
