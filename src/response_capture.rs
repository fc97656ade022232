//! Transparent response tee: forwards every byte to the client while
//! mirroring up to a capped amount into an in-memory buffer the middleware
//! can read once the handler returns.
//!
//! Grounded on `proxy/streaming.rs`'s `CapturingBody<B>` (a `pin_project`
//! wrapper implementing `http_body::Body` passthrough while siphoning
//! frames to a side channel); simplified here to a shared buffer instead of
//! a channel-fed background task, since this core captures the *inner
//! handler's* own response rather than proxying bytes from an upstream
//! connection.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Buf;
use http_body::{Body as HttpBody, Frame, SizeHint};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Notify;

pub const DEFAULT_CAPTURE_CAP: usize = 64 * 1024;

#[derive(Debug, Default)]
struct CaptureState {
    buffer: Vec<u8>,
    truncated: bool,
    done: bool,
}

/// Shared handle to a capture in progress. Cloning is cheap; every clone
/// observes the same underlying buffer.
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    state: Arc<Mutex<CaptureState>>,
    notify: Arc<Notify>,
    cap: usize,
}

impl CaptureHandle {
    fn new(cap: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState::default())),
            notify: Arc::new(Notify::new()),
            cap,
        }
    }

    fn mark_done(&self) {
        self.state.lock().done = true;
        self.notify.notify_waiters();
    }

    /// Resolves once the wrapped body has finished streaming (successfully
    /// or not), so a caller can read a complete buffer. Race-free against a
    /// completion that happens between the initial check and the await:
    /// the notification future is created before the state is inspected.
    pub async fn wait_until_complete(&self) {
        loop {
            let notified = self.notify.notified();
            if self.state.lock().done {
                return;
            }
            notified.await;
        }
    }

    fn record(&self, chunk: &[u8]) {
        let mut state = self.state.lock();
        if state.buffer.len() >= self.cap {
            state.truncated = true;
            return;
        }
        let remaining = self.cap - state.buffer.len();
        if chunk.len() > remaining {
            state.buffer.extend_from_slice(&chunk[..remaining]);
            state.truncated = true;
        } else {
            state.buffer.extend_from_slice(chunk);
        }
    }

    /// The bytes captured so far, up to the configured cap. Safe to call
    /// after the handler (and the body stream) has finished.
    pub fn buffered(&self) -> Vec<u8> {
        self.state.lock().buffer.clone()
    }

    /// Whether the response body exceeded the capture cap. The client
    /// still received every byte; only the buffer is incomplete.
    pub fn truncated(&self) -> bool {
        self.state.lock().truncated
    }
}

pin_project! {
    /// Wraps a response body, forwarding every frame unchanged while
    /// mirroring data frames into a `CaptureHandle`.
    pub struct CapturingBody {
        #[pin]
        inner: Body,
        handle: CaptureHandle,
    }
}

impl CapturingBody {
    fn new(inner: Body, handle: CaptureHandle) -> Self {
        Self { inner, handle }
    }
}

impl HttpBody for CapturingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
        let this = self.project();
        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.handle.record(data.chunk());
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.handle.mark_done();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.handle.mark_done();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Snapshot of the response's status and headers, taken synchronously at
/// wrap time (these are known immediately; only the body streams lazily).
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Wraps `response` for capture. Returns the rewritten response (pass this
/// on to the client unchanged) plus the metadata and handle the middleware
/// reads from after the handler completes.
pub fn wrap(response: Response, cap: usize) -> (Response, ResponseMeta, CaptureHandle) {
    let (parts, body) = response.into_parts();
    let meta = ResponseMeta {
        status: parts.status,
        headers: parts.headers.clone(),
    };
    let handle = CaptureHandle::new(cap);
    let wrapped_body = Body::new(CapturingBody::new(body, handle.clone()));
    (Response::from_parts(parts, wrapped_body), meta, handle)
}
