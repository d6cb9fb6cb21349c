use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

/// Create a connected sink/stream pair.
#[must_use]
pub fn frame_channel() -> (FrameSink, FrameStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FrameSink { tx: Some(tx) }, FrameStream { rx })
}

/// Producer half of the output: encoded SSE frames go in, FIFO.
#[derive(Debug)]
pub struct FrameSink {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
}

impl FrameSink {
    /// Enqueue one encoded frame.
    ///
    /// A consumer that went away is not an error; the frame is dropped.
    pub fn send(&self, frame: impl Into<Bytes>) {
        let Some(tx) = self.tx.as_ref() else {
            tracing::debug!("frame dropped: sink already closed");
            return;
        };
        if tx.send(frame.into()).is_err() {
            tracing::debug!("frame dropped: consumer disconnected");
        }
    }

    /// Close the sink; the consumer sees end of stream after the frames
    /// already queued.
    pub fn close(&mut self) {
        self.tx = None;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(mpsc::UnboundedSender::is_closed)
    }
}

/// Consumer half of the output, usable directly as an HTTP body stream.
#[derive(Debug)]
pub struct FrameStream {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl Stream for FrameStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}
