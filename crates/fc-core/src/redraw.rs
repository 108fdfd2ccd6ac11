//! Redraw coalescing.
//!
//! Reply updates are applied to conversation state as soon as they arrive,
//! but repainting on every chunk is wasted work. Redraw *requests* go through
//! a channel of capacity one: a request that finds the slot full is already
//! covered by the pending redraw. The worker waits out a short window after
//! the first request, then redraws once for everything that arrived meanwhile.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::trace;

enum RedrawRequest {
    Coalesced,
    Immediate(oneshot::Sender<()>),
}

/// Cheap handle for requesting redraws. Clone freely.
#[derive(Debug, Clone)]
pub struct RedrawHandle {
    tx: mpsc::Sender<RedrawRequest>,
}

impl RedrawHandle {
    /// Ask for a redraw within the coalescing window. Never blocks.
    pub fn request(&self) {
        // Full means a redraw is already pending.
        let _ = self.tx.try_send(RedrawRequest::Coalesced);
    }

    /// Redraw now and wait until it has happened.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(RedrawRequest::Immediate(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl std::fmt::Debug for RedrawRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedrawRequest::Coalesced => f.write_str("Coalesced"),
            RedrawRequest::Immediate(_) => f.write_str("Immediate"),
        }
    }
}

/// Owns the redraw worker task.
pub struct RedrawCoalescer {
    handle: RedrawHandle,
    task: JoinHandle<()>,
}

impl RedrawCoalescer {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<R>(window: Duration, redraw: R) -> Self
    where
        R: FnMut() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(run_worker(rx, window, redraw));
        Self {
            handle: RedrawHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> RedrawHandle {
        self.handle.clone()
    }

    /// Stop the worker once every handle is gone and pending redraws ran.
    pub async fn shutdown(self) {
        drop(self.handle);
        let _ = self.task.await;
    }
}

async fn run_worker<R>(mut rx: mpsc::Receiver<RedrawRequest>, window: Duration, mut redraw: R)
where
    R: FnMut(),
{
    while let Some(request) = rx.recv().await {
        let mut acks = Vec::new();

        match request {
            RedrawRequest::Coalesced => {
                sleep(window).await;
                while let Ok(next) = rx.try_recv() {
                    if let RedrawRequest::Immediate(ack) = next {
                        acks.push(ack);
                    }
                }
            }
            RedrawRequest::Immediate(ack) => acks.push(ack),
        }

        trace!(waiting_flushes = acks.len(), "redraw");
        redraw();
        for ack in acks {
            let _ = ack.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(window_ms: u64) -> (RedrawCoalescer, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let coalescer = RedrawCoalescer::spawn(Duration::from_millis(window_ms), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (coalescer, count)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_within_window_redraws_once() {
        let (coalescer, count) = counting(30);
        let handle = coalescer.handle();

        for _ in 0..20 {
            handle.request();
        }
        sleep(Duration::from_millis(100)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_windows_redraw_separately() {
        let (coalescer, count) = counting(30);
        let handle = coalescer.handle();

        handle.request();
        sleep(Duration::from_millis(100)).await;
        handle.request();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_requests_no_redraws() {
        let (_coalescer, count) = counting(30);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_redraws_before_returning() {
        let (coalescer, count) = counting(30);
        coalescer.handle().flush().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_during_window_shares_the_pending_redraw() {
        let (coalescer, count) = counting(30);
        let handle = coalescer.handle();

        handle.request();
        // Let the worker pick up the request and start its window.
        tokio::task::yield_now().await;
        handle.flush().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_worker() {
        let (coalescer, count) = counting(30);
        coalescer.handle().request();
        coalescer.shutdown().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
