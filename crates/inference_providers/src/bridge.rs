//! Blocking-iterator bridge (spec.md §4.1, §9).
//!
//! Some provider SDKs only expose a synchronous iterator. The bridge runs
//! the iterator on a dedicated `spawn_blocking` worker and hands items to
//! the cooperative side through a bounded channel carrying an explicit
//! end-of-stream sentinel and an error sentinel, so the cooperative
//! consumer never hangs even if the worker panics or the producer forgets
//! to signal completion.

use tokio::sync::mpsc;

/// One item flowing from the blocking worker to the cooperative consumer.
pub enum BridgeItem<T, E> {
    Item(T),
    Error(E),
    End,
}

/// Handle given to the blocking producer closure to push items back.
#[derive(Clone)]
pub struct BridgeSender<T, E> {
    tx: mpsc::Sender<BridgeItem<T, E>>,
}

impl<T, E> BridgeSender<T, E> {
    pub fn send_item(&self, item: T) -> bool {
        self.tx.blocking_send(BridgeItem::Item(item)).is_ok()
    }

    pub fn send_error(&self, err: E) {
        let _ = self.tx.blocking_send(BridgeItem::Error(err));
    }
}

/// The cooperative-side handle to a bridged blocking iterator.
///
/// Dropping a `Bridge` aborts the worker's join handle; since the worker
/// itself still runs to completion if already inside a blocking call
/// (spawn_blocking tasks aren't preemptible), the bridge also drops its
/// receiver, so the worker's next `send_item` fails fast and it can notice
/// and return instead of blocking forever on a full channel.
pub struct Bridge<T, E> {
    rx: mpsc::Receiver<BridgeItem<T, E>>,
    handle: tokio::task::JoinHandle<()>,
    done: bool,
}

impl<T, E> Bridge<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Spawn `producer` on a blocking worker thread with a channel of
    /// capacity `buffer`. `producer` is responsible for calling
    /// `send_item`/`send_error` as it drains its blocking iterator; the
    /// bridge posts a final `End` itself after the closure returns, so a
    /// producer that forgets to signal completion still can't hang a
    /// consumer.
    pub fn spawn<F>(buffer: usize, producer: F) -> Self
    where
        F: FnOnce(BridgeSender<T, E>) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(buffer);
        let sender = BridgeSender { tx: tx.clone() };
        let handle = tokio::task::spawn_blocking(move || {
            producer(sender);
            let _ = tx.blocking_send(BridgeItem::End);
        });
        Self { rx, handle, done: false }
    }

    /// Receive the next item. Returns `None` once `End` has been observed
    /// or the channel is closed; `Error` values are surfaced once (on first
    /// consumption) and terminate the stream on the next call.
    pub async fn recv(&mut self) -> Option<BridgeItem<T, E>> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(BridgeItem::End) | None => {
                self.done = true;
                None
            }
            Some(item @ BridgeItem::Error(_)) => {
                self.done = true;
                Some(item)
            }
            Some(item) => Some(item),
        }
    }
}

impl<T, E> Drop for Bridge<T, E> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_items_then_end() {
        let mut bridge = Bridge::<i32, String>::spawn(4, |tx| {
            for i in 0..3 {
                tx.send_item(i);
            }
        });

        let mut collected = Vec::new();
        while let Some(item) = bridge.recv().await {
            match item {
                BridgeItem::Item(v) => collected.push(v),
                BridgeItem::Error(_) => panic!("unexpected error"),
                BridgeItem::End => unreachable!("End is not surfaced by recv"),
            }
        }
        assert_eq!(collected, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn worker_error_terminates_stream_after_surfacing_once() {
        let mut bridge = Bridge::<i32, String>::spawn(4, |tx| {
            tx.send_item(1);
            tx.send_error("boom".to_string());
        });

        assert!(matches!(bridge.recv().await, Some(BridgeItem::Item(1))));
        assert!(matches!(bridge.recv().await, Some(BridgeItem::Error(_))));
        assert!(bridge.recv().await.is_none());
    }

    #[tokio::test]
    async fn producer_that_forgets_end_still_terminates() {
        let mut bridge = Bridge::<i32, String>::spawn(4, |tx| {
            tx.send_item(42);
            // deliberately no explicit End -- the bridge posts one anyway
        });
        assert!(matches!(bridge.recv().await, Some(BridgeItem::Item(42))));
        assert!(bridge.recv().await.is_none());
    }
}
