//! Multi-consumer wrapper around a tokio mpsc receiver.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

/// Receiver shared by a pool of workers. One worker waits at a time.
#[derive(Debug)]
pub(crate) struct SharedReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedReceiver<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next message, or `None` once every sender is gone and the buffer is drained.
    pub(crate) async fn recv(&self) -> Option<T> {
        self.inner.lock().await.recv().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consumers_split_messages_and_see_close() {
        let (tx, rx) = mpsc::channel(8);
        let shared = SharedReceiver::new(rx);
        for i in 0..4 {
            tx.send(i).await.unwrap();
        }
        drop(tx);

        let a = shared.clone();
        let b = shared.clone();
        let mut got = vec![
            a.recv().await.unwrap(),
            b.recv().await.unwrap(),
            a.recv().await.unwrap(),
            b.recv().await.unwrap(),
        ];
        got.sort_unstable();
        assert_eq!(got, vec![0, 1, 2, 3]);
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
    }
}
