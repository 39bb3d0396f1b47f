//! FIFO batch queue for requests that are neither immediate nor debounced.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::request::TriggerRequest;

#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub request: TriggerRequest,
    pub queued_at: Instant,
}

/// FIFO of requests waiting for the drain loop.
#[derive(Default)]
pub struct BatchQueue {
    items: Mutex<VecDeque<QueuedRequest>>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue and return the 1-based position.
    pub fn push(&self, request: TriggerRequest) -> usize {
        let mut items = self.items.lock();
        items.push_back(QueuedRequest {
            request,
            queued_at: Instant::now(),
        });
        items.len()
    }

    /// Pop up to `max` requests from the front.
    pub fn take_batch(&self, max: usize) -> Vec<QueuedRequest> {
        let mut items = self.items.lock();
        let n = max.max(1).min(items.len());
        items.drain(..n).collect()
    }

    /// Remove a request that has not started yet.
    pub fn remove(&self, request_id: &str) -> Option<TriggerRequest> {
        let mut items = self.items.lock();
        let index = items.iter().position(|q| q.request.id == request_id)?;
        items.remove(index).map(|q| q.request)
    }

    /// Drop everything. Returns how many requests were discarded.
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let count = items.len();
        items.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::Target;

    fn request(path: &str) -> TriggerRequest {
        TriggerRequest::new("file_created", "code_quality", Target::file(path))
    }

    #[tokio::test]
    async fn batches_preserve_fifo_order() {
        let queue = BatchQueue::new();
        for i in 0..7 {
            assert_eq!(queue.push(request(&format!("f{i}.ts"))), i + 1);
        }
        let first: Vec<_> = queue
            .take_batch(5)
            .into_iter()
            .map(|q| q.request.target.subject())
            .collect();
        assert_eq!(first, vec!["f0.ts", "f1.ts", "f2.ts", "f3.ts", "f4.ts"]);
        assert_eq!(queue.take_batch(5).len(), 2);
        assert!(queue.take_batch(5).is_empty());
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let queue = BatchQueue::new();
        let keep = request("a.ts");
        let drop = request("b.ts");
        let drop_id = drop.id.clone();
        queue.push(keep);
        queue.push(drop);

        assert!(queue.remove(&drop_id).is_some());
        assert!(queue.remove(&drop_id).is_none());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.clear(), 1);
        assert!(queue.is_empty());
    }
}
