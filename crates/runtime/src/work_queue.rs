use std::collections::VecDeque;

/// Bounded first-in first-out queue.
///
/// Key properties:
/// - Items leave in exactly the order they were admitted.
/// - Backpressure is explicit: `try_push` fails once `max_len` items wait,
///   and the rejected payload is handed back to the caller.
/// - No reordering, no priorities. Callers that need to correlate replies
///   with requests rely on this.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: VecDeque<T>,
    max_len: Option<usize>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WorkQueueFull {
    pub max_len: usize,
}

impl std::fmt::Display for WorkQueueFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "work queue full ({} pending)", self.max_len)
    }
}

impl std::error::Error for WorkQueueFull {}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            max_len: None,
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(max_len.min(1024)),
            max_len: Some(max_len),
        }
    }

    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Slots left before `try_push` starts failing; `usize::MAX` when unbounded.
    pub fn remaining_capacity(&self) -> usize {
        match self.max_len {
            Some(max_len) => max_len.saturating_sub(self.items.len()),
            None => usize::MAX,
        }
    }

    pub fn try_push(&mut self, payload: T) -> Result<(), (WorkQueueFull, T)> {
        if let Some(max_len) = self.max_len
            && self.items.len() >= max_len
        {
            return Err((WorkQueueFull { max_len }, payload));
        }
        self.items.push_back(payload);
        Ok(())
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    /// Removes the oldest item.
    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{WorkQueue, WorkQueueFull};

    #[test]
    fn pops_in_insertion_order() {
        let mut q = WorkQueue::new();
        q.try_push("a").unwrap();
        q.try_push("b").unwrap();
        q.try_push("c").unwrap();

        assert_eq!(q.pop_front(), Some("a"));
        assert_eq!(q.pop_front(), Some("b"));
        assert_eq!(q.pop_front(), Some("c"));
        assert_eq!(q.pop_front(), None);
    }

    #[test]
    fn backpressure_rejects_when_full() {
        let mut q = WorkQueue::with_max_len(2);
        assert!(q.try_push("a").is_ok());
        assert!(q.try_push("b").is_ok());
        assert_eq!(q.remaining_capacity(), 0);

        let (err, rejected) = q.try_push("c").unwrap_err();
        assert_eq!(err, WorkQueueFull { max_len: 2 });
        assert_eq!(rejected, "c");
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn popping_frees_capacity() {
        let mut q = WorkQueue::with_max_len(1);
        q.try_push(1).unwrap();
        assert!(q.try_push(2).is_err());
        assert_eq!(q.pop_front(), Some(1));
        assert_eq!(q.remaining_capacity(), 1);
        q.try_push(2).unwrap();
        assert_eq!(q.front(), Some(&2));
    }

    #[test]
    fn unbounded_queue_reports_unlimited_capacity() {
        let mut q: WorkQueue<u8> = WorkQueue::new();
        assert_eq!(q.max_len(), None);
        assert_eq!(q.remaining_capacity(), usize::MAX);
        q.try_push(7).unwrap();
        q.clear();
        assert!(q.is_empty());
    }
}
