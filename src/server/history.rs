use std::collections::VecDeque;

/// The last `capacity` chat lines, oldest first.
///
/// Not synchronized on its own; it lives inside [`ChatState`](super::state::ChatState)
/// next to the session list so both are guarded by the same lock.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    messages: VecDeque<String>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity),
        }
    }

    /// Append `message` and evict from the front until the bound holds again.
    pub fn append(&mut self, message: impl Into<String>) {
        self.messages.push_back(message.into());
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.messages.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_last_capacity_messages() {
        let mut history = HistoryBuffer::new(2);
        history.append("a");
        history.append("b");
        history.append("c");
        assert_eq!(history.to_vec(), vec!["b", "c"]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut history = HistoryBuffer::new(10);
        for i in 0..25 {
            history.append(format!("msg {}", i));
            assert!(history.len() <= history.capacity());
        }
        let expected: Vec<String> = (15..25).map(|i| format!("msg {}", i)).collect();
        assert_eq!(history.to_vec(), expected);
    }

    #[test]
    fn test_under_capacity_keeps_everything_in_order() {
        let mut history = HistoryBuffer::new(10);
        history.append("first");
        history.append("second");
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut history = HistoryBuffer::new(0);
        history.append("dropped");
        assert!(history.is_empty());
    }
}
