//! Bounded window of the most recent messages.

use quill_core::Message;
use std::collections::VecDeque;

/// Fixed-capacity ring buffer of messages. Adding past capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct ShortTermMemory {
    capacity: usize,
    messages: VecDeque<Message>,
}

impl ShortTermMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, message: Message) {
        if self.capacity == 0 {
            return;
        }
        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// Messages in insertion order, oldest first.
    pub fn all(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(memory: &ShortTermMemory) -> Vec<String> {
        memory.iter().map(|m| m.content.clone()).collect()
    }

    #[test]
    fn keeps_last_k_in_order() {
        for (n, k) in [(3usize, 5usize), (5, 5), (12, 5), (1, 1)] {
            let mut memory = ShortTermMemory::new(k);
            for i in 0..n {
                memory.add(Message::user(i.to_string()));
            }
            let expected: Vec<String> = (n.saturating_sub(k)..n).map(|i| i.to_string()).collect();
            assert_eq!(contents(&memory), expected, "n={n} k={k}");
            assert!(memory.len() <= k);
        }
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut memory = ShortTermMemory::new(0);
        memory.add(Message::user("dropped"));
        assert!(memory.is_empty());
    }

    #[test]
    fn clear_empties_buffer() {
        let mut memory = ShortTermMemory::new(3);
        memory.add(Message::user("a"));
        memory.clear();
        assert!(memory.all().is_empty());
        assert_eq!(memory.capacity(), 3);
    }
}
