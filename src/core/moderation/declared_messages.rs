// Messages already handled by some rule pass (ours or a sibling agent's).
//
// Bounded in-memory registry that keeps the most recent declarations; once
// the cap is reached the oldest declaration is forgotten first.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

// Cap how many declared messages we keep in memory.
const MAX_DECLARED_MESSAGES: usize = 10_000;

type MessageKey = (u64, u64);

#[derive(Default)]
struct Registry {
    keys: HashSet<MessageKey>,
    /// Insertion order, oldest at the front.
    order: VecDeque<MessageKey>,
}

pub struct DeclaredMessages {
    capacity: usize,
    registry: Mutex<Registry>,
}

impl Default for DeclaredMessages {
    fn default() -> Self {
        Self::with_capacity(MAX_DECLARED_MESSAGES)
    }
}

impl DeclaredMessages {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Mark a message as processed. Returns `true` if it was not declared before.
    pub fn declare(&self, group_id: u64, message_id: u64) -> bool {
        let key = (group_id, message_id);
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        if !registry.keys.insert(key) {
            return false;
        }
        registry.order.push_back(key);

        while registry.order.len() > self.capacity {
            if let Some(oldest) = registry.order.pop_front() {
                registry.keys.remove(&oldest);
            }
        }

        true
    }

    pub fn is_declared(&self, group_id: u64, message_id: u64) -> bool {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys
            .contains(&(group_id, message_id))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_once() {
        let declared = DeclaredMessages::new();

        assert!(declared.declare(1, 100));
        assert!(!declared.declare(1, 100));
        assert!(declared.is_declared(1, 100));
        assert!(!declared.is_declared(2, 100));
    }

    #[test]
    fn test_registry_is_bounded() {
        let declared = DeclaredMessages::new();
        for id in 0..(MAX_DECLARED_MESSAGES as u64 + 10) {
            declared.declare(1, id);
        }

        assert_eq!(declared.len(), MAX_DECLARED_MESSAGES);
        assert!(declared.is_declared(1, MAX_DECLARED_MESSAGES as u64 + 9));
    }

    #[test]
    fn test_oldest_declaration_is_forgotten_first() {
        let declared = DeclaredMessages::with_capacity(3);
        for id in 1..=4 {
            declared.declare(1, id);
        }

        assert!(!declared.is_declared(1, 1));
        assert!(declared.is_declared(1, 2));
        assert!(declared.is_declared(1, 3));
        assert!(declared.is_declared(1, 4));

        // Re-declaring a known message does not refresh or duplicate it
        assert!(!declared.declare(1, 2));
        assert!(declared.declare(1, 5));
        assert!(!declared.is_declared(1, 2));
        assert!(declared.is_declared(1, 5));
        assert_eq!(declared.len(), 3);
    }
}
