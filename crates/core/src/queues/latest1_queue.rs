use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

/// Single slot holding the most recent value. A value nobody consumed yet is
/// replaced by the next one.
pub struct Latest1Queue<T> {
    slot: Mutex<Option<T>>,
    notify_any: Arc<Notify>,
}

impl<T> Latest1Queue<T> {
    pub fn new(notify_any: Arc<Notify>) -> Self {
        Self {
            slot: Mutex::new(None),
            notify_any,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `value`, returning the unconsumed value it superseded.
    pub fn set(&self, value: T) -> Option<T> {
        let superseded = self.slot().replace(value);
        self.notify_any.notify_one();
        superseded
    }

    pub fn try_recv(&self) -> Option<T> {
        self.slot().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_latest() {
        let q = Latest1Queue::new(Arc::new(Notify::new()));
        assert_eq!(q.set("a"), None);
        assert_eq!(q.set("b"), Some("a"));
        assert_eq!(q.try_recv(), Some("b"));
        assert_eq!(q.try_recv(), None);
    }
}
