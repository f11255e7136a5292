use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Liveness of a mounted view.
///
/// Clones share the flag. Work started on behalf of a view checks it before
/// applying results, so answers arriving after teardown are dropped.
#[derive(Clone, Debug)]
pub struct MountFlag {
    mounted: Arc<AtomicBool>,
}

impl MountFlag {
    pub fn new() -> Self {
        MountFlag {
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    /// `Some(value)` while mounted, `None` once torn down.
    pub fn keep<T>(&self, value: T) -> Option<T> {
        self.is_mounted().then_some(value)
    }
}

impl Default for MountFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_are_dropped_after_unmount() {
        let view = MountFlag::new();
        let task_handle = view.clone();
        assert_eq!(task_handle.keep(1), Some(1));
        view.unmount();
        assert_eq!(task_handle.keep(2), None);
    }
}
