use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag a job polls between frames.
///
/// Clones observe the same flag, so the handle kept by the caller can stop a
/// job running on another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod cancel_tests {
    use super::*;

    #[test]
    fn test_clone_shares_flag() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
