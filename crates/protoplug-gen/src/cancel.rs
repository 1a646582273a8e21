//! Cooperative cancellation shared by the tasks of one generation.
//!
//! A [`CancellationToken`] is cheap to clone; every clone observes the same
//! flag. The caller may attach a deadline, after which the token reports
//! itself as cancelled without anyone calling [`CancellationToken::cancel`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared cancellation flag with an optional deadline.
///
/// # Example
///
/// ```
/// use protoplug_gen::CancellationToken;
///
/// let token = CancellationToken::new();
/// let sibling = token.clone();
/// assert!(!sibling.is_cancelled());
/// token.cancel();
/// assert!(sibling.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<Self>>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Creates a token with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that expires once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            parent: None,
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Creates a child token with its own flag.
    ///
    /// The child observes cancellation of the parent and of every ancestor
    /// above it, and inherits the parent's deadline. Cancelling the child
    /// leaves its ancestors untouched.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::default(),
            parent: Some(Arc::new(self.clone())),
            deadline: self.deadline,
        }
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancelled or past the deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_cancelled())
            || self.deadline_passed()
    }

    /// Returns `true` when a deadline was configured and has passed.
    #[must_use]
    pub fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn child_does_not_cancel_parent() {
        let parent = CancellationToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn child_observes_parent() {
        let parent = CancellationToken::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn grandchild_observes_root() {
        let root = CancellationToken::new();
        let child = root.child();
        let grandchild = child.child();
        root.cancel();
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn grandchild_observes_middle_without_touching_root() {
        let root = CancellationToken::new();
        let child = root.child();
        let grandchild = child.child();
        child.cancel();
        assert!(grandchild.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[test]
    fn grandchild_does_not_cancel_ancestors() {
        let root = CancellationToken::new();
        let child = root.child();
        let grandchild = child.child();
        grandchild.cancel();
        assert!(!child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[test]
    fn grandchild_inherits_deadline() {
        let root = CancellationToken::with_timeout(Duration::ZERO);
        let grandchild = root.child().child();
        assert!(grandchild.deadline_passed());
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let token = CancellationToken::with_timeout(Duration::ZERO);
        assert!(token.deadline_passed());
        assert!(token.is_cancelled());
    }

    #[test]
    fn generous_timeout_is_not_cancelled() {
        let token = CancellationToken::with_timeout(Duration::from_secs(3600));
        assert!(!token.is_cancelled());
    }
}
