//! Unit-of-work scoping around a batch.

use tracing::debug;

/// Work opened for one batch. Exactly one of `commit` / `abort` is called.
pub trait UnitOfWork: Send {
    fn commit(self: Box<Self>) -> anyhow::Result<()>;

    fn abort(self: Box<Self>);
}

/// Opens units of work.
pub trait HandlerScope: Send + Sync {
    fn begin(&self) -> anyhow::Result<Box<dyn UnitOfWork>>;
}

impl<F> HandlerScope for F
where
    F: Fn() -> anyhow::Result<Box<dyn UnitOfWork>> + Send + Sync,
{
    fn begin(&self) -> anyhow::Result<Box<dyn UnitOfWork>> {
        self()
    }
}

/// Owns a unit of work: aborts it on drop unless [`ScopeGuard::commit`] ran.
///
/// Dropping during unwinding aborts as well.
pub struct ScopeGuard {
    unit: Option<Box<dyn UnitOfWork>>,
}

impl ScopeGuard {
    pub fn new(unit: Box<dyn UnitOfWork>) -> Self {
        Self { unit: Some(unit) }
    }

    pub fn commit(mut self) -> anyhow::Result<()> {
        match self.unit.take() {
            Some(unit) => unit.commit(),
            None => Ok(()),
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(unit) = self.unit.take() {
            debug!("unit of work aborted");
            unit.abort();
        }
    }
}

impl std::fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("open", &self.unit.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Scope that counts how its units of work end.
    #[derive(Debug, Default, Clone)]
    pub(crate) struct CountingScope {
        pub(crate) begun: Arc<AtomicUsize>,
        pub(crate) committed: Arc<AtomicUsize>,
        pub(crate) aborted: Arc<AtomicUsize>,
    }

    struct CountingUnit {
        committed: Arc<AtomicUsize>,
        aborted: Arc<AtomicUsize>,
    }

    impl UnitOfWork for CountingUnit {
        fn commit(self: Box<Self>) -> anyhow::Result<()> {
            self.committed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn abort(self: Box<Self>) {
            self.aborted.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl HandlerScope for CountingScope {
        fn begin(&self) -> anyhow::Result<Box<dyn UnitOfWork>> {
            self.begun.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingUnit {
                committed: self.committed.clone(),
                aborted: self.aborted.clone(),
            }))
        }
    }

    impl CountingScope {
        pub(crate) fn counts(&self) -> (usize, usize, usize) {
            (
                self.begun.load(Ordering::SeqCst),
                self.committed.load(Ordering::SeqCst),
                self.aborted.load(Ordering::SeqCst),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::CountingScope;
    use super::*;

    #[test]
    fn guard_commits_explicitly_and_aborts_on_drop() {
        let scope = CountingScope::default();

        ScopeGuard::new(scope.begin().unwrap()).commit().unwrap();
        drop(ScopeGuard::new(scope.begin().unwrap()));

        assert_eq!(scope.counts(), (2, 1, 1));
    }

    #[test]
    fn guard_aborts_while_unwinding() {
        let scope = CountingScope::default();
        let unit = scope.begin().unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = ScopeGuard::new(unit);
            panic!("handler blew up");
        }));

        assert!(result.is_err());
        assert_eq!(scope.counts(), (1, 0, 1));
    }
}
