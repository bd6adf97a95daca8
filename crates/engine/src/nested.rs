//! [`NestedTxStack`]: the process-wide depth counter and active-transaction
//! stack guarding against reentrant `run`/`begin` calls (spec §3, §4.3.5, P3).

use parking_lot::Mutex;

use txstore_core::{Error, Result};

/// Process-wide stack of active transaction ids. Invariant: `depth ==
/// stack.len()` at all times (spec §3). Manipulated only around
/// `run`/`begin...commit`/`rollback`, via [`NestedTxStack::try_enter`]'s
/// finally-style guard.
#[derive(Debug, Default)]
pub struct NestedTxStack {
    stack: Mutex<Vec<String>>,
}

/// Holds a transaction's slot on the stack; popping happens in `Drop` so
/// the depth is restored even if the caller returns early via `?` during
/// any phase (spec §4.3.5: "depth is decremented in a finally-style
/// guard").
pub struct NestedGuard<'a> {
    stack: &'a NestedTxStack,
}

impl Drop for NestedGuard<'_> {
    fn drop(&mut self) {
        self.stack.stack.lock().pop();
    }
}

impl NestedTxStack {
    /// Construct an empty stack.
    pub fn new() -> Self {
        NestedTxStack::default()
    }

    /// Current depth.
    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    /// Snapshot of the currently active transaction ids.
    pub fn active_ids(&self) -> Vec<String> {
        self.stack.lock().clone()
    }

    /// Attempt to enter at depth 0. Fails with [`Error::NestedNotSupported`]
    /// if another transaction is already active on this stack; on success,
    /// returns a guard whose drop restores the depth.
    pub fn try_enter(&self, transaction_id: impl Into<String>) -> Result<NestedGuard<'_>> {
        let mut stack = self.stack.lock();
        if !stack.is_empty() {
            return Err(Error::NestedNotSupported {
                depth: stack.len(),
                stack: stack.clone(),
            });
        }
        stack.push(transaction_id.into());
        Ok(NestedGuard { stack: self })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_enter_succeeds_second_fails() {
        let stack = NestedTxStack::new();
        let guard = stack.try_enter("tx1").unwrap();
        assert_eq!(stack.depth(), 1);

        let err = stack.try_enter("tx2").unwrap_err();
        match err {
            Error::NestedNotSupported { depth, stack: ids } => {
                assert_eq!(depth, 1);
                assert_eq!(ids, vec!["tx1".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        drop(guard);
    }

    #[test]
    fn guard_drop_restores_depth_even_on_early_return() {
        let stack = NestedTxStack::new();
        {
            let _guard = stack.try_enter("tx1").unwrap();
            assert_eq!(stack.depth(), 1);
        }
        assert_eq!(stack.depth(), 0);

        // A second transaction can now enter.
        let _guard2 = stack.try_enter("tx2").unwrap();
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn active_ids_reflects_current_stack() {
        let stack = NestedTxStack::new();
        let _guard = stack.try_enter("tx1").unwrap();
        assert_eq!(stack.active_ids(), vec!["tx1".to_string()]);
    }
}
