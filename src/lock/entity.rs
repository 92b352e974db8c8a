use std::collections::HashSet;
use std::fmt;

use crate::tx::TransactionId;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => f.write_str("shared"),
            LockMode::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Holders of one page's lock.
///
/// An exclusive holder is never accompanied by shared holders: an upgrade
/// moves the transaction out of `shared` in the same step that sets
/// `exclusive`.
#[derive(Debug, Default)]
pub struct LockRecord {
    shared: HashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl LockRecord {
    pub fn mode_of(&self, tid: TransactionId) -> Option<LockMode> {
        if self.exclusive == Some(tid) {
            Some(LockMode::Exclusive)
        } else if self.shared.contains(&tid) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    pub fn holds(&self, tid: TransactionId) -> bool {
        self.mode_of(tid).is_some()
    }

    // Exclusive subsumes shared
    pub fn satisfies(&self, tid: TransactionId, mode: LockMode) -> bool {
        match (self.mode_of(tid), mode) {
            (Some(LockMode::Exclusive), _) => true,
            (Some(LockMode::Shared), LockMode::Shared) => true,
            _ => false,
        }
    }

    pub fn grantable(&self, tid: TransactionId, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => self.exclusive.map_or(true, |holder| holder == tid),
            LockMode::Exclusive => {
                self.exclusive.map_or(true, |holder| holder == tid)
                    && self.shared.iter().all(|&holder| holder == tid)
            }
        }
    }

    /// Records `tid` as holder. The caller has checked `grantable`.
    pub fn grant(&mut self, tid: TransactionId, mode: LockMode) {
        match mode {
            LockMode::Shared => {
                if self.exclusive != Some(tid) {
                    self.shared.insert(tid);
                }
            }
            LockMode::Exclusive => {
                self.shared.remove(&tid);
                self.exclusive = Some(tid);
            }
        }
    }

    /// Returns whether `tid` held the lock.
    pub fn release(&mut self, tid: TransactionId) -> bool {
        let was_shared = self.shared.remove(&tid);
        let was_exclusive = self.exclusive == Some(tid);
        if was_exclusive {
            self.exclusive = None;
        }
        was_shared || was_exclusive
    }

    pub fn is_free(&self) -> bool {
        self.exclusive.is_none() && self.shared.is_empty()
    }

    pub fn exclusive_holder(&self) -> Option<TransactionId> {
        self.exclusive
    }

    pub fn shared_holders(&self) -> impl Iterator<Item = TransactionId> + '_ {
        self.shared.iter().copied()
    }
}
