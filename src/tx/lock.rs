//! Page-granularity lock manager with deadlock detection.
//!
//! Locks come in two modes (shared / exclusive, named by [`Permissions`]) and
//! are strict two-phase: the buffer pool acquires them on page access and
//! nothing releases them until the transaction completes.
//!
//! Blocking acquisition runs a retry loop over a condition variable. Before a
//! requester goes to sleep it records `waiter -> holder` edges in a
//! process-wide wait-for graph and runs a depth-first cycle check; a cycle
//! means deadlock, and the policy is to abort the *requester* by returning
//! [`TxError::Aborted`].
//!
//! # Latching
//!
//! All state (lock table and wait-for graph) lives behind a single mutex.
//! Transitions are short and never perform I/O, so one monitor is enough;
//! waiters are woken with `notify_all` on every release and re-evaluate the
//! grant condition themselves. Waits are bounded (~1 s) so a missed
//! notification degrades to a retry rather than a hang.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::storage::PageId;

use super::error::TxError;
use super::{Permissions, TransactionId};

/// Upper bound on a single condvar wait. Re-checking the grant condition
/// once a second costs nothing and protects against missed wakeups.
const WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// One lock table entry: who holds the page and in which mode.
///
/// Invariant: `mode == ReadWrite` implies exactly one holder;
/// `mode == ReadOnly` implies at least one.
#[derive(Debug)]
struct LockEntry {
    mode: Permissions,
    holders: HashSet<TransactionId>,
}

impl LockEntry {
    fn new(tid: TransactionId, mode: Permissions) -> Self {
        let mut holders = HashSet::new();
        holders.insert(tid);
        Self { mode, holders }
    }
}

/// Lock table plus wait-for graph, guarded by the manager's mutex.
#[derive(Debug, Default)]
struct LockState {
    locks: HashMap<PageId, LockEntry>,
    /// Edges `waiter -> holders` for every transaction currently blocked.
    wait_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

/// Outcome of a single (non-blocking) acquisition attempt.
#[derive(Debug, PartialEq, Eq)]
enum Acquire {
    Granted,
    Blocked,
}

/// Process-wide page lock manager.
#[derive(Debug)]
pub struct LockManager {
    state: Mutex<LockState>,
    released: Condvar,
}

impl LockManager {
    /// Creates an empty lock manager.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
        }
    }

    /// Acquires the lock on `pid` for `tid` at level `perm`, blocking until
    /// the lock is granted.
    ///
    /// # Errors
    ///
    /// Returns [`TxError::Aborted`] if granting would deadlock; the requester
    /// is the victim and its wait-for edges have already been removed. Locks
    /// the victim already holds stay held until `release_transaction`.
    pub fn lock(
        &self,
        pid: PageId,
        tid: TransactionId,
        perm: Permissions,
    ) -> Result<(), TxError> {
        let mut state = self.state.lock();
        loop {
            match Self::try_acquire(&mut state, pid, tid, perm)? {
                Acquire::Granted => {
                    state.wait_for.remove(&tid);
                    trace!(%pid, %tid, %perm, "lock granted");
                    return Ok(());
                }
                Acquire::Blocked => {
                    trace!(%pid, %tid, %perm, "lock blocked");
                    // Spurious and timed-out wakeups are fine: the grant
                    // condition is re-evaluated on every iteration.
                    let _ = self.released.wait_for(&mut state, WAIT_TIMEOUT);
                }
            }
        }
    }

    /// Releases `tid`'s hold on `pid` and wakes all waiters.
    ///
    /// Early release breaks two-phase locking; the buffer pool only exposes
    /// this through `release_page` for callers that accept the consequences.
    pub fn release(&self, pid: PageId, tid: TransactionId) {
        let mut state = self.state.lock();
        Self::remove_holder(&mut state, pid, tid);
        self.released.notify_all();
    }

    /// Releases every lock held by `tid` and removes its wait-for edges.
    ///
    /// Called on transaction completion (commit or abort).
    pub fn release_transaction(&self, tid: TransactionId) {
        let mut state = self.state.lock();
        let held: Vec<PageId> = state
            .locks
            .iter()
            .filter(|(_, entry)| entry.holders.contains(&tid))
            .map(|(pid, _)| *pid)
            .collect();
        for pid in held {
            Self::remove_holder(&mut state, pid, tid);
        }
        state.wait_for.remove(&tid);
        trace!(%tid, "all locks released");
        self.released.notify_all();
    }

    /// Returns true if `tid` currently holds a lock on `pid` in any mode.
    pub fn holds(&self, pid: PageId, tid: TransactionId) -> bool {
        let state = self.state.lock();
        state
            .locks
            .get(&pid)
            .is_some_and(|entry| entry.holders.contains(&tid))
    }

    /// A single acquisition attempt under the state mutex.
    ///
    /// Grant cases, in order: no entry; sole holder (upgrading in place if
    /// needed); shared join. Anything else records wait-for edges to every
    /// current holder and checks for a deadlock cycle.
    fn try_acquire(
        state: &mut LockState,
        pid: PageId,
        tid: TransactionId,
        perm: Permissions,
    ) -> Result<Acquire, TxError> {
        if !state.locks.contains_key(&pid) {
            state.locks.insert(pid, LockEntry::new(tid, perm));
            return Ok(Acquire::Granted);
        }
        let entry = state.locks.get_mut(&pid).expect("entry was just checked");

        if entry.holders.contains(&tid) && entry.holders.len() == 1 {
            if entry.mode == Permissions::ReadOnly && perm == Permissions::ReadWrite {
                entry.mode = Permissions::ReadWrite;
                debug!(%pid, %tid, "lock upgraded to exclusive");
            }
            return Ok(Acquire::Granted);
        }

        if entry.mode == Permissions::ReadOnly && perm == Permissions::ReadOnly {
            entry.holders.insert(tid);
            return Ok(Acquire::Granted);
        }

        // Conflict: wait on every current holder. A requester upgrading
        // amid other sharers appears in its own edge set; the resulting
        // self-cycle aborts it, which resolves the two-upgrader standoff.
        let holders = entry.holders.clone();
        state.wait_for.insert(tid, holders);
        if Self::has_cycle_from(&state.wait_for, tid) {
            state.wait_for.remove(&tid);
            debug!(%pid, %tid, "deadlock detected, aborting requester");
            return Err(TxError::Aborted(tid));
        }
        Ok(Acquire::Blocked)
    }

    fn remove_holder(state: &mut LockState, pid: PageId, tid: TransactionId) {
        if let Some(entry) = state.locks.get_mut(&pid) {
            entry.holders.remove(&tid);
            if entry.holders.is_empty() {
                state.locks.remove(&pid);
            }
        }
    }

    /// Depth-first cycle search over the wait-for graph starting at `start`.
    ///
    /// Vertices are popped from the recursion stack on the way out;
    /// a vertex found on the stack while descending closes a cycle.
    fn has_cycle_from(
        graph: &HashMap<TransactionId, HashSet<TransactionId>>,
        start: TransactionId,
    ) -> bool {
        fn visit(
            graph: &HashMap<TransactionId, HashSet<TransactionId>>,
            node: TransactionId,
            visited: &mut HashSet<TransactionId>,
            stack: &mut HashSet<TransactionId>,
        ) -> bool {
            if stack.contains(&node) {
                return true;
            }
            if !visited.insert(node) {
                return false;
            }
            stack.insert(node);
            if let Some(next) = graph.get(&node) {
                for &waitee in next {
                    if visit(graph, waitee, visited, stack) {
                        return true;
                    }
                }
            }
            stack.remove(&node);
            false
        }

        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        visit(graph, start, &mut visited, &mut stack)
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
