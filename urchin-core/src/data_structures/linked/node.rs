use std::alloc::{self, Layout};
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::Backoff;

use crate::data_structures::internal::{AtomicTaggedLink, TaggedLink};

use super::ListError;

pub(crate) type NodePtr<T> = *mut ListNode<T>;

/// One node of the concurrent list.
///
/// A node is jointly owned by the list (while linked), by every cursor that
/// points at it, and by every in-flight operation that reached it through
/// `wait_next`/`wait_prev`. Each owner holds one unit of `refs`; the node is
/// destroyed on the 1 -> 0 transition.
///
/// The two link slots double as per-edge locks: a null pointer in a slot
/// means the edge is held by the thread that nulled it, and every reader
/// retries until the slot is released (see [`wait_next`]).
//
// Link invariant between atomic steps: for a linked node N with predecessor
// P and successor S, P.next = N, N.prev = P, N.next = S, S.prev = N. A node
// that has been unlinked keeps both slots pointing at its former neighbors
// so cursors parked on it can still step off.
pub(crate) struct ListNode<T> {
    data: UnsafeCell<Option<T>>,
    refs: AtomicUsize,
    next: AtomicTaggedLink<ListNode<T>>,
    prev: AtomicTaggedLink<ListNode<T>>,
}

impl<T> ListNode<T> {
    fn new(value: Option<T>) -> Self {
        ListNode {
            data: UnsafeCell::new(value),
            refs: AtomicUsize::new(1),
            next: AtomicTaggedLink::new(ptr::null_mut(), 0),
            prev: AtomicTaggedLink::new(ptr::null_mut(), 0),
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Heap-allocate a fresh unlinked node (refs = 1, both links null).
    ///
    /// Allocation failure is reported to the caller instead of aborting; the
    /// value never leaves the caller's frame in that case.
    pub(crate) fn try_create(value: T) -> Result<NodePtr<T>, ListError> {
        let layout = Layout::new::<ListNode<T>>();
        // SAFETY: the layout of a concrete ListNode<T> is never zero-sized.
        let raw = unsafe { alloc::alloc(layout) } as NodePtr<T>;
        if raw.is_null() {
            return Err(ListError::AllocFailed);
        }
        // SAFETY: raw is freshly allocated with the layout of ListNode<T>.
        unsafe { raw.write(ListNode::new(Some(value))) };
        Ok(raw)
    }

    /// Allocate the sentinel, linked to itself through both edges.
    pub(crate) fn create_sentinel() -> NodePtr<T> {
        let node = Box::into_raw(Box::new(ListNode::new(None)));
        // SAFETY: node was just allocated and nothing else can see it yet.
        unsafe {
            (*node).next.store(TaggedLink::new(node, 0), Ordering::Release);
            (*node).prev.store(TaggedLink::new(node, 0), Ordering::Release);
        }
        node
    }

    /// Drop the payload and free the allocation.
    ///
    /// # Safety
    /// - `node` must have been allocated by `try_create`/`create_sentinel`
    /// - must be called exactly once, after which the node is gone
    pub(crate) unsafe fn dealloc_ptr(node: NodePtr<T>) {
        let layout = Layout::new::<ListNode<T>>();
        unsafe {
            ptr::drop_in_place(node);
            alloc::dealloc(node as *mut u8, layout);
        }
    }

    // =========================================================================
    // Payload access
    // =========================================================================

    pub(crate) fn value(&self) -> &T {
        // SAFETY: the payload is only replaced by sort, which holds the list
        // exclusively; every other access is a read.
        unsafe { (*self.data.get()).as_ref() }.expect("the sentinel holds no value")
    }

    pub(crate) fn is_sentinel(&self) -> bool {
        // SAFETY: as in value(); sort never changes which node is the sentinel.
        unsafe { (*self.data.get()).is_none() }
    }

    /// Raw payload cell, for sort's in-place swaps under `&mut` list access.
    pub(crate) fn data_cell(&self) -> *mut Option<T> {
        self.data.get()
    }

    // =========================================================================
    // Link accessors
    // =========================================================================

    /// Load the successor pointer (Acquire ordering). Null while the outgoing
    /// edge is locked.
    #[inline]
    pub(crate) fn next_ptr(&self) -> NodePtr<T> {
        self.next.load(Ordering::Acquire).ptr()
    }

    /// Load the predecessor pointer (Acquire ordering). Null while the
    /// incoming edge is locked.
    #[inline]
    pub(crate) fn prev_ptr(&self) -> NodePtr<T> {
        self.prev.load(Ordering::Acquire).ptr()
    }

    // =========================================================================
    // Reference counting
    // =========================================================================

    #[inline]
    pub(crate) fn inc_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    // =========================================================================
    // Consistency probe
    // =========================================================================

    /// Re-read the alleged neighbors' facing links. The probe passes only if
    /// each is either null (locked mid-operation) or points back here; any
    /// other value means this node has been relinked since the snapshot was
    /// taken and the caller must start over.
    fn is_linked(&self, next: NodePtr<T>, prev: NodePtr<T>) -> bool {
        let this = self as *const Self as NodePtr<T>;

        let next_back = if next.is_null() {
            ptr::null_mut()
        } else {
            // SAFETY: next came from a snapshot taken while this node was
            // reachable; the snapshot holder keeps it alive per the ownership
            // rules in the module doc.
            unsafe { (*next).prev_ptr() }
        };
        let prev_forward = if prev.is_null() {
            ptr::null_mut()
        } else {
            // SAFETY: as above.
            unsafe { (*prev).next_ptr() }
        };

        let next_ok = next.is_null() || next_back.is_null() || next_back == this;
        let prev_ok = prev.is_null() || prev_forward.is_null() || prev_forward == this;

        next_ok && prev_ok
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Link `new_node` immediately before this node.
    ///
    /// `new_node` must be fresh from `try_create`: refs = 1, both links null.
    /// On return the node ref is 2 (list ownership plus the creation
    /// reference, which the caller hands to the cursor it builds).
    ///
    /// The loop is lock-free as a system: a failed attempt always means some
    /// other thread committed a structural change.
    pub(crate) fn insert_before(&self, new_node: NodePtr<T>) -> bool {
        let this = self as *const Self as NodePtr<T>;
        let backoff = Backoff::new();

        loop {
            // Snapshot both edges; null means a neighbor operation holds one.
            let prev_link = self.prev.load(Ordering::Acquire);
            if prev_link.is_null() {
                backoff.snooze();
                continue;
            }

            let mut next_link = self.next.load(Ordering::Acquire);
            while next_link.is_null() {
                backoff.snooze();
                next_link = self.next.load(Ordering::Acquire);
            }

            if !self.is_linked(next_link.ptr(), prev_link.ptr()) {
                backoff.snooze();
                continue;
            }

            // Lock the incoming edge.
            if self
                .prev
                .compare_exchange_weak(prev_link, prev_link.locked())
                .is_err()
            {
                continue;
            }
            let locked_prev = prev_link.locked();
            let pred = prev_link.ptr();

            // SAFETY: new_node is fresh and unpublished; plain field init.
            unsafe {
                (*new_node)
                    .prev
                    .store(TaggedLink::new(pred, 0), Ordering::Release);
                (*new_node)
                    .next
                    .store(TaggedLink::new(this, 0), Ordering::Release);
            }

            // Commit on the predecessor side. This CAS is the linearization
            // point: once it lands, forward traversals reach new_node.
            // SAFETY: pred was alive at the snapshot and our lock on
            // self.prev keeps the edge from being recycled under us.
            let pred_next = unsafe { (*pred).next.load(Ordering::Acquire) };
            if pred_next.ptr() != this
                || unsafe {
                    (*pred)
                        .next
                        .compare_exchange(pred_next, pred_next.release(new_node))
                        .is_err()
                }
            {
                // The predecessor moved on; put the edge back as it was and
                // start over. new_node was never visible.
                self.prev
                    .store(locked_prev.release(pred), Ordering::Release);
                backoff.snooze();
                continue;
            }

            // The list now owns new_node.
            // SAFETY: new_node just became reachable; it cannot be freed while
            // the list ref is held.
            unsafe { (*new_node).inc_ref() };

            // Release the incoming edge toward new_node, completing the
            // successor side.
            self.prev
                .store(locked_prev.release(new_node), Ordering::Release);
            return true;
        }
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Unlink this node from the list.
    ///
    /// On success returns the pre-unlink successor carrying one fresh
    /// reference for the caller, after the list's ownership of this node has
    /// been dropped. Returns `None` when the node turns out to be already
    /// unlinked: its edges are frozen, so the same failing consistency probe
    /// over an unchanged snapshot on two consecutive rounds cannot be a
    /// transient neighbor state.
    ///
    /// The caller must hold a counted reference on this node across the call.
    pub(crate) fn remove(&self) -> Option<NodePtr<T>> {
        let this = self as *const Self as NodePtr<T>;
        let backoff = Backoff::new();
        let mut last_failed: Option<(TaggedLink<ListNode<T>>, TaggedLink<ListNode<T>>)> = None;

        loop {
            let next_link = self.next.load(Ordering::Acquire);
            if next_link.is_null() {
                last_failed = None;
                backoff.snooze();
                continue;
            }

            let prev_link = self.prev.load(Ordering::Acquire);
            if prev_link.is_null() {
                last_failed = None;
                backoff.snooze();
                continue;
            }

            if !self.is_linked(next_link.ptr(), prev_link.ptr()) {
                if last_failed == Some((next_link, prev_link)) {
                    // Ghost: nothing bumped our edge tags since the last
                    // failing probe, so the neighbors have moved on for good.
                    return None;
                }
                last_failed = Some((next_link, prev_link));
                backoff.snooze();
                continue;
            }
            last_failed = None;

            // Lock the outgoing edge, then the incoming one.
            if self
                .next
                .compare_exchange_weak(next_link, next_link.locked())
                .is_err()
            {
                backoff.snooze();
                continue;
            }
            let locked_next = next_link.locked();

            if self
                .prev
                .compare_exchange_weak(prev_link, prev_link.locked())
                .is_err()
            {
                self.next
                    .store(locked_next.release(next_link.ptr()), Ordering::Release);
                backoff.snooze();
                continue;
            }
            let locked_prev = prev_link.locked();

            let succ = next_link.ptr();
            let pred = prev_link.ptr();

            // Successor side: point succ.prev back at pred. This CAS is the
            // linearization point of the removal.
            // SAFETY: succ stays alive while our locked next edge pins the
            // snapshot that reached it.
            let succ_prev = unsafe { (*succ).prev.load(Ordering::Acquire) };
            if succ_prev.ptr() != this
                || unsafe {
                    (*succ)
                        .prev
                        .compare_exchange(succ_prev, succ_prev.release(pred))
                        .is_err()
                }
            {
                self.next.store(locked_next.release(succ), Ordering::Release);
                self.prev.store(locked_prev.release(pred), Ordering::Release);
                backoff.snooze();
                continue;
            }

            // Predecessor side: point pred.next at succ. If the predecessor
            // no longer points here it is itself mid-removal; the thread that
            // relinked around us already routed traffic past this node, so
            // bail out of the fixup rather than fight it.
            // SAFETY: pred as for succ above.
            let mut pred_next = unsafe { (*pred).next.load(Ordering::Acquire) };
            loop {
                if pred_next.ptr() != this {
                    break;
                }
                match unsafe {
                    (*pred)
                        .next
                        .compare_exchange_weak(pred_next, pred_next.release(succ))
                } {
                    Ok(()) => break,
                    Err(actual) => {
                        pred_next = actual;
                        backoff.snooze();
                    }
                }
            }

            // Release the local edges. The node stays internally consistent
            // as a ghost: both slots keep pointing at the former neighbors.
            self.next.store(locked_next.release(succ), Ordering::Release);
            self.prev.store(locked_prev.release(pred), Ordering::Release);

            // Hand the caller one counted reference on the successor, then
            // drop the list's ownership of this node. After release_ref the
            // node may be gone; nothing touches self past this point.
            // SAFETY: succ is reachable through the just-released edges.
            unsafe { (*succ).inc_ref() };
            release_ref(this);
            return Some(succ);
        }
    }
}

// =============================================================================
// Reference counting helpers
// =============================================================================

/// Drop one reference; the 1 -> 0 transition destroys the node. The release
/// ordering on the decrement pairs with the acquire on the zero-detecting
/// load so the destructor sees every prior access.
pub(crate) fn release_ref<T>(node: NodePtr<T>) {
    if node.is_null() {
        return;
    }
    // SAFETY: the caller owns the reference it is giving up.
    unsafe {
        if (*node).refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            ListNode::dealloc_ptr(node);
        }
    }
}

/// Clear a cursor's node slot and release the captured reference. The swap
/// makes the clear indivisible with the release, so a slot is never observed
/// pointing at a node whose reference has already been dropped.
pub(crate) fn release_slot<T>(slot: &AtomicPtr<ListNode<T>>) {
    let node = slot.swap(ptr::null_mut(), Ordering::AcqRel);
    release_ref(node);
}

/// Null-tolerant increment, for duplicating a handle.
pub(crate) fn acquire_ref<T>(node: NodePtr<T>) {
    if !node.is_null() {
        // SAFETY: the caller holds an existing reference on node.
        unsafe { (*node).inc_ref() };
    }
}

/// Obtain a counted reference on a node's successor, waiting out a locked
/// edge. The wait is bounded by the locking thread's commit latency; the
/// increment after the null clears is what keeps the neighbor alive for the
/// caller. This and [`wait_prev`] are the only way cursors cross an edge.
pub(crate) fn wait_next<T>(node: NodePtr<T>) -> NodePtr<T> {
    if node.is_null() {
        return node;
    }
    let backoff = Backoff::new();
    // SAFETY: the caller holds a reference on node.
    let mut link = unsafe { (*node).next.load(Ordering::Acquire) };
    while link.is_null() {
        backoff.snooze();
        // SAFETY: as above.
        link = unsafe { (*node).next.load(Ordering::Acquire) };
    }
    // SAFETY: a non-null link target is kept alive by the list or by the
    // ghost edges of node itself.
    unsafe { (*link.ptr()).inc_ref() };
    link.ptr()
}

/// Counterpart of [`wait_next`] for the incoming edge.
pub(crate) fn wait_prev<T>(node: NodePtr<T>) -> NodePtr<T> {
    if node.is_null() {
        return node;
    }
    let backoff = Backoff::new();
    // SAFETY: the caller holds a reference on node.
    let mut link = unsafe { (*node).prev.load(Ordering::Acquire) };
    while link.is_null() {
        backoff.snooze();
        // SAFETY: as above.
        link = unsafe { (*node).prev.load(Ordering::Acquire) };
    }
    // SAFETY: as in wait_next.
    unsafe { (*link.ptr()).inc_ref() };
    link.ptr()
}
