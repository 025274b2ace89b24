use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use super::linked_list::ConcurrentList;
use super::node::{acquire_ref, release_ref, release_slot, wait_next, wait_prev, ListNode, NodePtr};

/// A movable, clonable handle onto one node of a [`ConcurrentList`].
///
/// A cursor owns exactly one counted reference on the node it points at (or
/// none, when detached), so the node outlives the cursor even if the list
/// erases it concurrently; a cursor parked on such a ghost node can still
/// read its payload and step off it in either direction.
///
/// Stepping waits out a neighbor edge that is transiently locked by a
/// concurrent insert or erase, then transfers the cursor's reference to the
/// neighbor. A single cursor therefore walks a path of edges each of which
/// was valid at some instant, but the nodes it visits need not ever have
/// formed one simultaneous segment of the list.
///
/// The borrow on the list keeps every cursor from outliving it.
pub struct ListCursor<'a, T> {
    node: AtomicPtr<ListNode<T>>,
    _list: PhantomData<&'a ConcurrentList<T>>,
}

// A cursor hands out &T and moves between threads with the list.
unsafe impl<T: Send + Sync> Send for ListCursor<'_, T> {}
unsafe impl<T: Send + Sync> Sync for ListCursor<'_, T> {}

impl<'a, T> ListCursor<'a, T> {
    fn from_parts(node: NodePtr<T>) -> Self {
        ListCursor {
            node: AtomicPtr::new(node),
            _list: PhantomData,
        }
    }

    /// Build a cursor that takes over one already-counted reference.
    pub(crate) fn adopt(node: NodePtr<T>) -> Self {
        Self::from_parts(node)
    }

    /// Build a cursor on `node`, acquiring its own reference.
    pub(crate) fn acquire(node: NodePtr<T>) -> Self {
        acquire_ref(node);
        Self::from_parts(node)
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> NodePtr<T> {
        self.node.load(Ordering::Acquire)
    }

    /// Step to the successor, waiting out a transiently locked edge. On the
    /// end position this reaches the first node of the list, or stays put
    /// when the list is empty.
    pub fn move_next(&mut self) {
        let current = self.as_ptr();
        let next = wait_next(current);
        self.node.store(next, Ordering::Release);
        release_ref(current);
    }

    /// Step to the predecessor; the mirror of [`move_next`](Self::move_next).
    pub fn move_prev(&mut self) {
        let current = self.as_ptr();
        let prev = wait_prev(current);
        self.node.store(prev, Ordering::Release);
        release_ref(current);
    }

    /// Advance, returning an independently counted cursor at the position
    /// held before the step.
    pub fn fetch_move_next(&mut self) -> ListCursor<'a, T> {
        let held = self.clone();
        self.move_next();
        held
    }

    /// Step back, returning an independently counted cursor at the position
    /// held before the step.
    pub fn fetch_move_prev(&mut self) -> ListCursor<'a, T> {
        let held = self.clone();
        self.move_prev();
        held
    }

    /// The payload under the cursor.
    ///
    /// # Panics
    /// On a detached cursor or the end position, neither of which carries a
    /// value.
    pub fn value(&self) -> &T {
        let node = self.as_ptr();
        assert!(!node.is_null(), "the cursor is detached");
        // SAFETY: the cursor's reference keeps the node alive.
        unsafe { (*node).value() }
    }

    /// Whether the cursor sits on the list's end position (the sentinel).
    pub fn is_end(&self) -> bool {
        let node = self.as_ptr();
        // SAFETY: as in value().
        !node.is_null() && unsafe { (*node).is_sentinel() }
    }
}

impl<T> Default for ListCursor<'_, T> {
    /// A detached cursor pointing at no node and owning nothing.
    fn default() -> Self {
        Self::from_parts(ptr::null_mut())
    }
}

impl<'a, T> Clone for ListCursor<'a, T> {
    fn clone(&self) -> Self {
        Self::acquire(self.as_ptr())
    }
}

impl<T> Drop for ListCursor<'_, T> {
    fn drop(&mut self) {
        release_slot(&self.node);
    }
}

/// Cursors compare by node identity, not payload.
impl<T> PartialEq for ListCursor<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_ptr() == other.as_ptr()
    }
}

impl<T> Eq for ListCursor<'_, T> {}

/// A counted reference to one payload, as returned by
/// [`ConcurrentList::front`] and [`ConcurrentList::back`].
///
/// The wrapped cursor's reference keeps the entry alive for as long as the
/// guard exists, even if the entry is erased from the list in the meantime.
pub struct ListRef<'a, T> {
    cursor: ListCursor<'a, T>,
}

impl<'a, T> ListRef<'a, T> {
    pub(crate) fn new(cursor: ListCursor<'a, T>) -> Self {
        ListRef { cursor }
    }
}

impl<T> Deref for ListRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.cursor.value()
    }
}

/// Forward iterator yielding cloned payloads, as returned by
/// [`ConcurrentList::iter`].
///
/// Values are cloned out because a yielded reference could not outlive the
/// step that releases its node.
pub struct Iter<'a, T> {
    cursor: ListCursor<'a, T>,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(cursor: ListCursor<'a, T>) -> Self {
        Iter { cursor }
    }
}

impl<T: Clone> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.is_end() {
            return None;
        }
        let value = self.cursor.value().clone();
        self.cursor.move_next();
        Some(value)
    }
}
