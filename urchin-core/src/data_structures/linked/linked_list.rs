use std::cmp::Ordering as CmpOrdering;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::cursor::{Iter, ListCursor, ListRef};
use super::node::{wait_next, wait_prev, ListNode, NodePtr};
use super::ListError;

///
/// Concurrent doubly linked list: an ordered sequence supporting insertion,
/// removal and traversal from many threads with no global lock.
///
// The list is structurally circular through one sentinel node that is both
// the past-the-end and the before-the-begin position. Each directed edge of
// the structure doubles as a lock whose "held" state is a nulled pointer
// with a bumped tag (see node.rs); an insert commits on the predecessor's
// next CAS, a removal on the successor's prev CAS. Reclamation is per-node
// reference counting, with cursors as the unit of ownership outside the
// list itself.
//
// The size counter is advisory: it is bumped after an operation commits, so
// a strictly concurrent reader can observe a value that lags the structure
// by the operations still in their commit window.
pub struct ConcurrentList<T> {
    sentinel: NodePtr<T>,
    len: AtomicUsize,
}

unsafe impl<T: Send> Send for ConcurrentList<T> {}
unsafe impl<T: Send + Sync> Sync for ConcurrentList<T> {}

impl<T> ConcurrentList<T> {
    pub fn new() -> Self {
        ConcurrentList {
            sentinel: ListNode::create_sentinel(),
            len: AtomicUsize::new(0),
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Cursor on the first element, or on the end position when the list is
    /// empty. Waits out an in-flight operation on the head edge.
    pub fn cursor_front(&self) -> ListCursor<'_, T> {
        ListCursor::adopt(wait_next(self.sentinel))
    }

    /// Cursor on the last element, or on the end position when the list is
    /// empty. Waits out an in-flight operation on the tail edge.
    pub fn cursor_back(&self) -> ListCursor<'_, T> {
        ListCursor::adopt(wait_prev(self.sentinel))
    }

    /// Cursor on the end position. The sentinel closes the list into a
    /// cycle, so this one position is both past-the-end for forward walks
    /// and before-the-begin for backward walks.
    pub fn cursor_end(&self) -> ListCursor<'_, T> {
        ListCursor::acquire(self.sentinel)
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Append a value, returning a cursor on the new element.
    ///
    /// Under contention the commit retries against a freshly read tail
    /// position until it lands; relative order of racing appends is
    /// unspecified.
    pub fn push_back(&self, value: T) -> Result<ListCursor<'_, T>, ListError> {
        let node = ListNode::try_create(value)?;
        loop {
            let end = self.cursor_end();
            if let Some(cursor) = self.link_before(&end, node) {
                return Ok(cursor);
            }
        }
    }

    /// Prepend a value, returning a cursor on the new element.
    pub fn push_front(&self, value: T) -> Result<ListCursor<'_, T>, ListError> {
        let node = ListNode::try_create(value)?;
        loop {
            let head = self.cursor_front();
            if let Some(cursor) = self.link_before(&head, node) {
                return Ok(cursor);
            }
        }
    }

    /// Synonym of [`push_back`](Self::push_back); the payload is moved into
    /// place, there is no further in-place construction to elide.
    pub fn emplace_back(&self, value: T) -> Result<ListCursor<'_, T>, ListError> {
        self.push_back(value)
    }

    fn link_before(
        &self,
        anchor: &ListCursor<'_, T>,
        node: NodePtr<T>,
    ) -> Option<ListCursor<'_, T>> {
        let at = anchor.as_ptr();
        if at.is_null() {
            return None;
        }
        // SAFETY: the anchor cursor holds a reference on at; node is fresh
        // and unpublished.
        if unsafe { (*at).insert_before(node) } {
            self.len.fetch_add(1, Ordering::AcqRel);
            // The creation reference becomes the returned handle; the list's
            // own reference was taken inside insert_before.
            Some(ListCursor::adopt(node))
        } else {
            None
        }
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Unlink the element under `cursor`.
    ///
    /// Returns a cursor on the unlinked element's former successor. On the
    /// end position, or when another thread got to the element first, this
    /// is a no-op returning the end cursor.
    pub fn erase(&self, cursor: &ListCursor<'_, T>) -> ListCursor<'_, T> {
        self.try_erase(cursor).unwrap_or_else(|| self.cursor_end())
    }

    fn try_erase(&self, cursor: &ListCursor<'_, T>) -> Option<ListCursor<'_, T>> {
        let node = cursor.as_ptr();
        if node.is_null() || node == self.sentinel {
            return None;
        }
        // SAFETY: the cursor holds a reference on node across the call.
        let successor = unsafe { (*node).remove() }?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(ListCursor::adopt(successor))
    }

    /// Unlink the first element and return a cursor on its successor.
    /// Returns the end cursor once the list is observed empty.
    pub fn pop_front(&self) -> ListCursor<'_, T> {
        loop {
            let head = self.cursor_front();
            if head.is_end() {
                return head;
            }
            if let Some(successor) = self.try_erase(&head) {
                return successor;
            }
            // Lost the element to another thread; read a fresh head.
        }
    }

    /// Unlink the last element and return a cursor on its successor (the end
    /// position). Returns the end cursor once the list is observed empty.
    pub fn pop_back(&self) -> ListCursor<'_, T> {
        loop {
            let tail = self.cursor_back();
            if tail.is_end() {
                return tail;
            }
            if let Some(successor) = self.try_erase(&tail) {
                return successor;
            }
        }
    }

    /// Erase from the front until the list is observed empty.
    pub fn clear(&self) {
        loop {
            let head = self.cursor_front();
            if head.is_end() {
                return;
            }
            self.try_erase(&head);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// A counted reference to the first payload.
    pub fn front(&self) -> Result<ListRef<'_, T>, ListError> {
        let cursor = self.cursor_front();
        if cursor.is_end() {
            return Err(ListError::OutOfRange);
        }
        Ok(ListRef::new(cursor))
    }

    /// A counted reference to the last payload.
    pub fn back(&self) -> Result<ListRef<'_, T>, ListError> {
        let cursor = self.cursor_back();
        if cursor.is_end() {
            return Err(ListError::OutOfRange);
        }
        Ok(ListRef::new(cursor))
    }

    /// Element count hint; exact once every operation has committed.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.cursor_front().is_end()
    }

    /// Forward iterator over cloned payloads.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self.cursor_front())
    }

    /// Collects all elements into a Vec.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().collect()
    }

    // =========================================================================
    // Sort
    // =========================================================================

    /// Sort in place by the natural order. Not thread-safe: the exclusive
    /// borrow keeps every other thread (and every cursor) out for the
    /// duration.
    pub fn sort(&mut self)
    where
        T: Ord,
    {
        self.sort_by(T::cmp)
    }

    /// Sort in place by a comparator, single-threaded only (see
    /// [`sort`](Self::sort)).
    ///
    /// Bubble passes swapping node payloads, never relinking, with the
    /// no-swap-this-pass early exit; payload moves are plain because nothing
    /// else can touch the list.
    pub fn sort_by<F>(&mut self, mut cmp: F)
    where
        F: FnMut(&T, &T) -> CmpOrdering,
    {
        let len = self.len.load(Ordering::Acquire);
        if len < 2 {
            return;
        }

        for pass in 0..len - 1 {
            let mut swapped = false;
            // SAFETY: exclusive access; every link is settled and non-null,
            // and the first `len` nodes are real elements.
            let mut a = unsafe { (*self.sentinel).next_ptr() };
            for _ in 0..len - pass - 1 {
                let b = unsafe { (*a).next_ptr() };
                unsafe {
                    if cmp((*a).value(), (*b).value()) == CmpOrdering::Greater {
                        ptr::swap((*a).data_cell(), (*b).data_cell());
                        swapped = true;
                    }
                }
                a = b;
            }
            if !swapped {
                break;
            }
        }
    }
}

impl<T> Default for ConcurrentList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ConcurrentList<T> {
    fn drop(&mut self) {
        self.clear();
        // The sentinel is uniquely list-owned and sits outside the refcount
        // graph; transient end-cursor references are all gone by now because
        // cursors cannot outlive the list.
        // SAFETY: clear() left only the self-linked sentinel.
        unsafe { ListNode::dealloc_ptr(self.sentinel) };
    }
}
