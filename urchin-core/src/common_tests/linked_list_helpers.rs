use crate::ConcurrentList;

/// Append every value in order.
pub fn fill_back<T>(list: &ConcurrentList<T>, values: impl IntoIterator<Item = T>) {
    for value in values {
        list.push_back(value).expect("allocation failed while filling");
    }
}

/// Forward walk, begin to end.
pub fn collect_forward<T: Clone>(list: &ConcurrentList<T>) -> Vec<T> {
    list.to_vec()
}

/// Backward walk, last element to first, via the prev links.
pub fn collect_backward<T: Clone>(list: &ConcurrentList<T>) -> Vec<T> {
    let mut values = Vec::new();
    let mut cursor = list.cursor_back();
    while !cursor.is_end() {
        values.push(cursor.value().clone());
        cursor.move_prev();
    }
    values
}

/// Erase from the front until the end position is reached, chaining through
/// the successor cursors; returns how many elements came out. Single-threaded
/// use only.
pub fn drain_front<T>(list: &ConcurrentList<T>) -> usize {
    let mut count = 0;
    let mut cursor = list.cursor_front();
    while !cursor.is_end() {
        cursor = list.erase(&cursor);
        count += 1;
    }
    count
}

/// Assert the classical doubly-linked invariant over the whole cycle,
/// sentinel included: for every adjacent pair (a, b), a.next = b and
/// b.prev = a, with no edge left locked.
///
/// Only meaningful at quiescence (no operation in flight).
pub fn assert_doubly_linked<T>(list: &ConcurrentList<T>) {
    let end = list.cursor_end();
    let mut cursor = list.cursor_end();
    loop {
        let a = cursor.as_ptr();
        // SAFETY: the cursor keeps a alive; at quiescence every link is
        // settled and points at a linked node.
        let b = unsafe { (*a).next_ptr() };
        assert!(!b.is_null(), "edge left locked at quiescence");
        let back = unsafe { (*b).prev_ptr() };
        assert!(!back.is_null(), "edge left locked at quiescence");
        assert!(
            std::ptr::eq(back, a),
            "broken back link: b.prev does not return to a"
        );
        cursor.move_next();
        if cursor == end {
            return;
        }
    }
}
