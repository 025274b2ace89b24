//! Single-threaded behavior of the concurrent list: container surface,
//! cursor discipline, sort.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use urchin_core::common_tests::linked_list_helpers::{
    assert_doubly_linked, collect_backward, collect_forward, drain_front, fill_back,
};
use urchin_core::{ConcurrentList, ListError};

#[test]
fn push_back_builds_an_ordered_sequence() {
    let list = ConcurrentList::new();
    fill_back(&list, [1, 2, 3]);

    assert_eq!(collect_forward(&list), vec![1, 2, 3]);
    assert_eq!(list.len(), 3);
    assert_eq!(*list.front().unwrap(), 1);
    assert_eq!(*list.back().unwrap(), 3);
    assert_doubly_linked(&list);
}

#[test]
fn mixed_insertions_and_erase_keep_order() {
    let list = ConcurrentList::new();
    fill_back(&list, [1, 2, 3]);

    list.push_front(0).unwrap();
    list.emplace_back(4).unwrap();

    // Find the element holding 2 and erase through its cursor.
    let mut cursor = list.cursor_front();
    while *cursor.value() != 2 {
        cursor.move_next();
    }
    let successor = list.erase(&cursor);
    assert_eq!(*successor.value(), 3);

    assert_eq!(collect_forward(&list), vec![0, 1, 3, 4]);
    assert_eq!(list.len(), 4);
    assert_doubly_linked(&list);
}

#[test]
fn sort_orders_the_sequence() {
    let mut list = ConcurrentList::new();
    fill_back(&list, [5, 1, 4, 3, 2]);

    list.sort();
    assert_eq!(collect_forward(&list), vec![1, 2, 3, 4, 5]);

    // Idempotence: a second pass changes nothing.
    list.sort();
    assert_eq!(collect_forward(&list), vec![1, 2, 3, 4, 5]);
    assert_doubly_linked(&list);
}

#[test]
fn erase_chain_drains_the_whole_list() {
    let list = ConcurrentList::new();
    fill_back(&list, 0..100);
    assert_eq!(list.len(), 100);

    assert_eq!(drain_front(&list), 100);
    assert!(list.is_empty());
    assert_eq!(list.len(), 0);
    assert_doubly_linked(&list);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Record {
    k: i32,
    v: i32,
}

#[test]
fn sort_by_key_is_non_decreasing() {
    let mut records: Vec<Record> = (0..200).map(|i| Record { k: i % 10, v: i }).collect();
    let mut rng = StdRng::seed_from_u64(123);
    records.shuffle(&mut rng);

    let mut list = ConcurrentList::new();
    fill_back(&list, records.iter().copied());

    list.sort_by(|a, b| a.k.cmp(&b.k));

    let sorted = collect_forward(&list);
    assert_eq!(sorted.len(), 200);
    for window in sorted.windows(2) {
        assert!(window[0].k <= window[1].k, "keys out of order: {:?}", window);
    }
}

#[test]
fn empty_list_accessors_fail_and_pops_do_not() {
    let list: ConcurrentList<i32> = ConcurrentList::new();

    assert_eq!(list.front().err(), Some(ListError::OutOfRange));
    assert_eq!(list.back().err(), Some(ListError::OutOfRange));
    assert!(list.pop_front().is_end());
    assert!(list.pop_back().is_end());
    assert!(list.is_empty());
}

#[test]
fn forward_and_backward_walks_agree() {
    let list = ConcurrentList::new();
    fill_back(&list, [7, 3, 9, 1, 5]);

    let forward = collect_forward(&list);
    let mut backward = collect_backward(&list);
    backward.reverse();
    assert_eq!(forward, backward);
}

#[test]
fn pop_back_removes_from_the_tail() {
    let list = ConcurrentList::new();
    fill_back(&list, [1, 2, 3]);

    assert!(list.pop_back().is_end());
    assert_eq!(collect_forward(&list), vec![1, 2]);
    assert_eq!(*list.back().unwrap(), 2);
}

#[test]
fn cursors_are_reference_neutral() {
    let list = ConcurrentList::new();
    fill_back(&list, 0..10);

    {
        let mut walkers: Vec<_> = (0..16).map(|_| list.cursor_front()).collect();
        for (i, walker) in walkers.iter_mut().enumerate() {
            for _ in 0..i {
                walker.move_next();
            }
        }
        let captured: Vec<_> = walkers
            .iter_mut()
            .map(|walker| walker.fetch_move_next())
            .collect();
        drop(walkers);
        drop(captured);
    }

    assert_eq!(collect_forward(&list), (0..10).collect::<Vec<_>>());
    assert_eq!(list.len(), 10);
    assert_doubly_linked(&list);
}

#[test]
fn guards_keep_erased_entries_readable() {
    let list = ConcurrentList::new();
    fill_back(&list, [10, 20]);

    let front = list.front().unwrap();
    let popped = list.pop_front();
    assert_eq!(*popped.value(), 20);

    // The guard's reference outlives the erase.
    assert_eq!(*front, 10);
    assert_eq!(collect_forward(&list), vec![20]);
}

#[test]
fn clear_then_reuse() {
    let list = ConcurrentList::new();
    fill_back(&list, 0..50);
    list.clear();
    assert!(list.is_empty());

    fill_back(&list, [1, 2]);
    assert_eq!(collect_forward(&list), vec![1, 2]);
    assert_eq!(list.len(), 2);
}

#[test]
fn iterator_yields_every_element_once() {
    let list = ConcurrentList::new();
    fill_back(&list, 0..25);

    let seen: Vec<i32> = list.iter().collect();
    assert_eq!(seen, (0..25).collect::<Vec<_>>());
    assert_eq!(list.iter().count(), 25);
}
