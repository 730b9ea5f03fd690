use std::collections::BTreeSet;

use pagebound::pagination::{
    paginate, paginate_with_policy, CursorPolicy, Direction, Page, PageSize, RecordStore,
};
use pagebound::records::User;
use pagebound::store::NewUser;
use pagebound::test::{MemoryStore, TestStore};
use pagebound::RecordId;
use proptest::prelude::*;

fn walk<S: RecordStore>(store: &S, direction: Direction, page_size: PageSize) -> Vec<Page<S::Record>> {
    let mut pages = Vec::new();
    let mut cursor = None;
    loop {
        let page = paginate(store, cursor, direction, page_size).unwrap();
        cursor = page.cursor();
        let done = page.items.is_empty();
        pages.push(page);
        if done {
            return pages;
        }
    }
}

fn ids(pages: &[Page<RecordId>]) -> Vec<u64> {
    pages
        .iter()
        .flat_map(|page| page.items.iter().map(|id| id.0))
        .collect()
}

fn new_users(count: u32) -> Vec<NewUser> {
    (1..=count)
        .map(|i| NewUser {
            name: format!("User {i}"),
            email: format!("user{i}@example.com"),
        })
        .collect()
}

fn user_ids(page: &Page<User>) -> Vec<u64> {
    page.items.iter().map(|user| user.user_id.0).collect()
}

proptest! {
    #[test]
    fn forward_walk_enumerates_every_record_once(
        id_set in prop::collection::btree_set(0u64..500, 0..60),
        size in 1usize..12,
    ) {
        let store = MemoryStore::with_ids(id_set.iter().copied());
        let page_size = PageSize::new(size).unwrap();
        let pages = walk(&store, Direction::Next, page_size);

        let expected: Vec<u64> = id_set.iter().copied().collect();
        prop_assert_eq!(&expected, &ids(&pages));

        let last = pages.last().unwrap();
        prop_assert!(last.items.is_empty());
        prop_assert_eq!(None, last.next_cursor);
        for page in &pages[..pages.len() - 1] {
            prop_assert!(!page.items.is_empty());
            prop_assert!(page.items.len() <= size);
            prop_assert_eq!(page.items.last().copied(), page.next_cursor);
            prop_assert_eq!(None, page.prev_cursor);
        }
    }

    #[test]
    fn backward_walk_mirrors_forward_walk(
        id_set in prop::collection::btree_set(0u64..500, 0..60),
        size in 1usize..12,
    ) {
        let store = MemoryStore::with_ids(id_set.iter().copied());
        let page_size = PageSize::new(size).unwrap();
        let pages = walk(&store, Direction::Prev, page_size);

        // Pages come back last to first, each ascending internally.
        let mut flattened = Vec::new();
        for page in pages.iter().rev() {
            let items: Vec<u64> = page.items.iter().map(|id| id.0).collect();
            prop_assert!(items.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(page.items.first().copied(), page.prev_cursor);
            flattened.extend(items);
        }
        let expected: Vec<u64> = id_set.iter().copied().collect();
        prop_assert_eq!(expected, flattened);
    }

    #[test]
    fn pages_are_full_unless_records_run_out(
        id_set in prop::collection::btree_set(0u64..500, 0..60),
        size in 1usize..12,
        cursor in prop::option::of(0u64..520),
        direction in any::<Direction>(),
    ) {
        let store = MemoryStore::with_ids(id_set.iter().copied());
        let page_size = PageSize::new(size).unwrap();
        let cursor = cursor.map(RecordId);
        let page = paginate(&store, cursor, direction, page_size).unwrap();

        let remaining = id_set
            .iter()
            .filter(|id| match (direction, cursor) {
                (_, None) => true,
                (Direction::Next, Some(c)) => **id > c.0,
                (Direction::Prev, Some(c)) => **id < c.0,
            })
            .count();
        prop_assert_eq!(remaining.min(size), page.items.len());

        // Same store, same request, same page.
        let again = paginate(&store, cursor, direction, page_size).unwrap();
        prop_assert_eq!(page, again);
    }

    #[test]
    fn policies_differ_only_on_short_pages(
        id_set in prop::collection::btree_set(0u64..100, 0..30),
        size in 1usize..8,
        cursor in prop::option::of(0u64..110),
        direction in any::<Direction>(),
    ) {
        let store = MemoryStore::with_ids(id_set.iter().copied());
        let page_size = PageSize::new(size).unwrap();
        let cursor = cursor.map(RecordId);
        let empty = paginate_with_policy(&store, cursor, direction, page_size, CursorPolicy::NullWhenEmpty).unwrap();
        let short = paginate_with_policy(&store, cursor, direction, page_size, CursorPolicy::NullWhenShort).unwrap();

        prop_assert_eq!(&empty.items, &short.items);
        if empty.items.len() == size {
            prop_assert_eq!(empty.cursor(), short.cursor());
        } else {
            prop_assert_eq!(None, short.cursor());
        }
        prop_assert_eq!(empty.items.is_empty(), empty.cursor().is_none());
    }
}

#[test]
fn deleted_records_between_pages_are_skipped() {
    let store = MemoryStore::with_ids(1..=5);
    let size = PageSize::new(2).unwrap();
    let first = paginate(&store, None, Direction::Next, size).unwrap();
    store.remove(RecordId(3));
    let second = paginate(&store, first.next_cursor, Direction::Next, size).unwrap();
    assert_eq!(vec![RecordId(4), RecordId(5)], second.items);
}

#[test]
fn user_table_pages_forward_and_backward() {
    let store = TestStore::new().unwrap();
    store.create_users(new_users(5)).unwrap();
    let users = store.users();
    let size = PageSize::new(2).unwrap();

    let page = paginate(&users, None, Direction::Next, size).unwrap();
    assert_eq!(vec![1, 2], user_ids(&page));
    assert_eq!(Some(RecordId(2)), page.next_cursor);
    let page = paginate(&users, page.next_cursor, Direction::Next, size).unwrap();
    assert_eq!(vec![3, 4], user_ids(&page));
    let page = paginate(&users, page.next_cursor, Direction::Next, size).unwrap();
    assert_eq!(vec![5], user_ids(&page));
    assert_eq!(Some(RecordId(5)), page.next_cursor);
    let page = paginate(&users, page.next_cursor, Direction::Next, size).unwrap();
    assert!(page.items.is_empty());
    assert_eq!(None, page.next_cursor);

    let page = paginate(&users, Some(RecordId(5)), Direction::Prev, size).unwrap();
    assert_eq!(vec![3, 4], user_ids(&page));
    assert_eq!(Some(RecordId(3)), page.prev_cursor);
    let page = paginate(&users, None, Direction::Prev, size).unwrap();
    assert_eq!(vec![4, 5], user_ids(&page));
}

#[test]
fn user_table_treats_deleted_cursor_as_boundary() {
    let store = TestStore::new().unwrap();
    store.create_users(new_users(5)).unwrap();
    let size = PageSize::new(2).unwrap();

    let first = paginate(&store.users(), None, Direction::Next, size).unwrap();
    store.delete_user(RecordId(3)).unwrap();
    let second = paginate(&store.users(), first.next_cursor, Direction::Next, size).unwrap();
    assert_eq!(vec![4, 5], user_ids(&second));

    store.delete_user(RecordId(4)).unwrap();
    let page = paginate(&store.users(), Some(RecordId(4)), Direction::Next, size).unwrap();
    assert_eq!(vec![5], user_ids(&page));
    let page = paginate(&store.users(), Some(RecordId(4)), Direction::Prev, size).unwrap();
    assert_eq!(vec![1, 2], user_ids(&page));
}

#[test]
fn user_table_matches_memory_store() {
    let store = TestStore::new().unwrap();
    store.create_users(new_users(23)).unwrap();
    for id in [2u64, 3, 10, 17, 23] {
        store.delete_user(RecordId(id)).unwrap();
    }
    let remaining: BTreeSet<u64> = (1..=23).filter(|id| ![2, 3, 10, 17, 23].contains(id)).collect();
    let memory = MemoryStore::with_ids(remaining.iter().copied());

    for size in [1, 3, 4, 10, 30] {
        let size = PageSize::new(size).unwrap();
        for direction in [Direction::Next, Direction::Prev] {
            let on_disk: Vec<Vec<u64>> = walk(&store.users(), direction, size)
                .iter()
                .map(user_ids)
                .collect();
            let in_memory: Vec<Vec<u64>> = walk(&memory, direction, size)
                .iter()
                .map(|page| page.items.iter().map(|id| id.0).collect())
                .collect();
            assert_eq!(in_memory, on_disk, "size {size} direction {direction}");
        }
    }
}
