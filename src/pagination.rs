//! Cursor-based pagination over tables keyed by [`RecordId`].
//!
//! A cursor is the id of a record at the edge of the last page served. Asking for the
//! [`Direction::Next`] page returns the records with ids strictly greater than the cursor,
//! [`Direction::Prev`] those strictly smaller. Pages never hold a snapshot: each call observes
//! the table as it is at scan time, and a cursor pointing at a deleted record is still a valid
//! boundary.
//!
//! ```text
//! ids:        1  2 | 3  4 | 5
//! next(None)  [1, 2]            next_cursor = 2
//! next(2)           [3, 4]      next_cursor = 4
//! next(4)                  [5]  next_cursor = 5
//! next(5)                  []   next_cursor = None
//! ```

use std::fmt::Display;
use std::num::NonZeroUsize;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::metrics::PAGINATION_PAGE_ITEMS;
use crate::{RecordId, ScanDirection};

/// Which neighbour of the cursor to fetch.
#[cfg_attr(feature = "arbitrary", derive(proptest_derive::Arbitrary))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Records after the cursor, ascending.
    #[default]
    Next,
    /// Records before the cursor. Read descending, returned ascending.
    Prev,
}

impl Direction {
    /// Order in which the underlying table is scanned.
    pub fn scan_direction(self) -> ScanDirection {
        match self {
            Direction::Next => ScanDirection::Forward,
            Direction::Prev => ScanDirection::Backward,
        }
    }

    /// Query string spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Next => "next",
            Direction::Prev => "prev",
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "next" => Ok(Direction::Next),
            "prev" => Ok(Direction::Prev),
            other => anyhow::bail!("direction must be `next` or `prev`, got `{other}`"),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum number of records in one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize(NonZeroUsize);

impl PageSize {
    /// Page size of the listing endpoints unless configured otherwise.
    pub const DEFAULT: PageSize = PageSize(match NonZeroUsize::new(10) {
        Some(size) => size,
        None => unreachable!(),
    });

    /// Returns `None` for zero.
    pub fn new(size: usize) -> Option<Self> {
        NonZeroUsize::new(size).map(PageSize)
    }

    /// The size as a plain integer.
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl FromStr for PageSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let size: usize = s.parse()?;
        PageSize::new(size).ok_or_else(|| anyhow::anyhow!("page size must be positive"))
    }
}

impl Display for PageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// When a page stops handing out a cursor to its neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPolicy {
    /// The cursor is `None` only when the page is empty. A short last page still carries a
    /// cursor, and following it yields one empty page.
    NullWhenEmpty,
    /// The cursor is `None` whenever fewer than a full page of records came back.
    /// A last page that happens to be exactly full still carries a cursor.
    NullWhenShort,
}

/// The policy used by [`paginate`] and by every listing endpoint.
pub const CURSOR_POLICY: CursorPolicy = CursorPolicy::NullWhenEmpty;

impl CursorPolicy {
    /// Cursor for the adjacent page, given the id of the last record read (in scan order) and
    /// the number of records read.
    pub fn adjacent_cursor(
        self,
        last_read: Option<RecordId>,
        read: usize,
        page_size: PageSize,
    ) -> Option<RecordId> {
        match self {
            CursorPolicy::NullWhenEmpty => last_read,
            CursorPolicy::NullWhenShort if read < page_size.get() => None,
            CursorPolicy::NullWhenShort => last_read,
        }
    }
}

/// One page of records.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Records in ascending id order, whatever the direction.
    pub items: Vec<T>,
    /// Direction that produced this page.
    pub direction: Direction,
    /// Cursor of the following page. Only set on [`Direction::Next`] pages.
    pub next_cursor: Option<RecordId>,
    /// Cursor of the preceding page: the smallest id returned. Only set on
    /// [`Direction::Prev`] pages.
    pub prev_cursor: Option<RecordId>,
}

impl<T> Page<T> {
    /// The cursor continuing in this page's direction.
    pub fn cursor(&self) -> Option<RecordId> {
        match self.direction {
            Direction::Next => self.next_cursor,
            Direction::Prev => self.prev_cursor,
        }
    }

    /// Converts every item, keeping the cursors.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            direction: self.direction,
            next_cursor: self.next_cursor,
            prev_cursor: self.prev_cursor,
        }
    }

    /// Like [`Page::map`] for fallible conversions.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_, _>>()?,
            direction: self.direction,
            next_cursor: self.next_cursor,
            prev_cursor: self.prev_cursor,
        })
    }
}

/// Lazily decoded records in scan order.
pub type RecordScan<'a, T> = Box<dyn Iterator<Item = anyhow::Result<(RecordId, T)>> + 'a>;

/// A table that can be scanned from a cursor in either direction.
pub trait RecordStore {
    /// Decoded row type.
    type Record;

    /// Records strictly after `cursor` in ascending order for [`Direction::Next`], strictly
    /// before it in descending order for [`Direction::Prev`]. Without a cursor the scan starts
    /// at the lowest id (`Next`) or the highest id (`Prev`).
    fn scan(
        &self,
        cursor: Option<RecordId>,
        direction: Direction,
    ) -> anyhow::Result<RecordScan<'_, Self::Record>>;
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    type Record = S::Record;

    fn scan(
        &self,
        cursor: Option<RecordId>,
        direction: Direction,
    ) -> anyhow::Result<RecordScan<'_, Self::Record>> {
        (**self).scan(cursor, direction)
    }
}

/// A [`RecordStore`] restricted to the records matching a predicate.
///
/// Pages over a filtered store are contiguous over the matching records; cursors are still
/// plain record ids.
pub struct Filtered<S, F> {
    store: S,
    predicate: F,
}

impl<S, F> Filtered<S, F>
where
    S: RecordStore,
    F: Fn(&S::Record) -> bool,
{
    /// Wraps `store`, keeping only records for which `predicate` holds.
    pub fn new(store: S, predicate: F) -> Self {
        Self { store, predicate }
    }
}

impl<S, F> RecordStore for Filtered<S, F>
where
    S: RecordStore,
    F: Fn(&S::Record) -> bool,
{
    type Record = S::Record;

    fn scan(
        &self,
        cursor: Option<RecordId>,
        direction: Direction,
    ) -> anyhow::Result<RecordScan<'_, Self::Record>> {
        let predicate = &self.predicate;
        let scan = self.store.scan(cursor, direction)?;
        Ok(Box::new(scan.filter(move |item| match item {
            Ok((_, record)) => predicate(record),
            // Errors always surface.
            Err(_) => true,
        })))
    }
}

/// Fetches the page adjacent to `cursor` under [`CURSOR_POLICY`].
pub fn paginate<S: RecordStore + ?Sized>(
    store: &S,
    cursor: Option<RecordId>,
    direction: Direction,
    page_size: PageSize,
) -> anyhow::Result<Page<S::Record>> {
    paginate_with_policy(store, cursor, direction, page_size, CURSOR_POLICY)
}

/// Fetches the page adjacent to `cursor` under an explicit [`CursorPolicy`].
pub fn paginate_with_policy<S: RecordStore + ?Sized>(
    store: &S,
    cursor: Option<RecordId>,
    direction: Direction,
    page_size: PageSize,
    policy: CursorPolicy,
) -> anyhow::Result<Page<S::Record>> {
    let mut read = Vec::with_capacity(page_size.get());
    for item in store.scan(cursor, direction)?.take(page_size.get()) {
        read.push(item?);
    }

    // For `Prev` this is the smallest id, taken before the page is flipped to ascending order.
    let last_read = read.last().map(|(id, _)| *id);
    let adjacent = policy.adjacent_cursor(last_read, read.len(), page_size);

    let mut items: Vec<S::Record> = read.into_iter().map(|(_, record)| record).collect();
    let (next_cursor, prev_cursor) = match direction {
        Direction::Next => (adjacent, None),
        Direction::Prev => {
            items.reverse();
            (None, adjacent)
        }
    };

    PAGINATION_PAGE_ITEMS
        .with_label_values(&[direction.as_str()])
        .observe(items.len() as f64);

    Ok(Page {
        items,
        direction,
        next_cursor,
        prev_cursor,
    })
}
