//! Pagination cursor: decides whether to fetch another page and which.
//!
//! The cursor sees only page *presence*: how many items a page held and
//! whether the remote advertised a next-page reference. It never inspects
//! record content, and it never hands out a token it has already consumed.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

pub const DEFAULT_MAX_EMPTY_PAGES: u32 = 2;

/// Stop condition for a remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationPolicy {
    /// Continue while the page carries a next-page reference.
    ///
    /// The only correct policy when a short page does not mean the end.
    LinkDriven,
    /// Continue until `max_empty_pages` consecutive pages come back empty.
    EmptyRunCounted { max_empty_pages: u32 },
    /// As [`EmptyRunCounted`](Self::EmptyRunCounted), but never fetch more
    /// than `max_pages` pages in total.
    FixedCeiling { max_empty_pages: u32, max_pages: u32 },
}

impl PaginationPolicy {
    pub fn empty_run_counted() -> Self {
        Self::EmptyRunCounted {
            max_empty_pages: DEFAULT_MAX_EMPTY_PAGES,
        }
    }

    pub fn fixed_ceiling(max_pages: u32) -> Self {
        Self::FixedCeiling {
            max_empty_pages: DEFAULT_MAX_EMPTY_PAGES,
            max_pages,
        }
    }
}

/// Position of the next page to request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageToken {
    /// Page number.
    Index(u64),
    /// Item offset into the collection.
    Offset(u64),
    /// Continuation reference supplied by the remote (usually a URL).
    Link(String),
}

/// Single-consumer cursor over one remote collection.
#[derive(Debug, Clone)]
pub struct PageCursor {
    policy: PaginationPolicy,
    current: Option<PageToken>,
    stride: u64,
    pages_seen: u32,
    empty_run: u32,
    seen_links: HashSet<String>,
}

impl PageCursor {
    /// Follow next-page references starting at `first`.
    pub fn link_driven(first: impl Into<String>) -> Self {
        let first = first.into();
        let mut seen_links = HashSet::new();
        seen_links.insert(first.clone());
        Self::start(PaginationPolicy::LinkDriven, PageToken::Link(first), 1, seen_links)
    }

    /// Page numbers `first, first + 1, ...` under `policy`.
    ///
    /// Under [`PaginationPolicy::LinkDriven`] the index only advances while
    /// the remote still reports a next page.
    pub fn indexed(policy: PaginationPolicy, first: u64) -> Self {
        Self::start(policy, PageToken::Index(first), 1, HashSet::new())
    }

    /// Item offsets `0, page_size, 2 * page_size, ...` under `policy`.
    pub fn offset(policy: PaginationPolicy, page_size: u64) -> Self {
        Self::start(policy, PageToken::Offset(0), page_size.max(1), HashSet::new())
    }

    fn start(
        policy: PaginationPolicy,
        first: PageToken,
        stride: u64,
        seen_links: HashSet<String>,
    ) -> Self {
        Self {
            policy,
            current: Some(first),
            stride,
            pages_seen: 0,
            empty_run: 0,
            seen_links,
        }
    }

    pub fn policy(&self) -> PaginationPolicy {
        self.policy
    }

    /// Token for the next page to fetch, or `None` once exhausted.
    pub fn current(&self) -> Option<&PageToken> {
        self.current.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }

    /// Pages reported through [`advance`](Self::advance) so far.
    pub fn pages_seen(&self) -> u32 {
        self.pages_seen
    }

    /// Stop without consulting the policy (fetch failure, caller limit).
    pub fn halt(&mut self) {
        self.current = None;
    }

    /// Report the page fetched for [`current`](Self::current).
    ///
    /// `items` is the number of entries the page held; `next_link` the
    /// remote's next-page reference, if any.
    pub fn advance(&mut self, items: usize, next_link: Option<&str>) {
        let Some(consumed) = self.current.take() else {
            return;
        };
        self.pages_seen += 1;

        let more = match self.policy {
            PaginationPolicy::LinkDriven => next_link.is_some(),
            PaginationPolicy::EmptyRunCounted { max_empty_pages } => {
                self.count_empty(items, max_empty_pages)
            }
            PaginationPolicy::FixedCeiling {
                max_empty_pages,
                max_pages,
            } => {
                let under_ceiling = self.pages_seen < max_pages;
                if !under_ceiling {
                    warn!(max_pages, "page ceiling reached, stopping pagination");
                }
                self.count_empty(items, max_empty_pages) && under_ceiling
            }
        };
        if !more {
            debug!(pages = self.pages_seen, "pagination finished");
            return;
        }

        self.current = match consumed {
            PageToken::Index(i) => Some(PageToken::Index(i + 1)),
            PageToken::Offset(o) => Some(PageToken::Offset(o + self.stride)),
            PageToken::Link(_) => match next_link {
                Some(link) if self.seen_links.insert(link.to_string()) => {
                    Some(PageToken::Link(link.to_string()))
                }
                Some(link) => {
                    warn!(link, "next-page link already visited, stopping pagination");
                    None
                }
                None => None,
            },
        };
    }

    fn count_empty(&mut self, items: usize, max_empty_pages: u32) -> bool {
        if items == 0 {
            self.empty_run += 1;
        } else {
            self.empty_run = 0;
        }
        self.empty_run < max_empty_pages
    }
}

/// One fetched page: its entries and the remote's next-page reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_link: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next_link: None,
        }
    }

    pub fn with_next(mut self, next_link: Option<String>) -> Self {
        self.next_link = next_link;
        self
    }
}

/// Lazy, single-pass iterator over a paginated collection.
///
/// Fetches one page at a time through `fetch`, buffering at most that page.
/// A fetch error is yielded once and ends the iteration.
pub struct Paginated<T, F> {
    cursor: PageCursor,
    fetch: F,
    buffer: VecDeque<T>,
}

impl<T, F> Paginated<T, F> {
    pub fn new(cursor: PageCursor, fetch: F) -> Self {
        Self {
            cursor,
            fetch,
            buffer: VecDeque::new(),
        }
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }
}

impl<T, E, F> Iterator for Paginated<T, F>
where
    F: FnMut(&PageToken) -> Result<Page<T>, E>,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            let token = self.cursor.current()?.clone();
            match (self.fetch)(&token) {
                Ok(page) => {
                    debug!(?token, items = page.items.len(), "fetched page");
                    self.cursor.advance(page.items.len(), page.next_link.as_deref());
                    self.buffer.extend(page.items);
                }
                Err(e) => {
                    self.cursor.halt();
                    return Some(Err(e));
                }
            }
        }
    }
}
