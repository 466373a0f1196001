//! Search, sort and pagination shared by the admin list pages.
//!
//! Every list page fetches the whole collection from the gateway and narrows it here.
//! The query string carries the view state, so reloading or sharing a URL reproduces
//! the same page.

use std::cmp::Ordering;

use serde::Deserialize;

pub const PAGE_SIZE: usize = 10;

#[derive(Clone, Debug, PartialEq)]
pub enum SortKey {
    Text(String),
    Number(f64),
    Missing,
}

impl SortKey {
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_lowercase())
    }

    pub fn optional_text(value: Option<&str>) -> Self {
        value.map(Self::text).unwrap_or(Self::Missing)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Text(_) => 1,
            Self::Missing => 2,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// A row that can appear in an admin list.
pub trait Listable {
    /// Fields matched by the search box.
    fn search_fields(&self) -> Vec<&str>;
    /// Value used when sorting by `column`.
    fn sort_key(&self, column: &str) -> SortKey;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("desc") => Self::Desc,
            _ => Self::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn flip(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortState {
    pub column: String,
    pub direction: SortDirection,
}

impl SortState {
    /// Header click: the active column flips, any other column starts ascending.
    pub fn toggle(&self, column: &str) -> Self {
        if self.column == column {
            Self {
                column: self.column.clone(),
                direction: self.direction.flip(),
            }
        } else {
            Self {
                column: column.to_string(),
                direction: SortDirection::Asc,
            }
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListQuery {
    pub q: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub page: Option<String>,
    pub status: Option<String>,
    pub expand: Option<String>,
    pub notice: Option<String>,
}

impl ListQuery {
    pub fn search_term(&self) -> &str {
        self.q.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn requested_page(&self) -> usize {
        self.page
            .as_deref()
            .and_then(|page| page.trim().parse().ok())
            .unwrap_or(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmptyState {
    NoItems,
    NoSearchResults,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl Page {
    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }
}

pub fn search<T: Listable>(items: Vec<T>, term: &str) -> Vec<T> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| {
            item.search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(&term))
        })
        .collect()
}

/// Stable: rows with equal keys keep their incoming order in both directions.
pub fn sort<T: Listable>(items: &mut [T], state: &SortState) {
    items.sort_by(|a, b| {
        let ordering = a
            .sort_key(&state.column)
            .compare(&b.sort_key(&state.column));
        match state.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

/// Cuts out one page; the requested number is clamped into range.
pub fn paginate<T>(items: Vec<T>, requested: usize) -> (Vec<T>, Page) {
    let total_items = items.len();
    let total_pages = total_items.div_ceil(PAGE_SIZE).max(1);
    let number = requested.clamp(1, total_pages);
    let rows = items
        .into_iter()
        .skip((number - 1) * PAGE_SIZE)
        .take(PAGE_SIZE)
        .collect();
    (
        rows,
        Page {
            number,
            total_pages,
            total_items,
        },
    )
}

/// View state rendered around a list: links, indicators and the empty message.
#[derive(Clone, Debug)]
pub struct ListControls {
    pub base_path: String,
    pub search: String,
    pub sort: SortState,
    pub page: Page,
    pub status: Option<String>,
    pub empty: Option<EmptyState>,
}

impl ListControls {
    fn href(&self, sort: &SortState, page: usize, status: Option<&str>) -> String {
        let mut href = format!(
            "{}?sort={}&dir={}",
            self.base_path,
            urlencoding::encode(&sort.column),
            sort.direction.as_str()
        );
        if !self.search.is_empty() {
            href.push_str(&format!("&q={}", urlencoding::encode(&self.search)));
        }
        if let Some(status) = status {
            href.push_str(&format!("&status={}", urlencoding::encode(status)));
        }
        if page > 1 {
            href.push_str(&format!("&page={page}"));
        }
        href
    }

    pub fn sort_href(&self, column: &str) -> String {
        self.href(&self.sort.toggle(column), 1, self.status.as_deref())
    }

    pub fn page_href(&self, page: usize) -> String {
        self.href(&self.sort, page, self.status.as_deref())
    }

    pub fn status_href(&self, status: &str) -> String {
        let status = (status != "all").then_some(status);
        self.href(&self.sort, 1, status)
    }

    /// Current page with an extra parameter, e.g. the row to expand.
    pub fn current_href_with(&self, key: &str, value: &str) -> String {
        format!(
            "{}&{key}={}",
            self.page_href(self.page.number),
            urlencoding::encode(value)
        )
    }

    pub fn indicator(&self, column: &str) -> &'static str {
        if self.sort.column != column {
            ""
        } else {
            match self.sort.direction {
                SortDirection::Asc => "▲",
                SortDirection::Desc => "▼",
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty.is_some()
    }

    pub fn empty_message(&self) -> &'static str {
        match self.empty {
            Some(EmptyState::NoSearchResults) => "No results match your search.",
            Some(EmptyState::NoItems) => "Nothing here yet.",
            None => "",
        }
    }

    pub fn prev_href(&self) -> String {
        self.page_href(self.page.number.saturating_sub(1).max(1))
    }

    pub fn next_href(&self) -> String {
        self.page_href((self.page.number + 1).min(self.page.total_pages))
    }
}

pub struct ListView<T> {
    pub rows: Vec<T>,
    pub controls: ListControls,
}

/// Applies search, sort and paging to a freshly fetched collection.
/// Unknown sort columns fall back to `default_sort`.
pub fn build<T: Listable>(
    items: Vec<T>,
    query: &ListQuery,
    base_path: &str,
    sortable: &[&str],
    default_sort: &str,
) -> ListView<T> {
    let had_items = !items.is_empty();
    let term = query.search_term().to_string();
    let mut matched = search(items, &term);

    let column = query
        .sort
        .as_deref()
        .filter(|column| sortable.contains(column))
        .unwrap_or(default_sort);
    let sort_state = SortState {
        column: column.to_string(),
        direction: SortDirection::parse(query.dir.as_deref()),
    };
    sort(&mut matched, &sort_state);

    let empty = match (matched.is_empty(), had_items) {
        (false, _) => None,
        (true, true) => Some(EmptyState::NoSearchResults),
        (true, false) => Some(EmptyState::NoItems),
    };
    let (rows, page) = paginate(matched, query.requested_page());

    ListView {
        rows,
        controls: ListControls {
            base_path: base_path.to_string(),
            search: term,
            sort: sort_state,
            page,
            status: query.status.clone().filter(|status| !status.is_empty() && status != "all"),
            empty,
        },
    }
}
