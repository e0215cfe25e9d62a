//! One page-request/page-response contract over two pagination styles.
//!
//! GitLab pages by integer page number, GitHub's GraphQL API by opaque
//! cursor. Both are hidden behind [`PageToken`], and [`paginate`] turns a
//! caller's [`PageRequest`] into one or more provider fetches.

use std::future::Future;

use serde::{Deserialize, Serialize};

use super::errors::{Result, SourceError};

/// Page size meaning "every item", fetched internally at [`MAX_PAGE_SIZE`].
pub const FETCH_ALL: i32 = -1;

/// Largest page size a caller may ask for.
pub const MAX_PAGE_SIZE: i32 = 100;

/// What the caller asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Items per page in `[-1, 100]`; `-1` fetches everything.
    pub size: i32,
    /// Empty for the first page, otherwise a `next_token` from a prior response.
    #[serde(default)]
    pub token: String,
}

impl PageRequest {
    #[must_use]
    pub fn new(size: i32, token: impl Into<String>) -> Self {
        Self {
            size,
            token: token.into(),
        }
    }

    /// Request for every item, starting from the first page.
    #[must_use]
    pub fn all() -> Self {
        Self::new(FETCH_ALL, "")
    }

    /// The request itself, once it is present and its size is in range.
    pub(crate) fn validate(request: Option<&Self>) -> Result<&Self> {
        let request =
            request.ok_or_else(|| SourceError::invalid_argument("page request is required"))?;
        if !(FETCH_ALL..=MAX_PAGE_SIZE).contains(&request.size) {
            return Err(SourceError::invalid_argument(format!(
                "page size must be between {FETCH_ALL} and {MAX_PAGE_SIZE}, got {}",
                request.size
            )));
        }
        Ok(request)
    }
}

/// What the caller gets back alongside the items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    /// Marker for the following page; empty when there is none.
    pub next_token: String,
    /// Number of items in this response.
    pub result_size: usize,
    /// Total reported by the provider, or the item count when unknown.
    pub total_size: usize,
}

/// Items plus the page metadata describing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page: PageResponse,
}

/// Provider-side page state, round-tripped through [`PageRequest::token`].
pub trait PageToken: Sized {
    /// Parse a caller token; the empty string means "first page".
    fn parse(token: &str) -> Result<Option<Self>>;

    /// Render as a caller-facing token.
    fn render(&self) -> String;
}

/// Integer page numbers.
impl PageToken for u32 {
    fn parse(token: &str) -> Result<Option<Self>> {
        if token.is_empty() {
            return Ok(None);
        }
        token
            .parse()
            .map(Some)
            .map_err(|_| SourceError::invalid_argument("page token must be int"))
    }

    fn render(&self) -> String {
        self.to_string()
    }
}

/// Opaque cursor, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

impl PageToken for Cursor {
    fn parse(token: &str) -> Result<Option<Self>> {
        Ok((!token.is_empty()).then(|| Cursor(token.to_string())))
    }

    fn render(&self) -> String {
        self.0.clone()
    }
}

/// A single fetch as seen by a provider adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery<S> {
    pub per_page: u32,
    /// `None` for the first page.
    pub token: Option<S>,
}

/// A single page as returned by a provider adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T, S> {
    pub items: Vec<T>,
    /// State for the following page, `None` once exhausted.
    pub next: Option<S>,
    /// Provider-reported total, when it reports one.
    pub total: Option<usize>,
}

impl<T, S> Page<T, S> {
    #[must_use]
    pub fn new(items: Vec<T>, next: Option<S>, total: Option<usize>) -> Self {
        Self { items, next, total }
    }

    /// Apply `f` to every item, keeping the page state.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U, S> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next: self.next,
            total: self.total,
        }
    }
}

/// Serve `request` through `fetch`.
///
/// A finite size makes exactly one fetch and hands back the provider's next
/// marker. [`FETCH_ALL`] keeps fetching full pages until the provider reports
/// no next page; the response then carries an empty `next_token` and both
/// sizes equal the number of items.
pub async fn paginate<T, S, F, Fut>(request: Option<&PageRequest>, mut fetch: F) -> Result<Paged<T>>
where
    S: PageToken,
    F: FnMut(PageQuery<S>) -> Fut,
    Fut: Future<Output = Result<Page<T, S>>>,
{
    let request = PageRequest::validate(request)?;
    let start = S::parse(&request.token)?;

    if request.size != FETCH_ALL {
        let page = fetch(PageQuery {
            per_page: request.size.unsigned_abs(),
            token: start,
        })
        .await?;

        let result_size = page.items.len();
        let next_token = page.next.as_ref().map(PageToken::render);
        return Ok(Paged {
            page: PageResponse {
                next_token: next_token.unwrap_or_default(),
                result_size,
                total_size: page.total.unwrap_or(result_size),
            },
            items: page.items,
        });
    }

    let mut items = Vec::new();
    let mut token = start;
    let mut fetches = 0u32;
    loop {
        let page = fetch(PageQuery {
            per_page: MAX_PAGE_SIZE.unsigned_abs(),
            token: token.take(),
        })
        .await?;
        fetches += 1;
        items.extend(page.items);

        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    tracing::debug!("Fetched {} items in {} pages", items.len(), fetches);

    let total = items.len();
    Ok(Paged {
        items,
        page: PageResponse {
            next_token: String::new(),
            result_size: total,
            total_size: total,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ErrorKind;
    use std::sync::Mutex;

    /// Integer-paged provider over `0..len`.
    fn numbered(
        len: u32,
        calls: &Mutex<Vec<PageQuery<u32>>>,
        query: PageQuery<u32>,
    ) -> Result<Page<u32, u32>> {
        calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.clone());
        let page = query.token.unwrap_or(1);
        let start = (page - 1) * query.per_page;
        let end = (start + query.per_page).min(len);
        let next = (end < len).then_some(page + 1);
        Ok(Page::new((start..end).collect(), next, Some(len as usize)))
    }

    #[tokio::test]
    async fn missing_request_is_invalid() {
        let err = paginate(None, |_q: PageQuery<u32>| async {
            Ok(Page::<u32, u32>::new(Vec::new(), None, None))
        })
        .await
        .expect_err("None is rejected");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn out_of_range_sizes_are_invalid_and_never_fetch() {
        for size in [-2, 101, i32::MIN, i32::MAX] {
            let calls = Mutex::new(Vec::new());
            let log = &calls;
            let err = paginate(Some(&PageRequest::new(size, "")), |q| async move {
                numbered(5, log, q)
            })
            .await
            .expect_err("size out of range");
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "size {size}");
            assert!(calls.lock().unwrap_or_else(|e| e.into_inner()).is_empty());
        }
    }

    #[tokio::test]
    async fn non_numeric_page_token_is_invalid() {
        let calls = Mutex::new(Vec::new());
        let log = &calls;
        let err = paginate(Some(&PageRequest::new(10, "abc")), |q| async move {
            numbered(5, log, q)
        })
        .await
        .expect_err("token must be numeric");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("page token must be int"));
    }

    #[tokio::test]
    async fn finite_request_makes_one_fetch_and_returns_next_token() {
        let calls = Mutex::new(Vec::new());
        let log = &calls;
        let paged = paginate(Some(&PageRequest::new(3, "")), |q| async move {
            numbered(7, log, q)
        })
        .await
        .expect("first page");

        assert_eq!(paged.items, vec![0, 1, 2]);
        assert_eq!(paged.page.next_token, "2");
        assert_eq!(paged.page.result_size, 3);
        assert_eq!(paged.page.total_size, 7);
        assert_eq!(calls.lock().unwrap_or_else(|e| e.into_inner()).len(), 1);

        let paged = paginate(Some(&PageRequest::new(3, "3")), |q| async move {
            numbered(7, log, q)
        })
        .await
        .expect("last page");
        assert_eq!(paged.items, vec![6]);
        assert_eq!(paged.page.next_token, "");
    }

    #[tokio::test]
    async fn fetch_all_pages_at_max_size_until_exhausted() {
        let calls = Mutex::new(Vec::new());
        let log = &calls;
        let paged = paginate(Some(&PageRequest::all()), |q| async move {
            numbered(250, log, q)
        })
        .await
        .expect("all pages");

        assert_eq!(paged.items.len(), 250);
        assert_eq!(paged.page.next_token, "");
        assert_eq!(paged.page.result_size, 250);
        assert_eq!(paged.page.total_size, 250);

        let calls = calls.into_inner().unwrap_or_else(|e| e.into_inner());
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|q| q.per_page == 100));
        assert_eq!(calls[0].token, None);
        assert_eq!(calls[2].token, Some(3));
    }

    #[tokio::test]
    async fn walking_finite_pages_matches_fetch_all() {
        let calls = Mutex::new(Vec::new());
        let log = &calls;
        let all = paginate(Some(&PageRequest::all()), |q| async move {
            numbered(7, log, q)
        })
        .await
        .expect("all pages");

        let mut walked = Vec::new();
        let mut token = String::new();
        let mut fetches = 0;
        loop {
            let paged = paginate(Some(&PageRequest::new(3, token.clone())), |q| async move {
                numbered(7, log, q)
            })
            .await
            .expect("page");
            fetches += 1;
            walked.extend(paged.items);
            if paged.page.next_token.is_empty() {
                break;
            }
            token = paged.page.next_token;
        }

        assert_eq!(fetches, 3);
        assert_eq!(walked, all.items);
    }

    #[tokio::test]
    async fn cursor_tokens_are_round_tripped_verbatim() {
        let seen = Mutex::new(Vec::new());
        let request = PageRequest::new(2, "Y3Vyc29yOjI=");
        let paged = paginate(Some(&request), |q: PageQuery<Cursor>| {
            seen.lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(q.token.clone());
            async {
                Ok(Page::new(
                    vec!["a", "b"],
                    Some(Cursor("Y3Vyc29yOjQ=".to_string())),
                    None,
                ))
            }
        })
        .await
        .expect("cursor page");

        assert_eq!(paged.page.next_token, "Y3Vyc29yOjQ=");
        assert_eq!(paged.page.total_size, 2);
        assert_eq!(
            seen.into_inner().unwrap_or_else(|e| e.into_inner()),
            vec![Some(Cursor("Y3Vyc29yOjI=".to_string()))]
        );
    }
}
