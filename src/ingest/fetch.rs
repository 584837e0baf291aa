//! Rate-limited pagination over a [`PageSource`].
//!
//! [`pages`] is a lazy stream: nothing is requested until it is polled, each
//! pull first waits on the shared [`RequestPacer`], and the stream ends after
//! the first short page or the first error. Dropping it cancels the fetch.

use crate::ogd::{FetchError, RawRecord, RegionScope, ReportingPeriod};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::time::Duration;
use tracing::{debug, trace};

/// One page request against the upstream dataset.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub period: &'a ReportingPeriod,
    pub scope: &'a RegionScope,
    pub offset: u32,
    pub limit: u32,
}

/// Anything that can serve offset/limit pages of raw records.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest<'_>) -> Result<Vec<RawRecord>, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub page_size: u32,
    /// Minimum time between the starts of two consecutive page requests.
    pub request_interval: Duration,
    pub max_pages: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            request_interval: Duration::from_secs(1),
            max_pages: 500,
        }
    }
}

/// Minimum spacing between the starts of upstream requests.
///
/// One pacer is shared by every period and every run against the same
/// upstream, so the interval also holds across period and run boundaries.
pub struct RequestPacer {
    limiter: Option<DefaultDirectRateLimiter>,
}

impl RequestPacer {
    /// A zero interval disables pacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            limiter: Quota::with_period(interval).map(RateLimiter::direct),
        }
    }

    /// Resolves once the next request may start.
    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

struct Pager<'a, S: ?Sized> {
    source: &'a S,
    period: &'a ReportingPeriod,
    scope: &'a RegionScope,
    page_size: u32,
    max_pages: u32,
    pacer: &'a RequestPacer,
    offset: u32,
    pulled: u32,
    done: bool,
}

/// Stream the pages of `period`, one request per pull.
pub fn pages<'a, S>(
    source: &'a S,
    period: &'a ReportingPeriod,
    scope: &'a RegionScope,
    options: FetchOptions,
    pacer: &'a RequestPacer,
) -> impl Stream<Item = Result<Vec<RawRecord>, FetchError>> + Send + 'a
where
    S: PageSource + ?Sized,
{
    let pager = Pager {
        source,
        period,
        scope,
        page_size: options.page_size.max(1),
        max_pages: options.max_pages,
        pacer,
        offset: 0,
        pulled: 0,
        done: false,
    };

    futures::stream::unfold(pager, |mut pager| async move {
        if pager.done {
            return None;
        }
        if pager.pulled >= pager.max_pages {
            pager.done = true;
            let max_pages = pager.max_pages;
            return Some((Err(FetchError::TooManyPages { max_pages }), pager));
        }
        pager.pacer.wait().await;

        let request = PageRequest {
            period: pager.period,
            scope: pager.scope,
            offset: pager.offset,
            limit: pager.page_size,
        };
        let result = pager.source.fetch_page(&request).await;
        pager.pulled += 1;

        match &result {
            Ok(records) if records.len() < pager.page_size as usize => {
                trace!(offset = pager.offset, records = records.len(), "Short page, end of data");
                pager.done = true;
            }
            Ok(_) => pager.offset += pager.page_size,
            Err(_) => pager.done = true,
        }
        Some((result, pager))
    })
}

/// Fetch every record for `period`, or nothing at all if any page fails.
pub async fn fetch_period<S>(
    source: &S,
    period: &ReportingPeriod,
    scope: &RegionScope,
    options: FetchOptions,
    pacer: &RequestPacer,
) -> Result<Vec<RawRecord>, FetchError>
where
    S: PageSource + ?Sized,
{
    let mut stream = std::pin::pin!(pages(source, period, scope, options, pacer));
    let mut records = Vec::new();
    let mut page_count = 0usize;

    while let Some(page) = stream.next().await {
        let page = page?;
        page_count += 1;
        records.extend(page);
    }

    debug!(
        period = %period,
        pages = page_count,
        records = records.len(),
        "Fetched reporting period"
    );
    Ok(records)
}
