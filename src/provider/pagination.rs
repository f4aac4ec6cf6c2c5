//! Rate-limited pagination over one transaction category
//!
//! A [`Paginator`] drives a [`PageSource`] page by page. Two cursor styles are
//! supported: page numbers from a start block (Etherscan) and opaque page keys
//! (Alchemy). Both share the window roll used when a provider stops serving
//! further pages from the current start block: the next window starts at the
//! last block seen, and the records of that block already collected are
//! skipped when they come back.
//!
//! Any request failure ends pagination with what was collected so far.

use crate::config::FetchSettings;
use crate::error::UpstreamError;
use std::future::Future;

/// Parameters for one page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub start_block: u64,
    /// 1-based page number (offset cursors)
    pub page: u32,
    /// Opaque continuation key (token cursors)
    pub page_key: Option<String>,
    pub page_size: u32,
}

/// One page of raw records
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub next_key: Option<String>,
}

impl<T> Page<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records,
            next_key: None,
        }
    }

    pub fn with_next_key(mut self, key: Option<String>) -> Self {
        self.next_key = key;
        self
    }
}

/// Raw record that knows which block it came from
pub trait BlockNumbered {
    fn block_number(&self) -> Option<u64>;
}

/// A provider endpoint returning pages of one category
pub trait PageSource {
    type Record: BlockNumbered + Send;

    /// Short description for logs
    fn label(&self) -> String;

    fn fetch_page(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page<Self::Record>, UpstreamError>> + Send;
}

/// How the cursor advances after a full page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    /// Page numbers, bounded by `FetchSettings::window_limit` per start block
    Offset,
    /// Page keys returned by the provider
    Token,
}

pub struct Paginator<'a, S: PageSource> {
    source: &'a S,
    settings: &'a FetchSettings,
    mode: CursorMode,
    end_block: Option<u64>,
    window_start: u64,
    page: u32,
    page_key: Option<String>,
    /// Boundary-block records still to drop after a window roll
    skip_at_boundary: usize,
    last_block: Option<u64>,
    /// Records collected so far at `last_block`
    trailing_at_last: usize,
    collected: usize,
    done: bool,
}

impl<'a, S: PageSource> Paginator<'a, S> {
    pub fn new(
        source: &'a S,
        settings: &'a FetchSettings,
        mode: CursorMode,
        start_block: u64,
        end_block: Option<u64>,
    ) -> Self {
        Self {
            source,
            settings,
            mode,
            end_block,
            window_start: start_block,
            page: 1,
            page_key: None,
            skip_at_boundary: 0,
            last_block: None,
            trailing_at_last: 0,
            collected: 0,
            done: false,
        }
    }

    /// Records handed out so far
    pub fn collected(&self) -> usize {
        self.collected
    }

    /// Next page of new records, or `None` once pagination has ended
    pub async fn next_page(&mut self) -> Option<Vec<S::Record>> {
        while !self.done {
            if !self.settings.rate_limit_delay.is_zero() {
                tokio::time::sleep(self.settings.rate_limit_delay).await;
            }

            let request = PageRequest {
                start_block: self.window_start,
                page: self.page,
                page_key: self.page_key.clone(),
                page_size: self.settings.page_size,
            };

            tracing::debug!(
                "{}: requesting page {} from block {}",
                self.source.label(),
                request.page,
                request.start_block
            );

            let page = match self.source.fetch_page(&request).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(
                        "{}: stopping after {} records, page {} failed: {}",
                        self.source.label(),
                        self.collected,
                        request.page,
                        e
                    );
                    self.done = true;
                    return None;
                }
            };

            let received = page.records.len();
            if received == 0 {
                self.done = true;
                return None;
            }

            let records = self.drop_boundary_repeats(page.records);
            for record in &records {
                self.track(record.block_number());
            }
            self.collected += records.len();

            if received < self.settings.page_size as usize {
                self.done = true;
            } else {
                self.advance(page.next_key);
            }

            if !records.is_empty() {
                return Some(records);
            }
        }

        None
    }

    /// Drain all remaining pages
    pub async fn collect_all(mut self) -> Vec<S::Record> {
        let mut all = Vec::new();
        while let Some(records) = self.next_page().await {
            all.extend(records);
        }
        all
    }

    fn drop_boundary_repeats(&mut self, records: Vec<S::Record>) -> Vec<S::Record> {
        if self.skip_at_boundary == 0 {
            return records;
        }

        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if self.skip_at_boundary > 0 && record.block_number() == Some(self.window_start) {
                self.skip_at_boundary -= 1;
                continue;
            }
            self.skip_at_boundary = 0;
            kept.push(record);
        }
        kept
    }

    fn track(&mut self, block: Option<u64>) {
        let Some(block) = block else { return };
        if self.last_block == Some(block) {
            self.trailing_at_last += 1;
        } else {
            self.last_block = Some(block);
            self.trailing_at_last = 1;
        }
    }

    fn advance(&mut self, next_key: Option<String>) {
        match self.mode {
            CursorMode::Token => match next_key {
                Some(key) => self.page_key = Some(key),
                None => self.roll_window(),
            },
            CursorMode::Offset => {
                let next_end = (self.page as u64 + 1) * self.settings.page_size as u64;
                if next_end > self.settings.window_limit as u64 {
                    self.roll_window();
                } else {
                    self.page += 1;
                }
            }
        }
    }

    /// Restart from the last block seen with a fresh cursor
    fn roll_window(&mut self) {
        match self.last_block {
            None => {
                tracing::warn!(
                    "{}: full page without block numbers, cannot advance",
                    self.source.label()
                );
                self.done = true;
                return;
            }
            Some(last) if last <= self.window_start => {
                tracing::warn!(
                    "{}: block {} alone fills a window, moving past it",
                    self.source.label(),
                    last
                );
                self.window_start = last + 1;
                self.skip_at_boundary = 0;
            }
            Some(last) => {
                self.window_start = last;
                self.skip_at_boundary = self.trailing_at_last;
            }
        }

        tracing::debug!(
            "{}: window rolled to block {}",
            self.source.label(),
            self.window_start
        );

        self.page = 1;
        self.page_key = None;

        if let Some(end) = self.end_block {
            if self.window_start > end {
                self.done = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Rec {
        block: u64,
        id: u32,
    }

    impl BlockNumbered for Rec {
        fn block_number(&self) -> Option<u64> {
            Some(self.block)
        }
    }

    /// Serves `records` the way an offset API with a result window would,
    /// filtering by start block; keeps a log of requests.
    struct FakeOffsetSource {
        records: Vec<Rec>,
        requests: Mutex<Vec<PageRequest>>,
        requested_at: Mutex<Vec<tokio::time::Instant>>,
        fail_on_page: Option<u32>,
    }

    impl FakeOffsetSource {
        fn new(blocks: &[u64]) -> Self {
            let records = blocks
                .iter()
                .enumerate()
                .map(|(i, b)| Rec {
                    block: *b,
                    id: i as u32,
                })
                .collect();
            Self {
                records,
                requests: Mutex::new(Vec::new()),
                requested_at: Mutex::new(Vec::new()),
                fail_on_page: None,
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl PageSource for FakeOffsetSource {
        type Record = Rec;

        fn label(&self) -> String {
            "fake".to_string()
        }

        async fn fetch_page(&self, request: &PageRequest) -> Result<Page<Rec>, UpstreamError> {
            self.requests.lock().unwrap().push(request.clone());
            self.requested_at.lock().unwrap().push(tokio::time::Instant::now());
            if self.fail_on_page == Some(request.page) {
                return Err(UpstreamError::Malformed("bad page".to_string()));
            }

            let size = request.page_size as usize;
            let skip = (request.page as usize - 1) * size;
            let records = self
                .records
                .iter()
                .filter(|r| r.block >= request.start_block)
                .skip(skip)
                .take(size)
                .cloned()
                .collect();
            Ok(Page::new(records))
        }
    }

    fn settings(page_size: u32, window_limit: u32) -> FetchSettings {
        FetchSettings::default()
            .with_page_size(page_size)
            .with_window_limit(window_limit)
            .with_rate_limit_delay(Duration::ZERO)
    }

    fn ids(records: &[Rec]) -> Vec<u32> {
        records.iter().map(|r| r.id).collect()
    }

    #[tokio::test]
    async fn test_short_page_ends_pagination() {
        let source = FakeOffsetSource::new(&[1, 2, 3]);
        let settings = settings(5, 100);

        let records = Paginator::new(&source, &settings, CursorMode::Offset, 0, None)
            .collect_all()
            .await;

        assert_eq!(ids(&records), vec![0, 1, 2]);
        assert_eq!(source.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_delay_before_every_request() {
        let source = FakeOffsetSource::new(&[1, 2, 3, 4, 5]);
        let delay = Duration::from_millis(200);
        let settings = settings(2, 100).with_rate_limit_delay(delay);

        let start = tokio::time::Instant::now();
        let records = Paginator::new(&source, &settings, CursorMode::Offset, 0, None)
            .collect_all()
            .await;

        assert_eq!(records.len(), 5);
        assert_eq!(tokio::time::Instant::now() - start, delay * 3);

        let requested_at = source.requested_at.lock().unwrap();
        let offsets: Vec<Duration> = requested_at.iter().map(|t| *t - start).collect();
        assert_eq!(offsets, vec![delay, delay * 2, delay * 3]);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_empty_page() {
        let source = FakeOffsetSource::new(&[1, 2, 3, 4]);
        let settings = settings(2, 100);

        let records = Paginator::new(&source, &settings, CursorMode::Offset, 0, None)
            .collect_all()
            .await;

        assert_eq!(records.len(), 4);
        let pages: Vec<u32> = source.requests.lock().unwrap().iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_window_roll_keeps_boundary_block_once() {
        // Window of 4 records: the first window ends inside block 3
        let source = FakeOffsetSource::new(&[1, 2, 3, 3, 3, 4, 5]);
        let settings = settings(2, 4);

        let records = Paginator::new(&source, &settings, CursorMode::Offset, 0, None)
            .collect_all()
            .await;

        assert_eq!(ids(&records), vec![0, 1, 2, 3, 4, 5, 6]);

        let requests = source.requests.lock().unwrap();
        assert_eq!(requests[2].start_block, 3);
        assert_eq!(requests[2].page, 1);
    }

    #[tokio::test]
    async fn test_window_roll_when_boundary_spans_pages() {
        let source = FakeOffsetSource::new(&[1, 2, 2, 2, 2, 3, 4]);
        let settings = settings(2, 4);

        let records = Paginator::new(&source, &settings, CursorMode::Offset, 0, None)
            .collect_all()
            .await;

        assert_eq!(ids(&records), vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_single_block_window_moves_on() {
        let source = FakeOffsetSource::new(&[7, 7, 7, 7, 7, 8]);
        let settings = settings(2, 4);

        let records = Paginator::new(&source, &settings, CursorMode::Offset, 7, None)
            .collect_all()
            .await;

        // Block 7 exceeds the window; its fifth record is unreachable
        assert_eq!(ids(&records), vec![0, 1, 2, 3, 5]);
    }

    #[tokio::test]
    async fn test_roll_stops_past_end_block() {
        let source = FakeOffsetSource::new(&[1, 2, 3, 3, 4, 5]);
        let settings = settings(2, 2);

        let mut paginator = Paginator::new(&source, &settings, CursorMode::Offset, 0, Some(3));
        let mut records = Vec::new();
        while let Some(page) = paginator.next_page().await {
            records.extend(page);
        }

        assert_eq!(ids(&records), vec![0, 1, 2, 3]);
        assert_eq!(paginator.collected(), 4);
        assert_eq!(source.request_count(), 3);
    }

    #[tokio::test]
    async fn test_failure_keeps_collected_records() {
        let mut source = FakeOffsetSource::new(&[1, 2, 3, 4, 5]);
        source.fail_on_page = Some(2);
        let settings = settings(2, 100);

        let records = Paginator::new(&source, &settings, CursorMode::Offset, 0, None)
            .collect_all()
            .await;

        assert_eq!(ids(&records), vec![0, 1]);
        assert_eq!(source.request_count(), 2);
    }

    struct FakeTokenSource {
        pages: Vec<(Vec<u64>, Option<&'static str>)>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl PageSource for FakeTokenSource {
        type Record = Rec;

        fn label(&self) -> String {
            "token".to_string()
        }

        async fn fetch_page(&self, request: &PageRequest) -> Result<Page<Rec>, UpstreamError> {
            let index = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.clone());
                requests.len() - 1
            };
            let Some((blocks, key)) = self.pages.get(index) else {
                return Ok(Page::new(Vec::new()));
            };
            let records = blocks
                .iter()
                .map(|b| Rec {
                    block: *b,
                    id: index as u32,
                })
                .collect();
            Ok(Page::new(records).with_next_key(key.map(String::from)))
        }
    }

    #[tokio::test]
    async fn test_token_cursor_follows_keys() {
        let source = FakeTokenSource {
            pages: vec![(vec![1, 2], Some("k1")), (vec![3, 4], Some("k2")), (vec![5], None)],
            requests: Mutex::new(Vec::new()),
        };
        let settings = settings(2, 4);

        let records = Paginator::new(&source, &settings, CursorMode::Token, 0, None)
            .collect_all()
            .await;

        assert_eq!(records.len(), 5);
        let requests = source.requests.lock().unwrap();
        assert_eq!(requests[0].page_key, None);
        assert_eq!(requests[1].page_key.as_deref(), Some("k1"));
        assert_eq!(requests[2].page_key.as_deref(), Some("k2"));
        assert!(requests.iter().all(|r| r.start_block == 0));
    }

    #[tokio::test]
    async fn test_token_cursor_falls_back_to_last_block() {
        let source = FakeTokenSource {
            // Full page without a key, then the boundary block re-served
            pages: vec![(vec![1, 2], None), (vec![2, 3], None)],
            requests: Mutex::new(Vec::new()),
        };
        let settings = settings(2, 4);

        let records = Paginator::new(&source, &settings, CursorMode::Token, 0, None)
            .collect_all()
            .await;

        let blocks: Vec<u64> = records.iter().map(|r| r.block).collect();
        assert_eq!(blocks, vec![1, 2, 3]);
        let requests = source.requests.lock().unwrap();
        assert_eq!(requests[1].start_block, 2);
        assert_eq!(requests.len(), 3);
    }
}
