use futures::{future, prelude::*, stream};
use log::{debug, warn};
use reqwest::StatusCode;
use std::{fmt, future::Future, sync::Arc, time::Duration};
use tokio::sync::Semaphore;

use crate::config::FetchOptions;
use crate::error::{Error, Result};
use crate::tile::Tile;
use crate::url::UrlFormat;

/// Result of a single GET request.
#[derive(Clone, Debug, PartialEq)]
pub enum Attempt {
    /// A `2xx` response with its complete body.
    Body(Vec<u8>),
    /// The server answered `404`.
    NotFound,
    /// Any other status or a transport failure; worth trying again.
    Retryable(String),
}

/// Terminal outcome of fetching one tile.
#[derive(Debug)]
pub enum FetchOutcome {
    Success(Vec<u8>),
    Absent,
    Failed(Error),
}

/// The HTTP seam of the fetch pool.
///
/// Implementations must be usable by every in-flight request of a chunk at once.
pub trait TileClient: Send + Sync {
    fn get(&self, url: &str) -> impl Future<Output = Attempt> + Send;
}

impl<T: TileClient> TileClient for Arc<T> {
    fn get(&self, url: &str) -> impl Future<Output = Attempt> + Send {
        (**self).get(url)
    }
}

/// [`TileClient`] backed by a pooled `reqwest` client.
#[derive(Clone, Debug)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.append(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(concat!(
                "raster-map-downloader_rs_",
                env!("CARGO_PKG_VERSION")
            )),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }
}

impl TileClient for ReqwestClient {
    async fn get(&self, url: &str) -> Attempt {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Retryable(e.to_string()),
        };

        let status = response.status();
        debug!("Sent GET request: {}: {}", status.as_u16(), url);

        if status == StatusCode::NOT_FOUND {
            return Attempt::NotFound;
        }
        if !status.is_success() {
            return Attempt::Retryable(format!("status {}", status));
        }

        match response.bytes().await {
            Ok(body) => Attempt::Body(body.to_vec()),
            Err(e) => Attempt::Retryable(format!("failed reading body: {}", e)),
        }
    }
}

/// Resolves tile coordinates into [`FetchOutcome`]s, one chunk at a time.
pub struct FetchPool<C> {
    client: C,
    url: UrlFormat,
    options: FetchOptions,
    limiter: Option<Arc<Semaphore>>,
}

impl<C: TileClient> FetchPool<C> {
    /// Fails with [`Error::InvalidChunkSize`] if `options.chunk_size` is zero.
    pub fn new(client: C, url: UrlFormat, options: FetchOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(Error::InvalidChunkSize);
        }

        let limiter = match options.max_concurrent_requests {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        Ok(Self {
            client,
            url,
            options,
            limiter,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.options.chunk_size
    }

    /// Lazily fetches `tiles` in consecutive chunks of `chunk_size`.
    ///
    /// Each item holds the outcomes of one chunk, in the same order as the
    /// chunk's coordinates. A chunk is only dispatched after every request of
    /// the previous one has finished, so at most `chunk_size` requests are in
    /// flight at any time.
    pub fn fetch<'a, I>(&'a self, tiles: I) -> impl Stream<Item = Vec<FetchOutcome>> + 'a
    where
        I: IntoIterator<Item = Tile>,
        I::IntoIter: 'a,
    {
        stream::iter(tiles)
            .chunks(self.options.chunk_size)
            .then(move |chunk| self.fetch_chunk(chunk))
    }

    async fn fetch_chunk(&self, chunk: Vec<Tile>) -> Vec<FetchOutcome> {
        future::join_all(chunk.iter().map(|tile| self.fetch_tile(tile))).await
    }

    /// Fetches a single tile, retrying transient failures up to
    /// `max_retry_count` times.
    pub async fn fetch_tile(&self, tile: &Tile) -> FetchOutcome {
        let url = match self.url.tile_url(tile) {
            Ok(url) => url,
            Err(e) => {
                return FetchOutcome::Failed(Error::InvalidUrlTemplate {
                    template: self.url.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let max_attempts = self.options.max_retry_count.saturating_add(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let attempt = self.attempt(&url).await;
            let reason = match attempt {
                Attempt::Body(body) => return self.encode(url, body).await,
                Attempt::NotFound => return FetchOutcome::Absent,
                Attempt::Retryable(reason) => reason,
            };

            if attempts >= max_attempts {
                return FetchOutcome::Failed(Error::RetriesExhausted {
                    url,
                    attempts,
                    reason,
                });
            }

            warn!(
                "Retrying GET request ({} try) for tile {}: {}: {}",
                attempts, tile, reason, url
            );
            if self.options.retry_delay > Duration::ZERO {
                tokio::time::sleep(self.options.retry_delay).await;
            }
        }
    }

    async fn attempt(&self, url: &str) -> Attempt {
        // acquiring only fails on a closed semaphore
        let _permit = match &self.limiter {
            Some(limiter) => limiter.acquire().await.ok(),
            None => None,
        };

        if self.options.timeout.is_zero() {
            return self.client.get(url).await;
        }

        match tokio::time::timeout(self.options.timeout, self.client.get(url)).await {
            Ok(attempt) => attempt,
            Err(_) => Attempt::Retryable(format!(
                "timed out after {}s",
                self.options.timeout.as_secs_f64()
            )),
        }
    }

    async fn encode(&self, url: String, body: Vec<u8>) -> FetchOutcome {
        let encoding = self.options.encoding;
        if encoding.is_passthrough() {
            return FetchOutcome::Success(body);
        }

        let encoded = tokio::task::spawn_blocking(move || encoding.encode(body)).await;
        match encoded {
            Ok(Ok(image)) => FetchOutcome::Success(image),
            Ok(Err(source)) => FetchOutcome::Failed(Error::InvalidImage { url, source }),
            Err(join_error) => FetchOutcome::Failed(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                join_error,
            ))),
        }
    }
}

impl<C> fmt::Debug for FetchPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchPool")
            .field("url", &self.url)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::encoding::TileEncoding;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory tile server.
    ///
    /// URLs look like `mock://{z}/{x}/{y}`; unknown URLs answer with `body_for`.
    #[derive(Default)]
    pub(crate) struct MockClient {
        pub responses: Mutex<HashMap<String, Vec<Attempt>>>,
        pub requests: Mutex<Vec<String>>,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub delay: Duration,
    }

    impl MockClient {
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        /// Queue answers for `url`; the last one repeats forever.
        pub fn respond(&self, url: &str, attempts: Vec<Attempt>) {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_owned(), attempts);
        }

        pub fn requests_for(&self, url: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|u| *u == url)
                .count()
        }

        pub fn body_for(url: &str) -> Vec<u8> {
            url.as_bytes().to_vec()
        }
    }

    impl TileClient for MockClient {
        async fn get(&self, url: &str) -> Attempt {
            self.requests.lock().unwrap().push(url.to_owned());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let attempt = {
                let mut responses = self.responses.lock().unwrap();
                match responses.get_mut(url) {
                    Some(queue) if queue.len() > 1 => queue.remove(0),
                    Some(queue) => queue[0].clone(),
                    None => Attempt::Body(Self::body_for(url)),
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            attempt
        }
    }

    pub(crate) fn mock_url() -> UrlFormat {
        UrlFormat::parse("mock://{z}/{x}/{y}").unwrap()
    }

    pub(crate) fn options(chunk_size: usize, max_retry_count: u32) -> FetchOptions {
        FetchOptions {
            chunk_size,
            max_retry_count,
            max_concurrent_requests: 0,
            timeout: Duration::ZERO,
            retry_delay: Duration::ZERO,
            encoding: TileEncoding::Original,
        }
    }

    fn grid(zoom: u8, size: u32) -> Vec<Tile> {
        (0..size)
            .flat_map(|x| (0..size).map(move |y| Tile::new(x, y, zoom)))
            .collect()
    }

    #[tokio::test]
    async fn chunks_stay_aligned_with_input() {
        let tiles = grid(6, 7);
        for chunk_size in [1, 3, 5, 7, 48, 49, 100] {
            let pool =
                FetchPool::new(MockClient::default(), mock_url(), options(chunk_size, 0)).unwrap();
            let chunks: Vec<_> = pool.fetch(tiles.clone()).collect().await;

            assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= chunk_size));
            let bodies: Vec<_> = chunks
                .into_iter()
                .flatten()
                .map(|outcome| match outcome {
                    FetchOutcome::Success(body) => body,
                    other => panic!("unexpected outcome {:?}", other),
                })
                .collect();
            let expected: Vec<_> = tiles
                .iter()
                .map(|t| MockClient::body_for(&format!("mock://{}/{}/{}", t.z, t.x, t.y)))
                .collect();
            assert_eq!(bodies, expected, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn zero_chunk_size_is_an_error() {
        assert!(matches!(
            FetchPool::new(MockClient::default(), mock_url(), options(0, 0)),
            Err(Error::InvalidChunkSize)
        ));
    }

    #[tokio::test]
    async fn order_is_kept_when_responses_race() {
        let pool = FetchPool::new(
            MockClient::with_delay(Duration::from_millis(1)),
            mock_url(),
            options(8, 0),
        )
        .unwrap();
        let tiles = grid(3, 4);
        let outcomes: Vec<_> = pool.fetch(tiles.clone()).concat().await;
        for (tile, outcome) in tiles.iter().zip(outcomes) {
            match outcome {
                FetchOutcome::Success(body) => assert_eq!(
                    body,
                    MockClient::body_for(&format!("mock://3/{}/{}", tile.x, tile.y))
                ),
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_bounds_requests_in_flight() {
        let pool = FetchPool::new(
            MockClient::with_delay(Duration::from_millis(50)),
            mock_url(),
            options(5, 0),
        )
        .unwrap();
        let chunks: Vec<_> = pool.fetch(grid(4, 5)).collect().await;

        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.len() == 5));
        assert_eq!(pool.client.max_in_flight.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_caps_concurrency() {
        let mut opts = options(10, 0);
        opts.max_concurrent_requests = 3;
        let pool = FetchPool::new(
            MockClient::with_delay(Duration::from_millis(50)),
            mock_url(),
            opts,
        )
        .unwrap();
        let outcomes: Vec<_> = pool.fetch(grid(4, 4)).concat().await;

        assert_eq!(outcomes.len(), 16);
        assert_eq!(pool.client.max_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn server_errors_are_retried_exactly_max_retry_count_times() {
        let client = MockClient::default();
        client.respond("mock://2/1/1", vec![Attempt::Retryable("status 500".into())]);
        let pool = FetchPool::new(client, mock_url(), options(4, 3)).unwrap();

        let outcome = pool.fetch_tile(&Tile::new(1, 1, 2)).await;
        match outcome {
            FetchOutcome::Failed(Error::RetriesExhausted { url, attempts, .. }) => {
                assert_eq!(url, "mock://2/1/1");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(pool.client.requests_for("mock://2/1/1"), 4);
    }

    #[tokio::test]
    async fn transient_failure_recovers() {
        let client = MockClient::default();
        client.respond(
            "mock://2/0/1",
            vec![
                Attempt::Retryable("status 503".into()),
                Attempt::Retryable("status 502".into()),
                Attempt::Body(b"tile".to_vec()),
            ],
        );
        let pool = FetchPool::new(client, mock_url(), options(4, 2)).unwrap();

        match pool.fetch_tile(&Tile::new(0, 1, 2)).await {
            FetchOutcome::Success(body) => assert_eq!(body, b"tile"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(pool.client.requests_for("mock://2/0/1"), 3);
    }

    #[tokio::test]
    async fn not_found_is_absent_and_never_retried() {
        let client = MockClient::default();
        client.respond("mock://2/3/3", vec![Attempt::NotFound]);
        let pool = FetchPool::new(client, mock_url(), options(4, 10)).unwrap();

        assert!(matches!(
            pool.fetch_tile(&Tile::new(3, 3, 2)).await,
            FetchOutcome::Absent
        ));
        assert_eq!(pool.client.requests_for("mock://2/3/3"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_retried() {
        let mut opts = options(1, 2);
        opts.timeout = Duration::from_secs(1);
        let pool = FetchPool::new(
            MockClient::with_delay(Duration::from_secs(5)),
            mock_url(),
            opts,
        )
        .unwrap();

        match pool.fetch_tile(&Tile::new(0, 0, 0)).await {
            FetchOutcome::Failed(Error::RetriesExhausted {
                attempts, reason, ..
            }) => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(pool.client.requests_for("mock://0/0/0"), 3);
    }

    #[tokio::test]
    async fn undecodable_body_fails() {
        let mut opts = options(1, 0);
        opts.encoding = TileEncoding::Jpeg { quality: 90 };
        let pool = FetchPool::new(MockClient::default(), mock_url(), opts).unwrap();

        assert!(matches!(
            pool.fetch_tile(&Tile::new(0, 0, 0)).await,
            FetchOutcome::Failed(Error::InvalidImage { .. })
        ));
    }
}
