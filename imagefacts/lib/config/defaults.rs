use std::time::Duration;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The default per-HTTP-exchange timeout for registry requests.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// The default number of additional attempts for retryable errors.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// The default initial delay between retry attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// The ceiling applied to exponential retry backoff.
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// The default time-to-live for facts and digest cache entries.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// The default bound on in-flight registry requests. Reserved; collection is sequential in v1.
pub const DEFAULT_MAX_CONCURRENCY: usize = 1;

/// The number of recorded errors after which the error collector recommends fallback facts.
pub const DEFAULT_FALLBACK_THRESHOLD: usize = 5;

/// The User-Agent header sent with every registry request.
pub const USER_AGENT: &str = concat!("imagefacts/", env!("CARGO_PKG_VERSION"));
