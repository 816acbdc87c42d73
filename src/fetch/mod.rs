pub mod client;
pub mod rate_limit;

pub use self::client::FetchClient;
pub use self::rate_limit::RateLimiter;
