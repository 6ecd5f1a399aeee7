pub mod csrf;
pub mod rate_limit;
pub mod response;

pub use csrf::csrf_middleware;
pub use rate_limit::{rate_limit_middleware, InMemoryRateLimitStore, RateLimitStore};
pub use response::{ApiResponse, ApiResult};
