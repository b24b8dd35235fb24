// Per-identity rate limiting module
// Author: kelexine (https://github.com/kelexine)

pub mod limiter;
pub mod models;

pub use crate::config::RateLimitPolicy;
pub use limiter::RateLimiter;
pub use models::{
    Dimension, IdentityKey, RateCategory, RateDecision, RateLimitEntry, WindowHit,
};
