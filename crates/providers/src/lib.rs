//! Model access for chatscout.
//!
//! Providers implement `chatscout_core::Provider` against a concrete
//! endpoint. A [`ModelBackend`] wraps one with a rate limiter, quota
//! recovery and a fallback chain; the agent loop only sees [`Backend`].

pub mod backend;
pub mod openai_compat;
pub mod ratelimit;
pub mod store;

pub use backend::{
    Backend, BackendBuilder, DefaultProviderFactory, FallbackPolicy, ModelBackend,
    ProviderFactory,
};
pub use openai_compat::OpenAiCompatProvider;
pub use ratelimit::RateLimiter;
pub use store::{ChatStore, DirectoryChatStore, StoreError};
