//! Model backend: a provider wrapped in rate limiting and quota recovery.
//!
//! On a quota (rate-limit) error the backend:
//! 1. persists the chat through its [`ChatStore`], tagged `rate-limit`;
//! 2. if the error carried a retry-after hint, sleeps it and retries once;
//! 3. walks its fallback chain, delegating to a backend built for each
//!    eligible entry with the rest of the chain as that backend's fallbacks;
//! 4. gives up with the latest primary quota error.
//!
//! Any other error propagates untouched.

use async_trait::async_trait;
use chatscout_config::BackendConfig;
use chatscout_core::error::ProviderError;
use chatscout_core::provider::{GenerateOptions, Provider, ProviderRequest, ProviderResponse};
use chatscout_core::Chat;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::openai_compat::OpenAiCompatProvider;
use crate::ratelimit::RateLimiter;
use crate::store::ChatStore;

const RATE_LIMIT_REASON: &str = "rate-limit";

/// Anything that can turn a chat into model responses.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The model this backend calls first.
    fn model(&self) -> &str;

    async fn generate(
        &self,
        chat: &Chat,
        options: &GenerateOptions,
    ) -> Result<ProviderResponse, ProviderError>;
}

/// Builds the provider behind a backend configuration.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn Provider>, ProviderError>;
}

/// Builds an [`OpenAiCompatProvider`] for every configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProviderFactory;

impl ProviderFactory for DefaultProviderFactory {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn Provider>, ProviderError> {
        let provider = OpenAiCompatProvider::new(
            config.name.clone(),
            config.base_url.clone(),
            config.api_key.clone().unwrap_or_default(),
        )?;
        Ok(Arc::new(provider))
    }
}

/// Which fallback entries may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Only switch onto backends marked `is_free`
    pub free_tier_only: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            free_tier_only: true,
        }
    }
}

/// A backend bound to one model endpoint, with its own limiter and fallback chain.
pub struct ModelBackend {
    config: BackendConfig,
    provider: Arc<dyn Provider>,
    limiter: RateLimiter,
    fallbacks: Vec<BackendConfig>,
    store: Option<Arc<dyn ChatStore>>,
    factory: Arc<dyn ProviderFactory>,
    policy: FallbackPolicy,
}

impl std::fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBackend")
            .field("config", &self.config)
            .field("provider", &self.provider.name())
            .field("limiter", &self.limiter)
            .field("fallbacks", &self.fallbacks.len())
            .field("has_store", &self.store.is_some())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Assembles a [`ModelBackend`].
pub struct BackendBuilder {
    config: BackendConfig,
    provider: Option<Arc<dyn Provider>>,
    fallbacks: Vec<BackendConfig>,
    store: Option<Arc<dyn ChatStore>>,
    factory: Arc<dyn ProviderFactory>,
    policy: FallbackPolicy,
}

impl BackendBuilder {
    /// Use this provider instead of asking the factory for one.
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn fallbacks(mut self, fallbacks: Vec<BackendConfig>) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn store(mut self, store: Arc<dyn ChatStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<ModelBackend, ProviderError> {
        let provider = match self.provider {
            Some(provider) => provider,
            None => self.factory.build(&self.config)?,
        };
        Ok(ModelBackend {
            limiter: RateLimiter::new(self.config.rate_limit),
            config: self.config,
            provider,
            fallbacks: self.fallbacks,
            store: self.store,
            factory: self.factory,
            policy: self.policy,
        })
    }
}

impl ModelBackend {
    pub fn builder(config: BackendConfig) -> BackendBuilder {
        BackendBuilder {
            config,
            provider: None,
            fallbacks: Vec::new(),
            store: None,
            factory: Arc::new(DefaultProviderFactory),
            policy: FallbackPolicy::default(),
        }
    }

    /// Build a backend with the default provider factory and policy.
    pub fn from_config(
        config: BackendConfig,
        fallbacks: Vec<BackendConfig>,
        store: Option<Arc<dyn ChatStore>>,
    ) -> Result<Self, ProviderError> {
        let mut builder = Self::builder(config).fallbacks(fallbacks);
        if let Some(store) = store {
            builder = builder.store(store);
        }
        builder.build()
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn fallbacks(&self) -> &[BackendConfig] {
        &self.fallbacks
    }

    /// One rate-limited provider call.
    async fn call(
        &self,
        chat: &Chat,
        options: &GenerateOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        self.limiter.acquire().await;
        let request = ProviderRequest::new(self.config.model.clone(), chat.messages(), options);
        self.provider.complete(request).await
    }

    fn persist(&self, chat: &Chat) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.persist(chat, &self.config.model, RATE_LIMIT_REASON) {
            warn!(model = %self.config.model, error = %e, "Failed to persist chat after rate limit");
        }
    }

    async fn recover(
        &self,
        chat: &Chat,
        options: &GenerateOptions,
        mut error: ProviderError,
    ) -> Result<ProviderResponse, ProviderError> {
        self.persist(chat);

        if let Some(delay) = error.retry_after() {
            warn!(
                model = %self.config.model,
                delay_secs = delay.as_secs_f64(),
                "Rate limited; retrying after delay"
            );
            tokio::time::sleep(delay).await;
            match self.call(chat, options).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_exhausted() => error = e,
                Err(e) => return Err(e),
            }
        }

        if let Some(response) = self.try_fallbacks(chat, options).await {
            return Ok(response);
        }

        Err(error)
    }

    fn eligible(&self, candidate: &BackendConfig) -> bool {
        if self.policy.free_tier_only && !candidate.is_free {
            debug!(fallback = %candidate.model, "Skipping fallback: not free tier");
            return false;
        }
        if !candidate.has_credentials() {
            debug!(fallback = %candidate.model, "Skipping fallback: missing API key");
            return false;
        }
        if candidate.model == self.config.model {
            debug!(fallback = %candidate.model, "Skipping fallback: same model");
            return false;
        }
        true
    }

    async fn try_fallbacks(
        &self,
        chat: &Chat,
        options: &GenerateOptions,
    ) -> Option<ProviderResponse> {
        for (idx, candidate) in self.fallbacks.iter().enumerate() {
            if !self.eligible(candidate) {
                continue;
            }

            let mut builder = ModelBackend::builder(candidate.clone())
                .fallbacks(self.fallbacks[idx + 1..].to_vec())
                .factory(self.factory.clone())
                .policy(self.policy);
            if let Some(store) = &self.store {
                builder = builder.store(store.clone());
            }
            let backend = match builder.build() {
                Ok(backend) => backend,
                Err(e) => {
                    warn!(fallback = %candidate.model, error = %e, "Could not build fallback backend");
                    continue;
                }
            };

            info!(
                model = %self.config.model,
                fallback = %candidate.model,
                "Rate limit hit, switching to fallback model"
            );
            match backend.generate(chat, options).await {
                Ok(response) => return Some(response),
                Err(e) => {
                    warn!(
                        fallback = %candidate.model,
                        error = %e,
                        "Fallback model failed, trying next option"
                    );
                }
            }
        }
        None
    }
}

#[async_trait]
impl Backend for ModelBackend {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        chat: &Chat,
        options: &GenerateOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        match self.call(chat, options).await {
            Err(e) if e.is_exhausted() => self.recover(chat, options, e).await,
            other => other,
        }
    }
}
