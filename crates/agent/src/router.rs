//! Intent classification for routed conversations.

use chatscout_core::agent::RouterConfig;
use chatscout_core::chat::Chat;
use chatscout_core::message::Message;
use chatscout_core::provider::GenerateOptions;
use chatscout_providers::Backend;
use std::sync::Arc;
use tracing::{debug, warn};

/// Labels are single words, so a handful of tokens is enough.
const CLASSIFY_MAX_TOKENS: u32 = 4;

/// Asks the model which intent a user message belongs to.
///
/// Classification never fails: a backend error, an empty reply or a label
/// outside the configured set all resolve to the default intent.
pub struct IntentRouter {
    backend: Arc<dyn Backend>,
    labels: Vec<String>,
    default_intent: String,
    prompt: String,
}

impl IntentRouter {
    /// A router over `labels`. The default intent is added to the set if missing.
    pub fn new<I, S>(backend: Arc<dyn Backend>, labels: I, default_intent: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let default_intent = default_intent.into();
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if !labels.contains(&default_intent) {
            labels.push(default_intent.clone());
        }
        let prompt = classifier_prompt(&labels, &default_intent);
        Self {
            backend,
            labels,
            default_intent,
            prompt,
        }
    }

    pub fn from_config(backend: Arc<dyn Backend>, config: &RouterConfig) -> Self {
        let router = Self::new(backend, config.labels(), config.default_intent.clone());
        match &config.classifier_prompt {
            Some(prompt) => router.with_prompt(prompt.clone()),
            None => router,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn default_intent(&self) -> &str {
        &self.default_intent
    }

    /// Classify `text` into one of the known labels.
    ///
    /// The message is sent in a throwaway chat, so no conversation sees it.
    pub async fn classify(&self, text: &str) -> String {
        let chat = Chat::with_messages([Message::system(self.prompt.clone()), Message::user(text)]);
        let options = GenerateOptions::new()
            .with_max_tokens(CLASSIFY_MAX_TOKENS)
            .with_temperature(0.0);

        let reply = match self.backend.generate(&chat, &options).await {
            Ok(response) => response.choices.into_iter().next().map(|c| c.message),
            Err(e) => {
                warn!(error = %e, fallback = %self.default_intent, "Intent classification failed");
                return self.default_intent.clone();
            }
        };

        let label = reply.map(|m| normalize(m.content())).unwrap_or_default();
        if self.labels.contains(&label) {
            debug!(intent = %label, "Intent classified");
            label
        } else {
            warn!(reply = %label, fallback = %self.default_intent, "Unrecognised intent label");
            self.default_intent.clone()
        }
    }
}

impl std::fmt::Debug for IntentRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentRouter")
            .field("model", &self.backend.model())
            .field("labels", &self.labels)
            .field("default_intent", &self.default_intent)
            .finish()
    }
}

fn classifier_prompt(labels: &[String], default_intent: &str) -> String {
    format!(
        "Classify the user's message into exactly one of these intents: {}. \
         Reply with the intent label only. If unsure, reply {default_intent}.",
        labels.join(", ")
    )
}

/// Models tend to decorate one-word answers with quotes or a full stop.
fn normalize(reply: &str) -> String {
    reply
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.'))
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatscout_core::error::ProviderError;
    use chatscout_core::provider::ProviderResponse;
    use std::sync::Mutex;

    /// Answers every call with the same reply and records what it was asked.
    struct FixedReply {
        reply: Result<Option<String>, ()>,
        seen: Mutex<Vec<(Vec<Message>, GenerateOptions)>>,
    }

    impl FixedReply {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(Some(reply.to_string())),
                seen: Mutex::default(),
            })
        }

        fn no_choices() -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(None),
                seen: Mutex::default(),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl Backend for FixedReply {
        fn model(&self) -> &str {
            "classifier"
        }

        async fn generate(
            &self,
            chat: &Chat,
            options: &GenerateOptions,
        ) -> Result<ProviderResponse, ProviderError> {
            self.seen.lock().unwrap().push((chat.messages(), options.clone()));
            match &self.reply {
                Ok(Some(text)) => Ok(ProviderResponse::single("classifier", Message::assistant(text.clone()))),
                Ok(None) => Ok(ProviderResponse {
                    choices: Vec::new(),
                    model: "classifier".into(),
                    usage: None,
                }),
                Err(()) => Err(ProviderError::Network("connection reset".into())),
            }
        }
    }

    fn router(backend: Arc<FixedReply>) -> IntentRouter {
        IntentRouter::new(backend, ["data", "order"], "data")
    }

    #[tokio::test]
    async fn known_label_is_returned() {
        assert_eq!(router(FixedReply::new("order")).classify("two litres please").await, "order");
    }

    #[tokio::test]
    async fn reply_is_normalised_before_matching() {
        assert_eq!(router(FixedReply::new("  Order.\n")).classify("buy").await, "order");
        assert_eq!(router(FixedReply::new("\"DATA\"")).classify("specs?").await, "data");
    }

    #[tokio::test]
    async fn unknown_label_falls_back_to_default() {
        assert_eq!(router(FixedReply::new("billing")).classify("refund").await, "data");
    }

    #[tokio::test]
    async fn empty_or_missing_reply_falls_back_to_default() {
        assert_eq!(router(FixedReply::new("")).classify("hm").await, "data");
        assert_eq!(router(FixedReply::no_choices()).classify("hm").await, "data");
    }

    #[tokio::test]
    async fn backend_error_falls_back_to_default() {
        let router = IntentRouter::new(FixedReply::failing(), ["data", "order"], "order");
        assert_eq!(router.classify("anything").await, "order");
    }

    #[tokio::test]
    async fn classification_uses_a_short_deterministic_call() {
        let backend = FixedReply::new("data");
        router(backend.clone()).classify("acetone purity?").await;

        let seen = backend.seen.lock().unwrap();
        let (messages, options) = &seen[0];
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content().contains("data, order"));
        assert_eq!(messages[1], Message::user("acetone purity?"));
        assert_eq!(options.max_tokens, Some(CLASSIFY_MAX_TOKENS));
        assert_eq!(options.temperature, Some(0.0));
        assert!(options.tools.is_empty());
    }

    #[test]
    fn default_joins_the_label_set() {
        let router = IntentRouter::new(FixedReply::new("x"), ["order"], "data");
        assert_eq!(router.labels(), ["order".to_string(), "data".to_string()]);
        assert_eq!(router.default_intent(), "data");
    }

    #[test]
    fn config_prompt_replaces_the_generated_one() {
        let config = RouterConfig {
            classifier_prompt: Some("Say data or order.".into()),
            ..RouterConfig::default()
        };
        let router = IntentRouter::from_config(FixedReply::new("x"), &config);
        assert_eq!(router.prompt, "Say data or order.");
        assert_eq!(router.labels().len(), 2);
    }
}
