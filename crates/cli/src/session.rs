//! Wiring shared by the chat commands: backend chain, tool gateway, the
//! per-intent agents and the observer suite around their chats.

use chatscout_agent::{AgentError, AgentLoop, IntentRouter, Route, RoutedAgent};
use chatscout_config::{AppConfig, ToolsConfig};
use chatscout_core::{Chat, GenerateOptions, IntentConfig, Message, Role};
use chatscout_observers::ObserverSuite;
use chatscout_providers::{Backend, DirectoryChatStore, FallbackPolicy, ModelBackend};
use chatscout_tools::{StreamableHttpTransport, ToolGateway, ToolTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

type BoxError = Box<dyn std::error::Error>;

/// Whether the rate-limit policy lets another user message through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Open,
    /// Seconds left in the cooldown
    Cooldown(u64),
    /// The per-session cap that was reached
    Exhausted(u32),
}

pub struct Session {
    agents: RoutedAgent,
    options: GenerateOptions,
    suite: Option<ObserverSuite>,
}

impl Session {
    /// Build the agents for `config`. `chat` becomes the default intent's chat.
    ///
    /// A system prompt is added only to chats that start empty.
    pub fn start(config: &AppConfig, name: &str, tools: bool, chat: Chat) -> Result<Self, BoxError> {
        let (primary, fallbacks) = config.backend_chain()?;
        if !primary.has_credentials() {
            let hint = primary.api_key_env.as_deref().unwrap_or("api_key");
            return Err(format!(
                "No API key for backend '{}'. Set {hint} or add api_key to the config.",
                primary.name
            )
            .into());
        }

        let mut builder = ModelBackend::builder(primary)
            .fallbacks(fallbacks)
            .policy(FallbackPolicy {
                free_tier_only: config.free_tier_only,
            });
        if let Some(dir) = &config.chat_store_dir {
            builder = builder.store(Arc::new(DirectoryChatStore::new(dir.clone())));
        }
        let backend = builder.build()?;
        info!(model = backend.config().model.as_str(), fallbacks = backend.fallbacks().len(), "Backend ready");
        let backend: Arc<dyn Backend> = Arc::new(backend);

        let transport = if tools { build_transport(&config.tools)? } else { None };
        let mut agents = build_agents(config, backend, transport.as_ref(), chat);

        let suite = if config.observers.enabled {
            let suite = ObserverSuite::create(&config.observers, name)?;
            agents.add_observer(suite.observer());
            Some(suite)
        } else {
            None
        };

        Ok(Self {
            agents,
            options: GenerateOptions::new(),
            suite,
        })
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn admission(&self) -> Admission {
        let Some(suite) = &self.suite else {
            return Admission::Open;
        };
        match suite.rate_limit.status() {
            Ok(status) if status.is_rate_limited => Admission::Cooldown(status.cooldown_remaining_secs),
            Ok(status) if status.remaining_messages == 0 => Admission::Exhausted(status.max_per_session),
            Ok(_) => Admission::Open,
            Err(e) => {
                warn!(error = %e, "Rate limit status unavailable");
                Admission::Open
            }
        }
    }

    /// Route a user message to its intent and run that agent on it.
    pub async fn send(&mut self, text: &str) -> Result<Vec<Message>, AgentError> {
        let routed = self.agents.send(text, self.options.clone()).await?;
        if self.agents.is_routed() {
            println!("🧭 {}", routed.intent);
        }
        Ok(routed.produced)
    }

    /// Run the default intent's agent on its chat as it stands.
    pub async fn run(&mut self) -> Result<Vec<Message>, AgentError> {
        let intent = self.agents.default_intent().to_string();
        self.agents.run(&intent, self.options.clone()).await
    }

    /// Whether the default intent's chat still waits for a model turn.
    pub fn awaiting_reply(&self) -> bool {
        self.agents.awaiting_reply(self.agents.default_intent())
    }

    /// Seal the observer files. Failures are logged, not returned.
    pub fn finish(&self, reason: &str) {
        if let Some(suite) = &self.suite {
            if let Err(e) = suite.finish(reason) {
                warn!(error = %e, "Failed to close observers");
            }
            if let Some(path) = suite.audit.path() {
                info!(path = %path.display(), reason, "Session closed");
            }
        }
    }
}

/// One agent per routed intent, or a single default agent when routing is off.
fn build_agents(
    config: &AppConfig,
    backend: Arc<dyn Backend>,
    transport: Option<&Arc<dyn ToolTransport>>,
    chat: Chat,
) -> RoutedAgent {
    let router = &config.router;
    let route = |intent: Option<&IntentConfig>, mut chat: Chat| {
        let allowed = intent
            .and_then(|i| i.allowed_tools.as_ref())
            .or(config.tools.allowed.as_ref());
        let mut agent = AgentLoop::new(backend.clone()).with_config(&config.agent);
        if let Some(transport) = transport {
            agent = agent.with_gateway(Arc::new(gateway_for(transport, allowed)));
        }
        let prompt = intent
            .and_then(|i| i.system_prompt.as_ref())
            .or(config.agent.system_prompt.as_ref());
        if chat.is_empty() {
            if let Some(prompt) = prompt {
                chat.append(Message::system(prompt.clone()));
            }
        }
        Route::new(agent, chat)
    };

    if !router.enabled {
        return RoutedAgent::new(router.default_intent.clone(), route(None, chat));
    }

    let mut agents = RoutedAgent::new(
        router.default_intent.clone(),
        route(router.intent(&router.default_intent), chat),
    );
    for intent in router.intents.iter().filter(|i| i.label != router.default_intent) {
        agents = agents.with_route(intent.label.clone(), route(Some(intent), Chat::new()));
    }
    info!(intents = router.intents.len(), default_intent = %router.default_intent, "Intent routing enabled");
    agents.with_router(IntentRouter::from_config(backend.clone(), router))
}

/// The transport for the configured tool server, if one is configured.
pub fn build_transport(config: &ToolsConfig) -> Result<Option<Arc<dyn ToolTransport>>, BoxError> {
    let Some(url) = &config.url else {
        return Ok(None);
    };
    let mut transport = StreamableHttpTransport::new(url.clone(), Duration::from_secs(config.timeout_secs))?;
    if let Some(token) = &config.bearer_token {
        transport = transport.with_bearer_token(token.clone());
    }
    Ok(Some(Arc::new(transport)))
}

fn gateway_for(transport: &Arc<dyn ToolTransport>, allowed: Option<&Vec<String>>) -> ToolGateway {
    let gateway = ToolGateway::new(transport.clone());
    match allowed {
        Some(names) => gateway.with_allowed_tools(names.iter().cloned()),
        None => gateway,
    }
}

/// Print what the agent produced, one line per message.
pub fn render(messages: &[Message]) {
    for message in messages {
        match message.role() {
            Role::Assistant => {
                for call in message.tool_calls() {
                    println!("🔧 {}({})", call.name, call.arguments);
                }
                if !message.content().is_empty() {
                    println!("🤖 {}", message.content());
                }
            }
            Role::Tool => {
                let id = message.tool_call_id().unwrap_or_default();
                println!("   ↳ [{id}] {}", clip(message.content(), 200));
            }
            _ => {}
        }
    }
}

fn clip(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
