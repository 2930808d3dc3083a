//! Per-intent agents, each with its own chat.
//!
//! A routed agent owns one [`AgentLoop`] and one [`Chat`] per intent. Every
//! user message is classified first and then appended to the chosen intent's
//! chat only, so intents never see each other's history.

use chatscout_core::chat::{Chat, ChatObserver};
use chatscout_core::message::{Message, Role};
use chatscout_core::provider::GenerateOptions;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::loop_runner::{AgentError, AgentLoop};
use crate::router::IntentRouter;

/// One intent's agent and conversation.
pub struct Route {
    agent: AgentLoop,
    chat: Chat,
}

impl Route {
    pub fn new(agent: AgentLoop, chat: Chat) -> Self {
        Self { agent, chat }
    }

    pub fn chat(&self) -> &Chat {
        &self.chat
    }

    async fn run(&mut self, options: GenerateOptions) -> Result<Vec<Message>, AgentError> {
        self.agent.run(&mut self.chat, options).await
    }
}

/// What a routed message produced, and where it went.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub intent: String,
    pub produced: Vec<Message>,
}

pub struct RoutedAgent {
    default_intent: String,
    default_route: Route,
    routes: BTreeMap<String, Route>,

    /// Without a router every message goes to the default intent
    router: Option<IntentRouter>,
}

impl RoutedAgent {
    pub fn new(default_intent: impl Into<String>, route: Route) -> Self {
        Self {
            default_intent: default_intent.into(),
            default_route: route,
            routes: BTreeMap::new(),
            router: None,
        }
    }

    /// Add an intent. Reusing the default label replaces the default route.
    pub fn with_route(mut self, intent: impl Into<String>, route: Route) -> Self {
        let intent = intent.into();
        if intent == self.default_intent {
            self.default_route = route;
        } else {
            self.routes.insert(intent, route);
        }
        self
    }

    pub fn with_router(mut self, router: IntentRouter) -> Self {
        self.router = Some(router);
        self
    }

    pub fn default_intent(&self) -> &str {
        &self.default_intent
    }

    pub fn is_routed(&self) -> bool {
        self.router.is_some()
    }

    /// Every intent, the default first.
    pub fn intents(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.default_intent.as_str()).chain(self.routes.keys().map(String::as_str))
    }

    pub fn chat(&self, intent: &str) -> Option<&Chat> {
        if intent == self.default_intent {
            return Some(&self.default_route.chat);
        }
        self.routes.get(intent).map(Route::chat)
    }

    pub fn default_chat(&self) -> &Chat {
        &self.default_route.chat
    }

    /// Register `observer` on every intent's chat.
    pub fn add_observer(&mut self, observer: &Arc<dyn ChatObserver>) {
        self.default_route.chat.add_observer(observer);
        for route in self.routes.values_mut() {
            route.chat.add_observer(observer);
        }
    }

    /// The intent that should handle `text`.
    ///
    /// A label the router knows but no route serves goes to the default intent.
    pub async fn route(&self, text: &str) -> String {
        let Some(router) = &self.router else {
            return self.default_intent.clone();
        };
        let intent = router.classify(text).await;
        if self.chat(&intent).is_some() {
            intent
        } else {
            debug!(intent = %intent, fallback = %self.default_intent, "No route for intent");
            self.default_intent.clone()
        }
    }

    /// Classify `text`, append it to the chosen intent's chat and run that agent.
    pub async fn send(&mut self, text: &str, options: GenerateOptions) -> Result<Routed, AgentError> {
        let intent = self.route(text).await;
        info!(intent = %intent, "Routing user message");
        let produced = self.send_to(&intent, text, options).await?;
        Ok(Routed { intent, produced })
    }

    /// Append `text` to `intent`'s chat and run that agent.
    pub async fn send_to(
        &mut self,
        intent: &str,
        text: &str,
        options: GenerateOptions,
    ) -> Result<Vec<Message>, AgentError> {
        let route = self.route_mut(intent);
        route.chat.append(Message::user(text));
        route.run(options).await
    }

    /// Run `intent`'s agent on its chat as it stands.
    pub async fn run(&mut self, intent: &str, options: GenerateOptions) -> Result<Vec<Message>, AgentError> {
        self.route_mut(intent).run(options).await
    }

    /// Whether the last message of `intent`'s chat still waits for a model turn.
    pub fn awaiting_reply(&self, intent: &str) -> bool {
        self.chat(intent)
            .and_then(Chat::last)
            .is_some_and(|m| matches!(m.role(), Role::User | Role::Tool))
    }

    fn route_mut(&mut self, intent: &str) -> &mut Route {
        match self.routes.get_mut(intent) {
            Some(route) => route,
            None => &mut self.default_route,
        }
    }
}
