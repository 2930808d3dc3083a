//! Per-session message-rate policy.
//!
//! Only user messages count. A burst over the per-minute limit starts a
//! cooldown; approaching the per-session cap raises one-time warnings. The
//! policy reports, it never blocks: callers consult [`RateLimitPolicy::is_rate_limited`].

use chatscout_config::RateLimitPolicyConfig;
use chatscout_core::chat::ChatObserver;
use chatscout_core::error::ObserverError;
use chatscout_core::message::{Message, Role};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::lock;

const WINDOW: Duration = Duration::from_secs(60);

/// Receives a human-readable notice.
pub type Callback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Notice {
    SessionExceeded,
    Remaining10,
    Remaining25,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub is_rate_limited: bool,
    pub total_messages: u32,
    pub remaining_messages: u32,
    pub messages_this_minute: usize,
    pub max_per_minute: u32,
    pub max_per_session: u32,
    pub cooldown_remaining_secs: u64,
}

#[derive(Default)]
struct PolicyState {
    total_user_messages: u32,
    window: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
    issued: HashSet<Notice>,
}

impl PolicyState {
    fn prune(&mut self, now: Instant) {
        while self
            .window
            .front()
            .is_some_and(|t| now.duration_since(*t) > WINDOW)
        {
            self.window.pop_front();
        }
    }

    fn cooldown_left(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }
}

pub struct RateLimitPolicy {
    limits: RateLimitPolicyConfig,
    on_warning: Callback,
    on_exceeded: Callback,
    state: Mutex<PolicyState>,
}

impl RateLimitPolicy {
    /// Notices go to `tracing::warn!` and `tracing::error!` unless replaced.
    pub fn new(limits: RateLimitPolicyConfig) -> Self {
        info!(
            max_per_minute = limits.max_per_minute,
            max_per_session = limits.max_per_session,
            "Rate limit policy initialized"
        );
        Self {
            limits,
            on_warning: Box::new(|msg| tracing::warn!("{msg}")),
            on_exceeded: Box::new(|msg| tracing::error!("{msg}")),
            state: Mutex::new(PolicyState::default()),
        }
    }

    pub fn on_warning(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_warning = Box::new(callback);
        self
    }

    pub fn on_exceeded(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_exceeded = Box::new(callback);
        self
    }

    pub fn is_rate_limited(&self) -> Result<bool, ObserverError> {
        Ok(lock(&self.state)?.cooldown_left(Instant::now()).is_some())
    }

    /// User messages left before the session cap.
    pub fn remaining_messages(&self) -> Result<u32, ObserverError> {
        let state = lock(&self.state)?;
        Ok(self.remaining(&state))
    }

    /// User messages within the last minute.
    pub fn messages_this_minute(&self) -> Result<usize, ObserverError> {
        let mut state = lock(&self.state)?;
        state.prune(Instant::now());
        Ok(state.window.len())
    }

    pub fn status(&self) -> Result<RateLimitStatus, ObserverError> {
        let now = Instant::now();
        let mut state = lock(&self.state)?;
        state.prune(now);
        let cooldown = state.cooldown_left(now);
        Ok(RateLimitStatus {
            is_rate_limited: cooldown.is_some(),
            total_messages: state.total_user_messages,
            remaining_messages: self.remaining(&state),
            messages_this_minute: state.window.len(),
            max_per_minute: self.limits.max_per_minute,
            max_per_session: self.limits.max_per_session,
            cooldown_remaining_secs: cooldown.map_or(0, |d| d.as_secs()),
        })
    }

    fn remaining(&self, state: &PolicyState) -> u32 {
        self.limits
            .max_per_session
            .saturating_sub(state.total_user_messages)
    }
}

impl ChatObserver for RateLimitPolicy {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn update(&self, message: &Message) -> Result<(), ObserverError> {
        if message.role() != Role::User {
            return Ok(());
        }
        // Callbacks run after the lock is released.
        let notice = self.record(Instant::now())?;
        match notice {
            Some((Level::Warning, text)) => (self.on_warning)(&text),
            Some((Level::Exceeded, text)) => (self.on_exceeded)(&text),
            None => {}
        }
        Ok(())
    }
}

enum Level {
    Warning,
    Exceeded,
}

impl RateLimitPolicy {
    fn record(&self, now: Instant) -> Result<Option<(Level, String)>, ObserverError> {
        let mut state = lock(&self.state)?;

        if let Some(left) = state.cooldown_left(now) {
            return Ok(Some((
                Level::Exceeded,
                format!(
                    "Rate limited. Please wait {} seconds before sending more messages.",
                    left.as_secs()
                ),
            )));
        }
        state.cooldown_until = None;

        state.total_user_messages += 1;
        state.window.push_back(now);
        state.prune(now);

        if state.window.len() >= self.limits.max_per_minute as usize {
            state.cooldown_until = Some(now + Duration::from_secs(self.limits.cooldown_secs));
            return Ok(Some((
                Level::Exceeded,
                format!(
                    "Rate limit exceeded ({} messages/minute). Cooldown for {} seconds.",
                    self.limits.max_per_minute, self.limits.cooldown_secs
                ),
            )));
        }

        let remaining = self.remaining(&state);
        let notice = if remaining == 0 {
            state.issued.insert(Notice::SessionExceeded).then(|| {
                (
                    Level::Exceeded,
                    format!(
                        "Session limit reached ({} messages). Please start a new session.",
                        self.limits.max_per_session
                    ),
                )
            })
        } else if remaining <= 10 {
            state.issued.insert(Notice::Remaining10).then(|| {
                (
                    Level::Warning,
                    format!("Approaching session limit: {remaining} messages remaining."),
                )
            })
        } else if remaining <= 25 {
            state.issued.insert(Notice::Remaining25).then(|| {
                (
                    Level::Warning,
                    format!(
                        "Session message count: {}/{}",
                        state.total_user_messages, self.limits.max_per_session
                    ),
                )
            })
        } else {
            None
        };
        Ok(notice)
    }
}
