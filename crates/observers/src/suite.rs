//! Builds the full set of observers for one session.

use chatscout_config::{ObserverConfig, RateLimitPolicyConfig};
use chatscout_core::chat::ChatObserver;
use chatscout_core::error::ObserverError;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::{
    AnalyticsObserver, AuditTrail, CompositeObserver, HistoryRecorder, RateLimitPolicy,
    ToolTraceObserver, TracingSink,
};

/// Every observer of a session, plus the composite that feeds them.
///
/// A [`Chat`](chatscout_core::Chat) only holds observers weakly, so the suite
/// must outlive the chat it is registered on.
pub struct ObserverSuite {
    pub history: Arc<HistoryRecorder>,
    pub analytics: Arc<AnalyticsObserver>,
    pub rate_limit: Arc<RateLimitPolicy>,
    pub audit: Arc<AuditTrail>,
    pub tool_trace: Arc<ToolTraceObserver>,
    composite: Arc<dyn ChatObserver>,
}

impl ObserverSuite {
    /// Observers writing to the directories in `config`.
    pub fn create(config: &ObserverConfig, session: &str) -> Result<Self, ObserverError> {
        let suite = Self::build(
            session,
            &config.user_id,
            config.rate_limit.clone(),
            Some(config.history_dir.as_path()),
            Some(config.analytics_dir.as_path()),
            Some(config.audit_dir.as_path()),
        )?;
        info!(session, audit_session = %suite.audit.session_id(), "Observer suite created");
        Ok(suite)
    }

    /// Observers that keep their state in memory only.
    pub fn in_memory(
        session: &str,
        user_id: &str,
        limits: RateLimitPolicyConfig,
    ) -> Result<Self, ObserverError> {
        Self::build(session, user_id, limits, None, None, None)
    }

    fn build(
        session: &str,
        user_id: &str,
        limits: RateLimitPolicyConfig,
        history_dir: Option<&Path>,
        analytics_dir: Option<&Path>,
        audit_dir: Option<&Path>,
    ) -> Result<Self, ObserverError> {
        let history = Arc::new(HistoryRecorder::new(session, history_dir)?);
        let analytics = Arc::new(AnalyticsObserver::new(session, analytics_dir)?);
        let rate_limit = Arc::new(RateLimitPolicy::new(limits));
        let audit = Arc::new(AuditTrail::with_sinks(
            user_id,
            None,
            audit_dir,
            vec![Box::new(TracingSink)],
        )?);
        let tool_trace = Arc::new(ToolTraceObserver::new(session, analytics_dir)?);

        let composite: Arc<dyn ChatObserver> = Arc::new(CompositeObserver::new(vec![
            history.clone(),
            analytics.clone(),
            rate_limit.clone(),
            audit.clone(),
            tool_trace.clone(),
        ]));

        Ok(Self {
            history,
            analytics,
            rate_limit,
            audit,
            tool_trace,
            composite,
        })
    }

    /// The single observer to register on a chat.
    pub fn observer(&self) -> &Arc<dyn ChatObserver> {
        &self.composite
    }

    /// Close the session: stamp the history end and seal the audit trail.
    pub fn finish(&self, reason: &str) -> Result<(), ObserverError> {
        self.history.finish()?;
        self.audit.finish(reason)?;
        Ok(())
    }
}
