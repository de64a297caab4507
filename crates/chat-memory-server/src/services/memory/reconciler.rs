use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::providers::{Agent, AgentRequest};
use super::session::{SessionMemory, SessionRegistry, SessionState};
use super::store::ConversationMemoryStore;
use super::types::HistoryEntry;
use crate::utils::MemoryError;

/// Where the history of the current turn came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySource {
    Caller,
    Store,
    Session,
}

/// Builds the history for each turn, runs the agent, records the outcome.
pub struct SessionReconciler {
    sessions: SessionRegistry,
    store: Arc<ConversationMemoryStore>,
    agent: Arc<dyn Agent>,
}

impl SessionReconciler {
    pub fn new(
        sessions: SessionRegistry,
        store: Arc<ConversationMemoryStore>,
        agent: Arc<dyn Agent>,
    ) -> Self {
        Self {
            sessions,
            store,
            agent,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Answer `question` for a known user.
    ///
    /// The user's session lock is held from history resolution until the
    /// turn has been written back. Only agent failures are returned.
    pub async fn resolve_and_invoke(
        &self,
        user_id: &str,
        question: &str,
        caller_history: Option<Vec<HistoryEntry>>,
    ) -> Result<String, MemoryError> {
        let mut session = self.sessions.lock(user_id).await;

        let source = self
            .populate(user_id, &mut session, caller_history.unwrap_or_default())
            .await;
        let history = session.history();
        debug!(
            "Resolved {} history entries for user {} from {:?}",
            history.len(),
            user_id,
            source
        );

        let output = self
            .invoke(question, history, Some(user_id.to_string()))
            .await?;

        session.push(HistoryEntry::new(question, output.clone()));

        match self.store.save_turn(user_id, question, &output).await {
            Ok(true) => debug!("Turn persisted for user {}", user_id),
            Ok(false) => debug!("Turn for user {} not persisted (duplicate or empty answer)", user_id),
            Err(e) => warn!("Failed to persist turn for user {}: {}", user_id, e),
        }

        Ok(output)
    }

    /// Answer without a user: caller history is the only context and
    /// nothing is remembered.
    pub async fn invoke_anonymous(
        &self,
        question: &str,
        caller_history: Option<Vec<HistoryEntry>>,
    ) -> Result<String, MemoryError> {
        let mut history = caller_history.unwrap_or_default();
        let window = self.sessions.window();
        if history.len() > window {
            history.drain(..history.len() - window);
        }
        self.invoke(question, history, None).await
    }

    /// Answer with no history at all and no session or store writes.
    pub async fn invoke_stateless(
        &self,
        question: &str,
        user_id: Option<&str>,
    ) -> Result<String, MemoryError> {
        self.invoke(question, Vec::new(), user_id.map(str::to_string))
            .await
    }

    async fn populate(
        &self,
        user_id: &str,
        session: &mut SessionMemory,
        caller_history: Vec<HistoryEntry>,
    ) -> HistorySource {
        if !caller_history.is_empty() {
            session.replay(caller_history);
            return HistorySource::Caller;
        }

        if session.state() == SessionState::Empty {
            match self.store.load_recent_default(user_id).await {
                Ok(turns) if !turns.is_empty() => {
                    info!("Warming session of user {} with {} stored turns", user_id, turns.len());
                    // Store order is newest first
                    session.replay(turns.iter().rev().map(|t| t.to_history_entry()));
                    return HistorySource::Store;
                }
                Ok(_) => {}
                Err(e) => warn!("Could not load stored history for user {}: {}", user_id, e),
            }
        }

        HistorySource::Session
    }

    async fn invoke(
        &self,
        question: &str,
        history: Vec<HistoryEntry>,
        user_id: Option<String>,
    ) -> Result<String, MemoryError> {
        self.agent
            .run(AgentRequest {
                question: question.to_string(),
                history,
                user_id,
            })
            .await
            .map_err(|e| {
                error!("Agent failed: {:#}", e);
                MemoryError::AgentFailure(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::providers::MockAgent;
    use crate::services::memory::test_support::{fixture, RecordingAgent};
    use chrono::{Duration, TimeZone, Utc};

    fn reconciler(
        store: Arc<ConversationMemoryStore>,
        agent: Arc<dyn Agent>,
        window: usize,
    ) -> SessionReconciler {
        SessionReconciler::new(SessionRegistry::new(window), store, agent)
    }

    #[tokio::test]
    async fn test_cold_session_replays_store_chronologically() {
        let fx = fixture();
        let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        fx.store.save_turn_at("u1", "订单状态?", "已发货", t1).await.unwrap();
        fx.store
            .save_turn_at("u1", "退货流程?", "填写退货单", t1 + Duration::minutes(1))
            .await
            .unwrap();
        fx.store
            .save_turn_at("u1", "how long is shipping", "three days", t1 + Duration::minutes(2))
            .await
            .unwrap();

        let agent = Arc::new(RecordingAgent::default());
        let reconciler = reconciler(fx.store.clone(), agent.clone(), 30);

        let output = reconciler.resolve_and_invoke("u1", "thanks!", None).await.unwrap();
        assert_eq!(output, "reply:thanks!");

        let requests = agent.requests.lock();
        let users: Vec<_> = requests[0].history.iter().map(|h| h.user.as_str()).collect();
        assert_eq!(users, vec!["订单状态?", "退货流程?", "how long is shipping"]);
        assert_eq!(requests[0].user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_caller_history_wins_over_store() {
        let fx = fixture();
        fx.store.save_turn("u1", "订单状态?", "已发货").await.unwrap();

        let agent = Arc::new(RecordingAgent::default());
        let reconciler = reconciler(fx.store.clone(), agent.clone(), 30);

        let supplied = vec![HistoryEntry::new("hello", "hi there")];
        reconciler
            .resolve_and_invoke("u1", "what now", Some(supplied.clone()))
            .await
            .unwrap();

        assert_eq!(agent.requests.lock()[0].history, supplied);
    }

    #[tokio::test]
    async fn test_warm_session_is_not_reloaded() {
        let fx = fixture();
        let agent = Arc::new(RecordingAgent::default());
        let reconciler = reconciler(fx.store.clone(), agent.clone(), 30);

        reconciler.resolve_and_invoke("u1", "订单状态?", None).await.unwrap();
        // Written behind the session's back; a warm session must not pick it up
        fx.store.save_turn("u1", "zzzz yyyy", "xxxx wwww").await.unwrap();
        reconciler.resolve_and_invoke("u1", "退货流程?", None).await.unwrap();

        let requests = agent.requests.lock();
        assert!(requests[0].history.is_empty());
        assert_eq!(
            requests[1].history,
            vec![HistoryEntry::new("订单状态?", "reply:订单状态?")]
        );
    }

    #[tokio::test]
    async fn test_session_window_bound_over_many_turns() {
        let fx = fixture();
        let agent = Arc::new(RecordingAgent::default());
        let window = 4;
        let reconciler = reconciler(fx.store.clone(), agent.clone(), window);

        for i in 0..window + 5 {
            reconciler
                .resolve_and_invoke("u1", &format!("question {}", i), None)
                .await
                .unwrap();
        }

        let session = reconciler.sessions().lock("u1").await;
        assert_eq!(session.len(), window);
        let users: Vec<_> = session.history().into_iter().map(|h| h.user).collect();
        let expected: Vec<_> = (5..window + 5).map(|i| format!("question {}", i)).collect();
        assert_eq!(users, expected);
    }

    #[tokio::test]
    async fn test_agent_failure_propagates_and_writes_nothing() {
        let fx = fixture();
        let mut agent = MockAgent::new();
        agent
            .expect_run()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("model overloaded")));
        let reconciler = reconciler(fx.store.clone(), Arc::new(agent), 30);

        let err = reconciler
            .resolve_and_invoke("u1", "订单状态?", None)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::AgentFailure(_)));
        assert!(fx.index.is_empty());
        assert!(reconciler.sessions().lock("u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_does_not_block_turn() {
        let fx = fixture();
        fx.embedder.set_failing(true);
        let agent = Arc::new(RecordingAgent::default());
        let reconciler = reconciler(fx.store.clone(), agent.clone(), 30);

        let output = reconciler.resolve_and_invoke("u1", "订单状态?", None).await.unwrap();
        assert_eq!(output, "reply:订单状态?");
        assert!(fx.index.is_empty());
        assert_eq!(reconciler.sessions().lock("u1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_and_stateless_turns_touch_nothing() {
        let fx = fixture();
        let agent = Arc::new(RecordingAgent::default());
        let reconciler = reconciler(fx.store.clone(), agent.clone(), 2);

        let supplied: Vec<_> = (0..3)
            .map(|i| HistoryEntry::new(format!("q{}", i), format!("a{}", i)))
            .collect();
        reconciler
            .invoke_anonymous("hello", Some(supplied.clone()))
            .await
            .unwrap();
        reconciler.invoke_stateless("hello", Some("u1")).await.unwrap();

        let requests = agent.requests.lock();
        assert_eq!(requests[0].history, supplied[1..].to_vec());
        assert!(requests[0].user_id.is_none());
        assert!(requests[1].history.is_empty());
        assert!(fx.index.is_empty());
        assert_eq!(reconciler.sessions().stats().active_sessions, 0);
    }

    #[tokio::test]
    async fn test_empty_agent_reply_stays_out_of_store() {
        let fx = fixture();
        let mut agent = MockAgent::new();
        agent.expect_run().times(1).returning(|_| Ok(String::new()));
        let reconciler = reconciler(fx.store.clone(), Arc::new(agent), 30);

        let output = reconciler.resolve_and_invoke("u1", "订单状态?", None).await.unwrap();
        assert_eq!(output, "");
        assert!(fx.index.is_empty());
        assert_eq!(reconciler.sessions().lock("u1").await.len(), 1);
    }
}
