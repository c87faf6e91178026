//! Sandbox pool.
//!
//! Owns every live sandbox handle. Handles move through
//! `creating -> active -> (idle) -> terminated` and never come back from
//! `terminated`: a terminated handle is simply gone from the registry.
//!
//! All mutation goes through a single registry lock that is never held across
//! a remote call. Creation for one language is serialized with a double-checked
//! scan so concurrent callers on an empty pool usually share one sandbox.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use codegate_core::config::PoolConfig;
use codegate_core::{
    Error, EventEmitter, EventEnvelope, EventSeverity, EventType, Language, NoOpEventEmitter,
    Result, SandboxPayload,
};
use codegate_governance::metrics;

use crate::provider::{SandboxId, SandboxProvider};

/// A registered sandbox.
///
/// `id` is generated by the pool and is what callers see. `session` is the
/// provider's own reference and is only ever handed back to the provider.
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    pub id: SandboxId,
    pub session: SandboxId,
    pub language: Language,
    pub created_at: DateTime<Utc>,
    created: Instant,
    last_used: Instant,
    seq: u64,
}

impl SandboxHandle {
    fn new(session: SandboxId, language: Language, seq: u64) -> Self {
        let now = Instant::now();
        Self {
            id: SandboxId(format!("sbx-{}", Uuid::new_v4().simple())),
            session,
            language,
            created_at: Utc::now(),
            created: now,
            last_used: now,
            seq,
        }
    }

    fn touch(&mut self) {
        self.last_used = self.last_used.max(Instant::now());
    }

    /// Wall-clock time of the last acquisition.
    pub fn last_used(&self) -> DateTime<Utc> {
        let since_created = self.last_used.saturating_duration_since(self.created);
        self.created_at
            + chrono::Duration::from_std(since_created).unwrap_or_else(|_| chrono::Duration::zero())
    }

    /// Time since the last acquisition.
    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_used)
    }

    pub fn summary(&self) -> SandboxSummary {
        SandboxSummary {
            id: self.id.to_string(),
            language: self.language,
            created_at: self.created_at,
            last_used: self.last_used(),
            idle_secs: self.idle_for().as_secs(),
        }
    }
}

/// Point-in-time view of a handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SandboxSummary {
    pub id: String,
    pub language: Language,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub idle_secs: u64,
}

/// Outcome of [`SandboxPool::drain_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub terminated: usize,
    /// Handles whose remote teardown failed. They are unregistered anyway.
    pub failed: usize,
}

/// Why a handle is being terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Explicit,
    Idle,
    Drain,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Idle => "idle",
            Self::Drain => "drain",
        }
    }
}

pub struct SandboxPool {
    provider: Arc<dyn SandboxProvider>,
    config: PoolConfig,
    handles: Mutex<HashMap<SandboxId, SandboxHandle>>,
    creation_locks: HashMap<Language, Mutex<()>>,
    accepting: AtomicBool,
    next_seq: AtomicU64,
    event_emitter: Arc<dyn EventEmitter>,
}

impl SandboxPool {
    pub fn new(provider: Arc<dyn SandboxProvider>, config: PoolConfig) -> Self {
        Self {
            provider,
            config,
            handles: Mutex::new(HashMap::new()),
            creation_locks: Language::ALL
                .iter()
                .map(|lang| (*lang, Mutex::new(())))
                .collect(),
            accepting: AtomicBool::new(true),
            next_seq: AtomicU64::new(0),
            event_emitter: Arc::new(NoOpEventEmitter),
        }
    }

    /// Set an event emitter for lifecycle auditing.
    pub fn with_event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.event_emitter = emitter;
        self
    }

    pub fn provider(&self) -> &Arc<dyn SandboxProvider> {
        &self.provider
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether new sandboxes may still be created.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.lock().await.is_empty()
    }

    /// Provision and register a new sandbox.
    pub async fn create(&self, language: Language) -> Result<SandboxHandle> {
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let timeout = self.config.create_timeout();
        let session = match tokio::time::timeout(timeout, self.provider.create(language)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                tracing::warn!(%language, error = %e, "Sandbox creation failed");
                return Err(match e {
                    Error::ProvisioningFailed(_) => e,
                    other => Error::provisioning(other.to_string()),
                });
            }
            Err(_) => {
                tracing::warn!(%language, timeout_secs = timeout.as_secs(), "Sandbox creation timed out");
                return Err(Error::provisioning(format!(
                    "creating a {} sandbox timed out after {}s",
                    language,
                    timeout.as_secs()
                )));
            }
        };

        let handle = SandboxHandle::new(
            session.clone(),
            language,
            self.next_seq.fetch_add(1, Ordering::SeqCst),
        );
        let id = handle.id.clone();

        let active = {
            let mut handles = self.handles.lock().await;
            // Drain may have started while the provider was working.
            if !self.is_accepting() {
                drop(handles);
                if let Err(e) = self.provider.destroy(&session).await {
                    tracing::warn!(
                        session = %session,
                        error = %e,
                        "Failed to destroy sandbox created during shutdown"
                    );
                }
                return Err(Error::ShuttingDown);
            }
            // Never destroy a session a live handle still owns.
            if let Some(owner) = handles.values().find(|h| h.session == session) {
                tracing::error!(
                    session = %session,
                    owner = %owner.id,
                    "Provider returned a session that is already registered"
                );
                return Err(Error::provisioning(format!(
                    "provider returned session {} which is already in use",
                    session
                )));
            }
            handles.insert(id.clone(), handle.clone());
            handles.len()
        };

        tracing::info!(sandbox_id = %id, session = %session, %language, "Sandbox created");
        metrics::track_sandbox_created(language.as_str());
        metrics::set_active_sandboxes(active);
        self.emit_lifecycle(EventType::SandboxCreated, &id, language, "created", None)
            .await;

        Ok(handle)
    }

    /// Look up a handle, renewing its last-used time. Never creates.
    pub async fn get(&self, id: &SandboxId) -> Option<SandboxHandle> {
        let mut handles = self.handles.lock().await;
        handles.get_mut(id).map(|handle| {
            handle.touch();
            handle.clone()
        })
    }

    /// Reuse a sandbox for `language`, creating one if none exists.
    ///
    /// An `id` naming a handle of the same language wins; otherwise the oldest
    /// handle of that language is returned. Concurrent callers may share it.
    pub async fn get_or_create(
        &self,
        language: Language,
        id: Option<&SandboxId>,
    ) -> Result<SandboxHandle> {
        if let Some(id) = id {
            let mut handles = self.handles.lock().await;
            if let Some(handle) = handles.get_mut(id).filter(|h| h.language == language) {
                handle.touch();
                return Ok(handle.clone());
            }
        }

        // Fast path: reuse without taking the creation lock
        if let Some(handle) = self.acquire_first(language).await {
            return Ok(handle);
        }

        // Slow path: serialize creation per language
        let _guard = match self.creation_locks.get(&language) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        // Double-check after acquiring the creation lock
        if let Some(handle) = self.acquire_first(language).await {
            return Ok(handle);
        }

        self.create(language).await
    }

    async fn acquire_first(&self, language: Language) -> Option<SandboxHandle> {
        let mut handles = self.handles.lock().await;
        let handle = handles
            .values_mut()
            .filter(|h| h.language == language)
            .min_by_key(|h| h.seq)?;
        handle.touch();
        Some(handle.clone())
    }

    /// Terminate a sandbox. Returns whether it was registered.
    ///
    /// The handle is unregistered even when the remote teardown fails.
    pub async fn terminate(&self, id: &SandboxId) -> bool {
        self.terminate_with(id, TerminationReason::Explicit)
            .await
            .is_some()
    }

    /// `None` when the id is unknown, otherwise the remote teardown outcome.
    async fn terminate_with(
        &self,
        id: &SandboxId,
        reason: TerminationReason,
    ) -> Option<Result<()>> {
        let (handle, active) = {
            let mut handles = self.handles.lock().await;
            let handle = handles.remove(id)?;
            (handle, handles.len())
        };
        self.finish_termination(handle, reason, active).await
    }

    async fn finish_termination(
        &self,
        handle: SandboxHandle,
        reason: TerminationReason,
        active: usize,
    ) -> Option<Result<()>> {
        let outcome = self.provider.destroy(&handle.session).await;
        let error = match &outcome {
            Ok(()) => {
                tracing::info!(
                    sandbox_id = %handle.id,
                    language = %handle.language,
                    reason = reason.as_str(),
                    "Sandbox terminated"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    sandbox_id = %handle.id,
                    reason = reason.as_str(),
                    error = %e,
                    "Remote teardown failed; handle dropped from the pool"
                );
                Some(e.to_string())
            }
        };

        metrics::track_sandbox_terminated(reason.as_str());
        metrics::set_active_sandboxes(active);
        self.emit_lifecycle(
            EventType::SandboxTerminated,
            &handle.id,
            handle.language,
            reason.as_str(),
            error,
        )
        .await;

        Some(outcome)
    }

    /// Terminate every handle idle for longer than the configured threshold.
    pub async fn sweep_idle(&self) -> Vec<SandboxId> {
        let threshold = self.config.idle_timeout();
        let stale: Vec<SandboxHandle> = {
            let mut handles = self.handles.lock().await;
            let ids: Vec<SandboxId> = handles
                .values()
                .filter(|h| h.idle_for() > threshold)
                .map(|h| h.id.clone())
                .collect();
            ids.iter().filter_map(|id| handles.remove(id)).collect()
        };

        if stale.is_empty() {
            return Vec::new();
        }

        let remaining = self.len().await;
        tracing::debug!(count = stale.len(), "Evicting idle sandboxes");

        let ids: Vec<SandboxId> = stale.iter().map(|h| h.id.clone()).collect();
        join_all(
            stale
                .into_iter()
                .map(|h| self.finish_termination(h, TerminationReason::Idle, remaining)),
        )
        .await;
        ids
    }

    /// Stop accepting new sandboxes and terminate every handle concurrently.
    ///
    /// Individual teardown failures are logged and counted; the registry always
    /// ends up empty.
    pub async fn drain_all(&self) -> DrainReport {
        self.accepting.store(false, Ordering::SeqCst);

        let ids: Vec<SandboxId> = self.handles.lock().await.keys().cloned().collect();
        if ids.is_empty() {
            return DrainReport::default();
        }

        tracing::info!(count = ids.len(), "Draining sandbox pool");
        let outcomes = join_all(
            ids.iter()
                .map(|id| self.terminate_with(id, TerminationReason::Drain)),
        )
        .await;

        let mut report = DrainReport::default();
        for outcome in outcomes.into_iter().flatten() {
            report.terminated += 1;
            if outcome.is_err() {
                report.failed += 1;
            }
        }
        if report.failed > 0 {
            tracing::warn!(failed = report.failed, "Some sandboxes could not be torn down");
        }
        report
    }

    /// Snapshot of every registered handle in creation order.
    pub async fn list(&self) -> Vec<SandboxSummary> {
        let handles = self.handles.lock().await;
        let mut sorted: Vec<&SandboxHandle> = handles.values().collect();
        sorted.sort_by_key(|h| h.seq);
        sorted.into_iter().map(SandboxHandle::summary).collect()
    }

    async fn emit_lifecycle(
        &self,
        event_type: EventType,
        id: &SandboxId,
        language: Language,
        reason: &str,
        error: Option<String>,
    ) {
        let severity = if error.is_some() {
            EventSeverity::Warning
        } else {
            EventSeverity::Info
        };
        let payload = SandboxPayload {
            sandbox_id: id.to_string(),
            language: language.to_string(),
            reason: reason.to_string(),
            error,
        };
        self.event_emitter
            .emit(
                EventEnvelope::new(
                    event_type,
                    serde_json::to_value(payload).unwrap_or_else(|_| json!({})),
                )
                .with_actor("sandbox-pool")
                .with_severity(severity),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSandbox;

    fn pool_with(mock: Arc<MockSandbox>) -> SandboxPool {
        SandboxPool::new(mock, PoolConfig::default())
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock.clone());

        let created = pool.create(Language::JavaScript).await.unwrap();
        let fetched = pool.get(&created.id).await.unwrap();

        assert_eq!(fetched.language, Language::JavaScript);
        assert!(fetched.last_used() >= fetched.created_at);
        assert_eq!(mock.create_count(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_never_creates() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock.clone());
        assert!(pool.get(&SandboxId::from("nope")).await.is_none());
        assert_eq!(mock.create_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_create_registers_nothing() {
        let mock = Arc::new(MockSandbox::new());
        mock.set_fail_create(true);
        let pool = pool_with(mock);

        let err = pool.create(Language::Python).await.unwrap_err();
        assert!(matches!(err, Error::ProvisioningFailed(_)));
        assert!(pool.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_timeout() {
        let mock = Arc::new(MockSandbox::new());
        mock.set_create_delay(Duration::from_secs(120));
        let pool = pool_with(mock);

        let err = pool.create(Language::Python).await.unwrap_err();
        assert!(matches!(err, Error::ProvisioningFailed(_)));
        assert!(err.to_string().contains("timed out"));
        assert!(pool.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_create_reuses_and_renews() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock.clone());

        let first = pool.get_or_create(Language::Python, None).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = pool.get_or_create(Language::Python, None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(mock.create_count(), 1);
        assert!(second.last_used() > first.last_used());
    }

    #[tokio::test]
    async fn test_get_or_create_is_language_scoped() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock.clone());

        let py = pool.get_or_create(Language::Python, None).await.unwrap();
        let js = pool.get_or_create(Language::JavaScript, None).await.unwrap();
        assert_ne!(py.id, js.id);

        // An id of the wrong language falls back to the language scan
        let resolved = pool
            .get_or_create(Language::JavaScript, Some(&py.id))
            .await
            .unwrap();
        assert_eq!(resolved.id, js.id);
        assert_eq!(mock.create_count(), 2);
    }

    #[tokio::test]
    async fn test_get_or_create_prefers_explicit_id() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock.clone());

        let older = pool.create(Language::Python).await.unwrap();
        let newer = pool.create(Language::Python).await.unwrap();

        let by_id = pool
            .get_or_create(Language::Python, Some(&newer.id))
            .await
            .unwrap();
        assert_eq!(by_id.id, newer.id);

        let by_scan = pool.get_or_create(Language::Python, None).await.unwrap();
        assert_eq!(by_scan.id, older.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_get_or_create_shares_creation() {
        let mock = Arc::new(MockSandbox::new());
        mock.set_create_delay(Duration::from_millis(200));
        let pool = Arc::new(pool_with(mock.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.get_or_create(Language::Python, None).await })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(mock.create_count(), 1);
    }

    #[tokio::test]
    async fn test_terminate_unknown_is_noop() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock.clone());
        pool.create(Language::Python).await.unwrap();

        assert!(!pool.terminate(&SandboxId::from("ghost")).await);
        assert_eq!(pool.len().await, 1);
        assert_eq!(mock.destroy_count(), 0);
    }

    #[tokio::test]
    async fn test_terminate_removes_even_when_destroy_fails() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock.clone());
        let handle = pool.create(Language::Python).await.unwrap();

        mock.set_fail_destroy(true);
        assert!(pool.terminate(&handle.id).await);
        assert!(pool.get(&handle.id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_idle() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock.clone());

        let stale = pool.create(Language::Python).await.unwrap();
        tokio::time::advance(Duration::from_secs(240)).await;
        let fresh = pool.create(Language::JavaScript).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let evicted = pool.sweep_idle().await;
        assert_eq!(evicted, vec![stale.id.clone()]);
        assert!(pool.get(&stale.id).await.is_none());
        assert!(pool.get(&fresh.id).await.is_some());
        assert_eq!(mock.destroy_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_renews_against_sweep() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock);

        let handle = pool.create(Language::Python).await.unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;
        pool.get(&handle.id).await.unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;

        assert!(pool.sweep_idle().await.is_empty());
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_drain_all_with_failing_destroy() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock.clone());

        let a = pool.create(Language::Python).await.unwrap();
        pool.create(Language::Python).await.unwrap();
        pool.create(Language::JavaScript).await.unwrap();
        mock.fail_destroy_for(&a.session);

        let report = pool.drain_all().await;
        assert_eq!(report, DrainReport { terminated: 3, failed: 1 });
        assert!(pool.is_empty().await);
        assert_eq!(mock.destroy_count(), 2);
    }

    #[tokio::test]
    async fn test_no_creation_after_drain() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock.clone());
        pool.drain_all().await;

        assert!(matches!(
            pool.get_or_create(Language::Python, None).await,
            Err(Error::ShuttingDown)
        ));
        assert_eq!(mock.create_count(), 0);
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock);

        let a = pool.create(Language::JavaScript).await.unwrap();
        let b = pool.create(Language::Python).await.unwrap();

        let summaries = pool.list().await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, a.id.to_string());
        assert_eq!(summaries[1].id, b.id.to_string());
        assert_eq!(summaries[1].language, Language::Python);
        assert!(summaries.iter().all(|s| s.last_used >= s.created_at));
    }

    #[tokio::test]
    async fn test_ids_are_local_and_sessions_stay_remote() {
        let mock = Arc::new(MockSandbox::new());
        let pool = pool_with(mock.clone());

        let a = pool.create(Language::Python).await.unwrap();
        let b = pool.create(Language::Python).await.unwrap();

        assert_ne!(a.id, b.id);
        assert!(a.id.as_str().starts_with("sbx-"));
        assert_eq!(a.session.as_str(), "mock-python-1");
        assert!(pool.get(&a.session).await.is_none());

        assert!(pool.terminate(&a.id).await);
        assert_eq!(mock.destroy_count(), 1);
    }

    #[tokio::test]
    async fn test_reused_session_is_refused() {
        let mock = Arc::new(MockSandbox::new());
        mock.set_session_id("dup");
        let pool = pool_with(mock.clone());

        let a = pool.create(Language::Python).await.unwrap();
        let second = pool.create(Language::JavaScript).await;

        assert!(matches!(second, Err(Error::ProvisioningFailed(_))));
        assert_eq!(pool.len().await, 1);
        assert_eq!(pool.get(&a.id).await.unwrap().language, Language::Python);
        // The live handle's session must survive
        assert_eq!(mock.destroy_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_in_flight_when_drain_starts() {
        let mock = Arc::new(MockSandbox::new());
        mock.set_create_delay(Duration::from_secs(5));
        let pool = Arc::new(pool_with(mock.clone()));

        let creating = tokio::spawn({
            let pool = pool.clone();
            async move { pool.create(Language::Python).await }
        });
        // Let the create reach the provider before draining
        tokio::time::sleep(Duration::from_secs(1)).await;

        let report = pool.drain_all().await;
        assert_eq!(report, DrainReport::default());

        let result = creating.await.unwrap();
        assert!(matches!(result, Err(Error::ShuttingDown)));
        assert!(pool.is_empty().await);
        assert_eq!(mock.create_count(), 1);
        assert_eq!(mock.destroy_count(), 1);
    }
}
