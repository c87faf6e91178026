//! In-memory provider for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use codegate_core::{Error, Language, Result};

use crate::provider::{Execution, FileEntry, SandboxId, SandboxProvider};

/// Code submitted to [`MockSandbox::run_code`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub sandbox_id: SandboxId,
    pub language: Language,
    pub code: String,
}

/// Scripted in-memory sandbox provider.
///
/// Executions are answered from a queue (falling back to an empty success),
/// files live in a per-sandbox map, and failures can be switched on per
/// operation.
#[derive(Default)]
pub struct MockSandbox {
    executions: Mutex<VecDeque<Execution>>,
    files: Mutex<HashMap<SandboxId, HashMap<String, String>>>,
    runs: Mutex<Vec<RecordedRun>>,
    failing_destroys: Mutex<HashSet<SandboxId>>,
    fail_create: AtomicBool,
    fail_destroy: AtomicBool,
    create_delay: Mutex<Option<Duration>>,
    run_delay: Mutex<Option<Duration>>,
    next_id: AtomicUsize,
    fixed_session: Mutex<Option<String>>,
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue executions returned by successive `run_code` calls.
    pub fn with_executions(executions: Vec<Execution>) -> Self {
        let mock = Self::default();
        if let Ok(mut queue) = mock.executions.lock() {
            queue.extend(executions);
        }
        mock
    }

    pub fn push_execution(&self, execution: Execution) {
        if let Ok(mut queue) = self.executions.lock() {
            queue.push_back(execution);
        }
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }

    /// Make destroy fail for one sandbox only.
    pub fn fail_destroy_for(&self, id: &SandboxId) {
        if let Ok(mut ids) = self.failing_destroys.lock() {
            ids.insert(id.clone());
        }
    }

    /// Make every create return the same session reference.
    pub fn set_session_id(&self, session: &str) {
        if let Ok(mut slot) = self.fixed_session.lock() {
            *slot = Some(session.to_string());
        }
    }

    pub fn set_create_delay(&self, delay: Duration) {
        if let Ok(mut slot) = self.create_delay.lock() {
            *slot = Some(delay);
        }
    }

    pub fn set_run_delay(&self, delay: Duration) {
        if let Ok(mut slot) = self.run_delay.lock() {
            *slot = Some(delay);
        }
    }

    /// Seed a file into a sandbox.
    pub fn put_file(&self, id: &SandboxId, path: &str, content: &str) {
        if let Ok(mut files) = self.files.lock() {
            files
                .entry(id.clone())
                .or_default()
                .insert(path.to_string(), content.to_string());
        }
    }

    pub fn file(&self, id: &SandboxId, path: &str) -> Option<String> {
        self.files
            .lock()
            .ok()
            .and_then(|files| files.get(id).and_then(|f| f.get(path).cloned()))
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn create_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().map(|r| r.len()).unwrap_or_default()
    }

    fn delay(slot: &Mutex<Option<Duration>>) -> Option<Duration> {
        slot.lock().ok().and_then(|d| *d)
    }
}

#[async_trait]
impl SandboxProvider for MockSandbox {
    async fn create(&self, language: Language) -> Result<SandboxId> {
        if let Some(delay) = Self::delay(&self.create_delay) {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::provisioning("mock provider refused to create a sandbox"));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.created.fetch_add(1, Ordering::SeqCst);
        let fixed = self.fixed_session.lock().ok().and_then(|s| s.clone());
        Ok(SandboxId(
            fixed.unwrap_or_else(|| format!("mock-{}-{}", language, n)),
        ))
    }

    async fn destroy(&self, id: &SandboxId) -> Result<()> {
        let targeted = self
            .failing_destroys
            .lock()
            .map(|ids| ids.contains(id))
            .unwrap_or(false);
        if targeted || self.fail_destroy.load(Ordering::SeqCst) {
            return Err(Error::remote(format!("mock destroy failed for {}", id)));
        }
        if let Ok(mut files) = self.files.lock() {
            files.remove(id);
        }
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run_code(
        &self,
        id: &SandboxId,
        language: Language,
        code: &str,
        _timeout: Duration,
    ) -> Result<Execution> {
        if let Ok(mut runs) = self.runs.lock() {
            runs.push(RecordedRun {
                sandbox_id: id.clone(),
                language,
                code: code.to_string(),
            });
        }
        if let Some(delay) = Self::delay(&self.run_delay) {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .executions
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        Ok(next.unwrap_or_default())
    }

    async fn write_file(&self, id: &SandboxId, path: &str, content: &str) -> Result<()> {
        self.put_file(id, path, content);
        Ok(())
    }

    async fn read_file(&self, id: &SandboxId, path: &str) -> Result<String> {
        self.file(id, path)
            .ok_or_else(|| Error::remote(format!("File not found in mock sandbox: {}", path)))
    }

    async fn list_directory(&self, id: &SandboxId, path: &str) -> Result<Vec<FileEntry>> {
        let prefix = match path.trim_end_matches('/') {
            "" | "." => String::new(),
            dir => format!("{}/", dir),
        };

        let files = self
            .files
            .lock()
            .map_err(|_| Error::internal("mock file table poisoned"))?;
        let mut entries: Vec<FileEntry> = files
            .get(id)
            .map(|f| {
                f.keys()
                    .filter_map(|p| p.strip_prefix(prefix.as_str()).map(|rest| (p, rest)))
                    .filter(|(_, rest)| !rest.contains('/'))
                    .map(|(p, rest)| FileEntry {
                        name: rest.to_string(),
                        path: p.clone(),
                        is_dir: false,
                    })
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_sandbox_lifecycle() {
        let mock = MockSandbox::with_executions(vec![Execution::stdout("Hello\n")]);

        let id = mock.create(Language::Python).await.unwrap();
        mock.write_file(&id, "test.txt", "hello world").await.unwrap();
        assert_eq!(mock.read_file(&id, "test.txt").await.unwrap(), "hello world");

        let result = mock
            .run_code(&id, Language::Python, "print('Hello')", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.combined_output(), "Hello");
        assert_eq!(mock.runs()[0].code, "print('Hello')");

        mock.destroy(&id).await.unwrap();
        assert_eq!(mock.create_count(), 1);
        assert_eq!(mock.destroy_count(), 1);
        assert!(mock.read_file(&id, "test.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_list_directory_is_one_level() {
        let mock = MockSandbox::new();
        let id = SandboxId::from("sbx");
        mock.put_file(&id, "a.py", "");
        mock.put_file(&id, "src/b.py", "");
        mock.put_file(&id, "src/deep/c.py", "");

        let root = mock.list_directory(&id, ".").await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].name, "a.py");

        let src = mock.list_directory(&id, "src/").await.unwrap();
        assert_eq!(src.len(), 1);
        assert_eq!(src[0].path, "src/b.py");
    }

    #[tokio::test]
    async fn test_configured_failures() {
        let mock = MockSandbox::new();
        let a = mock.create(Language::Python).await.unwrap();
        let b = mock.create(Language::Python).await.unwrap();
        assert_ne!(a, b);

        mock.fail_destroy_for(&a);
        assert!(mock.destroy(&a).await.is_err());
        assert!(mock.destroy(&b).await.is_ok());

        mock.set_fail_create(true);
        assert!(matches!(
            mock.create(Language::JavaScript).await,
            Err(Error::ProvisioningFailed(_))
        ));
    }
}
