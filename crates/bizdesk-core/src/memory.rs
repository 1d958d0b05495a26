//! Thread memory
//!
//! Keeps the recent exchange of each chat thread plus a rolling summary of
//! everything older. Once the stored text grows past `text_limit`, all but
//! the newest `keep_messages` messages are folded into the summary, so the
//! retained context stays bounded. Threads idle longer than `ttl_secs` are
//! forgotten.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use bizdesk_store::{Store, ThreadRecord};

use crate::providers::{ChatMessage, ChatRole, LlmProvider};

const CLIP_CHARS: usize = 180;
const SUMMARY_MAX_TOKENS: u32 = 220;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_text_limit")]
    pub text_limit: usize,
    #[serde(default = "default_keep_messages")]
    pub keep_messages: usize,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
}

fn default_ttl_secs() -> u64 {
    604_800
}

fn default_text_limit() -> usize {
    20_000
}

fn default_keep_messages() -> usize {
    8
}

fn default_summary_max_chars() -> usize {
    8_000
}

fn default_max_threads() -> usize {
    1_000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            text_limit: default_text_limit(),
            keep_messages: default_keep_messages(),
            summary_max_chars: default_summary_max_chars(),
            max_threads: default_max_threads(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: ChatRole,
    pub content: String,
    pub ts: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
    #[serde(default)]
    pub updated_at: i64,
}

impl ThreadState {
    /// Characters held by the summary and every message
    pub fn total_chars(&self) -> usize {
        self.summary.chars().count()
            + self
                .messages
                .iter()
                .map(|m| m.content.chars().count())
                .sum::<usize>()
    }
}

/// Where thread states live between requests
#[async_trait]
pub trait ThreadBackend: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>>;
    async fn save(&self, thread_id: &str, state: &ThreadState) -> Result<()>;
    async fn remove(&self, thread_id: &str) -> Result<()>;
}

/// Process-local threads, least recently used evicted first
pub struct LruBackend {
    threads: Mutex<LruCache<String, ThreadState>>,
}

impl LruBackend {
    pub fn new(max_threads: usize) -> Self {
        let cap = NonZeroUsize::new(max_threads).unwrap_or(NonZeroUsize::MIN);
        Self {
            threads: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn len(&self) -> usize {
        self.threads.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ThreadBackend for LruBackend {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>> {
        let mut threads = self.threads.lock().unwrap_or_else(|p| p.into_inner());
        Ok(threads.get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &str, state: &ThreadState) -> Result<()> {
        let mut threads = self.threads.lock().unwrap_or_else(|p| p.into_inner());
        if let Some((evicted, _)) = threads.push(thread_id.to_string(), state.clone())
            && evicted != thread_id
        {
            debug!("Evicted thread {} from memory", evicted);
        }
        Ok(())
    }

    async fn remove(&self, thread_id: &str) -> Result<()> {
        self.threads
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop(thread_id);
        Ok(())
    }
}

/// Threads persisted in the `thread_memory` table
pub struct SqliteBackend {
    store: Store,
}

impl SqliteBackend {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Delete rows last written before `cutoff` (unix seconds)
    pub async fn purge_before(&self, cutoff: i64) -> Result<usize> {
        self.store.purge_threads_before(cutoff).await
    }
}

#[async_trait]
impl ThreadBackend for SqliteBackend {
    async fn load(&self, thread_id: &str) -> Result<Option<ThreadState>> {
        let Some(record) = self.store.load_thread(thread_id).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&record.payload) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!("Discarding unreadable thread {}: {}", thread_id, e);
                Ok(None)
            }
        }
    }

    async fn save(&self, thread_id: &str, state: &ThreadState) -> Result<()> {
        let payload = serde_json::to_string(state).context("Failed to encode thread state")?;
        self.store
            .save_thread(ThreadRecord {
                thread_id: thread_id.to_string(),
                payload,
                updated_at: state.updated_at,
            })
            .await
    }

    async fn remove(&self, thread_id: &str) -> Result<()> {
        self.store.delete_thread(thread_id).await?;
        Ok(())
    }
}

/// Folds old messages into a summary
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, summary: &str, old: &[StoredMessage]) -> Result<String>;
}

/// Bullet list of clipped messages under a "Compressed thread summary:" header
pub fn local_summary(summary: &str, old: &[StoredMessage]) -> String {
    let mut lines = Vec::new();
    if !summary.trim().is_empty() {
        lines.push(summary.trim().to_string());
    }
    lines.push("Compressed thread summary:".to_string());
    for m in old {
        let who = if m.role == ChatRole::User { "User" } else { "Assistant" };
        let mut content = m.content.trim().replace('\n', " ");
        if content.chars().count() > CLIP_CHARS {
            content = content.chars().take(CLIP_CHARS).collect::<String>() + "...";
        }
        if !content.is_empty() {
            lines.push(format!("- {}: {}", who, content));
        }
    }
    lines.join("\n").trim().to_string()
}

pub struct LocalSummarizer;

#[async_trait]
impl Summarizer for LocalSummarizer {
    async fn summarize(&self, summary: &str, old: &[StoredMessage]) -> Result<String> {
        Ok(local_summary(summary, old))
    }
}

/// Asks the model for a short factual recap
pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, summary: &str, old: &[StoredMessage]) -> Result<String> {
        let turns: Vec<String> = old
            .iter()
            .map(|m| {
                let who = if m.role == ChatRole::User { "User" } else { "Assistant" };
                format!("{}: {}", who, m.content.trim())
            })
            .collect();
        let prompt = format!(
            "Existing summary:\n{}\n\nMessages:\n{}",
            if summary.trim().is_empty() { "(none)" } else { summary.trim() },
            turns.join("\n")
        );
        let system = "Summarise the prior conversation for assistant continuity. Keep it compact \
                      and factual, six to ten bullets at most, with key entities, ids, periods \
                      and user preferences. Do not add new facts.";
        let response = self
            .provider
            .chat_capped(&[ChatMessage::user(prompt)], &[], system, SUMMARY_MAX_TOKENS)
            .await?;
        let text = response.text().trim().to_string();
        Ok(if text.is_empty() { summary.to_string() } else { text })
    }
}

/// Last `max` characters of `s`
fn keep_tail(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max {
        return s.to_string();
    }
    s.chars().skip(len - max).collect()
}

pub struct ThreadMemory {
    backend: Arc<dyn ThreadBackend>,
    config: MemoryConfig,
}

impl ThreadMemory {
    pub fn new(backend: Arc<dyn ThreadBackend>, config: MemoryConfig) -> Self {
        Self { backend, config }
    }

    pub fn in_memory(config: MemoryConfig) -> Self {
        let backend = Arc::new(LruBackend::new(config.max_threads));
        Self::new(backend, config)
    }

    pub fn sqlite(store: Store, config: MemoryConfig) -> Self {
        Self::new(Arc::new(SqliteBackend::new(store)), config)
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub async fn load(&self, thread_id: &str) -> Result<ThreadState> {
        self.load_at(thread_id, chrono::Utc::now().timestamp()).await
    }

    async fn load_at(&self, thread_id: &str, now: i64) -> Result<ThreadState> {
        if thread_id.is_empty() {
            return Ok(ThreadState::default());
        }
        match self.backend.load(thread_id).await? {
            Some(state) if now - state.updated_at > self.config.ttl_secs as i64 => {
                info!("Thread {} expired, starting fresh", thread_id);
                self.backend.remove(thread_id).await?;
                Ok(ThreadState::default())
            }
            Some(state) => Ok(state),
            None => Ok(ThreadState::default()),
        }
    }

    /// Summary as a system preamble, then the retained messages
    pub async fn context_for(&self, thread_id: &str) -> Result<Vec<ChatMessage>> {
        let state = self.load(thread_id).await?;
        Ok(Self::to_messages(&state))
    }

    pub fn to_messages(state: &ThreadState) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(state.messages.len() + 1);
        if !state.summary.trim().is_empty() {
            out.push(ChatMessage::system(format!(
                "Summary of the earlier conversation:\n{}",
                state.summary
            )));
        }
        for m in &state.messages {
            out.push(match m.role {
                ChatRole::User => ChatMessage::user(m.content.clone()),
                _ => ChatMessage::assistant(m.content.clone()),
            });
        }
        out
    }

    pub async fn append_turn(
        &self,
        thread_id: &str,
        user: &str,
        assistant: &str,
        summarizer: Option<&dyn Summarizer>,
    ) -> Result<()> {
        self.append_turn_at(thread_id, user, assistant, summarizer, chrono::Utc::now().timestamp())
            .await
    }

    async fn append_turn_at(
        &self,
        thread_id: &str,
        user: &str,
        assistant: &str,
        summarizer: Option<&dyn Summarizer>,
        now: i64,
    ) -> Result<()> {
        let (user, assistant) = (user.trim(), assistant.trim());
        if thread_id.is_empty() || (user.is_empty() && assistant.is_empty()) {
            return Ok(());
        }

        let mut state = self.load_at(thread_id, now).await?;
        for (role, content) in [(ChatRole::User, user), (ChatRole::Assistant, assistant)] {
            if !content.is_empty() {
                state.messages.push(StoredMessage {
                    role,
                    content: content.to_string(),
                    ts: now,
                });
            }
        }
        self.compact(&mut state, summarizer).await;
        state.updated_at = now;
        self.backend.save(thread_id, &state).await
    }

    pub async fn clear(&self, thread_id: &str) -> Result<()> {
        self.backend.remove(thread_id).await
    }

    async fn compact(&self, state: &mut ThreadState, summarizer: Option<&dyn Summarizer>) {
        let limit = self.config.text_limit;
        let keep = self.config.keep_messages;
        if state.total_chars() <= limit || state.messages.len() <= keep {
            return;
        }

        let len = state.messages.len();
        let mut split = len - keep;
        let mut kept_chars: usize = state.messages[split..]
            .iter()
            .map(|m| m.content.chars().count())
            .sum();
        // the newest message always survives
        while kept_chars > limit && split < len - 1 {
            kept_chars -= state.messages[split].content.chars().count();
            split += 1;
        }
        let old: Vec<StoredMessage> = state.messages.drain(..split).collect();

        let summary = match summarizer {
            Some(s) => match s.summarize(&state.summary, &old).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Summary generation failed, using local summary: {}", e);
                    local_summary(&state.summary, &old)
                }
            },
            None => local_summary(&state.summary, &old),
        };
        let summary = keep_tail(&summary, self.config.summary_max_chars);
        state.summary = keep_tail(&summary, limit.saturating_sub(kept_chars));
        debug!(
            "Compacted {} message(s), {} kept, summary {} chars",
            old.len(),
            state.messages.len(),
            state.summary.chars().count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ScriptedProvider, Step};
    use anyhow::anyhow;

    fn small(limit: usize, keep: usize) -> MemoryConfig {
        MemoryConfig {
            text_limit: limit,
            keep_messages: keep,
            ..Default::default()
        }
    }

    struct Failing;

    #[async_trait]
    impl Summarizer for Failing {
        async fn summarize(&self, _: &str, _: &[StoredMessage]) -> Result<String> {
            Err(anyhow!("model offline"))
        }
    }

    #[tokio::test]
    async fn test_append_and_context() {
        let memory = ThreadMemory::in_memory(MemoryConfig::default());
        memory.append_turn("t1", "where is order 7?", "It shipped yesterday.", None).await.unwrap();
        memory.append_turn("t1", "  ", "", None).await.unwrap();

        let ctx = memory.context_for("t1").await.unwrap();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx[0].role, ChatRole::User);
        assert_eq!(ctx[1].text(), "It shipped yesterday.");
        assert!(memory.context_for("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compaction_keeps_recent_messages() {
        let memory = ThreadMemory::in_memory(small(100, 2));
        for i in 0..3 {
            memory
                .append_turn("t", &format!("question {} {}", i, "x".repeat(20)), "answer", None)
                .await
                .unwrap();
        }
        let state = memory.load("t").await.unwrap();
        assert_eq!(state.messages.len(), 2);
        // the summary is clipped from the front to fit the limit
        assert!(state.summary.contains("- User: question 1"));
        assert!(state.summary.ends_with("- Assistant: answer"));
        assert!(!state.summary.contains("question 0"));
        assert_eq!(state.total_chars(), 100);

        let ctx = ThreadMemory::to_messages(&state);
        assert_eq!(ctx[0].role, ChatRole::System);
        assert_eq!(ctx.len(), 3);
    }

    #[tokio::test]
    async fn test_oversized_kept_messages_are_folded() {
        let memory = ThreadMemory::in_memory(small(50, 4));
        memory.append_turn("t", &"a".repeat(30), &"b".repeat(30), None).await.unwrap();
        memory.append_turn("t", &"c".repeat(30), "ok", None).await.unwrap();
        // four messages, nothing beyond keep_messages yet
        assert_eq!(memory.load("t").await.unwrap().messages.len(), 4);

        memory.append_turn("t", &"d".repeat(40), "fine", None).await.unwrap();
        let state = memory.load("t").await.unwrap();
        assert!(state.total_chars() <= 50);
        assert_eq!(state.messages.last().unwrap().content, "fine");
    }

    #[tokio::test]
    async fn test_summarizer_and_failure_fallback() {
        let provider = Arc::new(ScriptedProvider::new(vec![Step::text("- asked about loan 7")]));
        let llm = LlmSummarizer::new(provider.clone());
        let memory = ThreadMemory::in_memory(small(50, 2));
        memory.append_turn("t", "status of loan 7?", "Active.", Some(&llm)).await.unwrap();
        memory.append_turn("t", "and the next due date?", "The 5th.", Some(&llm)).await.unwrap();
        let state = memory.load("t").await.unwrap();
        assert_eq!(state.summary, "- asked about loan 7");
        assert_eq!(provider.calls()[0].max_tokens, Some(SUMMARY_MAX_TOKENS));

        let memory = ThreadMemory::in_memory(small(50, 2));
        memory.append_turn("t", "status of loan 7?", "Active.", Some(&Failing)).await.unwrap();
        memory.append_turn("t", "and the next due date?", "The 5th.", Some(&Failing)).await.unwrap();
        let state = memory.load("t").await.unwrap();
        assert_eq!(state.summary, "- Assistant: Active.");
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let memory = ThreadMemory::in_memory(MemoryConfig::default());
        memory.append_turn_at("t", "hi", "hello", None, 1_000).await.unwrap();
        assert_eq!(memory.load_at("t", 1_000 + 604_800).await.unwrap().messages.len(), 2);
        assert!(memory.load_at("t", 1_001 + 604_800).await.unwrap().messages.is_empty());
        // the expired entry is gone for good
        assert!(memory.load_at("t", 1_000).await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let backend = Arc::new(LruBackend::new(2));
        let memory = ThreadMemory::new(backend.clone(), MemoryConfig::default());
        for id in ["a", "b", "c"] {
            memory.append_turn(id, "q", "a", None).await.unwrap();
        }
        assert_eq!(backend.len(), 2);
        assert!(memory.load("a").await.unwrap().messages.is_empty());
        assert_eq!(memory.load("c").await.unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_sqlite_backend_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let memory = ThreadMemory::sqlite(store.clone(), MemoryConfig::default());
        memory.append_turn("s1", "trial balance please", "Balanced.", None).await.unwrap();

        let reopened = ThreadMemory::sqlite(store.clone(), MemoryConfig::default());
        assert_eq!(reopened.context_for("s1").await.unwrap().len(), 2);

        reopened.clear("s1").await.unwrap();
        assert!(store.load_thread("s1").await.unwrap().is_none());
    }

    #[test]
    fn test_local_summary_clips() {
        let old = vec![
            StoredMessage {
                role: ChatRole::User,
                content: format!("{}\nline", "x".repeat(200)),
                ts: 0,
            },
            StoredMessage {
                role: ChatRole::Assistant,
                content: "   ".into(),
                ts: 0,
            },
        ];
        let summary = local_summary("Earlier bits", &old);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "Earlier bits");
        assert_eq!(lines[1], "Compressed thread summary:");
        assert_eq!(lines[2], format!("- User: {}...", "x".repeat(180)));
        assert_eq!(lines.len(), 3);
    }
}
