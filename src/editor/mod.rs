//! Editor session support: the draft being edited as a plain value, and a
//! debounced auto-saver that writes it back through a [`DraftSink`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::content::{normalize_keyword_list, ContentStore, PostUpdate};
use crate::db::models::{Post, PostLength, Section, SeoMetadata};
use crate::error::AppError;
use crate::gateway::GenerationBrief;

pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(1500);

/// The post as the editor holds it. Every edit produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: Option<Uuid>,
    pub title: String,
    pub introduction: String,
    pub body: String,
    pub conclusion: String,
    pub keywords: Vec<String>,
    pub tone: String,
    pub audience: String,
    pub length: PostLength,
    pub seo: Option<SeoMetadata>,
}

impl From<Post> for Draft {
    fn from(post: Post) -> Self {
        Self {
            id: Some(post.id),
            title: post.title,
            introduction: post.introduction,
            body: post.body,
            conclusion: post.conclusion,
            keywords: post.keywords,
            tone: post.tone,
            audience: post.audience,
            length: post.length,
            seo: post.seo,
        }
    }
}

impl Draft {
    pub fn section(&self, section: Section) -> &str {
        match section {
            Section::Introduction => &self.introduction,
            Section::Body => &self.body,
            Section::Conclusion => &self.conclusion,
        }
    }

    pub fn with_section(mut self, section: Section, text: impl Into<String>) -> Self {
        let text = text.into();
        match section {
            Section::Introduction => self.introduction = text,
            Section::Body => self.body = text,
            Section::Conclusion => self.conclusion = text,
        }
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Takes the keyword field as typed (comma-separated).
    pub fn with_keywords(mut self, raw: &str) -> Self {
        self.keywords = normalize_keyword_list(raw.split(','));
        self
    }

    pub fn with_seo(mut self, seo: Option<SeoMetadata>) -> Self {
        self.seo = seo;
        self
    }

    /// Brief for regenerating one of this draft's sections.
    pub fn brief(&self) -> GenerationBrief {
        GenerationBrief {
            title: self.title.clone(),
            keywords: Some(self.keywords.join(", ")).filter(|k| !k.is_empty()),
            tone: self.tone.clone(),
            audience: self.audience.clone(),
            length: self.length,
        }
    }

    /// Full replacement of every editable field.
    pub fn to_update(&self) -> PostUpdate {
        PostUpdate {
            title: Some(self.title.clone()),
            introduction: Some(self.introduction.clone()),
            body: Some(self.body.clone()),
            conclusion: Some(self.conclusion.clone()),
            keywords: Some(self.keywords.clone()),
            seo: Some(self.seo.clone()),
            tone: Some(self.tone.clone()),
            audience: Some(self.audience.clone()),
            length: Some(self.length),
        }
    }
}

/// Where drafts are saved. Returns the stored `updated_at`.
#[async_trait]
pub trait DraftSink: Send + Sync {
    async fn save(&self, draft: &Draft) -> Result<DateTime<Utc>, AppError>;
}

/// Saves drafts of one user's posts through the content store.
pub struct ContentDraftSink {
    content: Arc<ContentStore>,
    owner: Uuid,
}

impl ContentDraftSink {
    pub fn new(content: Arc<ContentStore>, owner: Uuid) -> Self {
        Self { content, owner }
    }
}

#[async_trait]
impl DraftSink for ContentDraftSink {
    async fn save(&self, draft: &Draft) -> Result<DateTime<Utc>, AppError> {
        let id = draft
            .id
            .ok_or_else(|| AppError::ValidationError("Draft has not been created yet".into()))?;
        let post = self.content.update(self.owner, id, &draft.to_update()).await?;
        Ok(post.updated_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Saving,
    Saved,
    Error,
}

struct Shared {
    sink: Arc<dyn DraftSink>,
    latest: Mutex<Option<Draft>>,
    state: Mutex<SaveState>,
}

impl Shared {
    fn set_state(&self, state: SaveState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    fn take_latest(&self) -> Option<Draft> {
        self.latest.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    async fn save_latest(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let Some(draft) = self.take_latest() else {
            return Ok(None);
        };
        self.set_state(SaveState::Saving);
        match self.sink.save(&draft).await {
            Ok(updated_at) => {
                self.set_state(SaveState::Saved);
                debug!(post_id = ?draft.id, %updated_at, "draft saved");
                Ok(Some(updated_at))
            }
            Err(err) => {
                self.set_state(SaveState::Error);
                Err(err)
            }
        }
    }
}

/// Debounced saving: each `schedule` replaces the pending draft and restarts
/// the timer, so only the draft that survives a quiet period is written.
/// Saving is a convenience; callers that need the draft stored call `flush`.
pub struct AutoSaver {
    shared: Arc<Shared>,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl AutoSaver {
    pub fn new(sink: Arc<dyn DraftSink>) -> Self {
        Self::with_delay(sink, DEFAULT_AUTOSAVE_DELAY)
    }

    pub fn with_delay(sink: Arc<dyn DraftSink>, delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                latest: Mutex::new(None),
                state: Mutex::new(SaveState::Idle),
            }),
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SaveState {
        *self.shared.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn schedule(&self, draft: Draft) {
        if draft.id.is_none() {
            return;
        }
        *self.shared.latest.lock().unwrap_or_else(|p| p.into_inner()) = Some(draft);
        self.shared.set_state(SaveState::Idle);

        let shared = self.shared.clone();
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = shared.save_latest().await {
                warn!(error = %err, "auto-save failed");
            }
        });

        if let Some(previous) = self.pending_slot().replace(timer) {
            previous.abort();
        }
    }

    /// Cancels the timer and saves the pending draft now, if there is one.
    pub async fn flush(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        self.cancel();
        self.shared.save_latest().await
    }

    /// Drops the timer without saving.
    pub fn cancel(&self) {
        if let Some(pending) = self.pending_slot().take() {
            pending.abort();
        }
    }

    fn pending_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::NewPost;
    use crate::db::MemoryStore;

    #[derive(Default)]
    struct RecordingSink {
        saved: Mutex<Vec<Draft>>,
    }

    #[async_trait]
    impl DraftSink for RecordingSink {
        async fn save(&self, draft: &Draft) -> Result<DateTime<Utc>, AppError> {
            self.saved.lock().unwrap().push(draft.clone());
            Ok(Utc::now())
        }
    }

    fn draft() -> Draft {
        Draft {
            id: Some(Uuid::new_v4()),
            title: "Shipping Rust".into(),
            introduction: "intro".into(),
            body: "body".into(),
            conclusion: "outro".into(),
            keywords: vec!["rust".into()],
            tone: "friendly".into(),
            audience: "devs".into(),
            length: PostLength::Medium,
            seo: None,
        }
    }

    #[test]
    fn transformations_return_new_values() {
        let original = draft();
        let edited = original.clone().with_section(Section::Body, "new body");
        assert_eq!(original.body, "body");
        assert_eq!(edited.body, "new body");
        assert_eq!(edited.introduction, original.introduction);

        let edited = edited.with_keywords("rust, async, , rust");
        assert_eq!(edited.keywords, vec!["rust", "async"]);
        assert_eq!(edited.brief().keywords.as_deref(), Some("rust, async"));
    }

    #[tokio::test]
    async fn rapid_edits_save_only_the_last() {
        let sink = Arc::new(RecordingSink::default());
        let saver = AutoSaver::with_delay(sink.clone(), Duration::from_millis(40));

        let mut current = draft();
        for text in ["a", "ab", "abc"] {
            current = current.with_section(Section::Body, text);
            saver.schedule(current.clone());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(120)).await;

        let saved = sink.saved.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].body, "abc");
        assert_eq!(saver.state(), SaveState::Saved);
    }

    #[tokio::test]
    async fn flush_saves_immediately_and_once() {
        let sink = Arc::new(RecordingSink::default());
        let saver = AutoSaver::with_delay(sink.clone(), Duration::from_secs(60));

        saver.schedule(draft());
        assert!(saver.flush().await.unwrap().is_some());
        assert!(saver.flush().await.unwrap().is_none());
        assert_eq!(sink.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_discards_pending_save() {
        let sink = Arc::new(RecordingSink::default());
        let saver = AutoSaver::with_delay(sink.clone(), Duration::from_millis(20));
        saver.schedule(draft());
        saver.cancel();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(sink.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn content_sink_writes_through_store() {
        let store = Arc::new(MemoryStore::new());
        let content = Arc::new(ContentStore::new(store));
        let owner = Uuid::new_v4();
        let post = content
            .create(
                owner,
                NewPost {
                    title: "Shipping Rust".into(),
                    introduction: "intro".into(),
                    body: "body".into(),
                    conclusion: "outro".into(),
                    keywords: vec![],
                    length: PostLength::Short,
                    tone: "calm".into(),
                    audience: "devs".into(),
                    seo: None,
                },
            )
            .await
            .unwrap();

        let saver = AutoSaver::new(Arc::new(ContentDraftSink::new(content.clone(), owner)));
        saver.schedule(Draft::from(post.clone()).with_section(Section::Conclusion, "new outro"));
        let updated_at = saver.flush().await.unwrap().unwrap();

        let stored = content.get(owner, post.id).await.unwrap();
        assert_eq!(stored.conclusion, "new outro");
        assert_eq!(stored.body, "body");
        assert_eq!(stored.updated_at, updated_at);
    }
}
