//! Generation Service: ties the usage ledger, model gateway and content store
//! together for new posts and single-section regeneration.

pub mod handlers;
mod locks;

pub use locks::KeyedLocks;

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::content::{normalize_keywords, ContentStore, NewPost, PostUpdate};
use crate::db::models::{Section, User};
use crate::error::AppError;
use crate::gateway::{GeneratedContent, GenerationBrief, ModelGateway, SectionContext};
use crate::usage::UsageLedger;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPost {
    pub post_id: Uuid,
    #[serde(flatten)]
    pub content: GeneratedContent,
}

pub struct GenerationService {
    usage: Arc<UsageLedger>,
    gateway: Arc<ModelGateway>,
    content: Arc<ContentStore>,
    user_locks: KeyedLocks,
    post_locks: KeyedLocks,
}

impl GenerationService {
    pub fn new(usage: Arc<UsageLedger>, gateway: Arc<ModelGateway>, content: Arc<ContentStore>) -> Self {
        Self {
            usage,
            gateway,
            content,
            user_locks: KeyedLocks::new(),
            post_locks: KeyedLocks::new(),
        }
    }

    /// Generates and stores a new post. Metered for FREE users: the quota is
    /// checked first and usage is only incremented once the post is stored.
    #[instrument(skip(self, user, brief), fields(user_id = %user.id, tier = %user.tier))]
    pub async fn create_post(&self, user: &User, brief: GenerationBrief) -> Result<CreatedPost, AppError> {
        let metered = !user.is_pro();
        let _guard = if metered {
            Some(self.user_locks.acquire(user.id).await)
        } else {
            None
        };

        if metered {
            let limit = self.usage.free_limit();
            if !self.usage.has_remaining_free_credits(user.id, limit).await? {
                info!("free generation quota exhausted");
                return Err(AppError::QuotaExceeded { limit });
            }
        }

        let generated = self.gateway.generate(&brief).await?;

        let post = self
            .content
            .create(
                user.id,
                NewPost {
                    keywords: normalize_keywords(brief.keywords.as_deref()),
                    title: brief.title,
                    introduction: generated.introduction.clone(),
                    body: generated.body.clone(),
                    conclusion: generated.conclusion.clone(),
                    length: brief.length,
                    tone: brief.tone,
                    audience: brief.audience,
                    seo: generated.seo.clone(),
                },
            )
            .await?;

        if metered {
            self.usage.increment(user.id).await?;
        }

        Ok(CreatedPost { post_id: post.id, content: generated })
    }

    /// Rewrites one section of an owned post. Never metered.
    #[instrument(skip(self, user, brief), fields(user_id = %user.id))]
    pub async fn regenerate_section(
        &self,
        user: &User,
        post_id: Uuid,
        section: Section,
        brief: GenerationBrief,
    ) -> Result<String, AppError> {
        let _guard = self.post_locks.acquire(post_id).await;

        let post = self.content.get(user.id, post_id).await?;
        let context = SectionContext {
            brief,
            current: post.section(section).to_string(),
            other_sections: Section::ALL
                .iter()
                .filter(|s| **s != section)
                .map(|s| (*s, post.section(*s).to_string()))
                .collect(),
        };

        let text = self.gateway.regenerate_section(section, &context).await?;
        self.content
            .update(user.id, post_id, &PostUpdate::section(section, text.clone()))
            .await?;

        info!(%post_id, %section, "section regenerated");
        Ok(text)
    }
}
