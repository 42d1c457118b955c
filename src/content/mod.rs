//! Content Store: owner-scoped persistence of generated blog posts.

mod export;
pub mod handlers;
mod update;

pub use export::{export_file_name, render_html, render_markdown, ExportFormat};
pub use update::PostUpdate;

use chrono::{SubsecRound, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::db::models::{Post, PostLength, SeoMetadata};
use crate::db::PostRepository;
use crate::error::{AppError, DatabaseError};

/// Trims each keyword, drops blanks and removes case-sensitive duplicates,
/// keeping the first occurrence.
pub fn normalize_keyword_list<'a>(keywords: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .into_iter()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_string()))
        .map(str::to_string)
        .collect()
}

/// Normalises the comma-separated keyword field of a brief.
pub fn normalize_keywords(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| normalize_keyword_list(raw.split(',')))
        .unwrap_or_default()
}

/// Fields for a freshly generated post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub introduction: String,
    pub body: String,
    pub conclusion: String,
    pub keywords: Vec<String>,
    pub length: PostLength,
    pub tone: String,
    pub audience: String,
    pub seo: Option<SeoMetadata>,
}

impl NewPost {
    fn into_post(self, owner: Uuid) -> Post {
        let now = Utc::now().trunc_subsecs(6);
        Post {
            id: Uuid::new_v4(),
            user_id: owner,
            title: self.title,
            introduction: self.introduction,
            body: self.body,
            conclusion: self.conclusion,
            keywords: self.keywords,
            length: self.length,
            tone: self.tone,
            audience: self.audience,
            seo: self.seo,
            created_at: now,
            updated_at: now,
        }
    }
}

pub struct ContentStore {
    posts: Arc<dyn PostRepository>,
}

impl ContentStore {
    pub fn new(posts: Arc<dyn PostRepository>) -> Self {
        Self { posts }
    }

    pub async fn create(&self, owner: Uuid, new_post: NewPost) -> Result<Post, AppError> {
        let post = self.posts.insert_post(&new_post.into_post(owner)).await?;
        info!(post_id = %post.id, user_id = %owner, "post created");
        Ok(post)
    }

    pub async fn get(&self, owner: Uuid, id: Uuid) -> Result<Post, AppError> {
        self.posts
            .find_owned(id, owner)
            .await?
            .ok_or(AppError::DatabaseError(DatabaseError::NotFound))
    }

    /// Most recently edited first.
    pub async fn list(&self, owner: Uuid) -> Result<Vec<Post>, AppError> {
        let mut posts = self.posts.list_owned(owner).await?;
        posts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(posts)
    }

    pub async fn update(&self, owner: Uuid, id: Uuid, update: &PostUpdate) -> Result<Post, AppError> {
        if matches!(&update.title, Some(title) if title.trim().is_empty()) {
            return Err(AppError::ValidationError("Title cannot be empty".into()));
        }
        self.posts
            .update_owned(id, owner, update)
            .await?
            .ok_or(AppError::DatabaseError(DatabaseError::NotFound))
    }

    pub async fn delete(&self, owner: Uuid, id: Uuid) -> Result<(), AppError> {
        if self.posts.delete_owned(id, owner).await? {
            info!(post_id = %id, user_id = %owner, "post deleted");
            Ok(())
        } else {
            Err(AppError::DatabaseError(DatabaseError::NotFound))
        }
    }
}
