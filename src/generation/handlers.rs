use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::str::FromStr;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::db::models::{PostLength, Section};
use crate::error::{AppError, DatabaseError};
use crate::gateway::GenerationBrief;
use crate::AppState;

/// Body of `POST /api/generate`. Every field is optional at the wire level
/// so that missing fields produce a 400 with a stable message.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub title: Option<String>,
    pub keywords: Option<String>,
    pub tone: Option<String>,
    pub audience: Option<String>,
    pub length: Option<String>,
    pub section: Option<String>,
    pub post_id: Option<String>,
}

fn required(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl GenerateRequest {
    fn brief(&self) -> Result<GenerationBrief, AppError> {
        let missing = || AppError::ValidationError("Missing required fields".into());

        let title = required(&self.title).ok_or_else(missing)?;
        let tone = required(&self.tone).ok_or_else(missing)?;
        let audience = required(&self.audience).ok_or_else(missing)?;
        let length = required(&self.length).ok_or_else(missing)?;
        let length = PostLength::from_str(&length)
            .map_err(|_| AppError::ValidationError(format!("Invalid length: {length}")))?;

        Ok(GenerationBrief {
            title,
            keywords: self.keywords.clone(),
            tone,
            audience,
            length,
        })
    }
}

pub async fn generate(
    auth: AuthenticatedUser,
    req: web::Json<GenerateRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let req = req.into_inner();
    let brief = req.brief()?;

    let Some(section) = required(&req.section) else {
        let created = state.generation.create_post(&auth.user, brief).await?;
        return Ok(HttpResponse::Ok().json(created));
    };

    let section = Section::from_str(&section)
        .map_err(|_| AppError::ValidationError(format!("Invalid section: {section}")))?;
    let post_id = required(&req.post_id)
        .ok_or_else(|| AppError::ValidationError("Missing post ID".into()))?;
    // A malformed id cannot name an owned post.
    let post_id = Uuid::parse_str(&post_id).map_err(|_| DatabaseError::NotFound)?;

    let text = state
        .generation
        .regenerate_section(&auth.user, post_id, section, brief)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ section.as_str(): text })))
}
