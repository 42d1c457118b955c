use actix_web::{http::header, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::content::{export_file_name, render_html, render_markdown, ExportFormat, PostUpdate};
use crate::error::{AppError, DatabaseError};
use crate::AppState;

/// Ids that do not parse cannot name an owned post.
fn post_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::DatabaseError(DatabaseError::NotFound))
}

pub async fn list_posts(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let posts = state.content.list(auth.user.id).await?;
    Ok(HttpResponse::Ok().json(posts))
}

pub async fn get_post(
    auth: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let post = state.content.get(auth.user.id, post_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(post))
}

pub async fn update_post(
    auth: AuthenticatedUser,
    path: web::Path<String>,
    update: web::Json<PostUpdate>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let post = state
        .content
        .update(auth.user.id, post_id(&path)?, &update)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "updatedAt": post.updated_at,
    })))
}

pub async fn delete_post(
    auth: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.content.delete(auth.user.id, post_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<ExportFormat>,
}

pub async fn export_post(
    auth: AuthenticatedUser,
    path: web::Path<String>,
    query: web::Query<ExportQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let post = state.content.get(auth.user.id, post_id(&path)?).await?;
    let format = query.format.unwrap_or(ExportFormat::Markdown);

    let rendered = match format {
        ExportFormat::Markdown => render_markdown(&post),
        ExportFormat::Html => render_html(&post),
    };

    Ok(HttpResponse::Ok()
        .content_type(format.content_type())
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", export_file_name(&post.title, format)),
        ))
        .body(rendered))
}
