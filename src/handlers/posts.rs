// src/handlers/posts.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use validator::{Validate, ValidationErrors};

use crate::{
    error::AppError,
    models::{
        filters::{ListParams, POST_SORT_SAFELIST},
        post::{CreatePostRequest, NewPost, UpdatePostRequest, storage_precision},
    },
    state::{DynImageRepository, DynPostRepository},
    store::DataError,
    utils::{html::clean_html, uploads::UploadDir, validation::check},
};

/// Name Postgres gives the `UNIQUE` constraint on `posts.slug`.
const SLUG_CONSTRAINT: &str = "posts_slug_key";

/// A duplicate slug is reported against the `slug` field rather than as a 500.
fn slug_taken(err: DataError) -> AppError {
    if err.is_unique_violation() && err.constraint() == Some(SLUG_CONSTRAINT) {
        let mut errors = ValidationErrors::new();
        check(&mut errors, false, "slug", "a post with this slug already exists");
        return AppError::ValidationFailed(errors);
    }
    err.into()
}

/// Lists published posts, each with its featured image.
///
/// Query: `title` (full-text), `page`, `page_size`, `sort` (`id`, `title`,
/// `published_at`, `-` prefix for descending).
pub async fn list_posts(
    State(posts): State<DynPostRepository>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, AppError> {
    let (title, filters) = params.into_filters(POST_SORT_SAFELIST)?;

    let (posts, metadata) = posts.list_filtered_with_featured_image(&title, &filters).await?;
    tracing::info!(
        count = posts.len(),
        total = metadata.total_records,
        page = filters.page,
        sort = filters.sort_column().name(),
        "posts listed"
    );

    Ok(Json(json!({ "posts": posts, "metadata": metadata })))
}

pub async fn create_post(
    State(posts): State<DynPostRepository>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_post = NewPost {
        title: payload.title,
        slug: payload.slug,
        content: clean_html(&payload.content),
        excerpt: payload.excerpt,
        published_at: storage_precision(payload.published_at.unwrap_or_else(Utc::now)),
    };
    new_post.validate()?;

    let post = posts.insert(new_post).await.map_err(slug_taken)?;
    tracing::info!(id = post.id, slug = %post.slug, "post created");

    let location = format!("/v1/posts/{}", post.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "post": post })),
    ))
}

/// A post with all of its images and its featured image.
pub async fn get_post(
    State(posts): State<DynPostRepository>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let post = posts.get_with_images(id).await?;
    Ok(Json(json!({ "post": post })))
}

pub async fn get_post_by_slug(
    State(posts): State<DynPostRepository>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let post = posts.get_by_slug_with_images(&slug).await?;
    Ok(Json(json!({ "post": post })))
}

/// Partial update. When the body carries `version`, it must match the stored one.
pub async fn update_post(
    State(posts): State<DynPostRepository>,
    Path(id): Path<i64>,
    Json(mut payload): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut post = posts.get(id).await?;

    if payload.version.is_some_and(|expected| expected != post.version) {
        return Err(AppError::edit_conflict());
    }

    payload.content = payload.content.map(|content| clean_html(&content));
    payload.apply(&mut post);
    post.validate()?;

    let post = posts.update(&post).await.map_err(slug_taken)?;
    tracing::info!(id = post.id, version = post.version, "post updated");

    Ok(Json(json!({ "post": post })))
}

/// Deletes a post; its image rows go with it and the files are removed afterwards.
pub async fn delete_post(
    State(posts): State<DynPostRepository>,
    State(images): State<DynImageRepository>,
    State(uploads): State<UploadDir>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attached = if id > 0 { images.get_by_post_id(id).await? } else { Vec::new() };

    posts.delete(id).await?;

    for image in &attached {
        uploads.remove(&image.file_path).await;
    }
    tracing::info!(id, images = attached.len(), "post deleted");

    Ok(Json(json!({ "message": "post successfully deleted" })))
}
