// src/handlers/images.rs

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use validator::{Validate, ValidationErrors};

use crate::{
    error::AppError,
    models::image::{ImageOrder, MAX_IMAGE_BYTES, NewImage, SetFeaturedRequest, UpdateImageRequest},
    state::{DynImageRepository, DynPostRepository},
    utils::{
        uploads::{UploadDir, generate_filename, image_extension},
        validation::{check, finish},
    },
};

/// Fields collected from the multipart upload form.
#[derive(Default)]
struct UploadForm {
    file: Option<(String, Option<String>, Vec<u8>)>,
    alt_text: Option<String>,
    caption: Option<String>,
    is_featured: bool,
    sort_order: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let original = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                form.file = Some((original, content_type, bytes.to_vec()));
            }
            "alt_text" => form.alt_text = Some(field.text().await?).filter(|s| !s.is_empty()),
            "caption" => form.caption = Some(field.text().await?).filter(|s| !s.is_empty()),
            "is_featured" => form.is_featured = field.text().await? == "true",
            "sort_order" => form.sort_order = Some(field.text().await?).filter(|s| !s.is_empty()),
            _ => {}
        }
    }

    Ok(form)
}

/// Accepts a multipart upload (`image` file plus optional `alt_text`,
/// `caption`, `is_featured`, `sort_order`) and attaches it to the post.
///
/// The file is written before the row is inserted and removed again if the
/// insert fails.
pub async fn upload_image(
    State(posts): State<DynPostRepository>,
    State(images): State<DynImageRepository>,
    State(uploads): State<UploadDir>,
    Path(post_id): Path<i64>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    posts.get(post_id).await?;

    let form = read_form(multipart).await?;
    let (original_filename, content_type, bytes) = form
        .file
        .ok_or_else(|| AppError::BadRequest("an image file must be provided in the 'image' field".to_string()))?;

    let mut errors = ValidationErrors::new();
    let ext = image_extension(&original_filename);
    check(&mut errors, ext.is_some(), "image", "must be a jpg, jpeg, png, gif or webp file");
    check(&mut errors, !bytes.is_empty(), "image", "must not be empty");
    check(&mut errors, (bytes.len() as i64) <= MAX_IMAGE_BYTES, "image", "must not be larger than 10MB");
    let sort_order = match form.sort_order.as_deref().map(str::parse::<i32>) {
        None => 0,
        Some(Ok(order)) => order,
        Some(Err(_)) => {
            check(&mut errors, false, "sort_order", "must be an integer value");
            0
        }
    };
    finish(errors)?;
    let ext = ext.unwrap_or_default();

    let filename = generate_filename(post_id, &ext);
    let file_path = uploads
        .save(&filename, &bytes)
        .await
        .map_err(|e| AppError::InternalServerError(format!("failed to store upload: {}", e)))?;

    let new_image = NewImage {
        post_id,
        filename,
        original_filename,
        file_path: file_path.clone(),
        file_size: bytes.len() as i64,
        mime_type: content_type.unwrap_or_default(),
        width: None,
        height: None,
        alt_text: form.alt_text,
        caption: form.caption,
        is_featured: form.is_featured,
        sort_order,
    };

    let inserted = match new_image.validate() {
        Ok(()) => images.insert(new_image).await.map_err(AppError::from),
        Err(errors) => Err(AppError::ValidationFailed(errors)),
    };
    let image = match inserted {
        Ok(image) => image,
        Err(err) => {
            uploads.remove(&file_path).await;
            return Err(err);
        }
    };
    tracing::info!(post_id, id = image.id, filename = %image.filename, featured = image.is_featured, "image uploaded");

    Ok((StatusCode::CREATED, Json(json!({ "image": image }))))
}

pub async fn list_post_images(
    State(images): State<DynImageRepository>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let images = images.get_by_post_id(post_id).await?;
    Ok(Json(json!({ "images": images })))
}

/// Streams a stored file by its generated filename.
pub async fn serve_image(
    State(images): State<DynImageRepository>,
    Path(filename): Path<String>,
    request: Request,
) -> Result<Response, AppError> {
    let image = images.get_by_filename(&filename).await?;

    if tokio::fs::metadata(&image.file_path).await.is_err() {
        tracing::warn!(filename = %image.filename, file_path = %image.file_path, "image row has no file");
        return Err(AppError::not_found());
    }

    let response = ServeFile::new(&image.file_path)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});

    let mut response = response.map(Body::new);
    if let Ok(mime) = HeaderValue::from_str(&image.mime_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, mime);
    }
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=31536000"));

    Ok(response)
}

/// Edits alt text, caption and sort order. `is_featured` is routed through
/// the featured-image coordinator so the post keeps at most one.
pub async fn update_image(
    State(images): State<DynImageRepository>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateImageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut image = images.get(id).await?;

    if payload.version.is_some_and(|expected| expected != image.version) {
        return Err(AppError::edit_conflict());
    }

    if let Some(alt_text) = payload.alt_text {
        image.alt_text = Some(alt_text).filter(|s| !s.is_empty());
    }
    if let Some(caption) = payload.caption {
        image.caption = Some(caption).filter(|s| !s.is_empty());
    }
    if let Some(sort_order) = payload.sort_order {
        image.sort_order = sort_order;
    }
    image.validate()?;

    let mut image = images.update(&image).await?;

    match payload.is_featured {
        Some(true) if !image.is_featured => {
            images.set_featured(image.post_id, Some(image.id)).await?;
            image = images.get(image.id).await?;
        }
        Some(false) if image.is_featured => {
            images.unset_featured(image.post_id, image.id).await?;
            image = images.get(image.id).await?;
        }
        _ => {}
    }

    Ok(Json(json!({ "image": image })))
}

pub async fn delete_image(
    State(images): State<DynImageRepository>,
    State(uploads): State<UploadDir>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let image = images.delete(id).await?;
    uploads.remove(&image.file_path).await;
    tracing::info!(id, post_id = image.post_id, "image deleted");

    Ok(Json(json!({ "message": "image successfully deleted" })))
}

/// Applies a batch of `{id, order}` pairs atomically and returns the post's
/// images in their new order.
pub async fn reorder_images(
    State(images): State<DynImageRepository>,
    Path(post_id): Path<i64>,
    Json(orders): Json<Vec<ImageOrder>>,
) -> Result<impl IntoResponse, AppError> {
    let mut errors = ValidationErrors::new();
    check(&mut errors, orders.iter().all(|o| o.id > 0), "id", "must be a positive integer");
    check(&mut errors, orders.iter().all(|o| o.order >= 0), "order", "must not be negative");
    finish(errors)?;

    images.update_sort_order(post_id, &orders).await?;

    let images = images.get_by_post_id(post_id).await?;
    Ok(Json(json!({ "images": images })))
}

/// `{"image_id": n}` features image `n`; `{"image_id": null}` leaves the post
/// without a featured image.
pub async fn set_featured_image(
    State(images): State<DynImageRepository>,
    Path(post_id): Path<i64>,
    Json(payload): Json<SetFeaturedRequest>,
) -> Result<impl IntoResponse, AppError> {
    images.set_featured(post_id, payload.image_id).await?;
    tracing::info!(post_id, image_id = ?payload.image_id, "featured image set");

    Ok(Json(json!({ "message": "featured image updated successfully" })))
}
