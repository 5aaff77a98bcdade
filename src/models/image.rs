use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationErrors};

use crate::utils::validation::{check, finish, permitted_value};

/// Largest accepted upload, in bytes.
pub const MAX_IMAGE_BYTES: i64 = 10 * 1024 * 1024;

pub const PERMITTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Represents the 'images' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub post_id: i64,

    /// System generated, unique. Doubles as the public file-serving key.
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    pub is_featured: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

/// Fields supplied when inserting an image.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub post_id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    /// When set, the image becomes the post's only featured image.
    pub is_featured: bool,
    pub sort_order: i32,
}

/// DTO for updating image metadata. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateImageRequest {
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub is_featured: Option<bool>,
    pub sort_order: Option<i32>,
    pub version: Option<i32>,
}

/// Body of the featured-image endpoint. `null` clears the featured image.
#[derive(Debug, Deserialize)]
pub struct SetFeaturedRequest {
    pub image_id: Option<i64>,
}

/// One entry of a batch reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOrder {
    pub id: i64,
    pub order: i32,
}

struct ImageFields<'a> {
    post_id: i64,
    filename: &'a str,
    original_filename: &'a str,
    file_path: &'a str,
    file_size: i64,
    mime_type: &'a str,
    alt_text: Option<&'a str>,
    caption: Option<&'a str>,
    sort_order: i32,
}

fn check_image_fields(f: ImageFields<'_>) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    check(&mut errors, f.post_id > 0, "post_id", "must be a positive integer");

    check(&mut errors, !f.filename.is_empty(), "filename", "must be provided");
    check(&mut errors, f.filename.len() <= 255, "filename", "must not be more than 255 bytes long");

    check(&mut errors, !f.original_filename.is_empty(), "original_filename", "must be provided");
    check(
        &mut errors,
        f.original_filename.len() <= 255,
        "original_filename",
        "must not be more than 255 bytes long",
    );

    check(&mut errors, !f.file_path.is_empty(), "file_path", "must be provided");
    check(&mut errors, f.file_path.len() <= 500, "file_path", "must not be more than 500 bytes long");

    check(&mut errors, f.file_size > 0, "file_size", "must be a positive integer");
    check(&mut errors, f.file_size <= MAX_IMAGE_BYTES, "file_size", "must not be larger than 10MB");

    check(&mut errors, !f.mime_type.is_empty(), "mime_type", "must be provided");
    check(
        &mut errors,
        permitted_value(f.mime_type, PERMITTED_MIME_TYPES),
        "mime_type",
        "must be a valid image format",
    );

    if let Some(alt_text) = f.alt_text {
        check(&mut errors, alt_text.len() <= 500, "alt_text", "must not be more than 500 bytes long");
    }
    if let Some(caption) = f.caption {
        check(&mut errors, caption.len() <= 1000, "caption", "must not be more than 1000 bytes long");
    }

    check(&mut errors, f.sort_order >= 0, "sort_order", "must not be negative");

    finish(errors)
}

impl Validate for NewImage {
    fn validate(&self) -> Result<(), ValidationErrors> {
        check_image_fields(ImageFields {
            post_id: self.post_id,
            filename: &self.filename,
            original_filename: &self.original_filename,
            file_path: &self.file_path,
            file_size: self.file_size,
            mime_type: &self.mime_type,
            alt_text: self.alt_text.as_deref(),
            caption: self.caption.as_deref(),
            sort_order: self.sort_order,
        })
    }
}

impl Validate for Image {
    fn validate(&self) -> Result<(), ValidationErrors> {
        check_image_fields(ImageFields {
            post_id: self.post_id,
            filename: &self.filename,
            original_filename: &self.original_filename,
            file_path: &self.file_path,
            file_size: self.file_size,
            mime_type: &self.mime_type,
            alt_text: self.alt_text.as_deref(),
            caption: self.caption.as_deref(),
            sort_order: self.sort_order,
        })
    }
}
