use std::sync::LazyLock;

use chrono::{DateTime, SubsecRound, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationErrors};

use crate::{
    models::image::Image,
    utils::validation::{check, finish},
};

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid slug regex"));

/// Drops sub-microsecond digits, which `TIMESTAMPTZ` cannot hold.
pub fn storage_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub published_at: DateTime<Utc>,

    /// Optimistic concurrency counter, bumped by every successful update.
    pub version: i32,

    /// Populated only by the image-aware queries.
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<Image>,

    /// Populated only by the image-aware queries, ordered by sort order then upload time.
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
}

/// Fields supplied when inserting a post; identity, timestamps and version
/// are assigned by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub published_at: DateTime<Utc>,
}

/// DTO for creating a new post.
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    /// Defaults to now when omitted.
    pub published_at: Option<DateTime<Utc>>,
}

/// DTO for a partial post update. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub published_at: Option<DateTime<Utc>>,

    /// Version the client last observed. A mismatch is rejected as an edit conflict.
    pub version: Option<i32>,
}

fn check_post_fields(title: &str, slug: &str, content: &str, excerpt: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    check(&mut errors, !title.is_empty(), "title", "must be provided");
    check(&mut errors, title.len() <= 500, "title", "must not be more than 500 bytes long");

    check(&mut errors, !slug.is_empty(), "slug", "must be provided");
    check(&mut errors, slug.len() <= 200, "slug", "must not be more than 200 bytes long");
    check(
        &mut errors,
        slug.is_empty() || SLUG_RE.is_match(slug),
        "slug",
        "must contain only lowercase letters, digits and single hyphens",
    );

    check(&mut errors, !content.is_empty(), "content", "must be provided");

    check(&mut errors, !excerpt.is_empty(), "excerpt", "must be provided");
    check(&mut errors, excerpt.len() <= 1000, "excerpt", "must not be more than 1000 bytes long");

    finish(errors)
}

impl Validate for NewPost {
    fn validate(&self) -> Result<(), ValidationErrors> {
        check_post_fields(&self.title, &self.slug, &self.content, &self.excerpt)
    }
}

impl Validate for Post {
    fn validate(&self) -> Result<(), ValidationErrors> {
        check_post_fields(&self.title, &self.slug, &self.content, &self.excerpt)
    }
}

impl UpdatePostRequest {
    /// Applies the present fields onto `post`.
    pub fn apply(self, post: &mut Post) {
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(slug) = self.slug {
            post.slug = slug;
        }
        if let Some(content) = self.content {
            post.content = content;
        }
        if let Some(excerpt) = self.excerpt {
            post.excerpt = excerpt;
        }
        if let Some(published_at) = self.published_at {
            post.published_at = storage_precision(published_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn new_post() -> NewPost {
        NewPost {
            title: "Hello".into(),
            slug: "hello-world".into(),
            content: "<p>Body</p>".into(),
            excerpt: "Body".into(),
            published_at: Utc::now(),
        }
    }

    #[test]
    fn valid_post_passes() {
        assert!(new_post().validate().is_ok());
    }

    #[test]
    fn reports_every_invalid_field() {
        let post = NewPost {
            title: String::new(),
            slug: "Not A Slug".into(),
            content: String::new(),
            excerpt: "x".repeat(1001),
            ..new_post()
        };

        let errors = post.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("slug"));
        assert!(fields.contains_key("content"));
        assert!(fields.contains_key("excerpt"));
    }

    #[test]
    fn title_limit_counts_bytes() {
        // 251 characters, 501 bytes.
        let post = NewPost {
            title: "é".repeat(250) + "a",
            ..new_post()
        };
        assert!(post.validate().unwrap_err().field_errors().contains_key("title"));
    }

    #[test]
    fn update_keeps_absent_fields() {
        let mut post = Post {
            id: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            title: "Old".into(),
            slug: "old".into(),
            content: "c".into(),
            excerpt: "e".into(),
            published_at: Utc::now(),
            version: 3,
            featured_image: None,
            images: Vec::new(),
        };

        UpdatePostRequest {
            title: Some("New".into()),
            ..Default::default()
        }
        .apply(&mut post);

        assert_eq!(post.title, "New");
        assert_eq!(post.slug, "old");
        assert_eq!(post.version, 3);
    }

    #[test]
    fn published_at_is_kept_to_microseconds() {
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap() + chrono::Duration::nanoseconds(123_456_789);
        let mut post = Post {
            id: 1,
            created_at: at,
            updated_at: at,
            title: "Old".into(),
            slug: "old".into(),
            content: "c".into(),
            excerpt: "e".into(),
            published_at: at,
            version: 1,
            featured_image: None,
            images: Vec::new(),
        };

        UpdatePostRequest {
            published_at: Some(at),
            ..Default::default()
        }
        .apply(&mut post);

        assert_eq!(post.published_at.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(storage_precision(post.published_at), post.published_at);
    }
}
