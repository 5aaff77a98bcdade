// tests/common/mod.rs

#![allow(dead_code)]

use std::time::Duration;

use blog_api::{
    config::Config,
    models::{
        image::NewImage,
        post::{NewPost, storage_precision},
    },
};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, postgres::PgPoolOptions};

/// Connects to `DATABASE_URL` and applies migrations.
/// Returns `None` (and the calling test passes vacuously) when no database is configured.
pub async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(pool)
}

pub fn test_config(database_url: &str) -> Config {
    Config {
        database_url: database_url.to_string(),
        rust_log: "error".to_string(),
        port: 0,
        env: "test".to_string(),
        db_max_connections: 5,
        db_query_timeout: Duration::from_secs(5),
        limiter_enabled: false,
        limiter_replenish_secs: 1,
        limiter_burst: 4,
        cors_trusted_origins: Vec::new(),
        upload_dir: std::env::temp_dir()
            .join(format!("blog-api-it-{}", uuid::Uuid::new_v4().simple()))
            .to_string_lossy()
            .into_owned(),
        log_dir: "logs".to_string(),
    }
}

/// A word unique to one test run, so full-text searches only see this test's rows.
pub fn unique_token() -> String {
    format!("pg{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

pub fn new_post(title: &str, published_at: DateTime<Utc>) -> NewPost {
    NewPost {
        title: title.to_string(),
        slug: format!("post-{}", uuid::Uuid::new_v4().simple()),
        content: "<p>content</p>".to_string(),
        excerpt: "excerpt".to_string(),
        published_at: storage_precision(published_at),
    }
}

pub fn new_image(post_id: i64, is_featured: bool, sort_order: i32) -> NewImage {
    let filename = format!("{}_{}.png", post_id, uuid::Uuid::new_v4().simple());
    NewImage {
        post_id,
        file_path: format!("uploads/images/{}", filename),
        filename,
        original_filename: "photo.png".to_string(),
        file_size: 2048,
        mime_type: "image/png".to_string(),
        width: Some(640),
        height: Some(480),
        alt_text: None,
        caption: None,
        is_featured,
        sort_order,
    }
}
