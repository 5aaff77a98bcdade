use std::time::Duration;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json};

use super::{DataError, bounded, not_found};
use crate::models::{
    filters::{Filters, Metadata, calculate_metadata},
    image::Image,
    post::{NewPost, Post, storage_precision},
};

/// Persistence contract for posts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Inserts a post and returns it with its id, timestamps and version assigned.
    async fn insert(&self, post: NewPost) -> Result<Post, DataError>;

    async fn get(&self, id: i64) -> Result<Post, DataError>;

    async fn get_by_slug(&self, slug: &str) -> Result<Post, DataError>;

    /// Version-gated update. Fails with `EditConflict` when `post.version` is
    /// stale or the row no longer exists.
    async fn update(&self, post: &Post) -> Result<Post, DataError>;

    async fn delete(&self, id: i64) -> Result<(), DataError>;

    /// One page of published posts whose title matches `title` (empty matches all).
    async fn list_filtered(&self, title: &str, filters: &Filters) -> Result<(Vec<Post>, Metadata), DataError>;

    /// Same as `list_filtered`, with each post's featured image joined in.
    async fn list_filtered_with_featured_image(
        &self,
        title: &str,
        filters: &Filters,
    ) -> Result<(Vec<Post>, Metadata), DataError>;

    /// A post with all of its images and its featured image resolved.
    async fn get_with_images(&self, id: i64) -> Result<Post, DataError>;

    async fn get_by_slug_with_images(&self, slug: &str) -> Result<Post, DataError>;
}

/// Postgres-backed [`PostRepository`].
#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgPostStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

/// A listing row: the post plus the windowed total count.
#[derive(FromRow)]
struct ListingRow {
    total_records: i64,
    #[sqlx(flatten)]
    post: Post,
}

#[derive(FromRow)]
struct FeaturedListingRow {
    total_records: i64,
    #[sqlx(flatten)]
    post: Post,
    featured_image: Option<Json<Image>>,
}

#[derive(FromRow)]
struct PostWithImagesRow {
    #[sqlx(flatten)]
    post: Post,
    images: Json<Vec<Image>>,
}

impl PostWithImagesRow {
    fn into_post(self) -> Post {
        let mut post = self.post;
        post.images = self.images.0;
        post.featured_image = post.images.iter().find(|image| image.is_featured).cloned();
        post
    }
}

/// Shared tail of both listing queries: the title predicate, the publication
/// cut-off, the safelisted ordering with `id` as tie-break, and paging.
fn push_listing_tail<'a>(builder: &mut QueryBuilder<'a, Postgres>, title: &'a str, filters: &Filters) {
    builder.push(" WHERE (to_tsvector('simple', p.title) @@ plainto_tsquery('simple', ");
    builder.push_bind(title);
    builder.push(") OR ");
    builder.push_bind(title);
    builder.push(" = '') AND p.published_at <= NOW() ORDER BY ");
    builder.push(filters.sort_column().qualified());
    builder.push(" ");
    builder.push(filters.sort_direction().as_sql());
    builder.push(", p.id ASC LIMIT ");
    builder.push_bind(filters.limit());
    builder.push(" OFFSET ");
    builder.push_bind(filters.offset());
}

const SELECT_WITH_IMAGES: &str = r#"
    SELECT p.id, p.created_at, p.updated_at, p.title, p.slug, p.content, p.excerpt,
           p.published_at, p.version,
           COALESCE(
               jsonb_agg(to_jsonb(i) ORDER BY i.sort_order, i.created_at)
                   FILTER (WHERE i.id IS NOT NULL),
               '[]'::jsonb
           ) AS images
    FROM posts p
    LEFT JOIN images i ON i.post_id = p.id
"#;

#[async_trait]
impl PostRepository for PgPostStore {
    #[tracing::instrument(level = "debug", skip(self, post), fields(slug = %post.slug))]
    async fn insert(&self, post: NewPost) -> Result<Post, DataError> {
        bounded(self.timeout, async {
            sqlx::query_as::<_, Post>(
                r#"
                INSERT INTO posts (title, slug, content, excerpt, published_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, created_at, updated_at, title, slug, content, excerpt, published_at, version
                "#,
            )
            .bind(post.title)
            .bind(post.slug)
            .bind(post.content)
            .bind(post.excerpt)
            .bind(storage_precision(post.published_at))
            .fetch_one(&self.pool)
            .await
            .map_err(DataError::from)
        })
        .await
    }

    async fn get(&self, id: i64) -> Result<Post, DataError> {
        if id < 1 {
            return Err(DataError::NotFound);
        }

        bounded(self.timeout, async {
            sqlx::query_as::<_, Post>(
                r#"
                SELECT id, created_at, updated_at, title, slug, content, excerpt, published_at, version
                FROM posts
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found)
        })
        .await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Post, DataError> {
        if slug.is_empty() {
            return Err(DataError::NotFound);
        }

        bounded(self.timeout, async {
            sqlx::query_as::<_, Post>(
                r#"
                SELECT id, created_at, updated_at, title, slug, content, excerpt, published_at, version
                FROM posts
                WHERE slug = $1
                "#,
            )
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found)
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self, post), fields(id = post.id, version = post.version))]
    async fn update(&self, post: &Post) -> Result<Post, DataError> {
        bounded(self.timeout, async {
            let updated = sqlx::query_as::<_, Post>(
                r#"
                UPDATE posts
                SET title = $1, slug = $2, content = $3, excerpt = $4, published_at = $5,
                    updated_at = NOW(), version = version + 1
                WHERE id = $6 AND version = $7
                RETURNING id, created_at, updated_at, title, slug, content, excerpt, published_at, version
                "#,
            )
            .bind(&post.title)
            .bind(&post.slug)
            .bind(&post.content)
            .bind(&post.excerpt)
            .bind(storage_precision(post.published_at))
            .bind(post.id)
            .bind(post.version)
            .fetch_optional(&self.pool)
            .await?;

            // Zero rows: either the id is gone or the version moved on.
            updated.ok_or(DataError::EditConflict)
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<(), DataError> {
        if id < 1 {
            return Err(DataError::NotFound);
        }

        bounded(self.timeout, async {
            let result = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(DataError::NotFound);
            }
            Ok(())
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_filtered(&self, title: &str, filters: &Filters) -> Result<(Vec<Post>, Metadata), DataError> {
        bounded(self.timeout, async {
            let mut builder = QueryBuilder::<Postgres>::new(
                "SELECT count(*) OVER() AS total_records, p.id, p.created_at, p.updated_at, p.title, \
                 p.slug, p.content, p.excerpt, p.published_at, p.version FROM posts p",
            );
            push_listing_tail(&mut builder, title, filters);

            let rows: Vec<ListingRow> = builder.build_query_as().fetch_all(&self.pool).await?;

            let total_records = rows.first().map_or(0, |row| row.total_records);
            let posts = rows.into_iter().map(|row| row.post).collect();

            Ok::<_, DataError>((posts, calculate_metadata(total_records, filters.page, filters.page_size)))
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_filtered_with_featured_image(
        &self,
        title: &str,
        filters: &Filters,
    ) -> Result<(Vec<Post>, Metadata), DataError> {
        bounded(self.timeout, async {
            let mut builder = QueryBuilder::<Postgres>::new(
                "SELECT count(*) OVER() AS total_records, p.id, p.created_at, p.updated_at, p.title, \
                 p.slug, p.content, p.excerpt, p.published_at, p.version, \
                 CASE WHEN i.id IS NULL THEN NULL ELSE to_jsonb(i) END AS featured_image \
                 FROM posts p \
                 LEFT JOIN images i ON i.post_id = p.id AND i.is_featured = TRUE",
            );
            push_listing_tail(&mut builder, title, filters);

            let rows: Vec<FeaturedListingRow> = builder.build_query_as().fetch_all(&self.pool).await?;

            let total_records = rows.first().map_or(0, |row| row.total_records);
            let posts = rows
                .into_iter()
                .map(|row| {
                    let mut post = row.post;
                    post.featured_image = row.featured_image.map(|image| image.0);
                    post
                })
                .collect();

            Ok::<_, DataError>((posts, calculate_metadata(total_records, filters.page, filters.page_size)))
        })
        .await
    }

    async fn get_with_images(&self, id: i64) -> Result<Post, DataError> {
        if id < 1 {
            return Err(DataError::NotFound);
        }

        bounded(self.timeout, async {
            let sql = format!("{SELECT_WITH_IMAGES} WHERE p.id = $1 GROUP BY p.id");
            sqlx::query_as::<_, PostWithImagesRow>(&sql)
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map(PostWithImagesRow::into_post)
                .map_err(not_found)
        })
        .await
    }

    async fn get_by_slug_with_images(&self, slug: &str) -> Result<Post, DataError> {
        if slug.is_empty() {
            return Err(DataError::NotFound);
        }

        bounded(self.timeout, async {
            let sql = format!("{SELECT_WITH_IMAGES} WHERE p.slug = $1 GROUP BY p.id");
            sqlx::query_as::<_, PostWithImagesRow>(&sql)
                .bind(slug)
                .fetch_one(&self.pool)
                .await
                .map(PostWithImagesRow::into_post)
                .map_err(not_found)
        })
        .await
    }
}
