use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};

use super::{DataError, bounded, featured, not_found};
use crate::models::image::{Image, ImageOrder, NewImage};

macro_rules! image_columns {
    () => {
        "id, post_id, filename, original_filename, file_path, file_size, mime_type, width, height, \
         alt_text, caption, is_featured, sort_order, created_at, updated_at, version"
    };
}

/// Persistence contract for images, always scoped to their parent post.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageRepository: Send + Sync {
    /// Inserts an image. When `image.is_featured` is set, any other featured
    /// image of the post is cleared in the same transaction.
    async fn insert(&self, image: NewImage) -> Result<Image, DataError>;

    async fn get(&self, id: i64) -> Result<Image, DataError>;

    /// All images of a post ordered by sort order, then upload time.
    async fn get_by_post_id(&self, post_id: i64) -> Result<Vec<Image>, DataError>;

    async fn get_featured_by_post_id(&self, post_id: i64) -> Result<Image, DataError>;

    async fn get_by_filename(&self, filename: &str) -> Result<Image, DataError>;

    /// Version-gated metadata update. The featured flag is left untouched;
    /// use `set_featured` / `unset_featured` for that.
    async fn update(&self, image: &Image) -> Result<Image, DataError>;

    /// Deletes the row and returns it, so the caller can remove the file.
    async fn delete(&self, id: i64) -> Result<Image, DataError>;

    /// Applies every `(id, order)` pair in one transaction, or none of them.
    async fn update_sort_order(&self, post_id: i64, orders: &[ImageOrder]) -> Result<(), DataError>;

    /// The only way to change which image of a post is featured. `None`
    /// leaves the post without a featured image.
    async fn set_featured(&self, post_id: i64, image_id: Option<i64>) -> Result<(), DataError>;

    async fn unset_featured(&self, post_id: i64, image_id: i64) -> Result<(), DataError>;
}

/// Postgres-backed [`ImageRepository`].
#[derive(Clone)]
pub struct PgImageStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgImageStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

async fn insert_row(conn: &mut PgConnection, image: &NewImage) -> Result<Image, DataError> {
    sqlx::query_as::<_, Image>(concat!(
        r#"
        INSERT INTO images (post_id, filename, original_filename, file_path, file_size,
                            mime_type, width, height, alt_text, caption, is_featured, sort_order)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING "#,
        image_columns!()
    ))
    .bind(image.post_id)
    .bind(&image.filename)
    .bind(&image.original_filename)
    .bind(&image.file_path)
    .bind(image.file_size)
    .bind(&image.mime_type)
    .bind(image.width)
    .bind(image.height)
    .bind(&image.alt_text)
    .bind(&image.caption)
    .bind(image.is_featured)
    .bind(image.sort_order)
    .fetch_one(&mut *conn)
    .await
    .map_err(DataError::from)
}

#[async_trait]
impl ImageRepository for PgImageStore {
    #[tracing::instrument(level = "debug", skip(self, image), fields(post_id = image.post_id, featured = image.is_featured))]
    async fn insert(&self, image: NewImage) -> Result<Image, DataError> {
        bounded(self.timeout, async {
            let mut tx = self.pool.begin().await?;

            if image.is_featured {
                featured::lock_post(&mut tx, image.post_id).await?;
                featured::clear(&mut tx, image.post_id).await?;
            }
            let inserted = insert_row(&mut tx, &image).await?;

            tx.commit().await?;
            Ok::<_, DataError>(inserted)
        })
        .await
    }

    async fn get(&self, id: i64) -> Result<Image, DataError> {
        if id < 1 {
            return Err(DataError::NotFound);
        }

        bounded(self.timeout, async {
            sqlx::query_as::<_, Image>(concat!("SELECT ", image_columns!(), " FROM images WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(not_found)
        })
        .await
    }

    async fn get_by_post_id(&self, post_id: i64) -> Result<Vec<Image>, DataError> {
        bounded(self.timeout, async {
            sqlx::query_as::<_, Image>(concat!(
                "SELECT ",
                image_columns!(),
                " FROM images WHERE post_id = $1 ORDER BY sort_order, created_at"
            ))
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::from)
        })
        .await
    }

    async fn get_featured_by_post_id(&self, post_id: i64) -> Result<Image, DataError> {
        bounded(self.timeout, async {
            sqlx::query_as::<_, Image>(concat!(
                "SELECT ",
                image_columns!(),
                " FROM images WHERE post_id = $1 AND is_featured = TRUE"
            ))
            .bind(post_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found)
        })
        .await
    }

    async fn get_by_filename(&self, filename: &str) -> Result<Image, DataError> {
        if filename.is_empty() {
            return Err(DataError::NotFound);
        }

        bounded(self.timeout, async {
            sqlx::query_as::<_, Image>(concat!("SELECT ", image_columns!(), " FROM images WHERE filename = $1"))
                .bind(filename)
                .fetch_one(&self.pool)
                .await
                .map_err(not_found)
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self, image), fields(id = image.id, version = image.version))]
    async fn update(&self, image: &Image) -> Result<Image, DataError> {
        bounded(self.timeout, async {
            let updated = sqlx::query_as::<_, Image>(concat!(
                r#"
                UPDATE images
                SET filename = $2, original_filename = $3, file_path = $4, file_size = $5,
                    mime_type = $6, width = $7, height = $8, alt_text = $9, caption = $10,
                    sort_order = $11, updated_at = NOW(), version = version + 1
                WHERE id = $1 AND version = $12
                RETURNING "#,
                image_columns!()
            ))
            .bind(image.id)
            .bind(&image.filename)
            .bind(&image.original_filename)
            .bind(&image.file_path)
            .bind(image.file_size)
            .bind(&image.mime_type)
            .bind(image.width)
            .bind(image.height)
            .bind(&image.alt_text)
            .bind(&image.caption)
            .bind(image.sort_order)
            .bind(image.version)
            .fetch_optional(&self.pool)
            .await?;

            updated.ok_or(DataError::EditConflict)
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<Image, DataError> {
        if id < 1 {
            return Err(DataError::NotFound);
        }

        bounded(self.timeout, async {
            let deleted = sqlx::query_as::<_, Image>(concat!(
                "DELETE FROM images WHERE id = $1 RETURNING ",
                image_columns!()
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            deleted.ok_or(DataError::NotFound)
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self, orders), fields(count = orders.len()))]
    async fn update_sort_order(&self, post_id: i64, orders: &[ImageOrder]) -> Result<(), DataError> {
        if orders.is_empty() {
            return Ok(());
        }

        bounded(self.timeout, async {
            let mut tx = self.pool.begin().await?;

            for order in orders {
                let result = sqlx::query(
                    r#"
                    UPDATE images
                    SET sort_order = $1, updated_at = NOW(), version = version + 1
                    WHERE id = $2 AND post_id = $3
                    "#,
                )
                .bind(order.order)
                .bind(order.id)
                .bind(post_id)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() == 0 {
                    tx.rollback().await?;
                    return Err(DataError::NotFound);
                }
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn set_featured(&self, post_id: i64, image_id: Option<i64>) -> Result<(), DataError> {
        bounded(self.timeout, featured::set_featured(&self.pool, post_id, image_id)).await
    }

    async fn unset_featured(&self, post_id: i64, image_id: i64) -> Result<(), DataError> {
        bounded(self.timeout, featured::unset(&self.pool, post_id, image_id)).await
    }
}
