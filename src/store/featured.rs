//! Featured-image coordination.
//!
//! A post has at most one image with `is_featured = TRUE`. Every change to the
//! flag runs inside a transaction that first takes a row lock on the parent
//! post, so concurrent requests for the same post apply one after the other.
//! The partial unique index `images_one_featured_per_post` backs this up at
//! the schema level.

use sqlx::{PgConnection, PgPool};

use super::DataError;

/// Locks the parent post row until the surrounding transaction ends.
///
/// `FOR NO KEY UPDATE` does not conflict with the key-share locks taken by
/// plain image inserts, so only featured changes queue behind it.
pub(crate) async fn lock_post(conn: &mut PgConnection, post_id: i64) -> Result<(), DataError> {
    let locked = sqlx::query("SELECT id FROM posts WHERE id = $1 FOR NO KEY UPDATE")
        .bind(post_id)
        .fetch_optional(&mut *conn)
        .await?;

    locked.map(|_| ()).ok_or(DataError::NotFound)
}

/// Clears the flag on every featured image of the post. Zero rows is fine,
/// and more than one is tolerated.
pub(crate) async fn clear(conn: &mut PgConnection, post_id: i64) -> Result<u64, DataError> {
    let result = sqlx::query(
        r#"
        UPDATE images
        SET is_featured = FALSE, updated_at = NOW(), version = version + 1
        WHERE post_id = $1 AND is_featured = TRUE
        "#,
    )
    .bind(post_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Flags `(image_id, post_id)` as featured. `NotFound` when the image does not
/// exist or belongs to another post.
pub(crate) async fn mark(conn: &mut PgConnection, post_id: i64, image_id: i64) -> Result<(), DataError> {
    let result = sqlx::query(
        r#"
        UPDATE images
        SET is_featured = TRUE, updated_at = NOW(), version = version + 1
        WHERE id = $1 AND post_id = $2
        "#,
    )
    .bind(image_id)
    .bind(post_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DataError::NotFound);
    }
    Ok(())
}

/// Makes `image_id` the post's only featured image, or leaves none featured
/// when `image_id` is `None`.
///
/// The clear never persists on its own: if the target image is missing the
/// transaction is rolled back and the previous featured image stays.
pub(crate) async fn set_featured(pool: &PgPool, post_id: i64, image_id: Option<i64>) -> Result<(), DataError> {
    let mut tx = pool.begin().await?;

    lock_post(&mut tx, post_id).await?;
    let cleared = clear(&mut tx, post_id).await?;

    if let Some(image_id) = image_id {
        if let Err(err) = mark(&mut tx, post_id, image_id).await {
            tx.rollback().await?;
            return Err(err);
        }
    }

    tx.commit().await?;

    tracing::debug!(post_id, ?image_id, cleared, "featured image changed");
    Ok(())
}

/// Removes the flag from one specific image. `NotFound` unless that image is
/// currently the post's featured image.
pub(crate) async fn unset(pool: &PgPool, post_id: i64, image_id: i64) -> Result<(), DataError> {
    let result = sqlx::query(
        r#"
        UPDATE images
        SET is_featured = FALSE, updated_at = NOW(), version = version + 1
        WHERE id = $1 AND post_id = $2 AND is_featured = TRUE
        "#,
    )
    .bind(image_id)
    .bind(post_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DataError::NotFound);
    }
    Ok(())
}
