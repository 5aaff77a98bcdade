// tests/store_tests.rs

mod common;

use std::time::Duration;

use blog_api::{
    models::{
        filters::{Filters, POST_SORT_SAFELIST},
        image::{Image, ImageOrder},
        post::storage_precision,
    },
    store::{DataError, ImageRepository, PgImageStore, PgPostStore, PostRepository},
};
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;

const TIMEOUT: Duration = Duration::from_secs(5);

fn stores(pool: &PgPool) -> (PgPostStore, PgImageStore) {
    (
        PgPostStore::new(pool.clone(), TIMEOUT),
        PgImageStore::new(pool.clone(), TIMEOUT),
    )
}

fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
    Filters::validate(page, page_size, sort, POST_SORT_SAFELIST).unwrap()
}

fn featured_ids(images: &[Image]) -> Vec<i64> {
    images.iter().filter(|i| i.is_featured).map(|i| i.id).collect()
}

#[tokio::test]
async fn post_update_is_version_gated() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, _) = stores(&pool);

    let created = posts.insert(common::new_post("Versioned", Utc::now())).await.unwrap();
    assert_eq!(created.version, 1);

    let mut edit = created.clone();
    edit.title = "Versioned again".to_string();
    let updated = posts.update(&edit).await.unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.title, "Versioned again");

    // `edit` still carries version 1.
    let mut stale_edit = edit.clone();
    stale_edit.title = "Lost write".to_string();
    let stale = posts.update(&stale_edit).await;
    assert!(matches!(stale, Err(DataError::EditConflict)));

    let stored = posts.get(created.id).await.unwrap();
    assert_eq!(stored.title, "Versioned again");
    assert_eq!(stored.version, 2);
    assert_eq!(stored.updated_at, updated.updated_at);

    posts.delete(created.id).await.unwrap();
    assert!(matches!(posts.get(created.id).await, Err(DataError::NotFound)));
    assert!(matches!(posts.delete(created.id).await, Err(DataError::NotFound)));
}

#[tokio::test]
async fn inserted_post_reads_back_unchanged() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, _) = stores(&pool);

    // Sub-microsecond digits that TIMESTAMPTZ cannot keep.
    let published_at = Utc::now() - ChronoDuration::minutes(5) + ChronoDuration::nanoseconds(789);
    let mut new_post = common::new_post("Round trip", published_at);
    new_post.published_at = published_at;

    let created = posts.insert(new_post.clone()).await.unwrap();
    let fetched = posts.get(created.id).await.unwrap();

    assert_eq!(fetched.version, 1);
    assert_eq!(fetched.title, new_post.title);
    assert_eq!(fetched.slug, new_post.slug);
    assert_eq!(fetched.content, new_post.content);
    assert_eq!(fetched.excerpt, new_post.excerpt);
    assert_eq!(fetched.published_at, storage_precision(published_at));
    assert_eq!(created.published_at, fetched.published_at);
    assert_eq!(created.created_at, fetched.created_at);
}

#[tokio::test]
async fn duplicate_slug_is_a_unique_violation() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, _) = stores(&pool);

    let first = posts.insert(common::new_post("One", Utc::now())).await.unwrap();
    let mut second = common::new_post("Two", Utc::now());
    second.slug = first.slug.clone();

    let err = posts.insert(second).await.unwrap_err();
    assert!(err.is_unique_violation());
    assert_eq!(err.constraint(), Some("posts_slug_key"));

    let by_slug = posts.get_by_slug(&first.slug).await.unwrap();
    assert_eq!(by_slug.id, first.id);
}

#[tokio::test]
async fn listing_hides_future_posts_and_searches_titles() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, _) = stores(&pool);
    let token = common::unique_token();

    let past = posts
        .insert(common::new_post(&format!("Rust {token}"), Utc::now() - ChronoDuration::hours(1)))
        .await
        .unwrap();
    let recent = posts
        .insert(common::new_post(&format!("{token} notes"), Utc::now() - ChronoDuration::minutes(1)))
        .await
        .unwrap();
    posts
        .insert(common::new_post(&format!("Later {token}"), Utc::now() + ChronoDuration::days(1)))
        .await
        .unwrap();
    posts.insert(common::new_post("Unrelated title", Utc::now())).await.unwrap();

    let (found, metadata) = posts.list_filtered(&token, &filters(1, 20, "id")).await.unwrap();

    let ids: Vec<i64> = found.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![past.id, recent.id]);
    assert_eq!(metadata.total_records, 2);
    assert_eq!(metadata.last_page, 1);
}

#[tokio::test]
async fn empty_title_lists_every_published_post() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, _) = stores(&pool);

    let published = posts
        .insert(common::new_post("Visible to all", Utc::now() - ChronoDuration::minutes(1)))
        .await
        .unwrap();
    let scheduled = posts
        .insert(common::new_post("Not yet", Utc::now() + ChronoDuration::days(1)))
        .await
        .unwrap();

    // Newest first, so the rows just inserted sit on the first page.
    let (found, metadata) = posts.list_filtered("", &filters(1, 100, "-id")).await.unwrap();

    let ids: Vec<i64> = found.iter().map(|p| p.id).collect();
    assert!(ids.contains(&published.id));
    assert!(!ids.contains(&scheduled.id));
    assert!(found.iter().all(|p| p.published_at <= Utc::now()));

    // Rows and count come from one statement, so they agree with each other.
    assert!(metadata.total_records >= 1);
    assert_eq!(found.len() as i64, metadata.total_records.min(100));
}

#[tokio::test]
async fn listing_paginates_with_stable_tie_break() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, _) = stores(&pool);
    let token = common::unique_token();

    // Identical titles, so `-title` ordering falls back to id ascending.
    let mut ids = Vec::new();
    for _ in 0..5 {
        let post = posts
            .insert(common::new_post(&format!("Same {token}"), Utc::now() - ChronoDuration::minutes(1)))
            .await
            .unwrap();
        ids.push(post.id);
    }

    let (page_one, metadata) = posts.list_filtered(&token, &filters(1, 2, "-title")).await.unwrap();
    let (page_three, _) = posts.list_filtered(&token, &filters(3, 2, "-title")).await.unwrap();

    assert_eq!(page_one.iter().map(|p| p.id).collect::<Vec<_>>(), ids[..2].to_vec());
    assert_eq!(page_three.iter().map(|p| p.id).collect::<Vec<_>>(), vec![ids[4]]);
    assert_eq!(metadata.total_records, 5);
    assert_eq!(metadata.last_page, 3);
    assert_eq!(metadata.current_page, 1);

    let (past_end, empty) = posts.list_filtered(&token, &filters(9, 2, "id")).await.unwrap();
    assert!(past_end.is_empty());
    assert_eq!(empty.total_records, 0);
    assert_eq!(empty.current_page, 0);
    assert_eq!(empty.last_page, 0);
}

#[tokio::test]
async fn set_featured_keeps_a_single_featured_image() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, images) = stores(&pool);

    let post = posts.insert(common::new_post("Gallery", Utc::now())).await.unwrap();
    let a = images.insert(common::new_image(post.id, false, 0)).await.unwrap();
    let b = images.insert(common::new_image(post.id, false, 1)).await.unwrap();

    images.set_featured(post.id, Some(a.id)).await.unwrap();
    images.set_featured(post.id, Some(b.id)).await.unwrap();
    let all = images.get_by_post_id(post.id).await.unwrap();
    assert_eq!(featured_ids(&all), vec![b.id]);
    assert_eq!(images.get_featured_by_post_id(post.id).await.unwrap().id, b.id);

    // An image of another post is NotFound, and the current featured image survives.
    let other = posts.insert(common::new_post("Other", Utc::now())).await.unwrap();
    let foreign = images.insert(common::new_image(other.id, false, 0)).await.unwrap();
    let err = images.set_featured(post.id, Some(foreign.id)).await;
    assert!(matches!(err, Err(DataError::NotFound)));
    let all = images.get_by_post_id(post.id).await.unwrap();
    assert_eq!(featured_ids(&all), vec![b.id]);

    images.set_featured(post.id, None).await.unwrap();
    let all = images.get_by_post_id(post.id).await.unwrap();
    assert!(featured_ids(&all).is_empty());
    assert!(matches!(
        images.get_featured_by_post_id(post.id).await,
        Err(DataError::NotFound)
    ));
}

#[tokio::test]
async fn concurrent_set_featured_leaves_exactly_one() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, images) = stores(&pool);

    let post = posts.insert(common::new_post("Race", Utc::now())).await.unwrap();
    let mut ids = Vec::new();
    for order in 0..6 {
        ids.push(images.insert(common::new_image(post.id, false, order)).await.unwrap().id);
    }

    let post_id = post.id;
    let handles: Vec<_> = ids
        .iter()
        .map(|&id| {
            let images = images.clone();
            tokio::spawn(async move { images.set_featured(post_id, Some(id)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = images.get_by_post_id(post.id).await.unwrap();
    assert_eq!(featured_ids(&all).len(), 1);
}

#[tokio::test]
async fn inserting_a_featured_image_clears_the_previous_one() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, images) = stores(&pool);

    let post = posts.insert(common::new_post("Covers", Utc::now())).await.unwrap();
    let first = images.insert(common::new_image(post.id, true, 0)).await.unwrap();
    let second = images.insert(common::new_image(post.id, true, 1)).await.unwrap();

    let all = images.get_by_post_id(post.id).await.unwrap();
    assert_eq!(featured_ids(&all), vec![second.id]);
    let first = images.get(first.id).await.unwrap();
    assert!(!first.is_featured);
    assert_eq!(first.version, 2);
}

#[tokio::test]
async fn unset_featured_requires_the_featured_image() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, images) = stores(&pool);

    let post = posts.insert(common::new_post("Unset", Utc::now())).await.unwrap();
    let plain = images.insert(common::new_image(post.id, false, 0)).await.unwrap();
    let cover = images.insert(common::new_image(post.id, true, 1)).await.unwrap();

    assert!(matches!(
        images.unset_featured(post.id, plain.id).await,
        Err(DataError::NotFound)
    ));
    images.unset_featured(post.id, cover.id).await.unwrap();
    assert!(!images.get(cover.id).await.unwrap().is_featured);
}

#[tokio::test]
async fn sort_order_batch_is_all_or_nothing() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, images) = stores(&pool);

    let post = posts.insert(common::new_post("Ordering", Utc::now())).await.unwrap();
    let a = images.insert(common::new_image(post.id, false, 0)).await.unwrap();
    let b = images.insert(common::new_image(post.id, false, 1)).await.unwrap();

    let bad = [ImageOrder { id: a.id, order: 5 }, ImageOrder { id: i64::MAX, order: 0 }];
    assert!(matches!(
        images.update_sort_order(post.id, &bad).await,
        Err(DataError::NotFound)
    ));
    assert_eq!(images.get(a.id).await.unwrap().sort_order, 0);

    let swap = [ImageOrder { id: a.id, order: 1 }, ImageOrder { id: b.id, order: 0 }];
    images.update_sort_order(post.id, &swap).await.unwrap();
    let ordered: Vec<i64> = images.get_by_post_id(post.id).await.unwrap().iter().map(|i| i.id).collect();
    assert_eq!(ordered, vec![b.id, a.id]);

    images.update_sort_order(post.id, &[]).await.unwrap();
}

#[tokio::test]
async fn image_update_is_version_gated_and_keeps_featured_flag() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, images) = stores(&pool);

    let post = posts.insert(common::new_post("Metadata", Utc::now())).await.unwrap();
    let image = images.insert(common::new_image(post.id, true, 0)).await.unwrap();

    let mut edit = image.clone();
    edit.alt_text = Some("A lighthouse".to_string());
    edit.is_featured = false;
    let updated = images.update(&edit).await.unwrap();
    assert_eq!(updated.alt_text.as_deref(), Some("A lighthouse"));
    assert!(updated.is_featured);
    assert_eq!(updated.version, image.version + 1);

    assert!(matches!(images.update(&edit).await, Err(DataError::EditConflict)));
}

#[tokio::test]
async fn post_views_include_images_and_featured_image() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, images) = stores(&pool);
    let token = common::unique_token();

    let post = posts
        .insert(common::new_post(&format!("Illustrated {token}"), Utc::now() - ChronoDuration::minutes(1)))
        .await
        .unwrap();
    let bare = posts
        .insert(common::new_post(&format!("Bare {token}"), Utc::now() - ChronoDuration::minutes(1)))
        .await
        .unwrap();
    let second = images.insert(common::new_image(post.id, false, 1)).await.unwrap();
    let first = images.insert(common::new_image(post.id, true, 0)).await.unwrap();

    let full = posts.get_with_images(post.id).await.unwrap();
    assert_eq!(full.images.iter().map(|i| i.id).collect::<Vec<_>>(), vec![first.id, second.id]);
    assert_eq!(full.featured_image.as_ref().map(|i| i.id), Some(first.id));

    let by_slug = posts.get_by_slug_with_images(&post.slug).await.unwrap();
    assert_eq!(by_slug.images.len(), 2);

    let without = posts.get_with_images(bare.id).await.unwrap();
    assert!(without.images.is_empty());
    assert!(without.featured_image.is_none());

    let (listed, metadata) = posts
        .list_filtered_with_featured_image(&token, &filters(1, 20, "id"))
        .await
        .unwrap();
    assert_eq!(metadata.total_records, 2);
    assert_eq!(listed[0].featured_image.as_ref().map(|i| i.id), Some(first.id));
    assert!(listed[1].featured_image.is_none());
}

#[tokio::test]
async fn deleting_a_post_removes_its_images() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, images) = stores(&pool);

    let post = posts.insert(common::new_post("Doomed", Utc::now())).await.unwrap();
    let image = images.insert(common::new_image(post.id, false, 0)).await.unwrap();

    posts.delete(post.id).await.unwrap();

    assert!(matches!(images.get(image.id).await, Err(DataError::NotFound)));
    assert!(matches!(
        images.get_by_filename(&image.filename).await,
        Err(DataError::NotFound)
    ));
}

#[tokio::test]
async fn image_delete_returns_the_row() {
    let Some(pool) = common::test_pool().await else { return };
    let (posts, images) = stores(&pool);

    let post = posts.insert(common::new_post("Trim", Utc::now())).await.unwrap();
    let image = images.insert(common::new_image(post.id, false, 0)).await.unwrap();

    let deleted = images.delete(image.id).await.unwrap();
    assert_eq!(deleted.file_path, image.file_path);
    assert!(matches!(images.delete(image.id).await, Err(DataError::NotFound)));
}
