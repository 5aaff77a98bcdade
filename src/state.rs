use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{
    config::Config,
    store::{ImageRepository, PgImageStore, PgPostStore, PostRepository},
    utils::uploads::UploadDir,
};

pub type DynPostRepository = Arc<dyn PostRepository>;
pub type DynImageRepository = Arc<dyn ImageRepository>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub posts: DynPostRepository,
    pub images: DynImageRepository,
    pub uploads: UploadDir,
    pub config: Config,
}

impl AppState {
    pub fn new(pool: PgPool, posts: DynPostRepository, images: DynImageRepository, config: Config) -> Self {
        Self {
            pool,
            posts,
            images,
            uploads: UploadDir::new(&config.upload_dir),
            config,
        }
    }

    /// Wires the Postgres stores, each call bounded by `config.db_query_timeout`.
    pub fn with_pool(pool: PgPool, config: Config) -> Self {
        let timeout = config.db_query_timeout;
        Self::new(
            pool.clone(),
            Arc::new(PgPostStore::new(pool.clone(), timeout)),
            Arc::new(PgImageStore::new(pool, timeout)),
            config,
        )
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for DynPostRepository {
    fn from_ref(state: &AppState) -> Self {
        state.posts.clone()
    }
}

impl FromRef<AppState> for DynImageRepository {
    fn from_ref(state: &AppState) -> Self {
        state.images.clone()
    }
}

impl FromRef<AppState> for UploadDir {
    fn from_ref(state: &AppState) -> Self {
        state.uploads.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
