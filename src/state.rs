use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::external::TriageClient;
use crate::upload::ImageHost;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub image_host: Arc<ImageHost>,
    pub triage: Arc<TriageClient>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let image_host = Arc::new(ImageHost::new(&config.upstream));
        let triage = Arc::new(TriageClient::new(&config.upstream));
        Self {
            db,
            config,
            image_host,
            triage,
        }
    }
}
