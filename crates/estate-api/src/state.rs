use std::path::PathBuf;
use std::sync::Arc;

use estate_db::Database;
use estate_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub config: ApiConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    /// Directory holding uploaded listing images.
    pub upload_dir: PathBuf,
    /// Base URL that image ids are appended to in responses.
    pub public_file_url: String,
    /// Account that is granted admin rights when it registers.
    pub admin_email: Option<String>,
}

impl AppStateInner {
    pub fn new(db: Database, config: ApiConfig) -> AppState {
        Arc::new(Self {
            db: Arc::new(db),
            dispatcher: Dispatcher::new(),
            config,
        })
    }

    pub fn image_url(&self, image_id: &str) -> String {
        format!("{}/{}", self.config.public_file_url.trim_end_matches('/'), image_id)
    }
}
