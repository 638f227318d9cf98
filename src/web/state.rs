use crate::config::AppConfig;
use crate::db::db_pool::DuckDBConnectionManager;
use crate::db::schema_manager::SchemaManager;
use crate::llm::LlmManager;
use crate::web::templates;
use minijinja::Environment;
use r2d2::Pool;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: Pool<DuckDBConnectionManager>,
    pub template_env: Environment<'static>,
    pub llm_manager: Arc<Mutex<LlmManager>>,
    pub schema_manager: SchemaManager,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db_pool: Pool<DuckDBConnectionManager>,
        llm_manager: LlmManager,
    ) -> Self {
        let template_env = templates::init_templates();
        let schema_manager = SchemaManager::new(db_pool.clone());

        Self {
            config,
            db_pool,
            template_env,
            llm_manager: Arc::new(Mutex::new(llm_manager)),
            schema_manager,
            startup_time: chrono::Utc::now(),
        }
    }
}
