use crate::channels::senders::ChannelSenders;
use crate::config::AppConfig;
use crate::jobs::JobQueue;
use crate::llm::LLMProvider;
use crate::shared::utils::DbPool;
use std::sync::Arc;

pub struct AppState {
    pub config: AppConfig,
    pub conn: DbPool,
    pub llm_provider: Arc<dyn LLMProvider>,
    pub senders: Arc<ChannelSenders>,
    pub jobs: JobQueue,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            conn: self.conn.clone(),
            llm_provider: Arc::clone(&self.llm_provider),
            senders: Arc::clone(&self.senders),
            jobs: self.jobs.clone(),
        }
    }
}
