use std::sync::Arc;

use huddle_db::UserDirectory;

use crate::history::HistoryService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub history: HistoryService,
    pub directory: Arc<dyn UserDirectory>,
}
