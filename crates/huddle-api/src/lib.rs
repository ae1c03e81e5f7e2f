pub mod error;
pub mod history;
pub mod state;
pub mod users;

pub use error::ApiError;
pub use history::HistoryService;
pub use state::{AppState, AppStateInner};
