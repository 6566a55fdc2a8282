pub mod api_client;
pub mod auth;
pub mod history_fetcher;

pub use api_client::{ApiClient, BacktestApi};
pub use auth::TokenStore;
pub use history_fetcher::HistoryFetcher;
