//! Application state shared across request handlers.

use parley_market::Market;
use parley_storage::MemoryStorage;

pub(crate) struct AppState {
    pub(crate) market: Market<MemoryStorage>,
    /// Optional API key for authentication. None = no auth required.
    pub(crate) api_key: Option<String>,
}
