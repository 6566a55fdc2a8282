pub mod bounded_buffer;
pub mod live_state;
pub mod models;

pub use bounded_buffer::{BoundedBuffer, BufferOrder};
pub use live_state::{format_log_line, LiveState, LiveStore, StoreChange};
