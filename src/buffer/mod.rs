mod buffer_pool;
mod frame;
mod lru_replacer;
mod page_guard;
mod parallel_buffer_pool;

pub use buffer_pool::*;
pub use frame::*;
pub use lru_replacer::*;
pub use page_guard::{ReadPageGuard, WritePageGuard};
pub use parallel_buffer_pool::*;
