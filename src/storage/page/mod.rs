mod slotted_page;
mod table_page;

pub use slotted_page::*;
pub use table_page::*;
