pub mod cursor;
pub mod index;
pub mod table;

pub use cursor::{Cursor, TableCursor};
pub use index::Index;
pub use table::Table;
