pub mod ident;
pub mod pool;

pub use ident::{quote_ident, sanitize_column_name, sanitize_table_name};
pub use pool::create_pool;
