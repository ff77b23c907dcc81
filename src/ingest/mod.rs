pub mod cleaner;
pub mod frame;
pub mod reader;
pub mod store;

pub use cleaner::{clean_frame, CleaningOptions, CleaningReport};
pub use frame::{infer_column_types, ColumnType, DataFrame};
pub use reader::{allowed_file, decode_text, file_extension, parse_csv};
