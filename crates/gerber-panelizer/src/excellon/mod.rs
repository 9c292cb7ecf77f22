pub mod reader;
pub mod writer;

pub use reader::{parse, read};
pub use writer::{to_string, write};
