pub mod commands;
pub mod coord;
pub mod lexer;
pub mod macros;
pub mod reader;
pub mod writer;

pub use commands::{Aperture, GerberCommand, MacroDefinition, Operation, OperationCode};
pub use coord::{CoordinateFormat, Units};
pub use reader::{parse, read};
pub use writer::{to_string, write};
