pub mod compound;
pub mod parser;
pub mod reader;
pub mod template;
