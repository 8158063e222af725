pub mod content;
pub mod issue;
pub mod node;
