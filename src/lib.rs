//! Screech: an embeddable engine for branching narrative text.
//!
//! Source text with `{i}` placeholders and an ordered argument list is parsed
//! into a tree of scopes, lines and choices. A [`core::reader::Reader`] walks
//! that tree one presentable unit at a time, following go-to/return calls and
//! asking gate-capable arguments whether each line or choice is visible.
//! Emitted templates can be turned into [`core::compound::CompoundText`] for
//! character-level playback with inline content markers.

pub mod core;
pub mod schema;
