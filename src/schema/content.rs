/// Content objects embedded in templates, and the conditional-gate capability.
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::schema::node::NodeId;

/// A shared template argument.
pub type Arg = Arc<dyn Content>;

/// An opaque object placed at a placeholder position.
///
/// The engine only ever renders content for display and asks it whether it
/// gates visibility. Anything else (audio cues, pauses, runtime text) is for
/// the host to interpret after downcasting through [`Content::as_any`].
pub trait Content: fmt::Debug + Send + Sync {
    /// Display text for this object, honoring an optional format string.
    fn render(&self, format: Option<&str>) -> String;

    /// The conditional-gate capability, if this object has one.
    fn as_gate(&self) -> Option<&dyn Gate> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Capability that can veto the visibility of the line or choice it is
/// embedded in.
///
/// `node` identifies the tree node being tested, so implementations may keep
/// per-node state. `context` is the host value handed to the reader.
pub trait Gate: Send + Sync {
    fn test(&self, context: &dyn Any, node: NodeId) -> bool;
}

/// A plain value that can be interpolated into text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl Value {
    /// Shared handle suitable for a template argument list.
    pub fn arg(self) -> Arg {
        Arc::new(self)
    }
}

impl Content for Value {
    /// Supported formats: `F<n>` fixed decimals for numbers, `D<n>` zero
    /// padding and `X`/`x` hex for integers. Anything else is ignored.
    fn render(&self, format: Option<&str>) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => render_int(*i, format),
            Self::Float(f) => render_float(*f, format),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Content for String {
    fn render(&self, _format: Option<&str>) -> String {
        self.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Content for &'static str {
    fn render(&self, _format: Option<&str>) -> String {
        (*self).to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn precision(format: &str, prefix: char) -> Option<usize> {
    let mut chars = format.chars();
    let head = chars.next()?;
    if !head.eq_ignore_ascii_case(&prefix) {
        return None;
    }
    let rest = chars.as_str();
    if rest.is_empty() {
        Some(0)
    } else {
        rest.parse().ok()
    }
}

fn render_int(value: i64, format: Option<&str>) -> String {
    let Some(format) = format else {
        return value.to_string();
    };
    match format {
        "X" => format!("{:X}", value),
        "x" => format!("{:x}", value),
        _ => {
            if let Some(width) = precision(format, 'D') {
                if value < 0 {
                    format!("-{:0width$}", value.unsigned_abs(), width = width)
                } else {
                    format!("{:0width$}", value, width = width)
                }
            } else if let Some(digits) = precision(format, 'F') {
                format!("{:.digits$}", value as f64, digits = digits)
            } else {
                value.to_string()
            }
        }
    }
}

fn render_float(value: f64, format: Option<&str>) -> String {
    match format.and_then(|f| precision(f, 'F')) {
        Some(digits) => format!("{:.digits$}", value, digits = digits),
        None => value.to_string(),
    }
}

/// Gate that lets each node through the first time it is tested only.
///
/// State outlives [`crate::core::reader::Reader::reset`]; call
/// [`Once::clear`] to forget it.
#[derive(Debug, Default)]
pub struct Once {
    seen: Mutex<FxHashSet<NodeId>>,
}

impl Once {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg() -> Arg {
        Arc::new(Self::new())
    }

    pub fn clear(&self) {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl Gate for Once {
    fn test(&self, _context: &dyn Any, node: NodeId) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(node)
    }
}

impl Content for Once {
    fn render(&self, _format: Option<&str>) -> String {
        String::new()
    }

    fn as_gate(&self) -> Option<&dyn Gate> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type Predicate = dyn Fn(&dyn Any, NodeId) -> bool + Send + Sync;

/// Gate backed by a host closure.
pub struct Condition {
    label: String,
    predicate: Box<Predicate>,
}

impl Condition {
    pub fn new<F>(label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&dyn Any, NodeId) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Condition over a typed context. A context of any other type hides
    /// the unit.
    pub fn on<C, F>(label: impl Into<String>, predicate: F) -> Self
    where
        C: Any,
        F: Fn(&C) -> bool + Send + Sync + 'static,
    {
        let label = label.into();
        let name = label.clone();
        Self::new(label, move |context, _node| match context.downcast_ref::<C>() {
            Some(context) => predicate(context),
            None => {
                warn!(condition = %name, "context has an unexpected type");
                false
            }
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn arg(self) -> Arg {
        Arc::new(self)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Gate for Condition {
    fn test(&self, context: &dyn Any, node: NodeId) -> bool {
        (self.predicate)(context, node)
    }
}

impl Content for Condition {
    fn render(&self, _format: Option<&str>) -> String {
        String::new()
    }

    fn as_gate(&self) -> Option<&dyn Gate> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
