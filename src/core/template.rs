/// Composite-format templates: text with `{i}` placeholders plus an argument list.
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use thiserror::Error;

use crate::schema::content::Arg;
use crate::schema::node::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed placeholder at byte {0}")]
    Unclosed(usize),
    #[error("unmatched closing brace at byte {0}")]
    UnmatchedClose(usize),
    #[error("invalid placeholder '{0}'")]
    InvalidPlaceholder(String),
    #[error("placeholder index {index} out of range for {count} arguments")]
    IndexOutOfRange { index: usize, count: usize },
}

/// A parsed piece of a template's format text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text with brace escapes already resolved.
    Literal(String),
    Placeholder(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub index: usize,
    /// Minimum width; positive pads on the left, negative on the right.
    pub alignment: Option<i32>,
    pub format: Option<String>,
}

/// Raw scanner output. Keeps the placeholder suffix verbatim so that
/// compaction can rewrite indices without touching anything else.
#[derive(Debug)]
enum Token<'a> {
    Text(&'a str),
    Brace(char),
    Placeholder { index: usize, suffix: &'a str },
}

fn scan(text: &str) -> Result<Vec<Token<'_>>, TemplateError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                if literal_start < i {
                    tokens.push(Token::Text(&text[literal_start..i]));
                }
                if bytes.get(i + 1) == Some(&b'{') {
                    tokens.push(Token::Brace('{'));
                    i += 2;
                    literal_start = i;
                    continue;
                }

                let close = text[i + 1..]
                    .find(['}', '{', '\n'])
                    .map(|offset| offset + i + 1)
                    .filter(|&end| bytes[end] == b'}')
                    .ok_or(TemplateError::Unclosed(i))?;
                let inner = &text[i + 1..close];
                let digits = inner
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(inner.len());
                let invalid = || TemplateError::InvalidPlaceholder(text[i..=close].to_string());
                if digits == 0 {
                    return Err(invalid());
                }
                let index: usize = inner[..digits].parse().map_err(|_| invalid())?;
                let suffix = &inner[digits..];
                parse_suffix(suffix).ok_or_else(invalid)?;

                tokens.push(Token::Placeholder { index, suffix });
                i = close + 1;
                literal_start = i;
            }
            b'}' => {
                if literal_start < i {
                    tokens.push(Token::Text(&text[literal_start..i]));
                }
                if bytes.get(i + 1) != Some(&b'}') {
                    return Err(TemplateError::UnmatchedClose(i));
                }
                tokens.push(Token::Brace('}'));
                i += 2;
                literal_start = i;
            }
            _ => i += 1,
        }
    }

    if literal_start < text.len() {
        tokens.push(Token::Text(&text[literal_start..]));
    }
    Ok(tokens)
}

/// Widest alignment a placeholder may request, in either direction.
pub const MAX_ALIGNMENT: i32 = 1000;

/// Split `,align:fmt` into its parts. `None` when malformed or when the
/// alignment exceeds [`MAX_ALIGNMENT`].
fn parse_suffix(suffix: &str) -> Option<(Option<i32>, Option<String>)> {
    let (align_part, format) = match suffix.find(':') {
        Some(colon) => (&suffix[..colon], Some(suffix[colon + 1..].to_string())),
        None => (suffix, None),
    };
    let alignment = if align_part.is_empty() {
        None
    } else {
        let value: i32 = align_part.strip_prefix(',')?.trim().parse().ok()?;
        if value.unsigned_abs() > MAX_ALIGNMENT.unsigned_abs() {
            return None;
        }
        Some(value)
    };
    Some((alignment, format))
}

fn segments_of(tokens: &[Token<'_>]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    for token in tokens {
        match token {
            Token::Text(s) => literal.push_str(s),
            Token::Brace(c) => literal.push(*c),
            Token::Placeholder { index, suffix } => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                // Suffixes were validated by the scanner.
                let (alignment, format) = parse_suffix(suffix).unwrap_or_default();
                segments.push(Segment::Placeholder(Placeholder {
                    index: *index,
                    alignment,
                    format,
                }));
            }
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Escape braces so `text` reads literally inside a format string.
pub fn escape(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Format text plus the ordered arguments its placeholders refer to.
///
/// Construction validates that every placeholder is well formed and that its
/// index is below the argument count; templates are immutable afterwards.
#[derive(Clone)]
pub struct Template {
    format: String,
    args: Vec<Arg>,
    segments: Vec<Segment>,
}

impl Template {
    pub fn new(format: impl Into<String>, args: Vec<Arg>) -> Result<Template, TemplateError> {
        let format = format.into();
        let tokens = scan(&format)?;
        for token in &tokens {
            if let Token::Placeholder { index, .. } = token {
                if *index >= args.len() {
                    return Err(TemplateError::IndexOutOfRange {
                        index: *index,
                        count: args.len(),
                    });
                }
            }
        }
        let segments = segments_of(&tokens);
        Ok(Template {
            format,
            args,
            segments,
        })
    }

    /// An argument-free template showing `text` verbatim.
    pub fn text(text: &str) -> Template {
        let segments = if text.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Literal(text.to_string())]
        };
        Template {
            format: escape(text),
            args: Vec::new(),
            segments,
        }
    }

    /// A whole-document template from file contents. Carriage returns are
    /// stripped.
    pub fn from_source(source: &str, args: Vec<Arg>) -> Result<Template, TemplateError> {
        Template::new(source.replace('\r', ""), args)
    }

    pub(crate) fn from_parts(format: String, args: Vec<Arg>, segments: Vec<Segment>) -> Template {
        Template {
            format,
            args,
            segments,
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether any argument carries the conditional-gate capability.
    pub fn has_gate(&self) -> bool {
        self.args.iter().any(|arg| arg.as_gate().is_some())
    }

    /// AND of every gate-capable argument's test. Every gate is consulted,
    /// even after one has failed, so stateful gates see each evaluation.
    pub fn test_gates(&self, context: &dyn Any, node: NodeId) -> bool {
        self.args
            .iter()
            .filter_map(|arg| arg.as_gate())
            .fold(true, |visible, gate| gate.test(context, node) && visible)
    }

    /// Display text: literals plus rendered, aligned arguments.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.format.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(p) => {
                    let value = self.args[p.index].render(p.format.as_deref());
                    push_aligned(&mut out, &value, p.alignment);
                }
            }
        }
        out
    }

    /// Rewrite one physical line of this template into a template of its own.
    ///
    /// Each distinct global index gets a local index in first-occurrence
    /// order; repeats reuse it. Argument handles are shared with `self`, and
    /// alignment/format suffixes are kept verbatim.
    pub fn compact_line(&self, line: &str) -> Result<Template, TemplateError> {
        let tokens = scan(line)?;
        let mut local: FxHashMap<usize, usize> = FxHashMap::default();
        let mut args = Vec::new();
        let mut format = String::with_capacity(line.len());

        for token in &tokens {
            match token {
                Token::Text(s) => format.push_str(s),
                Token::Brace(c) => {
                    format.push(*c);
                    format.push(*c);
                }
                Token::Placeholder { index, suffix } => {
                    let arg = self.args.get(*index).ok_or(TemplateError::IndexOutOfRange {
                        index: *index,
                        count: self.args.len(),
                    })?;
                    let local_index = *local.entry(*index).or_insert_with(|| {
                        args.push(arg.clone());
                        args.len() - 1
                    });
                    format.push('{');
                    format.push_str(&local_index.to_string());
                    format.push_str(suffix);
                    format.push('}');
                }
            }
        }

        let segments = segments_of(&scan(&format)?);
        Ok(Template::from_parts(format, args, segments))
    }
}

pub(crate) fn push_aligned(out: &mut String, value: &str, alignment: Option<i32>) {
    let width = alignment
        .map(|a| a.unsigned_abs().min(MAX_ALIGNMENT.unsigned_abs()) as usize)
        .unwrap_or(0);
    let pad = width.saturating_sub(value.chars().count());
    let left = alignment.is_some_and(|a| a > 0);
    if left {
        out.extend(std::iter::repeat(' ').take(pad));
    }
    out.push_str(value);
    if !left {
        out.extend(std::iter::repeat(' ').take(pad));
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("format", &self.format)
            .field("args", &self.args)
            .finish()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
