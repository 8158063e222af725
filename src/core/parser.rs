/// Indentation-sensitive parser: document template → node tree.
///
/// Lines are classified by prefix after their indentation is removed:
///
/// - `== name ==` scope header (trailing `=` run optional)
/// - `-> name` go-to
/// - `<-` return
/// - `> label` choice
/// - `<` close-choice marker
/// - `// text` comment
/// - anything else is a line of text
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, trace};

use crate::core::template::{Template, TemplateError};
use crate::schema::issue::{Issue, IssueKind};
use crate::schema::node::{Node, NodeId, NodeKind, Tree};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("scope '{name}' on line {} is already defined", .line + 1)]
    DuplicateScope { name: String, line: usize },
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Parser configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParseOptions {
    /// Hosts treat any reported issue as fatal. The parser itself always
    /// recovers; this flag is carried for the host wrapper.
    pub strict: bool,
    /// Keep `//` comment lines as nodes instead of discarding them.
    pub keep_comments: bool,
}

impl ParseOptions {
    /// Parse options from a RON string, e.g. `(keep_comments: true)`.
    pub fn parse_ron(input: &str) -> Result<ParseOptions, ParseError> {
        Ok(ron::from_str(input)?)
    }

    pub fn load_from_ron(path: &Path) -> Result<ParseOptions, ParseError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }
}

/// Parse a whole-document template, reporting diagnostics to `on_issue` in
/// source order.
///
/// Diagnostics never stop the parse. The only hard failure is a scope name
/// defined twice.
pub fn parse<F>(source: &Template, options: &ParseOptions, mut on_issue: F) -> Result<Tree, ParseError>
where
    F: FnMut(Issue),
{
    let mut builder = Builder::new(source, options, &mut on_issue);
    for (line_no, raw) in source.format().split('\n').enumerate() {
        builder.line(line_no, raw)?;
    }
    builder.finish()
}

/// [`parse`], collecting diagnostics into a vector.
pub fn parse_collect(source: &Template, options: &ParseOptions) -> Result<(Tree, Vec<Issue>), ParseError> {
    let mut issues = Vec::new();
    let tree = parse(source, options, |issue| issues.push(issue))?;
    Ok((tree, issues))
}

#[derive(Debug, PartialEq, Eq)]
enum LineKind<'a> {
    GoTo(&'a str),
    Return(&'a str),
    Choice(&'a str),
    CloseChoice(&'a str),
    Comment(&'a str),
    Line(&'a str),
}

/// The name in a scope header, if `body` is one.
fn scope_header(body: &str) -> Option<&str> {
    if !body.starts_with("==") {
        return None;
    }
    let name = body.trim_start_matches('=').trim_end().trim_end_matches('=');
    Some(name.trim())
}

/// Classify de-indented, non-header line content. Order matters: `<-`
/// before `<`.
fn classify(body: &str) -> LineKind<'_> {
    if let Some(rest) = body.strip_prefix("->") {
        LineKind::GoTo(rest.trim())
    } else if let Some(rest) = body.strip_prefix("<-") {
        LineKind::Return(rest.trim())
    } else if let Some(rest) = body.strip_prefix('>') {
        LineKind::Choice(rest.trim())
    } else if let Some(rest) = body.strip_prefix('<') {
        LineKind::CloseChoice(rest.trim())
    } else if let Some(rest) = body.strip_prefix("//") {
        LineKind::Comment(rest.trim())
    } else {
        LineKind::Line(body.trim_end())
    }
}

/// The indent unit, fixed by the first indented line.
#[derive(Debug)]
struct Indent {
    unit: String,
    tabs: bool,
}

impl Indent {
    fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            tabs: unit.contains('\t'),
        }
    }

    /// Fold foreign whitespace toward the unit: tabs expand to the unit in a
    /// space-indented document; in a tab-indented one, each run of four
    /// spaces and then each stray space counts as a tab.
    fn normalize(&self, ws: &str) -> String {
        if self.tabs {
            ws.replace("    ", "\t").replace(' ', "\t")
        } else {
            ws.replace('\t', &self.unit)
        }
    }
}

struct Builder<'a, F> {
    source: &'a Template,
    options: &'a ParseOptions,
    on_issue: &'a mut F,
    nodes: Vec<Node>,
    scopes: FxHashMap<String, NodeId>,
    root: Option<NodeId>,
    /// Open nodes; `stack[0]` is the current scope and a line at depth `d`
    /// becomes a child of `stack[d]`.
    stack: Vec<NodeId>,
    indent: Option<Indent>,
    gotos: Vec<(NodeId, String)>,
    issue_count: usize,
    /// Set once the current line has an indentation diagnostic, so a
    /// clamped line is not reported twice.
    indent_reported: bool,
}

impl<'a, F> Builder<'a, F>
where
    F: FnMut(Issue),
{
    fn new(source: &'a Template, options: &'a ParseOptions, on_issue: &'a mut F) -> Self {
        Self {
            source,
            options,
            on_issue,
            nodes: Vec::new(),
            scopes: FxHashMap::default(),
            root: None,
            stack: Vec::new(),
            indent: None,
            gotos: Vec::new(),
            issue_count: 0,
            indent_reported: false,
        }
    }

    fn issue(&mut self, kind: IssueKind, line: usize, text: Option<&str>, message: impl Into<String>) {
        let issue = Issue::new(kind, line, text, message);
        trace!(line, kind = issue.kind.name(), message = %issue.message, "parse issue");
        self.issue_count += 1;
        (self.on_issue)(issue);
    }

    fn push_node(&mut self, kind: NodeKind, line: usize) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            kind,
            line,
            children: Vec::new(),
        });
        id
    }

    /// Create the anonymous root scope if nothing has opened one yet.
    fn ensure_root(&mut self, line: usize) {
        if self.root.is_none() {
            let root = self.push_node(
                NodeKind::Scope {
                    name: String::new(),
                },
                line,
            );
            self.root = Some(root);
            self.stack = vec![root];
        }
    }

    fn line(&mut self, line_no: usize, raw: &str) -> Result<(), ParseError> {
        if raw.trim().is_empty() {
            return Ok(());
        }
        let body = raw.trim_start();
        let ws = &raw[..raw.len() - body.len()];
        self.indent_reported = false;

        if let Some(name) = scope_header(body) {
            let depth = self.depth(ws, line_no, raw);
            if depth > 0 && !self.indent_reported {
                self.issue(
                    IssueKind::UnexpectedIndentation,
                    line_no,
                    Some(raw),
                    "scope headers cannot be indented",
                );
            }
            return self.open_scope(name, line_no, raw);
        }

        let kind = classify(body);
        if matches!(kind, LineKind::Comment(_)) && !self.options.keep_comments {
            return Ok(());
        }

        self.ensure_root(line_no);
        let depth = self.depth(ws, line_no, raw);

        let node = match kind {
            LineKind::GoTo(target) => {
                if target.is_empty() {
                    self.issue(IssueKind::TokenEmpty, line_no, Some(raw), "go-to needs a scope name");
                    return Ok(());
                }
                NodeKind::GoTo {
                    target: target.to_string(),
                    destination: None,
                }
            }
            LineKind::Return(rest) => {
                if !rest.is_empty() {
                    self.issue(
                        IssueKind::TokenNonEmpty,
                        line_no,
                        Some(raw),
                        format!("return takes no content, found '{}'", rest),
                    );
                }
                NodeKind::Return
            }
            LineKind::CloseChoice(rest) => {
                if !rest.is_empty() {
                    self.issue(
                        IssueKind::TokenNonEmpty,
                        line_no,
                        Some(raw),
                        format!("close-choice takes no content, found '{}'", rest),
                    );
                }
                NodeKind::CloseChoice
            }
            LineKind::Choice(label) => NodeKind::Choice(self.source.compact_line(label)?),
            LineKind::Comment(text) => NodeKind::Comment(self.source.compact_line(text)?),
            LineKind::Line(text) => {
                if text.trim().is_empty() {
                    return Ok(());
                }
                NodeKind::Line(self.source.compact_line(text)?)
            }
        };

        let parent = self.parent_for(depth, line_no, raw);
        let is_goto = matches!(node, NodeKind::GoTo { .. });
        let id = self.push_node(node, line_no);
        self.nodes[parent.0].children.push(id);
        if is_goto {
            self.gotos.push((id, raw.to_string()));
        }
        Ok(())
    }

    fn open_scope(&mut self, name: &str, line_no: usize, raw: &str) -> Result<(), ParseError> {
        if name.is_empty() {
            self.issue(IssueKind::TokenEmpty, line_no, Some(raw), "scope header needs a name");
            return Ok(());
        }
        if self.scopes.contains_key(name) {
            return Err(ParseError::DuplicateScope {
                name: name.to_string(),
                line: line_no,
            });
        }
        let id = self.push_node(
            NodeKind::Scope {
                name: name.to_string(),
            },
            line_no,
        );
        self.scopes.insert(name.to_string(), id);
        if self.root.is_none() {
            self.root = Some(id);
        }
        self.stack = vec![id];
        debug!(line = line_no, scope = name, "opened scope");
        Ok(())
    }

    /// Measure indentation depth, reporting mixed or over-deep indentation.
    /// The result never exceeds the current stack height.
    fn depth(&mut self, ws: &str, line_no: usize, raw: &str) -> usize {
        if ws.is_empty() {
            return 0;
        }
        let indent = self.indent.get_or_insert_with(|| Indent::new(ws));
        let normalized = indent.normalize(ws);
        let unit_len = indent.unit.len();

        if normalized != ws {
            self.issue(
                IssueKind::MixedIndentation,
                line_no,
                Some(raw),
                "indentation mixes tabs and spaces",
            );
        }
        if normalized.len() % unit_len != 0 {
            self.indent_reported = true;
            self.issue(
                IssueKind::UnexpectedIndentation,
                line_no,
                Some(raw),
                "indentation is not a whole number of indent units",
            );
        }

        let depth = normalized.len() / unit_len;
        let height = self.stack.len();
        if depth > height && !self.indent_reported {
            self.indent_reported = true;
            self.issue(
                IssueKind::UnexpectedIndentation,
                line_no,
                Some(raw),
                format!("indented {} levels where at most {} are open", depth, height),
            );
        }
        depth.min(height)
    }

    /// Pop to `depth` and pick the parent for a line at that depth. A line one
    /// level deeper than the top nests under the top's last child when that
    /// child can own children, and otherwise degrades to a sibling.
    fn parent_for(&mut self, depth: usize, line_no: usize, raw: &str) -> NodeId {
        self.stack.truncate(depth + 1);
        let top = self.stack[self.stack.len() - 1];
        if depth == self.stack.len() {
            let last = self.nodes[top.0].children.last().copied();
            match last {
                Some(last) if self.nodes[last.0].can_own_children() => {
                    self.stack.push(last);
                    return last;
                }
                _ if !self.indent_reported => {
                    self.indent_reported = true;
                    self.issue(
                        IssueKind::UnexpectedIndentation,
                        line_no,
                        Some(raw),
                        "the line above cannot own indented lines",
                    );
                }
                _ => {}
            }
        }
        top
    }

    fn finish(mut self) -> Result<Tree, ParseError> {
        let root = match self.root {
            Some(root) => root,
            None => self.push_node(
                NodeKind::Scope {
                    name: String::new(),
                },
                0,
            ),
        };

        for (id, raw) in std::mem::take(&mut self.gotos) {
            let node = &self.nodes[id.0];
            let line = node.line;
            let NodeKind::GoTo { target, .. } = &node.kind else {
                continue;
            };
            let target = target.clone();
            match self.scopes.get(&target).copied() {
                Some(scope) => {
                    if let NodeKind::GoTo { destination, .. } = &mut self.nodes[id.0].kind {
                        *destination = Some(scope);
                    }
                }
                None => {
                    let message = format!("unknown scope '{}'", target);
                    self.issue(IssueKind::UnknownScope, line, Some(&raw), message);
                }
            }
        }

        debug!(
            nodes = self.nodes.len(),
            scopes = self.scopes.len(),
            issues = self.issue_count,
            "parsed document"
        );
        Ok(Tree::from_parts(self.nodes, root, self.scopes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::content::{Once, Value};

    fn text(source: &str) -> Template {
        Template::from_source(source, vec![]).unwrap()
    }

    fn parse_text(source: &str) -> (Tree, Vec<Issue>) {
        parse_collect(&text(source), &ParseOptions::default()).unwrap()
    }

    fn kinds(issues: &[Issue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn classify_prefixes() {
        assert_eq!(scope_header("=== A ==="), Some("A"));
        assert_eq!(scope_header("== Long name"), Some("Long name"));
        assert_eq!(scope_header("= one equals"), None);
        assert_eq!(classify("-> A"), LineKind::GoTo("A"));
        assert_eq!(classify("<-"), LineKind::Return(""));
        assert_eq!(classify("<- extra"), LineKind::Return("extra"));
        assert_eq!(classify("> pick me"), LineKind::Choice("pick me"));
        assert_eq!(classify(">"), LineKind::Choice(""));
        assert_eq!(classify("< "), LineKind::CloseChoice(""));
        assert_eq!(classify("// note"), LineKind::Comment("note"));
        assert_eq!(classify("- a dash line"), LineKind::Line("- a dash line"));
        assert_eq!(classify("= one equals"), LineKind::Line("= one equals"));
    }

    #[test]
    fn self_loop_scope() {
        let (tree, issues) = parse_text("=== A ===\nline one\n-> A\n");
        assert!(issues.is_empty());
        let a = tree.scope("A").unwrap();
        assert_eq!(tree.root(), a);
        let children = tree.children(a);
        assert_eq!(children.len(), 2);
        assert_eq!(tree.node(children[0]).template().unwrap().format(), "line one");
        assert!(matches!(
            tree.node(children[1]).kind,
            NodeKind::GoTo { destination: Some(d), .. } if d == a
        ));
    }

    #[test]
    fn content_before_header_gets_anonymous_root() {
        let (tree, _) = parse_text("intro\n== A ==\ninside\n");
        let root = tree.node(tree.root());
        assert!(matches!(&root.kind, NodeKind::Scope { name } if name.is_empty()));
        assert_eq!(root.children.len(), 1);
        assert_ne!(tree.scope("A"), Some(tree.root()));
    }

    #[test]
    fn empty_document_has_root() {
        let (tree, issues) = parse_text("\n\n");
        assert!(issues.is_empty());
        assert!(tree.node(tree.root()).is_scope());
        assert!(tree.children(tree.root()).is_empty());
    }

    #[test]
    fn choices_own_children() {
        let (tree, issues) = parse_text("> Choice A\n    Line under A\n> Choice B\n");
        assert!(issues.is_empty());
        let root = tree.children(tree.root());
        assert_eq!(root.len(), 2);
        let under = tree.children(root[0]);
        assert_eq!(under.len(), 1);
        assert_eq!(tree.node(under[0]).template().unwrap().format(), "Line under A");
        assert!(tree.children(root[1]).is_empty());
    }

    #[test]
    fn indenting_under_plain_line_degrades_to_sibling() {
        let (tree, issues) = parse_text("first\n    second\n");
        assert_eq!(kinds(&issues), [IssueKind::UnexpectedIndentation]);
        assert_eq!(issues[0].line, 1);
        assert_eq!(tree.children(tree.root()).len(), 2);
    }

    #[test]
    fn over_deep_indentation_is_clamped() {
        let (tree, issues) = parse_text("> a\n    b\n            deep\n");
        assert_eq!(kinds(&issues), [IssueKind::UnexpectedIndentation]);
        assert_eq!(issues[0].line, 2);
        // Clamped to the choice's level, next to `b`.
        let choice = tree.children(tree.root())[0];
        assert_eq!(tree.children(choice).len(), 2);
    }

    #[test]
    fn gated_line_owns_children() {
        let doc = Template::new("{0}Gate\n    child\n", vec![Once::arg()]).unwrap();
        let (tree, issues) = parse_collect(&doc, &ParseOptions::default()).unwrap();
        assert!(issues.is_empty());
        let gate = tree.children(tree.root())[0];
        assert_eq!(tree.children(gate).len(), 1);
    }

    #[test]
    fn mixed_indentation_reported() {
        let (tree, issues) = parse_text("> a\n    b\n> c\n\tb2\n");
        assert_eq!(kinds(&issues), [IssueKind::MixedIndentation]);
        let root = tree.children(tree.root());
        assert_eq!(tree.children(root[1]).len(), 1);
    }

    #[test]
    fn tab_indentation_folds_spaces() {
        let (tree, issues) = parse_text("> a\n\tb\n> c\n    d\n");
        assert_eq!(kinds(&issues), [IssueKind::MixedIndentation]);
        let root = tree.children(tree.root());
        assert_eq!(tree.children(root[1]).len(), 1);
    }

    #[test]
    fn partial_indent_unit_reported() {
        let (_, issues) = parse_text("> a\n    b\n> c\n      d\n");
        assert_eq!(kinds(&issues), [IssueKind::UnexpectedIndentation]);
    }

    #[test]
    fn token_diagnostics() {
        let (tree, issues) = parse_text("->\n<- now\n== ==\n");
        assert_eq!(
            kinds(&issues),
            [IssueKind::TokenEmpty, IssueKind::TokenNonEmpty, IssueKind::TokenEmpty]
        );
        // Empty go-to dropped, return kept.
        let root = tree.children(tree.root());
        assert_eq!(root.len(), 1);
        assert!(matches!(tree.node(root[0]).kind, NodeKind::Return));
    }

    #[test]
    fn close_choice_with_content_is_kept() {
        let (tree, issues) = parse_text("> a\n< x\n> b\n");
        assert_eq!(kinds(&issues), [IssueKind::TokenNonEmpty]);
        assert_eq!(issues[0].line, 1);
        assert_eq!(issues[0].text.as_deref(), Some("< x"));

        let root = tree.children(tree.root());
        assert_eq!(root.len(), 3);
        assert!(matches!(tree.node(root[1]).kind, NodeKind::CloseChoice));
    }

    #[test]
    fn unknown_scope_reported_after_scan() {
        let (tree, issues) = parse_text("-> Later\n-> Nowhere\n== Later ==\nhi\n");
        assert_eq!(kinds(&issues), [IssueKind::UnknownScope]);
        assert_eq!(issues[0].line, 1);
        let root = tree.children(tree.root());
        assert!(matches!(tree.node(root[0]).kind, NodeKind::GoTo { destination: Some(_), .. }));
        assert!(matches!(tree.node(root[1]).kind, NodeKind::GoTo { destination: None, .. }));
    }

    #[test]
    fn duplicate_scope_is_fatal() {
        let result = parse_collect(&text("== A ==\n== A ==\n"), &ParseOptions::default());
        assert!(matches!(
            result,
            Err(ParseError::DuplicateScope { ref name, line: 1 }) if name == "A"
        ));
    }

    #[test]
    fn comments_dropped_unless_kept() {
        let source = text("// note\nline\n");
        let (tree, _) = parse_collect(&source, &ParseOptions::default()).unwrap();
        assert_eq!(tree.children(tree.root()).len(), 1);

        let keep = ParseOptions {
            keep_comments: true,
            ..ParseOptions::default()
        };
        let (tree, _) = parse_collect(&source, &keep).unwrap();
        let root = tree.children(tree.root());
        assert_eq!(root.len(), 2);
        assert!(matches!(tree.node(root[0]).kind, NodeKind::Comment(_)));
    }

    #[test]
    fn scope_header_resets_nesting() {
        let (tree, issues) = parse_text("== A ==\n> x\n== B ==\n    y\n");
        assert_eq!(kinds(&issues), [IssueKind::UnexpectedIndentation]);
        let b = tree.scope("B").unwrap();
        assert_eq!(tree.children(b).len(), 1);
    }

    #[test]
    fn placeholders_are_compacted_per_line() {
        let args = vec![Value::Int(1).arg(), Value::Int(2).arg(), Value::Int(3).arg()];
        let doc = Template::new("{0} first\n> {2} or {2}\n", args).unwrap();
        let (tree, _) = parse_collect(&doc, &ParseOptions::default()).unwrap();
        let root = tree.children(tree.root());
        let choice = tree.node(root[1]).template().unwrap();
        assert_eq!(choice.format(), "{0} or {0}");
        assert_eq!(choice.render(), "3 or 3");
    }

    #[test]
    fn options_from_ron() {
        let options = ParseOptions::parse_ron("(keep_comments: true)").unwrap();
        assert!(options.keep_comments);
        assert!(!options.strict);
        assert!(ParseOptions::parse_ron("(bogus: 1)").is_err());
    }
}
