/// Stateful reader: walks a parsed tree one presentable unit at a time.
///
/// Control flow uses an explicit frame stack. A go-to pushes the destination
/// scope on top of its caller, a return unwinds to just below the nearest
/// scope frame, and running off the end of any scope ends the session.
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

use crate::core::template::Template;
use crate::schema::node::{NodeId, NodeKind, Tree};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReaderError {
    #[error("advance called while a choice is pending")]
    ChoicePending,
    #[error("choose called with no pending choice")]
    NoPendingChoice,
    #[error("choice {index} is out of range for {count} pending choices")]
    ChoiceOutOfRange { index: usize, count: usize },
    #[error("go-to '{target}' on line {} has no destination", .line + 1)]
    UnresolvedGoTo { target: String, line: usize },
}

/// One entry of the traversal stack: a node and the index of its next child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub node: NodeId,
    pub next: usize,
}

impl Frame {
    fn start(node: NodeId) -> Self {
        Self { node, next: 0 }
    }
}

/// What the last successful [`Reader::advance`] produced.
#[derive(Debug, Clone)]
pub enum Output<'a> {
    Line(&'a Template),
    /// Visible options, in document order. Answer with [`Reader::choose`].
    Choices(Vec<&'a Template>),
}

pub struct Reader {
    tree: Arc<Tree>,
    stack: Vec<Frame>,
    pending: Vec<NodeId>,
    is_choice: bool,
    line: Option<NodeId>,
    context: Box<dyn Any>,
}

impl Reader {
    /// Start a session at the root of `tree`. `context` is handed to every
    /// gate test.
    pub fn new<C: Any>(tree: Arc<Tree>, context: C) -> Self {
        let root = tree.root();
        Self {
            tree,
            stack: vec![Frame::start(root)],
            pending: Vec::new(),
            is_choice: false,
            line: None,
            context: Box::new(context),
        }
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    pub fn context(&self) -> &dyn Any {
        &*self.context
    }

    /// Mutable access to the context, if it has type `C`.
    pub fn context_mut<C: Any>(&mut self) -> Option<&mut C> {
        self.context.downcast_mut::<C>()
    }

    pub fn is_choice(&self) -> bool {
        self.is_choice
    }

    /// The traversal stack, bottom first.
    pub fn frames(&self) -> &[Frame] {
        &self.stack
    }

    /// Move to the next presentable unit. Returns `false` once the session is
    /// over.
    ///
    /// # Panics
    ///
    /// Panics if a choice is pending, or if execution reaches a go-to whose
    /// scope was never resolved. Use [`Reader::try_advance`] to get these as
    /// errors.
    pub fn advance(&mut self) -> bool {
        self.try_advance().unwrap_or_else(|e| panic!("{}", e))
    }

    pub fn try_advance(&mut self) -> Result<bool, ReaderError> {
        if self.is_choice {
            return Err(ReaderError::ChoicePending);
        }
        self.line = None;
        let tree = Arc::clone(&self.tree);

        loop {
            let Some(frame) = self.stack.last_mut() else {
                debug!("stack empty, session over");
                return Ok(false);
            };
            let node = tree.node(frame.node);
            let Some(&child_id) = node.children.get(frame.next) else {
                if node.is_scope() {
                    debug!(scope = ?frame.node, "reached end of scope, session over");
                    return Ok(false);
                }
                self.stack.pop();
                continue;
            };
            let child = tree.node(child_id);

            match &child.kind {
                NodeKind::Line(template) => {
                    frame.next += 1;
                    if !template.test_gates(&*self.context, child_id) {
                        trace!(node = ?child_id, "line hidden");
                        continue;
                    }
                    if !child.children.is_empty() {
                        self.stack.push(Frame::start(child_id));
                    }
                    if template.render().trim().is_empty() {
                        continue;
                    }
                    self.line = Some(child_id);
                    return Ok(true);
                }
                NodeKind::Choice(_) => {
                    let start = frame.next;
                    let end = node.children[start..]
                        .iter()
                        .position(|&id| !matches!(tree.node(id).kind, NodeKind::Choice(_)))
                        .map_or(node.children.len(), |offset| start + offset);
                    frame.next = end;

                    let visible: Vec<NodeId> = node.children[start..end]
                        .iter()
                        .copied()
                        .filter(|&id| {
                            tree.node(id)
                                .template()
                                .is_some_and(|t| t.test_gates(&*self.context, id))
                        })
                        .collect();
                    trace!(offered = end - start, visible = visible.len(), "choice run");
                    if visible.is_empty() {
                        continue;
                    }
                    self.pending = visible;
                    self.is_choice = true;
                    return Ok(true);
                }
                NodeKind::Return => {
                    while let Some(popped) = self.stack.pop() {
                        if tree.node(popped.node).is_scope() {
                            break;
                        }
                    }
                    trace!(depth = self.stack.len(), "returned");
                }
                NodeKind::GoTo {
                    target,
                    destination,
                } => {
                    frame.next += 1;
                    let destination = (*destination).ok_or_else(|| ReaderError::UnresolvedGoTo {
                        target: target.clone(),
                        line: child.line,
                    })?;
                    trace!(target = %target, depth = self.stack.len() + 1, "go-to");
                    self.stack.push(Frame::start(destination));
                }
                NodeKind::Comment(_) | NodeKind::CloseChoice | NodeKind::Scope { .. } => {
                    frame.next += 1;
                }
            }
        }
    }

    /// Pick option `index` of the pending choice set.
    ///
    /// # Panics
    ///
    /// Panics if no choice is pending or `index` is out of range. Use
    /// [`Reader::try_choose`] to get these as errors.
    pub fn choose(&mut self, index: usize) {
        self.try_choose(index).unwrap_or_else(|e| panic!("{}", e))
    }

    pub fn try_choose(&mut self, index: usize) -> Result<(), ReaderError> {
        if !self.is_choice {
            return Err(ReaderError::NoPendingChoice);
        }
        let Some(&chosen) = self.pending.get(index) else {
            return Err(ReaderError::ChoiceOutOfRange {
                index,
                count: self.pending.len(),
            });
        };
        debug!(index, node = ?chosen, "chose option");
        self.stack.push(Frame::start(chosen));
        self.pending.clear();
        self.is_choice = false;
        Ok(())
    }

    /// Restart from the top of the root scope. State kept by gate objects is
    /// untouched.
    pub fn reset(&mut self) {
        self.stack.truncate(1);
        match self.stack.first_mut() {
            Some(frame) => frame.next = 0,
            None => self.stack.push(Frame::start(self.tree.root())),
        }
        self.pending.clear();
        self.is_choice = false;
        self.line = None;
    }

    /// The unit produced by the last successful `advance`.
    pub fn output(&self) -> Option<Output<'_>> {
        if self.is_choice {
            Some(Output::Choices(self.choices()))
        } else {
            self.current_line().map(Output::Line)
        }
    }

    pub fn current_line(&self) -> Option<&Template> {
        self.line.and_then(|id| self.tree.node(id).template())
    }

    /// Pending options, empty when no choice is pending.
    pub fn choices(&self) -> Vec<&Template> {
        self.pending
            .iter()
            .filter_map(|&id| self.tree.node(id).template())
            .collect()
    }

    /// Node ids of the pending options, for hosts keying their own state.
    pub fn choice_nodes(&self) -> &[NodeId] {
        &self.pending
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("stack", &self.stack)
            .field("pending", &self.pending)
            .field("is_choice", &self.is_choice)
            .field("line", &self.line)
            .finish_non_exhaustive()
    }
}
