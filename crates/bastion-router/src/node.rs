//! Radix tree node implementation.
//!
//! Each node represents one template segment. Matching walks the path
//! segments, trying static children first, then the variable child, then
//! the catch-all child, and backtracks when a branch yields no leaf that
//! accepts the request.

use crate::method_router::MethodRouter;
use crate::params::Params;
use crate::template::{PathTemplate, Segment, Specificity};
use smallvec::SmallVec;

/// Byte ranges of the non-empty segments of a request path.
type SegmentSpans = SmallVec<[(usize, usize); 8]>;

/// Type of path segment in the radix tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Literal segment.
    Static,
    /// Single-segment variable; empty name for `*`.
    Param(String),
    /// Trailing catch-all; empty name for `**`.
    CatchAll(String),
}

/// Route data stored where a template ends.
#[derive(Debug, Clone)]
pub struct Leaf<T> {
    /// The template as first registered at this node.
    pub template: String,
    /// Specificity of the template.
    pub specificity: Specificity,
    /// Per-method values.
    pub methods: MethodRouter<T>,
}

/// A node in the radix tree.
#[derive(Debug, Clone)]
pub struct Node<T> {
    /// The segment text this node represents.
    pub segment: String,

    /// The kind of segment.
    pub kind: SegmentKind,

    /// Route data if a template ends here.
    pub leaf: Option<Leaf<T>>,

    /// Static children, sorted by segment for binary search.
    pub static_children: Vec<Node<T>>,

    /// Variable child (at most one per node).
    pub param_child: Option<Box<Node<T>>>,

    /// Catch-all child (at most one per node, always a leaf).
    pub catch_all_child: Option<Box<Node<T>>>,
}

impl<T> Node<T> {
    fn new(segment: String, kind: SegmentKind) -> Self {
        Self {
            segment,
            kind,
            leaf: None,
            static_children: Vec::new(),
            param_child: None,
            catch_all_child: None,
        }
    }

    /// Creates a root node for the tree.
    #[must_use]
    pub fn root() -> Self {
        Self::new(String::new(), SegmentKind::Static)
    }

    /// Inserts a parsed template into the tree.
    ///
    /// Inserting the same template twice merges the method routers; the
    /// first value registered for a method is kept.
    pub fn insert(&mut self, template: &PathTemplate, methods: MethodRouter<T>) {
        let leaf = Leaf {
            template: template.to_string(),
            specificity: template.specificity(),
            methods,
        };
        self.insert_segments(template.segments(), leaf);
    }

    fn insert_segments(&mut self, segments: &[Segment], leaf: Leaf<T>) {
        let Some((segment, remaining)) = segments.split_first() else {
            self.attach(leaf);
            return;
        };

        let child = match segment {
            Segment::Literal(text) => {
                let idx = match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(text))
                {
                    Ok(idx) => idx,
                    Err(idx) => {
                        self.static_children
                            .insert(idx, Node::new(text.clone(), SegmentKind::Static));
                        idx
                    }
                };
                &mut self.static_children[idx]
            }
            Segment::Variable(name) => {
                let name = name.clone().unwrap_or_default();
                self.param_child
                    .get_or_insert_with(|| {
                        Box::new(Node::new(segment.to_string(), SegmentKind::Param(name)))
                    })
                    .as_mut()
            }
            Segment::CatchAll(name) => {
                let name = name.clone().unwrap_or_default();
                self.catch_all_child
                    .get_or_insert_with(|| {
                        Box::new(Node::new(segment.to_string(), SegmentKind::CatchAll(name)))
                    })
                    .as_mut()
            }
        };
        child.insert_segments(remaining, leaf);
    }

    fn attach(&mut self, leaf: Leaf<T>) {
        if let Some(existing) = &mut self.leaf {
            existing.methods.merge(leaf.methods);
        } else {
            self.leaf = Some(leaf);
        }
    }

    /// Finds the first leaf matching `path` for which `accept` returns true.
    ///
    /// Matched parameters are pushed into `params`.
    pub fn find<'a, F>(
        &'a self,
        path: &'a str,
        params: &mut Params<'a>,
        accept: F,
    ) -> Option<&'a Leaf<T>>
    where
        F: Fn(&Leaf<T>) -> bool,
    {
        let spans = split_spans(path);
        self.match_segments(path, &spans, params, &accept)
    }

    fn match_segments<'a, F>(
        &'a self,
        path: &'a str,
        spans: &[(usize, usize)],
        params: &mut Params<'a>,
        accept: &F,
    ) -> Option<&'a Leaf<T>>
    where
        F: Fn(&Leaf<T>) -> bool,
    {
        let Some((&(start, end), remaining)) = spans.split_first() else {
            if let Some(leaf) = self.leaf.as_ref().filter(|l| accept(*l)) {
                return Some(leaf);
            }
            // A catch-all also matches zero trailing segments.
            return self.match_catch_all(path, spans, params, accept);
        };
        let segment = &path[start..end];

        if let Some(child) = self.find_static_child(segment) {
            if let Some(leaf) = child.match_segments(path, remaining, params, accept) {
                return Some(leaf);
            }
        }

        if let Some(child) = &self.param_child {
            let mark = params.len();
            if let SegmentKind::Param(name) = &child.kind {
                if !name.is_empty() {
                    params.push(name, segment);
                }
            }
            if let Some(leaf) = child.match_segments(path, remaining, params, accept) {
                return Some(leaf);
            }
            params.truncate(mark);
        }

        self.match_catch_all(path, spans, params, accept)
    }

    fn match_catch_all<'a, F>(
        &'a self,
        path: &'a str,
        spans: &[(usize, usize)],
        params: &mut Params<'a>,
        accept: &F,
    ) -> Option<&'a Leaf<T>>
    where
        F: Fn(&Leaf<T>) -> bool,
    {
        let child = self.catch_all_child.as_ref()?;
        let leaf = child.leaf.as_ref().filter(|l| accept(*l))?;
        if let SegmentKind::CatchAll(name) = &child.kind {
            if !name.is_empty() {
                let rest = match (spans.first(), spans.last()) {
                    (Some(&(start, _)), Some(&(_, end))) => &path[start..end],
                    _ => "",
                };
                params.push(name, rest);
            }
        }
        Some(leaf)
    }

    fn find_static_child(&self, segment: &str) -> Option<&Node<T>> {
        self.static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
            .ok()
            .map(|i| &self.static_children[i])
    }
}

fn split_spans(path: &str) -> SegmentSpans {
    let mut spans = SegmentSpans::new();
    let mut start = 0;
    for (i, b) in path.bytes().enumerate() {
        if b == b'/' {
            if i > start {
                spans.push((start, i));
            }
            start = i + 1;
        }
    }
    if path.len() > start {
        spans.push((start, path.len()));
    }
    spans
}
