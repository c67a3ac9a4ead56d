use crate::error::{Error, Result};
use crate::parser::ParseForest;
use crate::zipper::{NodeId, NodeKind};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Half-open range of input symbols `[start, end)`
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Output node. Leaves carry a `value`, interior nodes carry `children`.
/// Packed nodes hold the alternative derivations of one span.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Tree {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Rc<[Tree]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub packed: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Ambiguity {
    /// Keep the first alternative that produces output
    #[default]
    First,
    /// Fail with `Error::Ambiguous`
    Error,
    /// Keep every alternative under a packed node
    Packed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseOptions {
    pub ambiguity: Ambiguity,
    /// `{tag, children: [{value}]}` becomes `{tag, value}`
    pub collapse_single_token_children: bool,
    pub record_spans: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of distinct trees packed in this one
    pub trees: u128,
    pub ambiguous_nodes: usize,
    /// Interior nodes with neither tag nor value (groups)
    pub untagged_nodes: usize,
}

struct Extractor<'f, 'g> {
    forest: &'f ParseForest<'g>,
    opts: &'f ParseOptions,
    // None when every derivation of the node loops back onto itself
    cache: HashMap<NodeId, Option<Vec<Tree>>>,
    active: HashSet<NodeId>,
    cuts: usize,
}

// A result node whose children are being walked
struct Frame<'f> {
    // None for the choice among root derivations
    node: Option<NodeId>,
    tag: Option<&'f str>,
    // children are siblings when set, alternatives otherwise
    sequence: bool,
    children: &'f [NodeId],
    next: usize,
    span: Span,
    cuts: usize,
    kids: Vec<Tree>,
    found: Vec<Vec<Tree>>,
    viable: bool,
    failed: bool,
    done: bool,
}

enum Visit {
    Done(Option<Vec<Tree>>),
    Pushed,
}

///////////////////////////////////////////////////////////////////////////////

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            ambiguity: Ambiguity::First,
            collapse_single_token_children: true,
            record_spans: false,
        }
    }
}

impl ParseOptions {
    pub fn ambiguity(mut self, ambiguity: Ambiguity) -> Self {
        self.ambiguity = ambiguity;
        self
    }

    pub fn collapse_single_token_children(mut self, collapse: bool) -> Self {
        self.collapse_single_token_children = collapse;
        self
    }

    pub fn record_spans(mut self, record: bool) -> Self {
        self.record_spans = record;
        self
    }
}

fn key(tree: &Tree) -> *const Tree {
    tree
}

impl Tree {
    pub fn leaf(value: impl Into<String>) -> Tree {
        Tree { tag: None, value: Some(value.into()), children: None, span: None, packed: false }
    }

    pub fn tagged_leaf(tag: impl Into<String>, value: impl Into<String>) -> Tree {
        Tree {
            tag: Some(tag.into()),
            value: Some(value.into()),
            children: None,
            span: None,
            packed: false,
        }
    }

    pub fn node(tag: impl Into<String>, children: Vec<Tree>) -> Tree {
        Tree {
            tag: Some(tag.into()),
            value: None,
            children: Some(children.into()),
            span: None,
            packed: false,
        }
    }

    /// Untagged interior node standing for several sibling trees
    pub fn group(children: Vec<Tree>) -> Tree {
        Tree { tag: None, value: None, children: Some(children.into()), span: None, packed: false }
    }

    pub fn packed(alternatives: Vec<Tree>) -> Tree {
        Tree { tag: None, value: None, children: Some(alternatives.into()), span: None, packed: true }
    }

    pub fn with_span(mut self, span: Span) -> Tree {
        self.span = Some(span);
        self
    }

    pub fn children(&self) -> &[Tree] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn is_group(&self) -> bool {
        !self.packed && self.tag.is_none() && self.value.is_none() && self.children.is_some()
    }

    pub fn is_value_leaf(&self) -> bool {
        !self.packed && self.tag.is_none() && self.value.is_some()
    }

    // Bottom-up over the nodes reachable through `deps`. Subtrees shared
    // between packed alternatives are computed once.
    fn fold<'t, T>(
        &'t self,
        deps: impl Fn(&'t Tree) -> &'t [Tree],
        mut compute: impl FnMut(&'t Tree, &HashMap<*const Tree, T>) -> T,
    ) -> T {
        let mut done = HashMap::new();
        let mut pending = vec![(self, false)];
        while let Some((tree, ready)) = pending.pop() {
            if done.contains_key(&key(tree)) {
                continue;
            }
            if ready {
                let value = compute(tree, &done);
                done.insert(key(tree), value);
                continue;
            }
            pending.push((tree, true));
            pending.extend(deps(tree).iter()
                .filter(|dep| !done.contains_key(&key(dep)))
                .map(|dep| (dep, false)));
        }
        match done.remove(&key(self)) {
            Some(value) => value,
            None => unreachable!("BUG: fold skipped its root"),
        }
    }

    /// Number of trees this one stands for. Alternatives of packed nodes
    /// add up, siblings multiply.
    pub fn count_trees(&self) -> u128 {
        self.fold(Tree::children, |tree, counts| {
            let counts = tree.children().iter().map(|child| counts[&key(child)]);
            if tree.packed {
                counts.fold(0, u128::saturating_add)
            } else {
                counts.fold(1, u128::saturating_mul)
            }
        })
    }

    /// Node counts are of distinct nodes, shared subtrees count once
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats { trees: self.count_trees(), ..TreeStats::default() };
        let mut seen = HashSet::new();
        let mut pending = vec![self];
        while let Some(tree) = pending.pop() {
            if !seen.insert(key(tree)) {
                continue;
            }
            if tree.packed {
                stats.ambiguous_nodes += 1;
            } else if tree.is_group() {
                stats.untagged_nodes += 1;
            }
            pending.extend(tree.children());
        }
        stats
    }

    // the first alternative of a packed node, groups opened up
    fn first_parts(&self) -> &[Tree] {
        match self.children().first() {
            Some(alt) if alt.is_group() => alt.children(),
            Some(alt) => std::slice::from_ref(alt),
            None => &[],
        }
    }

    fn first_deps(&self) -> &[Tree] {
        match self.packed {
            true => self.first_parts(),
            false => self.children(),
        }
    }

    /// The tree `Ambiguity::First` would have produced
    pub fn first_tree(&self) -> Tree {
        // packed nodes splice their first alternative into the parent
        let mut firsts = self.fold(Tree::first_deps, |tree, done: &HashMap<*const Tree, Vec<Tree>>| {
            let spliced = |trees: &[Tree]| trees.iter()
                .flat_map(|t| done[&key(t)].iter().cloned())
                .collect::<Vec<_>>();
            if tree.packed {
                return spliced(tree.first_parts());
            }
            let mut first = tree.clone();
            if tree.children.is_some() {
                first.children = Some(spliced(tree.children()).into());
            }
            vec![first]
        });
        if self.packed && firsts.len() != 1 {
            let mut group = Tree::group(firsts);
            group.span = self.span;
            return group;
        }
        firsts.swap_remove(0)
    }

    fn label(&self) -> String {
        let label = match (&self.tag, &self.value) {
            _ if self.packed => "<packed>".to_string(),
            (Some(tag), Some(value)) => format!("{} {:?}", tag, value),
            (None, Some(value)) => format!("{:?}", value),
            (Some(tag), None) => tag.clone(),
            (None, None) => "<group>".to_string(),
        };
        match self.span {
            Some(span) => format!("{} @{}..{}", label, span.start, span.end),
            None => label,
        }
    }

    /// Indented dump, one node per line
    pub fn print(&self) -> String {
        let mut lines = Vec::new();
        let mut pending = vec![(self, String::new(), String::new())];
        while let Some((tree, head, indent)) = pending.pop() {
            lines.push(format!("{}{}", head, tree.label()));
            let children = tree.children();
            for (idx, child) in children.iter().enumerate().rev() {
                let (branch, extend) = match idx + 1 == children.len() {
                    true => ("`-- ", "    "),
                    false => ("|-- ", "|   "),
                };
                pending.push((child, format!("{}{}", indent, branch), format!("{}{}", indent, extend)));
            }
        }
        lines.join("\n")
    }
}

// Deep trees would overflow the stack dropping one level per frame
impl Drop for Tree {
    fn drop(&mut self) {
        let Some(children) = self.children.take() else { return };
        let mut pending = vec![children];
        while let Some(mut children) = pending.pop() {
            if let Some(trees) = Rc::get_mut(&mut children) {
                pending.extend(trees.iter_mut().filter_map(|tree| tree.children.take()));
            }
        }
    }
}

impl ParseForest<'_> {
    /// Shape the derivations into one output tree according to `opts`
    pub fn extract(&self, opts: &ParseOptions) -> Result<Tree> {
        let mut extractor = Extractor {
            forest: self,
            opts,
            cache: HashMap::new(),
            active: HashSet::new(),
            cuts: 0,
        };
        let span = Span { start: 0, end: self.tokens };
        let roots = Frame::new(None, None, false, &self.roots, span, 0);
        let mut trees = extractor.run(roots)?.unwrap_or_default();
        if trees.len() == 1 {
            return Ok(trees.swap_remove(0));
        }
        Ok(extractor.spanned(Tree::group(trees), span))
    }

    /// Text consumed under `node`, taking the first derivation of choices
    pub(crate) fn concat(&self, node: NodeId, text: &mut String) {
        let mut pending = vec![node];
        while let Some(node) = pending.pop() {
            match &self.nodes[node.0].kind {
                NodeKind::Seq { value: Some(value), children, .. } if children.is_empty() => {
                    text.push_str(value)
                }
                NodeKind::Seq { children, .. } => pending.extend(children.iter().rev()),
                // first derivations are older than the choice, no cycles here
                NodeKind::Alt { children, .. } => pending.extend(children.first()),
                NodeKind::Omit => (),
                NodeKind::Lex(child) => pending.push(*child),
            }
        }
    }
}

impl<'f> Frame<'f> {
    fn new(
        node: Option<NodeId>,
        tag: Option<&'f str>,
        sequence: bool,
        children: &'f [NodeId],
        span: Span,
        cuts: usize,
    ) -> Self {
        Frame {
            node,
            tag,
            sequence,
            children,
            next: 0,
            span,
            cuts,
            kids: Vec::new(),
            found: Vec::new(),
            viable: false,
            failed: false,
            done: false,
        }
    }

    fn next_child(&mut self) -> Option<NodeId> {
        if self.done {
            return None;
        }
        let child = self.children.get(self.next).copied();
        self.next += 1;
        child
    }

    /// Take the output of the child walked last. Alternatives without
    /// output never count as ambiguity.
    fn receive(&mut self, trees: Option<Vec<Tree>>, ambiguity: Ambiguity) -> Result<()> {
        match (self.sequence, trees) {
            (true, Some(trees)) => self.kids.extend(trees),
            (true, None) => {
                self.failed = true;
                self.done = true;
            }
            (false, None) => (),
            (false, Some(trees)) => {
                self.viable = true;
                if trees.is_empty() {
                    return Ok(());
                }
                match ambiguity {
                    Ambiguity::First => {
                        self.found.push(trees);
                        self.done = true;
                    }
                    Ambiguity::Error if !self.found.is_empty() => return Err(Error::Ambiguous),
                    _ => self.found.push(trees),
                }
            }
        }
        Ok(())
    }
}

impl<'f> Extractor<'f, '_> {
    fn span(&self, node: NodeId) -> Span {
        let node = &self.forest.nodes[node.0];
        Span { start: node.start, end: node.end }
    }

    fn spanned(&self, tree: Tree, span: Span) -> Tree {
        match self.opts.record_spans {
            true => tree.with_span(span),
            false => tree,
        }
    }

    /// Walk the result graph depth first with an explicit stack
    fn run(&mut self, root: Frame<'f>) -> Result<Option<Vec<Tree>>> {
        let mut stack = vec![root];
        let mut returned = None;
        while let Some(frame) = stack.last_mut() {
            if let Some(trees) = returned.take() {
                frame.receive(trees, self.opts.ambiguity)?;
            }
            match frame.next_child() {
                Some(child) => {
                    if let Visit::Done(trees) = self.enter(child, &mut stack) {
                        returned = Some(trees);
                    }
                }
                None => {
                    if let Some(frame) = stack.pop() {
                        returned = Some(self.finish(frame));
                    }
                }
            }
        }
        Ok(returned.flatten())
    }

    // Output of leaves right away, a frame for interior nodes
    fn enter(&mut self, node: NodeId, stack: &mut Vec<Frame<'f>>) -> Visit {
        if let Some(trees) = self.cache.get(&node) {
            return Visit::Done(trees.clone());
        }
        if self.active.contains(&node) {
            log::trace!("cyclic derivation through node {}", node.0);
            self.cuts += 1;
            return Visit::Done(None);
        }
        let forest = self.forest;
        let span = self.span(node);
        let (tag, sequence, children) = match &forest.nodes[node.0].kind {
            NodeKind::Seq { tag: None, value: None, children } if children.is_empty() => {
                return Visit::Done(Some(Vec::new()));
            }
            NodeKind::Seq { tag, value, children } if children.is_empty() => {
                let value = value.clone().unwrap_or_default();
                let leaf = match tag {
                    Some(tag) => Tree::tagged_leaf(*tag, value),
                    None => Tree::leaf(value),
                };
                return Visit::Done(Some(vec![self.spanned(leaf, span)]));
            }
            NodeKind::Seq { tag, children, .. } => (*tag, true, children.as_slice()),
            NodeKind::Alt { tag, children } => (*tag, false, children.as_slice()),
            NodeKind::Omit => return Visit::Done(Some(Vec::new())),
            NodeKind::Lex(child) => {
                let mut text = String::new();
                forest.concat(*child, &mut text);
                return Visit::Done(Some(vec![self.spanned(Tree::leaf(text), span)]));
            }
        };
        self.active.insert(node);
        stack.push(Frame::new(Some(node), tag, sequence, children, span, self.cuts));
        Visit::Pushed
    }

    fn finish(&mut self, mut frame: Frame<'f>) -> Option<Vec<Tree>> {
        let span = frame.span;
        let trees = match frame.sequence {
            true if frame.failed => None,
            true => Some(std::mem::take(&mut frame.kids)),
            false if !frame.viable => None,
            false => Some(match frame.found.len() {
                0 => Vec::new(),
                1 => frame.found.swap_remove(0),
                _ => vec![self.pack(std::mem::take(&mut frame.found), span)],
            }),
        };
        let trees = trees.map(|trees| match frame.tag {
            Some(tag) => vec![self.tag_node(tag, trees, span)],
            None => trees,
        });
        if let Some(node) = frame.node {
            self.active.remove(&node);
            // results depending on a cut are only valid in this context
            if frame.cuts == self.cuts {
                self.cache.insert(node, trees.clone());
            }
        }
        trees
    }

    fn pack(&self, found: Vec<Vec<Tree>>, span: Span) -> Tree {
        let mut alternatives = Vec::new();
        for mut trees in found {
            if trees.len() != 1 {
                alternatives.push(self.spanned(Tree::group(trees), span));
                continue;
            }
            let tree = trees.swap_remove(0);
            match tree.packed {
                true => alternatives.extend(tree.children().iter().cloned()),
                false => alternatives.push(tree),
            }
        }
        self.spanned(Tree::packed(alternatives), span)
    }

    fn tag_node(&self, tag: &str, kids: Vec<Tree>, span: Span) -> Tree {
        let collapse = self.opts.collapse_single_token_children;
        if let [only] = kids.as_slice() {
            let alternatives = only.children();
            let distribute = only.packed
                && (alternatives.iter().all(Tree::is_group)
                    || (collapse && alternatives.iter().any(Tree::is_value_leaf)));
            if distribute {
                let tagged = alternatives.iter()
                    .map(|alt| match alt.is_group() {
                        true => self.tag_node(tag, alt.children().to_vec(), span),
                        false => self.tag_node(tag, vec![alt.clone()], span),
                    })
                    .collect();
                return self.spanned(Tree::packed(tagged), span);
            }
            if collapse && only.is_value_leaf() {
                let value = only.value.clone().unwrap_or_default();
                return self.spanned(Tree::tagged_leaf(tag, value), span);
            }
        }
        self.spanned(Tree::node(tag, kids), span)
    }
}


///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{Span, Tree, TreeStats};

    fn ambiguous_sum() -> Tree {
        // 1+1+1 both ways
        let one = || Tree::tagged_leaf("E", "1");
        let left = Tree::node("E", vec![
            Tree::node("E", vec![one(), Tree::leaf("+"), one()]), Tree::leaf("+"), one()]);
        let right = Tree::node("E", vec![
            one(), Tree::leaf("+"), Tree::node("E", vec![one(), Tree::leaf("+"), one()])]);
        Tree::packed(vec![left, right])
    }

    #[test]
    fn count_trees() {
        assert_eq!(Tree::leaf("a").count_trees(), 1);
        assert_eq!(ambiguous_sum().count_trees(), 2);
        let pair = Tree::group(vec![ambiguous_sum(), Tree::leaf("x"), ambiguous_sum()]);
        assert_eq!(pair.count_trees(), 4);
        let either = Tree::packed(vec![ambiguous_sum(), Tree::leaf("x")]);
        assert_eq!(either.count_trees(), 3);
    }

    #[test]
    fn stats() {
        let tree = Tree::node("S", vec![
            ambiguous_sum(), Tree::packed(vec![Tree::group(vec![Tree::leaf("a")]), Tree::leaf("b")])]);
        assert_eq!(tree.stats(), TreeStats { trees: 4, ambiguous_nodes: 2, untagged_nodes: 1 });
    }

    #[test]
    fn count_shared_alternatives() {
        // each level doubles the count over one shared subtree
        let mut tree = Tree::leaf("1");
        for _ in 0..100 {
            tree = Tree::packed(vec![Tree::node("E", vec![tree.clone()]), Tree::node("F", vec![tree])]);
        }
        assert_eq!(tree.count_trees(), 1u128 << 100);
        assert_eq!(tree.stats().trees, 1u128 << 100);
        assert_eq!(tree.first_tree().count_trees(), 1);
    }

    #[test]
    fn deep_chain() {
        let mut tree = Tree::leaf("a");
        for _ in 0..100_000 {
            tree = Tree::node("S", vec![tree]);
        }
        assert_eq!(tree.count_trees(), 1);
        assert_eq!(tree.stats(), TreeStats { trees: 1, ambiguous_nodes: 0, untagged_nodes: 0 });
        assert_eq!(tree.first_tree().count_trees(), 1);
    }

    #[test]
    fn first_tree() {
        let sum = ambiguous_sum();
        assert_eq!(sum.first_tree(), sum.children()[0]);

        // packed children splice their first alternative into the parent
        let tree = Tree::node("S", vec![
            Tree::leaf("x"),
            Tree::packed(vec![Tree::group(vec![Tree::leaf("a"), Tree::leaf("b")]), Tree::leaf("ab")]),
        ]);
        let expected = Tree::node("S", vec![Tree::leaf("x"), Tree::leaf("a"), Tree::leaf("b")]);
        assert_eq!(tree.first_tree(), expected);

        let top = Tree::packed(vec![Tree::group(vec![Tree::leaf("a"), Tree::leaf("b")])]);
        assert_eq!(top.first_tree(), Tree::group(vec![Tree::leaf("a"), Tree::leaf("b")]));
        assert_eq!(expected.first_tree(), expected);
    }

    #[test]
    fn print() {
        let tree = Tree::node("S", vec![
            Tree::node("A", vec![Tree::leaf("a"), Tree::tagged_leaf("B", "b")]),
            ambiguous_sum().children()[1].clone(),
            Tree::packed(vec![Tree::group(vec![Tree::leaf("x")])]),
        ]);
        insta::assert_snapshot!(tree.print(), @r#"
        S
        |-- A
        |   |-- "a"
        |   `-- B "b"
        |-- E
        |   |-- E "1"
        |   |-- "+"
        |   `-- E
        |       |-- E "1"
        |       |-- "+"
        |       `-- E "1"
        `-- <packed>
            `-- <group>
                `-- "x"
        "#);
        let spanned = Tree::leaf("a").with_span(Span { start: 2, end: 3 });
        assert_eq!(spanned.print(), "\"a\" @2..3");
    }

    #[test]
    fn serialize() {
        let tree = Tree::node("S", vec![
            Tree::leaf("a").with_span(Span { start: 0, end: 1 }),
            Tree::packed(vec![Tree::tagged_leaf("B", "b")]),
        ]);
        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(json, concat!(
            r#"{"tag":"S","children":["#,
            r#"{"value":"a","span":{"start":0,"end":1}},"#,
            r#"{"children":[{"tag":"B","value":"b"}],"packed":true}]}"#));
    }
}
