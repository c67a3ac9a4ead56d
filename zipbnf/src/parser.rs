use crate::grammar::{Expr, ExprId, Grammar};
use crate::zipper::{Cont, Matched, Memo, MemoId, Node, NodeId, NodeKind, Zipper};
use std::collections::HashMap;

pub struct ZipperParser<'g> {
    pub grammar: &'g Grammar,
}

/// The input didn't match the grammar. `position` is the index of the
/// offending symbol, or the input length if it ended too early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no parse: input rejected at token {position}")]
pub struct Rejected {
    pub position: usize,
}

/// Shared graph of every derivation of the input. Use `extract` to shape
/// it into a Tree.
#[derive(Debug)]
pub struct ParseForest<'g> {
    pub(crate) nodes: Vec<Node<'g>>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) tokens: usize,
}

enum Task<'g> {
    // derive `ExprId` at the current position, then continue with `Cont`
    Down(Cont<'g>, ExprId),
    // a node completed, hand it to its continuation
    Up(NodeId, Cont<'g>),
}

struct Engine<'g> {
    grammar: &'g Grammar,
    nodes: Vec<Node<'g>>,
    memos: Vec<Memo<'g>>,
    table: HashMap<(ExprId, usize), MemoId>,
    tasks: Vec<Task<'g>>,
    zippers: Vec<Zipper>,
    roots: Vec<NodeId>,
    pos: usize,
    token: Option<String>,
}

///////////////////////////////////////////////////////////////////////////////

impl<'g> ZipperParser<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        ZipperParser { grammar }
    }

    /// Each item of `tokens` is one input symbol
    pub fn parse<I>(&self, tokens: I) -> Result<ParseForest<'g>, Rejected>
        where I: IntoIterator, I::Item: AsRef<str>
    {
        let mut tokens = tokens.into_iter().map(|t| t.as_ref().to_string());
        let mut engine = Engine {
            grammar: self.grammar,
            nodes: Vec::new(),
            memos: Vec::new(),
            table: HashMap::new(),
            tasks: Vec::new(),
            zippers: Vec::new(),
            roots: Vec::new(),
            pos: 0,
            token: tokens.next(),
        };
        engine.tasks.push(Task::Down(Cont::Root, self.grammar.start()));
        loop {
            engine.run();
            if engine.token.is_none() {
                break;
            }
            let zippers = std::mem::take(&mut engine.zippers);
            log::debug!("token {}: {} zippers", engine.pos, zippers.len());
            if zippers.is_empty() {
                return Err(Rejected { position: engine.pos });
            }
            engine.pos += 1;
            engine.token = tokens.next();
            // first zipper ends up on top of the stack
            for zipper in zippers.into_iter().rev() {
                engine.resolve(zipper.node, zipper.memo);
            }
        }
        if engine.roots.is_empty() {
            return Err(Rejected { position: engine.pos });
        }
        log::debug!("accepted {} tokens, {} nodes, {} memos",
                    engine.pos, engine.nodes.len(), engine.memos.len());
        Ok(ParseForest { nodes: engine.nodes, roots: engine.roots, tokens: engine.pos })
    }

    /// Parse each char of `input` as a symbol
    pub fn parse_str(&self, input: &str) -> Result<ParseForest<'g>, Rejected> {
        self.parse(input.chars().map(String::from))
    }
}

impl ParseForest<'_> {
    /// Number of nodes in the graph
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct complete derivations of the start expression
    pub fn roots(&self) -> usize {
        self.roots.len()
    }

    /// Number of input symbols consumed
    pub fn tokens(&self) -> usize {
        self.tokens
    }
}

impl<'g> Engine<'g> {
    fn run(&mut self) {
        while let Some(task) = self.tasks.pop() {
            match task {
                Task::Down(cont, expr) => self.down(cont, expr),
                Task::Up(node, cont) => self.up(node, cont),
            }
        }
    }

    fn node(&mut self, kind: NodeKind<'g>, start: usize) -> NodeId {
        self.nodes.push(Node { kind, start, end: self.pos });
        NodeId(self.nodes.len() - 1)
    }

    fn memo(&mut self, parent: Cont<'g>) -> MemoId {
        self.memos.push(Memo { start: self.pos, parents: vec![parent], resolved: None });
        MemoId(self.memos.len() - 1)
    }

    /// Record `node` as completing `memo` here and resume all its parents
    fn resolve(&mut self, node: NodeId, memo: MemoId) {
        let memo = &mut self.memos[memo.0];
        memo.resolved = Some((self.pos, node));
        let parents = memo.parents.clone();
        self.tasks.extend(parents.into_iter().rev().map(|cont| Task::Up(node, cont)));
    }

    fn down(&mut self, cont: Cont<'g>, id: ExprId) {
        if let Some(&memo) = self.table.get(&(id, self.pos)) {
            let memo = &mut self.memos[memo.0];
            if let Some(node) = memo.resolved_at(self.pos) {
                self.tasks.push(Task::Up(node, cont.clone()));
            }
            memo.parents.push(cont);
            return;
        }
        let memo = self.memo(cont);
        self.table.insert((id, self.pos), memo);
        log::trace!("memo {} for {} at {}", memo.0, id, self.pos);

        let grammar = self.grammar;
        match grammar.expr(id) {
            expr @ (Expr::Token(_) | Expr::Regex(_)) => {
                if let Some(token) = self.token.as_ref().filter(|t| expr.matches(t)) {
                    let leaf = NodeKind::Seq { tag: None, value: Some(token.clone()), children: Vec::new() };
                    self.nodes.push(Node { kind: leaf, start: self.pos, end: self.pos + 1 });
                    self.zippers.push(Zipper { node: NodeId(self.nodes.len() - 1), memo });
                }
            }
            Expr::Seq { tag, children } if children.is_empty() => {
                let node = self.node(NodeKind::Seq {
                    tag: tag.as_deref(), value: None, children: Vec::new() }, self.pos);
                self.resolve(node, memo);
            }
            Expr::Seq { tag, children } => {
                let inner = self.memo(Cont::Alt { tag: None, memo });
                let cont = Cont::Seq {
                    tag: tag.as_deref(), memo: inner, done: Matched::default(), rest: &children[1..] };
                self.tasks.push(Task::Down(cont, children[0]));
            }
            Expr::Alt { tag, children } => {
                let tag = tag.as_deref();
                self.tasks.extend(children.iter().rev()
                    .map(|&child| Task::Down(Cont::Alt { tag, memo }, child)));
            }
            &Expr::Rep { ref tag, child, min, max } => {
                let tag = tag.as_deref();
                let inner = self.memo(Cont::Alt { tag: None, memo });
                if max != Some(0) {
                    let cont = Cont::Rep {
                        tag, memo: inner, done: Matched::default(), child, count: 1, min, max };
                    self.tasks.push(Task::Down(cont, child));
                }
                // the empty match goes first
                if min == 0 {
                    let empty = self.node(NodeKind::Seq { tag, value: None, children: Vec::new() }, self.pos);
                    self.resolve(empty, inner);
                }
            }
            &Expr::Omit(child) => self.tasks.push(Task::Down(Cont::Omit { memo }, child)),
            &Expr::Lex(child) => self.tasks.push(Task::Down(Cont::Lex { memo }, child)),
        }
    }

    fn up(&mut self, node: NodeId, cont: Cont<'g>) {
        match cont {
            Cont::Root => {
                if self.token.is_none() && !self.roots.contains(&node) {
                    self.roots.push(node);
                }
            }
            Cont::Seq { tag, memo, done, rest } => {
                let done = done.push(node);
                match rest.split_first() {
                    None => {
                        let start = self.memos[memo.0].start;
                        let seq = self.node(NodeKind::Seq { tag, value: None, children: done.to_vec() }, start);
                        self.resolve(seq, memo);
                    }
                    Some((&next, rest)) => {
                        self.tasks.push(Task::Down(Cont::Seq { tag, memo, done, rest }, next));
                    }
                }
            }
            Cont::Alt { tag, memo } => match self.memos[memo.0].resolved_at(self.pos) {
                Some(existing) if existing == node => (),
                Some(existing) => match &mut self.nodes[existing.0].kind {
                    NodeKind::Alt { children, .. } => {
                        if !children.contains(&node) {
                            children.push(node);
                        }
                    }
                    _ => unreachable!("BUG: choice memo resolved to a non-choice node"),
                },
                None => {
                    let start = self.memos[memo.0].start;
                    let alt = self.node(NodeKind::Alt { tag, children: vec![node] }, start);
                    self.resolve(alt, memo);
                }
            },
            Cont::Rep { tag, memo, done, child, count, min, max } => {
                let done = done.push(node);
                // an empty iteration past the minimum would repeat forever
                let stalled = self.nodes[node.0].is_empty() && count >= min;
                if max.is_none_or(|max| count < max) && !stalled {
                    let cont = Cont::Rep { tag, memo, done: done.clone(), child, count: count + 1, min, max };
                    self.tasks.push(Task::Down(cont, child));
                }
                if count >= min {
                    let start = self.memos[memo.0].start;
                    let seq = self.node(NodeKind::Seq { tag, value: None, children: done.to_vec() }, start);
                    self.resolve(seq, memo);
                }
            }
            Cont::Omit { memo } => {
                let start = self.memos[memo.0].start;
                let omit = self.node(NodeKind::Omit, start);
                self.resolve(omit, memo);
            }
            Cont::Lex { memo } => {
                let start = self.memos[memo.0].start;
                let lex = self.node(NodeKind::Lex(node), start);
                self.resolve(lex, memo);
            }
        }
    }
}
