use crate::grammar::ExprId;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoId(pub usize);

/// A matched piece of input. Unlike grammar expressions these can only be
/// sequences, choices, omissions or lexical groups.
#[derive(Debug)]
pub enum NodeKind<'g> {
    /// Terminal matches carry the symbol in `value` and have no children
    Seq { tag: Option<&'g str>, value: Option<String>, children: Vec<NodeId> },
    /// Alternatives found for the same span, in derivation order
    Alt { tag: Option<&'g str>, children: Vec<NodeId> },
    Omit,
    Lex(NodeId),
}

#[derive(Debug)]
pub struct Node<'g> {
    pub kind: NodeKind<'g>,
    pub start: usize,
    pub end: usize,
}

/// Bookkeeping for an expression derived from `start`. Parents registered
/// here are resumed every time the expression completes.
#[derive(Debug)]
pub struct Memo<'g> {
    pub start: usize,
    pub parents: Vec<Cont<'g>>,
    // (end, result) of the latest completion
    pub resolved: Option<(usize, NodeId)>,
}

/// What to do once a sub-derivation completes
#[derive(Clone, Debug)]
pub enum Cont<'g> {
    /// The start expression, accepted only at end of input
    Root,
    Seq { tag: Option<&'g str>, memo: MemoId, done: Matched, rest: &'g [ExprId] },
    Alt { tag: Option<&'g str>, memo: MemoId },
    Rep {
        tag: Option<&'g str>,
        memo: MemoId,
        done: Matched,
        child: ExprId,
        count: usize,
        min: usize,
        max: Option<usize>,
    },
    Omit { memo: MemoId },
    Lex { memo: MemoId },
}

/// A terminal matched the current symbol, it completes at the next position
#[derive(Clone, Copy, Debug)]
pub struct Zipper {
    pub node: NodeId,
    pub memo: MemoId,
}

/// Persistent list of siblings matched so far, newest first. Continuations
/// are resumed many times, so they share the prefix instead of copying it.
#[derive(Clone, Debug, Default)]
pub struct Matched(Option<Rc<Link>>);

#[derive(Debug)]
struct Link {
    node: NodeId,
    next: Matched,
}


impl Node<'_> {
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl Memo<'_> {
    pub fn resolved_at(&self, pos: usize) -> Option<NodeId> {
        match self.resolved {
            Some((end, node)) if end == pos => Some(node),
            _ => None,
        }
    }
}

impl Matched {
    pub fn push(&self, node: NodeId) -> Matched {
        Matched(Some(Rc::new(Link { node, next: self.clone() })))
    }

    /// Oldest first
    pub fn to_vec(&self) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        let mut cursor = &self.0;
        while let Some(link) = cursor {
            nodes.push(link.node);
            cursor = &link.next.0;
        }
        nodes.reverse();
        nodes
    }
}

// Long lists would otherwise drop recursively
impl Drop for Matched {
    fn drop(&mut self) {
        let mut next = self.0.take();
        while let Some(link) = next {
            match Rc::try_unwrap(link) {
                Ok(mut link) => next = link.next.0.take(),
                Err(_) => break,
            }
        }
    }
}


///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{Matched, NodeId};

    #[test]
    fn matched_shares_prefix() {
        let base = Matched::default().push(NodeId(1)).push(NodeId(2));
        let left = base.push(NodeId(3));
        let right = base.push(NodeId(4));
        assert_eq!(left.to_vec(), vec![NodeId(1), NodeId(2), NodeId(3)]);
        assert_eq!(right.to_vec(), vec![NodeId(1), NodeId(2), NodeId(4)]);
        assert_eq!(base.to_vec(), vec![NodeId(1), NodeId(2)]);
        drop(base);
        assert_eq!(left.to_vec().len(), 3);
    }

    #[test]
    fn matched_long_drop() {
        let mut list = Matched::default();
        for idx in 0..200_000 {
            list = list.push(NodeId(idx));
        }
        assert_eq!(list.to_vec().len(), 200_000);
    }
}
