use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

/// Index of an expression inside a `Grammar` arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub(crate) usize);

/// A regex terminal. It must match a whole input symbol, not a substring.
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

#[derive(Clone, Debug)]
pub enum Expr {
    /// Matches one input symbol equal to the literal
    Token(String),
    Regex(Pattern),
    Seq { tag: Option<String>, children: Vec<ExprId> },
    Alt { tag: Option<String>, children: Vec<ExprId> },
    /// Bounds are inclusive, no `max` means unbounded
    Rep { tag: Option<String>, child: ExprId, min: usize, max: Option<usize> },
    Omit(ExprId),
    Lex(ExprId),
}

/// Immutable expression graph. Rules may refer to each other in cycles.
#[derive(Clone, Debug)]
pub struct Grammar {
    exprs: Vec<Expr>,
    start: ExprId,
}

/// Builds a Grammar arena. Recursive rules reserve a slot with `declare`
/// and fill it with `define` once their body exists.
#[derive(Default)]
pub struct GrammarBuilder {
    exprs: Vec<Option<Expr>>,
    // slot -> body, for bodies that were still undefined at `define` time
    aliases: Vec<(ExprId, ExprId)>,
}


impl ExprId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self> {
        let invalid = |e: regex::Error| Error::InvalidRegex {
            pattern: source.to_string(),
            reason: e.to_string(),
        };
        // validate on its own first, anchoring could balance stray groups
        Regex::new(source).map_err(invalid)?;
        let regex = Regex::new(&format!("^(?:{})$", source)).map_err(invalid)?;
        Ok(Pattern { source: source.to_string(), regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, symbol: &str) -> bool {
        self.regex.is_match(symbol)
    }
}

impl Expr {
    pub fn tag(&self) -> Option<&str> {
        match self {
            Expr::Seq { tag, .. } | Expr::Alt { tag, .. } | Expr::Rep { tag, .. } => {
                tag.as_deref()
            }
            _ => None,
        }
    }

    /// Only terminals ever match an input symbol directly
    pub fn matches(&self, symbol: &str) -> bool {
        match self {
            Expr::Token(literal) => literal == symbol,
            Expr::Regex(pattern) => pattern.is_match(symbol),
            _ => false,
        }
    }
}

fn join(ids: &[ExprId], sep: &str) -> String {
    ids.iter().map(ExprId::to_string).collect::<Vec<_>>().join(sep)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Token(literal) => write!(f, "{:?}", literal)?,
            Expr::Regex(pattern) => write!(f, "#{:?}", pattern.as_str())?,
            Expr::Seq { children, .. } => write!(f, "seq({})", join(children, " "))?,
            Expr::Alt { children, .. } => write!(f, "alt({})", join(children, " | "))?,
            Expr::Rep { child, min, max: Some(max), .. } => {
                write!(f, "rep({}){{{},{}}}", child, min, max)?
            }
            Expr::Rep { child, min, max: None, .. } => write!(f, "rep({}){{{},}}", child, min)?,
            Expr::Omit(child) => write!(f, "omit({})", child)?,
            Expr::Lex(child) => write!(f, "lex({})", child)?,
        }
        match self.tag() {
            Some(tag) => write!(f, " @{}", tag),
            None => Ok(()),
        }
    }
}

impl Grammar {
    pub fn start(&self) -> ExprId {
        self.start
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0]
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Structural equality of the graphs reachable from both start nodes.
    /// Node identity is ignored, so a shared node equals two equal copies.
    pub fn isomorphic(&self, other: &Grammar) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![(self.start, other.start)];
        while let Some((a, b)) = pending.pop() {
            if !seen.insert((a, b)) {
                continue;
            }
            match (self.expr(a), other.expr(b)) {
                (Expr::Token(x), Expr::Token(y)) if x == y => (),
                (Expr::Regex(x), Expr::Regex(y)) if x.as_str() == y.as_str() => (),
                (Expr::Seq { tag: t1, children: c1 }, Expr::Seq { tag: t2, children: c2 })
                | (Expr::Alt { tag: t1, children: c1 }, Expr::Alt { tag: t2, children: c2 })
                    if t1 == t2 && c1.len() == c2.len() =>
                {
                    pending.extend(c1.iter().copied().zip(c2.iter().copied()));
                }
                (
                    Expr::Rep { tag: t1, child: c1, min: n1, max: m1 },
                    Expr::Rep { tag: t2, child: c2, min: n2, max: m2 },
                ) if t1 == t2 && n1 == n2 && m1 == m2 => pending.push((*c1, *c2)),
                (Expr::Omit(c1), Expr::Omit(c2)) | (Expr::Lex(c1), Expr::Lex(c2)) => {
                    pending.push((*c1, *c2))
                }
                _ => return false,
            }
        }
        true
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "start {}", self.start)?;
        for (idx, expr) in self.exprs.iter().enumerate() {
            writeln!(f, "#{} = {}", idx, expr)?;
        }
        Ok(())
    }
}

impl GrammarBuilder {
    fn push(&mut self, expr: Expr) -> ExprId {
        self.exprs.push(Some(expr));
        ExprId(self.exprs.len() - 1)
    }

    /// An empty literal matches the empty string, it's not a terminal.
    pub fn token(&mut self, literal: impl Into<String>) -> ExprId {
        let literal = literal.into();
        if literal.is_empty() {
            return self.seq(&[], None);
        }
        self.push(Expr::Token(literal))
    }

    pub fn regex(&mut self, pattern: &str) -> Result<ExprId> {
        let pattern = Pattern::new(pattern)?;
        Ok(self.push(Expr::Regex(pattern)))
    }

    pub fn seq(&mut self, children: &[ExprId], tag: Option<&str>) -> ExprId {
        self.push(Expr::Seq { tag: tag.map(str::to_string), children: children.to_vec() })
    }

    pub fn alt(&mut self, children: &[ExprId], tag: Option<&str>) -> ExprId {
        self.push(Expr::Alt { tag: tag.map(str::to_string), children: children.to_vec() })
    }

    pub fn rep(
        &mut self,
        child: ExprId,
        tag: Option<&str>,
        min: usize,
        max: Option<usize>,
    ) -> Result<ExprId> {
        if let Some(max) = max {
            if min > max {
                return Err(Error::InvalidBounds { min, max });
            }
        }
        Ok(self.push(Expr::Rep { tag: tag.map(str::to_string), child, min, max }))
    }

    pub fn omit(&mut self, child: ExprId) -> ExprId {
        self.push(Expr::Omit(child))
    }

    pub fn lex(&mut self, child: ExprId) -> ExprId {
        self.push(Expr::Lex(child))
    }

    /// Reserve a slot that other expressions can reference before it's defined
    pub fn declare(&mut self) -> ExprId {
        self.exprs.push(None);
        ExprId(self.exprs.len() - 1)
    }

    /// Fill a declared slot with a copy of `body`. Referencing the slot is
    /// then the same as referencing the body.
    pub fn define(&mut self, slot: ExprId, body: ExprId) -> Result<()> {
        let taken = self.exprs.get(slot.0).is_none_or(Option::is_some)
            || self.aliases.iter().any(|(s, _)| *s == slot);
        if taken {
            return Err(Error::RedefinedExpression(slot.0));
        }
        match self.exprs.get(body.0).cloned().flatten() {
            Some(expr) => self.exprs[slot.0] = Some(expr),
            // body is itself a pending slot, copy it when finishing
            None => self.aliases.push((slot, body)),
        }
        Ok(())
    }

    /// Letrec helper: reserves `N` slots, builds their bodies with the slots
    /// in scope and defines them.
    pub fn recs<const N: usize, F>(&mut self, bodies: F) -> Result<[ExprId; N]>
        where F: FnOnce(&mut Self, [ExprId; N]) -> Result<[ExprId; N]>
    {
        let slots: [ExprId; N] = std::array::from_fn(|_| self.declare());
        let bodies = bodies(self, slots)?;
        for (slot, body) in slots.into_iter().zip(bodies) {
            self.define(slot, body)?;
        }
        Ok(slots)
    }

    /// `delimiter text delimiter` where text may escape the delimiter or the
    /// escape itself. The text is lexed into a single value.
    pub fn quoted_string(
        &mut self,
        delimiter: &str,
        escape: &str,
        tag: Option<&str>,
    ) -> Result<ExprId> {
        let escape_tok = self.token(escape);
        let escape_omit = self.omit(escape_tok);
        let delimiter_tok = self.token(delimiter);
        let delimiter_omit = self.omit(delimiter_tok);
        let plain = self.regex(&format!(
            "[^{}{}]", regex::escape(delimiter), regex::escape(escape)))?;
        let escaped_escape = self.seq(&[escape_omit, escape_tok], None);
        let escaped_delimiter = self.seq(&[escape_omit, delimiter_tok], None);
        let piece = self.alt(&[plain, escaped_escape, escaped_delimiter], None);
        let chars = self.rep(piece, None, 0, None)?;
        let text = self.lex(chars);
        Ok(self.seq(&[delimiter_omit, text, delimiter_omit], tag))
    }

    /// `item (delimiter item)*` with at least `min_items` items. Delimiters
    /// and the optional `space` around them are omitted.
    pub fn delimited_list(
        &mut self,
        item: ExprId,
        delimiter: ExprId,
        space: Option<ExprId>,
        min_items: usize,
        tag: Option<&str>,
    ) -> Result<ExprId> {
        if min_items < 1 {
            return Err(Error::EmptyList);
        }
        let delimiter = match space {
            Some(space) => self.seq(&[space, delimiter, space], None),
            None => delimiter,
        };
        let delimiter = self.omit(delimiter);
        let next = self.seq(&[delimiter, item], None);
        let rest = self.rep(next, None, min_items - 1, None)?;
        Ok(self.seq(&[item, rest], tag))
    }

    pub fn into_grammar(mut self, start: ExprId) -> Result<Grammar> {
        let mut pending = std::mem::take(&mut self.aliases);
        // alias chains resolve one link per round
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|&(slot, body)| match self.exprs.get(body.0).cloned().flatten() {
                Some(expr) => {
                    self.exprs[slot.0] = Some(expr);
                    false
                }
                None => true,
            });
            if pending.len() == before {
                break;
            }
        }
        let exprs = self.exprs.into_iter().enumerate()
            .map(|(idx, expr)| expr.ok_or(Error::UndefinedExpression(idx)))
            .collect::<Result<Vec<_>>>()?;
        if start.0 >= exprs.len() {
            return Err(Error::UndefinedExpression(start.0));
        }
        Ok(Grammar { exprs, start })
    }
}


///////////////////////////////////////////////////////////////////////////////
