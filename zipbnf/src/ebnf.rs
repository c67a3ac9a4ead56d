use crate::error::{Error, Result};
use crate::grammar::{ExprId, Grammar, GrammarBuilder};
use crate::parser::{Rejected, ZipperParser};
use crate::trees::{ParseOptions, Tree};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// The grammar dialect described in itself. Compiling it yields a grammar
/// that parses grammar text into the same trees as the built-in one.
pub const BOOTSTRAP_GRAMMAR: &str = r##"rules = rule (ruleSeparator rule)*
rule = (symbol | hiddenSymbol) optionalSpace <"=" | ":" "=" | ":" ":" "="> optionalSpace exp
<exp> = variable | quantifier | seq | alt
symbol = identifier
hiddenSymbol = <"<"> identifier <">">
omittedSymbol = <"<"> optionalSpace exp optionalSpace <">">
lex = <"["> optionalSpace exp optionalSpace <"]">
token = string
<variable> = symbol | token | regexp | <"("> optionalSpace exp optionalSpace <")"> | omittedSymbol | lex
repStar = variable <"*">
repPlus = variable <"+">
repQuestion = variable <"?">
repExact = variable <"{"> integer <"}">
repMin = variable <"{"> integer <","> <"}">
repMinMax = variable <"{"> integer <","> integer <"}">
<quantifier> = repStar | repPlus | repQuestion | repExact | repMin | repMinMax
<seq_> = variable | quantifier
seq = seq_ (<#"\\s"+> seq_)+
<alt_> = variable | quantifier | seq
alt = alt_ (<optionalSpace "|" optionalSpace> alt_)+
integer = #"[0-9]"+
regexp = <"#"> string
<optionalSpace> = <#"\\s"*>
<ruleSeparator> = <optionalSpace ("
"|";") optionalSpace>
<identifier> = [#"[A-Za-z0-9_-]"+]
<string> = <"\""> [(#"[^\"\\\\]" | <"\\"> "\\" | <"\\"> "\"")*] <"\"">"##;

static BOOTSTRAP: Lazy<Grammar> = Lazy::new(|| {
    bootstrap_grammar().expect("BUG: bootstrap grammar is malformed")
});

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Match multi-char literals one symbol per char
    pub split_literals: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Quantifier {
    Star,
    Plus,
    Question,
    Exact(usize),
    Min(usize),
    MinMax(usize, usize),
}

/// Grammar text as read by the bootstrap parser
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Syntax {
    Symbol(String),
    Literal(String),
    Pattern(String),
    Seq(Vec<Syntax>),
    Alt(Vec<Syntax>),
    Repeat(Box<Syntax>, Quantifier),
    Omitted(Box<Syntax>),
    Lexical(Box<Syntax>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleDef {
    pub name: String,
    /// `<name>` rules don't tag their output
    pub hidden: bool,
    pub body: Syntax,
}

struct Evaluator<'o> {
    builder: GrammarBuilder,
    // name -> (slot, defined), in order of first appearance
    symbols: IndexMap<String, (ExprId, bool)>,
    tokens: HashMap<String, ExprId>,
    opts: &'o CompileOptions,
}

///////////////////////////////////////////////////////////////////////////////

fn omitted(b: &mut GrammarBuilder, literal: &str) -> ExprId {
    let token = b.token(literal);
    b.omit(token)
}

fn bootstrap_grammar() -> Result<Grammar> {
    let mut b = GrammarBuilder::default();
    let lcurly = omitted(&mut b, "{");
    let rcurly = omitted(&mut b, "}");
    let comma = omitted(&mut b, ",");
    let langle = omitted(&mut b, "<");
    let rangle = omitted(&mut b, ">");
    let lparen = omitted(&mut b, "(");
    let rparen = omitted(&mut b, ")");
    let lsquare = omitted(&mut b, "[");
    let rsquare = omitted(&mut b, "]");

    let ident_char = b.regex("[A-Za-z0-9_-]")?;
    let ident_chars = b.rep(ident_char, None, 1, None)?;
    let identifier = b.lex(ident_chars);
    let symbol = b.seq(&[identifier], Some("symbol"));
    let hidden_symbol = b.seq(&[langle, identifier, rangle], Some("hiddenSymbol"));
    let string = b.quoted_string("\"", "\\", None)?;
    let token = b.seq(&[string], Some("token"));
    let hash = omitted(&mut b, "#");
    let regexp = b.seq(&[hash, string], Some("regexp"));
    let newline = b.token("\n");
    // \s includes newlines
    let space = b.regex(r"\s")?;
    let spaces = b.rep(space, None, 0, None)?;
    let optional_space = b.omit(spaces);
    let digit = b.regex("[0-9]")?;
    let integer = b.rep(digit, Some("integer"), 1, None)?;

    let [exp] = b.recs(|b, [exp]| {
        let paren = b.seq(&[lparen, optional_space, exp, optional_space, rparen], None);
        let omitted_symbol = b.seq(
            &[langle, optional_space, exp, optional_space, rangle], Some("omittedSymbol"));
        let lex = b.seq(&[lsquare, optional_space, exp, optional_space, rsquare], Some("lex"));
        let variable = b.alt(&[symbol, token, regexp, paren, omitted_symbol, lex], None);

        let star = omitted(b, "*");
        let plus = omitted(b, "+");
        let question = omitted(b, "?");
        let rep_star = b.seq(&[variable, star], Some("repStar"));
        let rep_plus = b.seq(&[variable, plus], Some("repPlus"));
        let rep_question = b.seq(&[variable, question], Some("repQuestion"));
        let rep_exact = b.seq(&[variable, lcurly, integer, rcurly], Some("repExact"));
        let rep_min = b.seq(&[variable, lcurly, integer, comma, rcurly], Some("repMin"));
        let rep_min_max = b.seq(
            &[variable, lcurly, integer, comma, integer, rcurly], Some("repMinMax"));
        let quantifier = b.alt(
            &[rep_star, rep_plus, rep_question, rep_exact, rep_min, rep_min_max], None);

        let seq_item = b.alt(&[variable, quantifier], None);
        let seq_delimiter = b.rep(space, None, 1, None)?;
        let exp_seq = b.delimited_list(seq_item, seq_delimiter, None, 2, Some("seq"))?;
        let alt_item = b.alt(&[variable, quantifier, exp_seq], None);
        let bar = b.token("|");
        let exp_alt = b.delimited_list(alt_item, bar, Some(spaces), 2, Some("alt"))?;
        Ok([b.alt(&[variable, quantifier, exp_seq, exp_alt], None)])
    })?;

    let colon = b.token(":");
    let eq = b.token("=");
    let colon_eq = b.seq(&[colon, eq], None);
    let colon_colon_eq = b.seq(&[colon, colon, eq], None);
    let equal = b.alt(&[eq, colon_eq, colon_colon_eq], None);
    let equal = b.omit(equal);

    let name = b.alt(&[symbol, hidden_symbol], None);
    let rule = b.seq(&[name, optional_space, equal, optional_space, exp], Some("rule"));
    let semicolon = b.token(";");
    let separator = b.alt(&[newline, semicolon], None);
    let rules = b.delimited_list(rule, separator, Some(optional_space), 1, Some("rules"))?;
    let trailing = b.rep(semicolon, None, 0, Some(1))?;
    let trailing = b.omit(trailing);
    let top = b.seq(&[rules, optional_space, trailing], None);
    b.into_grammar(top)
}

// 1-based line and column of the char at `offset`
fn locate(text: &str, offset: usize) -> Error {
    let (mut line, mut column) = (1, 1);
    for c in text.chars().take(offset) {
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    Error::GrammarSyntax { line, column }
}

/// Parse grammar text into its syntax tree. Surrounding whitespace is ignored.
pub fn parse_grammar(text: &str) -> Result<Tree> {
    let trimmed = text.trim();
    match ZipperParser::new(&BOOTSTRAP).parse_str(trimmed) {
        Ok(forest) => forest.extract(&ParseOptions::default()),
        Err(Rejected { position }) => {
            let skipped = text.chars().count() - text.trim_start().chars().count();
            Err(locate(text, skipped + position))
        }
    }
}

fn malformed(what: &str, tree: &Tree) -> Error {
    Error::MalformedSyntax(format!("{} in {}", what, tree.tag.as_deref().unwrap_or("<group>")))
}

fn value(tree: &Tree) -> Result<String> {
    tree.value.clone().ok_or_else(|| malformed("missing value", tree))
}

// multi-digit integers come as one child per digit when nothing collapses them
fn integer(tree: &Tree) -> Result<usize> {
    if tree.tag.as_deref() != Some("integer") {
        return Err(malformed("expected integer", tree));
    }
    let digits = match &tree.value {
        Some(value) => value.clone(),
        None => tree.children().iter().filter_map(|c| c.value.as_deref()).collect(),
    };
    digits.parse().map_err(|_| malformed("bad integer", tree))
}

impl Quantifier {
    /// Inclusive `(min, max)`, no max means unbounded
    pub fn bounds(&self) -> (usize, Option<usize>) {
        match *self {
            Quantifier::Star => (0, None),
            Quantifier::Plus => (1, None),
            Quantifier::Question => (0, Some(1)),
            Quantifier::Exact(n) => (n, Some(n)),
            Quantifier::Min(n) => (n, None),
            Quantifier::MinMax(n, m) => (n, Some(m)),
        }
    }
}

impl TryFrom<&Tree> for Syntax {
    type Error = Error;

    fn try_from(tree: &Tree) -> Result<Syntax> {
        let children = tree.children();
        let tag = tree.tag.as_deref().ok_or_else(|| malformed("untagged node", tree))?;
        let repeat = |quantifier| -> Result<Syntax> {
            match children.first() {
                Some(inner) => Ok(Syntax::Repeat(Box::new(Syntax::try_from(inner)?), quantifier)),
                None => Err(malformed("missing repeated expression", tree)),
            }
        };
        let single = || -> Result<Box<Syntax>> {
            match children {
                [only] => Ok(Box::new(Syntax::try_from(only)?)),
                _ => Err(malformed("expected one child", tree)),
            }
        };
        let list = || children.iter().map(Syntax::try_from).collect::<Result<Vec<_>>>();
        match (tag, children) {
            ("symbol", _) => Ok(Syntax::Symbol(value(tree)?)),
            ("token", _) => Ok(Syntax::Literal(value(tree)?)),
            ("regexp", _) => Ok(Syntax::Pattern(value(tree)?)),
            ("seq", _) => Ok(Syntax::Seq(list()?)),
            ("alt", _) => Ok(Syntax::Alt(list()?)),
            ("omittedSymbol", _) => Ok(Syntax::Omitted(single()?)),
            ("lex", _) => Ok(Syntax::Lexical(single()?)),
            ("repStar", [_]) => repeat(Quantifier::Star),
            ("repPlus", [_]) => repeat(Quantifier::Plus),
            ("repQuestion", [_]) => repeat(Quantifier::Question),
            ("repExact", [_, n]) => repeat(Quantifier::Exact(integer(n)?)),
            ("repMin", [_, n]) => repeat(Quantifier::Min(integer(n)?)),
            ("repMinMax", [_, n, m]) => repeat(Quantifier::MinMax(integer(n)?, integer(m)?)),
            _ => Err(malformed("unexpected node", tree)),
        }
    }
}

impl TryFrom<&Tree> for RuleDef {
    type Error = Error;

    fn try_from(tree: &Tree) -> Result<RuleDef> {
        match (tree.tag.as_deref(), tree.children()) {
            (Some("rule"), [name, body]) => {
                let hidden = match name.tag.as_deref() {
                    Some("symbol") => false,
                    Some("hiddenSymbol") => true,
                    _ => return Err(malformed("expected rule name", name)),
                };
                Ok(RuleDef { name: value(name)?, hidden, body: Syntax::try_from(body)? })
            }
            _ => Err(malformed("expected rule", tree)),
        }
    }
}

/// Parse grammar text into its rules, in source order
pub fn parse_rules(text: &str) -> Result<Vec<RuleDef>> {
    let tree = parse_grammar(text)?;
    match tree.tag.as_deref() {
        Some("rules") => tree.children().iter().map(RuleDef::try_from).collect(),
        _ => Err(malformed("expected rules", &tree)),
    }
}

impl CompileOptions {
    pub fn split_literals(mut self, split: bool) -> Self {
        self.split_literals = split;
        self
    }
}

impl<'o> Evaluator<'o> {
    fn new(opts: &'o CompileOptions) -> Self {
        Evaluator {
            builder: GrammarBuilder::default(),
            symbols: IndexMap::new(),
            tokens: HashMap::new(),
            opts,
        }
    }

    fn slot(&mut self, name: &str) -> ExprId {
        match self.symbols.get(name) {
            Some(&(slot, _)) => slot,
            None => {
                let slot = self.builder.declare();
                self.symbols.insert(name.to_string(), (slot, false));
                slot
            }
        }
    }

    fn token(&mut self, literal: &str) -> ExprId {
        match self.tokens.get(literal) {
            Some(&token) => token,
            None => {
                let token = self.builder.token(literal);
                self.tokens.insert(literal.to_string(), token);
                token
            }
        }
    }

    // named rules need a node that can carry their tag
    fn tagged(&mut self, expr: ExprId, tag: Option<&str>) -> ExprId {
        match tag {
            Some(_) => self.builder.seq(&[expr], tag),
            None => expr,
        }
    }

    fn eval(&mut self, syntax: &Syntax, tag: Option<&str>) -> Result<ExprId> {
        Ok(match syntax {
            Syntax::Symbol(name) => {
                let slot = self.slot(name);
                self.tagged(slot, tag)
            }
            Syntax::Literal(text) if text.is_empty() => self.builder.seq(&[], tag),
            Syntax::Literal(text) if self.opts.split_literals && text.chars().count() > 1 => {
                let chars = text.chars()
                    .map(|c| self.token(c.encode_utf8(&mut [0; 4])))
                    .collect::<Vec<_>>();
                self.builder.seq(&chars, tag)
            }
            Syntax::Literal(text) => {
                let token = self.token(text);
                self.tagged(token, tag)
            }
            Syntax::Pattern(source) => {
                let regex = self.builder.regex(source)?;
                self.tagged(regex, tag)
            }
            Syntax::Seq(items) => {
                let items = self.eval_all(items)?;
                self.builder.seq(&items, tag)
            }
            Syntax::Alt(items) => {
                let items = self.eval_all(items)?;
                self.builder.alt(&items, tag)
            }
            Syntax::Repeat(inner, quantifier) => {
                let child = self.eval(inner, None)?;
                let (min, max) = quantifier.bounds();
                self.builder.rep(child, tag, min, max)?
            }
            Syntax::Omitted(inner) => {
                let child = self.eval(inner, None)?;
                let omit = self.builder.omit(child);
                self.tagged(omit, tag)
            }
            Syntax::Lexical(inner) => {
                let child = self.eval(inner, None)?;
                let lex = self.builder.lex(child);
                self.tagged(lex, tag)
            }
        })
    }

    fn eval_all(&mut self, items: &[Syntax]) -> Result<Vec<ExprId>> {
        items.iter().map(|item| self.eval(item, None)).collect()
    }

    fn rule(&mut self, rule: &RuleDef) -> Result<ExprId> {
        // the tag of `S` would be lost on the `S` alternative
        if let Syntax::Alt(items) = &rule.body {
            let lists_itself = items.iter()
                .any(|item| matches!(item, Syntax::Symbol(name) if *name == rule.name));
            if !rule.hidden && lists_itself {
                return Err(Error::LostNamedNode(rule.name.clone()));
            }
        }
        let slot = self.slot(&rule.name);
        match self.symbols.get_mut(&rule.name) {
            Some((_, defined)) if !*defined => *defined = true,
            _ => return Err(Error::DuplicateSymbol(rule.name.clone())),
        }
        let tag = (!rule.hidden).then_some(rule.name.as_str());
        let body = self.eval(&rule.body, tag)?;
        self.builder.define(slot, body)?;
        log::debug!("rule {} -> {} (body {})", rule.name, slot, body);
        Ok(slot)
    }

    fn finish(self, start: ExprId) -> Result<Grammar> {
        let undefined: Vec<_> = self.symbols.iter()
            .filter(|(_, (_, defined))| !defined)
            .map(|(name, _)| name.clone())
            .collect();
        if !undefined.is_empty() {
            return Err(Error::UndefinedSymbols(undefined));
        }
        self.builder.into_grammar(start)
    }
}

/// Compile grammar text. The first rule is the start rule.
pub fn compile(text: &str) -> Result<Grammar> {
    compile_with(text, &CompileOptions::default())
}

pub fn compile_with(text: &str, opts: &CompileOptions) -> Result<Grammar> {
    let rules = parse_rules(text)?;
    let mut evaluator = Evaluator::new(opts);
    let mut start = None;
    for rule in &rules {
        let slot = evaluator.rule(rule)?;
        start.get_or_insert(slot);
    }
    let start = start.ok_or_else(|| Error::MalformedSyntax("no rules".to_string()))?;
    evaluator.finish(start)
}


///////////////////////////////////////////////////////////////////////////////
