mod error;
pub use crate::error::{Error, Result};

mod grammar;
pub use crate::grammar::{Expr, ExprId, Grammar, GrammarBuilder, Pattern};

mod zipper;
mod parser;
pub use crate::parser::{ParseForest, Rejected, ZipperParser};

mod trees;
pub use crate::trees::{Ambiguity, ParseOptions, Span, Tree, TreeStats};

mod ebnf;
pub use crate::ebnf::{
    compile, compile_with, parse_grammar, parse_rules,
    CompileOptions, Quantifier, RuleDef, Syntax, BOOTSTRAP_GRAMMAR,
};

/// Parse pre-tokenized input, one symbol per item. `Ok(None)` when the
/// input doesn't match.
pub fn parse<I>(tokens: I, grammar: &Grammar, opts: &ParseOptions) -> Result<Option<Tree>>
    where I: IntoIterator, I::Item: AsRef<str>
{
    match ZipperParser::new(grammar).parse(tokens) {
        Ok(forest) => forest.extract(opts).map(Some),
        Err(rejected) => {
            log::debug!("{}", rejected);
            Ok(None)
        }
    }
}

/// Parse `input` one char per symbol
pub fn parse_str(input: &str, grammar: &Grammar, opts: &ParseOptions) -> Result<Option<Tree>> {
    parse(input.chars().map(String::from), grammar, opts)
}

#[cfg(test)]
mod ebnf_test;
