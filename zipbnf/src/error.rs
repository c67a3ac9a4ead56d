/// Failures while building a grammar, compiling grammar text or shaping trees.
/// Not matching the input is not an error, parsing just yields no tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("cannot parse grammar at line {line}, column {column}")]
    GrammarSyntax { line: usize, column: usize },

    #[error("undefined symbols: {}", .0.join(", "))]
    UndefinedSymbols(Vec<String>),

    #[error("symbol {0} already defined")]
    DuplicateSymbol(String),

    #[error("invalid repetition bounds: min {min} is greater than max {max}")]
    InvalidBounds { min: usize, max: usize },

    #[error("delimited list needs at least one item")]
    EmptyList,

    #[error("invalid regex {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("lost named node {0}: the rule lists itself as an alternative")]
    LostNamedNode(String),

    #[error("expression #{0} was declared but never defined")]
    UndefinedExpression(usize),

    #[error("expression #{0} is already defined")]
    RedefinedExpression(usize),

    #[error("malformed grammar syntax tree: {0}")]
    MalformedSyntax(String),

    #[error("ambiguous parse tree")]
    Ambiguous,
}

pub type Result<T> = std::result::Result<T, Error>;
