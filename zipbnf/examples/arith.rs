// Parse arithmetic given as arguments: cargo run --example arith -- "1 + 2 * 3"
use zipbnf::{Ambiguity, ParseOptions};

const GRAMMAR: &str = r#"
    expr   = expr <space> ("+" | "-") <space> term | term
    term   = term <space> ("*" | "/") <space> factor | factor
    factor = "-" factor | group
    <group> = num | <"("> <space> expr <space> <")">
    num    = [#"[0-9]"+ ("." #"[0-9]"+)?]
    <space> = <#" "*>
"#;

fn main() -> Result<(), zipbnf::Error> {
    let grammar = zipbnf::compile(GRAMMAR)?;
    let input = std::env::args().skip(1).collect::<Vec<String>>().join(" ");
    let opts = ParseOptions::default().ambiguity(Ambiguity::Packed);
    match zipbnf::parse_str(&input, &grammar, &opts)? {
        Some(tree) => {
            println!("{}", tree.print());
            println!("{} tree(s)", tree.count_trees());
        }
        None => println!("Arith error: cannot parse {:?}", input),
    }
    Ok(())
}
