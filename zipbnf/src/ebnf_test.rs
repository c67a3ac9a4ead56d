use crate::{compile, compile_with, parse, parse_grammar, parse_str, Ambiguity, CompileOptions, Error,
            ExprId, Grammar, GrammarBuilder, ParseOptions, Tree, BOOTSTRAP_GRAMMAR};
use indoc::indoc;
use insta::assert_snapshot;

fn build<F>(body: F) -> Grammar
    where F: FnOnce(&mut GrammarBuilder) -> ExprId
{
    let mut b = GrammarBuilder::default();
    let start = body(&mut b);
    b.into_grammar(start).unwrap()
}

fn check_isomorphic(text: &str, expected: Grammar) {
    let compiled = compile(text).unwrap();
    assert!(compiled.isomorphic(&expected),
            "{:?} compiled to\n{}expected\n{}", text, compiled, expected);
}

fn first(grammar: &Grammar, input: &str) -> Option<Tree> {
    parse_str(input, grammar, &ParseOptions::default()).unwrap()
}

fn packed(grammar: &Grammar, input: &str) -> Tree {
    let opts = ParseOptions::default().ambiguity(Ambiguity::Packed);
    parse_str(input, grammar, &opts).unwrap().unwrap()
}

fn leaves(values: &[&str]) -> Vec<Tree> {
    values.iter().map(|v| Tree::leaf(*v)).collect()
}

///////////////////////////////////////////////////////////////////////////////

#[test]
fn compile_token_rules() {
    check_isomorphic(r#"S = "aaa""#, build(|b| {
        let aaa = b.token("aaa");
        b.seq(&[aaa], Some("S"))
    }));
    check_isomorphic(r#"S = "a" "a" "a""#, build(|b| {
        let a = b.token("a");
        b.seq(&[a, a, a], Some("S"))
    }));
    check_isomorphic(r#"S = "a""#, build(|b| {
        let a = b.token("a");
        b.seq(&[a], Some("S"))
    }));
    check_isomorphic(r#"S = """#, build(|b| b.seq(&[], Some("S"))));
    check_isomorphic(r#"S = #"a""#, build(|b| {
        let a = b.regex("a").unwrap();
        b.seq(&[a], Some("S"))
    }));
}

#[test]
fn compile_alternatives() {
    check_isomorphic(r#"S = "a" | "b""#, build(|b| {
        let a = b.token("a");
        let bb = b.token("b");
        b.alt(&[a, bb], Some("S"))
    }));
    check_isomorphic(r#"S = "a" | ("b" "c")"#, build(|b| {
        let a = b.token("a");
        let bb = b.token("b");
        let c = b.token("c");
        let bc = b.seq(&[bb, c], None);
        b.alt(&[a, bc], Some("S"))
    }));
}

#[test]
fn compile_recursion() {
    let left_rec = || build(|b| {
        let [s] = b.recs(|b, [s]| {
            let a = b.token("a");
            let rec = b.seq(&[s, a], None);
            let empty = b.seq(&[], None);
            Ok([b.alt(&[rec, empty], Some("S"))])
        }).unwrap();
        s
    });
    check_isomorphic(r#"S = S "a"| """#, left_rec());
    check_isomorphic(r#"S = (S "a") | """#, left_rec());
    check_isomorphic("S = S", build(|b| {
        let [s] = b.recs(|b, [s]| Ok([b.seq(&[s], Some("S"))])).unwrap();
        s
    }));
}

#[test]
fn compile_two_rules() {
    check_isomorphic(r#"A = "" | ("a" B);B = "b""#, build(|b| {
        let empty = b.seq(&[], None);
        let a = b.token("a");
        let bb = b.token("b");
        let rule_b = b.seq(&[bb], Some("B"));
        let rec = b.seq(&[a, rule_b], None);
        b.alt(&[empty, rec], Some("A"))
    }));
    check_isomorphic(r#"A = "" | ("a" B);B = "b" | A"#, build(|b| {
        let [a, _] = b.recs(|b, [a, bb]| {
            let empty = b.seq(&[], None);
            let ta = b.token("a");
            let tb = b.token("b");
            let rec = b.seq(&[ta, bb], None);
            Ok([b.alt(&[empty, rec], Some("A")), b.alt(&[tb, a], Some("B"))])
        }).unwrap();
        a
    }));
}

#[test]
fn compile_quantifiers() {
    let cases = [
        (r#"S = ("a")*"#, 0, None),
        (r#"S = "a"+"#, 1, None),
        (r#"S = "a"?"#, 0, Some(1)),
        (r#"S = "a"{2}"#, 2, Some(2)),
        (r#"S = "a"{2,}"#, 2, None),
        (r#"S = "a"{2,3}"#, 2, Some(3)),
    ];
    for (text, min, max) in cases {
        check_isomorphic(text, build(|b| {
            let a = b.token("a");
            b.rep(a, Some("S"), min, max).unwrap()
        }));
    }
}

#[test]
fn compile_hidden_rules() {
    check_isomorphic(r#"<S> = "a""#, build(|b| b.token("a")));
    check_isomorphic(r#"<S> = "a" "b""#, build(|b| {
        let a = b.token("a");
        let bb = b.token("b");
        b.seq(&[a, bb], None)
    }));
}

#[test]
fn compile_omitted_and_lex() {
    check_isomorphic(r#"S = <"a">"#, build(|b| {
        let a = b.token("a");
        let omit = b.omit(a);
        b.seq(&[omit], Some("S"))
    }));
    check_isomorphic(r#"S = <"a"> "b""#, build(|b| {
        let a = b.token("a");
        let omit = b.omit(a);
        let bb = b.token("b");
        b.seq(&[omit, bb], Some("S"))
    }));
    check_isomorphic(r#"S = <B> "b";B = "a""#, build(|b| {
        let a = b.token("a");
        let rule_b = b.seq(&[a], Some("B"));
        let omit = b.omit(rule_b);
        let bb = b.token("b");
        b.seq(&[omit, bb], Some("S"))
    }));
    check_isomorphic(r#"S = ["a" "a"]"#, build(|b| {
        let a = b.token("a");
        let aa = b.seq(&[a, a], None);
        let lex = b.lex(aa);
        b.seq(&[lex], Some("S"))
    }));
}

#[test]
fn compile_quoted_string() {
    let text = r#"s = <"\""> [(#"[^\"\\\\]" | <"\\"> "\\" | <"\\"> "\"")*]  <"\"">"#;
    check_isomorphic(text, build(|b| b.quoted_string("\"", "\\", Some("s")).unwrap()));
}

#[test]
fn compile_delimited_list() {
    let text = "l = \"a\" (<<#\"\\\\s\"*> (\"\n\"|\";\") <#\"\\\\s\"*>> \"a\")*";
    check_isomorphic(text, build(|b| {
        let a = b.token("a");
        let newline = b.token("\n");
        let semicolon = b.token(";");
        let delimiter = b.alt(&[newline, semicolon], None);
        let space = b.regex(r"\s").unwrap();
        let spaces = b.rep(space, None, 0, None).unwrap();
        let space = b.omit(spaces);
        b.delimited_list(a, delimiter, Some(space), 1, Some("l")).unwrap()
    }));
}

#[test]
fn compile_assignment_synonyms() {
    let plain = compile(r#"S = "a" | B; B = "b""#).unwrap();
    for text in [r#"S := "a" | B; B ::= "b""#, r#"S::="a" | B;B:="b""#] {
        assert!(compile(text).unwrap().isomorphic(&plain), "{}", text);
    }
}

#[test]
fn compile_optional_spaces() {
    let g = compile(indoc! {r#"
        A = "" ;

      B = ( [ < "b" > ] )
    "#}).unwrap();
    assert_eq!(first(&g, ""), Some(Tree::tagged_leaf("A", "")));
    assert!(compile("  S = \"a\" ;  ").is_ok());
}

#[test]
fn compile_split_literals() {
    let opts = CompileOptions::default().split_literals(true);
    let split = compile_with(r#"S = "aaa""#, &opts).unwrap();
    let thrice = build(|b| {
        let a = b.token("a");
        b.seq(&[a, a, a], Some("S"))
    });
    assert!(split.isomorphic(&thrice));

    let split = compile_with(r#"S = "ab" "c""#, &opts).unwrap();
    let expected = Tree::node("S", leaves(&["a", "b", "c"]));
    assert_eq!(first(&split, "abc"), Some(expected));

    let whole = compile(r#"S = "ab" "c""#).unwrap();
    assert_eq!(first(&whole, "abc"), None);
    let tree = parse(["ab", "c"], &whole, &ParseOptions::default()).unwrap();
    assert_eq!(tree, Some(Tree::node("S", leaves(&["ab", "c"]))));
}

#[test]
fn compile_interned_tokens() {
    // slot, one shared token, seq
    let g = compile(r#"S = "a" "a" "a""#).unwrap();
    assert_eq!(g.len(), 3);
    assert!(!g.is_empty());
    let opts = CompileOptions::default().split_literals(true);
    assert_eq!(compile_with(r#"S = "aaa""#, &opts).unwrap().len(), 3);
    // tagged rules wrap the shared token in their own seq
    assert_eq!(compile(r#"S = A B; A = "a"; B = "a""#).unwrap().len(), 7);
}

#[test]
fn compile_undefined_symbols() {
    let err = compile(r#"A = "" | B"#).unwrap_err();
    assert_eq!(err, Error::UndefinedSymbols(vec!["B".to_string()]));
    assert_eq!(err.to_string(), "undefined symbols: B");
    let err = compile(r#"A = C | B "x" | C; D = A"#).unwrap_err();
    assert_eq!(err, Error::UndefinedSymbols(vec!["C".to_string(), "B".to_string()]));
}

#[test]
fn compile_duplicate_symbol() {
    let err = compile(r#"A = ""; A = "a""#).unwrap_err();
    assert_eq!(err, Error::DuplicateSymbol("A".to_string()));
    assert_eq!(err.to_string(), "symbol A already defined");
}

#[test]
fn compile_lost_named_node() {
    assert_eq!(compile(r#"S = S | "a""#).unwrap_err(), Error::LostNamedNode("S".to_string()));
    // hidden rules have no tag to lose
    let g = compile(r#"<S> = S | "a""#).unwrap();
    assert_eq!(first(&g, "a"), Some(Tree::leaf("a")));
}

#[test]
fn compile_bad_bounds() {
    assert_eq!(compile(r#"S = "a"{3,2}"#).unwrap_err(), Error::InvalidBounds { min: 3, max: 2 });
}

#[test]
fn compile_bad_regex() {
    let err = compile(r#"S = #"(""#).unwrap_err();
    assert!(matches!(err, Error::InvalidRegex { ref pattern, .. } if pattern == "("), "{:?}", err);
}

#[test]
fn compile_syntax_error_location() {
    assert_eq!(compile("S = \"a\"\nT = = x").unwrap_err(), Error::GrammarSyntax { line: 2, column: 5 });
    assert_eq!(compile("\n\n  S = = x").unwrap_err(), Error::GrammarSyntax { line: 3, column: 7 });
    assert_eq!(compile("").unwrap_err(), Error::GrammarSyntax { line: 1, column: 1 });
    assert_eq!(Error::GrammarSyntax { line: 2, column: 5 }.to_string(),
               "cannot parse grammar at line 2, column 5");
}

#[test]
fn compile_multi_digit_bounds() {
    let g = compile(r#"S = "a"{10,12}"#).unwrap();
    for (len, accepted) in [(9, false), (10, true), (12, true), (13, false)] {
        assert_eq!(first(&g, &"a".repeat(len)).is_some(), accepted, "length {}", len);
    }
}

#[test]
fn compile_hidden_alias() {
    let g = compile(r#"S = A; <A> = B; B = "b""#).unwrap();
    assert_eq!(first(&g, "b"), Some(Tree::node("S", vec![Tree::tagged_leaf("B", "b")])));
}

#[test]
fn grammar_syntax_tree() {
    let tree = parse_grammar(r#"S = "a" <B>*; <B> = #"[0-9]"{2,}"#).unwrap();
    assert_snapshot!(tree.print(), @r#"
    rules
    |-- rule
    |   |-- symbol "S"
    |   `-- seq
    |       |-- token "a"
    |       `-- repStar
    |           `-- omittedSymbol
    |               `-- symbol "B"
    `-- rule
        |-- hiddenSymbol "B"
        `-- repMin
            |-- regexp "[0-9]"
            `-- integer "2"
    "#);
}

#[test]
fn bootstrap_self_hosting() {
    let compiled = compile(BOOTSTRAP_GRAMMAR).unwrap();
    let by_bootstrap = parse_grammar(BOOTSTRAP_GRAMMAR).unwrap();
    let by_compiled = first(&compiled, BOOTSTRAP_GRAMMAR.trim()).unwrap();
    assert_eq!(by_compiled, by_bootstrap);

    // the compiled grammar reads other grammars the same way too
    let text = r#"S = A | "x"{1,2} [B]; <A> = <"a">? #"\\d"; B = ("b" | "c")+"#;
    assert_eq!(first(&compiled, text), Some(parse_grammar(text).unwrap()));
}

///////////////////////////////////////////////////////////////////////////////
// shapes of corner case grammars

#[test]
fn quoted_string_values() {
    let g = build(|b| b.quoted_string("'", "\\", Some("s")).unwrap());
    assert_eq!(first(&g, "''"), Some(Tree::tagged_leaf("s", "")));
    assert_eq!(first(&g, "'abc'"), Some(Tree::tagged_leaf("s", "abc")));
    assert_eq!(first(&g, r"'a\'c'"), Some(Tree::tagged_leaf("s", "a'c")));
    assert_eq!(first(&g, r"'a\\c'"), Some(Tree::tagged_leaf("s", r"a\c")));
    assert_eq!(first(&g, "'a"), None);
    assert_eq!(first(&g, r"'a\'"), None);
    assert!(first(&g, r"'a\\'").is_some());
    assert!(first(&g, "'\n'").is_some());
}

#[test]
fn delimited_list_shapes() {
    let list = |min: usize, tagged_item: bool, spaced: bool| build(|b| {
        let digit = b.regex(r"\d").unwrap();
        let item = match tagged_item {
            true => b.seq(&[digit], Some("n")),
            false => digit,
        };
        let comma = b.token(",");
        let space = match spaced {
            true => {
                let space = b.regex(r"\s").unwrap();
                Some(b.rep(space, None, 0, None).unwrap())
            }
            false => None,
        };
        b.delimited_list(item, comma, space, min, Some("lst")).unwrap()
    });
    let plain = list(1, false, false);
    assert_eq!(first(&plain, "1,2"), Some(Tree::node("lst", leaves(&["1", "2"]))));
    assert_eq!(first(&plain, "1,2,"), None);
    // a single untagged item collapses into the list
    assert_eq!(first(&plain, "1"), Some(Tree::tagged_leaf("lst", "1")));
    let tagged = list(1, true, false);
    assert_eq!(first(&tagged, "1"), Some(Tree::node("lst", vec![Tree::tagged_leaf("n", "1")])));
    assert_eq!(first(&list(3, false, false), "1,2"), None);
    let spaced = list(1, false, true);
    assert_eq!(first(&spaced, "1  , 2,3"), Some(Tree::node("lst", leaves(&["1", "2", "3"]))));
}

#[test]
fn hidden_star() {
    let g = compile(r#"<S> = "a"*"#).unwrap();
    assert_eq!(first(&g, ""), Some(Tree::group(vec![])));
    assert_eq!(first(&g, "aa"), Some(Tree::group(leaves(&["a", "a"]))));

    let g = compile(r#"<S> = <"a">*"#).unwrap();
    assert_eq!(first(&g, ""), Some(Tree::group(vec![])));
    assert_eq!(first(&g, "aa"), Some(Tree::group(vec![])));
}

#[test]
fn hidden_left_recursion() {
    let g = compile(r#"<S> = S "a" | """#).unwrap();
    assert_eq!(first(&g, ""), Some(Tree::group(vec![])));
    assert_eq!(first(&g, "aa"), Some(Tree::group(leaves(&["a", "a"]))));
}

#[test]
fn left_recursion_omitted() {
    let g = compile(r#"S = S <"a"> | """#).unwrap();
    assert_eq!(first(&g, ""), Some(Tree::node("S", vec![])));
    let nested = Tree::node("S", vec![Tree::node("S", vec![Tree::node("S", vec![])])]);
    assert_eq!(first(&g, "aa"), Some(nested));
}

#[test]
fn left_recursion_depth() {
    let g = compile(r#"S = S "a" | """#).unwrap();
    assert_snapshot!(first(&g, "aaa").unwrap().print(), @r#"
    S
    |-- S
    |   |-- S
    |   |   |-- S
    |   |   `-- "a"
    |   `-- "a"
    `-- "a"
    "#);
}

#[test]
fn star_rule() {
    let g = compile(r#"S = "a"*"#).unwrap();
    assert_eq!(first(&g, ""), Some(Tree::tagged_leaf("S", "")));
    assert_eq!(first(&g, "a"), Some(Tree::tagged_leaf("S", "a")));
    assert_eq!(first(&g, "aa"), Some(Tree::node("S", leaves(&["a", "a"]))));
}

#[test]
fn three_ways_to_aaa() {
    let expected = first(&compile(r#"S = "a" "a" "a""#).unwrap(), "aaa");
    assert!(expected.is_some());
    for text in [r#"S = "a"{3}"#, r#"S = "a"+"#, r#"S = "a" <"x"> "a" "a""#] {
        let input = match text.contains('x') {
            true => "axaa",
            false => "aaa",
        };
        assert_eq!(first(&compile(text).unwrap(), input), expected, "{}", text);
    }
    assert_ne!(first(&compile(r#"S = "aaa""#).unwrap(), "aaa"), expected);
}

#[test]
fn optional_self() {
    let g = compile(r#"S = S? "a""#).unwrap();
    assert_eq!(first(&g, "a"), Some(Tree::tagged_leaf("S", "a")));
    assert_eq!(first(&g, "aa"),
               Some(Tree::node("S", vec![Tree::tagged_leaf("S", "a"), Tree::leaf("a")])));
}

#[test]
fn lexed_self() {
    let g = compile(r#"S = [S] "a" | """#).unwrap();
    assert_eq!(first(&g, "aaa"), Some(Tree::node("S", leaves(&["aa", "a"]))));
}

#[test]
fn nullable_star_terminates() {
    let g = compile(r#"S = S* "a" | """#).unwrap();
    assert!(first(&g, "aaa").is_some());
    assert!(first(&g, "").is_some());
    assert_eq!(first(&g, "aab"), None);
}

#[test]
fn top_node_packed() {
    let g = compile(indoc! {r#"
        <E> = add | "1"
        add = E <"+"> E
    "#}).unwrap();
    let tree = packed(&g, "1+1+1");
    assert!(tree.packed);
    assert_eq!(tree.children().len(), 2);
    assert_eq!(tree.count_trees(), 2);
}

#[test]
fn top_node_not_packed() {
    let g = compile(indoc! {r#"
        E = add | "1"
        add = E <"+"> E
    "#}).unwrap();
    let tree = packed(&g, "1+1+1");
    assert!(!tree.packed);
    assert_eq!(tree.children().len(), 1);
    assert_eq!(tree.count_trees(), 2);
    assert_eq!(tree.first_tree(), first(&g, "1+1+1").unwrap());
}

#[test]
fn star_of_self() {
    let g = compile(r#"S = S* "a""#).unwrap();
    assert_eq!(packed(&g, "aaa").count_trees(), 2);
    let g = compile(r#"<S> = S* "a""#).unwrap();
    assert_eq!(packed(&g, "aaa").count_trees(), 2);
}

#[test]
fn math_ambiguity() {
    let g = compile(r#"E = E ("+" | "*") E | "1""#).unwrap();
    assert_eq!(packed(&g, "1+1+1").count_trees(), 2);
    assert_eq!(packed(&g, "1+1+1+1").count_trees(), 5);
    for input in ["1+1+1", "1+1*1+1"] {
        assert_eq!(first(&g, input), Some(packed(&g, input).first_tree()));
    }
    let opts = ParseOptions::default().ambiguity(Ambiguity::Error);
    assert_eq!(parse_str("1+1+1", &g, &opts), Err(Error::Ambiguous));
}

#[test]
fn spans_in_compiled_grammar() {
    let g = compile(r#"S = A <" "> A; A = ["a"+]"#).unwrap();
    let opts = ParseOptions::default().record_spans(true);
    let tree = parse_str("aa a", &g, &opts).unwrap().unwrap();
    assert_snapshot!(tree.print(), @r#"
    S @0..4
    |-- A "aa" @0..2
    `-- A "a" @3..4
    "#);
}

#[test]
fn bounded_lengths() {
    let g = compile(r#"S = "a"{3,4}"#).unwrap();
    for len in 0..7 {
        assert_eq!(first(&g, &"a".repeat(len)).is_some(), len == 3 || len == 4, "length {}", len);
    }
}
