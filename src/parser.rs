// ABOUTME: Lexer/parser — normalizes source text and builds the Call-tree AST

use nom::{branch::alt, bytes::complete::take_until, character::complete::char, combinator::rest, sequence::preceded, IResult, Parser};

use crate::ast::{Arg, CallNode, FormKind, SpecialKind};
use crate::env::GlobalScope;
use crate::error::ParseError;
use crate::value::Value;

/// Strip `#` comments (naively — even inside string literals), collapse
/// whitespace runs to a single space, and remove spaces adjacent to parens.
/// The per-line comment scan is expressed as a small `nom` combinator, while
/// the call-tree itself is built by a hand-written recursive-descent parser
/// below.
pub fn normalize(source: &str) -> String {
    let stripped = strip_comments(source);
    let collapsed = collapse_whitespace(&stripped);
    remove_paren_adjacent_spaces(&collapsed)
}

/// Consumes everything from a `#` to end-of-line (or end-of-input).
fn comment_tail(input: &str) -> IResult<&str, &str> {
    preceded(char('#'), alt((take_until("\n"), rest))).parse(input)
}

fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for line in source.split('\n') {
        out.push_str(&strip_line_comment(line));
        out.push('\n');
    }
    out
}

/// `#` starts a comment to end-of-line unconditionally — including inside a
/// `"..."` literal, which is a documented limitation.
fn strip_line_comment(line: &str) -> String {
    match line.find('#') {
        None => line.to_string(),
        Some(idx) => {
            let (before, hash_on) = line.split_at(idx);
            debug_assert!(comment_tail(hash_on).is_ok());
            before.to_string()
        }
    }
}

fn collapse_whitespace(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut last_was_space = false;
    for c in source.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

fn remove_paren_adjacent_spaces(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ' ' {
            let prev_is_open_paren = out.chars().last() == Some('(');
            let next_is_paren = matches!(chars.get(i + 1), Some(')') | Some('('));
            if prev_is_open_paren || next_is_paren {
                i += 1;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    out.trim().to_string()
}

/// A raw token: either a complete string literal (quotes stripped) or a bare
/// symbol/integer run.
enum Token<'a> {
    Str(&'a str),
    Symbol(&'a str),
}

fn parse_string_literal(input: &str) -> IResult<&str, &str> {
    let (input, _) = char('"')(input)?;
    let (input, content) = nom::bytes::complete::take_till(|c| c == '"').parse(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, content))
}

fn parse_symbol_token(input: &str) -> IResult<&str, &str> {
    nom::bytes::complete::take_while1(|c: char| c != '(' && c != ')' && !c.is_whitespace())
        .parse(input)
}

fn next_token(input: &str) -> IResult<&str, Token<'_>> {
    if input.starts_with('"') {
        let (rest, s) = parse_string_literal(input)?;
        Ok((rest, Token::Str(s)))
    } else {
        let (rest, s) = parse_symbol_token(input)?;
        Ok((rest, Token::Symbol(s)))
    }
}

/// One piece collected while scanning a call's parts: either token, before
/// we know whether it's the form selector or an argument.
enum Part {
    Symbol(String),
    Str(String),
    Call(CallNode),
}

impl Part {
    fn display(&self) -> String {
        match self {
            Part::Symbol(s) => s.clone(),
            Part::Str(s) => format!("\"{s}\""),
            Part::Call(c) => c.to_string(),
        }
    }

    fn into_arg(self) -> Arg {
        match self {
            Part::Symbol(s) => Arg::Symbol(s),
            Part::Str(s) => Arg::Str(s),
            Part::Call(c) => Arg::Call(c),
        }
    }
}

/// Parses one top-level call and returns the remainder of the input.
pub fn parse_top_level<'a>(
    input: &'a str,
    global: &GlobalScope,
) -> Result<(CallNode, &'a str), ParseError> {
    parse_call(input.trim_start(), global)
}

fn parse_call<'a>(input: &'a str, global: &GlobalScope) -> Result<(CallNode, &'a str), ParseError> {
    let input = input.trim_start();
    let Ok((mut rest, _)) = char::<_, ()>('(').parse(input) else {
        let shown: String = input.chars().take(20).collect();
        return Err(ParseError::ExpectedOpenParen(shown));
    };

    let mut parts: Vec<Part> = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            let head = parts
                .first()
                .map(Part::display)
                .unwrap_or_else(|| "?".to_string());
            return Err(ParseError::UnterminatedCall(head));
        }
        if let Some(after) = rest.strip_prefix(')') {
            rest = after;
            break;
        }
        if rest.starts_with('(') {
            let (inner, after) = parse_call(rest, global)?;
            parts.push(Part::Call(inner));
            rest = after;
            continue;
        }
        let (after, tok) = next_token(rest).map_err(|_| ParseError::EmptySelector)?;
        match tok {
            Token::Str(s) => parts.push(Part::Str(s.to_string())),
            Token::Symbol(s) => parts.push(Part::Symbol(s.to_string())),
        }
        rest = after;
    }

    if parts.is_empty() {
        return Err(ParseError::EmptySelector);
    }

    let selector = parts.remove(0);
    let is_lambda = matches!(&selector, Part::Symbol(s) if s == "lambda");
    let mut rest_args: Vec<Arg> = parts.into_iter().map(Part::into_arg).collect();

    // `lambda`'s first argument is a parenthesized list of quoted capture
    // names, not a callable sub-expression — pull it out as a flat name list
    // before the generic selector-resolution below ever sees it.
    if is_lambda {
        if let Some(Arg::Call(node)) = rest_args.first() {
            let names = flatten_name_list(node);
            rest_args[0] = Arg::NameList(names);
        }
    }

    // A parenthesized subexpression or string-literal selector is always
    // deferred (it must be evaluated to discover the callable). A plain
    // symbol selector is pinned to whatever it resolves to in `global` at
    // this point in parsing; if unresolved (forward reference), it also
    // becomes `MaybeCall`.
    let node = match selector {
        Part::Call(_) | Part::Str(_) => {
            let selector_arg = selector.into_arg();
            CallNode {
                form: FormKind::MaybeCall,
                args: std::iter::once(selector_arg).chain(rest_args).collect(),
            }
        }
        Part::Symbol(name) => {
            if let Some(kind) = SpecialKind::from_name(&name) {
                CallNode {
                    form: FormKind::Special(kind),
                    args: rest_args,
                }
            } else if let Some(Value::FnRef(id)) = global.borrow().get(&name).cloned() {
                CallNode {
                    form: FormKind::Pinned { name, id },
                    args: rest_args,
                }
            } else {
                CallNode {
                    form: FormKind::MaybeCall,
                    args: std::iter::once(Arg::Symbol(name)).chain(rest_args).collect(),
                }
            }
        }
    };

    Ok((node, rest))
}

/// Reconstructs the flat, source-order list of quoted name tokens that made
/// up a `lambda` capture-list group. The group was already parsed as an
/// ordinary nested call before we knew it was a capture list; a `MaybeCall`
/// reinjects its selector as `args[0]`, so only a non-`MaybeCall` form needs
/// its head name added back in front.
fn flatten_name_list(node: &CallNode) -> Vec<String> {
    let mut names = Vec::with_capacity(node.args.len() + 1);
    if !matches!(node.form, FormKind::MaybeCall) {
        names.push(strip_quote(node.head_name()));
    }
    for arg in &node.args {
        names.push(match arg {
            Arg::Symbol(s) => strip_quote(s),
            Arg::Str(s) => s.clone(),
            Arg::Call(_) | Arg::NameList(_) => "?".to_string(),
        });
    }
    names
}

fn strip_quote(s: &str) -> String {
    s.strip_prefix('\'').unwrap_or(s).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::new_global_scope;

    #[test]
    fn strips_hash_comments_to_end_of_line() {
        let out = normalize("(+ 1 2) # trailing comment\n(+ 3 4)");
        assert!(!out.contains("trailing"));
    }

    #[test]
    fn comment_stripping_is_naive_inside_strings() {
        // Known limitation, pinned here deliberately.
        let out = normalize("(print \"a#b\")");
        assert!(!out.contains("b\""));
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(collapse_whitespace("a   b\n\tc"), "a b c");
    }

    #[test]
    fn removes_spaces_adjacent_to_parens() {
        let out = remove_paren_adjacent_spaces("( + 1 2 )");
        assert_eq!(out, "(+ 1 2)");
    }

    #[test]
    fn parses_simple_call_into_pinned_builtin() {
        let global = new_global_scope();
        crate::env::seed_builtins(&global);
        let (node, rest) = parse_top_level("(+ 1 2)", &global).unwrap();
        assert!(rest.trim().is_empty());
        assert!(matches!(node.form, FormKind::Pinned { .. }));
        assert_eq!(node.args.len(), 2);
    }

    #[test]
    fn unknown_name_selector_becomes_maybe_call() {
        let global = new_global_scope();
        crate::env::seed_builtins(&global);
        let (node, _) = parse_top_level("(not-yet-defined 1)", &global).unwrap();
        assert!(matches!(node.form, FormKind::MaybeCall));
        assert_eq!(node.args.len(), 2);
    }

    #[test]
    fn unterminated_call_is_an_error() {
        let global = new_global_scope();
        crate::env::seed_builtins(&global);
        let err = parse_top_level("(+ 1 2", &global).unwrap_err();
        assert!(matches!(err, ParseError::UnterminatedCall(_)));
    }

    #[test]
    fn string_literal_is_preserved_verbatim() {
        let global = new_global_scope();
        crate::env::seed_builtins(&global);
        let (node, _) = parse_top_level("(print \"hello world\")", &global).unwrap();
        match &node.args[0] {
            Arg::Str(s) => assert_eq!(s, "hello world"),
            other => panic!("expected Str arg, got {other:?}"),
        }
    }

    #[test]
    fn lambda_capture_list_becomes_name_list() {
        let global = new_global_scope();
        crate::env::seed_builtins(&global);
        let (node, _) = parse_top_level("(lambda ('x 'y) 'n (+ x y n))", &global).unwrap();
        match &node.args[0] {
            Arg::NameList(names) => assert_eq!(names, &vec!["x".to_string(), "y".to_string()]),
            other => panic!("expected NameList, got {other:?}"),
        }
    }

    #[test]
    fn nested_call_selector_becomes_maybe_call() {
        let global = new_global_scope();
        crate::env::seed_builtins(&global);
        let (node, _) = parse_top_level("((+ +) 1 2)", &global).unwrap();
        assert!(matches!(node.form, FormKind::MaybeCall));
        // args[0] is the deferred `(+ +)` selector expression.
        assert!(matches!(node.args[0], Arg::Call(_)));
    }
}
