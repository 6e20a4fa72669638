//! Text format for fault-tree definitions.
//!
//! A description is a sequence of statements:
//!
//! ```text
//! // declarations are optional: unknown names become basic events
//! basic pump_failure p = 0.02
//! house maintenance = false
//!
//! backup := diesel & !maintenance
//! top := pump_failure & (grid_loss | backup)
//! top top
//! ```
//!
//! Formulas combine named references with `&`, `|`, `!` and the named
//! connectives `and`, `or`, `xor`, `nand`, `nor`, `not`, `null` and
//! `atleast(k; ...)`. The first gate defined is the top unless a `top`
//! statement designates another one.

use crate::*;

use pest::{iterators::Pair, Parser};

#[derive(Parser)]
#[grammar_inline = r####"
tree    = _{ SOI ~ stmt* ~ EOI }
stmt    = _{ house | basic | topdecl | gatedef }

house   =  { "house" ~ name ~ "=" ~ value }
basic   =  { "basic" ~ name ~ prob? }
prob    =  { "p" ~ "=" ~ number }
topdecl =  { "top" ~ name }
gatedef =  { name ~ ":=" ~ expr }

expr    = _{ disj }
disj    =  { conj ~ ( "|" ~ conj )* }
conj    =  { term ~ ( "&" ~ term )* }
term    = _{ neg | grp }
neg     =  { ("!" | "~") ~ term }
grp     = _{ call | atleast | lit | "(" ~ expr ~ ")" }

atleast =  { ^"atleast" ~ "(" ~ integer ~ ";" ~ expr ~ ("," ~ expr)+ ~ ")" }
call    =  { kind ~ "(" ~ expr ~ ("," ~ expr)* ~ ")" }
kind    =  { ^"and" | ^"or" | ^"xor" | ^"nand" | ^"nor" | ^"not" | ^"null" }

lit     = @{ name }
name    = @{ (ASCII_ALPHA | "_") ~ (ASCII_ALPHANUMERIC | "_")* }
value   =  { ^"true" | ^"false" }
integer = @{ ASCII_DIGIT+ }
number  = @{ ASCII_DIGIT+ ~ ("." ~ ASCII_DIGIT+)? }

WHITESPACE = _{ " " | "\t" | "\r" | "\n" }
COMMENT    = _{ "//" ~ (!NEWLINE ~ ANY)* }
"####]
struct TreeParser;

/// An argument in a parsed formula: a signed reference or a sub-formula.
enum Arg {
    Event(String, bool),
    Sub(Formula),
}

/// Parse a fault-tree description into a symbolic tree.
///
/// Names referenced by formulas but never declared are registered as basic
/// events, in order of first appearance.
pub fn parse_tree(description: &str) -> Result<FaultTreeDef, FtkitError> {
    let parsed = TreeParser::parse(Rule::tree, description)
        .map_err(|e| FtkitError::InvalidExpression(e.to_string()))?;

    let mut def = FaultTreeDef::default();
    let mut top = None;
    for statement in parsed {
        match statement.as_rule() {
            Rule::house => {
                let mut inner = statement.into_inner();
                let name = inner.next().unwrap().as_str().to_string();
                let value = inner
                    .next()
                    .unwrap()
                    .as_str()
                    .eq_ignore_ascii_case("true");
                def.add_house_event(&name, value)?;
            }
            Rule::basic => {
                let mut inner = statement.into_inner();
                let name = inner.next().unwrap().as_str().to_string();
                let probability = match inner.next() {
                    Some(prob) => {
                        let number = prob.into_inner().next().unwrap().as_str();
                        Some(number.parse().map_err(|_| {
                            FtkitError::InvalidExpression(number.to_string())
                        })?)
                    }
                    None => None,
                };
                def.add_basic_event(&name, probability)?;
            }
            Rule::topdecl => {
                let name = statement.into_inner().next().unwrap().as_str();
                top = Some(name.to_string());
            }
            Rule::gatedef => {
                let mut inner = statement.into_inner();
                let name = inner.next().unwrap().as_str().to_string();
                let body = load_expr(inner.next().unwrap(), false)?;
                def.add_gate(&name, into_formula(body))?;
            }
            Rule::EOI => {}
            _ => {
                return Err(FtkitError::InvalidExpression(
                    statement.as_str().to_string(),
                ))
            }
        }
    }

    for name in def.undeclared_references() {
        def.add_basic_event(&name, None)?;
    }
    if let Some(name) = top {
        def.set_top(&name)?;
    }
    Ok(def)
}

fn load_expr(pair: Pair<Rule>, negated: bool) -> Result<Arg, FtkitError> {
    let rule = pair.as_rule();
    match rule {
        Rule::lit => Ok(Arg::Event(pair.as_str().to_string(), negated)),
        Rule::neg => load_expr(pair.into_inner().next().unwrap(), !negated),
        Rule::disj | Rule::conj => {
            let mut inner: Vec<_> = pair.into_inner().collect();
            if inner.len() == 1 {
                // single-operand chains are transparent
                return load_expr(inner.pop().unwrap(), negated);
            }
            // fold the negation into the connective instead of a NOT wrapper
            let kind = match (rule, negated) {
                (Rule::disj, false) => GateKind::Or,
                (Rule::disj, true) => GateKind::Nor,
                (Rule::conj, false) => GateKind::And,
                (Rule::conj, true) => GateKind::Nand,
                _ => unreachable!(),
            };
            let mut formula = Formula::new(kind);
            for operand in inner {
                formula = add_arg(formula, load_expr(operand, false)?);
            }
            Ok(Arg::Sub(formula))
        }
        Rule::call => {
            let mut inner = pair.into_inner();
            let kind = match inner.next().unwrap().as_str().to_ascii_lowercase().as_str() {
                "and" => GateKind::And,
                "or" => GateKind::Or,
                "xor" => GateKind::Xor,
                "nand" => GateKind::Nand,
                "nor" => GateKind::Nor,
                "not" => GateKind::Not,
                "null" => GateKind::Null,
                other => return Err(FtkitError::InvalidExpression(other.to_string())),
            };
            let mut formula = Formula::new(kind);
            for operand in inner {
                formula = add_arg(formula, load_expr(operand, false)?);
            }
            Ok(wrap_negation(formula, negated))
        }
        Rule::atleast => {
            let mut inner = pair.into_inner();
            let vote = inner.next().unwrap().as_str();
            let vote: u32 = vote
                .parse()
                .map_err(|_| FtkitError::InvalidExpression(vote.to_string()))?;
            let mut formula = Formula::new(GateKind::AtLeast).with_vote(vote);
            for operand in inner {
                formula = add_arg(formula, load_expr(operand, false)?);
            }
            Ok(wrap_negation(formula, negated))
        }
        _ => Err(FtkitError::InvalidExpression(pair.as_str().to_string())),
    }
}

fn add_arg(formula: Formula, arg: Arg) -> Formula {
    match arg {
        Arg::Event(name, false) => formula.with_event(&name),
        Arg::Event(name, true) => formula.with_complement(&name),
        Arg::Sub(sub) => formula.with_formula(sub),
    }
}

fn wrap_negation(formula: Formula, negated: bool) -> Arg {
    if negated {
        Arg::Sub(Formula::new(GateKind::Not).with_formula(formula))
    } else {
        Arg::Sub(formula)
    }
}

fn into_formula(body: Arg) -> Formula {
    match body {
        Arg::Sub(formula) => formula,
        // a bare (possibly negated) reference becomes a pass-through gate
        Arg::Event(name, false) => Formula::new(GateKind::Null).with_event(&name),
        Arg::Event(name, true) => Formula::new(GateKind::Null).with_complement(&name),
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn statements_and_implicit_basics() -> Result<(), FtkitError> {
        let def = parse_tree(
            "// a small system\n\
             basic pump p = 0.02\n\
             house maintenance = false\n\
             backup := diesel & !maintenance\n\
             top := pump & (grid | backup)\n\
             top top",
        )?;

        assert_eq!(def.top(), Some("top"));
        assert_eq!(def.events().len(), 4);
        assert_eq!(
            def.events().role_of(def.events().index_of("pump").unwrap()),
            Some(EventRole::Basic {
                probability: Some(0.02)
            })
        );
        assert_eq!(
            def.events()
                .role_of(def.events().index_of("maintenance").unwrap()),
            Some(EventRole::House { value: false })
        );
        // implicit basics in order of first appearance
        assert!(def.events().index_of("diesel").unwrap() < def.events().index_of("grid").unwrap());
        Ok(())
    }

    #[test]
    fn operators_and_calls() -> Result<(), FtkitError> {
        let def = parse_tree("top := a & b & c")?;
        let top = def.gate("top").unwrap();
        assert_eq!(top.kind(), GateKind::And);
        assert_eq!(top.arity(), 3);

        let def = parse_tree("top := xor(a, !b)")?;
        let top = def.gate("top").unwrap();
        assert_eq!(top.kind(), GateKind::Xor);
        assert_eq!(top.event_args()[1], ("b".to_string(), true));

        let def = parse_tree("top := atleast(2; a, b, or(c, d))")?;
        let top = def.gate("top").unwrap();
        assert_eq!(top.kind(), GateKind::AtLeast);
        assert_eq!(top.vote_number(), Some(2));
        assert_eq!(top.arity(), 3);
        assert_eq!(top.formula_args()[0].kind(), GateKind::Or);
        Ok(())
    }

    #[test]
    fn negations() -> Result<(), FtkitError> {
        // negated group folds into the dual connective
        let def = parse_tree("top := !(a | b)")?;
        assert_eq!(def.gate("top").unwrap().kind(), GateKind::Nor);

        // negated call gets an explicit NOT wrapper
        let def = parse_tree("top := !xor(a, b) | c")?;
        let top = def.gate("top").unwrap();
        assert_eq!(top.kind(), GateKind::Or);
        assert_eq!(top.formula_args()[0].kind(), GateKind::Not);

        // double negation cancels
        let def = parse_tree("top := !!a | b")?;
        assert_eq!(def.gate("top").unwrap().event_args()[0], ("a".to_string(), false));
        Ok(())
    }

    #[test]
    fn bare_reference_becomes_pass_through() -> Result<(), FtkitError> {
        let def = parse_tree("sub := a & b\ntop := !sub")?;
        let top = def.gate("top").unwrap();
        assert_eq!(top.kind(), GateKind::Null);
        assert_eq!(top.event_args()[0], ("sub".to_string(), true));
        Ok(())
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_tree("top := a &"),
            Err(FtkitError::InvalidExpression(_))
        ));
        assert!(matches!(
            parse_tree("top = a | b"),
            Err(FtkitError::InvalidExpression(_))
        ));
        assert!(matches!(
            parse_tree("top := atleast(x; a, b)"),
            Err(FtkitError::InvalidExpression(_))
        ));
    }

    #[test]
    fn default_top_is_the_first_gate() -> Result<(), FtkitError> {
        let def = parse_tree("g1 := a | b\ng2 := a & b")?;
        assert_eq!(def.top(), Some("g1"));
        Ok(())
    }
}
