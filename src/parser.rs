//! XPath parser
//!
//! Parses query strings into an [`Expr`] using the pest grammar in
//! `xpath.pest`. Function names and arities are checked here, so a query
//! that compiles can only fail at evaluation time on type errors.

use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;
use thiserror::Error;

use crate::ast::{ArithOp, Axis, CompareOp, Expr, Function, NodeTest, Step};

#[derive(Parser)]
#[grammar = "xpath.pest"]
struct XPathParser;

/// Error type for query parsing failures
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Query error: {0}")]
    Syntax(#[from] pest::error::Error<Rule>),

    #[error("Query error: Unknown function: {0}()")]
    UnknownFunction(String),

    #[error("Query error: {name}() expects {expected} argument(s), got {found}")]
    Arity {
        name: &'static str,
        expected: String,
        found: usize,
    },

    #[error("Query error: Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Query error: Expected {0}")]
    Expected(&'static str),
}

/// Parse an XPath expression
pub fn parse_xpath(input: &str) -> Result<Expr, QueryError> {
    let mut pairs = XPathParser::parse(Rule::xpath, input)?;
    let xpath = expect(&mut pairs, "an expression")?;
    let expr = expect(&mut xpath.into_inner(), "an expression")?;
    build_expr(expr)
}

fn expect<'i>(pairs: &mut Pairs<'i, Rule>, what: &'static str) -> Result<Pair<'i, Rule>, QueryError> {
    pairs.next().ok_or(QueryError::Expected(what))
}

fn build_expr(pair: Pair<Rule>) -> Result<Expr, QueryError> {
    match pair.as_rule() {
        Rule::expr
        | Rule::and_expr
        | Rule::equality_expr
        | Rule::relational_expr
        | Rule::additive_expr
        | Rule::multiplicative_expr => build_binary(pair),
        Rule::unary_expr => build_unary(pair),
        Rule::union_expr => build_union(pair),
        Rule::path_expr => build_expr(expect(&mut pair.into_inner(), "a path")?),
        Rule::filter_path => build_filter_path(pair),
        Rule::location_path => build_location_path(pair),
        Rule::primary_expr => build_expr(expect(&mut pair.into_inner(), "a primary expression")?),
        Rule::function_call => build_function_call(pair),
        Rule::literal => {
            let inner = expect(&mut pair.into_inner(), "a string")?;
            Ok(Expr::Literal(inner.as_str().to_string()))
        }
        Rule::number => {
            let text = pair.as_str();
            text.parse()
                .map(Expr::Number)
                .map_err(|_| QueryError::InvalidNumber(text.to_string()))
        }
        _ => Err(QueryError::Expected("an expression")),
    }
}

/// Left-associative chain: operand (op operand)*
fn build_binary(pair: Pair<Rule>) -> Result<Expr, QueryError> {
    let mut inner = pair.into_inner();
    let mut lhs = build_expr(expect(&mut inner, "an operand")?)?;

    while let Some(op) = inner.next() {
        let rhs = build_expr(expect(&mut inner, "an operand")?)?;
        let (lhs_box, rhs_box) = (Box::new(lhs), Box::new(rhs));
        lhs = match (op.as_rule(), op.as_str()) {
            (Rule::or_op, _) => Expr::Or(lhs_box, rhs_box),
            (Rule::and_op, _) => Expr::And(lhs_box, rhs_box),
            (Rule::equality_op, "=") => Expr::Compare(CompareOp::Eq, lhs_box, rhs_box),
            (Rule::equality_op, _) => Expr::Compare(CompareOp::Ne, lhs_box, rhs_box),
            (Rule::relational_op, "<") => Expr::Compare(CompareOp::Lt, lhs_box, rhs_box),
            (Rule::relational_op, "<=") => Expr::Compare(CompareOp::Le, lhs_box, rhs_box),
            (Rule::relational_op, ">") => Expr::Compare(CompareOp::Gt, lhs_box, rhs_box),
            (Rule::relational_op, _) => Expr::Compare(CompareOp::Ge, lhs_box, rhs_box),
            (Rule::additive_op, "+") => Expr::Arith(ArithOp::Add, lhs_box, rhs_box),
            (Rule::additive_op, _) => Expr::Arith(ArithOp::Sub, lhs_box, rhs_box),
            (Rule::multiplicative_op, "*") => Expr::Arith(ArithOp::Mul, lhs_box, rhs_box),
            (Rule::multiplicative_op, "div") => Expr::Arith(ArithOp::Div, lhs_box, rhs_box),
            (Rule::multiplicative_op, _) => Expr::Arith(ArithOp::Mod, lhs_box, rhs_box),
            _ => return Err(QueryError::Expected("an operator")),
        };
    }

    Ok(lhs)
}

fn build_unary(pair: Pair<Rule>) -> Result<Expr, QueryError> {
    let mut negations = 0;
    let mut operand = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::negate => negations += 1,
            _ => operand = Some(build_expr(inner)?),
        }
    }

    let mut expr = operand.ok_or(QueryError::Expected("an operand"))?;
    for _ in 0..negations {
        expr = Expr::Negate(Box::new(expr));
    }
    Ok(expr)
}

fn build_union(pair: Pair<Rule>) -> Result<Expr, QueryError> {
    let mut inner = pair.into_inner();
    let mut expr = build_expr(expect(&mut inner, "a path")?)?;
    for path in inner {
        expr = Expr::Union(Box::new(expr), Box::new(build_expr(path)?));
    }
    Ok(expr)
}

fn build_filter_path(pair: Pair<Rule>) -> Result<Expr, QueryError> {
    let mut inner = pair.into_inner();
    let base = build_expr(expect(&mut inner, "a primary expression")?)?;
    let mut predicates = Vec::new();
    let mut steps = Vec::new();

    for part in inner {
        match part.as_rule() {
            Rule::predicate => predicates.push(build_predicate(part)?),
            Rule::path_separator => {
                if part.as_str() == "//" {
                    steps.push(Step::descendant_or_self());
                }
            }
            Rule::relative_path => steps.extend(build_relative_path(part)?),
            _ => return Err(QueryError::Expected("a predicate or path")),
        }
    }

    if predicates.is_empty() && steps.is_empty() {
        Ok(base)
    } else {
        Ok(Expr::Filter {
            base: Box::new(base),
            predicates,
            steps,
        })
    }
}

fn build_location_path(pair: Pair<Rule>) -> Result<Expr, QueryError> {
    let path = expect(&mut pair.into_inner(), "a location path")?;
    match path.as_rule() {
        Rule::absolute_path => {
            let mut steps = Vec::new();
            for part in path.into_inner() {
                match part.as_rule() {
                    Rule::path_separator if part.as_str() == "//" => {
                        steps.push(Step::descendant_or_self());
                    }
                    Rule::relative_path => steps.extend(build_relative_path(part)?),
                    _ => {}
                }
            }
            Ok(Expr::Path {
                absolute: true,
                steps,
            })
        }
        _ => Ok(Expr::Path {
            absolute: false,
            steps: build_relative_path(path)?,
        }),
    }
}

fn build_relative_path(pair: Pair<Rule>) -> Result<Vec<Step>, QueryError> {
    let mut steps = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::step => steps.push(build_step(part)?),
            Rule::path_separator => {
                if part.as_str() == "//" {
                    steps.push(Step::descendant_or_self());
                }
            }
            _ => return Err(QueryError::Expected("a step")),
        }
    }
    Ok(steps)
}

fn build_step(pair: Pair<Rule>) -> Result<Step, QueryError> {
    let step = expect(&mut pair.into_inner(), "a step")?;

    if step.as_rule() == Rule::abbreviated_step {
        let axis = if step.as_str() == ".." {
            Axis::Parent
        } else {
            Axis::SelfAxis
        };
        return Ok(Step::new(axis, NodeTest::Node));
    }

    let mut axis = Axis::Child;
    let mut test = None;
    let mut predicates = Vec::new();

    for part in step.into_inner() {
        match part.as_rule() {
            Rule::axis_specifier => {
                let specifier = expect(&mut part.into_inner(), "an axis")?;
                axis = match specifier.as_rule() {
                    Rule::attribute_abbrev => Axis::Attribute,
                    _ => Axis::from_name(specifier.as_str()).ok_or(QueryError::Expected("an axis"))?,
                };
            }
            Rule::node_test => test = Some(build_node_test(part)?),
            Rule::predicate => predicates.push(build_predicate(part)?),
            _ => return Err(QueryError::Expected("a step")),
        }
    }

    Ok(Step {
        axis,
        test: test.ok_or(QueryError::Expected("a node test"))?,
        predicates,
    })
}

fn build_node_test(pair: Pair<Rule>) -> Result<NodeTest, QueryError> {
    let test = expect(&mut pair.into_inner(), "a node test")?;
    match test.as_rule() {
        Rule::kind_test => {
            let kind = expect(&mut test.into_inner(), "a node kind")?;
            match kind.as_str() {
                "text" => Ok(NodeTest::Text),
                _ => Ok(NodeTest::Node),
            }
        }
        _ => match test.as_str() {
            "*" => Ok(NodeTest::Any),
            name => Ok(NodeTest::Name(name.to_string())),
        },
    }
}

fn build_predicate(pair: Pair<Rule>) -> Result<Expr, QueryError> {
    build_expr(expect(&mut pair.into_inner(), "a predicate expression")?)
}

fn build_function_call(pair: Pair<Rule>) -> Result<Expr, QueryError> {
    let mut inner = pair.into_inner();
    let name = expect(&mut inner, "a function name")?.as_str();
    let function =
        Function::from_name(name).ok_or_else(|| QueryError::UnknownFunction(name.to_string()))?;
    let args = inner.map(build_expr).collect::<Result<Vec<_>, _>>()?;

    let (min, max) = function.arity();
    if args.len() < min || max.is_some_and(|max| args.len() > max) {
        let expected = match max {
            Some(max) if max == min => min.to_string(),
            Some(max) => format!("{min} to {max}"),
            None => format!("at least {min}"),
        };
        return Err(QueryError::Arity {
            name: function.name(),
            expected,
            found: args.len(),
        });
    }

    Ok(Expr::Call(function, args))
}
