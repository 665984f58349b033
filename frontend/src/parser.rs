// Parser for attribute expressions.
//
// Parses a token stream (from the lexer) into an `Expr`. Uses chumsky
// combinators. Precedence, loosest first: `or`, `and`, `not`, comparisons,
// `+ -`, `* / // %`, unary `- +`, `**` (right associative, binds tighter
// than a unary minus on its left), then attribute access and calls.
//
// Preconditions: none.
// Postconditions: Ok holds an expression spanning the whole input.
// Failure modes: lex and syntax errors are joined into one message.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::{BinOp, Expr, UnaryOp};
use crate::lexer::Token;

/// Parse an expression string. Lexes then parses.
pub fn parse(source: &str) -> Result<Expr, String> {
    let lex_result = crate::lexer::lex(source);
    if !lex_result.errors.is_empty() {
        return Err(lex_result
            .errors
            .iter()
            .map(|e| e.message.clone())
            .collect::<Vec<_>>()
            .join("; "));
    }
    let len = source.len();
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    expr_parser()
        .then_ignore(end())
        .parse(stream)
        .into_result()
        .map_err(|errors| {
            errors
                .into_iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        })
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
}

// ── Grammar ──

fn expr_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Expr, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Int(i) => Expr::Int(i),
            Token::Float(x) => Expr::Float(x),
            Token::Str(s) => Expr::Str(s),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::None => Expr::None,
        };
        let ident = select! { Token::Ident(name) => name };

        let atom = literal.or(ident.map(Expr::Name)).or(expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen)));

        // ── Postfix: `.name` and `(args)` ──

        enum Postfix {
            Attr(String),
            Call(Vec<Expr>),
        }

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let postfix = atom.foldl(
            just(Token::Dot)
                .ignore_then(ident)
                .map(Postfix::Attr)
                .or(args.map(Postfix::Call))
                .repeated(),
            |base, op| match op {
                Postfix::Attr(name) => Expr::Attr(Box::new(base), name),
                Postfix::Call(args) => Expr::Call(Box::new(base), args),
            },
        );

        // ── Unary and power ──

        let unary = recursive(|unary| {
            let power = postfix
                .clone()
                .then(just(Token::Pow).ignore_then(unary.clone()).or_not())
                .map(|(base, exp)| match exp {
                    Some(exp) => binary(BinOp::Pow, base, exp),
                    None => base,
                });
            let sign = just(Token::Minus)
                .to(UnaryOp::Neg)
                .or(just(Token::Plus).to(UnaryOp::Pos));
            sign.then(unary)
                .map(|(op, e)| Expr::Unary(op, Box::new(e)))
                .or(power)
        });

        // ── Binary levels ──

        let product_op = choice((
            just(Token::Star).to(BinOp::Mul),
            just(Token::FloorDiv).to(BinOp::FloorDiv),
            just(Token::Slash).to(BinOp::Div),
            just(Token::Percent).to(BinOp::Mod),
        ));
        let product = unary
            .clone()
            .foldl(product_op.then(unary).repeated(), |a, (op, b)| {
                binary(op, a, b)
            });

        let sum_op = just(Token::Plus)
            .to(BinOp::Add)
            .or(just(Token::Minus).to(BinOp::Sub));
        let sum = product
            .clone()
            .foldl(sum_op.then(product).repeated(), |a, (op, b)| {
                binary(op, a, b)
            });

        let compare_op = choice((
            just(Token::EqEq).to(BinOp::Eq),
            just(Token::NotEq).to(BinOp::Ne),
            just(Token::Le).to(BinOp::Le),
            just(Token::Ge).to(BinOp::Ge),
            just(Token::Lt).to(BinOp::Lt),
            just(Token::Gt).to(BinOp::Gt),
        ));
        let comparison = sum
            .clone()
            .foldl(compare_op.then(sum).repeated(), |a, (op, b)| {
                binary(op, a, b)
            });

        let negation = recursive(|negation| {
            just(Token::Not)
                .ignore_then(negation)
                .map(|e| Expr::Unary(UnaryOp::Not, Box::new(e)))
                .or(comparison)
        });

        let conjunction = negation
            .clone()
            .foldl(just(Token::And).ignore_then(negation).repeated(), |a, b| {
                binary(BinOp::And, a, b)
            });

        conjunction.clone().foldl(
            just(Token::Or).ignore_then(conjunction).repeated(),
            |a, b| binary(BinOp::Or, a, b),
        )
    })
}
