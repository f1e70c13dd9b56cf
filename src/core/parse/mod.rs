use crate::core::diag::Span;
use crate::core::lexer::{Lexer, Token, TokenKind, TokenKind as TK};
use crate::core::tree::parsed::*;
use crate::core::tree::{BinaryOp, NodeIdGen};

mod errors;

pub use errors::ParseError;

/// Parse a whole source text, tolerating broken declarations.
///
/// Each failed declaration contributes one error and parsing resynchronizes
/// at the next top-level keyword. The tree is absent only when nothing at
/// all could be parsed out of a non-empty, erroneous source.
pub fn parse_tops(source: &str) -> (Option<Module>, Vec<ParseError>) {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(tokens) => tokens,
        Err(error) => return (None, vec![error.into()]),
    };

    let mut parser = Parser::new(&tokens);
    let (module, errors) = parser.parse_module();
    if module.imports.is_empty() && module.lets.is_empty() && !errors.is_empty() {
        (None, errors)
    } else {
        (Some(module), errors)
    }
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    curr_token: &'a Token,
    id_gen: NodeIdGen,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Parser {
            tokens,
            pos: 0,
            curr_token: &tokens[0],
            id_gen: NodeIdGen::new(),
        }
    }

    fn parse_module(&mut self) -> (Module, Vec<ParseError>) {
        let mut module = Module::default();
        let mut errors = Vec::new();

        while self.curr_token.kind != TK::Eof {
            let result = match self.curr_token.kind {
                TK::KwImport => self.import_decl().map(|decl| module.imports.push(decl)),
                TK::KwLet => self.let_decl().map(|decl| module.lets.push(decl)),
                _ => Err(ParseError::ExpectedDecl(
                    self.curr_token.kind.clone(),
                    self.curr_token.span,
                )),
            };
            if let Err(error) = result {
                errors.push(error);
                self.resync();
            }
        }

        (module, errors)
    }

    /// Skip to the next token that can start a top-level declaration.
    fn resync(&mut self) {
        loop {
            match self.curr_token.kind {
                TK::Eof => return,
                TK::KwImport | TK::KwLet => return,
                _ => self.advance(),
            }
        }
    }

    fn import_decl(&mut self) -> Result<ImportDecl, ParseError> {
        let start = self.curr_token.span;
        self.expect(TK::KwImport)?;

        let path_span = self.curr_token.span;
        let TK::StringLit(path) = self.curr_token.kind.clone() else {
            return Err(ParseError::ExpectedImportPath(
                self.curr_token.kind.clone(),
                self.curr_token.span,
            ));
        };
        self.advance();

        let alias = if self.curr_token.kind == TK::KwAs {
            self.advance();
            self.ident()?.0
        } else {
            default_alias(&path)
        };

        Ok(ImportDecl {
            id: self.id_gen.fresh(),
            path,
            alias,
            span: start.to(self.prev_span()),
            path_span,
        })
    }

    fn let_decl(&mut self) -> Result<LetDecl, ParseError> {
        let start = self.curr_token.span;
        self.expect(TK::KwLet)?;
        let (name, _) = self.ident()?;

        let mut params = Vec::new();
        while let TK::Ident(_) = self.curr_token.kind {
            let (param_name, param_span) = self.ident()?;
            params.push(Param {
                id: self.id_gen.fresh(),
                name: param_name,
                span: param_span,
            });
        }

        self.expect(TK::Equal)?;
        let body = self.expr()?;

        Ok(LetDecl {
            id: self.id_gen.fresh(),
            name,
            params,
            body,
            span: start.to(self.prev_span()),
        })
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        match self.curr_token.kind {
            TK::KwFn => self.lambda(),
            TK::KwIf => self.if_expr(),
            TK::KwAssert => self.assert_expr(),
            _ => self.or_expr(),
        }
    }

    fn lambda(&mut self) -> Result<Expr, ParseError> {
        let start = self.curr_token.span;
        self.expect(TK::KwFn)?;

        let mut params = Vec::new();
        loop {
            let (name, span) = self.ident()?;
            params.push(Param {
                id: self.id_gen.fresh(),
                name,
                span,
            });
            if self.curr_token.kind == TK::Arrow {
                break;
            }
        }
        self.expect(TK::Arrow)?;
        let body = self.expr()?;

        let span = start.to(body.span);
        Ok(self.node(
            ExprKind::Lambda {
                params,
                body: Box::new(body),
            },
            span,
        ))
    }

    fn if_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.curr_token.span;
        self.expect(TK::KwIf)?;
        let cond = self.expr()?;
        self.expect(TK::KwThen)?;
        let then_branch = self.expr()?;
        self.expect(TK::KwElse)?;
        let else_branch = self.expr()?;

        let span = start.to(else_branch.span);
        Ok(self.node(
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            span,
        ))
    }

    fn assert_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.curr_token.span;
        self.expect(TK::KwAssert)?;
        let value = self.or_expr()?;
        let span = start.to(value.span);
        Ok(self.node(ExprKind::Assert(Box::new(value)), span))
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_chain(&[(TK::PipePipe, BinaryOp::Or)], Self::and_expr)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_chain(&[(TK::AmpAmp, BinaryOp::And)], Self::cmp_expr)
    }

    /// Comparisons do not chain; `a < b < c` is a type error waiting to be
    /// written, not a parse.
    fn cmp_expr(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.concat_expr()?;
        let op = match self.curr_token.kind {
            TK::EqualEqual => BinaryOp::Eq,
            TK::Less => BinaryOp::Lt,
            TK::Greater => BinaryOp::Gt,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.concat_expr()?;
        let span = lhs.span.to(rhs.span);
        Ok(self.node(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        ))
    }

    fn concat_expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_chain(&[(TK::PlusPlus, BinaryOp::Concat)], Self::add_expr)
    }

    fn add_expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_chain(
            &[(TK::Plus, BinaryOp::Add), (TK::Minus, BinaryOp::Sub)],
            Self::mul_expr,
        )
    }

    fn mul_expr(&mut self) -> Result<Expr, ParseError> {
        self.binary_chain(
            &[(TK::Star, BinaryOp::Mul), (TK::Slash, BinaryOp::Div)],
            Self::apply_expr,
        )
    }

    fn binary_chain(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut lhs = next(self)?;
        loop {
            let Some((_, op)) = ops.iter().find(|(token, _)| *token == self.curr_token.kind)
            else {
                return Ok(lhs);
            };
            let op = *op;
            self.advance();
            let rhs = next(self)?;
            let span = lhs.span.to(rhs.span);
            lhs = self.node(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
    }

    /// Left-associative application by juxtaposition: `f x y`.
    fn apply_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.atom()?;
        while self.starts_atom() {
            let arg = self.atom()?;
            let span = expr.span.to(arg.span);
            expr = self.node(
                ExprKind::Apply {
                    func: Box::new(expr),
                    arg: Box::new(arg),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn starts_atom(&self) -> bool {
        matches!(
            self.curr_token.kind,
            TK::IntLit(_) | TK::BoolLit(_) | TK::StringLit(_) | TK::Ident(_) | TK::LParen
        )
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let span = self.curr_token.span;
        let kind = match self.curr_token.kind.clone() {
            TK::IntLit(value) => {
                self.advance();
                ExprKind::IntLit(value)
            }
            TK::BoolLit(value) => {
                self.advance();
                ExprKind::BoolLit(value)
            }
            TK::StringLit(text) => {
                self.advance();
                ExprKind::StrLit(text)
            }
            TK::Ident(name) => {
                self.advance();
                if self.curr_token.kind == TK::Dot {
                    self.advance();
                    let (member, member_span) = self.ident()?;
                    let span = span.to(member_span);
                    return Ok(self.node(
                        ExprKind::Member {
                            alias: name,
                            member,
                        },
                        span,
                    ));
                }
                ExprKind::Var(name)
            }
            TK::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TK::RParen)?;
                return Ok(inner);
            }
            other => return Err(ParseError::ExpectedExpr(other, span)),
        };
        Ok(self.node(kind, span))
    }

    fn ident(&mut self) -> Result<(String, Span), ParseError> {
        let TK::Ident(name) = self.curr_token.kind.clone() else {
            return Err(ParseError::ExpectedIdent(
                self.curr_token.kind.clone(),
                self.curr_token.span,
            ));
        };
        let span = self.curr_token.span;
        self.advance();
        Ok((name, span))
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), ParseError> {
        if self.curr_token.kind == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::ExpectedToken {
                expected,
                found: self.curr_token.kind.clone(),
                span: self.curr_token.span,
            })
        }
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
            self.curr_token = &self.tokens[self.pos];
        }
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn node(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.id_gen.fresh(),
            kind,
            span,
        }
    }
}

/// Alias an import defaults to when `as` is omitted: the last path segment.
fn default_alias(path: &str) -> String {
    let segment = path.rsplit(['/', '\\']).next().unwrap_or(path);
    segment.trim_end_matches(".lm").to_string()
}

#[cfg(test)]
#[path = "../../tests/core/t_parser.rs"]
mod tests;
