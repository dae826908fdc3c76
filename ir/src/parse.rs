//! Reader for the textual IR form produced by the front end.
//!
//! The grammar is line-oriented: one statement per line, with `ARG` lines
//! folded into the following `CALL`. Functions are sealed (entry/exit
//! synthesis and edge construction) as soon as their body ends.

use logos::Logos;

use crate::{
    BinaryOp, Function, IdGen, IrError, Label, Program, Relop, Stmt, StmtKind, Value, Var,
};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error(transparent)]
    Ir(#[from] IrError),
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r]+")]
enum Token<'a> {
    #[token("FUNCTION")]
    Function,
    #[token("PARAM")]
    Param,
    #[token("DEC")]
    Dec,
    #[token("LABEL")]
    LabelKw,
    #[token("IF")]
    If,
    #[token("GOTO")]
    Goto,
    #[token("ELSE")]
    Else,
    #[token("RETURN")]
    Return,
    #[token("CALL")]
    Call,
    #[token("ARG")]
    Arg,
    #[token("READ")]
    Read,
    #[token("WRITE")]
    Write,
    #[token(":=")]
    Assign,
    #[token(":")]
    Colon,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("&")]
    Amp,
    #[token("==")]
    #[token("=")]
    Eq,
    #[token("!=")]
    Ne,
    #[token(">=")]
    Ge,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token("<")]
    Lt,
    #[regex(r"v[0-9]+", |lex| lex.slice()[1..].parse::<u32>().ok(), priority = 3)]
    Var(u32),
    #[regex(r"L[0-9]+", |lex| lex.slice()[1..].parse::<u32>().ok(), priority = 3)]
    Label(u32),
    #[regex(r"#-?[0-9]+", |lex| lex.slice()[1..].parse::<i32>().ok())]
    Int(i32),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u32>().ok())]
    Num(u32),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Ident(&'a str),
}

struct Line<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    number: usize,
}

impl<'a> Line<'a> {
    fn lex(text: &'a str, number: usize) -> Result<Self, ParseError> {
        let mut tokens = Vec::new();
        for token in Token::lexer(text) {
            match token {
                Ok(token) => tokens.push(token),
                Err(()) => {
                    return Err(ParseError::Syntax {
                        line: number,
                        message: format!("unrecognized token in `{}`", text.trim()),
                    });
                }
            }
        }
        Ok(Self {
            tokens,
            pos: 0,
            number,
        })
    }

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            line: self.number,
            message: message.into(),
        }
    }

    fn var(&mut self, ids: &mut IdGen) -> Result<Var, ParseError> {
        match self.next() {
            Some(Token::Var(raw)) if raw != 0 => {
                let var = Var::new(raw);
                ids.observe_var(var);
                Ok(var)
            }
            _ => Err(self.error("expected a variable")),
        }
    }

    fn label(&mut self, ids: &mut IdGen) -> Result<Label, ParseError> {
        match self.next() {
            Some(Token::Label(raw)) if raw != 0 => {
                let label = Label::new(raw);
                ids.observe_label(label);
                Ok(label)
            }
            _ => Err(self.error("expected a label")),
        }
    }

    fn value(&mut self, ids: &mut IdGen) -> Result<Value, ParseError> {
        match self.next() {
            Some(Token::Var(raw)) if raw != 0 => {
                let var = Var::new(raw);
                ids.observe_var(var);
                Ok(Value::Var(var))
            }
            Some(Token::Int(value)) => Ok(Value::Const(value)),
            _ => Err(self.error("expected a variable or literal operand")),
        }
    }

    fn binary_op(&mut self) -> Result<BinaryOp, ParseError> {
        match self.next() {
            Some(Token::Plus) => Ok(BinaryOp::Add),
            Some(Token::Minus) => Ok(BinaryOp::Sub),
            Some(Token::Star) => Ok(BinaryOp::Mul),
            Some(Token::Slash) => Ok(BinaryOp::Div),
            _ => Err(self.error("expected an arithmetic operator")),
        }
    }

    fn relop(&mut self) -> Result<Relop, ParseError> {
        match self.next() {
            Some(Token::Eq) => Ok(Relop::Eq),
            Some(Token::Ne) => Ok(Relop::Ne),
            Some(Token::Gt) => Ok(Relop::Gt),
            Some(Token::Ge) => Ok(Relop::Ge),
            Some(Token::Lt) => Ok(Relop::Lt),
            Some(Token::Le) => Ok(Relop::Le),
            _ => Err(self.error("expected a relational operator")),
        }
    }

    fn expect(&mut self, token: Token<'a>, what: &str) -> Result<(), ParseError> {
        if self.next() == Some(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn finish(&self) -> Result<(), ParseError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.error("trailing tokens after statement"))
        }
    }
}

/// Parse a whole program. Fresh ids minted later by the optimizer are
/// guaranteed not to collide with any id appearing in the source.
pub fn parse_program(source: &str, ids: &mut IdGen) -> Result<Program, ParseError> {
    Parser::new(ids).run(source)
}

struct Parser<'i> {
    ids: &'i mut IdGen,
    program: Program,
    current: Option<Function>,
    pending_args: Vec<Value>,
    pending_arg_line: Option<usize>,
    pending_decs: Vec<(Var, u32)>,
}

impl<'i> Parser<'i> {
    fn new(ids: &'i mut IdGen) -> Self {
        Self {
            ids,
            program: Program::new(),
            current: None,
            pending_args: Vec::new(),
            pending_arg_line: None,
            pending_decs: Vec::new(),
        }
    }

    fn run(mut self, source: &str) -> Result<Program, ParseError> {
        for (index, text) in source.lines().enumerate() {
            let number = index + 1;
            if text.trim().is_empty() {
                continue;
            }
            let mut line = Line::lex(text, number)?;
            self.line(&mut line)?;
        }
        self.finish_function()?;
        Ok(self.program)
    }

    fn function_mut(&mut self, line: &Line<'_>) -> Result<&mut Function, ParseError> {
        self.current
            .as_mut()
            .ok_or_else(|| line.error("statement outside of any FUNCTION"))
    }

    fn finish_function(&mut self) -> Result<(), ParseError> {
        if let Some(line) = self.pending_arg_line.take() {
            return Err(ParseError::Syntax {
                line,
                message: "ARG lines must be followed by a CALL".to_string(),
            });
        }
        if let Some(mut function) = self.current.take() {
            function.seal(self.ids)?;
            self.program.functions.push(function);
        }
        Ok(())
    }

    fn push_stmt(&mut self, line: &Line<'_>, stmt: Stmt) -> Result<(), ParseError> {
        if !self.pending_args.is_empty() && !matches!(stmt.kind, StmtKind::Call { .. }) {
            return Err(line.error("ARG lines must be followed by a CALL"));
        }
        self.function_mut(line)?.push_stmt(stmt);
        Ok(())
    }

    fn line(&mut self, line: &mut Line<'_>) -> Result<(), ParseError> {
        match line.peek() {
            Some(Token::Function) => {
                line.next();
                let name = match line.next() {
                    Some(Token::Ident(name)) => name.to_string(),
                    _ => return Err(line.error("expected a function name")),
                };
                line.expect(Token::Colon, "`:` after function name")?;
                line.finish()?;
                self.finish_function()?;
                self.current = Some(Function::new(name));
                self.pending_decs.clear();
                Ok(())
            }
            Some(Token::Param) => {
                line.next();
                let var = line.var(self.ids)?;
                line.finish()?;
                self.function_mut(line)?.params.push(var);
                Ok(())
            }
            Some(Token::Dec) => {
                line.next();
                let var = line.var(self.ids)?;
                let size = match line.next() {
                    Some(Token::Num(size)) => size,
                    _ => return Err(line.error("expected a declaration size")),
                };
                line.finish()?;
                self.function_mut(line)?;
                self.pending_decs.push((var, size));
                Ok(())
            }
            Some(Token::LabelKw) => {
                line.next();
                let label = line.label(self.ids)?;
                line.expect(Token::Colon, "`:` after label")?;
                line.finish()?;
                self.function_mut(line)?.push_label(label);
                Ok(())
            }
            Some(Token::If) => {
                line.next();
                let lhs = line.value(self.ids)?;
                let relop = line.relop()?;
                let rhs = line.value(self.ids)?;
                line.expect(Token::Goto, "GOTO")?;
                let then_target = line.label(self.ids)?;
                line.expect(Token::Else, "ELSE")?;
                line.expect(Token::Goto, "GOTO")?;
                let else_target = line.label(self.ids)?;
                line.finish()?;
                self.push_stmt(
                    line,
                    Stmt::new(StmtKind::If {
                        relop,
                        lhs,
                        rhs,
                        then_target,
                        else_target,
                    }),
                )
            }
            Some(Token::Goto) => {
                line.next();
                let target = line.label(self.ids)?;
                line.finish()?;
                self.push_stmt(line, Stmt::goto(target))
            }
            Some(Token::Return) => {
                line.next();
                let value = line.value(self.ids)?;
                line.finish()?;
                self.push_stmt(line, Stmt::ret(value))
            }
            Some(Token::Arg) => {
                line.next();
                let value = line.value(self.ids)?;
                line.finish()?;
                self.function_mut(line)?;
                self.pending_args.push(value);
                self.pending_arg_line = Some(line.number);
                Ok(())
            }
            Some(Token::Call) => {
                line.next();
                let callee = match line.next() {
                    Some(Token::Ident(name)) => name.to_string(),
                    _ => return Err(line.error("expected a callee name")),
                };
                line.finish()?;
                let args = std::mem::take(&mut self.pending_args);
                self.pending_arg_line = None;
                self.push_stmt(
                    line,
                    Stmt::new(StmtKind::Call {
                        dst: None,
                        callee,
                        args,
                    }),
                )
            }
            Some(Token::Read) => {
                line.next();
                let dst = line.var(self.ids)?;
                line.finish()?;
                self.push_stmt(line, Stmt::read(dst))
            }
            Some(Token::Write) => {
                line.next();
                let src = line.value(self.ids)?;
                line.finish()?;
                self.push_stmt(line, Stmt::write(src))
            }
            Some(Token::Star) => {
                // *addr := src
                line.next();
                let addr = line.value(self.ids)?;
                line.expect(Token::Assign, "`:=`")?;
                let src = line.value(self.ids)?;
                line.finish()?;
                self.push_stmt(line, Stmt::new(StmtKind::Store { addr, src }))
            }
            Some(Token::Var(_)) => {
                let dst = line.var(self.ids)?;
                line.expect(Token::Assign, "`:=`")?;
                match line.peek() {
                    Some(Token::Amp) => {
                        line.next();
                        let dec = line.var(self.ids)?;
                        line.finish()?;
                        let position = self
                            .pending_decs
                            .iter()
                            .position(|(var, _)| *var == dec)
                            .ok_or_else(|| {
                                line.error(format!("address of undeclared variable {dec}"))
                            })?;
                        let (dec, size) = self.pending_decs.remove(position);
                        self.function_mut(line)?.add_dec(dec, dst, size);
                        Ok(())
                    }
                    Some(Token::Star) => {
                        line.next();
                        let addr = line.value(self.ids)?;
                        line.finish()?;
                        self.push_stmt(line, Stmt::new(StmtKind::Load { dst, addr }))
                    }
                    Some(Token::Call) => {
                        line.next();
                        let callee = match line.next() {
                            Some(Token::Ident(name)) => name.to_string(),
                            _ => return Err(line.error("expected a callee name")),
                        };
                        line.finish()?;
                        let args = std::mem::take(&mut self.pending_args);
                        self.pending_arg_line = None;
                        self.push_stmt(
                            line,
                            Stmt::new(StmtKind::Call {
                                dst: Some(dst),
                                callee,
                                args,
                            }),
                        )
                    }
                    _ => {
                        let lhs = line.value(self.ids)?;
                        if line.peek().is_none() {
                            return self.push_stmt(line, Stmt::assign(dst, lhs));
                        }
                        let op = line.binary_op()?;
                        let rhs = line.value(self.ids)?;
                        line.finish()?;
                        self.push_stmt(line, Stmt::binary(op, dst, lhs, rhs))
                    }
                }
            }
            _ => Err(line.error("unrecognized statement")),
        }
    }
}
