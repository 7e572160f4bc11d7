//! C2: hand-written recursive-descent parser from the token stream to
//! [`crate::ast::Program`]. A parse error on one line is reported as a
//! diagnostic and recovered from by skipping to the next `Eol`; it never
//! aborts the parse of the rest of the program.

use crate::ast::{Instruction, Line, Operand, Program, RawReg};
use crate::diagnostics::Diagnostic;
use crate::token::{Span, Token, TokenKind};

pub struct ParseResult {
    pub program: Program,
    pub diagnostics: Vec<Diagnostic>,
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at_eol_or_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eol | TokenKind::Eof)
    }

    fn skip_to_next_line(&mut self) {
        while !matches!(self.peek().kind, TokenKind::Eol | TokenKind::Eof) {
            self.advance();
        }
        if matches!(self.peek().kind, TokenKind::Eol) {
            self.advance();
        }
    }
}

pub fn parse(tokens: &[Token]) -> ParseResult {
    let mut cursor = Cursor { tokens, pos: 0 };
    let mut lines = Vec::new();
    let mut diagnostics = Vec::new();

    while !matches!(cursor.peek().kind, TokenKind::Eof) {
        match parse_line(&mut cursor) {
            Ok(line) => lines.push(line),
            Err(diag) => {
                diagnostics.push(diag);
                cursor.skip_to_next_line();
                lines.push(Line::default());
            }
        }
    }

    ParseResult {
        program: Program { lines },
        diagnostics,
    }
}

fn parse_line(cursor: &mut Cursor) -> Result<Line, Diagnostic> {
    if cursor.at_eol_or_eof() {
        if matches!(cursor.peek().kind, TokenKind::Eol) {
            cursor.advance();
        }
        return Ok(Line::default());
    }

    let mut label = None;
    if let TokenKind::Ident(name) = cursor.peek().kind.clone() {
        let span = cursor.peek().span;
        let save = cursor.pos;
        cursor.advance();
        if matches!(cursor.peek().kind, TokenKind::Colon) {
            cursor.advance();
            // Label names are case-folded to upper case so the symbol table
            // (keyed case-insensitively per spec) needs no separate folding.
            label = Some((name.to_ascii_uppercase(), span));
        } else {
            cursor.pos = save;
        }
    }

    if cursor.at_eol_or_eof() {
        if matches!(cursor.peek().kind, TokenKind::Eol) {
            cursor.advance();
        }
        return Ok(Line { label, instruction: None });
    }

    let instruction = parse_instruction(cursor)?;

    if !matches!(cursor.peek().kind, TokenKind::Eol | TokenKind::Eof) {
        return Err(Diagnostic::UnexpectedToken {
            span: cursor.peek().span,
            found: cursor.peek().kind.to_string(),
            expected: "end of line".to_string(),
        });
    }
    if matches!(cursor.peek().kind, TokenKind::Eol) {
        cursor.advance();
    }

    Ok(Line {
        label,
        instruction: Some(instruction),
    })
}

fn parse_instruction(cursor: &mut Cursor) -> Result<Instruction, Diagnostic> {
    let (mnemonic, span) = match cursor.peek().kind.clone() {
        TokenKind::Ident(name) => {
            let span = cursor.peek().span;
            cursor.advance();
            (name, span)
        }
        other => {
            return Err(Diagnostic::UnexpectedToken {
                span: cursor.peek().span,
                found: other.to_string(),
                expected: "a mnemonic".to_string(),
            })
        }
    };

    let mut operands = Vec::new();
    if !cursor.at_eol_or_eof() {
        operands.push(parse_operand(cursor)?);
        while matches!(cursor.peek().kind, TokenKind::Comma) {
            cursor.advance();
            operands.push(parse_operand(cursor)?);
        }
    }

    Ok(Instruction {
        // Mnemonics are case-folded to upper case (spec §4.2 normalization);
        // `ir::Opcode::from_mnemonic` matches case-insensitively regardless,
        // so this also makes the canonical `IrInstruction::text` rendering
        // upper-case without extra bookkeeping.
        mnemonic: mnemonic.to_ascii_uppercase(),
        operands,
        span,
    })
}

fn parse_operand(cursor: &mut Cursor) -> Result<Operand, Diagnostic> {
    match cursor.peek().kind.clone() {
        TokenKind::Register(r) => {
            cursor.advance();
            Ok(Operand::Reg(RawReg(r)))
        }
        TokenKind::Ident(name) => {
            cursor.advance();
            // A label reference is case-folded the same way its definition
            // is, so lookups in the (case-insensitive) symbol table agree.
            Ok(Operand::Label(name.to_ascii_uppercase()))
        }
        TokenKind::Number(n) => {
            cursor.advance();
            parse_address_tail(cursor, n)
        }
        other => Err(Diagnostic::UnexpectedToken {
            span: cursor.peek().span,
            found: other.to_string(),
            expected: "a register, label, or address".to_string(),
        }),
    }
}

/// After consuming a leading `NUMBER`, optionally consumes `(REGISTER)`.
/// A bare number means `imm($0)`.
fn parse_address_tail(cursor: &mut Cursor, imm: i64) -> Result<Operand, Diagnostic> {
    if matches!(cursor.peek().kind, TokenKind::LParen) {
        cursor.advance();
        let base = match cursor.peek().kind.clone() {
            TokenKind::Register(r) => {
                cursor.advance();
                RawReg(r)
            }
            other => {
                return Err(Diagnostic::UnexpectedToken {
                    span: cursor.peek().span,
                    found: other.to_string(),
                    expected: "a register".to_string(),
                })
            }
        };
        expect(cursor, TokenKind::RParen)?;
        Ok(Operand::Address { imm, base })
    } else {
        Ok(Operand::Address { imm, base: RawReg(0) })
    }
}

fn expect(cursor: &mut Cursor, expected: TokenKind) -> Result<Span, Diagnostic> {
    let tok = cursor.peek().clone();
    if tok.kind == expected {
        cursor.advance();
        Ok(tok.span)
    } else {
        Err(Diagnostic::UnexpectedToken {
            span: tok.span,
            found: tok.kind.to_string(),
            expected: expected.to_string(),
        })
    }
}
