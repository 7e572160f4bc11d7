//! C1: turns source text into a token stream plus any lex-time diagnostics.
//!
//! Comments start with `;` and run to end of line. Tokens never span a
//! line; a newline always ends the current line with an explicit `Eol`
//! token so the parser can recover to the next line after an error.

use crate::diagnostics::Diagnostic;
use crate::token::{Span, Token, TokenKind};

pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn lex(source: &str) -> LexResult {
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();

    for (line_idx, line) in source.lines().enumerate() {
        let line_no = line_idx as u32 + 1;
        let bytes: Vec<char> = line.chars().collect();
        let mut i = 0usize;

        while i < bytes.len() {
            let c = bytes[i];
            let col = i as u32 + 1;

            if c == ';' {
                break;
            }
            if c.is_whitespace() {
                i += 1;
                continue;
            }
            if c == ',' {
                tokens.push(Token::new(TokenKind::Comma, Span::new(line_no, col)));
                i += 1;
                continue;
            }
            if c == ':' {
                tokens.push(Token::new(TokenKind::Colon, Span::new(line_no, col)));
                i += 1;
                continue;
            }
            if c == '(' {
                tokens.push(Token::new(TokenKind::LParen, Span::new(line_no, col)));
                i += 1;
                continue;
            }
            if c == ')' {
                tokens.push(Token::new(TokenKind::RParen, Span::new(line_no, col)));
                i += 1;
                continue;
            }
            if c == '$' {
                let start = i;
                i += 1;
                let digit_start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i == digit_start {
                    diagnostics.push(Diagnostic::UnexpectedToken {
                        span: Span::new(line_no, col),
                        found: bytes[start..i.max(start + 1)].iter().collect(),
                        expected: "digits after `$`".to_string(),
                    });
                    continue;
                }
                let text: String = bytes[digit_start..i].iter().collect();
                let value: u32 = text.parse().unwrap_or(u32::MAX);
                tokens.push(Token::new(TokenKind::Register(value), Span::new(line_no, col)));
                continue;
            }
            if c == '+' || c == '-' || c.is_ascii_digit() {
                let start = i;
                if c == '+' || c == '-' {
                    i += 1;
                }
                let digit_start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i == digit_start {
                    diagnostics.push(Diagnostic::UnexpectedToken {
                        span: Span::new(line_no, col),
                        found: bytes[start..i].iter().collect(),
                        expected: "a number".to_string(),
                    });
                    continue;
                }
                let text: String = bytes[start..i].iter().collect();
                match text.parse::<i64>() {
                    Ok(value) => {
                        tokens.push(Token::new(TokenKind::Number(value), Span::new(line_no, col)));
                    }
                    Err(_) => {
                        diagnostics.push(Diagnostic::UnexpectedToken {
                            span: Span::new(line_no, col),
                            found: text,
                            expected: "a number literal that fits in 64 bits".to_string(),
                        });
                    }
                }
                continue;
            }
            if c.is_alphabetic() {
                let start = i;
                while i < bytes.len() && (bytes[i].is_alphanumeric() || bytes[i] == '_') {
                    i += 1;
                }
                let text: String = bytes[start..i].iter().collect();
                tokens.push(Token::new(TokenKind::Ident(text), Span::new(line_no, col)));
                continue;
            }

            diagnostics.push(Diagnostic::UnexpectedToken {
                span: Span::new(line_no, col),
                found: c.to_string(),
                expected: "a token".to_string(),
            });
            i += 1;
        }

        tokens.push(Token::new(
            TokenKind::Eol,
            Span::new(line_no, bytes.len() as u32 + 1),
        ));
    }

    let last_line = source.lines().count() as u32 + 1;
    tokens.push(Token::new(TokenKind::Eof, Span::new(last_line, 1)));

    LexResult { tokens, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_a_simple_instruction() {
        let result = lex("add $1, $2, $3 ; sum\n");
        assert!(result.diagnostics.is_empty());
        let kinds: Vec<&TokenKind> = result.tokens.iter().map(|t| &t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &TokenKind::Ident("add".to_string()),
                &TokenKind::Register(1),
                &TokenKind::Comma,
                &TokenKind::Register(2),
                &TokenKind::Comma,
                &TokenKind::Register(3),
                &TokenKind::Eol,
                &TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_label_and_address_operand() {
        let result = lex("loop: ld $0, -4($1)\n");
        assert!(result.diagnostics.is_empty());
        assert!(result
            .tokens
            .iter()
            .any(|t| t.kind == TokenKind::Ident("loop".to_string())));
        assert!(result.tokens.iter().any(|t| t.kind == TokenKind::Number(-4)));
    }

    #[test]
    fn reports_unrecognized_character() {
        let result = lex("add $1, $2, @\n");
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn a_dot_is_not_part_of_an_identifier() {
        let result = lex(".data\n");
        assert_eq!(result.diagnostics.len(), 1);
        assert!(!result
            .tokens
            .iter()
            .any(|t| matches!(&t.kind, TokenKind::Ident(s) if s.contains('.'))));
    }

    #[test]
    fn an_identifier_cannot_start_with_underscore() {
        let result = lex("_foo\n");
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn blank_and_comment_only_lines_still_emit_eol() {
        let result = lex("; just a comment\n\nhlt\n");
        assert!(result.diagnostics.is_empty());
        let eol_count = result
            .tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Eol)
            .count();
        assert_eq!(eol_count, 3);
    }
}
