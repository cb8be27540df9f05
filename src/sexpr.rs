//! Text syntax for terms.
//!
//! ```text
//! Concept:cat                         node
//! Concept:"big cat"                   node with a quoted name
//! $X   $X:Concept                     variable, optionally kind-restricted
//! #42                                 an existing fact by id
//! (Inheritance $X Concept:animal)     link
//! ```
//!
//! Commas are treated as whitespace, and `;` starts a comment that runs to
//! the end of the line.

use crate::error::{RuleError, RuleResult};
use crate::fact::FactId;
use crate::rule::Term;

/// Parse exactly one term.
pub fn parse_term(text: &str) -> RuleResult<Term> {
    let mut parser = Parser::new(text);
    let term = parser.term()?;
    parser.skip_blank();
    if !parser.at_end() {
        return Err(parser.error("unexpected input after term"));
    }
    Ok(term)
}

/// Parse a sequence of terms separated by whitespace or commas.
pub fn parse_terms(text: &str) -> RuleResult<Vec<Term>> {
    let mut parser = Parser::new(text);
    let mut terms = Vec::new();
    loop {
        parser.skip_blank();
        if parser.at_end() {
            return Ok(terms);
        }
        terms.push(parser.term()?);
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> RuleError {
        RuleError::Syntax {
            position: self.pos,
            message: message.into(),
        }
    }

    fn skip_blank(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn term(&mut self) -> RuleResult<Term> {
        self.skip_blank();
        match self.peek() {
            None => Err(self.error("expected a term, found end of input")),
            Some('(') => self.link(),
            Some(')') => Err(self.error("unbalanced ')'")),
            Some(_) => self.atom(),
        }
    }

    fn link(&mut self) -> RuleResult<Term> {
        self.bump(); // (
        self.skip_blank();
        let start = self.pos;
        let kind = self.word();
        if kind.is_empty() {
            return Err(self.error("link is missing its kind"));
        }
        if kind.contains(':') || kind.starts_with('$') || kind.starts_with('#') {
            return Err(RuleError::Syntax {
                position: start,
                message: format!("'{kind}' is not a valid link kind"),
            });
        }

        let mut terms = Vec::new();
        loop {
            self.skip_blank();
            match self.peek() {
                None => return Err(self.error(format!("unclosed ({kind}"))),
                Some(')') => {
                    self.bump();
                    return Ok(Term::link(kind, terms));
                }
                Some(_) => terms.push(self.term()?),
            }
        }
    }

    fn atom(&mut self) -> RuleResult<Term> {
        let start = self.pos;
        let word = self.word();

        if let Some(var) = word.strip_prefix('$') {
            return match var.split_once(':') {
                Some((name, kind)) if !name.is_empty() && !kind.is_empty() => {
                    Ok(Term::typed_var(name, kind))
                }
                None if !var.is_empty() => Ok(Term::var(var)),
                _ => Err(RuleError::Syntax {
                    position: start,
                    message: format!("malformed variable '{word}'"),
                }),
            };
        }

        if let Some(raw) = word.strip_prefix('#') {
            return raw
                .parse::<u64>()
                .ok()
                .and_then(FactId::new)
                .map(Term::Ground)
                .ok_or_else(|| RuleError::Syntax {
                    position: start,
                    message: format!("'{word}' is not a valid fact id"),
                });
        }

        let Some(kind) = word.strip_suffix(':').or_else(|| word.split_once(':').map(|(k, _)| k))
        else {
            return Err(RuleError::Syntax {
                position: start,
                message: format!("expected Kind:name, found '{word}'"),
            });
        };
        if kind.is_empty() {
            return Err(RuleError::Syntax {
                position: start,
                message: format!("node '{word}' is missing its kind"),
            });
        }

        let name = if word.ends_with(':') && self.peek() == Some('"') {
            self.quoted()?
        } else {
            word[kind.len() + 1..].to_string()
        };
        if name.is_empty() {
            return Err(RuleError::Syntax {
                position: start,
                message: format!("node '{word}' is missing its name"),
            });
        }
        Ok(Term::node(kind, name))
    }

    /// Read up to the next delimiter.
    fn word(&mut self) -> &'a str {
        let src = self.src;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | ',' | ';' | '"') {
                break;
            }
            self.bump();
        }
        &src[start..self.pos]
    }

    fn quoted(&mut self) -> RuleResult<String> {
        let start = self.pos;
        self.bump(); // "
        let mut out = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(RuleError::Syntax {
                        position: start,
                        message: "unterminated string".into(),
                    });
                }
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("dangling escape")),
                },
                Some(c) => out.push(c),
            }
        }
    }
}
