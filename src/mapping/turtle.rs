//! Turtle Front End
//!
//! A hand-rolled parser for the small Turtle subset the R2RML vocabulary
//! needs: `@prefix` declarations, IRI references, prefixed names, string
//! literals, blank-node property lists, and `;`/`,` continuation. Prefixed
//! names are expanded during parsing so interpretation always sees full
//! IRIs.

use crate::error::{Error, Result};
use crate::mapping::{interpret, Document, MappingSet, Node};
use std::collections::HashMap;

/// Parse a Turtle mapping document into mapping records.
pub fn parse_turtle(input: &str) -> Result<MappingSet> {
    let document = parse_document(input)?;
    interpret(&document)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Iri(String),
    Pname(String, String),
    Literal(String),
    BlankOpen,
    BlankClose,
    Semicolon,
    Comma,
    Dot,
    PrefixDecl,
    A,
}

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Tokenizer { chars: input.chars().peekable() }
    }

    fn tokens(mut self) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '#' => {
                    // Comment to end of line
                    for ch in self.chars.by_ref() {
                        if ch == '\n' {
                            break;
                        }
                    }
                }
                '<' => {
                    self.chars.next();
                    let mut iri = String::new();
                    loop {
                        match self.chars.next() {
                            Some('>') => break,
                            Some(ch) => iri.push(ch),
                            None => return Err(Error::invalid_configuration("unterminated IRI")),
                        }
                    }
                    out.push(Token::Iri(iri));
                }
                '"' => {
                    self.chars.next();
                    let mut lit = String::new();
                    loop {
                        match self.chars.next() {
                            Some('"') => break,
                            Some('\\') => match self.chars.next() {
                                Some('n') => lit.push('\n'),
                                Some('t') => lit.push('\t'),
                                Some(other) => lit.push(other),
                                None => {
                                    return Err(Error::invalid_configuration(
                                        "unterminated string escape",
                                    ))
                                }
                            },
                            Some(ch) => lit.push(ch),
                            None => {
                                return Err(Error::invalid_configuration("unterminated string"))
                            }
                        }
                    }
                    out.push(Token::Literal(lit));
                }
                '[' => {
                    self.chars.next();
                    out.push(Token::BlankOpen);
                }
                ']' => {
                    self.chars.next();
                    out.push(Token::BlankClose);
                }
                ';' => {
                    self.chars.next();
                    out.push(Token::Semicolon);
                }
                ',' => {
                    self.chars.next();
                    out.push(Token::Comma);
                }
                '.' => {
                    self.chars.next();
                    out.push(Token::Dot);
                }
                '@' => {
                    self.chars.next();
                    let word = self.word();
                    if word == "prefix" {
                        out.push(Token::PrefixDecl);
                    } else {
                        return Err(Error::invalid_configuration(format!(
                            "unsupported directive '@{word}'"
                        )));
                    }
                }
                _ => {
                    let word = self.word();
                    if word.is_empty() {
                        return Err(Error::invalid_configuration(format!(
                            "unexpected character '{c}' in mapping document"
                        )));
                    }
                    if word == "a" {
                        out.push(Token::A);
                    } else if let Some((prefix, local)) = word.split_once(':') {
                        out.push(Token::Pname(prefix.to_string(), local.to_string()));
                    } else {
                        return Err(Error::invalid_configuration(format!(
                            "bare word '{word}' is not valid here"
                        )));
                    }
                }
            }
        }
        Ok(out)
    }

    fn word(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || matches!(c, '[' | ']' | ';' | ',' | '<' | '"') {
                break;
            }
            // A dot ends a statement unless it is part of a qualified name
            // like `public.customer` (those appear only inside strings, so a
            // bare dot always terminates).
            if c == '.' {
                break;
            }
            word.push(c);
            self.chars.next();
        }
        word
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    prefixes: HashMap<String, String>,
}

fn parse_document(input: &str) -> Result<Document> {
    let tokens = Tokenizer::new(input).tokens()?;
    let mut parser = Parser { tokens, pos: 0, prefixes: HashMap::new() };
    let mut document = Document::new();

    while !parser.at_end() {
        if parser.peek() == Some(&Token::PrefixDecl) {
            parser.parse_prefix()?;
        } else {
            let (subject, props) = parser.parse_triples_block()?;
            document.push((subject, props));
        }
    }
    Ok(document)
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| Error::invalid_configuration("unexpected end of mapping document"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        let token = self.next()?;
        if token == *expected {
            Ok(())
        } else {
            Err(Error::invalid_configuration(format!(
                "expected {expected:?}, found {token:?}"
            )))
        }
    }

    /// `@prefix rr: <http://...> .`
    fn parse_prefix(&mut self) -> Result<()> {
        self.expect(&Token::PrefixDecl)?;
        let name = match self.next()? {
            Token::Pname(prefix, local) if local.is_empty() => prefix,
            other => {
                return Err(Error::invalid_configuration(format!(
                    "expected prefix name, found {other:?}"
                )))
            }
        };
        let iri = match self.next()? {
            Token::Iri(iri) => iri,
            other => {
                return Err(Error::invalid_configuration(format!(
                    "expected prefix IRI, found {other:?}"
                )))
            }
        };
        self.expect(&Token::Dot)?;
        self.prefixes.insert(name, iri);
        Ok(())
    }

    fn expand(&self, prefix: &str, local: &str) -> Result<String> {
        let base = self.prefixes.get(prefix).ok_or_else(|| {
            Error::invalid_configuration(format!("undeclared prefix '{prefix}:'"))
        })?;
        Ok(format!("{base}{local}"))
    }

    /// `subject predicate object (, object)* (; predicate object ...)* .`
    fn parse_triples_block(&mut self) -> Result<(String, Vec<(String, Node)>)> {
        let subject = match self.next()? {
            Token::Iri(iri) => iri,
            Token::Pname(prefix, local) => self.expand(&prefix, &local)?,
            other => {
                return Err(Error::invalid_configuration(format!(
                    "expected subject, found {other:?}"
                )))
            }
        };
        let props = self.parse_property_list(&Token::Dot)?;
        Ok((subject, props))
    }

    /// Property list terminated by `terminator` (Dot at top level,
    /// BlankClose inside a blank node). Consumes the terminator.
    fn parse_property_list(&mut self, terminator: &Token) -> Result<Vec<(String, Node)>> {
        let mut props = Vec::new();
        loop {
            // Allow an empty list or a trailing semicolon before the close.
            if self.peek() == Some(terminator) {
                self.next()?;
                break;
            }
            let predicate = match self.next()? {
                Token::Iri(iri) => iri,
                Token::Pname(prefix, local) => self.expand(&prefix, &local)?,
                Token::A => format!("{}type", crate::mapping::RDF_NS),
                other => {
                    return Err(Error::invalid_configuration(format!(
                        "expected predicate, found {other:?}"
                    )))
                }
            };
            loop {
                let object = self.parse_object()?;
                props.push((predicate.clone(), object));
                if self.peek() == Some(&Token::Comma) {
                    self.next()?;
                } else {
                    break;
                }
            }
            match self.peek() {
                Some(t) if t == terminator => {
                    self.next()?;
                    break;
                }
                Some(Token::Semicolon) => {
                    self.next()?;
                }
                other => {
                    return Err(Error::invalid_configuration(format!(
                        "expected ';' or {terminator:?} after object, found {other:?}"
                    )))
                }
            }
        }
        Ok(props)
    }

    fn parse_object(&mut self) -> Result<Node> {
        match self.next()? {
            Token::Iri(iri) => Ok(Node::Iri(iri)),
            Token::Pname(prefix, local) => Ok(Node::Iri(self.expand(&prefix, &local)?)),
            Token::Literal(lit) => Ok(Node::Literal(lit)),
            Token::BlankOpen => {
                let props = self.parse_property_list(&Token::BlankClose)?;
                Ok(Node::Blank(props))
            }
            other => Err(Error::invalid_configuration(format!(
                "expected object, found {other:?}"
            ))),
        }
    }
}
