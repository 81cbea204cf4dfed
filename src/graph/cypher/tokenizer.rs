// src/graph/cypher/tokenizer.rs
// Cypher-level tokenizer handling keywords, operators, parameters, and literals

// ============================================================================
// Token Types
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CypherToken {
    // Keywords (case-insensitive)
    Match,
    Optional,
    Where,
    Return,
    With,
    Order,
    By,
    As,
    And,
    Or,
    Not,
    In,
    Is,
    Null,
    Limit,
    Skip,
    Unwind,
    Distinct,
    Call,
    Asc,
    Desc,
    StartsWith,
    EndsWith,
    Contains,
    Case,
    When,
    Then,
    Else,
    End,
    True,
    False,
    // Mutation keywords, recognized only so they can be rejected
    Create,
    Set,
    Delete,
    Detach,
    Merge,
    Remove,

    // Parameters
    Parameter(String), // $param_name

    // Symbols
    LParen,      // (
    RParen,      // )
    LBracket,    // [
    RBracket,    // ]
    LBrace,      // {
    RBrace,      // }
    Colon,       // :
    Comma,       // ,
    Dot,         // .
    Semicolon,   // ;
    Dash,        // -
    GreaterThan, // >
    LessThan,    // <
    Star,        // *
    Pipe,        // |

    // Comparison operators
    Equals,            // =
    NotEquals,         // <>
    LessThanEquals,    // <=
    GreaterThanEquals, // >=

    // Arithmetic
    Plus,  // +
    Slash, // /

    // Literals and identifiers
    Identifier(String),
    StringLit(String),
    IntLit(i64),
    FloatLit(f64),
}

// ============================================================================
// Tokenizer
// ============================================================================

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    /// Quoted string; the opening quote has not been consumed yet.
    fn string_literal(&mut self) -> Result<String, String> {
        let start = self.pos;
        let quote = self.bump().unwrap_or('\'');
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(format!("Unterminated string starting at position {}", start)),
                Some(c) if c == quote => return Ok(s),
                Some('\\') => {
                    let escaped = self
                        .bump()
                        .ok_or_else(|| format!("Unterminated string starting at position {}", start))?;
                    s.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                Some(c) => s.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<CypherToken, String> {
        let int_part = self.take_while(|c| c.is_ascii_digit());
        // A dot only belongs to the number when a digit follows it
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            let frac = self.take_while(|c| c.is_ascii_digit());
            let num_str = format!("{}.{}", int_part, frac);
            return num_str
                .parse()
                .map(CypherToken::FloatLit)
                .map_err(|_| format!("Invalid float: {}", num_str));
        }
        int_part
            .parse()
            .map(CypherToken::IntLit)
            .map_err(|_| format!("Invalid integer: {}", int_part))
    }
}

pub fn tokenize_cypher(input: &str) -> Result<Vec<CypherToken>, String> {
    let mut lx = Lexer {
        chars: input.chars().collect(),
        pos: 0,
    };
    let mut tokens = Vec::new();

    while let Some(ch) = lx.peek() {
        if ch.is_whitespace() {
            lx.pos += 1;
            continue;
        }

        // Single-line comments: // to end of line
        if ch == '/' && lx.peek_next() == Some('/') {
            lx.take_while(|c| c != '\n');
            continue;
        }

        let single = match ch {
            '(' => Some(CypherToken::LParen),
            ')' => Some(CypherToken::RParen),
            '[' => Some(CypherToken::LBracket),
            ']' => Some(CypherToken::RBracket),
            '{' => Some(CypherToken::LBrace),
            '}' => Some(CypherToken::RBrace),
            ':' => Some(CypherToken::Colon),
            ',' => Some(CypherToken::Comma),
            ';' => Some(CypherToken::Semicolon),
            '*' => Some(CypherToken::Star),
            '+' => Some(CypherToken::Plus),
            '/' => Some(CypherToken::Slash),
            '|' => Some(CypherToken::Pipe),
            '=' => Some(CypherToken::Equals),
            // Edge dash and unary minus are told apart by the parser
            '-' => Some(CypherToken::Dash),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(token);
            lx.pos += 1;
            continue;
        }

        match ch {
            '<' => {
                lx.pos += 1;
                match lx.peek() {
                    Some('>') => {
                        lx.pos += 1;
                        tokens.push(CypherToken::NotEquals);
                    }
                    Some('=') => {
                        lx.pos += 1;
                        tokens.push(CypherToken::LessThanEquals);
                    }
                    _ => tokens.push(CypherToken::LessThan),
                }
            }
            '>' => {
                lx.pos += 1;
                if lx.peek() == Some('=') {
                    lx.pos += 1;
                    tokens.push(CypherToken::GreaterThanEquals);
                } else {
                    tokens.push(CypherToken::GreaterThan);
                }
            }
            '!' if lx.peek_next() == Some('=') => {
                lx.pos += 2;
                tokens.push(CypherToken::NotEquals);
            }
            '.' => {
                if lx.peek_next().is_some_and(|c| c.is_ascii_digit()) {
                    lx.pos += 1;
                    let frac = lx.take_while(|c| c.is_ascii_digit());
                    let num_str = format!("0.{}", frac);
                    let f = num_str
                        .parse()
                        .map_err(|_| format!("Invalid float: .{}", frac))?;
                    tokens.push(CypherToken::FloatLit(f));
                } else {
                    lx.pos += 1;
                    tokens.push(CypherToken::Dot);
                }
            }
            '"' | '\'' => tokens.push(CypherToken::StringLit(lx.string_literal()?)),
            c if c.is_ascii_digit() => tokens.push(lx.number()?),
            '$' => {
                lx.pos += 1;
                let start = lx.pos;
                let name = lx.take_while(|c| c.is_alphanumeric() || c == '_');
                if name.is_empty() {
                    return Err(format!(
                        "Expected parameter name after '$' at position {}",
                        start
                    ));
                }
                tokens.push(CypherToken::Parameter(name));
            }
            // Backtick-quoted identifiers: `Column`, `My Label`
            '`' => {
                let start = lx.pos;
                lx.pos += 1;
                let ident = lx.take_while(|c| c != '`');
                if lx.bump() != Some('`') {
                    return Err(format!(
                        "Unterminated backtick identifier at position {}",
                        start
                    ));
                }
                tokens.push(CypherToken::Identifier(ident));
            }
            c if c.is_alphabetic() || c == '_' => {
                let ident = lx.take_while(|c| c.is_alphanumeric() || c == '_');
                tokens.push(identifier_to_token(ident));
            }
            _ => {
                return Err(format!(
                    "Unexpected character '{}' at position {}",
                    ch, lx.pos
                ));
            }
        }
    }

    Ok(tokens)
}

/// Convert an identifier string to the appropriate token (keyword or identifier)
fn identifier_to_token(ident: String) -> CypherToken {
    match ident.to_uppercase().as_str() {
        "MATCH" => CypherToken::Match,
        "OPTIONAL" => CypherToken::Optional,
        "WHERE" => CypherToken::Where,
        "RETURN" => CypherToken::Return,
        "WITH" => CypherToken::With,
        "ORDER" => CypherToken::Order,
        "BY" => CypherToken::By,
        "AS" => CypherToken::As,
        "AND" => CypherToken::And,
        "OR" => CypherToken::Or,
        "NOT" => CypherToken::Not,
        "IN" => CypherToken::In,
        "IS" => CypherToken::Is,
        "NULL" => CypherToken::Null,
        "LIMIT" => CypherToken::Limit,
        "SKIP" => CypherToken::Skip,
        "UNWIND" => CypherToken::Unwind,
        "DISTINCT" => CypherToken::Distinct,
        "CALL" => CypherToken::Call,
        "ASC" | "ASCENDING" => CypherToken::Asc,
        "DESC" | "DESCENDING" => CypherToken::Desc,
        "STARTS" => CypherToken::StartsWith,
        "ENDS" => CypherToken::EndsWith,
        "CONTAINS" => CypherToken::Contains,
        "CASE" => CypherToken::Case,
        "WHEN" => CypherToken::When,
        "THEN" => CypherToken::Then,
        "ELSE" => CypherToken::Else,
        "END" => CypherToken::End,
        "TRUE" => CypherToken::True,
        "FALSE" => CypherToken::False,
        "CREATE" => CypherToken::Create,
        "SET" => CypherToken::Set,
        "DELETE" => CypherToken::Delete,
        "DETACH" => CypherToken::Detach,
        "MERGE" => CypherToken::Merge,
        "REMOVE" => CypherToken::Remove,
        _ => CypherToken::Identifier(ident),
    }
}

// ============================================================================
// Tests
// ============================================================================
