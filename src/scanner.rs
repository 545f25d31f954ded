use anyhow::anyhow;

use crate::ast::{Token, TokenType};
use crate::dialect::Dialect;

pub struct Scanner {
    source_chars: Vec<char>,
    tokens: Vec<Token>,
    dialect: Dialect,
    start: usize,
    current: usize,
    line: u32,
    col: u32,
}

impl Scanner {
    pub fn new(source: &str, dialect: Dialect) -> Self {
        Self {
            source_chars: source.chars().collect(),
            tokens: vec![],
            dialect,
            start: 0,
            current: 0,
            line: 1,
            col: 0,
        }
    }

    pub fn tokens(&self) -> &Vec<Token> {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    fn advance(&mut self) -> char {
        let c = self.source_chars[self.current];
        self.current += 1;
        self.col += 1;
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source_chars.len()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.source_chars[self.current]
        }
    }

    fn peek_next_i(&self, i: usize) -> char {
        if self.current + i >= self.source_chars.len() {
            '\0'
        } else {
            self.source_chars[self.current + i]
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() != expected {
            return false;
        };

        self.current += 1;
        self.col += 1;
        true
    }

    fn add_token(&mut self, token_type: TokenType) {
        self.tokens.push(Token {
            kind: token_type,
            lexeme: self.current_source_str(),
            line: self.line,
            col: self.col,
            start: self.start,
            end: self.current,
        });
    }

    fn current_source_str(&self) -> String {
        self.source_chars[self.start..self.current].iter().collect()
    }

    fn reset(&mut self) {
        self.tokens.clear();
        self.start = 0;
        self.current = 0;
        self.col = 1;
        self.line = 1;
    }

    fn new_line(&mut self) {
        self.line += 1;
        self.col = 1;
    }

    pub fn scan(&mut self) -> anyhow::Result<()> {
        self.reset();
        while self.current < self.source_chars.len() {
            self.start = self.current;
            self.scan_token()?;
        }
        self.tokens.push(Token {
            kind: TokenType::Eof,
            lexeme: String::from("eof"),
            line: self.line,
            col: self.col,
            start: self.source_chars.len(),
            end: self.source_chars.len(),
        });

        Ok(())
    }

    /// Scans up to the closing `delimiter`, honoring backslash escapes and
    /// doubled delimiters. Returns the unescaped body.
    fn scan_quoted(&mut self, delimiter: char, what: &str) -> anyhow::Result<String> {
        let mut body = String::new();
        loop {
            let peek_char = self.peek();
            if peek_char == '\0' && self.is_at_end() {
                return Err(anyhow!(self.error_str(&format!("Found unterminated {}", what))));
            }
            if peek_char == '\\' && delimiter != '`' {
                body.push(self.advance());
                if !self.is_at_end() {
                    body.push(self.advance());
                }
                continue;
            }
            if peek_char == delimiter {
                self.advance();
                if self.peek() == delimiter {
                    body.push(self.advance());
                    continue;
                }
                break;
            }
            if peek_char == '\n' {
                self.advance();
                self.new_line();
                body.push(peek_char);
                continue;
            }
            body.push(self.advance());
        }
        Ok(body)
    }

    fn match_string(&mut self, delimiter: char) -> anyhow::Result<()> {
        let body = self.scan_quoted(delimiter, "string")?;
        self.add_token(TokenType::String(body));
        Ok(())
    }

    fn match_quoted_identifier(&mut self, delimiter: char) -> anyhow::Result<()> {
        let body = self.scan_quoted(delimiter, "quoted identifier")?;
        if body.is_empty() {
            return Err(anyhow!(self.error_str("Found empty quoted identifier")));
        }
        self.add_token(TokenType::QuotedIdentifier(body));
        Ok(())
    }

    fn match_number(&mut self) -> anyhow::Result<()> {
        let mut found_dot = self.source_chars[self.start] == '.';
        let mut found_e = false;
        loop {
            let peek_char = self.peek();

            if peek_char == '.' {
                if found_dot || found_e {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
                found_dot = true;
                self.advance();
            } else if peek_char == 'e' || peek_char == 'E' {
                if found_e {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
                found_e = true;
                let peek_next_char = self.peek_next_i(1);
                if peek_next_char == '+' || peek_next_char == '-' {
                    self.advance();
                    if !(self.peek_next_i(1).is_ascii_digit()) {
                        return Err(anyhow!(self.error_str("Found invalid number")));
                    }
                    self.advance();
                } else if peek_next_char.is_ascii_digit() {
                    self.advance();
                } else {
                    return Err(anyhow!(self.error_str("Found invalid number")));
                }
            } else if peek_char.is_ascii_digit() {
                self.advance();
            } else {
                self.add_token(TokenType::Number(self.current_source_str()));
                break;
            }
        }

        Ok(())
    }

    fn match_parameter(&mut self) {
        loop {
            let peek_char = self.peek();
            if !(peek_char.is_alphanumeric() || peek_char == '_' || peek_char == '@') {
                break;
            }
            self.advance();
        }
        self.add_token(TokenType::Parameter(self.current_source_str()));
    }

    fn match_keyword_or_identifier(&mut self) {
        loop {
            let peek_char = self.peek();
            if !(peek_char.is_alphanumeric() || peek_char == '_' || peek_char == '$') {
                break;
            }
            self.advance();
        }
        let identifier = self.current_source_str();

        let kind = match identifier.to_lowercase().as_str() {
            "all" => TokenType::All,
            "and" => TokenType::And,
            "as" => TokenType::As,
            "asc" => TokenType::Asc,
            "between" => TokenType::Between,
            "by" => TokenType::By,
            "case" => TokenType::Case,
            "cast" => TokenType::Cast,
            "create" => TokenType::Create,
            "cross" => TokenType::Cross,
            "desc" => TokenType::Desc,
            "distinct" => TokenType::Distinct,
            "else" => TokenType::Else,
            "end" => TokenType::End,
            "except" => TokenType::Except,
            "exists" => TokenType::Exists,
            "false" => TokenType::False,
            "from" => TokenType::From,
            "full" => TokenType::Full,
            "group" => TokenType::Group,
            "having" => TokenType::Having,
            "in" => TokenType::In,
            "inner" => TokenType::Inner,
            "intersect" => TokenType::Intersect,
            "interval" => TokenType::Interval,
            "into" => TokenType::Into,
            "is" => TokenType::Is,
            "join" => TokenType::Join,
            "left" => TokenType::Left,
            "like" => TokenType::Like,
            "limit" => TokenType::Limit,
            "not" => TokenType::Not,
            "null" => TokenType::Null,
            "on" => TokenType::On,
            "or" => TokenType::Or,
            "order" => TokenType::Order,
            "outer" => TokenType::Outer,
            "over" => TokenType::Over,
            "partition" => TokenType::Partition,
            "qualify" => TokenType::Qualify,
            "recursive" => TokenType::Recursive,
            "right" => TokenType::Right,
            "select" => TokenType::Select,
            "set" => TokenType::Set,
            "then" => TokenType::Then,
            "true" => TokenType::True,
            "union" => TokenType::Union,
            "using" => TokenType::Using,
            "when" => TokenType::When,
            "where" => TokenType::Where,
            "window" => TokenType::Window,
            "with" => TokenType::With,
            _ => TokenType::Identifier(identifier),
        };
        self.add_token(kind);
    }

    fn skip_line_comment(&mut self) {
        loop {
            let peek_char = self.peek();
            if peek_char == '\n' || self.is_at_end() {
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) -> anyhow::Result<()> {
        loop {
            if self.is_at_end() {
                return Err(anyhow!(self.error_str("Found unterminated comment")));
            }
            if self.peek() == '*' && self.peek_next_i(1) == '/' {
                self.advance();
                self.advance();
                break;
            }
            if self.advance() == '\n' {
                self.new_line();
            }
        }
        Ok(())
    }

    fn scan_token(&mut self) -> anyhow::Result<()> {
        let curr_char = self.advance();
        match curr_char {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '[' => self.add_token(TokenType::LeftSquare),
            ']' => self.add_token(TokenType::RightSquare),
            '*' => self.add_token(TokenType::Star),
            ',' => self.add_token(TokenType::Comma),
            ';' => self.add_token(TokenType::Semicolon),
            '%' => self.add_token(TokenType::Percent),
            '+' => self.add_token(TokenType::Plus),
            '=' => {
                // `==` is accepted as equality in spark and hive
                self.match_char('=');
                self.add_token(TokenType::Equal)
            }
            ':' => {
                if self.dialect.double_colon_cast() && self.match_char(':') {
                    self.add_token(TokenType::DoubleColon);
                } else {
                    self.add_token(TokenType::Colon);
                }
            }
            '.' => {
                if self.peek().is_ascii_digit() {
                    self.match_number()?;
                } else {
                    self.add_token(TokenType::Dot);
                }
            }
            '/' => {
                if self.match_char('*') {
                    self.skip_block_comment()?;
                } else {
                    self.add_token(TokenType::Slash)
                }
            }
            '#' if self.dialect.hash_comments() => self.skip_line_comment(),
            '-' => {
                if self.match_char('-') {
                    self.skip_line_comment();
                } else {
                    self.add_token(TokenType::Minus)
                }
            }
            '<' => {
                if self.match_char('>') {
                    self.add_token(TokenType::NotEqual);
                } else if self.match_char('=') {
                    self.add_token(TokenType::LessEqual);
                } else if self.match_char('<') {
                    self.add_token(TokenType::BitwiseLeftShift);
                } else {
                    self.add_token(TokenType::Less);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenType::BangEqual);
                } else {
                    self.add_token(TokenType::Bang);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenType::GreaterEqual);
                } else if self.match_char('>') {
                    self.add_token(TokenType::BitwiseRightShift);
                } else {
                    self.add_token(TokenType::Greater);
                }
            }
            '~' => self.add_token(TokenType::BitwiseNot),
            '&' => self.add_token(TokenType::BitwiseAnd),
            '|' => {
                if self.match_char('|') {
                    self.add_token(TokenType::ConcatOperator);
                } else {
                    self.add_token(TokenType::BitwiseOr);
                }
            }
            '^' => self.add_token(TokenType::BitwiseXor),
            '\n' => self.new_line(),
            '\r' | ' ' | '\t' => {}

            '\'' => self.match_string('\'')?,
            '"' => {
                if self.dialect.double_quoted_identifiers() {
                    self.match_quoted_identifier('"')?;
                } else {
                    self.match_string('"')?;
                }
            }
            '`' if self.dialect.backtick_identifiers() => self.match_quoted_identifier('`')?,

            // $1, ?, @param, @@session_var
            '?' => self.add_token(TokenType::Parameter(String::from("?"))),
            '$' if self.peek().is_ascii_digit() => self.match_parameter(),
            '@' => self.match_parameter(),

            c if c.is_ascii_digit() => self.match_number()?,

            c if c.is_alphabetic() || c == '_' => self.match_keyword_or_identifier(),

            _ => {
                return Err(anyhow!(self.error_str(&format!(
                    "Found unexpected character while scanning: {}",
                    curr_char
                ))));
            }
        }
        Ok(())
    }

    fn error_str(&self, error: &str) -> String {
        format!(
            "[line: {}, col: {}] Scanner error: {}",
            self.line, self.col, error
        )
    }
}
