//! FHIRPath lexer
//!
//! Turns an expression string into a token stream. Lexical errors are
//! reported as `TokenKind::Error` tokens so the parser can accumulate
//! every diagnostic before failing.

use crate::token::{Token, TokenKind};

pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position + 1).copied()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.current().map(|c| c.is_whitespace()).unwrap_or(false) {
            self.advance();
        }
    }

    /// Skip `//` and `/* */` comments. Returns an error message for an
    /// unterminated block comment.
    fn skip_comment(&mut self) -> Result<(), String> {
        if self.current() == Some('/') && self.peek() == Some('/') {
            while let Some(c) = self.current() {
                self.advance();
                if c == '\n' {
                    break;
                }
            }
            Ok(())
        } else if self.current() == Some('/') && self.peek() == Some('*') {
            self.advance();
            self.advance();
            while self.current().is_some() {
                if self.current() == Some('*') && self.peek() == Some('/') {
                    self.advance();
                    self.advance();
                    return Ok(());
                }
                self.advance();
            }
            Err("Unterminated block comment".into())
        } else {
            Ok(())
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while self
            .current()
            .map(|c| c.is_alphanumeric() || c == '_')
            .unwrap_or(false)
        {
            self.advance();
        }
        self.chars[start..self.position].iter().collect()
    }

    /// Shared body for `'string'` and `` `identifier` `` reading.
    fn read_quoted(&mut self, quote: char, what: &str) -> Result<String, String> {
        self.advance(); // opening quote
        let mut value = String::new();

        while let Some(c) = self.current() {
            if c == quote {
                if self.peek() == Some(quote) {
                    value.push(quote);
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    return Ok(value);
                }
            } else if c == '\\' {
                self.advance();
                let Some(escaped) = self.current() else {
                    return Err(format!("Incomplete escape sequence in {}", what));
                };
                match escaped {
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    '`' => value.push('`'),
                    '\\' => value.push('\\'),
                    '/' => value.push('/'),
                    'f' => value.push('\x0C'),
                    'n' => value.push('\n'),
                    'r' => value.push('\r'),
                    't' => value.push('\t'),
                    'u' => {
                        self.advance(); // 'u'
                        let mut hex = String::new();
                        for _ in 0..4 {
                            match self.current() {
                                Some(h) if h.is_ascii_hexdigit() => {
                                    hex.push(h);
                                    self.advance();
                                }
                                _ => return Err("Invalid unicode escape sequence".into()),
                            }
                        }
                        let code = u32::from_str_radix(&hex, 16)
                            .map_err(|_| "Invalid unicode code point".to_string())?;
                        value.push(
                            char::from_u32(code).ok_or_else(|| "Invalid unicode character".to_string())?,
                        );
                        continue; // already past the escape
                    }
                    other => value.push(other),
                }
                self.advance();
            } else {
                value.push(c);
                self.advance();
            }
        }

        Err(format!("Unterminated {}", what))
    }

    /// Read NUMBER or LONGNUMBER; returns the text and whether the `L`
    /// suffix was present.
    fn read_number(&mut self) -> (String, bool) {
        let start = self.position;
        let mut has_decimal = false;

        while self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }

        // Only take the '.' when digits follow; otherwise it is the path
        // operator (e.g. `1.toString()`).
        if self.current() == Some('.') && self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            has_decimal = true;
            self.advance();
            while self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
        }

        let mut is_long = false;
        if !has_decimal && self.current() == Some('L') {
            is_long = true;
            self.advance();
        }

        let mut text: String = self.chars[start..self.position].iter().collect();
        if is_long {
            text.pop(); // drop the suffix; the kind carries it
        }
        (text, is_long)
    }

    fn read_fixed_digits(&mut self, count: usize, what: &str) -> Result<String, String> {
        let mut out = String::new();
        for _ in 0..count {
            match self.current() {
                Some(c) if c.is_ascii_digit() => {
                    out.push(c);
                    self.advance();
                }
                _ => return Err(format!("Invalid {}: expected {} digits", what, count)),
            }
        }
        Ok(out)
    }

    /// Read `@date`, `@dateTime` or `@Ttime` literal text.
    fn read_date_time(&mut self) -> Result<(String, TokenKind), String> {
        self.advance(); // '@'

        if self.current() == Some('T') {
            self.advance();
            return self.read_time_format().map(|s| (s, TokenKind::TimeLiteral));
        }

        let date = self.read_date_format()?;

        if self.current() == Some('T') {
            self.advance();
            // `@2015T` (partial) has no time component after the T.
            if self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                let time = self.read_time_format()?;
                let tz = match self.current() {
                    Some('Z') | Some('+') | Some('-') => self.read_timezone_offset()?,
                    _ => String::new(),
                };
                Ok((format!("{}T{}{}", date, time, tz), TokenKind::DateTimeLiteral))
            } else {
                Ok((format!("{}T", date), TokenKind::DateTimeLiteral))
            }
        } else {
            Ok((date, TokenKind::DateLiteral))
        }
    }

    /// YYYY(-MM(-DD)?)?
    fn read_date_format(&mut self) -> Result<String, String> {
        let mut value = self.read_fixed_digits(4, "date year")?;
        if self.current() == Some('-') {
            value.push('-');
            self.advance();
            value.push_str(&self.read_fixed_digits(2, "date month")?);
            if self.current() == Some('-') {
                value.push('-');
                self.advance();
                value.push_str(&self.read_fixed_digits(2, "date day")?);
            }
        }
        Ok(value)
    }

    /// HH(:MM(:SS(.fff)?)?)?
    fn read_time_format(&mut self) -> Result<String, String> {
        let mut value = self.read_fixed_digits(2, "time hour")?;
        if self.current() == Some(':') {
            value.push(':');
            self.advance();
            value.push_str(&self.read_fixed_digits(2, "time minute")?);
            if self.current() == Some(':') {
                value.push(':');
                self.advance();
                value.push_str(&self.read_fixed_digits(2, "time second")?);
                // Only take the '.' when digits follow (e.g. @T14:34:28.calls()).
                if self.current() == Some('.')
                    && self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false)
                {
                    value.push('.');
                    self.advance();
                    while self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                        value.push(self.current().unwrap());
                        self.advance();
                    }
                }
            }
        }
        Ok(value)
    }

    /// Z or +/-HH:MM
    fn read_timezone_offset(&mut self) -> Result<String, String> {
        if self.current() == Some('Z') {
            self.advance();
            return Ok("Z".into());
        }
        let mut value = String::new();
        if let Some(sign @ ('+' | '-')) = self.current() {
            value.push(sign);
            self.advance();
            value.push_str(&self.read_fixed_digits(2, "timezone hour")?);
            if self.current() != Some(':') {
                return Err("Invalid timezone: expected ':' and 2-digit minute".into());
            }
            value.push(':');
            self.advance();
            value.push_str(&self.read_fixed_digits(2, "timezone minute")?);
        }
        Ok(value)
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace();
            if self.current() == Some('/') && matches!(self.peek(), Some('/') | Some('*')) {
                let (line, column) = (self.line, self.column);
                if let Err(message) = self.skip_comment() {
                    return Token::error(message, line, column);
                }
            } else {
                break;
            }
        }

        let line = self.line;
        let column = self.column;

        let Some(c) = self.current() else {
            return Token::eof(line, column);
        };

        macro_rules! simple {
            ($kind:ident, $text:literal) => {{
                self.advance();
                Token::new(TokenKind::$kind, $text, line, column)
            }};
        }

        match c {
            '.' => simple!(Dot, "."),
            '[' => simple!(OpenBracket, "["),
            ']' => simple!(CloseBracket, "]"),
            '(' => simple!(OpenParen, "("),
            ')' => simple!(CloseParen, ")"),
            '{' => simple!(OpenBrace, "{"),
            '}' => simple!(CloseBrace, "}"),
            ',' => simple!(Comma, ","),
            '+' => simple!(Plus, "+"),
            '-' => simple!(Minus, "-"),
            '*' => simple!(Multiply, "*"),
            '/' => simple!(Divide, "/"),
            '&' => simple!(Ampersand, "&"),
            '|' => simple!(Pipe, "|"),
            '=' => simple!(Equal, "="),
            '~' => simple!(Equivalent, "~"),
            '%' => {
                self.advance();
                let result = match self.current() {
                    Some('\'') => self.read_quoted('\'', "string literal"),
                    Some('`') => self.read_quoted('`', "delimited identifier"),
                    _ => Ok(self.read_identifier()),
                };
                match result {
                    Ok(name) if !name.is_empty() => {
                        Token::new(TokenKind::ExternalConstant, name, line, column)
                    }
                    Ok(_) => Token::error("Expected name after '%'", line, column),
                    Err(message) => Token::error(message, line, column),
                }
            }
            '@' => match self.read_date_time() {
                Ok((text, kind)) => Token::new(kind, text, line, column),
                Err(message) => Token::error(message, line, column),
            },
            '\'' => match self.read_quoted('\'', "string literal") {
                Ok(text) => Token::new(TokenKind::StringLiteral, text, line, column),
                Err(message) => Token::error(message, line, column),
            },
            '`' => match self.read_quoted('`', "delimited identifier") {
                Ok(text) => Token::new(TokenKind::DelimitedIdentifier, text, line, column),
                Err(message) => Token::error(message, line, column),
            },
            '<' => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    Token::new(TokenKind::LessThanOrEqual, "<=", line, column)
                } else {
                    Token::new(TokenKind::LessThan, "<", line, column)
                }
            }
            '>' => {
                self.advance();
                if self.current() == Some('=') {
                    self.advance();
                    Token::new(TokenKind::GreaterThanOrEqual, ">=", line, column)
                } else {
                    Token::new(TokenKind::GreaterThan, ">", line, column)
                }
            }
            '!' => {
                self.advance();
                match self.current() {
                    Some('=') => {
                        self.advance();
                        Token::new(TokenKind::NotEqual, "!=", line, column)
                    }
                    Some('~') => {
                        self.advance();
                        Token::new(TokenKind::NotEquivalent, "!~", line, column)
                    }
                    _ => Token::error("Unexpected '!'", line, column),
                }
            }
            '$' => {
                self.advance();
                let name = self.read_identifier();
                match name.as_str() {
                    "this" => Token::new(TokenKind::This, "$this", line, column),
                    "index" => Token::new(TokenKind::Index, "$index", line, column),
                    "total" => Token::new(TokenKind::Total, "$total", line, column),
                    _ => Token::error(format!("Unknown variable: ${}", name), line, column),
                }
            }
            c if c.is_ascii_digit() => {
                let (text, is_long) = self.read_number();
                let kind = if is_long {
                    TokenKind::LongNumberLiteral
                } else {
                    TokenKind::NumberLiteral
                };
                Token::new(kind, text, line, column)
            }
            c if c.is_alphabetic() || c == '_' => {
                let ident = self.read_identifier();
                let kind = match ident.as_str() {
                    "true" | "false" => TokenKind::BooleanLiteral,
                    "as" => TokenKind::As,
                    "is" => TokenKind::Is,
                    "div" => TokenKind::Div,
                    "mod" => TokenKind::Mod,
                    "in" => TokenKind::In,
                    "contains" => TokenKind::Contains,
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "xor" => TokenKind::Xor,
                    "implies" => TokenKind::Implies,
                    _ => TokenKind::Identifier,
                };
                Token::new(kind, ident, line, column)
            }
            other => Token::error(format!("Unexpected character: {}", other), line, column),
        }
    }

    /// Tokenize the remaining input, collecting lexical diagnostics.
    pub fn scan_all(input: &str) -> (Vec<Token>, Vec<Token>) {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        let mut errors = Vec::new();
        loop {
            let token = lexer.next_token();
            match token.kind {
                TokenKind::Eof => {
                    tokens.push(token);
                    break;
                }
                TokenKind::Error => errors.push(token),
                _ => tokens.push(token),
            }
        }
        (tokens, errors)
    }
}
