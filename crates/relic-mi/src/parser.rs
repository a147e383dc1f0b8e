use crate::cstring::unescape_char;
use crate::{AsyncKind, AsyncRecord, ParseError, Record, ResultClass, ResultRecord};
use crate::{Result, StreamKind, StreamRecord, Tuple, Value};

/// Parses a single line of MI output.
///
/// The line may still carry its line terminator (`\n` or `\r\n`).
pub fn parse_record(line: &str) -> Result<Record> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line.trim_end() == "(gdb)" {
        return Ok(Record::Prompt);
    }

    let mut parser = Parser::new(line);

    let token = parser.token()?;

    let record = match parser.bump() {
        Some(b'^') => {
            let name = parser.identifier();
            let class = ResultClass::from_name(name)
                .ok_or_else(|| ParseError::UnknownResultClass(name.to_owned()))?;

            Record::Result(ResultRecord {
                token,
                class,
                results: parser.results()?,
            })
        }
        Some(marker @ (b'*' | b'+' | b'=')) => {
            let kind = match marker {
                b'*' => AsyncKind::Exec,
                b'+' => AsyncKind::Status,
                _ => AsyncKind::Notify,
            };

            let class = parser.identifier().to_owned();

            Record::Async(AsyncRecord {
                token,
                kind,
                class,
                results: parser.results()?,
            })
        }
        Some(marker @ (b'~' | b'@' | b'&')) if token.is_none() => {
            let kind = match marker {
                b'~' => StreamKind::Console,
                b'@' => StreamKind::Target,
                _ => StreamKind::Log,
            };

            let text = parser.cstring()?;
            parser.end()?;

            Record::Stream(StreamRecord { kind, text })
        }
        _ => return Err(ParseError::NotARecord),
    };

    Ok(record)
}

/// Maximum nesting of tuples and lists in a value.
pub const MAX_DEPTH: usize = 128;

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        match self.peek() {
            Some(b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(self.unexpected_char()),
            None => Err(ParseError::UnexpectedEnd(self.pos)),
        }
    }

    fn end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.unexpected_char()),
        }
    }

    fn unexpected_char(&self) -> ParseError {
        match self.input.get(self.pos..).and_then(|s| s.chars().next()) {
            Some(c) => ParseError::UnexpectedChar(self.pos, c),
            None => ParseError::UnexpectedEnd(self.pos),
        }
    }

    fn token(&mut self) -> Result<Option<u64>> {
        let start = self.pos;

        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }

        if start == self.pos {
            return Ok(None);
        }

        let digits = &self.input[start..self.pos];

        digits
            .parse()
            .map(Some)
            .map_err(|_| ParseError::TokenOutOfRange(digits.to_owned()))
    }

    fn identifier(&mut self) -> &'a str {
        let start = self.pos;

        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            self.pos += 1;
        }

        &self.input[start..self.pos]
    }

    /// Parses `(,result)*` until the end of the line.
    fn results(&mut self) -> Result<Tuple> {
        let mut results = Vec::new();

        while self.peek() == Some(b',') {
            self.pos += 1;
            results.push(self.result()?);
        }

        self.end()?;

        Ok(Tuple(results))
    }

    fn result(&mut self) -> Result<(String, Value)> {
        let name = self.identifier();

        if name.is_empty() {
            return Err(self.unexpected_char());
        }

        self.expect(b'=')?;

        Ok((name.to_owned(), self.value()?))
    }

    fn value(&mut self) -> Result<Value> {
        match self.peek() {
            Some(b'"') => self.cstring().map(Value::Const),
            Some(b'{') => self.nested(Self::tuple).map(Value::Tuple),
            Some(b'[') => self.nested(Self::list),
            Some(_) => Err(self.unexpected_char()),
            None => Err(ParseError::UnexpectedEnd(self.pos)),
        }
    }

    fn nested<T>(&mut self, parse: fn(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth == MAX_DEPTH {
            return Err(ParseError::TooDeep(self.pos));
        }

        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;

        parsed
    }

    fn tuple(&mut self) -> Result<Tuple> {
        self.expect(b'{')?;

        let mut results = Vec::new();

        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Tuple(results));
        }

        loop {
            results.push(self.result()?);

            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => break Ok(Tuple(results)),
                Some(_) => {
                    self.pos -= 1;
                    break Err(self.unexpected_char());
                }
                None => break Err(ParseError::UnexpectedEnd(self.pos)),
            }
        }
    }

    fn list(&mut self) -> Result<Value> {
        self.expect(b'[')?;

        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::List(Vec::new()));
        }

        // a list holds either bare values or named results, never both
        let is_result_list = !matches!(self.peek(), Some(b'"' | b'{' | b'['));

        let mut values = Vec::new();
        let mut results = Vec::new();

        loop {
            if is_result_list {
                results.push(self.result()?);
            } else {
                values.push(self.value()?);
            }

            match self.bump() {
                Some(b',') => continue,
                Some(b']') => break,
                Some(_) => {
                    self.pos -= 1;
                    return Err(self.unexpected_char());
                }
                None => return Err(ParseError::UnexpectedEnd(self.pos)),
            }
        }

        if is_result_list {
            Ok(Value::ResultList(Tuple(results)))
        } else {
            Ok(Value::List(values))
        }
    }

    fn cstring(&mut self) -> Result<String> {
        self.expect(b'"')?;

        let mut bytes = Vec::new();

        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => {
                    let escaped = self
                        .bump()
                        .ok_or(ParseError::UnexpectedEnd(self.pos))?;

                    match unescape_char(escaped) {
                        Some(b) => bytes.push(b),
                        None => bytes.push(self.octal_escape(escaped)),
                    }
                }
                Some(b) => bytes.push(b),
                None => return Err(ParseError::UnexpectedEnd(self.pos)),
            }
        }

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Parses up to three octal digits, the first one being already consumed.
    fn octal_escape(&mut self, first: u8) -> u8 {
        let mut value = u32::from(first - b'0');

        for _ in 0..2 {
            match self.peek() {
                Some(d @ b'0'..=b'7') => {
                    value = value * 8 + u32::from(d - b'0');
                    self.pos += 1;
                }
                _ => break,
            }
        }

        (value & 0xff) as u8
    }
}
