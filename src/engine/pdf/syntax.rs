//! Raw PDF object syntax
//!
//! Formats `lopdf` objects as the textual fragments returned by
//! `read_key`, and parses fragments supplied to `write_key`.
//!
//! Grammar:
//! ```text
//! object = "null" | "true" | "false" | number | name | string
//!        | hexstring | array | dict | reference
//! array  = "[" object* "]"
//! dict   = "<<" (name object)* ">>"
//! reference = int int "R"
//! ```

use lopdf::{Dictionary, Object, StringFormat};
use thiserror::Error;

/// Raw syntax errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("Empty object")]
    Empty,

    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("Unexpected end of input")]
    UnexpectedEnd,

    #[error("Invalid number at position {0}")]
    InvalidNumber(usize),

    #[error("Trailing data at position {0}")]
    Trailing(usize),

    #[error("Nesting too deep at position {0}")]
    TooDeep(usize),
}

/// Deepest array/dictionary nesting accepted by [`parse_object`]
pub const MAX_NESTING: usize = 256;

/// Kind tag reported alongside raw text
pub fn kind_of(object: &Object) -> &'static str {
    match object {
        Object::Null => "null",
        Object::Boolean(_) => "bool",
        Object::Integer(_) => "int",
        Object::Real(_) => "float",
        Object::Name(_) => "name",
        Object::String(..) => "string",
        Object::Array(_) => "array",
        Object::Dictionary(_) | Object::Stream(_) => "dict",
        Object::Reference(_) => "xref",
    }
}

/// Serialize an object (streams are written as their dictionary)
pub fn format_object(object: &Object) -> String {
    let mut out = String::new();
    write_object(object, &mut out);
    out
}

fn write_object(object: &Object, out: &mut String) {
    match object {
        Object::Null => out.push_str("null"),
        Object::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Object::Integer(i) => out.push_str(&i.to_string()),
        Object::Real(r) => out.push_str(&format_real(f64::from(*r))),
        Object::Name(name) => write_name(name, out),
        Object::String(bytes, StringFormat::Hexadecimal) => {
            out.push('<');
            for byte in bytes {
                out.push_str(&format!("{byte:02x}"));
            }
            out.push('>');
        }
        Object::String(bytes, StringFormat::Literal) => write_literal(bytes, out),
        Object::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(' ');
                }
                write_object(item, out);
            }
            out.push(']');
        }
        Object::Dictionary(dict) => write_dict(dict, out),
        Object::Stream(stream) => write_dict(&stream.dict, out),
        Object::Reference((id, generation)) => out.push_str(&format!("{id} {generation} R")),
    }
}

fn write_dict(dict: &Dictionary, out: &mut String) {
    out.push_str("<<");
    for (idx, (key, value)) in dict.iter().enumerate() {
        if idx > 0 {
            out.push(' ');
        }
        write_name(key, out);
        out.push(' ');
        write_object(value, out);
    }
    out.push_str(">>");
}

fn format_real(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        let text = format!("{value:.6}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn write_name(name: &[u8], out: &mut String) {
    out.push('/');
    for &byte in name {
        if byte.is_ascii_graphic() && !is_delimiter(byte) && byte != b'#' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("#{byte:02X}"));
        }
    }
}

fn write_literal(bytes: &[u8], out: &mut String) {
    out.push('(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(byte as char);
            }
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{byte:03o}")),
        }
    }
    out.push(')');
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise byte-per-char)
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xfe, 0xff]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Encode a text string, using UTF-16BE only when needed
pub fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xfe, 0xff];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

/// Text of a string object, if it is one
pub fn object_text(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(decode_text(bytes)),
        _ => None,
    }
}

pub fn name(value: &str) -> Object {
    Object::Name(value.as_bytes().to_vec())
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c' | 0)
}

fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Parse one complete object
pub fn parse_object(input: &str) -> Result<Object, SyntaxError> {
    let mut parser = Parser::new(input.as_bytes());
    parser.skip_ws();
    if parser.at_end() {
        return Err(SyntaxError::Empty);
    }
    let object = parser.parse_value()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(SyntaxError::Trailing(parser.pos));
    }
    Ok(object)
}

/// Parser state
struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    /// Open arrays and dictionaries
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(SyntaxError::TooDeep(self.pos));
        }
        self.depth += 1;
        Ok(())
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn starts_with(&self, s: &[u8]) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn unexpected(&self) -> SyntaxError {
        match self.peek() {
            Some(byte) => SyntaxError::UnexpectedChar(byte as char, self.pos),
            None => SyntaxError::UnexpectedEnd,
        }
    }

    fn skip_ws(&mut self) {
        while let Some(byte) = self.peek() {
            if is_space(byte) {
                self.pos += 1;
            } else if byte == b'%' {
                while let Some(b) = self.advance() {
                    if b == b'\n' || b == b'\r' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn parse_value(&mut self) -> Result<Object, SyntaxError> {
        match self.peek().ok_or(SyntaxError::UnexpectedEnd)? {
            b'<' if self.peek_at(1) == Some(b'<') => self.parse_dict(),
            b'<' => self.parse_hex(),
            b'(' => self.parse_literal(),
            b'/' => self.parse_name().map(Object::Name),
            b'[' => self.parse_array(),
            b'0'..=b'9' | b'+' | b'-' | b'.' => self.parse_number_or_ref(),
            _ => self.parse_keyword(),
        }
    }

    fn parse_keyword(&mut self) -> Result<Object, SyntaxError> {
        for (word, object) in [
            (&b"null"[..], Object::Null),
            (&b"true"[..], Object::Boolean(true)),
            (&b"false"[..], Object::Boolean(false)),
        ] {
            if self.starts_with(word)
                && self
                    .input
                    .get(self.pos + word.len())
                    .map_or(true, |b| is_space(*b) || is_delimiter(*b))
            {
                self.pos += word.len();
                return Ok(object);
            }
        }
        Err(self.unexpected())
    }

    fn parse_dict(&mut self) -> Result<Object, SyntaxError> {
        self.enter()?;
        self.pos += 2;
        let mut dict = Dictionary::new();
        loop {
            self.skip_ws();
            if self.starts_with(b">>") {
                self.pos += 2;
                self.depth -= 1;
                return Ok(Object::Dictionary(dict));
            }
            if self.peek() != Some(b'/') {
                return Err(self.unexpected());
            }
            let key = self.parse_name()?;
            self.skip_ws();
            let value = self.parse_value()?;
            dict.set(key, value);
        }
    }

    fn parse_array(&mut self) -> Result<Object, SyntaxError> {
        self.enter()?;
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    self.depth -= 1;
                    return Ok(Object::Array(items));
                }
                Some(_) => items.push(self.parse_value()?),
                None => return Err(SyntaxError::UnexpectedEnd),
            }
        }
    }

    fn parse_name(&mut self) -> Result<Vec<u8>, SyntaxError> {
        self.pos += 1;
        let mut name = Vec::new();
        while let Some(byte) = self.peek() {
            if is_space(byte) || is_delimiter(byte) {
                break;
            }
            self.pos += 1;
            if byte == b'#' {
                let hex = self
                    .input
                    .get(self.pos..self.pos + 2)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(decoded) => {
                        name.push(decoded);
                        self.pos += 2;
                    }
                    None => name.push(byte),
                }
            } else {
                name.push(byte);
            }
        }
        Ok(name)
    }

    fn parse_literal(&mut self) -> Result<Object, SyntaxError> {
        self.pos += 1;
        let mut bytes = Vec::new();
        let mut depth = 1usize;
        loop {
            let byte = self.advance().ok_or(SyntaxError::UnexpectedEnd)?;
            match byte {
                b'(' => {
                    depth += 1;
                    bytes.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Object::String(bytes, StringFormat::Literal));
                    }
                    bytes.push(byte);
                }
                b'\\' => {
                    let escaped = self.advance().ok_or(SyntaxError::UnexpectedEnd)?;
                    match escaped {
                        b'n' => bytes.push(b'\n'),
                        b'r' => bytes.push(b'\r'),
                        b't' => bytes.push(b'\t'),
                        b'b' => bytes.push(0x08),
                        b'f' => bytes.push(0x0c),
                        b'0'..=b'7' => {
                            let mut value = u32::from(escaped - b'0');
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(d - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            bytes.push((value & 0xff) as u8);
                        }
                        // Line continuation
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        other => bytes.push(other),
                    }
                }
                _ => bytes.push(byte),
            }
        }
    }

    fn parse_hex(&mut self) -> Result<Object, SyntaxError> {
        self.pos += 1;
        let mut digits = Vec::new();
        loop {
            let byte = self.advance().ok_or(SyntaxError::UnexpectedEnd)?;
            match byte {
                b'>' => break,
                b if b.is_ascii_hexdigit() => digits.push(b),
                b if is_space(b) => {}
                b => return Err(SyntaxError::UnexpectedChar(b as char, self.pos - 1)),
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }
        let bytes = digits
            .chunks(2)
            .filter_map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
            })
            .collect();
        Ok(Object::String(bytes, StringFormat::Hexadecimal))
    }

    fn scan_number(&mut self) -> (usize, bool) {
        let start = self.pos;
        let mut is_real = false;
        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        while let Some(byte) = self.peek() {
            match byte {
                b'0'..=b'9' => self.pos += 1,
                b'.' if !is_real => {
                    is_real = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        (start, is_real)
    }

    fn parse_number_or_ref(&mut self) -> Result<Object, SyntaxError> {
        let (start, is_real) = self.scan_number();
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| SyntaxError::InvalidNumber(start))?;

        if is_real {
            return text
                .parse::<f32>()
                .map(Object::Real)
                .map_err(|_| SyntaxError::InvalidNumber(start));
        }
        let value: i64 = text.parse().map_err(|_| SyntaxError::InvalidNumber(start))?;

        // `<id> <gen> R` lookahead
        if value >= 0 && !text.starts_with(['+', '-']) {
            let checkpoint = self.pos;
            self.skip_ws();
            let gen_start = self.pos;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
            if self.pos > gen_start && gen_start > checkpoint {
                let generation = std::str::from_utf8(&self.input[gen_start..self.pos])
                    .ok()
                    .and_then(|g| g.parse::<u16>().ok());
                self.skip_ws();
                let at_r = self.peek() == Some(b'R')
                    && self
                        .peek_at(1)
                        .map_or(true, |b| is_space(b) || is_delimiter(b));
                if let (Some(generation), true, Ok(id)) = (generation, at_r, u32::try_from(value)) {
                    self.pos += 1;
                    return Ok(Object::Reference((id, generation)));
                }
            }
            self.pos = checkpoint;
        }

        Ok(Object::Integer(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        assert!(matches!(parse_object("null"), Ok(Object::Null)));
        assert!(matches!(parse_object(" true "), Ok(Object::Boolean(true))));
        assert!(matches!(parse_object("-12"), Ok(Object::Integer(-12))));
        assert!(matches!(parse_object("0.5"), Ok(Object::Real(r)) if r == 0.5));
        assert!(matches!(parse_object("/OCG"), Ok(Object::Name(n)) if n == b"OCG"));
        assert!(matches!(parse_object("12 0 R"), Ok(Object::Reference((12, 0)))));
    }

    #[test]
    fn test_parse_nested_structure() {
        let object =
            parse_object("<</Order [1 0 R [2 0 R 3 0 R]] /Name (A \\(b\\)) /N 3>>").unwrap();
        let dict = object.as_dict().unwrap();
        let order = dict.get(b"Order").unwrap().as_array().unwrap();
        assert!(matches!(order[0], Object::Reference((1, 0))));
        assert_eq!(order[1].as_array().unwrap().len(), 2);
        assert!(matches!(
            dict.get(b"Name").unwrap(),
            Object::String(bytes, StringFormat::Literal) if bytes == b"A (b)"
        ));
        assert!(matches!(dict.get(b"N").unwrap(), Object::Integer(3)));
    }

    #[test]
    fn test_nesting_limit() {
        let ok = format!("{}{}", "[".repeat(MAX_NESTING), "]".repeat(MAX_NESTING));
        assert!(parse_object(&ok).is_ok());

        let deep = format!("{}{}", "[".repeat(10_000), "]".repeat(10_000));
        assert!(matches!(
            parse_object(&deep),
            Err(SyntaxError::TooDeep(pos)) if pos == MAX_NESTING
        ));
        assert!(matches!(
            parse_object(&"<</A ".repeat(10_000)),
            Err(SyntaxError::TooDeep(_))
        ));
    }

    #[test]
    fn test_integers_not_followed_by_r_stay_integers() {
        let object = parse_object("[0 0 612 792]").unwrap();
        let items = object.as_array().unwrap();
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(|item| matches!(item, Object::Integer(_))));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_object("").err(), Some(SyntaxError::Empty));
        assert_eq!(parse_object("[1 0 R").err(), Some(SyntaxError::UnexpectedEnd));
        assert!(matches!(parse_object("[] x"), Err(SyntaxError::Trailing(_))));
        assert!(parse_object("nul").is_err());
    }

    #[test]
    fn test_format_round_trip() {
        for raw in [
            "[1 0 R [2 0 R] 3 0 R]",
            "<</Type /OCG /Name (Layer \\(1\\))>>",
            "<e8f0>",
            "/A#20B",
            "0.25",
        ] {
            let object = parse_object(raw).unwrap();
            assert_eq!(format_object(&object), raw);
        }
    }

    #[test]
    fn test_text_strings() {
        assert_eq!(object_text(&text_string("Layer 1")).as_deref(), Some("Layer 1"));
        let unicode = text_string("Ebene \u{e4}");
        assert!(matches!(&unicode, Object::String(bytes, StringFormat::Hexadecimal) if bytes.starts_with(&[0xfe, 0xff])));
        assert_eq!(object_text(&unicode).as_deref(), Some("Ebene \u{e4}"));
    }

    #[test]
    fn test_kind_of() {
        assert_eq!(kind_of(&Object::Reference((3, 0))), "xref");
        assert_eq!(kind_of(&Object::Dictionary(Dictionary::new())), "dict");
        assert_eq!(kind_of(&Object::Array(vec![])), "array");
    }
}
