#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Literal values of the notebook language.
//!
//! Kernel results arrive as the textual `repr` of a value. [`parse`] turns
//! that text back into a [`Value`] using a grammar that only admits literal
//! syntax (numbers, strings, bytes, booleans, `None`, and list, tuple, set and
//! dict displays). Nothing is ever evaluated.

use std::fmt::{self, Display, Write as _};

use serde::{Serialize, Serializer};

/// A parsed literal.
#[derive(Debug, Clone)]
pub enum Value {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// An integer that fits in 128 bits.
    Int(i128),
    /// A double precision float.
    Float(f64),
    /// A text string.
    Str(String),
    /// A bytes literal.
    Bytes(Vec<u8>),
    /// `[a, b]`
    List(Vec<Value>),
    /// `(a, b)`
    Tuple(Vec<Value>),
    /// `{a, b}`, deduplicated, in first-seen order.
    Set(Vec<Value>),
    /// `{k: v}`, deduplicated by key, in first-seen order.
    Dict(Vec<(Value, Value)>),
}

/// Numeric view used for cross-type comparisons.
#[derive(Clone, Copy)]
enum Number {
    /// Integral value (booleans included).
    Int(i128),
    /// Floating point value.
    Float(f64),
}

impl Number {
    /// Exact numeric equality, as the notebook language defines it.
    fn same_as(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a == b,
            (Number::Int(i), Number::Float(f)) | (Number::Float(f), Number::Int(i)) => {
                f.is_finite() && f.fract() == 0.0 && f.abs() < 2f64.powi(127) && f as i128 == i
            }
        }
    }
}

impl Value {
    /// Name of the value's type in the notebook language.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
        }
    }

    /// Builds a set, dropping duplicates and keeping first-seen order.
    pub fn set(items: Vec<Value>) -> Value {
        let mut unique: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Value::Set(unique)
    }

    /// Builds a dict; a repeated key keeps its first position and its last
    /// value.
    pub fn dict(pairs: Vec<(Value, Value)>) -> Value {
        let mut unique: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match unique.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => unique.push((key, value)),
            }
        }
        Value::Dict(unique)
    }

    /// Whether the value may be a set element or dict key.
    fn is_hashable(&self) -> bool {
        match self {
            Value::List(_) | Value::Set(_) | Value::Dict(_) => false,
            Value::Tuple(items) => items.iter().all(Value::is_hashable),
            _ => true,
        }
    }

    /// Numeric view of booleans, integers and floats.
    fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i128::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a.len() == b.len() && a.iter().all(|x| b.contains(x)),
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a.same_as(b),
                _ => false,
            },
        }
    }
}

/// Rounds to two decimals the way the notebook language's `round(x, 2)`
/// does: on the exact binary value, ties to even.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{value:.2}").parse().unwrap_or(value)
}

/// Parses `text` as a literal; `None` when it is anything else.
pub fn parse(text: &str) -> Option<Value> {
    literal_grammar::literal(text).ok()
}

/// Renders a float the way the notebook language's `repr` does.
fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.into();
    }

    let sci = format!("{value:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exp) {
        if exp >= 0 {
            let point = exp as usize + 1;
            if digits.len() <= point {
                format!("{sign}{digits}{}.0", "0".repeat(point - digits.len()))
            } else {
                format!("{sign}{}.{}", &digits[..point], &digits[point..])
            }
        } else {
            format!("{sign}0.{}{digits}", "0".repeat((-exp - 1) as usize))
        }
    } else {
        let mantissa = if digits.len() > 1 {
            format!("{}.{}", &digits[..1], &digits[1..])
        } else {
            digits
        };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{sign}{mantissa}e{exp_sign}{:02}", exp.abs())
    }
}

/// Picks the quote character `repr` would use for a string body.
fn quote_for(has_single: bool, has_double: bool) -> char {
    if has_single && !has_double { '"' } else { '\'' }
}

/// Renders a string with `repr` quoting and escapes.
fn str_repr(s: &str) -> String {
    let quote = quote_for(s.contains('\''), s.contains('"'));
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || (0x7f..0xa0).contains(&(c as u32)) => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Renders bytes with `repr` quoting and escapes.
fn bytes_repr(bytes: &[u8]) -> String {
    let quote = quote_for(bytes.contains(&b'\''), bytes.contains(&b'"'));
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push('b');
    out.push(quote);
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b if b as char == quote => {
                out.push('\\');
                out.push(quote);
            }
            0x20..=0x7e => out.push(b as char),
            b => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out.push(quote);
    out
}

/// Writes `items` separated by `, `.
fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl Display for Value {
    /// Canonical literal text, identical to the notebook language's `repr`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => f.write_str(&float_repr(*x)),
            Value::Str(s) => f.write_str(&str_repr(s)),
            Value::Bytes(b) => f.write_str(&bytes_repr(b)),
            Value::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::Set(items) if items.is_empty() => f.write_str("set()"),
            Value::Set(items) => {
                f.write_str("{")?;
                write_items(f, items)?;
                f.write_str("}")
            }
            Value::Dict(pairs) => {
                f.write_str("{")?;
                for (idx, (k, v)) in pairs.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One quoted piece of a (possibly implicitly concatenated) string literal.
enum Piece {
    /// Piece of a text string.
    Text(String),
    /// Piece of a bytes literal.
    Bytes(Vec<u8>),
}

/// Validates a string prefix, returning `(raw, bytes)`.
fn prefix_flags(prefix: &str) -> Option<(bool, bool)> {
    let lower = prefix.to_ascii_lowercase();
    match lower.as_str() {
        "" | "u" => Some((false, false)),
        "r" => Some((true, false)),
        "b" => Some((false, true)),
        "br" | "rb" => Some((true, true)),
        _ => None,
    }
}

/// Reads up to `max` digits of the given radix from `chars`.
fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, radix: u32, max: usize) -> String {
    let mut digits = String::new();
    while digits.len() < max {
        match chars.peek() {
            Some(c) if c.is_digit(radix) => {
                digits.push(*c);
                chars.next();
            }
            _ => break,
        }
    }
    digits
}

/// Decodes the backslash escapes of a non-raw string body into code points.
///
/// Bytes bodies reject `\u`, `\U` and `\N` as escapes and keep them verbatim,
/// and never produce code points above `0xff`.
fn unescape(body: &str, bytes: bool) -> Result<Vec<u32>, &'static str> {
    let mut out = Vec::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c as u32);
            continue;
        }
        let Some(esc) = chars.next() else {
            return Err("dangling backslash");
        };
        match esc {
            '\n' => {}
            '\\' => out.push('\\' as u32),
            '\'' => out.push('\'' as u32),
            '"' => out.push('"' as u32),
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'n' => out.push('\n' as u32),
            'r' => out.push('\r' as u32),
            't' => out.push('\t' as u32),
            'v' => out.push(0x0b),
            '0'..='7' => {
                let mut digits = String::from(esc);
                digits.push_str(&take_digits(&mut chars, 8, 2));
                let code = u32::from_str_radix(&digits, 8).map_err(|_| "octal escape")?;
                out.push(if bytes { code & 0xff } else { code });
            }
            'x' => {
                let digits = take_digits(&mut chars, 16, 2);
                if digits.len() != 2 {
                    return Err("truncated \\x escape");
                }
                out.push(u32::from_str_radix(&digits, 16).map_err(|_| "hex escape")?);
            }
            'u' | 'U' if !bytes => {
                let width = if esc == 'u' { 4 } else { 8 };
                let digits = take_digits(&mut chars, 16, width);
                if digits.len() != width {
                    return Err("truncated unicode escape");
                }
                out.push(u32::from_str_radix(&digits, 16).map_err(|_| "unicode escape")?);
            }
            'N' if !bytes => return Err("named unicode escapes are not supported"),
            other => {
                out.push('\\' as u32);
                out.push(other as u32);
            }
        }
    }
    Ok(out)
}

/// Turns one quoted body into a [`Piece`].
fn make_piece(prefix: &str, body: &str) -> Result<Piece, &'static str> {
    let (raw, bytes) = prefix_flags(prefix).ok_or("unsupported string prefix")?;

    let codes: Vec<u32> = if raw {
        body.chars().map(|c| c as u32).collect()
    } else {
        unescape(body, bytes)?
    };

    if bytes {
        if !body.is_ascii() {
            return Err("bytes can only contain ASCII literal characters");
        }
        codes
            .into_iter()
            .map(|c| u8::try_from(c).map_err(|_| "byte out of range"))
            .collect::<Result<Vec<u8>, _>>()
            .map(Piece::Bytes)
    } else {
        codes
            .into_iter()
            .map(|c| char::from_u32(c).ok_or("invalid code point"))
            .collect::<Result<String, _>>()
            .map(Piece::Text)
    }
}

/// Joins implicitly concatenated pieces; mixing text and bytes is an error.
fn join_pieces(pieces: Vec<Piece>) -> Result<Value, &'static str> {
    match pieces.first() {
        Some(Piece::Bytes(_)) => {
            let mut joined = Vec::new();
            for piece in pieces {
                match piece {
                    Piece::Bytes(b) => joined.extend(b),
                    Piece::Text(_) => return Err("cannot mix bytes and nonbytes literals"),
                }
            }
            Ok(Value::Bytes(joined))
        }
        _ => {
            let mut joined = String::new();
            for piece in pieces {
                match piece {
                    Piece::Text(s) => joined.push_str(&s),
                    Piece::Bytes(_) => return Err("cannot mix bytes and nonbytes literals"),
                }
            }
            Ok(Value::Str(joined))
        }
    }
}

/// Collapses a comma separated sequence: a single item without a trailing
/// comma is just that item, anything else is a tuple.
fn sequence(mut items: Vec<Value>, trailing_comma: bool) -> Value {
    if items.len() == 1 && !trailing_comma {
        items.remove(0)
    } else {
        Value::Tuple(items)
    }
}

/// Applies a unary minus to a number.
fn negate(value: Value) -> Value {
    match value {
        Value::Int(i) => Value::Int(-i),
        Value::Float(f) => Value::Float(-f),
        other => other,
    }
}

peg::parser! {
    /// Grammar for the literal subset of the notebook language.
    grammar literal_grammar() for str {
        /// blanks, newlines and explicit line continuations
        rule _() = quiet!{ ([' ' | '\t' | '\n' | '\r' | '\x0c'] / "\\\n")* }

        /// any character that may continue an identifier
        rule ident_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']

        /// decimal digits with single underscores between them
        rule dec() = ['0'..='9']+ ("_" ['0'..='9']+)*

        /// exponent part of a float
        rule exponent() = ['e' | 'E'] ['+' | '-']? dec()

        /// a complete literal, optionally a bare tuple like `1, 2`
        pub rule literal() -> Value
            = _ items:(expr() ++ (_ "," _)) trailing:(_ ",")? _ { sequence(items, trailing.is_some()) }

        /// a single literal expression
        rule expr() -> Value
            = signed()
            / strings()
            / keyword()
            / list()
            / paren()
            / brace()

        /// `None`, `True` and `False`
        rule keyword() -> Value
            = "None" !ident_char() { Value::None }
            / "True" !ident_char() { Value::Bool(true) }
            / "False" !ident_char() { Value::Bool(false) }

        /// a number with at most one unary sign
        rule signed() -> Value
            = "-" _ n:number() { negate(n) }
            / "+" _ n:number() { n }
            / number()

        /// integer or float
        rule number() -> Value
            = float()
            / int()

        /// float with a fraction and/or an exponent
        rule float() -> Value
            = f:$(dec() "." dec()? exponent()? / "." dec() exponent()? / dec() exponent()) !ident_char()
            {? f.replace('_', "").parse::<f64>().map(Value::Float).or(Err("float")) }

        /// integer in decimal, hex, octal or binary notation
        rule int() -> Value
            = "0" ['x' | 'X'] d:$(("_"? ['0'..='9' | 'a'..='f' | 'A'..='F'])+) !ident_char()
                {? i128::from_str_radix(&d.replace('_', ""), 16).map(Value::Int).or(Err("hex int")) }
            / "0" ['o' | 'O'] d:$(("_"? ['0'..='7'])+) !ident_char()
                {? i128::from_str_radix(&d.replace('_', ""), 8).map(Value::Int).or(Err("octal int")) }
            / "0" ['b' | 'B'] d:$(("_"? ['0' | '1'])+) !ident_char()
                {? i128::from_str_radix(&d.replace('_', ""), 2).map(Value::Int).or(Err("binary int")) }
            / d:$(['1'..='9'] ("_"? ['0'..='9'])*) !ident_char()
                {? d.replace('_', "").parse::<i128>().map(Value::Int).or(Err("int")) }
            / "0"+ ("_"? "0")* !ident_char() { Value::Int(0) }

        /// one or more adjacent string or bytes literals
        rule strings() -> Value
            = pieces:(piece() ++ _) {? join_pieces(pieces) }

        /// a single quoted literal with its prefix
        rule piece() -> Piece
            = p:$(['r' | 'R' | 'u' | 'U' | 'b' | 'B']*<0,2>) b:quoted() {? make_piece(p, b) }

        /// the body of a quoted literal, escapes left in place
        rule quoted() -> &'input str
            = "\"\"\"" b:$(("\\" [_] / !"\"\"\"" [_])*) "\"\"\"" { b }
            / "'''" b:$(("\\" [_] / !"'''" [_])*) "'''" { b }
            / "\"" b:$(("\\" [_] / !['"' | '\n'] [_])*) "\"" { b }
            / "'" b:$(("\\" [_] / !['\'' | '\n'] [_])*) "'" { b }

        /// `[...]`
        rule list() -> Value
            = "[" _ "]" { Value::List(Vec::new()) }
            / "[" _ items:(expr() ++ (_ "," _)) (_ ",")? _ "]" { Value::List(items) }

        /// `(...)`: empty tuple, grouping, or tuple
        rule paren() -> Value
            = "(" _ ")" { Value::Tuple(Vec::new()) }
            / "(" _ items:(expr() ++ (_ "," _)) trailing:(_ ",")? _ ")" { sequence(items, trailing.is_some()) }

        /// `{...}`: dict or set
        rule brace() -> Value
            = "{" _ "}" { Value::Dict(Vec::new()) }
            / "{" _ pairs:(pair() ++ (_ "," _)) (_ ",")? _ "}" {?
                if pairs.iter().all(|(k, _)| k.is_hashable()) {
                    Ok(Value::dict(pairs))
                } else {
                    Err("unhashable dict key")
                }
            }
            / "{" _ items:(expr() ++ (_ "," _)) (_ ",")? _ "}" {?
                if items.iter().all(Value::is_hashable) {
                    Ok(Value::set(items))
                } else {
                    Err("unhashable set element")
                }
            }

        /// `key: value`
        rule pair() -> (Value, Value)
            = k:expr() _ ":" _ v:expr() { (k, v) }
    }
}
