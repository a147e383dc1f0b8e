/// Quotes an argument as an MI C-string.
///
/// ```
/// assert_eq!(relic_mi::quote(r#"C:\game\main.c"#), r#""C:\\game\\main.c""#);
/// ```
pub fn quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');

    for c in arg.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }

    quoted.push('"');
    quoted
}

/// Resolves a single escape sequence (the character following `\`).
///
/// Returns `None` for octal escapes, which are handled by the caller.
pub(crate) const fn unescape_char(c: u8) -> Option<u8> {
    match c {
        b'n' => Some(b'\n'),
        b't' => Some(b'\t'),
        b'r' => Some(b'\r'),
        b'e' => Some(0x1b),
        b'a' => Some(0x07),
        b'b' => Some(0x08),
        b'f' => Some(0x0c),
        b'v' => Some(0x0b),
        b'0'..=b'7' => None,
        other => Some(other),
    }
}
