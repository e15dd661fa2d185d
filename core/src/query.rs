//! Query string construction with a fixed reserved set.
//!
//! Only space, `%`, the URI-structural characters `$ & + , / : ; = ? @ < > #`
//! and non-ASCII bytes are escaped. Everything else passes through untouched,
//! which keeps generated URLs readable and byte-for-byte reproducible.

use std::borrow::Cow;

const RESERVED: &[u8] = b" %$&+,/:;=?@<>#";

fn is_reserved(byte: u8) -> bool {
    byte >= 0x80 || RESERVED.contains(&byte)
}

fn hex(nibble: u8) -> char {
    char::from(b"0123456789ABCDEF"[usize::from(nibble & 0x0F)])
}

/// Percent-encode `input`, borrowing when nothing needs escaping.
///
/// Non-ASCII characters are escaped byte by byte over their UTF-8 encoding.
pub fn encode(input: &str) -> Cow<'_, str> {
    if !input.bytes().any(is_reserved) {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        if is_reserved(byte) {
            out.push('%');
            out.push(hex(byte >> 4));
            out.push(hex(byte));
        } else {
            out.push(char::from(byte));
        }
    }
    Cow::Owned(out)
}

/// Appends `key=value` pairs to a base URL in caller order.
#[derive(Debug, Clone)]
pub struct QueryString {
    buf: String,
    has_params: bool,
}

impl QueryString {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            buf: base.into(),
            has_params: false,
        }
    }

    pub fn append(&mut self, key: &str, value: &str) -> &mut Self {
        self.push_key(key);
        self.buf.push_str(&encode(value));
        self
    }

    /// Appends `key=v1,v2,...` with each element encoded on its own.
    ///
    /// An empty list appends nothing.
    pub fn append_list<S: AsRef<str>>(&mut self, key: &str, values: &[S]) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        self.push_key(key);
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.buf.push(',');
            }
            self.buf.push_str(&encode(value.as_ref()));
        }
        self
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn build(self) -> String {
        self.buf
    }

    fn push_key(&mut self, key: &str) {
        self.buf.push(if self.has_params { '&' } else { '?' });
        self.has_params = true;
        self.buf.push_str(&encode(key));
        self.buf.push('=');
    }
}
