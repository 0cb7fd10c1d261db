//! Field annotation parsing.
//!
//! Annotations use the Go struct tag layout: a space separated list of
//! `key:"value"` pairs, e.g. `dynamo:"ID,hash" index:"Seq-ID-index,range"`.
//! The `dynamo` value is `name?(,modifier)*`; `index` and `localIndex`
//! values are `indexName,role` and may repeat.

use aws_sdk_dynamodb::types::KeyType;

/// Modifier that encodes a slice as a DynamoDB set.
pub const SET: &str = "set";
/// Modifier that stores a timestamp as epoch seconds.
pub const UNIX_TIME: &str = "unixtime";
/// Modifier that drops zero values.
pub const OMIT_EMPTY: &str = "omitempty";
/// Name that excludes a field entirely.
pub const SKIP: &str = "-";

/// Role of an attribute within a key schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Hash,
    Range,
}

impl KeyRole {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "hash" | "partition" => Some(KeyRole::Hash),
            "range" | "sort" => Some(KeyRole::Range),
            _ => None,
        }
    }

    pub fn key_type(self) -> KeyType {
        match self {
            KeyRole::Hash => KeyType::Hash,
            KeyRole::Range => KeyType::Range,
        }
    }
}

/// The parsed `dynamo` annotation of one field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagInfo {
    pub name: String,
    pub special: String,
    pub omit_empty: bool,
}

/// Parse a `dynamo` annotation value.
///
/// An empty name falls back to `natural`. Every modifier other than
/// `omitempty` lands in `special`; the last one wins.
pub fn parse(natural: &str, annotation: &str) -> TagInfo {
    let mut parts = annotation.split(',');
    let name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => natural,
    };

    let mut info = TagInfo {
        name: name.to_string(),
        ..TagInfo::default()
    };
    for part in parts {
        if part == OMIT_EMPTY {
            info.omit_empty = true;
        } else {
            info.special = part.to_string();
        }
    }
    info
}

/// Primary key role declared by a `dynamo` annotation, if any.
pub fn key_role(annotation: &str) -> Option<KeyRole> {
    annotation.split(',').skip(1).find_map(KeyRole::parse)
}

/// Whether any modifier of `annotation` equals `modifier`.
pub fn has_modifier(annotation: &str, modifier: &str) -> bool {
    annotation.split(',').skip(1).any(|m| m == modifier)
}

/// Membership of a field in a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMembership {
    pub index: String,
    pub role: KeyRole,
}

/// Parse an `indexName,role` annotation value.
pub fn index_membership(value: &str) -> Option<IndexMembership> {
    let (index, role) = value.rsplit_once(',')?;
    if index.is_empty() {
        return None;
    }
    Some(IndexMembership {
        index: index.to_string(),
        role: KeyRole::parse(role)?,
    })
}

/// First value stored under `key` in a raw annotation string.
pub fn get(tag: &str, key: &str) -> Option<String> {
    lookup(tag, key).into_iter().next()
}

/// Every value stored under `key` in a raw annotation string.
///
/// Scanning stops quietly at the first malformed pair; whatever was found
/// before it is returned.
pub fn lookup(tag: &str, key: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut rest = tag;

    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }

        // Scan to the colon. Spaces, quotes and control characters end the name.
        let bytes = rest.as_bytes();
        let mut i = 0;
        while i < bytes.len()
            && bytes[i] > b' '
            && bytes[i] != b':'
            && bytes[i] != b'"'
            && bytes[i] != 0x7f
        {
            i += 1;
        }
        if i == 0 || i + 1 >= bytes.len() || bytes[i] != b':' || bytes[i + 1] != b'"' {
            break;
        }
        let name = &rest[..i];
        rest = &rest[i + 1..];

        // Scan the quoted value.
        let bytes = rest.as_bytes();
        let mut j = 1;
        while j < bytes.len() && bytes[j] != b'"' {
            if bytes[j] == b'\\' {
                j += 1;
            }
            j += 1;
        }
        if j >= bytes.len() {
            break;
        }
        let quoted = &rest[..=j];
        rest = &rest[j + 1..];

        if name == key {
            match unquote(quoted) {
                Some(value) => values.push(value),
                None => break,
            }
        }
    }

    values
}

fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\n' => return None,
            '\\' => {
                let unescaped = match chars.next()? {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    'a' => '\x07',
                    'b' => '\x08',
                    'f' => '\x0c',
                    'v' => '\x0b',
                    '\\' => '\\',
                    '"' => '"',
                    '\'' => '\'',
                    'x' => char::from_u32(hex(&mut chars, 2)?).filter(char::is_ascii)?,
                    'u' => char::from_u32(hex(&mut chars, 4)?)?,
                    'U' => char::from_u32(hex(&mut chars, 8)?)?,
                    first @ '0'..='7' => {
                        let mut code = first.to_digit(8)?;
                        for _ in 0..2 {
                            code = code * 8 + chars.next()?.to_digit(8)?;
                        }
                        char::from_u32(code).filter(char::is_ascii)?
                    }
                    _ => return None,
                };
                out.push(unescaped);
            }
            c => out.push(c),
        }
    }

    Some(out)
}

fn hex(chars: &mut std::str::Chars<'_>, digits: usize) -> Option<u32> {
    let mut code = 0;
    for _ in 0..digits {
        code = code * 16 + chars.next()?.to_digit(16)?;
    }
    Some(code)
}
