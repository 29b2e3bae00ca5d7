//! Streaming markup tokenizer.
//!
//! Produces start tags, end tags and decoded text runs in source order.
//! `script` and `style` bodies are read as raw text up to their matching end tag.

use log::trace;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    StartTag {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text(String),
}

/// Tokenizer over one markup document.
#[derive(Debug)]
pub struct Tokenizer<'a> {
    source: &'a str,
    pos: usize,
    pending: VecDeque<Token>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            pending: VecDeque::new(),
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        let bytes = self.source.as_bytes();

        while self.pos < bytes.len() {
            let i = self.pos;

            if bytes[i] == b'<' {
                if starts_with(bytes, i, b"<!--") {
                    self.pos = skip_comment(bytes, i);
                    continue;
                }
                if starts_with(bytes, i, b"<!") || starts_with(bytes, i, b"<?") {
                    self.pos = skip_to_gt(bytes, i + 2);
                    continue;
                }
                if starts_with(bytes, i, b"</") {
                    if let Some((name, next)) = parse_end_tag(bytes, i) {
                        self.pos = next;
                        return Some(Token::EndTag { name });
                    }
                } else if let Some((token, next)) = parse_start_tag(bytes, i) {
                    self.pos = next;
                    if let Token::StartTag {
                        name,
                        self_closing: false,
                        ..
                    } = &token
                    {
                        if is_raw_text_tag(name) {
                            let name = name.clone();
                            self.queue_raw_text(name);
                        }
                    }
                    return Some(token);
                }
            }

            let end = find_byte(bytes, i + 1, b'<').unwrap_or(bytes.len());
            self.pos = end;
            return Some(Token::Text(decode_entities(&self.source[i..end])));
        }

        None
    }

    /// Queues the raw body of a `script`/`style` element and its end tag.
    fn queue_raw_text(&mut self, name: String) {
        let bytes = self.source.as_bytes();
        let start = self.pos;
        match find_end_tag(bytes, start, &name) {
            Some((body_end, next)) => {
                if body_end > start {
                    self.pending
                        .push_back(Token::Text(self.source[start..body_end].to_owned()));
                }
                self.pending.push_back(Token::EndTag { name });
                self.pos = next;
            }
            None => {
                trace!("unterminated <{name}> runs to end of input");
                if bytes.len() > start {
                    self.pending
                        .push_back(Token::Text(self.source[start..].to_owned()));
                }
                self.pos = bytes.len();
            }
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.pending.pop_front() {
            return Some(token);
        }
        self.next_token()
    }
}

/// Decodes the named and numeric character references pages commonly use.
/// Unknown references are left as written.
pub fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0_usize;

    while let Some(rel_amp) = input[cursor..].find('&') {
        let amp = cursor + rel_amp;
        out.push_str(&input[cursor..amp]);

        let rest = &input[amp + 1..];
        // Entity names are short; only the next 11 bytes can hold the `;`.
        let decoded = rest
            .bytes()
            .take(11)
            .position(|byte| byte == b';')
            .and_then(|semi| decode_entity(&rest[..semi]).map(|ch| (ch, semi)));

        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                cursor = amp + semi + 2;
            }
            None => {
                out.push('&');
                cursor = amp + 1;
            }
        }
    }

    out.push_str(&input[cursor..]);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "nbsp" => Some('\u{a0}'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let value = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(value)
        }
    }
}

/// Tags whose bodies never contain markup.
fn is_raw_text_tag(name: &str) -> bool {
    matches!(name, "script" | "style")
}

/// Elements that never take an end tag.
pub fn is_void(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn starts_with(bytes: &[u8], i: usize, pat: &[u8]) -> bool {
    bytes.get(i..i.saturating_add(pat.len())) == Some(pat)
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|byte| *byte == needle)
        .map(|offset| from + offset)
}

fn skip_comment(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 4;
    while i + 2 < bytes.len() {
        if &bytes[i..i + 3] == b"-->" {
            return i + 3;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_to_gt(bytes: &[u8], from: usize) -> usize {
    find_byte(bytes, from, b'>').map_or(bytes.len(), |gt| gt + 1)
}

/// Finds `</name>` (case-insensitive, optional whitespace before `>`).
/// Returns the body end and the position after the end tag.
fn find_end_tag(bytes: &[u8], start: usize, name: &str) -> Option<(usize, usize)> {
    let name = name.as_bytes();
    let mut i = start;

    while let Some(lt) = find_byte(bytes, i, b'<') {
        i = lt + 1;
        if bytes.get(lt + 1) != Some(&b'/') {
            continue;
        }

        let name_start = lt + 2;
        let candidate = bytes.get(name_start..name_start + name.len())?;
        if !candidate.eq_ignore_ascii_case(name) {
            continue;
        }

        let mut close = name_start + name.len();
        while close < bytes.len() && bytes[close].is_ascii_whitespace() {
            close += 1;
        }
        if bytes.get(close) == Some(&b'>') {
            return Some((lt, close + 1));
        }
    }

    None
}

fn parse_end_tag(bytes: &[u8], start: usize) -> Option<(String, usize)> {
    let mut i = start + 2;
    skip_spaces(bytes, &mut i);
    let name = read_name(bytes, &mut i)?;
    let gt = find_byte(bytes, i, b'>')?;
    Some((name, gt + 1))
}

fn parse_start_tag(bytes: &[u8], start: usize) -> Option<(Token, usize)> {
    let mut i = start + 1;
    if !bytes.get(i)?.is_ascii_alphabetic() {
        return None;
    }
    let name = read_name(bytes, &mut i)?;
    let mut attrs = Vec::new();
    let mut self_closing = false;

    loop {
        skip_spaces(bytes, &mut i);
        match bytes.get(i)? {
            b'>' => {
                i += 1;
                break;
            }
            b'/' => {
                i += 1;
                skip_spaces(bytes, &mut i);
                if bytes.get(i) == Some(&b'>') {
                    self_closing = true;
                    i += 1;
                    break;
                }
                continue;
            }
            _ => {}
        }

        let Some(attr_name) = read_name(bytes, &mut i) else {
            // Garbage inside the tag: give up on the remaining attributes.
            i = skip_to_gt(bytes, i);
            break;
        };
        skip_spaces(bytes, &mut i);

        let mut value = String::new();
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            skip_spaces(bytes, &mut i);
            value = read_attr_value(bytes, &mut i);
        }

        attrs.push((attr_name, decode_entities(&value)));
    }

    Some((
        Token::StartTag {
            name,
            attrs,
            self_closing,
        },
        i,
    ))
}

fn read_attr_value(bytes: &[u8], i: &mut usize) -> String {
    match bytes.get(*i) {
        Some(&quote) if quote == b'"' || quote == b'\'' => {
            let begin = *i + 1;
            let end = find_byte(bytes, begin, quote).unwrap_or(bytes.len());
            *i = (end + 1).min(bytes.len());
            String::from_utf8_lossy(&bytes[begin..end]).into_owned()
        }
        _ => {
            let begin = *i;
            while *i < bytes.len() && !bytes[*i].is_ascii_whitespace() && bytes[*i] != b'>' {
                *i += 1;
            }
            String::from_utf8_lossy(&bytes[begin..*i]).into_owned()
        }
    }
}

fn read_name(bytes: &[u8], i: &mut usize) -> Option<String> {
    let begin = *i;
    while *i < bytes.len() && is_name_char(bytes[*i]) {
        *i += 1;
    }
    (*i > begin).then(|| String::from_utf8_lossy(&bytes[begin..*i]).to_ascii_lowercase())
}

fn skip_spaces(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b':')
}
