use encoding_rs::Encoding;
use log::debug;

const CHARSET_SNIFF_BYTES: usize = 8192;

/// Decodes a markup file, honoring a `charset=` declaration near the top of it.
/// Unknown or missing labels fall back to lossy UTF-8.
pub(crate) fn decode_html(body: &[u8]) -> String {
    if let Some(label) = parse_charset_from_html_prefix(body) {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => {
                let (decoded, _, had_errors) = encoding.decode(body);
                if had_errors {
                    debug!("malformed {} sequences replaced", encoding.name());
                }
                return decoded.into_owned();
            }
            None => debug!("unknown charset label `{label}`"),
        }
    }

    String::from_utf8_lossy(body).into_owned()
}

fn parse_charset_from_html_prefix(body: &[u8]) -> Option<String> {
    let prefix = String::from_utf8_lossy(&body[..body.len().min(CHARSET_SNIFF_BYTES)]);
    let lower = prefix.to_ascii_lowercase();
    let mut search_start = 0_usize;

    while let Some(relative) = lower[search_start..].find("charset=") {
        let charset_start = search_start + relative + "charset=".len();
        if let Some(label) = parse_charset_label(&prefix[charset_start..]) {
            return Some(label);
        }
        search_start = charset_start;
    }

    None
}

fn parse_charset_label(input: &str) -> Option<String> {
    let trimmed = input.trim_start();
    let first = trimmed.chars().next()?;

    let label = if first == '"' || first == '\'' {
        let rest = &trimmed[1..];
        &rest[..rest.find(first)?]
    } else {
        let end = trimmed
            .find(|ch: char| ch.is_whitespace() || matches!(ch, '"' | '\'' | ';' | '<' | '>' | '/'))
            .unwrap_or(trimmed.len());
        &trimmed[..end]
    };

    let label = label.trim();
    (!label.is_empty()).then(|| label.to_owned())
}
