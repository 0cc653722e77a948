//! IRCv3 message tags (`@key=value;key2=value2 ...`). See
//! https://ircv3.net/specs/extensions/message-tags.html

/// A parsed tag list. Preserves insertion order since some tags (e.g. repeated `+draft/...`
/// client tags) are order-sensitive in practice, even though the spec doesn't require it.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Tags(pub Vec<(String, Option<String>)>);

impl Tags {
    /// Value of a tag. Bare tags (no `=value` part, e.g. `draft/flag`) report the empty string
    /// rather than `None` — their presence is the signal, per the message-tags spec's "client-only
    /// tags" convention. `None` means the tag wasn't sent at all.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parse the tags portion of a line, without the leading '@'. `str` should not include the
/// trailing space that separates tags from the rest of the message.
pub fn parse_tags(s: &str) -> Tags {
    let mut tags = Vec::new();
    for part in s.split(';') {
        if part.is_empty() {
            continue;
        }
        match part.find('=') {
            Some(idx) => {
                let key = &part[..idx];
                let val = unescape_tag_value(&part[idx + 1..]);
                tags.push((key.to_owned(), Some(val)));
            }
            None => tags.push((part.to_owned(), None)),
        }
    }
    Tags(tags)
}

/// Undo the tag value escaping described in the IRCv3 message-tags spec: `\:` -> `;`, `\s` ->
/// space, `\\` -> `\`, `\r` -> CR, `\n` -> LF. A trailing lone `\` (with nothing after it) is
/// dropped.
fn unescape_tag_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {} // trailing lone backslash: dropped
        }
    }
    out
}

/// Escape a tag value for sending on the wire (used when we need to emit client tags).
pub fn escape_tag_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags_basic() {
        let tags = parse_tags("id=123;time=2021-01-01T00:00:00.000Z");
        assert_eq!(tags.get("id"), Some("123"));
        assert_eq!(tags.get("time"), Some("2021-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_parse_tags_valueless() {
        let tags = parse_tags("+typing=active;draft/flag");
        assert_eq!(tags.get("+typing"), Some("active"));
        assert!(tags.has("draft/flag"));
        assert_eq!(tags.get("draft/flag"), Some(""));
        assert_eq!(tags.get("missing"), None);
    }

    #[test]
    fn test_unescape() {
        let tags = parse_tags(r"key=a\sb\:c\\d");
        assert_eq!(tags.get("key"), Some("a b;c\\d"));
    }

    #[test]
    fn test_trailing_backslash_dropped() {
        let tags = parse_tags(r"key=abc\");
        assert_eq!(tags.get("key"), Some("abc"));
    }

    #[test]
    fn test_roundtrip_escape() {
        let original = "a;b c\\d";
        let escaped = escape_tag_value(original);
        let tags = parse_tags(&format!("key={}", escaped));
        assert_eq!(tags.get("key"), Some(original));
    }
}
