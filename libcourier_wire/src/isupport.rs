//! Parsing helpers for RPL_ISUPPORT (005) tokens. See
//! https://modern.ircdocs.horse/#isupport-parameters

/// `PREFIX=(ov)@+`: maps channel membership modes to their display prefix, highest first.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Prefix {
    pub modes: Vec<char>,
    pub symbols: Vec<char>,
}

impl Prefix {
    pub fn symbol_for_mode(&self, mode: char) -> Option<char> {
        self.modes
            .iter()
            .position(|&m| m == mode)
            .map(|i| self.symbols[i])
    }

    pub fn mode_for_symbol(&self, symbol: char) -> Option<char> {
        self.symbols
            .iter()
            .position(|&s| s == symbol)
            .map(|i| self.modes[i])
    }

    /// Highest-ranked prefix symbol among the ones present in `symbols_present`, if any.
    pub fn highest<'a, I: Iterator<Item = &'a char>>(&self, symbols_present: I) -> Option<char> {
        let present: Vec<char> = symbols_present.copied().collect();
        self.symbols
            .iter()
            .find(|s| present.contains(s))
            .copied()
    }
}

pub fn default_prefix() -> Prefix {
    Prefix {
        modes: vec!['o', 'v'],
        symbols: vec!['@', '+'],
    }
}

/// `PREFIX=(ov)@+` -> `Prefix { modes: [o, v], symbols: [@, +] }`
pub fn parse_prefix(s: &str) -> Option<Prefix> {
    if !s.starts_with('(') {
        return None;
    }
    let close = s.find(')')?;
    let modes: Vec<char> = s[1..close].chars().collect();
    let symbols: Vec<char> = s[close + 1..].chars().collect();
    if modes.len() != symbols.len() {
        return None;
    }
    Some(Prefix { modes, symbols })
}

/// `CHANMODES=eIbq,k,flj,CFLMPQScgimnprstz`: four comma-separated groups, A/B/C/D per the
/// ISUPPORT spec.
///
/// - A: modes that add/remove an item from a list, always take a parameter.
/// - B: modes that change a setting, always take a parameter.
/// - C: modes that change a setting, take a parameter only when set.
/// - D: modes that change a setting, never take a parameter.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct ChanModes {
    pub a: Vec<char>,
    pub b: Vec<char>,
    pub c: Vec<char>,
    pub d: Vec<char>,
}

pub fn parse_chanmodes(s: &str) -> Option<ChanModes> {
    let mut groups = s.split(',');
    let a = groups.next()?.chars().collect();
    let b = groups.next()?.chars().collect();
    let c = groups.next()?.chars().collect();
    let d = groups.next()?.chars().collect();
    Some(ChanModes { a, b, c, d })
}

/// A single RPL_ISUPPORT (005) token, either `KEY=VALUE` or a bare `KEY`.
pub fn parse_token(token: &str) -> (&str, Option<&str>) {
    match token.find('=') {
        Some(idx) => (&token[..idx], Some(&token[idx + 1..])),
        None => (token, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefix() {
        let pfx = parse_prefix("(ov)@+").unwrap();
        assert_eq!(pfx.modes, vec!['o', 'v']);
        assert_eq!(pfx.symbols, vec!['@', '+']);
        assert_eq!(pfx.symbol_for_mode('o'), Some('@'));
        assert_eq!(pfx.mode_for_symbol('+'), Some('v'));
    }

    #[test]
    fn test_highest_prefix() {
        let pfx = parse_prefix("(qaohv)~&@%+").unwrap();
        let present = vec!['+', '@'];
        assert_eq!(pfx.highest(present.iter()), Some('@'));
    }

    #[test]
    fn test_parse_chanmodes() {
        let cm = parse_chanmodes("eIbq,k,flj,CFLMPQScgimnprstz").unwrap();
        assert_eq!(cm.a, vec!['e', 'I', 'b', 'q']);
        assert_eq!(cm.b, vec!['k']);
        assert_eq!(cm.c, vec!['f', 'l', 'j']);
        assert!(cm.d.contains(&'n'));
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(parse_token("CHANTYPES=#"), ("CHANTYPES", Some("#")));
        assert_eq!(parse_token("EXCEPTS"), ("EXCEPTS", None));
    }
}
