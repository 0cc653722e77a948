//! Iteration over IRC mode strings, e.g. `+o-v` with args `["alice", "bob"]`.

use crate::isupport::ChanModes;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Sign {
    Add,
    Remove,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ModeChange {
    pub sign: Sign,
    pub mode: char,
    pub arg: Option<String>,
}

/// Walk a `(modestring, args)` pair (as found in a MODE message) and yield one `ModeChange` per
/// letter, consuming args from `args` for modes that take one according to `chanmodes` (and
/// membership-prefix modes, which always take an arg).
pub fn iter_modestring<'a>(
    modestring: &'a str,
    args: &'a [String],
    chanmodes: &'a ChanModes,
    prefix_modes: &'a [char],
) -> impl Iterator<Item = ModeChange> + 'a {
    let mut sign = Sign::Add;
    let mut arg_idx = 0;
    modestring.chars().filter_map(move |c| {
        match c {
            '+' => {
                sign = Sign::Add;
                None
            }
            '-' => {
                sign = Sign::Remove;
                None
            }
            mode => {
                let takes_arg = prefix_modes.contains(&mode)
                    || chanmodes.a.contains(&mode)
                    || chanmodes.b.contains(&mode)
                    || (chanmodes.c.contains(&mode) && sign == Sign::Add);
                let arg = if takes_arg {
                    let a = args.get(arg_idx).cloned();
                    arg_idx += 1;
                    a
                } else {
                    None
                };
                Some(ModeChange { sign, mode, arg })
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isupport::parse_chanmodes;

    #[test]
    fn test_iter_modestring_simple() {
        let chanmodes = parse_chanmodes("eIbq,k,flj,CFLMPQScgimnprstz").unwrap();
        let args = vec!["alice".to_string(), "bob".to_string()];
        let changes: Vec<ModeChange> =
            iter_modestring("+ov", &args, &chanmodes, &['o', 'v']).collect();
        assert_eq!(
            changes,
            vec![
                ModeChange {
                    sign: Sign::Add,
                    mode: 'o',
                    arg: Some("alice".to_string())
                },
                ModeChange {
                    sign: Sign::Add,
                    mode: 'v',
                    arg: Some("bob".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_iter_modestring_remove_actually_removes() {
        // `-o alice`: the letter is removed, not a no-op.
        let chanmodes = parse_chanmodes("eIbq,k,flj,CFLMPQScgimnprstz").unwrap();
        let args = vec!["alice".to_string()];
        let changes: Vec<ModeChange> =
            iter_modestring("-o", &args, &chanmodes, &['o', 'v']).collect();
        assert_eq!(changes[0].sign, Sign::Remove);
        assert_eq!(changes[0].mode, 'o');
        assert_eq!(changes[0].arg, Some("alice".to_string()));
    }

    #[test]
    fn test_iter_modestring_c_type_only_takes_arg_on_add() {
        let chanmodes = parse_chanmodes("eIbq,k,flj,CFLMPQScgimnprstz").unwrap();
        let args = vec![];
        let changes: Vec<ModeChange> = iter_modestring("-f", &args, &chanmodes, &[]).collect();
        assert_eq!(changes[0].arg, None);
    }

    #[test]
    fn test_iter_modestring_d_type_never_takes_arg() {
        let chanmodes = parse_chanmodes("eIbq,k,flj,CFLMPQScgimnprstz").unwrap();
        let changes: Vec<ModeChange> = iter_modestring("+n", &[], &chanmodes, &[]).collect();
        assert_eq!(changes[0].arg, None);
    }
}
