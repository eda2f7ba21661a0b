//! Argument tokenizer for strace syscall records
//!
//! strace prints arguments as a comma-separated list, but quoted strings,
//! `{...}` structures and `[...]` arrays may themselves contain commas.
//! The tokenizer keeps each of those as one atomic token.

use std::fmt;

/// One syscall argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgToken {
    /// A quoted string with escapes decoded and quotes removed
    Quoted(String),
    /// A `{...}` structure, braces included
    Brace(String),
    /// A `[...]` array, brackets included
    Bracket(String),
    /// Anything else: flags, numbers, `AT_FDCWD`, `3</dir>`
    Bare(String),
}

impl ArgToken {
    /// Token text as the classifier sees it (string contents for quoted tokens)
    pub fn as_str(&self) -> &str {
        match self {
            ArgToken::Quoted(s) | ArgToken::Brace(s) | ArgToken::Bracket(s) | ArgToken::Bare(s) => s,
        }
    }

    pub fn as_quoted(&self) -> Option<&str> {
        match self {
            ArgToken::Quoted(s) => Some(s),
            _ => None,
        }
    }

    /// `|`-separated flag names of a bare token, e.g. `O_RDONLY|O_CLOEXEC`
    pub fn flags(&self) -> impl Iterator<Item = &str> {
        let text = match self {
            ArgToken::Bare(s) => s.as_str(),
            _ => "",
        };
        text.split('|').map(str::trim).filter(|f| !f.is_empty())
    }
}

impl fmt::Display for ArgToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgToken::Quoted(s) => write!(f, "{:?}", s),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Tokenizer failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizeError {
    UnterminatedString,
    UnbalancedDelimiter(char),
}

impl fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenizeError::UnterminatedString => write!(f, "unterminated string"),
            TokenizeError::UnbalancedDelimiter(c) => write!(f, "unbalanced '{}'", c),
        }
    }
}

/// Split a raw argument list (the text between the syscall's parentheses)
pub fn tokenize(args: &str) -> Result<Vec<ArgToken>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut chars = args.char_indices().peekable();

    loop {
        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        let Some(&(start, first)) = chars.peek() else {
            break;
        };

        let token = match first {
            '"' => {
                chars.next();
                let value = read_quoted(&mut chars)?;
                // Truncated strings carry a trailing "..."
                while chars.next_if(|(_, c)| *c == '.').is_some() {}
                ArgToken::Quoted(value)
            }
            '{' | '[' => {
                let end = read_group(args, &mut chars)?;
                let text = args[start..end].to_string();
                if first == '{' {
                    ArgToken::Brace(text)
                } else {
                    ArgToken::Bracket(text)
                }
            }
            ',' => ArgToken::Bare(String::new()),
            _ => {
                let end = read_bare(args, &mut chars)?;
                ArgToken::Bare(args[start..end].trim_end().to_string())
            }
        };
        tokens.push(token);

        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        match chars.next() {
            Some((_, ',')) | None => {}
            // Trailing text after a string or group belongs to nothing we use
            Some(_) => {
                read_bare(args, &mut chars)?;
                chars.next();
            }
        }
    }

    Ok(tokens)
}

type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn read_quoted(chars: &mut Chars<'_>) -> Result<String, TokenizeError> {
    let mut out = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '"' => return Ok(out),
            '\\' => {
                let Some((_, esc)) = chars.next() else {
                    return Err(TokenizeError::UnterminatedString);
                };
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'v' => out.push('\u{0b}'),
                    'f' => out.push('\u{0c}'),
                    'x' => {
                        let mut value = 0u32;
                        for _ in 0..2 {
                            match chars.next_if(|(_, h)| h.is_ascii_hexdigit()) {
                                Some((_, h)) => value = value * 16 + h.to_digit(16).unwrap_or(0),
                                None => break,
                            }
                        }
                        out.push(char::from_u32(value).unwrap_or('\u{fffd}'));
                    }
                    '0'..='7' => {
                        let mut value = esc.to_digit(8).unwrap_or(0);
                        for _ in 0..2 {
                            match chars.next_if(|(_, o)| ('0'..='7').contains(o)) {
                                Some((_, o)) => value = value * 8 + o.to_digit(8).unwrap_or(0),
                                None => break,
                            }
                        }
                        out.push(char::from_u32(value).unwrap_or('\u{fffd}'));
                    }
                    other => out.push(other),
                }
            }
            _ => out.push(c),
        }
    }
    Err(TokenizeError::UnterminatedString)
}

/// Consume a balanced `{...}` / `[...]` group; returns the end byte offset
fn read_group(args: &str, chars: &mut Chars<'_>) -> Result<usize, TokenizeError> {
    let mut stack = Vec::new();
    while let Some((idx, c)) = chars.next() {
        match c {
            '{' | '[' => stack.push(c),
            '}' | ']' => {
                let open = if c == '}' { '{' } else { '[' };
                if stack.pop() != Some(open) {
                    return Err(TokenizeError::UnbalancedDelimiter(c));
                }
                if stack.is_empty() {
                    return Ok(idx + c.len_utf8());
                }
            }
            '"' => {
                read_quoted(chars)?;
            }
            _ => {}
        }
    }
    match stack.last() {
        Some(&open) => Err(TokenizeError::UnbalancedDelimiter(open)),
        None => Ok(args.len()),
    }
}

/// Consume a bare token up to the next top-level comma; returns its end offset
fn read_bare(args: &str, chars: &mut Chars<'_>) -> Result<usize, TokenizeError> {
    let mut depth = 0usize;
    while let Some(&(idx, c)) = chars.peek() {
        match c {
            ',' if depth == 0 => return Ok(idx),
            '<' | '(' => depth += 1,
            '>' | ')' => depth = depth.saturating_sub(1),
            '{' | '[' => {
                read_group(args, chars)?;
                continue;
            }
            '"' => {
                chars.next();
                read_quoted(chars)?;
                continue;
            }
            _ => {}
        }
        chars.next();
    }
    Ok(args.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare(s: &str) -> ArgToken {
        ArgToken::Bare(s.to_string())
    }

    fn quoted(s: &str) -> ArgToken {
        ArgToken::Quoted(s.to_string())
    }

    #[test]
    fn test_simple_open_arguments() {
        let tokens = tokenize(r#""a.c", O_RDONLY"#).unwrap();
        assert_eq!(tokens, vec![quoted("a.c"), bare("O_RDONLY")]);
    }

    #[test]
    fn test_openat_with_mode() {
        let tokens = tokenize(r#"AT_FDCWD, "out/a.o", O_WRONLY|O_CREAT|O_TRUNC, 0666"#).unwrap();
        assert_eq!(
            tokens,
            vec![
                bare("AT_FDCWD"),
                quoted("out/a.o"),
                bare("O_WRONLY|O_CREAT|O_TRUNC"),
                bare("0666"),
            ]
        );
        assert_eq!(
            tokens[2].flags().collect::<Vec<_>>(),
            vec!["O_WRONLY", "O_CREAT", "O_TRUNC"]
        );
    }

    #[test]
    fn test_commas_inside_quotes_are_kept() {
        let tokens = tokenize(r#""a,b.c", O_RDONLY"#).unwrap();
        assert_eq!(tokens[0], quoted("a,b.c"));
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn test_brace_and_bracket_groups_are_atomic() {
        let tokens = tokenize(
            r#""/usr/bin/cc", ["cc", "-c", "a.c"], 0x7ffc /* 12 vars */"#,
        )
        .unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1], ArgToken::Bracket(r#"["cc", "-c", "a.c"]"#.to_string()));
        assert_eq!(tokens[2], bare("0x7ffc /* 12 vars */"));

        let tokens =
            tokenize(r#"{flags=CLONE_VM|CLONE_VFORK, exit_signal=SIGCHLD, stack=0x7f}, 88"#)
                .unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(matches!(&tokens[0], ArgToken::Brace(s) if s.ends_with('}')));
    }

    #[test]
    fn test_nested_groups() {
        let tokens = tokenize(r#"[{WIFEXITED(s) && WEXITSTATUS(s) == 0}], 0, NULL"#).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(
            tokens[0],
            ArgToken::Bracket("[{WIFEXITED(s) && WEXITSTATUS(s) == 0}]".to_string())
        );
    }

    #[test]
    fn test_fd_path_annotation_is_bare() {
        let tokens = tokenize(r#"3</home/u/build>, "a.o", O_RDONLY"#).unwrap();
        assert_eq!(tokens[0], bare("3</home/u/build>"));
    }

    #[test]
    fn test_escapes_and_truncation() {
        let tokens = tokenize(r#""a\"b\\c\x41\101"..., 5"#).unwrap();
        assert_eq!(tokens, vec![quoted("a\"b\\cAA"), bare("5")]);
    }

    #[test]
    fn test_empty_argument_list() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn test_unterminated_string_fails() {
        assert_eq!(
            tokenize(r#""abc, O_RDONLY"#),
            Err(TokenizeError::UnterminatedString)
        );
    }

    #[test]
    fn test_unbalanced_group_fails() {
        assert!(tokenize("{a=1, b=2").is_err());
        assert!(tokenize("[1, 2}").is_err());
    }

    #[test]
    fn test_display_roundtrips_quoted() {
        assert_eq!(quoted("a.c").to_string(), "\"a.c\"");
        assert_eq!(bare("O_RDONLY").to_string(), "O_RDONLY");
    }
}
