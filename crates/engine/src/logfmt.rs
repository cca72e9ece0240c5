//! Tokenizer for span log lines and their nested tag lists.
//!
//! A line is whitespace separated `key=value` or `key:value` tokens; the
//! separator is whichever of `=` or `:` comes first. Values may be double
//! quoted with backslash escapes. A token without a separator yields an
//! empty value.

use std::iter::Peekable;
use std::str::CharIndices;

use spanbridge_core::error::{BridgeError, Result};

pub fn parse_pairs(input: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    let mut chars = input.char_indices().peekable();

    loop {
        while chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}
        let Some(&(start, _)) = chars.peek() else {
            break;
        };

        let mut key_end = input.len();
        let mut has_value = false;
        while let Some(&(i, c)) = chars.peek() {
            if c == '=' || c == ':' {
                key_end = i;
                has_value = true;
                chars.next();
                break;
            }
            if c.is_whitespace() {
                key_end = i;
                break;
            }
            chars.next();
        }

        let key = &input[start..key_end];
        let value = if has_value {
            read_value(&mut chars)?
        } else {
            String::new()
        };
        if !key.is_empty() {
            out.push((key.to_string(), value));
        }
    }

    Ok(out)
}

fn read_value(chars: &mut Peekable<CharIndices<'_>>) -> Result<String> {
    let mut value = String::new();
    if chars.next_if(|&(_, c)| c == '"').is_none() {
        while let Some((_, c)) = chars.next_if(|&(_, c)| !c.is_whitespace()) {
            value.push(c);
        }
        return Ok(value);
    }

    while let Some((_, c)) = chars.next() {
        match c {
            '"' => return Ok(value),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, other)) => value.push(other),
                None => break,
            },
            other => value.push(other),
        }
    }
    Err(BridgeError::Decode(format!(
        "unterminated quoted value after {value:?}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(input: &str) -> Vec<(String, String)> {
        parse_pairs(input).unwrap()
    }

    #[test]
    fn accepts_both_separators() {
        assert_eq!(
            pairs("span_id=7 duration:5ms"),
            vec![
                ("span_id".to_string(), "7".to_string()),
                ("duration".to_string(), "5ms".to_string()),
            ]
        );
    }

    #[test]
    fn first_separator_wins() {
        assert_eq!(
            pairs("start_time=2026-02-01T00:00:00Z http.url:http://api/v1"),
            vec![
                ("start_time".to_string(), "2026-02-01T00:00:00Z".to_string()),
                ("http.url".to_string(), "http://api/v1".to_string()),
            ]
        );
    }

    #[test]
    fn quoted_values_keep_spaces_and_escapes() {
        assert_eq!(
            pairs(r#"tags="error:true peer:redis" msg="say \"hi\"""#),
            vec![
                ("tags".to_string(), "error:true peer:redis".to_string()),
                ("msg".to_string(), "say \"hi\"".to_string()),
            ]
        );
    }

    #[test]
    fn bare_keys_and_blank_runs() {
        assert_eq!(
            pairs("  cached   =skip  "),
            vec![
                ("cached".to_string(), String::new()),
                ("skip".to_string(), String::new()),
            ]
        );
        assert!(pairs("").is_empty());
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert!(matches!(
            parse_pairs(r#"tags="error:true"#),
            Err(BridgeError::Decode(_))
        ));
    }
}
