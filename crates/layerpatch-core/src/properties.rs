use std::collections::BTreeMap;

pub type Properties = BTreeMap<String, String>;

/// Reads a properties file. Blank lines and lines starting with `#` or `!`
/// are skipped, a trailing `\` continues the entry on the next line, and
/// the key ends at the first unescaped `=`, `:` or whitespace. A later
/// duplicate key wins.
pub fn parse_properties(raw: &str) -> Properties {
    let mut properties = Properties::new();
    for line in logical_lines(raw) {
        let (key, value) = split_entry(&line);
        properties.insert(unescape(key), unescape(value));
    }
    properties
}

fn logical_lines(raw: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending: Option<String> = None;
    for physical in raw.lines() {
        let trimmed = physical.trim_start();
        let mut line = match pending.take() {
            Some(mut line) => {
                line.push_str(trimmed);
                line
            }
            None if trimmed.is_empty() || trimmed.starts_with(['#', '!']) => continue,
            None => trimmed.to_string(),
        };

        if continues(&line) {
            line.pop();
            pending = Some(line);
        } else {
            lines.push(line);
        }
    }
    lines.extend(pending);
    lines
}

/// An odd run of trailing backslashes escapes the line break.
fn continues(line: &str) -> bool {
    line.chars().rev().take_while(|ch| *ch == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (index, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..index], line[index + 1..].trim()),
            ch if ch.is_whitespace() => {
                key_end = index;
                break;
            }
            _ => {}
        }
    }

    let rest = line[key_end..].trim_start();
    let rest = rest.strip_prefix(['=', ':']).unwrap_or(rest);
    (&line[..key_end], rest.trim())
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex = chars.by_ref().take(4).collect::<String>();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Only a case-insensitive `true` is true.
pub fn parse_bool(value: Option<&str>) -> bool {
    value.is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

/// Splits a comma separated list, dropping blank entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
