//! Translation of regular expressions into SQL predicates.

use regex::Regex;

use super::capabilities::RegexStyle;
use super::{DatabaseProduct, SqlDialect};

/// A pattern split into its leading inline flags and body.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Pattern {
    flags: String,
    body: String,
}

impl Pattern {
    fn parse(regex: &str) -> Pattern {
        let expanded = expand_quoted(regex);
        if let Some(rest) = expanded.strip_prefix("(?") {
            if let Some(end) = rest.find(')') {
                let flags = &rest[..end];
                if !flags.is_empty() && flags.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Pattern {
                        flags: flags.to_string(),
                        body: rest[end + 1..].to_string(),
                    };
                }
            }
        }
        Pattern {
            flags: String::new(),
            body: expanded,
        }
    }

    fn case_insensitive(&self) -> bool {
        self.flags.contains('i')
    }

    /// True when the only flag present (if any) is `i`.
    fn only_case_flag(&self) -> bool {
        self.flags.chars().all(|c| c == 'i')
    }

    fn with_flags(&self) -> String {
        if self.flags.is_empty() {
            self.body.clone()
        } else {
            format!("(?{}){}", self.flags, self.body)
        }
    }
}

/// Replace every `\Q...\E` span with its escaped literal text.
fn expand_quoted(regex: &str) -> String {
    let mut out = String::with_capacity(regex.len());
    let mut rest = regex;
    while let Some(start) = rest.find("\\Q") {
        out.push_str(&rest[..start]);
        let quoted = &rest[start + 2..];
        match quoted.find("\\E") {
            Some(end) => {
                out.push_str(&regex::escape(&quoted[..end]));
                rest = &quoted[end + 2..];
            }
            None => {
                out.push_str(&regex::escape(quoted));
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Translate `regex` into a WHERE-clause predicate over `source`.
///
/// Returns `None` when the pattern is malformed or the product has no way
/// to express it.
pub fn generate_regular_expression<D: SqlDialect + ?Sized>(
    dialect: &D,
    source: &str,
    regex: &str,
) -> Option<String> {
    let pattern = Pattern::parse(regex);
    if Regex::new(&pattern.with_flags()).is_err() {
        return None;
    }

    match dialect.capabilities().regex {
        RegexStyle::None => None,
        RegexStyle::MySql => {
            if !pattern.only_case_flag() {
                return None;
            }
            let literal = dialect.quote_string_literal(&pattern.body);
            Some(if pattern.case_insensitive() {
                format!("UPPER({source}) REGEXP UPPER({literal})")
            } else {
                format!("CAST({source} AS BINARY) REGEXP {literal}")
            })
        }
        RegexStyle::Posix => {
            if !pattern.only_case_flag() {
                return None;
            }
            let op = if pattern.case_insensitive() { "~*" } else { "~" };
            let literal = dialect.quote_string_literal(&pattern.body);
            Some(format!("CAST({source} AS text) {op} {literal}"))
        }
        RegexStyle::RegexpLike => {
            let mut mode = String::from(if pattern.case_insensitive() { "i" } else { "c" });
            for flag in pattern.flags.chars() {
                match flag {
                    'i' => {}
                    's' => mode.push('n'),
                    'm' => mode.push('m'),
                    'x' => mode.push('x'),
                    _ => return None,
                }
            }
            Some(format!(
                "REGEXP_LIKE({source}, {}, {})",
                dialect.quote_string_literal(&pattern.body),
                dialect.quote_string_literal(&mode)
            ))
        }
        RegexStyle::JavaRegexp => {
            let literal = dialect.quote_string_literal(&pattern.with_flags());
            Some(if dialect.product() == DatabaseProduct::Impala {
                format!("CAST({source} AS STRING) REGEXP {literal}")
            } else {
                format!("{source} REGEXP {literal}")
            })
        }
    }
}
