//! Cell formatting: format strings and named cell formatters.
//!
//! Format strings follow the Visual Basic convention: `#` is an optional
//! digit, `0` a required one, `,` in the integer part turns on thousands
//! grouping and `%` scales by 100. Up to four `;`-separated sections give
//! the positive, negative, zero and empty formats. The names `Standard`,
//! `Currency`, `Fixed` and `Percent` are shorthands.

use std::sync::Arc;

use super::value::CellValue;

/// Formats cells of a measure, chosen by the measure's `formatter` name.
pub trait CellFormatter: Send + Sync {
    fn format(&self, value: &CellValue) -> Result<String, String>;
}

struct FnFormatter<F>(F);

impl<F> CellFormatter for FnFormatter<F>
where
    F: Fn(&CellValue) -> Result<String, String> + Send + Sync,
{
    fn format(&self, value: &CellValue) -> Result<String, String> {
        (self.0)(value)
    }
}

/// Wrap a closure as a [`CellFormatter`].
pub fn formatter_fn<F>(f: F) -> Arc<dyn CellFormatter>
where
    F: Fn(&CellValue) -> Result<String, String> + Send + Sync + 'static,
{
    Arc::new(FnFormatter(f))
}

/// Run a formatter; a failure renders as an error value.
pub fn apply_formatter(formatter: &dyn CellFormatter, value: &CellValue) -> String {
    match formatter.format(value) {
        Ok(text) => text,
        Err(message) => CellValue::Error(message).to_string(),
    }
}

fn expand_named(format: &str) -> &str {
    match format.to_ascii_lowercase().as_str() {
        "standard" => "#,##0.##",
        "currency" => "$#,##0.00",
        "fixed" => "0.00",
        "percent" => "0.00%",
        "general number" | "general" => "0.##########",
        _ => format,
    }
}

/// Render `value` with an optional format string.
pub fn format_value(value: &CellValue, format: Option<&str>) -> String {
    let Some(format) = format.filter(|f| !f.is_empty()) else {
        return value.to_string();
    };
    let sections: Vec<&str> = expand_named(format).split(';').collect();
    match value {
        CellValue::Number(n) => {
            let n = *n;
            if !n.is_finite() {
                return if n.is_nan() {
                    "NaN".into()
                } else if n > 0.0 {
                    "Infinity".into()
                } else {
                    "-Infinity".into()
                };
            }
            if n == 0.0 {
                if let Some(zero) = sections.get(2).filter(|s| !s.is_empty()) {
                    return NumberPattern::parse(zero).render(0.0);
                }
            }
            if n < 0.0 {
                if let Some(negative) = sections.get(1).filter(|s| !s.is_empty()) {
                    return NumberPattern::parse(negative).render(-n);
                }
                let text = NumberPattern::parse(sections[0]).render(-n);
                return format!("-{text}");
            }
            NumberPattern::parse(sections[0]).render(n)
        }
        CellValue::Empty => sections
            .get(3)
            .map(|s| s.trim_matches('"').to_string())
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

/// One section of a numeric format string.
#[derive(Debug, Default, PartialEq)]
struct NumberPattern {
    prefix: String,
    suffix: String,
    min_integer: usize,
    grouping: bool,
    min_fraction: usize,
    max_fraction: usize,
    percent: bool,
}

impl NumberPattern {
    fn parse(section: &str) -> Self {
        let mut pattern = NumberPattern::default();
        let mut in_number = false;
        let mut done_number = false;
        let mut in_fraction = false;
        let mut chars = section.chars().peekable();
        while let Some(c) = chars.next() {
            let literal = match c {
                '#' | '0' | ',' | '.' if !done_number => {
                    in_number = true;
                    match c {
                        '0' if in_fraction => {
                            pattern.min_fraction += 1;
                            pattern.max_fraction += 1;
                        }
                        '#' if in_fraction => pattern.max_fraction += 1,
                        '0' => pattern.min_integer += 1,
                        ',' => pattern.grouping = true,
                        '.' => in_fraction = true,
                        _ => {}
                    }
                    continue;
                }
                '%' => {
                    pattern.percent = true;
                    Some('%')
                }
                '"' => {
                    let mut text = String::new();
                    for q in chars.by_ref() {
                        if q == '"' {
                            break;
                        }
                        text.push(q);
                    }
                    pattern.push_literal(&text, in_number);
                    None
                }
                '\\' => chars.next(),
                other => Some(other),
            };
            if in_number {
                done_number = true;
            }
            if let Some(ch) = literal {
                pattern.push_literal(&ch.to_string(), in_number);
            }
        }
        pattern
    }

    fn push_literal(&mut self, text: &str, after_number: bool) {
        if after_number {
            self.suffix.push_str(text);
        } else {
            self.prefix.push_str(text);
        }
    }

    fn render(&self, value: f64) -> String {
        let value = if self.percent { value * 100.0 } else { value };
        let fixed = format!("{:.*}", self.max_fraction, value);
        let (int_part, frac_part) = fixed.split_once('.').unwrap_or((&fixed, ""));

        let mut fraction = frac_part.to_string();
        while fraction.len() > self.min_fraction && fraction.ends_with('0') {
            fraction.pop();
        }

        let mut integer = int_part.trim_start_matches('0').to_string();
        while integer.len() < self.min_integer {
            integer.insert(0, '0');
        }
        if self.grouping {
            integer = group_thousands(&integer);
        }

        let mut out = self.prefix.clone();
        out.push_str(&integer);
        if !fraction.is_empty() {
            out.push('.');
            out.push_str(&fraction);
        }
        out.push_str(&self.suffix);
        out
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
