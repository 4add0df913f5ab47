//! Filters over the text of new messages.
//!
//! Every filter in this module is bound to [`EventKind::NewMessage`]. A
//! message without text is treated as the empty string.

use std::collections::HashSet;

use regex::Regex;

use trellis_core::{BoxedEvent, EventKind};

use crate::error::ConfigError;
use crate::filter::Filter;

fn text(event: &BoxedEvent) -> &str {
    event.text().unwrap_or_default()
}

fn on_text<F>(name: String, f: F) -> Filter
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    Filter::on(EventKind::NewMessage, move |event| f(text(event))).named(name)
}

/// Passes when the text starts with `prefix`.
pub fn startswith(prefix: impl Into<String>) -> Filter {
    let prefix = prefix.into();
    on_text(format!("text.startswith({prefix:?})"), move |text| {
        text.starts_with(&prefix)
    })
}

/// Passes when the message is one of the `/`-prefixed commands in `cmds`.
///
/// `/start`, `/start now` and `/start@my_bot` all match `commands(["start"])`.
pub fn commands<I, S>(cmds: I) -> Filter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    commands_with_prefixes(cmds, ["/"])
}

/// Like [`commands`], with custom command prefixes.
pub fn commands_with_prefixes<I, S, P, Q>(cmds: I, prefixes: P) -> Filter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    P: IntoIterator<Item = Q>,
    Q: Into<String>,
{
    let cmds: HashSet<String> = cmds.into_iter().map(Into::into).collect();
    let prefixes: Vec<String> = prefixes.into_iter().map(Into::into).collect();
    let name = format!("text.commands({cmds:?})");

    on_text(name, move |text| {
        let Some(head) = text.split_whitespace().next() else {
            return false;
        };
        prefixes
            .iter()
            .filter_map(|prefix| head.strip_prefix(prefix.as_str()))
            .map(|command| command.split('@').next().unwrap_or(command))
            .any(|command| cmds.contains(command))
    })
}

/// Passes when `pattern` matches at the start of the text.
pub fn matches(pattern: &str) -> Result<Filter, ConfigError> {
    let regex = Regex::new(&format!("^(?:{pattern})"))
        .map_err(|e| ConfigError::InvalidPattern(e.to_string()))?;
    Ok(on_text(format!("text.matches({pattern:?})"), move |text| {
        regex.is_match(text)
    }))
}

/// Passes when the text equals `expected`.
pub fn exact(expected: impl Into<String>) -> Filter {
    let expected = expected.into();
    on_text(format!("text.exact({expected:?})"), move |text| text == expected)
}

/// Passes when `f(text) == f(expected)`.
///
/// `f` is applied to `expected` on every check, so stateful mappings see
/// both sides.
///
/// ```rust,ignore
/// let yes = text::exact_map("yes", |s| s.to_lowercase());
/// ```
pub fn exact_map<F>(expected: impl Into<String>, f: F) -> Filter
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let expected = expected.into();
    on_text(format!("text.exact_map({expected:?})"), move |text| {
        f(text) == f(&expected)
    })
}

/// Passes when the text is one of `texts`.
pub fn between<I, S>(texts: I) -> Filter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let texts: HashSet<String> = texts.into_iter().map(Into::into).collect();
    on_text(format!("text.between({texts:?})"), move |text| {
        texts.contains(text)
    })
}

/// Passes when the text is a non-empty run of ASCII digits.
pub fn is_digit() -> Filter {
    on_text("text.is_digit".to_owned(), |text| {
        !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
    })
}

/// Passes when the trimmed text parses as an `i64` in `radix`.
///
/// Fails with [`ConfigError::InvalidPattern`] if `radix` is not in `2..=36`.
pub fn can_be_int(radix: u32) -> Result<Filter, ConfigError> {
    if !(2..=36).contains(&radix) {
        return Err(ConfigError::InvalidPattern(format!(
            "radix {radix} is not in 2..=36"
        )));
    }
    Ok(on_text(format!("text.can_be_int({radix})"), move |text| {
        i64::from_str_radix(text.trim(), radix).is_ok()
    }))
}

/// Passes when the trimmed text parses as an `f64`.
pub fn can_be_float() -> Filter {
    on_text("text.can_be_float".to_owned(), |text| {
        text.trim().parse::<f64>().is_ok()
    })
}

fn len_cmp(op: &'static str, length: usize, cmp: fn(usize, usize) -> bool) -> Filter {
    on_text(format!("text.len {op} {length}"), move |text| {
        cmp(text.chars().count(), length)
    })
}

/// Passes when the text is exactly `length` characters long.
pub fn len_eq(length: usize) -> Filter {
    len_cmp("==", length, |a, b| a == b)
}

pub fn len_gt(length: usize) -> Filter {
    len_cmp(">", length, |a, b| a > b)
}

pub fn len_lt(length: usize) -> Filter {
    len_cmp("<", length, |a, b| a < b)
}

pub fn len_ge(length: usize) -> Filter {
    len_cmp(">=", length, |a, b| a >= b)
}

pub fn len_le(length: usize) -> Filter {
    len_cmp("<=", length, |a, b| a <= b)
}
