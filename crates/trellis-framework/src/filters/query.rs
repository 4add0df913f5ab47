//! Typed callback query payloads.
//!
//! A [`QueryBuilder`] describes the layout of a callback payload once and
//! is then used on both sides of the round trip: `build` produces the
//! payload attached to a button, `filter` matches incoming callback queries
//! against it.
//!
//! ```rust,ignore
//! let vote = QueryBuilder::new([("action", ArgType::Str), ("id", ArgType::Int)])
//!     .ignored(["id"]);
//!
//! let payload = vote.build([("action", "up"), ("id", "42")])?;   // "up:42"
//! let on_upvote = vote.filter([("action", "up")])?;
//!
//! router.on_callback_query([on_upvote], |CurrentQuery(q): CurrentQuery| async move {
//!     let id = q["id"].as_i64();
//! })?;
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Number, Value};

use trellis_core::EventKind;

use crate::context;
use crate::error::{ConfigError, QueryError};
use crate::filter::Filter;

/// A parsed callback payload, keyed by argument name.
pub type Query = Map<String, Value>;

/// How a payload part is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgType {
    #[default]
    Str,
    Int,
    Float,
    /// `true`/`1` or `false`/`0`.
    Bool,
}

impl ArgType {
    fn convert(self, raw: &str) -> Option<Value> {
        match self {
            Self::Str => Some(Value::String(raw.to_owned())),
            Self::Int => raw.parse::<i64>().ok().map(Value::from),
            Self::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            Self::Bool => match raw {
                "1" | "true" => Some(Value::Bool(true)),
                "0" | "false" => Some(Value::Bool(false)),
                _ => None,
            },
        }
    }
}

/// One declared payload argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryArg {
    name: String,
    ty: ArgType,
}

impl From<&str> for QueryArg {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ty: ArgType::Str,
        }
    }
}

impl From<String> for QueryArg {
    fn from(name: String) -> Self {
        Self {
            name,
            ty: ArgType::Str,
        }
    }
}

impl<S: Into<String>> From<(S, ArgType)> for QueryArg {
    fn from((name, ty): (S, ArgType)) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Builds, parses and matches separator-joined callback payloads.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    args: Vec<QueryArg>,
    ignored: HashSet<String>,
    separator: String,
    max_len: usize,
}

impl QueryBuilder {
    /// Payload limit imposed by the Telegram API.
    pub const DEFAULT_MAX_LEN: usize = 64;

    /// Declares the payload arguments, in order.
    pub fn new<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<QueryArg>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ignored: HashSet::new(),
            separator: ":".to_owned(),
            max_len: Self::DEFAULT_MAX_LEN,
        }
    }

    /// Marks arguments that are parsed but never matched by [`filter`](Self::filter).
    pub fn ignored<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Sets the maximum payload length in bytes.
    pub fn max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Returns the declared argument names.
    pub fn arg_names(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|arg| arg.name.as_str())
    }

    /// Joins `values` into a payload, in declaration order.
    pub fn build<I, K, V>(&self, values: I) -> Result<String, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let values: HashMap<String, String> = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();

        let parts = self
            .args
            .iter()
            .map(|arg| {
                values
                    .get(&arg.name)
                    .map(String::as_str)
                    .ok_or_else(|| QueryError::MissingValue(arg.name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let payload = parts.join(&self.separator);
        if payload.len() > self.max_len {
            return Err(QueryError::TooLong {
                len: payload.len(),
                max: self.max_len,
            });
        }
        Ok(payload)
    }

    /// Splits and converts a payload.
    pub fn parse(&self, payload: &str) -> Result<Query, QueryError> {
        let parts: Vec<&str> = payload.split(self.separator.as_str()).collect();
        if parts.len() != self.args.len() {
            return Err(QueryError::WrongArity {
                expected: self.args.len(),
                got: parts.len(),
            });
        }

        self.args
            .iter()
            .zip(parts)
            .map(|(arg, raw)| {
                arg.ty
                    .convert(raw)
                    .map(|value| (arg.name.clone(), value))
                    .ok_or_else(|| QueryError::InvalidValue {
                        arg: arg.name.clone(),
                        value: raw.to_owned(),
                    })
            })
            .collect()
    }

    /// Like [`parse`](Self::parse), for raw callback bytes.
    pub fn parse_bytes(&self, payload: &[u8]) -> Result<Query, QueryError> {
        let payload = std::str::from_utf8(payload).map_err(|_| QueryError::NotUtf8)?;
        self.parse(payload)
    }

    /// Returns a callback query filter matching `expected`.
    ///
    /// Every argument that is not ignored must be given an expected value.
    /// On a match the parsed [`Query`] is published to the ambient context.
    pub fn filter<I, K, V>(&self, expected: I) -> Result<Filter, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.filter_ignoring(std::iter::empty::<String>(), expected)
    }

    /// Like [`filter`](Self::filter), ignoring extra arguments for this filter only.
    pub fn filter_ignoring<G, S, I, K, V>(
        &self,
        ignore: G,
        expected: I,
    ) -> Result<Filter, ConfigError>
    where
        G: IntoIterator<Item = S>,
        S: Into<String>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut ignored = self.ignored.clone();
        ignored.extend(ignore.into_iter().map(Into::into));
        let expected: HashMap<String, Value> = expected
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let mut checked = Vec::new();
        for arg in &self.args {
            if ignored.contains(&arg.name) {
                continue;
            }
            let value = expected
                .get(&arg.name)
                .cloned()
                .ok_or_else(|| ConfigError::MissingQueryArg(arg.name.clone()))?;
            checked.push((arg.name.clone(), value));
        }

        let name = format!("query({checked:?})");
        let builder = Arc::new(self.clone());
        Ok(Filter::on(EventKind::CallbackQuery, move |event| {
            let Some(Ok(query)) = event.query_data().map(|data| builder.parse_bytes(data)) else {
                return false;
            };
            let matched = checked
                .iter()
                .all(|(name, value)| query.get(name) == Some(value));
            if matched && let Some(ctx) = context::current() {
                ctx.publish_query(query);
            }
            matched
        })
        .named(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vote() -> QueryBuilder {
        QueryBuilder::new([
            ("action", ArgType::Str),
            ("id", ArgType::Int),
            ("weight", ArgType::Float),
            ("silent", ArgType::Bool),
        ])
        .ignored(["id", "weight", "silent"])
    }

    #[test]
    fn test_build_joins_in_declaration_order() {
        let payload = vote()
            .build([("silent", "1"), ("id", "42"), ("action", "up"), ("weight", "0.5")])
            .unwrap();
        assert_eq!(payload, "up:42:0.5:1");

        let err = vote().build([("action", "up")]).unwrap_err();
        assert_eq!(err, QueryError::MissingValue("id".into()));
    }

    #[test]
    fn test_build_respects_limit() {
        let builder = QueryBuilder::new(["a"]).max_len(4);
        assert_eq!(builder.build([("a", "abcd")]).unwrap(), "abcd");
        assert_eq!(
            builder.build([("a", "abcde")]).unwrap_err(),
            QueryError::TooLong { len: 5, max: 4 }
        );
    }

    #[test]
    fn test_parse_converts_types() {
        let query = vote().parse("up:42:0.5:true").unwrap();
        assert_eq!(
            Value::Object(query),
            json!({"action": "up", "id": 42, "weight": 0.5, "silent": true})
        );

        assert_eq!(
            vote().parse("up:42").unwrap_err(),
            QueryError::WrongArity { expected: 4, got: 2 }
        );
        assert_eq!(
            vote().parse("up:x:0.5:1").unwrap_err(),
            QueryError::InvalidValue {
                arg: "id".into(),
                value: "x".into()
            }
        );
        assert_eq!(vote().parse_bytes(&[0xff]).unwrap_err(), QueryError::NotUtf8);
    }

    #[test]
    fn test_filter_requires_every_checked_arg() {
        let builder = QueryBuilder::new(["action", "id"]);
        assert!(matches!(
            builder.filter([("action", "up")]),
            Err(ConfigError::MissingQueryArg(arg)) if arg == "id"
        ));
        assert!(builder.filter_ignoring(["id"], [("action", "up")]).is_ok());
    }

    #[test]
    fn test_filter_is_bound_to_callback_queries() {
        let filter = vote().filter([("action", "up")]).unwrap();
        assert_eq!(filter.event_kind(), Some(EventKind::CallbackQuery));
    }
}
