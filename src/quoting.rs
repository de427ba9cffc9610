use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use lazy_regex::regex_is_match;
use serde_json::Value;

use crate::connection::Handle;
use crate::driver::QueryResult;
use crate::error::{ConfigError, Error, Result};

const KEYWORD_QUERY: &str = "SELECT keyword FROM EXA_SQL_KEYWORDS WHERE reserved = TRUE";

/// Wraps an identifier in double quotes, doubling any embedded quote.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Decides which identifiers need quoting.
///
/// Reserved words come from the server catalog and are fetched once per
/// process; the cache never resets, so keywords added by a server
/// upgrade are only picked up on restart.
#[derive(Debug, Default)]
pub struct IdentifierQuoter {
    keywords: OnceLock<HashSet<String>>,
}

impl IdentifierQuoter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `identifier` must be quoted to survive round-tripping
    /// through the server.
    ///
    /// An explicit per-column override wins outright. Otherwise
    /// identifiers that are not syntactically plain, or that collide
    /// with a reserved word, get quoted.
    pub fn should_quote(
        &self,
        handle: &mut Handle,
        identifier: &str,
        overrides: Option<&HashMap<String, bool>>,
    ) -> Result<bool> {
        if let Some(overrides) = overrides {
            let forced = overrides
                .get(identifier)
                .or_else(|| overrides.get(&quote(identifier)));
            if let Some(&forced) = forced {
                return Ok(forced);
            }
        }

        if !is_plain_identifier(identifier) {
            return Ok(true);
        }

        let reserved = self.reserved_words(handle)?;
        Ok(reserved.contains(&identifier.to_uppercase()))
    }

    /// Renders a column name for DDL, honoring an explicit quote config
    /// value when one is present.
    ///
    /// `true` and `false` force the decision; `null` or absence defer to
    /// [IdentifierQuoter::should_quote]; any other JSON type is a
    /// configuration error.
    pub fn quote_column(
        &self,
        handle: &mut Handle,
        name: &str,
        config: Option<&Value>,
    ) -> Result<String> {
        let quoted = match config {
            Some(Value::Bool(forced)) => *forced,
            Some(Value::Null) | None => self.should_quote(handle, name, None)?,
            Some(Value::String(_)) => {
                return Err(ConfigError::InvalidQuoteConfig("string").into())
            }
            Some(Value::Number(_)) => {
                return Err(ConfigError::InvalidQuoteConfig("number").into())
            }
            Some(Value::Array(_)) => {
                return Err(ConfigError::InvalidQuoteConfig("array").into())
            }
            Some(Value::Object(_)) => {
                return Err(ConfigError::InvalidQuoteConfig("object").into())
            }
        };

        if quoted {
            Ok(quote(name))
        } else {
            Ok(name.to_owned())
        }
    }

    fn reserved_words(&self, handle: &mut Handle) -> Result<&HashSet<String>> {
        if let Some(words) = self.keywords.get() {
            return Ok(words);
        }

        let words = load_keywords(handle)?;
        // A raced initialization keeps the winner's set; both came from
        // the same catalog query.
        Ok(self.keywords.get_or_init(|| words))
    }
}

fn is_plain_identifier(identifier: &str) -> bool {
    regex_is_match!(r"^[A-Za-z][A-Za-z0-9_#$]*$", identifier)
}

fn load_keywords(handle: &mut Handle) -> Result<HashSet<String>> {
    let result = handle.execute(KEYWORD_QUERY)?;

    let QueryResult::ResultSet(mut rs) = result else {
        return Err(Error::State("keyword query returned no result set"));
    };

    let words = rs
        .rows
        .drain(..)
        .filter_map(|mut row| {
            row.drain(..)
                .next()
                .and_then(|v| v.as_str().map(str::to_uppercase))
        })
        .collect();

    Ok(words)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::{result_set, MockSession};

    fn keyword_session() -> MockSession {
        MockSession::new().with_results(vec![result_set(
            &[("KEYWORD", "VARCHAR")],
            vec![vec![json!("ORDER")], vec![json!("SELECT")]],
        )])
    }

    #[test]
    fn quote_doubles_embedded_quotes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn reserved_words_are_quoted_case_insensitively() {
        let mut handle = keyword_session().into_handle();
        let quoter = IdentifierQuoter::new();

        assert!(quoter.should_quote(&mut handle, "order", None).unwrap());
        assert!(quoter.should_quote(&mut handle, "ORDER", None).unwrap());
        assert!(!quoter
            .should_quote(&mut handle, "regular_column", None)
            .unwrap());
    }

    #[test]
    fn syntactically_invalid_identifiers_are_quoted() {
        let mut handle = keyword_session().into_handle();
        let quoter = IdentifierQuoter::new();

        assert!(quoter.should_quote(&mut handle, "123table", None).unwrap());
        assert!(quoter
            .should_quote(&mut handle, "has space", None)
            .unwrap());
        assert!(quoter.should_quote(&mut handle, "", None).unwrap());
        assert!(!quoter
            .should_quote(&mut handle, "col_1#$", None)
            .unwrap());
    }

    #[test]
    fn overrides_win_over_reserved_words() {
        let mut handle = keyword_session().into_handle();
        let quoter = IdentifierQuoter::new();

        let overrides = HashMap::from([("order".to_owned(), false)]);
        assert!(!quoter
            .should_quote(&mut handle, "order", Some(&overrides))
            .unwrap());

        let overrides = HashMap::from([("plain".to_owned(), true)]);
        assert!(quoter
            .should_quote(&mut handle, "plain", Some(&overrides))
            .unwrap());
    }

    #[test]
    fn overrides_match_the_quoted_form_too() {
        let mut handle = keyword_session().into_handle();
        let quoter = IdentifierQuoter::new();

        let overrides = HashMap::from([("\"order\"".to_owned(), false)]);
        assert!(!quoter
            .should_quote(&mut handle, "order", Some(&overrides))
            .unwrap());
    }

    #[test]
    fn keyword_catalog_is_fetched_once() {
        let session = keyword_session();
        let executed = session.executed();
        let mut handle = session.into_handle();
        let quoter = IdentifierQuoter::new();

        quoter.should_quote(&mut handle, "order", None).unwrap();
        quoter.should_quote(&mut handle, "select", None).unwrap();
        quoter.should_quote(&mut handle, "plain", None).unwrap();

        let executed = executed.lock().unwrap();
        let fetches = executed.iter().filter(|sql| *sql == KEYWORD_QUERY).count();
        assert_eq!(fetches, 1);
    }

    #[test]
    fn quote_column_honors_explicit_config() {
        let mut handle = keyword_session().into_handle();
        let quoter = IdentifierQuoter::new();

        let forced_on = json!(true);
        let forced_off = json!(false);
        let deferred = json!(null);

        assert_eq!(
            quoter
                .quote_column(&mut handle, "plain", Some(&forced_on))
                .unwrap(),
            "\"plain\""
        );
        assert_eq!(
            quoter
                .quote_column(&mut handle, "order", Some(&forced_off))
                .unwrap(),
            "order"
        );
        assert_eq!(
            quoter
                .quote_column(&mut handle, "order", Some(&deferred))
                .unwrap(),
            "\"order\""
        );
        assert_eq!(
            quoter.quote_column(&mut handle, "plain", None).unwrap(),
            "plain"
        );
    }

    #[test]
    fn quote_column_rejects_non_boolean_config() {
        let mut handle = keyword_session().into_handle();
        let quoter = IdentifierQuoter::new();

        let config = json!("yes");
        let err = quoter
            .quote_column(&mut handle, "plain", Some(&config))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
