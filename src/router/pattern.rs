//! Route templates compiled to anchored regular expressions.
//!
//! Template grammar, per `/`-delimited segment:
//!
//! | segment   | compiles to          | binds    |
//! |-----------|----------------------|----------|
//! | (empty)   | nothing              |          |
//! | `*`       | `(?:/(.*?))`         | `"*"`    |
//! | `:name?`  | `(?:/([^/]+?))?`     | `name`   |
//! | `:name`   | `/([^/]+?)`          | `name`   |
//! | literal   | `/literal` (escaped) |          |
//!
//! The whole expression is wrapped in `^...` and `/?$`, so one trailing slash is
//! always accepted.

use crate::error::PatternError;
use regex::Regex;
use std::collections::HashMap;

const SEP: &str = "/";
pub const WILDCARD: &str = "*";

pub type Params = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct Pattern {
    template: String,
    matcher: Regex,
    param_names: Vec<String>,
}

impl Pattern {
    pub fn compile(template: &str) -> Result<Self, PatternError> {
        let mut expr = String::from("^");
        let mut param_names: Vec<String> = Vec::new();
        let segments: Vec<&str> = template.split(SEP).filter(|s| !s.is_empty()).collect();

        for (index, segment) in segments.iter().enumerate() {
            if segment.starts_with('*') {
                if index + 1 != segments.len() {
                    return Err(PatternError::MisplacedWildcard(segment.to_string()));
                }
                expr.push_str("(?:/(.*?))");
                param_names.push(WILDCARD.to_string());
            } else if let Some(name) = segment.strip_prefix(':') {
                let (name, optional) = match name.strip_suffix('?') {
                    Some(name) => (name, true),
                    None => (name, false),
                };
                if name.is_empty() {
                    return Err(PatternError::EmptyParamName(segment.to_string()));
                }
                if param_names.iter().any(|n| n == name) {
                    return Err(PatternError::DuplicateParam(name.to_string()));
                }
                if optional {
                    expr.push_str("(?:/([^/]+?))?");
                } else {
                    expr.push_str("/([^/]+?)");
                }
                param_names.push(name.to_string());
            } else {
                expr.push_str(SEP);
                expr.push_str(&regex::escape(segment));
            }
        }
        expr.push_str("/?$");

        Ok(Self {
            template: template.to_string(),
            matcher: Regex::new(&expr)?,
            param_names,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn as_regex(&self) -> &str {
        self.matcher.as_str()
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }

    /// Bindings for `path`. Optional parameters that did not participate in the match
    /// are left out.
    pub fn extract(&self, path: &str) -> Params {
        let mut params = Params::new();
        if self.param_names.is_empty() {
            return params;
        }
        let Some(captures) = self.matcher.captures(path) else {
            return params;
        };

        for (name, group) in self.param_names.iter().zip(captures.iter().skip(1)) {
            let Some(value) = group else { continue };
            if name == WILDCARD {
                params.insert(name.clone(), format!("{}{}", SEP, value.as_str()));
            } else {
                params.insert(name.clone(), value.as_str().to_string());
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_template() {
        let p = Pattern::compile("/").unwrap();
        assert_eq!(p.as_regex(), "^/?$");
        assert!(p.param_names().is_empty());
        assert!(p.is_match("/"));
        assert!(p.is_match(""));
        assert!(!p.is_match("/a"));
    }

    #[test]
    fn literal_templates_match_exactly() {
        let p = Pattern::compile("/user/session").unwrap();
        assert!(p.param_names().is_empty());
        assert!(p.is_match("/user/session"));
        assert!(p.is_match("/user/session/"));
        assert!(!p.is_match("/user/session/x"));
        assert!(!p.is_match("/user"));
        assert!(!p.is_match("/User/session"));
        assert!(p.extract("/user/session").is_empty());
    }

    #[test]
    fn repeated_slashes_collapse() {
        let p = Pattern::compile("//user///session/").unwrap();
        assert_eq!(p.as_regex(), "^/user/session/?$");
    }

    #[test]
    fn literals_are_escaped() {
        let p = Pattern::compile("/v1.0/a+b").unwrap();
        assert!(p.is_match("/v1.0/a+b"));
        assert!(!p.is_match("/v1x0/aab"));
    }

    #[test]
    fn required_param() {
        let p = Pattern::compile("/page/:number").unwrap();
        assert_eq!(p.as_regex(), "^/page/([^/]+?)/?$");
        assert_eq!(p.param_names(), ["number"]);

        let params = p.extract("/page/42/");
        assert_eq!(params.get("number").map(String::as_str), Some("42"));
        assert_eq!(params.len(), 1);
        assert!(!p.is_match("/page/"));
    }

    #[test]
    fn optional_param() {
        let p = Pattern::compile("/page/:number/:limit?").unwrap();
        assert_eq!(p.as_regex(), "^/page/([^/]+?)(?:/([^/]+?))?/?$");

        assert!(p.is_match("/page/1/"));
        let params = p.extract("/page/1/");
        assert_eq!(params.get("number").map(String::as_str), Some("1"));
        assert!(!params.contains_key("limit"));

        assert!(p.is_match("/page/1/10/"));
        let params = p.extract("/page/1/10/");
        assert_eq!(params.get("limit").map(String::as_str), Some("10"));
    }

    #[test]
    fn params_between_literals() {
        let p = Pattern::compile("/page/:number/type/:category").unwrap();
        let params = p.extract("/page/3/type/books");
        assert_eq!(params["number"], "3");
        assert_eq!(params["category"], "books");
        assert!(!p.is_match("/page/3/kind/books"));
    }

    #[test]
    fn wildcard_is_reprefixed() {
        let p = Pattern::compile("/files/*").unwrap();
        let params = p.extract("/files/a/b");
        assert_eq!(params.get("*").map(String::as_str), Some("/a/b"));

        let params = p.extract("/files/a/b/");
        assert_eq!(params["*"], "/a/b");

        let params = p.extract("/files/");
        assert_eq!(params["*"], "/");
        assert!(!p.is_match("/filesystem/"));
    }

    #[test]
    fn params_and_wildcard() {
        let p = Pattern::compile("/page/:number/*").unwrap();
        assert_eq!(p.param_names(), ["number", "*"]);
        let params = p.extract("/page/7/x/y/");
        assert_eq!(params["number"], "7");
        assert_eq!(params["*"], "/x/y");
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert!(matches!(
            Pattern::compile("/users/:"),
            Err(PatternError::EmptyParamName(_))
        ));
        assert!(matches!(
            Pattern::compile("/users/:?"),
            Err(PatternError::EmptyParamName(_))
        ));
        assert!(matches!(
            Pattern::compile("/:id/posts/:id"),
            Err(PatternError::DuplicateParam(name)) if name == "id"
        ));
        assert!(matches!(
            Pattern::compile("/files/*/meta"),
            Err(PatternError::MisplacedWildcard(_))
        ));
    }
}
