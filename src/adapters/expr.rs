//! `expr:` redirect adapter (§4.7 worked example): a small expression
//! language for building a source URL from environment variables and string
//! literals, evaluated once per resolution.
//!
//! Grammar: `expr:<term> ('+' <term>)*` where `<term>` is either a quoted
//! string literal or `env("NAME")`. This intentionally covers far less
//! ground than a general-purpose expression language; it exists to show the
//! redirect-scheme shape other adapters (e.g. a templated multi-camera
//! config) can build on.

use crate::core::registry::Redirector;
use crate::error::{AppError, Result};

pub struct ExprRedirector;

impl Redirector for ExprRedirector {
    fn resolve(&self, url: &str) -> Result<String> {
        let body = url
            .strip_prefix("expr:")
            .ok_or_else(|| AppError::Unresolved(format!("not an expr: url: {url}")))?;

        let result = eval(body)?;
        if result.is_empty() {
            return Err(AppError::Unresolved("expr: result is empty".to_string()));
        }
        Ok(result)
    }
}

fn eval(expr: &str) -> Result<String> {
    let mut out = String::new();
    for term in expr.split('+') {
        out.push_str(&eval_term(term.trim())?);
    }
    Ok(out)
}

fn eval_term(term: &str) -> Result<String> {
    if let Some(inner) = term.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(inner.to_string());
    }
    if let Some(inner) = term
        .strip_prefix("env(\"")
        .and_then(|s| s.strip_suffix("\")"))
    {
        return std::env::var(inner)
            .map_err(|_| AppError::Unresolved(format!("expr: env var {inner} is not set")));
    }
    Err(AppError::Unresolved(format!("expr: unrecognized term: {term}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_string_literals() {
        let r = ExprRedirector;
        assert_eq!(
            r.resolve(r#"expr:"rtsp://" + "192.168.1.10/stream1""#).unwrap(),
            "rtsp://192.168.1.10/stream1"
        );
    }

    #[test]
    fn resolves_env_var_terms() {
        std::env::set_var("MEDIAHUB_TEST_HOST", "192.168.1.20");
        let r = ExprRedirector;
        assert_eq!(
            r.resolve(r#"expr:"rtsp://" + env("MEDIAHUB_TEST_HOST") + "/stream1""#)
                .unwrap(),
            "rtsp://192.168.1.20/stream1"
        );
    }

    #[test]
    fn missing_env_var_fails() {
        let r = ExprRedirector;
        assert!(r.resolve(r#"expr:env("MEDIAHUB_NOT_SET_XYZ")"#).is_err());
    }

    #[test]
    fn rejects_non_expr_urls() {
        let r = ExprRedirector;
        assert!(r.resolve("rtsp://host/stream").is_err());
    }
}
