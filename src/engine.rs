//! Rule selection.
//!
//! For a given endpoint the engine walks its rules top to bottom and picks
//! the first one whose condition holds for the decoded body.

use crate::codec::Codec;
use crate::config::{Endpoint, Rule};
use crate::error::{MatchError, ProcessError};
use crate::message::{Context, InboundMessage, OutboundResult};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether a rule's `when` holds.
pub trait Comparator: Send + Sync {
    fn matches(&self, when: &Value, body: &Value, context: &Context) -> bool;
}

/// Flat field equality on canonical strings.
///
/// Every key of the `when` mapping must exist in the body and render to the
/// same string as the expected value.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatEquality;

impl Comparator for FlatEquality {
    fn matches(&self, when: &Value, body: &Value, _context: &Context) -> bool {
        let Value::Mapping(expected) = when else {
            return false;
        };
        expected.iter().all(|(field, value)| {
            body.get(field)
                .is_some_and(|actual| actual.canonical_string() == value.canonical_string())
        })
    }
}

struct EndpointRules {
    codec: Codec,
    rules: Vec<Rule>,
}

/// Read-only rule table for one listen group.
pub struct MatchingEngine {
    endpoints: HashMap<String, EndpointRules>,
    comparator: Arc<dyn Comparator>,
}

impl MatchingEngine {
    /// Build the table from configured endpoints.
    pub fn new(endpoints: &[Endpoint]) -> Self {
        Self::with_comparator(endpoints, Arc::new(FlatEquality))
    }

    /// Build the table with a custom condition comparator.
    pub fn with_comparator(endpoints: &[Endpoint], comparator: Arc<dyn Comparator>) -> Self {
        let endpoints = endpoints
            .iter()
            .map(|ep| {
                (
                    ep.name.clone(),
                    EndpointRules {
                        codec: ep.format,
                        rules: ep.tests.clone(),
                    },
                )
            })
            .collect();
        Self {
            endpoints,
            comparator,
        }
    }

    /// Select the first rule of `endpoint` whose condition holds.
    pub fn evaluate(&self, endpoint: &str, body: &Value, context: &Context) -> Result<&Rule, MatchError> {
        let entry = self
            .endpoints
            .get(endpoint)
            .ok_or_else(|| MatchError::EndpointNotFound(endpoint.to_string()))?;

        entry
            .rules
            .iter()
            .find(|rule| match &rule.when {
                None | Some(Value::Null) => true,
                Some(when) => self.comparator.matches(when, body, context),
            })
            .ok_or_else(|| MatchError::NoSuitableRule(endpoint.to_string()))
    }

    /// Decode a message, select a rule and render its response.
    pub fn respond(&self, message: &InboundMessage) -> Result<OutboundResult, ProcessError> {
        let endpoint = &message.endpoint;
        let codec = self
            .endpoints
            .get(endpoint)
            .map(|e| e.codec)
            .ok_or_else(|| MatchError::EndpointNotFound(endpoint.clone()))?;

        let body = codec.decode(&message.content).map_err(|source| ProcessError::Decode {
            endpoint: endpoint.clone(),
            source,
        })?;

        let rule = match self.evaluate(endpoint, &body, &message.context) {
            Ok(rule) => rule,
            Err(e) => {
                if matches!(e, MatchError::NoSuitableRule(_)) {
                    warn!(
                        endpoint = %endpoint,
                        body = %body,
                        "No suitable rule found"
                    );
                }
                return Err(e.into());
            }
        };
        debug!(endpoint = %endpoint, "Rule matched");

        let content = codec
            .render(rule.then.response.as_ref())
            .map_err(|source| ProcessError::Encode {
                endpoint: endpoint.clone(),
                source,
            })?;

        Ok(OutboundResult {
            content,
            context: rule.then.headers.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(yaml: &str) -> Endpoint {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn body(json: &str) -> Value {
        serde_json::from_str(json).unwrap()
    }

    fn response(rule: &Rule) -> String {
        rule.then.response.as_ref().unwrap().canonical_string()
    }

    const ECHO: &str = r#"
name: echo
method: POST
url: /echo
tests:
  - when:
      type: a
    then:
      response: A
  - when:
      type: b
      level: 2
    then:
      response: B2
  - then:
      response: default
"#;

    #[test]
    fn test_first_match_wins() {
        let engine = MatchingEngine::new(&[endpoint(ECHO)]);
        let ctx = Context::new();

        let rule = engine.evaluate("echo", &body(r#"{"type":"a"}"#), &ctx).unwrap();
        assert_eq!(response(rule), "A");

        let rule = engine
            .evaluate("echo", &body(r#"{"type":"b","level":2}"#), &ctx)
            .unwrap();
        assert_eq!(response(rule), "B2");

        let rule = engine.evaluate("echo", &body(r#"{"type":"b"}"#), &ctx).unwrap();
        assert_eq!(response(rule), "default");
    }

    #[test]
    fn test_unconditional_rule_absorbs_later_rules() {
        let ep = endpoint(
            r#"
name: greedy
tests:
  - then:
      response: always
  - when:
      type: a
    then:
      response: never
"#,
        );
        let engine = MatchingEngine::new(&[ep]);
        let rule = engine
            .evaluate("greedy", &body(r#"{"type":"a"}"#), &Context::new())
            .unwrap();
        assert_eq!(response(rule), "always");
    }

    #[test]
    fn test_empty_and_null_conditions_match_anything() {
        let ep = endpoint(
            r#"
name: open
tests:
  - when: {}
    then:
      response: empty
"#,
        );
        let unset = endpoint(
            r#"
name: unset
tests:
  - when: null
    then:
      response: null-condition
"#,
        );
        let engine = MatchingEngine::new(&[ep, unset]);
        let ctx = Context::new();

        let rule = engine.evaluate("open", &Value::empty_mapping(), &ctx).unwrap();
        assert_eq!(response(rule), "empty");
        let rule = engine.evaluate("open", &body(r#"{"type":"z"}"#), &ctx).unwrap();
        assert_eq!(response(rule), "empty");

        let rule = engine.evaluate("unset", &body(r#"{"id":3}"#), &ctx).unwrap();
        assert_eq!(response(rule), "null-condition");
    }

    #[test]
    fn test_comparison_by_string_form() {
        let ep = endpoint(
            r#"
name: ids
tests:
  - when:
      id: "1"
    then:
      response: string-one
  - when:
      count: 2
    then:
      response: number-two
"#,
        );
        let engine = MatchingEngine::new(&[ep]);
        let ctx = Context::new();

        let rule = engine.evaluate("ids", &body(r#"{"id":1}"#), &ctx).unwrap();
        assert_eq!(response(rule), "string-one");

        let rule = engine.evaluate("ids", &body(r#"{"count":"2"}"#), &ctx).unwrap();
        assert_eq!(response(rule), "number-two");
    }

    #[test]
    fn test_missing_field_does_not_match() {
        let engine = MatchingEngine::new(&[endpoint(
            "name: strict\ntests:\n  - when:\n      type: a\n    then:\n      response: A\n",
        )]);
        let err = engine
            .evaluate("strict", &body(r#"{"kind":"a"}"#), &Context::new())
            .unwrap_err();
        assert_eq!(err, MatchError::NoSuitableRule("strict".to_string()));
    }

    #[test]
    fn test_endpoint_not_found_is_distinct() {
        let engine = MatchingEngine::new(&[endpoint(ECHO)]);
        let err = engine.evaluate("missing", &Value::empty_mapping(), &Context::new()).unwrap_err();
        assert_eq!(err, MatchError::EndpointNotFound("missing".to_string()));
    }

    #[test]
    fn test_no_rules_is_no_suitable_rule() {
        let engine = MatchingEngine::new(&[endpoint("name: bare\n")]);
        let err = engine.evaluate("bare", &Value::empty_mapping(), &Context::new()).unwrap_err();
        assert_eq!(err, MatchError::NoSuitableRule("bare".to_string()));
    }

    #[test]
    fn test_respond_renders_response_and_headers() {
        let ep = endpoint(
            r#"
name: user
tests:
  - then:
      response:
        id: 7
      headers:
        X-Mock: "yes"
"#,
        );
        let engine = MatchingEngine::new(&[ep]);
        let out = engine
            .respond(&InboundMessage::new("user", "", Context::new()))
            .unwrap();
        assert_eq!(&out.content[..], br#"{"id":7}"#);
        assert_eq!(out.context.get("X-Mock"), Some(&"yes".to_string()));
    }

    #[test]
    fn test_respond_decode_error() {
        let engine = MatchingEngine::new(&[endpoint(ECHO)]);
        let err = engine
            .respond(&InboundMessage::new("echo", "{not json", Context::new()))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Decode { .. }));
    }

    #[test]
    fn test_custom_comparator() {
        struct ContextKey;
        impl Comparator for ContextKey {
            fn matches(&self, when: &Value, _body: &Value, context: &Context) -> bool {
                when.get("path.id")
                    .is_some_and(|v| context.get("path.id") == Some(&v.canonical_string()))
            }
        }

        let ep = endpoint(
            "name: user\ntests:\n  - when:\n      path.id: 42\n    then:\n      response: found\n",
        );
        let engine = MatchingEngine::with_comparator(&[ep], Arc::new(ContextKey));
        let mut ctx = Context::new();
        ctx.insert("path.id".to_string(), "42".to_string());
        let rule = engine.evaluate("user", &Value::empty_mapping(), &ctx).unwrap();
        assert_eq!(response(rule), "found");
    }
}
