//! CORS options that allow every origin and credentials at once.
//!
//! Browsers refuse `Access-Control-Allow-Origin: *` together with
//! credentials, so CORS middleware configured this way typically echoes the
//! request's origin instead, handing credentialed access to any site.

use crate::analysis::{FactKind, FieldValueFact, FunctionId};

use super::registry::{Candidate, DetectorError, DetectorSpec, MatchInput};
use super::{EvidenceRole, RuleId, Severity};

pub(super) fn detector() -> DetectorSpec {
    DetectorSpec {
        rule: RuleId::WILDCARD_CREDENTIALS,
        severity: Severity::High,
        title: "Wildcard CORS origin with credentials",
        description: "CORS configuration allows any origin while also allowing credentialed requests.",
        subscribes: &[FactKind::Construct, FactKind::FieldValue],
        predicate: matches,
        message_template: "{type} allows any origin via {origin_field} while {credentials_field} is true",
    }
}

fn matches(input: &MatchInput<'_>) -> Result<Vec<Candidate>, DetectorError> {
    let mut out = Vec::new();
    for construct in &input.facts.constructs {
        let Some(shape) = &construct.cors else {
            continue;
        };
        let function = construct.function;
        let fields: Vec<&FieldValueFact> = input.facts.fields_of(construct).collect();

        let wildcard = fields
            .iter()
            .find(|f| shape.origin_fields.contains(&f.field_name) && allows_any_origin(input, f, function))
            .or_else(|| {
                fields.iter().find(|f| {
                    shape.allow_all_fields.contains(&f.field_name) && is_true(input, f, function)
                })
            });
        let credentials = fields
            .iter()
            .find(|f| shape.credential_fields.contains(&f.field_name) && is_true(input, f, function));

        let (Some(wildcard), Some(credentials)) = (wildcard, credentials) else {
            continue;
        };
        let mut candidate = Candidate::new(construct.site)
            .evidence(construct.site, EvidenceRole::Construct)
            .evidence(wildcard.value_node, EvidenceRole::WildcardOrigin)
            .evidence(credentials.value_node, EvidenceRole::Credentials)
            .var("type", construct.type_name.clone().unwrap_or_default())
            .var("origin_field", wildcard.field_name.clone())
            .var("credentials_field", credentials.field_name.clone());
        if let Some(call) = construct.passed_to {
            candidate = candidate.evidence(call, EvidenceRole::Constructor);
        }
        out.push(candidate);
    }
    Ok(out)
}

/// An origin list containing `"*"`, or an origin string that is `"*"` or
/// lists it among comma-separated entries.
fn allows_any_origin(input: &MatchInput<'_>, field: &FieldValueFact, function: Option<FunctionId>) -> bool {
    let resolver = input.resolver;
    resolver.sequence_contains(&field.value, field.value_node, function, "*")
        || resolver
            .resolve_str(&field.value, field.value_node, function)
            .map(|s| s.split(',').any(|part| part.trim() == "*"))
            .unwrap_or(false)
}

fn is_true(input: &MatchInput<'_>, field: &FieldValueFact, function: Option<FunctionId>) -> bool {
    input
        .resolver
        .resolve_bool(&field.value, field.value_node, function)
        == Some(true)
}

#[cfg(all(test, feature = "tree-sitter"))]
mod tests {
    use crate::detect::test_support::rule_findings;
    use crate::detect::{EvidenceRole, RuleId};

    fn count(source: &str) -> usize {
        rule_findings(source, &RuleId::WILDCARD_CREDENTIALS).len()
    }

    #[test]
    fn test_wildcard_with_credentials() {
        let findings = rule_findings(
            r#"package main

import "github.com/rs/cors"

func setup() {
	_ = cors.New(cors.Options{
		AllowedOrigins:   []string{"*"},
		AllowCredentials: true,
	})
}
"#,
            &RuleId::WILDCARD_CREDENTIALS,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!((findings[0].site.line, findings[0].site.column), (6, 15));
        assert!(findings[0].message.contains("AllowedOrigins"));
        assert_eq!(findings[0].evidence.len(), 4);
    }

    #[test]
    fn test_field_order_irrelevant() {
        assert_eq!(
            count(
                r#"package main

import "github.com/rs/cors"

var opts = cors.Options{AllowCredentials: true, AllowedOrigins: []string{"https://a.example", "*"}}
"#
            ),
            1
        );
    }

    #[test]
    fn test_missing_either_half() {
        assert_eq!(
            count(
                r#"package main

import "github.com/rs/cors"

var a = cors.Options{AllowedOrigins: []string{"*"}}
var b = cors.Options{AllowedOrigins: []string{"https://a.example"}, AllowCredentials: true}
var c = cors.Options{AllowedOrigins: []string{"*"}, AllowCredentials: false}
"#
            ),
            0
        );
    }

    #[test]
    fn test_resolved_through_constants() {
        assert_eq!(
            count(
                r#"package main

import "github.com/rs/cors"

const everyone = "*"

func setup() {
	origins := []string{everyone}
	creds := true
	cors.New(cors.Options{AllowedOrigins: origins, AllowCredentials: creds})
}
"#
            ),
            1
        );
    }

    #[test]
    fn test_allow_all_flag_and_aliases() {
        assert_eq!(
            count(
                r#"package main

import gincors "github.com/gin-contrib/cors"

func setup() {
	gincors.New(gincors.Config{AllowAllOrigins: true, AllowCredentials: true})
}
"#
            ),
            1
        );
        assert_eq!(
            count(
                r#"package main

import . "github.com/rs/cors"

var o = Options{AllowedOrigins: []string{"*"}, AllowCredentials: true}
"#
            ),
            1
        );
    }

    #[test]
    fn test_unrelated_type_ignored() {
        assert_eq!(
            count(
                r#"package main

type Options struct{ AllowedOrigins []string; AllowCredentials bool }

var o = Options{AllowedOrigins: []string{"*"}, AllowCredentials: true}
"#
            ),
            0
        );
    }

    #[test]
    fn test_constructor_evidence_only_for_known_constructors() {
        let findings = rule_findings(
            r#"package main

import (
	"fmt"

	"github.com/rs/cors"
)

func setup() {
	fmt.Println(cors.Options{AllowedOrigins: []string{"*"}, AllowCredentials: true})
}
"#,
            &RuleId::WILDCARD_CREDENTIALS,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0]
            .evidence
            .iter()
            .all(|e| e.role != EvidenceRole::Constructor));
    }

    #[test]
    fn test_options_checked_through_constructor() {
        let findings = rule_findings(
            r#"package main

import "github.com/rs/cors"

type corsOptions = cors.Options

var handler = cors.New(corsOptions{AllowedOrigins: []string{"*"}, AllowCredentials: true})
"#,
            &RuleId::WILDCARD_CREDENTIALS,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0]
            .evidence
            .iter()
            .any(|e| e.role == EvidenceRole::Constructor));
    }
}
