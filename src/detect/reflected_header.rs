//! Request header values echoed into CORS response headers.
//!
//! Writing `Access-Control-Allow-Origin` from the request's own `Origin`
//! trusts every origin. The write is fine when a branch that checks the
//! value against an allow-list controls it.

use crate::analysis::{FactKind, Pattern};

use super::registry::{Candidate, DetectorError, DetectorSpec, MatchInput};
use super::{EvidenceRole, RuleId, Severity};

pub(super) fn detector() -> DetectorSpec {
    DetectorSpec {
        rule: RuleId::REFLECTED_HEADER,
        severity: Severity::High,
        title: "Reflected request header",
        description: "A request header value is written to a CORS response header without an allow-list check.",
        subscribes: &[FactKind::Call, FactKind::Definition, FactKind::Branch],
        predicate: matches,
        message_template: "{header} is set from request header {source} without an allow-list check",
    }
}

fn matches(input: &MatchInput<'_>) -> Result<Vec<Candidate>, DetectorError> {
    let resolver = input.resolver;
    let mut out = Vec::new();
    for set in input
        .facts
        .calls_matching(|p| matches!(p, Pattern::HeaderSet { .. }))
    {
        let Some(Pattern::HeaderSet {
            name_arg,
            value_arg,
        }) = set.pattern
        else {
            continue;
        };
        let (Some(name), Some(value)) = (set.arg(name_arg), set.arg(value_arg)) else {
            continue;
        };
        let Some(header) = resolver.resolve_str(&name.value, name.node, set.function) else {
            continue;
        };
        let watched = input
            .config
            .reflected_header_names
            .iter()
            .any(|h| h.eq_ignore_ascii_case(&header));
        if !watched {
            continue;
        }

        let Some(trace) = resolver.taint_origin(value.node, set.function) else {
            continue;
        };
        if resolver.is_allow_listed(&trace, set) {
            tracing::trace!(header = %header, "header write controlled by allow-list");
            continue;
        }

        let mut candidate = Candidate::new(set.site)
            .evidence(set.site, EvidenceRole::HeaderSet)
            .evidence(trace.source, EvidenceRole::Source)
            .var("header", header.clone())
            .var(
                "source",
                trace.header_name.clone().unwrap_or_else(|| "<dynamic>".to_string()),
            );
        // Carriers are recorded by name; point at the chain's identifiers.
        for &node in &trace.chain {
            if node != trace.source && input.unit.kind(node).identifier().is_some() {
                candidate = candidate.evidence(node, EvidenceRole::Carrier);
            }
        }
        out.push(candidate);
    }
    Ok(out)
}

#[cfg(all(test, feature = "tree-sitter"))]
mod tests {
    use crate::detect::test_support::rule_findings;
    use crate::detect::{EvidenceRole, RuleId};

    fn count(source: &str) -> usize {
        rule_findings(source, &RuleId::REFLECTED_HEADER).len()
    }

    #[test]
    fn test_direct_reflection() {
        let findings = rule_findings(
            r#"package main

import "net/http"

func handler(w http.ResponseWriter, r *http.Request) {
	w.Header().Set("Access-Control-Allow-Origin", r.Header.Get("Origin"))
}
"#,
            &RuleId::REFLECTED_HEADER,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].site.line, 6);
        assert_eq!(
            findings[0].message,
            "Access-Control-Allow-Origin is set from request header Origin without an allow-list check"
        );
        let roles: Vec<EvidenceRole> = findings[0].evidence.iter().map(|e| e.role).collect();
        assert!(roles.contains(&EvidenceRole::HeaderSet));
        assert!(roles.contains(&EvidenceRole::Source));
    }

    #[test]
    fn test_through_variable_records_carrier() {
        let findings = rule_findings(
            r#"package main

import "net/http"

func handler(w http.ResponseWriter, r *http.Request) {
	origin := r.Header.Get("Origin")
	w.Header().Add("access-control-allow-origin", origin)
}
"#,
            &RuleId::REFLECTED_HEADER,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0]
            .evidence
            .iter()
            .any(|e| e.role == EvidenceRole::Carrier));
    }

    #[test]
    fn test_allow_list_suppresses() {
        assert_eq!(
            count(
                r#"package main

import "net/http"

var allowed = map[string]bool{"https://a.example": true}

func handler(w http.ResponseWriter, r *http.Request) {
	origin := r.Header.Get("Origin")
	if !allowed[origin] {
		return
	}
	w.Header().Set("Access-Control-Allow-Origin", origin)
}
"#
            ),
            0
        );
    }

    #[test]
    fn test_unrelated_header_check_is_not_allow_list() {
        assert_eq!(
            count(
                r#"package main

import "net/http"

func handler(w http.ResponseWriter, r *http.Request) {
	origin := r.Header.Get("Origin")
	if r.Header.Get("X-Debug") == "1" {
		return
	}
	w.Header().Set("Access-Control-Allow-Origin", origin)
}
"#
            ),
            1
        );
    }

    #[test]
    fn test_emptiness_check_is_not_allow_list() {
        assert_eq!(
            count(
                r#"package main

import "net/http"

func handler(w http.ResponseWriter, r *http.Request) {
	origin := r.Header.Get("Origin")
	if origin != "" {
		w.Header().Set("Access-Control-Allow-Origin", origin)
	}
}
"#
            ),
            1
        );
    }

    #[test]
    fn test_other_headers_and_constants_ignored() {
        assert_eq!(
            count(
                r#"package main

import "net/http"

func handler(w http.ResponseWriter, r *http.Request) {
	w.Header().Set("X-Request-Id", r.Header.Get("X-Request-Id"))
	w.Header().Set("Access-Control-Allow-Origin", "https://a.example")
}
"#
            ),
            0
        );
    }

    #[test]
    fn test_header_name_from_constant() {
        assert_eq!(
            count(
                r#"package main

import "net/http"

const acao = "Access-Control-Allow-Origin"

func handler(w http.ResponseWriter, r *http.Request) {
	w.Header().Set(acao, r.Header.Get("Origin"))
}
"#
            ),
            1
        );
    }
}
