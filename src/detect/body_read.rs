//! Reading a request or response body to the end without a size cap.
//!
//! A read is safe when a limiter (`http.MaxBytesReader`, `io.LimitReader`)
//! wraps the same body value and runs before the read on every path, or
//! when the read's argument is itself a limiter call. Different limiters
//! may cover different paths.

use crate::analysis::{AccessPath, ArgFact, CallFact, FactKind, Pattern, ValueFact};
use crate::flow::FlowResolver;

use super::registry::{Candidate, DetectorError, DetectorSpec, MatchInput};
use super::{EvidenceRole, RuleId, Severity};

pub(super) fn detector() -> DetectorSpec {
    DetectorSpec {
        rule: RuleId::UNBOUNDED_BODY_READ,
        severity: Severity::Medium,
        title: "Unbounded body read",
        description: "A body is read to the end without a size limit guarding the read.",
        subscribes: &[FactKind::Call],
        predicate: matches,
        message_template: "{callee} reads {body} without a size limit applied on every path before it",
    }
}

/// What a read's argument turned out to be.
enum BodyValue {
    /// A body, known under these paths (the argument first).
    Body(Vec<AccessPath>),
    /// Already wrapped by a limiter.
    Limited,
    /// Not a body.
    Other,
}

fn matches(input: &MatchInput<'_>) -> Result<Vec<Candidate>, DetectorError> {
    let facts = input.facts;
    let limiters: Vec<&CallFact> = facts
        .calls_matching(|p| matches!(p, Pattern::BodyLimit { .. }))
        .collect();

    let mut out = Vec::new();
    for read in facts.calls_matching(|p| matches!(p, Pattern::BodyRead { .. })) {
        let Some(Pattern::BodyRead { arg }) = read.pattern else {
            continue;
        };
        let Some(argument) = read.arg(arg) else {
            continue;
        };
        let aliases = match classify(input, read, argument) {
            BodyValue::Body(aliases) => aliases,
            BodyValue::Limited | BodyValue::Other => continue,
        };

        let covering: Vec<&CallFact> = limiters
            .iter()
            .copied()
            .filter(|guard| covers(guard, &aliases))
            .collect();
        if input.resolver.calls_cover(&covering, read) {
            continue;
        }

        let mut candidate = Candidate::new(read.site)
            .evidence(read.site, EvidenceRole::BodyRead)
            .evidence(argument.node, EvidenceRole::Body)
            .var("callee", read.callee.clone())
            .var("body", aliases.last().map(|p| p.to_string()).unwrap_or_default());
        for guard in covering {
            candidate = candidate.evidence(guard.site, EvidenceRole::UnguardedLimiter);
        }
        out.push(candidate);
    }
    Ok(out)
}

/// Follow the read's argument through direct assignments until it is a body
/// field, a limiter call, or something else.
fn classify(input: &MatchInput<'_>, read: &CallFact, argument: &ArgFact) -> BodyValue {
    let resolver: &FlowResolver<'_> = input.resolver;
    let is_body = |path: &AccessPath| {
        path.last_field()
            .map(|f| input.config.body_fields.iter().any(|b| b == f))
            .unwrap_or(false)
    };

    let mut aliases = Vec::new();
    let mut value = argument.value.clone();
    let mut site = argument.node;
    let mut function = read.function;
    for _ in 0..=resolver.taint_depth() {
        match &value {
            ValueFact::Path(path) => {
                aliases.push(path.clone());
                return if is_body(path) {
                    BodyValue::Body(aliases)
                } else {
                    BodyValue::Other
                };
            }
            ValueFact::Call(call) => {
                let limited = input
                    .facts
                    .call(*call)
                    .map(|c| matches!(c.pattern, Some(Pattern::BodyLimit { .. })))
                    .unwrap_or(false);
                return if limited {
                    BodyValue::Limited
                } else {
                    BodyValue::Other
                };
            }
            ValueFact::Identifier(name) => {
                let target = AccessPath::variable(name.clone());
                let Some(def) = resolver.definition_before(&target, site, function) else {
                    return BodyValue::Other;
                };
                aliases.push(target);
                if def.tuple_index.map(|i| i != 0).unwrap_or(false) || def.compound {
                    return BodyValue::Other;
                }
                value = def.value_fact.clone();
                site = def.site;
                function = def.function;
            }
            _ => return BodyValue::Other,
        }
    }
    BodyValue::Other
}

/// Whether a limiter wraps, or is stored into, one of the body's paths.
/// A limiter whose result is thrown away limits nothing.
fn covers(guard: &CallFact, aliases: &[AccessPath]) -> bool {
    if guard.discarded {
        return false;
    }
    if guard.assigned_to.iter().any(|t| aliases.contains(t)) {
        return true;
    }
    let Some(Pattern::BodyLimit { arg }) = guard.pattern else {
        return false;
    };
    let wrapped = match guard.arg(arg).map(|a| &a.value) {
        Some(ValueFact::Path(path)) => path.clone(),
        Some(ValueFact::Identifier(name)) => AccessPath::variable(name.clone()),
        _ => return false,
    };
    aliases.contains(&wrapped)
}

#[cfg(all(test, feature = "tree-sitter"))]
mod tests {
    use crate::detect::test_support::rule_findings;
    use crate::detect::{EvidenceRole, RuleId};

    fn count(source: &str) -> usize {
        rule_findings(source, &RuleId::UNBOUNDED_BODY_READ).len()
    }

    #[test]
    fn test_unguarded_read() {
        let findings = rule_findings(
            r#"package main

import (
	"io"
	"net/http"
)

func handler(w http.ResponseWriter, r *http.Request) {
	data, _ := io.ReadAll(r.Body)
	w.Write(data)
}
"#,
            &RuleId::UNBOUNDED_BODY_READ,
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].site.line, 9);
        assert!(findings[0].message.contains("r.Body"));
        assert!(findings[0].message.starts_with("io.ReadAll"));
    }

    #[test]
    fn test_dominating_limiter() {
        assert_eq!(
            count(
                r#"package main

import (
	"io"
	"net/http"
)

func handler(w http.ResponseWriter, r *http.Request) {
	r.Body = http.MaxBytesReader(w, r.Body, 1<<20)
	if r.Method == "POST" {
		io.ReadAll(r.Body)
	}
}
"#
            ),
            0
        );
    }

    #[test]
    fn test_limiter_in_untaken_branch() {
        let findings = rule_findings(
            r#"package main

import (
	"io"
	"net/http"
)

func handler(w http.ResponseWriter, r *http.Request) {
	if r.ContentLength > 0 {
		r.Body = http.MaxBytesReader(w, r.Body, 1<<20)
	}
	io.ReadAll(r.Body)
}
"#,
            &RuleId::UNBOUNDED_BODY_READ,
        );
        assert_eq!(findings.len(), 1);
        assert!(findings[0]
            .evidence
            .iter()
            .any(|e| e.role == EvidenceRole::UnguardedLimiter));
    }

    #[test]
    fn test_limiters_in_both_arms() {
        assert_eq!(
            count(
                r#"package main

import (
	"io"
	"net/http"
)

func handler(w http.ResponseWriter, r *http.Request) {
	if r.Method == "POST" {
		r.Body = http.MaxBytesReader(w, r.Body, 1<<20)
	} else {
		r.Body = http.MaxBytesReader(w, r.Body, 1<<10)
	}
	io.ReadAll(r.Body)
}
"#
            ),
            0
        );
    }

    #[test]
    fn test_inline_and_variable_limiters() {
        assert_eq!(
            count(
                r#"package main

import (
	"encoding/json"
	"io"
	"net/http"
)

func handler(w http.ResponseWriter, r *http.Request) {
	io.ReadAll(io.LimitReader(r.Body, 4096))
	limited := http.MaxBytesReader(w, r.Body, 4096)
	json.NewDecoder(limited).Decode(&v)
}
"#
            ),
            0
        );
    }

    #[test]
    fn test_read_through_alias() {
        assert_eq!(
            count(
                r#"package main

import (
	"io"
	"net/http"
)

func handler(w http.ResponseWriter, r *http.Request) {
	body := r.Body
	io.ReadAll(body)
}
"#
            ),
            1
        );
    }

    #[test]
    fn test_limiter_on_other_body_does_not_guard() {
        assert_eq!(
            count(
                r#"package main

import (
	"io"
	"net/http"
)

func handler(w http.ResponseWriter, r *http.Request, other *http.Request) {
	other.Body = http.MaxBytesReader(w, other.Body, 10)
	io.ReadAll(r.Body)
}
"#
            ),
            1
        );
    }

    #[test]
    fn test_discarded_limiter_does_not_guard() {
        assert_eq!(
            count(
                r#"package main

import (
	"io"
	"net/http"
)

func handler(w http.ResponseWriter, r *http.Request) {
	http.MaxBytesReader(w, r.Body, 10)
	io.ReadAll(r.Body)
}
"#
            ),
            1
        );
    }

    #[test]
    fn test_non_body_reader_ignored() {
        assert_eq!(
            count(
                r#"package main

import (
	"io"
	"os"
)

func load(f *os.File) {
	io.ReadAll(f)
}
"#
            ),
            0
        );
    }
}
