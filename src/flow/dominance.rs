//! Order queries between calls of one function.

use crate::analysis::{CallFact, NodeId};

use super::FlowResolver;

impl<'a> FlowResolver<'a> {
    /// Whether `guard` runs before `sink` on every path from function entry.
    ///
    /// Calls in different functions never dominate each other. A deferred
    /// guard runs at function exit, so it guards nothing. Two calls in the
    /// same statement are ordered by evaluation: the call whose expression
    /// ends first has finished first (arguments before the call they feed).
    pub fn call_dominates(&self, guard: &CallFact, sink: &CallFact) -> bool {
        if guard.site == sink.site || guard.deferred {
            return false;
        }
        let (Some(gf), Some(sf)) = (guard.function, sink.function) else {
            return false;
        };
        if gf != sf {
            return false;
        }
        let (Some(gs), Some(ss)) = (guard.statement, sink.statement) else {
            return false;
        };
        if gs == ss {
            let guard_span = self.unit.span(guard.site);
            let sink_span = self.unit.span(sink.site);
            return guard_span.end_byte <= sink_span.end_byte;
        }
        self.facts.function(gf).graph.dominates(gs, ss)
    }

    /// Whether every path from function entry to `sink` runs at least one of
    /// `guards` first. No single guard has to dominate: limiters in both
    /// arms of an `if`/`else` cover a read after it together.
    pub fn calls_cover(&self, guards: &[&CallFact], sink: &CallFact) -> bool {
        if guards.iter().any(|g| self.call_dominates(g, sink)) {
            return true;
        }
        let (Some(function), Some(statement)) = (sink.function, sink.statement) else {
            return false;
        };
        // Guards sharing the sink's statement either dominate it or run after it.
        let avoid: Vec<NodeId> = guards
            .iter()
            .filter(|g| !g.deferred && g.function == Some(function))
            .filter_map(|g| g.statement)
            .filter(|&s| s != statement)
            .collect();
        if avoid.is_empty() {
            return false;
        }
        !self
            .facts
            .function(function)
            .graph
            .reachable_avoiding_all(statement, &avoid)
    }
}

#[cfg(all(test, feature = "tree-sitter"))]
mod tests {
    use super::super::test_support::load;
    use super::*;
    use crate::analysis::Pattern;

    fn guards_cover_read(source: &str) -> bool {
        let (unit, facts, apis) = load(source);
        let resolver = FlowResolver::new(&unit, &facts, &apis, 3);
        let guards: Vec<&CallFact> = facts
            .calls_matching(|p| matches!(p, Pattern::BodyLimit { .. }))
            .collect();
        let read = facts
            .calls_matching(|p| matches!(p, Pattern::BodyRead { .. }))
            .next()
            .unwrap();
        resolver.calls_cover(&guards, read)
    }

    fn guard_dominates_read(source: &str) -> bool {
        let (unit, facts, apis) = load(source);
        let resolver = FlowResolver::new(&unit, &facts, &apis, 3);
        let guard = facts
            .calls_matching(|p| matches!(p, Pattern::BodyLimit { .. }))
            .next()
            .unwrap();
        let read = facts
            .calls_matching(|p| matches!(p, Pattern::BodyRead { .. }))
            .next()
            .unwrap();
        resolver.call_dominates(guard, read)
    }

    #[test]
    fn test_straight_line_guard_dominates() {
        assert!(guard_dominates_read(
            r#"package main

import ("io"; "net/http")

func h(w http.ResponseWriter, r *http.Request) {
	r.Body = http.MaxBytesReader(w, r.Body, 1<<20)
	io.ReadAll(r.Body)
}
"#
        ));
    }

    #[test]
    fn test_guard_in_one_branch_does_not_dominate() {
        assert!(!guard_dominates_read(
            r#"package main

import ("io"; "net/http")

func h(w http.ResponseWriter, r *http.Request, big bool) {
	if big {
		r.Body = http.MaxBytesReader(w, r.Body, 1<<20)
	}
	io.ReadAll(r.Body)
}
"#
        ));
    }

    #[test]
    fn test_guard_after_read_does_not_dominate() {
        assert!(!guard_dominates_read(
            r#"package main

import ("io"; "net/http")

func h(w http.ResponseWriter, r *http.Request) {
	io.ReadAll(r.Body)
	r.Body = http.MaxBytesReader(w, r.Body, 1<<20)
}
"#
        ));
    }

    #[test]
    fn test_nested_argument_guard_dominates() {
        assert!(guard_dominates_read(
            r#"package main

import "io"

func h(body io.Reader) {
	io.ReadAll(io.LimitReader(body, 4096))
}
"#
        ));
    }

    #[test]
    fn test_deferred_guard_does_not_dominate() {
        assert!(!guard_dominates_read(
            r#"package main

import ("io"; "net/http")

func h(w http.ResponseWriter, r *http.Request) {
	defer http.MaxBytesReader(w, r.Body, 1)
	io.ReadAll(r.Body)
}
"#
        ));
    }

    #[test]
    fn test_guards_in_both_arms_cover() {
        assert!(guards_cover_read(
            r#"package main

import ("io"; "net/http")

func h(w http.ResponseWriter, r *http.Request, big bool) {
	if big {
		r.Body = http.MaxBytesReader(w, r.Body, 1<<20)
	} else {
		r.Body = http.MaxBytesReader(w, r.Body, 1<<10)
	}
	io.ReadAll(r.Body)
}
"#
        ));
    }

    #[test]
    fn test_guards_in_some_switch_cases_do_not_cover() {
        assert!(!guards_cover_read(
            r#"package main

import ("io"; "net/http")

func h(w http.ResponseWriter, r *http.Request) {
	switch r.Method {
	case "POST":
		r.Body = http.MaxBytesReader(w, r.Body, 1<<20)
	case "PUT":
		r.Body = http.MaxBytesReader(w, r.Body, 1<<10)
	}
	io.ReadAll(r.Body)
}
"#
        ));
    }

    #[test]
    fn test_guards_after_read_do_not_cover() {
        assert!(!guards_cover_read(
            r#"package main

import ("io"; "net/http")

func h(w http.ResponseWriter, r *http.Request, big bool) {
	io.ReadAll(r.Body)
	if big {
		r.Body = http.MaxBytesReader(w, r.Body, 1<<20)
	} else {
		r.Body = http.MaxBytesReader(w, r.Body, 1<<10)
	}
}
"#
        ));
    }
}
