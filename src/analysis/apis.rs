//! Known library entry points.
//!
//! Call targets are looked up by qualified name (`import/path.Func`) or, for
//! methods whose receiver type is unknown, by selector suffix
//! (`Header().Set`). Each maps to a small [`Pattern`] descriptor. The tables
//! are built once per run from the built-ins plus [`ApiOverrides`] and never
//! mutated afterwards.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::AccessPath;

/// What a recognized call does, and which arguments matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pattern {
    /// Reads a body to its end; `arg` is the reader.
    BodyRead { arg: usize },
    /// Wraps a reader with a size cap; `arg` is the wrapped reader.
    BodyLimit { arg: usize },
    /// Builds CORS middleware from an options value at `arg`.
    CorsConstructor { arg: usize },
    /// Sets an outbound response header.
    HeaderSet { name_arg: usize, value_arg: usize },
    /// Reads an inbound request header.
    HeaderGet { name_arg: usize },
    /// Never returns.
    Terminator,
}

/// Field names of a CORS options type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsShape {
    /// Fields holding allowed origins (a list, or a single string).
    #[serde(default)]
    pub origin_fields: Vec<String>,
    /// Boolean fields that allow every origin when true.
    #[serde(default)]
    pub allow_all_fields: Vec<String>,
    /// Boolean fields that enable credentialed requests.
    #[serde(default)]
    pub credential_fields: Vec<String>,
}

impl CorsShape {
    fn new(origins: &[&str], allow_all: &[&str], credentials: &[&str]) -> Self {
        Self {
            origin_fields: origins.iter().map(|s| s.to_string()).collect(),
            allow_all_fields: allow_all.iter().map(|s| s.to_string()).collect(),
            credential_fields: credentials.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A size-limiting wrapper entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterEntry {
    pub name: String,
    /// Position of the wrapped reader argument.
    #[serde(default)]
    pub arg: usize,
}

/// User additions to the built-in tables, read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiOverrides {
    /// Qualified names of functions that read their first argument fully.
    pub body_readers: Vec<String>,
    pub body_limiters: Vec<LimiterEntry>,
    /// Qualified names of functions that never return.
    pub terminators: Vec<String>,
    /// Selector suffixes that set a response header (`name, value`).
    pub header_setters: Vec<String>,
    /// Selector suffixes that read a request header (`name`).
    pub header_getters: Vec<String>,
    /// Qualified type name -> CORS field layout.
    pub cors_types: BTreeMap<String, CorsShape>,
}

static BUILTIN_CALLS: &[(&str, Pattern)] = &[
    ("io.ReadAll", Pattern::BodyRead { arg: 0 }),
    ("io/ioutil.ReadAll", Pattern::BodyRead { arg: 0 }),
    ("encoding/json.NewDecoder", Pattern::BodyRead { arg: 0 }),
    ("encoding/xml.NewDecoder", Pattern::BodyRead { arg: 0 }),
    ("net/http.MaxBytesReader", Pattern::BodyLimit { arg: 1 }),
    ("io.LimitReader", Pattern::BodyLimit { arg: 0 }),
    ("github.com/rs/cors.New", Pattern::CorsConstructor { arg: 0 }),
    ("github.com/go-chi/cors.New", Pattern::CorsConstructor { arg: 0 }),
    ("github.com/go-chi/cors.Handler", Pattern::CorsConstructor { arg: 0 }),
    ("github.com/gin-contrib/cors.New", Pattern::CorsConstructor { arg: 0 }),
    (
        "github.com/labstack/echo/v4/middleware.CORSWithConfig",
        Pattern::CorsConstructor { arg: 0 },
    ),
    (
        "github.com/gofiber/fiber/v2/middleware/cors.New",
        Pattern::CorsConstructor { arg: 0 },
    ),
    ("panic", Pattern::Terminator),
    ("os.Exit", Pattern::Terminator),
    ("log.Fatal", Pattern::Terminator),
    ("log.Fatalf", Pattern::Terminator),
    ("log.Fatalln", Pattern::Terminator),
    ("log.Panic", Pattern::Terminator),
    ("log.Panicf", Pattern::Terminator),
    ("log.Panicln", Pattern::Terminator),
];

static BUILTIN_METHODS: &[(&str, Pattern)] = &[
    (
        "Header().Set",
        Pattern::HeaderSet {
            name_arg: 0,
            value_arg: 1,
        },
    ),
    (
        "Header().Add",
        Pattern::HeaderSet {
            name_arg: 0,
            value_arg: 1,
        },
    ),
    ("Header.Get", Pattern::HeaderGet { name_arg: 0 }),
    ("Header.Values", Pattern::HeaderGet { name_arg: 0 }),
];

static BUILTIN_CORS_TYPES: Lazy<Vec<(&'static str, CorsShape)>> = Lazy::new(|| {
    vec![
        (
            "github.com/rs/cors.Options",
            CorsShape::new(&["AllowedOrigins"], &[], &["AllowCredentials"]),
        ),
        (
            "github.com/go-chi/cors.Options",
            CorsShape::new(&["AllowedOrigins"], &[], &["AllowCredentials"]),
        ),
        (
            "github.com/gin-contrib/cors.Config",
            CorsShape::new(&["AllowOrigins"], &["AllowAllOrigins"], &["AllowCredentials"]),
        ),
        (
            "github.com/labstack/echo/v4/middleware.CORSConfig",
            CorsShape::new(&["AllowOrigins"], &[], &["AllowCredentials"]),
        ),
        (
            "github.com/gofiber/fiber/v2/middleware/cors.Config",
            CorsShape::new(&["AllowOrigins"], &[], &["AllowCredentials"]),
        ),
    ]
});

/// Immutable lookup tables for one analysis run.
#[derive(Debug, Clone)]
pub struct KnownApis {
    calls: BTreeMap<String, Pattern>,
    /// Selector suffix, split into segments, and its pattern.
    methods: Vec<(Vec<String>, Pattern)>,
    cors_types: BTreeMap<String, CorsShape>,
}

impl Default for KnownApis {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KnownApis {
    /// The built-in tables.
    pub fn builtin() -> Self {
        Self::with_overrides(&ApiOverrides::default())
    }

    /// Built-ins plus user additions. Additions win on conflict.
    pub fn with_overrides(overrides: &ApiOverrides) -> Self {
        let mut calls: BTreeMap<String, Pattern> = BUILTIN_CALLS
            .iter()
            .map(|(name, pattern)| (name.to_string(), *pattern))
            .collect();
        for name in &overrides.body_readers {
            calls.insert(name.clone(), Pattern::BodyRead { arg: 0 });
        }
        for entry in &overrides.body_limiters {
            calls.insert(entry.name.clone(), Pattern::BodyLimit { arg: entry.arg });
        }
        for name in &overrides.terminators {
            calls.insert(name.clone(), Pattern::Terminator);
        }

        let mut methods: BTreeMap<String, Pattern> = BUILTIN_METHODS
            .iter()
            .map(|(name, pattern)| (name.to_string(), *pattern))
            .collect();
        for name in &overrides.header_setters {
            methods.insert(
                name.clone(),
                Pattern::HeaderSet {
                    name_arg: 0,
                    value_arg: 1,
                },
            );
        }
        for name in &overrides.header_getters {
            methods.insert(name.clone(), Pattern::HeaderGet { name_arg: 0 });
        }
        // Longest selectors first so the most specific entry wins.
        let mut methods: Vec<(Vec<String>, Pattern)> = methods
            .into_iter()
            .map(|(name, pattern)| (AccessPath::split_selector(&name), pattern))
            .collect();
        methods.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let mut cors_types: BTreeMap<String, CorsShape> = BUILTIN_CORS_TYPES
            .iter()
            .map(|(name, shape)| (name.to_string(), shape.clone()))
            .collect();
        for (name, shape) in &overrides.cors_types {
            cors_types.insert(name.clone(), shape.clone());
        }

        Self {
            calls,
            methods,
            cors_types,
        }
    }

    /// Pattern for a fully qualified function name.
    pub fn call(&self, qualified: &str) -> Option<Pattern> {
        self.calls.get(qualified).copied()
    }

    /// Pattern for a method call, matched on the trailing selector segments
    /// of the callee path (the root variable is never part of the match).
    pub fn method(&self, callee: &AccessPath) -> Option<Pattern> {
        let rendered = callee.segment_strings();
        self.methods
            .iter()
            .find(|(suffix, _)| {
                suffix.len() <= rendered.len() && rendered[rendered.len() - suffix.len()..] == suffix[..]
            })
            .map(|(_, pattern)| *pattern)
    }

    pub fn cors_shape(&self, qualified_type: &str) -> Option<&CorsShape> {
        self.cors_types.get(qualified_type)
    }

    /// Options layout taken by a known CORS constructor: the CORS type
    /// declared in the constructor's own package.
    pub fn constructor_shape(&self, qualified_call: &str) -> Option<&CorsShape> {
        if !matches!(self.call(qualified_call), Some(Pattern::CorsConstructor { .. })) {
            return None;
        }
        let (package, _) = qualified_call.rsplit_once('.')?;
        self.cors_types
            .iter()
            .find(|(name, _)| name.rsplit_once('.').map(|(p, _)| p) == Some(package))
            .map(|(_, shape)| shape)
    }

    pub fn is_known_call(&self, qualified: &str) -> bool {
        self.calls.contains_key(qualified)
    }

    pub fn is_known_type(&self, qualified_type: &str) -> bool {
        self.cors_types.contains_key(qualified_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PathSegment;

    fn path(root: &str, segments: &[PathSegment]) -> AccessPath {
        AccessPath {
            root: root.to_string(),
            segments: segments.to_vec(),
        }
    }

    #[test]
    fn test_builtin_calls() {
        let apis = KnownApis::builtin();
        assert_eq!(apis.call("io.ReadAll"), Some(Pattern::BodyRead { arg: 0 }));
        assert_eq!(
            apis.call("net/http.MaxBytesReader"),
            Some(Pattern::BodyLimit { arg: 1 })
        );
        assert_eq!(apis.call("fmt.Println"), None);
    }

    #[test]
    fn test_method_suffix_match() {
        let apis = KnownApis::builtin();
        let set = path(
            "w",
            &[
                PathSegment::Call("Header".to_string()),
                PathSegment::Field("Set".to_string()),
            ],
        );
        assert!(matches!(apis.method(&set), Some(Pattern::HeaderSet { .. })));

        let get = path(
            "resp",
            &[
                PathSegment::Field("Request".to_string()),
                PathSegment::Field("Header".to_string()),
                PathSegment::Field("Get".to_string()),
            ],
        );
        assert!(matches!(apis.method(&get), Some(Pattern::HeaderGet { .. })));

        // Reading a response header is not an inbound source.
        let response_get = path(
            "w",
            &[
                PathSegment::Call("Header".to_string()),
                PathSegment::Field("Get".to_string()),
            ],
        );
        assert_eq!(apis.method(&response_get), None);
    }

    #[test]
    fn test_overrides_extend_tables() {
        let overrides = ApiOverrides {
            body_readers: vec!["example.com/util.Slurp".to_string()],
            header_getters: vec!["Headers.Fetch".to_string()],
            ..Default::default()
        };
        let apis = KnownApis::with_overrides(&overrides);
        assert_eq!(
            apis.call("example.com/util.Slurp"),
            Some(Pattern::BodyRead { arg: 0 })
        );
        let fetch = path(
            "req",
            &[
                PathSegment::Field("Headers".to_string()),
                PathSegment::Field("Fetch".to_string()),
            ],
        );
        assert!(matches!(apis.method(&fetch), Some(Pattern::HeaderGet { .. })));
        assert!(apis.is_known_type("github.com/rs/cors.Options"));
    }

    #[test]
    fn test_constructor_shape_comes_from_its_package() {
        let apis = KnownApis::builtin();
        let echo = apis
            .constructor_shape("github.com/labstack/echo/v4/middleware.CORSWithConfig")
            .unwrap();
        assert_eq!(echo.origin_fields, vec!["AllowOrigins".to_string()]);
        assert!(apis.constructor_shape("github.com/rs/cors.New").is_some());
        assert!(apis.constructor_shape("io.ReadAll").is_none());
    }
}
