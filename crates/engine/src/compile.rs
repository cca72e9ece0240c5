//! Compiles a [`TraceQuery`] into backend filter text.
//!
//! Two artifacts come out of a query: the trace-search `tags` parameter and
//! a LogQL expression over span log lines. Both are deterministic for a
//! given query; tags are emitted in key order.

use chrono::TimeDelta;
use spanbridge_core::error::{BridgeError, Result};
use spanbridge_core::filter::Dialect;
use spanbridge_core::ids::TraceIdentity;
use spanbridge_core::model::Attribute;
use spanbridge_core::query::TraceQuery;
use spanbridge_core::time::format_duration_literal;

use crate::normalize::render_token;

/// Field of the parsed log line the duration stages compare against.
pub const LATENCY_FIELD: &str = "latency";

const SEARCH_SERVICE_KEY: &str = "service.name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub search_filter: String,
    pub log_filter: String,
}

#[derive(Debug, Clone)]
pub struct QueryCompiler {
    dialect: Dialect,
    env_label: String,
}

impl QueryCompiler {
    pub fn new(dialect: Dialect, env_label: impl Into<String>) -> Self {
        Self {
            dialect,
            env_label: env_label.into(),
        }
    }

    pub fn compile(&self, query: &TraceQuery) -> Result<CompiledQuery> {
        query.validate()?;
        Ok(CompiledQuery {
            search_filter: self.search_filter(query),
            log_filter: self.log_filter(query)?,
        })
    }

    /// Trace-search `tags` value. Empty when the query has neither service
    /// nor tags.
    pub fn search_filter(&self, query: &TraceQuery) -> String {
        let service = query.service();
        if service.is_none() && query.tags.is_empty() {
            return String::new();
        }
        match self.dialect {
            Dialect::Standard => {
                let mut terms = Vec::with_capacity(query.tags.len() + 1);
                if let Some(service) = service {
                    terms.push(search_term(SEARCH_SERVICE_KEY, service));
                }
                terms.extend(query.tags.iter().map(|(k, v)| search_term(k, v)));
                terms.join(" ")
            }
            Dialect::Legacy => {
                let mut out = format!("{SEARCH_SERVICE_KEY}={}", service.unwrap_or_default());
                for (k, v) in &query.tags {
                    out.push('&');
                    out.push_str(k);
                    out.push('=');
                    out.push_str(v);
                }
                out
            }
        }
    }

    /// Search filter used to list a service's operations.
    pub fn service_search_filter(&self, service: &str) -> String {
        self.search_filter(&TraceQuery {
            service_name: Some(service.to_string()),
            ..TraceQuery::default()
        })
    }

    pub fn log_filter(&self, query: &TraceQuery) -> Result<String> {
        let mut selectors = vec![label_matcher("env", &self.env_label)];
        if let Some(service) = query.service() {
            selectors.push(label_matcher("service_name", service));
        }
        if let Some(operation) = query.operation() {
            selectors.push(label_matcher("operation_name", operation));
        }
        let mut out = format!("{{{}}}", selectors.join(", "));

        if query.tags.is_empty() && !query.has_duration_bounds() {
            return Ok(out);
        }
        out.push_str(" | logfmt");

        for (key, value) in &query.tags {
            let token = render_token(&Attribute::string(key, value));
            let pattern = format!(".*{}.*", regex::escape(&token));
            out.push_str(&format!(" |~ \"{}\"", escape_string(&pattern)));
        }
        if !query.duration_min.is_zero() {
            let literal = self.duration_literal(query.duration_min)?;
            out.push_str(&format!(" | {LATENCY_FIELD} > {literal}"));
        }
        if !query.duration_max.is_zero() {
            let literal = self.duration_literal(query.duration_max)?;
            out.push_str(&format!(" | {LATENCY_FIELD} < {literal}"));
        }
        Ok(out)
    }

    /// Log filter selecting the lines of one trace. Lines are matched on
    /// the low half; callers compare the high half after decoding.
    pub fn trace_lookup(&self, id: &TraceIdentity) -> String {
        format!(
            "{{{}}} |~ \"{}\"",
            label_matcher("env", &self.env_label),
            escape_string(&trace_line_pattern(id.low))
        )
    }

    fn duration_literal(&self, delta: TimeDelta) -> Result<String> {
        match self.dialect {
            Dialect::Standard => delta
                .num_nanoseconds()
                .map(|n| n.to_string())
                .ok_or_else(|| BridgeError::InvalidQuery(format!("duration out of range: {delta}"))),
            Dialect::Legacy => delta
                .to_std()
                .map(format_duration_literal)
                .map_err(|_| BridgeError::InvalidQuery(format!("negative duration: {delta}"))),
        }
    }
}

/// Line regex for a whole `trace_id_low` field equal to `low`, written
/// either as `key:value` or `key=value`, optionally quoted.
pub fn trace_line_pattern(low: u64) -> String {
    format!(r#"(^|\s)trace_id_low[:=]"?{low}"?(\s|$)"#)
}

fn label_matcher(label: &str, value: &str) -> String {
    format!("{label}=\"{}\"", escape_string(value))
}

fn search_term(key: &str, value: &str) -> String {
    if value.is_empty() || value.contains(|c: char| c.is_whitespace() || c == '"') {
        format!("{key}=\"{}\"", escape_string(value))
    } else {
        format!("{key}={value}")
    }
}

fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};

    use super::*;

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(Dialect::Standard, "prod")
    }

    fn query() -> TraceQuery {
        TraceQuery {
            service_name: Some("checkout".into()),
            operation_name: Some("GET /cart".into()),
            tags: BTreeMap::from([
                ("http.method".to_string(), "GET".to_string()),
                ("error".to_string(), "true".to_string()),
            ]),
            ..TraceQuery::default()
        }
    }

    #[test]
    fn empty_query_selects_environment_only() {
        let compiled = compiler().compile(&TraceQuery::default()).unwrap();
        assert_eq!(compiled.log_filter, r#"{env="prod"}"#);
        assert_eq!(compiled.search_filter, "");
    }

    #[test]
    fn service_and_tags() {
        let compiled = compiler().compile(&query()).unwrap();
        assert_eq!(
            compiled.search_filter,
            "service.name=checkout error=true http.method=GET"
        );
        assert_eq!(
            compiled.log_filter,
            r#"{env="prod", service_name="checkout", operation_name="GET /cart"} | logfmt |~ ".*error:true.*" |~ ".*http\\.method:GET.*""#
        );
    }

    #[test]
    fn blank_service_is_absent() {
        let q = TraceQuery {
            service_name: Some(String::new()),
            ..TraceQuery::default()
        };
        assert_eq!(compiler().log_filter(&q).unwrap(), r#"{env="prod"}"#);
    }

    #[test]
    fn minimum_duration_is_last_stage() {
        let q = TraceQuery {
            duration_min: TimeDelta::milliseconds(5),
            ..TraceQuery::default()
        };
        let filter = compiler().log_filter(&q).unwrap();
        assert_eq!(filter, r#"{env="prod"} | logfmt | latency > 5000000"#);
        assert!(filter.ends_with("| latency > 5000000"));
    }

    #[test]
    fn both_bounds_min_then_max() {
        let q = TraceQuery {
            duration_min: TimeDelta::milliseconds(5),
            duration_max: TimeDelta::seconds(2),
            ..TraceQuery::default()
        };
        assert_eq!(
            compiler().log_filter(&q).unwrap(),
            r#"{env="prod"} | logfmt | latency > 5000000 | latency < 2000000000"#
        );
    }

    #[test]
    fn legacy_dialect() {
        let legacy = QueryCompiler::new(Dialect::Legacy, "prod");
        let mut q = query();
        q.duration_min = TimeDelta::milliseconds(5);
        let compiled = legacy.compile(&q).unwrap();
        assert_eq!(
            compiled.search_filter,
            "service.name=checkout&error=true&http.method=GET"
        );
        assert!(compiled.log_filter.ends_with("| latency > 5ms"));
    }

    #[test]
    fn quoting_and_escaping() {
        let q = TraceQuery {
            service_name: Some("web \"edge\"".into()),
            tags: BTreeMap::from([("path".to_string(), "/a b".to_string())]),
            ..TraceQuery::default()
        };
        let compiled = compiler().compile(&q).unwrap();
        assert_eq!(
            compiled.search_filter,
            r#"service.name="web \"edge\"" path="/a b""#
        );
        assert!(
            compiled
                .log_filter
                .starts_with(r#"{env="prod", service_name="web \"edge\""}"#)
        );
    }

    #[test]
    fn invalid_queries_are_rejected() {
        let negative = TraceQuery {
            duration_min: TimeDelta::milliseconds(-1),
            ..TraceQuery::default()
        };
        assert!(matches!(
            compiler().compile(&negative),
            Err(BridgeError::InvalidQuery(_))
        ));

        let inverted = TraceQuery {
            duration_min: TimeDelta::seconds(2),
            duration_max: TimeDelta::seconds(1),
            ..TraceQuery::default()
        };
        assert!(matches!(
            compiler().compile(&inverted),
            Err(BridgeError::InvalidQuery(_))
        ));

        let window = TraceQuery {
            start_time_min: DateTime::<Utc>::from_timestamp(10, 0).unwrap(),
            start_time_max: DateTime::<Utc>::from_timestamp(5, 0).unwrap(),
            ..TraceQuery::default()
        };
        assert!(matches!(
            compiler().compile(&window),
            Err(BridgeError::InvalidQuery(_))
        ));
    }

    #[test]
    fn trace_lookup_matches_low_half() {
        assert_eq!(
            compiler().trace_lookup(&TraceIdentity::new(100, 9)),
            r#"{env="prod"} |~ "(^|\\s)trace_id_low[:=]\"?100\"?(\\s|$)""#
        );
    }

    #[test]
    fn trace_line_pattern_accepts_both_separators() {
        let re = regex::Regex::new(&trace_line_pattern(100)).unwrap();
        assert!(re.is_match("trace_id_low:100 trace_id_high:0 span_id:1"));
        assert!(re.is_match(r#"span_id=1 trace_id_low="100""#));
        assert!(re.is_match("span_id=1\ttrace_id_low=100"));
        assert!(!re.is_match("trace_id_low:1000 span_id:1"));
        assert!(!re.is_match("trace_id_low:2100"));
        assert!(!re.is_match("old_trace_id_low:100"));
    }

    #[test]
    fn operations_filter() {
        assert_eq!(compiler().service_search_filter("api"), "service.name=api");
    }
}
