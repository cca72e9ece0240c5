use std::collections::{HashMap, HashSet};
use std::io::IsTerminal;

use chrono::SecondsFormat;
use owo_colors::OwoColorize;
use spanbridge_core::ids::{SpanIdentity, TraceIdentity};
use spanbridge_core::model::{AssembledTrace, AttributeValue, DecodedSpan};
use spanbridge_core::query::Operation;
use spanbridge_engine::normalize::render_tokens;

pub fn print_services_human(services: &[String]) {
    for service in services {
        println!("{}", paint_service(service));
    }
    println!("-- {} services --", services.len());
}

pub fn print_operations_human(ops: &[Operation]) {
    for op in ops {
        println!("{}", op.name);
    }
    println!("-- {} operations --", ops.len());
}

pub fn print_trace_human(trace: &AssembledTrace) {
    let Some(trace_id) = trace.trace_id() else {
        println!("TRACE not found");
        return;
    };
    let duration_ms = trace
        .time_bounds()
        .map(|(start, end)| (end - start).num_milliseconds())
        .unwrap_or(0);
    let errors = trace.spans.iter().filter(|s| is_error(s)).count();
    let start = trace
        .time_bounds()
        .map(|(start, _)| start.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "TRACE {trace_id} start={start} duration={duration_ms}ms spans={} errors={errors} services={}",
        trace.spans.len(),
        trace.services().join(",")
    );
    print_span_tree(&trace.spans);
}

pub fn print_traces_human(traces: &[AssembledTrace]) {
    for trace in traces {
        print_trace_human(trace);
    }
    println!("-- {} traces --", traces.len());
}

pub fn print_trace_ids_human(ids: &[TraceIdentity]) {
    for id in ids {
        println!("{id}");
    }
    println!("-- {} trace ids --", ids.len());
}

pub fn print_compiled_human(search_filter: &str, log_filter: &str) {
    println!("search_filter={search_filter}");
    println!("log_filter={log_filter}");
}

fn is_error(span: &DecodedSpan) -> bool {
    span.tags.iter().any(|t| {
        t.key == "error"
            && match &t.value {
                AttributeValue::Bool(b) => *b,
                AttributeValue::String(s) => s == "true",
                _ => false,
            }
    })
}

fn paint_service(name: &str) -> String {
    if std::io::stdout().is_terminal() {
        name.cyan().to_string()
    } else {
        name.to_string()
    }
}

/// Spans without a parent, or whose parent is not in the trace, are roots.
/// Spans no root reaches, such as members of a parent cycle, are printed
/// as extra roots. A span id is expanded once even if it repeats.
fn print_span_tree(spans: &[DecodedSpan]) {
    for line in span_tree_lines(spans) {
        println!("{line}");
    }
}

fn span_tree_lines(spans: &[DecodedSpan]) -> Vec<String> {
    let known: HashSet<SpanIdentity> = spans.iter().map(|s| s.span_id).collect();
    let mut children: HashMap<Option<SpanIdentity>, Vec<usize>> = HashMap::new();
    for (idx, span) in spans.iter().enumerate() {
        let parent = span.parent_span_id.filter(|p| known.contains(p) && *p != span.span_id);
        children.entry(parent).or_default().push(idx);
    }

    let mut tree = SpanTree {
        spans,
        children,
        printed: vec![false; spans.len()],
        expanded: HashSet::new(),
        lines: Vec::with_capacity(spans.len()),
    };
    let roots = tree.children.get(&None).cloned().unwrap_or_default();
    for root in roots {
        tree.walk(root, 0);
    }
    for idx in 0..spans.len() {
        if !tree.printed[idx] {
            tree.walk(idx, 0);
        }
    }
    tree.lines
}

struct SpanTree<'a> {
    spans: &'a [DecodedSpan],
    children: HashMap<Option<SpanIdentity>, Vec<usize>>,
    printed: Vec<bool>,
    expanded: HashSet<SpanIdentity>,
    lines: Vec<String>,
}

impl SpanTree<'_> {
    fn walk(&mut self, idx: usize, depth: usize) {
        let spans = self.spans;
        let span = &spans[idx];
        self.printed[idx] = true;
        self.lines.push(format_span_line(span, depth));

        if depth > 64 || !self.expanded.insert(span.span_id) {
            return;
        }
        let kids = self
            .children
            .get(&Some(span.span_id))
            .cloned()
            .unwrap_or_default();
        for child in kids {
            if !self.printed[child] {
                self.walk(child, depth + 1);
            }
        }
    }
}

fn format_span_line(span: &DecodedSpan, depth: usize) -> String {
    let indent = "  ".repeat(depth);
    let status = if is_error(span) {
        if std::io::stdout().is_terminal() {
            " ERROR".red().to_string()
        } else {
            " ERROR".to_string()
        }
    } else {
        String::new()
    };
    format!(
        "{}{} {} ({}ms){} {}",
        indent,
        paint_service(&span.process.service_name),
        span.operation_name,
        span.duration_ms(),
        status,
        render_tokens(&span.tags)
    )
}
