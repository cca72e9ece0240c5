use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use testkit::{MockBackend, loki_body, otlp_trace_body, sample_trace_lines, search_body};

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_spanbridge")
}

/// Runs the binary with configuration isolated to `config`.
fn run(config: &Path, args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(bin());
    cmd.args(args)
        .env("SPANBRIDGE_CONFIG", config)
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT");
    for (k, v) in env {
        cmd.env(k, v);
    }
    cmd.output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn handle_of(output: &Output) -> String {
    stdout(output)
        .lines()
        .find_map(|l| l.strip_prefix("handle="))
        .map(str::to_string)
        .expect("handle line")
}

#[test]
fn compile_prints_both_filters() {
    let temp = tempfile::tempdir().unwrap();
    let output = run(
        &temp.path().join("missing.toml"),
        &[
            "compile",
            "--service",
            "api",
            "--tag",
            "error=true",
            "--min-duration",
            "5ms",
        ],
        &[],
    );
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("search_filter=service.name=api error=true"));
    assert!(out.contains(
        r#"log_filter={env="prod", service_name="api"} | logfmt |~ ".*error:true.*" | latency > 5000000"#
    ));
    assert!(!out.contains("handle="));
}

#[test]
fn compile_uses_legacy_dialect_flag() {
    let temp = tempfile::tempdir().unwrap();
    let output = run(
        &temp.path().join("missing.toml"),
        &[
            "--dialect",
            "legacy",
            "compile",
            "--service",
            "api",
            "--min-duration",
            "5ms",
        ],
        &[],
    );
    let out = stdout(&output);
    assert!(out.contains("search_filter=service.name=api\n"));
    assert!(out.ends_with("| latency > 5ms\n"));
}

#[test]
fn bad_dialect_fails() {
    let temp = tempfile::tempdir().unwrap();
    let output = run(
        &temp.path().join("missing.toml"),
        &["--dialect", "klingon", "compile"],
        &[],
    );
    assert!(!output.status.success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn services_from_config_file() {
    let mock = MockBackend::new().with_services(&["api", "cache"]);
    let addr = mock.spawn().await.unwrap();

    let temp = tempfile::tempdir().unwrap();
    let config = temp.path().join("config.toml");
    std::fs::write(
        &config,
        format!("tempo_url = \"http://{addr}\"\nrequest_timeout = \"5s\"\n"),
    )
    .unwrap();

    let output = run(&config, &["services"], &[]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("api\n"));
    assert!(out.contains("-- 2 services --"));
    assert!(out.contains("handle="));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trace_then_replay_handle_as_json() {
    let mock = MockBackend::new().with_loki(
        r#"[:=]\"?100\"?"#,
        loki_body(&sample_trace_lines(100)),
    );
    let addr = mock.spawn().await.unwrap();
    let loki_url = format!("http://{addr}");
    let temp = tempfile::tempdir().unwrap();
    let config = temp.path().join("missing.toml");

    let output = run(&config, &["--loki-url", &loki_url, "trace", "64"], &[]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("TRACE 00000000000000000000000000000064"));
    assert!(out.contains("spans=2 errors=1 services=api,cache"));
    assert!(out.contains("  cache cache.get redis (700ms)"));

    let handle = handle_of(&output);
    let replay = run(
        &config,
        &["--json", "--loki-url", &loki_url, "handle", &handle],
        &[],
    );
    assert!(replay.status.success());
    let json: Value = serde_json::from_slice(&replay.stdout).unwrap();
    let spans = json["Trace"]["spans"].as_array().unwrap();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0]["trace_id"]["low"], 100);
    assert_eq!(json["Trace"]["process_map"][1]["process"]["service_name"], "cache");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn search_over_trace_search_backend() {
    let mock = MockBackend::new()
        .with_search(search_body(&[("abc", "api", "api.handle")]))
        .with_trace("abc", otlp_trace_body("abc", &["api", "db"]));
    let addr = mock.spawn().await.unwrap();
    let temp = tempfile::tempdir().unwrap();
    let url = format!("http://{addr}");

    let output = run(
        &temp.path().join("missing.toml"),
        &["--json", "search", "--service", "api", "--since", "2h"],
        &[
            ("SPANBRIDGE_TEMPO_URL", url.as_str()),
            ("SPANBRIDGE_SEARCH_BACKEND", "tempo"),
        ],
    );
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    let traces = json["Traces"].as_array().unwrap();
    assert_eq!(traces.len(), 1);
    assert_eq!(traces[0]["spans"].as_array().unwrap().len(), 2);

    let search = &mock.requests_to("/api/search")[0];
    assert_eq!(search.params["tags"], "service.name=api");
    assert_eq!(search.params["limit"], "20");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trace_ids_against_down_backend_is_empty() {
    let addr = testkit::closed_addr().unwrap();
    let temp = tempfile::tempdir().unwrap();
    let url = format!("http://{addr}");

    let output = run(
        &temp.path().join("missing.toml"),
        &["--loki-url", &url, "trace-ids", "--service", "api"],
        &[],
    );
    assert!(output.status.success());
    assert!(stdout(&output).contains("-- 0 trace ids --"));
}
