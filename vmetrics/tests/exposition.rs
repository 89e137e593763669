use std::sync::Arc;
use std::time::Duration;

use vmetrics::{add_extra_labels, Set};

fn populated_set() -> Set {
    let set = Set::new();
    set.new_counter(r#"requests_total{path="/b"}"#).inc();
    set.new_counter(r#"requests_total{path="/a"}"#).add(3);
    set.new_settable_gauge("temperature").set(21.5);
    set.new_gauge("answer", || 42.0);
    set.new_float_counter("bytes_total").add(1.5);

    let fixed = set.new_fixed_bucket_histogram("fixed", &[1.0, 5.0]);
    for v in [0.5, 3.0, 7.0] {
        fixed.update(v);
    }

    let summary = set.new_summary_ext("latency", Duration::from_secs(60), &[0.0, 1.0]);
    for v in [1.0, 2.0, 3.0] {
        summary.update(v);
    }

    // Registered but never updated, so invisible.
    set.new_histogram("idle_seconds");
    set.new_summary("idle_summary");

    set
}

#[test]
fn test_full_exposition_with_metadata() {
    let expected = "# HELP answer\n\
# TYPE answer gauge\n\
answer 42\n\
# HELP bytes_total\n\
# TYPE bytes_total counter\n\
bytes_total 1.5\n\
# HELP fixed\n\
# TYPE fixed histogram\n\
fixed_bucket{le=\"1\"} 1\n\
fixed_bucket{le=\"5\"} 2\n\
fixed_bucket{le=\"+Inf\"} 3\n\
fixed_sum 10.5\n\
fixed_count 3\n\
# HELP latency\n\
# TYPE latency summary\n\
latency{quantile=\"0\"} 1\n\
latency{quantile=\"1\"} 3\n\
latency_sum 6\n\
latency_count 3\n\
# HELP requests_total\n\
# TYPE requests_total counter\n\
requests_total{path=\"/a\"} 3\n\
requests_total{path=\"/b\"} 1\n\
# HELP temperature\n\
# TYPE temperature gauge\n\
temperature 21.5\n";

    assert_eq!(populated_set().render(true), expected);
}

#[test]
fn test_exposition_without_metadata_has_no_comments() {
    let output = populated_set().render(false);
    assert!(!output.contains('#'));
    assert_eq!(output.lines().count(), 14);
    assert!(!output.contains("idle"));
}

#[test]
fn test_extra_labels_apply_to_every_sample() {
    let set = Set::new();
    set.new_counter("foo").set(1234);
    set.new_float_counter(r#"bar{a="b"}"#).set(42.12);

    let output = add_extra_labels(&set.render(true), r#"instance="host:1""#);
    let expected = "# HELP bar\n\
# TYPE bar counter\n\
bar{instance=\"host:1\",a=\"b\"} 42.12\n\
# HELP foo\n\
# TYPE foo counter\n\
foo{instance=\"host:1\"} 1234\n";
    assert_eq!(output, expected);
}

#[test]
fn test_write_prometheus_matches_render() {
    let set = populated_set();
    let mut out = Vec::new();
    set.write_prometheus(&mut out, true).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), set.render(true));
}

#[test]
fn test_concurrent_scrapes_and_registrations() {
    let set = Arc::new(Set::new());

    std::thread::scope(|s| {
        for worker in 0..4 {
            let set = Arc::clone(&set);
            s.spawn(move || {
                for i in 0..200 {
                    let name = format!("jobs_total{{worker=\"{worker}\",job=\"{}\"}}", i % 10);
                    set.get_or_create_counter(&name).inc();
                    set.get_or_create_histogram("job_seconds").update(f64::from(i) / 100.0);
                }
            });
        }
        for _ in 0..2 {
            let set = Arc::clone(&set);
            s.spawn(move || {
                for _ in 0..50 {
                    let output = set.render(true);
                    assert!(output.matches("# TYPE jobs_total counter\n").count() <= 1);
                }
            });
        }
    });

    let output = set.render(false);
    let total: u64 = output
        .lines()
        .filter(|l| l.starts_with("jobs_total{"))
        .map(|l| l.rsplit(' ').next().unwrap().parse::<u64>().unwrap())
        .sum();
    assert_eq!(total, 800);
    assert!(output.contains("job_seconds_count 800\n"));
    assert_eq!(set.list_metric_names().len(), 41);
}
