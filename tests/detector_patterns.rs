// tests/detector_patterns.rs

mod common;
use crate::common::init_tracing;

use appdock::detect::{LogDetector, RecognizerSpec};
use proptest::prelude::*;

#[test]
fn detects_gradio_style_url() {
    init_tracing();
    let detector = LogDetector::with_defaults();

    let line = "Running on local URL:  http://127.0.0.1:7860";
    assert_eq!(
        detector.detect(line).as_deref(),
        Some("http://127.0.0.1:7860")
    );
}

#[test]
fn detects_uvicorn_and_flask_and_node() {
    init_tracing();
    let detector = LogDetector::with_defaults();

    assert_eq!(
        detector
            .detect("INFO:     Uvicorn running on http://127.0.0.1:8000 (Press CTRL+C to quit)")
            .as_deref(),
        Some("http://127.0.0.1:8000")
    );
    assert_eq!(
        detector
            .detect(" * Running on http://127.0.0.1:5000")
            .as_deref(),
        Some("http://127.0.0.1:5000")
    );
    assert_eq!(
        detector
            .detect("  ➜  Local:   http://localhost:5173/")
            .as_deref(),
        Some("http://localhost:5173/")
    );
}

#[test]
fn unmatched_lines_yield_none() {
    init_tracing();
    let detector = LogDetector::with_defaults();

    assert_eq!(detector.detect(""), None);
    assert_eq!(detector.detect("Installing dependencies..."), None);
    assert_eq!(detector.detect("error: connection refused"), None);
    // URL-looking text outside a recognized shape is not an endpoint.
    assert_eq!(detector.detect("docs at http://example.com"), None);
}

#[test]
fn first_match_wins_over_later_recognizers() {
    init_tracing();
    // A line matching both the gradio shape and a custom catch-all should
    // resolve via the built-in (earlier) recognizer.
    let detector = LogDetector::with_extra(&[RecognizerSpec {
        name: "catch-all".to_string(),
        pattern: r"(https?://\S+)".to_string(),
    }]);

    let line = "Running on local URL: http://127.0.0.1:7860 and http://other:1";
    assert_eq!(
        detector.detect(line).as_deref(),
        Some("http://127.0.0.1:7860")
    );
}

#[test]
fn extra_recognizer_is_a_pure_data_addition() {
    init_tracing();
    let base = LogDetector::with_defaults();
    let detector = LogDetector::with_extra(&[RecognizerSpec {
        name: "my-framework".to_string(),
        pattern: r"serving UI at (https?://\S+)".to_string(),
    }]);

    assert_eq!(detector.len(), base.len() + 1);
    assert_eq!(
        detector
            .detect("boot: serving UI at http://127.0.0.1:9999")
            .as_deref(),
        Some("http://127.0.0.1:9999")
    );
}

#[test]
fn invalid_extra_pattern_is_skipped_not_fatal() {
    init_tracing();
    let base = LogDetector::with_defaults();
    let detector = LogDetector::with_extra(&[RecognizerSpec {
        name: "broken".to_string(),
        pattern: r"(unclosed".to_string(),
    }]);

    // The broken entry is dropped; everything else still works.
    assert_eq!(detector.len(), base.len());
    assert_eq!(
        detector
            .detect("Running on local URL: http://127.0.0.1:7860")
            .as_deref(),
        Some("http://127.0.0.1:7860")
    );
}

#[test]
fn trailing_punctuation_is_trimmed() {
    init_tracing();
    let detector = LogDetector::with_defaults();

    assert_eq!(
        detector
            .detect("listening on http://0.0.0.0:3000,")
            .as_deref(),
        Some("http://0.0.0.0:3000")
    );
}

proptest! {
    /// Detection is a pure function: same line in, same result out, and
    /// arbitrary junk never makes it raise.
    #[test]
    fn detect_is_idempotent_and_total(line in ".*") {
        let detector = LogDetector::with_defaults();
        let first = detector.detect(&line);
        let second = detector.detect(&line);
        prop_assert_eq!(first, second);
    }
}
