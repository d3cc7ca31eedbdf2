// src/detect/mod.rs

//! Log event detector: recognizes service-ready endpoints in process output.
//!
//! The detector is a stateless, pure function over one line of text. It
//! holds a precompiled, ordered list of recognizers, one per supported
//! service-startup message shape; the first match wins. Adding support for
//! a new service type is purely a data addition, either to the built-in
//! table below or via `[[recognizer]]` config entries.

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

/// A recognizer as declared in data (config or the built-in table).
#[derive(Debug, Clone, Deserialize)]
pub struct RecognizerSpec {
    pub name: String,
    pub pattern: String,
}

/// Built-in service-startup message shapes, in priority order.
///
/// Each pattern captures the local endpoint in group 1 when present;
/// otherwise the whole match is used.
const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    // Gradio: "Running on local URL:  http://127.0.0.1:7860"
    ("gradio", r"[Rr]unning on local URL:\s*(https?://\S+)"),
    // Uvicorn: "Uvicorn running on http://127.0.0.1:8000 (Press CTRL+C to quit)"
    ("uvicorn", r"Uvicorn running on (https?://\S+)"),
    // Flask dev server: " * Running on http://127.0.0.1:5000"
    ("flask", r"\*\s*Running on (https?://\S+)"),
    // Vite / Next / webpack-dev-server: "  Local:   http://localhost:5173/"
    ("node-dev-server", r"Local:\s+(https?://\S+)"),
    // Streamlit: "  Local URL: http://localhost:8501"
    ("streamlit", r"Local URL:\s*(https?://\S+)"),
    // Generic: "listening on http://0.0.0.0:3000" / "Listening at http://..."
    ("generic-listening", r"[Ll]istening (?:on|at)\s+(https?://\S+)"),
    // Generic: "Serving at http://127.0.0.1:8000"
    ("generic-serving", r"[Ss]erving (?:at|on)\s+(https?://\S+)"),
];

/// One compiled recognizer.
#[derive(Debug, Clone)]
struct Recognizer {
    name: String,
    regex: Regex,
}

/// Ordered table of endpoint recognizers.
#[derive(Debug, Clone)]
pub struct LogDetector {
    recognizers: Vec<Recognizer>,
}

impl LogDetector {
    /// Detector with only the built-in recognizer table.
    pub fn with_defaults() -> Self {
        Self::with_extra(&[])
    }

    /// Detector with the built-in table followed by extra recognizers.
    ///
    /// An extra pattern that does not compile is skipped with a warning;
    /// a bad data entry must never take the detector down.
    pub fn with_extra(extra: &[RecognizerSpec]) -> Self {
        let mut recognizers = Vec::with_capacity(DEFAULT_PATTERNS.len() + extra.len());

        for (name, pattern) in DEFAULT_PATTERNS {
            // Built-in patterns are tested; a failure here is a programming
            // error, but we still degrade instead of panicking.
            match Regex::new(pattern) {
                Ok(regex) => recognizers.push(Recognizer {
                    name: (*name).to_string(),
                    regex,
                }),
                Err(e) => warn!(recognizer = *name, error = %e, "built-in pattern failed to compile; skipping"),
            }
        }

        for spec in extra {
            match Regex::new(&spec.pattern) {
                Ok(regex) => recognizers.push(Recognizer {
                    name: spec.name.clone(),
                    regex,
                }),
                Err(e) => warn!(
                    recognizer = %spec.name,
                    pattern = %spec.pattern,
                    error = %e,
                    "invalid recognizer pattern; skipping"
                ),
            }
        }

        Self { recognizers }
    }

    /// Scan one output line for a service-ready endpoint.
    ///
    /// First match wins. Unmatched or malformed lines yield `None`,
    /// never an error.
    pub fn detect(&self, line: &str) -> Option<String> {
        for rec in self.recognizers.iter() {
            if let Some(caps) = rec.regex.captures(line) {
                let raw = caps
                    .get(1)
                    .map(|m| m.as_str())
                    .unwrap_or_else(|| caps.get(0).map(|m| m.as_str()).unwrap_or(""));

                let endpoint = trim_endpoint(raw);
                if endpoint.is_empty() {
                    continue;
                }

                debug!(recognizer = %rec.name, %endpoint, "endpoint detected in output line");
                return Some(endpoint.to_string());
            }
        }

        None
    }

    /// Number of active recognizers (built-in plus extras that compiled).
    pub fn len(&self) -> usize {
        self.recognizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recognizers.is_empty()
    }
}

impl Default for LogDetector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Strip punctuation that log formatters tend to glue onto URLs.
fn trim_endpoint(raw: &str) -> &str {
    raw.trim().trim_end_matches([',', ';', ')', ']', '"', '\''])
}
