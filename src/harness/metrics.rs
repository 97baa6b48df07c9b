//! Metrics and scoring
//!
//! * **Size** ("brevity"): significant characters of the submitted unit's
//!   assembly listing, ignoring comments, string directives and whitespace.
//! * **Speed** ("rapidity"): mean duration of the passing entry points in
//!   milliseconds; NaN when there were none.
//! * **Total**: `scale * 2 / (speed / baseline_speed + size / baseline_size)`,
//!   so a submission equal to its baseline scores exactly `scale`.

use std::path::Path;

use tokio::fs;

use crate::error::{HarnessError, HarnessResult};
use crate::models::ExecutionSample;

/// Reference values a submission is compared against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    /// Reference speed in milliseconds
    pub speed: f64,
    /// Reference size in characters
    pub size: f64,
}

impl Baseline {
    /// Validate and build a baseline; both values must be finite and positive
    pub fn new(speed: f64, size: f64) -> HarnessResult<Self> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(HarnessError::Config(format!(
                "baseline speed must be a positive number, got {}",
                speed
            )));
        }
        if !size.is_finite() || size <= 0.0 {
            return Err(HarnessError::Config(format!(
                "baseline size must be a positive number, got {}",
                size
            )));
        }
        Ok(Self { speed, size })
    }
}

/// Composite scorer
#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    scale: f64,
}

impl Scorer {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    /// Composite score of one submission
    ///
    /// NaN speed propagates. Both metrics being zero yields NaN, never infinity.
    pub fn total(&self, speed: f64, size: u64, baseline: &Baseline) -> f64 {
        let denominator = speed / baseline.speed + size as f64 / baseline.size;
        if denominator == 0.0 {
            return f64::NAN;
        }
        self.scale * 2.0 / denominator
    }
}

/// Arithmetic mean of sample durations in milliseconds; NaN for no samples
pub fn mean_millis(samples: &[ExecutionSample]) -> f64 {
    if samples.is_empty() {
        return f64::NAN;
    }
    samples.iter().map(ExecutionSample::elapsed_ms).sum::<f64>() / samples.len() as f64
}

/// Size metric of an assembly listing on disk
///
/// A listing that cannot be read counts as size 0.
pub async fn brevity(assembly: &Path) -> u64 {
    match fs::read_to_string(assembly).await {
        Ok(listing) => significant_chars(&listing, comment_markers()),
        Err(e) => {
            tracing::warn!(
                "Failed to read assembly listing {:?}, size metric defaults to 0: {}",
                assembly,
                e
            );
            0
        }
    }
}

/// Line comment markers of the target's assembler syntax
fn comment_markers() -> &'static [&'static str] {
    if cfg!(any(target_arch = "x86", target_arch = "x86_64")) {
        &["#"]
    } else if cfg!(target_arch = "aarch64") {
        &["//"]
    } else if cfg!(target_arch = "arm") {
        &["@"]
    } else {
        &["#", "//", ";"]
    }
}

/// Directives whose operands are string payloads rather than code
const STRING_DIRECTIVES: [&str; 5] = [".ascii", ".asciz", ".string", ".file", ".ident"];

/// Count non-whitespace characters outside comments and string directives
pub fn significant_chars(listing: &str, markers: &[&str]) -> u64 {
    listing
        .lines()
        .map(str::trim_start)
        .filter(|line| !markers.iter().any(|marker| line.starts_with(marker)))
        .filter(|line| {
            let directive = line.split_whitespace().next().unwrap_or_default();
            !STRING_DIRECTIVES.contains(&directive)
        })
        .map(|line| {
            let code = markers
                .iter()
                .filter_map(|marker| line.find(marker))
                .min()
                .map_or(line, |at| &line[..at]);
            code.chars().filter(|c| !c.is_whitespace()).count() as u64
        })
        .sum()
}
