use core::fmt;
use itertools::Itertools;

use crate::inference::{Inference, Parameter};

/// Convert number of bytes to formatted string
pub fn format_size(bytes: usize) -> String {
    const MB: usize = 1024 * 1024;
    const KB: usize = 1024;

    if bytes >= MB && bytes % MB == 0 {
        format!("{} MiB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{} KiB", bytes / KB)
    } else {
        format!("{} B", bytes)
    }
}

impl Parameter {
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::LineSize => "cache line size",
            Parameter::Capacity => "cache size",
            Parameter::FirstTagBit => "first tag bit",
            Parameter::Associativity => "associativity",
        }
    }

    fn format_value(&self, value: usize) -> String {
        match self {
            Parameter::LineSize | Parameter::Capacity => format_size(value),
            Parameter::FirstTagBit => format!("bit {} ({} stride)", value, format_size(1 << value)),
            Parameter::Associativity => format!("{}-way", value),
        }
    }

    fn format_candidate(&self, candidate: usize) -> String {
        match self {
            Parameter::LineSize => format!("stride={:>7}", format_size(candidate)),
            Parameter::Capacity => format!("size={:>9}", format_size(candidate)),
            Parameter::FirstTagBit => format!("bit={:>2}", candidate),
            Parameter::Associativity => format!("ways={:>2}", candidate),
        }
    }
}

impl Inference {
    /// One line outcome.
    pub fn summary(&self) -> String {
        match self.value {
            Some(v) => format!(
                "evaluated {} is {}",
                self.parameter.name(),
                self.parameter.format_value(v)
            ),
            None => format!("failed to evaluate {}", self.parameter.name()),
        }
    }

    pub fn table(&self) -> String {
        self.points
            .iter()
            .map(|p| {
                format!(
                    "{} time={:.3}ns (took {:.1}s)",
                    self.parameter.format_candidate(p.candidate),
                    p.latency,
                    p.elapsed.as_secs_f64()
                )
            })
            .join("\n")
    }
}

impl fmt::Display for Inference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.points.is_empty() {
            writeln!(f, "{}", self.table())?;
        }
        write!(f, "{}", self.summary())
    }
}
