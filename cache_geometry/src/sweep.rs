use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::GeometryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Growth {
    Double,
    Add,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub start: usize,
    /// Inclusive.
    pub end: usize,
    pub growth: Growth,
    /// Increment for `Growth::Add`, ignored when doubling.
    pub step: usize,
    /// `(latency - previous) / previous` has to be strictly above this to conclude.
    pub min_relative_increase: f64,
    pub repetitions: usize,
}

impl SweepConfig {
    pub fn candidates(&self) -> impl Iterator<Item = usize> {
        let (growth, step, end) = (self.growth, self.step, self.end);
        std::iter::successors(Some(self.start), move |&c| match growth {
            Growth::Double => c.checked_mul(2),
            Growth::Add => c.checked_add(step),
        })
        .take_while(move |&c| c <= end)
    }

    pub fn validate(&self, name: &str) -> Result<(), GeometryError> {
        let invalid = |why: String| Err(GeometryError::InvalidConfig(format!("{}: {}", name, why)));
        if self.start == 0 {
            return invalid("start must be positive".to_string());
        }
        if self.start > self.end {
            return invalid(format!("empty range {}..={}", self.start, self.end));
        }
        if self.growth == Growth::Add && self.step == 0 {
            return invalid("step must be positive".to_string());
        }
        if !(self.min_relative_increase > 0.0 && self.min_relative_increase.is_finite()) {
            return invalid(format!(
                "threshold {} must be positive",
                self.min_relative_increase
            ));
        }
        if self.repetitions == 0 {
            return invalid("repetitions must be positive".to_string());
        }
        Ok(())
    }
}

/// Which candidate a crossing designates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conclusion {
    /// The candidate at which latency jumped.
    Current,
    /// The last candidate before the jump.
    Previous,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPoint {
    pub candidate: usize,
    pub latency: f64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepState {
    Init,
    Probing(SweepPoint),
    Concluded(usize),
    Exhausted,
}

impl SweepState {
    fn is_done(&self) -> bool {
        matches!(self, SweepState::Concluded(_) | SweepState::Exhausted)
    }
}

pub fn crosses(previous: f64, latency: f64, min_relative_increase: f64) -> bool {
    if previous <= 0.0 || !previous.is_finite() {
        return false;
    }
    (latency - previous) / previous > min_relative_increase
}

pub struct Sweep<'a> {
    config: &'a SweepConfig,
    conclusion: Conclusion,
    state: SweepState,
    points: Vec<SweepPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepOutcome {
    pub value: Option<usize>,
    pub points: Vec<SweepPoint>,
}

impl<'a> Sweep<'a> {
    pub fn new(config: &'a SweepConfig, conclusion: Conclusion) -> Sweep<'a> {
        Sweep {
            config,
            conclusion,
            state: SweepState::Init,
            points: Vec::new(),
        }
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    /// Feed the next candidate's measurement.
    pub fn advance(&mut self, point: SweepPoint) -> SweepState {
        if self.state.is_done() {
            return self.state;
        }
        self.points.push(point);
        self.state = match self.state {
            SweepState::Probing(prev)
                if crosses(
                    prev.latency,
                    point.latency,
                    self.config.min_relative_increase,
                ) =>
            {
                SweepState::Concluded(match self.conclusion {
                    Conclusion::Current => point.candidate,
                    Conclusion::Previous => prev.candidate,
                })
            }
            _ => SweepState::Probing(point),
        };
        self.state
    }

    /// Candidates ran out.
    pub fn exhaust(&mut self) -> SweepState {
        if !self.state.is_done() {
            self.state = SweepState::Exhausted;
        }
        self.state
    }

    pub fn outcome(self) -> SweepOutcome {
        let value = match self.state {
            SweepState::Concluded(v) => Some(v),
            _ => None,
        };
        SweepOutcome {
            value,
            points: self.points,
        }
    }

    /// Walk the candidate range, `measure` turns a candidate into a latency.
    pub fn run<F>(mut self, mut measure: F) -> Result<SweepOutcome, GeometryError>
    where
        F: FnMut(usize) -> Result<f64, GeometryError>,
    {
        for candidate in self.config.candidates() {
            let t = Instant::now();
            let latency = measure(candidate)?;
            let point = SweepPoint {
                candidate,
                latency,
                elapsed: t.elapsed(),
            };
            log::debug!("candidate {} latency {:.3} ns", candidate, latency);
            if self.advance(point).is_done() {
                return Ok(self.outcome());
            }
        }
        self.exhaust();
        Ok(self.outcome())
    }
}
