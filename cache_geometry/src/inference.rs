use crate::config::GeometryConfig;
use crate::error::GeometryError;
use crate::estimator::TrimmedMean;
use crate::pattern::AccessPattern;
use crate::probe::LatencyProbe;
use crate::sweep::{Conclusion, Sweep, SweepConfig, SweepPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    LineSize,
    Capacity,
    FirstTagBit,
    Associativity,
}

/// Outcome of one sweep, `value` is `None` when the whole range went by without a jump.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub parameter: Parameter,
    pub value: Option<usize>,
    pub points: Vec<SweepPoint>,
}

fn check_line_size(line_size: usize) -> Result<(), GeometryError> {
    if line_size.is_power_of_two() {
        Ok(())
    } else {
        Err(GeometryError::InvalidConfig(format!(
            "line size {} is not a power of two",
            line_size
        )))
    }
}

pub struct CacheInference<P> {
    probe: P,
    config: GeometryConfig,
    estimator: TrimmedMean,
}

impl<P: LatencyProbe> CacheInference<P> {
    pub fn new(probe: P, config: GeometryConfig) -> Result<CacheInference<P>, GeometryError> {
        config.validate()?;
        let estimator = config.estimator;
        Ok(CacheInference {
            probe,
            config,
            estimator,
        })
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    pub fn probe_mut(&mut self) -> &mut P {
        &mut self.probe
    }

    /// Robust latency of one pattern.
    pub fn measure(
        &mut self,
        pattern: &AccessPattern,
        repetitions: usize,
    ) -> Result<f64, GeometryError> {
        let samples = self.probe.sample(pattern, repetitions);
        Ok(self.estimator.estimate(&samples)?)
    }

    fn sweep<F>(
        &mut self,
        parameter: Parameter,
        config: &SweepConfig,
        conclusion: Conclusion,
        mut make_pattern: F,
    ) -> Result<Inference, GeometryError>
    where
        F: FnMut(usize) -> Result<AccessPattern, GeometryError>,
    {
        let repetitions = config.repetitions;
        let outcome = Sweep::new(config, conclusion).run(|candidate| {
            let pattern = make_pattern(candidate)?;
            self.measure(&pattern, repetitions)
        })?;
        match outcome.value {
            Some(v) => log::info!("{:?} concluded: {}", parameter, v),
            None => log::info!("{:?} not found", parameter),
        }
        Ok(Inference {
            parameter,
            value: outcome.value,
            points: outcome.points,
        })
    }

    /// Double the distance between two accesses in a block until the second one starts
    /// missing, that distance is the line size.
    pub fn infer_line_size(&mut self) -> Result<Inference, GeometryError> {
        let config = self.config.line_size.clone();
        let probe = self.config.probe.clone();
        self.sweep(Parameter::LineSize, &config, Conclusion::Current, |stride| {
            Ok(AccessPattern::line_pair(
                probe.line_blocks,
                probe.line_block_len,
                stride,
                probe.seed,
            )?)
        })
    }

    /// Double a shuffled ring until it stops fitting, the capacity is the last size that fit.
    pub fn infer_capacity(&mut self, line_size: usize) -> Result<Inference, GeometryError> {
        let config = self.config.capacity.clone();
        let seed = self.config.probe.seed;
        self.sweep(Parameter::Capacity, &config, Conclusion::Previous, |footprint| {
            Ok(AccessPattern::ring(footprint, line_size, seed)?)
        })
    }

    /// Find the lowest address bit past the set index: strides of `1 << bit` from there on
    /// all land in the same set and the latency jumps.
    pub fn infer_first_tag_bit(&mut self, line_size: usize) -> Result<Inference, GeometryError> {
        check_line_size(line_size)?;
        let mut config = self.config.first_tag_bit.clone();
        let line_bits = line_size.trailing_zeros() as usize;
        // strides under a line never leave the line
        config.start = config.start.max(line_bits + 1);
        if config.start > config.end {
            return Err(GeometryError::InvalidConfig(format!(
                "first_tag_bit: no candidate bit above the {} B line",
                line_size
            )));
        }
        let slots = self.config.probe.tag_slots;
        self.sweep(Parameter::FirstTagBit, &config, Conclusion::Current, |bit| {
            Ok(AccessPattern::strided(slots, 1 << bit)?)
        })
    }

    /// Grow the number of lines sharing one set until they thrash, the associativity is one
    /// below the count where it started.
    pub fn infer_associativity(
        &mut self,
        line_size: usize,
        first_tag_bit: usize,
    ) -> Result<Inference, GeometryError> {
        let config = self.config.associativity.clone();
        check_line_size(line_size)?;
        let way_stride = 1usize
            .checked_shl(first_tag_bit as u32)
            .ok_or_else(|| {
                GeometryError::InvalidConfig(format!("first tag bit {} too large", first_tag_bit))
            })?;
        let sets = self
            .config
            .probe
            .conflict_sets
            .min(way_stride / line_size)
            .max(1);
        self.sweep(
            Parameter::Associativity,
            &config,
            Conclusion::Previous,
            |ways| Ok(AccessPattern::conflict(ways, way_stride, sets, line_size)?),
        )
    }
}
