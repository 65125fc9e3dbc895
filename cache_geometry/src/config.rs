use ::config::builder::{ConfigBuilder, DefaultState};
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::GeometryError;
use crate::estimator::{Trim, TrimmedMean};
use crate::probe::ProbeConfig;
use crate::sweep::{Growth, SweepConfig};

pub const CONFIG_FILE: &str = "cache_geometry.toml";
pub const ENV_PREFIX: &str = "CACHE_GEOMETRY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Default log filter, `RUST_LOG` wins when set.
    pub log_level: String,
    /// Core the binary pins itself to, the first allowed core when unset.
    #[serde(default)]
    pub pin_core: Option<usize>,
    /// Line size the binary carries on with when the line size sweep finds nothing.
    #[serde(default)]
    pub fallback_line_size: Option<usize>,
    pub estimator: TrimmedMean,
    pub probe: ProbeConfig,
    pub line_size: SweepConfig,
    pub capacity: SweepConfig,
    pub first_tag_bit: SweepConfig,
    pub associativity: SweepConfig,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        GeometryConfig {
            log_level: "info".to_string(),
            pin_core: None,
            fallback_line_size: Some(64),
            estimator: TrimmedMean::default(),
            probe: ProbeConfig::default(),
            line_size: SweepConfig {
                start: 8,
                end: 512,
                growth: Growth::Double,
                step: 0,
                min_relative_increase: 0.4,
                repetitions: 31,
            },
            capacity: SweepConfig {
                start: 8 << 10,
                end: 256 << 10,
                growth: Growth::Double,
                step: 0,
                min_relative_increase: 0.08,
                repetitions: 31,
            },
            first_tag_bit: SweepConfig {
                start: 7,
                end: 20,
                growth: Growth::Add,
                step: 1,
                min_relative_increase: 0.3,
                repetitions: 31,
            },
            associativity: SweepConfig {
                start: 2,
                end: 20,
                growth: Growth::Add,
                step: 1,
                min_relative_increase: 0.5,
                repetitions: 31,
            },
        }
    }
}

fn with_defaults(
    mut builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, GeometryError> {
    let d = GeometryConfig::default();
    builder = builder
        .set_default("log_level", d.log_level.as_str())?
        .set_default("estimator.min_samples", d.estimator.min_samples as i64)?;
    builder = match d.estimator.trim {
        Trim::Fraction(f) => builder.set_default("estimator.trim.fraction", f)?,
        Trim::Count(k) => builder.set_default("estimator.trim.count", k as i64)?,
    };
    let p = &d.probe;
    builder = builder
        .set_default("probe.reset_bytes", p.reset_bytes as i64)?
        .set_default("probe.min_accesses", p.min_accesses as i64)?
        .set_default("probe.warmup_laps", p.warmup_laps as i64)?
        .set_default("probe.line_blocks", p.line_blocks as i64)?
        .set_default("probe.line_block_len", p.line_block_len as i64)?
        .set_default("probe.tag_slots", p.tag_slots as i64)?
        .set_default("probe.conflict_sets", p.conflict_sets as i64)?
        .set_default("probe.seed", p.seed as i64)?;
    if let Some(line) = d.fallback_line_size {
        builder = builder.set_default("fallback_line_size", line as i64)?;
    }
    for (name, sweep) in [
        ("line_size", &d.line_size),
        ("capacity", &d.capacity),
        ("first_tag_bit", &d.first_tag_bit),
        ("associativity", &d.associativity),
    ] {
        let growth = match sweep.growth {
            Growth::Double => "double",
            Growth::Add => "add",
        };
        builder = builder
            .set_default(format!("{}.start", name), sweep.start as i64)?
            .set_default(format!("{}.end", name), sweep.end as i64)?
            .set_default(format!("{}.growth", name), growth)?
            .set_default(format!("{}.step", name), sweep.step as i64)?
            .set_default(
                format!("{}.min_relative_increase", name),
                sweep.min_relative_increase,
            )?
            .set_default(format!("{}.repetitions", name), sweep.repetitions as i64)?;
    }
    Ok(builder)
}

fn environment() -> Environment {
    // CACHE_GEOMETRY_CAPACITY__MIN_RELATIVE_INCREASE=0.1
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl GeometryConfig {
    /// Load configuration with precedence: env vars → `cache_geometry.toml` → defaults
    pub fn load() -> Result<Self, GeometryError> {
        let mut builder = with_defaults(Config::builder())?;
        if Path::new(CONFIG_FILE).exists() {
            builder = builder.add_source(File::with_name(CONFIG_FILE));
        }
        let config: GeometryConfig = builder.add_source(environment()).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file, env vars still override it.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, GeometryError> {
        let builder = with_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .add_source(environment());
        let config: GeometryConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        self.line_size.validate("line_size")?;
        self.capacity.validate("capacity")?;
        self.first_tag_bit.validate("first_tag_bit")?;
        self.associativity.validate("associativity")?;

        match self.estimator.trim {
            Trim::Fraction(f) if !(0.0..0.5).contains(&f) => {
                return Err(GeometryError::InvalidConfig(format!(
                    "estimator: trim fraction {} outside [0, 0.5)",
                    f
                )));
            }
            Trim::Count(k) if 2 * k >= self.estimator.min_samples.max(1) => {
                return Err(GeometryError::InvalidConfig(format!(
                    "estimator: trimming {} per side needs more than {} minimum samples",
                    k, self.estimator.min_samples
                )));
            }
            _ => {}
        }

        if let Some(line) = self.fallback_line_size {
            if !line.is_power_of_two() {
                return Err(GeometryError::InvalidConfig(format!(
                    "fallback_line_size {} is not a power of two",
                    line
                )));
            }
        }
        if self.first_tag_bit.end >= usize::BITS as usize {
            return Err(GeometryError::InvalidConfig(format!(
                "first_tag_bit: bit {} past the address width",
                self.first_tag_bit.end
            )));
        }
        if self.line_size.end >= self.probe.line_block_len {
            return Err(GeometryError::InvalidConfig(format!(
                "line_size: largest stride {} must stay below probe.line_block_len {}",
                self.line_size.end, self.probe.line_block_len
            )));
        }
        let tag_slots = self.probe.tag_slots;
        if tag_slots <= self.associativity.start
            || tag_slots > self.associativity.end.saturating_mul(2)
        {
            return Err(GeometryError::InvalidConfig(format!(
                "probe: tag_slots {} cannot single out the tag boundary of a {}..={} way cache",
                tag_slots, self.associativity.start, self.associativity.end
            )));
        }
        if self.probe.min_accesses == 0 {
            return Err(GeometryError::InvalidConfig(
                "probe: min_accesses must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::GeometryConfig;
    use crate::estimator::Trim;

    #[test]
    fn defaults_are_valid() {
        GeometryConfig::default().validate().unwrap();
    }

    #[test]
    fn load_matches_defaults() {
        // no cache_geometry.toml in the crate directory
        let loaded = GeometryConfig::load().unwrap();
        let defaults = GeometryConfig::default();
        assert_eq!(loaded.line_size, defaults.line_size);
        assert_eq!(loaded.associativity, defaults.associativity);
        assert_eq!(loaded.estimator, defaults.estimator);
        assert_eq!(loaded.probe, defaults.probe);
    }

    #[test]
    fn rejects_bad_trim() {
        let mut config = GeometryConfig::default();
        config.estimator.trim = Trim::Fraction(0.5);
        assert!(config.validate().is_err());
        config.estimator.trim = Trim::Count(8);
        assert!(config.validate().is_err());
        config.estimator.trim = Trim::Count(7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_stride_past_block() {
        let mut config = GeometryConfig::default();
        config.line_size.end = config.probe.line_block_len;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tag_slots_must_bracket_the_way_range() {
        let mut config = GeometryConfig::default();
        // 64 slots spread over 4 sets two bits early, 16 lines each overflow a 12 way set
        config.probe.tag_slots = 64;
        assert!(config.validate().is_err());
        config.probe.tag_slots = config.associativity.start;
        assert!(config.validate().is_err());
        config.probe.tag_slots = 2 * config.associativity.end;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_odd_fallback() {
        let config = GeometryConfig {
            fallback_line_size: Some(48),
            ..GeometryConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
