use cache_geometry::{CacheInference, GeometryConfig, GeometryError, MemoryProbe};
use cache_utils::affinity::{first_allowed_core, pin_to_core, restore_affinity};
use cache_utils::cache_info::get_cache_info;
use log::{error, info, warn};

fn run(config: GeometryConfig) -> Result<(), GeometryError> {
    let core = match config.pin_core {
        Some(core) => Some(core),
        None => first_allowed_core().unwrap_or_else(|e| {
            warn!("could not read affinity: {}", e);
            None
        }),
    };
    let old_affinity = match core.map(pin_to_core) {
        Some(Ok(old)) => {
            info!("pinned to core {}", core.unwrap_or_default());
            Some(old)
        }
        Some(Err(e)) => {
            warn!("could not pin to a single core, results may be noisy: {}", e);
            None
        }
        None => None,
    };

    let mut inference = CacheInference::new(MemoryProbe::new(config.probe.clone()), config)?;

    let line = inference.infer_line_size()?;
    println!("{}", line);
    let line_size = match (line.value, inference.config().fallback_line_size) {
        (Some(line_size), _) => Some(line_size),
        (None, Some(fallback)) => {
            warn!("continuing assuming cache line size is {} B", fallback);
            Some(fallback)
        }
        (None, None) => None,
    };

    if let Some(line_size) = line_size {
        let capacity = inference.infer_capacity(line_size)?;
        println!("{}", capacity);

        let tag = inference.infer_first_tag_bit(line_size)?;
        println!("{}", tag);
        match tag.value {
            Some(first_tag_bit) => {
                let associativity = inference.infer_associativity(line_size, first_tag_bit)?;
                println!("{}", associativity);
            }
            None => println!("skipping associativity, the tag boundary is unknown"),
        }
    } else {
        println!("skipping the remaining sweeps, the line size is unknown");
    }

    let reported: Vec<_> = get_cache_info()
        .into_iter()
        .filter(|c| c.holds_data())
        .collect();
    if !reported.is_empty() {
        println!("CPUID reports:");
        for c in reported {
            println!("  {} (first tag bit {})", c, c.first_tag_bit());
        }
    }

    if let Some(old) = old_affinity {
        if let Err(e) = restore_affinity(&old) {
            warn!("could not restore affinity: {}", e);
        }
    }
    Ok(())
}

fn main() {
    let config = match GeometryConfig::load() {
        Ok(config) => config,
        Err(e) => {
            env_logger::init();
            error!("{}", e);
            std::process::exit(2);
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    if let Err(e) = run(config) {
        error!("{}", e);
        std::process::exit(1);
    }
}
