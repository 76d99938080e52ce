use env_logger::Builder;
use log::LevelFilter;

use crate::consts;

// CPU features that let the 4- and 8-wide latent lanes vectorize
const LANE_FEATURES: &[&str] = &["sse2", "avx", "avx2", "fma"];

/// Installs env_logger at the level named by LOG_LEVEL (default info).
/// Calling it again keeps the first logger.
pub fn initialize_logging_layer() {
    let level = match std::env::var("LOG_LEVEL") {
        Ok(name) => level_from_name(&name),
        Err(_) => LevelFilter::Info,
    };
    if Builder::new().filter_level(level).format_timestamp_millis().try_init().is_ok() {
        log::info!("fmlearn {}, log level {}", consts::get_version(), level);
    }

    let features = detected_lane_features();
    if features.is_empty() {
        log::info!("No vector CPU features detected, latent lanes run as scalar loops");
    } else {
        log::info!("Latent lanes can use: {}", features.join(", "));
    }
}

fn level_from_name(name: &str) -> LevelFilter {
    match name.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detected_lane_features() -> Vec<&'static str> {
    LANE_FEATURES.iter().copied().filter(|feature| match *feature {
        "sse2" => is_x86_feature_detected!("sse2"),
        "avx" => is_x86_feature_detected!("avx"),
        "avx2" => is_x86_feature_detected!("avx2"),
        "fma" => is_x86_feature_detected!("fma"),
        _ => false,
    }).collect()
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn detected_lane_features() -> Vec<&'static str> {
    let _ = LANE_FEATURES;
    Vec::new()
}
