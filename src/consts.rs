// Keeps the adaptive updaters away from division by zero
pub const VERY_SMALL_NUMBER: f32 = 1e-15;
// AdaDelta takes sqrt of it as its very first step size
pub const ADADELTA_EPSILON: f32 = 1e-6;

pub const GAUSSIAN_INIT_MEAN: f32 = 0.0;
pub const GAUSSIAN_INIT_STDEV: f32 = 0.01;
pub const GAUSSIAN_INIT_SEED: u64 = 0;

// Latent scratch buffers live on the stack, so num_factor is capped
pub const MAX_NUM_FACTOR: usize = 256;

// max_feature is padded up to a multiple of this, so every latent block starts lane-aligned
pub const FEATURE_ALIGNMENT: usize = 8;

pub const PARAM_SUFFIX: &str = "_param";
pub const CACHE_SUFFIX: &str = "_cache";
pub const CACHE_2_SUFFIX: &str = "_cache_2";

pub fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
