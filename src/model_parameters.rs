use std::error::Error;
use std::fs;
use std::io;
use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::consts;
use crate::hyper_parameters::UpdaterType;

const IO_CHUNK_FLOATS: usize = 16 * 1024;

/// Flat parameter vector plus the optimizer accumulators that share its indexing.
/// Index range [0, max_feature) holds linear weights, latent factors follow.
pub struct Model {
    updater_type: UpdaterType,
    parameters: Vec<f32>,
    param_cache: Vec<f32>,
    param_cache_2: Vec<f32>,
    rng: Xoshiro256PlusPlus,
    normal: Normal<f32>,
}

// Vec allocation aborts the process on failure, so reserve first and report instead
pub fn allocate_zeroed(len: usize, what: &str) -> Result<Vec<f32>, Box<dyn Error>> {
    let mut vec: Vec<f32> = Vec::new();
    vec.try_reserve_exact(len)
        .map_err(|e| format!("Allocating {} floats for {} failed: {}", len, what, e))?;
    vec.resize(len, 0.0);
    Ok(vec)
}

pub fn checkpoint_filenames(filename: &str, updater_type: UpdaterType) -> Vec<String> {
    let suffixes = [consts::PARAM_SUFFIX, consts::CACHE_SUFFIX, consts::CACHE_2_SUFFIX];
    suffixes[..1 + updater_type.num_caches()]
        .iter()
        .map(|suffix| format!("{}{}", filename, suffix))
        .collect()
}

impl Model {
    pub fn new(num_param: usize, updater_type: UpdaterType, gaussian: bool) -> Result<Model, Box<dyn Error>> {
        if num_param == 0 {
            return Err("Model needs at least one parameter".to_string())?;
        }
        let num_caches = updater_type.num_caches();
        let mut model = Model {
            updater_type: updater_type,
            parameters: allocate_zeroed(num_param, "parameters")?,
            param_cache: if num_caches >= 1 { allocate_zeroed(num_param, "cache")? } else { Vec::new() },
            param_cache_2: if num_caches >= 2 { allocate_zeroed(num_param, "cache_2")? } else { Vec::new() },
            rng: Xoshiro256PlusPlus::seed_from_u64(consts::GAUSSIAN_INIT_SEED),
            normal: Normal::new(consts::GAUSSIAN_INIT_MEAN, consts::GAUSSIAN_INIT_STDEV)?,
        };
        if gaussian {
            model.draw_gaussian();
        }
        log::info!("Allocated model: {} parameters, {} caches, updater {:?}, gaussian init: {}",
                   num_param, num_caches, updater_type, gaussian);
        Ok(model)
    }

    pub fn new_from_checkpoint(filename: &str, updater_type: UpdaterType) -> Result<Model, Box<dyn Error>> {
        let filenames = checkpoint_filenames(filename, updater_type);
        let parameters = read_vector(&filenames[0], None)?;
        let num_param = parameters.len();
        let mut model = Model::new(num_param, updater_type, false)?;
        model.parameters = parameters;
        if filenames.len() >= 2 {
            model.param_cache = read_vector(&filenames[1], Some(num_param))?;
        }
        if filenames.len() >= 3 {
            model.param_cache_2 = read_vector(&filenames[2], Some(num_param))?;
        }
        log::info!("Loaded checkpoint {} with {} parameters", filename, num_param);
        Ok(model)
    }

    /// Reloads parameters and caches in place. Element counts have to match the live model.
    pub fn load_model(&mut self, filename: &str) -> Result<(), Box<dyn Error>> {
        let filenames = checkpoint_filenames(filename, self.updater_type);
        let num_param = self.parameters.len();
        let parameters = read_vector(&filenames[0], Some(num_param))?;
        let param_cache = if filenames.len() >= 2 { read_vector(&filenames[1], Some(num_param))? } else { Vec::new() };
        let param_cache_2 = if filenames.len() >= 3 { read_vector(&filenames[2], Some(num_param))? } else { Vec::new() };
        self.parameters = parameters;
        self.param_cache = param_cache;
        self.param_cache_2 = param_cache_2;
        log::info!("Reloaded checkpoint {}", filename);
        Ok(())
    }

    pub fn save_model(&self, filename: &str) -> Result<(), Box<dyn Error>> {
        let filenames = checkpoint_filenames(filename, self.updater_type);
        let vectors = [&self.parameters, &self.param_cache, &self.param_cache_2];
        for (name, vec) in filenames.iter().zip(vectors.iter()) {
            write_vector(name, vec)?;
        }
        log::info!("Saved checkpoint {} ({} files)", filename, filenames.len());
        Ok(())
    }

    pub fn remove_model_file(&self, filename: &str) -> Result<(), Box<dyn Error>> {
        for name in checkpoint_filenames(filename, self.updater_type) {
            fs::remove_file(&name).map_err(|e| format!("Removing checkpoint file {} failed: {}", name, e))?;
        }
        Ok(())
    }

    /// Zeroes the optimizer state and either zeroes or re-draws the parameters.
    pub fn reset(&mut self, gaussian: bool) {
        if gaussian {
            self.draw_gaussian();
        } else {
            self.parameters.iter_mut().for_each(|w| *w = 0.0);
        }
        self.param_cache.iter_mut().for_each(|c| *c = 0.0);
        self.param_cache_2.iter_mut().for_each(|c| *c = 0.0);
    }

    fn draw_gaussian(&mut self) {
        let normal = self.normal;
        let rng = &mut self.rng;
        self.parameters.iter_mut().for_each(|w| *w = normal.sample(rng));
    }

    pub fn save_weight(&self, snapshot: &mut [f32]) {
        assert_eq!(snapshot.len(), self.parameters.len(), "Snapshot buffer size differs from the model size");
        snapshot.copy_from_slice(&self.parameters);
    }

    pub fn load_weight(&mut self, snapshot: &[f32]) {
        assert_eq!(snapshot.len(), self.parameters.len(), "Snapshot buffer size differs from the model size");
        self.parameters.copy_from_slice(snapshot);
    }

    pub fn get_length(&self) -> usize {
        self.parameters.len()
    }

    pub fn get_updater_type(&self) -> UpdaterType {
        self.updater_type
    }

    pub fn get_parameter(&self) -> &[f32] {
        &self.parameters
    }

    pub fn get_parameter_mut(&mut self) -> &mut [f32] {
        &mut self.parameters
    }

    pub fn get_param_cache(&self) -> &[f32] {
        &self.param_cache
    }

    pub fn get_param_cache_2(&self) -> &[f32] {
        &self.param_cache_2
    }

    /// Parameters and both caches at once, for updaters that touch all three per index.
    /// Unused caches come back empty.
    #[inline(always)]
    pub fn split_mut(&mut self) -> (&mut [f32], &mut [f32], &mut [f32]) {
        (&mut self.parameters, &mut self.param_cache, &mut self.param_cache_2)
    }
}


fn write_vector(filename: &str, vec: &[f32]) -> Result<(), Box<dyn Error>> {
    let file = fs::File::create(filename).map_err(|e| format!("Creating checkpoint file {} failed: {}", filename, e))?;
    let mut output_bufwriter = io::BufWriter::new(file);
    output_bufwriter.write_u64::<LittleEndian>(vec.len() as u64)?;
    let mut bytes = vec![0u8; IO_CHUNK_FLOATS * 4];
    for chunk in vec.chunks(IO_CHUNK_FLOATS) {
        let buf = &mut bytes[..chunk.len() * 4];
        LittleEndian::write_f32_into(chunk, buf);
        output_bufwriter.write_all(buf)?;
    }
    output_bufwriter.flush()?;
    Ok(())
}

fn read_vector(filename: &str, expected_len: Option<usize>) -> Result<Vec<f32>, Box<dyn Error>> {
    let file = fs::File::open(filename).map_err(|e| format!("Opening checkpoint file {} failed: {}", filename, e))?;
    let file_len = file.metadata()?.len();
    if file_len < 8 {
        return Err(format!("Checkpoint file {} is truncated: {} bytes", filename, file_len))?;
    }
    let mut input_bufreader = io::BufReader::new(file);
    let len = input_bufreader.read_u64::<LittleEndian>()?;
    let expected_file_len = len.checked_mul(4).and_then(|b| b.checked_add(8));
    if expected_file_len != Some(file_len) {
        return Err(format!("Checkpoint file {} claims {} floats but is {} bytes long", filename, len, file_len))?;
    }
    if let Some(expected_len) = expected_len {
        if len as usize != expected_len {
            return Err(format!("Lengths of weights array in checkpoint file {} differ: got {}, expected {}",
                               filename, len, expected_len))?;
        }
    }
    let mut vec = allocate_zeroed(len as usize, filename)?;
    input_bufreader.read_f32_into::<LittleEndian>(&mut vec)?;
    Ok(vec)
}
