use std::error::Error;

use crate::model_parameters::allocate_zeroed;
use crate::vector_lane::VectorLane;

/// Dense per-batch gradient sum, indexed like the model parameters.
pub struct Gradient {
    grad: Vec<f32>,
    mini_batch_size: usize,
}

impl Gradient {
    pub fn new(num_param: usize) -> Result<Gradient, Box<dyn Error>> {
        if num_param == 0 {
            return Err("Gradient accumulator needs at least one parameter".to_string())?;
        }
        Ok(Gradient {
            grad: allocate_zeroed(num_param, "gradient")?,
            mini_batch_size: 1,
        })
    }

    #[inline(always)]
    pub fn add_grad(&mut self, key: usize, value: f32) {
        self.grad[key] += value;
    }

    #[inline(always)]
    pub fn seq_add_grad(&mut self, values: &[f32], start_key: usize) {
        let end = start_key + values.len();
        VectorLane::<8>::add_assign(&mut self.grad[start_key..end], values);
    }

    pub fn div(&mut self, value: f32) {
        self.grad.iter_mut().for_each(|g| *g /= value);
    }

    pub fn reset(&mut self) {
        self.grad.iter_mut().for_each(|g| *g = 0.0);
    }

    pub fn set_mini_batch_size(&mut self, size: usize) {
        assert!(size > 0, "Mini-batch size has to be positive");
        self.mini_batch_size = size;
    }

    pub fn get_mini_batch_size(&self) -> usize {
        self.mini_batch_size
    }

    #[inline(always)]
    pub fn get_grad(&self, key: usize) -> f32 {
        self.grad[key]
    }

    pub fn get_dense_vector(&self) -> &[f32] {
        &self.grad
    }

    pub fn get_length(&self) -> usize {
        self.grad.len()
    }
}
