use std::error::Error;

use crate::consts::{ADADELTA_EPSILON, VERY_SMALL_NUMBER};
use crate::gradient::Gradient;
use crate::hyper_parameters::{HyperParam, RegularType, UpdaterType};
use crate::model_parameters::Model;


pub trait UpdaterTrait {
    fn get_name(&self) -> &'static str;
    /// Sparse path: one immediate step on a single parameter.
    fn update(&mut self, key: usize, grad: f32, model: &mut Model);
    /// Dense path: averages the accumulated gradient over its mini-batch size, then steps every parameter.
    fn batch_update(&mut self, grad: &mut Gradient, model: &mut Model);
    /// Steps the contiguous block of parameters starting at start_key.
    fn seq_update(&mut self, values: &[f32], start_key: usize, model: &mut Model);
}

// One update rule applied to a single weight and its optimizer state.
// Rules keeping fewer than two caches get scratch cells they ignore.
trait WeightRule {
    const NUM_CACHES: usize;
    fn step(&self, grad: f32, w: &mut f32, cache: &mut f32, cache_2: &mut f32);
}

#[inline(always)]
fn apply_rule<R: WeightRule>(rule: &R, values: &[f32], start_key: usize, model: &mut Model) {
    let end = start_key + values.len();
    let (w, c, c2) = model.split_mut();
    match R::NUM_CACHES {
        0 => {
            for (g, w) in values.iter().zip(w[start_key..end].iter_mut()) {
                rule.step(*g, w, &mut 0.0, &mut 0.0);
            }
        },
        1 => {
            for ((g, w), c) in values.iter().zip(w[start_key..end].iter_mut()).zip(c[start_key..end].iter_mut()) {
                rule.step(*g, w, c, &mut 0.0);
            }
        },
        _ => {
            for (((g, w), c), c2) in values.iter()
                                        .zip(w[start_key..end].iter_mut())
                                        .zip(c[start_key..end].iter_mut())
                                        .zip(c2[start_key..end].iter_mut()) {
                rule.step(*g, w, c, c2);
            }
        },
    }
}

#[inline(always)]
fn apply_batch<R: WeightRule>(rule: &R, grad: &mut Gradient, model: &mut Model) {
    assert_eq!(grad.get_length(), model.get_length(), "Gradient and model sizes differ");
    grad.div(grad.get_mini_batch_size() as f32);
    apply_rule(rule, grad.get_dense_vector(), 0, model);
}


/// Learning rate and regularizer shared by every updater.
#[derive(Clone, Debug)]
pub struct UpdaterBase {
    learning_rate: f32,
    regu_lambda: f32,
    regu_type: RegularType,
}

impl UpdaterBase {
    pub fn new(hp: &HyperParam) -> Result<UpdaterBase, Box<dyn Error>> {
        if !(hp.learning_rate > 0.0) {
            return Err(format!("Learning rate has to be positive, got {}", hp.learning_rate))?;
        }
        if !(hp.regu_lambda >= 0.0) {
            return Err(format!("Regularization lambda can not be negative, got {}", hp.regu_lambda))?;
        }
        Ok(UpdaterBase {
            learning_rate: hp.learning_rate,
            regu_lambda: hp.regu_lambda,
            regu_type: hp.regu_type,
        })
    }

    #[inline(always)]
    pub fn regular_term(&self, w: f32) -> f32 {
        match self.regu_type {
            RegularType::L2 => self.regu_lambda * w,
            RegularType::L1 => {
                if w > 0.0 {
                    self.regu_lambda
                } else if w < 0.0 {
                    -self.regu_lambda
                } else {
                    0.0
                }
            },
            RegularType::None => 0.0,
        }
    }

    #[inline(always)]
    fn regularized(&self, grad: f32, w: f32) -> f32 {
        grad + self.regular_term(w)
    }
}

fn check_decay_rate(name: &str, value: f32) -> Result<(), Box<dyn Error>> {
    if !(value > 0.0 && value < 1.0) {
        return Err(format!("{} has to be in (0, 1), got {}", name, value))?;
    }
    Ok(())
}

pub fn new_updater(hp: &HyperParam) -> Result<Box<dyn UpdaterTrait>, Box<dyn Error>> {
    let updater: Box<dyn UpdaterTrait> = match hp.updater_type {
        UpdaterType::SGD => Box::new(UpdaterSGD::new(hp)?),
        UpdaterType::AdaGrad => Box::new(UpdaterAdaGrad::new(hp)?),
        UpdaterType::AdaDelta => Box::new(UpdaterAdaDelta::new(hp)?),
        UpdaterType::Momentum => Box::new(UpdaterMomentum::new(hp)?),
        UpdaterType::RMSProp => Box::new(UpdaterRMSProp::new(hp)?),
        UpdaterType::Adam => Box::new(UpdaterAdam::new(hp)?),
    };
    log::info!("Updater: {}, learning rate {}, regularizer {:?} lambda {}",
               updater.get_name(), hp.learning_rate, hp.regu_type, hp.regu_lambda);
    Ok(updater)
}

// Every updater except Adam has nothing to count, so the three entry points just apply its rule
macro_rules! impl_stateless_updater {
    ( $updater:ty, $name:expr ) => {
        impl UpdaterTrait for $updater {
            fn get_name(&self) -> &'static str {
                $name
            }

            #[inline(always)]
            fn update(&mut self, key: usize, grad: f32, model: &mut Model) {
                apply_rule(self, std::slice::from_ref(&grad), key, model);
            }

            fn batch_update(&mut self, grad: &mut Gradient, model: &mut Model) {
                apply_batch(self, grad, model);
            }

            #[inline(always)]
            fn seq_update(&mut self, values: &[f32], start_key: usize, model: &mut Model) {
                apply_rule(self, values, start_key, model);
            }
        }
    };
}


/******************* SGD **************************/
// w -= lr * (grad + regularizer(w))
#[derive(Clone, Debug)]
pub struct UpdaterSGD {
    base: UpdaterBase,
}

impl UpdaterSGD {
    pub fn new(hp: &HyperParam) -> Result<UpdaterSGD, Box<dyn Error>> {
        Ok(UpdaterSGD { base: UpdaterBase::new(hp)? })
    }
}

impl WeightRule for UpdaterSGD {
    const NUM_CACHES: usize = 0;

    #[inline(always)]
    fn step(&self, grad: f32, w: &mut f32, _cache: &mut f32, _cache_2: &mut f32) {
        let g = self.base.regularized(grad, *w);
        *w -= self.base.learning_rate * g;
    }
}

impl_stateless_updater!(UpdaterSGD, "SGD");


/******************* AdaGrad **************************/
// cache holds the running sum of squared gradients
#[derive(Clone, Debug)]
pub struct UpdaterAdaGrad {
    base: UpdaterBase,
}

impl UpdaterAdaGrad {
    pub fn new(hp: &HyperParam) -> Result<UpdaterAdaGrad, Box<dyn Error>> {
        Ok(UpdaterAdaGrad { base: UpdaterBase::new(hp)? })
    }
}

impl WeightRule for UpdaterAdaGrad {
    const NUM_CACHES: usize = 1;

    #[inline(always)]
    fn step(&self, grad: f32, w: &mut f32, cache: &mut f32, _cache_2: &mut f32) {
        let g = self.base.regularized(grad, *w);
        *cache += g * g;
        *w -= self.base.learning_rate * g / (*cache + VERY_SMALL_NUMBER).sqrt();
    }
}

impl_stateless_updater!(UpdaterAdaGrad, "AdaGrad");


/******************* AdaDelta **************************/
// cache: decayed mean of squared gradients, cache_2: decayed mean of squared steps
#[derive(Clone, Debug)]
pub struct UpdaterAdaDelta {
    base: UpdaterBase,
    decay_rate: f32,
}

impl UpdaterAdaDelta {
    pub fn new(hp: &HyperParam) -> Result<UpdaterAdaDelta, Box<dyn Error>> {
        let base = UpdaterBase::new(hp)?;
        check_decay_rate("Decay rate", hp.decay_rate)?;
        Ok(UpdaterAdaDelta { base: base, decay_rate: hp.decay_rate })
    }
}

impl WeightRule for UpdaterAdaDelta {
    const NUM_CACHES: usize = 2;

    #[inline(always)]
    fn step(&self, grad: f32, w: &mut f32, cache: &mut f32, cache_2: &mut f32) {
        let rho = self.decay_rate;
        let g = self.base.regularized(grad, *w);
        *cache = rho * *cache + (1.0 - rho) * g * g;
        let delta = -((*cache_2 + ADADELTA_EPSILON).sqrt() / (*cache + ADADELTA_EPSILON).sqrt()) * g;
        *cache_2 = rho * *cache_2 + (1.0 - rho) * delta * delta;
        *w += self.base.learning_rate * delta;
    }
}

impl_stateless_updater!(UpdaterAdaDelta, "AdaDelta");


/******************* Momentum **************************/
// cache holds the velocity
#[derive(Clone, Debug)]
pub struct UpdaterMomentum {
    base: UpdaterBase,
    decay_rate: f32,
}

impl UpdaterMomentum {
    pub fn new(hp: &HyperParam) -> Result<UpdaterMomentum, Box<dyn Error>> {
        let base = UpdaterBase::new(hp)?;
        check_decay_rate("Decay rate", hp.decay_rate)?;
        Ok(UpdaterMomentum { base: base, decay_rate: hp.decay_rate })
    }
}

impl WeightRule for UpdaterMomentum {
    const NUM_CACHES: usize = 1;

    #[inline(always)]
    fn step(&self, grad: f32, w: &mut f32, cache: &mut f32, _cache_2: &mut f32) {
        let g = self.base.regularized(grad, *w);
        *cache = self.decay_rate * *cache - self.base.learning_rate * g;
        *w += *cache;
    }
}

impl_stateless_updater!(UpdaterMomentum, "Momentum");


/******************* RMSProp **************************/
// cache holds the decayed mean of squared gradients
#[derive(Clone, Debug)]
pub struct UpdaterRMSProp {
    base: UpdaterBase,
    decay_rate: f32,
}

impl UpdaterRMSProp {
    pub fn new(hp: &HyperParam) -> Result<UpdaterRMSProp, Box<dyn Error>> {
        let base = UpdaterBase::new(hp)?;
        check_decay_rate("Decay rate", hp.decay_rate)?;
        Ok(UpdaterRMSProp { base: base, decay_rate: hp.decay_rate })
    }
}

impl WeightRule for UpdaterRMSProp {
    const NUM_CACHES: usize = 1;

    #[inline(always)]
    fn step(&self, grad: f32, w: &mut f32, cache: &mut f32, _cache_2: &mut f32) {
        let g = self.base.regularized(grad, *w);
        *cache = (1.0 - self.decay_rate) * g * g + self.decay_rate * *cache;
        *w -= self.base.learning_rate * g / (*cache + VERY_SMALL_NUMBER).sqrt();
    }
}

impl_stateless_updater!(UpdaterRMSProp, "RMSProp");


/******************* Adam **************************/
// cache: first moment, cache_2: second moment.
// The bias-correction epoch t starts at 1 and advances once per batch_size
// sparse hits (update or seq_update calls), or once per batch_update.
#[derive(Clone, Debug)]
pub struct UpdaterAdam {
    base: UpdaterBase,
    beta1: f32,
    beta2: f32,
    batch_size: usize,
    epoch: i32,
    hit_count: usize,
    correction1: f32,
    correction2: f32,
}

impl UpdaterAdam {
    pub fn new(hp: &HyperParam) -> Result<UpdaterAdam, Box<dyn Error>> {
        let base = UpdaterBase::new(hp)?;
        check_decay_rate("Decay rate", hp.decay_rate)?;
        check_decay_rate("Second decay rate", hp.second_decay_rate)?;
        if hp.batch_size == 0 {
            return Err("Adam needs a positive batch size to count epochs".to_string())?;
        }
        let mut updater = UpdaterAdam {
            base: base,
            beta1: hp.decay_rate,
            beta2: hp.second_decay_rate,
            batch_size: hp.batch_size,
            epoch: 1,
            hit_count: 0,
            correction1: 1.0,
            correction2: 1.0,
        };
        updater.set_corrections();
        Ok(updater)
    }

    pub fn get_epoch(&self) -> i32 {
        self.epoch
    }

    fn set_corrections(&mut self) {
        self.correction1 = 1.0 - self.beta1.powi(self.epoch);
        self.correction2 = 1.0 - self.beta2.powi(self.epoch);
    }

    fn advance_epoch(&mut self) {
        self.epoch += 1;
        self.set_corrections();
    }

    fn count_hit(&mut self) {
        self.hit_count += 1;
        if self.hit_count >= self.batch_size {
            self.hit_count = 0;
            self.advance_epoch();
        }
    }
}

impl WeightRule for UpdaterAdam {
    const NUM_CACHES: usize = 2;

    #[inline(always)]
    fn step(&self, grad: f32, w: &mut f32, m: &mut f32, v: &mut f32) {
        let g = self.base.regularized(grad, *w);
        *m = (1.0 - self.beta1) * g + self.beta1 * *m;
        *v = (1.0 - self.beta2) * g * g + self.beta2 * *v;
        let mb = *m / self.correction1;
        let vb = *v / self.correction2;
        *w -= self.base.learning_rate * mb / (vb + VERY_SMALL_NUMBER).sqrt();
    }
}

impl UpdaterTrait for UpdaterAdam {
    fn get_name(&self) -> &'static str {
        "Adam"
    }

    #[inline(always)]
    fn update(&mut self, key: usize, grad: f32, model: &mut Model) {
        apply_rule(self, std::slice::from_ref(&grad), key, model);
        self.count_hit();
    }

    fn batch_update(&mut self, grad: &mut Gradient, model: &mut Model) {
        apply_batch(self, grad, model);
        self.advance_epoch();
    }

    #[inline(always)]
    fn seq_update(&mut self, values: &[f32], start_key: usize, model: &mut Model) {
        apply_rule(self, values, start_key, model);
        self.count_hit();
    }
}
