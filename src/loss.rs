use std::error::Error;

use crate::data::{DMatrix, SparseRow};
use crate::gradient::Gradient;
use crate::hyper_parameters::{HyperParam, ModelType, TaskType};
use crate::loss_ffm::LossFFM;
use crate::loss_fm::LossFM;
use crate::loss_linear::LossLinear;
use crate::loss_lr::LossLR;
use crate::loss_svm::LossSVM;
use crate::model_parameters::Model;
use crate::updater::UpdaterTrait;


pub trait LossTrait {
    fn get_name(&self) -> &'static str;
    /// Writes the model score of every row into pred, which has to be sized to the batch.
    fn predict(&self, matrix: &DMatrix, model: &Model, pred: &mut [f32]);
    /// Scores every row and pushes its gradient into the model, immediately in sparse
    /// mode or as one averaged batch update in dense mode.
    fn calc_grad(&mut self, matrix: &DMatrix, model: &mut Model, updater: &mut dyn UpdaterTrait);
    /// Summed (not averaged) loss of the predictions.
    fn evaluate(&self, pred: &[f32], label: &[f32]) -> f32;
}

pub fn new_loss(hp: &HyperParam) -> Result<Box<dyn LossTrait>, Box<dyn Error>> {
    let loss: Box<dyn LossTrait> = match hp.model_type {
        ModelType::Linear => Box::new(LossLinear::new(hp)?),
        ModelType::LR => Box::new(LossLR::new(hp)?),
        ModelType::FM => Box::new(LossFM::new(hp)?),
        ModelType::FFM => Box::new(LossFFM::new(hp)?),
        ModelType::SVM => Box::new(LossSVM::new(hp)?),
    };
    log::info!("Loss: {}, task {:?}, sparse updates: {}", loss.get_name(), hp.task_type, hp.is_sparse);
    Ok(loss)
}

pub fn check_problem_size(hp: &HyperParam, params_per_feature: usize) -> Result<(), Box<dyn Error>> {
    if hp.max_feature == 0 {
        return Err("max_feature has to be positive".to_string())?;
    }
    let required = hp.max_feature * params_per_feature;
    if hp.num_param < required {
        return Err(format!("Model of {} parameters is too small, layout needs {}", hp.num_param, required))?;
    }
    Ok(())
}

pub fn check_num_factor(hp: &HyperParam) -> Result<(), Box<dyn Error>> {
    if hp.num_factor == 0 || hp.num_factor > crate::consts::MAX_NUM_FACTOR {
        return Err(format!("num_factor has to be in 1..={}, got {}", crate::consts::MAX_NUM_FACTOR, hp.num_factor))?;
    }
    Ok(())
}

#[inline(always)]
pub fn check_batch(matrix: &DMatrix) {
    assert!(matrix.row_count() > 0, "Gradient requested for an empty batch");
}

#[inline(always)]
pub fn check_predict(matrix: &DMatrix, pred: &[f32]) {
    assert!(!pred.is_empty(), "Prediction buffer is empty");
    assert_eq!(pred.len(), matrix.row_count(), "Prediction buffer does not match the batch size");
}

#[inline(always)]
fn check_evaluate(pred: &[f32], label: &[f32]) {
    assert!(!pred.is_empty(), "Evaluating empty predictions");
    assert!(!label.is_empty(), "Evaluating empty labels");
    assert_eq!(pred.len(), label.len(), "Predictions and labels differ in length");
}

// Labels above zero are the positive class, everything else is negative
#[inline(always)]
pub fn to_sign(label: f32) -> f32 {
    if label > 0.0 { 1.0 } else { -1.0 }
}

#[inline(always)]
pub fn logistic(t: f32) -> f32 {
    (1.0 + (-t).exp()).recip()
}

/// Derivative of the loss with respect to the score.
#[inline(always)]
pub fn partial_gradient(task_type: TaskType, pred: f32, label: f32) -> f32 {
    if task_type.is_classification() {
        let y = to_sign(label);
        -y / (1.0 + 1.0 / (-y * pred).exp())
    } else {
        pred - label
    }
}

#[inline(always)]
pub fn linear_wtx(row: &SparseRow, w: &[f32]) -> f32 {
    row.indices.iter().zip(row.values.iter()).map(|(idx, x)| w[*idx as usize] * x).sum()
}

// log(1 + exp(z)) without overflow for large z
#[inline(always)]
fn softplus(z: f32) -> f32 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

pub fn cross_entropy_loss(pred: &[f32], label: &[f32]) -> f32 {
    check_evaluate(pred, label);
    pred.iter().zip(label.iter()).map(|(p, l)| softplus(-to_sign(*l) * p)).sum()
}

pub fn square_loss(pred: &[f32], label: &[f32]) -> f32 {
    check_evaluate(pred, label);
    pred.iter().zip(label.iter()).map(|(p, l)| 0.5 * (l - p) * (l - p)).sum()
}

pub fn hinge_loss(pred: &[f32], label: &[f32]) -> f32 {
    check_evaluate(pred, label);
    pred.iter().zip(label.iter()).map(|(p, l)| (1.0 - to_sign(*l) * p).max(0.0)).sum()
}

pub fn task_loss(task_type: TaskType, pred: &[f32], label: &[f32]) -> f32 {
    if task_type.is_classification() {
        cross_entropy_loss(pred, label)
    } else {
        square_loss(pred, label)
    }
}


/// Routes per-feature gradients either straight to the updater (sparse mode)
/// or into the dense accumulator that is flushed once per batch.
pub struct GradientSink {
    grad: Option<Gradient>,
}

impl GradientSink {
    pub fn new(hp: &HyperParam) -> Result<GradientSink, Box<dyn Error>> {
        let grad = if hp.is_train && !hp.is_sparse {
            Some(Gradient::new(hp.num_param)?)
        } else {
            None
        };
        Ok(GradientSink { grad: grad })
    }

    pub fn is_dense(&self) -> bool {
        self.grad.is_some()
    }

    #[inline(always)]
    pub fn push(&mut self, key: usize, value: f32, model: &mut Model, updater: &mut dyn UpdaterTrait) {
        match &mut self.grad {
            Some(grad) => grad.add_grad(key, value),
            None => updater.update(key, value, model),
        }
    }

    #[inline(always)]
    pub fn push_seq(&mut self, values: &[f32], start_key: usize, model: &mut Model, updater: &mut dyn UpdaterTrait) {
        match &mut self.grad {
            Some(grad) => grad.seq_add_grad(values, start_key),
            None => updater.seq_update(values, start_key, model),
        }
    }

    pub fn finish_batch(&mut self, row_count: usize, model: &mut Model, updater: &mut dyn UpdaterTrait) {
        if let Some(grad) = &mut self.grad {
            grad.set_mini_batch_size(row_count);
            updater.batch_update(grad, model);
            grad.reset();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_epsilon;
    use crate::data::RowArena;
    use crate::hyper_parameters::{RegularType, UpdaterType};
    use crate::updater::new_updater;

    #[test]
    fn test_partial_gradient() {
        assert_eq!(partial_gradient(TaskType::Regression, 3.0, 1.0), 2.0);
        // at score 0 the logistic derivative is -y/2
        assert_eq!(partial_gradient(TaskType::Binary, 0.0, 1.0), -0.5);
        assert_eq!(partial_gradient(TaskType::Binary, 0.0, 0.0), 0.5);
        assert_eq!(partial_gradient(TaskType::Binary, 0.0, -1.0), 0.5);
        assert_epsilon!(partial_gradient(TaskType::Binary, 2.0, 1.0), -(1.0 - logistic(2.0)));
        // saturated scores stay finite
        assert_eq!(partial_gradient(TaskType::Binary, 200.0, 1.0), 0.0);
        assert_eq!(partial_gradient(TaskType::Binary, -200.0, 1.0), -1.0);
    }

    #[test]
    fn test_logistic() {
        assert_eq!(logistic(0.0), 0.5);
        assert_epsilon!(logistic(2.0), 0.880797);
        assert_eq!(logistic(100.0), 1.0);
    }

    #[test]
    fn test_square_loss() {
        assert_eq!(square_loss(&[1.0, -2.5], &[1.0, -2.5]), 0.0);
        assert_eq!(square_loss(&[8.0; 100], &[10.0; 100]), 200.0);
    }

    #[test]
    fn test_cross_entropy_loss() {
        assert_epsilon!(cross_entropy_loss(&[200.0], &[1.0]), 0.0);
        assert_epsilon!(cross_entropy_loss(&[-200.0], &[0.0]), 0.0);
        assert_epsilon!(cross_entropy_loss(&[0.0], &[1.0]), 2.0f32.ln());
        // wrong and confident is large but finite
        let l = cross_entropy_loss(&[-200.0], &[1.0]);
        assert!(l.is_finite());
        assert_epsilon!(l, 200.0);
    }

    #[test]
    fn test_hinge_loss() {
        assert_eq!(hinge_loss(&[1.0, -3.0], &[1.0, -1.0]), 0.0);
        assert_eq!(hinge_loss(&[0.25], &[1.0]), 0.75);
        assert_eq!(hinge_loss(&[0.5], &[0.0]), 1.5);
    }

    #[test]
    fn test_task_loss() {
        assert_eq!(task_loss(TaskType::Regression, &[1.0], &[3.0]), 2.0);
        assert_epsilon!(task_loss(TaskType::MultiClass, &[0.0], &[1.0]), 2.0f32.ln());
    }

    #[test]
    #[should_panic]
    fn test_evaluate_empty() {
        square_loss(&[], &[]);
    }

    #[test]
    #[should_panic]
    fn test_evaluate_empty_labels() {
        cross_entropy_loss(&[1.0], &[]);
    }

    #[test]
    fn test_linear_wtx() {
        let mut arena = RowArena::new(false);
        arena.push_sparse(1.0, &[(0, 1.0), (2, 0.5)]);
        let w = [2.0, 7.0, 4.0];
        assert_eq!(linear_wtx(&arena.row(0), &w), 4.0);
    }

    #[test]
    fn test_gradient_sink() {
        let mut hp = HyperParam::new_empty();
        hp.num_param = 4;
        hp.learning_rate = 0.1;
        hp.regu_type = RegularType::None;
        hp.updater_type = UpdaterType::SGD;
        let mut updater = new_updater(&hp).unwrap();

        // dense: nothing moves until the batch is finished
        let mut model = Model::new(4, UpdaterType::SGD, false).unwrap();
        let mut sink = GradientSink::new(&hp).unwrap();
        assert!(sink.is_dense());
        sink.push(0, 1.0, &mut model, updater.as_mut());
        sink.push_seq(&[1.0, 3.0], 0, &mut model, updater.as_mut());
        assert_eq!(model.get_parameter()[0], 0.0);
        sink.finish_batch(2, &mut model, updater.as_mut());
        assert_epsilon!(model.get_parameter()[0], -0.1);
        assert_epsilon!(model.get_parameter()[1], -0.15);

        // sparse: every push is applied immediately
        hp.is_sparse = true;
        let mut model = Model::new(4, UpdaterType::SGD, false).unwrap();
        let mut sink = GradientSink::new(&hp).unwrap();
        assert!(!sink.is_dense());
        sink.push(3, 1.0, &mut model, updater.as_mut());
        assert_epsilon!(model.get_parameter()[3], -0.1);
        sink.finish_batch(1, &mut model, updater.as_mut());
        assert_epsilon!(model.get_parameter()[3], -0.1);
    }
}
