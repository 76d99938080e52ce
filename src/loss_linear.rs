use std::error::Error;

use crate::data::DMatrix;
use crate::hyper_parameters::{HyperParam, TaskType};
use crate::loss::{self, GradientSink, LossTrait};
use crate::model_parameters::Model;
use crate::updater::UpdaterTrait;

// Plain linear score. Regression tasks train on squared error,
// classification tasks on the logistic loss.
pub struct LossLinear {
    task_type: TaskType,
    sink: GradientSink,
}

impl LossLinear {
    pub fn new(hp: &HyperParam) -> Result<LossLinear, Box<dyn Error>> {
        loss::check_problem_size(hp, 1)?;
        Ok(LossLinear {
            task_type: hp.task_type,
            sink: GradientSink::new(hp)?,
        })
    }
}

impl LossTrait for LossLinear {
    fn get_name(&self) -> &'static str {
        "Linear"
    }

    fn predict(&self, matrix: &DMatrix, model: &Model, pred: &mut [f32]) {
        loss::check_predict(matrix, pred);
        let w = model.get_parameter();
        for (p, row) in pred.iter_mut().zip(matrix.rows()) {
            *p = loss::linear_wtx(&row, w);
        }
    }

    fn calc_grad(&mut self, matrix: &DMatrix, model: &mut Model, updater: &mut dyn UpdaterTrait) {
        loss::check_batch(matrix);
        for (row, label) in matrix.rows().zip(matrix.labels()) {
            let pred = loss::linear_wtx(&row, model.get_parameter());
            let pg = loss::partial_gradient(self.task_type, pred, *label);
            for (idx, x) in row.indices.iter().zip(row.values.iter()) {
                self.sink.push(*idx as usize, pg * x, model, updater);
            }
        }
        self.sink.finish_batch(matrix.row_count(), model, updater);
    }

    fn evaluate(&self, pred: &[f32], label: &[f32]) -> f32 {
        loss::task_loss(self.task_type, pred, label)
    }
}
