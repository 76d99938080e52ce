use std::error::Error;

use crate::data::DMatrix;
use crate::hyper_parameters::{HyperParam, TaskType};
use crate::loss::{self, GradientSink, LossTrait};
use crate::model_parameters::Model;
use crate::updater::UpdaterTrait;

// Logistic regression: linear score, always trained and evaluated as a
// classifier regardless of the configured task.
pub struct LossLR {
    sink: GradientSink,
}

impl LossLR {
    pub fn new(hp: &HyperParam) -> Result<LossLR, Box<dyn Error>> {
        loss::check_problem_size(hp, 1)?;
        if hp.task_type == TaskType::Regression {
            log::warn!("Logistic regression ignores the regression task type and trains a classifier");
        }
        Ok(LossLR {
            sink: GradientSink::new(hp)?,
        })
    }
}

impl LossTrait for LossLR {
    fn get_name(&self) -> &'static str {
        "Logistic"
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
            let pg = loss::partial_gradient(TaskType::Binary, pred, *label);
            for (idx, x) in row.indices.iter().zip(row.values.iter()) {
                self.sink.push(*idx as usize, pg * x, model, updater);
            }
        }
        self.sink.finish_batch(matrix.row_count(), model, updater);
    }

    fn evaluate(&self, pred: &[f32], label: &[f32]) -> f32 {
        loss::cross_entropy_loss(pred, label)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_epsilon;
    use crate::data::RowArena;
    use crate::hyper_parameters::{RegularType, UpdaterType};
    use crate::updater::new_updater;

    fn lr_hp() -> HyperParam {
        let mut hp = HyperParam::new_empty();
        hp.task_type = TaskType::Regression; // ignored
        hp.is_sparse = true;
        hp.max_feature = 8;
        hp.num_param = 8;
        hp.learning_rate = 0.5;
        hp.regu_type = RegularType::None;
        hp.updater_type = UpdaterType::SGD;
        hp
    }

    #[test]
    fn test_first_step() {
        let hp = lr_hp();
        let mut loss = LossLR::new(&hp).unwrap();
        let mut updater = new_updater(&hp).unwrap();
        let mut model = Model::new(8, UpdaterType::SGD, false).unwrap();
        let mut arena = RowArena::new(false);
        arena.push_sparse(1.0, &[(2, 1.0)]);
        arena.push_sparse(0.0, &[(3, 2.0)]);
        loss.calc_grad(&arena.all_rows(), &mut model, updater.as_mut());
        // at score 0, pg = -y/2
        assert_epsilon!(model.get_parameter()[2], 0.25);
        assert_epsilon!(model.get_parameter()[3], -0.5);
    }

    #[test]
    fn test_separates() {
        let hp = lr_hp();
        let mut loss = LossLR::new(&hp).unwrap();
        let mut updater = new_updater(&hp).unwrap();
        let mut model = Model::new(8, UpdaterType::SGD, false).unwrap();
        let mut arena = RowArena::new(false);
        arena.push_sparse(1.0, &[(0, 1.0), (1, 1.0)]);
        arena.push_sparse(0.0, &[(0, 1.0), (2, 1.0)]);
        arena.push_sparse(1.0, &[(0, 1.0), (1, 1.0)]);
        let batch = arena.all_rows();
        for _ in 0..30 {
            loss.calc_grad(&batch, &mut model, updater.as_mut());
        }
        let mut pred = vec![0.0; 3];
        loss.predict(&batch, &model, &mut pred);
        assert!(pred[0] > 0.0 && pred[2] > 0.0);
        assert!(pred[1] < 0.0);
        assert!(loss.evaluate(&pred, batch.labels()) < 3.0 * 2.0f32.ln());
    }
}
