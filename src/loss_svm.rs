use std::error::Error;

use crate::data::DMatrix;
use crate::hyper_parameters::HyperParam;
use crate::loss::{self, GradientSink, LossTrait};
use crate::model_parameters::Model;
use crate::updater::UpdaterTrait;

// Linear SVM on the hinge loss. Rows outside the margin contribute nothing.
pub struct LossSVM {
    sink: GradientSink,
}

impl LossSVM {
    pub fn new(hp: &HyperParam) -> Result<LossSVM, Box<dyn Error>> {
        loss::check_problem_size(hp, 1)?;
        Ok(LossSVM {
            sink: GradientSink::new(hp)?,
        })
    }
}

impl LossTrait for LossSVM {
    fn get_name(&self) -> &'static str {
        "SVM"
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
            let y = loss::to_sign(*label);
            if y * pred < 1.0 {
                for (idx, x) in row.indices.iter().zip(row.values.iter()) {
                    self.sink.push(*idx as usize, -y * x, model, updater);
                }
            }
        }
        self.sink.finish_batch(matrix.row_count(), model, updater);
    }

    fn evaluate(&self, pred: &[f32], label: &[f32]) -> f32 {
        loss::hinge_loss(pred, label)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_epsilon;
    use crate::data::RowArena;
    use crate::hyper_parameters::{RegularType, UpdaterType};
    use crate::updater::new_updater;

    fn svm_hp() -> HyperParam {
        let mut hp = HyperParam::new_empty();
        hp.model_type = crate::hyper_parameters::ModelType::SVM;
        hp.is_sparse = true;
        hp.max_feature = 8;
        hp.num_param = 8;
        hp.learning_rate = 0.5;
        hp.regu_type = RegularType::None;
        hp.updater_type = UpdaterType::SGD;
        hp
    }

    #[test]
    fn test_margin() {
        let hp = svm_hp();
        let mut loss = LossSVM::new(&hp).unwrap();
        let mut updater = new_updater(&hp).unwrap();
        let mut model = Model::new(8, UpdaterType::SGD, false).unwrap();
        model.get_parameter_mut()[1] = 2.0;
        let mut arena = RowArena::new(false);
        // already outside the margin, no update
        arena.push_sparse(1.0, &[(1, 1.0)]);
        // inside the margin, pushed towards -1
        arena.push_sparse(-1.0, &[(4, 1.0), (5, 2.0)]);
        loss.calc_grad(&arena.all_rows(), &mut model, updater.as_mut());
        assert_eq!(model.get_parameter()[1], 2.0);
        assert_epsilon!(model.get_parameter()[4], -0.5);
        assert_epsilon!(model.get_parameter()[5], -1.0);

        let mut pred = vec![0.0; 2];
        loss.predict(&arena.all_rows(), &model, &mut pred);
        assert_eq!(loss.evaluate(&pred, arena.all_rows().labels()), 0.0);
    }
}
