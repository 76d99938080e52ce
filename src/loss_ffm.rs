use std::error::Error;

use crate::consts::MAX_NUM_FACTOR;
use crate::data::{DMatrix, SparseRow};
use crate::hyper_parameters::{HyperParam, TaskType};
use crate::loss::{self, GradientSink, LossTrait};
use crate::model_parameters::Model;
use crate::specialize_lane;
use crate::updater::UpdaterTrait;
use crate::vector_lane::select_lane_width;

// Field-aware factorization machine.
// Every feature owns one latent vector per field; a pair (j, m) interacts through
// <v_{j, field_m}, v_{m, field_j}>. Latent vector (idx, field) starts at
// max_feature + (idx * num_field + field) * num_factor.
// A prepended bias term only contributes its linear weight, never a pair.
pub struct LossFFM {
    task_type: TaskType,
    max_feature: usize,
    num_factor: usize,
    num_field: usize,
    lane_width: usize,
    sink: GradientSink,
}

impl LossFFM {
    pub fn new(hp: &HyperParam) -> Result<LossFFM, Box<dyn Error>> {
        loss::check_num_factor(hp)?;
        if hp.num_field == 0 {
            return Err("FFM needs at least one field".to_string())?;
        }
        loss::check_problem_size(hp, 1 + hp.num_factor * hp.num_field)?;
        let lane_width = select_lane_width(hp.num_factor);
        log::info!("FFM with {} factors over {} fields, lane width {}", hp.num_factor, hp.num_field, lane_width);
        Ok(LossFFM {
            task_type: hp.task_type,
            max_feature: hp.max_feature,
            num_factor: hp.num_factor,
            num_field: hp.num_field,
            lane_width: lane_width,
            sink: GradientSink::new(hp)?,
        })
    }

    #[inline(always)]
    fn latent_start(&self, idx: u32, field: u32) -> usize {
        self.max_feature + (idx as usize * self.num_field + field as usize) * self.num_factor
    }

    fn wtx(&self, row: &SparseRow, w: &[f32], first_pair: usize) -> f32 {
        let k = self.num_factor;
        let fields = row.fields.unwrap_or(&[]);
        let mut val = loss::linear_wtx(row, w);
        specialize_lane!(self.lane_width, Lane, {
            for j in first_pair..row.len() {
                let (idx_j, field_j, x_j) = (row.indices[j], fields[j], row.values[j]);
                for m in (j + 1)..row.len() {
                    let (idx_m, field_m, x_m) = (row.indices[m], fields[m], row.values[m]);
                    let a = self.latent_start(idx_j, field_m);
                    let b = self.latent_start(idx_m, field_j);
                    val += x_j * x_m * Lane::dot(&w[a..a + k], &w[b..b + k]);
                }
            }
        });
        val
    }
}

// Rows of a biased arena keep the bias at position 0
#[inline(always)]
fn first_pair(matrix: &DMatrix) -> usize {
    if matrix.has_bias() { 1 } else { 0 }
}

impl LossTrait for LossFFM {
    fn get_name(&self) -> &'static str {
        "FFM"
    }

    fn predict(&self, matrix: &DMatrix, model: &Model, pred: &mut [f32]) {
        loss::check_predict(matrix, pred);
        assert!(matrix.has_fields(), "FFM needs rows with field ids");
        let first_pair = first_pair(matrix);
        let w = model.get_parameter();
        for (p, row) in pred.iter_mut().zip(matrix.rows()) {
            *p = self.wtx(&row, w, first_pair);
        }
    }

    fn calc_grad(&mut self, matrix: &DMatrix, model: &mut Model, updater: &mut dyn UpdaterTrait) {
        loss::check_batch(matrix);
        assert!(matrix.has_fields(), "FFM needs rows with field ids");
        let k = self.num_factor;
        let first_pair = first_pair(matrix);
        let mut bufa = [0.0f32; MAX_NUM_FACTOR];
        let mut bufb = [0.0f32; MAX_NUM_FACTOR];
        let lane_a = &mut bufa[..k];
        let lane_b = &mut bufb[..k];
        for (row, label) in matrix.rows().zip(matrix.labels()) {
            let pred = self.wtx(&row, model.get_parameter(), first_pair);
            let pg = loss::partial_gradient(self.task_type, pred, *label);
            for (idx, x) in row.indices.iter().zip(row.values.iter()) {
                self.sink.push(*idx as usize, pg * x, model, updater);
            }
            let fields = row.fields.unwrap_or(&[]);
            specialize_lane!(self.lane_width, Lane, {
                for j in first_pair..row.len() {
                    let (idx_j, field_j, x_j) = (row.indices[j], fields[j], row.values[j]);
                    for m in (j + 1)..row.len() {
                        let (idx_m, field_m, x_m) = (row.indices[m], fields[m], row.values[m]);
                        let a = self.latent_start(idx_j, field_m);
                        let b = self.latent_start(idx_m, field_j);
                        let scale = pg * x_j * x_m;
                        {
                            let w = model.get_parameter();
                            Lane::scaled_copy(lane_a, &w[b..b + k], scale);
                            Lane::scaled_copy(lane_b, &w[a..a + k], scale);
                        }
                        self.sink.push_seq(lane_a, a, model, updater);
                        self.sink.push_seq(lane_b, b, model, updater);
                    }
                }
            });
        }
        self.sink.finish_batch(matrix.row_count(), model, updater);
    }

    fn evaluate(&self, pred: &[f32], label: &[f32]) -> f32 {
        loss::task_loss(self.task_type, pred, label)
    }
}


#[cfg(test)]
mod tests {
    // Note this useful idiom: importing names from outer (for mod tests) scope.
    use super::*;
    use crate::assert_epsilon;
    use crate::data::RowArena;
    use crate::hyper_parameters::{ModelType, RegularType, UpdaterType};
    use crate::updater::new_updater;

    const MAX_FEATURE: usize = 8;

    fn ffm_hp(num_factor: usize, num_field: usize, is_sparse: bool) -> HyperParam {
        let mut hp = HyperParam::new_empty();
        hp.model_type = ModelType::FFM;
        hp.task_type = TaskType::Regression;
        hp.is_sparse = is_sparse;
        hp.num_factor = num_factor;
        hp.num_field = num_field;
        hp.max_feature = MAX_FEATURE;
        hp.num_param = MAX_FEATURE * (1 + num_factor * num_field);
        hp.learning_rate = 0.1;
        hp.regu_type = RegularType::None;
        hp.updater_type = UpdaterType::SGD;
        hp
    }

    fn ffm_model(hp: &HyperParam) -> Model {
        let mut model = Model::new(hp.num_param, UpdaterType::SGD, false).unwrap();
        for (i, w) in model.get_parameter_mut().iter_mut().enumerate() {
            *w = ((i * 5 % 13) as f32 - 6.0) * 0.05;
        }
        model
    }

    fn v_start(hp: &HyperParam, idx: u32, field: u32) -> usize {
        MAX_FEATURE + idx as usize * hp.num_field * hp.num_factor + field as usize * hp.num_factor
    }

    // pairwise definition of the FFM score
    fn brute_force_wtx(hp: &HyperParam, row: &SparseRow, w: &[f32]) -> f32 {
        let fields = row.fields.unwrap();
        let mut val = 0.0;
        for j in 0..row.len() {
            val += w[row.indices[j] as usize] * row.values[j];
            for m in (j + 1)..row.len() {
                let a = v_start(hp, row.indices[j], fields[m]);
                let b = v_start(hp, row.indices[m], fields[j]);
                let mut dot = 0.0;
                for f in 0..hp.num_factor {
                    dot += w[a + f] * w[b + f];
                }
                val += dot * row.values[j] * row.values[m];
            }
        }
        val
    }

    #[test]
    fn test_wtx_three_features_two_fields() {
        let hp = ffm_hp(2, 2, true);
        let loss = LossFFM::new(&hp).unwrap();
        let mut model = Model::new(hp.num_param, UpdaterType::SGD, false).unwrap();
        {
            let w = model.get_parameter_mut();
            w[0] = 1.0;
            // feature 0 in field 0, features 1 and 2 in field 1
            fn set(w: &mut [f32], start: usize, v: [f32; 2]) {
                w[start..start + 2].copy_from_slice(&v);
            }
            set(w, v_start(&hp, 0, 1), [1.0, 2.0]);   // v_{0,1}
            set(w, v_start(&hp, 1, 0), [3.0, 1.0]);   // v_{1,0}
            set(w, v_start(&hp, 2, 0), [-1.0, 1.0]);  // v_{2,0}
            set(w, v_start(&hp, 1, 1), [0.5, 0.5]);   // v_{1,1}
            set(w, v_start(&hp, 2, 1), [2.0, -2.0]);  // v_{2,1}
        }
        let mut arena = RowArena::new(true);
        arena.push_field_aware(0.0, &[(0, 0, 1.0), (1, 1, 2.0), (1, 2, 1.0)]);
        let mut pred = vec![0.0; 1];
        loss.predict(&arena.all_rows(), &model, &mut pred);
        // linear 1
        // (0,1): <v_{0,1}, v_{1,0}> * 2 = 5 * 2 = 10
        // (0,2): <v_{0,1}, v_{2,0}> * 1 = 1
        // (1,2): <v_{1,1}, v_{2,1}> * 2 = 0
        assert_epsilon!(pred[0], 12.0);
        assert_epsilon!(pred[0], brute_force_wtx(&hp, &arena.row(0), model.get_parameter()));
    }

    #[test]
    fn test_wtx_matches_brute_force() {
        let mut arena = RowArena::new(true);
        arena.push_field_aware(0.0, &[(0, 0, 1.0), (1, 3, 0.5), (2, 4, -2.0), (1, 7, 1.5)]);
        arena.push_field_aware(0.0, &[(2, 2, 1.0)]);
        for num_factor in [8usize, 4, 3].iter() {
            let hp = ffm_hp(*num_factor, 3, true);
            let loss = LossFFM::new(&hp).unwrap();
            let model = ffm_model(&hp);
            let mut pred = vec![0.0; 2];
            loss.predict(&arena.all_rows(), &model, &mut pred);
            for i in 0..2 {
                assert_epsilon!(pred[i], brute_force_wtx(&hp, &arena.row(i), model.get_parameter()));
            }
        }
    }

    #[test]
    fn test_pair_gradient() {
        let hp = ffm_hp(4, 2, true);
        let mut loss = LossFFM::new(&hp).unwrap();
        let mut updater = new_updater(&hp).unwrap();
        let mut model = ffm_model(&hp);
        let before: Vec<f32> = model.get_parameter().to_vec();
        let mut arena = RowArena::new(true);
        arena.push_field_aware(1.0, &[(0, 2, 0.5), (1, 5, 2.0)]);
        let pred = brute_force_wtx(&hp, &arena.row(0), &before);
        let pg = pred - 1.0;
        loss.calc_grad(&arena.all_rows(), &mut model, updater.as_mut());

        let a = v_start(&hp, 2, 1);
        let b = v_start(&hp, 5, 0);
        for f in 0..4 {
            assert_epsilon!(model.get_parameter()[a + f], before[a + f] - 0.1 * pg * 0.5 * 2.0 * before[b + f]);
            assert_epsilon!(model.get_parameter()[b + f], before[b + f] - 0.1 * pg * 0.5 * 2.0 * before[a + f]);
        }
        assert_epsilon!(model.get_parameter()[2], before[2] - 0.1 * pg * 0.5);
        // blocks of pairs that did not occur stay put
        let untouched = v_start(&hp, 2, 0);
        assert_eq!(model.get_parameter()[untouched], before[untouched]);
    }

    #[test]
    fn test_dense_learns() {
        let hp = ffm_hp(4, 2, false);
        let mut loss = LossFFM::new(&hp).unwrap();
        let mut updater = new_updater(&hp).unwrap();
        let mut model = ffm_model(&hp);
        let mut arena = RowArena::new(true);
        arena.push_field_aware(1.0, &[(0, 0, 1.0), (1, 3, 1.0)]);
        arena.push_field_aware(-1.0, &[(0, 1, 1.0), (1, 3, 1.0)]);
        arena.push_field_aware(0.5, &[(0, 1, 1.0), (1, 4, 1.0)]);
        let batch = arena.all_rows();
        let mut pred = vec![0.0; 3];
        loss.predict(&batch, &model, &mut pred);
        let before = loss.evaluate(&pred, batch.labels());
        for _ in 0..100 {
            loss.calc_grad(&batch, &mut model, updater.as_mut());
        }
        loss.predict(&batch, &model, &mut pred);
        let after = loss.evaluate(&pred, batch.labels());
        assert!(after < before * 0.5, "before {} after {}", before, after);
    }

    #[test]
    fn test_initialize_checks() {
        let mut hp = ffm_hp(4, 2, true);
        hp.num_field = 0;
        assert!(LossFFM::new(&hp).is_err());
        let mut hp = ffm_hp(4, 2, true);
        hp.num_factor = 0;
        assert!(LossFFM::new(&hp).is_err());
        let mut hp = ffm_hp(4, 2, true);
        hp.num_param = MAX_FEATURE * 5;
        assert!(LossFFM::new(&hp).is_err());
    }

    #[test]
    fn test_bias_has_no_pairs() {
        let hp = ffm_hp(2, 3, true);
        let mut loss = LossFFM::new(&hp).unwrap();
        let mut updater = new_updater(&hp).unwrap();
        let mut model = Model::new(hp.num_param, UpdaterType::SGD, false).unwrap();
        {
            let w = model.get_parameter_mut();
            w[0] = 0.5;
            // bias latent blocks and the blocks they would pair with
            for field in 0..3 {
                w[v_start(&hp, 0, field)..v_start(&hp, 0, field) + 2].copy_from_slice(&[1.0, 1.0]);
            }
            w[v_start(&hp, 3, 0)..v_start(&hp, 3, 0) + 2].copy_from_slice(&[1.0, 1.0]);
            w[v_start(&hp, 5, 0)..v_start(&hp, 5, 0) + 2].copy_from_slice(&[1.0, 1.0]);
        }
        let parser = crate::parser::Parser::new(crate::hyper_parameters::FileFormat::LibFFM);
        let mut row = crate::data::SparseRowBuf::new();
        parser.parse_line("1 1:3:1 2:5:1", 1, &mut row).unwrap();
        let mut arena = RowArena::new_with_bias(true);
        arena.push_row(&row);

        let mut pred = vec![0.0; 1];
        loss.predict(&arena.all_rows(), &model, &mut pred);
        // only the bias weight, pair (3, 5) reads v_{3,2} and v_{5,1} which are zero
        assert_eq!(pred[0], 0.5);

        let before: Vec<f32> = model.get_parameter().to_vec();
        loss.calc_grad(&arena.all_rows(), &mut model, updater.as_mut());
        for field in 0..3 {
            let start = v_start(&hp, 0, field);
            assert_eq!(&model.get_parameter()[start..start + 2], &before[start..start + 2]);
        }
        assert_epsilon!(model.get_parameter()[0], 0.5 - 0.1 * (0.5 - 1.0));

        // the same row without the bias flag pairs the bias with both features
        let mut unbiased = RowArena::new(true);
        unbiased.push_row(&row);
        loss.predict(&unbiased.all_rows(), &before_model(&hp, &before), &mut pred);
        assert_epsilon!(pred[0], 0.5 + 2.0 + 2.0);
    }

    fn before_model(hp: &HyperParam, w: &[f32]) -> Model {
        let mut model = Model::new(hp.num_param, UpdaterType::SGD, false).unwrap();
        model.get_parameter_mut().copy_from_slice(w);
        model
    }

    #[test]
    #[should_panic]
    fn test_rows_without_fields() {
        let hp = ffm_hp(4, 2, true);
        let loss = LossFFM::new(&hp).unwrap();
        let model = ffm_model(&hp);
        let mut arena = RowArena::new(false);
        arena.push_sparse(1.0, &[(1, 1.0)]);
        let mut pred = vec![0.0; 1];
        loss.predict(&arena.all_rows(), &model, &mut pred);
    }
}
