use std::error::Error;

use crate::consts::MAX_NUM_FACTOR;
use crate::data::{DMatrix, SparseRow};
use crate::hyper_parameters::{HyperParam, TaskType};
use crate::loss::{self, GradientSink, LossTrait};
use crate::model_parameters::Model;
use crate::specialize_lane;
use crate::updater::UpdaterTrait;
use crate::vector_lane::select_lane_width;

// Factorization machine.
// The pairwise term sum_{i<j} <v_i, v_j> x_i x_j is evaluated in O(k n) as
// 0.5 * sum_k [ (sum_j x_j v_jk)^2 - sum_j (x_j v_jk)^2 ].
// Feature idx keeps its k latent weights at max_feature + idx * k.
pub struct LossFM {
    task_type: TaskType,
    max_feature: usize,
    num_factor: usize,
    lane_width: usize,
    sink: GradientSink,
}

impl LossFM {
    pub fn new(hp: &HyperParam) -> Result<LossFM, Box<dyn Error>> {
        loss::check_num_factor(hp)?;
        loss::check_problem_size(hp, 1 + hp.num_factor)?;
        let lane_width = select_lane_width(hp.num_factor);
        log::info!("FM with {} factors, lane width {}", hp.num_factor, lane_width);
        Ok(LossFM {
            task_type: hp.task_type,
            max_feature: hp.max_feature,
            num_factor: hp.num_factor,
            lane_width: lane_width,
            sink: GradientSink::new(hp)?,
        })
    }

    #[inline(always)]
    fn latent_start(&self, idx: u32) -> usize {
        self.max_feature + idx as usize * self.num_factor
    }

    // Score of one row. Leaves sum_j x_j v_jk in sums, the gradient reuses it.
    fn wtx(&self, row: &SparseRow, w: &[f32], sums: &mut [f32]) -> f32 {
        let k = self.num_factor;
        let mut val = loss::linear_wtx(row, w);
        sums.iter_mut().for_each(|s| *s = 0.0);
        let mut squares: f32 = 0.0;
        specialize_lane!(self.lane_width, Lane, {
            for (idx, x) in row.indices.iter().zip(row.values.iter()) {
                let start = self.latent_start(*idx);
                let v = &w[start..start + k];
                Lane::mul_add(sums, v, *x);
                squares += x * x * Lane::dot(v, v);
            }
            val += 0.5 * (Lane::dot(sums, sums) - squares);
        });
        val
    }
}

impl LossTrait for LossFM {
    fn get_name(&self) -> &'static str {
        "FM"
    }

    fn predict(&self, matrix: &DMatrix, model: &Model, pred: &mut [f32]) {
        loss::check_predict(matrix, pred);
        let mut sumbuf = [0.0f32; MAX_NUM_FACTOR];
        let sums = &mut sumbuf[..self.num_factor];
        let w = model.get_parameter();
        for (p, row) in pred.iter_mut().zip(matrix.rows()) {
            *p = self.wtx(&row, w, sums);
        }
    }

    fn calc_grad(&mut self, matrix: &DMatrix, model: &mut Model, updater: &mut dyn UpdaterTrait) {
        loss::check_batch(matrix);
        let k = self.num_factor;
        let mut sumbuf = [0.0f32; MAX_NUM_FACTOR];
        let mut gradbuf = [0.0f32; MAX_NUM_FACTOR];
        let sums = &mut sumbuf[..k];
        let lane_grad = &mut gradbuf[..k];
        for (row, label) in matrix.rows().zip(matrix.labels()) {
            let pred = self.wtx(&row, model.get_parameter(), sums);
            let pg = loss::partial_gradient(self.task_type, pred, *label);
            for (idx, x) in row.indices.iter().zip(row.values.iter()) {
                self.sink.push(*idx as usize, pg * x, model, updater);
            }
            // d pred / d v_jk = x_j * sums_k - v_jk * x_j^2
            specialize_lane!(self.lane_width, Lane, {
                for (idx, x) in row.indices.iter().zip(row.values.iter()) {
                    let start = self.latent_start(*idx);
                    Lane::sub_scaled(lane_grad, sums, x * pg, &model.get_parameter()[start..start + k], x * x * pg);
                    self.sink.push_seq(lane_grad, start, model, updater);
                }
            });
        }
        self.sink.finish_batch(matrix.row_count(), model, updater);
    }

    fn evaluate(&self, pred: &[f32], label: &[f32]) -> f32 {
        loss::task_loss(self.task_type, pred, label)
    }
}
