use std::error::Error;
use std::io::Write;

use crate::data::RowArena;
use crate::hyper_parameters::HyperParam;
use crate::loss::{self, LossTrait, new_loss};
use crate::model_parameters::{allocate_zeroed, Model};
use crate::reader::InmemReader;
use crate::updater::{new_updater, UpdaterTrait};
use crate::validator::Validator;

/// Everything one run needs: configuration, parameters, kernel and optimizer.
pub struct TrainingContext {
    pub hp: HyperParam,
    pub model: Model,
    loss: Box<dyn LossTrait>,
    updater: Box<dyn UpdaterTrait>,
}

impl TrainingContext {
    /// Fresh model sized by hp.num_param. Call hp.set_problem() first.
    pub fn new(hp: &HyperParam) -> Result<TrainingContext, Box<dyn Error>> {
        let model = Model::new(hp.num_param, hp.updater_type, hp.use_gaussian_init())?;
        TrainingContext::with_model(hp.clone(), model)
    }

    /// Model restored from hp.model_checkpoint_file. With hp.num_param left at 0 the
    /// problem size is derived from the checkpoint, otherwise the two have to agree.
    pub fn new_for_prediction(hp: &HyperParam) -> Result<TrainingContext, Box<dyn Error>> {
        let model = Model::new_from_checkpoint(&hp.model_checkpoint_file, hp.updater_type)?;
        let mut hp = hp.clone();
        if hp.num_param == 0 {
            hp.set_problem_from_num_param(model.get_length())?;
        } else if model.get_length() != hp.num_param {
            return Err(format!("Checkpoint {} holds {} parameters, configuration expects {}",
                               hp.model_checkpoint_file, model.get_length(), hp.num_param))?;
        }
        TrainingContext::with_model(hp, model)
    }

    fn with_model(hp: HyperParam, model: Model) -> Result<TrainingContext, Box<dyn Error>> {
        let loss = new_loss(&hp)?;
        let updater = new_updater(&hp)?;
        Ok(TrainingContext {
            hp: hp,
            model: model,
            loss: loss,
            updater: updater,
        })
    }

    fn train_epoch(&mut self, reader: &mut InmemReader) {
        reader.go_to_head();
        loop {
            let matrix = reader.samples();
            if matrix.is_empty() {
                break;
            }
            self.loss.calc_grad(&matrix, &mut self.model, self.updater.as_mut());
        }
    }

    /// Runs up to num_iteration epochs and saves the checkpoint.
    /// With early_stop, the first epoch whose loss rises above the previous one is
    /// undone and training stops there.
    pub fn train(&mut self, train_reader: &mut InmemReader, mut test_reader: Option<&mut InmemReader>) -> Result<f32, Box<dyn Error>> {
        log::info!("Start training: {} epochs, batch size {}, loss {}, updater {}",
                   self.hp.num_iteration, self.hp.batch_size, self.loss.get_name(), self.updater.get_name());
        let mut snapshot = if self.hp.early_stop { allocate_zeroed(self.model.get_length(), "snapshot")? } else { Vec::new() };
        let mut prev_loss = f32::MAX;
        let mut last_loss = f32::MAX;
        for iteration in 0..self.hp.num_iteration {
            self.train_epoch(train_reader);
            let current_loss = Validator::new(self.loss.as_ref())
                .validate(&self.model, train_reader, test_reader.as_deref_mut(), iteration)?;
            if self.hp.early_stop && current_loss > prev_loss {
                log::info!("Early stop at iteration {} / {}, rolling back to loss {:.6}",
                           iteration, self.hp.num_iteration, prev_loss);
                self.model.load_weight(&snapshot);
                last_loss = prev_loss;
                break;
            }
            last_loss = current_loss;
            prev_loss = current_loss;
            if self.hp.early_stop {
                self.model.save_weight(&mut snapshot);
            }
        }
        self.model.save_model(&self.hp.model_checkpoint_file)?;
        Ok(last_loss)
    }

    /// k-fold cross validation on rows held in memory: row i is held out in fold i % k.
    /// Every fold starts from a reset model and a fresh optimizer. Returns the mean held-out loss.
    pub fn cross_validate(&mut self, arena: &RowArena) -> Result<f32, Box<dyn Error>> {
        let num_folds = self.hp.num_folds;
        if arena.row_count() < num_folds {
            return Err(format!("Can not split {} rows into {} folds", arena.row_count(), num_folds))?;
        }
        let folds = arena.split_folds(num_folds);
        let mut loss_sum = 0.0;
        for k in 0..num_folds {
            log::info!("Fold {}/{}", k + 1, num_folds);
            self.model.reset(self.hp.use_gaussian_init());
            self.loss = new_loss(&self.hp)?;
            self.updater = new_updater(&self.hp)?;
            let mut train_reader = InmemReader::from_arena(RowArena::merge_except(&folds, k), self.hp.batch_size);
            for _ in 0..self.hp.num_iteration {
                self.train_epoch(&mut train_reader);
            }
            let mut held_out = InmemReader::from_arena(folds[k].clone(), self.hp.batch_size);
            let fold_loss = Validator::new(self.loss.as_ref()).average_loss(&self.model, &mut held_out)?;
            log::info!("Loss on held-out fold {}: {:.6}", k, fold_loss);
            loss_sum += fold_loss;
        }
        let average = loss_sum / num_folds as f32;
        log::info!("Average cross validation loss: {:.6}", average);
        Ok(average)
    }

    /// Writes one score per row. Returns the number of rows written.
    pub fn predict(&self, reader: &mut InmemReader, out: &mut dyn Write, sigmoid: bool) -> Result<usize, Box<dyn Error>> {
        let mut pred: Vec<f32> = Vec::new();
        let mut count = 0;
        reader.go_to_head();
        loop {
            let matrix = reader.samples();
            if matrix.is_empty() {
                break;
            }
            pred.resize(matrix.row_count(), 0.0);
            self.loss.predict(&matrix, &self.model, &mut pred);
            for p in pred.iter() {
                let score = if sigmoid { loss::logistic(*p) } else { *p };
                write!(out, "{:.6}\n", score)?;
            }
            count += matrix.row_count();
        }
        out.flush()?;
        log::info!("Wrote {} predictions", count);
        Ok(count)
    }
}
