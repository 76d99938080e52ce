use std::error::Error;

use crate::loss::LossTrait;
use crate::model_parameters::Model;
use crate::reader::InmemReader;

/// Full evaluation passes over one or two readers through a kernel's predict and evaluate.
pub struct Validator<'a> {
    loss: &'a dyn LossTrait,
}

impl<'a> Validator<'a> {
    pub fn new(loss: &'a dyn LossTrait) -> Validator<'a> {
        Validator { loss: loss }
    }

    /// Logs the training loss and, given a validation reader, the validation loss.
    /// Returns the validation loss when there is one, the training loss otherwise.
    pub fn validate(&self,
                    model: &Model,
                    train_reader: &mut InmemReader,
                    val_reader: Option<&mut InmemReader>,
                    iteration: usize) -> Result<f32, Box<dyn Error>> {
        let train_loss = self.average_loss(model, train_reader)?;
        match val_reader {
            Some(val_reader) => {
                let val_loss = self.average_loss(model, val_reader)?;
                log::info!("Epoch {}: train loss {:.6}, validation loss {:.6}", iteration, train_loss, val_loss);
                Ok(val_loss)
            },
            None => {
                log::info!("Epoch {}: train loss {:.6}", iteration, train_loss);
                Ok(train_loss)
            },
        }
    }

    /// Summed loss over every row of the reader divided by the row count.
    pub fn average_loss(&self, model: &Model, reader: &mut InmemReader) -> Result<f32, Box<dyn Error>> {
        let mut pred: Vec<f32> = Vec::new();
        let mut loss_sum: f64 = 0.0;
        let mut total: usize = 0;
        reader.go_to_head();
        loop {
            let matrix = reader.samples();
            if matrix.is_empty() {
                break;
            }
            pred.resize(matrix.row_count(), 0.0);
            self.loss.predict(&matrix, model, &mut pred);
            loss_sum += self.loss.evaluate(&pred, matrix.labels()) as f64;
            total += matrix.row_count();
        }
        reader.go_to_head();
        if total == 0 {
            return Err("Can not validate on a data source without rows".to_string())?;
        }
        let avg = (loss_sum / total as f64) as f32;
        if !avg.is_finite() {
            log::warn!("Loss is not finite: {}", avg);
        }
        Ok(avg)
    }
}
