use std::error::Error;
use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::time::Instant;

use fmlearn::data::problem_bounds;
use fmlearn::hyper_parameters::{HyperParam, ModelType};
use fmlearn::reader::{read_problem, InmemReader};
use fmlearn::trainer::TrainingContext;
use fmlearn::{cmdline, logging_layer};

fn main() {
    logging_layer::initialize_logging_layer();

    if let Err(e) = main_fmlearn_loop() {
        log::error!("Global error: {:?}", e);
        std::process::exit(1)
    }
}

fn main_fmlearn_loop() -> Result<(), Box<dyn Error>> {
    let cl = cmdline::parse();
    let mut hp = match cl.value_of("config") {
        Some(filename) => {
            log::info!("Reading hyperparameters from {}", filename);
            HyperParam::new_from_jsonfile(filename)?
        },
        None => HyperParam::new_from_cmdline(&cl)?,
    };
    hp.validate()?;
    log::debug!("Hyperparameters: {:?}", hp);

    let now = Instant::now();
    if hp.is_train {
        train(&mut hp)?;
    } else {
        predict(&mut hp)?;
    }
    log::info!("Elapsed: {:.2?}", now.elapsed());
    Ok(())
}

fn train(hp: &mut HyperParam) -> Result<(), Box<dyn Error>> {
    let train_filename = match &hp.train_set_file {
        Some(filename) => filename.clone(),
        None => return Err("Training requires --train_set_file")?,
    };
    let train_arena = read_problem(&train_filename, hp.file_format)?;
    if train_arena.row_count() == 0 {
        return Err(format!("No rows found in {}", train_filename))?;
    }
    let test_arena = match &hp.test_set_file {
        Some(filename) => Some(read_problem(filename, hp.file_format)?),
        None => None,
    };

    let (max_feature_index, max_field) = match &test_arena {
        Some(test_arena) => problem_bounds(&[&train_arena, test_arena]),
        None => problem_bounds(&[&train_arena]),
    };
    hp.set_problem(max_feature_index, max_field);

    let mut ctx = TrainingContext::new(hp)?;
    if hp.cross_validation {
        ctx.cross_validate(&train_arena)?;
        return Ok(());
    }

    let mut train_reader = InmemReader::from_arena(train_arena, hp.batch_size);
    let mut test_reader = test_arena.map(|arena| InmemReader::from_arena(arena, hp.batch_size));
    let loss = ctx.train(&mut train_reader, test_reader.as_mut())?;
    log::info!("Final loss: {:.6}, checkpoint saved to {}", loss, hp.model_checkpoint_file);
    Ok(())
}

fn predict(hp: &mut HyperParam) -> Result<(), Box<dyn Error>> {
    let test_filename = match &hp.test_set_file {
        Some(filename) => filename.clone(),
        None => return Err("Prediction requires --test_set_file")?,
    };
    let mut reader = InmemReader::new(&test_filename, hp.batch_size, hp.file_format)?;
    // ffm fields have to be counted over the same files training saw
    let mut max_field = reader.arena().max_field();
    if hp.model_type == ModelType::FFM {
        if let Some(train_filename) = &hp.train_set_file {
            let train_arena = read_problem(train_filename, hp.file_format)?;
            max_field = problem_bounds(&[&train_arena, reader.arena()]).1;
        }
    }
    hp.set_prediction_fields(max_field)?;
    // problem size comes from the checkpoint
    hp.num_param = 0;
    let ctx = TrainingContext::new_for_prediction(hp)?;
    if reader.arena().max_feature_index() as usize >= ctx.hp.max_feature {
        return Err(format!("{} has feature index {}, checkpoint only covers {} features",
                           test_filename, reader.arena().max_feature_index(), ctx.hp.max_feature))?;
    }

    let mut out: Box<dyn Write> = match &hp.output_file {
        Some(filename) => Box::new(BufWriter::new(File::create(filename)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    ctx.predict(&mut reader, out.as_mut(), hp.sigmoid)?;
    Ok(())
}
