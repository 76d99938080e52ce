use clap::{App, AppSettings, Arg};

use crate::consts;

pub fn parse<'a>() -> clap::ArgMatches<'a> {
    create_expected_args().get_matches()
}

fn value_arg<'a>(name: &'a str, value_name: &'a str, help: &'a str) -> Arg<'a, 'a> {
    Arg::with_name(name)
        .long(name)
        .value_name(value_name)
        .help(help)
        .takes_value(true)
}

fn flag_arg<'a>(name: &'a str, help: &'a str) -> Arg<'a, 'a> {
    Arg::with_name(name)
        .long(name)
        .help(help)
        .takes_value(false)
}

pub fn create_expected_args<'a>() -> App<'a, 'a> {
    App::new("fmlearn")
        .version(consts::get_version())
        .about("Mini-batch training and prediction for LR, FM and FFM models")
        .setting(AppSettings::DeriveDisplayOrder)
        .arg(value_arg("config", "filename", "JSON file with hyperparameters, replaces all other options"))
        .arg(flag_arg("predict", "Predict with a saved checkpoint instead of training"))
        .arg(value_arg("model_type", "lr|fm|ffm|linear|svm", "Model to train (default lr)"))
        .arg(value_arg("task_type", "binary|multi-class|regression", "Learning task (default binary)"))
        .arg(value_arg("file_format", "libsvm|libffm", "Input format (default libsvm, libffm for ffm)"))
        .arg(value_arg("updater_type", "sgd|adagrad|adadelta|momentum|rmsprop|adam", "Optimizer (default sgd)"))
        .arg(value_arg("regu_type", "l1|l2|none", "Regularizer (default l2)"))
        .arg(value_arg("regu_lambda", "f32", "Regularizer strength (default 0.01)"))
        .arg(value_arg("learning_rate", "f32", "Learning rate (default 0.01)"))
        .arg(value_arg("decay_rate", "f32", "Decay of momentum, rmsprop, adadelta and adam's first moment (default 0.9)"))
        .arg(value_arg("second_decay_rate", "f32", "Decay of adam's second moment (default 0.9)"))
        .arg(value_arg("num_factor", "k", "Latent factors per feature for fm and ffm (default 10)"))
        .arg(value_arg("num_field", "n", "Fields of an ffm checkpoint, for prediction without --train_set_file"))
        .arg(flag_arg("is_sparse", "Apply updates row by row instead of once per averaged mini-batch"))
        .arg(value_arg("batch_size", "n", "Rows per mini-batch (default 1000)"))
        .arg(value_arg("num_iteration", "n", "Epochs over the training set (default 50)"))
        .arg(flag_arg("early_stop", "Stop and roll back as soon as the epoch loss rises"))
        .arg(flag_arg("cross_validation", "Run k-fold cross validation on the training set"))
        .arg(value_arg("num_folds", "k", "Folds for cross validation (default 10)"))
        .arg(value_arg("train_set_file", "filename", "Training data, .gz and .zst are decompressed. With --predict it only sizes ffm fields"))
        .arg(value_arg("test_set_file", "filename", "Validation data in training, input data in prediction"))
        .arg(value_arg("model_checkpoint_file", "filename", "Checkpoint base name (default /tmp/model_ck)"))
        .arg(value_arg("output_file", "filename", "Where predictions go (default stdout)"))
        .arg(flag_arg("sigmoid", "Pass predictions through the logistic function"))
}
