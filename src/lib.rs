pub mod vector_lane;

pub mod cmdline;
pub mod consts;
pub mod data;
pub mod gradient;
pub mod hyper_parameters;
pub mod logging_layer;
pub mod loss;
pub mod loss_ffm;
pub mod loss_fm;
pub mod loss_linear;
pub mod loss_lr;
pub mod loss_svm;
pub mod model_parameters;
pub mod parser;
pub mod reader;
pub mod trainer;
pub mod updater;
pub mod validator;
