use std::error::Error;
use std::io::Error as IOError;
use std::io::ErrorKind;

use std::fs::File;
use std::io;
use serde::{Serialize,Deserialize};

use crate::consts;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    LR,
    FM,
    FFM,
    Linear,
    SVM,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Binary,
    #[serde(rename = "multi-class")]
    MultiClass,
    Regression,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Copy)]
#[serde(rename_all = "lowercase")]
pub enum UpdaterType {
    SGD,
    AdaGrad,
    AdaDelta,
    Momentum,
    RMSProp,
    Adam,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Copy)]
#[serde(rename_all = "lowercase")]
pub enum RegularType {
    L1,
    L2,
    None,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Copy)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    LibSVM,
    LibFFM,
}

fn unknown_name(what: &str, name: &str) -> Box<dyn Error> {
    Box::new(IOError::new(ErrorKind::Other, format!("Unknown {}: \"{}\"", what, name)))
}

impl ModelType {
    pub fn from_name(name: &str) -> Result<ModelType, Box<dyn Error>> {
        match name.to_lowercase().as_str() {
            "lr" => Ok(ModelType::LR),
            "fm" => Ok(ModelType::FM),
            "ffm" => Ok(ModelType::FFM),
            "linear" => Ok(ModelType::Linear),
            "svm" => Ok(ModelType::SVM),
            _ => Err(unknown_name("model type", name)),
        }
    }
}

impl TaskType {
    pub fn from_name(name: &str) -> Result<TaskType, Box<dyn Error>> {
        match name.to_lowercase().as_str() {
            "binary" => Ok(TaskType::Binary),
            "multi-class" => Ok(TaskType::MultiClass),
            "regression" => Ok(TaskType::Regression),
            _ => Err(unknown_name("task type", name)),
        }
    }

    pub fn is_classification(&self) -> bool {
        *self != TaskType::Regression
    }
}

impl UpdaterType {
    pub fn from_name(name: &str) -> Result<UpdaterType, Box<dyn Error>> {
        match name.to_lowercase().as_str() {
            "sgd" => Ok(UpdaterType::SGD),
            "adagrad" => Ok(UpdaterType::AdaGrad),
            "adadelta" => Ok(UpdaterType::AdaDelta),
            "momentum" => Ok(UpdaterType::Momentum),
            "rmsprop" => Ok(UpdaterType::RMSProp),
            "adam" => Ok(UpdaterType::Adam),
            _ => Err(unknown_name("updater type", name)),
        }
    }

    /// How many per-parameter accumulator vectors the optimizer keeps next to the weights.
    pub fn num_caches(&self) -> usize {
        match self {
            UpdaterType::SGD => 0,
            UpdaterType::AdaGrad | UpdaterType::Momentum | UpdaterType::RMSProp => 1,
            UpdaterType::AdaDelta | UpdaterType::Adam => 2,
        }
    }
}

impl RegularType {
    pub fn from_name(name: &str) -> Result<RegularType, Box<dyn Error>> {
        match name.to_lowercase().as_str() {
            "l1" => Ok(RegularType::L1),
            "l2" => Ok(RegularType::L2),
            "none" => Ok(RegularType::None),
            _ => Err(unknown_name("regularizer type", name)),
        }
    }
}

impl FileFormat {
    pub fn from_name(name: &str) -> Result<FileFormat, Box<dyn Error>> {
        match name.to_lowercase().as_str() {
            "libsvm" => Ok(FileFormat::LibSVM),
            "libffm" => Ok(FileFormat::LibFFM),
            _ => Err(unknown_name("file format", name)),
        }
    }
}


#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HyperParam {
    pub is_train: bool,
    pub is_sparse: bool,
    pub cross_validation: bool,
    pub early_stop: bool,
    pub sigmoid: bool,

    pub model_type: ModelType,
    pub task_type: TaskType,
    pub updater_type: UpdaterType,
    pub regu_type: RegularType,
    pub file_format: FileFormat,

    pub learning_rate: f32,
    pub regu_lambda: f32,
    pub decay_rate: f32,
    pub second_decay_rate: f32,

    pub num_factor: usize,
    // derived from data by set_problem(); in prediction mode it may be given explicitly
    pub num_field: usize,
    pub max_feature: usize,
    pub num_param: usize,

    pub batch_size: usize,
    pub num_iteration: usize,
    pub num_folds: usize,

    pub train_set_file: Option<String>,
    pub test_set_file: Option<String>,
    pub model_checkpoint_file: String,
    pub output_file: Option<String>,
}

impl Default for HyperParam {
    fn default() -> HyperParam {
        HyperParam::new_empty()
    }
}

impl HyperParam {
    pub fn new_empty() -> HyperParam {
        HyperParam {
            is_train: true,
            is_sparse: false,
            cross_validation: false,
            early_stop: false,
            sigmoid: false,
            model_type: ModelType::LR,
            task_type: TaskType::Binary,
            updater_type: UpdaterType::SGD,
            regu_type: RegularType::L2,
            file_format: FileFormat::LibSVM,
            learning_rate: 0.01,
            regu_lambda: 0.01,
            decay_rate: 0.9,
            second_decay_rate: 0.9,
            num_factor: 10,
            num_field: 0,
            max_feature: 0,
            num_param: 0,
            batch_size: 1000,
            num_iteration: 50,
            num_folds: 10,
            train_set_file: None,
            test_set_file: None,
            model_checkpoint_file: "/tmp/model_ck".to_string(),
            output_file: None,
        }
    }

    pub fn new_from_cmdline<'a>(cl: &clap::ArgMatches<'a>) -> Result<HyperParam, Box<dyn Error>> {
        let mut hp = HyperParam::new_empty();

        hp.is_train = !cl.is_present("predict");
        hp.is_sparse = cl.is_present("is_sparse");
        hp.cross_validation = cl.is_present("cross_validation");
        hp.early_stop = cl.is_present("early_stop");
        hp.sigmoid = cl.is_present("sigmoid");

        if let Some(val) = cl.value_of("model_type") {
            hp.model_type = ModelType::from_name(val)?;
        }
        if let Some(val) = cl.value_of("task_type") {
            hp.task_type = TaskType::from_name(val)?;
        }
        if let Some(val) = cl.value_of("updater_type") {
            hp.updater_type = UpdaterType::from_name(val)?;
        }
        if let Some(val) = cl.value_of("regu_type") {
            hp.regu_type = RegularType::from_name(val)?;
        }
        if let Some(val) = cl.value_of("file_format") {
            hp.file_format = FileFormat::from_name(val)?;
        } else if hp.model_type == ModelType::FFM {
            hp.file_format = FileFormat::LibFFM;
        }

        if let Some(val) = cl.value_of("learning_rate") {
            hp.learning_rate = val.parse()?;
        }
        if let Some(val) = cl.value_of("regu_lambda") {
            hp.regu_lambda = val.parse()?;
        }
        if let Some(val) = cl.value_of("decay_rate") {
            hp.decay_rate = val.parse()?;
        }
        if let Some(val) = cl.value_of("second_decay_rate") {
            hp.second_decay_rate = val.parse()?;
        }
        if let Some(val) = cl.value_of("num_factor") {
            hp.num_factor = val.parse()?;
        }
        if let Some(val) = cl.value_of("num_field") {
            hp.num_field = val.parse()?;
        }
        if let Some(val) = cl.value_of("batch_size") {
            hp.batch_size = val.parse()?;
        }
        if let Some(val) = cl.value_of("num_iteration") {
            hp.num_iteration = val.parse()?;
        }
        if let Some(val) = cl.value_of("num_folds") {
            hp.num_folds = val.parse()?;
        }

        hp.train_set_file = cl.value_of("train_set_file").map(|s| s.to_string());
        hp.test_set_file = cl.value_of("test_set_file").map(|s| s.to_string());
        hp.output_file = cl.value_of("output_file").map(|s| s.to_string());
        if let Some(val) = cl.value_of("model_checkpoint_file") {
            hp.model_checkpoint_file = val.to_string();
        }

        Ok(hp)
    }

    pub fn new_from_jsonfile(filename: &str) -> Result<HyperParam, Box<dyn Error>> {
        let input = io::BufReader::new(File::open(filename)?);
        let hp: HyperParam = serde_json::from_reader(input)?;
        Ok(hp)
    }

    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        if self.batch_size == 0 {
            return Err("--batch_size has to be positive".to_string())?;
        }
        if self.num_iteration == 0 {
            return Err("--num_iteration has to be positive".to_string())?;
        }
        if self.cross_validation && self.num_folds < 2 {
            return Err(format!("--num_folds has to be at least 2 for cross validation, got {}", self.num_folds))?;
        }
        if self.num_factor > consts::MAX_NUM_FACTOR {
            return Err(format!("--num_factor can be at most {}, got {}", consts::MAX_NUM_FACTOR, self.num_factor))?;
        }
        if self.model_checkpoint_file.is_empty() {
            return Err("--model_checkpoint_file can not be empty".to_string())?;
        }
        if self.is_train {
            if self.train_set_file.is_none() {
                return Err("Training requires --train_set_file".to_string())?;
            }
        } else {
            if self.test_set_file.is_none() {
                return Err("Prediction requires --test_set_file".to_string())?;
            }
            if self.cross_validation {
                return Err("--cross_validation can not be combined with --predict".to_string())?;
            }
        }
        if self.model_type == ModelType::FFM && self.file_format != FileFormat::LibFFM {
            return Err("ffm model requires libffm file format".to_string())?;
        }
        Ok(())
    }

    pub fn use_gaussian_init(&self) -> bool {
        matches!(self.model_type, ModelType::FM | ModelType::FFM)
    }

    /// Sets problem size from the largest feature index and field id seen in the data.
    pub fn set_problem(&mut self, max_feature_index: u32, max_field: u32) {
        self.max_feature = align_max_feature(max_feature_index);
        self.num_field = if self.model_type == ModelType::FFM { max_field as usize + 1 } else { 0 };
        self.num_param = self.params_per_feature() * self.max_feature;
        log::info!("Problem size: max_feature {}, num_field {}, num_param {}",
                   self.max_feature, self.num_field, self.num_param);
    }

    /// FFM field count for prediction. An explicit num_field is kept, it only has to cover
    /// the fields in the data; otherwise it is the largest field id seen plus one.
    /// Pass the largest field over the same data sets training saw.
    pub fn set_prediction_fields(&mut self, max_field: u32) -> Result<(), Box<dyn Error>> {
        if self.model_type != ModelType::FFM {
            self.num_field = 0;
            return Ok(());
        }
        let seen = max_field as usize + 1;
        if self.num_field == 0 {
            self.num_field = seen;
        } else if seen > self.num_field {
            return Err(format!("Data has field id {}, but --num_field is {}", max_field, self.num_field))?;
        }
        Ok(())
    }

    /// Recovers max_feature from the element count of an existing checkpoint.
    /// For FFM, num_field has to be known already.
    pub fn set_problem_from_num_param(&mut self, num_param: usize) -> Result<(), Box<dyn Error>> {
        let per_feature = self.params_per_feature();
        if per_feature == 0 || num_param == 0 || num_param % per_feature != 0 {
            return Err(format!("Checkpoint has {} parameters, which does not fit {} parameters per feature",
                               num_param, per_feature))?;
        }
        self.max_feature = num_param / per_feature;
        self.num_param = num_param;
        Ok(())
    }

    fn params_per_feature(&self) -> usize {
        match self.model_type {
            ModelType::FFM => 1 + self.num_factor * self.num_field,
            ModelType::FM => 1 + self.num_factor,
            _ => 1,
        }
    }
}

pub fn align_max_feature(max_feature_index: u32) -> usize {
    let alignment = consts::FEATURE_ALIGNMENT;
    ((max_feature_index as usize + alignment) / alignment) * alignment
}
