mod constants;

// Modules
pub mod blp;
pub mod causal;
pub mod config;
pub mod data;
pub mod double_ml;
pub mod errors;
pub mod inference;
pub mod learner;
pub mod nuisance;
pub mod resampling;
pub mod root;
pub mod score;
pub mod utils;

// Individual classes, and functions
pub use causal::iivm::Iivm;
pub use causal::irm::{Irm, IrmScore};
pub use causal::lpq::Lpq;
pub use causal::pliv::Pliv;
pub use causal::plr::{Plr, PlrScore};
pub use config::{ConfigIO, DmlProcedure, DoubleMLConfig};
pub use data::{DoubleMLData, Matrix};
pub use double_ml::{CausalModel, DoubleML};
pub use errors::DoubleMLError;
pub use inference::{BootstrapMethod, CausalEstimate, PAdjustMethod};
pub use learner::{Learner, LearnerCapabilities};
pub use nuisance::ExternalPredictions;
