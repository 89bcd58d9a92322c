//! Topic-model collaborators and the fitted result they produce.

pub mod mallet;
pub mod modeler;
pub mod types;

pub use mallet::{parse_mallet_state, MalletTopicModeler};
pub use modeler::{PrecomputedTopicModel, TopicModeler};
pub use types::*;
