pub mod model;

pub use model::{LinearChainCrf, Reduction};
