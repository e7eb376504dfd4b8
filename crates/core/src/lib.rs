pub mod error;
pub mod types;

pub use error::ErrorKind;
pub use types::{CodecType, QualityParams, RateControlMode};
