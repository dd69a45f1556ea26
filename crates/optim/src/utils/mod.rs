mod checkpoint;
mod monitor;
mod recorder;

pub use checkpoint::*;
pub use monitor::*;
pub use recorder::*;

/// Env variable to set log level, default "info"
pub const HISCORE_LOG: &str = "HISCORE_LOG";

/// Json has no representation for infinite floats: `-inf` is written as `null`
/// and read back as `-inf`.
pub(crate) mod neg_inf_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
    }
}
