//! Named storage declared by a fragment.

use serde::{Deserialize, Serialize};
use tessera_common::{Shape, Value};

/// A fixed-shape storage location with a reset value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique name within the fragment.
    pub name: String,
    /// Width and signedness.
    pub shape: Shape,
    /// Value at simulation start and on domain reset, already cast to `shape`.
    pub reset: Value,
    /// If set, domain resets leave this signal alone.
    pub reset_less: bool,
}

impl Signal {
    /// A signal that resets to zero.
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            reset: Value::zero(shape),
            reset_less: false,
        }
    }

    /// Sets the reset value, truncating or extending it to the signal's shape.
    pub fn with_reset(mut self, reset: impl Into<Value>) -> Self {
        self.reset = reset.into().cast(self.shape);
        self
    }

    /// Marks the signal as unaffected by domain resets.
    pub fn reset_less(mut self) -> Self {
        self.reset_less = true;
        self
    }
}
