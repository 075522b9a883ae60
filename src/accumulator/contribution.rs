use std::fmt;
use std::sync::Arc;

use super::AccumulatorError;

/// Maps an absolute price delta to the amount it adds to an accumulator.
///
/// Every variant returns `0.0` for a zero delta and is non-decreasing in the
/// size of the delta. Custom functions that return a negative or NaN value are
/// clamped to `0.0` so the accumulator can never shrink between releases.
#[derive(Clone, Default)]
pub enum Contribution {
    /// `|delta|`
    #[default]
    Identity,
    /// `|delta| × position_size × leverage`: the notional move of a fixed
    /// leveraged position.
    Leveraged { position_size: f64, leverage: f64 },
    Custom(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl Contribution {
    pub fn leveraged(position_size: f64, leverage: f64) -> Self {
        Self::Leveraged {
            position_size,
            leverage,
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Leveraged { .. } => "leveraged",
            Self::Custom(_) => "custom",
        }
    }

    pub(crate) fn validate(&self) -> Result<(), AccumulatorError> {
        if let Self::Leveraged {
            position_size,
            leverage,
        } = self
        {
            if !(position_size.is_finite() && *position_size > 0.0) {
                return Err(AccumulatorError::InvalidConfig(format!(
                    "position_size must be a positive finite number, got {}",
                    position_size
                )));
            }
            if !(leverage.is_finite() && *leverage > 0.0) {
                return Err(AccumulatorError::InvalidConfig(format!(
                    "leverage must be a positive finite number, got {}",
                    leverage
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&self, delta: f64) -> f64 {
        let delta = delta.abs();
        if delta == 0.0 {
            return 0.0;
        }
        let raw = match self {
            Self::Identity => delta,
            Self::Leveraged {
                position_size,
                leverage,
            } => delta * position_size * leverage,
            Self::Custom(f) => f(delta),
        };
        // f64::max drops NaN in favour of the other operand.
        raw.max(0.0)
    }
}

impl fmt::Debug for Contribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "Identity"),
            Self::Leveraged {
                position_size,
                leverage,
            } => f
                .debug_struct("Leveraged")
                .field("position_size", position_size)
                .field("leverage", leverage)
                .finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}
