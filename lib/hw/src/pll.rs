//! Phase locked loop parameters.

use crate::map;

/// PLL block as mapped on the module. `error`, `dac` and `last_it_len` are
/// read only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pll {
    /// Phase error
    pub error: u32,
    pub integrator: u32,
    /// Value applied to the DAC
    pub dac: u32,
    /// Last iteration length
    pub last_it_len: u32,
    pub phase: u32,
    pub num_average: u32,
    /// Constant of proportionality
    pub kp: u32,
    /// Constant of integration
    pub ki: u32,
}

impl Pll {
    /// Asynchronous period used to convert PLL units into nanoseconds.
    pub const DEFAULT_ASYNC_PERIOD_NS: f32 = 1000.0 / 44.736;

    /// Loop constants loaded when the module comes out of reset unconfigured.
    pub const fn with_defaults(self) -> Self {
        Self {
            kp: 337_326,
            ki: 901,
            num_average: 100,
            phase: 1950,
            ..self
        }
    }

    pub const fn from_words(w: [u32; map::PLL_WORDS]) -> Self {
        Self {
            error: w[map::pll::ERROR],
            integrator: w[map::pll::INTEGRATOR],
            dac: w[map::pll::DAC],
            last_it_len: w[map::pll::LAST_IT_LEN],
            phase: w[map::pll::PHASE],
            num_average: w[map::pll::NUM_AVERAGE],
            kp: w[map::pll::KP],
            ki: w[map::pll::KI],
        }
    }

    pub const fn to_words(self) -> [u32; map::PLL_WORDS] {
        [
            self.error,
            self.integrator,
            self.dac,
            self.last_it_len,
            self.phase,
            self.num_average,
            self.kp,
            self.ki,
        ]
    }
}
