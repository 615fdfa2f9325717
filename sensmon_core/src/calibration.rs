/// Linear sensor model turning an ADC voltage into amps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Amps per volt at the ADC input.
    pub amp_per_volt: f64,
    /// Additive zero offset in amps.
    pub offset_a: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            amp_per_volt: 22.0,
            offset_a: 0.0,
        }
    }
}

impl Calibration {
    /// `raw_volts * amp_per_volt + offset_a`.
    #[inline]
    pub fn to_amps(&self, raw_volts: f64) -> f64 {
        raw_volts * self.amp_per_volt + self.offset_a
    }
}
