//! GPIO adapters for the alarm buzzer and push button (Raspberry Pi, rppal).
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, OutputPin};
use sensmon_traits::{Actuator, BoxError, Button};

use crate::error::{HwError, Result};
use crate::pattern::{BeepPattern, PatternRunner};

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

/// Active-high buzzer on a GPIO output.
pub struct GpioBuzzer {
    pin: Arc<Mutex<OutputPin>>,
    runner: PatternRunner,
}

impl GpioBuzzer {
    pub fn new(pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut out = gpio.get(pin).map_err(gpio_err)?.into_output();
        out.set_low();
        tracing::info!(pin, "buzzer pin configured");
        Ok(Self {
            pin: Arc::new(Mutex::new(out)),
            runner: PatternRunner::new(),
        })
    }
}

impl Actuator for GpioBuzzer {
    fn start_pattern(
        &mut self,
        on: Duration,
        off: Duration,
        repeat: Option<u32>,
    ) -> std::result::Result<(), BoxError> {
        let pin = self.pin.clone();
        self.runner.start(BeepPattern { on, off, repeat }, move |level| {
            if let Ok(mut p) = pin.lock() {
                if level {
                    p.set_high();
                } else {
                    p.set_low();
                }
            }
        });
        Ok(())
    }

    fn stop(&mut self) -> std::result::Result<(), BoxError> {
        self.runner.stop();
        match self.pin.lock() {
            Ok(mut p) => {
                p.set_low();
                Ok(())
            }
            Err(_) => Err(Box::new(HwError::Gpio("buzzer pin lock poisoned".into()))),
        }
    }

    fn is_active(&self) -> bool {
        self.runner.is_running()
    }
}

/// Push button wired to ground with the internal pull-up enabled.
pub struct GpioButton {
    pin: InputPin,
}

impl GpioButton {
    pub fn new(pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let input = gpio.get(pin).map_err(gpio_err)?.into_input_pullup();
        tracing::info!(pin, "button pin configured");
        Ok(Self { pin: input })
    }
}

impl Button for GpioButton {
    fn is_pressed(&mut self) -> std::result::Result<bool, BoxError> {
        Ok(self.pin.is_low())
    }
}
