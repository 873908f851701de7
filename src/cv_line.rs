//! Linear glide between step voltages

/// Internal time units per second of slide time
pub const TIME_SCALE: f64 = 1.0;

/// CV output with optional slide towards each new step
#[derive(Debug, Clone, Copy, Default)]
pub struct CvLine {
    start: Option<f64>,
    target: f64,
    increment: f64,
    duration: f64,
    sliding: bool,
    last: f64,
}

impl CvLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous voltage; the next `set` snaps
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Aim at a new step voltage. Without slide, on the first call, or with
    /// a slide time too small to divide by, the line jumps straight there.
    pub fn set(&mut self, target: f64, slide_time: f64, slide_enabled: bool) {
        self.target = target;
        let snap = !slide_enabled || self.start.is_none() || slide_time <= f64::EPSILON;
        if snap {
            self.start = Some(target);
            self.increment = 0.0;
            self.duration = 0.0;
            self.sliding = false;
            self.last = target;
        } else {
            let from = self.last;
            self.duration = TIME_SCALE * slide_time;
            self.increment = (target - from) / self.duration;
            self.start = Some(from);
            self.sliding = true;
        }
    }

    /// Voltage `elapsed` time units into the step. While sliding the value
    /// never passes `current_step_voltage` in the direction of travel.
    pub fn play(&mut self, elapsed: f64, current_step_voltage: f64) -> f64 {
        let start = match self.start {
            Some(start) => start,
            None => return current_step_voltage,
        };
        // a snapped step holds the voltage it was set to
        let cv = if !self.sliding {
            self.target
        } else if elapsed >= self.duration {
            current_step_voltage
        } else {
            let cv = start + self.increment * elapsed.max(0.0);
            if self.increment < 0.0 && cv < current_step_voltage {
                current_step_voltage
            } else if self.increment > 0.0 && cv > current_step_voltage {
                current_step_voltage
            } else {
                cv
            }
        };
        self.last = cv;
        cv
    }
}
