//! Linear ADSR envelope with times in milliseconds.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Envelope settings as the control surface sends them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adsr {
    pub attack_ms: f32,
    pub decay_ms: f32,
    pub sustain: f32,
    pub release_ms: f32,
}

impl Default for Adsr {
    fn default() -> Self {
        Adsr {
            attack_ms: 10.0,
            decay_ms: 100.0,
            sustain: 0.7,
            release_ms: 300.0,
        }
    }
}

impl Adsr {
    /// Negative times become zero and sustain is clamped to [0, 1].
    pub fn sanitized(self) -> Self {
        let time = |ms: f32| if ms.is_finite() { ms.max(0.0) } else { 0.0 };
        Adsr {
            attack_ms: time(self.attack_ms),
            decay_ms: time(self.decay_ms),
            sustain: if self.sustain.is_finite() {
                self.sustain.clamp(0.0, 1.0)
            } else {
                0.0
            },
            release_ms: time(self.release_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub adsr: Adsr,
    stage: Stage,
    level: f32,
    /// Level the current ramp started from.
    from: f32,
    samples: u32,
    counter: u32,
    sample_rate: f32,
}

impl Envelope {
    pub fn new(adsr: Adsr, sample_rate: f32) -> Self {
        Envelope {
            adsr,
            stage: Stage::Idle,
            level: 0.0,
            from: 0.0,
            samples: 0,
            counter: 0,
            sample_rate,
        }
    }

    fn enter(&mut self, stage: Stage, ms: f32) {
        self.stage = stage;
        self.samples = (ms * 0.001 * self.sample_rate) as u32;
        self.counter = 0;
        self.from = self.level;
    }

    /// Start (or retrigger from the current level).
    pub fn gate_on(&mut self) {
        self.enter(Stage::Attack, self.adsr.attack_ms);
    }

    pub fn gate_off(&mut self) {
        if self.stage != Stage::Idle {
            self.enter(Stage::Release, self.adsr.release_ms);
        }
    }

    /// Drop straight to silence.
    pub fn kill(&mut self) {
        self.stage = Stage::Idle;
        self.level = 0.0;
    }

    pub fn next_sample(&mut self) -> f32 {
        let (target, next) = match self.stage {
            Stage::Idle => return 0.0,
            Stage::Sustain => {
                self.level = self.adsr.sustain;
                return self.level;
            }
            Stage::Attack => (1.0, Stage::Decay),
            Stage::Decay => (self.adsr.sustain, Stage::Sustain),
            Stage::Release => (0.0, Stage::Idle),
        };

        if self.counter >= self.samples {
            self.level = target;
            match next {
                Stage::Decay => self.enter(Stage::Decay, self.adsr.decay_ms),
                other => self.stage = other,
            }
        } else {
            let t = self.counter as f32 / self.samples as f32;
            self.level = self.from + (target - self.from) * t;
            self.counter += 1;
        }
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn run(env: &mut Envelope, n: usize) -> f32 {
        let mut last = 0.0;
        for _ in 0..n {
            last = env.next_sample();
        }
        last
    }

    #[test]
    fn idle_until_gated() {
        let mut env = Envelope::new(Adsr::default(), SR);
        assert!(env.is_idle());
        assert_eq!(env.next_sample(), 0.0);
    }

    #[test]
    fn reaches_sustain() {
        let adsr = Adsr {
            attack_ms: 1.0,
            decay_ms: 1.0,
            sustain: 0.6,
            release_ms: 10.0,
        };
        let mut env = Envelope::new(adsr, SR);
        env.gate_on();
        let level = run(&mut env, 500);
        assert!((level - 0.6).abs() < 1e-6, "Should hold sustain, got {level}");
    }

    #[test]
    fn release_returns_to_idle() {
        let adsr = Adsr {
            attack_ms: 0.0,
            decay_ms: 0.0,
            sustain: 1.0,
            release_ms: 5.0,
        };
        let mut env = Envelope::new(adsr, SR);
        env.gate_on();
        run(&mut env, 10);
        env.gate_off();
        run(&mut env, 300);
        assert!(env.is_idle());
        assert_eq!(env.next_sample(), 0.0);
    }

    #[test]
    fn sanitize_clamps() {
        let adsr = Adsr {
            attack_ms: -5.0,
            decay_ms: f32::NAN,
            sustain: 3.0,
            release_ms: 20.0,
        }
        .sanitized();
        assert_eq!(adsr.attack_ms, 0.0);
        assert_eq!(adsr.decay_ms, 0.0);
        assert_eq!(adsr.sustain, 1.0);
        assert_eq!(adsr.release_ms, 20.0);
    }

    #[test]
    fn kill_silences_immediately() {
        let mut env = Envelope::new(Adsr::default(), SR);
        env.gate_on();
        run(&mut env, 100);
        env.kill();
        assert!(env.is_idle());
        assert_eq!(env.next_sample(), 0.0);
    }
}
