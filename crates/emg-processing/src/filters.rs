//! Power-line notch filtering
//!
//! The bank holds one set of notch coefficients, designed once per session,
//! and one delay line per channel. Delay lines persist across frames: each
//! call advances the recursion by exactly one sample.

use crate::config::{NotchConfig, SessionConfig};
use emg_core::{config_error, EmgError, EmgResult};
use std::f64::consts::PI;

/// Second-order notch coefficients, normalized so that `a[0] == 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotchCoefficients {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl NotchCoefficients {
    /// Design a notch at `notch.frequency` with quality `notch.quality`
    ///
    /// Same construction as the common `iirnotch` design: the -3 dB
    /// bandwidth is `f0 / Q` and the gain away from the notch is unity.
    pub fn design(notch: &NotchConfig, sampling_rate: f64) -> EmgResult<Self> {
        let nyquist = sampling_rate / 2.0;
        if !(notch.frequency > 0.0 && notch.frequency < nyquist) {
            return Err(config_error!(
                "notch frequency {}Hz outside (0, {}Hz)",
                notch.frequency,
                nyquist
            ));
        }
        if notch.quality <= 0.0 {
            return Err(config_error!("notch quality factor must be positive"));
        }

        let omega = 2.0 * PI * notch.frequency / sampling_rate;
        let bandwidth = omega / notch.quality;
        let beta = (bandwidth / 2.0).tan();
        let gain = 1.0 / (1.0 + beta);
        let cos_omega = omega.cos();

        Ok(NotchCoefficients {
            b: [gain, -2.0 * gain * cos_omega, gain],
            a: [1.0, -2.0 * gain * cos_omega, 2.0 * gain - 1.0],
        })
    }
}

/// Per-channel filter memory (direct form II transposed)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DelayLine {
    z1: f64,
    z2: f64,
}

impl DelayLine {
    /// Advance the recursion by one sample
    #[inline]
    pub fn process(&mut self, coefficients: &NotchCoefficients, input: f64) -> f64 {
        let NotchCoefficients { b, a } = coefficients;

        let output = b[0] * input + self.z1;
        self.z1 = b[1] * input - a[1] * output + self.z2;
        self.z2 = b[2] * input - a[2] * output;

        output
    }

    pub fn state(&self) -> [f64; 2] {
        [self.z1, self.z2]
    }

    pub fn reset(&mut self) {
        *self = DelayLine::default();
    }
}

/// One persistent notch filter per channel
#[derive(Debug, Clone)]
pub struct FilterBank {
    coefficients: NotchCoefficients,
    lines: Vec<DelayLine>,
}

impl FilterBank {
    /// Create new filter bank with zeroed delay lines
    pub fn new(coefficients: NotchCoefficients, channel_count: usize) -> Self {
        FilterBank {
            coefficients,
            lines: vec![DelayLine::default(); channel_count],
        }
    }

    /// Filter bank for a validated session configuration
    pub fn from_config(config: &SessionConfig) -> EmgResult<Self> {
        let coefficients = NotchCoefficients::design(&config.notch, config.sampling_rate)?;
        Ok(Self::new(coefficients, config.channel_count()))
    }

    pub fn coefficients(&self) -> &NotchCoefficients {
        &self.coefficients
    }

    pub fn channel_count(&self) -> usize {
        self.lines.len()
    }

    /// Filter one sample on one channel
    pub fn filter_sample(&mut self, channel: usize, sample: f64) -> EmgResult<f64> {
        let channel_count = self.lines.len();
        let line = self
            .lines
            .get_mut(channel)
            .ok_or(EmgError::UnknownChannel { index: channel, channel_count })?;
        Ok(line.process(&self.coefficients, sample))
    }

    /// Filter one full frame; `raw[i]` goes through channel i's delay line
    pub fn filter_frame(&mut self, raw: &[f64]) -> EmgResult<Vec<f64>> {
        if raw.len() != self.lines.len() {
            return Err(EmgError::FrameWidth { expected: self.lines.len(), found: raw.len() });
        }

        let coefficients = self.coefficients;
        Ok(self
            .lines
            .iter_mut()
            .zip(raw)
            .map(|(line, &sample)| line.process(&coefficients, sample))
            .collect())
    }

    pub fn delay_line(&self, channel: usize) -> Option<&DelayLine> {
        self.lines.get(channel)
    }

    /// Zero every delay line
    pub fn reset(&mut self) {
        self.lines.iter_mut().for_each(DelayLine::reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rig_coefficients() -> NotchCoefficients {
        NotchCoefficients::design(&NotchConfig { frequency: 60.0, quality: 10.0 }, 1000.0).unwrap()
    }

    fn tone(frequency: f64, amplitude: f64, samples: usize) -> Vec<f64> {
        (0..samples)
            .map(|i| amplitude * (2.0 * PI * frequency * i as f64 / 1000.0).sin())
            .collect()
    }

    fn peak(data: &[f64]) -> f64 {
        data.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }

    #[test]
    fn test_notch_design() {
        let c = rig_coefficients();

        assert_eq!(c.a[0], 1.0);
        assert_eq!(c.b[0], c.b[2]);
        assert!((c.b[0] - 0.981_497_025_475_107_6).abs() < 1e-12);
        assert!((c.a[1] - -1.825_145_710_512_034_3).abs() < 1e-12);
        assert!((c.a[2] - 0.962_994_050_950_215_3).abs() < 1e-12);
        // Unity gain at DC
        let dc = (c.b[0] + c.b[1] + c.b[2]) / (c.a[0] + c.a[1] + c.a[2]);
        assert!((dc - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_notch_design_rejects_bad_frequency() {
        let notch = NotchConfig { frequency: 500.0, quality: 10.0 };
        assert!(NotchCoefficients::design(&notch, 1000.0).is_err());

        let notch = NotchConfig { frequency: 60.0, quality: 0.0 };
        assert!(NotchCoefficients::design(&notch, 1000.0).is_err());
    }

    #[test]
    fn test_notch_removes_powerline() {
        let mut bank = FilterBank::new(rig_coefficients(), 1);
        let output: Vec<f64> = tone(60.0, 100.0, 3000)
            .into_iter()
            .map(|x| bank.filter_sample(0, x).unwrap())
            .collect();

        // After settling the 60Hz tone is gone
        assert!(peak(&output[2000..]) < 1e-6);
    }

    #[test]
    fn test_notch_preserves_passband() {
        let mut bank = FilterBank::new(rig_coefficients(), 1);
        let output: Vec<f64> = tone(10.0, 100.0, 3000)
            .into_iter()
            .map(|x| bank.filter_sample(0, x).unwrap())
            .collect();

        assert!((peak(&output[2000..]) - 100.0).abs() < 1.0);
    }

    #[test]
    fn test_state_persists_between_calls() {
        let mut bank = FilterBank::new(rig_coefficients(), 1);

        let first = bank.filter_sample(0, 1000.0).unwrap();
        let second = bank.filter_sample(0, 0.0).unwrap();

        // Impulse response tail comes from the stored state, not the input
        assert!((first - 981.497_025_475_107_6).abs() < 1e-9);
        assert!(second != 0.0);
        assert_ne!(bank.delay_line(0).unwrap().state(), [0.0, 0.0]);
    }

    #[test]
    fn test_independent_banks_are_bit_identical() {
        let input: Vec<f64> = (0..500).map(|i| ((i * 37) % 101) as f64 - 50.0).collect();

        let mut a = FilterBank::new(rig_coefficients(), 2);
        let mut b = FilterBank::new(rig_coefficients(), 2);

        for &x in &input {
            let out_a = a.filter_frame(&[x, -x]).unwrap();
            let out_b = b.filter_frame(&[x, -x]).unwrap();
            assert_eq!(out_a, out_b);
        }
    }

    #[test]
    fn test_channels_do_not_share_state() {
        let mut bank = FilterBank::new(rig_coefficients(), 2);
        bank.filter_frame(&[1000.0, 0.0]).unwrap();

        assert_eq!(bank.delay_line(1).unwrap().state(), [0.0, 0.0]);
        assert!(bank.filter_sample(2, 1.0).is_err());
    }

    #[test]
    fn test_wrong_width_frame_leaves_state_untouched() {
        let mut bank = FilterBank::new(rig_coefficients(), 3);

        assert_eq!(
            bank.filter_frame(&[1000.0, 5.0]),
            Err(EmgError::FrameWidth { expected: 3, found: 2 })
        );
        assert!(bank.filter_frame(&[1.0, 2.0, 3.0, 4.0]).is_err());
        for channel in 0..3 {
            assert_eq!(bank.delay_line(channel).unwrap().state(), [0.0, 0.0]);
        }
    }

    #[test]
    fn test_reset_restores_initial_response() {
        let mut bank = FilterBank::new(rig_coefficients(), 1);
        let first = bank.filter_frame(&[250.0]).unwrap();
        bank.filter_frame(&[-40.0]).unwrap();

        bank.reset();
        assert_eq!(bank.filter_frame(&[250.0]).unwrap(), first);
    }
}
