//! Digital filtering of multichannel recordings
//!
//! IIR filters are built from second-order sections (biquads) and applied
//! forward and backward (zero phase), so spike peaks are not shifted in time.
//! Supports a notch filter for mains hum and a Butterworth band/high/low-pass.

use crate::error::{Result, SpikeError};
use crate::profile_scope;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Second-order section (biquad) coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Gain at DC (z = 1).
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// State for a single biquad section (Direct Form II Transposed)
#[derive(Debug, Clone, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

/// Single biquad filter section
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.coeffs.b0 * input + self.state.z1;
        self.state.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.state.z2;
        self.state.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.state = BiquadState::default();
    }

    /// Load the state the section would hold after an infinitely long
    /// constant input `level`. Returns the section's steady output.
    fn settle(&mut self, level: f64) -> f64 {
        let gain = self.coeffs.dc_gain();
        self.state.z1 = (gain - self.coeffs.b0) * level;
        self.state.z2 = (self.coeffs.b2 - self.coeffs.a2 * gain) * level;
        gain * level
    }
}

/// Cascaded second-order sections filter
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<BiquadFilter>,
    gain: f64,
}

impl SosFilter {
    pub fn new(sections: Vec<BiquadCoeffs>, gain: f64) -> Self {
        Self {
            sections: sections.into_iter().map(BiquadFilter::new).collect(),
            gain,
        }
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn coefficients(&self) -> Vec<BiquadCoeffs> {
        self.sections.iter().map(|s| s.coeffs).collect()
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let mut output = input * self.gain;
        for section in &mut self.sections {
            output = section.process(output);
        }
        output
    }

    /// Causal single pass; the input is left untouched.
    pub fn filter(&mut self, signal: &[f64]) -> Vec<f64> {
        signal.iter().map(|&s| self.process(s)).collect()
    }

    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    fn settle(&mut self, level: f64) {
        let mut level = level * self.gain;
        for section in &mut self.sections {
            level = section.settle(level);
        }
    }

    /// Edge padding used by the zero-phase pass.
    fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Zero-phase filtering: odd-extend both edges, run forward from a
    /// steady state, run backward from a steady state, strip the padding.
    ///
    /// Runs of missing samples (NaN) are left in place and each finite run
    /// is filtered on its own.
    pub fn filtfilt(&self, signal: &[f64]) -> Vec<f64> {
        let mut out = signal.to_vec();
        let mut start = 0;
        while start < signal.len() {
            if !signal[start].is_finite() {
                start += 1;
                continue;
            }
            let mut end = start;
            while end < signal.len() && signal[end].is_finite() {
                end += 1;
            }
            let run = self.filtfilt_finite(&signal[start..end]);
            out[start..end].copy_from_slice(&run);
            start = end;
        }
        out
    }

    fn filtfilt_finite(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        if n < 2 {
            return signal.to_vec();
        }
        let pad = self.pad_len().min(n - 1);

        let first = signal[0];
        let last = signal[n - 1];
        let mut extended = Vec::with_capacity(n + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        extended.extend_from_slice(signal);
        extended.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));

        let mut forward = self.clone();
        forward.settle(extended[0]);
        let mut pass: Vec<f64> = extended.iter().map(|&s| forward.process(s)).collect();

        pass.reverse();
        let mut backward = self.clone();
        backward.settle(pass[0]);
        for sample in pass.iter_mut() {
            *sample = backward.process(*sample);
        }
        pass.reverse();

        pass[pad..pad + n].to_vec()
    }
}

/// Butterworth filter designer
pub struct ButterworthFilter;

impl ButterworthFilter {
    pub fn lowpass(cutoff: f64, sample_rate: f64, order: usize) -> SosFilter {
        let wn = Self::prewarp(cutoff, sample_rate);
        SosFilter::new(Self::design_lowpass(wn, order), 1.0)
    }

    pub fn highpass(cutoff: f64, sample_rate: f64, order: usize) -> SosFilter {
        let wn = Self::prewarp(cutoff, sample_rate);
        SosFilter::new(Self::design_highpass(wn, order), 1.0)
    }

    /// Bandpass as a highpass at `low` cascaded with a lowpass at `high`.
    pub fn bandpass(low: f64, high: f64, sample_rate: f64, order: usize) -> SosFilter {
        let mut sections = Self::design_highpass(Self::prewarp(low, sample_rate), order);
        sections.extend(Self::design_lowpass(Self::prewarp(high, sample_rate), order));
        SosFilter::new(sections, 1.0)
    }

    /// Prewarp frequency for bilinear transform
    fn prewarp(freq: f64, sample_rate: f64) -> f64 {
        (PI * freq / sample_rate).tan()
    }

    /// Damping term of the k-th analog pole pair: s^2 + c*s + 1.
    fn damping(k: usize, order: usize) -> f64 {
        let theta = PI * (2.0 * k as f64 + 1.0) / (2.0 * order as f64);
        2.0 * theta.sin()
    }

    fn design_lowpass(wn: f64, order: usize) -> Vec<BiquadCoeffs> {
        let num_sections = (order + 1) / 2;
        let mut sections = Vec::with_capacity(num_sections);

        for k in 0..num_sections {
            if order % 2 == 1 && k == num_sections - 1 {
                // First-order section: H(s) = wn / (s + wn)
                let k_coeff = wn / (1.0 + wn);
                sections.push(BiquadCoeffs {
                    b0: k_coeff,
                    b1: k_coeff,
                    b2: 0.0,
                    a1: (wn - 1.0) / (wn + 1.0),
                    a2: 0.0,
                });
            } else {
                let c = Self::damping(k, order);
                let wn2 = wn * wn;
                let denom = 1.0 + c * wn + wn2;
                sections.push(BiquadCoeffs {
                    b0: wn2 / denom,
                    b1: 2.0 * wn2 / denom,
                    b2: wn2 / denom,
                    a1: 2.0 * (wn2 - 1.0) / denom,
                    a2: (1.0 - c * wn + wn2) / denom,
                });
            }
        }

        sections
    }

    fn design_highpass(wn: f64, order: usize) -> Vec<BiquadCoeffs> {
        let num_sections = (order + 1) / 2;
        let mut sections = Vec::with_capacity(num_sections);

        for k in 0..num_sections {
            if order % 2 == 1 && k == num_sections - 1 {
                let k_coeff = 1.0 / (1.0 + wn);
                sections.push(BiquadCoeffs {
                    b0: k_coeff,
                    b1: -k_coeff,
                    b2: 0.0,
                    a1: (wn - 1.0) / (wn + 1.0),
                    a2: 0.0,
                });
            } else {
                let c = Self::damping(k, order);
                let wn2 = wn * wn;
                let denom = 1.0 + c * wn + wn2;
                sections.push(BiquadCoeffs {
                    b0: 1.0 / denom,
                    b1: -2.0 / denom,
                    b2: 1.0 / denom,
                    a1: 2.0 * (wn2 - 1.0) / denom,
                    a2: (1.0 - c * wn + wn2) / denom,
                });
            }
        }

        sections
    }
}

/// Notch (band-reject) filter for removing a single frequency
pub struct NotchFilter;

impl NotchFilter {
    /// Second-order notch at `center_freq` with -3 dB bandwidth
    /// `center_freq / q_factor`.
    pub fn design(center_freq: f64, sample_rate: f64, q_factor: f64) -> SosFilter {
        let w0 = 2.0 * PI * center_freq / sample_rate;
        let bandwidth = w0 / q_factor;
        let beta = (bandwidth / 2.0).tan();
        let gain = 1.0 / (1.0 + beta);
        let cos_w0 = w0.cos();

        let coeffs = BiquadCoeffs {
            b0: gain,
            b1: -2.0 * gain * cos_w0,
            b2: gain,
            a1: -2.0 * gain * cos_w0,
            a2: 2.0 * gain - 1.0,
        };

        SosFilter::new(vec![coeffs], 1.0)
    }
}

fn default_notch_frequency() -> f64 {
    50.0
}
fn default_notch_quality() -> f64 {
    30.0
}
fn default_band_order() -> usize {
    2
}

/// Notch filter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotchOptions {
    #[serde(default)]
    pub enabled: bool,

    /// Frequency to remove (Hz), typically 50 or 60
    #[serde(default = "default_notch_frequency")]
    pub frequency: f64,

    /// Quality factor (higher = narrower notch)
    #[serde(default = "default_notch_quality")]
    pub quality: f64,
}

impl Default for NotchOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: default_notch_frequency(),
            quality: default_notch_quality(),
        }
    }
}

/// Butterworth pass filter settings. With both bounds set this is a
/// bandpass, with only `low` a highpass, with only `high` a lowpass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandOptions {
    #[serde(default)]
    pub enabled: bool,

    /// Lower cutoff (Hz)
    #[serde(default)]
    pub low: Option<f64>,

    /// Upper cutoff (Hz)
    #[serde(default)]
    pub high: Option<f64>,

    #[serde(default = "default_band_order")]
    pub order: usize,
}

impl Default for BandOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            low: None,
            high: None,
            order: default_band_order(),
        }
    }
}

/// Resolved shape of an enabled band filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassBand {
    Bandpass { low: f64, high: f64 },
    Highpass { cutoff: f64 },
    Lowpass { cutoff: f64 },
}

impl BandOptions {
    pub fn pass_band(&self) -> Result<PassBand> {
        match (self.low, self.high) {
            (Some(low), Some(high)) => Ok(PassBand::Bandpass { low, high }),
            (Some(cutoff), None) => Ok(PassBand::Highpass { cutoff }),
            (None, Some(cutoff)) => Ok(PassBand::Lowpass { cutoff }),
            (None, None) => Err(SpikeError::Configuration(
                "Band filter is enabled but neither a low nor a high cutoff is set".to_string(),
            )),
        }
    }
}

/// Filter configuration applied by [`SignalFilter`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    #[serde(default)]
    pub notch: NotchOptions,
    #[serde(default)]
    pub band: BandOptions,
}

impl FilterOptions {
    pub fn is_active(&self) -> bool {
        self.notch.enabled || self.band.enabled
    }
}

fn check_frequency(label: &str, freq: f64, nyquist: f64) -> Result<()> {
    if !freq.is_finite() || freq <= 0.0 {
        return Err(SpikeError::Configuration(format!(
            "{} ({} Hz) must be a positive frequency",
            label, freq
        )));
    }
    if freq >= nyquist {
        return Err(SpikeError::Configuration(format!(
            "{} ({} Hz) must be less than Nyquist ({} Hz)",
            label, freq, nyquist
        )));
    }
    Ok(())
}

/// Design the notch filter described by `options`.
pub fn design_notch(options: &NotchOptions, framerate: u32) -> Result<SosFilter> {
    let nyquist = framerate as f64 / 2.0;
    check_frequency("Notch frequency", options.frequency, nyquist)?;
    if !options.quality.is_finite() || options.quality <= 0.0 {
        return Err(SpikeError::Configuration(format!(
            "Notch quality factor must be positive, got {}",
            options.quality
        )));
    }
    Ok(NotchFilter::design(
        options.frequency,
        framerate as f64,
        options.quality,
    ))
}

/// Design the Butterworth pass filter described by `options`.
pub fn design_band(options: &BandOptions, framerate: u32) -> Result<SosFilter> {
    let nyquist = framerate as f64 / 2.0;
    if options.order == 0 {
        return Err(SpikeError::Configuration(
            "Filter order must be at least 1".to_string(),
        ));
    }
    let sample_rate = framerate as f64;
    match options.pass_band()? {
        PassBand::Bandpass { low, high } => {
            check_frequency("Low cutoff", low, nyquist)?;
            check_frequency("High cutoff", high, nyquist)?;
            if low >= high {
                return Err(SpikeError::Configuration(format!(
                    "Low cutoff ({} Hz) must be less than high cutoff ({} Hz)",
                    low, high
                )));
            }
            Ok(ButterworthFilter::bandpass(low, high, sample_rate, options.order))
        }
        PassBand::Highpass { cutoff } => {
            check_frequency("Highpass cutoff", cutoff, nyquist)?;
            Ok(ButterworthFilter::highpass(cutoff, sample_rate, options.order))
        }
        PassBand::Lowpass { cutoff } => {
            check_frequency("Lowpass cutoff", cutoff, nyquist)?;
            Ok(ButterworthFilter::lowpass(cutoff, sample_rate, options.order))
        }
    }
}

/// Applies the configured notch and band filters to every channel.
#[derive(Debug, Clone, Default)]
pub struct SignalFilter {
    options: FilterOptions,
}

impl SignalFilter {
    pub fn new(options: FilterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Filter every channel and return new arrays. With no filter enabled the
    /// input is returned unchanged.
    pub fn apply(&self, channels: &[Vec<f64>], framerate: u32) -> Result<Vec<Vec<f64>>> {
        if framerate == 0 {
            return Err(SpikeError::Configuration(
                "Framerate must be greater than 0".to_string(),
            ));
        }

        // Design everything first so a bad setting fails before any work.
        let notch = if self.options.notch.enabled {
            Some(design_notch(&self.options.notch, framerate)?)
        } else {
            None
        };
        let band = if self.options.band.enabled {
            Some(design_band(&self.options.band, framerate)?)
        } else {
            None
        };

        if notch.is_none() && band.is_none() {
            return Ok(channels.to_vec());
        }

        profile_scope!("SignalFilter::apply");
        log::info!(
            "Filtering {} channel(s) at {} Hz (notch: {}, band: {})",
            channels.len(),
            framerate,
            notch.is_some(),
            band.is_some()
        );

        Ok(channels
            .iter()
            .map(|channel| {
                let mut data = channel.clone();
                if let Some(ref f) = notch {
                    data = f.filtfilt(&data);
                }
                if let Some(ref f) = band {
                    data = f.filtfilt(&data);
                }
                data
            })
            .collect())
    }
}
