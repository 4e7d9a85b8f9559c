//! # PCM Sample-Rate Conversion
//!
//! Downsamples 16-bit little-endian PCM by an integer factor. The assistant side
//! speaks 16kHz while the telephony side plays 8kHz, so every aggregated chunk
//! travelling towards the caller passes through here.
//!
//! ## Filter:
//! - **Design**: Chebyshev type I low-pass, order 8, 0.05 dB passband ripple
//! - **Cutoff**: 0.8 / factor of the source Nyquist frequency
//! - **Structure**: four cascaded second-order sections (biquads)
//! - **Phase**: applied forward then backward, so the output is not delayed
//! - **Edges**: odd extension of up to 27 samples, filter state started at steady state
//!
//! This is the same decimation as scipy's `signal.decimate(x, q, ftype='iir')`.
//!
//! ## Failure Policy:
//! `resample` never fails. Anything it cannot handle (odd byte counts, zero rates,
//! upsampling, non-integer ratios) is logged and the input is returned unchanged.

use byteorder::{ByteOrder, LittleEndian};
use std::f64::consts::PI;
use std::fmt;
use tracing::warn;

/// Filter order of the anti-aliasing low-pass.
const FILTER_ORDER: usize = 8;

/// Passband ripple in dB.
const PASSBAND_RIPPLE_DB: f64 = 0.05;

/// Reasons a buffer could not be resampled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResampleError {
    /// Byte count is not a whole number of 16-bit samples
    OddLength(usize),
    /// One of the rates was zero
    ZeroRate,
    /// Only integer downsampling is supported
    UnsupportedRatio { source: u32, target: u32 },
}

impl fmt::Display for ResampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResampleError::OddLength(len) => {
                write!(f, "buffer of {} bytes is not a whole number of 16-bit samples", len)
            }
            ResampleError::ZeroRate => write!(f, "sample rates must be non-zero"),
            ResampleError::UnsupportedRatio { source, target } => {
                write!(f, "cannot resample {}Hz to {}Hz (integer downsampling only)", source, target)
            }
        }
    }
}

impl std::error::Error for ResampleError {}

/// Resample PCM bytes, falling back to the input bytes on any error.
///
/// ## Parameters:
/// - **audio**: Raw `pcm_s16le` bytes
/// - **source_rate**: Rate the bytes were produced at (e.g. 16000)
/// - **target_rate**: Rate the consumer expects (e.g. 8000)
pub fn resample(audio: &[u8], source_rate: u32, target_rate: u32) -> Vec<u8> {
    match try_resample(audio, source_rate, target_rate) {
        Ok(resampled) => resampled,
        Err(err) => {
            warn!(
                bytes = audio.len(),
                source_rate,
                target_rate,
                error = %err,
                "Resampling failed, relaying unresampled audio"
            );
            audio.to_vec()
        }
    }
}

/// Resample PCM bytes, reporting why the buffer was rejected.
pub fn try_resample(audio: &[u8], source_rate: u32, target_rate: u32) -> Result<Vec<u8>, ResampleError> {
    let factor = decimation_factor(source_rate, target_rate)?;

    if audio.len() % 2 != 0 {
        return Err(ResampleError::OddLength(audio.len()));
    }

    if factor == 1 || audio.is_empty() {
        return Ok(audio.to_vec());
    }

    let mut samples = vec![0i16; audio.len() / 2];
    LittleEndian::read_i16_into(audio, &mut samples);

    let decimated = Decimator::new(factor).process(&samples);

    let mut out = vec![0u8; decimated.len() * 2];
    LittleEndian::write_i16_into(&decimated, &mut out);
    Ok(out)
}

/// Integer factor between the two rates.
fn decimation_factor(source_rate: u32, target_rate: u32) -> Result<usize, ResampleError> {
    if source_rate == 0 || target_rate == 0 {
        return Err(ResampleError::ZeroRate);
    }
    if source_rate < target_rate || source_rate % target_rate != 0 {
        return Err(ResampleError::UnsupportedRatio {
            source: source_rate,
            target: target_rate,
        });
    }
    Ok((source_rate / target_rate) as usize)
}

/// One second-order section in transposed direct form II.
///
/// `a0` is normalised to 1 and omitted.
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// Gain of the section at DC.
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Filter state that a constant unit input would settle into.
    fn steady_state(&self) -> [f64; 2] {
        let y = self.dc_gain();
        [y - self.b0, self.b2 - self.a2 * y]
    }
}

/// Zero-phase IIR decimator for one integer factor.
struct Decimator {
    factor: usize,
    sections: Vec<Biquad>,
    /// Per-section steady-state for a unit step at the cascade input
    step_state: Vec<[f64; 2]>,
}

impl Decimator {
    fn new(factor: usize) -> Self {
        let sections = chebyshev_lowpass(FILTER_ORDER, PASSBAND_RIPPLE_DB, 0.8 / factor as f64);

        let mut step_state = Vec::with_capacity(sections.len());
        let mut scale = 1.0;
        for section in &sections {
            let [z0, z1] = section.steady_state();
            step_state.push([z0 * scale, z1 * scale]);
            scale *= section.dc_gain();
        }

        Self {
            factor,
            sections,
            step_state,
        }
    }

    /// Number of edge samples mirrored on each side before filtering.
    fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    fn process(&self, samples: &[i16]) -> Vec<i16> {
        let input: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        let filtered = self.filtfilt(&input);

        filtered
            .iter()
            .step_by(self.factor)
            // `as` truncates toward zero and saturates at the i16 bounds
            .map(|&v| v as i16)
            .collect()
    }

    /// Forward-backward filtering with odd extension at both ends.
    fn filtfilt(&self, input: &[f64]) -> Vec<f64> {
        let n = input.len();
        let pad = self.pad_len().min(n.saturating_sub(1));

        let mut extended = odd_extension(input, pad);

        let first = extended[0];
        self.filter_in_place(&mut extended, first);

        extended.reverse();
        let last = extended[0];
        self.filter_in_place(&mut extended, last);
        extended.reverse();

        extended[pad..pad + n].to_vec()
    }

    /// Run the cascade over `signal`, starting from the state a constant
    /// `initial` input would produce.
    fn filter_in_place(&self, signal: &mut [f64], initial: f64) {
        for (section, step) in self.sections.iter().zip(&self.step_state) {
            let mut z0 = step[0] * initial;
            let mut z1 = step[1] * initial;
            for x in signal.iter_mut() {
                let input = *x;
                let y = section.b0 * input + z0;
                z0 = section.b1 * input - section.a1 * y + z1;
                z1 = section.b2 * input - section.a2 * y;
                *x = y;
            }
        }
    }
}

/// Mirror `pad` samples around each endpoint (point symmetry).
fn odd_extension(input: &[f64], pad: usize) -> Vec<f64> {
    let n = input.len();
    let mut out = Vec::with_capacity(n + 2 * pad);

    let head = 2.0 * input[0];
    out.extend((1..=pad).rev().map(|i| head - input[i]));
    out.extend_from_slice(input);
    let tail = 2.0 * input[n - 1];
    out.extend((1..=pad).map(|i| tail - input[n - 1 - i]));

    out
}

/// Design a digital Chebyshev type I low-pass as second-order sections.
///
/// `cutoff` is normalised to the Nyquist frequency (0..1). `order` must be even.
/// Analog prototype poles are scaled to the pre-warped cutoff and mapped through
/// the bilinear transform; every zero lands at z = -1.
fn chebyshev_lowpass(order: usize, ripple_db: f64, cutoff: f64) -> Vec<Biquad> {
    let eps = (10f64.powf(ripple_db / 10.0) - 1.0).sqrt();
    let mu = (1.0 / eps).asinh() / order as f64;

    // Bilinear transform with fs = 2, matching a Nyquist-normalised cutoff
    let fs2 = 4.0;
    let warped = fs2 * (PI * cutoff / 2.0).tan();

    let mut gain = 1.0 / (1.0 + eps * eps).sqrt();
    let mut sections = Vec::with_capacity(order / 2);

    // One pole of each conjugate pair: theta = pi * m / (2N) for odd positive m
    for m in (1..order).step_by(2) {
        let theta = PI * m as f64 / (2.0 * order as f64);
        let re = -mu.sinh() * theta.cos() * warped;
        let im = -mu.cosh() * theta.sin() * warped;

        // |p|^2 from the analog gain, |fs2 - p|^2 from the bilinear gain
        let mag_sq = re * re + im * im;
        let denom_sq = (fs2 - re) * (fs2 - re) + im * im;
        gain *= mag_sq / denom_sq;

        // z = (fs2 + p) / (fs2 - p)
        let zr = ((fs2 + re) * (fs2 - re) - im * im) / denom_sq;
        let zi = (im * (fs2 - re) + im * (fs2 + re)) / denom_sq;

        sections.push(Biquad {
            b0: 1.0,
            b1: 2.0,
            b2: 1.0,
            a1: -2.0 * zr,
            a2: zr * zr + zi * zi,
        });
    }

    if let Some(first) = sections.first_mut() {
        first.b0 *= gain;
        first.b1 *= gain;
        first.b2 *= gain;
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn to_samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    fn tone(freq_hz: f64, rate: u32, seconds: f64, amplitude: f64) -> Vec<i16> {
        let count = (rate as f64 * seconds) as usize;
        (0..count)
            .map(|i| (amplitude * (2.0 * PI * freq_hz * i as f64 / rate as f64).sin()) as i16)
            .collect()
    }

    /// RMS over the middle half, away from edge transients.
    fn centre_rms(samples: &[i16]) -> f64 {
        let start = samples.len() / 4;
        let end = samples.len() - start;
        let window = &samples[start..end];
        let sum: f64 = window.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / window.len() as f64).sqrt()
    }

    #[test]
    fn test_halves_sample_count() {
        let input = to_bytes(&tone(440.0, 16000, 0.1, 8000.0));
        let output = resample(&input, 16000, 8000);
        assert_eq!(output.len(), input.len() / 2);
    }

    #[test]
    fn test_odd_sample_count_rounds_up() {
        let input = to_bytes(&[100, 200, 300, 400, 500]);
        let output = resample(&input, 16000, 8000);
        assert_eq!(output.len(), 6);
    }

    #[test]
    fn test_silence_stays_silent() {
        let input = vec![0u8; 640];
        let output = resample(&input, 16000, 8000);
        assert_eq!(output.len(), 320);
        assert!(output.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tiny_buffer_is_still_decimated() {
        let output = resample(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08], 16000, 8000);
        assert_eq!(output.len(), 4);
    }

    #[test]
    fn test_passband_tone_is_preserved() {
        let input = tone(500.0, 16000, 1.0, 10000.0);
        let output = to_samples(&resample(&to_bytes(&input), 16000, 8000));

        let ratio = centre_rms(&output) / centre_rms(&input);
        assert!((ratio - 1.0).abs() < 0.05, "passband gain drifted: {}", ratio);
    }

    #[test]
    fn test_tone_above_new_nyquist_is_attenuated() {
        let input = tone(7000.0, 16000, 1.0, 10000.0);
        let output = to_samples(&resample(&to_bytes(&input), 16000, 8000));

        let ratio = centre_rms(&output) / centre_rms(&input);
        assert!(ratio < 0.05, "aliasing tone leaked through: {}", ratio);
    }

    #[test]
    fn test_odd_byte_length_returns_input() {
        let input = vec![1u8, 2, 3];
        assert_eq!(resample(&input, 16000, 8000), input);
        assert_eq!(try_resample(&input, 16000, 8000), Err(ResampleError::OddLength(3)));
    }

    #[test]
    fn test_unsupported_ratios_return_input() {
        let input = to_bytes(&[1, 2, 3, 4]);
        assert_eq!(resample(&input, 8000, 16000), input);
        assert_eq!(resample(&input, 16000, 6000), input);
        assert_eq!(resample(&input, 0, 8000), input);
        assert!(matches!(
            try_resample(&input, 44100, 16000),
            Err(ResampleError::UnsupportedRatio { source: 44100, target: 16000 })
        ));
    }

    #[test]
    fn test_equal_rates_pass_through() {
        let input = to_bytes(&[5, -5, 10, -10]);
        assert_eq!(try_resample(&input, 8000, 8000), Ok(input));
    }

    #[test]
    fn test_filter_has_unity_dc_gain() {
        let sections = chebyshev_lowpass(FILTER_ORDER, PASSBAND_RIPPLE_DB, 0.4);
        assert_eq!(sections.len(), 4);
        let dc: f64 = sections.iter().map(Biquad::dc_gain).product();
        // Even-order Chebyshev I sits at the bottom of the ripple at DC
        let expected = 1.0 / (1.0 + (10f64.powf(PASSBAND_RIPPLE_DB / 10.0) - 1.0)).sqrt();
        assert!((dc - expected).abs() < 1e-6, "dc gain {}", dc);
    }
}
