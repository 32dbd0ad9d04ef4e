use crate::config::HrvConfig;
use crate::error::StatisticsError;
use crate::BeatInterval;
use chrono::{DateTime, NaiveDateTime};
use log::{debug, trace};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Rate of the uniform timeline intervals are resampled onto, in Hz.
pub const RESAMPLE_HZ: f64 = 4.0;
pub const NFFT: usize = 4096;
/// Welch segment length once a window spans five minutes of beats.
const LONG_SEGMENT: usize = 300;
pub const LF_BAND: (f64, f64) = (0.04, 0.15);
pub const HF_BAND: (f64, f64) = (0.15, 0.40);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HrvMetric {
    Rmssd,
    Sdnn,
    Lf,
    Hf,
    LfHf,
}

impl HrvMetric {
    pub const ALL: [HrvMetric; 5] = [
        HrvMetric::Rmssd,
        HrvMetric::Sdnn,
        HrvMetric::Lf,
        HrvMetric::Hf,
        HrvMetric::LfHf,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HrvMetric::Rmssd => "rmssd",
            HrvMetric::Sdnn => "sdnn",
            HrvMetric::Lf => "lf",
            HrvMetric::Hf => "hf",
            HrvMetric::LfHf => "lfhf",
        }
    }

    fn is_spectral(self) -> bool {
        matches!(self, HrvMetric::Lf | HrvMetric::Hf | HrvMetric::LfHf)
    }
}

impl fmt::Display for HrvMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HrvMetric {
    type Err = StatisticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        HrvMetric::ALL
            .iter()
            .copied()
            .find(|m| m.name() == lower)
            .ok_or_else(|| StatisticsError::UnknownMetric(s.to_string()))
    }
}

impl Serialize for HrvMetric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Create a periodic Hamming window of the specified size
fn create_hamming_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / size as f64).cos())
        .collect()
}

/// Not-a-knot cubic spline through strictly increasing knots.
///
/// Fewer than four knots degrade to linear interpolation. Evaluation outside
/// the knot range extrapolates the outermost polynomial pieces.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivative at each knot.
    m: Vec<f64>,
}

impl CubicSpline {
    pub fn new(x: &[f64], y: &[f64]) -> Option<Self> {
        let n = x.len();
        if n < 2 || n != y.len() || x.windows(2).any(|w| w[1] <= w[0]) {
            return None;
        }
        let mut m = vec![0.0; n];
        if n >= 4 {
            let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
            let slope: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();

            // interior unknowns m[1..n-1], with the outer ones eliminated
            let k = n - 2;
            let mut sub = vec![0.0; k];
            let mut diag = vec![0.0; k];
            let mut sup = vec![0.0; k];
            let mut rhs = vec![0.0; k];
            for row in 0..k {
                let i = row + 1;
                sub[row] = h[i - 1];
                diag[row] = 2.0 * (h[i - 1] + h[i]);
                sup[row] = h[i];
                rhs[row] = 6.0 * (slope[i] - slope[i - 1]);
            }
            let (h0, h1) = (h[0], h[1]);
            diag[0] = (h0 + h1) * (h0 + 2.0 * h1) / h1;
            sup[0] = (h1 * h1 - h0 * h0) / h1;
            let (a, b) = (h[n - 3], h[n - 2]);
            sub[k - 1] = (a * a - b * b) / a;
            diag[k - 1] = (a + b) * (2.0 * a + b) / a;

            let interior = solve_tridiagonal(&sub, &diag, &sup, &rhs)?;
            m[1..n - 1].copy_from_slice(&interior);
            m[0] = ((h0 + h1) * m[1] - h0 * m[2]) / h1;
            m[n - 1] = ((a + b) * m[n - 2] - b * m[n - 3]) / a;
        }
        Some(CubicSpline {
            x: x.to_vec(),
            y: y.to_vec(),
            m,
        })
    }

    pub fn evaluate(&self, at: f64) -> f64 {
        let n = self.x.len();
        let i = self
            .x
            .partition_point(|&v| v <= at)
            .saturating_sub(1)
            .min(n - 2);
        let (x0, x1) = (self.x[i], self.x[i + 1]);
        let (y0, y1) = (self.y[i], self.y[i + 1]);
        let (m0, m1) = (self.m[i], self.m[i + 1]);
        let h = x1 - x0;
        let (left, right) = (x1 - at, at - x0);
        m0 * left.powi(3) / (6.0 * h)
            + m1 * right.powi(3) / (6.0 * h)
            + (y0 / h - m0 * h / 6.0) * left
            + (y1 / h - m1 * h / 6.0) * right
    }
}

/// Thomas algorithm; `sub[0]` and `sup[last]` are ignored.
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Option<Vec<f64>> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];
    let mut denom = diag[0];
    if denom == 0.0 {
        return None;
    }
    c[0] = sup[0] / denom;
    d[0] = rhs[0] / denom;
    for i in 1..n {
        denom = diag[i] - sub[i] * c[i - 1];
        if denom == 0.0 {
            return None;
        }
        c[i] = sup[i] / denom;
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / denom;
    }
    let mut out = vec![0.0; n];
    out[n - 1] = d[n - 1];
    for i in (0..n - 1).rev() {
        out[i] = d[i] - c[i] * out[i + 1];
    }
    Some(out)
}

/// One-sided power spectral density by Welch's method.
///
/// Segments overlap by half, are mean-detrended, Hamming-windowed and
/// zero-padded to `nfft`. Returns (frequencies, density).
pub fn welch_psd(
    signal: &[f64],
    sample_rate: f64,
    nperseg: usize,
    nfft: usize,
) -> Option<(Vec<f64>, Vec<f64>)> {
    if signal.is_empty() {
        return None;
    }
    let segment_length = nperseg.clamp(1, signal.len());
    let nfft = nfft.max(segment_length);
    let step = segment_length - segment_length / 2;
    let num_segments = (signal.len() - segment_length) / step + 1;

    let window = create_hamming_window(segment_length);
    let scale = 1.0 / (sample_rate * window.iter().map(|w| w * w).sum::<f64>());

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nfft);
    let bins = nfft / 2 + 1;
    let mut psd = vec![0.0; bins];
    let mut buffer = vec![Complex::new(0.0, 0.0); nfft];

    for i in 0..num_segments {
        let start = i * step;
        let segment = &signal[start..start + segment_length];
        let mean = segment.iter().sum::<f64>() / segment_length as f64;

        buffer.fill(Complex::new(0.0, 0.0));
        for (j, &x) in segment.iter().enumerate() {
            buffer[j] = Complex::new((x - mean) * window[j], 0.0);
        }
        fft.process(&mut buffer);

        for (p, value) in psd.iter_mut().zip(&buffer) {
            *p += value.norm_sqr();
        }
    }

    let nyquist = (nfft % 2 == 0).then_some(bins - 1);
    for (k, p) in psd.iter_mut().enumerate() {
        *p *= scale / num_segments as f64;
        if k != 0 && Some(k) != nyquist {
            *p *= 2.0;
        }
    }
    let freqs = (0..bins)
        .map(|k| k as f64 * sample_rate / nfft as f64)
        .collect();
    Some((freqs, psd))
}

/// Trapezoidal integral of the PSD over `[low, high)`.
pub fn band_power(freqs: &[f64], psd: &[f64], (low, high): (f64, f64)) -> f64 {
    let band: Vec<(f64, f64)> = freqs
        .iter()
        .zip(psd)
        .filter(|(f, _)| **f >= low && **f < high)
        .map(|(f, p)| (*f, *p))
        .collect();
    band.windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0)
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeMeasures {
    pub rmssd: f64,
    pub sdnn: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrequencyMeasures {
    pub lf: f64,
    pub hf: f64,
}

/// RMSSD and SDNN (sample standard deviation) of a series of intervals.
pub fn calc_ts_measures(nn: &[f64]) -> TimeMeasures {
    if nn.is_empty() {
        return TimeMeasures {
            rmssd: 0.0,
            sdnn: 0.0,
        };
    }

    let mean_nn = nn.iter().sum::<f64>() / nn.len() as f64;
    let sdnn = if nn.len() > 1 {
        (nn.iter().map(|&x| (x - mean_nn).powi(2)).sum::<f64>() / (nn.len() - 1) as f64).sqrt()
    } else {
        0.0
    };

    let rmssd = if nn.len() > 1 {
        let sq_diff: f64 = nn.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
        (sq_diff / (nn.len() - 1) as f64).sqrt()
    } else {
        0.0
    };

    TimeMeasures { rmssd, sdnn }
}

/// LF and HF power (ms^2) of a series of intervals in milliseconds.
///
/// The beat series is placed on its cumulative time axis, resampled at 4 Hz
/// with a cubic spline, demeaned and passed through Welch's method.
pub fn calc_frequency_measures(nn: &[f64]) -> Option<FrequencyMeasures> {
    if nn.len() < 2 {
        return None;
    }
    let mut elapsed = 0.0;
    let t: Vec<f64> = std::iter::once(0.0)
        .chain(nn[1..].iter().map(|&x| {
            elapsed += x;
            elapsed
        }))
        .collect();
    let t_last = *t.last()?;

    let step_ms = 1000.0 / RESAMPLE_HZ;
    let samples = (t_last / step_ms).ceil() as usize;
    if samples == 0 {
        return None;
    }
    let spline = CubicSpline::new(&t, nn)?;
    let mut resampled: Vec<f64> = (0..samples)
        .map(|i| spline.evaluate(i as f64 * step_ms))
        .collect();
    let mean = resampled.iter().sum::<f64>() / resampled.len() as f64;
    for x in &mut resampled {
        *x -= mean;
    }

    let nperseg = if t_last < 300_000.0 { NFFT } else { LONG_SEGMENT };
    let (freqs, psd) = welch_psd(&resampled, RESAMPLE_HZ, nperseg, NFFT)?;
    Some(FrequencyMeasures {
        lf: band_power(&freqs, &psd, LF_BAND),
        hf: band_power(&freqs, &psd, HF_BAND),
    })
}

/// Optional cleaning of a beat series before windowing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BbiFilter {
    pub remove_outliers: bool,
    pub remove_ectopic: bool,
    pub low_rri: f64,
    pub high_rri: f64,
    /// Largest accepted relative change from the last accepted interval.
    pub ectopic_tolerance: f64,
}

impl Default for BbiFilter {
    fn default() -> Self {
        BbiFilter {
            remove_outliers: true,
            remove_ectopic: true,
            low_rri: 300.0,
            high_rri: 2000.0,
            ectopic_tolerance: 0.2,
        }
    }
}

impl BbiFilter {
    /// Replaces outliers and ectopic beats by linear interpolation between
    /// their kept neighbours. Unfillable samples at either end are dropped.
    pub fn apply(&self, samples: &[BeatInterval]) -> Vec<BeatInterval> {
        let mut values: Vec<Option<f64>> = samples.iter().map(|s| Some(s.interval_ms)).collect();

        if self.remove_outliers {
            for v in values.iter_mut() {
                if v.is_some_and(|x| x < self.low_rri || x > self.high_rri) {
                    *v = None;
                }
            }
            interpolate_gaps(&mut values);
        }
        if self.remove_ectopic {
            let mut last_kept: Option<f64> = None;
            for v in values.iter_mut() {
                let Some(x) = *v else { continue };
                match last_kept {
                    Some(prev) if (x - prev).abs() > self.ectopic_tolerance * prev => *v = None,
                    _ => last_kept = Some(x),
                }
            }
            interpolate_gaps(&mut values);
        }

        let removed = values.iter().filter(|v| v.is_none()).count();
        if removed > 0 {
            debug!("Dropped {} unfillable beat intervals", removed);
        }
        samples
            .iter()
            .zip(values)
            .filter_map(|(s, v)| {
                v.map(|interval_ms| BeatInterval {
                    timestamp: s.timestamp,
                    interval_ms,
                })
            })
            .collect()
    }
}

/// Linear interpolation over gaps, by position; leading and trailing gaps stay.
fn interpolate_gaps(values: &mut [Option<f64>]) {
    let mut last: Option<(usize, f64)> = None;
    for i in 0..values.len() {
        let Some(current) = values[i] else { continue };
        if let Some((j, previous)) = last {
            let span = (i - j) as f64;
            for (offset, gap) in values[j + 1..i].iter_mut().enumerate() {
                let fraction = (offset + 1) as f64 / span;
                *gap = Some(previous + (current - previous) * fraction);
            }
        }
        last = Some((i, current));
    }
}

/// Statistics of one fixed-length window of beat intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowStatistics {
    pub start: NaiveDateTime,
    pub count: usize,
    pub mean_interval_ms: f64,
    /// Enough beats relative to the window's own mean interval.
    pub covered: bool,
    pub time: Option<TimeMeasures>,
    pub frequency: Option<FrequencyMeasures>,
}

impl WindowStatistics {
    /// The window's value for `metric`; zero when it was not computed.
    pub fn value(&self, metric: HrvMetric) -> f64 {
        match metric {
            HrvMetric::Rmssd => self.time.map_or(0.0, |t| t.rmssd),
            HrvMetric::Sdnn => self.time.map_or(0.0, |t| t.sdnn),
            HrvMetric::Lf => self.frequency.map_or(0.0, |f| f.lf),
            HrvMetric::Hf => self.frequency.map_or(0.0, |f| f.hf),
            HrvMetric::LfHf => self.frequency.map_or(0.0, |f| f.lf / f.hf),
        }
    }
}

/// Groups sorted samples into clock-aligned windows of `window_minutes`.
/// Non-positive intervals are skipped.
pub fn split_windows(
    samples: &[BeatInterval],
    window_minutes: u32,
) -> Vec<(NaiveDateTime, Vec<f64>)> {
    let width_ms = window_minutes.max(1) as i64 * 60_000;
    let mut windows: Vec<(i64, Vec<f64>)> = Vec::new();
    for sample in samples.iter().filter(|s| s.interval_ms > 0.0) {
        let bin = sample.timestamp.and_utc().timestamp_millis().div_euclid(width_ms);
        match windows.last_mut() {
            Some((current, intervals)) if *current == bin => intervals.push(sample.interval_ms),
            _ => windows.push((bin, vec![sample.interval_ms])),
        }
    }
    windows
        .into_iter()
        .filter_map(|(bin, intervals)| {
            DateTime::from_timestamp_millis(bin * width_ms).map(|t| (t.naive_utc(), intervals))
        })
        .collect()
}

/// Per-window statistics for the requested metrics.
pub fn analyse_windows(
    samples: &[BeatInterval],
    metrics: &[HrvMetric],
    config: &HrvConfig,
) -> Vec<WindowStatistics> {
    let needs_time = metrics.iter().any(|m| !m.is_spectral());
    let needs_frequency = metrics.iter().any(|m| m.is_spectral());
    let window_seconds = config.window_minutes as f64 * 60.0;

    split_windows(samples, config.window_minutes)
        .into_iter()
        .map(|(start, intervals)| {
            let count = intervals.len();
            let mean_interval_ms = intervals.iter().sum::<f64>() / count as f64;
            let expected = window_seconds / (mean_interval_ms / 1000.0);
            let covered = count as f64 > expected * config.coverage;
            let enough = count > config.min_samples;

            let time = (enough && needs_time).then(|| calc_ts_measures(&intervals));
            let frequency = if enough && needs_frequency {
                calc_frequency_measures(&intervals)
            } else {
                None
            };
            trace!(
                "Window {} n={} covered={} time={:?} freq={:?}",
                start,
                count,
                covered,
                time,
                frequency
            );
            WindowStatistics {
                start,
                count,
                mean_interval_ms,
                covered,
                time,
                frequency,
            }
        })
        .collect()
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Nightly mean of every covered, non-zero window value, per metric.
///
/// Metrics with fewer than `min_valid_windows` usable windows are left out.
pub fn night_statistics(
    samples: &[BeatInterval],
    metrics: &[HrvMetric],
    config: &HrvConfig,
) -> BTreeMap<HrvMetric, f64> {
    let windows = analyse_windows(samples, metrics, config);
    let mut out = BTreeMap::new();
    for &metric in metrics {
        let kept: Vec<f64> = windows
            .iter()
            .filter(|w| w.covered)
            .map(|w| w.value(metric))
            .filter(|v| *v != 0.0 && v.is_finite())
            .collect();
        debug!(
            "{}: {} of {} windows usable",
            metric,
            kept.len(),
            windows.len()
        );
        if kept.is_empty() || kept.len() < config.min_valid_windows {
            continue;
        }
        let mean = kept.iter().sum::<f64>() / kept.len() as f64;
        out.insert(metric, round_to(mean, config.decimals));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use chrono::Duration;

    /// Beats at a steady 60 bpm modulated at `freq` Hz with `amplitude` ms.
    fn modulated_beats(start: &str, seconds: f64, freq: f64, amplitude: f64) -> Vec<BeatInterval> {
        let start = at(start);
        let mut elapsed = 0.0;
        let mut beats = Vec::new();
        while elapsed < seconds * 1000.0 {
            let interval = 1000.0 + amplitude * (2.0 * PI * freq * elapsed / 1000.0).sin();
            elapsed += interval;
            beats.push(BeatInterval {
                timestamp: start + Duration::milliseconds(elapsed as i64),
                interval_ms: interval,
            });
        }
        beats
    }

    #[test]
    fn spline_reproduces_cubic() {
        let f = |x: f64| x.powi(3) - 2.0 * x * x + 0.5;
        let x = [0.0, 1.0, 2.5, 4.0, 5.0, 7.0];
        let y: Vec<f64> = x.iter().map(|&v| f(v)).collect();
        let spline = CubicSpline::new(&x, &y).unwrap();
        for x in [0.3, 2.0, 3.3, 6.1, 7.5] {
            assert_close(spline.evaluate(x), f(x), 1e-6);
        }
    }

    #[test]
    fn spline_with_few_knots_is_linear() {
        let spline = CubicSpline::new(&[0.0, 2.0, 4.0], &[0.0, 4.0, 0.0]).unwrap();
        assert_close(spline.evaluate(1.0), 2.0, 1e-12);
        assert_close(spline.evaluate(3.0), 2.0, 1e-12);
        assert!(CubicSpline::new(&[0.0, 0.0], &[1.0, 1.0]).is_none());
    }

    #[test]
    fn time_domain_measures() {
        let m = calc_ts_measures(&[800.0, 810.0, 790.0, 800.0]);
        assert_close(m.rmssd, 200f64.sqrt(), 1e-9);
        assert_close(m.sdnn, (200.0f64 / 3.0).sqrt(), 1e-9);
    }

    #[test]
    fn welch_recovers_white_noise_variance() {
        // density integrates to the signal variance
        let signal: Vec<f64> = (0..2048).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let (freqs, psd) = welch_psd(&signal, RESAMPLE_HZ, 256, 256).unwrap();
        let total: f64 = psd.iter().sum::<f64>() * (freqs[1] - freqs[0]);
        assert_close(total, 1.0, 0.05);
        let peak = psd
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| freqs[i])
            .unwrap();
        assert_close(peak, RESAMPLE_HZ / 2.0, 1e-9);
    }

    #[test]
    fn respiratory_modulation_lands_in_hf() {
        let beats = modulated_beats("2023-05-09 01:00:00", 290.0, 0.25, 40.0);
        let nn: Vec<f64> = beats.iter().map(|b| b.interval_ms).collect();
        let bands = calc_frequency_measures(&nn).unwrap();
        assert!(bands.hf > 10.0 * bands.lf, "{bands:?}");

        let slow = modulated_beats("2023-05-09 01:00:00", 290.0, 0.1, 40.0);
        let nn: Vec<f64> = slow.iter().map(|b| b.interval_ms).collect();
        let bands = calc_frequency_measures(&nn).unwrap();
        assert!(bands.lf > 10.0 * bands.hf, "{bands:?}");
    }

    #[test]
    fn windows_align_to_the_clock() {
        let beats = modulated_beats("2023-05-09 01:03:00", 600.0, 0.25, 10.0);
        let windows = split_windows(&beats, 5);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].0, at("2023-05-09 01:00:00"));
        assert_eq!(windows[1].0, at("2023-05-09 01:05:00"));
    }

    #[test]
    fn sparse_windows_are_excluded_from_the_night() {
        let mut beats = modulated_beats("2023-05-09 01:00:00", 297.0, 0.25, 30.0);
        // a second window holding only a handful of beats
        beats.extend(modulated_beats("2023-05-09 01:05:00", 20.0, 0.25, 30.0));
        let config = HrvConfig::default();
        let windows = analyse_windows(&beats, &[HrvMetric::Rmssd], &config);
        assert_eq!(windows.len(), 2);
        assert!(windows[0].covered);
        assert!(!windows[1].covered);

        let night = night_statistics(&beats, &HrvMetric::ALL, &config);
        let rmssd = night[&HrvMetric::Rmssd];
        assert_close(rmssd, windows[0].value(HrvMetric::Rmssd), 0.005);
        assert!(night[&HrvMetric::LfHf] < 1.0);
    }

    #[test]
    fn nightly_lf_hf_averages_window_ratios() {
        let mut beats = modulated_beats("2023-05-09 01:00:00", 297.0, 0.25, 40.0);
        beats.extend(modulated_beats("2023-05-09 01:05:00", 297.0, 0.1, 40.0));
        let config = HrvConfig::default();
        let windows = analyse_windows(&beats, &HrvMetric::ALL, &config);
        assert_eq!(windows.len(), 2);
        assert!(windows.iter().all(|w| w.covered));

        let bands: Vec<FrequencyMeasures> =
            windows.iter().map(|w| w.frequency.unwrap()).collect();
        let mean_of_ratios = bands.iter().map(|b| b.lf / b.hf).sum::<f64>() / 2.0;
        let ratio_of_means = (bands[0].lf + bands[1].lf) / (bands[0].hf + bands[1].hf);

        let night = night_statistics(&beats, &HrvMetric::ALL, &config);
        assert_close(night[&HrvMetric::LfHf], round_to(mean_of_ratios, 2), 1e-9);
        assert!((night[&HrvMetric::LfHf] - ratio_of_means).abs() > 1.0);
    }

    #[test]
    fn night_without_valid_windows_has_no_entry() {
        let beats = modulated_beats("2023-05-09 01:00:00", 4.0, 0.25, 30.0);
        assert!(night_statistics(&beats, &HrvMetric::ALL, &HrvConfig::default()).is_empty());
    }

    #[test]
    fn filter_interpolates_outliers_and_ectopic_beats() {
        let base = at("2023-05-09 01:00:00");
        let samples: Vec<BeatInterval> = [150.0, 800.0, 2500.0, 820.0, 1200.0, 840.0, 3000.0]
            .iter()
            .enumerate()
            .map(|(i, &v)| BeatInterval {
                timestamp: base + Duration::seconds(i as i64),
                interval_ms: v,
            })
            .collect();
        let cleaned = BbiFilter::default().apply(&samples);
        let values: Vec<f64> = cleaned.iter().map(|b| b.interval_ms).collect();
        assert_eq!(values, vec![800.0, 810.0, 820.0, 830.0, 840.0]);
        assert_eq!(cleaned[0].timestamp, base + Duration::seconds(1));
    }

    #[test]
    fn parses_metric_names() {
        assert_eq!("LFHF".parse::<HrvMetric>().unwrap(), HrvMetric::LfHf);
        assert!("pnn50".parse::<HrvMetric>().is_err());
    }
}
