use std::f64::consts::PI;

/// Angular frequency of the default traffic wave, in radians per minute.
///
/// A full low → high → low cycle takes `2π / k ≈ 4.93` minutes.
pub const DEFAULT_FREQUENCY: f64 = 4. / PI;

/// Target arrival rate over simulated time.
///
/// Implementations are pure: the same minute always maps to the same rate.
pub trait Intensity: Send + Sync + 'static {
    /// Mean arrival rate (requests per minute) at `minute` since the simulation start.
    fn rate_at(&self, minute: f64) -> f64;

    /// Highest rate this intensity can ever return.
    fn peak_rate(&self) -> f64;

    /// Expected amount of arrivals within `[0, minutes]`,
    /// i.e. the integral of [`Intensity::rate_at`].
    ///
    /// The default implementation integrates numerically (trapezoid, one step per second).
    fn expected_arrivals(&self, minutes: f64) -> f64 {
        if minutes <= 0. {
            return 0.;
        }

        let steps = (minutes * 60.).ceil().max(1.) as usize;
        let dm = minutes / steps as f64;

        let mut total = 0.;
        let mut prev = self.rate_at(0.);
        for i in 1..=steps {
            let next = self.rate_at(dm * i as f64);
            total += (prev + next) * dm / 2.;
            prev = next;
        }
        total
    }
}

impl<I: Intensity + ?Sized> Intensity for Box<I> {
    #[inline(always)]
    fn rate_at(&self, minute: f64) -> f64 {
        (**self).rate_at(minute)
    }

    #[inline(always)]
    fn peak_rate(&self) -> f64 {
        (**self).peak_rate()
    }

    #[inline(always)]
    fn expected_arrivals(&self, minutes: f64) -> f64 {
        (**self).expected_arrivals(minutes)
    }
}

/// Smooth periodic traffic: `rate(m) = (2 - cos(k·m)) × base`.
///
/// Starts at the base rate, peaks at three times the base rate
/// and never drops below the base rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CosineIntensity {
    base_rate_per_minute: f64,
    frequency: f64,
}

impl CosineIntensity {
    pub fn new(base_rate_per_minute: f64, frequency: f64) -> Self {
        Self {
            base_rate_per_minute,
            frequency,
        }
    }

    /// Cosine wave using [`DEFAULT_FREQUENCY`].
    pub fn with_base_rate(base_rate_per_minute: f64) -> Self {
        Self::new(base_rate_per_minute, DEFAULT_FREQUENCY)
    }

    pub fn base_rate_per_minute(&self) -> f64 {
        self.base_rate_per_minute
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Length of one full wave, in minutes.
    pub fn period_minutes(&self) -> f64 {
        2. * PI / self.frequency
    }
}

impl Intensity for CosineIntensity {
    fn rate_at(&self, minute: f64) -> f64 {
        let multiplier = -(self.frequency * minute).cos() + 2.;
        multiplier * self.base_rate_per_minute
    }

    fn peak_rate(&self) -> f64 {
        3. * self.base_rate_per_minute
    }

    fn expected_arrivals(&self, minutes: f64) -> f64 {
        if minutes <= 0. {
            return 0.;
        }
        let k = self.frequency;
        self.base_rate_per_minute * (2. * minutes - (k * minutes).sin() / k)
    }
}

/// Flat baseline traffic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantIntensity {
    rate_per_minute: f64,
}

impl ConstantIntensity {
    pub fn new(rate_per_minute: f64) -> Self {
        Self { rate_per_minute }
    }
}

impl Intensity for ConstantIntensity {
    fn rate_at(&self, _minute: f64) -> f64 {
        self.rate_per_minute
    }

    fn peak_rate(&self) -> f64 {
        self.rate_per_minute
    }

    fn expected_arrivals(&self, minutes: f64) -> f64 {
        self.rate_per_minute * minutes.max(0.)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn cosine_starts_at_base_rate() {
        let intensity = CosineIntensity::with_base_rate(20.);
        assert!((intensity.rate_at(0.) - 20.).abs() < EPSILON);
    }

    #[test]
    fn cosine_is_never_negative_and_stays_within_bounds() {
        let intensity = CosineIntensity::with_base_rate(20.);
        for i in 0..=60_000 {
            let minute = i as f64 / 1000.;
            let rate = intensity.rate_at(minute);
            assert!(rate >= 0., "negative rate {rate} at minute {minute}");
            assert!(rate >= 20. - EPSILON);
            assert!(rate <= intensity.peak_rate() + EPSILON);
        }
    }

    #[test]
    fn cosine_is_periodic() {
        let intensity = CosineIntensity::with_base_rate(100.);
        let period = intensity.period_minutes();
        assert!((period - PI * PI / 2.).abs() < EPSILON);

        for minute in [0., 0.25, 1., 3.3, 7.9] {
            let a = intensity.rate_at(minute);
            let b = intensity.rate_at(minute + period);
            assert!((a - b).abs() < 1e-6, "{a} != {b} at minute {minute}");
        }
    }

    #[test]
    fn cosine_peaks_at_half_period() {
        let intensity = CosineIntensity::new(10., 2.);
        let rate = intensity.rate_at(intensity.period_minutes() / 2.);
        assert!((rate - intensity.peak_rate()).abs() < 1e-6);
    }

    #[test]
    fn cosine_closed_form_matches_numeric_integral() {
        struct Numeric(CosineIntensity);

        impl Intensity for Numeric {
            fn rate_at(&self, minute: f64) -> f64 {
                self.0.rate_at(minute)
            }

            fn peak_rate(&self) -> f64 {
                self.0.peak_rate()
            }
        }

        let intensity = CosineIntensity::with_base_rate(20.);
        let closed = intensity.expected_arrivals(10.);
        let numeric = Numeric(intensity).expected_arrivals(10.);
        assert!(
            (closed - numeric).abs() < 0.05,
            "closed form {closed} vs numeric {numeric}"
        );
    }

    #[test]
    fn expected_arrivals_of_empty_window_is_zero() {
        assert_eq!(CosineIntensity::with_base_rate(20.).expected_arrivals(0.), 0.);
        assert_eq!(ConstantIntensity::new(20.).expected_arrivals(-1.), 0.);
    }

    #[test]
    fn constant_rate_is_flat() {
        let intensity = ConstantIntensity::new(42.);
        assert_eq!(intensity.rate_at(0.), 42.);
        assert_eq!(intensity.rate_at(123.4), 42.);
        assert_eq!(intensity.peak_rate(), 42.);
        assert_eq!(intensity.expected_arrivals(2.5), 105.);
    }

    #[test]
    fn boxed_intensity_forwards() {
        let boxed: Box<dyn Intensity> = Box::new(CosineIntensity::with_base_rate(5.));
        assert!((boxed.rate_at(0.) - 5.).abs() < EPSILON);
        assert_eq!(boxed.peak_rate(), 15.);
    }
}
