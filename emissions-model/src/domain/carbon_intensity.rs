use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarbonIntensitySample {
    pub datetime: OffsetDateTime,
    /// Grams CO2-equivalent per kWh.
    pub ci_g_per_kwh: f64,
}

/// Carbon-intensity samples, unique by `datetime` and sorted ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarbonIntensitySeries {
    samples: Vec<CarbonIntensitySample>,
}

impl CarbonIntensitySeries {
    /// Builds a series from arbitrary samples. When two samples share a
    /// `datetime`, the one appearing first in the input is kept.
    pub fn from_samples<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = CarbonIntensitySample>,
    {
        let mut samples: Vec<CarbonIntensitySample> = samples.into_iter().collect();
        // Stable sort keeps input order among equal timestamps.
        samples.sort_by_key(|s| s.datetime);
        samples.dedup_by_key(|s| s.datetime);
        Self { samples }
    }

    pub fn lookup(&self, datetime: OffsetDateTime) -> Option<f64> {
        self.samples
            .binary_search_by_key(&datetime, |s| s.datetime)
            .ok()
            .map(|idx| self.samples[idx].ci_g_per_kwh)
    }

    pub fn samples(&self) -> &[CarbonIntensitySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&CarbonIntensitySample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&CarbonIntensitySample> {
        self.samples.last()
    }
}
