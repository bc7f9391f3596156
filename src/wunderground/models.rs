use std::collections::BTreeMap;

use crate::reading_cache::Snapshot;

// Magnus formula coefficients (Sonntag 1990), valid for -45..60 °C.
const MAGNUS_B: f64 = 17.62;
const MAGNUS_C: f64 = 243.12;

/// Upload parameters for one station update, keyed by Weather Underground
/// field name (`tempf`, `humidity`, `baromin`, ...).
///
/// Sorted so outgoing requests are stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    fields: BTreeMap<String, String>,
}

impl Observation {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            fields: snapshot.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Add `dewptf` from `tempf` and `humidity` unless the station already
    /// reports one. Unparsable or out-of-range inputs leave the observation
    /// unchanged.
    pub fn fill_dewpoint(&mut self) {
        if self.fields.contains_key("dewptf") {
            return;
        }
        let temp_f = self.get("tempf").and_then(|v| v.trim().parse::<f64>().ok());
        let humidity = self.get("humidity").and_then(|v| v.trim().parse::<f64>().ok());

        if let (Some(t), Some(rh)) = (temp_f, humidity) {
            if let Some(dp) = dewpoint_f(t, rh) {
                self.fields.insert("dewptf".to_owned(), format!("{dp:.1}"));
            }
        }
    }
}

/// Dew point in °F for air temperature `temp_f` (°F) and relative humidity
/// `humidity` (%). `None` when humidity is outside `(0, 100]`.
pub fn dewpoint_f(temp_f: f64, humidity: f64) -> Option<f64> {
    if !(humidity > 0.0 && humidity <= 100.0) || !temp_f.is_finite() {
        return None;
    }
    let temp_c = (temp_f - 32.0) * 5.0 / 9.0;
    let gamma = (humidity / 100.0).ln() + MAGNUS_B * temp_c / (MAGNUS_C + temp_c);
    let dew_c = MAGNUS_C * gamma / (MAGNUS_B - gamma);
    Some(dew_c * 9.0 / 5.0 + 32.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(pairs: &[(&str, &str)]) -> Observation {
        Observation::from_snapshot(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn dewpoint_equals_temperature_at_saturation() {
        let dp = dewpoint_f(68.0, 100.0).unwrap();
        assert!((dp - 68.0).abs() < 1e-9, "{dp}");
    }

    #[test]
    fn dewpoint_known_value() {
        // 20 °C at 50 % RH → ~9.3 °C (48.7 °F)
        let dp = dewpoint_f(68.0, 50.0).unwrap();
        assert!((dp - 48.7).abs() < 0.2, "{dp}");
    }

    #[test]
    fn dewpoint_rejects_bad_humidity() {
        assert!(dewpoint_f(68.0, 0.0).is_none());
        assert!(dewpoint_f(68.0, -5.0).is_none());
        assert!(dewpoint_f(68.0, 101.0).is_none());
        assert!(dewpoint_f(f64::NAN, 50.0).is_none());
    }

    #[test]
    fn fill_dewpoint_adds_field() {
        let mut obs = observation(&[("tempf", "68"), ("humidity", "100")]);
        obs.fill_dewpoint();
        assert_eq!(obs.get("dewptf"), Some("68.0"));
    }

    #[test]
    fn fill_dewpoint_keeps_reported_value() {
        let mut obs = observation(&[("tempf", "68"), ("humidity", "50"), ("dewptf", "47.0")]);
        obs.fill_dewpoint();
        assert_eq!(obs.get("dewptf"), Some("47.0"));
    }

    #[test]
    fn fill_dewpoint_needs_both_inputs() {
        let mut obs = observation(&[("tempf", "68")]);
        obs.fill_dewpoint();
        assert_eq!(obs.get("dewptf"), None);

        let mut obs = observation(&[("tempf", "warm"), ("humidity", "50")]);
        obs.fill_dewpoint();
        assert_eq!(obs.get("dewptf"), None);
    }

    #[test]
    fn fields_are_sorted() {
        let obs = observation(&[("tempf", "1"), ("baromin", "2"), ("humidity", "3")]);
        let keys: Vec<_> = obs.fields().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["baromin", "humidity", "tempf"]);
    }
}
