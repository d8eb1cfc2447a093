//! Morphological measurements

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const HAUTEUR_AU_GARROT: &str = "hauteur_au_garrot";
pub const LARGEUR_DU_CORPS: &str = "largeur_du_corps";
pub const LONGUEUR_DU_CORPS: &str = "longueur_du_corps";

/// Measurement validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasurementError {
    #[error("{name} is negative ({valeur})")]
    Negative { name: &'static str, valeur: f64 },

    #[error("{name} is not a finite number")]
    NotFinite { name: &'static str },

    #[error("{name} has no unit")]
    MissingUnit { name: &'static str },

    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// A single morphological reading (value + unit)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Measured value, never negative
    pub valeur: f64,
    /// Unit label as reported by the measurement service (e.g. "cm")
    pub unite: String,
}

impl Measurement {
    pub fn new(valeur: f64, unite: impl Into<String>) -> Self {
        Self {
            valeur,
            unite: unite.into(),
        }
    }

    /// Centimetre reading, the unit the measurement service reports
    pub fn cm(valeur: f64) -> Self {
        Self::new(valeur, "cm")
    }

    pub fn validate(&self, name: &'static str) -> Result<(), MeasurementError> {
        if !self.valeur.is_finite() {
            return Err(MeasurementError::NotFinite { name });
        }
        if self.valeur < 0.0 {
            return Err(MeasurementError::Negative {
                name,
                valeur: self.valeur,
            });
        }
        if self.unite.trim().is_empty() {
            return Err(MeasurementError::MissingUnit { name });
        }
        Ok(())
    }
}

/// The three measurements every morphology record carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub hauteur_au_garrot: Measurement,
    pub largeur_du_corps: Measurement,
    pub longueur_du_corps: Measurement,
}

impl Measurements {
    /// Named view in a stable order
    pub fn named(&self) -> [(&'static str, &Measurement); 3] {
        [
            (HAUTEUR_AU_GARROT, &self.hauteur_au_garrot),
            (LARGEUR_DU_CORPS, &self.largeur_du_corps),
            (LONGUEUR_DU_CORPS, &self.longueur_du_corps),
        ]
    }

    pub fn validate(&self) -> Result<(), MeasurementError> {
        for (name, measurement) in self.named() {
            measurement.validate(name)?;
        }
        Ok(())
    }
}

/// Check that a confidence score lies in [0, 1]
pub fn validate_confidence(confidence: f64) -> Result<(), MeasurementError> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(MeasurementError::ConfidenceOutOfRange(confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Measurements {
        Measurements {
            hauteur_au_garrot: Measurement::cm(124.5),
            largeur_du_corps: Measurement::cm(57.2),
            longueur_du_corps: Measurement::cm(142.0),
        }
    }

    #[test]
    fn test_valid_measurements() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_zero_is_allowed() {
        assert!(Measurement::cm(0.0).validate(HAUTEUR_AU_GARROT).is_ok());
    }

    #[test]
    fn test_negative_rejected_with_name() {
        let mut m = sample();
        m.largeur_du_corps.valeur = -1.0;
        assert_eq!(
            m.validate(),
            Err(MeasurementError::Negative {
                name: LARGEUR_DU_CORPS,
                valeur: -1.0
            })
        );
    }

    #[test]
    fn test_nan_and_missing_unit_rejected() {
        assert!(matches!(
            Measurement::cm(f64::NAN).validate(HAUTEUR_AU_GARROT),
            Err(MeasurementError::NotFinite { .. })
        ));
        assert!(matches!(
            Measurement::new(10.0, " ").validate(HAUTEUR_AU_GARROT),
            Err(MeasurementError::MissingUnit { .. })
        ));
    }

    #[test]
    fn test_confidence_bounds() {
        assert!(validate_confidence(0.0).is_ok());
        assert!(validate_confidence(1.0).is_ok());
        assert!(validate_confidence(1.01).is_err());
        assert!(validate_confidence(f64::NAN).is_err());
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["hauteur_au_garrot"]["valeur"], 124.5);
        assert_eq!(json["longueur_du_corps"]["unite"], "cm");
    }
}
