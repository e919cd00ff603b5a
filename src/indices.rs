//! Vegetation index calculator.
//!
//! Pure functions turning per-pixel (or field-average) reflectances into the
//! standard vegetation indices. Missing optional bands never fail: each index
//! that needs one falls back to an NDVI-derived approximation and is tagged as
//! such in [`IndexProvenance`].

use serde::{Deserialize, Serialize};

use crate::config::IndexParameters;

/// Reflectance values for one observation, typically in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectralBands {
    pub red: f64,
    pub nir: f64,
    pub blue: Option<f64>,
    pub green: Option<f64>,
    pub swir1: Option<f64>,
    pub swir2: Option<f64>,
}

impl SpectralBands {
    /// Bands with only the two required channels.
    pub fn new(red: f64, nir: f64) -> Self {
        Self {
            red,
            nir,
            ..Default::default()
        }
    }

    pub fn with_blue(mut self, blue: f64) -> Self {
        self.blue = Some(blue);
        self
    }

    pub fn with_green(mut self, green: f64) -> Self {
        self.green = Some(green);
        self
    }

    pub fn with_swir(mut self, swir1: f64, swir2: f64) -> Self {
        self.swir1 = Some(swir1);
        self.swir2 = Some(swir2);
        self
    }
}

/// Whether an index was computed from its own bands or approximated from NDVI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSource {
    #[default]
    Measured,
    Approximated,
}

/// Source tags for the indices that have a fallback path.
///
/// NDVI and SAVI only need the required bands, and LAI and FVC are derived
/// from them, so those four are always measured.
///
/// NDWI is Gao's canopy water index and is only measured when SWIR1 is
/// present. A green band does not help it: the McFeeters green/NIR form
/// tracks open water rather than leaf water, so `ndwi` stays `Approximated`
/// for green-only inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexProvenance {
    pub evi: IndexSource,
    pub gndvi: IndexSource,
    pub ndwi: IndexSource,
    pub ndmi: IndexSource,
}

impl IndexProvenance {
    /// Number of the eight indices computed from real bands.
    pub fn measured_count(&self) -> usize {
        let optional = [self.evi, self.gndvi, self.ndwi, self.ndmi]
            .iter()
            .filter(|s| **s == IndexSource::Measured)
            .count();
        4 + optional
    }

    pub fn is_fully_measured(&self) -> bool {
        self.measured_count() == 8
    }
}

/// The derived index bundle for one observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VegetationIndices {
    pub ndvi: f64,
    pub savi: f64,
    pub evi: f64,
    pub gndvi: f64,
    pub ndwi: f64,
    pub ndmi: f64,
    pub lai: f64,
    pub fvc: f64,
    #[serde(default)]
    pub provenance: IndexProvenance,
}

/// `(a - b) / (a + b)` clamped to `[-1, 1]`, or 0 when the sum is zero or not finite.
fn normalized_difference(a: f64, b: f64) -> f64 {
    let sum = a + b;
    if sum == 0.0 || !sum.is_finite() {
        return 0.0;
    }
    finite_or_zero((a - b) / sum).clamp(-1.0, 1.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Normalized Difference Vegetation Index, `(NIR - Red) / (NIR + Red)`.
///
/// Always in `[-1, 1]`; returns 0 when both bands are zero.
pub fn calculate_ndvi(red: f64, nir: f64) -> f64 {
    normalized_difference(nir, red)
}

/// Computes every index with the default parameters.
pub fn calculate_vegetation_indices(bands: &SpectralBands) -> VegetationIndices {
    IndexCalculator::default().calculate(bands)
}

/// Index calculator bound to a set of tunable parameters.
#[derive(Debug, Clone, Default)]
pub struct IndexCalculator {
    params: IndexParameters,
}

impl IndexCalculator {
    pub fn new(params: IndexParameters) -> Self {
        Self { params }
    }

    pub fn calculate(&self, bands: &SpectralBands) -> VegetationIndices {
        let ndvi = calculate_ndvi(bands.red, bands.nir);
        let savi = self.savi(bands.red, bands.nir);

        let mut provenance = IndexProvenance::default();

        let evi = match bands.blue {
            Some(blue) => evi(bands.red, bands.nir, blue),
            None => {
                provenance.evi = IndexSource::Approximated;
                ndvi
            }
        };

        let gndvi = match bands.green {
            Some(green) => normalized_difference(bands.nir, green),
            None => {
                provenance.gndvi = IndexSource::Approximated;
                (ndvi * self.params.gndvi_scale).clamp(-1.0, 1.0)
            }
        };

        // Gao NDWI: canopy water content from NIR against SWIR1. Green is not a substitute.
        let ndwi = match bands.swir1 {
            Some(swir1) => normalized_difference(bands.nir, swir1),
            None => {
                provenance.ndwi = IndexSource::Approximated;
                (ndvi - self.params.ndwi_offset).clamp(-1.0, 1.0)
            }
        };

        let ndmi = match bands.swir2 {
            Some(swir2) => normalized_difference(bands.nir, swir2),
            None => {
                provenance.ndmi = IndexSource::Approximated;
                (ndvi - self.params.ndmi_offset).clamp(-1.0, 1.0)
            }
        };

        VegetationIndices {
            ndvi,
            savi,
            evi,
            gndvi,
            ndwi,
            ndmi,
            lai: self.lai(savi),
            fvc: self.fvc(ndvi),
            provenance,
        }
    }

    /// Soil-Adjusted Vegetation Index, `((NIR - Red) / (NIR + Red + L)) * (1 + L)`.
    pub fn savi(&self, red: f64, nir: f64) -> f64 {
        let l = self.params.soil_adjustment;
        let denom = nir + red + l;
        if denom == 0.0 || !denom.is_finite() {
            return 0.0;
        }
        let bound = 1.0 + l.abs();
        finite_or_zero((nir - red) / denom * (1.0 + l)).clamp(-bound, bound)
    }

    /// Leaf area from SAVI using the exponential inversion
    /// `LAI = -ln((0.69 - SAVI) / 0.59) / 0.91`, bounded to `[0, max_lai]`.
    pub fn lai(&self, savi: f64) -> f64 {
        let s = savi.clamp(0.0, 0.689);
        let lai = -((0.69 - s) / 0.59).ln() / 0.91;
        finite_or_zero(lai).clamp(0.0, self.params.max_lai)
    }

    /// Fractional vegetation cover between the bare-soil and full-cover NDVI references.
    pub fn fvc(&self, ndvi: f64) -> f64 {
        let span = self.params.full_cover_ndvi - self.params.bare_soil_ndvi;
        if span <= 0.0 {
            return if ndvi >= self.params.full_cover_ndvi { 1.0 } else { 0.0 };
        }
        finite_or_zero((ndvi - self.params.bare_soil_ndvi) / span).clamp(0.0, 1.0)
    }
}

/// Enhanced Vegetation Index, `2.5 * (NIR - Red) / (NIR + 6*Red - 7.5*Blue + 1)`.
fn evi(red: f64, nir: f64, blue: f64) -> f64 {
    let denom = nir + 6.0 * red - 7.5 * blue + 1.0;
    if denom.abs() < 1e-10 || !denom.is_finite() {
        return 0.0;
    }
    finite_or_zero(2.5 * (nir - red) / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_ndvi_zero_bands() {
        assert_eq!(calculate_ndvi(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_ndvi_known_value() {
        assert_abs_diff_eq!(calculate_ndvi(0.15, 0.45), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(calculate_ndvi(0.1, 0.5), 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ndvi_stays_in_range_over_unit_square() {
        for i in 0..=20 {
            for j in 0..=20 {
                let red = i as f64 / 20.0;
                let nir = j as f64 / 20.0;
                let v = calculate_ndvi(red, nir);
                assert!((-1.0..=1.0).contains(&v), "ndvi({red}, {nir}) = {v}");
            }
        }
    }

    #[test]
    fn test_ndvi_clamps_odd_reflectances() {
        // Negative reflectances (atmospheric correction artifacts) can push the
        // raw ratio outside the unit interval.
        assert_eq!(calculate_ndvi(-0.3, 0.5), 1.0);
        assert_eq!(calculate_ndvi(0.5, -0.3), -1.0);
        assert_eq!(calculate_ndvi(0.2, -0.2), 0.0);
    }

    #[test]
    fn test_bundle_ndvi_matches_standalone() {
        let bands = SpectralBands::new(0.08, 0.42).with_blue(0.04);
        let indices = calculate_vegetation_indices(&bands);
        assert_eq!(indices.ndvi, calculate_ndvi(0.08, 0.42));
    }

    #[test]
    fn test_repeated_calls_are_bit_identical() {
        let bands = SpectralBands::new(0.07, 0.51)
            .with_blue(0.03)
            .with_green(0.09)
            .with_swir(0.22, 0.12);
        let a = calculate_vegetation_indices(&bands);
        let b = calculate_vegetation_indices(&bands);
        assert_eq!(a, b);
        assert_eq!(a.evi.to_bits(), b.evi.to_bits());
    }

    #[test]
    fn test_savi_formula() {
        let calc = IndexCalculator::default();
        // (0.45 - 0.15) / (0.6 + 0.5) * 1.5
        assert_abs_diff_eq!(calc.savi(0.15, 0.45), 0.3 / 1.1 * 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_evi_uses_blue_band() {
        let bands = SpectralBands::new(0.1, 0.5).with_blue(0.05);
        let indices = calculate_vegetation_indices(&bands);
        let expected = 2.5 * 0.4 / (0.5 + 0.6 - 0.375 + 1.0);
        assert_abs_diff_eq!(indices.evi, expected, epsilon = 1e-12);
        assert_eq!(indices.provenance.evi, IndexSource::Measured);
    }

    #[test]
    fn test_evi_falls_back_to_ndvi_without_blue() {
        let indices = calculate_vegetation_indices(&SpectralBands::new(0.1, 0.5));
        assert_eq!(indices.evi, indices.ndvi);
        assert_eq!(indices.provenance.evi, IndexSource::Approximated);
    }

    #[test]
    fn test_evi_degenerate_denominator() {
        // nir + 6 red - 7.5 blue + 1 == 0
        assert_eq!(evi(0.0, 0.5, 0.2), 0.0);
    }

    #[test]
    fn test_fallbacks_reduce_measured_count() {
        let bare = calculate_vegetation_indices(&SpectralBands::new(0.1, 0.5));
        assert_eq!(bare.provenance.measured_count(), 4);

        let full = calculate_vegetation_indices(
            &SpectralBands::new(0.1, 0.5)
                .with_blue(0.05)
                .with_green(0.08)
                .with_swir(0.2, 0.1),
        );
        assert!(full.provenance.is_fully_measured());
    }

    #[test]
    fn test_gndvi_and_moisture_approximations() {
        let calc = IndexCalculator::default();
        let indices = calc.calculate(&SpectralBands::new(0.15, 0.45));
        assert_abs_diff_eq!(indices.gndvi, 0.45, epsilon = 1e-9);
        assert_abs_diff_eq!(indices.ndwi, 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(indices.ndmi, 0.15, epsilon = 1e-9);
    }

    #[test]
    fn test_green_band_does_not_measure_ndwi() {
        let calc = IndexCalculator::default();
        let with_green = calc.calculate(&SpectralBands::new(0.15, 0.45).with_green(0.1));
        let without = calc.calculate(&SpectralBands::new(0.15, 0.45));

        assert_eq!(with_green.provenance.gndvi, IndexSource::Measured);
        assert_eq!(with_green.provenance.ndwi, IndexSource::Approximated);
        assert_eq!(with_green.ndwi, without.ndwi);
    }

    #[test]
    fn test_lai_bounds() {
        let calc = IndexCalculator::default();
        assert_eq!(calc.lai(-0.4), 0.0);
        assert_eq!(calc.lai(0.05), 0.0);
        assert!(calc.lai(0.5) > 1.0);
        assert!(calc.lai(1.4) <= 7.0);
        assert!(calc.lai(0.68) > calc.lai(0.6));
    }

    #[test]
    fn test_fvc_is_clamped() {
        let calc = IndexCalculator::default();
        assert_eq!(calc.fvc(-0.5), 0.0);
        assert_eq!(calc.fvc(0.2), 0.0);
        assert_eq!(calc.fvc(0.95), 1.0);
        assert_abs_diff_eq!(calc.fvc(0.53), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_all_outputs_finite_for_extreme_inputs() {
        let bands = SpectralBands {
            red: 1e300,
            nir: -1e300,
            blue: Some(1e-300),
            green: Some(0.0),
            swir1: Some(-0.0),
            swir2: Some(1e308),
        };
        let i = calculate_vegetation_indices(&bands);
        for v in [i.ndvi, i.savi, i.evi, i.gndvi, i.ndwi, i.ndmi, i.lai, i.fvc] {
            assert!(v.is_finite());
        }
    }
}
