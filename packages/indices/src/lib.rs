#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Spectral band algebra and the four derived index formulas.
//!
//! Each index is addressable as data: a stable output band name plus a
//! [`BandExpr`] formula tree over the source bands. The same tree is
//! evaluated per pixel by the local compositing engine and translated into
//! remote band-arithmetic calls by the Earth Engine client, so the
//! formulas live in exactly one place.
//!
//! All inputs are reflectance values on a common scale. Division by zero
//! (and any non-finite result) yields a masked value, never an error.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The Sentinel-2 source bands the formulas draw on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum SpectralBand {
    /// Blue (B2).
    #[serde(rename = "B2")]
    #[strum(serialize = "B2")]
    Blue,
    /// Green (B3).
    #[serde(rename = "B3")]
    #[strum(serialize = "B3")]
    Green,
    /// Red (B4).
    #[serde(rename = "B4")]
    #[strum(serialize = "B4")]
    Red,
    /// Near-infrared (B8).
    #[serde(rename = "B8")]
    #[strum(serialize = "B8")]
    Nir,
    /// Short-wave infrared 1 (B11).
    #[serde(rename = "B11")]
    #[strum(serialize = "B11")]
    Swir1,
    /// Short-wave infrared 2 (B12).
    #[serde(rename = "B12")]
    #[strum(serialize = "B12")]
    Swir2,
}

impl SpectralBand {
    /// The sensor band code, e.g. `"B8"` for near-infrared.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Blue => "B2",
            Self::Green => "B3",
            Self::Red => "B4",
            Self::Nir => "B8",
            Self::Swir1 => "B11",
            Self::Swir2 => "B12",
        }
    }

    /// All source bands a derivation-ready image must carry.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Blue,
            Self::Green,
            Self::Red,
            Self::Nir,
            Self::Swir1,
            Self::Swir2,
        ]
    }
}

/// A per-pixel band-math formula tree.
///
/// Evaluation is pure and local to one pixel of one image; a masked input
/// anywhere in the tree masks the result.
#[derive(Debug, Clone, PartialEq)]
pub enum BandExpr {
    /// A source band's reflectance value.
    Band(SpectralBand),
    /// A numeric constant.
    Const(f64),
    /// Sum of two subtrees.
    Add(Box<BandExpr>, Box<BandExpr>),
    /// Difference of two subtrees.
    Sub(Box<BandExpr>, Box<BandExpr>),
    /// Product of two subtrees.
    Mul(Box<BandExpr>, Box<BandExpr>),
    /// Quotient of two subtrees; a zero denominator masks the pixel.
    Div(Box<BandExpr>, Box<BandExpr>),
}

/// Shorthand for [`BandExpr::Band`].
#[must_use]
pub const fn band(b: SpectralBand) -> BandExpr {
    BandExpr::Band(b)
}

/// Shorthand for [`BandExpr::Const`].
#[must_use]
pub const fn constant(value: f64) -> BandExpr {
    BandExpr::Const(value)
}

impl std::ops::Add for BandExpr {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::Add(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Sub for BandExpr {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::Sub(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Mul for BandExpr {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::Mul(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Div for BandExpr {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        Self::Div(Box::new(self), Box::new(rhs))
    }
}

impl BandExpr {
    /// Evaluates the tree for one pixel, resolving band references through
    /// `resolve`.
    ///
    /// Returns `None` when any referenced band is masked, a denominator is
    /// zero, or the arithmetic produces a non-finite value.
    pub fn evaluate<F>(&self, resolve: &F) -> Option<f64>
    where
        F: Fn(SpectralBand) -> Option<f64>,
    {
        let value = match self {
            Self::Band(b) => resolve(*b)?,
            Self::Const(c) => *c,
            Self::Add(lhs, rhs) => lhs.evaluate(resolve)? + rhs.evaluate(resolve)?,
            Self::Sub(lhs, rhs) => lhs.evaluate(resolve)? - rhs.evaluate(resolve)?,
            Self::Mul(lhs, rhs) => lhs.evaluate(resolve)? * rhs.evaluate(resolve)?,
            Self::Div(lhs, rhs) => {
                let denominator = rhs.evaluate(resolve)?;
                if denominator == 0.0 {
                    return None;
                }
                lhs.evaluate(resolve)? / denominator
            }
        };

        value.is_finite().then_some(value)
    }
}

/// `(a - b) / (a + b)`, the normalized-difference form shared by three of
/// the four indices.
#[must_use]
pub fn normalized_difference(a: BandExpr, b: BandExpr) -> BandExpr {
    (a.clone() - b.clone()) / (a + b)
}

/// The four derived indicators computed for every site every day.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpectralIndex {
    /// Water/turbidity: `(B3 - B8) / (B3 + B8)`.
    #[serde(rename = "muddy_index")]
    #[strum(serialize = "muddy_index")]
    Muddy,
    /// Vegetation (EVI family):
    /// `2.5 * (NIR - RED) / (NIR + 6*RED - 7.5*BLUE + 1)`.
    #[serde(rename = "green_visual_index")]
    #[strum(serialize = "green_visual_index")]
    GreenVisual,
    /// Burn/dryness: `(NIR - (SWIR1 - SWIR2)) / (NIR + (SWIR1 - SWIR2))`.
    #[serde(rename = "fire_risk_index")]
    #[strum(serialize = "fire_risk_index")]
    FireRisk,
    /// Bare soil/surface exposure:
    /// `((SWIR1 + RED) - (NIR + BLUE)) / ((SWIR1 + RED) + (NIR + BLUE))`.
    #[serde(rename = "erosion_index")]
    #[strum(serialize = "erosion_index")]
    Erosion,
}

impl SpectralIndex {
    /// All four indices, in persistence-column order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Muddy, Self::GreenVisual, Self::FireRisk, Self::Erosion]
    }

    /// The derived band/column name, e.g. `"muddy_index"`.
    #[must_use]
    pub const fn band_name(self) -> &'static str {
        match self {
            Self::Muddy => "muddy_index",
            Self::GreenVisual => "green_visual_index",
            Self::FireRisk => "fire_risk_index",
            Self::Erosion => "erosion_index",
        }
    }

    /// The index's formula tree over the source bands.
    #[must_use]
    pub fn formula(self) -> BandExpr {
        use SpectralBand::{Blue, Green, Nir, Red, Swir1, Swir2};

        match self {
            Self::Muddy => normalized_difference(band(Green), band(Nir)),
            Self::GreenVisual => {
                constant(2.5) * (band(Nir) - band(Red))
                    / (band(Nir) + constant(6.0) * band(Red) - constant(7.5) * band(Blue)
                        + constant(1.0))
            }
            Self::FireRisk => normalized_difference(band(Nir), band(Swir1) - band(Swir2)),
            Self::Erosion => {
                normalized_difference(band(Swir1) + band(Red), band(Nir) + band(Blue))
            }
        }
    }

    /// Evaluates this index for one pixel. See [`BandExpr::evaluate`] for
    /// masking semantics.
    pub fn compute<F>(self, resolve: &F) -> Option<f64>
    where
        F: Fn(SpectralBand) -> Option<f64>,
    {
        self.formula().evaluate(resolve)
    }
}

/// A full set of reflectance values for one pixel, for callers that have
/// all six source bands in hand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandReflectance {
    /// Blue (B2).
    pub blue: f64,
    /// Green (B3).
    pub green: f64,
    /// Red (B4).
    pub red: f64,
    /// Near-infrared (B8).
    pub nir: f64,
    /// Short-wave infrared 1 (B11).
    pub swir1: f64,
    /// Short-wave infrared 2 (B12).
    pub swir2: f64,
}

impl BandReflectance {
    /// Resolves a band reference against this pixel's values.
    #[must_use]
    pub const fn resolve(&self, b: SpectralBand) -> Option<f64> {
        Some(match b {
            SpectralBand::Blue => self.blue,
            SpectralBand::Green => self.green,
            SpectralBand::Red => self.red,
            SpectralBand::Nir => self.nir,
            SpectralBand::Swir1 => self.swir1,
            SpectralBand::Swir2 => self.swir2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: BandReflectance = BandReflectance {
        blue: 0.1,
        green: 0.2,
        red: 0.15,
        nir: 0.4,
        swir1: 0.25,
        swir2: 0.2,
    };

    fn compute(index: SpectralIndex) -> Option<f64> {
        index.compute(&|b| PIXEL.resolve(b))
    }

    #[test]
    fn muddy_index_matches_direct_substitution() {
        let expected = (0.2 - 0.4) / (0.2 + 0.4);
        let got = compute(SpectralIndex::Muddy).unwrap();
        assert!((got - expected).abs() < 1e-12, "got {got}");
        assert!((got + 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn green_visual_index_matches_direct_substitution() {
        let expected = 2.5 * (0.4 - 0.15) / (0.4 + 6.0 * 0.15 - 7.5 * 0.1 + 1.0);
        let got = compute(SpectralIndex::GreenVisual).unwrap();
        assert!((got - expected).abs() < 1e-12, "got {got}");
    }

    #[test]
    fn fire_risk_index_matches_direct_substitution() {
        let expected = (0.4 - (0.25 - 0.2)) / (0.4 + (0.25 - 0.2));
        let got = compute(SpectralIndex::FireRisk).unwrap();
        assert!((got - expected).abs() < 1e-12, "got {got}");
    }

    #[test]
    fn erosion_index_matches_direct_substitution() {
        let expected = ((0.25 + 0.15) - (0.4 + 0.1)) / ((0.25 + 0.15) + (0.4 + 0.1));
        let got = compute(SpectralIndex::Erosion).unwrap();
        assert!((got - expected).abs() < 1e-12, "got {got}");
    }

    #[test]
    fn zero_denominator_masks_the_pixel() {
        // green == -nir makes the muddy denominator exactly zero
        let pixel = BandReflectance {
            green: 0.3,
            nir: -0.3,
            ..PIXEL
        };
        assert_eq!(SpectralIndex::Muddy.compute(&|b| pixel.resolve(b)), None);
    }

    #[test]
    fn masked_input_masks_the_result() {
        let resolve = |b: SpectralBand| {
            if b == SpectralBand::Nir {
                None
            } else {
                PIXEL.resolve(b)
            }
        };
        assert_eq!(SpectralIndex::Muddy.compute(&resolve), None);
        // Erosion also references NIR, so it masks too
        assert_eq!(SpectralIndex::Erosion.compute(&resolve), None);
    }

    #[test]
    fn band_codes_are_stable() {
        let codes: Vec<&str> = SpectralBand::all().iter().map(|b| b.code()).collect();
        assert_eq!(codes, vec!["B2", "B3", "B4", "B8", "B11", "B12"]);
    }

    #[test]
    fn band_names_are_persistence_columns() {
        let names: Vec<&str> = SpectralIndex::all()
            .iter()
            .map(|i| i.band_name())
            .collect();
        assert_eq!(
            names,
            vec![
                "muddy_index",
                "green_visual_index",
                "fire_risk_index",
                "erosion_index"
            ]
        );
    }
}
