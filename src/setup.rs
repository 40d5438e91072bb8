//! Parse input configuration file

use std::path::Path;
use yaml_rust::{YamlLoader, yaml::Yaml};
use meval::Context;
use thiserror::Error;

use crate::constants::*;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("invalid input file: {0}\nUsage: tsource input-file")]
    InvalidInputFile(String),
    #[error("unable to parse '{0}' = '{1}' in configuration file")]
    CouldNotParse(String, String),
    #[error("unable to find '{1}' in section '{0}' with correct type in configuration file")]
    MissingField(String, String),
}

/// Converts a missing field into `None`, passing through any other
/// error, for parameters that have sensible defaults.
pub trait OptionalField<T> {
    fn optional(self) -> Result<Option<T>, InputError>;
}

impl<T> OptionalField<T> for Result<T, InputError> {
    fn optional(self) -> Result<Option<T>, InputError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(InputError::MissingField(_, _)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Represents the input configuration, can be queried
/// for desired parameters
pub struct Configuration<'a> {
    input: Yaml,
    ctx: Context<'a>,
}

impl<'a> Configuration<'a> {
    pub fn from_file(path: &Path) -> Result<Configuration<'a>, InputError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| InputError::InvalidInputFile(format!("unable to read {}: {}", path.display(), e)))?;
        Self::from_str(&contents)
    }

    pub fn from_str(contents: &str) -> Result<Configuration<'a>, InputError> {
        let input = YamlLoader::load_from_str(contents)
            .map_err(|e| InputError::InvalidInputFile(format!("yaml trouble: {}", e)))?;
        let input = input.first()
            .ok_or_else(|| InputError::InvalidInputFile("empty document".to_owned()))?;
        Ok(Configuration {
            input: input.clone(),
            ctx: Self::default_context(),
        })
    }

    /// Units, physical constants and helper functions available to
    /// every expression.
    fn default_context() -> Context<'a> {
        let mut ctx = Context::new();
        ctx.var("m", ELECTRON_MASS)
            .var("me", ELECTRON_MASS)
            .var("c", SPEED_OF_LIGHT)
            .var("e", ELEMENTARY_CHARGE)
            .var("h", PLANCK_CONSTANT)
            .var("hbar", REDUCED_PLANCK_CONSTANT)
            .var("eV", ELEMENTARY_CHARGE)
            .var("keV", 1.0e3 * ELEMENTARY_CHARGE)
            .var("MeV", 1.0e6 * ELEMENTARY_CHARGE)
            .var("femto", 1.0e-15)
            .var("pico", 1.0e-12)
            .var("nano", 1.0e-9)
            .var("micro", 1.0e-6)
            .var("milli", 1.0e-3)
            .var("kilo", 1.0e3)
            .var("mega", 1.0e6)
            .func3("step", |x, min, max| if x >= min && x < max {1.0} else {0.0})
            .func3("gauss", |x, mu, sigma| (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp())
            // photon energy (J) of the given wavelength (m)
            .func("photon", |lambda| PLANCK_CONSTANT * SPEED_OF_LIGHT / lambda)
            // Lorentz factor of an electron with the given total energy (J)
            .func("lorentz", |energy| energy / (ELECTRON_MASS * SPEED_OF_LIGHT.powi(2)));
        ctx
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.input[section].as_hash().is_some()
    }

    /// Adds the entries of `section` to the expression context. A
    /// missing section leaves the context unchanged.
    pub fn with_context(&mut self, section: &str) -> Result<&mut Self, InputError> {
        let entries = match self.input[section].as_hash() {
            Some(h) => h.clone(),
            None => return Ok(self),
        };

        // a constant cannot depend on other constants yet...
        let tmp = self.ctx.clone();

        for (a, b) in entries.iter() {
            match (a, b) {
                (Yaml::String(s), Yaml::Real(v)) => {
                    let num = v.parse::<f64>().map_err(|_| InputError::CouldNotParse(s.clone(), v.clone()))?;
                    self.ctx.var(s.as_str(), num);
                },
                (Yaml::String(s), Yaml::Integer(i)) => {
                    self.ctx.var(s.as_str(), *i as f64);
                },
                (Yaml::String(s), Yaml::String(v)) => {
                    let num = v.parse::<meval::Expr>()
                        .and_then(|expr| expr.eval_with_context(&tmp))
                        .map_err(|_| InputError::CouldNotParse(s.clone(), v.clone()))?;
                    self.ctx.var(s.as_str(), num);
                },
                _ => ()
            }
        }

        Ok(self)
    }

    fn evaluate(&self, name: &str, value: &Yaml) -> Option<Result<f64, InputError>> {
        match value {
            Yaml::Real(s) => Some(s.parse::<f64>().map_err(|_| InputError::CouldNotParse(name.to_owned(), s.clone()))),
            Yaml::Integer(i) => Some(Ok(*i as f64)),
            Yaml::String(s) => {
                let result = s.parse::<meval::Expr>()
                    .and_then(|expr| expr.eval_with_context(&self.ctx))
                    .map_err(|_| InputError::CouldNotParse(name.to_owned(), s.clone()));
                Some(result)
            },
            _ => None,
        }
    }

    pub fn real(&self, section: &str, field: &str) -> Result<f64, InputError> {
        self.evaluate(field, &self.input[section][field])
            .unwrap_or_else(|| Err(InputError::MissingField(section.to_owned(), field.to_owned())))
    }

    /// A list of reals, each of which may be an expression.
    pub fn reals(&self, section: &str, field: &str) -> Result<Vec<f64>, InputError> {
        match &self.input[section][field] {
            Yaml::Array(array) => {
                array.iter()
                    .map(|y| {
                        self.evaluate(field, y)
                            .unwrap_or_else(|| Err(InputError::CouldNotParse(field.to_owned(), format!("{:?}", y))))
                    })
                    .collect()
            },
            _ => Err(InputError::MissingField(section.to_owned(), field.to_owned())),
        }
    }

    /// A list of exactly `N` reals.
    pub fn reals_n<const N: usize>(&self, section: &str, field: &str) -> Result<[f64; N], InputError> {
        let values = self.reals(section, field)?;
        if values.len() != N {
            return Err(InputError::CouldNotParse(field.to_owned(), format!("expected {} entries, found {}", N, values.len())));
        }
        let mut out = [0.0; N];
        out.copy_from_slice(&values);
        Ok(out)
    }

    pub fn integer(&self, section: &str, field: &str) -> Result<i64, InputError> {
        match &self.input[section][field] {
            Yaml::Integer(i) => Ok(*i),
            _ => Err(InputError::MissingField(section.to_owned(), field.to_owned())),
        }
    }

    pub fn bool(&self, section: &str, field: &str) -> Result<bool, InputError> {
        match &self.input[section][field] {
            Yaml::Boolean(b) => Ok(*b),
            _ => Err(InputError::MissingField(section.to_owned(), field.to_owned())),
        }
    }

    pub fn strings(&self, section: &str, field: &str) -> Result<Vec<String>, InputError> {
        let name = field.to_owned();
        match &self.input[section][field] {
            Yaml::String(s) => {
                Ok(vec![s.clone()])
            },
            Yaml::Array(array) => {
                let got: Vec<String> = array.iter()
                    .filter_map(|y| y.as_str().map(|s| s.to_owned()))
                    .collect();
                if got.is_empty() {
                    Err(InputError::CouldNotParse(section.to_owned(), name))
                } else {
                    Ok(got)
                }
            },
            _ => Err(InputError::MissingField(section.to_owned(), name))
        }
    }

    pub fn string(&self, section: &str, field: &str) -> Result<String, InputError> {
        let mut strs = self.strings(section, field)?;
        Ok(strs.swap_remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = "
constants:
    wavelength: 800 * nano
    gamma0: 100
    gamma1: 2 * 50.0

electron:
    gamma: gamma0
    charge: 1.0 * nano
    emittance: [5.0 * nano, 5.0e-9]
    tracked: true

laser:
    photon_energy: photon(wavelength)
    pulse_energy: 0.02
    polarization: [1.0, 0.0]
    name: [a, b]
";

    #[test]
    fn expressions_and_constants() {
        let mut input = Configuration::from_str(INPUT).unwrap();
        input.with_context("constants").unwrap();

        let gamma = input.real("electron", "gamma").unwrap();
        assert_eq!(gamma, 100.0);
        assert_eq!(input.real("constants", "gamma1").unwrap(), 100.0);

        let eph = input.real("laser", "photon_energy").unwrap();
        let target = PLANCK_CONSTANT * SPEED_OF_LIGHT / 800.0e-9;
        println!("photon energy = {:.6e} J, target = {:.6e} J", eph, target);
        assert!(((eph - target) / target).abs() < 1.0e-12);
        assert!(input.bool("electron", "tracked").unwrap());
    }

    #[test]
    fn lists() {
        let input = Configuration::from_str(INPUT).unwrap();
        let eps = input.reals_n::<2>("electron", "emittance").unwrap();
        assert!((eps[0] - 5.0e-9).abs() < 1.0e-24);
        assert_eq!(eps[1], 5.0e-9);
        assert!(matches!(input.reals_n::<3>("laser", "polarization"), Err(InputError::CouldNotParse(_, _))));
        assert_eq!(input.strings("laser", "name").unwrap(), vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(input.string("laser", "name").unwrap(), "a");
    }

    #[test]
    fn missing_fields_and_sections() {
        let mut input = Configuration::from_str(INPUT).unwrap();
        assert!(input.with_context("nonexistent").is_ok());
        assert!(!input.has_section("rays"));
        assert!(input.has_section("laser"));

        assert!(matches!(input.real("laser", "frequency"), Err(InputError::MissingField(_, _))));
        assert_eq!(input.real("laser", "frequency").optional().unwrap(), None);
        assert_eq!(input.real("laser", "pulse_energy").optional().unwrap(), Some(0.02));
        assert_eq!(input.integer("rays", "count").optional().unwrap(), None);

        // present but unparseable is still an error
        let bad = Configuration::from_str("laser:\n    length: 3 * unknown\n").unwrap();
        assert!(bad.real("laser", "length").optional().is_err());
    }
}
