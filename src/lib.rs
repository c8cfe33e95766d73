#![doc = include_str!("../README.md")]

use std::fmt;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

mod error;
mod expr;
mod model;
mod normal;
mod solve;

pub use error::{Error, Result};
pub use expr::{Expr, Rational};
pub use model::{ModelSpec, ReportSpec, Transform};
pub use normal::{normal_equations, EquationSystem};
pub use solve::Solution;

/// The derived closed forms of one model family.
///
/// `coefficients` holds the reported formulas in declaration order, with
/// log-parameters already exponentiated; `derivatives` holds the raw
/// objective's partial derivatives for derivation display.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedModel {
    family: String,
    coefficients: Vec<(String, Expr)>,
    derivatives: Vec<(String, Expr)>,
}

impl DerivedModel {
    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn coefficients(&self) -> &[(String, Expr)] {
        &self.coefficients
    }

    pub fn coefficient(&self, name: &str) -> Option<&Expr> {
        self.coefficients
            .iter()
            .find(|(coefficient, _)| coefficient == name)
            .map(|(_, formula)| formula)
    }

    /// Raw objective derivatives, one per raw parameter.
    pub fn derivatives(&self) -> &[(String, Expr)] {
        &self.derivatives
    }
}

impl fmt::Display for DerivedModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut chars = self.family.chars();
        if let Some(first) = chars.next() {
            write!(f, "{}{}", first.to_uppercase(), chars.as_str())?;
        }
        writeln!(f, " regression:")?;
        for (parameter, derivative) in &self.derivatives {
            writeln!(f, "dE/d{} = {}", parameter, derivative)?;
        }
        for (name, formula) in &self.coefficients {
            writeln!(f, "{} = {}", name, formula)?;
        }
        Ok(())
    }
}

/// Run the full derivation for one model family: build the normal equations,
/// solve them with staged elimination and apply the report transforms.
///
/// Each call is independent and deterministic; nothing is cached between
/// families.
pub fn derive(spec: &ModelSpec) -> Result<DerivedModel> {
    let system = normal_equations(spec)?;
    let solution = system.solve()?;
    let mut coefficients = Vec::with_capacity(solution.len());
    if spec.reports().is_empty() {
        for (name, formula) in solution.iter() {
            coefficients.push((name.clone(), formula.clone()));
        }
    } else {
        for report in spec.reports() {
            let formula = solution
                .get(&report.parameter)
                .ok_or_else(|| Error::UnknownParameter(report.parameter.clone()))?;
            let formula = match report.transform {
                Transform::Identity => formula.clone(),
                Transform::Exp => Expr::exp(formula.clone()),
            };
            coefficients.push((report.coefficient.clone(), formula));
        }
    }
    Ok(DerivedModel {
        family: spec.name().to_string(),
        coefficients,
        derivatives: spec.objective_derivatives(),
    })
}
