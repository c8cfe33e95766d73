//! Normal-equation builder
//!
//! Squares the model residual, differentiates with respect to each parameter
//! and lowers the per-point derivative to aggregate-sum symbols: every data
//! monomial is replaced by its declared dataset-wide sum, while parameter
//! symbols pass through untouched. The common constant factor left over from
//! differentiating a square is stripped, so the equations come out in the
//! hand-written textbook form.

use crate::error::{Error, Result};
use crate::expr::{monomial_expr, Expr, Monomial};
use crate::model::ModelSpec;

/// A square system of normal equations.
///
/// Equation `i` is the partial derivative of the error objective with
/// respect to parameter `i`; the solver relies on that pairing when it
/// eliminates parameters stage by stage. Each equation is an expression
/// implicitly set to zero.
#[derive(Debug, Clone)]
pub struct EquationSystem {
    equations: Vec<Expr>,
    parameters: Vec<String>,
}

impl EquationSystem {
    pub fn new(equations: Vec<Expr>, parameters: Vec<String>) -> Result<Self> {
        if equations.len() != parameters.len() {
            return Err(Error::ParameterCountMismatch {
                parameters: parameters.len(),
                equations: equations.len(),
            });
        }
        Ok(EquationSystem {
            equations,
            parameters,
        })
    }

    pub fn equations(&self) -> &[Expr] {
        &self.equations
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }
}

/// Build the normal equations of a model spec.
///
/// The output has exactly one equation per parameter, in declaration order.
/// Fails with [`Error::UnknownAggregate`] when the derivative mentions a
/// data term the spec declares no sum for; solving is never attempted in
/// that case.
pub fn normal_equations(spec: &ModelSpec) -> Result<EquationSystem> {
    let objective = Expr::powi(spec.residual().clone(), 2);
    let mut equations = Vec::with_capacity(spec.parameters().len());
    for parameter in spec.parameters() {
        let derivative = objective.diff(parameter);
        equations.push(lower(&derivative, spec)?);
    }
    EquationSystem::new(equations, spec.parameters().to_vec())
}

/// Lower a per-point derivative to aggregate-sum symbols and strip the
/// constant content.
fn lower(derivative: &Expr, spec: &ModelSpec) -> Result<Expr> {
    let mut lowered = Vec::new();
    for (coefficient, monomial) in derivative.expand_terms() {
        let (parameter_part, data_part) = split_monomial(&monomial, spec.parameters());
        let sum_symbol = aggregate_symbol(&data_part, spec)?;
        lowered.push(Expr::product(vec![
            Expr::Num(coefficient),
            monomial_expr(&parameter_part),
            sum_symbol,
        ]));
    }
    let equation = Expr::sum(lowered).expand();
    let content = equation.rational_content();
    Ok(equation.scale(content.recip()))
}

/// Split a monomial into its parameter factors and its data factors.
fn split_monomial(monomial: &Monomial, parameters: &[String]) -> (Monomial, Monomial) {
    let mut parameter_part = Monomial::new();
    let mut data_part = Monomial::new();
    for (atom, power) in monomial {
        let is_parameter = match atom {
            Expr::Sym(name) => parameters.iter().any(|p| p == name),
            _ => false,
        };
        if is_parameter {
            parameter_part.insert(atom.clone(), *power);
        } else {
            data_part.insert(atom.clone(), *power);
        }
    }
    (parameter_part, data_part)
}

/// Look the data monomial up in the spec's aggregate table. The empty
/// monomial stands for the per-point constant `1` and must map to the count
/// symbol.
fn aggregate_symbol(data_part: &Monomial, spec: &ModelSpec) -> Result<Expr> {
    let key = monomial_expr(data_part).expand();
    for (monomial, symbol) in spec.sums() {
        if *monomial == key {
            return Ok(Expr::sym(symbol));
        }
    }
    Err(Error::UnknownAggregate(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelSpec;

    fn s(name: &str) -> Expr {
        Expr::sym(name)
    }

    #[test]
    fn linear_normal_equations_match_textbook_form() {
        let system = normal_equations(&ModelSpec::linear()).unwrap();
        let expected = [
            (s("a") * s("sx2") + s("b") * s("sx") - s("sxy")).expand(),
            (s("a") * s("sx") + s("b") * s("n") - s("sy")).expand(),
        ];
        assert_eq!(system.equations(), expected);
    }

    #[test]
    fn quadratic_normal_equations_match_textbook_form() {
        let system = normal_equations(&ModelSpec::quadratic()).unwrap();
        let expected = [
            (s("a") * s("sx4") + s("b") * s("sx3") + s("c") * s("sx2") - s("sx2y")).expand(),
            (s("a") * s("sx3") + s("b") * s("sx2") + s("c") * s("sx") - s("sxy")).expand(),
            (s("a") * s("sx2") + s("b") * s("sx") + s("c") * s("n") - s("sy")).expand(),
        ];
        assert_eq!(system.equations(), expected);
    }

    #[test]
    fn power_normal_equations_use_log_sums() {
        let system = normal_equations(&ModelSpec::power()).unwrap();
        let expected = [
            (s("b") * s("sln2x") + s("lna") * s("slnx") - s("slnxlny")).expand(),
            (s("b") * s("slnx") + s("lna") * s("n") - s("slny")).expand(),
        ];
        assert_eq!(system.equations(), expected);
    }

    #[test]
    fn exponential_normal_equations_use_log_sums() {
        let system = normal_equations(&ModelSpec::exponential()).unwrap();
        let expected = [
            (s("lnb") * s("sx2") + s("lna") * s("sx") - s("sxlny")).expand(),
            (s("lnb") * s("sx") + s("lna") * s("n") - s("slny")).expand(),
        ];
        assert_eq!(system.equations(), expected);
    }

    #[test]
    fn undeclared_aggregate_is_rejected_before_solving() {
        // quadratic residual against the linear sum vocabulary: d/da
        // produces x^4 and x^2*y terms nothing maps to
        let residual = s("a") * Expr::powi(s("x"), 2) + s("b") - s("y");
        let spec = ModelSpec::new("bad", residual, &["a", "b"])
            .with_sum(Expr::powi(s("x"), 2), "sx2")
            .with_sum(s("x"), "sx")
            .with_sum(s("x") * s("y"), "sxy")
            .with_sum(s("y"), "sy")
            .with_sum(Expr::int(1), "n");
        match normal_equations(&spec) {
            Err(Error::UnknownAggregate(_)) => {}
            other => panic!("expected UnknownAggregate, got {:?}", other),
        }
    }

    #[test]
    fn square_system_invariant_is_enforced() {
        let err = EquationSystem::new(
            vec![s("a") * s("sx") - s("sy")],
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::ParameterCountMismatch {
                parameters: 2,
                equations: 1,
            }
        );
    }
}
