//! Model-family declarations
//!
//! A [`ModelSpec`] carries everything needed to derive the closed-form
//! least-squares coefficients of one family: the linearized residual, the
//! parameters in solve order, the aggregate-sum vocabulary and the report
//! transforms that map solved parameters back to the model's coefficients.
//!
//! Power and exponential supply the residual of the *log-linearized* model
//! (ordinary least squares on logs, not true nonlinear least squares): their
//! unknowns are the logarithms of the multiplicative coefficients, and the
//! aggregate sums range over log-transformed data.

use crate::expr::Expr;

/// How a solved parameter maps to the reported model coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// The parameter is the coefficient
    Identity,
    /// The parameter is the logarithm of the coefficient
    Exp,
}

/// One reported coefficient of a fitted model.
#[derive(Debug, Clone)]
pub struct ReportSpec {
    /// Name of the coefficient as it appears in the model form
    pub coefficient: String,
    /// Name of the solved parameter the coefficient comes from
    pub parameter: String,
    pub transform: Transform,
}

/// Declarative description of one curve-fitting model family.
///
/// Purely data, no behavior beyond accessors; the builder and the solver
/// consume it. Every constructor builds fresh expressions, so concurrent or
/// repeated derivations never share state.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    name: String,
    /// Squared residual of the raw (pre-linearization) model, used only for
    /// the human-readable derivative display
    objective: Option<(Expr, Vec<String>)>,
    /// Residual of the (possibly linearized) model per data point
    residual: Expr,
    /// Unknowns of the linearized objective, in solve order
    parameters: Vec<String>,
    /// Aggregate-sum vocabulary: data monomial -> sum-symbol name.
    /// The empty monomial (`1`) maps to the count symbol.
    sums: Vec<(Expr, String)>,
    reports: Vec<ReportSpec>,
}

impl ModelSpec {
    /// A bare spec from a residual and its parameters. Aggregate sums and
    /// reports are added with the `with_*` methods; reports default to the
    /// parameters themselves.
    pub fn new(name: &str, residual: Expr, parameters: &[&str]) -> Self {
        ModelSpec {
            name: name.to_string(),
            objective: None,
            residual,
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            sums: Vec::new(),
            reports: Vec::new(),
        }
    }

    /// Attach the raw squared-error objective and its parameter names for
    /// derivative display. Without it, the display falls back to the
    /// linearized residual's objective.
    pub fn with_objective(mut self, objective: Expr, parameters: &[&str]) -> Self {
        self.objective = Some((
            objective,
            parameters.iter().map(|p| p.to_string()).collect(),
        ));
        self
    }

    /// Declare an aggregate sum: `monomial` is the per-point data term the
    /// sum ranges over, `symbol` the name it keeps in every output formula.
    pub fn with_sum(mut self, monomial: Expr, symbol: &str) -> Self {
        self.sums.push((monomial.expand(), symbol.to_string()));
        self
    }

    pub fn with_report(mut self, coefficient: &str, parameter: &str, transform: Transform) -> Self {
        self.reports.push(ReportSpec {
            coefficient: coefficient.to_string(),
            parameter: parameter.to_string(),
            transform,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn residual(&self) -> &Expr {
        &self.residual
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn sums(&self) -> &[(Expr, String)] {
        &self.sums
    }

    pub fn reports(&self) -> &[ReportSpec] {
        &self.reports
    }

    /// Partial derivatives of the raw squared-error objective with respect
    /// to each raw parameter, lightly simplified but not expanded, for
    /// derivation display.
    pub fn objective_derivatives(&self) -> Vec<(String, Expr)> {
        let (objective, parameters) = match &self.objective {
            Some((objective, parameters)) => (objective.clone(), parameters.clone()),
            None => (
                Expr::powi(self.residual.clone(), 2),
                self.parameters.clone(),
            ),
        };
        parameters
            .into_iter()
            .map(|p| {
                let d = objective.diff(&p).normalize();
                (p, d)
            })
            .collect()
    }

    /// `a*x + b`, parameters `a`, `b`, no linearization.
    pub fn linear() -> Self {
        let (a, b) = (Expr::sym("a"), Expr::sym("b"));
        let (x, y) = (Expr::sym("x"), Expr::sym("y"));
        let residual = a * x.clone() + b - y.clone();
        ModelSpec::new("linear", residual, &["a", "b"])
            .with_sum(Expr::powi(x.clone(), 2), "sx2")
            .with_sum(x.clone(), "sx")
            .with_sum(x * y.clone(), "sxy")
            .with_sum(y, "sy")
            .with_sum(Expr::int(1), "n")
    }

    /// `a*x^2 + b*x + c`, parameters `a`, `b`, `c`, no linearization.
    pub fn quadratic() -> Self {
        let (a, b, c) = (Expr::sym("a"), Expr::sym("b"), Expr::sym("c"));
        let (x, y) = (Expr::sym("x"), Expr::sym("y"));
        let residual = a * Expr::powi(x.clone(), 2) + b * x.clone() + c - y.clone();
        ModelSpec::new("quadratic", residual, &["a", "b", "c"])
            .with_sum(Expr::powi(x.clone(), 4), "sx4")
            .with_sum(Expr::powi(x.clone(), 3), "sx3")
            .with_sum(Expr::powi(x.clone(), 2), "sx2")
            .with_sum(x.clone(), "sx")
            .with_sum(Expr::powi(x.clone(), 2) * y.clone(), "sx2y")
            .with_sum(x * y.clone(), "sxy")
            .with_sum(y, "sy")
            .with_sum(Expr::int(1), "n")
    }

    /// `a*x^b`, log-linearized to `ln a + b*ln x = ln y`. The unknowns are
    /// `b` and `ln a`; `a` is reported as `exp(lna)`.
    pub fn power() -> Self {
        let (a, b, lna) = (Expr::sym("a"), Expr::sym("b"), Expr::sym("lna"));
        let (x, y) = (Expr::sym("x"), Expr::sym("y"));
        let (lnx, lny) = (Expr::sym("lnx"), Expr::sym("lny"));
        let objective = Expr::powi(a * Expr::pow(x, b.clone()) - y, 2);
        let residual = b * lnx.clone() + lna - lny.clone();
        ModelSpec::new("power", residual, &["b", "lna"])
            .with_objective(objective, &["a", "b"])
            .with_sum(Expr::powi(lnx.clone(), 2), "sln2x")
            .with_sum(lnx.clone(), "slnx")
            .with_sum(lnx * lny.clone(), "slnxlny")
            .with_sum(lny, "slny")
            .with_sum(Expr::int(1), "n")
            .with_report("b", "b", Transform::Identity)
            .with_report("a", "lna", Transform::Exp)
    }

    /// `a*b^x`, log-linearized to `ln a + x*ln b = ln y`. The unknowns are
    /// `ln b` and `ln a`; both coefficients are reported exponentiated.
    pub fn exponential() -> Self {
        let (a, b) = (Expr::sym("a"), Expr::sym("b"));
        let (lna, lnb) = (Expr::sym("lna"), Expr::sym("lnb"));
        let (x, y) = (Expr::sym("x"), Expr::sym("y"));
        let lny = Expr::sym("lny");
        let objective = Expr::powi(a * Expr::pow(b, x.clone()) - y, 2);
        let residual = lnb * x.clone() + lna - lny.clone();
        ModelSpec::new("exponential", residual, &["lnb", "lna"])
            .with_objective(objective, &["a", "b"])
            .with_sum(Expr::powi(x.clone(), 2), "sx2")
            .with_sum(x.clone(), "sx")
            .with_sum(x * lny.clone(), "sxlny")
            .with_sum(lny, "slny")
            .with_sum(Expr::int(1), "n")
            .with_report("b", "lnb", Transform::Exp)
            .with_report("a", "lna", Transform::Exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_families_declare_their_parameters() {
        assert_eq!(ModelSpec::linear().parameters(), ["a", "b"]);
        assert_eq!(ModelSpec::quadratic().parameters(), ["a", "b", "c"]);
        assert_eq!(ModelSpec::power().parameters(), ["b", "lna"]);
        assert_eq!(ModelSpec::exponential().parameters(), ["lnb", "lna"]);
    }

    #[test]
    fn log_families_report_exponentiated_coefficients() {
        for spec in [ModelSpec::power(), ModelSpec::exponential()] {
            for report in spec.reports() {
                if report.parameter.starts_with("ln") {
                    assert_eq!(report.transform, Transform::Exp);
                }
            }
        }
        // emission order follows the solve order: b before a
        let power = ModelSpec::power();
        let names: Vec<&str> = power
            .reports()
            .iter()
            .map(|r| r.coefficient.as_str())
            .collect();
        assert_eq!(names, ["b", "a"]);
    }

    #[test]
    fn raw_objective_derivatives_cover_raw_parameters() {
        // d(a*x^b - y)^2/db mentions ln(x); the linearized system does not
        let derivs = ModelSpec::power().objective_derivatives();
        assert_eq!(derivs.len(), 2);
        assert_eq!(derivs[0].0, "a");
        assert_eq!(derivs[1].0, "b");
        assert!(derivs[1].1.to_string().contains("ln(x)"));
    }

    #[test]
    fn specs_are_fresh_per_call() {
        let one = ModelSpec::linear();
        let two = ModelSpec::linear();
        assert_eq!(one.residual(), two.residual());
        assert_eq!(one.sums().len(), two.sums().len());
    }
}
