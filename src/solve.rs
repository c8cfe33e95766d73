//! Symbolic system solver
//!
//! Solves the square normal-equation system for all parameters, then
//! re-solves reduced subsystems so each parameter after the first gets the
//! small textbook formula instead of the sprawling expression a joint solve
//! returns.
//!
//! Stage 0 solves the full N x N system by Cramer's rule over symbolic
//! determinants and finalizes the first parameter. Stage k treats the first
//! k parameters as known symbols, moves their terms to the right-hand side
//! of the remaining N - k equations and re-solves that subsystem for
//! parameter k. A formula may therefore reference parameters solved at an
//! earlier stage, never later ones.

use ndarray::{Array1, Array2};

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::normal::EquationSystem;

/// Mapping from parameter name to its closed-form expression, in the order
/// the parameters were declared.
#[cfg_attr(
    feature = "serde",
    derive(serde_crate::Serialize, serde_crate::Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    entries: Vec<(String, Expr)>,
}

impl Solution {
    pub fn get(&self, parameter: &str) -> Option<&Expr> {
        self.entries
            .iter()
            .find(|(name, _)| name == parameter)
            .map(|(_, formula)| formula)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Expr)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EquationSystem {
    /// Solve for every parameter with staged elimination.
    ///
    /// Fails with [`Error::UnsolvableSystem`] when any equation is
    /// nonlinear in a parameter or any stage determinant vanishes
    /// identically; no partial mapping is ever returned.
    pub fn solve(&self) -> Result<Solution> {
        let parameters = self.parameters();
        let n = parameters.len();

        // the system must be linear in the parameters: equation i is
        // sum_j matrix[i][j] * p_j - rhs[i]
        let matrix = Array2::from_shape_fn((n, n), |(i, j)| {
            self.equations()[i].diff(&parameters[j]).expand()
        });
        if matrix
            .iter()
            .any(|entry| parameters.iter().any(|p| entry.contains(p)))
        {
            return Err(Error::UnsolvableSystem);
        }
        let rhs = Array1::from_shape_fn(n, |i| {
            let mut constant = self.equations()[i].clone();
            for parameter in parameters {
                constant = constant.substitute(parameter, &Expr::int(0));
            }
            (-constant).expand()
        });

        let mut entries = Vec::with_capacity(n);
        for k in 0..n {
            let m = n - k;
            let subsystem =
                Array2::from_shape_fn((m, m), |(i, j)| matrix[(k + i, k + j)].clone());
            let denominator = determinant(&subsystem).expand();
            if denominator.is_zero() {
                return Err(Error::UnsolvableSystem);
            }
            // earlier parameters are known at this stage; their terms move
            // to the right-hand side as symbols
            let reduced_rhs: Vec<Expr> = (0..m)
                .map(|i| {
                    let mut value = rhs[k + i].clone();
                    for (j, parameter) in parameters.iter().enumerate().take(k) {
                        value = value - matrix[(k + i, j)].clone() * Expr::sym(parameter);
                    }
                    value.expand()
                })
                .collect();
            let mut replaced = subsystem;
            for i in 0..m {
                replaced[(i, 0)] = reduced_rhs[i].clone();
            }
            let numerator = determinant(&replaced).expand();
            entries.push((parameters[k].clone(), quotient(numerator, denominator)));
        }
        Ok(Solution { entries })
    }
}

/// Determinant by cofactor expansion along the first row.
fn determinant(matrix: &Array2<Expr>) -> Expr {
    let n = matrix.nrows();
    if n == 1 {
        return matrix[(0, 0)].clone();
    }
    let mut terms = Vec::with_capacity(n);
    for j in 0..n {
        let minor = Array2::from_shape_fn((n - 1, n - 1), |(r, c)| {
            matrix[(r + 1, if c < j { c } else { c + 1 })].clone()
        });
        let mut term = Expr::product(vec![matrix[(0, j)].clone(), determinant(&minor)]);
        if j % 2 == 1 {
            term = -term;
        }
        terms.push(term);
    }
    Expr::sum(terms)
}

/// Reduce a determinant ratio: cancel the shared rational content and fold a
/// purely numeric denominator into the numerator.
fn quotient(numerator: Expr, denominator: Expr) -> Expr {
    if numerator.is_zero() {
        return Expr::int(0);
    }
    let content = denominator.rational_content();
    let numerator = numerator.scale(content.recip());
    let denominator = denominator.scale(content.recip());
    Expr::div(numerator, denominator)
}
