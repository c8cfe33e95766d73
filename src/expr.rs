//! Minimal symbolic-expression engine
//!
//! Provides exactly the capabilities the derivation pipeline needs:
//! expression construction over named symbols, partial differentiation,
//! substitution, normalization into a canonical sum-of-monomials form,
//! rational-function splitting, rendering and numeric evaluation.
//!
//! Expressions are plain owned trees. There is no interning table and no
//! shared state; every derivation builds its symbols fresh.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use num_traits::{One, Zero};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

fn gcd(mut a: i64, mut b: i64) -> i64 {
    a = a.abs();
    b = b.abs();
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn lcm(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        return 0;
    }
    (a / gcd(a, b)) * b
}

/// An exact rational scalar.
///
/// Invariant: denominator > 0 and `gcd(num, den) == 1`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "rational with zero denominator");
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let g = gcd(num, den).max(1);
        Rational {
            num: num / g,
            den: den / g,
        }
    }

    pub fn int(n: i64) -> Self {
        Rational { num: n, den: 1 }
    }

    pub fn numer(&self) -> i64 {
        self.num
    }

    pub fn denom(&self) -> i64 {
        self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub fn is_one(&self) -> bool {
        self.num == 1 && self.den == 1
    }

    pub fn is_negative(&self) -> bool {
        self.num < 0
    }

    pub fn is_integer(&self) -> bool {
        self.den == 1
    }

    pub fn abs(&self) -> Self {
        Rational {
            num: self.num.abs(),
            den: self.den,
        }
    }

    /// Multiplicative inverse. The caller must rule out zero first.
    pub fn recip(&self) -> Self {
        Rational::new(self.den, self.num)
    }

    pub fn powi(&self, k: u32) -> Self {
        Rational {
            num: self.num.pow(k),
            den: self.den.pow(k),
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Add for Rational {
    type Output = Rational;
    fn add(self, rhs: Rational) -> Rational {
        Rational::new(self.num * rhs.den + rhs.num * self.den, self.den * rhs.den)
    }
}

impl Sub for Rational {
    type Output = Rational;
    fn sub(self, rhs: Rational) -> Rational {
        self + (-rhs)
    }
}

impl Mul for Rational {
    type Output = Rational;
    fn mul(self, rhs: Rational) -> Rational {
        Rational::new(self.num * rhs.num, self.den * rhs.den)
    }
}

impl Neg for Rational {
    type Output = Rational;
    fn neg(self) -> Rational {
        Rational {
            num: -self.num,
            den: self.den,
        }
    }
}

impl Zero for Rational {
    fn zero() -> Self {
        Rational::int(0)
    }
    fn is_zero(&self) -> bool {
        Rational::is_zero(self)
    }
}

impl One for Rational {
    fn one() -> Self {
        Rational::int(1)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// A symbolic expression over named symbols.
///
/// `Add` and `Mul` are n-ary and kept flat; smart constructors fold numeric
/// parts and keep operands in a canonical order so that structurally equal
/// expressions compare equal with derived `Eq`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Expr {
    Num(Rational),
    Sym(String),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Ln(Box<Expr>),
    Exp(Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

/// A product of non-numeric atoms with integer exponents.
pub(crate) type Monomial = BTreeMap<Expr, i64>;

impl Expr {
    pub fn int(n: i64) -> Expr {
        Expr::Num(Rational::int(n))
    }

    pub fn rational(num: i64, den: i64) -> Expr {
        Expr::Num(Rational::new(num, den))
    }

    pub fn sym(name: &str) -> Expr {
        Expr::Sym(name.to_string())
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Num(r) if r.is_zero())
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Num(r) if r.is_one())
    }

    /// n-ary sum: flattens nested sums, folds numeric terms, drops zeros and
    /// sorts the result canonically.
    pub fn sum(terms: Vec<Expr>) -> Expr {
        let mut flat = Vec::new();
        let mut acc = Rational::zero();
        let mut queue = terms;
        while let Some(t) = queue.pop() {
            match t {
                Expr::Num(r) => acc = acc + r,
                Expr::Add(inner) => queue.extend(inner),
                other => flat.push(other),
            }
        }
        if !acc.is_zero() {
            flat.push(Expr::Num(acc));
        }
        flat.sort_by(term_order);
        match flat.len() {
            0 => Expr::int(0),
            1 => flat.into_iter().next().unwrap(),
            _ => Expr::Add(flat),
        }
    }

    /// n-ary product: flattens nested products, folds numeric factors (zero
    /// annihilates), drops ones and sorts the remaining factors.
    pub fn product(factors: Vec<Expr>) -> Expr {
        let mut flat = Vec::new();
        let mut acc = Rational::one();
        let mut queue = factors;
        while let Some(x) = queue.pop() {
            match x {
                Expr::Num(r) => acc = acc * r,
                Expr::Mul(inner) => queue.extend(inner),
                other => flat.push(other),
            }
        }
        if acc.is_zero() {
            return Expr::int(0);
        }
        flat.sort();
        if flat.is_empty() {
            return Expr::Num(acc);
        }
        if acc.is_one() {
            if flat.len() == 1 {
                return flat.into_iter().next().unwrap();
            }
            return Expr::Mul(flat);
        }
        let mut all = Vec::with_capacity(flat.len() + 1);
        all.push(Expr::Num(acc));
        all.extend(flat);
        Expr::Mul(all)
    }

    pub fn pow(base: Expr, exponent: Expr) -> Expr {
        if exponent.is_zero() {
            return Expr::int(1);
        }
        if exponent.is_one() {
            return base;
        }
        if base.is_one() {
            return Expr::int(1);
        }
        if let (Expr::Num(b), Expr::Num(e)) = (&base, &exponent) {
            if e.is_integer() && e.numer() >= 0 && e.numer() <= u32::MAX as i64 {
                return Expr::Num(b.powi(e.numer() as u32));
            }
        }
        Expr::Pow(Box::new(base), Box::new(exponent))
    }

    pub fn powi(base: Expr, k: i64) -> Expr {
        Expr::pow(base, Expr::int(k))
    }

    pub fn ln(inner: Expr) -> Expr {
        if inner.is_one() {
            return Expr::int(0);
        }
        Expr::Ln(Box::new(inner))
    }

    pub fn exp(inner: Expr) -> Expr {
        if inner.is_zero() {
            return Expr::int(1);
        }
        Expr::Exp(Box::new(inner))
    }

    /// Quotient node. Numeric nonzero denominators fold into the numerator;
    /// a numeric zero denominator stays an unreduced `Div` node.
    pub fn div(numer: Expr, denom: Expr) -> Expr {
        if numer.is_zero() {
            return Expr::int(0);
        }
        if denom.is_one() {
            return numer;
        }
        if let Expr::Num(r) = &denom {
            if !r.is_zero() {
                return numer.scale(r.recip());
            }
        }
        Expr::Div(Box::new(numer), Box::new(denom))
    }

    /// Whether the expression mentions the symbol anywhere.
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Expr::Num(_) => false,
            Expr::Sym(s) => s == name,
            Expr::Add(xs) | Expr::Mul(xs) => xs.iter().any(|x| x.contains(name)),
            Expr::Pow(a, b) | Expr::Div(a, b) => a.contains(name) || b.contains(name),
            Expr::Ln(x) | Expr::Exp(x) => x.contains(name),
        }
    }

    /// Partial derivative with respect to `var`.
    pub fn diff(&self, var: &str) -> Expr {
        match self {
            Expr::Num(_) => Expr::int(0),
            Expr::Sym(s) => {
                if s == var {
                    Expr::int(1)
                } else {
                    Expr::int(0)
                }
            }
            Expr::Add(terms) => Expr::sum(terms.iter().map(|t| t.diff(var)).collect()),
            Expr::Mul(factors) => {
                // product rule over the flat factor list
                let mut terms = Vec::with_capacity(factors.len());
                for i in 0..factors.len() {
                    if !factors[i].contains(var) {
                        continue;
                    }
                    let mut fs: Vec<Expr> = factors.clone();
                    fs[i] = factors[i].diff(var);
                    terms.push(Expr::product(fs));
                }
                Expr::sum(terms)
            }
            Expr::Pow(base, exponent) => {
                let u = base.as_ref();
                let v = exponent.as_ref();
                if let Expr::Num(k) = v {
                    // d(u^k) = k * u^(k-1) * u'
                    return Expr::product(vec![
                        Expr::Num(*k),
                        Expr::pow(u.clone(), Expr::Num(*k - Rational::one())),
                        u.diff(var),
                    ]);
                }
                if !v.contains(var) {
                    // constant exponent: v * u^(v-1) * u'
                    return Expr::product(vec![
                        v.clone(),
                        Expr::pow(u.clone(), v.clone() - Expr::int(1)),
                        u.diff(var),
                    ]);
                }
                if !u.contains(var) {
                    // constant base: u^v * ln(u) * v'
                    return Expr::product(vec![
                        Expr::pow(u.clone(), v.clone()),
                        Expr::ln(u.clone()),
                        v.diff(var),
                    ]);
                }
                // general case: u^v * (v' * ln u + v * u' / u)
                Expr::product(vec![
                    Expr::pow(u.clone(), v.clone()),
                    v.diff(var) * Expr::ln(u.clone())
                        + Expr::div(v.clone() * u.diff(var), u.clone()),
                ])
            }
            Expr::Ln(inner) => Expr::div(inner.diff(var), inner.as_ref().clone()),
            Expr::Exp(inner) => inner.diff(var) * Expr::exp(inner.as_ref().clone()),
            Expr::Div(numer, denom) => {
                let u = numer.as_ref();
                let v = denom.as_ref();
                Expr::div(
                    u.diff(var) * v.clone() - u.clone() * v.diff(var),
                    Expr::powi(v.clone(), 2),
                )
            }
        }
    }

    /// Replace every occurrence of the symbol by `value`, rebuilding through
    /// the smart constructors so trivial structure collapses.
    pub fn substitute(&self, name: &str, value: &Expr) -> Expr {
        match self {
            Expr::Num(_) => self.clone(),
            Expr::Sym(s) => {
                if s == name {
                    value.clone()
                } else {
                    self.clone()
                }
            }
            Expr::Add(ts) => Expr::sum(ts.iter().map(|t| t.substitute(name, value)).collect()),
            Expr::Mul(fs) => Expr::product(fs.iter().map(|x| x.substitute(name, value)).collect()),
            Expr::Pow(a, b) => Expr::pow(a.substitute(name, value), b.substitute(name, value)),
            Expr::Ln(x) => Expr::ln(x.substitute(name, value)),
            Expr::Exp(x) => Expr::exp(x.substitute(name, value)),
            Expr::Div(a, b) => Expr::div(a.substitute(name, value), b.substitute(name, value)),
        }
    }

    /// Light normalization: rebuild the tree through the smart constructors
    /// (flattening, numeric folding, identity removal) without distributing
    /// products.
    pub fn normalize(&self) -> Expr {
        match self {
            Expr::Num(_) | Expr::Sym(_) => self.clone(),
            Expr::Add(ts) => Expr::sum(ts.iter().map(|t| t.normalize()).collect()),
            Expr::Mul(fs) => Expr::product(fs.iter().map(|x| x.normalize()).collect()),
            Expr::Pow(a, b) => Expr::pow(a.normalize(), b.normalize()),
            Expr::Ln(x) => Expr::ln(x.normalize()),
            Expr::Exp(x) => Expr::exp(x.normalize()),
            Expr::Div(a, b) => Expr::div(a.normalize(), b.normalize()),
        }
    }

    /// Full expansion: distribute products over sums, expand integer powers
    /// and collect like terms over canonical monomials.
    pub fn expand(&self) -> Expr {
        rebuild(collect(self.expand_terms()))
    }

    /// Expanded term list, uncollected.
    pub(crate) fn expand_terms(&self) -> Vec<(Rational, Monomial)> {
        match self {
            Expr::Num(r) => vec![(*r, Monomial::new())],
            Expr::Sym(_) | Expr::Ln(_) | Expr::Exp(_) => {
                let atom = match self {
                    Expr::Ln(x) => Expr::ln(x.expand()),
                    Expr::Exp(x) => Expr::exp(x.expand()),
                    other => other.clone(),
                };
                vec![atom_term(atom, 1)]
            }
            Expr::Add(ts) => {
                let mut out = Vec::new();
                for t in ts {
                    out.extend(t.expand_terms());
                }
                out
            }
            Expr::Mul(fs) => {
                let mut out = vec![(Rational::one(), Monomial::new())];
                for x in fs {
                    out = convolve(&out, &x.expand_terms());
                }
                out
            }
            Expr::Pow(base, exponent) => {
                let e = exponent.expand();
                if let Expr::Num(k) = &e {
                    if k.is_integer() {
                        let k = k.numer();
                        if k >= 0 {
                            let base_terms = base.expand_terms();
                            let mut out = vec![(Rational::one(), Monomial::new())];
                            for _ in 0..k {
                                out = convolve(&out, &base_terms);
                            }
                            return collect_vec(out);
                        }
                        // negative integer power stays an atom on the
                        // collapsed base
                        return vec![atom_term(base.expand(), k)];
                    }
                }
                vec![atom_term(Expr::pow(base.expand(), e), 1)]
            }
            Expr::Div(numer, denom) => {
                let d = denom.expand();
                if let Expr::Num(r) = &d {
                    let mut out = numer.expand_terms();
                    let inv = r.recip();
                    for (c, _) in out.iter_mut() {
                        *c = *c * inv;
                    }
                    return out;
                }
                vec![atom_term(Expr::div(numer.expand(), d), 1)]
            }
        }
    }

    /// Split into a (numerator, denominator) pair over a common denominator.
    /// Non-rational subtrees (logs, exponentials, symbolic powers) are kept
    /// as opaque numerator atoms.
    pub fn as_ratio(&self) -> (Expr, Expr) {
        match self {
            Expr::Num(_) | Expr::Sym(_) | Expr::Ln(_) | Expr::Exp(_) => {
                (self.clone(), Expr::int(1))
            }
            Expr::Add(ts) => {
                let mut num = Expr::int(0);
                let mut den = Expr::int(1);
                for t in ts {
                    let (tn, td) = t.as_ratio();
                    num = num * td.clone() + tn * den.clone();
                    den = den * td;
                }
                (num, den)
            }
            Expr::Mul(fs) => {
                let mut num = Expr::int(1);
                let mut den = Expr::int(1);
                for x in fs {
                    let (xn, xd) = x.as_ratio();
                    num = num * xn;
                    den = den * xd;
                }
                (num, den)
            }
            Expr::Pow(base, exponent) => {
                if let Expr::Num(k) = exponent.as_ref() {
                    if k.is_integer() {
                        let (bn, bd) = base.as_ratio();
                        let k = k.numer();
                        if k >= 0 {
                            return (Expr::powi(bn, k), Expr::powi(bd, k));
                        }
                        return (Expr::powi(bd, -k), Expr::powi(bn, -k));
                    }
                }
                (self.clone(), Expr::int(1))
            }
            Expr::Div(numer, denom) => {
                let (nn, nd) = numer.as_ratio();
                let (dn, dd) = denom.as_ratio();
                (nn * dd, nd * dn)
            }
        }
    }

    /// Whether the expression is identically zero once written as a single
    /// rational function.
    pub fn is_zero_expr(&self) -> bool {
        let (num, _) = self.as_ratio();
        num.expand().is_zero()
    }

    /// Multiply every term by an exact rational factor.
    pub(crate) fn scale(&self, factor: Rational) -> Expr {
        if factor.is_one() {
            return self.clone();
        }
        match self {
            Expr::Add(ts) => Expr::sum(
                ts.iter()
                    .map(|t| Expr::product(vec![Expr::Num(factor), t.clone()]))
                    .collect(),
            ),
            other => Expr::product(vec![Expr::Num(factor), other.clone()]),
        }
    }

    /// Positive rational content: the gcd of the term coefficients.
    pub(crate) fn rational_content(&self) -> Rational {
        let terms: Vec<&Expr> = match self {
            Expr::Add(ts) => ts.iter().collect(),
            other => vec![other],
        };
        let mut num_gcd = 0i64;
        let mut den_lcm = 1i64;
        for t in terms {
            let c = term_coefficient(t).abs();
            num_gcd = gcd(num_gcd, c.numer());
            den_lcm = lcm(den_lcm, c.denom());
        }
        if num_gcd == 0 {
            return Rational::one();
        }
        Rational::new(num_gcd, den_lcm)
    }

    /// Numeric evaluation against symbol bindings; `None` when a symbol is
    /// unbound.
    pub fn eval(&self, env: &HashMap<String, f64>) -> Option<f64> {
        match self {
            Expr::Num(r) => Some(r.to_f64()),
            Expr::Sym(s) => env.get(s).copied(),
            Expr::Add(ts) => ts.iter().try_fold(0.0, |acc, t| Some(acc + t.eval(env)?)),
            Expr::Mul(fs) => fs.iter().try_fold(1.0, |acc, x| Some(acc * x.eval(env)?)),
            Expr::Pow(a, b) => Some(a.eval(env)?.powf(b.eval(env)?)),
            Expr::Ln(x) => Some(x.eval(env)?.ln()),
            Expr::Exp(x) => Some(x.eval(env)?.exp()),
            Expr::Div(a, b) => Some(a.eval(env)? / b.eval(env)?),
        }
    }
}

fn atom_term(atom: Expr, power: i64) -> (Rational, Monomial) {
    let mut m = Monomial::new();
    m.insert(atom, power);
    (Rational::one(), m)
}

fn convolve(
    left: &[(Rational, Monomial)],
    right: &[(Rational, Monomial)],
) -> Vec<(Rational, Monomial)> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for (lc, lm) in left {
        for (rc, rm) in right {
            let mut m = lm.clone();
            for (atom, p) in rm {
                let entry = m.entry(atom.clone()).or_insert(0);
                *entry += p;
                if *entry == 0 {
                    m.remove(atom);
                }
            }
            out.push((*lc * *rc, m));
        }
    }
    out
}

fn collect(terms: Vec<(Rational, Monomial)>) -> BTreeMap<Monomial, Rational> {
    let mut map: BTreeMap<Monomial, Rational> = BTreeMap::new();
    for (c, m) in terms {
        let entry = map.entry(m).or_insert_with(Rational::zero);
        *entry = *entry + c;
    }
    map.retain(|_, c| !c.is_zero());
    map
}

fn collect_vec(terms: Vec<(Rational, Monomial)>) -> Vec<(Rational, Monomial)> {
    collect(terms).into_iter().map(|(m, c)| (c, m)).collect()
}

fn rebuild(collected: BTreeMap<Monomial, Rational>) -> Expr {
    let terms = collected
        .into_iter()
        .map(|(m, c)| {
            let mut factors = vec![Expr::Num(c)];
            factors.push(monomial_expr(&m));
            Expr::product(factors)
        })
        .collect();
    Expr::sum(terms)
}

pub(crate) fn monomial_expr(m: &Monomial) -> Expr {
    let factors = m
        .iter()
        .map(|(atom, p)| match atom {
            // (u^v)^k folds into u^(k*v)
            Expr::Pow(base, exponent) if *p != 1 => Expr::pow(
                base.as_ref().clone(),
                Expr::product(vec![Expr::int(*p), exponent.as_ref().clone()]),
            ),
            _ => Expr::powi(atom.clone(), *p),
        })
        .collect();
    Expr::product(factors)
}

/// Coefficient of a flat term (the leading numeric factor).
fn term_coefficient(term: &Expr) -> Rational {
    match term {
        Expr::Num(r) => *r,
        Expr::Mul(fs) => match fs.first() {
            Some(Expr::Num(r)) => *r,
            _ => Rational::one(),
        },
        _ => Rational::one(),
    }
}

/// The term without its leading numeric factor, for sign-insensitive sorting.
fn term_body(term: &Expr) -> Expr {
    match term {
        Expr::Num(_) => Expr::int(1),
        Expr::Mul(fs) => match fs.first() {
            Some(Expr::Num(_)) => {
                if fs.len() == 2 {
                    fs[1].clone()
                } else {
                    Expr::Mul(fs[1..].to_vec())
                }
            }
            _ => term.clone(),
        },
        _ => term.clone(),
    }
}

fn term_order(a: &Expr, b: &Expr) -> Ordering {
    term_body(a).cmp(&term_body(b)).then_with(|| a.cmp(b))
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::sum(vec![self, rhs])
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::sum(vec![self, -rhs])
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::product(vec![self, rhs])
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::product(vec![Expr::int(-1), self])
    }
}

const PREC_ADD: u8 = 1;
const PREC_MUL: u8 = 2;
const PREC_POW: u8 = 3;
const PREC_ATOM: u8 = 4;

impl Expr {
    fn prec(&self) -> u8 {
        match self {
            Expr::Num(r) => {
                if r.is_integer() && !r.is_negative() {
                    PREC_ATOM
                } else {
                    PREC_ADD
                }
            }
            Expr::Sym(_) | Expr::Ln(_) | Expr::Exp(_) => PREC_ATOM,
            Expr::Add(_) => PREC_ADD,
            Expr::Mul(_) | Expr::Div(_, _) => PREC_MUL,
            Expr::Pow(_, _) => PREC_POW,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter, min: u8) -> fmt::Result {
        if self.prec() < min {
            write!(f, "(")?;
            self.fmt_prec(f, 0)?;
            return write!(f, ")");
        }
        match self {
            Expr::Num(r) => write!(f, "{}", r),
            Expr::Sym(s) => write!(f, "{}", s),
            Expr::Add(terms) => {
                for (i, t) in terms.iter().enumerate() {
                    let c = term_coefficient(t);
                    let (neg, mag) = if c.is_negative() {
                        (true, t.clone().scale(Rational::int(-1)))
                    } else {
                        (false, t.clone())
                    };
                    if i == 0 {
                        if neg {
                            write!(f, "-")?;
                        }
                    } else if neg {
                        write!(f, " - ")?;
                    } else {
                        write!(f, " + ")?;
                    }
                    mag.fmt_prec(f, PREC_MUL)?;
                }
                Ok(())
            }
            Expr::Mul(factors) => {
                let mut rest: &[Expr] = factors;
                if let Some(Expr::Num(r)) = factors.first() {
                    rest = &factors[1..];
                    if r.num == -1 && r.den == 1 {
                        write!(f, "-")?;
                    } else {
                        write!(f, "{}*", r)?;
                    }
                }
                for (i, x) in rest.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    x.fmt_prec(f, PREC_MUL + 1)?;
                }
                Ok(())
            }
            Expr::Pow(base, exponent) => {
                base.fmt_prec(f, PREC_ATOM)?;
                write!(f, "^")?;
                exponent.fmt_prec(f, PREC_POW + 1)
            }
            Expr::Ln(x) => {
                write!(f, "ln(")?;
                x.fmt_prec(f, 0)?;
                write!(f, ")")
            }
            Expr::Exp(x) => {
                write!(f, "exp(")?;
                x.fmt_prec(f, 0)?;
                write!(f, ")")
            }
            Expr::Div(numer, denom) => {
                numer.fmt_prec(f, PREC_MUL)?;
                write!(f, "/")?;
                denom.fmt_prec(f, PREC_POW)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(name: &str) -> Expr {
        Expr::sym(name)
    }

    #[test]
    fn rational_arithmetic_reduces() {
        let half = Rational::new(2, 4);
        assert_eq!(half, Rational::new(1, 2));
        assert_eq!(half + Rational::new(1, 2), Rational::int(1));
        assert_eq!(Rational::new(1, -2), Rational::new(-1, 2));
        assert!(Rational::new(-3, 6).is_negative());
        assert_eq!(Rational::new(2, 3).recip(), Rational::new(3, 2));
    }

    #[test]
    fn smart_constructors_fold() {
        assert_eq!(s("x") + Expr::int(0), s("x"));
        assert_eq!(s("x") * Expr::int(1), s("x"));
        assert_eq!(s("x") * Expr::int(0), Expr::int(0));
        assert_eq!(Expr::int(2) + Expr::int(3), Expr::int(5));
        assert_eq!(Expr::powi(s("x"), 1), s("x"));
        assert_eq!(Expr::powi(Expr::int(2), 3), Expr::int(8));
    }

    #[test]
    fn division_by_numeric_zero_stays_unreduced() {
        let e = Expr::div(s("x"), Expr::int(0));
        assert_eq!(
            e,
            Expr::Div(Box::new(s("x")), Box::new(Expr::int(0)))
        );
        assert_eq!(e.to_string(), "x/0");
        // nonzero numeric denominators still fold into the numerator
        assert_eq!(Expr::div(s("x"), Expr::int(2)).to_string(), "1/2*x");
    }

    #[test]
    fn polynomial_derivative() {
        // d(a*x^2 + b*x + c)/dx = 2*a*x + b
        let e = s("a") * Expr::powi(s("x"), 2) + s("b") * s("x") + s("c");
        let d = e.diff("x").expand();
        let expected = (Expr::int(2) * s("a") * s("x") + s("b")).expand();
        assert_eq!(d, expected);
    }

    #[test]
    fn log_and_exp_derivatives() {
        // d(ln x)/dx = 1/x
        let d = Expr::ln(s("x")).diff("x");
        assert_eq!(d, Expr::div(Expr::int(1), s("x")));
        // d(exp(2x))/dx = 2*exp(2x)
        let e = Expr::exp(Expr::int(2) * s("x"));
        let d = e.diff("x").normalize();
        assert_eq!(d, Expr::int(2) * Expr::exp(Expr::int(2) * s("x")));
    }

    #[test]
    fn symbolic_exponent_derivative() {
        // d(x^b)/db = x^b * ln(x)
        let d = Expr::pow(s("x"), s("b")).diff("b").normalize();
        assert_eq!(d, Expr::pow(s("x"), s("b")) * Expr::ln(s("x")));
    }

    #[test]
    fn expansion_collects_like_terms() {
        // (x + 1)^2 = x^2 + 2x + 1
        let e = Expr::powi(s("x") + Expr::int(1), 2).expand();
        let expected =
            (Expr::powi(s("x"), 2) + Expr::int(2) * s("x") + Expr::int(1)).expand();
        assert_eq!(e, expected);
        // x + x collapses
        assert_eq!((s("x") + s("x")).expand(), (Expr::int(2) * s("x")).expand());
        // x - x vanishes
        assert!((s("x") - s("x")).expand().is_zero());
    }

    #[test]
    fn substitution_rebuilds() {
        let e = s("a") * s("x") + s("b");
        assert_eq!(
            e.substitute("a", &Expr::int(0)).expand(),
            s("b")
        );
        let g = e.substitute("x", &(s("u") + Expr::int(1))).expand();
        let expected = (s("a") * s("u") + s("a") + s("b")).expand();
        assert_eq!(g, expected);
    }

    #[test]
    fn ratio_splitting_detects_zero() {
        // x/y - x/y == 0
        let e = Expr::div(s("x"), s("y")) - Expr::div(s("x"), s("y"));
        assert!(e.is_zero_expr());
        // (a/b + c) has numerator a + b*c over denominator b
        let e = Expr::div(s("a"), s("b")) + s("c");
        let (num, den) = e.as_ratio();
        assert_eq!(num.expand(), (s("a") + s("b") * s("c")).expand());
        assert_eq!(den.expand(), s("b"));
    }

    #[test]
    fn rendering_is_readable() {
        let e = Expr::div(
            (s("n") * s("sxy") - s("sx") * s("sy")).expand(),
            (s("n") * s("sx2") - Expr::powi(s("sx"), 2)).expand(),
        );
        assert_eq!(e.to_string(), "(n*sxy - sx*sy)/(n*sx2 - sx^2)");
        let e = Expr::exp(Expr::div(s("slny"), s("n")));
        assert_eq!(e.to_string(), "exp(slny/n)");
        let e = (s("a") - Expr::int(2) * s("b")).expand();
        assert_eq!(e.to_string(), "a - 2*b");
    }

    #[test]
    fn evaluation_matches_structure() {
        let env: HashMap<String, f64> =
            vec![("x".to_string(), 2.0), ("y".to_string(), 3.0)]
                .into_iter()
                .collect();
        let e = Expr::powi(s("x"), 2) * s("y") + Expr::int(1);
        assert_eq!(e.eval(&env), Some(13.0));
        assert_eq!(s("z").eval(&env), None);
        let e = Expr::exp(Expr::ln(s("y")));
        assert!((e.eval(&env).unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn determinism_of_canonical_order() {
        let e1 = (s("b") * s("x") + s("a")).expand();
        let e2 = (s("a") + s("x") * s("b")).expand();
        assert_eq!(e1, e2);
        assert_eq!(e1.to_string(), e2.to_string());
    }
}
