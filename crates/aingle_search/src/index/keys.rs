//! Discrimination-tree keys and the reductions used to compute them.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ReductionStrength;
use crate::expr::{Expr, FVarId, Literal, Name};

/// Upper bound on the reduction steps spent on one term, all of its subterms
/// included.
const MAX_UNFOLD_STEPS: usize = 256;

/// One token of a term's key sequence.
///
/// Keys are emitted in pre-order. Each key is followed by the keys of its
/// [`arity`](Key::arity) immediate subterms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    /// Matches any subterm.
    Star,
    /// A subterm the index does not look into (lambdas, dependent arrows).
    Other,
    /// A universe.
    Sort,
    /// A non-dependent arrow, followed by its domain and codomain.
    Arrow,
    /// A literal.
    Lit(Literal),
    /// A constant applied to the given number of arguments.
    Const(Name, usize),
    /// A local hypothesis applied to the given number of arguments.
    FVar(FVarId, usize),
}

impl Key {
    /// Number of subterms whose keys follow this one.
    pub fn arity(&self) -> usize {
        match self {
            Key::Const(_, n) | Key::FVar(_, n) => *n,
            Key::Arrow => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Star => write!(f, "*"),
            Key::Other => write!(f, "◾"),
            Key::Sort => write!(f, "Sort"),
            Key::Arrow => write!(f, "→"),
            Key::Lit(lit) => write!(f, "{}", lit),
            Key::Const(name, n) => write!(f, "{}/{}", name, n),
            Key::FVar(id, n) => write!(f, "{}/{}", id, n),
        }
    }
}

/// A definition that powerful reduction may unfold.
///
/// `body` refers to the parameters as loose bound variables, the first
/// parameter being the outermost (`#(arity - 1)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    /// Constant being defined.
    pub name: Name,
    /// Number of arguments needed before the definition unfolds.
    pub arity: usize,
    /// The definition's body.
    pub body: Expr,
}

impl Definition {
    /// Creates a definition.
    pub fn new(name: impl Into<Name>, arity: usize, body: Expr) -> Self {
        Self {
            name: name.into(),
            arity,
            body,
        }
    }
}

/// The reductions applied to a term's head before its keys are read off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reductions {
    strength: ReductionStrength,
    definitions: HashMap<Name, Definition>,
}

impl Reductions {
    /// Creates reductions with the given strength and no definitions.
    pub fn new(strength: ReductionStrength) -> Self {
        Self {
            strength,
            definitions: HashMap::new(),
        }
    }

    /// Beta-reduction only.
    pub fn simple() -> Self {
        Self::new(ReductionStrength::Simple)
    }

    /// Beta-reduction and unfolding of registered definitions.
    pub fn powerful() -> Self {
        Self::new(ReductionStrength::Powerful)
    }

    /// Registers a reducible definition.
    pub fn with_definition(mut self, def: Definition) -> Self {
        self.add_definition(def);
        self
    }

    /// Registers a reducible definition. Has no effect on keys under
    /// [`ReductionStrength::Simple`].
    pub fn add_definition(&mut self, def: Definition) {
        self.definitions.insert(def.name.clone(), def);
    }

    /// The configured strength.
    pub fn strength(&self) -> ReductionStrength {
        self.strength
    }

    /// Reduces the head of `expr` until no reduction applies or the step
    /// bound is hit.
    pub fn whnf_head(&self, expr: &Expr) -> Expr {
        let mut fuel = MAX_UNFOLD_STEPS;
        self.reduce_head(expr, &mut fuel)
    }

    fn reduce_head(&self, expr: &Expr, fuel: &mut usize) -> Expr {
        let mut e = expr.clone();
        while *fuel > 0 {
            match self.step(&e) {
                Some(next) => {
                    e = next;
                    *fuel -= 1;
                }
                None => break,
            }
        }
        e
    }

    fn step(&self, e: &Expr) -> Option<Expr> {
        let args = e.get_app_args();
        match e.get_app_fn() {
            Expr::Lam(_, body) if !args.is_empty() => {
                Some(Expr::app(body.instantiate1(&args[0]), args[1..].to_vec()))
            }
            Expr::Const(name) if self.strength == ReductionStrength::Powerful => {
                let def = self.definitions.get(name)?;
                if args.len() < def.arity {
                    return None;
                }
                let (params, rest) = args.split_at(def.arity);
                Some(Expr::app(def.body.instantiate_rev(params), rest.to_vec()))
            }
            _ => None,
        }
    }

    /// Computes the key sequence of `expr`. Never fails: metavariables and
    /// loose bound variables become [`Key::Star`], and so does any subterm
    /// still reducible once the step bound for the whole term is spent.
    pub fn keys(&self, expr: &Expr) -> Vec<Key> {
        let mut out = Vec::new();
        let mut fuel = MAX_UNFOLD_STEPS;
        self.push_keys(expr, &mut fuel, &mut out);
        out
    }

    fn push_keys(&self, expr: &Expr, fuel: &mut usize, out: &mut Vec<Key>) {
        let e = self.reduce_head(expr, fuel);
        if *fuel == 0 && self.step(&e).is_some() {
            out.push(Key::Star);
            return;
        }
        let args = e.get_app_args();
        match e.get_app_fn() {
            Expr::MVar(_) | Expr::BVar(_) => out.push(Key::Star),
            Expr::Const(name) => {
                out.push(Key::Const(name.clone(), args.len()));
                for arg in args {
                    self.push_keys(arg, fuel, out);
                }
            }
            Expr::FVar(id) => {
                out.push(Key::FVar(*id, args.len()));
                for arg in args {
                    self.push_keys(arg, fuel, out);
                }
            }
            Expr::Sort(_) if args.is_empty() => out.push(Key::Sort),
            Expr::Lit(lit) if args.is_empty() => out.push(Key::Lit(lit.clone())),
            Expr::Pi(domain, body) if args.is_empty() && !body.has_loose_bvar(0) => {
                out.push(Key::Arrow);
                self.push_keys(domain, fuel, out);
                // bvar 0 does not occur, so this only lowers outer indices
                self.push_keys(&body.instantiate1(&Expr::prop()), fuel, out);
            }
            _ => out.push(Key::Other),
        }
    }
}

/// Returns the keys after the first complete subterm of `keys`.
pub(crate) fn skip_subterm(keys: &[Key]) -> &[Key] {
    let mut pending = 1usize;
    let mut i = 0;
    while pending > 0 && i < keys.len() {
        pending = pending - 1 + keys[i].arity();
        i += 1;
    }
    &keys[i..]
}

/// Returns `true` if a term with keys `query` may be an instance of, or
/// unify with, a pattern with keys `pattern`. A `Star` on either side
/// absorbs one whole subterm of the other.
pub fn keys_compatible(pattern: &[Key], query: &[Key]) -> bool {
    match (pattern.split_first(), query.split_first()) {
        (None, None) => true,
        (Some((Key::Star, p_rest)), Some(_)) => keys_compatible(p_rest, skip_subterm(query)),
        (Some(_), Some((Key::Star, q_rest))) => keys_compatible(skip_subterm(pattern), q_rest),
        (Some((p, p_rest)), Some((q, q_rest))) => p == q && keys_compatible(p_rest, q_rest),
        _ => false,
    }
}
