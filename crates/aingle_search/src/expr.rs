//! Terms as seen by the proof search.
//!
//! The search never interprets terms semantically. It needs just enough
//! structure to compute discrimination-tree keys, to tell which metavariables
//! a goal mentions, and to check that an extracted proof is closed. Bound
//! variables use de Bruijn indices; applications are kept in spine form
//! (`App(head, args)` with a non-application head).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A global constant name.
pub type Name = String;

/// Identifier of a metavariable. Goals are metavariables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MVarId(pub u64);

impl fmt::Display for MVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?m{}", self.0)
    }
}

/// Identifier of a local hypothesis. Unique across goals, so two hypotheses
/// with the same user-facing name are still told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FVarId(pub u64);

impl fmt::Display for FVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_h{}", self.0)
    }
}

/// A literal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Literal {
    /// A natural number literal.
    Nat(u64),
    /// A string literal.
    Str(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Nat(n) => write!(f, "{}", n),
            Literal::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// A term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    /// A bound variable (de Bruijn index).
    BVar(u32),
    /// A local hypothesis.
    FVar(FVarId),
    /// A metavariable.
    MVar(MVarId),
    /// A universe.
    Sort(u32),
    /// A global constant.
    Const(Name),
    /// A literal.
    Lit(Literal),
    /// An application in spine form.
    App(Box<Expr>, Vec<Expr>),
    /// A lambda abstraction: binder type and body.
    Lam(Box<Expr>, Box<Expr>),
    /// A dependent function type: binder type and body.
    Pi(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// A constant.
    pub fn constant(name: impl Into<Name>) -> Self {
        Expr::Const(name.into())
    }

    /// A metavariable.
    pub fn mvar(id: MVarId) -> Self {
        Expr::MVar(id)
    }

    /// A local hypothesis.
    pub fn fvar(id: FVarId) -> Self {
        Expr::FVar(id)
    }

    /// A natural number literal.
    pub fn nat(n: u64) -> Self {
        Expr::Lit(Literal::Nat(n))
    }

    /// `Prop`.
    pub fn prop() -> Self {
        Expr::Sort(0)
    }

    /// Applies `f` to `args`, keeping the spine flat.
    pub fn app(f: Expr, args: Vec<Expr>) -> Self {
        if args.is_empty() {
            return f;
        }
        match f {
            Expr::App(head, mut prev) => {
                prev.extend(args);
                Expr::App(head, prev)
            }
            head => Expr::App(Box::new(head), args),
        }
    }

    /// Applies the constant `name` to `args`.
    pub fn const_app(name: impl Into<Name>, args: Vec<Expr>) -> Self {
        Expr::app(Expr::constant(name), args)
    }

    /// A dependent function type.
    pub fn pi(domain: Expr, body: Expr) -> Self {
        Expr::Pi(Box::new(domain), Box::new(body))
    }

    /// A lambda abstraction.
    pub fn lam(domain: Expr, body: Expr) -> Self {
        Expr::Lam(Box::new(domain), Box::new(body))
    }

    /// The non-dependent function type `domain → codomain`.
    pub fn arrow(domain: Expr, codomain: Expr) -> Self {
        Expr::pi(domain, codomain.lift_loose_bvars(0, 1))
    }

    /// Returns the head of an application spine.
    pub fn get_app_fn(&self) -> &Expr {
        match self {
            Expr::App(head, _) => head,
            e => e,
        }
    }

    /// Returns the arguments of an application spine.
    pub fn get_app_args(&self) -> &[Expr] {
        match self {
            Expr::App(_, args) => args,
            _ => &[],
        }
    }

    /// Returns the constant name at the head of the spine, if any.
    pub fn const_name(&self) -> Option<&str> {
        match self.get_app_fn() {
            Expr::Const(name) => Some(name),
            _ => None,
        }
    }

    /// Returns `true` if bound variable `idx` occurs loose in this term.
    pub fn has_loose_bvar(&self, idx: u32) -> bool {
        self.has_loose_bvar_at(idx, 0)
    }

    fn has_loose_bvar_at(&self, idx: u32, depth: u32) -> bool {
        match self {
            Expr::BVar(i) => *i == idx + depth,
            Expr::App(f, args) => {
                f.has_loose_bvar_at(idx, depth) || args.iter().any(|a| a.has_loose_bvar_at(idx, depth))
            }
            Expr::Lam(d, b) | Expr::Pi(d, b) => {
                d.has_loose_bvar_at(idx, depth) || b.has_loose_bvar_at(idx, depth + 1)
            }
            _ => false,
        }
    }

    /// Returns `true` if any bound variable occurs loose in this term.
    pub fn has_loose_bvars(&self) -> bool {
        self.has_loose_bvars_at(0)
    }

    fn has_loose_bvars_at(&self, depth: u32) -> bool {
        match self {
            Expr::BVar(i) => *i >= depth,
            Expr::App(f, args) => {
                f.has_loose_bvars_at(depth) || args.iter().any(|a| a.has_loose_bvars_at(depth))
            }
            Expr::Lam(d, b) | Expr::Pi(d, b) => d.has_loose_bvars_at(depth) || b.has_loose_bvars_at(depth + 1),
            _ => false,
        }
    }

    /// Shifts every loose bound variable with index `>= cutoff` up by `amount`.
    pub fn lift_loose_bvars(&self, cutoff: u32, amount: u32) -> Expr {
        if amount == 0 {
            return self.clone();
        }
        match self {
            Expr::BVar(i) if *i >= cutoff => Expr::BVar(i + amount),
            Expr::App(f, args) => Expr::app(
                f.lift_loose_bvars(cutoff, amount),
                args.iter().map(|a| a.lift_loose_bvars(cutoff, amount)).collect(),
            ),
            Expr::Lam(d, b) => Expr::lam(
                d.lift_loose_bvars(cutoff, amount),
                b.lift_loose_bvars(cutoff + 1, amount),
            ),
            Expr::Pi(d, b) => Expr::pi(
                d.lift_loose_bvars(cutoff, amount),
                b.lift_loose_bvars(cutoff + 1, amount),
            ),
            e => e.clone(),
        }
    }

    /// Replaces loose bound variables with `subst`, where `subst[0]` stands
    /// for the outermost binder. Remaining loose variables are lowered.
    pub fn instantiate_rev(&self, subst: &[Expr]) -> Expr {
        if subst.is_empty() {
            return self.clone();
        }
        self.instantiate_at(subst, 0)
    }

    /// Replaces loose bound variable 0 with `value`.
    pub fn instantiate1(&self, value: &Expr) -> Expr {
        self.instantiate_at(std::slice::from_ref(value), 0)
    }

    fn instantiate_at(&self, subst: &[Expr], depth: u32) -> Expr {
        let n = subst.len() as u32;
        match self {
            Expr::BVar(i) if *i >= depth => {
                let k = i - depth;
                if k < n {
                    subst[(n - 1 - k) as usize].lift_loose_bvars(0, depth)
                } else {
                    Expr::BVar(i - n)
                }
            }
            Expr::App(f, args) => Expr::app(
                f.instantiate_at(subst, depth),
                args.iter().map(|a| a.instantiate_at(subst, depth)).collect(),
            ),
            Expr::Lam(d, b) => Expr::lam(d.instantiate_at(subst, depth), b.instantiate_at(subst, depth + 1)),
            Expr::Pi(d, b) => Expr::pi(d.instantiate_at(subst, depth), b.instantiate_at(subst, depth + 1)),
            e => e.clone(),
        }
    }

    /// Turns the local hypothesis `fvar` into the bound variable of an
    /// enclosing binder, so that `Expr::lam(ty, e.abstract_fvar(h))` binds it.
    pub fn abstract_fvar(&self, fvar: FVarId) -> Expr {
        self.abstract_at(fvar, 0)
    }

    fn abstract_at(&self, fvar: FVarId, depth: u32) -> Expr {
        match self {
            Expr::FVar(id) if *id == fvar => Expr::BVar(depth),
            Expr::App(f, args) => Expr::app(
                f.abstract_at(fvar, depth),
                args.iter().map(|a| a.abstract_at(fvar, depth)).collect(),
            ),
            Expr::Lam(d, b) => Expr::lam(d.abstract_at(fvar, depth), b.abstract_at(fvar, depth + 1)),
            Expr::Pi(d, b) => Expr::pi(d.abstract_at(fvar, depth), b.abstract_at(fvar, depth + 1)),
            e => e.clone(),
        }
    }

    /// Replaces metavariables for which `f` returns a value. Replacements
    /// are not revisited.
    pub fn replace_mvars<F>(&self, f: &F) -> Expr
    where
        F: Fn(MVarId) -> Option<Expr>,
    {
        match self {
            Expr::MVar(id) => f(*id).unwrap_or_else(|| self.clone()),
            Expr::App(head, args) => Expr::app(
                head.replace_mvars(f),
                args.iter().map(|a| a.replace_mvars(f)).collect(),
            ),
            Expr::Lam(d, b) => Expr::lam(d.replace_mvars(f), b.replace_mvars(f)),
            Expr::Pi(d, b) => Expr::pi(d.replace_mvars(f), b.replace_mvars(f)),
            e => e.clone(),
        }
    }

    /// Collects the metavariables occurring in this term.
    pub fn collect_mvars(&self, out: &mut BTreeSet<MVarId>) {
        match self {
            Expr::MVar(id) => {
                out.insert(*id);
            }
            Expr::App(f, args) => {
                f.collect_mvars(out);
                for a in args {
                    a.collect_mvars(out);
                }
            }
            Expr::Lam(d, b) | Expr::Pi(d, b) => {
                d.collect_mvars(out);
                b.collect_mvars(out);
            }
            _ => {}
        }
    }

    /// Returns the metavariables occurring in this term.
    pub fn mvars(&self) -> BTreeSet<MVarId> {
        let mut out = BTreeSet::new();
        self.collect_mvars(&mut out);
        out
    }

    /// Returns `true` if a metavariable occurs in this term.
    pub fn has_mvar(&self) -> bool {
        match self {
            Expr::MVar(_) => true,
            Expr::App(f, args) => f.has_mvar() || args.iter().any(Expr::has_mvar),
            Expr::Lam(d, b) | Expr::Pi(d, b) => d.has_mvar() || b.has_mvar(),
            _ => false,
        }
    }

    /// Splits a `Pi` telescope into its binder types and the conclusion.
    /// Binder types and the conclusion may mention earlier binders as loose
    /// bound variables.
    pub fn pi_telescope(&self) -> (Vec<&Expr>, &Expr) {
        let mut binders = Vec::new();
        let mut e = self;
        while let Expr::Pi(d, b) = e {
            binders.push(d.as_ref());
            e = b;
        }
        (binders, e)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BVar(i) => write!(f, "#{}", i),
            Expr::FVar(id) => write!(f, "{}", id),
            Expr::MVar(id) => write!(f, "{}", id),
            Expr::Sort(0) => write!(f, "Prop"),
            Expr::Sort(u) => write!(f, "Sort {}", u),
            Expr::Const(name) => write!(f, "{}", name),
            Expr::Lit(lit) => write!(f, "{}", lit),
            Expr::App(head, args) => {
                write!(f, "({}", head)?;
                for a in args {
                    write!(f, " {}", a)?;
                }
                write!(f, ")")
            }
            Expr::Lam(d, b) => write!(f, "(fun _ : {} => {})", d, b),
            Expr::Pi(d, b) if !b.has_loose_bvar(0) => write!(f, "({} → {})", d, b),
            Expr::Pi(d, b) => write!(f, "(∀ _ : {}, {})", d, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_keeps_spine_flat() {
        let f = Expr::const_app("f", vec![Expr::nat(1)]);
        let e = Expr::app(f, vec![Expr::nat(2)]);
        assert_eq!(e.get_app_fn(), &Expr::constant("f"));
        assert_eq!(e.get_app_args().len(), 2);
        assert_eq!(Expr::app(Expr::constant("c"), vec![]), Expr::constant("c"));
    }

    #[test]
    fn test_arrow_is_non_dependent() {
        let e = Expr::arrow(Expr::constant("A"), Expr::constant("B"));
        match &e {
            Expr::Pi(_, body) => assert!(!body.has_loose_bvar(0)),
            other => panic!("expected pi, got {}", other),
        }
        assert_eq!(e.to_string(), "(A → B)");
    }

    #[test]
    fn test_instantiate_rev_orders_binders() {
        // ∀ x y, R x y  with x outermost: R #1 #0
        let body = Expr::const_app("R", vec![Expr::BVar(1), Expr::BVar(0)]);
        let inst = body.instantiate_rev(&[Expr::nat(1), Expr::nat(2)]);
        assert_eq!(inst, Expr::const_app("R", vec![Expr::nat(1), Expr::nat(2)]));
    }

    #[test]
    fn test_instantiate_under_binder_lifts() {
        // fun _ => #1  instantiated with #0 becomes fun _ => #1 (lifted)
        let e = Expr::lam(Expr::prop(), Expr::BVar(1));
        let inst = e.instantiate1(&Expr::BVar(0));
        assert_eq!(inst, Expr::lam(Expr::prop(), Expr::BVar(1)));
        let closed = e.instantiate1(&Expr::constant("c"));
        assert_eq!(closed, Expr::lam(Expr::prop(), Expr::constant("c")));
    }

    #[test]
    fn test_abstract_fvar() {
        let h = FVarId(4);
        let body = Expr::const_app("f", vec![Expr::fvar(h), Expr::lam(Expr::prop(), Expr::fvar(h))]);
        let abstracted = body.abstract_fvar(h);
        assert_eq!(
            abstracted,
            Expr::const_app("f", vec![Expr::BVar(0), Expr::lam(Expr::prop(), Expr::BVar(1))])
        );
        assert_eq!(abstracted.instantiate1(&Expr::fvar(h)), body);
    }

    #[test]
    fn test_mvar_collection() {
        let e = Expr::const_app(
            "And",
            vec![Expr::mvar(MVarId(3)), Expr::arrow(Expr::mvar(MVarId(1)), Expr::prop())],
        );
        assert!(e.has_mvar());
        assert_eq!(e.mvars().into_iter().collect::<Vec<_>>(), vec![MVarId(1), MVarId(3)]);
        let replaced = e.replace_mvars(&|_| Some(Expr::constant("x")));
        assert!(!replaced.has_mvar());
    }

    #[test]
    fn test_pi_telescope() {
        let ty = Expr::pi(
            Expr::constant("Nat"),
            Expr::arrow(Expr::const_app("P", vec![Expr::BVar(0)]), Expr::constant("Q")),
        );
        let (binders, conclusion) = ty.pi_telescope();
        assert_eq!(binders.len(), 2);
        assert_eq!(conclusion, &Expr::constant("Q"));
    }
}
