//! Representation of Rye types used by the compiler.
//!
//! `Type` is a compact enum used during checking, analysis, and emission to
//! convey the static type information of every expression and storage
//! location. The emitter maps these variants to C++ handle shapes and uses
//! them to decide on boxing/unboxing and reference-counting behavior.
//!
//! Conversion legality is split along two axes, ownership compatibility and
//! base-type compatibility; `can_convert` answers both. The checker applies
//! the class-marking side effects (virtual dispatch, object inheritance)
//! when it materializes a conversion, so the predicate itself stays pure
//! and safe to call during overload scoring.

use crate::sema::{ClassId, Program};

/// Rye type lattice.
///
/// Key variants and their meaning:
/// - `Bool`, `Char`, `Int`, `Float`, `Double` -> simple value types; no
///   allocation. `Char` is a 16-bit code unit.
/// - `String` -> value-like at the language level, implemented as a
///   ref-counted handle because instances are shared.
/// - `Null` -> the type of the `null` literal, convertible to any
///   reference type.
/// - `Void` -> only as a method return type.
/// - `Class(id)` -> a non-owning reference to a user or built-in class.
/// - `Array(T)` -> a non-owning reference to an owned aggregate whose
///   class-level parent is the built-in array class.
/// - `Own(T)` -> the owning wrapper `T^`; only non-value types may be
///   wrapped.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Bool,
    Char,
    Int,
    Float,
    Double,
    String,
    Null,
    Void,
    Class(ClassId),
    Array(Box<Type>),
    Own(Box<Type>),
    /// The type of a poisoned expression after a reported error; converts
    /// to and from everything so one mistake reports once.
    Error,
}

/// Context of a conversion, used by the ownership axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvCtx {
    Other,
    AssignVar,
    MethodArg,
}

impl Type {
    /// Simple value types (no allocation, copied by value).
    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            Type::Bool | Type::Char | Type::Int | Type::Float | Type::Double
        )
    }

    /// Value types for the boxing rules: the simple types plus string.
    pub fn is_value(&self) -> bool {
        self.is_simple() || matches!(self, Type::String)
    }

    /// Numeric types.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::Double)
    }

    /// Reference types: everything subtyping can relate.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::String | Type::Null | Type::Class(_) | Type::Array(_)
        ) || self.is_own()
    }

    /// True for the owning wrapper.
    pub fn is_own(&self) -> bool {
        matches!(self, Type::Own(_))
    }

    /// Strips one level of owning wrapper, if present.
    pub fn strip_own(&self) -> &Type {
        match self {
            Type::Own(inner) => inner,
            other => other,
        }
    }

    /// Wraps `self` in the owning wrapper.
    pub fn to_own(&self) -> Type {
        match self {
            Type::Own(_) => self.clone(),
            other => Type::Own(Box::new(other.clone())),
        }
    }

    /// True if this type (after stripping ownership) is the given class.
    pub fn is_class(&self, id: ClassId) -> bool {
        matches!(self.strip_own(), Type::Class(c) if *c == id)
    }

    /// Human-readable spelling for diagnostics.
    pub fn display(&self, prog: &Program) -> String {
        match self {
            Type::Bool => "bool".into(),
            Type::Char => "char".into(),
            Type::Int => "int".into(),
            Type::Float => "float".into(),
            Type::Double => "double".into(),
            Type::String => "string".into(),
            Type::Null => "null".into(),
            Type::Void => "void".into(),
            Type::Class(id) => prog.class(*id).name.clone(),
            Type::Array(elem) => format!("{}[]", elem.display(prog)),
            Type::Own(inner) => format!("{}^", inner.display(prog)),
            Type::Error => "<error>".into(),
        }
    }
}

/// The class a reference type's members live on: classes themselves, the
/// string class for `string`, the array class for arrays.
pub fn member_class(prog: &Program, ty: &Type) -> Option<ClassId> {
    match ty.strip_own() {
        Type::Class(id) => Some(*id),
        Type::String => Some(prog.string_class),
        Type::Array(_) => Some(prog.array_class),
        _ => None,
    }
}

/// Subtype relation among reference types. Identity is included.
pub fn is_subtype(prog: &Program, sub: &Type, sup: &Type) -> bool {
    let sub = sub.strip_own();
    let sup = sup.strip_own();
    if sub == sup {
        return true;
    }
    match (sub, sup) {
        (Type::Null, other) => other.is_reference(),
        (Type::String, Type::Class(c)) => *c == prog.object_class || *c == prog.string_class,
        (Type::Array(_), Type::Class(c)) => *c == prog.object_class || *c == prog.array_class,
        (Type::Class(a), Type::Class(b)) => {
            let mut cur = Some(*a);
            while let Some(id) = cur {
                if id == *b {
                    return true;
                }
                cur = prog.class(id).parent;
            }
            false
        }
        _ => false,
    }
}

/// Ownership-axis compatibility. Rows are the source's owner-ness, columns
/// the destination's:
///
/// | S \ D       | non-owning                       | owning                     |
/// |-------------|----------------------------------|----------------------------|
/// | non-owning  | ok                               | boxing/string rules below  |
/// | owning      | ok if ctx is assign-var or arg   | ok                         |
/// | null        | ok                               | ok                         |
fn ownership_compatible(from: &Type, to: &Type, ctx: ConvCtx) -> bool {
    if matches!(from, Type::Null) {
        return true;
    }
    match (from.is_own(), to.is_own()) {
        (false, false) => true,
        (true, true) => true,
        (true, false) => matches!(ctx, ConvCtx::AssignVar | ConvCtx::MethodArg),
        (false, true) => {
            // A non-owning source may produce an owning destination only by
            // boxing a value, and simple values box only at call boundaries.
            // Strings convert freely because the handle is counted.
            matches!(from, Type::String)
                || (from.is_simple() && ctx == ConvCtx::MethodArg)
        }
    }
}

/// Base-type-axis compatibility: identity, subtyping, then (unless
/// `subtype_only`) the implicit widenings, then (if `explicit`) the
/// reversed widenings, downcasts, and un/boxing.
fn base_compatible(prog: &Program, from: &Type, to: &Type, explicit: bool, subtype_only: bool) -> bool {
    let s = from.strip_own();
    let d = to.strip_own();
    if s == d || matches!(s, Type::Null) && d.is_reference() {
        return true;
    }
    if s.is_reference() && d.is_reference() && is_subtype(prog, s, d) {
        return true;
    }
    if subtype_only {
        return false;
    }

    // Implicit widenings and boxing.
    let widen = matches!(
        (s, d),
        (Type::Int, Type::Float) | (Type::Int, Type::Double) | (Type::Float, Type::Double)
    );
    let boxing = s.is_simple() && d.is_class(prog.object_class);
    if widen || boxing {
        return true;
    }
    if !explicit {
        return false;
    }

    // Explicit: reversed widenings, downcasts, unboxing.
    let narrow = matches!(
        (s, d),
        (Type::Float, Type::Int)
            | (Type::Double, Type::Int)
            | (Type::Double, Type::Float)
            | (Type::Int, Type::Char)
            | (Type::Char, Type::Int)
    );
    let downcast = s.is_reference() && d.is_reference() && is_subtype(prog, d, s);
    let unbox = s.is_class(prog.object_class) && d.is_simple();
    narrow || downcast || unbox
}

/// Whether a value of type `from` converts to type `to`. Both the
/// ownership axis and the base-type axis must succeed.
pub fn can_convert(
    prog: &Program,
    from: &Type,
    to: &Type,
    ctx: ConvCtx,
    explicit: bool,
    subtype_only: bool,
) -> bool {
    if from == to {
        return true;
    }
    if matches!(from, Type::Error) || matches!(to, Type::Error) {
        return true;
    }
    if matches!(from, Type::Void) || matches!(to, Type::Void) {
        return false;
    }
    // Value-to-value conversions have no ownership axis.
    if from.is_simple() && to.is_simple() {
        return base_compatible(prog, from, to, explicit, subtype_only);
    }
    ownership_compatible(from, to, ctx) && base_compatible(prog, from, to, explicit, subtype_only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sema::Program;

    fn prog_with_classes() -> (Program, ClassId, ClassId) {
        let mut prog = Program::new();
        let animal = prog.add_class("Animal", Some(prog.object_class));
        let dog = prog.add_class("Dog", Some(animal));
        (prog, animal, dog)
    }

    #[test]
    fn subtype_chain() {
        let (prog, animal, dog) = prog_with_classes();
        assert!(is_subtype(&prog, &Type::Class(dog), &Type::Class(animal)));
        assert!(is_subtype(&prog, &Type::Class(dog), &Type::Class(prog.object_class)));
        assert!(!is_subtype(&prog, &Type::Class(animal), &Type::Class(dog)));
        assert!(is_subtype(&prog, &Type::String, &Type::Class(prog.object_class)));
    }

    #[test]
    fn widening_is_implicit_narrowing_is_explicit() {
        let prog = Program::new();
        assert!(can_convert(&prog, &Type::Int, &Type::Double, ConvCtx::Other, false, false));
        assert!(!can_convert(&prog, &Type::Double, &Type::Int, ConvCtx::Other, false, false));
        assert!(can_convert(&prog, &Type::Double, &Type::Int, ConvCtx::Other, true, false));
    }

    #[test]
    fn ownership_axis() {
        let (prog, animal, _) = prog_with_classes();
        let owned = Type::Own(Box::new(Type::Class(animal)));
        let plain = Type::Class(animal);
        // Owning to non-owning borrows at assignment and call boundaries only.
        assert!(can_convert(&prog, &owned, &plain, ConvCtx::AssignVar, false, false));
        assert!(can_convert(&prog, &owned, &plain, ConvCtx::MethodArg, false, false));
        assert!(!can_convert(&prog, &owned, &plain, ConvCtx::Other, false, false));
        // A non-owning reference never becomes owning.
        assert!(!can_convert(&prog, &plain, &owned, ConvCtx::AssignVar, false, false));
        // Null converts to anything reference-like.
        assert!(can_convert(&prog, &Type::Null, &owned, ConvCtx::Other, false, false));
    }

    #[test]
    fn boxing_only_at_call_boundaries() {
        let prog = Program::new();
        let obj_own = Type::Own(Box::new(Type::Class(prog.object_class)));
        assert!(can_convert(&prog, &Type::Int, &obj_own, ConvCtx::MethodArg, false, false));
        assert!(!can_convert(&prog, &Type::Int, &obj_own, ConvCtx::AssignVar, false, false));
        // Strings convert to owning object anywhere; the handle is counted.
        assert!(can_convert(&prog, &Type::String, &obj_own, ConvCtx::AssignVar, false, false));
    }

    #[test]
    fn downcast_requires_explicit() {
        let (prog, animal, dog) = prog_with_classes();
        let a = Type::Class(animal);
        let d = Type::Class(dog);
        assert!(!can_convert(&prog, &a, &d, ConvCtx::Other, false, false));
        assert!(can_convert(&prog, &a, &d, ConvCtx::Other, true, false));
        // subtype_only shuts off even the widenings.
        assert!(!can_convert(&prog, &Type::Int, &Type::Double, ConvCtx::Other, false, true));
    }
}
