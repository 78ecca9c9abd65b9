//! Typed method bodies.
//!
//! The checker lowers the parser's AST into this tree while it builds the
//! CFG. Every expression carries its resolved type, member references are
//! resolved to registry ids, implicit conversions are explicit `Convert`
//! nodes, and `foreach` has already been rewritten into an index loop.
//! Emission walks this tree and nothing else.

use crate::cfg::Place;
use crate::sema::{ClassId, FieldId, GuardId, LocalId, MethodId};
use crate::types::Type;
use rye_ast::{BinaryOp, IncrOp, UnaryOp};

/// A checked block.
#[derive(Debug)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

/// Checked statements.
#[derive(Debug)]
pub enum Stmt {
    /// Local declaration; initialization is a separate flag from scope
    /// entry so emission can spill uninitialized handles.
    Local { local: LocalId, init: Option<Expr> },
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    Do {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        scrutinee: Expr,
        sections: Vec<SwitchSection>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Block(Block),
}

/// A checked switch section. A `None` label is `default`.
#[derive(Debug)]
pub struct SwitchSection {
    pub labels: Vec<Option<Expr>>,
    pub body: Vec<Stmt>,
}

/// A checked, typed expression.
#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    /// Reference-count guard slot assigned by the checker when this value
    /// is held across intervening computation; the analysis decides
    /// whether emission wraps it.
    pub guard: Option<GuardId>,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Expr {
        Expr {
            kind,
            ty,
            guard: None,
        }
    }
}

/// Kinds of checked expressions.
#[derive(Debug)]
pub enum ExprKind {
    NullLit,
    BoolLit(bool),
    IntLit(i32),
    FloatLit(f32),
    DoubleLit(f64),
    CharLit(u16),
    StrLit(String),
    /// Read of a local or parameter.
    Local(LocalId),
    This,
    /// Read of an instance field. `obj` is `None` for implicit `this`.
    FieldGet {
        obj: Option<Box<Expr>>,
        field: FieldId,
    },
    /// Read of a static or const field.
    StaticGet(FieldId),
    /// Method, accessor, or static call. `virtual_call` is false for
    /// `base.M(...)` and for calls to non-virtual members.
    Call {
        method: MethodId,
        recv: Option<Box<Expr>>,
        args: Vec<Expr>,
        virtual_call: bool,
    },
    /// Object construction. `stack_temp` marks a result that is used and
    /// immediately discarded, emitted as a stack-addressed temporary.
    New {
        class: ClassId,
        ctor: MethodId,
        pool: Option<Box<Expr>>,
        args: Vec<Expr>,
        stack_temp: bool,
    },
    /// Array construction.
    NewArray {
        elem: Type,
        len: Box<Expr>,
    },
    /// Array element read.
    ArrayGet {
        obj: Box<Expr>,
        index: Box<Expr>,
    },
    /// Assignment; compound forms keep their operator (numeric only).
    Assign {
        place: PlaceExpr,
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    /// Increment or decrement of a numeric place.
    Incr {
        place: PlaceExpr,
        op: IncrOp,
        prefix: bool,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Arithmetic, comparison, or short-circuit logic. `&&`/`||` map to
    /// the target's native short-circuit operators.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// String concatenation via the runtime helper.
    StrConcat {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// String equality/ordering via the runtime helper.
    StrCompare {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cond {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// Ownership transfer out of an owning storage location.
    Take {
        place: PlaceExpr,
    },
    /// A materialized conversion.
    Convert {
        kind: ConvertKind,
        operand: Box<Expr>,
    },
    /// An owning value whose ownership is dropped here: wrapped in a
    /// scoped handle that releases at statement end.
    OwnTemp {
        operand: Box<Expr>,
    },
}

/// An assignable location together with the expressions needed to reach
/// it. The `place` field mirrors the CFG-level `Place` when the location
/// is flow-tracked.
#[derive(Debug)]
pub enum PlaceExpr {
    Local(LocalId),
    /// Field of an object; `obj` is `None` for implicit or explicit `this`.
    Field {
        obj: Option<Box<Expr>>,
        field: FieldId,
    },
    Static(FieldId),
    ArrayElem {
        obj: Box<Expr>,
        index: Box<Expr>,
    },
}

impl PlaceExpr {
    /// The flow-tracked place, if this location is tracked.
    pub fn tracked(&self) -> Option<Place> {
        match self {
            PlaceExpr::Local(l) => Some(Place::Local(*l)),
            PlaceExpr::Field { obj: None, field } => Some(Place::ThisField(*field)),
            PlaceExpr::Field { obj: Some(o), field } => match o.kind {
                ExprKind::Local(l) => Some(Place::LocalField(l, *field)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// How a `Convert` node is carried out in emitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertKind {
    /// Numeric widening or narrowing; a plain cast in the target.
    Numeric,
    /// Reference conversion toward a supertype; no code.
    Upcast,
    /// Checked reference conversion toward a subtype.
    Downcast(ClassId),
    /// Value boxed into an owning object.
    Box,
    /// Object unboxed back to a value.
    Unbox,
}
