//! Built-in class descriptors.
//!
//! The built-in library surface lives in the runtime header; the compiler
//! only needs signatures so that member resolution and checking see the
//! same world the emitted code links against. Everything here is an extern
//! class: no code is emitted for it.

use rye_ast::{Access, ParamMode};

use crate::sema::{ClassId, MethodId, MethodKind, Program};
use crate::types::Type;

fn obj(prog: &Program) -> Type {
    Type::Class(prog.object_class)
}

/// Registers an extern class.
fn extern_class(prog: &mut Program, name: &str, parent: Option<ClassId>) -> ClassId {
    let id = prog.add_class(name, parent);
    prog.classes[id.0 as usize].is_extern = true;
    prog.classes[id.0 as usize].is_public = true;
    id
}

/// Registers an extern method and returns its id.
#[allow(clippy::too_many_arguments)]
fn extern_method(
    prog: &mut Program,
    class: ClassId,
    kind: MethodKind,
    name: &str,
    cpp_name: &str,
    params: &[(&str, Type)],
    ret: Type,
    is_static: bool,
    is_virtual: bool,
) -> MethodId {
    let mid = prog.add_method(class, kind, name, cpp_name, ret, 0..0, 0);
    for (pname, pty) in params {
        prog.push_param(mid, pname, pty.clone(), ParamMode::In, 0..0);
    }
    let m = &mut prog.methods[mid.0 as usize];
    m.is_static = is_static;
    m.is_virtual = is_virtual;
    m.access = Access::Public;
    mid
}

/// Populates the registry with the built-in classes. Called once from
/// `Program::new`; the well-known ids are stored on the program.
pub fn register(prog: &mut Program) {
    // Root object class. Its three virtual methods are what every class
    // inherits; emitted code resolves them on the runtime's `Obj`.
    let object = extern_class(prog, "Object", None);
    prog.object_class = object;
    prog.classes[object.0 as usize].virtual_needed.set(true);
    prog.classes[object.0 as usize].object_inheritance_needed.set(true);
    extern_method(prog, object, MethodKind::Normal, "Equals", "Equals", &[("o", obj(prog))], Type::Bool, false, true);
    extern_method(prog, object, MethodKind::Normal, "GetHashCode", "GetHashCode", &[], Type::Int, false, true);
    extern_method(prog, object, MethodKind::Normal, "ToString", "ToString", &[], Type::String, false, true);

    // Strings are value-like but share instances through a counted handle.
    let string = extern_class(prog, "String", Some(object));
    prog.string_class = string;
    prog.classes[string.0 as usize].virtual_needed.set(true);
    prog.classes[string.0 as usize].object_inheritance_needed.set(true);
    extern_method(prog, string, MethodKind::PropGet, "Count", "get_Count", &[], Type::Int, false, false);
    extern_method(prog, string, MethodKind::IndexGet, "this[]", "get_item", &[("index", Type::Int)], Type::Char, false, false);
    extern_method(prog, string, MethodKind::Normal, "Substring", "Substring", &[("start", Type::Int), ("length", Type::Int)], Type::String, false, false);
    extern_method(prog, string, MethodKind::Normal, "StartsWith", "StartsWith", &[("s", Type::String)], Type::Bool, false, false);
    extern_method(prog, string, MethodKind::Normal, "EndsWith", "EndsWith", &[("s", Type::String)], Type::Bool, false, false);
    extern_method(prog, string, MethodKind::Normal, "IndexOf", "IndexOf", &[("c", Type::Char)], Type::Int, false, false);
    extern_method(prog, string, MethodKind::Normal, "Compare", "Compare", &[("a", Type::String), ("b", Type::String)], Type::Int, true, false);

    // The parent class of every array type; `Count` is what foreach reads.
    let array = extern_class(prog, "Array", Some(object));
    prog.array_class = array;
    prog.classes[array.0 as usize].virtual_needed.set(true);
    prog.classes[array.0 as usize].object_inheritance_needed.set(true);
    extern_method(prog, array, MethodKind::PropGet, "Count", "get_Count", &[], Type::Int, false, false);

    // The bulk allocator. Sits outside the object hierarchy: a pool is
    // never aliased as an object, only owned and destroyed.
    let pool = extern_class(prog, "Pool", None);
    prog.pool_class = pool;
    extern_method(prog, pool, MethodKind::Ctor, "Pool", "Pool", &[], Type::Void, false, false);

    let console = extern_class(prog, "Console", Some(object));
    extern_method(prog, console, MethodKind::Normal, "Write", "Write", &[("o", obj(prog))], Type::Void, true, false);
    extern_method(prog, console, MethodKind::Normal, "Write", "Write", &[("f", Type::String), ("a", obj(prog))], Type::Void, true, false);
    extern_method(prog, console, MethodKind::Normal, "WriteLine", "WriteLine", &[("o", obj(prog))], Type::Void, true, false);
    extern_method(prog, console, MethodKind::Normal, "WriteLine", "WriteLine", &[("f", Type::String), ("a", obj(prog))], Type::Void, true, false);
    extern_method(prog, console, MethodKind::Normal, "WriteLine", "WriteLine", &[("f", Type::String), ("a", obj(prog)), ("b", obj(prog))], Type::Void, true, false);

    let math = extern_class(prog, "Math", Some(object));
    extern_method(prog, math, MethodKind::Normal, "Sqrt", "Sqrt", &[("d", Type::Double)], Type::Double, true, false);

    let process = extern_class(prog, "Process", Some(object));
    extern_method(prog, process, MethodKind::Normal, "System", "System", &[("command", Type::String)], Type::Int, true, false);

    let debug = extern_class(prog, "Debug", Some(object));
    extern_method(prog, debug, MethodKind::Normal, "Assert", "Assert", &[("b", Type::Bool)], Type::Void, true, false);

    let environment = extern_class(prog, "Environment", Some(object));
    extern_method(prog, environment, MethodKind::Normal, "Exit", "Exit", &[("code", Type::Int)], Type::Void, true, false);
}
