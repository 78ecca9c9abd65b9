//! Destruction-set and reference-count analysis behavior over whole
//! programs.

mod common;

use common::{front_end, front_end_with};
use ryec::destroy;
use ryec::sema::MethodKind;

fn method_id(prog: &ryec::sema::Program, class: &str, name: &str) -> ryec::sema::MethodId {
    let cid = prog.class_by_name(class).expect("class exists");
    prog.class(cid)
        .methods
        .iter()
        .copied()
        .find(|&m| prog.method(m).name == name && prog.method(m).kind == MethodKind::Normal)
        .expect("method exists")
}

fn local_needs_ref(prog: &ryec::sema::Program, class: &str, method: &str, local: &str) -> bool {
    let mid = method_id(prog, class, method);
    let m = prog.method(mid);
    let locals = m.locals.borrow();
    locals
        .iter()
        .find(|l| l.name == local)
        .expect("local exists")
        .needs_ref
        .get()
}

const LIST_PROGRAM: &str = "
class Item {
  int value;
}
class Holder {
  Item^ item;
  void Drop() {
    item = null;
  }
  void Touch() {
    int n = 0;
  }
  void Risky() {
    Item x = item;
    Drop();
    Console.WriteLine(x.ToString());
  }
  void Calm() {
    Item y = item;
    Touch();
    Console.WriteLine(y.ToString());
  }
}
class Program { static void Main() { } }
";

#[test]
fn type_destroys_includes_owned_fields() {
    let (prog, diags) = front_end(LIST_PROGRAM);
    assert!(diags.is_empty(), "{:?}", diags);
    let holder = prog.class_by_name("Holder").unwrap();
    let item = prog.class_by_name("Item").unwrap();
    let set = destroy::type_destroys(&prog, holder);
    assert!(set.intersects(&prog, holder));
    assert!(set.intersects(&prog, item));
    // The other direction holds nothing extra.
    let set = destroy::type_destroys(&prog, item);
    assert!(!set.intersects(&prog, holder));
}

#[test]
fn method_destroys_sees_overwritten_owning_fields() {
    let (prog, diags) = front_end(LIST_PROGRAM);
    assert!(diags.is_empty(), "{:?}", diags);
    let item = prog.class_by_name("Item").unwrap();
    let drop = method_id(&prog, "Holder", "Drop");
    let touch = method_id(&prog, "Holder", "Touch");
    assert!(destroy::method_destroys(&prog, drop).intersects(&prog, item));
    assert!(!destroy::method_destroys(&prog, touch).intersects(&prog, item));
}

#[test]
fn method_destroys_follows_the_call_graph() {
    let (prog, diags) = front_end(
        "class Item { int value; }
         class Holder {
           Item^ item;
           void Inner() { item = null; }
           void Outer() { Inner(); }
         }
         class Program { static void Main() { } }",
    );
    assert!(diags.is_empty(), "{:?}", diags);
    let item = prog.class_by_name("Item").unwrap();
    let outer = method_id(&prog, "Holder", "Outer");
    assert!(destroy::method_destroys(&prog, outer).intersects(&prog, item));
}

#[test]
fn method_destroys_includes_overrides_of_callees() {
    let (prog, diags) = front_end(
        "class Item { int value; }
         class Base {
           virtual void Step() { }
         }
         class Wrecker : Base {
           Item^ item;
           override void Step() { item = null; }
         }
         class Driver {
           void Run(Base b) { b.Step(); }
         }
         class Program { static void Main() { } }",
    );
    assert!(diags.is_empty(), "{:?}", diags);
    let item = prog.class_by_name("Item").unwrap();
    let run = method_id(&prog, "Driver", "Run");
    // Virtual dispatch may land in the override that destroys an Item.
    assert!(destroy::method_destroys(&prog, run).intersects(&prog, item));
}

#[test]
fn needs_ref_tracks_endangered_borrows_only() {
    let (prog, diags) = front_end(LIST_PROGRAM);
    assert!(diags.is_empty(), "{:?}", diags);
    assert!(local_needs_ref(&prog, "Holder", "Risky", "x"));
    assert!(!local_needs_ref(&prog, "Holder", "Calm", "y"));
}

#[test]
fn pessimistic_mode_flags_everything() {
    let (prog, diags) = front_end_with(LIST_PROGRAM, true);
    assert!(diags.is_empty(), "{:?}", diags);
    assert!(local_needs_ref(&prog, "Holder", "Risky", "x"));
    assert!(local_needs_ref(&prog, "Holder", "Calm", "y"));
}

#[test]
fn root_object_locals_are_always_flagged() {
    let (prog, diags) = front_end(
        "class Program {
           static void Main() {
             object o = \"alias\";
             Console.WriteLine(o);
           }
         }",
    );
    assert!(diags.is_empty(), "{:?}", diags);
    let main = method_id(&prog, "Program", "Main");
    let m = prog.method(main);
    let locals = m.locals.borrow();
    let o = locals.iter().find(|l| l.name == "o").unwrap();
    assert!(o.needs_ref.get());
}

#[test]
fn destruction_sets_grow_with_new_subclasses() {
    let base_program = "class Item { int value; }
         class Node { Node^ next; }
         class Program { static void Main() { } }";
    let extended = "class Item { int value; }
         class Node { Node^ next; }
         class FatNode : Node { Item^ extra; }
         class Program { static void Main() { } }";
    let (prog_a, _) = front_end(base_program);
    let (prog_b, _) = front_end(extended);
    let node_a = prog_a.class_by_name("Node").unwrap();
    let node_b = prog_b.class_by_name("Node").unwrap();
    let item_a = prog_a.class_by_name("Item").unwrap();
    let item_b = prog_b.class_by_name("Item").unwrap();
    // Monotonicity: the subclass only adds to what Node may destroy.
    assert!(!destroy::type_destroys(&prog_a, node_a).intersects(&prog_a, item_a));
    assert!(destroy::type_destroys(&prog_b, node_b).intersects(&prog_b, item_b));
}

#[test]
fn pool_typed_destruction_reaches_everything() {
    let (prog, diags) = front_end(
        "class Item { int value; }
         class Program {
           static void Main() {
             Pool^ p = new Pool();
             Item it = new(p) Item();
             Console.WriteLine(it.ToString());
           }
         }",
    );
    assert!(diags.is_empty(), "{:?}", diags);
    let item = prog.class_by_name("Item").unwrap();
    assert!(prog.class(item).pool_destroy_needed.get());
    assert!(prog.class(item).virtual_needed.get());
    let set = destroy::type_destroys(&prog, prog.pool_class);
    assert!(set.is_top(&prog));
}
