//! Front-end diagnostics: definite assignment, ownership transfer,
//! conversions, and the structural checks the CFG makes possible.

mod common;

use common::{diags_containing, front_end};

#[test]
fn clean_program_has_no_diagnostics() {
    let (_prog, diags) = front_end(
        "class Program {
           static void Main() {
             Console.WriteLine(\"hello, world\");
           }
         }",
    );
    assert!(diags.is_empty(), "{:?}", diags);
}

#[test]
fn use_before_init_is_reported_at_the_use() {
    let (_prog, diags) = front_end(
        "class Program {
           static void Main() {
             int x;
             Console.WriteLine(x);
           }
         }",
    );
    let hits = diags_containing(&diags, "may be used before it is assigned");
    assert_eq!(hits.len(), 1, "{:?}", diags);
    assert_eq!(hits[0].line, 4);
    assert_eq!(diags.len(), 1);
}

#[test]
fn assignment_on_one_path_only_is_still_an_error() {
    let (_prog, diags) = front_end(
        "class Program {
           static void Main() {
             int x;
             if (1 < 2) {
               x = 1;
             }
             Console.WriteLine(x);
           }
         }",
    );
    assert_eq!(diags_containing(&diags, "may be used before it is assigned").len(), 1);
}

#[test]
fn assignment_on_both_branches_satisfies_the_walk() {
    let (_prog, diags) = front_end(
        "class Program {
           static void Main() {
             int x;
             if (1 < 2) {
               x = 1;
             } else {
               x = 2;
             }
             Console.WriteLine(x);
           }
         }",
    );
    assert!(diags.is_empty(), "{:?}", diags);
}

#[test]
fn double_take_is_rejected() {
    let (_prog, diags) = front_end(
        "class Node {
           Node^ next;
           void Grab() {
             Node^ a = take next;
             Node^ b = take next;
           }
         }
         class Program { static void Main() { } }",
    );
    let hits = diags_containing(&diags, "can't transfer ownership");
    assert_eq!(hits.len(), 1, "{:?}", diags);
    assert_eq!(hits[0].line, 5);
}

#[test]
fn take_after_reassignment_is_fine() {
    let (_prog, diags) = front_end(
        "class Node {
           Node^ next;
           void Cycle() {
             Node^ a = take next;
             next = take a;
             Node^ b = take next;
           }
         }
         class Program { static void Main() { } }",
    );
    assert!(diags.is_empty(), "{:?}", diags);
}

#[test]
fn use_after_local_take_is_rejected() {
    let (_prog, diags) = front_end(
        "class Node {
           Node^ next;
           void Drop(Node^ n) { }
           void Spill() {
             Node^ a = take next;
             Drop(take a);
             Console.WriteLine(a.ToString());
           }
         }
         class Program { static void Main() { } }",
    );
    assert_eq!(diags_containing(&diags, "ownership is transferred").len(), 1, "{:?}", diags);
}

#[test]
fn out_parameter_must_be_assigned() {
    let (_prog, diags) = front_end(
        "class Program {
           static void F(out int x) {
           }
           static void Main() {
             int y;
             F(y);
             Console.WriteLine(y);
           }
         }",
    );
    let hits = diags_containing(&diags, "out parameter");
    assert_eq!(hits.len(), 1, "{:?}", diags);
    // The call assigns y, so no use-before-init at the caller.
    assert!(diags_containing(&diags, "may be used before it is assigned").is_empty());
}

#[test]
fn out_parameter_assigned_on_every_path_is_fine() {
    let (_prog, diags) = front_end(
        "class Program {
           static void F(out int x) {
             if (1 < 2) {
               x = 1;
               return;
             }
             x = 2;
           }
           static void Main() {
             int y;
             F(y);
           }
         }",
    );
    assert!(diags.is_empty(), "{:?}", diags);
}

#[test]
fn missing_return_on_a_path_is_rejected() {
    let (_prog, diags) = front_end(
        "class Program {
           static int F() {
             if (1 < 2) {
               return 1;
             }
           }
           static void Main() { }
         }",
    );
    assert_eq!(diags_containing(&diags, "not all code paths return a value").len(), 1, "{:?}", diags);
}

#[test]
fn switch_sections_must_not_fall_through() {
    let (_prog, diags) = front_end(
        "class Program {
           static void Main() {
             int x = 1;
             switch (x) {
               case 1:
                 Console.WriteLine(\"one\");
               case 2:
                 break;
             }
           }
         }",
    );
    assert_eq!(diags_containing(&diags, "falls through").len(), 1, "{:?}", diags);
}

#[test]
fn borrowed_reference_never_becomes_owning() {
    let (_prog, diags) = front_end(
        "class Node {
           Node^ next;
           void F(Node other) {
             next = other;
           }
         }
         class Program { static void Main() { } }",
    );
    assert_eq!(diags_containing(&diags, "cannot convert").len(), 1, "{:?}", diags);
}

#[test]
fn owning_value_borrowed_at_assignment_is_fine() {
    let (_prog, diags) = front_end(
        "class Node {
           static void Main() {
             Node n = new Node();
             Console.WriteLine(n.ToString());
           }
         }",
    );
    assert!(diags.is_empty(), "{:?}", diags);
}

#[test]
fn abstract_classes_cannot_be_instantiated() {
    let (_prog, diags) = front_end(
        "abstract class Animal { abstract string Speak(); }
         class Program {
           static void Main() {
             Animal a = new Animal();
           }
         }",
    );
    assert_eq!(diags_containing(&diags, "abstract").len(), 1, "{:?}", diags);
}

#[test]
fn ref_and_out_arguments_must_be_variables() {
    let (_prog, diags) = front_end(
        "class Program {
           static void F(ref int x) { x = 1; }
           static void Main() {
             F(3);
           }
         }",
    );
    assert!(!diags.is_empty());
}

#[test]
fn checking_continues_past_a_failed_member() {
    let (_prog, diags) = front_end(
        "class Program {
           static void A() {
             int x;
             Console.WriteLine(x);
           }
           static void B() {
             int y;
             Console.WriteLine(y);
           }
           static void Main() { }
         }",
    );
    assert_eq!(diags_containing(&diags, "may be used before it is assigned").len(), 2);
}

#[test]
fn main_is_required_and_unique() {
    let (prog, _diags) = front_end("class A { static void Main() { } }");
    assert!(prog.main.get().is_some());

    let (_prog, diags) = front_end(
        "class A { static void Main() { } }
         class B { static void Main() { } }",
    );
    assert_eq!(diags_containing(&diags, "more than one `Main`").len(), 1, "{:?}", diags);
}
