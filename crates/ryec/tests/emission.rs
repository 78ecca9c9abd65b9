//! Emitted-C++ shape: handle selection, virtual dispatch decisions,
//! constructor lowering, pools, and the entry point.

mod common;

use common::emit;

#[test]
fn hello_world_translation_unit() {
    let out = emit(
        "class Program {
           static void Main() {
             Console.WriteLine(\"hello, world\");
           }
         }",
    );
    assert!(out.contains("#define RYE_SAFE 1"), "{}", out);
    assert!(out.contains("#include \"rye_runtime.h\""));
    assert!(out.contains("static GlobStr lit_0(L\"hello, world\");"));
    assert!(out.contains("class Program : public RyeBase"), "{}", out);
    assert!(out.contains("Console::WriteLine((&lit_0));"), "{}", out);
    assert!(out.contains("static void rye_main()"));
    assert!(out.contains("return rye_run_main(rye_main, argc, argv);"));
    // Nothing forced a vtable on Program.
    assert!(!out.contains("virtual ~Program"), "{}", out);
}

#[test]
fn owning_fields_use_the_owning_handle() {
    let out = emit(
        "class Node {
           Node^ next;
           Node prev;
           int value;
           string label;
         }
         class Program { static void Main() { } }",
    );
    assert!(out.contains("Own< Node > next;"), "{}", out);
    assert!(out.contains("Node *prev = 0;"), "{}", out);
    assert!(out.contains("int value = 0;"), "{}", out);
    assert!(out.contains("StrRef label;"), "{}", out);
}

#[test]
fn virtual_override_scenario() {
    let out = emit(
        "abstract class Animal {
           abstract string Speak();
         }
         class Dog : Animal {
           override string Speak() { return \"woof\"; }
         }
         class Cat : Animal {
           override string Speak() { return \"meow\"; }
         }
         class Program {
           static void Main() {
             Animal^[]^ pets = new Animal^[2];
             pets[0] = new Dog();
             pets[1] = new Cat();
             foreach (Animal a in pets) {
               Console.WriteLine(a.Speak());
             }
           }
         }",
    );
    assert!(out.contains("virtual StrRef Speak() = 0;"), "{}", out);
    assert!(out.contains("class Dog : public Animal"), "{}", out);
    // Storing Dog^ into an Animal^ slot forces a virtual destructor on
    // the base.
    assert!(out.contains("virtual ~Animal() { }"), "{}", out);
    assert!(out.contains("new OwnArr< Animal >(2)"), "{}", out);
    assert!(out.contains("->at(0) = new Dog()"), "{}", out);
    assert!(out.contains("->Speak()"), "{}", out);
}

#[test]
fn pool_allocation_and_two_pass_hooks() {
    let out = emit(
        "class Cell {
           Cell other;
         }
         class Program {
           static void Main() {
             Pool^ p = new Pool();
             Cell a = new(p) Cell();
             Cell b = new(p) Cell();
             a.other = b;
             b.other = a;
           }
         }",
    );
    assert!(out.contains("RYE_POOL_OBJECT(Cell)"), "{}", out);
    assert!(out.contains("->alloc(sizeof(Cell))) Cell()"), "{}", out);
    assert!(out.contains("Own< Pool > p(new Pool());"), "{}", out);
}

#[test]
fn take_lowered_through_the_handle() {
    let out = emit(
        "class Node {
           Node^ next;
           Node^ Pop() {
             return take next;
           }
         }
         class Program { static void Main() { } }",
    );
    assert!(out.contains("return this->next.take();"), "{}", out);
    assert!(out.contains("Node *Pop()"), "{}", out);
}

#[test]
fn constructor_delegation_lowering() {
    let out = emit(
        "class Pair {
           int a;
           int b;
           Pair() : this(1, 2) { }
           Pair(int x, int y) {
             a = x;
             b = y;
           }
         }
         class Program { static void Main() { Pair p = new Pair(); } }",
    );
    // Two constructors route bodies through init_ overloads; the
    // this(...) target is callable as construct_ on a skip-initialized
    // object.
    assert!(out.contains("void init_();"), "{}", out);
    assert!(out.contains("void init_(int x, int y);"), "{}", out);
    assert!(out.contains("void construct_(int x, int y);"), "{}", out);
    assert!(out.contains("Pair::Pair() : RyeBase(rye_no_init) {"), "{}", out);
    assert!(out.contains("construct_(1, 2);"), "{}", out);
    assert!(out.contains("Pair(RyeNoInit t) : RyeBase(t) { }"), "{}", out);
}

#[test]
fn base_delegation_uses_native_initialization() {
    let out = emit(
        "class Animal {
           int legs;
           Animal(int n) { legs = n; }
         }
         class Dog : Animal {
           Dog() : base(4) { }
         }
         class Program { static void Main() { Dog d = new Dog(); } }",
    );
    assert!(out.contains("Dog::Dog() : Animal(4) {"), "{}", out);
}

#[test]
fn needs_ref_local_spills_into_a_borrow_handle() {
    let out = emit(
        "class Item { int value; }
         class Holder {
           Item^ item;
           void Drop() { item = null; }
           void Risky() {
             Item x = item;
             Drop();
             Console.WriteLine(x.ToString());
           }
           void Calm() {
             Item y = item;
             Console.WriteLine(y.ToString());
           }
         }
         class Program { static void Main() { } }",
    );
    assert!(out.contains("Borrow< Item > x(this->item);"), "{}", out);
    assert!(out.contains("Item *y = this->item;"), "{}", out);
}

#[test]
fn strings_and_objects_use_counted_handles() {
    let out = emit(
        "class Program {
           static void Main() {
             string s = \"a\" + \"b\";
             object o = s;
             Console.WriteLine(o);
           }
         }",
    );
    assert!(out.contains("StrRef s(Str::Concat((&lit_0), (&lit_1)));"), "{}", out);
    assert!(out.contains("BorrowCounted< Obj > o(s);"), "{}", out);
}

#[test]
fn properties_and_indexers_become_accessor_methods() {
    let out = emit(
        "class Box {
           int n_;
           int Count { get { return n_; } set { n_ = value; } }
           int this[int i] { get { return n_ + i; } }
           void Bump() {
             Count = Count + 1;
           }
         }
         class Program {
           static void Main() {
             Box b = new Box();
             b.Count = b[3];
           }
         }",
    );
    assert!(out.contains("int get_Count();"), "{}", out);
    assert!(out.contains("void set_Count(int value);"), "{}", out);
    assert!(out.contains("int get_item(int i);"), "{}", out);
    assert!(out.contains("set_Count("), "{}", out);
    assert!(out.contains("->get_item(3)"), "{}", out);
}

#[test]
fn main_with_arguments() {
    let out = emit(
        "class Program {
           static void Main(string[] args) {
             Console.WriteLine(args.Count > 0 ? args[0] : \"none\");
           }
         }",
    );
    assert!(out.contains("static void rye_main(Arr< StrRef > *args)"), "{}", out);
    assert!(out.contains("args->get_Count()"), "{}", out);
    assert!(out.contains("args->at(0)"), "{}", out);
}

#[test]
fn unsafe_mode_only_changes_the_macro() {
    let (prog, diags) = common::front_end(
        "class Program { static void Main() { Console.WriteLine(\"x\"); } }",
    );
    assert!(diags.is_empty());
    let unsafe_out = ryec::emit::emit_program(
        &prog,
        &ryec::emit::EmitOptions {
            safe: false,
            debug: false,
            profile: false,
            crt_alloc: false,
            includes: Vec::new(),
        },
    );
    assert!(!unsafe_out.contains("#define RYE_SAFE"), "{}", unsafe_out);
    assert!(unsafe_out.contains("Console::WriteLine"));
}
