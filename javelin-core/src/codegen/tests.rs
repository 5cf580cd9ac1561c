//! End-to-end checks: source through the whole pipeline into a scheduler.

use crate::compiler::{CompileOptions, compile, compile_source, modules_from_sources};
use crate::executable::Executable;
use crate::runtime::SharedBuffer;
use crate::runtime::program::StepList;
use crate::runtime::scheduler::{RunOutcome, Scheduler, SchedulerConfig};
use crate::span::{ModuleId, Position};
use crate::workspace::SourceFile;

fn build(source: &str) -> Executable {
    let exe = compile_source("Main.java", source);
    assert!(!exe.has_errors(), "{:#?}", exe.all_diagnostics());
    exe
}

fn run_exe(exe: Executable) -> String {
    let out = SharedBuffer::new();
    let mut scheduler = Scheduler::new(exe, Box::new(out.clone()), SchedulerConfig::default());
    scheduler.start_main().unwrap();
    let summary = scheduler.run_to_completion(1_000_000).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Finished);
    out.contents()
}

fn run(source: &str) -> String {
    run_exe(build(source))
}

fn main_class(body: &str) -> String {
    format!("public class Main {{\n  public static void main(String[] args) {{\n{body}\n  }}\n}}\n")
}

#[test]
fn steps_are_contiguous_and_exits_stay_in_range() {
    let exe = build(
        "public class Main {
           static int sum(int[] xs) {
             int total = 0;
             for (int i = 0; i < xs.length; i++) { if (xs[i] < 0) continue; total += xs[i]; }
             return total;
           }
           public static void main(String[] args) {
             int k = 2;
             switch (k) { case 1: k++; case 2: k--; break; default: k = 0; }
             try { System.out.println(sum(new int[] { 1, -2, 3 })); } finally { k = 9; }
             do { k--; } while (k > 0);
           }
         }",
    );
    assert!(exe.programs.len() > 1);
    for (_, program) in exe.programs.iter() {
        program.validate().unwrap();
        assert_eq!(program.steps_single.len(), program.steps_multiple.len());
        for (i, step) in program.steps_single.iter().enumerate() {
            assert_eq!(step.index, i);
            assert_eq!(program.step(i, StepList::Multiple).map(|s| s.index), Some(i));
        }
    }
}

#[test]
fn static_initializers_run_dependencies_first() {
    let source = "public class Main { public static void main(String[] args) { System.out.println(A.a); } }
class A { static int a = B.b + 1; }
class B { static int b = C.c + 1; }
class C { static int c = 1; }
";
    let exe = build(source);
    let order: Vec<String> = exe
        .static_init
        .sequence
        .iter()
        .map(|(class, _)| exe.types.name(*class))
        .collect();
    assert_eq!(order, ["C", "B", "A"]);
    assert_eq!(run_exe(exe), "3\n");
}

#[test]
fn static_initializer_cycle_is_reported_once() {
    let source = "public class Main { public static void main(String[] args) { } }
class A { static int a = B.b; }
class B { static int b = A.a; }
class D { static int d = 4; }
";
    let exe = compile_source("Main.java", source);
    let mut cyclic: Vec<String> = exe.static_init.cyclic.iter().map(|c| exe.types.name(*c)).collect();
    cyclic.sort();
    assert_eq!(cyclic, ["A", "B"]);
    let sequence: Vec<String> = exe
        .static_init
        .sequence
        .iter()
        .map(|(c, _)| exe.types.name(*c))
        .collect();
    assert_eq!(sequence, ["D"]);
    let cycle_errors: Vec<_> = exe
        .diagnostics
        .global()
        .iter()
        .filter(|d| d.id.as_deref() == Some("E0212"))
        .collect();
    assert_eq!(cycle_errors.len(), 1);
    assert!(exe.main.is_none());
}

#[test]
fn switch_falls_through_until_break() {
    let body = r#"    int x = 1;
    switch (x) {
      case 0: System.out.println("A"); break;
      case 1: System.out.println("B");
      case 2: System.out.println("C"); break;
      default: System.out.println("D"); break;
    }
    System.out.println("E");"#;
    assert_eq!(run(&main_class(body)), "B\nC\nE\n");
}

#[test]
fn default_binds_by_source_position() {
    let source = r#"public class Main {
  static void pick(int x) {
    switch (x) {
      case 0: System.out.println("zero");
      default: System.out.println("other");
      case 5: System.out.println("five"); break;
    }
  }
  public static void main(String[] args) {
    pick(5);
    pick(7);
    pick(0);
  }
}
"#;
    assert_eq!(run(source), "five\nother\nfive\nzero\nother\nfive\n");
}

#[test]
fn switch_on_strings_and_enums() {
    let source = r#"public class Main {
  public static void main(String[] args) {
    String s = "b";
    switch (s) { case "a": System.out.println(1); break; case "b": System.out.println(2); break; }
    Color c = Color.GREEN;
    switch (c) { case RED: System.out.println("r"); break; case GREEN: System.out.println("g"); break; }
  }
}
enum Color { RED, GREEN }
"#;
    assert_eq!(run(source), "2\ng\n");
}

#[test]
fn exceptions_are_caught_across_frames() {
    let source = r#"public class Main {
  static int divide(int a, int b) { return a / b; }
  static int safe(int a, int b) {
    try {
      return divide(a, b);
    } catch (ArithmeticException e) {
      System.out.println("caught " + e.getMessage());
      return -1;
    }
  }
  public static void main(String[] args) {
    System.out.println(safe(6, 0));
    try {
      throw new IllegalStateException("bad");
    } catch (IllegalArgumentException | IllegalStateException e) {
      System.out.println(e.getMessage());
    }
  }
}
"#;
    assert_eq!(run(source), "caught / by zero\n-1\nbad\n");
}

#[test]
fn finally_runs_before_return_completes() {
    let source = r#"public class Main {
  static int f() {
    try {
      return 1;
    } finally {
      System.out.println("fin");
    }
  }
  public static void main(String[] args) {
    System.out.println(f());
  }
}
"#;
    assert_eq!(run(source), "fin\n1\n");
}

#[test]
fn lambdas_capture_values() {
    let body = r#"    int base = 10;
    Function<Integer, Integer> add = x -> x + base;
    Runnable show = () -> System.out.println("base " + base);
    System.out.println(add.apply(5));
    show.run();"#;
    assert_eq!(run(&main_class(body)), "15\nbase 10\n");
}

#[test]
fn virtual_dispatch_and_constructor_chaining() {
    let source = r#"public class Main {
  public static void main(String[] args) {
    Animal a = new Dog();
    System.out.println(a.describe());
    System.out.println(new Counter().count);
  }
}
class Animal {
  String sound() { return "..."; }
  String describe() { return "I say " + sound(); }
}
class Dog extends Animal {
  String sound() { return "woof"; }
}
class Counter {
  int count = 5;
  Counter() { this(1); }
  Counter(int step) { count += step; }
}
"#;
    assert_eq!(run(source), "I say woof\n6\n");
}

#[test]
fn loops_lists_and_labels() {
    let body = r#"    ArrayList<String> list = new ArrayList<>();
    list.add("a");
    list.add("b");
    for (String s : list) System.out.println(s + list.size());
    outer:
    for (int i = 0; i < 3; i++) {
      for (int j = 0; j < 3; j++) {
        if (j == 1) continue outer;
        if (i == 2) break outer;
        System.out.println("" + i + j);
      }
    }
    for (Color c : Color.values()) System.out.println(c + " " + c.ordinal());"#;
    let source = format!("{}enum Color {{ RED, GREEN }}\n", main_class(body));
    assert_eq!(run(&source), "a2\nb2\n00\n10\nRED 0\nGREEN 1\n");
}

#[test]
fn int_arithmetic_wraps() {
    let body = "    int big = Integer.MAX_VALUE;\n    System.out.println(big + 1);\n    System.out.println(7 / 2 + \" \" + 7 % -3 + \" \" + (-8 >> 1) + \" \" + (-8 >>> 28));";
    assert_eq!(run(&main_class(body)), "-2147483648\n3 1 -4 15\n");
}

#[test]
fn top_level_statements_form_a_main_program() {
    let exe = compile_source("Script.java", "int x = 2;\nSystem.out.println(x * 3);\n");
    assert!(!exe.has_errors(), "{:#?}", exe.all_diagnostics());
    assert!(exe.main.is_some_and(|m| !m.takes_args));
    assert_eq!(run_exe(exe), "6\n");
}

#[test]
fn classes_resolve_across_modules() {
    let files = vec![
        SourceFile::new(
            "Main.java",
            "public class Main { public static void main(String[] args) { System.out.println(Util.twice(21)); } }",
        ),
        SourceFile::new("Util.java", "class Util { static int twice(int x) { return x * 2; } }"),
    ];
    let exe = compile(modules_from_sources(files), &CompileOptions::default());
    assert!(!exe.has_errors(), "{:#?}", exe.all_diagnostics());
    assert_eq!(run_exe(exe), "42\n");
}

#[test]
fn test_methods_run_on_a_fresh_instance() {
    let source = r#"public class Main { }
class CalcTest {
  int seed = 4;
  @Test
  public void doubles() { System.out.println(seed * 2); }
  public void helper() { }
}
"#;
    let exe = build(source);
    let tests = exe.test_methods();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].class_name, "CalcTest");
    assert_eq!(tests[0].method_name, "doubles");

    let entry = exe.test("CalcTest", "doubles").unwrap();
    let out = SharedBuffer::new();
    let mut scheduler = Scheduler::new(exe, Box::new(out.clone()), SchedulerConfig::default());
    scheduler.init_test(&entry).unwrap();
    let summary = scheduler.run_to_completion(10_000).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Finished);
    assert_eq!(out.contents(), "8\n");
}

#[test]
fn breakpoint_on_blank_line_binds_to_next_step() {
    let source = "public class Main {\n  public static void main(String[] args) {\n    int a = 1;\n\n    // note\n    a = a + 1;\n    System.out.println(a);\n  }\n}\n";
    let mut exe = build(source);
    let bp = exe.set_breakpoint(ModuleId(0), 4).unwrap();
    assert_eq!(bp.range.start_line, 6);
    assert_eq!(exe.breakpoints().len(), 1);

    let out = SharedBuffer::new();
    let mut scheduler = Scheduler::new(exe, Box::new(out.clone()), SchedulerConfig::default());
    let main = scheduler.start_main().unwrap();
    let RunOutcome::Paused(at) = scheduler.run_to_completion(1_000).unwrap().outcome else {
        panic!("expected to stop at the breakpoint")
    };
    assert_eq!(at.range.start_line, 6);
    let top = &scheduler.call_stack(main)[0];
    assert_eq!(top.range, at.range);

    assert!(scheduler.executable_mut().clear_breakpoint(ModuleId(0), 4));
    scheduler.resume();
    assert_eq!(scheduler.run_to_completion(1_000).unwrap().outcome, RunOutcome::Finished);
    assert_eq!(out.contents(), "2\n");
}

#[test]
fn uncaught_exception_in_worker_leaves_main_running() {
    let body = r#"    Thread t = new Thread(() -> { int[] a = new int[1]; a[3] = 0; });
    t.start();
    Thread.sleep(10);
    System.out.println("main done");"#;
    let out = run(&main_class(body));
    assert!(out.starts_with("Exception in thread \"Thread-0\" ArrayIndexOutOfBoundsException: Index 3 out of bounds for length 1"), "{out}");
    assert!(out.ends_with("main done\n"), "{out}");
}

#[test]
fn navigation_finds_definition_and_usages_of_a_local() {
    let source = "public class Main {\n  public static void main(String[] args) {\n    int count = 1;\n    count = count + 2;\n    System.out.println(count);\n  }\n}\n";
    let exe = build(source);
    let use_site = Position::new(5, 24);

    let (module, definition) = exe.definition_at(ModuleId(0), use_site).unwrap();
    assert_eq!(module, ModuleId(0));
    assert_eq!(definition.start(), Position::new(3, 9));

    let usages = exe.find_usages(ModuleId(0), use_site);
    assert!(usages.iter().any(|(_, r)| r.start() == Position::new(4, 13)), "{usages:?}");
    assert!(usages.iter().any(|(_, r)| r.start() == use_site), "{usages:?}");

    let renames = exe.rename_ranges(ModuleId(0), Position::new(3, 10)).unwrap();
    assert_eq!(renames[0].1, definition);
    assert!(renames.len() >= 3, "{renames:?}");
    assert!(exe.definition_at(ModuleId(0), Position::new(5, 8)).is_none());
}

#[test]
fn enhanced_for_sees_list_element_type() {
    let body = r#"    ArrayList<Integer> values = new ArrayList<>();
    values.add(3);
    values.add(4);
    int sum = 0;
    for (int v : values) sum += v;
    List<Integer> view = values;
    System.out.println(sum + " " + view.get(1));"#;
    assert_eq!(run(&main_class(body)), "7 4\n");
}

fn error_codes(exe: &Executable) -> Vec<(String, u32)> {
    exe.all_diagnostics()
        .into_iter()
        .filter(|(_, d)| d.is_error())
        .map(|(_, d)| (d.id.clone().unwrap_or_default(), d.range.start_line))
        .collect()
}

#[test]
fn falling_off_a_value_method_is_a_missing_return() {
    let source = "public class Main {
  static int f(int x) { if (x > 0) return 1; }
  public static void main(String[] args) { }
}
";
    let exe = compile_source("Main.java", source);
    assert_eq!(error_codes(&exe), [("E0314".to_string(), 2)]);
    assert!(exe.main.is_none());
}

#[test]
fn returns_on_every_path_need_no_trailing_return() {
    let source = r#"public class Main {
  static int sign(int x) {
    if (x > 0) { return 1; } else if (x < 0) { return -1; } else { return 0; }
  }
  static int first(int[] xs) {
    while (true) {
      for (int x : xs) { return x; }
    }
  }
  static String name(int n) {
    switch (n) {
      case 1: return "one";
      default: throw new IllegalArgumentException("n");
    }
  }
  public static void main(String[] args) {
    System.out.println(sign(-4) + " " + first(new int[] { 9 }) + " " + name(1));
  }
}
"#;
    assert_eq!(run(source), "-1 9 one\n");
}

#[test]
fn reading_a_possibly_unassigned_local_is_an_error() {
    let source = main_class(
        "    int x;\n    if (args.length > 0) { x = 1; }\n    System.out.println(x);",
    );
    let exe = compile_source("Main.java", &source);
    assert_eq!(error_codes(&exe), [("E0315".to_string(), 5)]);
}

#[test]
fn locals_assigned_on_every_path_may_be_read() {
    let body = r#"    String label;
    int n = args.length;
    if (n > 0) { label = "some"; } else { label = "none"; }
    int code;
    switch (n) {
      case 0: code = 10; break;
      default: code = 20;
    }
    int parsed;
    try { parsed = Integer.parseInt("12"); } catch (NumberFormatException e) { parsed = -1; }
    System.out.println(label + " " + code + " " + parsed);"#;
    assert_eq!(run(&main_class(body)), "none 10 12\n");
}

#[test]
fn test_methods_follow_class_declaration_order() {
    let source = r#"public class Main { }
class ZetaTest {
  @Test
  public void last() { }
}
class AlphaTest {
  @Test
  public void second() { }
  @Test
  public void third() { }
}
"#;
    let exe = build(source);
    let order: Vec<(String, String)> = exe
        .test_methods()
        .into_iter()
        .map(|t| (t.class_name, t.method_name))
        .collect();
    assert_eq!(
        order,
        [
            ("ZetaTest".to_string(), "last".to_string()),
            ("AlphaTest".to_string(), "second".to_string()),
            ("AlphaTest".to_string(), "third".to_string()),
        ]
    );
}
