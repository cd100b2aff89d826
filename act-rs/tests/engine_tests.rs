//! End-to-end tests: scripts run through [`Engine`] against a
//! [`MemoryHost`] document or a plain object target.

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use act::config::Config;
use act::error::Error;
use act::host::HostObject;
use act::memory::MemoryHost;
use act::runtime::Engine;
use act::script::signal::SignalKind;
use act::script::value::{Dimension, Object, Value};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn block_on<F: Future>(f: F) -> F::Output {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    tokio::task::LocalSet::new().block_on(&rt, f)
}

fn setup() -> (Rc<MemoryHost>, Engine) {
    let host = Rc::new(MemoryHost::new());
    let engine = Engine::new(Config::default(), host.clone());
    (host, engine)
}

/// Run `code` against an empty object and return the result.
fn eval(code: &str) -> Value {
    let (_, engine) = setup();
    block_on(engine.run(object(), code)).unwrap_or_else(|e| panic!("{code}: {e}"))
}

fn object() -> Value {
    Value::object(Object::new())
}

fn num(n: f64) -> Value {
    Value::Number(n)
}

fn text(s: &str) -> Value {
    Value::from(s)
}

// ── Evaluation order ──────────────────────────────────────────────────────────

#[test]
fn operators_apply_left_to_right() {
    assert_eq!(eval("2 + 3 * 4"), num(20.0));
    assert_eq!(eval("10 - 4 - 3"), num(3.0));
    assert_eq!(eval("2 * 3 + 4"), num(10.0));
    assert_eq!(eval("2 + (3 * 4)"), num(14.0));
}

#[test]
fn assignment_is_just_another_operator() {
    // `$a = 1 + 2` assigns 1, then adds 2 to the result.
    assert_eq!(eval("$a = 1 + 2"), num(3.0));
    assert_eq!(eval("$a = 1 + 2; $a"), num(1.0));
    assert_eq!(eval("$a = (1 + 2); $a"), num(3.0));
}

#[test]
fn strict_and_loose_equality_differ() {
    assert_eq!(eval("1 == \"1\""), Value::Bool(true));
    assert_eq!(eval("1 is \"1\""), Value::Bool(false));
    assert_eq!(eval("1 is 1"), Value::Bool(true));
    assert_eq!(eval("1 != \"1\""), Value::Bool(false));
    assert_eq!(eval("1 is_not \"1\""), Value::Bool(true));
}

#[test]
fn and_or_short_circuit() {
    assert_eq!(eval("$x = 0; false and ($x = 1); $x"), num(0.0));
    assert_eq!(eval("$x = 0; true or ($x = 1); $x"), num(0.0));
    assert_eq!(eval("0 or \"fallback\""), text("fallback"));
}

#[test]
fn membership() {
    assert_eq!(eval("2 is_in [1, 2, 3]"), Value::Bool(true));
    assert_eq!(eval("\"b\" is_in [a: 1, b: 2]"), Value::Bool(true));
    assert_eq!(eval("\"z\" is_not_in \"abc\""), Value::Bool(true));
}

// ── Units ─────────────────────────────────────────────────────────────────────

#[test]
fn matching_units_are_preserved() {
    assert_eq!(eval("10px + 5px"), Value::Dimension(Dimension { number: 15.0, unit: "px".into() }));
    assert_eq!(eval("3em * 2em"), Value::Dimension(Dimension { number: 6.0, unit: "em".into() }));
}

#[test]
fn mismatched_units_fall_back_to_numbers() {
    assert_eq!(eval("10px + 5"), num(15.0));
    assert_eq!(eval("10px - 5em"), num(5.0));
}

// ── Sentences ─────────────────────────────────────────────────────────────────

#[test]
fn condition_takes_exactly_one_branch() {
    let cases = [
        ("0", false),
        ("1", true),
        ("\"\"", false),
        ("\"a\"", true),
        ("null", false),
        ("undefined", false),
        ("true", true),
        ("false", false),
        ("NaN", false),
    ];
    for (cond, truthy) in cases {
        let code = format!("$r = \"none\"; {cond} ? $r = \"yes\" else? $r = \"no\"; $r");
        let expected = if truthy { "yes" } else { "no" };
        assert_eq!(eval(&code), text(expected), "{cond}");
    }
}

#[test]
fn condition_without_branch_skips_one_sentence() {
    assert_eq!(eval("$n = 1; 0 ? $n = 2; $n += 10; $n"), num(11.0));
    assert_eq!(eval("$n = 1; 1 ? $n = 2; $n += 10; $n"), num(12.0));
}

#[test]
fn forward_rebinds_the_target() {
    let (host, engine) = setup();
    let out = host.element("p");
    out.set_attr("id", "out");
    host.body_element().append(&out);

    block_on(engine.run(host.body(), "#out >> @title = \"hello\"")).unwrap();
    assert_eq!(out.attr("title").as_deref(), Some("hello"));
}

#[test]
fn explicit_sentence_target() {
    let (host, engine) = setup();
    let out = host.element("div");
    out.set_attr("id", "out");
    host.body_element().append(&out);

    block_on(engine.run(host.body(), "#out @role = \"main\"")).unwrap();
    assert_eq!(out.attr("role").as_deref(), Some("main"));
    assert_eq!(host.body_element().attr("role"), None);
}

#[test]
fn async_sentence_does_not_block_the_scope() {
    let (_, engine) = setup();
    let target = object();
    block_on(async {
        let code = ":order = \"\"; (wait(20ms); :order += \"a\") & :order += \"b\"; :order";
        let result = engine.run(target.clone(), code).await.unwrap();
        assert_eq!(result, text("b"));
        assert_eq!(target.get_member("order"), text("b"));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(target.get_member("order"), text("ba"));
    });
}

// ── Signals ───────────────────────────────────────────────────────────────────

#[test]
fn break_yields_its_payload_from_the_nearest_loop() {
    assert_eq!(eval("loop (break 5)"), num(5.0));
    assert_eq!(eval("for $i to 10 (if $i is 3 (break $i))"), num(3.0));
}

#[test]
fn break_leaves_only_the_inner_loop() {
    assert_eq!(eval("$count = 0; for $i from 1 to 3 (loop (break); $count += 1); $count"), num(3.0));
}

#[test]
fn continue_skips_to_the_next_iteration() {
    assert_eq!(eval("$s = 0; for $i from 1 to 4 (if $i is 2 (continue); $s += $i); $s"), num(8.0));
}

#[test]
fn break_outside_a_loop_is_unhandled() {
    let (_, engine) = setup();
    let err = block_on(engine.run(object(), "1; break 2")).unwrap_err();
    assert!(matches!(err, Error::UnhandledSignal(SignalKind::Break)), "{err}");

    let err = block_on(engine.run(object(), "def f (break); run f")).unwrap_err();
    assert!(matches!(err, Error::UnhandledSignal(SignalKind::Break)), "{err}");
}

#[test]
fn repeat_restarts_the_scope_keeping_its_data() {
    assert_eq!(eval("$n = 0; ($n += 1; $n < 3 ? repeat); $n"), num(3.0));
}

#[test]
fn restart_is_only_caught_at_the_root() {
    let (_, engine) = setup();
    let target = object();
    target.set_member("n", num(0.0)).unwrap();
    // The nested scope passes `restart` up; the root runs again from the
    // top, so the first sentence counts every pass.
    let result = block_on(engine.run(target.clone(), ":n += 1; (:n < 3 ? restart); :n")).unwrap();
    assert_eq!(result, num(3.0));
}

#[test]
fn stop_ends_the_scope_with_its_payload() {
    assert_eq!(eval("$x = (1; stop 2; 3); $x"), num(2.0));
    assert_eq!(eval("stop \"done\"; 1"), text("done"));
}

#[test]
fn return_ends_a_block() {
    assert_eq!(eval("def add $a $b (return $a + $b; 0); run add 2 3"), num(5.0));
}

#[test]
fn recursive_runs_keep_their_own_parameters() {
    let code = "def fact $n (if $n < 2 (return 1); return (run fact ($n - 1)) * $n); run fact 4";
    assert_eq!(eval(code), num(24.0));
}

#[test]
fn run_blocks_see_the_caller_scope() {
    assert_eq!(eval("$base = 10; def add_base $x (return $x + $base); run add_base 5"), num(15.0));
    assert_eq!(eval("def outer $v (run inner); def inner (return $v * 2); run outer 4"), num(8.0));
}

#[test]
fn oversized_arrays_are_runtime_errors() {
    let (_, engine) = setup();
    let err = block_on(engine.run(object(), "$a = []; $a.length = 100000000000000000000; 1")).unwrap_err();
    assert!(matches!(err, Error::Runtime(_)), "{err}");
    let err = block_on(engine.run(object(), "$a = []; $a[4294967295] = 1; 1")).unwrap_err();
    assert!(err.to_string().contains("Invalid array length"), "{err}");
    assert_eq!(eval("$a = []; $a[2] = 1; $a.length"), num(3.0));
}

#[test]
fn rescue_catches_errors_but_not_signals() {
    assert_eq!(eval("(throw \"boom\") rescue ($exception.message)"), text("boom"));
    assert_eq!(eval("(1) rescue (2)"), num(1.0));
    assert_eq!(eval("loop ((break 7) rescue (8))"), num(7.0));
}

#[test]
fn runtime_errors_carry_a_trace() {
    let (host, engine) = setup();
    let err = block_on(engine.run(host.body(), "1;\n(no_such_function!)")).unwrap_err();
    let Error::Runtime(e) = err else { panic!("expected a runtime error, got {err}") };
    assert!(e.message.contains("no_such_function"), "{}", e.message);
    assert_eq!(e.trace.len(), 2);
    assert_eq!(e.trace[0].span.line, 2);
    assert!(e.report().contains("at line 2"));
}

// ── Settable results ──────────────────────────────────────────────────────────

#[test]
fn property_round_trip() {
    let (_, engine) = setup();
    let target = object();
    let v = block_on(engine.run(target.clone(), ":font_size = 12px; :font_size")).unwrap();
    assert_eq!(v, Value::Dimension(Dimension { number: 12.0, unit: "px".into() }));
    // Undefined snake_case keys are written in camel case.
    assert_eq!(target.get_member("fontSize").to_string(), "12px");
    assert_eq!(target.get_member("font_size"), Value::Undefined);
}

#[test]
fn attribute_round_trip_stringifies() {
    let (host, engine) = setup();
    let v = block_on(engine.run(host.body(), "@data-count = 5; @data-count")).unwrap();
    assert_eq!(v, text("5"));
    assert_eq!(host.body_element().attr("data-count").as_deref(), Some("5"));
}

#[test]
fn css_round_trip_joins_with_spaces() {
    let (host, engine) = setup();
    let v = block_on(engine.run(host.body(), "*margin: 1px 2px; *margin")).unwrap();
    assert_eq!(v, text("1px 2px"));

    let v = block_on(engine.run(host.body(), "*color = \"red\"; *color")).unwrap();
    assert_eq!(v, text("red"));
}

#[test]
fn unsettable_left_side_writes_to_the_target() {
    let (_, engine) = setup();
    let target = object();
    block_on(engine.run(target.clone(), "\"background_color\" = \"blue\"")).unwrap();
    assert_eq!(target.get_member("backgroundColor"), text("blue"));
}

// ── Variables ─────────────────────────────────────────────────────────────────

#[test]
fn capitalised_variables_are_engine_globals() {
    let (_, engine) = setup();
    block_on(engine.run(object(), "$Counter = 5")).unwrap();
    assert_eq!(block_on(engine.run(object(), "$Counter + 1")).unwrap(), num(6.0));
    assert_eq!(engine.globals().get_member("Counter"), num(5.0));
}

#[test]
fn local_variables_live_on_the_binding() {
    let (_, engine) = setup();
    let target = object();
    block_on(engine.run(target.clone(), "local count = 3")).unwrap();
    assert_eq!(block_on(engine.run(target.clone(), "$count * 2")).unwrap(), num(6.0));
    assert_eq!(block_on(engine.run(object(), "$count")).unwrap(), Value::Undefined);
}

#[test]
fn inner_scopes_see_outer_variables() {
    assert_eq!(eval("$x = 1; ($x += 1; ($x += 1)); $x"), num(3.0));
}

// ── Keywords & functions ──────────────────────────────────────────────────────

#[test]
fn each_forms() {
    assert_eq!(eval("$sum = 0; each $x in [1, 2, 3] ($sum += $x); $sum"), num(6.0));
    assert_eq!(eval("$keys = \"\"; each $k $v in [a: 1, b: 2] ($keys += ($k + $v)); $keys"), text("a1b2"));
}

#[test]
fn while_and_if() {
    assert_eq!(eval("$n = 0; while $n < 5 ($n += 2); $n"), num(6.0));
    assert_eq!(eval("if 0 (1) else (2)"), num(2.0));
    assert_eq!(eval("if 1 (1) else (2)"), num(1.0));
}

#[test]
fn for_counts_down_and_rejects_bad_steps() {
    assert_eq!(eval("$s = \"\"; for $i from 3 to 1 ($s += $i); $s"), text("321"));
    let (_, engine) = setup();
    assert!(block_on(engine.run(object(), "for $i from 1 to 3 step -1 (1)")).is_err());
}

#[test]
fn script_functions() {
    assert_eq!(eval("$f = -> $x ($x * 2); $f(21)"), num(42.0));
    assert_eq!(eval("$f = -> $first ...$rest ($rest.length); $f(1, 2, 3)"), num(2.0));
    assert_eq!(eval("$o = [n: 2, double: -> ($this.n * 2)]; $o.double!"), num(4.0));
}

#[test]
fn templates_interpolate() {
    assert_eq!(eval("$name = \"act\"; `hi {$name}!`"), text("hi act!"));
    assert_eq!(eval("`sum: {1 + 2}`"), text("sum: 3"));
    assert_eq!(eval("`plain`"), text("plain"));
}

#[test]
fn casts() {
    assert_eq!(eval("\"12.5px\" as float"), num(12.5));
    assert_eq!(eval("\"42abc\" as int"), num(42.0));
    assert_eq!(eval("\"x\" as number"), num(0.0));
    assert_eq!(eval("[a: 1] as json"), text("{\"a\":1}"));
    assert_eq!(eval("0 as boolean"), Value::Bool(false));
    assert_eq!(eval("\"1\" as nonsense"), Value::Undefined);
}

#[test]
fn type_tests() {
    assert_eq!(eval("5 is_a number"), Value::Bool(true));
    assert_eq!(eval("5 is_an int"), Value::Bool(true));
    assert_eq!(eval("\"5\" is_a number"), Value::Bool(false));
}

#[test]
fn prefixes() {
    assert_eq!(eval("not 0"), Value::Bool(true));
    assert_eq!(eval("negative 3px"), Value::Dimension(Dimension { number: -3.0, unit: "px".into() }));
    assert_eq!(eval("type 1"), text("Number"));
}

#[test]
fn variables_remember_where_their_value_came_from() {
    assert_eq!(eval("$size = 12px; type $size"), text("Dimension"));
    assert_eq!(eval("$size = 12px; $copy = $size; type $copy"), text("Dimension"));
    assert_eq!(eval("$n = 12; type $n"), text("Variable"));
    assert_eq!(eval("$size = 12px; $size = 3; type $size"), text("Variable"));
}

#[test]
fn id_held_in_a_variable_is_looked_up_live() {
    let (host, engine) = setup();
    let el = host.element("div");
    el.set_attr("id", "box");
    host.body_element().append(&el);

    let found = block_on(engine.run(host.body(), "$el = #box; type $el")).unwrap();
    assert_eq!(found, text("Id"));

    // Renaming the element is seen through the variable.
    let code = "$el = #box; #box @id = \"gone\"; $el";
    let after = block_on(engine.run(host.body(), code)).unwrap();
    assert!(after.is_nullish(), "{after:?}");
    assert_eq!(el.attr("id").as_deref(), Some("gone"));

    // Assigning again writes the variable, not the element.
    let code = "$el = #gone; $el = 5; $el";
    assert_eq!(block_on(engine.run(host.body(), code)).unwrap(), num(5.0));
    assert_eq!(el.attr("id").as_deref(), Some("gone"));
}

// ── Documents ─────────────────────────────────────────────────────────────────

#[test]
fn selectors_query_the_document() {
    let (host, engine) = setup();
    for _ in 0..3 {
        let li = host.element("li");
        host.body_element().append(&li);
    }
    let v = block_on(engine.run(host.body(), "$n = 0; each $li in <li> ($n += 1); $n")).unwrap();
    assert_eq!(v, num(3.0));
}

#[test]
fn insert_replaces_content() {
    let (host, engine) = setup();
    let out = host.element("div");
    out.set_attr("id", "out");
    host.body_element().append(&out);

    block_on(engine.run(host.body(), "#out << \"hello\"")).unwrap();
    assert_eq!(out.inner_html().as_deref(), Some("hello"));

    assert_eq!(eval("$a = [1]; $a << 2; $a.length"), num(2.0));
}

#[test]
fn with_and_new() {
    let (host, engine) = setup();
    let v = block_on(engine.run(host.body(), "$el = new <span>; with $el (@role = \"note\"); $el @role")).unwrap();
    assert_eq!(v, text("note"));
}

// ── Library ───────────────────────────────────────────────────────────────────

#[test]
fn library_functions() {
    assert_eq!(eval("time_to_ms(\"2s\")"), num(2000.0));
    assert_eq!(eval("time_to_ms(150)"), num(150.0));
    let n = eval("random(5, 10)").to_number();
    assert!((5.0..=10.0).contains(&n), "{n}");
}

#[test]
fn log_goes_to_the_host() {
    let (host, engine) = setup();
    block_on(engine.run(object(), "log: \"a\" 1")).unwrap();
    assert_eq!(host.logs(), vec!["a 1".to_owned()]);
}

#[test]
fn delay_debounces_repeated_calls() {
    let (_, engine) = setup();
    let target = object();
    target.set_member("hits", num(0.0)).unwrap();
    block_on(async {
        engine
            .run(target.clone(), "for $i from 1 to 3 (delay: 20ms (:hits += 1) &)")
            .await
            .unwrap();
        assert_eq!(target.get_member("hits"), num(0.0));
        tokio::time::sleep(Duration::from_millis(100)).await;
    });
    assert_eq!(target.get_member("hits"), num(1.0));
}

// ── Events ────────────────────────────────────────────────────────────────────

#[test]
fn handlers_see_the_event() {
    let (host, engine) = setup();
    let target = host.body();
    block_on(engine.run(target.clone(), "on greet ($event.name)")).unwrap();

    let mut event = Object::new();
    event.insert("name".into(), text("bob"));
    let v = block_on(engine.dispatch(&target, "greet", Value::object(event))).unwrap();
    assert_eq!(v, Some(text("bob")));
    assert_eq!(block_on(engine.dispatch(&target, "other", Value::Null)).unwrap(), None);
}

#[test]
fn off_removes_a_handler() {
    let (_, engine) = setup();
    let target = object();
    block_on(engine.run(target.clone(), "on ping (1)")).unwrap();
    assert_eq!(block_on(engine.run(target.clone(), "listens_to(\"ping\")")).unwrap(), Value::Bool(true));
    assert_eq!(block_on(engine.run(target.clone(), "off ping")).unwrap(), Value::Bool(true));
    assert_eq!(block_on(engine.dispatch(&target, "ping", Value::Null)).unwrap(), None);
}

#[test]
fn failing_handler_is_contained() {
    let (_, engine) = setup();
    let target = object();
    block_on(engine.run(target.clone(), "on boom (throw \"bad\")")).unwrap();
    assert_eq!(block_on(engine.dispatch(&target, "boom", Value::Null)).unwrap(), None);
}

// ── Syntax errors ─────────────────────────────────────────────────────────────

#[test]
fn syntax_errors_abort_the_run() {
    let (_, engine) = setup();
    let target = object();
    let err = block_on(engine.run(target.clone(), ":x = 1; [1, 2")).unwrap_err();
    assert!(matches!(err, Error::Syntax(_)), "{err}");
    assert_eq!(target.get_member("x"), Value::Undefined);
}
