use std::rc::Rc;

use proptest::prelude::*;

use act::config::Config;
use act::host::NullHost;
use act::runtime::Engine;
use act::script::parser::parse;
use act::script::value::{Object, Value};

fn eval(code: &str) -> Value {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let engine = Engine::new(Config::default(), Rc::new(NullHost));
    tokio::task::LocalSet::new()
        .block_on(&rt, engine.run(Value::object(Object::new()), code))
        .unwrap_or_else(|e| panic!("{code}: {e}"))
}

fn apply(op: &str, a: f64, b: f64) -> f64 {
    match op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        _ => unreachable!("{op}"),
    }
}

proptest! {
    /// The parser returns Ok or Err for any input; it never panics.
    #[test]
    fn parser_does_not_panic(s in "\\PC*") {
        let _ = parse(&s, &Config::default());
    }

    /// Operators chain left to right whatever they are.
    #[test]
    fn operators_associate_left(
        a in 0u8..50,
        b in 0u8..50,
        c in 0u8..50,
        op1 in prop::sample::select(vec!["+", "-", "*"]),
        op2 in prop::sample::select(vec!["+", "-", "*"]),
    ) {
        let code = format!("{a} {op1} {b} {op2} {c}");
        let expected = apply(op2, apply(op1, a.into(), b.into()), c.into());
        prop_assert_eq!(eval(&code), Value::Number(expected));
    }

    /// `cond ? then else? other` runs exactly one side, chosen by truthiness.
    #[test]
    fn exactly_one_branch_runs(
        (cond, truthy) in prop::sample::select(vec![
            ("0", false),
            ("1", true),
            ("-2.5", true),
            ("\"\"", false),
            ("\"0\"", true),
            ("null", false),
            ("undefined", false),
            ("true", true),
            ("false", false),
            ("[]", true),
        ]),
    ) {
        let code = format!(":yes = 0; :no = 0; {cond} ? :yes += 1 else? :no += 1; [:yes, :no]");
        let result = eval(&code);
        prop_assert_eq!(result.get_member("0"), Value::Number(if truthy { 1.0 } else { 0.0 }));
        prop_assert_eq!(result.get_member("1"), Value::Number(if truthy { 0.0 } else { 1.0 }));
    }
}
