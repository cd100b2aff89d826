use criterion::{black_box, criterion_group, criterion_main, Criterion};

use act::config::Config;
use act::script::lexer::Lexer;
use act::script::parser::parse;

const SAMPLE: &str = r#"
def greet($name) (
    return `Hello {$name}, you have {:count} new messages`
)
:count = 0
each $item in <li.message> (
    $item.unread ? :count += 1
    #status >> @title = (greet! "reader")
)
for $i from 1 to 10 (
    $i % 2 == 0 ? continue
    :odd += $i
) rescue (log: $exception.message)
<button> >> on: "click" (delay: 200ms (*background_color = "red") &)
"#;

fn make_script(repeats: usize) -> String {
    SAMPLE.repeat(repeats)
}

fn lex_all(code: &str) -> usize {
    let Ok(mut lexer) = Lexer::new(code) else {
        return 0;
    };
    let mut n = 0;
    while lexer.has_more_tokens() {
        lexer.next();
        n += 1;
    }
    n
}

fn bench_parse(c: &mut Criterion) {
    let config = Config::default();
    let small = make_script(1);
    let med = make_script(20);
    let large = make_script(200);

    let mut g = c.benchmark_group("parse");

    g.bench_function("lex_small", |b| b.iter(|| lex_all(black_box(&small))));
    g.bench_function("parse_small", |b| b.iter(|| parse(black_box(&small), &config)));

    g.bench_function("lex_med", |b| b.iter(|| lex_all(black_box(&med))));
    g.bench_function("parse_med", |b| b.iter(|| parse(black_box(&med), &config)));

    g.bench_function("lex_large", |b| b.iter(|| lex_all(black_box(&large))));
    g.bench_function("parse_large", |b| b.iter(|| parse(black_box(&large), &config)));

    g.finish();
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
