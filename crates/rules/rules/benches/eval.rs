use std::collections::HashMap;
use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use warden_rules::{
    KeySelector, OperatorOptions, Phase, Registry, Rule, RuleAction, RuleMetadata, RuleOperator,
    RuleTransformation, Variable, VariableName, Waf, WafBuilder,
};

fn operator(registry: &Registry, name: &str, argument: &str) -> RuleOperator {
    let datasets = HashMap::new();
    RuleOperator {
        name: name.into(),
        argument: argument.into(),
        negated: false,
        instance: registry
            .operator(
                name,
                OperatorOptions {
                    argument,
                    datasets: &datasets,
                },
            )
            .unwrap(),
    }
}

fn action(registry: &Registry, name: &str, argument: Option<&str>) -> RuleAction {
    RuleAction {
        name: name.into(),
        argument: argument.map(Into::into),
        instance: registry.action(name, argument).unwrap(),
    }
}

/// `rules` SQLi-style regex rules over ARGS, followed by a blocking chain.
fn build_waf(rules: u64) -> Arc<Waf> {
    let registry = Arc::new(Registry::with_builtins());
    let mut builder = WafBuilder::with_registry(Arc::clone(&registry));
    let lowercase = RuleTransformation {
        name: "lowercase".into(),
        instance: registry.transformation("lowercase").unwrap(),
    };
    for id in 1..=rules {
        let rule = Rule::new(RuleMetadata {
            id,
            phase: Phase::RequestBody,
            ..RuleMetadata::default()
        })
        .with_variables(vec![Variable::new(VariableName::Args)])
        .with_operator(operator(&registry, "rx", &format!(r"union\s+select\s+{id}\b")))
        .with_transformation(lowercase.clone())
        .with_action(action(&registry, "setvar", Some("tx.score=+1")));
        builder.add_rule(rule).unwrap();
    }

    let head = Rule::new(RuleMetadata {
        id: rules + 1,
        phase: Phase::RequestBody,
        has_chain: true,
        ..RuleMetadata::default()
    })
    .with_variables(vec![
        Variable::new(VariableName::RequestHeaders).with_key(KeySelector::parse("user-agent").unwrap()),
    ])
    .with_operator(operator(&registry, "pm", "sqlmap nikto"))
    .with_action(action(&registry, "deny", None));
    let link = Rule::new(RuleMetadata::default())
        .with_variables(vec![Variable::new(VariableName::RequestMethod)])
        .with_operator(operator(&registry, "streq", "POST"));
    builder
        .add_rule(Rule::link_chain(vec![head, link]).unwrap())
        .unwrap();
    builder.build()
}

fn run(waf: &Arc<Waf>, agent: &str) -> bool {
    let mut tx = waf.new_transaction();
    tx.process_uri("/search?q=hello+world&page=2&sort=desc", "POST", "HTTP/1.1");
    tx.add_request_header("User-Agent", agent);
    tx.add_request_header("Host", "example.com");
    let interrupted = tx.process_request_headers().is_some() || tx.process_request_body().is_some();
    tx.process_logging();
    interrupted
}

fn bench_transactions(c: &mut Criterion) {
    let mut group = c.benchmark_group("transaction");
    for size in [10, 100, 500] {
        let waf = build_waf(size);
        group.bench_function(format!("clean_{size}_rules"), |b| {
            b.iter(|| run(black_box(&waf), "Mozilla/5.0"));
        });
        group.bench_function(format!("blocked_{size}_rules"), |b| {
            b.iter(|| run(black_box(&waf), "sqlmap/1.7"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_transactions);
criterion_main!(benches);
