use std::collections::HashSet;
use std::sync::Arc;

use warden_rules::engine::AllowScope;
use warden_rules::{
    Action, ActionKind, Interruption, Registry, RuleMetadata, Transaction, TransactionState,
    VariableName, Waf, WafBuilder,
};
use warden_seclang::Parser;

fn load(source: &str) -> Arc<Waf> {
    let mut builder = WafBuilder::new();
    Parser::new(&mut builder).parse_string(source).unwrap();
    builder.build()
}

fn request(waf: &Arc<Waf>, uri: &str) -> Transaction {
    let mut tx = waf.new_transaction();
    tx.process_connection("10.0.0.1", 51000, "10.0.0.2", 443);
    tx.process_uri(uri, "GET", "HTTP/1.1");
    tx.add_request_header("Host", "example.com");
    tx
}

fn ids(tx: &Transaction) -> Vec<u64> {
    tx.matched_rules().iter().map(|m| m.rule_id).collect()
}

#[test]
fn block_interrupts_and_records_one_match() {
    let waf = load(
        r#"
SecRule ARGS "@rx 123" "id:1,block,log,phase:2"
SecRule ARGS "@rx abc" "id:2,block,log,phase:2"
"#,
    );
    let mut tx = request(&waf, "/search?q=123");
    assert!(tx.process_request_headers().is_none());
    let interruption = tx.process_request_body().unwrap();
    tx.process_logging();

    assert_eq!(ids(&tx), vec![1]);
    assert_eq!(interruption.action, "block");
    assert_eq!(interruption.rule_id, 1);
    assert_eq!(interruption.status, 403);
    let record = &tx.matched_rules()[0];
    assert_eq!(record.disruptive.as_deref(), Some("block"));
    assert_eq!(record.data[0].target(), "ARGS:q");
    assert_eq!(record.data[0].value, "123");
}

#[test]
fn secaction_deny_in_request_headers() {
    let waf = load(r#"SecAction "id:1,phase:1,deny,status:401""#);
    let mut tx = request(&waf, "/");
    let interruption = tx.process_request_headers().unwrap();
    assert_eq!(interruption, Interruption::new(1, "deny", 401));
    assert!(!tx.continues_evaluation());
}

#[test]
fn chain_matches_all_or_nothing() {
    let waf = load(
        r#"
SecRule REQUEST_URI "@beginsWith /admin" "id:10,phase:1,deny,chain"
    SecRule REQUEST_METHOD "@streq POST" "chain"
    SecRule REQUEST_HEADERS:X-Debug "@streq 1"
"#,
    );

    let mut partial = waf.new_transaction();
    partial.process_uri("/admin/users", "POST", "HTTP/1.1");
    partial.add_request_header("X-Debug", "0");
    assert!(partial.process_request_headers().is_none());
    assert!(partial.matched_rules().is_empty());

    let mut full = waf.new_transaction();
    full.process_uri("/admin/users", "POST", "HTTP/1.1");
    full.add_request_header("x-debug", "1");
    let interruption = full.process_request_headers().unwrap();
    assert_eq!(interruption.rule_id, 10);
    assert_eq!(ids(&full), vec![10]);
    let targets: Vec<String> = full.matched_rules()[0].data.iter().map(|d| d.target()).collect();
    assert_eq!(targets, vec!["REQUEST_URI", "REQUEST_METHOD", "REQUEST_HEADERS:x-debug"]);
}

#[test]
fn failed_chain_runs_no_actions_of_any_link() {
    let waf = load(
        r#"
SecRule ARGS:a "@rx (secret)" "id:30,phase:1,capture,pass,log,chain,setvar:tx.hit=1"
    SecRule ARGS:b "@streq nope"
SecRule TX:0 "@streq secret" "id:31,phase:1,deny"
"#,
    );

    let mut tx = request(&waf, "/?a=secret&b=x");
    assert!(tx.process_request_headers().is_none());
    tx.process_logging();
    assert!(tx.matched_rules().is_empty());
    assert_eq!(tx.state().tx_value("0"), None);
    assert_eq!(tx.state().tx_value("1"), None);
    assert_eq!(tx.state().tx_value("hit"), None);
    assert!(tx.state().values(VariableName::MatchedVar).is_empty());
    assert!(tx.state().values(VariableName::MatchedVarName).is_empty());

    let mut tx = request(&waf, "/?a=secret&b=nope");
    let interruption = tx.process_request_headers().unwrap();
    assert_eq!(interruption.rule_id, 31);
    assert_eq!(ids(&tx), vec![30, 31]);
    assert_eq!(tx.state().tx_value("hit"), Some("1"));
    assert_eq!(tx.state().tx_value("1"), Some("secret"));
}

#[test]
fn numeric_rule_sees_past_non_numeric_arguments() {
    let waf = load(r#"SecRule ARGS "@gt 5" "id:1,phase:1,deny""#);

    let mut tx = request(&waf, "/?a=x&b=10");
    let interruption = tx.process_request_headers().unwrap();
    assert_eq!(interruption, Interruption::new(1, "deny", 403));
    assert_eq!(tx.matched_rules()[0].data[0].target(), "ARGS:b");

    let mut tx = request(&waf, "/?a=x&b=3");
    assert!(tx.process_request_headers().is_none());
}

#[test]
fn disruptive_action_of_a_link_uses_head_id() {
    let waf = load(
        r#"
SecRule ARGS:a "@streq 1" "id:20,phase:1,chain,status:409"
    SecRule ARGS:b "@streq 2" "deny"
"#,
    );
    let mut tx = request(&waf, "/?a=1&b=2");
    let interruption = tx.process_request_headers().unwrap();
    assert_eq!(interruption.rule_id, 20);
    assert_eq!(interruption.status, 409);
}

#[test]
fn interruption_stops_later_phases_but_not_logging() {
    let waf = load(
        r#"
SecRule ARGS:q "@contains evil" "id:1,phase:1,deny"
SecAction "id:2,phase:1,pass,log"
SecAction "id:3,phase:2,pass,log"
SecAction "id:4,phase:5,pass,log"
SecAction "id:5,phase:5,deny"
"#,
    );
    let mut tx = request(&waf, "/?q=evil");
    let first = tx.process_request_headers().unwrap();
    assert_eq!(tx.process_request_body(), Some(first.clone()));
    assert_eq!(tx.process_response_headers(), Some(first.clone()));
    assert_eq!(tx.process_response_body(), Some(first.clone()));
    tx.process_logging();

    assert_eq!(ids(&tx), vec![1, 4, 5]);
    assert_eq!(tx.interruption(), Some(&first));
}

#[test]
fn detection_only_records_without_interrupting() {
    let waf = load(
        r#"
SecRuleEngine DetectionOnly
SecRule ARGS "@rx attack" "id:1,phase:1,deny,log"
SecAction "id:2,phase:1,pass"
"#,
    );
    let mut tx = request(&waf, "/?x=attack");
    assert!(tx.process_request_headers().is_none());
    assert!(tx.continues_evaluation());
    assert_eq!(ids(&tx), vec![1, 2]);
    assert_eq!(tx.matched_rules()[0].disruptive.as_deref(), Some("deny"));
}

#[test]
fn engine_off_evaluates_nothing() {
    let waf = load("SecRuleEngine Off\nSecAction \"id:1,phase:1,deny\"");
    let mut tx = request(&waf, "/");
    assert!(tx.process_request_headers().is_none());
    tx.process_logging();
    assert!(tx.matched_rules().is_empty());
}

#[test]
fn allow_skips_remaining_rules() {
    let waf = load(
        r#"
SecRule REMOTE_ADDR "@streq 10.0.0.1" "id:1,phase:1,allow"
SecAction "id:2,phase:1,deny"
SecAction "id:3,phase:2,deny"
SecAction "id:4,phase:5,pass"
"#,
    );
    let mut tx = request(&waf, "/");
    assert!(tx.process_request_headers().is_none());
    assert!(tx.process_request_body().is_none());
    tx.process_logging();
    assert_eq!(ids(&tx), vec![1, 4]);
    assert_eq!(tx.state().allow_scope(), Some(AllowScope::Transaction));
}

#[test]
fn allow_phase_only_skips_current_phase() {
    let waf = load(
        r#"
SecAction "id:1,phase:1,allow:phase"
SecAction "id:2,phase:1,deny"
SecAction "id:3,phase:2,deny"
"#,
    );
    let mut tx = request(&waf, "/");
    assert!(tx.process_request_headers().is_none());
    let interruption = tx.process_request_body().unwrap();
    assert_eq!(interruption.rule_id, 3);
}

#[test]
fn capture_and_macros() {
    let waf = load(
        r#"
SecRule ARGS:user "@rx ^(\w+)@(\w+)\.com$" "id:1,phase:1,pass,capture,log,\
    setvar:tx.domain=%{TX.2},msg:'login from %{TX.1} via %{MATCHED_VAR_NAME}'"
SecRule TX:domain "@streq example" "id:2,phase:1,deny,msg:'domain %{tx.domain} blocked'"
"#,
    );
    let mut tx = request(&waf, "/login?user=alice@example.com");
    let interruption = tx.process_request_headers().unwrap();
    assert_eq!(interruption.rule_id, 2);

    let state = tx.state();
    assert_eq!(state.tx_value("0"), Some("alice@example.com"));
    assert_eq!(state.tx_value("1"), Some("alice"));
    assert_eq!(state.tx_value("domain"), Some("example"));
    let messages: Vec<Option<&str>> =
        tx.matched_rules().iter().map(|m| m.message.as_deref()).collect();
    assert_eq!(
        messages,
        vec![Some("login from alice via ARGS:user"), Some("domain example blocked")]
    );
}

#[test]
fn anomaly_scoring_with_setvar() {
    let waf = load(
        r#"
SecRule ARGS "@contains select" "id:1,phase:2,pass,t:lowercase,setvar:tx.score=+3"
SecRule ARGS "@contains union" "id:2,phase:2,pass,t:lowercase,setvar:tx.score=+3"
SecRule TX:score "@ge 5" "id:3,phase:2,deny,status:406,msg:'score %{TX.score}'"
"#,
    );
    let mut tx = request(&waf, "/?q=UNION+SELECT+1");
    let interruption = tx.process_request_body().unwrap();
    assert_eq!(interruption, Interruption::new(3, "deny", 406));
    assert_eq!(tx.matched_rules()[2].message.as_deref(), Some("score 6"));

    let mut clean = request(&waf, "/?q=selection");
    assert!(clean.process_request_body().is_none());
    assert_eq!(clean.state().tx_value("score"), Some("3"));
}

#[test]
fn redirect_carries_expanded_location() {
    let waf = load(
        r#"SecRule REQUEST_FILENAME "@streq /old" "id:1,phase:1,redirect:'https://example.com/new?from=%{REQUEST_FILENAME}'""#,
    );
    let mut tx = request(&waf, "/old");
    let interruption = tx.process_request_headers().unwrap();
    assert_eq!(interruption.action, "redirect");
    assert_eq!(interruption.status, 302);
    assert_eq!(
        interruption.data.as_deref(),
        Some("https://example.com/new?from=/old")
    );
}

#[test]
fn dataset_backed_phrase_match() {
    let waf = load(
        "SecDataset scanners `\nsqlmap\nNikto\n`\n\
         SecRule REQUEST_HEADERS:User-Agent \"@pmFromDataset scanners\" \"id:1,phase:1,deny\"",
    );
    let mut tx = waf.new_transaction();
    tx.add_request_header("User-Agent", "Mozilla/5.0 nikto/2.1");
    assert_eq!(tx.process_request_headers().unwrap().rule_id, 1);

    let mut tx = waf.new_transaction();
    tx.add_request_header("User-Agent", "curl/8.0");
    assert!(tx.process_request_headers().is_none());
}

#[test]
fn request_body_respects_access_and_limit() {
    let waf = load(
        r#"
SecRequestBodyAccess On
SecRequestBodyLimit 16
SecRule ARGS_POST:cmd "@streq rm" "id:1,phase:2,deny"
SecRule REQUEST_BODY "@contains tail" "id:2,phase:2,deny"
"#,
    );
    let mut tx = waf.new_transaction();
    tx.add_request_header("Content-Type", "application/x-www-form-urlencoded");
    assert_eq!(tx.write_request_body(b"cmd=rm"), 6);
    assert_eq!(tx.process_request_body().unwrap().rule_id, 1);

    let mut tx = waf.new_transaction();
    assert_eq!(tx.write_request_body(b"0123456789abcdef-tail"), 16);
    assert!(tx.process_request_body().is_none());

    let closed = load("SecRule REQUEST_BODY \"@contains x\" \"id:1,phase:2,deny\"");
    let mut tx = closed.new_transaction();
    assert_eq!(tx.write_request_body(b"xxx"), 0);
    assert!(tx.process_request_body().is_none());
}

#[test]
fn variable_exclusions_and_counts() {
    let waf = load(
        r#"
SecRule ARGS|!ARGS:token "@rx ^[0-9a-f]{32}$" "id:1,phase:1,deny"
SecRule &ARGS "@gt 3" "id:2,phase:1,deny,status:400"
"#,
    );
    let mut tx = request(&waf, "/?token=0123456789abcdef0123456789abcdef");
    assert!(tx.process_request_headers().is_none());

    let mut tx = request(&waf, "/?a=1&b=2&c=3&d=4");
    let interruption = tx.process_request_headers().unwrap();
    assert_eq!((interruption.rule_id, interruption.status), (2, 400));
}

#[test]
fn negated_operator_on_missing_value_does_not_match() {
    let waf = load(r#"SecRule REQUEST_HEADERS:X-Api-Key "!@streq secret" "id:1,phase:1,deny""#);
    let mut tx = request(&waf, "/");
    assert!(tx.process_request_headers().is_none());

    let mut tx = request(&waf, "/");
    tx.add_request_header("X-Api-Key", "guess");
    assert!(tx.process_request_headers().is_some());
}

#[derive(Debug)]
struct Teapot;

impl Action for Teapot {
    fn kind(&self) -> ActionKind {
        ActionKind::Disruptive
    }

    fn evaluate(&self, rule: &RuleMetadata, tx: &mut TransactionState) -> Option<Interruption> {
        tx.set_tx("brewed", "yes".to_owned());
        Some(Interruption::new(rule.id, "teapot", 418))
    }
}

#[test]
fn custom_actions_are_resolved_from_the_registry() {
    let registry = Arc::new(Registry::with_builtins());
    registry.register_action("teapot", |_| Ok(Box::new(Teapot)));
    // Re-registering a builtin name replaces it.
    registry.register_action("deny", |_| Ok(Box::new(Teapot)));

    let mut builder = WafBuilder::with_registry(Arc::clone(&registry));
    Parser::new(&mut builder)
        .parse_string(
            "SecAction \"id:1,phase:1,pass,log\"\nSecRule ARGS:x \"@streq 1\" \"id:2,phase:1,TeaPot\"",
        )
        .unwrap();
    let waf = builder.build();

    let mut tx = request(&waf, "/?x=1");
    let interruption = tx.process_request_headers().unwrap();
    assert_eq!(interruption, Interruption::new(2, "teapot", 418));
    assert_eq!(tx.state().tx_value("brewed"), Some("yes"));

    let mut builder = WafBuilder::with_registry(registry);
    Parser::new(&mut builder)
        .parse_string("SecAction \"id:1,phase:1,deny\"")
        .unwrap();
    let mut tx = builder.build().new_transaction();
    assert_eq!(tx.process_request_headers().unwrap().action, "teapot");
}

#[test]
fn transactions_are_independent() {
    let waf = load(r#"SecAction "id:1,phase:1,pass,setvar:tx.hits=+1""#);
    let mut first = waf.new_transaction();
    let mut second = waf.new_transaction();
    first.process_request_headers();
    first.process_request_headers();
    second.process_request_headers();
    assert_ne!(first.id(), second.id());
    assert_eq!(first.state().tx_value("hits"), Some("2"));
    assert_eq!(second.state().tx_value("hits"), Some("1"));
}

#[test]
fn shared_waf_serves_parallel_transactions() {
    let waf = load(
        r#"
SecRule ARGS:q "@rx attack" "id:1,phase:1,deny"
SecAction "id:2,phase:1,pass,setvar:tx.seen=+1"
"#,
    );
    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let waf = Arc::clone(&waf);
            std::thread::spawn(move || {
                (0..50)
                    .map(|n| {
                        let hostile = (worker + n) % 2 == 0;
                        let mut tx = request(&waf, if hostile { "/?q=attack" } else { "/?q=hi" });
                        let rule_id = tx.process_request_headers().map(|i| i.rule_id);
                        tx.process_logging();
                        let seen = tx.state().tx_value("seen").map(str::to_owned);
                        (hostile, rule_id, seen, tx.id().to_owned())
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut tx_ids = HashSet::new();
    for handle in handles {
        for (hostile, rule_id, seen, id) in handle.join().unwrap() {
            if hostile {
                assert_eq!(rule_id, Some(1));
                assert_eq!(seen, None);
            } else {
                assert_eq!(rule_id, None);
                assert_eq!(seen.as_deref(), Some("1"));
            }
            assert!(tx_ids.insert(id));
        }
    }
    assert_eq!(tx_ids.len(), 400);
}
