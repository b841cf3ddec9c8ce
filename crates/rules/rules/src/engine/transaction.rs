use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::eval;
use super::state::TransactionState;
use super::verdict::{Interruption, MatchData, MatchRecord};
use crate::config::RuleEngineMode;
use crate::ir::phase::Phase;
use crate::ir::rule::{Rule, RuleAction};
use crate::ir::variable::VariableName;
use crate::waf::Waf;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// One request/response lifecycle evaluated against a frozen [`Waf`].
///
/// The embedder feeds request and response data through the population
/// methods and calls the phase methods in order. Each phase method returns
/// the interruption, if any rule has produced one so far.
#[derive(Debug)]
pub struct Transaction {
    waf: Arc<Waf>,
    state: TransactionState,
    matched: Vec<MatchRecord>,
    interruption: Option<Interruption>,
    /// Cleared as soon as an interruption is recorded; checked before every
    /// phase and every chain head (logging excepted).
    continue_evaluation: bool,
    request_body: Vec<u8>,
    response_body: Vec<u8>,
}

impl Transaction {
    pub(crate) fn new(waf: Arc<Waf>, id: String) -> Self {
        debug!(tx_id = %id, "transaction started");
        Self {
            waf,
            state: TransactionState::new(id),
            matched: Vec::new(),
            interruption: None,
            continue_evaluation: true,
            request_body: Vec::new(),
            response_body: Vec::new(),
        }
    }

    /// The transaction id.
    pub fn id(&self) -> &str {
        self.state.id()
    }

    /// Variable collections of this transaction.
    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    /// The interruption, if a disruptive action fired.
    pub fn interruption(&self) -> Option<&Interruption> {
        self.interruption.as_ref()
    }

    /// Whether rules are still being evaluated in non-logging phases.
    pub fn continues_evaluation(&self) -> bool {
        self.continue_evaluation
    }

    /// Matched rules in evaluation order, across all phases so far.
    pub fn matched_rules(&self) -> &[MatchRecord] {
        &self.matched
    }

    /// Record the connection endpoints.
    pub fn process_connection(
        &mut self,
        client_addr: &str,
        client_port: u16,
        server_addr: &str,
        server_port: u16,
    ) {
        self.state.set(VariableName::RemoteAddr, client_addr);
        self.state.set(VariableName::RemotePort, client_port.to_string());
        self.state.set(VariableName::ServerAddr, server_addr);
        self.state.set(VariableName::ServerPort, server_port.to_string());
    }

    /// Record the request line and parse query arguments.
    pub fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) {
        self.state.set(VariableName::RequestUri, uri);
        self.state.set(VariableName::RequestMethod, method);
        self.state.set(VariableName::RequestProtocol, protocol);

        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        self.state.set(VariableName::RequestFilename, path);
        self.state.set(VariableName::QueryString, query);
        match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
            Ok(args) => {
                for (key, value) in args {
                    self.state.add(VariableName::ArgsGet, key.clone(), value.clone());
                    self.state.add(VariableName::Args, key, value);
                }
            }
            Err(e) => debug!(tx_id = %self.id(), error = %e, "query string not parsed"),
        }
    }

    /// Add a request header. `Cookie` headers also populate `REQUEST_COOKIES`.
    pub fn add_request_header(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("cookie") {
            for pair in value.split(';') {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                let k = k.trim();
                if !k.is_empty() {
                    self.state.add(VariableName::RequestCookies, k, v.trim());
                }
            }
        }
        self.state.add(VariableName::RequestHeaders, name, value);
    }

    /// Add a form argument from a request body the embedder parsed itself.
    pub fn add_post_arg(&mut self, key: &str, value: &str) {
        self.state.add(VariableName::ArgsPost, key, value);
        self.state.add(VariableName::Args, key, value);
    }

    /// Buffer request body data. Returns how many bytes were kept; data is
    /// dropped when body access is off or beyond the configured limit.
    pub fn write_request_body(&mut self, data: &[u8]) -> usize {
        let config = self.waf.config();
        buffer_body(
            &mut self.request_body,
            data,
            config.request_body_access,
            config.request_body_limit,
        )
    }

    /// Add a response header.
    pub fn add_response_header(&mut self, name: &str, value: &str) {
        self.state.add(VariableName::ResponseHeaders, name, value);
    }

    /// Record the response status.
    pub fn set_response_status(&mut self, status: u16) {
        self.state.set(VariableName::ResponseStatus, status.to_string());
    }

    /// Buffer response body data; see [`write_request_body`](Self::write_request_body).
    pub fn write_response_body(&mut self, data: &[u8]) -> usize {
        let config = self.waf.config();
        buffer_body(
            &mut self.response_body,
            data,
            config.response_body_access,
            config.response_body_limit,
        )
    }

    /// Evaluate phase 1.
    pub fn process_request_headers(&mut self) -> Option<Interruption> {
        self.evaluate_phase(Phase::RequestHeaders);
        self.interruption.clone()
    }

    /// Expose the buffered request body and evaluate phase 2.
    ///
    /// A URL-encoded form body is parsed into `ARGS_POST`.
    pub fn process_request_body(&mut self) -> Option<Interruption> {
        if !self.request_body.is_empty() {
            let body = String::from_utf8_lossy(&self.request_body).into_owned();
            let is_form = self
                .state
                .get(VariableName::RequestHeaders, "content-type")
                .is_some_and(|ct| ct.to_ascii_lowercase().starts_with(FORM_URLENCODED));
            if is_form {
                match serde_urlencoded::from_str::<Vec<(String, String)>>(&body) {
                    Ok(args) => {
                        for (key, value) in args {
                            self.add_post_arg(&key, &value);
                        }
                    }
                    Err(e) => debug!(tx_id = %self.id(), error = %e, "form body not parsed"),
                }
            }
            self.state.set(VariableName::RequestBody, body);
        }
        self.evaluate_phase(Phase::RequestBody);
        self.interruption.clone()
    }

    /// Evaluate phase 3.
    pub fn process_response_headers(&mut self) -> Option<Interruption> {
        self.evaluate_phase(Phase::ResponseHeaders);
        self.interruption.clone()
    }

    /// Expose the buffered response body and evaluate phase 4.
    pub fn process_response_body(&mut self) -> Option<Interruption> {
        if !self.response_body.is_empty() {
            let body = String::from_utf8_lossy(&self.response_body).into_owned();
            self.state.set(VariableName::ResponseBody, body);
        }
        self.evaluate_phase(Phase::ResponseBody);
        self.interruption.clone()
    }

    /// Evaluate phase 5. Runs even after an interruption.
    pub fn process_logging(&mut self) {
        self.evaluate_phase(Phase::Logging);
    }

    #[instrument(skip_all, fields(tx_id = %self.state.id(), phase = %phase))]
    fn evaluate_phase(&mut self, phase: Phase) {
        let mode = self.waf.config().rule_engine;
        if mode == RuleEngineMode::Off {
            return;
        }
        if phase != Phase::Logging && !self.continue_evaluation {
            debug!("phase skipped after interruption");
            return;
        }
        self.state.set_phase(phase);

        let waf = Arc::clone(&self.waf);
        for rule in waf.rules().rules_for_phase(phase) {
            if phase != Phase::Logging && !self.continue_evaluation {
                break;
            }
            if self.state.skips_phase(phase) {
                debug!("remaining rules skipped by allow");
                break;
            }
            let Some(data) = eval::match_chain(rule, &mut self.state) else {
                continue;
            };
            let interruption = self.execute(rule, phase, data, mode);
            if let Some(interruption) = interruption {
                if phase == Phase::Logging || self.interruption.is_some() {
                    debug!(rule_id = rule.id(), "interruption ignored");
                    continue;
                }
                info!(
                    rule_id = interruption.rule_id,
                    action = %interruption.action,
                    status = interruption.status,
                    "transaction interrupted"
                );
                self.interruption = Some(interruption);
                self.continue_evaluation = false;
            }
        }
    }

    /// Run the actions of a fully matched chain and record the match.
    fn execute(
        &mut self,
        head: &Rule,
        phase: Phase,
        data: Vec<MatchData>,
        mode: RuleEngineMode,
    ) -> Option<Interruption> {
        let mut disruptive: Option<&RuleAction> = None;
        for link in head.chain() {
            for action in link.actions.iter().filter(|a| a.is_non_disruptive()) {
                action.instance.evaluate(&link.metadata, &mut self.state);
            }
            if disruptive.is_none() {
                disruptive = link.disruptive_action();
            }
        }

        let meta = &head.metadata;
        let message = meta.msg.as_deref().map(|m| self.state.expand_macros(m));
        if meta.log {
            warn!(
                rule_id = meta.id,
                msg = message.as_deref().unwrap_or_default(),
                source = %meta.source,
                "rule matched"
            );
        } else {
            debug!(rule_id = meta.id, "rule matched");
        }
        self.matched.push(MatchRecord {
            rule_id: meta.id,
            phase,
            message,
            tags: meta.tags.clone(),
            severity: meta.severity,
            disruptive: disruptive.map(|a| a.name.clone()),
            log: meta.log,
            data,
        });

        let action = disruptive?;
        if mode == RuleEngineMode::DetectionOnly {
            debug!(rule_id = meta.id, action = %action.name, "detection only, not disrupting");
            return None;
        }
        action.instance.evaluate(meta, &mut self.state).map(|mut it| {
            it.rule_id = meta.id;
            it
        })
    }
}

fn buffer_body(buffer: &mut Vec<u8>, data: &[u8], access: bool, limit: usize) -> usize {
    if !access {
        return 0;
    }
    let room = limit.saturating_sub(buffer.len());
    let kept = data.len().min(room);
    if kept < data.len() {
        debug!(limit, dropped = data.len() - kept, "body truncated at limit");
    }
    buffer.extend_from_slice(&data[..kept]);
    kept
}
