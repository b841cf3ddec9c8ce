use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use warden_rules::{
    OperatorOptions, RuleError, Rule, RuleAction, RuleMetadata, RuleOperator, RuleTransformation,
    WafBuilder,
};

use crate::directives::{self, Directive};
use crate::error::{ParseError, SourceLocation};
use crate::grammar::{self, GrammarError};
use crate::lexer;
use crate::root::{self, ConfigRoot, LocalFs};

/// Maximum number of `Include` directives processed by one top-level load.
///
/// The counter is never decremented, so it bounds self-inclusion, include
/// cycles and long runs of sibling includes alike.
pub const MAX_INCLUDE_RECURSION: usize = 100;

/// Loads rule-language configuration into a [`WafBuilder`].
///
/// Each call to [`parse_string`](Self::parse_string) or
/// [`parse_file`](Self::parse_file) is one load: the include counter and any
/// pending chain are reset at its start. Rules that parsed successfully
/// before an error stay registered.
#[derive(Debug)]
pub struct Parser<'w> {
    waf: &'w mut WafBuilder,
    root: Arc<dyn ConfigRoot>,
    /// Head first; committed once a rule without `chain` closes it.
    pending_chain: Vec<Rule>,
    chain_start: SourceLocation,
    includes: usize,
}

impl<'w> Parser<'w> {
    /// Create a parser writing into `waf` and reading files from the local
    /// filesystem.
    pub fn new(waf: &'w mut WafBuilder) -> Self {
        Self {
            waf,
            root: Arc::new(LocalFs),
            pending_chain: Vec::new(),
            chain_start: SourceLocation::default(),
            includes: 0,
        }
    }

    /// Resolve files and includes against `root` instead of the local
    /// filesystem.
    pub fn set_root(&mut self, root: impl ConfigRoot + 'static) {
        self.root = Arc::new(root);
    }

    /// Builder form of [`set_root`](Self::set_root).
    #[must_use]
    pub fn with_root(mut self, root: impl ConfigRoot + 'static) -> Self {
        self.set_root(root);
        self
    }

    /// Parse configuration text. Relative includes resolve against the root.
    #[instrument(skip_all, fields(bytes = source.len()))]
    pub fn parse_string(&mut self, source: &str) -> Result<(), ParseError> {
        self.begin();
        let result = self.parse_source(source, None).and_then(|()| self.finish());
        self.pending_chain.clear();
        result
    }

    /// Parse a configuration file, or every file matched by a glob pattern.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<(), ParseError> {
        let path = path.as_ref();
        self.begin();
        let location = SourceLocation::new(Some(path), 0);
        let result = self
            .load(path, None, &location)
            .and_then(|()| self.finish());
        self.pending_chain.clear();
        result
    }

    fn begin(&mut self) {
        self.includes = 0;
        self.pending_chain.clear();
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        match self.pending_chain.first() {
            Some(head) => Err(ParseError::UnterminatedChain {
                location: self.chain_start.clone(),
                head_id: head.id(),
            }),
            None => Ok(()),
        }
    }

    /// Load every file matched by `pattern`, relative to `base` when given.
    fn load(
        &mut self,
        pattern: &Path,
        base: Option<&Path>,
        location: &SourceLocation,
    ) -> Result<(), ParseError> {
        let resolved = match base {
            Some(dir) if pattern.is_relative() => dir.join(pattern),
            _ => pattern.to_path_buf(),
        };
        let files = root::expand(self.root.as_ref(), &resolved);
        if files.is_empty() {
            return Err(ParseError::IncludeNotFound {
                location: location.clone(),
                pattern: resolved.display().to_string(),
            });
        }
        for file in files {
            let content = self
                .root
                .read_to_string(&file)
                .map_err(|source| ParseError::Io {
                    location: location.clone(),
                    path: file.clone(),
                    source,
                })?;
            info!(path = %file.display(), "loading rules file");
            self.parse_source(&content, Some(&file))?;
        }
        Ok(())
    }

    fn parse_source(&mut self, source: &str, file: Option<&Path>) -> Result<(), ParseError> {
        let lines = lexer::logical_lines(source).map_err(|open| ParseError::UnterminatedString {
            location: SourceLocation::new(file, open.line),
            delimiter: '`',
        })?;
        for line in lines {
            let location = SourceLocation::new(file, line.line);
            self.parse_line(&line.text, &location)?;
        }
        Ok(())
    }

    fn parse_line(&mut self, text: &str, location: &SourceLocation) -> Result<(), ParseError> {
        let (keyword, args) =
            grammar::directive(text).map_err(|e| grammar_error(location, "directive", e))?;
        let directive =
            Directive::lookup(keyword).ok_or_else(|| ParseError::UnknownDirective {
                location: location.clone(),
                name: keyword.to_owned(),
            })?;

        let (min, max) = directive.arity();
        if args.len() < min || args.len() > max {
            return Err(ParseError::syntax(
                location,
                format!(
                    "{} expects {} argument(s), got {}",
                    directive.name(),
                    if min == max { min.to_string() } else { format!("{min}-{max}") },
                    args.len()
                ),
            ));
        }

        match directive {
            Directive::SecRule => {
                let actions = args.get(2).map_or("", String::as_str);
                self.add_rule(Some(args[0].as_str()), Some(args[1].as_str()), actions, location)
            }
            Directive::SecAction => self.add_rule(None, None, &args[0], location),
            Directive::Include => self.include(&args[0], location),
            other => directives::apply_config(other, &args, self.waf.config_mut())
                .map_err(|message| ParseError::syntax(location, message)),
        }
    }

    fn include(&mut self, pattern: &str, location: &SourceLocation) -> Result<(), ParseError> {
        self.includes += 1;
        if self.includes > MAX_INCLUDE_RECURSION {
            return Err(ParseError::IncludeRecursion {
                location: location.clone(),
                limit: MAX_INCLUDE_RECURSION,
            });
        }
        debug!(pattern, count = self.includes, "expanding include");
        let base = location.file.as_deref().and_then(Path::parent);
        self.load(Path::new(pattern), base, location)
    }

    /// Build a rule and either start, extend or close the pending chain.
    fn add_rule(
        &mut self,
        variables: Option<&str>,
        operator: Option<&str>,
        actions: &str,
        location: &SourceLocation,
    ) -> Result<(), ParseError> {
        let rule = self.build_rule(variables, operator, actions, location)?;
        let is_link = !self.pending_chain.is_empty();

        if is_link {
            if rule.metadata.id != 0 || rule.metadata.phase_declared {
                return Err(ParseError::rule(
                    location,
                    RuleError::InvalidRule("chained rules may not declare id or phase".into()),
                ));
            }
        } else {
            let id = rule.id();
            if id == 0 {
                return Err(ParseError::rule(location, RuleError::MissingId));
            }
            if self.waf.rules().get(id).is_some() {
                return Err(ParseError::rule(location, RuleError::DuplicateId(id)));
            }
            if rule.metadata.has_chain {
                self.chain_start = location.clone();
            }
        }

        let continues = rule.metadata.has_chain;
        self.pending_chain.push(rule);
        if continues {
            return Ok(());
        }

        let links = std::mem::take(&mut self.pending_chain);
        if let Some(chain) = Rule::link_chain(links) {
            let id = chain.id();
            let links = chain.chain_len();
            self.waf
                .add_rule(chain)
                .map_err(|e| ParseError::rule(location, e))?;
            debug!(rule_id = id, links, "rule registered");
        }
        Ok(())
    }

    fn build_rule(
        &self,
        variables: Option<&str>,
        operator: Option<&str>,
        actions: &str,
        location: &SourceLocation,
    ) -> Result<Rule, ParseError> {
        let registry = self.waf.registry();
        let mut metadata = RuleMetadata {
            source: location.rule_source(),
            ..RuleMetadata::default()
        };

        let variables = match variables {
            Some(raw) => grammar::variables(raw).map_err(|e| ParseError::rule(location, e))?,
            None => Vec::new(),
        };

        let mut transformations: Vec<RuleTransformation> = Vec::new();
        let mut bound: Vec<RuleAction> = Vec::new();
        for (name, argument) in
            grammar::actions(actions).map_err(|e| grammar_error(location, "actions", e))?
        {
            if name.eq_ignore_ascii_case("t") {
                let t = argument.as_deref().unwrap_or_default().trim();
                if t.eq_ignore_ascii_case("none") {
                    transformations.clear();
                    continue;
                }
                let instance = registry
                    .transformation(t)
                    .map_err(|e| ParseError::rule(location, e))?;
                transformations.push(RuleTransformation {
                    name: t.to_ascii_lowercase(),
                    instance,
                });
                continue;
            }
            let instance = registry
                .action(&name, argument.as_deref())
                .map_err(|e| ParseError::rule(location, e))?;
            instance
                .init(&mut metadata)
                .map_err(|e| ParseError::rule(location, e))?;
            bound.push(RuleAction {
                name: name.to_ascii_lowercase(),
                argument,
                instance,
            });
        }
        if bound.iter().filter(|a| a.is_disruptive()).count() > 1 {
            return Err(ParseError::rule(
                location,
                RuleError::InvalidRule("more than one disruptive action".into()),
            ));
        }

        let operator = match operator {
            Some(raw) => {
                let spec =
                    grammar::operator(raw).map_err(|e| grammar_error(location, "operator", e))?;
                let instance = registry
                    .operator(
                        spec.name,
                        OperatorOptions {
                            argument: spec.argument,
                            datasets: &self.waf.config().datasets,
                        },
                    )
                    .map_err(|e| ParseError::rule(location, e))?;
                Some(RuleOperator {
                    name: spec.name.to_ascii_lowercase(),
                    argument: spec.argument.to_owned(),
                    negated: spec.negated,
                    instance,
                })
            }
            None => None,
        };

        let mut rule = Rule::new(metadata).with_variables(variables);
        rule.operator = operator;
        rule.transformations = transformations;
        rule.actions = bound;
        Ok(rule)
    }
}

fn grammar_error(location: &SourceLocation, what: &str, err: GrammarError) -> ParseError {
    match err {
        GrammarError::Unterminated(delimiter) => ParseError::UnterminatedString {
            location: location.clone(),
            delimiter,
        },
        GrammarError::Syntax(message) => ParseError::syntax(location, format!("{what}: {message}")),
    }
}
