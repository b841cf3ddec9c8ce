//! Parser for the SecLang rule language.
//!
//! A [`Parser`] reads directive text, from strings or files, and loads the
//! resulting rules and settings into a [`warden_rules::WafBuilder`]:
//!
//! ```
//! use warden_rules::WafBuilder;
//! use warden_seclang::Parser;
//!
//! let mut builder = WafBuilder::new();
//! Parser::new(&mut builder)
//!     .parse_string(r#"SecRule ARGS:id "@rx ^\d+$" "id:100,phase:1,pass,log""#)
//!     .unwrap();
//! let waf = builder.build();
//! assert_eq!(waf.rules().count(), 1);
//! ```
//!
//! `Include` directives resolve through a [`ConfigRoot`]: the local
//! filesystem by default, or a [`DirRoot`] / [`MemoryRoot`] set with
//! [`Parser::set_root`].

pub mod directives;
pub mod error;
pub mod grammar;
pub mod lexer;
pub mod parser;
pub mod root;

pub use directives::Directive;
pub use error::{ParseError, SourceLocation};
pub use parser::{MAX_INCLUDE_RECURSION, Parser};
pub use root::{ConfigRoot, DirRoot, LocalFs, MemoryRoot};
