//! `fieldaudit resolve` — evaluate one path against one document.

use std::path::PathBuf;

use fieldaudit_io::xml::parse_document;
use fieldaudit_recon::{path, Resolver};

use crate::exit_codes::EXIT_RUNTIME;
use crate::CliError;

pub fn cmd_resolve(document: PathBuf, raw_path: &str, separator: &str, explain: bool) -> Result<(), CliError> {
    let expr = path::parse(raw_path).ok_or_else(|| {
        CliError::usage(format!("'{raw_path}' is not a usable path expression"))
            .with_hint("use A/B/C, A/B[2], `a + b` or `a | b`")
    })?;

    let bytes = std::fs::read(&document)
        .map_err(|e| CliError::new(EXIT_RUNTIME, format!("cannot read {}: {e}", document.display())))?;
    let root = parse_document(&bytes).map_err(|e| CliError::general(format!("{}: {e}", document.display())))?;

    let resolver = Resolver::new(separator);
    let (value, attempts) = resolver.resolve_traced(&expr, &root);

    if explain {
        eprintln!("path: {expr}");
        for a in &attempts {
            eprintln!("  {:<18} {} {}", a.strategy.to_string(), a.path, if a.hit { "hit" } else { "miss" });
        }
        if let (Some(strategy), Some(origin)) = (value.strategy_used, value.origin_segment.as_deref()) {
            eprintln!("resolved by {strategy} from <{origin}>");
        }
    }

    match value.raw_text {
        Some(text) => {
            println!("{text}");
            Ok(())
        }
        None => Err(CliError::general(format!("'{expr}' did not resolve in {}", document.display()))),
    }
}
