use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` directives are honored and
/// `default_directive` (e.g. "quest_engine=info") is always added.
///
/// Returns false when a subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    let mut filter = EnvFilter::from_default_env();
    match default_directive.parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring bad log directive '{}': {}", default_directive, e),
    }
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        init_tracing("quest_engine=debug");
        assert!(!init_tracing("not a directive ==="));
    }
}
