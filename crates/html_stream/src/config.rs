use std::num::NonZeroUsize;

const BATCH_SIZE_ENV: &str = "HTML_STREAM_BATCH_SIZE";
const EXACT_ERRORS_ENV: &str = "HTML_STREAM_EXACT_ERRORS";

/// Knobs for one parser stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Emission units per output packet. `1` streams every unit immediately.
    pub batch_size: NonZeroUsize,
    /// Forwarded to the tree builder; affects `<noscript>` handling.
    pub scripting_enabled: bool,
    /// Ask the engine for detailed parse error messages (logged at trace).
    pub exact_errors: bool,
    /// Run the end-of-batch reachability sweep over removed nodes.
    pub sweep_removed: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::MIN,
            scripting_enabled: true,
            exact_errors: false,
            sweep_removed: true,
        }
    }
}

impl StreamConfig {
    pub fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Defaults overridden by `HTML_STREAM_BATCH_SIZE` and
    /// `HTML_STREAM_EXACT_ERRORS` when they parse.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(batch_size) = std::env::var(BATCH_SIZE_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .and_then(NonZeroUsize::new)
        {
            config.batch_size = batch_size;
        }
        if let Some(exact) = std::env::var(EXACT_ERRORS_ENV)
            .ok()
            .and_then(|v| parse_flag(&v))
        {
            config.exact_errors = exact;
        }
        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
