//! Tracing subscriber setup for applications embedding the route coordinator
//!
//! The library itself only emits `tracing` events; hosts that have no
//! subscriber of their own can install one here.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{RouteError, RouteResult};

/// Subscriber options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default level for every target
    pub level: Level,
    /// Extra `EnvFilter` directives, e.g. `rvoip_audio_route::sco=trace`
    pub directives: Vec<String>,
    pub json: bool,
    /// Include file and line of each event
    pub file_info: bool,
    /// Emit span enter/exit events
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            directives: Vec::new(),
            json: false,
            file_info: false,
            log_spans: false,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level,
            ..Default::default()
        }
    }

    /// Build from a textual level such as `"debug"`
    pub fn from_level_str(level: &str) -> RouteResult<Self> {
        Ok(Self::new(parse_log_level(level)?))
    }

    /// Raise or lower one component, e.g. `("sco", Level::TRACE)`
    pub fn with_component(mut self, component: &str, level: Level) -> Self {
        self.directives.push(format!(
            "{}::{}={}",
            env!("CARGO_CRATE_NAME"),
            component,
            level.as_str().to_ascii_lowercase()
        ));
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    fn env_filter(&self) -> RouteResult<EnvFilter> {
        let mut filter = EnvFilter::from_default_env().add_directive(self.level.into());
        for directive in &self.directives {
            let parsed = directive.parse::<Directive>().map_err(|e| {
                RouteError::config(format!("Invalid log directive {}: {}", directive, e))
            })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install a global fmt subscriber for the provided configuration
///
/// Fails with a configuration error if a directive does not parse or a
/// global subscriber already exists.
pub fn setup_logging(config: LoggingConfig) -> RouteResult<()> {
    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.env_filter()?)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = if config.json {
        builder.with_writer(std::io::stdout).json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| RouteError::config(format!("Failed to install subscriber: {}", e)))?;
    tracing::info!(
        version = crate::VERSION,
        level = %config.level,
        directives = config.directives.len(),
        "Audio route logging ready"
    );
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> RouteResult<Level> {
    Level::from_str(level).map_err(|_| RouteError::config(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(matches!(
            parse_log_level("chatty"),
            Err(RouteError::Configuration { .. })
        ));
    }

    #[test]
    fn test_component_directives() {
        let config = LoggingConfig::from_level_str("warn")
            .unwrap()
            .with_component("sco", Level::TRACE)
            .with_component("proximity", Level::DEBUG)
            .with_json();
        assert_eq!(config.level, Level::WARN);
        assert_eq!(
            config.directives,
            vec![
                "rvoip_audio_route::sco=trace".to_string(),
                "rvoip_audio_route::proximity=debug".to_string(),
            ]
        );
        assert!(config.json);
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn test_bad_directive_is_a_config_error() {
        let mut config = LoggingConfig::default();
        config.directives.push("sco=loud".to_string());
        assert!(matches!(
            config.env_filter(),
            Err(RouteError::Configuration { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_second_setup_is_reported_not_panicking() {
        // Whichever call comes first may win; the second must fail cleanly.
        let _ = setup_logging(LoggingConfig::default());
        let second = setup_logging(LoggingConfig::default());
        assert!(matches!(second, Err(RouteError::Configuration { .. })));
    }
}
