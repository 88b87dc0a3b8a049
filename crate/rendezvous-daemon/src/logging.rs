use env_logger::Builder;
use std::io::Write;

/// Initialize logging for the daemon.
///
/// Level defaults to WARN, except for `info_modules`, which log at
/// INFO. The env variable RUST_LOG overrides both.
///
/// Setting RUST_LOG_FORMAT to SYSTEMD makes the output
/// systemd-friendly.
pub fn init(info_modules: &[&str]) {
    let mut builder = Builder::new();
    if std::env::var("RUST_LOG_FORMAT").is_ok_and(|f| f == "SYSTEMD") {
        systemd_format(&mut builder);
    }

    builder.filter_level(log::LevelFilter::Warn);
    for module in info_modules {
        builder.filter_module(module, log::LevelFilter::Info);
    }
    builder.parse_default_env();
    builder.init();
}

/// Prefix lines with their syslog priority and drop the timestamp,
/// which journald records anyway.
fn systemd_format(builder: &mut Builder) {
    builder.format(|fmt, record| {
        writeln!(
            fmt,
            "<{}>{}: {}",
            syslog_priority(record.level()),
            record.target(),
            record.args()
        )
    });
}

/// Syslog priority of a log level (RFC 5424).
fn syslog_priority(level: log::Level) -> u8 {
    match level {
        log::Level::Error => 3,
        log::Level::Warn => 4,
        log::Level::Info => 5,
        log::Level::Debug | log::Level::Trace => 7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities() {
        assert_eq!(syslog_priority(log::Level::Error), 3);
        assert_eq!(syslog_priority(log::Level::Warn), 4);
        assert_eq!(syslog_priority(log::Level::Info), 5);
        assert_eq!(syslog_priority(log::Level::Debug), 7);
        assert_eq!(syslog_priority(log::Level::Trace), 7);
    }
}
