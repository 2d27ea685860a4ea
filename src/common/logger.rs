use chrono::Local;
use colored::Colorize;

/// Prefix logger used across the bundler. Each component creates its own
/// instance with a bracketed tag, e.g. `Logger::new("[SELL-ALL] => ".blue().to_string())`.
#[derive(Clone)]
pub struct Logger {
    prefix: String,
    date_format: String,
}

impl Logger {
    pub fn new(prefix: String) -> Self {
        Logger {
            prefix,
            date_format: String::from("%Y-%m-%d %H:%M:%S%.3f"),
        }
    }

    pub fn log(&self, message: String) -> String {
        let log = format!("{} {}", self.prefix_with_date(), message);
        println!("{}", log);
        log
    }

    pub fn debug(&self, message: String) -> String {
        let log = format!("{} [{}] {}", self.prefix_with_date(), "DEBUG".blue(), message);
        println!("{}", log);
        log
    }

    pub fn error(&self, message: String) -> String {
        let log = format!("{} [{}] {}", self.prefix_with_date(), "ERROR".red(), message);
        println!("{}", log);
        log
    }

    fn prefix_with_date(&self) -> String {
        let date = Local::now();
        format!("[{}] {}", date.format(&self.date_format), self.prefix)
    }
}
