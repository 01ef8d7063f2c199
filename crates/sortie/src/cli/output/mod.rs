//! Output formatting utilities

use console::style;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", style("→").blue(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

/// Style a path for display
pub fn path(path: &std::path::Path) -> String {
    style(path.display()).cyan().to_string()
}

/// Color a ratio by how good it is
pub fn accuracy(ratio: f64) -> String {
    let text = format!("{:.4}", ratio);
    if ratio >= 0.5 {
        style(text).green().bold().to_string()
    } else {
        style(text).yellow().bold().to_string()
    }
}
