use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{num}/{total}]").blue().bold(), msg);
}

/// Print lines meant to be copied verbatim
pub fn block(lines: &[&str]) {
    println!();
    for line in lines {
        println!("    {}", line.bold());
    }
    println!();
}

/// Menu lines, numbered from 1
pub fn numbered(options: &[String]) -> Vec<String> {
    let width = options.len().to_string().len();
    options
        .iter()
        .enumerate()
        .map(|(i, option)| format!("  {:>width$}) {option}", i + 1))
        .collect()
}

/// Render `yes`/`no`
pub fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
