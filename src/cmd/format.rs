/*!
Human output helpers for `fleetctl mcp tools|call|resources`.

Everything returns strings; callers decide where to print. JSON output paths
never go through here. `NO_COLOR` disables ANSI color, `NO_EMOJI` drops the
emoji, `COLUMNS` sets the width (clamped to 40..=220, default 100).
*/

use std::borrow::Cow;

#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub use_color: bool,
    pub use_emoji: bool,
    pub term_width: usize,
}

impl StyleOptions {
    pub fn detect() -> Self {
        let term_width = std::env::var("COLUMNS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|w| w.clamp(40, 220))
            .unwrap_or(100);
        StyleOptions {
            use_color: std::env::var_os("NO_COLOR").is_none(),
            use_emoji: std::env::var_os("NO_EMOJI").is_none(),
            term_width,
        }
    }

    #[cfg(test)]
    pub fn plain(term_width: usize) -> Self {
        StyleOptions {
            use_color: false,
            use_emoji: false,
            term_width,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Primary,
    Secondary,
    Accent,
    Success,
    Error,
    Dim,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Primary => "38;5;45",
        Role::Secondary => "38;5;250",
        Role::Accent => "38;5;213",
        Role::Success => "38;5;82",
        Role::Error => "38;5;196",
        Role::Dim => "2",
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

pub fn emoji(tag: &str, style: &StyleOptions) -> &'static str {
    if !style.use_emoji {
        return "";
    }
    match tag {
        "success" => "✔",
        "error" => "✖",
        "info" => "ℹ",
        "tool" => "🛠",
        "resource" => "📄",
        _ => "",
    }
}

/// Title (and optional subtitle) in a light box no wider than the terminal.
pub fn box_header(title: &str, subtitle: Option<&str>, style: &StyleOptions) -> String {
    let mut inner = color(Role::Primary, title, style);
    if let Some(sub) = subtitle {
        inner = format!("{inner}  {}", color(Role::Secondary, sub, style));
    }
    let max_inner = style.term_width.saturating_sub(4).max(16);
    let lines = if display_width(&inner) <= max_inner {
        vec![inner]
    } else {
        wrap_text(&inner, max_inner)
    };
    let width = lines.iter().map(|l| display_width(l)).max().unwrap_or(0);

    let mut out = format!("┌{}┐\n", "─".repeat(width + 2));
    for line in &lines {
        let pad = width - display_width(line);
        out.push_str(&format!("│ {line}{} │\n", " ".repeat(pad)));
    }
    out.push_str(&format!("└{}┘", "─".repeat(width + 2)));
    out
}

/// Left-aligned columns separated by two spaces. When the table is wider
/// than the terminal the widest columns shrink first, truncating with `…`.
pub fn table(headers: &[&str], rows: &[Vec<String>], style: &StyleOptions) -> String {
    const MIN_COL: usize = 4;
    if headers.is_empty() {
        return String::new();
    }
    let cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(cols) {
            widths[i] = widths[i].max(display_width(cell));
        }
    }

    let total = widths.iter().sum::<usize>() + (cols - 1) * 2;
    let mut overflow = total.saturating_sub(style.term_width);
    while overflow > 0 {
        let Some((idx, &w)) = widths.iter().enumerate().max_by_key(|(_, w)| **w) else {
            break;
        };
        if w <= MIN_COL {
            break;
        }
        let shrink = (w - MIN_COL).min(overflow);
        widths[idx] -= shrink;
        overflow -= shrink;
    }

    let render = |cells: &mut dyn Iterator<Item = String>| -> String {
        cells
            .zip(&widths)
            .map(|(c, w)| pad_or_truncate(&c, *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = color(
        Role::Accent,
        render(&mut headers.iter().map(|h| h.to_string())),
        style,
    );
    out.push('\n');
    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&color(Role::Dim, sep.join("  "), style));
    for row in rows {
        out.push('\n');
        let mut cells = (0..cols).map(|i| row.get(i).cloned().unwrap_or_default());
        out.push_str(&render(&mut cells));
    }
    out
}

fn pad_or_truncate(s: &str, width: usize) -> String {
    let len = display_width(s);
    if len <= width {
        return format!("{s}{}", " ".repeat(width - len));
    }
    truncate_ellipsis(&strip_ansi(s), width)
}

/// Greedy word wrap; a single word longer than `max_width` keeps its line.
pub fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in s.split_whitespace() {
        if !current.is_empty() && display_width(&current) + 1 + display_width(word) > max_width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

pub fn truncate_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

/// Drop `ESC [ ... <letter>` sequences.
fn strip_ansi(s: &str) -> Cow<'_, str> {
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for n in chars.by_ref() {
                if n.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    Cow::Owned(out)
}

fn display_width(s: &str) -> usize {
    strip_ansi(s).chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_fits_content() {
        let b = box_header("Tools (5)", Some("local: fleet"), &StyleOptions::plain(80));
        let lines: Vec<&str> = b.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "│ Tools (5)  local: fleet │");
        assert_eq!(lines[0].chars().count(), lines[1].chars().count());
    }

    #[test]
    fn table_shrinks_the_widest_column() {
        let rows = vec![
            vec!["fleet_list".to_string(), "x".repeat(200)],
            vec!["fleet_whoami".to_string(), "Show the logged-in account".to_string()],
        ];
        let t = table(&["NAME", "DESCRIPTION"], &rows, &StyleOptions::plain(60));
        for line in t.lines() {
            assert!(line.chars().count() <= 60, "{line}");
        }
        assert!(t.contains("fleet_whoami"));
        assert!(t.contains('…'));
    }

    #[test]
    fn wrapping_and_truncation() {
        assert_eq!(wrap_text("hello world from fleet", 11), ["hello world", "from fleet"]);
        assert_eq!(wrap_text("", 10), [""]);
        assert_eq!(truncate_ellipsis("abcdef", 4), "abc…");
        assert_eq!(truncate_ellipsis("abc", 4), "abc");
    }

    #[test]
    fn ansi_is_ignored_for_width() {
        let style = StyleOptions {
            use_color: true,
            use_emoji: false,
            term_width: 80,
        };
        let red = color(Role::Error, "RED", &style);
        assert_eq!(strip_ansi(&red), "RED");
        assert_eq!(display_width(&red), 3);
    }
}
