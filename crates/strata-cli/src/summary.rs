use std::path::Path;

use strata_db::{MigrationReport, SchemaVersion};

const WIDTH: usize = 56;

/// Print a boxed summary of a finished migration run.
pub fn print_migration(db_path: &Path, report: &MigrationReport) {
    let outcome = if report.is_noop() {
        "already up to date".to_string()
    } else {
        format!(
            "{} step{} applied",
            report.steps_applied,
            if report.steps_applied == 1 { "" } else { "s" }
        )
    };

    print_box(
        "strata migrate",
        &[
            ("Database", db_path.display().to_string()),
            (
                "Version",
                format!("{} -> {}", report.from_version, report.to_version),
            ),
            ("Result", outcome),
        ],
    );
}

/// Print the recorded version against the latest known one. `current` is
/// `None` when the database file has not been created.
pub fn print_status(
    db_path: &Path,
    current: Option<SchemaVersion>,
    latest: SchemaVersion,
    pending: usize,
) {
    let state = match current {
        None => format!("not created, {pending} pending"),
        Some(_) if pending == 0 => "up to date".to_string(),
        Some(_) => format!("{pending} pending"),
    };
    let current = current.map_or_else(|| "-".to_string(), |v| v.to_string());

    print_box(
        "strata status",
        &[
            ("Database", db_path.display().to_string()),
            ("Current", current),
            ("Latest", latest.to_string()),
            ("State", state),
        ],
    );
}

fn print_box(title: &str, rows: &[(&str, String)]) {
    for line in render_box(title, rows) {
        println!("{line}");
    }
}

fn render_box(title: &str, rows: &[(&str, String)]) -> Vec<String> {
    let inner = WIDTH - 4;
    let title_dashes = WIDTH.saturating_sub(title.chars().count() + 7);
    let mut lines = vec![format!("╭─── {title} {}╮", "─".repeat(title_dashes))];

    for (label, value) in rows {
        let text = format!("{label:<10}{value}");
        let text: String = text.chars().take(inner).collect();
        lines.push(format!("│ {text:<inner$} │"));
    }

    lines.push(format!("╰{}╯", "─".repeat(WIDTH - 2)));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_a_fixed_width() {
        let lines = render_box(
            "strata status",
            &[
                ("Current", "2".to_string()),
                ("Database", "x".repeat(200)),
            ],
        );

        assert_eq!(lines.len(), 4);
        for line in &lines {
            assert_eq!(line.chars().count(), WIDTH, "bad width: {line}");
        }
        assert!(lines[1].contains("Current   2"));
    }
}
