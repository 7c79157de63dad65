/// Extension of entry files inside the virtual tree.
pub(crate) const ENTRY_EXTENSION: &str = ".enc";

const MAX_TITLE_CHARS: usize = 50;
const UNTITLED: &str = "Untitled";

/// Filename-safe form of an entry title: alphanumerics, space, `-` and `_` survive,
/// spaces become `_`, capped at 50 characters.
pub(crate) fn safe_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let safe: String = kept
        .trim()
        .replace(' ', "_")
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();

    if safe.is_empty() {
        UNTITLED.to_string()
    } else {
        safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_unsafe_characters() {
        assert_eq!(safe_title("  Team sync: Q3/Q4 plans! "), "Team_sync_Q3Q4_plans");
        assert_eq!(safe_title("Día de campo"), "Día_de_campo");
        assert_eq!(safe_title("../.."), UNTITLED);
    }

    #[test]
    fn caps_length() {
        let long = "x".repeat(80);
        assert_eq!(safe_title(&long).chars().count(), MAX_TITLE_CHARS);
    }
}
