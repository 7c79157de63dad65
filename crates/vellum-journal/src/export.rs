use vellum_core::journal::{JournalEntry, StoredEntry};

const RULE_WIDTH: usize = 50;

/// Plain-text export of entries, oldest first.
pub fn export_text(entries: &[StoredEntry]) -> String {
    let mut sorted: Vec<&JournalEntry> = entries.iter().map(|stored| &stored.entry).collect();
    sorted.sort_by_key(|entry| (entry.date, entry.created_time));

    let mut out = String::from("=== JOURNAL EXPORT ===\n\n");
    for entry in sorted {
        out.push_str(&format!("Title: {}\n", entry.title));
        out.push_str(&format!("Date: {}\n", entry.date.format("%Y-%m-%d")));
        out.push_str(&format!("Words: {}\n", entry.word_count));
        out.push_str(&"-".repeat(RULE_WIDTH));
        out.push('\n');
        out.push_str(&entry.content);
        out.push_str("\n\n");
        out.push_str(&"=".repeat(RULE_WIDTH));
        out.push_str("\n\n");
    }
    out
}
