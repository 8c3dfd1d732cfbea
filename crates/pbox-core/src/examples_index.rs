use std::{collections::BTreeMap, fs, io, path::Path};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExampleEntry {
    pub file: String,
    pub title: String,
}

/// Example scripts grouped by directory name.
pub type ExampleGroups = BTreeMap<String, Vec<ExampleEntry>>;

/// Index the example corpus one level deep.
///
/// Groups whose name starts with `_` or `.` are skipped, as are groups
/// without any `*.js` file.
///
/// # Errors
///
/// Returns an error if the corpus root or one of its groups cannot be listed.
pub fn scan_examples(root: &Path) -> io::Result<ExampleGroups> {
    let mut groups = ExampleGroups::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let Some(group) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if group.starts_with(['_', '.']) || !entry.path().is_dir() {
            continue;
        }

        let mut examples = Vec::new();
        for file in fs::read_dir(entry.path())? {
            let Some(name) = file?.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Some(title) = name.strip_suffix(".js").filter(|t| !t.is_empty()) {
                examples.push(ExampleEntry {
                    title: title.to_string(),
                    file: name,
                });
            }
        }
        if !examples.is_empty() {
            examples.sort_by(|a, b| a.file.cmp(&b.file));
            groups.insert(group, examples);
        }
    }
    Ok(groups)
}
