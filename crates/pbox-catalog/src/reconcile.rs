use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::{BuildDescriptor, OverrideTable};

/// Merge discovered builds with the override table and order them.
///
/// Later entries win name collisions in the discovered lists; override
/// fields always win over discovered fields. Obsolete builds are dropped.
/// The result is ordered locals first, then branches, then by numeric
/// version (newest first, unversioned last), then by name descending.
#[must_use]
pub fn reconcile(
    local: Vec<BuildDescriptor>,
    remote: Vec<BuildDescriptor>,
    overrides: &OverrideTable,
) -> Vec<BuildDescriptor> {
    let mut by_name: IndexMap<String, BuildDescriptor> = IndexMap::new();
    for build in local.into_iter().chain(remote) {
        by_name.insert(build.name.clone(), build);
    }

    for entry in overrides.entries() {
        let build = by_name
            .entry(entry.name.clone())
            .or_insert_with(|| BuildDescriptor::new(entry.name.clone(), Default::default()));
        entry.apply_to(build);
    }

    let mut builds: Vec<BuildDescriptor> = by_name
        .into_values()
        .filter(|build| !build.is_obsolete())
        .collect();
    builds.sort_by(compare_builds);
    builds
}

fn compare_builds(a: &BuildDescriptor, b: &BuildDescriptor) -> Ordering {
    sort_key(b).cmp(&sort_key(a))
}

fn sort_key(build: &BuildDescriptor) -> (bool, bool, Option<(u64, u64, u64)>, &str) {
    (
        build.is_local(),
        build.is_branch(),
        version_key(&build.name),
        build.name.as_str(),
    )
}

/// First `major.minor[.patch]` found anywhere in `name`.
fn version_key(name: &str) -> Option<(u64, u64, u64)> {
    let bytes = name.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        if bytes[start].is_ascii_digit() && (start == 0 || !bytes[start - 1].is_ascii_digit()) {
            if let Some(found) = version_at(&name[start..]) {
                return Some(found);
            }
        }
        start += 1;
    }
    None
}

fn version_at(text: &str) -> Option<(u64, u64, u64)> {
    let (major, rest) = take_number(text)?;
    let rest = rest.strip_prefix('.')?;
    let (minor, rest) = take_number(rest)?;
    let patch = rest
        .strip_prefix('.')
        .and_then(take_number)
        .map_or(0, |(patch, _)| patch);
    Some((major, minor, patch))
}

fn take_number(text: &str) -> Option<(u64, &str)> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let value = text[..end].parse().unwrap_or(u64::MAX);
    Some((value, &text[end..]))
}
