//! Parser for the `%FIELD%` metadata format used by both the installed
//! database and the repository sync archives.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::models::{CoreError, CoreErrorKind, PackageRecord, SourceTag};
use crate::sources::SourceResult;

pub(crate) type DescFields = HashMap<String, Vec<String>>;

pub(crate) fn parse_desc(content: &str) -> DescFields {
    let mut fields = DescFields::new();
    let mut current: Option<String> = None;
    let mut values: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed.len() > 2 && trimmed.starts_with('%') && trimmed.ends_with('%') {
            if let Some(field) = current.take() {
                fields.insert(field, std::mem::take(&mut values));
            }
            current = Some(trimmed[1..trimmed.len() - 1].to_string());
        } else if !trimmed.is_empty() && current.is_some() {
            values.push(trimmed.to_string());
        }
    }

    if let Some(field) = current {
        fields.insert(field, values);
    }

    fields
}

/// Folds the fields of a second metadata file (e.g. `depends`) into `fields`.
pub(crate) fn merge_fields(fields: &mut DescFields, extra: DescFields) {
    for (key, values) in extra {
        fields.entry(key).or_default().extend(values);
    }
}

pub(crate) fn record_from_desc(fields: &DescFields, source: SourceTag) -> SourceResult<PackageRecord> {
    let name = first(fields, "NAME").ok_or_else(|| missing("NAME", source.clone()))?;
    let version =
        first(fields, "VERSION").ok_or_else(|| missing("VERSION", source.clone()))?;

    let mut record = PackageRecord::new(name, version, source);
    if let Some(description) = first(fields, "DESC") {
        record.description = description.to_string();
    }
    record.maintainer = first(fields, "PACKAGER").map(str::to_string);
    record.upstream_url = first(fields, "URL").map(str::to_string);
    record.depends = fields
        .get("DEPENDS")
        .map(|deps| deps.iter().map(|dep| dependency_name(dep).to_string()).collect())
        .unwrap_or_default();
    record.last_modified = first(fields, "BUILDDATE")
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));
    record.download_size = first(fields, "CSIZE").and_then(|raw| raw.parse::<u64>().ok());

    Ok(record)
}

pub(crate) fn unix_seconds(secs: i64) -> Option<SystemTime> {
    u64::try_from(secs)
        .ok()
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
}

/// Strips a version constraint: `glibc>=2.38` becomes `glibc`.
pub(crate) fn dependency_name(dep: &str) -> &str {
    let end = dep.find(['<', '>', '=', ':']).unwrap_or(dep.len());
    dep[..end].trim()
}

fn first<'a>(fields: &'a DescFields, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(|values| values.first())
        .map(String::as_str)
}

fn missing(field: &str, source: SourceTag) -> CoreError {
    CoreError::new(
        CoreErrorKind::ParseFailure,
        format!("metadata entry is missing %{field}%"),
    )
    .with_origin(source)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::{dependency_name, merge_fields, parse_desc, record_from_desc};
    use crate::models::{CoreErrorKind, SourceTag};

    const DESC: &str = "%FILENAME%\nripgrep-14.1.0-1-x86_64.pkg.tar.zst\n\n\
%NAME%\nripgrep\n\n%VERSION%\n14.1.0-1\n\n\
%DESC%\nA search tool that combines the usability of ag with the raw speed of grep\n\n\
%CSIZE%\n1571234\n\n%URL%\nhttps://github.com/BurntSushi/ripgrep\n\n\
%BUILDDATE%\n1700000000\n\n%PACKAGER%\nJane Doe <jane@example.org>\n\n\
%DEPENDS%\ngcc-libs\npcre2>=10.40\n";

    #[test]
    fn parses_multi_value_fields() {
        let fields = parse_desc(DESC);
        assert_eq!(fields["NAME"], vec!["ripgrep"]);
        assert_eq!(fields["DEPENDS"], vec!["gcc-libs", "pcre2>=10.40"]);
    }

    #[test]
    fn builds_record_from_fields() {
        let record = record_from_desc(&parse_desc(DESC), SourceTag::sync("extra")).unwrap();
        assert_eq!(record.name, "ripgrep");
        assert_eq!(record.version, "14.1.0-1");
        assert_eq!(record.download_size, Some(1_571_234));
        assert_eq!(record.depends, vec!["gcc-libs", "pcre2"]);
        assert_eq!(record.maintainer.as_deref(), Some("Jane Doe <jane@example.org>"));
        assert_eq!(
            record.last_modified,
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
    }

    #[test]
    fn missing_version_is_a_parse_failure() {
        let error = record_from_desc(&parse_desc("%NAME%\nfoo\n"), SourceTag::Local).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ParseFailure);
        assert_eq!(error.origin, Some(SourceTag::Local));
    }

    #[test]
    fn depends_file_merges_into_desc() {
        let mut fields = parse_desc("%NAME%\nfoo\n%VERSION%\n1-1\n");
        merge_fields(&mut fields, parse_desc("%DEPENDS%\nbar\n"));
        assert_eq!(fields["DEPENDS"], vec!["bar"]);
    }

    #[test]
    fn strips_dependency_constraints() {
        assert_eq!(dependency_name("glibc>=2.38"), "glibc");
        assert_eq!(dependency_name("sh"), "sh");
        assert_eq!(dependency_name("python<3.13"), "python");
    }
}
