use pacfind_core::export::format_timestamp;
use pacfind_core::models::{AggregationResult, PackageRecord, SourceFailure, UpdateRecord};

const SIZE_UNITS: [&str; 9] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi", "Yi"];

/// Formats a byte count in binary units, e.g. `1.5 MiB`.
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in SIZE_UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}B");
        }
        size /= 1024.0;
    }
    format!("{bytes}B")
}

pub fn print_records(records: &[PackageRecord]) {
    let name_width = column_width(records.iter().map(|r| r.name.as_str()));
    let repo_width = column_width(records.iter().map(|r| r.source.repository()));

    for record in records {
        println!(
            "{:<name_width$}  {:<repo_width$}  {}",
            record.name,
            record.source.repository(),
            record.version
        );
        if !record.description.is_empty() {
            println!("    {}", record.description);
        }
    }
}

pub fn print_details(record: &PackageRecord) {
    println!("Name         : {}", record.name);
    println!("Version      : {}", display_or_dash(&record.version));
    println!("Repository   : {}", record.source.repository());
    println!("Description  : {}", display_or_dash(&record.description));
    println!(
        "Maintainer   : {}",
        record.maintainer.as_deref().unwrap_or("-")
    );
    println!(
        "URL          : {}",
        record.upstream_url.as_deref().unwrap_or("-")
    );
    if record.depends.is_empty() {
        println!("Depends On   : -");
    } else {
        println!("Depends On   : {}", record.depends.join("  "));
    }
    if let Some(size) = record.download_size {
        println!("Download Size: {}", human_size(size));
    }
    println!(
        "Last Updated : {}",
        record
            .last_modified
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string())
    );
}

pub fn print_updates(updates: &[UpdateRecord]) {
    let name_width = column_width(updates.iter().map(|u| u.name.as_str()));
    let old_width = column_width(updates.iter().map(|u| u.installed_version.as_str()));
    let new_width = column_width(updates.iter().map(|u| u.available_version.as_str()));

    for update in updates {
        println!(
            "{:<name_width$}  {:<old_width$} -> {:<new_width$}  {:<6}  {}",
            update.name,
            update.installed_version,
            update.available_version,
            update.source.repository(),
            human_size(update.download_size)
        );
    }

    let total: u64 = updates.iter().map(|u| u.download_size).sum();
    println!(
        "{} update(s), total download {}",
        updates.len(),
        human_size(total)
    );
}

/// Source failures go to stderr so JSON on stdout stays parseable.
pub fn report_failures(failures: &[SourceFailure]) {
    for failure in failures {
        eprintln!(
            "warning: {} unavailable: {}",
            failure.source, failure.error.message
        );
    }
}

pub fn report_aggregation(result: &AggregationResult) {
    report_failures(&result.failures);
    if result.cancelled {
        eprintln!("warning: interrupted; results are partial");
    }
}

fn column_width<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values.map(str::len).max().unwrap_or(0)
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
