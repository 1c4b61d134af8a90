//! Pacman-style version ordering.
//!
//! Versions have the shape `[epoch:]pkgver[-pkgrel]`. The epoch is compared
//! first, then the upstream version, then the release (only when both sides
//! carry one).

use std::cmp::Ordering;

/// Returns true when `candidate` is strictly newer than `installed`.
pub fn is_newer(candidate: &str, installed: &str) -> bool {
    vercmp(candidate, installed) == Ordering::Greater
}

pub fn vercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let (epoch_a, version_a, release_a) = split_evr(a);
    let (epoch_b, version_b, release_b) = split_evr(b);

    match compare_segments(epoch_a, epoch_b) {
        Ordering::Equal => {}
        ord => return ord,
    }

    match compare_segments(version_a, version_b) {
        Ordering::Equal => {}
        ord => return ord,
    }

    match (release_a, release_b) {
        (Some(ra), Some(rb)) => compare_segments(ra, rb),
        _ => Ordering::Equal,
    }
}

fn split_evr(full: &str) -> (&str, &str, Option<&str>) {
    let digits = full.bytes().take_while(u8::is_ascii_digit).count();
    let (epoch, rest) = if full.as_bytes().get(digits) == Some(&b':') {
        let epoch = if digits == 0 { "0" } else { &full[..digits] };
        (epoch, &full[digits + 1..])
    } else {
        ("0", full)
    };

    match rest.rfind('-') {
        Some(idx) => (epoch, &rest[..idx], Some(&rest[idx + 1..])),
        None => (epoch, rest, None),
    }
}

/// Segment-wise comparison of a single version component.
fn compare_segments(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut one, mut two) = (0usize, 0usize);
    let (mut seg_end_a, mut seg_end_b) = (0usize, 0usize);

    while one < a.len() && two < b.len() {
        while one < a.len() && !a[one].is_ascii_alphanumeric() {
            one += 1;
        }
        while two < b.len() && !b[two].is_ascii_alphanumeric() {
            two += 1;
        }

        if one >= a.len() || two >= b.len() {
            break;
        }

        // Differing separator runs decide the comparison on their own.
        let separators_a = one - seg_end_a;
        let separators_b = two - seg_end_b;
        if separators_a != separators_b {
            return separators_a.cmp(&separators_b);
        }

        let numeric = a[one].is_ascii_digit();
        let end_a = segment_end(a, one, numeric);
        let end_b = segment_end(b, two, numeric);

        if end_b == two {
            // Segment types differ: numeric beats alpha.
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            compare_numeric(&a[one..end_a], &b[two..end_b])
        } else {
            a[one..end_a].cmp(&b[two..end_b])
        };
        if ord != Ordering::Equal {
            return ord;
        }

        one = end_a;
        two = end_b;
        seg_end_a = end_a;
        seg_end_b = end_b;
    }

    let rest_a = &a[one.min(a.len())..];
    let rest_b = &b[two.min(b.len())..];
    if rest_a.is_empty() && rest_b.is_empty() {
        return Ordering::Equal;
    }

    // A trailing alpha segment marks a pre-release, which sorts older.
    let a_alpha = rest_a.first().is_some_and(u8::is_ascii_alphabetic);
    let b_alpha = rest_b.first().is_some_and(u8::is_ascii_alphabetic);
    if (rest_a.is_empty() && !b_alpha) || a_alpha {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

fn segment_end(bytes: &[u8], start: usize, numeric: bool) -> usize {
    let mut end = start;
    while end < bytes.len()
        && (if numeric {
            bytes[end].is_ascii_digit()
        } else {
            bytes[end].is_ascii_alphabetic()
        })
    {
        end += 1;
    }
    end
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(digits: &[u8]) -> &[u8] {
    let zeros = digits.iter().take_while(|digit| **digit == b'0').count();
    &digits[zeros..]
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{is_newer, split_evr, vercmp};

    #[test]
    fn compares_plain_versions() {
        assert_eq!(vercmp("1.0", "1.2"), Ordering::Less);
        assert_eq!(vercmp("1.2", "1.0"), Ordering::Greater);
        assert_eq!(vercmp("1.0.0-1", "1.0.1-1"), Ordering::Less);
        assert_eq!(vercmp("2.10", "2.9"), Ordering::Greater);
    }

    #[test]
    fn epoch_wins_over_version() {
        assert_eq!(vercmp("1:0.5.0-1", "2.0.0-1"), Ordering::Greater);
        assert_eq!(vercmp("0:1.0", "1.0"), Ordering::Equal);
    }

    #[test]
    fn release_only_compared_when_both_present() {
        assert_eq!(vercmp("1.0-2", "1.0-1"), Ordering::Greater);
        assert_eq!(vercmp("1.0-2", "1.0"), Ordering::Equal);
    }

    #[test]
    fn alpha_suffix_is_prerelease() {
        assert_eq!(vercmp("1.0alpha", "1.0"), Ordering::Less);
        assert_eq!(vercmp("1.0", "1.0a"), Ordering::Greater);
        assert_eq!(vercmp("1.0.1", "1.0"), Ordering::Greater);
    }

    #[test]
    fn numeric_segment_beats_alpha_segment() {
        assert_eq!(vercmp("1.0.1", "1.0.a"), Ordering::Greater);
        assert_eq!(vercmp("1.a", "1.1"), Ordering::Less);
    }

    #[test]
    fn leading_zeros_are_ignored() {
        assert_eq!(vercmp("1.001", "1.1"), Ordering::Equal);
        assert_eq!(vercmp("1.010", "1.9"), Ordering::Greater);
    }

    #[test]
    fn splits_epoch_version_release() {
        assert_eq!(split_evr("1:2.3.4-5"), ("1", "2.3.4", Some("5")));
        assert_eq!(split_evr("2.3.4"), ("0", "2.3.4", None));
        assert_eq!(split_evr("r12.abc-1"), ("0", "r12.abc", Some("1")));
    }

    #[test]
    fn is_newer_is_strict() {
        assert!(is_newer("1.2", "1.0"));
        assert!(!is_newer("1.0", "1.0"));
        assert!(!is_newer("0.9", "1.0"));
    }
}
