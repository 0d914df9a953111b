//! Format checks
//!
//! The well-known string formats, enforced by regex where a regex
//! suffices and by targeted checks where it does not (`uri` and
//! `uri-reference` attempt URL construction, `idn-hostname` attempts
//! Punycode conversion, `hostname` and `duration` need small guards the
//! pure pattern cannot express). Unknown formats are silently accepted.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::instr::{Instr, StringCheck};

static PATTERN_BY_FORMAT: LazyLock<HashMap<&'static str, Regex>> = LazyLock::new(|| {
    let mut table = HashMap::new();
    table.insert(
        "date-time",
        Regex::new(r"^(?:[1-9]\d{3}-(?:(?:0[1-9]|1[0-2])-(?:0[1-9]|1\d|2[0-8])|(?:0[13-9]|1[0-2])-(?:29|30)|(?:0[13578]|1[02])-31)|(?:[1-9]\d(?:0[48]|[2468][048]|[13579][26])|(?:[2468][048]|[13579][26])00)-02-29)T(?:[01]\d|2[0-3]):[0-5]\d:[0-5]\d(?:Z|[+-][01]\d:[0-5]\d)$").unwrap(),
    );
    table.insert(
        "date",
        Regex::new(r"^(?:[1-9]\d{3}-(?:(?:0[1-9]|1[0-2])-(?:0[1-9]|1\d|2[0-8])|(?:0[13-9]|1[0-2])-(?:29|30)|(?:0[13578]|1[02])-31)|(?:[1-9]\d(?:0[48]|[2468][048]|[13579][26])|(?:[2468][048]|[13579][26])00)-02-29)$").unwrap(),
    );
    table.insert(
        "time",
        Regex::new(r"^(?:[01]\d|2[0-3]):[0-5]\d:[0-5]\d(\.\d+)*(?:Z|[+-][01]\d:[0-5]\d)$").unwrap(),
    );
    table.insert(
        "email",
        Regex::new(r"^[\w!#$%&'*+/=?^`{|}~.-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$").unwrap(),
    );
    table.insert(
        "uuid",
        Regex::new(r"^(?i)(?:urn:uuid:)?[0-9a-f]{8}-(?:[0-9a-f]{4}-){3}[0-9a-f]{12}$").unwrap(),
    );
    table.insert(
        "ipv4",
        Regex::new(r"^(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)$").unwrap(),
    );
    table.insert(
        "ipv6",
        Regex::new(r"^((([0-9a-f]{1,4}:){7}([0-9a-f]{1,4}|:))|(([0-9a-f]{1,4}:){6}(:[0-9a-f]{1,4}|((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(\.(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3})|:))|(([0-9a-f]{1,4}:){5}(((:[0-9a-f]{1,4}){1,2})|:((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(\.(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3})|:))|(([0-9a-f]{1,4}:){4}(((:[0-9a-f]{1,4}){1,3})|((:[0-9a-f]{1,4})?:((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(\.(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3}))|:))|(([0-9a-f]{1,4}:){3}(((:[0-9a-f]{1,4}){1,4})|((:[0-9a-f]{1,4}){0,2}:((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(\.(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3}))|:))|(([0-9a-f]{1,4}:){2}(((:[0-9a-f]{1,4}){1,5})|((:[0-9a-f]{1,4}){0,3}:((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(\.(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3}))|:))|(([0-9a-f]{1,4}:){1}(((:[0-9a-f]{1,4}){1,6})|((:[0-9a-f]{1,4}){0,4}:((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(\.(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3}))|:))|(:(((:[0-9a-f]{1,4}){1,7})|((:[0-9a-f]{1,4}){0,5}:((25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(\.(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3}))|:)))$").unwrap(),
    );
    table.insert(
        "uri-template",
        Regex::new(r#"^(?:(?:[^\x00-\x20"'<>%\\^`{|}]|%[0-9a-f]{2})|\{[+#./;?&=,!@|]?(?:[a-z0-9_]|%[0-9a-f]{2})+(?::[1-9][0-9]{0,3}|\*)?(?:,(?:[a-z0-9_]|%[0-9a-f]{2})+(?::[1-9][0-9]{0,3}|\*)?)*\})*$"#).unwrap(),
    );
    table.insert(
        "relative-json-pointer",
        Regex::new(r"^(?:(?:[1-9]+0*)+|0)(?:/[/\w]*)*#?$").unwrap(),
    );
    table.insert(
        "json-pointer",
        Regex::new(r"^(?:/(?:[^~/]|~0|~1)*)*$").unwrap(),
    );
    table
});

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[-0-9a-z]{0,61}[0-9a-z])?)*\.?$").unwrap()
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(\d+(?:\.\d+)?Y)?(\d+(?:\.\d+)?M)?(\d+(?:\.\d+)?W)?(\d+(?:\.\d+)?D)?(T(\d+(?:\.\d+)?H)?(\d+(?:\.\d+)?M)?(\d+(?:\.\d+)?S)?)?$").unwrap()
});

static REFERENCE_BASE: LazyLock<Url> = LazyLock::new(|| Url::parse("http://__reference__/").unwrap());

/// Format checks that need more than a regex.
#[derive(Debug)]
pub(crate) enum FormatCheck {
    Uri,
    UriReference,
    Hostname,
    IdnHostname,
    Duration,
}

/// Instruction for a `format` keyword, or `None` when the format is
/// unknown and therefore accepted.
pub(crate) fn compile(name: &str) -> Option<Instr> {
    if let Some(pattern) = PATTERN_BY_FORMAT.get(name) {
        return Some(Instr::CheckString(StringCheck {
            pattern: Some(pattern.clone()),
            ..StringCheck::default()
        }));
    }
    let check = match name {
        "uri" => FormatCheck::Uri,
        "uri-reference" => FormatCheck::UriReference,
        "hostname" => FormatCheck::Hostname,
        "idn-hostname" => FormatCheck::IdnHostname,
        "duration" => FormatCheck::Duration,
        _ => return None,
    };
    Some(Instr::Format { name: name.to_string(), check })
}

pub(crate) fn check(check: &FormatCheck, value: &str) -> bool {
    match check {
        FormatCheck::Uri => Url::parse(value).is_ok(),
        FormatCheck::UriReference => Url::parse(value).is_ok() || REFERENCE_BASE.join(value).is_ok(),
        FormatCheck::Hostname => {
            let trimmed = value.strip_suffix('.').unwrap_or(value);
            !trimmed.is_empty() && trimmed.len() <= 253 && HOSTNAME.is_match(value)
        }
        FormatCheck::IdnHostname => url::Host::parse(value).is_ok(),
        // "P" alone and a trailing time designator are valid for the
        // pattern but not for ISO 8601.
        FormatCheck::Duration => value.len() > 1 && !value.ends_with('T') && DURATION.is_match(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepts(check_kind: &FormatCheck, value: &str) -> bool {
        check(check_kind, value)
    }

    #[test]
    fn table_formats() {
        let matches = |name: &str, value: &str| PATTERN_BY_FORMAT[name].is_match(value);

        assert!(matches("date-time", "2024-02-29T10:30:00Z"));
        assert!(!matches("date-time", "2023-02-29T10:30:00Z"));
        assert!(matches("date", "2024-06-15"));
        assert!(!matches("date", "2024-13-01"));
        assert!(matches("time", "23:59:59+01:30"));
        assert!(matches("email", "dev@example.co.uk"));
        assert!(!matches("email", "not-an-email"));
        assert!(matches("uuid", "F81D4FAE-7DEC-11D0-A765-00A0C91E6BF6"));
        assert!(!matches("uuid", "f81d4fae-7dec-11d0-a765"));
        assert!(matches("ipv4", "192.168.0.1"));
        assert!(!matches("ipv4", "256.1.1.1"));
        assert!(matches("ipv6", "2001:db8::8a2e:370:7334"));
        assert!(!matches("ipv6", "2001:::1"));
        assert!(matches("uri-template", "http://example.com/{id}/items{?page,size}"));
        assert!(matches("json-pointer", "/a/b~1c/~0d"));
        assert!(!matches("json-pointer", "a/b"));
        assert!(matches("relative-json-pointer", "2/foo/bar"));
        assert!(matches("relative-json-pointer", "0#"));
    }

    #[test]
    fn uri_and_reference() {
        assert!(accepts(&FormatCheck::Uri, "https://example.com/a?b=c"));
        assert!(!accepts(&FormatCheck::Uri, "relative/path"));
        assert!(accepts(&FormatCheck::UriReference, "relative/path"));
        assert!(accepts(&FormatCheck::UriReference, "https://example.com/a"));
    }

    #[test]
    fn hostnames() {
        assert!(accepts(&FormatCheck::Hostname, "example.com"));
        assert!(accepts(&FormatCheck::Hostname, "a.b-c.d."));
        assert!(!accepts(&FormatCheck::Hostname, "-leading.example.com"));
        assert!(!accepts(&FormatCheck::Hostname, &"x".repeat(260)));
        assert!(accepts(&FormatCheck::IdnHostname, "bücher.example"));
    }

    #[test]
    fn durations() {
        assert!(accepts(&FormatCheck::Duration, "P1Y2M3DT4H5M6S"));
        assert!(accepts(&FormatCheck::Duration, "PT5M"));
        assert!(accepts(&FormatCheck::Duration, "P2W"));
        assert!(!accepts(&FormatCheck::Duration, "P"));
        assert!(!accepts(&FormatCheck::Duration, "P1YT"));
        assert!(!accepts(&FormatCheck::Duration, "1Y"));
    }

    #[test]
    fn unknown_formats_have_no_check() {
        assert!(compile("no-such-format").is_none());
        assert!(compile("email").is_some());
        assert!(compile("duration").is_some());
    }
}
