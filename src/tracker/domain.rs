use url::Url;

/// Derives the billable domain for a URL.
///
/// Only `http`/`https` URLs with a host produce a domain; every other scheme,
/// a missing URL or an unparsable one yields `None`. Hosts equal to, or
/// subdomains of, an entry in `ignored` also yield `None`.
pub fn domain_from_url(url: Option<&str>, ignored: &[String]) -> Option<String> {
    let parsed = Url::parse(url?.trim()).ok()?;

    match parsed.scheme() {
        "http" | "https" => {}
        _ => return None,
    }

    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() || is_ignored(&host, ignored) {
        return None;
    }

    Some(host)
}

fn is_ignored(host: &str, ignored: &[String]) -> bool {
    ignored.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        !entry.is_empty()
            && (host == entry
                || host
                    .strip_suffix(entry.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })
}

/// Normalizes free-form user input into a bare host for the ignore list:
/// `"HTTPS://News.Example.com/path"` becomes `"news.example.com"`.
pub fn normalize_domain_input(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_ascii_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let host = without_scheme.split('/').next().unwrap_or_default().trim();

    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
