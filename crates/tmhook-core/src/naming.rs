//! Deterministic resource names
//!
//! Every generated identifier goes through [`sanitize_name`], so two writers
//! deriving names from the same DNS data always agree.

/// Suffix appended to generated profile names
pub const PROFILE_SUFFIX: &str = "-tm";

/// Suffix appended to CNAME publication resource names
pub const CNAME_SUFFIX: &str = "-tm-cname";

/// Replace every character outside `[A-Za-z0-9]` with `-`
///
/// Idempotent; the output only contains `[A-Za-z0-9-]`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

/// Profile name for a DNS name: `app.example.com` → `app-example-com-tm`
pub fn generate_profile_name(dns_name: &str) -> String {
    format!("{}{}", sanitize_name(dns_name), PROFILE_SUFFIX)
}

/// Endpoint name from the first target, or the DNS name when there is none
pub fn generate_endpoint_name(dns_name: &str, targets: &[String]) -> String {
    match targets.first() {
        Some(target) => sanitize_name(target),
        None => sanitize_name(dns_name),
    }
}

/// Names for each of `count` targets sharing one base name
///
/// A single target keeps the base name; several get a positional suffix
/// (`base-0`, `base-1`, ...) so they cannot collide inside one profile.
pub fn disambiguate(base: &str, count: usize) -> Vec<String> {
    if count <= 1 {
        return vec![base.to_string()];
    }
    (0..count).map(|i| format!("{}-{}", base, i)).collect()
}

/// Resource name under which the vanity CNAME is published
///
/// Dots become `-`, other characters outside `[A-Za-z0-9-]` are dropped.
pub fn cname_resource_name(hostname: &str) -> String {
    let mut name: String = hostname
        .chars()
        .filter_map(|c| match c {
            '.' => Some('-'),
            c if c.is_ascii_alphanumeric() || c == '-' => Some(c),
            _ => None,
        })
        .collect();
    name.push_str(CNAME_SUFFIX);
    name
}
