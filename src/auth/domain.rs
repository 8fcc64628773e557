/// Apex domain resolution
///
/// Reduces a hostname to its registrable root, the last two dot-separated
/// labels. Used for cookie scoping and redirect validation.

/// Returns the last two labels of `host`, or `host` unchanged when it has
/// fewer than two labels.
///
/// No case folding is done; lower-case the input first when comparing
/// hosts case-insensitively.
pub fn apex_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').collect();
    let start = labels.len().saturating_sub(2);
    labels[start..].join(".")
}
