pub const BUNDLE_SERIES: &str = "bundle";

/// Known series, newest first.
const SERIES_BY_RECENCY: &[&str] = &[
    "noble", "jammy", "focal", "bionic", "xenial", "wily", "vivid", "trusty", "precise",
    "win2016", "win2012r2", "centos7",
];

/// Sort key for series: lower is more recent. Bundles rank after every
/// charm series, unknown series last.
pub fn series_rank(series: &str) -> usize {
    if series == BUNDLE_SERIES {
        return SERIES_BY_RECENCY.len();
    }
    match SERIES_BY_RECENCY.iter().position(|s| *s == series) {
        Some(pos) => pos,
        None => SERIES_BY_RECENCY.len() + 1,
    }
}
