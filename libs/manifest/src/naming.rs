//! Runtime container name codec.
//!
//! The agent owns a runtime container iff its name carries the `--` marker:
//! `<escaped container name>--<escaped manifest id>`. Both sides are escaped
//! (`_` → `___`, `-` → `_-_`) before joining, so the separator is the only
//! `--` in the encoded name and the pair round-trips even when the inputs
//! themselves contain dashes, underscores, or `--`.
//!
//! Decoding splits on the last occurrence of `--`. Names without the marker
//! belong to containers started outside the agent and must be left alone.

const SEPARATOR: &str = "--";

/// Encode a `(manifest id, container name)` pair into a runtime name.
pub fn runtime_container_name(manifest_id: &str, container_name: &str) -> String {
    format!(
        "{}{}{}",
        escape(container_name),
        SEPARATOR,
        escape(manifest_id)
    )
}

/// Decode a runtime name into `(manifest id, container name)`.
///
/// Returns `None` for names the agent does not manage: no `--` marker, or an
/// empty container part. A leading `/` (as reported by the runtime's list
/// call) is stripped first.
pub fn parse_runtime_name(name: &str) -> Option<(String, String)> {
    let name = name.strip_prefix('/').unwrap_or(name);
    let split = name.rfind(SEPARATOR)?;
    let (container, manifest) = (&name[..split], &name[split + SEPARATOR.len()..]);
    if container.is_empty() {
        return None;
    }
    Some((unescape(manifest), unescape(container)))
}

fn escape(s: &str) -> String {
    s.replace('_', "___").replace('-', "_-_")
}

fn unescape(s: &str) -> String {
    s.replace("_-_", "-").replace("___", "_")
}
