use serde::Serialize;

/// Pretty JSON for debug logs; `None` (and no serialization work) unless DEBUG is enabled.
pub(crate) fn pretty_json_if_debug<T>(value: &T) -> Option<String>
where
    T: Serialize,
{
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return None;
    }

    Some(
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|error| format!("<pretty serialize failed: {error}>")),
    )
}
