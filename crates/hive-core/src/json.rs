use serde_json::Value;

/// Extract a JSON value from model output.
///
/// Models wrap JSON in markdown fences or lead with prose before the
/// object. Strategies are tried in order: direct parse, a ```json fence,
/// then the outermost `{`..`}` span. When every strategy fails, the error
/// from the direct parse is returned so callers can quote it back to the
/// model.
pub fn extract_json(text: &str) -> std::result::Result<Value, serde_json::Error> {
    let trimmed = text.trim();

    let direct_err = match serde_json::from_str(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(inner) = strip_fence(trimmed)
        && let Ok(value) = serde_json::from_str(inner)
    {
        return Ok(value);
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str(&trimmed[start..=end])
    {
        return Ok(value);
    }

    Err(direct_err)
}

fn strip_fence(text: &str) -> Option<&str> {
    let rest = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))?;
    Some(rest.strip_suffix("```")?.trim())
}
